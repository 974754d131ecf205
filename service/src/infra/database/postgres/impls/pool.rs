//! [`Pool`]-related [`Database`] implementations.

use common::{
    operations::{By, Increment, Insert, Select},
    Money,
};
use itertools::Itertools as _;
use postgres_types::ToSql;
use rust_decimal::Decimal;
use tokio_postgres::Row;
use tracerr::Traced;

use crate::{
    domain::{pool, user, Pool},
    infra::{
        database::{self, postgres::Connection, Postgres},
        Database,
    },
    read,
};

/// Columns of the `pools` table forming a [`Pool`].
const COLUMNS: &str = "\
    id, owner_id, \
    product_handle, product_name, product_image_url, \
    product_price, product_price_currency, \
    goal_amount, currency, current_amount, \
    status, created_at, completed_at";

/// Reads a [`Pool`] from the provided [`Row`] selected with [`COLUMNS`].
fn from_row(row: &Row) -> Pool {
    Pool {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        product: pool::Product {
            handle: row.get("product_handle"),
            name: row.get("product_name"),
            image_url: row.get("product_image_url"),
            price: Money {
                amount: row.get("product_price"),
                currency: row.get("product_price_currency"),
            },
        },
        goal: Money {
            amount: row.get("goal_amount"),
            currency: row.get("currency"),
        },
        current_amount: row.get("current_amount"),
        status: row.get("status"),
        created_at: row.get("created_at"),
        completed_at: row.get("completed_at"),
    }
}

impl<C> Database<Select<By<Option<Pool>, pool::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = Option<Pool>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Pool>, pool::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();

        let sql = format!(
            "SELECT {COLUMNS} \
             FROM pools \
             WHERE id = $1::UUID"
        );
        Ok(self
            .query_opt(&sql, &[&id])
            .await
            .map_err(tracerr::wrap!())?
            .as_ref()
            .map(from_row))
    }
}

impl<C> Database<Select<By<Option<Pool>, (user::Id, pool::ProductHandle)>>>
    for Postgres<C>
where
    C: Connection,
{
    type Ok = Option<Pool>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Pool>, (user::Id, pool::ProductHandle)>>,
    ) -> Result<Self::Ok, Self::Err> {
        let (owner_id, handle) = by.into_inner();

        let sql = format!(
            "SELECT {COLUMNS} \
             FROM pools \
             WHERE owner_id = $1::UUID \
               AND product_handle = $2::VARCHAR \
               AND status = $3::INT2 \
             LIMIT 1"
        );
        Ok(self
            .query_opt(&sql, &[&owner_id, &handle, &pool::Status::Active])
            .await
            .map_err(tracerr::wrap!())?
            .as_ref()
            .map(from_row))
    }
}

impl<C> Database<Insert<Pool>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(pool): Insert<Pool>,
    ) -> Result<Self::Ok, Self::Err> {
        let Pool {
            id,
            owner_id,
            product:
                pool::Product {
                    handle,
                    name,
                    image_url,
                    price,
                },
            goal,
            current_amount,
            status,
            created_at,
            completed_at,
        } = pool;

        // No `ON CONFLICT` clause, so the `pools_active_owner_product_idx`
        // violation reaches the caller.
        const SQL: &str = "\
            INSERT INTO pools (\
                id, owner_id, \
                product_handle, product_name, product_image_url, \
                product_price, product_price_currency, \
                goal_amount, currency, current_amount, \
                status, created_at, completed_at\
            ) VALUES (\
                $1::UUID, $2::UUID, \
                $3::VARCHAR, $4::VARCHAR, $5::VARCHAR, \
                $6::NUMERIC, $7::INT2, \
                $8::NUMERIC, $9::INT2, $10::NUMERIC, \
                $11::INT2, $12::TIMESTAMPTZ, $13::TIMESTAMPTZ\
            )";
        self.exec(
            SQL,
            &[
                &id,
                &owner_id,
                &handle,
                &name,
                &image_url,
                &price.amount,
                &price.currency,
                &goal.amount,
                &goal.currency,
                &current_amount,
                &status,
                &created_at,
                &completed_at,
            ],
        )
        .await
        .map_err(tracerr::wrap!())
        .map(drop)
    }
}

impl<C> Database<Increment<By<Option<Pool>, (pool::Id, Decimal)>>>
    for Postgres<C>
where
    C: Connection,
{
    type Ok = Option<Pool>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Increment(by): Increment<By<Option<Pool>, (pool::Id, Decimal)>>,
    ) -> Result<Self::Ok, Self::Err> {
        let (id, amount) = by.into_inner();
        let now = pool::CompletionDateTime::now();

        // `status` guard is re-evaluated against the latest row version.
        let sql = format!(
            "UPDATE pools \
             SET current_amount = current_amount + $2::NUMERIC, \
                 status = CASE \
                     WHEN current_amount + $2::NUMERIC >= goal_amount \
                     THEN $4::INT2 \
                     ELSE status \
                 END, \
                 completed_at = CASE \
                     WHEN current_amount + $2::NUMERIC >= goal_amount \
                     THEN $5::TIMESTAMPTZ \
                     ELSE completed_at \
                 END \
             WHERE id = $1::UUID \
               AND status = $3::INT2 \
             RETURNING {COLUMNS}"
        );
        Ok(self
            .query_opt(
                &sql,
                &[
                    &id,
                    &amount,
                    &pool::Status::Active,
                    &pool::Status::Completed,
                    &now,
                ],
            )
            .await
            .map_err(tracerr::wrap!())?
            .as_ref()
            .map(from_row))
    }
}

impl<C> Database<Select<By<read::pool::list::Page, read::pool::list::Selector>>>
    for Postgres<C>
where
    C: Connection,
{
    type Ok = read::pool::list::Page;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<
            By<read::pool::list::Page, read::pool::list::Selector>,
        >,
    ) -> Result<Self::Ok, Self::Err> {
        let read::pool::list::Selector {
            arguments,
            filter: read::pool::list::Filter { owner_id },
        } = by.into_inner();

        // Newest first.
        let kind = arguments.kind().inverse();
        let limit = i32::try_from(arguments.limit()).unwrap_or(i32::MAX - 1) + 1;
        let status = pool::Status::Active;

        let mut ps: Vec<&(dyn ToSql + Sync)> = vec![&limit, &status];

        let cursor_idx = arguments.cursor().map(|c| {
            ps.push(c);
            ps.len()
        });
        let owner_idx = owner_id.as_ref().map(|id| {
            ps.push(id);
            ps.len()
        });

        let sql = format!(
            "SELECT id \
             FROM pools \
             WHERE status = $2::INT2 \
                   {cursor} \
                   {owner_filtering} \
             ORDER BY id {order} \
             LIMIT $1::INT4",
            cursor = cursor_idx.into_iter().format_with("", |idx, f| {
                let op = kind.operator();
                f(&format_args!("AND id {op} ${idx}::UUID"))
            }),
            owner_filtering = owner_idx.into_iter().format_with("", |idx, f| {
                f(&format_args!("AND owner_id = ${idx}::UUID"))
            }),
            order = kind.order().sql(),
        );
        let rows = self
            .query(&sql, ps.as_slice())
            .await
            .map_err(tracerr::wrap!())?;

        let has_more = rows.len() > arguments.limit();
        let edges = rows
            .into_iter()
            .take(arguments.limit())
            .map(|row| {
                let id = row.get("id");
                (id, id)
            })
            .collect::<Vec<_>>();

        Ok(read::pool::list::Page::new(&arguments, edges, has_more))
    }
}

impl<C>
    Database<
        Select<By<read::pool::list::TotalCount, read::pool::list::Filter>>,
    > for Postgres<C>
where
    C: Connection,
{
    type Ok = read::pool::list::TotalCount;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<
            By<read::pool::list::TotalCount, read::pool::list::Filter>,
        >,
    ) -> Result<Self::Ok, Self::Err> {
        let read::pool::list::Filter { owner_id } = by.into_inner();

        const SQL: &str = "\
            SELECT COUNT(*)::INT4 \
            FROM pools \
            WHERE status = $1::INT2 \
              AND ($2::UUID IS NULL OR owner_id = $2::UUID)";
        self.query(SQL, &[&pool::Status::Active, &owner_id])
            .await
            .map_err(tracerr::wrap!())
            .map(|rows| {
                rows.first().map_or(0, |row| row.get::<_, i32>(0)).into()
            })
    }
}

impl<C> Database<Select<By<read::pool::Participants, pool::Id>>>
    for Postgres<C>
where
    C: Connection,
{
    type Ok = read::pool::Participants;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<read::pool::Participants, pool::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let pool_id: pool::Id = by.into_inner();

        const SQL: &str = "\
            SELECT contributor_id, currency, \
                   SUM(amount) AS total, \
                   COUNT(*)::INT4 AS contributions, \
                   MAX(created_at) AS last_contributed_at \
            FROM contributions \
            WHERE pool_id = $1::UUID \
            GROUP BY contributor_id, currency \
            ORDER BY total DESC, contributor_id ASC";
        let contributors = self
            .query(SQL, &[&pool_id])
            .await
            .map_err(tracerr::wrap!())?
            .into_iter()
            .map(|row| read::pool::Contributor {
                user_id: row.get("contributor_id"),
                total: Money {
                    amount: row.get("total"),
                    currency: row.get("currency"),
                },
                contributions: row.get::<_, i32>("contributions").unsigned_abs(),
                last_contributed_at: row.get("last_contributed_at"),
            })
            .collect();

        Ok(read::pool::Participants { contributors })
    }
}

impl<C> Database<Select<By<Vec<read::pool::Discrepancy>, ()>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = Vec<read::pool::Discrepancy>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        _: Select<By<Vec<read::pool::Discrepancy>, ()>>,
    ) -> Result<Self::Ok, Self::Err> {
        const SQL: &str = "\
            SELECT p.id, p.current_amount, p.goal_amount, p.status, \
                   COALESCE(SUM(c.amount), 0) AS ledger_amount \
            FROM pools AS p \
            LEFT JOIN contributions AS c ON c.pool_id = p.id \
            GROUP BY p.id \
            HAVING p.current_amount <> COALESCE(SUM(c.amount), 0) \
                OR (p.status = $1::INT2) \
                   <> (p.current_amount >= p.goal_amount)";
        Ok(self
            .query(SQL, &[&pool::Status::Completed])
            .await
            .map_err(tracerr::wrap!())?
            .into_iter()
            .map(|row| read::pool::Discrepancy {
                pool_id: row.get("id"),
                current_amount: row.get("current_amount"),
                ledger_amount: row.get("ledger_amount"),
                goal_amount: row.get("goal_amount"),
                status: row.get("status"),
            })
            .collect())
    }
}
