//! [`Contribution`]-related [`Database`] implementations.

use common::{
    operations::{By, Insert, Select},
    Money,
};
use itertools::Itertools as _;
use postgres_types::ToSql;
use tokio_postgres::Row;
use tracerr::Traced;

use crate::{
    domain::{contribution, pool, Contribution},
    infra::{
        database::{self, postgres::Connection, Postgres},
        Database,
    },
    read,
};

/// Columns of the `contributions` table forming a [`Contribution`].
const COLUMNS: &str = "\
    id, pool_id, contributor_id, \
    amount, currency, \
    request_token, created_at";

/// Reads a [`Contribution`] from the provided [`Row`] selected with
/// [`COLUMNS`].
fn from_row(row: &Row) -> Contribution {
    Contribution {
        id: row.get("id"),
        pool_id: row.get("pool_id"),
        contributor_id: row.get("contributor_id"),
        amount: Money {
            amount: row.get("amount"),
            currency: row.get("currency"),
        },
        request_token: row.get("request_token"),
        created_at: row.get("created_at"),
    }
}

impl<C>
    Database<
        Select<
            By<Option<Contribution>, (pool::Id, contribution::RequestToken)>,
        >,
    > for Postgres<C>
where
    C: Connection,
{
    type Ok = Option<Contribution>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<
            By<Option<Contribution>, (pool::Id, contribution::RequestToken)>,
        >,
    ) -> Result<Self::Ok, Self::Err> {
        let (pool_id, token) = by.into_inner();

        let sql = format!(
            "SELECT {COLUMNS} \
             FROM contributions \
             WHERE pool_id = $1::UUID \
               AND request_token = $2::VARCHAR \
             LIMIT 1"
        );
        Ok(self
            .query_opt(&sql, &[&pool_id, &token])
            .await
            .map_err(tracerr::wrap!())?
            .as_ref()
            .map(from_row))
    }
}

impl<C> Database<Insert<Contribution>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(contribution): Insert<Contribution>,
    ) -> Result<Self::Ok, Self::Err> {
        let Contribution {
            id,
            pool_id,
            contributor_id,
            amount,
            request_token,
            created_at,
        } = contribution;

        const SQL: &str = "\
            INSERT INTO contributions (\
                id, pool_id, contributor_id, \
                amount, currency, \
                request_token, created_at\
            ) VALUES (\
                $1::UUID, $2::UUID, $3::UUID, \
                $4::NUMERIC, $5::INT2, \
                $6::VARCHAR, $7::TIMESTAMPTZ\
            )";
        self.exec(
            SQL,
            &[
                &id,
                &pool_id,
                &contributor_id,
                &amount.amount,
                &amount.currency,
                &request_token,
                &created_at,
            ],
        )
        .await
        .map_err(tracerr::wrap!())
        .map(drop)
    }
}

impl<C> Database<Select<By<read::contribution::LedgerSum, pool::Id>>>
    for Postgres<C>
where
    C: Connection,
{
    type Ok = read::contribution::LedgerSum;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<read::contribution::LedgerSum, pool::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let pool_id: pool::Id = by.into_inner();

        const SQL: &str = "\
            SELECT COALESCE(SUM(amount), 0) AS sum \
            FROM contributions \
            WHERE pool_id = $1::UUID";
        self.query(SQL, &[&pool_id])
            .await
            .map_err(tracerr::wrap!())
            .map(|rows| {
                read::contribution::LedgerSum(
                    rows.first().map(|row| row.get("sum")).unwrap_or_default(),
                )
            })
    }
}

impl<C>
    Database<
        Select<
            By<
                read::contribution::list::Page,
                read::contribution::list::Selector,
            >,
        >,
    > for Postgres<C>
where
    C: Connection,
{
    type Ok = read::contribution::list::Page;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<
            By<
                read::contribution::list::Page,
                read::contribution::list::Selector,
            >,
        >,
    ) -> Result<Self::Ok, Self::Err> {
        let read::contribution::list::Selector {
            arguments,
            filter: read::contribution::list::Filter { pool_id },
        } = by.into_inner();

        let limit = i32::try_from(arguments.limit()).unwrap_or(i32::MAX - 1) + 1;

        let mut ps: Vec<&(dyn ToSql + Sync)> = vec![&limit, &pool_id];

        let cursor_idx = arguments.cursor().map(|c| {
            ps.push(c);
            ps.len()
        });

        let sql = format!(
            "SELECT {COLUMNS} \
             FROM contributions \
             WHERE pool_id = $2::UUID \
                   {cursor} \
             ORDER BY id {order} \
             LIMIT $1::INT4",
            cursor = cursor_idx.into_iter().format_with("", |idx, f| {
                let op = arguments.kind().operator();
                f(&format_args!("AND id {op} ${idx}::UUID"))
            }),
            order = arguments.kind().order().sql(),
        );
        let rows = self
            .query(&sql, ps.as_slice())
            .await
            .map_err(tracerr::wrap!())?;

        let has_more = rows.len() > arguments.limit();
        let edges = rows
            .iter()
            .take(arguments.limit())
            .map(|row| {
                let contribution = from_row(row);
                (contribution.id, contribution)
            })
            .collect::<Vec<_>>();

        Ok(read::contribution::list::Page::new(&arguments, edges, has_more))
    }
}
