//! GraphQL [`Query`]s definitions.

use juniper::graphql_object;
use service::{query, read, Query as _};

use crate::{api, define_error, AsError, Context, Error};

/// Root of all GraphQL queries.
#[derive(Clone, Copy, Debug)]
pub struct Query;

impl Query {
    /// Name of the [`tracing::Span`] for the queries.
    pub(crate) const SPAN_NAME: &'static str = "GraphQL query";
}

#[graphql_object(context = Context)]
impl Query {
    /// Returns the `Pool` with the specified ID.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `POOL_NOT_FOUND` - the `Pool` with the specified ID does not exist.
    #[tracing::instrument(
        skip_all,
        fields(
            id = %id,
            gql.name = "pool",
            otel.name = Self::SPAN_NAME,
        ),
    )]
    pub async fn pool(
        id: api::pool::Id,
        ctx: &Context,
    ) -> Result<api::Pool, Error> {
        ctx.service()
            .execute(query::pool::ById::by(id.into()))
            .await
            .map_err(AsError::into_error)
            .map_err(ctx.error())?
            .ok_or_else(|| PoolError::NotFound.into())
            .map_err(ctx.error())
            .map(Into::into)
    }

    /// Fetches the page of active `Pool`s, the most recently created first.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `AMBIGUOUS_PAGINATION_ARGUMENTS` - the pagination arguments are
    ///                                      ambiguous.
    #[tracing::instrument(
        skip_all,
        fields(
            after = ?after,
            before = ?before,
            first = ?first,
            gql.name = "pools",
            last = ?last,
            otel.name = Self::SPAN_NAME,
            owner_id = ?owner_id,
        ),
    )]
    pub async fn pools(
        first: Option<i32>,
        after: Option<api::pool::list::Cursor>,
        last: Option<i32>,
        before: Option<api::pool::list::Cursor>,
        owner_id: Option<api::UserId>,
        ctx: &Context,
    ) -> Result<api::pool::list::Connection, Error> {
        const DEFAULT_PAGE_SIZE: i32 = 10;

        let filter = read::pool::list::Filter {
            owner_id: owner_id.map(Into::into),
        };
        ctx.service()
            .execute(query::pools::List::by(read::pool::list::Selector {
                arguments: read::pool::list::Arguments::new(
                    first,
                    after.map(Into::into),
                    last,
                    before.map(Into::into),
                    DEFAULT_PAGE_SIZE,
                )
                .ok_or_else(|| api::PaginationError::Ambiguous.into())
                .map_err(ctx.error())?,
                filter,
            }))
            .await
            .map_err(AsError::into_error)
            .map_err(ctx.error())
            .map(|connection| (connection, filter).into())
    }

    /// Returns the active `Pool` funded for the specified user towards the
    /// specified product, if any.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "activePool",
            otel.name = Self::SPAN_NAME,
            owner_id = %owner_id,
            product_handle = %product_handle,
        ),
    )]
    pub async fn active_pool(
        owner_id: api::UserId,
        product_handle: api::pool::ProductHandle,
        ctx: &Context,
    ) -> Result<Option<api::Pool>, Error> {
        ctx.service()
            .execute(query::pool::Active::by((
                owner_id.into(),
                product_handle.into(),
            )))
            .await
            .map_err(AsError::into_error)
            .map_err(ctx.error())
            .map(|pool| pool.map(Into::into))
    }

    /// Fetches the page of `Contribution`s made to the specified `Pool`, in
    /// the order they were made.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `POOL_NOT_FOUND` - the `Pool` with the specified ID does not exist;
    /// - `AMBIGUOUS_PAGINATION_ARGUMENTS` - the pagination arguments are
    ///                                      ambiguous.
    #[tracing::instrument(
        skip_all,
        fields(
            after = ?after,
            before = ?before,
            first = ?first,
            gql.name = "poolContributions",
            last = ?last,
            otel.name = Self::SPAN_NAME,
            pool_id = %pool_id,
        ),
    )]
    pub async fn pool_contributions(
        pool_id: api::pool::Id,
        first: Option<i32>,
        after: Option<api::contribution::list::Cursor>,
        last: Option<i32>,
        before: Option<api::contribution::list::Cursor>,
        ctx: &Context,
    ) -> Result<api::contribution::list::Connection, Error> {
        const DEFAULT_PAGE_SIZE: i32 = 20;

        let arguments = read::contribution::list::Arguments::new(
            first,
            after.map(Into::into),
            last,
            before.map(Into::into),
            DEFAULT_PAGE_SIZE,
        )
        .ok_or_else(|| api::PaginationError::Ambiguous.into())
        .map_err(ctx.error())?;

        _ = Self::pool(pool_id, ctx).await?;

        ctx.service()
            .execute(query::contributions::List::by(
                read::contribution::list::Selector {
                    arguments,
                    filter: read::contribution::list::Filter {
                        pool_id: pool_id.into(),
                    },
                },
            ))
            .await
            .map_err(AsError::into_error)
            .map_err(ctx.error())
            .map(Into::into)
    }
}

define_error! {
    enum PoolError {
        #[code = "POOL_NOT_FOUND"]
        #[status = NOT_FOUND]
        #[message = "`Pool` with the specified ID does not exist"]
        NotFound,
    }
}
