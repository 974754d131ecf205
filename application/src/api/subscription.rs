//! GraphQL [`Subscription`]s definitions.

use futures::{stream::BoxStream, StreamExt as _};
use juniper::graphql_subscription;
use service::{query, Query as _};

use crate::{api, AsError, Context, Error};

/// Root of all GraphQL subscription.
#[derive(Clone, Copy, Debug)]
pub struct Subscription;

impl Subscription {
    /// Name of the [`tracing::Span`] for the subscriptions.
    const SPAN_NAME: &'static str = "GraphQL subscription";
}

#[graphql_subscription(context = Context)]
impl Subscription {
    /// Subscribes to the progress of the specified `Pool`.
    ///
    /// Starts with the current `PoolProgress`, and then yields every newer one
    /// as contributions are accepted. Stays open after the `Pool` completes.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `POOL_NOT_FOUND` - the `Pool` with the specified ID does not exist.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "poolProgress",
            otel.name = Self::SPAN_NAME,
            pool_id = %pool_id,
        ),
    )]
    pub async fn pool_progress(
        pool_id: api::pool::Id,
        ctx: &Context,
    ) -> Result<BoxStream<'static, Result<api::pool::Progress, Error>>, Error>
    {
        let updates = ctx
            .service()
            .execute(query::pool::Progress {
                pool_id: pool_id.into(),
            })
            .await
            .map_err(AsError::into_error)
            .map_err(ctx.error())?;

        Ok(updates.map(|p| Ok(p.into())).boxed())
    }
}

impl AsError for query::pool::ProgressError {
    fn try_as_error(&self) -> Option<Error> {
        match self {
            Self::Db(e) => e.try_as_error(),
            Self::PoolNotFound(_) => {
                Some(api::query::PoolError::NotFound.into())
            }
        }
    }
}
