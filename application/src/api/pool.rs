//! [`Pool`]-related definitions.

use std::future;

use common::{DateTime, Handler as _, Money, Percent};
use derive_more::{AsRef, Display, From, Into};
use futures::TryFutureExt as _;
use juniper::{graphql_object, GraphQLEnum, GraphQLInputObject, GraphQLScalar};
use service::{domain, query, read};
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::{api, api::scalar, AsError, Context, Error};

/// A group-funding pool.
#[derive(Clone, Debug)]
pub struct Pool {
    /// ID of this [`Pool`].
    id: Id,

    /// Underlying [`domain::Pool`].
    pool: OnceCell<domain::Pool>,
}

impl From<domain::Pool> for Pool {
    fn from(pool: domain::Pool) -> Self {
        Self {
            id: pool.id.into(),
            pool: OnceCell::new_with(Some(pool)),
        }
    }
}

impl Pool {
    /// Creates a new [`Pool`] with the provided ID.
    ///
    /// # Safety
    ///
    /// Caller must ensure that [`Pool`] with the provided ID exists,
    /// otherwise accessing this [`Pool`] will result with an error.
    #[expect(unsafe_code, reason = "bypass")]
    #[must_use]
    pub unsafe fn new_unchecked(id: impl Into<Id>) -> Self {
        Self {
            id: id.into(),
            pool: OnceCell::new(),
        }
    }

    /// Returns the underlying [`domain::Pool`].
    ///
    /// # Errors
    ///
    /// Errors if the [`domain::Pool`] doesn't exist.
    async fn pool(&self, ctx: &Context) -> Result<&domain::Pool, Error> {
        let id = self.id.into();
        self.pool
            .get_or_try_init(|| {
                ctx.service()
                    .execute(query::pool::ById::by(id))
                    .map_err(AsError::into_error)
                    .map_err(ctx.error())
                    .and_then(|p| {
                        future::ready(p.ok_or_else(|| {
                            api::query::PoolError::NotFound.into()
                        }))
                    })
            })
            .await
    }
}

/// A group-funding pool, raising money towards a single product.
#[graphql_object(context = Context)]
impl Pool {
    /// Unique identifier of this `Pool`.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "Pool.id",
            otel.name = api::Query::SPAN_NAME,
        ),
    )]
    pub fn id(&self) -> Id {
        self.id
    }

    /// ID of the user this `Pool` is funded for.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "Pool.ownerId",
            otel.name = api::Query::SPAN_NAME,
        ),
    )]
    pub async fn owner_id(&self, ctx: &Context) -> Result<api::UserId, Error> {
        Ok(self.pool(ctx).await?.owner_id.into())
    }

    /// Snapshot of the product being funded, taken at creation.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "Pool.product",
            otel.name = api::Query::SPAN_NAME,
        ),
    )]
    pub async fn product(&self, ctx: &Context) -> Result<Product, Error> {
        Ok(self.pool(ctx).await?.product.clone().into())
    }

    /// Amount to be raised.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "Pool.goal",
            otel.name = api::Query::SPAN_NAME,
        ),
    )]
    pub async fn goal(&self, ctx: &Context) -> Result<Money, Error> {
        Ok(self.pool(ctx).await?.goal)
    }

    /// Amount raised so far.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "Pool.currentAmount",
            otel.name = api::Query::SPAN_NAME,
        ),
    )]
    pub async fn current_amount(&self, ctx: &Context) -> Result<Money, Error> {
        Ok(self.pool(ctx).await?.current())
    }

    /// Raised share of the goal, saturated at `100`.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "Pool.percentage",
            otel.name = api::Query::SPAN_NAME,
        ),
    )]
    pub async fn percentage(&self, ctx: &Context) -> Result<Percent, Error> {
        Ok(self.pool(ctx).await?.percentage())
    }

    /// Status of this `Pool`.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "Pool.status",
            otel.name = api::Query::SPAN_NAME,
        ),
    )]
    pub async fn status(&self, ctx: &Context) -> Result<Status, Error> {
        Ok(self.pool(ctx).await?.status.into())
    }

    /// `DateTime` when this `Pool` was created.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "Pool.createdAt",
            otel.name = api::Query::SPAN_NAME,
        ),
    )]
    pub async fn created_at(&self, ctx: &Context) -> Result<DateTime, Error> {
        Ok(self.pool(ctx).await?.created_at.coerce())
    }

    /// `DateTime` when this `Pool` reached its goal, if it did.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "Pool.completedAt",
            otel.name = api::Query::SPAN_NAME,
        ),
    )]
    pub async fn completed_at(
        &self,
        ctx: &Context,
    ) -> Result<Option<DateTime>, Error> {
        Ok(self.pool(ctx).await?.completed_at.map(|at| at.coerce()))
    }

    /// Users contributed to this `Pool`, the most contributed first.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "Pool.participants",
            otel.name = api::Query::SPAN_NAME,
        ),
    )]
    pub async fn participants(
        &self,
        ctx: &Context,
    ) -> Result<Participants, Error> {
        ctx.service()
            .execute(query::pool::Participants::by(self.id.into()))
            .await
            .map_err(AsError::into_error)
            .map_err(ctx.error())
            .map(Into::into)
    }

    /// Sum of all the contributions made to this `Pool`, aggregated directly
    /// from its ledger.
    ///
    /// Always equals to the `currentAmount`.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "Pool.ledgerSum",
            otel.name = api::Query::SPAN_NAME,
        ),
    )]
    pub async fn ledger_sum(&self, ctx: &Context) -> Result<Money, Error> {
        let currency = self.pool(ctx).await?.currency();
        ctx.service()
            .execute(query::pool::LedgerSum::by(self.id.into()))
            .await
            .map_err(AsError::into_error)
            .map_err(ctx.error())
            .map(|sum| Money {
                amount: sum.into(),
                currency,
            })
    }
}

/// Unique identifier of a `Pool`.
#[derive(Clone, Copy, Debug, Display, Into, From, GraphQLScalar)]
#[from(domain::pool::Id)]
#[into(domain::pool::Id)]
#[graphql(name = "PoolId", transparent)]
pub struct Id(Uuid);

/// Handle of a product in the catalog.
#[derive(AsRef, Clone, Debug, Display, From, GraphQLScalar, Into)]
#[graphql(
    name = "ProductHandle",
    with = scalar::Via::<domain::pool::ProductHandle>,
)]
pub struct ProductHandle(domain::pool::ProductHandle);

/// Name of a product.
#[derive(AsRef, Clone, Debug, Display, From, GraphQLScalar, Into)]
#[graphql(
    name = "ProductName",
    with = scalar::Via::<domain::pool::ProductName>,
)]
pub struct ProductName(domain::pool::ProductName);

/// URL of a product image.
#[derive(AsRef, Clone, Debug, Display, From, GraphQLScalar, Into)]
#[graphql(
    name = "ProductImageUrl",
    with = scalar::Via::<domain::pool::ImageUrl>,
)]
pub struct ImageUrl(domain::pool::ImageUrl);

/// Snapshot of a product funded by a [`Pool`].
#[derive(Clone, Debug, From)]
pub struct Product(domain::pool::Product);

/// Snapshot of a product funded by a `Pool`.
#[graphql_object(context = Context)]
impl Product {
    /// Handle of this `Product` in the catalog.
    #[must_use]
    pub fn handle(&self) -> ProductHandle {
        self.0.handle.clone().into()
    }

    /// Name of this `Product`.
    #[must_use]
    pub fn name(&self) -> ProductName {
        self.0.name.clone().into()
    }

    /// Main image of this `Product`, if any.
    #[must_use]
    pub fn image_url(&self) -> Option<ImageUrl> {
        self.0.image_url.clone().map(Into::into)
    }

    /// Price of this `Product` at the moment the `Pool` was created.
    #[must_use]
    pub fn price(&self) -> Money {
        self.0.price
    }
}

/// Snapshot of a product to fund, bypassing the catalog lookup.
#[derive(Clone, Debug, GraphQLInputObject)]
#[graphql(name = "ProductInput")]
pub struct ProductInput {
    /// Name of the product.
    pub name: ProductName,

    /// Main image of the product, if any.
    pub image_url: Option<ImageUrl>,

    /// Current price of the product.
    pub price: Money,
}

impl ProductInput {
    /// Converts this [`ProductInput`] into a [`domain::pool::Product`] with
    /// the provided `handle`.
    #[must_use]
    pub fn into_domain(
        self,
        handle: domain::pool::ProductHandle,
    ) -> domain::pool::Product {
        let Self {
            name,
            image_url,
            price,
        } = self;
        domain::pool::Product {
            handle,
            name: name.into(),
            image_url: image_url.map(Into::into),
            price,
        }
    }
}

/// Status of a `Pool`.
#[derive(Clone, Copy, Debug, GraphQLEnum)]
#[graphql(name = "PoolStatus")]
pub enum Status {
    /// `Pool` accepts contributions.
    Active,

    /// `Pool` reached its goal and accepts nothing anymore.
    Completed,
}

impl From<domain::pool::Status> for Status {
    fn from(status: domain::pool::Status) -> Self {
        use domain::pool::Status as S;
        match status {
            S::Active => Self::Active,
            S::Completed => Self::Completed,
        }
    }
}

/// Point-in-time progress of a [`Pool`] towards its goal.
#[derive(Clone, Copy, Debug, From)]
pub struct Progress(read::pool::Progress);

/// Point-in-time progress of a `Pool` towards its goal.
#[graphql_object(name = "PoolProgress", context = Context)]
impl Progress {
    /// ID of the `Pool`.
    #[must_use]
    pub fn pool_id(&self) -> Id {
        self.0.pool_id.into()
    }

    /// Amount raised so far.
    #[must_use]
    pub fn current_amount(&self) -> Money {
        self.0.current
    }

    /// Amount to be raised.
    #[must_use]
    pub fn goal(&self) -> Money {
        self.0.goal
    }

    /// Raised share of the goal, saturated at `100`.
    #[must_use]
    pub fn percentage(&self) -> Percent {
        self.0.percentage
    }

    /// Status of the `Pool`.
    #[must_use]
    pub fn status(&self) -> Status {
        self.0.status.into()
    }
}

/// Users contributed to a [`Pool`].
#[derive(Clone, Debug, From)]
pub struct Participants(read::pool::Participants);

/// Users contributed to a `Pool`.
#[graphql_object(name = "PoolParticipants", context = Context)]
impl Participants {
    /// Number of distinct users contributed.
    #[must_use]
    pub fn count(&self) -> i32 {
        i32::try_from(self.0.count()).unwrap_or(i32::MAX)
    }

    /// Contributors, the most contributed first.
    #[must_use]
    pub fn contributors(&self) -> Vec<Contributor> {
        self.0.contributors.iter().copied().map(Into::into).collect()
    }
}

/// Summary of a single user contributions to a [`Pool`].
#[derive(Clone, Copy, Debug, From)]
pub struct Contributor(read::pool::Contributor);

/// Summary of a single user contributions to a `Pool`.
#[graphql_object(name = "PoolContributor", context = Context)]
impl Contributor {
    /// ID of the contributed user.
    #[must_use]
    pub fn user_id(&self) -> api::UserId {
        self.0.user_id.into()
    }

    /// Total amount contributed by the user.
    #[must_use]
    pub fn total(&self) -> Money {
        self.0.total
    }

    /// Number of contributions made by the user.
    #[must_use]
    pub fn contributions(&self) -> i32 {
        i32::try_from(self.0.contributions).unwrap_or(i32::MAX)
    }

    /// `DateTime` of the latest contribution made by the user.
    #[must_use]
    pub fn last_contributed_at(&self) -> DateTime {
        self.0.last_contributed_at.coerce()
    }
}

pub mod list {
    //! Definitions related to the [`Pool`] list.

    use derive_more::{AsRef, From, Into};
    use juniper::{graphql_object, GraphQLScalar};
    use service::{query, read, Query as _};

    use super::{Id, Pool};
    use crate::{api::scalar, AsError, Context, Error};

    /// Cursor for the `Pool` list.
    #[derive(AsRef, Clone, Copy, Debug, From, GraphQLScalar, Into)]
    #[from(Id, read::pool::list::Cursor)]
    #[graphql(
        name = "PoolListCursor",
        with = scalar::Via::<read::pool::list::Cursor>,
    )]
    pub struct Cursor(pub read::pool::list::Cursor);

    /// Edge in the [`Pool`] list.
    #[derive(Clone, Copy, Debug, From, Into)]
    pub struct Edge(read::pool::list::Edge);

    /// Edge in the `Pool` list.
    #[graphql_object(name = "PoolListEdge", context = Context)]
    impl Edge {
        /// Cursor of this `PoolListEdge`.
        #[must_use]
        pub fn cursor(&self) -> Cursor {
            self.0.cursor.into()
        }

        /// Node of this `PoolListEdge`.
        #[must_use]
        pub fn node(&self) -> Pool {
            #[expect(
                unsafe_code,
                reason = "`Edge` loaded from repository guarantees `Pool` \
                          existence"
            )]
            unsafe {
                Pool::new_unchecked(self.0.node)
            }
        }
    }

    /// Connection of the [`Pool`] list.
    #[derive(Clone, Debug, From, Into)]
    pub struct Connection {
        /// Underlying [`read::pool::list::Connection`].
        connection: read::pool::list::Connection,

        /// [`read::pool::list::Filter`] the list was selected with.
        filter: read::pool::list::Filter,
    }

    /// Connection of the `Pool` list.
    #[graphql_object(name = "PoolListConnection", context = Context)]
    impl Connection {
        /// Edges of this `PoolListConnection`.
        #[must_use]
        pub fn edges(&self) -> Vec<Edge> {
            self.connection.edges.iter().copied().map(Into::into).collect()
        }

        /// Information about the page.
        #[must_use]
        pub fn page_info(&self) -> PageInfo {
            PageInfo {
                info: self.connection.page_info(),
                start_cursor: self
                    .connection
                    .edges
                    .first()
                    .map(|e| e.cursor.into()),
                end_cursor: self.connection.edges.last().map(|e| e.cursor.into()),
                filter: self.filter,
            }
        }
    }

    /// Information about a [`Connection`] page.
    #[derive(Clone, Copy, Debug)]
    pub struct PageInfo {
        /// Underlying [`read::pool::list::PageInfo`].
        info: read::pool::list::PageInfo,

        /// Start cursor of the page.
        start_cursor: Option<Cursor>,

        /// End cursor of the page.
        end_cursor: Option<Cursor>,

        /// [`read::pool::list::Filter`] the list was selected with.
        filter: read::pool::list::Filter,
    }

    /// Information about a `PoolListConnection` page.
    #[graphql_object(name = "PoolListPageInfo", context = Context)]
    impl PageInfo {
        /// Indicator whether there is a next page.
        #[must_use]
        pub fn has_next_page(&self) -> bool {
            self.info.has_next_page
        }

        /// Indicator whether there is a previous page.
        #[must_use]
        pub fn has_previous_page(&self) -> bool {
            self.info.has_previous_page
        }

        /// Start cursor of the page.
        #[must_use]
        pub fn start_cursor(&self) -> &Option<Cursor> {
            &self.start_cursor
        }

        /// End cursor of the page.
        #[must_use]
        pub fn end_cursor(&self) -> &Option<Cursor> {
            &self.end_cursor
        }

        /// Total count of the active `Pool`s.
        pub async fn total_count(&self, ctx: &Context) -> Result<i32, Error> {
            ctx.service()
                .execute(query::pools::TotalCount::by(self.filter))
                .await
                .map_err(AsError::into_error)
                .map_err(ctx.error())
                .map(Into::into)
        }
    }
}
