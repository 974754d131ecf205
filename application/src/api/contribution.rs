//! [`Contribution`]-related definitions.

use common::{DateTime, Money, Percent};
use derive_more::{AsRef, Display, From, Into};
use juniper::{graphql_object, GraphQLScalar};
use service::{command, domain};
use uuid::Uuid;

use crate::{api, api::scalar, Context};

/// Money pledged by a single user towards a [`api::Pool`] goal.
#[derive(Clone, Debug, From)]
pub struct Contribution(domain::Contribution);

/// Money pledged by a single user towards a `Pool` goal.
#[graphql_object(context = Context)]
impl Contribution {
    /// Unique identifier of this `Contribution`.
    #[must_use]
    pub fn id(&self) -> Id {
        self.0.id.into()
    }

    /// `Pool` this `Contribution` is made to.
    #[must_use]
    pub fn pool(&self) -> api::Pool {
        #[expect(
            unsafe_code,
            reason = "`Contribution` cannot exist without its `Pool`"
        )]
        unsafe {
            api::Pool::new_unchecked(self.0.pool_id)
        }
    }

    /// ID of the user made this `Contribution`.
    #[must_use]
    pub fn contributor_id(&self) -> api::UserId {
        self.0.contributor_id.into()
    }

    /// Contributed amount.
    #[must_use]
    pub fn amount(&self) -> Money {
        self.0.amount
    }

    /// `RequestToken` this `Contribution` was made with, if any.
    #[must_use]
    pub fn request_token(&self) -> Option<RequestToken> {
        self.0.request_token.clone().map(Into::into)
    }

    /// `DateTime` when this `Contribution` was made.
    #[must_use]
    pub fn created_at(&self) -> DateTime {
        self.0.created_at.coerce()
    }
}

/// Unique identifier of a `Contribution`.
#[derive(Clone, Copy, Debug, Display, Into, From, GraphQLScalar)]
#[from(domain::contribution::Id)]
#[into(domain::contribution::Id)]
#[graphql(name = "ContributionId", transparent)]
pub struct Id(Uuid);

/// Client-supplied token making `Contribution` requests idempotent within a
/// single `Pool`.
#[derive(AsRef, Clone, Debug, Display, From, GraphQLScalar, Into)]
#[graphql(
    name = "ContributionRequestToken",
    with = scalar::Via::<domain::contribution::RequestToken>,
)]
pub struct RequestToken(domain::contribution::RequestToken);

/// Outcome of an accepted `Contribution`.
#[derive(Clone, Debug, From)]
pub struct ContributionResult(command::ContributionResult);

/// Outcome of an accepted `Contribution`, along with the `Pool` progress right
/// after it.
#[graphql_object(context = Context)]
impl ContributionResult {
    /// ID of the `Pool` the `Contribution` is made to.
    #[must_use]
    pub fn pool_id(&self) -> api::pool::Id {
        self.0.progress.pool_id.into()
    }

    /// ID of the made `Contribution`.
    #[must_use]
    pub fn contribution_id(&self) -> Id {
        self.0.contribution.id.into()
    }

    /// The made `Contribution`.
    #[must_use]
    pub fn contribution(&self) -> Contribution {
        self.0.contribution.clone().into()
    }

    /// Amount raised by the `Pool` right after the `Contribution`.
    #[must_use]
    pub fn current_amount(&self) -> Money {
        self.0.progress.current
    }

    /// Amount to be raised by the `Pool`.
    #[must_use]
    pub fn goal(&self) -> Money {
        self.0.progress.goal
    }

    /// Raised share of the `Pool` goal, saturated at `100`.
    #[must_use]
    pub fn percentage(&self) -> Percent {
        self.0.progress.percentage
    }

    /// Status of the `Pool` right after the `Contribution`.
    #[must_use]
    pub fn status(&self) -> api::pool::Status {
        self.0.progress.status.into()
    }
}

pub mod list {
    //! Definitions related to the [`Contribution`] list.

    use derive_more::{AsRef, From, Into};
    use juniper::{graphql_object, GraphQLScalar};
    use service::read;

    use super::{Contribution, Id};
    use crate::{api::scalar, Context};

    /// Cursor for the `Contribution` list.
    #[derive(AsRef, Clone, Copy, Debug, From, GraphQLScalar, Into)]
    #[from(Id, read::contribution::list::Cursor)]
    #[graphql(
        name = "ContributionListCursor",
        with = scalar::Via::<read::contribution::list::Cursor>,
    )]
    pub struct Cursor(pub read::contribution::list::Cursor);

    /// Edge in the [`Contribution`] list.
    #[derive(Clone, Debug, From, Into)]
    pub struct Edge(read::contribution::list::Edge);

    /// Edge in the `Contribution` list.
    #[graphql_object(name = "ContributionListEdge", context = Context)]
    impl Edge {
        /// Cursor of this `ContributionListEdge`.
        #[must_use]
        pub fn cursor(&self) -> Cursor {
            self.0.cursor.into()
        }

        /// Node of this `ContributionListEdge`.
        #[must_use]
        pub fn node(&self) -> Contribution {
            self.0.node.clone().into()
        }
    }

    /// Connection of the [`Contribution`] list.
    #[derive(Clone, Debug, From, Into)]
    pub struct Connection(read::contribution::list::Connection);

    /// Connection of the `Contribution` list.
    #[graphql_object(name = "ContributionListConnection", context = Context)]
    impl Connection {
        /// Edges of this `ContributionListConnection`.
        #[must_use]
        pub fn edges(&self) -> Vec<Edge> {
            self.0.edges.iter().cloned().map(Into::into).collect()
        }

        /// Information about the page.
        #[must_use]
        pub fn page_info(&self) -> PageInfo {
            PageInfo {
                info: self.0.page_info(),
                start_cursor: self.0.edges.first().map(|e| e.cursor.into()),
                end_cursor: self.0.edges.last().map(|e| e.cursor.into()),
            }
        }
    }

    /// Information about a [`Connection`] page.
    #[derive(Clone, Copy, Debug)]
    pub struct PageInfo {
        /// Underlying [`read::contribution::list::PageInfo`].
        info: read::contribution::list::PageInfo,

        /// Start cursor of the page.
        start_cursor: Option<Cursor>,

        /// End cursor of the page.
        end_cursor: Option<Cursor>,
    }

    /// Information about a `ContributionListConnection` page.
    #[graphql_object(name = "ContributionListPageInfo", context = Context)]
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
    }
}
