//! [`Pool`]-related read definitions.

use common::{Money, Percent};
use rust_decimal::Decimal;

use crate::domain::{contribution, pool, user, Pool};

/// Point-in-time view of a [`Pool`] progress towards its goal.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Progress {
    /// ID of the [`Pool`].
    pub pool_id: pool::Id,

    /// Amount raised so far.
    pub current: Money,

    /// Amount to be raised.
    pub goal: Money,

    /// [`Percent`] of the goal raised so far.
    pub percentage: Percent,

    /// [`pool::Status`] of the [`Pool`].
    pub status: pool::Status,
}

impl Progress {
    /// Indicates whether this [`Progress`] reflects a later state of the same
    /// [`Pool`] than the `other` one does.
    ///
    /// Raised amounts strictly grow with every contribution, so they order
    /// [`Progress`]es of a [`Pool`] unambiguously.
    #[must_use]
    pub fn is_newer_than(&self, other: &Self) -> bool {
        self.pool_id == other.pool_id
            && self.current.amount > other.current.amount
    }
}

impl From<&Pool> for Progress {
    fn from(pool: &Pool) -> Self {
        Self {
            pool_id: pool.id,
            current: pool.current(),
            goal: pool.goal,
            percentage: pool.percentage(),
            status: pool.status,
        }
    }
}

/// Users participating in a [`Pool`].
#[derive(Clone, Debug, Default)]
pub struct Participants {
    /// [`Contributor`]s of the [`Pool`], the most contributed first.
    pub contributors: Vec<Contributor>,
}

impl Participants {
    /// Returns the number of distinct users contributed to the [`Pool`].
    #[must_use]
    pub fn count(&self) -> usize {
        self.contributors.len()
    }
}

/// Summary of a single user contributions to a [`Pool`].
#[derive(Clone, Copy, Debug)]
pub struct Contributor {
    /// ID of the contributed user.
    pub user_id: user::Id,

    /// Total amount contributed by the user.
    pub total: Money,

    /// Number of contributions made by the user.
    pub contributions: u32,

    /// Time of the user's latest contribution.
    pub last_contributed_at: contribution::CreationDateTime,
}

/// [`Pool`] whose stored aggregates disagree with its contributions ledger.
#[derive(Clone, Copy, Debug)]
pub struct Discrepancy {
    /// ID of the [`Pool`].
    pub pool_id: pool::Id,

    /// Raised amount stored in the [`Pool`].
    pub current_amount: Decimal,

    /// Sum of all the contributions made to the [`Pool`].
    pub ledger_amount: Decimal,

    /// Goal amount of the [`Pool`].
    pub goal_amount: Decimal,

    /// [`pool::Status`] stored in the [`Pool`].
    pub status: pool::Status,
}

pub mod list {
    //! [`Pool`]s list definitions.

    use common::define_pagination;
    use derive_more::{From, Into};

    use crate::domain::{pool, user};
    #[cfg(doc)]
    use crate::domain::Pool;

    define_pagination!(Cursor, Node, Filter);

    /// Node in a [`Connection`].
    pub type Node = pool::Id;

    /// Cursor pointing to a specific [`Pool`] in a list.
    pub type Cursor = pool::Id;

    /// Filter for [`Selector`].
    ///
    /// Only [`pool::Status::Active`] [`Pool`]s are ever listed, the most
    /// recently created first.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct Filter {
        /// ID of the user to list [`Pool`]s funded for.
        pub owner_id: Option<user::Id>,
    }

    /// Total count of [`Pool`] list items.
    #[derive(Clone, Copy, Debug, Eq, From, Hash, Into, PartialEq)]
    pub struct TotalCount(i32);
}
