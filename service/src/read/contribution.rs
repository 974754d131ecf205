//! [`Contribution`]-related read definitions.

use derive_more::{Deref, From, Into};
use rust_decimal::Decimal;

#[cfg(doc)]
use crate::domain::{Contribution, Pool};

/// Sum of all the [`Contribution`]s made to a [`Pool`], aggregated directly
/// from the ledger.
#[derive(Clone, Copy, Debug, Deref, Eq, From, Into, PartialEq)]
pub struct LedgerSum(pub Decimal);

pub mod list {
    //! [`Contribution`]s list definitions.

    use common::define_pagination;

    use crate::domain::{contribution, pool, Contribution};

    define_pagination!(Cursor, Node, Filter);

    /// Node in a [`Connection`].
    pub type Node = Contribution;

    /// Cursor pointing to a specific [`Contribution`] in a list.
    pub type Cursor = contribution::Id;

    /// Filter for [`Selector`].
    ///
    /// [`Contribution`]s are listed in the order they were made.
    #[derive(Clone, Copy, Debug)]
    pub struct Filter {
        /// ID of the [`Pool`] to list [`Contribution`]s of.
        ///
        /// [`Pool`]: crate::domain::Pool
        pub pool_id: pool::Id,
    }
}
