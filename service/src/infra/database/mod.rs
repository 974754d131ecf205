//! [`Database`]-related implementations.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use derive_more::{Display, Error as StdError, From};

#[cfg(feature = "postgres")]
pub use self::postgres::Postgres;
pub use self::memory::Memory;

/// Database operation.
pub use common::Handler as Database;

/// Names of the storage constraints the service relies on.
pub mod constraint {
    /// At most one [`Active`] pool may exist per owner and product.
    ///
    /// [`Active`]: crate::domain::pool::Status::Active
    pub const ACTIVE_POOL_PER_PRODUCT: &str = "pools_active_owner_product_idx";

    /// Request token of a contribution is unique in scope of its pool.
    pub const CONTRIBUTION_REQUEST_TOKEN: &str =
        "contributions_pool_request_token_idx";
}

/// [`Database`] error.
#[derive(Debug, Display, From, StdError)]
pub enum Error {
    #[cfg(feature = "postgres")]
    /// [`Postgres`] error.
    Postgres(postgres::Error),

    /// [`Memory`] error.
    Memory(memory::Error),
}

impl Error {
    /// Indicates whether the operation failed due to a temporary condition
    /// and may succeed if retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(e) => e.is_transient(),
            Self::Memory(e) => e.is_transient(),
        }
    }

    /// Checks if the error is a unique violation of the specified constraint.
    #[must_use]
    pub fn is_unique_violation(&self, constraint: Option<&str>) -> bool {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(e) => e.is_unique_violation(constraint),
            Self::Memory(e) => e.is_unique_violation(constraint),
        }
    }
}
