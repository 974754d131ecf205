//! [`Command`] definition.

pub mod contribute;
pub mod create_pool;
pub mod retry;

/// [`Command`] of the [`Service`].
///
/// [`Service`]: crate::Service
pub use common::Handler as Command;

pub use self::{
    contribute::{Contribute, ContributionResult},
    create_pool::CreatePool,
};
