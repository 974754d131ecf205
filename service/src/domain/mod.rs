//! Domain definitions.

pub mod contribution;
pub mod pool;
pub mod user;

pub use self::{contribution::Contribution, pool::Pool};
