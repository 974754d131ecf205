//! Infrastructure layer.

pub mod broadcast;
pub mod catalog;
pub mod database;

pub use self::{broadcast::Broadcaster, catalog::Catalog, database::Database};
#[cfg(feature = "postgres")]
pub use self::database::{postgres, Postgres};
