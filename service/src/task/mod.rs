//! Background [`Task`]s definitions.

mod background;
pub mod reconcile_pools;

pub use common::Handler as Task;

pub use self::{
    background::{Background, TaskError},
    reconcile_pools::ReconcilePools,
};
