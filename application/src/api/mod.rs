//! GraphQL API definitions.

pub mod contribution;
mod mutation;
pub mod pool;
mod query;
pub mod scalar;
mod subscription;
pub mod user;

use crate::define_error;

pub use self::{
    contribution::Contribution, mutation::Mutation, pool::Pool, query::Query,
    subscription::Subscription, user::Id as UserId,
};

/// GraphQL schema.
pub type Schema = juniper::RootNode<'static, Query, Mutation, Subscription>;

define_error! {
    enum PaginationError {
        #[code = "AMBIGUOUS_PAGINATION_ARGUMENTS"]
        #[status = BAD_REQUEST]
        #[message = "Ambiguous pagination arguments"]
        Ambiguous,
    }
}
