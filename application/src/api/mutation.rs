//! GraphQL [`Mutation`]s definitions.

use common::Money;
use juniper::graphql_object;
use service::{command, domain::pool, Command as _};

use crate::{api, define_error, error::StorageError, AsError, Context, Error};

/// Root of all GraphQL mutations.
#[derive(Clone, Copy, Debug)]
pub struct Mutation;

impl Mutation {
    /// Name of the [`tracing::Span`] for the mutations.
    const SPAN_NAME: &'static str = "GraphQL mutation";
}

#[graphql_object(context = Context)]
impl Mutation {
    /// Creates a new active `Pool` funding the specified product for the
    /// specified user.
    ///
    /// If no `product` snapshot is provided, it's looked up in the product
    /// catalog by the `productHandle`.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `INVALID_AMOUNT` - the `goal` is not positive or is too large;
    /// - `DUPLICATE_POOL` - the user already has an active `Pool` for the
    ///                      same product;
    /// - `CATALOG_LOOKUP_FAILED` - the product cannot be found in the
    ///                             catalog;
    /// - `INVALID_PRODUCT` - the provided `product` snapshot is invalid;
    /// - `STORAGE_UNAVAILABLE` - the storage is temporarily unavailable.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "createPool",
            goal = %goal,
            otel.name = Self::SPAN_NAME,
            owner_id = %owner_id,
            product_handle = %product_handle,
        ),
    )]
    pub async fn create_pool(
        owner_id: api::UserId,
        product_handle: api::pool::ProductHandle,
        goal: Money,
        product: Option<api::pool::ProductInput>,
        ctx: &Context,
    ) -> Result<api::Pool, Error> {
        let product_handle: pool::ProductHandle = product_handle.into();
        ctx.service()
            .execute(command::CreatePool {
                owner_id: owner_id.into(),
                product: product.map(|p| p.into_domain(product_handle.clone())),
                product_handle,
                goal,
            })
            .await
            .map_err(AsError::into_error)
            .map_err(ctx.error())
            .map(Into::into)
    }

    /// Contributes the specified `amount` to the specified `Pool`.
    ///
    /// Repeating the request with the same `requestToken` returns the already
    /// made `Contribution` instead of making a new one.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `INVALID_AMOUNT` - the `amount` is not positive or is too large;
    /// - `POOL_NOT_FOUND` - the `Pool` with the specified ID does not exist;
    /// - `POOL_NOT_ACTIVE` - the `Pool` has already reached its goal;
    /// - `CURRENCY_MISMATCH` - the `amount` currency differs from the `Pool`
    ///                         one;
    /// - `STORAGE_UNAVAILABLE` - the storage is temporarily unavailable.
    #[tracing::instrument(
        skip_all,
        fields(
            amount = %amount,
            contributor_id = %contributor_id,
            gql.name = "contribute",
            otel.name = Self::SPAN_NAME,
            pool_id = %pool_id,
            request_token = ?request_token.as_ref().map(ToString::to_string),
        ),
    )]
    pub async fn contribute(
        pool_id: api::pool::Id,
        contributor_id: api::UserId,
        amount: Money,
        request_token: Option<api::contribution::RequestToken>,
        ctx: &Context,
    ) -> Result<api::contribution::ContributionResult, Error> {
        ctx.service()
            .execute(command::Contribute {
                pool_id: pool_id.into(),
                contributor_id: contributor_id.into(),
                amount,
                request_token: request_token.map(Into::into),
            })
            .await
            .map_err(AsError::into_error)
            .map_err(ctx.error())
            .map(Into::into)
    }
}

define_error! {
    enum AmountError {
        #[code = "INVALID_AMOUNT"]
        #[status = BAD_REQUEST]
        #[message = "Amount must be positive and not exceed 10^15"]
        Invalid,
    }
}

impl AsError for command::create_pool::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        define_error! {
            enum Error {
                #[code = "DUPLICATE_POOL"]
                #[status = CONFLICT]
                #[message = "Active `Pool` for the same product already \
                             exists"]
                DuplicatePool,

                #[code = "CATALOG_LOOKUP_FAILED"]
                #[status = NOT_FOUND]
                #[message = "Product is not found in the catalog"]
                ProductNotFound,

                #[code = "INVALID_PRODUCT"]
                #[status = BAD_REQUEST]
                #[message = "Product snapshot doesn't match `productHandle`"]
                ProductMismatch,
            }
        }

        match self {
            Self::Catalog(e) => e.try_as_error(),
            Self::Db(e) => e.try_as_error(),
            Self::DuplicatePool(_) => Some(Error::DuplicatePool.into()),
            Self::InvalidAmount(_) => Some(AmountError::Invalid.into()),
            Self::ProductMismatch(_) => Some(Error::ProductMismatch.into()),
            Self::ProductNotFound(_) => Some(Error::ProductNotFound.into()),
            Self::StorageUnavailable => Some(StorageError::Unavailable.into()),
        }
    }
}

impl AsError for command::contribute::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        define_error! {
            enum Error {
                #[code = "POOL_NOT_ACTIVE"]
                #[status = CONFLICT]
                #[message = "`Pool` has already reached its goal"]
                PoolNotActive,

                #[code = "CURRENCY_MISMATCH"]
                #[status = BAD_REQUEST]
                #[message = "Currency differs from the `Pool` one"]
                CurrencyMismatch,
            }
        }

        match self {
            Self::CurrencyMismatch { .. } => {
                Some(Error::CurrencyMismatch.into())
            }
            Self::Db(e) => e.try_as_error(),
            Self::InvalidAmount(_) => Some(AmountError::Invalid.into()),
            Self::PoolNotActive(_) => Some(Error::PoolNotActive.into()),
            Self::PoolNotFound(_) => {
                Some(api::query::PoolError::NotFound.into())
            }
            Self::StorageUnavailable => Some(StorageError::Unavailable.into()),
        }
    }
}
