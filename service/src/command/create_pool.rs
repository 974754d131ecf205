//! [`Command`] for creating a new [`Pool`].

use common::{
    operations::{By, Commit, Insert, Select, Transact, Transacted},
    Money,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::{pool, user, Pool},
    infra::{
        catalog,
        database::{self, constraint},
        Catalog, Database,
    },
    Service,
};

use super::{retry, Command};

/// [`Command`] for creating a new [`Pool`].
#[derive(Clone, Debug)]
pub struct CreatePool {
    /// ID of the user the new [`Pool`] is funded for.
    pub owner_id: user::Id,

    /// [`pool::ProductHandle`] of the product to be funded.
    pub product_handle: pool::ProductHandle,

    /// Snapshot of the product to be funded.
    ///
    /// If [`None`], then it's looked up in the [`Catalog`].
    pub product: Option<pool::Product>,

    /// Amount to be raised.
    pub goal: Money,
}

impl<Db, Br, Ct> Command<CreatePool> for Service<Db, Br, Ct>
where
    Db: Database<
            Select<By<Option<Pool>, (user::Id, pool::ProductHandle)>>,
            Ok = Option<Pool>,
            Err = Traced<database::Error>,
        > + Database<Transact, Err = Traced<database::Error>>,
    Transacted<Db>: Database<Insert<Pool>, Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
    Ct: Catalog<
        Select<By<Option<pool::Product>, pool::ProductHandle>>,
        Ok = Option<pool::Product>,
        Err = Traced<catalog::Error>,
    >,
{
    type Ok = Pool;
    type Err = Traced<ExecutionError>;

    async fn execute(&self, cmd: CreatePool) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let CreatePool {
            owner_id,
            product_handle,
            product,
            goal,
        } = cmd;

        if !pool::is_valid_amount(&goal) {
            return Err(tracerr::new!(E::InvalidAmount(goal)));
        }

        let product = if let Some(p) = product {
            if p.handle != product_handle {
                return Err(tracerr::new!(E::ProductMismatch(product_handle)));
            }
            p
        } else {
            self.catalog()
                .execute(Select(By::new(product_handle.clone())))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?
                .ok_or_else(|| {
                    tracerr::new!(E::ProductNotFound(product_handle.clone()))
                })?
        };

        let db = self.database();
        let (product, handle) = (&product, &product_handle);
        let pool = retry::run(self.config().retry, || async move {
            let existing = db
                .execute(Select(By::new((owner_id, handle.clone()))))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?;
            if let Some(p) = existing {
                return Err(tracerr::new!(E::DuplicatePool(p.id)));
            }

            let pool = Pool::new(owner_id, product.clone(), goal);

            let tx = db
                .execute(Transact)
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?;
            if let Err(e) = tx.execute(Insert(pool.clone())).await {
                drop(tx);
                if e.as_ref()
                    .is_unique_violation(Some(constraint::ACTIVE_POOL_PER_PRODUCT))
                {
                    // Lost the race to a concurrent creation.
                    let existing = db
                        .execute(Select(By::new((owner_id, handle.clone()))))
                        .await
                        .map_err(tracerr::map_from_and_wrap!(=> E))?;
                    if let Some(p) = existing {
                        return Err(tracerr::new!(E::DuplicatePool(p.id)));
                    }
                }
                return Err(e).map_err(tracerr::map_from_and_wrap!(=> E));
            }
            tx.execute(Commit)
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))
                .map(drop)?;

            Ok::<_, Traced<E>>(pool)
        })
        .await?;

        log::info!(
            "`Pool({})` created for `{}` product of `User({owner_id})`",
            pool.id,
            pool.product.handle,
        );

        Ok(pool)
    }
}

/// Error of [`CreatePool`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Catalog`] lookup failed.
    #[display("`Catalog` lookup failed: {_0}")]
    #[from]
    Catalog(catalog::Error),

    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// Active [`Pool`] for the same product and owner already exists.
    #[display("Active `Pool({_0})` already exists")]
    DuplicatePool(#[error(not(source))] pool::Id),

    /// Goal is not positive or exceeds [`pool::MAX_AMOUNT`].
    #[display("`{_0}` is not a valid goal")]
    InvalidAmount(#[error(not(source))] Money),

    /// Provided [`pool::Product`] snapshot doesn't match the requested
    /// [`pool::ProductHandle`].
    #[display("`pool::Product` snapshot doesn't match `{_0}` handle")]
    ProductMismatch(#[error(not(source))] pool::ProductHandle),

    /// [`Catalog`] has no product with the requested
    /// [`pool::ProductHandle`].
    #[display("`{_0}` product is not found in `Catalog`")]
    ProductNotFound(#[error(not(source))] pool::ProductHandle),

    /// Storage stays unavailable after all the retries.
    #[display("Storage is unavailable")]
    StorageUnavailable,
}

impl retry::Transient for ExecutionError {
    fn unavailable() -> Self {
        Self::StorageUnavailable
    }

    fn is_transient(&self) -> bool {
        match self {
            // A concurrently created `Pool` is detected on the next attempt.
            Self::Db(e) => {
                e.is_transient()
                    || e.is_unique_violation(Some(
                        constraint::ACTIVE_POOL_PER_PRODUCT,
                    ))
            }
            Self::StorageUnavailable => true,
            Self::Catalog(_)
            | Self::DuplicatePool(_)
            | Self::InvalidAmount(_)
            | Self::ProductMismatch(_)
            | Self::ProductNotFound(_) => false,
        }
    }
}

#[cfg(test)]
mod spec {
    use common::{Currency, Money};
    use futures::future;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use crate::{
        domain::{pool, user},
        fixture,
        Command as _,
    };

    use super::{CreatePool, ExecutionError as E};

    fn create(owner_id: user::Id, goal: i64) -> CreatePool {
        CreatePool {
            owner_id,
            product_handle: fixture::handle(),
            product: None,
            goal: fixture::money(goal),
        }
    }

    #[tokio::test]
    async fn creates_pool_from_catalog() {
        let (svc, _) = fixture::service();

        let pool = svc
            .execute(create(user::Id::from(Uuid::new_v4()), 100_000))
            .await
            .unwrap();

        assert!(pool.is_active());
        assert_eq!(pool.current_amount, Decimal::ZERO);
        assert_eq!(pool.goal, fixture::money(100_000));
        assert_eq!(pool.product, fixture::product());
    }

    #[tokio::test]
    async fn uses_provided_snapshot() {
        let (svc, _) = fixture::service();
        let handle = pool::ProductHandle::new("not-in-catalog").unwrap();
        let product = pool::Product {
            handle: handle.clone(),
            ..fixture::product()
        };

        let pool = svc
            .execute(CreatePool {
                owner_id: user::Id::from(Uuid::new_v4()),
                product_handle: handle,
                product: Some(product.clone()),
                goal: fixture::money(10),
            })
            .await
            .unwrap();

        assert_eq!(pool.product, product);
    }

    #[tokio::test]
    async fn rejects_non_positive_goal() {
        let (svc, _) = fixture::service();
        let owner_id = user::Id::from(Uuid::new_v4());

        for goal in [0, -5] {
            let err = svc.execute(create(owner_id, goal)).await.unwrap_err();
            assert!(matches!(err.as_ref(), E::InvalidAmount(_)), "{err}");
        }
    }

    #[tokio::test]
    async fn rejects_too_large_goal() {
        let (svc, _) = fixture::service();
        let owner_id = user::Id::from(Uuid::new_v4());

        let err = svc
            .execute(CreatePool {
                goal: Money {
                    amount: pool::MAX_AMOUNT + Decimal::ONE,
                    currency: Currency::Cop,
                },
                ..create(owner_id, 1)
            })
            .await
            .unwrap_err();

        assert!(matches!(err.as_ref(), E::InvalidAmount(_)), "{err}");
    }

    #[tokio::test]
    async fn fails_on_unknown_product() {
        let (svc, _) = fixture::service();

        let err = svc
            .execute(CreatePool {
                product_handle: pool::ProductHandle::new("unknown").unwrap(),
                ..create(user::Id::from(Uuid::new_v4()), 10)
            })
            .await
            .unwrap_err();

        assert!(matches!(err.as_ref(), E::ProductNotFound(_)), "{err}");
    }

    #[tokio::test]
    async fn rejects_mismatched_snapshot() {
        let (svc, _) = fixture::service();

        let err = svc
            .execute(CreatePool {
                product_handle: pool::ProductHandle::new("other").unwrap(),
                product: Some(fixture::product()),
                ..create(user::Id::from(Uuid::new_v4()), 10)
            })
            .await
            .unwrap_err();

        assert!(matches!(err.as_ref(), E::ProductMismatch(_)), "{err}");
    }

    #[tokio::test]
    async fn rejects_duplicate_active_pool() {
        let (svc, _) = fixture::service();
        let owner_id = user::Id::from(Uuid::new_v4());
        let first = svc.execute(create(owner_id, 10)).await.unwrap();

        let err = svc.execute(create(owner_id, 20)).await.unwrap_err();

        assert!(
            matches!(err.as_ref(), E::DuplicatePool(id) if *id == first.id),
            "{err}",
        );
    }

    #[tokio::test]
    async fn allows_same_product_for_different_owners() {
        let (svc, _) = fixture::service();

        let first = svc
            .execute(create(user::Id::from(Uuid::new_v4()), 10))
            .await
            .unwrap();
        let second = svc
            .execute(create(user::Id::from(Uuid::new_v4()), 10))
            .await
            .unwrap();

        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn creates_single_pool_concurrently() {
        let (svc, db) = fixture::service();
        let owner_id = user::Id::from(Uuid::new_v4());

        let results = future::join_all(
            (0..10).map(|_| svc.execute(create(owner_id, 10))),
        )
        .await;

        let created = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(created, 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(matches!(err.as_ref(), E::DuplicatePool(_)), "{err}");
        }
        let active = fixture::active_pool(&db, owner_id).await;
        assert!(active.is_some());
    }

    #[tokio::test]
    async fn allows_new_pool_once_previous_completed() {
        let (svc, db) = fixture::service();
        let owner_id = user::Id::from(Uuid::new_v4());
        let first = svc.execute(create(owner_id, 10)).await.unwrap();
        fixture::contribute(&svc, first.id, 10).await.unwrap();

        let second = svc.execute(create(owner_id, 10)).await.unwrap();

        assert_ne!(first.id, second.id);
        let active = fixture::active_pool(&db, owner_id).await;
        assert_eq!(active.map(|p| p.id), Some(second.id));
    }

    #[tokio::test]
    async fn fails_once_storage_stays_unavailable() {
        let (svc, db) = fixture::service();
        db.fail_next(usize::MAX);

        let err = svc
            .execute(create(user::Id::from(Uuid::new_v4()), 10))
            .await
            .unwrap_err();

        assert!(matches!(err.as_ref(), E::StorageUnavailable), "{err}");
    }

    #[tokio::test]
    async fn keeps_goal_currency() {
        let (svc, _) = fixture::service();

        let pool = svc
            .execute(CreatePool {
                goal: Money {
                    amount: Decimal::from(25),
                    currency: Currency::Eur,
                },
                ..create(user::Id::from(Uuid::new_v4()), 1)
            })
            .await
            .unwrap();

        assert_eq!(pool.currency(), Currency::Eur);
    }
}
