//! Shared helpers of [`Service`] tests.

use std::time::Duration;

use common::{
    operations::{By, Select},
    Currency, Money,
};
use rust_decimal::Decimal;
use tracerr::Traced;
use uuid::Uuid;

use crate::{
    command::{self, contribute, retry, Contribute, ContributionResult},
    domain::{pool, user, Pool},
    infra::{broadcast, catalog, database::Memory, Database as _},
    read, Command as _, Config, Service,
};

/// [`Service`] backed by in-memory infrastructure.
pub(crate) type TestService =
    Service<Memory, broadcast::InProcess, catalog::Memory>;

/// Creates a new [`TestService`] with its [`Catalog`] containing
/// [`product()`] only.
///
/// [`Catalog`]: crate::infra::Catalog
pub(crate) fn service() -> (TestService, Memory) {
    let db = Memory::new();
    let svc = Service {
        config: Config {
            retry: retry::Policy {
                attempts: 3,
                backoff: Duration::from_millis(1),
                timeout: Duration::from_secs(5),
            },
            ..Config::default()
        },
        database: db.clone(),
        broadcaster: broadcast::InProcess::new(16),
        catalog: catalog::Memory::new([product()]),
    };
    (svc, db)
}

pub(crate) fn handle() -> pool::ProductHandle {
    pool::ProductHandle::new("air-fryer-xl").unwrap()
}

pub(crate) fn money(amount: i64) -> Money {
    Money {
        amount: Decimal::from(amount),
        currency: Currency::Cop,
    }
}

pub(crate) fn product() -> pool::Product {
    pool::Product {
        handle: handle(),
        name: pool::ProductName::new("Air Fryer XL").unwrap(),
        image_url: pool::ImageUrl::new("https://cdn.shopify.com/fryer.png"),
        price: money(459_900),
    }
}

/// Creates a new [`Pool`] of [`product()`] for a random owner.
pub(crate) async fn pool(svc: &TestService, goal: i64) -> Pool {
    svc.execute(command::CreatePool {
        owner_id: user::Id::from(Uuid::new_v4()),
        product_handle: handle(),
        product: None,
        goal: money(goal),
    })
    .await
    .unwrap()
}

/// Contributes the provided `amount` to the [`Pool`] by a random user.
pub(crate) async fn contribute(
    svc: &TestService,
    pool_id: pool::Id,
    amount: i64,
) -> Result<ContributionResult, Traced<contribute::ExecutionError>> {
    svc.execute(Contribute {
        pool_id,
        contributor_id: user::Id::from(Uuid::new_v4()),
        amount: money(amount),
        request_token: None,
    })
    .await
}

/// Returns the active [`Pool`] of [`product()`] owned by the provided user.
pub(crate) async fn active_pool(db: &Memory, owner_id: user::Id) -> Option<Pool> {
    db.execute(Select(By::<Option<Pool>, _>::new((owner_id, handle()))))
        .await
        .unwrap()
}

/// Returns the stored [`Pool`] with the provided ID.
pub(crate) async fn stored_pool(db: &Memory, id: pool::Id) -> Pool {
    db.execute(Select(By::<Option<Pool>, _>::new(id)))
        .await
        .unwrap()
        .unwrap()
}

/// Returns the sum of all the contributions made to the [`Pool`] with the
/// provided ID.
pub(crate) async fn ledger_sum(db: &Memory, pool_id: pool::Id) -> Decimal {
    db.execute(Select(By::<read::contribution::LedgerSum, _>::new(pool_id)))
        .await
        .unwrap()
        .0
}
