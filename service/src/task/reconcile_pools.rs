//! [`ReconcilePools`] [`Task`].

use std::{convert::Infallible, error::Error, time};

use common::operations::{By, Perform, Select, Start};
use smart_default::SmartDefault;
use tokio::time::interval;
use tracerr::Traced;
use tracing as log;

#[cfg(doc)]
use crate::domain::{Contribution, Pool};
use crate::{
    infra::{database, Database},
    read, Service,
};

use super::Task;

/// Configuration for [`ReconcilePools`] [`Task`].
#[derive(Clone, Copy, Debug, SmartDefault)]
pub struct Config {
    /// Interval between [`Pool`]s reconciliations.
    #[default(time::Duration::from_secs(300))]
    pub interval: time::Duration,
}

/// [`Task`] verifying that every [`Pool`] agrees with its [`Contribution`]s
/// ledger.
///
/// Discrepancies are only reported, never repaired.
#[derive(Clone, Copy, Debug)]
pub struct ReconcilePools<S> {
    /// [`Config`] of this [`Task`].
    config: Config,

    /// [`Service`] instance.
    service: S,
}

impl<Db, Br, Ct> Task<Start<By<ReconcilePools<Self>, Config>>>
    for Service<Db, Br, Ct>
where
    ReconcilePools<Service<Db, Br, Ct>>:
        Task<Perform<()>, Ok = Vec<read::pool::Discrepancy>, Err: Error>,
    Self: Clone,
{
    type Ok = ();
    type Err = Infallible;

    async fn execute(
        &self,
        Start(by): Start<By<ReconcilePools<Self>, Config>>,
    ) -> Result<Self::Ok, Self::Err> {
        let config = by.into_inner();
        let task = ReconcilePools {
            config,
            service: self.clone(),
        };

        let mut interval = interval(task.config.interval);
        loop {
            let _ = interval.tick().await;
            match task.execute(Perform(())).await {
                Ok(discrepancies) => {
                    for d in discrepancies {
                        log::error!(
                            pool_id = %d.pool_id,
                            current_amount = %d.current_amount,
                            ledger_amount = %d.ledger_amount,
                            goal_amount = %d.goal_amount,
                            status = %d.status,
                            "`Pool` disagrees with its contributions ledger",
                        );
                    }
                }
                Err(e) => {
                    log::error!("`task::ReconcilePools` failed: {e}");
                }
            }
        }
    }
}

impl<Db, Br, Ct> Task<Perform<()>> for ReconcilePools<Service<Db, Br, Ct>>
where
    Db: Database<
        Select<By<Vec<read::pool::Discrepancy>, ()>>,
        Ok = Vec<read::pool::Discrepancy>,
        Err = Traced<database::Error>,
    >,
{
    type Ok = Vec<read::pool::Discrepancy>;
    type Err = ExecutionError;

    async fn execute(&self, _: Perform<()>) -> Result<Self::Ok, Self::Err> {
        self.service
            .database()
            .execute(Select(By::new(())))
            .await
            .map_err(tracerr::map_from_and_wrap!())
    }
}

/// Error of [`ReconcilePools`] execution.
pub type ExecutionError = Traced<database::Error>;

#[cfg(test)]
mod spec {
    use common::{
        operations::{By, Insert, Perform},
        Currency, Money,
    };
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use crate::{
        domain::{pool, user, Pool},
        infra::{broadcast, catalog, database::Memory, Database as _},
        Config, Service,
    };

    use super::{ReconcilePools, Task as _};

    fn reconcile(
        db: &Memory,
    ) -> ReconcilePools<Service<Memory, broadcast::InProcess, catalog::Memory>>
    {
        ReconcilePools {
            config: super::Config::default(),
            service: Service {
                config: Config::default(),
                database: db.clone(),
                broadcaster: broadcast::InProcess::new(1),
                catalog: catalog::Memory::default(),
            },
        }
    }

    fn pool(goal: i64) -> Pool {
        let money = Money {
            amount: Decimal::from(goal),
            currency: Currency::Usd,
        };
        Pool::new(
            user::Id::from(Uuid::new_v4()),
            pool::Product {
                handle: pool::ProductHandle::new("desk").unwrap(),
                name: pool::ProductName::new("Desk").unwrap(),
                image_url: None,
                price: money,
            },
            money,
        )
    }

    #[tokio::test]
    async fn reports_nothing_for_consistent_pools() {
        let db = Memory::new();
        db.execute(Insert(pool(10))).await.unwrap();

        let found = reconcile(&db).execute(Perform(())).await.unwrap();

        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn reports_diverged_pools() {
        let db = Memory::new();
        let p = pool(10);
        db.execute(Insert(p.clone())).await.unwrap();
        db.tamper(|s| {
            if let Some(stored) = s.pools.get_mut(&p.id) {
                stored.current_amount = Decimal::from(3);
            }
        })
        .await;

        let found = reconcile(&db).execute(Perform(())).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pool_id, p.id);
        assert_eq!(found[0].current_amount, Decimal::from(3));
        assert_eq!(found[0].ledger_amount, Decimal::ZERO);
    }

    #[tokio::test]
    async fn reports_wrong_status() {
        let db = Memory::new();
        let p = pool(10);
        db.execute(Insert(p.clone())).await.unwrap();
        db.tamper(|s| {
            if let Some(stored) = s.pools.get_mut(&p.id) {
                stored.status = pool::Status::Completed;
            }
        })
        .await;

        let found = reconcile(&db).execute(Perform(())).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].status, pool::Status::Completed);
    }
}
