//! [`Command`] for contributing to a [`Pool`].

use common::{
    operations::{
        By, Commit, Increment, Insert, Publish, Select, Transact, Transacted,
    },
    Currency, DateTime, Money,
};
use derive_more::{Display, Error, From};
use rust_decimal::Decimal;
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::{contribution, pool, user, Contribution, Pool},
    infra::{
        database::{self, constraint},
        Broadcaster, Database,
    },
    read, Service,
};

use super::{retry, Command};

/// [`Command`] for contributing to a [`Pool`].
///
/// Either the [`Contribution`] is appended to the ledger and the [`Pool`]
/// progress is incremented by its amount, or nothing changes at all.
#[derive(Clone, Debug)]
pub struct Contribute {
    /// ID of the [`Pool`] to contribute to.
    pub pool_id: pool::Id,

    /// ID of the contributing user.
    pub contributor_id: user::Id,

    /// Contributed amount.
    pub amount: Money,

    /// [`contribution::RequestToken`] making this [`Command`] idempotent.
    pub request_token: Option<contribution::RequestToken>,
}

/// Result of a [`Contribute`] [`Command`].
#[derive(Clone, Debug)]
pub struct ContributionResult {
    /// Committed [`Contribution`].
    pub contribution: Contribution,

    /// [`read::pool::Progress`] of the [`Pool`] right after the
    /// [`Contribution`] was committed.
    pub progress: read::pool::Progress,
}

impl<Db, Br, Ct> Command<Contribute> for Service<Db, Br, Ct>
where
    Db: Database<Transact, Err = Traced<database::Error>>,
    Transacted<Db>: Database<
            Select<
                By<
                    Option<Contribution>,
                    (pool::Id, contribution::RequestToken),
                >,
            >,
            Ok = Option<Contribution>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Pool>, pool::Id>>,
            Ok = Option<Pool>,
            Err = Traced<database::Error>,
        > + Database<
            Increment<By<Option<Pool>, (pool::Id, Decimal)>>,
            Ok = Option<Pool>,
            Err = Traced<database::Error>,
        > + Database<Insert<Contribution>, Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
    Br: Broadcaster<Publish<read::pool::Progress>, Err: std::fmt::Display>,
{
    type Ok = ContributionResult;
    type Err = Traced<ExecutionError>;

    async fn execute(&self, cmd: Contribute) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let Contribute {
            pool_id,
            contributor_id,
            amount,
            request_token,
        } = cmd;

        if !pool::is_valid_amount(&amount) {
            return Err(tracerr::new!(E::InvalidAmount(amount)));
        }

        let db = self.database();
        // Shared by all the attempts, so a commit landed unacknowledged is
        // replayed by the next attempt.
        let token = &request_token
            .unwrap_or_else(contribution::RequestToken::generate);
        let id = contribution::Id::new();
        let result = retry::run(self.config().retry, || async move {
            let tx = db
                .execute(Transact)
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?;

            let existing = tx
                .execute(Select(By::new((pool_id, token.clone()))))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?;
            if let Some(contribution) = existing {
                let pool = tx
                    .execute(Select(By::new(pool_id)))
                    .await
                    .map_err(tracerr::map_from_and_wrap!(=> E))?
                    .ok_or_else(|| tracerr::new!(E::PoolNotFound(pool_id)))?;
                return Ok(ContributionResult {
                    contribution,
                    progress: (&pool).into(),
                });
            }

            let pool = tx
                .execute(Select(By::new(pool_id)))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?
                .ok_or_else(|| tracerr::new!(E::PoolNotFound(pool_id)))?;
            if pool.currency() != amount.currency {
                return Err(tracerr::new!(E::CurrencyMismatch {
                    expected: pool.currency(),
                    actual: amount.currency,
                }));
            }
            if !pool.is_active() {
                return Err(tracerr::new!(E::PoolNotActive(pool_id)));
            }

            let Some(pool) = tx
                .execute(Increment(By::new((pool_id, amount.amount))))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?
            else {
                // Completed concurrently.
                return Err(tracerr::new!(E::PoolNotActive(pool_id)));
            };

            let contribution = Contribution {
                id,
                pool_id,
                contributor_id,
                amount,
                request_token: Some(token.clone()),
                created_at: DateTime::now().coerce(),
            };
            tx.execute(Insert(contribution.clone()))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))
                .map(drop)?;
            tx.execute(Commit)
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))
                .map(drop)?;

            Ok::<_, Traced<E>>(ContributionResult {
                contribution,
                progress: (&pool).into(),
            })
        })
        .await?;

        // Made by an earlier request with the same token.
        if result.contribution.id != id {
            log::debug!(
                "`Contribution({})` to `Pool({pool_id})` is replayed",
                result.contribution.id,
            );
            return Ok(result);
        }

        if result.progress.status == pool::Status::Completed {
            log::info!("`Pool({pool_id})` reached its goal");
        }
        if let Err(e) =
            self.broadcaster().execute(Publish(result.progress)).await
        {
            log::warn!("failed to publish `Pool({pool_id})` progress: {e}");
        }

        Ok(result)
    }
}

/// Error of [`Contribute`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// Contributed [`Currency`] differs from the [`Pool`] one.
    #[display("`Pool` accepts `{expected}` only, but `{actual}` given")]
    CurrencyMismatch {
        /// [`Currency`] of the [`Pool`].
        expected: Currency,

        /// Contributed [`Currency`].
        actual: Currency,
    },

    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// Contributed amount is not positive or exceeds [`pool::MAX_AMOUNT`].
    #[display("`{_0}` is not a valid contribution amount")]
    InvalidAmount(#[error(not(source))] Money),

    /// [`Pool`] is not [`pool::Status::Active`] anymore.
    #[display("`Pool({_0})` accepts no contributions anymore")]
    PoolNotActive(#[error(not(source))] pool::Id),

    /// [`Pool`] doesn't exist.
    #[display("`Pool({_0})` does not exist")]
    PoolNotFound(#[error(not(source))] pool::Id),

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
            // A concurrent request with the same token is replayed on the
            // next attempt.
            Self::Db(e) => {
                e.is_transient()
                    || e.is_unique_violation(Some(
                        constraint::CONTRIBUTION_REQUEST_TOKEN,
                    ))
            }
            Self::StorageUnavailable => true,
            Self::CurrencyMismatch { .. }
            | Self::InvalidAmount(_)
            | Self::PoolNotActive(_)
            | Self::PoolNotFound(_) => false,
        }
    }
}

#[cfg(test)]
mod spec {
    use common::{
        operations::{By, Subscribe},
        Currency, Money, Percent,
    };
    use futures::{future, StreamExt as _};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use crate::{
        domain::{contribution, pool, user},
        fixture,
        infra::broadcast,
        Command as _,
    };

    use super::{Contribute, ExecutionError as E};

    fn contribute(pool_id: pool::Id, amount: i64) -> Contribute {
        Contribute {
            pool_id,
            contributor_id: user::Id::from(Uuid::new_v4()),
            amount: fixture::money(amount),
            request_token: None,
        }
    }

    #[tokio::test]
    async fn accrues_contributions_until_goal() {
        let (svc, db) = fixture::service();
        let pool = fixture::pool(&svc, 100_000).await;

        let first = svc.execute(contribute(pool.id, 60_000)).await.unwrap();
        assert_eq!(first.progress.current, fixture::money(60_000));
        assert_eq!(
            Some(first.progress.percentage),
            Percent::new(Decimal::from(60)),
        );
        assert_eq!(first.progress.status, pool::Status::Active);

        let second = svc.execute(contribute(pool.id, 50_000)).await.unwrap();
        assert_eq!(second.progress.current, fixture::money(110_000));
        assert_eq!(second.progress.percentage, Percent::FULL);
        assert_eq!(second.progress.status, pool::Status::Completed);

        let err = svc.execute(contribute(pool.id, 1)).await.unwrap_err();
        assert!(matches!(err.as_ref(), E::PoolNotActive(_)), "{err}");

        let stored = fixture::stored_pool(&db, pool.id).await;
        assert_eq!(stored.current_amount, Decimal::from(110_000));
        assert!(stored.completed_at.is_some());
        assert_eq!(
            fixture::ledger_sum(&db, pool.id).await,
            Decimal::from(110_000),
        );
    }

    #[tokio::test]
    async fn completes_on_exact_goal() {
        let (svc, _) = fixture::service();
        let pool = fixture::pool(&svc, 100).await;

        let res = svc.execute(contribute(pool.id, 100)).await.unwrap();

        assert_eq!(res.progress.status, pool::Status::Completed);
    }

    #[tokio::test]
    async fn stays_active_just_below_goal() {
        let (svc, _) = fixture::service();
        let pool = fixture::pool(&svc, 100).await;

        let res = svc
            .execute(Contribute {
                amount: Money {
                    amount: Decimal::new(9999, 2),
                    currency: Currency::Cop,
                },
                ..contribute(pool.id, 1)
            })
            .await
            .unwrap();

        assert_eq!(res.progress.status, pool::Status::Active);
        assert_eq!(
            Some(res.progress.percentage),
            Percent::new(Decimal::new(9999, 2)),
        );
    }

    #[tokio::test]
    async fn loses_no_concurrent_updates() {
        let (svc, db) = fixture::service();
        let pool = fixture::pool(&svc, 100_000).await;

        let results = future::join_all(
            (0..100).map(|_| svc.execute(contribute(pool.id, 1_000))),
        )
        .await;

        assert!(results.iter().all(Result::is_ok));
        let stored = fixture::stored_pool(&db, pool.id).await;
        assert_eq!(stored.current_amount, Decimal::from(100_000));
        assert_eq!(stored.status, pool::Status::Completed);
        assert_eq!(
            fixture::ledger_sum(&db, pool.id).await,
            Decimal::from(100_000),
        );
    }

    #[tokio::test]
    async fn completes_exactly_once_concurrently() {
        let (svc, db) = fixture::service();
        let pool = fixture::pool(&svc, 10_000).await;

        let results = future::join_all(
            (0..50).map(|_| svc.execute(contribute(pool.id, 1_000))),
        )
        .await;

        let completions = results
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .filter(|r| r.progress.status == pool::Status::Completed)
            .count();
        assert_eq!(completions, 1);
        let accepted = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(accepted, 10);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(matches!(err.as_ref(), E::PoolNotActive(_)), "{err}");
        }

        let stored = fixture::stored_pool(&db, pool.id).await;
        assert_eq!(stored.current_amount, Decimal::from(10_000));
        assert_eq!(
            fixture::ledger_sum(&db, pool.id).await,
            Decimal::from(10_000),
        );
    }

    #[tokio::test]
    async fn rejects_non_positive_amount() {
        let (svc, db) = fixture::service();
        let pool = fixture::pool(&svc, 100).await;

        for amount in [0, -10] {
            let err = svc
                .execute(contribute(pool.id, amount))
                .await
                .unwrap_err();
            assert!(matches!(err.as_ref(), E::InvalidAmount(_)), "{err}");
        }
        assert_eq!(
            fixture::stored_pool(&db, pool.id).await.current_amount,
            Decimal::ZERO,
        );
    }

    #[tokio::test]
    async fn rejects_too_large_amount() {
        let (svc, db) = fixture::service();
        let pool = fixture::pool(&svc, 100).await;

        for amount in [pool::MAX_AMOUNT + Decimal::ONE, Decimal::MAX] {
            let err = svc
                .execute(Contribute {
                    amount: Money {
                        amount,
                        currency: Currency::Cop,
                    },
                    ..contribute(pool.id, 1)
                })
                .await
                .unwrap_err();
            assert!(matches!(err.as_ref(), E::InvalidAmount(_)), "{err}");
        }
        assert_eq!(fixture::ledger_sum(&db, pool.id).await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn rejects_unknown_pool() {
        let (svc, _) = fixture::service();

        let err = svc
            .execute(contribute(pool::Id::new(), 10))
            .await
            .unwrap_err();

        assert!(matches!(err.as_ref(), E::PoolNotFound(_)), "{err}");
    }

    #[tokio::test]
    async fn rejects_other_currency() {
        let (svc, db) = fixture::service();
        let pool = fixture::pool(&svc, 100).await;

        let err = svc
            .execute(Contribute {
                amount: Money {
                    amount: Decimal::from(10),
                    currency: Currency::Usd,
                },
                ..contribute(pool.id, 1)
            })
            .await
            .unwrap_err();

        assert!(
            matches!(err.as_ref(), E::CurrencyMismatch { expected, actual }
                if *expected == Currency::Cop && *actual == Currency::Usd),
            "{err}",
        );
        assert_eq!(fixture::ledger_sum(&db, pool.id).await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn replays_request_token() {
        let (svc, db) = fixture::service();
        let pool = fixture::pool(&svc, 100).await;
        let cmd = Contribute {
            request_token: contribution::RequestToken::new("checkout-42"),
            ..contribute(pool.id, 30)
        };

        let first = svc.execute(cmd.clone()).await.unwrap();
        let second = svc.execute(cmd).await.unwrap();

        assert_eq!(first.contribution.id, second.contribution.id);
        assert_eq!(second.progress.current, fixture::money(30));
        assert_eq!(fixture::ledger_sum(&db, pool.id).await, Decimal::from(30));
    }

    #[tokio::test]
    async fn replays_concurrent_request_token() {
        let (svc, db) = fixture::service();
        let pool = fixture::pool(&svc, 100).await;
        let cmd = Contribute {
            request_token: contribution::RequestToken::new("checkout-7"),
            ..contribute(pool.id, 30)
        };

        let results =
            future::join_all((0..5).map(|_| svc.execute(cmd.clone()))).await;

        let ids = results
            .into_iter()
            .map(|r| r.unwrap().contribution.id)
            .collect::<Vec<_>>();
        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(fixture::ledger_sum(&db, pool.id).await, Decimal::from(30));
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let (svc, db) = fixture::service();
        let pool = fixture::pool(&svc, 100).await;
        db.fail_next(2);

        let res = svc.execute(contribute(pool.id, 10)).await.unwrap();

        assert_eq!(res.progress.current, fixture::money(10));
        assert_eq!(fixture::ledger_sum(&db, pool.id).await, Decimal::from(10));
    }

    #[tokio::test]
    async fn applies_once_when_commit_acknowledgement_is_lost() {
        let (svc, db) = fixture::service();
        let pool = fixture::pool(&svc, 1_000).await;
        let mut updates = svc
            .broadcaster()
            .execute(Subscribe(By::<broadcast::Updates, _>::new(pool.id)))
            .await
            .unwrap();
        db.lose_next_commits(1);

        let res = svc.execute(contribute(pool.id, 100)).await.unwrap();

        assert_eq!(res.progress.current, fixture::money(100));
        assert!(res.contribution.request_token.is_some());
        let stored = fixture::stored_pool(&db, pool.id).await;
        assert_eq!(stored.current_amount, Decimal::from(100));
        assert_eq!(fixture::ledger_sum(&db, pool.id).await, Decimal::from(100));
        assert_eq!(updates.next().await, Some(res.progress));
    }

    #[tokio::test]
    async fn leaves_pool_untouched_once_storage_unavailable() {
        let (svc, db) = fixture::service();
        let pool = fixture::pool(&svc, 100).await;
        db.fail_next(usize::MAX);

        let err = svc.execute(contribute(pool.id, 10)).await.unwrap_err();
        db.fail_next(0);

        assert!(matches!(err.as_ref(), E::StorageUnavailable), "{err}");
        assert_eq!(
            fixture::stored_pool(&db, pool.id).await.current_amount,
            Decimal::ZERO,
        );
        assert_eq!(fixture::ledger_sum(&db, pool.id).await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn publishes_committed_progress() {
        let (svc, _) = fixture::service();
        let pool = fixture::pool(&svc, 100).await;
        let mut updates = svc
            .broadcaster()
            .execute(Subscribe(By::<broadcast::Updates, _>::new(pool.id)))
            .await
            .unwrap();

        let res = svc.execute(contribute(pool.id, 40)).await.unwrap();

        assert_eq!(updates.next().await, Some(res.progress));
    }
}
