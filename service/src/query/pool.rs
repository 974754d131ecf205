//! [`Query`] collection related to a single [`Pool`].

use std::future;

use common::operations::{By, Select};
use derive_more::{Display, Error, From};
use futures::{stream, StreamExt as _};
use tracerr::Traced;

use crate::{
    domain::{pool, user, Pool},
    infra::{broadcast, database, Database},
    read, Service,
};

use super::{DatabaseQuery, Query};

/// Queries a [`Pool`] by its [`pool::Id`].
pub type ById = DatabaseQuery<By<Option<Pool>, pool::Id>>;

/// Queries the [`pool::Status::Active`] [`Pool`] of a user for a product.
pub type Active =
    DatabaseQuery<By<Option<Pool>, (user::Id, pool::ProductHandle)>>;

/// Queries [`read::pool::Participants`] of a [`Pool`].
pub type Participants =
    DatabaseQuery<By<read::pool::Participants, pool::Id>>;

/// Queries the sum of a [`Pool`] ledger.
pub type LedgerSum =
    DatabaseQuery<By<read::contribution::LedgerSum, pool::Id>>;

/// [`Query`] subscribing to the [`read::pool::Progress`] of a [`Pool`].
///
/// The resulting stream starts with the current [`read::pool::Progress`]
/// snapshot, and then yields only the ones newer than the last yielded, so
/// reordered or replayed updates never move a subscriber backwards.
#[derive(Clone, Copy, Debug)]
pub struct Progress {
    /// ID of the [`Pool`] to subscribe to.
    pub pool_id: pool::Id,
}

impl<Db, Ct> Query<Progress> for Service<Db, broadcast::InProcess, Ct>
where
    Db: Database<
        Select<By<Option<Pool>, pool::Id>>,
        Ok = Option<Pool>,
        Err = Traced<database::Error>,
    >,
{
    type Ok = broadcast::Updates;
    type Err = Traced<ProgressError>;

    async fn execute(
        &self,
        Progress { pool_id }: Progress,
    ) -> Result<Self::Ok, Self::Err> {
        use ProgressError as E;

        // Subscribing before reading, so nothing committed in between is
        // missed.
        let updates = self.broadcaster().subscribe(pool_id);

        let pool = self
            .database()
            .execute(Select(By::new(pool_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or_else(|| tracerr::new!(E::PoolNotFound(pool_id)))?;

        let snapshot = read::pool::Progress::from(&pool);
        let mut last = snapshot;
        Ok(stream::once(future::ready(snapshot))
            .chain(updates.filter(move |p| {
                let newer = p.is_newer_than(&last);
                if newer {
                    last = *p;
                }
                future::ready(newer)
            }))
            .boxed())
    }
}

/// Error of [`Progress`] [`Query`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ProgressError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`Pool`] doesn't exist.
    #[display("`Pool({_0})` does not exist")]
    PoolNotFound(#[error(not(source))] pool::Id),
}

#[cfg(test)]
mod spec {
    use common::operations::Publish;
    use futures::{future, StreamExt as _};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use crate::{
        domain::{pool, user},
        fixture, read, Query as _,
    };

    use super::{Active, LedgerSum, Participants, Progress, ProgressError};

    #[tokio::test]
    async fn finds_active_pool() {
        let (svc, _) = fixture::service();
        let pool = fixture::pool(&svc, 100).await;

        let found = svc
            .execute(Active::by((pool.owner_id, fixture::handle())))
            .await
            .unwrap();
        assert_eq!(found.map(|p| p.id), Some(pool.id));

        fixture::contribute(&svc, pool.id, 100).await.unwrap();
        let found = svc
            .execute(Active::by((pool.owner_id, fixture::handle())))
            .await
            .unwrap();
        assert!(found.is_none());

        let other = svc
            .execute(Active::by((
                user::Id::from(Uuid::new_v4()),
                fixture::handle(),
            )))
            .await
            .unwrap();
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn aggregates_participants() {
        let (svc, _) = fixture::service();
        let pool = fixture::pool(&svc, 1_000).await;
        let first = fixture::contribute(&svc, pool.id, 10).await.unwrap();
        _ = fixture::contribute(&svc, pool.id, 30).await.unwrap();

        let participants =
            svc.execute(Participants::by(pool.id)).await.unwrap();

        assert_eq!(participants.count(), 2);
        assert_eq!(participants.contributors[0].total, fixture::money(30));
        assert_eq!(
            participants.contributors[1].user_id,
            first.contribution.contributor_id,
        );

        let sum = svc.execute(LedgerSum::by(pool.id)).await.unwrap();
        assert_eq!(*sum, Decimal::from(40));
    }

    #[tokio::test]
    async fn starts_with_current_snapshot() {
        let (svc, _) = fixture::service();
        let pool = fixture::pool(&svc, 100).await;
        fixture::contribute(&svc, pool.id, 25).await.unwrap();

        let mut updates = svc
            .execute(Progress { pool_id: pool.id })
            .await
            .unwrap();

        let first = updates.next().await.unwrap();
        assert_eq!(first.current, fixture::money(25));
        assert_eq!(first.status, pool::Status::Active);

        let res = fixture::contribute(&svc, pool.id, 75).await.unwrap();
        assert_eq!(updates.next().await, Some(res.progress));
        assert_eq!(res.progress.status, pool::Status::Completed);
    }

    #[tokio::test]
    async fn includes_earlier_commits_into_snapshot() {
        let (svc, db) = fixture::service();
        let pool = fixture::pool(&svc, 1_000).await;
        for amount in [100, 200, 300] {
            fixture::contribute(&svc, pool.id, amount).await.unwrap();
        }

        let mut updates = svc
            .execute(Progress { pool_id: pool.id })
            .await
            .unwrap();

        let snapshot = updates.next().await.unwrap();
        assert_eq!(snapshot.current, fixture::money(600));
        assert_eq!(
            snapshot.current.amount,
            fixture::ledger_sum(&db, pool.id).await,
        );
        assert_eq!(snapshot.status, pool::Status::Active);
    }

    #[tokio::test]
    async fn skips_stale_updates() {
        let (svc, _) = fixture::service();
        let pool = fixture::pool(&svc, 100).await;
        let stale = read::pool::Progress::from(&pool);
        fixture::contribute(&svc, pool.id, 10).await.unwrap();

        let mut updates = svc
            .execute(Progress { pool_id: pool.id })
            .await
            .unwrap();
        assert_eq!(updates.next().await.unwrap().current, fixture::money(10));

        svc.broadcaster().execute(Publish(stale)).await.unwrap();
        let res = fixture::contribute(&svc, pool.id, 5).await.unwrap();

        assert_eq!(updates.next().await, Some(res.progress));
    }

    #[tokio::test]
    async fn converges_under_concurrent_contributions() {
        let (svc, db) = fixture::service();
        let pool = fixture::pool(&svc, 1_000_000).await;
        let updates = svc
            .execute(Progress { pool_id: pool.id })
            .await
            .unwrap();

        let results = future::join_all(
            (0..10).map(|_| fixture::contribute(&svc, pool.id, 100)),
        )
        .await;
        assert!(results.iter().all(Result::is_ok));

        let seen = updates.take(11).collect::<Vec<_>>().await;
        assert!(seen.windows(2).all(|w| w[1].is_newer_than(&w[0])));
        assert_eq!(
            seen.last().map(|p| p.current.amount),
            Some(fixture::ledger_sum(&db, pool.id).await),
        );
    }

    #[tokio::test]
    async fn fails_on_unknown_pool() {
        let (svc, _) = fixture::service();

        let err = svc
            .execute(Progress {
                pool_id: pool::Id::new(),
            })
            .await
            .err()
            .unwrap();

        assert!(matches!(err.as_ref(), ProgressError::PoolNotFound(_)));
    }
}
