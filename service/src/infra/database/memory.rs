//! In-memory [`Database`] implementation.
//!
//! Serializes whole transactions behind a single lock, so it's mostly useful
//! for tests and local development.

use std::{
    collections::{BTreeMap, HashMap},
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use common::{
    operations::{By, Commit, Increment, Insert, Select, Transact},
    pagination,
};
use derive_more::{Deref, Display, Error as StdError};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracerr::Traced;

use crate::{
    domain::{contribution, pool, user, Contribution, Pool},
    infra::{
        database::{self, constraint},
        Database,
    },
    read,
};

/// In-memory [`Database`] client.
#[derive(Clone, Debug, Default, Deref)]
pub struct Memory<C = NonTx>(C);

impl Memory {
    /// Creates a new empty [`Memory`] database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` operations fail with [`Error::Unavailable`].
    pub fn fail_next(&self, n: usize) {
        self.0.failures.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` commits report [`Error::Unavailable`] after their
    /// changes are applied, as if the acknowledgement was lost.
    pub fn lose_next_commits(&self, n: usize) {
        self.0.lost_commits.store(n, Ordering::SeqCst);
    }

    /// Directly modifies the stored [`State`], bypassing any invariants.
    #[cfg(test)]
    pub(crate) async fn tamper(&self, f: impl FnOnce(&mut State)) {
        f(&mut *self.0.state.lock().await);
    }
}

/// Data stored in a [`Memory`] database.
#[derive(Clone, Debug, Default)]
pub struct State {
    /// Stored [`Pool`]s.
    pub(crate) pools: BTreeMap<pool::Id, Pool>,

    /// Stored [`Contribution`]s, in the order they were made.
    pub(crate) contributions: Vec<Contribution>,
}

/// Non-transactional [`Memory`] client.
///
/// Every operation is committed immediately.
#[derive(Clone, Debug, Default)]
pub struct NonTx {
    /// Shared [`State`] of the database.
    state: Arc<Mutex<State>>,

    /// Number of the next operations to fail.
    failures: Arc<AtomicUsize>,

    /// Number of the next commits to report as failed once applied.
    lost_commits: Arc<AtomicUsize>,
}

impl NonTx {
    /// Fails if an [`Error::Unavailable`] is scheduled via
    /// [`Memory::fail_next()`].
    fn ensure_available(&self) -> Result<(), Traced<database::Error>> {
        unavailable_if(&self.failures)
    }
}

/// Fails with [`Error::Unavailable`] if the provided `scheduled` counter is
/// not exhausted yet, decrementing it.
fn unavailable_if(
    scheduled: &AtomicUsize,
) -> Result<(), Traced<database::Error>> {
    let scheduled = scheduled
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
            n.checked_sub(1)
        })
        .is_ok();
    if scheduled {
        return Err(tracerr::new!(database::Error::from(Error::Unavailable)));
    }
    Ok(())
}

/// Transactional [`Memory`] client.
///
/// Locks the whole database on its first operation and holds the lock until
/// committed or dropped. Dropping without committing discards all the
/// changes.
#[derive(Clone, Debug)]
pub struct Tx {
    /// [`NonTx`] client this [`Tx`] was started from.
    non_tx: NonTx,

    /// Changes made by this [`Tx`], if it has started.
    staged: Arc<Mutex<Option<Staged>>>,
}

/// Changes of a started [`Tx`].
#[derive(Debug)]
struct Staged {
    /// Guard of the shared [`State`] held for the whole [`Tx`].
    guard: OwnedMutexGuard<State>,

    /// [`State`] with the changes applied.
    state: State,
}

impl Tx {
    /// Creates a new [`Tx`] client from the provided [`NonTx`] client.
    #[must_use]
    pub fn from_non_tx(non_tx: NonTx) -> Self {
        Self {
            non_tx,
            staged: Arc::new(Mutex::new(None)),
        }
    }

    /// Commits this [`Tx`] client.
    ///
    /// # Errors
    ///
    /// If [`Error::Unavailable`] is scheduled, either instead of committing
    /// or after it.
    pub async fn commit(&self) -> Result<(), Traced<database::Error>> {
        self.non_tx.ensure_available().map_err(tracerr::wrap!())?;
        if let Some(Staged { mut guard, state }) =
            self.staged.lock().await.take()
        {
            *guard = state;
        }
        unavailable_if(&self.non_tx.lost_commits).map_err(tracerr::wrap!())
    }
}

/// Access to a [`State`] of a [`Memory`] database.
pub trait Connection {
    /// Applies the provided function to the [`State`].
    ///
    /// # Errors
    ///
    /// If [`Error::Unavailable`] is scheduled.
    fn with_state<R>(
        &self,
        f: impl FnOnce(&mut State) -> R,
    ) -> impl Future<Output = Result<R, Traced<database::Error>>>;
}

impl Connection for NonTx {
    async fn with_state<R>(
        &self,
        f: impl FnOnce(&mut State) -> R,
    ) -> Result<R, Traced<database::Error>> {
        self.ensure_available().map_err(tracerr::wrap!())?;
        Ok(f(&mut *self.state.lock().await))
    }
}

impl Connection for Tx {
    async fn with_state<R>(
        &self,
        f: impl FnOnce(&mut State) -> R,
    ) -> Result<R, Traced<database::Error>> {
        self.non_tx.ensure_available().map_err(tracerr::wrap!())?;

        let mut staged = self.staged.lock().await;
        let current = match staged.take() {
            Some(s) => s,
            None => {
                let guard = Arc::clone(&self.non_tx.state).lock_owned().await;
                Staged {
                    state: State::clone(&guard),
                    guard,
                }
            }
        };
        Ok(f(&mut staged.insert(current).state))
    }
}

/// [`Memory`] database [`Error`].
#[derive(Clone, Copy, Debug, Display, StdError)]
pub enum Error {
    /// Storage is temporarily unavailable.
    #[display("In-memory storage is unavailable")]
    Unavailable,

    /// Unique constraint is violated.
    #[display("Unique constraint `{_0}` is violated")]
    UniqueViolation(#[error(not(source))] &'static str),

    /// Numeric value cannot be represented.
    #[display("Numeric value is out of range")]
    OutOfRange,
}

impl Error {
    /// Indicates whether this [`Error`] may disappear once retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable)
    }

    /// Checks if the error is a unique violation of the specified constraint.
    #[must_use]
    pub fn is_unique_violation(&self, constraint: Option<&str>) -> bool {
        match self {
            Self::UniqueViolation(c) => constraint.map_or(true, |n| n == *c),
            Self::OutOfRange | Self::Unavailable => false,
        }
    }
}

impl Database<Transact> for Memory<NonTx> {
    type Ok = Memory<Tx>;
    type Err = Traced<database::Error>;

    async fn execute(&self, _: Transact) -> Result<Self::Ok, Self::Err> {
        Ok(Memory(Tx::from_non_tx(self.0.clone())))
    }
}

impl Database<Transact> for Memory<Tx> {
    type Ok = Self;
    type Err = Traced<database::Error>;

    async fn execute(&self, _: Transact) -> Result<Self::Ok, Self::Err> {
        Ok(self.clone())
    }
}

impl Database<Commit> for Memory<Tx> {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(&self, _: Commit) -> Result<Self::Ok, Self::Err> {
        self.commit().await.map_err(tracerr::wrap!())
    }
}

impl<C: Connection> Database<Select<By<Option<Pool>, pool::Id>>> for Memory<C> {
    type Ok = Option<Pool>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Pool>, pool::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let id = by.into_inner();
        self.with_state(|s| s.pools.get(&id).cloned())
            .await
            .map_err(tracerr::wrap!())
    }
}

impl<C: Connection>
    Database<Select<By<Option<Pool>, (user::Id, pool::ProductHandle)>>>
    for Memory<C>
{
    type Ok = Option<Pool>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Pool>, (user::Id, pool::ProductHandle)>>,
    ) -> Result<Self::Ok, Self::Err> {
        let (owner_id, handle) = by.into_inner();
        self.with_state(|s| {
            s.pools
                .values()
                .find(|p| {
                    p.is_active()
                        && p.owner_id == owner_id
                        && p.product.handle == handle
                })
                .cloned()
        })
        .await
        .map_err(tracerr::wrap!())
    }
}

impl<C: Connection> Database<Insert<Pool>> for Memory<C> {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(pool): Insert<Pool>,
    ) -> Result<Self::Ok, Self::Err> {
        self.with_state(|s| {
            let occupied = pool.is_active()
                && s.pools.values().any(|p| {
                    p.id != pool.id
                        && p.is_active()
                        && p.owner_id == pool.owner_id
                        && p.product.handle == pool.product.handle
                });
            if occupied {
                return Err(tracerr::new!(database::Error::from(
                    Error::UniqueViolation(constraint::ACTIVE_POOL_PER_PRODUCT)
                )));
            }
            drop(s.pools.insert(pool.id, pool));
            Ok(())
        })
        .await
        .map_err(tracerr::wrap!())?
    }
}

impl<C: Connection> Database<Increment<By<Option<Pool>, (pool::Id, Decimal)>>>
    for Memory<C>
{
    type Ok = Option<Pool>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Increment(by): Increment<By<Option<Pool>, (pool::Id, Decimal)>>,
    ) -> Result<Self::Ok, Self::Err> {
        let (id, amount) = by.into_inner();
        let now = pool::CompletionDateTime::now();
        self.with_state(|s| {
            let Some(pool) = s.pools.get_mut(&id) else {
                return Ok(None);
            };
            match pool.accrue(amount, now) {
                Ok(accrued) => Ok(accrued.then(|| pool.clone())),
                Err(pool::AmountOverflow) => Err(tracerr::new!(
                    database::Error::from(Error::OutOfRange)
                )),
            }
        })
        .await
        .map_err(tracerr::wrap!())?
    }
}

impl<C: Connection>
    Database<
        Select<
            By<Option<Contribution>, (pool::Id, contribution::RequestToken)>,
        >,
    > for Memory<C>
{
    type Ok = Option<Contribution>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<
            By<Option<Contribution>, (pool::Id, contribution::RequestToken)>,
        >,
    ) -> Result<Self::Ok, Self::Err> {
        let (pool_id, token) = by.into_inner();
        self.with_state(|s| {
            s.contributions
                .iter()
                .find(|c| {
                    c.pool_id == pool_id
                        && c.request_token.as_ref() == Some(&token)
                })
                .cloned()
        })
        .await
        .map_err(tracerr::wrap!())
    }
}

impl<C: Connection> Database<Insert<Contribution>> for Memory<C> {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(contribution): Insert<Contribution>,
    ) -> Result<Self::Ok, Self::Err> {
        self.with_state(|s| {
            let replayed = contribution.request_token.is_some()
                && s.contributions.iter().any(|c| {
                    c.pool_id == contribution.pool_id
                        && c.request_token == contribution.request_token
                });
            if replayed {
                return Err(tracerr::new!(database::Error::from(
                    Error::UniqueViolation(
                        constraint::CONTRIBUTION_REQUEST_TOKEN
                    )
                )));
            }
            s.contributions.push(contribution);
            Ok(())
        })
        .await
        .map_err(tracerr::wrap!())?
    }
}

impl<C: Connection>
    Database<Select<By<read::pool::list::Page, read::pool::list::Selector>>>
    for Memory<C>
{
    type Ok = read::pool::list::Page;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<
            By<read::pool::list::Page, read::pool::list::Selector>,
        >,
    ) -> Result<Self::Ok, Self::Err> {
        let read::pool::list::Selector {
            arguments,
            filter: read::pool::list::Filter { owner_id },
        } = by.into_inner();

        let (edges, has_more) = self
            .with_state(|s| {
                paginate(
                    // Newest first.
                    arguments.kind().inverse(),
                    arguments.cursor(),
                    arguments.limit(),
                    s.pools
                        .values()
                        .filter(|p| {
                            p.is_active()
                                && owner_id.map_or(true, |id| p.owner_id == id)
                        })
                        .map(|p| (p.id, p.id)),
                )
            })
            .await
            .map_err(tracerr::wrap!())?;

        Ok(read::pool::list::Page::new(&arguments, edges, has_more))
    }
}

impl<C: Connection>
    Database<
        Select<By<read::pool::list::TotalCount, read::pool::list::Filter>>,
    > for Memory<C>
{
    type Ok = read::pool::list::TotalCount;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<
            By<read::pool::list::TotalCount, read::pool::list::Filter>,
        >,
    ) -> Result<Self::Ok, Self::Err> {
        let read::pool::list::Filter { owner_id } = by.into_inner();
        self.with_state(|s| {
            let count = s
                .pools
                .values()
                .filter(|p| {
                    p.is_active()
                        && owner_id.map_or(true, |id| p.owner_id == id)
                })
                .count();
            i32::try_from(count).unwrap_or(i32::MAX).into()
        })
        .await
        .map_err(tracerr::wrap!())
    }
}

impl<C: Connection>
    Database<
        Select<
            By<
                read::contribution::list::Page,
                read::contribution::list::Selector,
            >,
        >,
    > for Memory<C>
{
    type Ok = read::contribution::list::Page;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<
            By<
                read::contribution::list::Page,
                read::contribution::list::Selector,
            >,
        >,
    ) -> Result<Self::Ok, Self::Err> {
        let read::contribution::list::Selector {
            arguments,
            filter: read::contribution::list::Filter { pool_id },
        } = by.into_inner();

        let (edges, has_more) = self
            .with_state(|s| {
                paginate(
                    arguments.kind(),
                    arguments.cursor(),
                    arguments.limit(),
                    s.contributions
                        .iter()
                        .filter(|c| c.pool_id == pool_id)
                        .map(|c| (c.id, c.clone())),
                )
            })
            .await
            .map_err(tracerr::wrap!())?;

        Ok(read::contribution::list::Page::new(&arguments, edges, has_more))
    }
}

impl<C: Connection> Database<Select<By<read::pool::Participants, pool::Id>>>
    for Memory<C>
{
    type Ok = read::pool::Participants;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<read::pool::Participants, pool::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let pool_id = by.into_inner();
        self.with_state(|s| {
            let mut contributors =
                HashMap::<user::Id, read::pool::Contributor>::new();
            for c in s.contributions.iter().filter(|c| c.pool_id == pool_id) {
                _ = contributors
                    .entry(c.contributor_id)
                    .and_modify(|e| {
                        e.total.amount += c.amount.amount;
                        e.contributions += 1;
                        e.last_contributed_at = c.created_at;
                    })
                    .or_insert(read::pool::Contributor {
                        user_id: c.contributor_id,
                        total: c.amount,
                        contributions: 1,
                        last_contributed_at: c.created_at,
                    });
            }
            let mut contributors = contributors.into_values().collect::<Vec<_>>();
            contributors.sort_by(|a, b| {
                b.total
                    .amount
                    .cmp(&a.total.amount)
                    .then_with(|| a.user_id.cmp(&b.user_id))
            });
            read::pool::Participants { contributors }
        })
        .await
        .map_err(tracerr::wrap!())
    }
}

impl<C: Connection>
    Database<Select<By<read::contribution::LedgerSum, pool::Id>>>
    for Memory<C>
{
    type Ok = read::contribution::LedgerSum;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<read::contribution::LedgerSum, pool::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        let pool_id = by.into_inner();
        self.with_state(|s| read::contribution::LedgerSum(ledger_sum(s, pool_id)))
            .await
            .map_err(tracerr::wrap!())
    }
}

impl<C: Connection> Database<Select<By<Vec<read::pool::Discrepancy>, ()>>>
    for Memory<C>
{
    type Ok = Vec<read::pool::Discrepancy>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        _: Select<By<Vec<read::pool::Discrepancy>, ()>>,
    ) -> Result<Self::Ok, Self::Err> {
        self.with_state(|s| {
            s.pools
                .values()
                .filter_map(|p| {
                    let ledger_amount = ledger_sum(s, p.id);
                    let consistent = ledger_amount == p.current_amount
                        && p.is_active() != p.is_goal_reached();
                    (!consistent).then_some(read::pool::Discrepancy {
                        pool_id: p.id,
                        current_amount: p.current_amount,
                        ledger_amount,
                        goal_amount: p.goal.amount,
                        status: p.status,
                    })
                })
                .collect()
        })
        .await
        .map_err(tracerr::wrap!())
    }
}

/// Sums all the [`Contribution`]s made to the [`Pool`] with the provided ID.
fn ledger_sum(state: &State, pool_id: pool::Id) -> Decimal {
    state
        .contributions
        .iter()
        .filter(|c| c.pool_id == pool_id)
        .map(|c| c.amount.amount)
        .sum()
}

/// Selects a page of the provided `items` sorted by their cursors in
/// ascending order.
///
/// Returns the selected items ordered according to the provided
/// [`pagination::Kind`], and whether more items follow.
fn paginate<C: Ord, N>(
    kind: pagination::Kind,
    cursor: Option<&C>,
    limit: usize,
    items: impl Iterator<Item = (C, N)>,
) -> (Vec<(C, N)>, bool) {
    use pagination::Kind as K;

    let mut items = items
        .filter(|(c, _)| {
            cursor.map_or(true, |cur| match kind {
                K::Forward => c > cur,
                K::ForwardIncluding => c >= cur,
                K::Backward => c < cur,
                K::BackwardIncluding => c <= cur,
            })
        })
        .collect::<Vec<_>>();
    if kind.is_backward() {
        items.reverse();
    }

    let has_more = items.len() > limit;
    items.truncate(limit);
    (items, has_more)
}

#[cfg(test)]
mod spec {
    use common::{
        operations::{By, Commit, Increment, Insert, Select, Transact},
        Currency, Money,
    };
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use crate::{
        domain::{pool, user, Pool},
        infra::{database::constraint, Database as _},
    };

    use super::Memory;

    fn money(amount: i64) -> Money {
        Money {
            amount: Decimal::from(amount),
            currency: Currency::Cop,
        }
    }

    fn pool(owner_id: user::Id, goal: i64) -> Pool {
        Pool::new(
            owner_id,
            pool::Product {
                handle: pool::ProductHandle::new("lamp").unwrap(),
                name: pool::ProductName::new("Lamp").unwrap(),
                image_url: None,
                price: money(goal),
            },
            money(goal),
        )
    }

    #[tokio::test]
    async fn discards_uncommitted_tx() {
        let db = Memory::new();
        let p = pool(user::Id::from(Uuid::new_v4()), 10);

        {
            let tx = db.execute(Transact).await.unwrap();
            tx.execute(Insert(p.clone())).await.unwrap();
        }

        let found = db
            .execute(Select(By::<Option<Pool>, _>::new(p.id)))
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn applies_committed_tx() {
        let db = Memory::new();
        let p = pool(user::Id::from(Uuid::new_v4()), 10);

        let tx = db.execute(Transact).await.unwrap();
        tx.execute(Insert(p.clone())).await.unwrap();
        let updated = tx
            .execute(Increment(By::<Option<Pool>, _>::new((
                p.id,
                Decimal::from(4),
            ))))
            .await
            .unwrap();
        assert_eq!(updated.unwrap().current_amount, Decimal::from(4));
        tx.execute(Commit).await.unwrap();
        drop(tx);

        let found = db
            .execute(Select(By::<Option<Pool>, _>::new(p.id)))
            .await
            .unwrap();
        assert_eq!(found.unwrap().current_amount, Decimal::from(4));
    }

    #[tokio::test]
    async fn increments_active_pools_only() {
        let db = Memory::new();
        let p = pool(user::Id::from(Uuid::new_v4()), 10);
        db.execute(Insert(p.clone())).await.unwrap();

        let first = db
            .execute(Increment(By::<Option<Pool>, _>::new((
                p.id,
                Decimal::from(10),
            ))))
            .await
            .unwrap();
        assert_eq!(first.unwrap().status, pool::Status::Completed);

        let second = db
            .execute(Increment(By::<Option<Pool>, _>::new((
                p.id,
                Decimal::from(1),
            ))))
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn emulates_active_pool_uniqueness() {
        let db = Memory::new();
        let owner = user::Id::from(Uuid::new_v4());
        db.execute(Insert(pool(owner, 10))).await.unwrap();

        let err = db.execute(Insert(pool(owner, 20))).await.unwrap_err();
        assert!(err
            .as_ref()
            .is_unique_violation(Some(constraint::ACTIVE_POOL_PER_PRODUCT)));
        assert!(!err.as_ref().is_transient());
    }

    #[tokio::test]
    async fn fails_scheduled_operations() {
        let db = Memory::new();
        let p = pool(user::Id::from(Uuid::new_v4()), 10);
        db.fail_next(1);

        let err = db.execute(Insert(p.clone())).await.unwrap_err();
        assert!(err.as_ref().is_transient());

        db.execute(Insert(p)).await.unwrap();
    }
}
