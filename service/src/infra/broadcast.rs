//! Progress [`Broadcaster`] implementations.

use std::{
    collections::HashMap,
    convert::Infallible,
    sync::{Arc, Mutex, PoisonError},
};

use common::operations::{By, Publish, Subscribe};
use futures::{stream, stream::BoxStream, StreamExt as _};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing as log;

#[cfg(doc)]
use crate::domain::Pool;
use crate::{domain::pool, read};

/// Fan-out of [`read::pool::Progress`] to the subscribed viewers.
pub use common::Handler as Broadcaster;

/// Endless stream of [`read::pool::Progress`] updates of a single [`Pool`].
pub type Updates = BoxStream<'static, read::pool::Progress>;

/// [`Broadcaster`] delivering updates to the subscribers of the same process
/// only.
///
/// Publishing never blocks: a subscriber lagging behind more than the channel
/// capacity skips the oldest updates and continues with the newer ones.
#[derive(Clone, Debug)]
pub struct InProcess {
    /// Capacity of a single [`Pool`] channel.
    capacity: usize,

    /// Channels of the [`Pool`]s having subscribers.
    channels: Arc<Mutex<HashMap<pool::Id, broadcast::Sender<read::pool::Progress>>>>,
}

impl InProcess {
    /// Creates a new [`InProcess`] [`Broadcaster`] with the provided capacity
    /// of a single [`Pool`] channel.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Subscribes to the [`Updates`] of the [`Pool`] with the provided ID.
    ///
    /// Only the updates published after this call are received.
    #[must_use]
    pub fn subscribe(&self, pool_id: pool::Id) -> Updates {
        let rx = {
            let mut channels =
                self.channels.lock().unwrap_or_else(PoisonError::into_inner);
            channels.retain(|_, tx| tx.receiver_count() > 0);
            channels
                .entry(pool_id)
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .subscribe()
        };

        stream::unfold(rx, move |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(progress) => return Some((progress, rx)),
                    Err(RecvError::Lagged(skipped)) => {
                        log::debug!(
                            "`Pool({pool_id})` subscriber skipped {skipped} \
                             progress updates",
                        );
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }

    /// Returns the number of the [`Pool`]s having a channel.
    #[must_use]
    pub fn channels_count(&self) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Broadcaster<Publish<read::pool::Progress>> for InProcess {
    type Ok = ();
    type Err = Infallible;

    async fn execute(
        &self,
        Publish(progress): Publish<read::pool::Progress>,
    ) -> Result<Self::Ok, Self::Err> {
        let mut channels =
            self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = channels.get(&progress.pool_id) {
            if tx.send(progress).is_err() {
                // Every subscriber is gone.
                drop(channels.remove(&progress.pool_id));
            }
        }
        Ok(())
    }
}

impl Broadcaster<Subscribe<By<Updates, pool::Id>>> for InProcess {
    type Ok = Updates;
    type Err = Infallible;

    async fn execute(
        &self,
        Subscribe(by): Subscribe<By<Updates, pool::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        Ok(self.subscribe(by.into_inner()))
    }
}

#[cfg(test)]
mod spec {
    use common::{
        operations::{By, Publish, Subscribe},
        Currency, Money, Percent,
    };
    use futures::StreamExt as _;
    use rust_decimal::Decimal;

    use crate::{domain::pool, read};

    use super::{Broadcaster as _, InProcess, Updates};

    fn progress(pool_id: pool::Id, current: i64) -> read::pool::Progress {
        let money = |amount: i64| Money {
            amount: Decimal::from(amount),
            currency: Currency::Usd,
        };
        read::pool::Progress {
            pool_id,
            current: money(current),
            goal: money(100),
            percentage: Percent::ratio(
                Decimal::from(current),
                Decimal::from(100),
            ),
            status: pool::Status::Active,
        }
    }

    #[tokio::test]
    async fn publishes_without_subscribers() {
        let broadcaster = InProcess::new(8);

        broadcaster
            .execute(Publish(progress(pool::Id::new(), 1)))
            .await
            .unwrap();

        assert_eq!(broadcaster.channels_count(), 0);
    }

    #[tokio::test]
    async fn delivers_to_subscribers_of_the_same_pool_only() {
        let broadcaster = InProcess::new(8);
        let (first, second) = (pool::Id::new(), pool::Id::new());

        let mut updates = broadcaster
            .execute(Subscribe(By::<Updates, _>::new(first)))
            .await
            .unwrap();
        broadcaster.execute(Publish(progress(second, 5))).await.unwrap();
        broadcaster.execute(Publish(progress(first, 7))).await.unwrap();

        let received = updates.next().await.unwrap();
        assert_eq!(received.pool_id, first);
        assert_eq!(received.current.amount, Decimal::from(7));
    }

    #[tokio::test]
    async fn skips_to_newer_updates_when_lagging() {
        let broadcaster = InProcess::new(2);
        let id = pool::Id::new();

        let mut updates = broadcaster
            .execute(Subscribe(By::<Updates, _>::new(id)))
            .await
            .unwrap();
        for current in 1..=5 {
            broadcaster
                .execute(Publish(progress(id, current)))
                .await
                .unwrap();
        }

        let received = updates.next().await.unwrap();
        assert_eq!(received.current.amount, Decimal::from(4));
    }

    #[tokio::test]
    async fn drops_channels_without_subscribers() {
        let broadcaster = InProcess::new(8);
        let id = pool::Id::new();

        let updates = broadcaster
            .execute(Subscribe(By::<Updates, _>::new(id)))
            .await
            .unwrap();
        assert_eq!(broadcaster.channels_count(), 1);

        drop(updates);
        broadcaster.execute(Publish(progress(id, 1))).await.unwrap();

        assert_eq!(broadcaster.channels_count(), 0);
    }
}
