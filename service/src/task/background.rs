//! Background environment for running [`Task`]s.

use std::{
    error::Error as StdError,
    future::{Future, IntoFuture},
};

use derive_more::{Display, Error};
use futures::{
    future::{self, LocalBoxFuture},
    FutureExt as _, TryFutureExt as _,
};
use tokio::task;
use tracing as log;

#[cfg(doc)]
use crate::Task;

/// Background environment running long-lived [`Task`]s on a local set.
///
/// Resolves once any of the spawned [`Task`]s fails or panics.
#[derive(Debug, Default)]
pub struct Background {
    /// Local set the [`Task`]s are spawned on.
    set: task::LocalSet,

    /// Spawned [`Task`]s along with their names.
    tasks: Vec<(&'static str, task::JoinHandle<Result<(), BoxedError>>)>,
}

/// Type-erased error of a failed [`Task`].
type BoxedError = Box<dyn StdError + 'static>;

impl Background {
    /// Spawns a new [`Task`] with the provided `name` inside this
    /// [`Background`] environment.
    pub fn spawn<F, E>(&mut self, name: &'static str, future: F)
    where
        F: Future<Output = Result<(), E>> + 'static,
        E: StdError + 'static,
    {
        log::debug!("spawning `{name}` background task");
        let handle = self
            .set
            .spawn_local(future.map_err(BoxedError::from));
        self.tasks.push((name, handle));
    }
}

impl IntoFuture for Background {
    type Output = Result<(), TaskError>;
    type IntoFuture = LocalBoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        let Self { set, tasks } = self;
        let tasks = tasks.into_iter().map(|(name, handle)| {
            handle
                .map(move |res| {
                    let cause = match res {
                        Ok(Ok(())) => return Ok(()),
                        Ok(Err(e)) => e,
                        Err(e) => BoxedError::from(e),
                    };
                    Err(TaskError { name, cause })
                })
                .boxed_local()
        });
        future::try_join(set.map(Ok), future::try_join_all(tasks))
            .map_ok(drop)
            .boxed_local()
    }
}

/// Error of a failed background [`Task`].
#[derive(Debug, Display, Error)]
#[display("`{name}` task failed: {cause}")]
pub struct TaskError {
    /// Name of the failed [`Task`].
    pub name: &'static str,

    /// Cause of the failure.
    pub cause: BoxedError,
}

#[cfg(test)]
mod spec {
    use std::io;

    use super::Background;

    #[tokio::test]
    async fn resolves_once_all_tasks_finish() {
        let mut bg = Background::default();
        bg.spawn("first", async { Ok::<_, io::Error>(()) });
        bg.spawn("second", async { Ok::<_, io::Error>(()) });

        assert!(bg.await.is_ok());
    }

    #[tokio::test]
    async fn names_failed_task() {
        let mut bg = Background::default();
        bg.spawn("healthy", async { Ok::<_, io::Error>(()) });
        bg.spawn("failing", async {
            Err(io::Error::other("boom"))
        });

        let err = bg.await.unwrap_err();

        assert_eq!(err.name, "failing");
        assert_eq!(err.to_string(), "`failing` task failed: boom");
    }
}
