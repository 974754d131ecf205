//! Retrying of [`Command`]s failed due to transient storage failures.

use std::{future::Future, time::Duration};

use smart_default::SmartDefault;
use tokio::time;
use tracerr::Traced;
use tracing as log;

#[cfg(doc)]
use super::Command;

/// Policy of retrying a [`Command`] storage transaction.
#[derive(Clone, Copy, Debug, SmartDefault)]
pub struct Policy {
    /// Total number of attempts, including the first one.
    #[default(3)]
    pub attempts: u32,

    /// Delay before the first retry, doubled for every next one.
    #[default(Duration::from_millis(50))]
    pub backoff: Duration,

    /// Maximum duration of a single attempt.
    #[default(Duration::from_secs(5))]
    pub timeout: Duration,
}

impl Policy {
    /// Returns the delay to wait after the provided failed `attempt`
    /// (counting from 1).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff.saturating_mul(factor)
    }
}

/// Error that may disappear once the failed operation is retried.
pub(crate) trait Transient {
    /// Returns the error meaning that the storage is unavailable.
    ///
    /// It's returned once an attempt times out, or all the attempts fail.
    fn unavailable() -> Self;

    /// Indicates whether this error is transient.
    fn is_transient(&self) -> bool;
}

/// Runs the provided `attempt` until it succeeds, fails with a non-transient
/// error, or the [`Policy`] is exhausted.
pub(crate) async fn run<T, E, F, Fut>(
    policy: Policy,
    mut attempt: F,
) -> Result<T, Traced<E>>
where
    E: Transient + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Traced<E>>>,
{
    let mut n = 1;
    loop {
        let res = time::timeout(policy.timeout, attempt())
            .await
            .unwrap_or_else(|_| Err(tracerr::new!(E::unavailable())));

        match res {
            Err(e) if e.as_ref().is_transient() => {
                if n >= policy.attempts {
                    log::warn!("storage failed {n} times, giving up: {e}");
                    return Err(tracerr::new!(E::unavailable()));
                }
                log::debug!("storage attempt {n} failed, retrying: {e}");
                time::sleep(policy.delay(n)).await;
                n += 1;
            }
            res => return res,
        }
    }
}

#[cfg(test)]
mod spec {
    use std::{cell::Cell, time::Duration};

    use derive_more::Display;
    use tracerr::Traced;

    use super::{run, Policy, Transient};

    #[derive(Debug, Display, Eq, PartialEq)]
    enum Error {
        Busy,
        Unavailable,
        Invalid,
    }

    impl Transient for Error {
        fn unavailable() -> Self {
            Self::Unavailable
        }

        fn is_transient(&self) -> bool {
            matches!(self, Self::Busy | Self::Unavailable)
        }
    }

    fn policy() -> Policy {
        Policy {
            attempts: 3,
            backoff: Duration::from_millis(10),
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn doubles_delay() {
        let p = policy();

        assert_eq!(p.delay(1), Duration::from_millis(10));
        assert_eq!(p.delay(2), Duration::from_millis(20));
        assert_eq!(p.delay(3), Duration::from_millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors() {
        let calls = Cell::new(0);

        let res = run(policy(), || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n < 3 {
                    Err(tracerr::new!(Error::Busy))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(res.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_once_exhausted() {
        let calls = Cell::new(0);

        let res: Result<(), Traced<Error>> = run(policy(), || {
            calls.set(calls.get() + 1);
            async { Err(tracerr::new!(Error::Busy)) }
        })
        .await;

        assert_eq!(*res.unwrap_err().as_ref(), Error::Unavailable);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_non_transient_errors_immediately() {
        let calls = Cell::new(0);

        let res: Result<(), Traced<Error>> = run(policy(), || {
            calls.set(calls.get() + 1);
            async { Err(tracerr::new!(Error::Invalid)) }
        })
        .await;

        assert_eq!(*res.unwrap_err().as_ref(), Error::Invalid);
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_attempts() {
        let calls = Cell::new(0);

        let res: Result<(), Traced<Error>> = run(policy(), || {
            calls.set(calls.get() + 1);
            async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            }
        })
        .await;

        assert_eq!(*res.unwrap_err().as_ref(), Error::Unavailable);
        assert_eq!(calls.get(), 3);
    }
}
