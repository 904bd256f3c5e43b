use std::time::Duration;

use futures::future::{AbortHandle, Abortable, abortable};
use natter_services::BoxFuture;

/// Source of delays for the topic poller.
pub trait Scheduler: Send + Sync {
    fn delay(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Wall-clock delays on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn delay(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

impl TimerId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Cancellation side of an armed delay. Cancelling twice is a no-op.
#[derive(Debug)]
pub struct TimerHandle {
    id: TimerId,
    abort: AbortHandle,
}

impl TimerHandle {
    pub fn id(&self) -> TimerId {
        self.id
    }

    pub fn cancel(&self) {
        self.abort.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.abort.is_aborted()
    }
}

/// Waiting side of an armed delay; resolves to `Err(Aborted)` once cancelled.
pub struct ArmedTimer {
    pub id: TimerId,
    pub delay: Abortable<BoxFuture<'static, ()>>,
}

pub(crate) fn arm(
    scheduler: &dyn Scheduler,
    id: TimerId,
    duration: Duration,
) -> (TimerHandle, ArmedTimer) {
    let (delay, abort) = abortable(scheduler.delay(duration));
    (TimerHandle { id, abort }, ArmedTimer { id, delay })
}

#[cfg(test)]
pub(crate) mod manual {
    use std::sync::{Mutex, PoisonError};
    use std::time::Duration;

    use natter_services::BoxFuture;
    use tokio::sync::oneshot;

    use super::Scheduler;

    /// Delays that complete only when a test fires them.
    #[derive(Default)]
    pub(crate) struct ManualScheduler {
        waiting: Mutex<Vec<(Duration, oneshot::Sender<()>)>>,
    }

    impl ManualScheduler {
        /// Completes every delay handed out so far; returns how many were still awaited.
        pub(crate) fn fire_all(&self) -> usize {
            let waiting = std::mem::take(
                &mut *self.waiting.lock().unwrap_or_else(PoisonError::into_inner),
            );
            waiting
                .into_iter()
                .filter(|(_, sender)| !sender.is_closed())
                .map(|(_, sender)| sender.send(()))
                .filter(Result::is_ok)
                .count()
        }

        pub(crate) fn armed_delays(&self) -> Vec<Duration> {
            self.waiting
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .map(|(duration, _)| *duration)
                .collect()
        }
    }

    impl Scheduler for ManualScheduler {
        fn delay(&self, duration: Duration) -> BoxFuture<'static, ()> {
            let (sender, receiver) = oneshot::channel();
            self.waiting
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((duration, sender));
            Box::pin(async move {
                let _ = receiver.await;
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::FutureExt;
    use futures::future::Aborted;

    use super::manual::ManualScheduler;
    use super::*;

    #[tokio::test]
    async fn cancelled_delay_resolves_as_aborted() {
        let scheduler = ManualScheduler::default();
        let (handle, armed) = arm(&scheduler, TimerId::new(1), Duration::from_secs(5));

        handle.cancel();
        handle.cancel();

        assert!(handle.is_cancelled());
        assert_eq!(armed.delay.await, Err(Aborted));
    }

    #[tokio::test]
    async fn fired_delay_completes() {
        let scheduler = ManualScheduler::default();
        let (_handle, armed) = arm(&scheduler, TimerId::new(7), Duration::from_secs(5));

        assert_eq!(scheduler.armed_delays(), [Duration::from_secs(5)]);
        assert_eq!(scheduler.fire_all(), 1);
        assert_eq!(armed.id, TimerId::new(7));
        assert_eq!(armed.delay.now_or_never(), Some(Ok(())));
    }
}
