//! Cancellable delayed task.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug)]
struct Scheduled {
    handle: JoinHandle<()>,
    /// Set by whichever side gets there first: the task when its delay
    /// elapses, or `cancel` while it is still waiting.
    claimed: Arc<AtomicBool>,
}

/// Runs a future once a delay has elapsed, unless rescheduled or cancelled
/// first.
///
/// Scheduling again replaces the pending run, which gives debounce
/// semantics. Only the waiting period can be cancelled: once the delay has
/// elapsed the future always completes, so a write that already started is
/// never torn in half. [`DelayedTask::take_running`] hands out such a run so
/// callers can wait for it to land.
#[derive(Debug, Default)]
pub struct DelayedTask {
    scheduled: Option<Scheduled>,
}

impl DelayedTask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule<F>(&mut self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let claimed = Arc::new(AtomicBool::new(false));
        let flag = claimed.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if flag.swap(true, Ordering::SeqCst) {
                return;
            }
            task.await;
        });
        self.scheduled = Some(Scheduled { handle, claimed });
    }

    /// Drops the pending run. Returns true when one was pending.
    ///
    /// A run whose delay already elapsed is left to finish.
    pub fn cancel(&mut self) -> bool {
        let Some(scheduled) = self.scheduled.take() else {
            return false;
        };
        if scheduled.claimed.swap(true, Ordering::SeqCst) {
            return false;
        }
        scheduled.handle.abort();
        true
    }

    /// Takes the handle of a run that is already executing, if any.
    pub fn take_running(&mut self) -> Option<JoinHandle<()>> {
        let scheduled = self.scheduled.take_if(|scheduled| {
            scheduled.claimed.load(Ordering::SeqCst) && !scheduled.handle.is_finished()
        })?;
        Some(scheduled.handle)
    }

    /// True while the delay has not elapsed yet.
    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        self.scheduled.as_ref().is_some_and(|scheduled| {
            !scheduled.claimed.load(Ordering::SeqCst) && !scheduled.handle.is_finished()
        })
    }
}

impl Drop for DelayedTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_task(counter: Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rescheduling_collapses_runs() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut task = DelayedTask::new();

        for _ in 0..3 {
            task.schedule(Duration::from_millis(350), counting_task(counter.clone()));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(task.is_pending());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!task.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_run() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut task = DelayedTask::new();
        task.schedule(Duration::from_secs(20), counting_task(counter.clone()));

        assert!(task.cancel());
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(!task.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let mut task = DelayedTask::new();
            task.schedule(Duration::from_millis(10), counting_task(counter.clone()));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_run_can_be_awaited_but_not_cancelled() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut task = DelayedTask::new();
        let slow = counter.clone();
        task.schedule(Duration::from_millis(10), async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            slow.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let running = task.take_running().unwrap();
        assert!(!task.cancel());
        running.await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(task.take_running().is_none());
    }
}
