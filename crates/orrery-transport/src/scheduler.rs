//! Tokio-backed periodic task scheduler

use std::time::Duration;

use orrery_stack::{Scheduler, TaskHandle};
use tokio::task::JoinHandle;

/// Runs the stack's periodic work (key manager, life keeper) on the
/// ambient tokio runtime
#[derive(Default)]
pub struct TokioScheduler;

impl TokioScheduler {
    pub fn new() -> Self {
        TokioScheduler
    }
}

struct AbortOnCancel(JoinHandle<()>);

impl TaskHandle for AbortOnCancel {
    fn cancel(&mut self) {
        self.0.abort();
    }
}

impl Drop for AbortOnCancel {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl Scheduler for TokioScheduler {
    fn repeat(&self, period: Duration, mut tick: Box<dyn FnMut() + Send>) -> Box<dyn TaskHandle> {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // the first tick of a tokio interval fires immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                tick();
            }
        });
        Box::new(AbortOnCancel(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn ticks_repeat_until_cancelled() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let scheduler = TokioScheduler::new();
        let mut handle = scheduler.repeat(
            Duration::from_millis(10),
            Box::new(move || {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel();
        let at_cancel = count.load(Ordering::SeqCst);
        assert!(at_cancel >= 2, "expected repeated ticks, saw {}", at_cancel);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), at_cancel);
    }
}
