//! Cancellable per-job poll timer.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle to a spawned poll task. Cancelling it guarantees the task issues no further work.
#[derive(Debug)]
pub struct PollTimer {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl PollTimer {
    /// Spawn `task` with a fresh cancellation token.
    pub fn spawn<F, Fut>(task: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let handle = tokio::spawn(task(token.clone()));
        Self { token, handle }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Sleep for `delay` unless cancelled first. Returns `false` when cancelled.
pub async fn sleep_or_cancel(token: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Run `fut` unless cancelled first.
pub async fn cancellable<T>(token: &CancellationToken, fut: impl Future<Output = T>) -> Option<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        v = fut => Some(v),
    }
}

/// Exponential backoff without jitter: `initial * 2^(attempt-1)`, capped at `max`.
pub fn backoff_delay(attempt: u32, initial: Duration, max: Duration) -> Duration {
    let mut delay = initial;
    for _ in 1..attempt {
        delay = delay.saturating_mul(2);
        if delay >= max {
            return max;
        }
    }
    delay.min(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_backoff_doubles_until_cap() {
        let initial = Duration::from_millis(100);
        let max = Duration::from_millis(1000);
        assert_eq!(backoff_delay(1, initial, max), Duration::from_millis(100));
        assert_eq!(backoff_delay(2, initial, max), Duration::from_millis(200));
        assert_eq!(backoff_delay(4, initial, max), Duration::from_millis(800));
        assert_eq!(backoff_delay(5, initial, max), max);
        assert_eq!(backoff_delay(40, initial, max), max);
    }

    #[tokio::test]
    async fn test_cancel_before_deadline_prevents_work() {
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        let timer = PollTimer::spawn(move |token| async move {
            if sleep_or_cancel(&token, Duration::from_millis(200)).await {
                f.fetch_add(1, Ordering::SeqCst);
            }
        });
        timer.cancel();
        assert!(timer.is_cancelled());
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(timer.is_finished());
    }

    #[tokio::test]
    async fn test_uncancelled_timer_fires() {
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        let timer = PollTimer::spawn(move |token| async move {
            if sleep_or_cancel(&token, Duration::from_millis(10)).await {
                f.fetch_add(1, Ordering::SeqCst);
            }
        });
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancellable_drops_pending_future() {
        let token = CancellationToken::new();
        token.cancel();
        let r = cancellable(&token, std::future::pending::<u32>()).await;
        assert_eq!(r, None);
    }
}
