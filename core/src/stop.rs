//! The process-wide stop signal shared by every background loop.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Monotonic, set-once stop flag.
///
/// Clones share the same flag. Loops poll [`is_set`](Self::is_set) between
/// iterations or park on [`sleep`](Self::sleep), which wakes early once the
/// signal fires.
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    /// Creates an unset signal.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Sets the signal.
    ///
    /// Returns `true` only for the call that actually flipped it.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|stopped| {
            if *stopped {
                false
            } else {
                *stopped = true;
                true
            }
        })
    }

    /// Whether the signal has been set.
    #[must_use]
    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the signal is set.
    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// Sleeps for `duration` or until the signal fires.
    ///
    /// Returns `true` when the signal is set on return.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            () = self.triggered() => true,
            () = tokio::time::sleep(duration) => self.is_set(),
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn trigger_is_set_once() {
        let signal = StopSignal::new();
        assert!(!signal.is_set());

        assert!(signal.trigger());
        assert!(signal.is_set());

        assert!(!signal.trigger());
        assert!(signal.is_set());
    }

    #[test]
    fn clones_share_the_flag() {
        let signal = StopSignal::new();
        let observer = signal.clone();

        signal.trigger();

        assert!(observer.is_set());
    }

    #[tokio::test]
    async fn sleep_returns_early_when_triggered() {
        let signal = StopSignal::new();
        let trigger = signal.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.trigger();
        });

        let started = Instant::now();
        let stopped = signal.sleep(Duration::from_secs(30)).await;

        assert!(stopped);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn sleep_runs_to_completion_when_not_triggered() {
        let signal = StopSignal::new();

        let stopped = signal.sleep(Duration::from_millis(10)).await;

        assert!(!stopped);
    }

    #[tokio::test]
    async fn triggered_resolves_immediately_when_already_set() {
        let signal = StopSignal::new();
        signal.trigger();

        let waited = tokio::time::timeout(Duration::from_secs(1), signal.triggered()).await;

        assert!(waited.is_ok());
    }
}
