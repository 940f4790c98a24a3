//! Cooperative delay with early wake.
//!
//! `delay` races a sleep against a one-shot signal; `wake` drains the sleep.
//! A wake issued while nothing is sleeping leaves a stored permit, so the
//! next `delay` returns immediately. This is what makes `nudge()` work.

use std::time::Duration;

use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    Elapsed,
    Woken,
}

pub struct LoopTimer {
    notify: Notify,
}

impl LoopTimer {
    pub fn new() -> Self {
        Self {
            notify: Notify::new(),
        }
    }

    pub async fn delay(&self, duration: Duration) -> WakeReason {
        tokio::select! {
            _ = tokio::time::sleep(duration) => WakeReason::Elapsed,
            _ = self.notify.notified() => WakeReason::Woken,
        }
    }

    pub fn wake(&self) {
        self.notify.notify_one();
    }
}

impl Default for LoopTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_wake_interrupts_delay() {
        let timer = Arc::new(LoopTimer::new());
        let waker = timer.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            waker.wake();
        });
        let reason = timer.delay(Duration::from_secs(60)).await;
        assert_eq!(reason, WakeReason::Woken);
    }

    #[tokio::test]
    async fn test_wake_before_delay_is_not_lost() {
        let timer = LoopTimer::new();
        timer.wake();
        let reason = timer.delay(Duration::from_secs(60)).await;
        assert_eq!(reason, WakeReason::Woken);
    }

    #[test]
    fn test_delay_elapses_without_wake() {
        tokio_test::block_on(async {
            let timer = LoopTimer::new();
            let reason = timer.delay(Duration::from_millis(10)).await;
            assert_eq!(reason, WakeReason::Elapsed);
        });
    }
}
