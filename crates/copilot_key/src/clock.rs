use std::time::Duration;

use async_trait::async_trait;

/// Wall clock and sleep source, injectable so freshness checks and retry
/// loops can be driven without real delays.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current Unix time in seconds.
    fn now(&self) -> i64;

    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

    use super::*;

    /// Fixed clock whose `sleep` advances time instantly.
    #[derive(Debug, Default)]
    pub struct ManualClock {
        now: AtomicI64,
        sleeps: AtomicUsize,
    }

    impl ManualClock {
        pub fn at(now: i64) -> Self {
            Self {
                now: AtomicI64::new(now),
                sleeps: AtomicUsize::new(0),
            }
        }

        pub fn sleeps(&self) -> usize {
            self.sleeps.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Clock for ManualClock {
        fn now(&self) -> i64 {
            self.now.load(Ordering::SeqCst)
        }

        async fn sleep(&self, duration: Duration) {
            self.sleeps.fetch_add(1, Ordering::SeqCst);
            self.now
                .fetch_add(duration.as_secs() as i64, Ordering::SeqCst);
        }
    }
}
