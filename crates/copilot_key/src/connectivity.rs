//! Blocks until the token provider is reachable.
//!
//! Any HTTP response, whatever its status, means the network is up. Only
//! transport failures and per-attempt timeouts count as unreachable.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest_middleware::ClientWithMiddleware;

use crate::clock::Clock;
use crate::error::GateError;

#[async_trait]
pub trait Probe: Send + Sync {
    /// Target shown in progress messages.
    fn target(&self) -> &str;

    /// `Ok(())` when the target answered at all.
    async fn probe(&self) -> Result<(), String>;
}

/// HEAD request against the provider's web root.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Arc<ClientWithMiddleware>,
    url: String,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(client: Arc<ClientWithMiddleware>, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    fn target(&self) -> &str {
        &self.url
    }

    async fn probe(&self) -> Result<(), String> {
        let response = self
            .client
            .head(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        debug!("{} answered HTTP {}", self.url, response.status());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct GatePolicy {
    pub retry_interval: Duration,
    /// Gives up after this long. `None` retries forever.
    pub deadline: Option<Duration>,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(5),
            deadline: None,
        }
    }
}

pub struct ConnectivityGate<'a> {
    probe: &'a dyn Probe,
    clock: &'a dyn Clock,
    policy: GatePolicy,
}

impl<'a> ConnectivityGate<'a> {
    pub fn new(probe: &'a dyn Probe, clock: &'a dyn Clock, policy: GatePolicy) -> Self {
        Self {
            probe,
            clock,
            policy,
        }
    }

    /// Probes until the target answers and returns the number of probes made.
    /// Without a deadline this never fails; it may block indefinitely.
    pub async fn await_reachable(&self) -> Result<u64, GateError> {
        let started = self.clock.now();
        let mut attempts: u64 = 0;

        loop {
            attempts += 1;
            match self.probe.probe().await {
                Ok(()) => {
                    if attempts > 1 {
                        debug!(
                            "{} reachable after {} attempts",
                            self.probe.target(),
                            attempts
                        );
                    }
                    return Ok(attempts);
                }
                Err(e) => debug!("probe {} failed: {}", self.probe.target(), e),
            }

            if let Some(deadline) = self.policy.deadline {
                let elapsed = self.clock.now().saturating_sub(started).max(0) as u64;
                let next_after = elapsed.saturating_add(self.policy.retry_interval.as_secs());
                if next_after > deadline.as_secs() {
                    return Err(GateError::DeadlineExceeded {
                        target: self.probe.target().to_string(),
                        attempts,
                        deadline_secs: deadline.as_secs(),
                    });
                }
            }

            warn!(
                "copilotkey: Waiting for connectivity to {} (attempt {})...",
                self.probe.target(),
                attempts
            );
            self.clock.sleep(self.policy.retry_interval).await;
        }
    }
}
