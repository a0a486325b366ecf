//! Refresh flow
//!
//! ColdCheck -> Fresh (done) or
//! ColdCheck -> Gating -> Locating -> Exchanging -> Persisting -> Done
//!
//! Locating and Exchanging may fail the invocation. A failed persist is
//! logged and the new value is still handed back to the caller.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use anyhow::anyhow;
use fs2::FileExt;
use log::{debug, error, info, warn};
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};

use crate::clock::{Clock, SystemClock};
use crate::config::{RefreshConfig, StoreBackend};
use crate::connectivity::{ConnectivityGate, GatePolicy, HttpProbe, Probe};
use crate::error::{RefreshError, StoreError};
use crate::exchange::{CopilotTokenExchanger, TokenExchanger};
use crate::hook::PostPersistHook;
use crate::store::{create_private_dir, CredentialRecord, CredentialStore, EnvStore};
use crate::upstream::UpstreamTokenLocator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    ColdCheck,
    Gating,
    Locating,
    Exchanging,
    Persisting,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The cached credential is still fresh; nothing was done.
    Fresh,
    /// A new credential was fetched. `persisted` is false when the store
    /// write failed; the value is still valid for this invocation.
    Refreshed { value: String, persisted: bool },
}

impl RefreshOutcome {
    pub fn value(&self) -> Option<&str> {
        match self {
            RefreshOutcome::Fresh => None,
            RefreshOutcome::Refreshed { value, .. } => Some(value),
        }
    }
}

/// 0 for a no-op or a refresh, 1 for any failure.
pub fn exit_code(result: &Result<RefreshOutcome, RefreshError>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(_) => 1,
    }
}

/// `export NAME='value'`, for a shell to `eval`.
pub fn export_line(name: &str, value: &str) -> String {
    format!("export {name}='{value}'")
}

pub fn build_http_client() -> anyhow::Result<ClientWithMiddleware> {
    let client = Client::builder()
        .build()
        .map_err(|e| anyhow!("Failed to build HTTP client: {e}"))?;
    Ok(ClientBuilder::new(client).build())
}

pub struct RefreshOrchestrator {
    config: RefreshConfig,
    store: Arc<dyn CredentialStore>,
    locator: UpstreamTokenLocator,
    probe: Arc<dyn Probe>,
    exchanger: Arc<dyn TokenExchanger>,
    clock: Arc<dyn Clock>,
    hook: Option<Arc<dyn PostPersistHook>>,
}

impl RefreshOrchestrator {
    /// Wires the production components described by `config`.
    pub fn from_config(config: RefreshConfig, client: Arc<ClientWithMiddleware>) -> Self {
        let store: Arc<dyn CredentialStore> = match config.backend {
            StoreBackend::File => Arc::new(config.file_store()),
            StoreBackend::Env => Arc::new(EnvStore::from_process_env([
                config.credential_name.as_str(),
            ])),
        };
        let probe = HttpProbe::new(
            Arc::clone(&client),
            config.probe_url.clone(),
            config.probe_timeout,
        );
        let exchanger = CopilotTokenExchanger::new(client)
            .with_api_base_url(config.api_base_url.clone())
            .with_user_agent(config.user_agent.clone());

        Self {
            locator: UpstreamTokenLocator::new(config.upstream_candidates.clone()),
            store,
            probe: Arc::new(probe),
            exchanger: Arc::new(exchanger),
            clock: Arc::new(SystemClock),
            hook: None,
            config,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_exchanger(mut self, exchanger: Arc<dyn TokenExchanger>) -> Self {
        self.exchanger = exchanger;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn PostPersistHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn config(&self) -> &RefreshConfig {
        &self.config
    }

    pub fn locator(&self) -> &UpstreamTokenLocator {
        &self.locator
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// The cached record, without any network access.
    pub fn cached(&self) -> Result<Option<CredentialRecord>, StoreError> {
        self.store.read(&self.config.credential_name)
    }

    pub fn is_fresh(&self) -> bool {
        self.store.is_fresh(
            &self.config.credential_name,
            self.config.margin_secs(),
            self.clock.now(),
        )
    }

    pub async fn run(&self) -> Result<RefreshOutcome, RefreshError> {
        let name = self.config.credential_name.as_str();

        self.enter(RefreshState::ColdCheck);
        if self.is_fresh() {
            debug!("{} in {} is still fresh", name, self.store.describe());
            return Ok(RefreshOutcome::Fresh);
        }

        let lock = self.acquire_lock().await;
        if lock.is_some() && self.is_fresh() {
            info!("{} was refreshed by another invocation", name);
            return Ok(RefreshOutcome::Fresh);
        }

        self.enter(RefreshState::Gating);
        let policy = GatePolicy {
            retry_interval: self.config.retry_interval,
            deadline: self.config.deadline,
        };
        ConnectivityGate::new(self.probe.as_ref(), self.clock.as_ref(), policy)
            .await_reachable()
            .await?;

        self.enter(RefreshState::Locating);
        let upstream = self.locator.locate()?;

        self.enter(RefreshState::Exchanging);
        let value = self.exchanger.exchange(&upstream).await?;
        if CredentialRecord::from_value(value.as_str()).is_none() {
            warn!("New {} carries no exp= marker; it will be refetched next run", name);
        }

        self.enter(RefreshState::Persisting);
        let persisted = match self.store.write(name, &value) {
            Ok(()) => {
                info!("Updated {} in {}", name, self.store.describe());
                true
            }
            Err(e) => {
                error!("Error updating keys file: {}", e);
                false
            }
        };
        if persisted {
            if let Some(hook) = &self.hook {
                if let Err(e) = hook.after_persist(name).await {
                    warn!("Post-refresh hook failed: {}", e);
                }
            }
        }

        self.enter(RefreshState::Done);
        Ok(RefreshOutcome::Refreshed { value, persisted })
    }

    fn enter(&self, state: RefreshState) {
        debug!("refresh state -> {:?}", state);
    }

    /// Exclusive advisory lock held across gating, exchange and persist, so
    /// concurrent invocations refresh once. Best effort: if the lock file
    /// cannot be opened or locked the refresh proceeds unlocked and any store
    /// problem surfaces later as an unpersisted value.
    async fn acquire_lock(&self) -> Option<File> {
        if !self.config.lock || self.config.backend != StoreBackend::File {
            return None;
        }
        let path = self.config.lock_path();
        let file = match open_lock_file(&self.config.store_dir(), &path) {
            Ok(file) => file,
            Err(e) => {
                warn!("Refreshing without lock, cannot open {}: {}", path.display(), e);
                return None;
            }
        };
        if file.try_lock_exclusive().is_ok() {
            return Some(file);
        }

        info!("Waiting for another copilotkey invocation to finish...");
        // flock blocks the thread; keep it off the runtime.
        match tokio::task::spawn_blocking(move || file.lock_exclusive().map(|_| file)).await {
            Ok(Ok(file)) => Some(file),
            Ok(Err(e)) => {
                warn!("Refreshing without lock, cannot lock {}: {}", path.display(), e);
                None
            }
            Err(e) => {
                warn!("Refreshing without lock: {}", e);
                None
            }
        }
    }
}

fn open_lock_file(dir: &Path, path: &Path) -> std::io::Result<File> {
    if !dir.exists() {
        create_private_dir(dir)?;
    }
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
}
