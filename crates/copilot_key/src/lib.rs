//! Keeps a short-lived GitHub Copilot API key cached for other processes.
//!
//! The refresh flow:
//! 1. Skip everything if the cached key is still fresh
//! 2. Wait until github.com is reachable
//! 3. Read the editor plugin's OAuth token
//! 4. Exchange it for a Copilot API key
//! 5. Persist the key and print it as a shell `export`

pub mod clock;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod exchange;
pub mod expiry;
pub mod hook;
pub mod refresh;
pub mod store;
pub mod upstream;

pub use clock::{Clock, SystemClock};
pub use config::{RefreshConfig, StoreBackend};
pub use connectivity::{ConnectivityGate, GatePolicy, HttpProbe, Probe};
pub use error::{ExchangeError, GateError, LocateError, RefreshError, StoreError};
pub use exchange::{CopilotTokenExchanger, TokenExchanger};
pub use expiry::parse_expiry;
pub use hook::{CommandHook, PostPersistHook};
pub use refresh::{
    build_http_client, exit_code, export_line, RefreshOrchestrator, RefreshOutcome, RefreshState,
};
pub use store::{CredentialRecord, CredentialStore, EnvStore, FileStore};
pub use upstream::{UpstreamToken, UpstreamTokenLocator};
