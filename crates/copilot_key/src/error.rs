use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid credential name: {0:?}")]
    InvalidName(String),
    #[error("credential value for {0} cannot be written as a quoted shell word")]
    UnsafeValue(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum LocateError {
    #[error("GitHub token not found in config files (searched: {})", display_paths(.searched))]
    TokenNotFound { searched: Vec<PathBuf> },
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "<none>".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("proxy authentication required")]
    ProxyAuthRequired,
    #[error("HTTP error! Status: {status} - {body}")]
    Status { status: u16, body: String },
    #[error("malformed token response: {0}")]
    MalformedBody(String),
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error("{target} still unreachable after {attempts} attempts (deadline {deadline_secs}s)")]
    DeadlineExceeded {
        target: String,
        attempts: u64,
        deadline_secs: u64,
    },
}

/// Terminal failures of a refresh invocation. Each maps to exit code 1.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    TokenNotFound(#[from] LocateError),
    #[error("error fetching Copilot API key: {0}")]
    ExchangeFailed(#[from] ExchangeError),
    #[error(transparent)]
    Unreachable(#[from] GateError),
}

impl RefreshError {
    /// Stable reason tag printed alongside the message.
    pub fn kind(&self) -> &'static str {
        match self {
            RefreshError::TokenNotFound(_) => "TokenNotFound",
            RefreshError::ExchangeFailed(_) => "ExchangeFailed",
            RefreshError::Unreachable(_) => "Unreachable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_distinct() {
        let not_found = RefreshError::from(LocateError::TokenNotFound { searched: vec![] });
        let exchange = RefreshError::from(ExchangeError::Status {
            status: 401,
            body: String::new(),
        });
        assert_eq!(not_found.kind(), "TokenNotFound");
        assert_eq!(exchange.kind(), "ExchangeFailed");
        assert!(exchange.to_string().contains("401"));
    }

    #[test]
    fn token_not_found_lists_searched_paths() {
        let err = LocateError::TokenNotFound {
            searched: vec![PathBuf::from("/a/hosts.json"), PathBuf::from("/a/apps.json")],
        };
        let msg = err.to_string();
        assert!(msg.contains("/a/hosts.json, /a/apps.json"), "{msg}");
    }
}
