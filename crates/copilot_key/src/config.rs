use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::exchange::{DEFAULT_API_BASE_URL, DEFAULT_USER_AGENT};
use crate::store::FileStore;
use crate::upstream::default_candidates;

pub const DEFAULT_NAMESPACE: &str = "llmconf";
pub const DEFAULT_CREDENTIAL_NAME: &str = "COPILOT_API_KEY";
pub const DEFAULT_PROBE_URL: &str = "https://github.com";
pub const LOCK_FILE_NAME: &str = "keys.lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// `<runtime-dir>/<namespace>/keys`
    File,
    /// The credential variable in the process environment.
    Env,
}

/// Everything the refresh flow needs. Resolved once at startup and passed in
/// so nothing below reads the environment.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub runtime_dir: PathBuf,
    pub namespace: String,
    pub credential_name: String,
    pub margin: Duration,
    pub probe_url: String,
    pub probe_timeout: Duration,
    pub retry_interval: Duration,
    pub deadline: Option<Duration>,
    pub api_base_url: String,
    pub user_agent: String,
    pub upstream_candidates: Vec<PathBuf>,
    pub backend: StoreBackend,
    pub lock: bool,
}

impl RefreshConfig {
    /// Defaults rooted at explicit directories.
    pub fn new(runtime_dir: impl Into<PathBuf>, home_dir: &Path) -> Self {
        Self {
            runtime_dir: runtime_dir.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            credential_name: DEFAULT_CREDENTIAL_NAME.to_string(),
            margin: Duration::from_secs(15 * 60),
            probe_url: DEFAULT_PROBE_URL.to_string(),
            probe_timeout: Duration::from_secs(3),
            retry_interval: Duration::from_secs(5),
            deadline: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            upstream_candidates: default_candidates(home_dir),
            backend: StoreBackend::File,
            lock: true,
        }
    }

    /// Defaults for the current user: `XDG_RUNTIME_DIR` (or `/run/user/<uid>`)
    /// and the home directory.
    pub fn from_env() -> Self {
        let runtime_dir = std::env::var_os("XDG_RUNTIME_DIR")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(fallback_runtime_dir);
        let home = dirs::home_dir().unwrap_or_else(std::env::temp_dir);
        Self::new(runtime_dir, &home)
    }

    pub fn store_dir(&self) -> PathBuf {
        self.runtime_dir.join(&self.namespace)
    }

    pub fn file_store(&self) -> FileStore {
        FileStore::in_runtime_dir(&self.runtime_dir, &self.namespace)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.store_dir().join(LOCK_FILE_NAME)
    }

    pub fn margin_secs(&self) -> i64 {
        i64::try_from(self.margin.as_secs()).unwrap_or(i64::MAX)
    }
}

#[cfg(unix)]
fn fallback_runtime_dir() -> PathBuf {
    // SAFETY: getuid has no preconditions and cannot fail.
    let uid = unsafe { libc::getuid() };
    PathBuf::from(format!("/run/user/{uid}"))
}

#[cfg(not(unix))]
fn fallback_runtime_dir() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::cache_dir)
        .unwrap_or_else(std::env::temp_dir)
}

/// Parses `900`, `900s`, `15m`, `2h`.
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    let (digits, unit) = match value.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => value.split_at(idx),
        None => (value, "s"),
    };
    let amount: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration: {value:?}"))?;
    let scale = match unit.trim() {
        "s" | "" => 1,
        "m" => 60,
        "h" => 3600,
        other => return Err(format!("unknown duration unit {other:?} in {value:?}")),
    };
    amount
        .checked_mul(scale)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration out of range: {value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployed_layout() {
        let config = RefreshConfig::new("/run/user/1000", Path::new("/home/me"));
        assert_eq!(
            config.file_store().path(),
            Path::new("/run/user/1000/llmconf/keys")
        );
        assert_eq!(config.lock_path(), Path::new("/run/user/1000/llmconf/keys.lock"));
        assert_eq!(config.margin_secs(), 900);
        assert_eq!(config.probe_timeout, Duration::from_secs(3));
        assert_eq!(config.retry_interval, Duration::from_secs(5));
        assert_eq!(config.deadline, None);
        assert_eq!(
            config.upstream_candidates[0],
            Path::new("/home/me/.config/github-copilot/hosts.json")
        );
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("900").unwrap(), Duration::from_secs(900));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("15m").unwrap(), Duration::from_secs(900));
        assert_eq!(parse_duration(" 2h ").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert!(parse_duration("m").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn parse_duration_rejects_overflow() {
        let err = parse_duration("18446744073709551615h").expect_err("overflow");
        assert!(err.contains("out of range"), "{err}");
        assert!(parse_duration("18446744073709551615m").is_err());
        assert_eq!(
            parse_duration("18446744073709551615").unwrap(),
            Duration::from_secs(u64::MAX)
        );
    }
}
