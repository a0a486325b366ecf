use std::fs::read_to_string;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde_json::Value;

use crate::error::LocateError;

/// Long-lived GitHub OAuth token and the file it came from.
#[derive(Clone, PartialEq, Eq)]
pub struct UpstreamToken {
    pub value: String,
    pub source: PathBuf,
}

// Keeps the token out of debug logs.
impl std::fmt::Debug for UpstreamToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamToken")
            .field("value", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

/// `~/.config/github-copilot/{hosts,apps}.json`, in lookup order.
pub fn default_candidates(home: &Path) -> Vec<PathBuf> {
    let dir = home.join(".config").join("github-copilot");
    vec![dir.join("hosts.json"), dir.join("apps.json")]
}

/// Finds the OAuth token written by the Copilot editor plugins.
#[derive(Debug, Clone)]
pub struct UpstreamTokenLocator {
    candidates: Vec<PathBuf>,
}

impl UpstreamTokenLocator {
    pub fn new(candidates: Vec<PathBuf>) -> Self {
        Self { candidates }
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// Returns the first `oauth_token` found, scanning candidates in order
    /// and host entries in file order. Unreadable or malformed files are
    /// logged and skipped.
    pub fn locate(&self) -> Result<UpstreamToken, LocateError> {
        for path in &self.candidates {
            if !path.exists() {
                debug!("Upstream config {} does not exist", path.display());
                continue;
            }
            let parsed = read_to_string(path)
                .map_err(|e| e.to_string())
                .and_then(|content| {
                    serde_json::from_str::<Value>(&content).map_err(|e| e.to_string())
                });
            let config = match parsed {
                Ok(config) => config,
                Err(e) => {
                    warn!("Error reading {}: {}", path.display(), e);
                    continue;
                }
            };
            if let Some(token) = first_oauth_token(&config) {
                debug!("Using GitHub token from {}", path.display());
                return Ok(UpstreamToken {
                    value: token.to_string(),
                    source: path.clone(),
                });
            }
            debug!("No oauth_token entry in {}", path.display());
        }

        Err(LocateError::TokenNotFound {
            searched: self.candidates.clone(),
        })
    }
}

fn first_oauth_token(config: &Value) -> Option<&str> {
    config
        .as_object()?
        .values()
        .filter_map(|host| host.get("oauth_token")?.as_str())
        .find(|token| !token.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn default_candidates_are_hosts_then_apps() {
        let paths = default_candidates(Path::new("/home/u"));
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/home/u/.config/github-copilot/hosts.json"),
                PathBuf::from("/home/u/.config/github-copilot/apps.json"),
            ]
        );
    }

    #[test]
    fn malformed_first_candidate_falls_through() {
        let dir = tempdir().expect("tempdir");
        let bad = dir.path().join("hosts.json");
        let good = dir.path().join("apps.json");
        fs::write(&bad, "{ not json").expect("bad");
        fs::write(
            &good,
            r#"{"github.com:Iv1.b507a08c87ecfe98":{"user":"me","oauth_token":"gho_second"}}"#,
        )
        .expect("good");

        let token = UpstreamTokenLocator::new(vec![bad, good.clone()])
            .locate()
            .expect("token");

        assert_eq!(token.value, "gho_second");
        assert_eq!(token.source, good);
    }

    #[test]
    fn first_host_with_token_wins() {
        let dir = tempdir().expect("tempdir");
        let hosts = dir.path().join("hosts.json");
        fs::write(
            &hosts,
            r#"{"ghe.example.com":{"user":"x"},"github.com":{"oauth_token":"gho_a"},"other":{"oauth_token":"gho_b"}}"#,
        )
        .expect("write");

        let token = UpstreamTokenLocator::new(vec![hosts]).locate().expect("token");
        assert_eq!(token.value, "gho_a");
    }

    #[test]
    fn valid_file_without_token_continues_to_next() {
        let dir = tempdir().expect("tempdir");
        let first = dir.path().join("hosts.json");
        let second = dir.path().join("apps.json");
        fs::write(&first, r#"{"github.com":{"user":"x"}}"#).expect("first");
        fs::write(&second, r#"{"github.com":{"oauth_token":"gho_apps"}}"#).expect("second");

        let token = UpstreamTokenLocator::new(vec![first, second])
            .locate()
            .expect("token");
        assert_eq!(token.value, "gho_apps");
    }

    #[test]
    fn nothing_found_is_token_not_found() {
        let dir = tempdir().expect("tempdir");
        let missing = vec![dir.path().join("hosts.json"), dir.path().join("apps.json")];
        let err = UpstreamTokenLocator::new(missing.clone())
            .locate()
            .expect_err("no token");
        let LocateError::TokenNotFound { searched } = err;
        assert_eq!(searched, missing);
    }

    #[test]
    fn non_object_json_is_skipped() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("hosts.json");
        fs::write(&path, r#"["oauth_token"]"#).expect("write");
        assert!(UpstreamTokenLocator::new(vec![path]).locate().is_err());
    }
}
