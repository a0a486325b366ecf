use std::process::Stdio;

use async_trait::async_trait;
use log::info;
use tokio::process::Command;

/// Runs after a refreshed credential has been persisted, e.g. to restart a
/// service that reads the keys file at startup. Failures are reported but
/// never fail the refresh.
#[async_trait]
pub trait PostPersistHook: Send + Sync {
    async fn after_persist(&self, credential_name: &str) -> Result<(), String>;
}

/// Runs a program with arguments, e.g. `systemctl --user restart litellm`.
#[derive(Debug, Clone)]
pub struct CommandHook {
    program: String,
    args: Vec<String>,
}

impl CommandHook {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Splits a command line on whitespace. Returns `None` for a blank line.
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }

    fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl PostPersistHook for CommandHook {
    async fn after_persist(&self, credential_name: &str) -> Result<(), String> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .env("COPILOTKEY_UPDATED", credential_name)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| format!("{}: {}", self.display(), e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(format!(
                "{} exited with {}: {}",
                self.display(),
                output.status,
                if stderr.is_empty() { "Unknown error" } else { stderr.as_str() }
            ));
        }

        info!("Ran post-refresh hook: {}", self.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_program_and_args() {
        let hook = CommandHook::parse("  systemctl --user restart litellm ").expect("hook");
        assert_eq!(hook.program, "systemctl");
        assert_eq!(hook.args, vec!["--user", "restart", "litellm"]);
        assert!(CommandHook::parse("   ").is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn reports_non_zero_exit() {
        let ok = CommandHook::new("true", vec![]);
        assert!(ok.after_persist("COPILOT_API_KEY").await.is_ok());

        let failing = CommandHook::new("false", vec![]);
        let err = failing.after_persist("COPILOT_API_KEY").await.expect_err("false fails");
        assert!(err.starts_with("false exited with"), "{err}");
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let hook = CommandHook::new("copilotkey-definitely-not-installed", vec![]);
        assert!(hook.after_persist("COPILOT_API_KEY").await.is_err());
    }
}
