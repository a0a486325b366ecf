use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use copilot_key::config::parse_duration;
use copilot_key::{
    build_http_client, exit_code, export_line, CommandHook, RefreshConfig, RefreshOrchestrator,
    RefreshOutcome, StoreBackend,
};

mod logging;

use logging::init_logging;

#[derive(Parser, Debug)]
#[command(name = "copilotkey")]
#[command(about = "Refresh the cached GitHub Copilot API key")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(long, short, env = "COPILOTKEY_DEBUG", default_value = "false")]
    debug: bool,

    /// Runtime directory root (default: $XDG_RUNTIME_DIR or /run/user/<uid>)
    #[arg(long, env = "COPILOTKEY_RUNTIME_DIR")]
    runtime_dir: Option<PathBuf>,

    /// Subdirectory of the runtime directory holding the keys file
    #[arg(long, env = "COPILOTKEY_NAMESPACE")]
    namespace: Option<String>,

    /// Variable name the credential is stored and exported under
    #[arg(long, env = "COPILOTKEY_NAME")]
    name: Option<String>,

    /// Refresh when less than this much lifetime remains (e.g. 900, 15m)
    #[arg(long, env = "COPILOTKEY_MARGIN", value_parser = parse_duration)]
    margin: Option<Duration>,

    /// Where the cached credential lives
    #[arg(long, env = "COPILOTKEY_BACKEND", value_enum)]
    backend: Option<BackendArg>,

    /// URL probed before contacting the token endpoint
    #[arg(long, env = "COPILOTKEY_PROBE_URL")]
    probe_url: Option<String>,

    /// Per-probe timeout
    #[arg(long, value_parser = parse_duration)]
    probe_timeout: Option<Duration>,

    /// Delay between connectivity probes
    #[arg(long, value_parser = parse_duration)]
    retry_interval: Option<Duration>,

    /// Give up waiting for connectivity after this long (default: never)
    #[arg(long, env = "COPILOTKEY_DEADLINE", value_parser = parse_duration)]
    deadline: Option<Duration>,

    /// GitHub API base URL
    #[arg(long, env = "COPILOTKEY_API_BASE_URL")]
    api_base_url: Option<String>,

    /// GitHub OAuth config files to search, in order (repeatable)
    #[arg(long = "upstream-config")]
    upstream_configs: Vec<PathBuf>,

    /// Command to run after the keys file is updated,
    /// e.g. "systemctl --user restart litellm"
    #[arg(long, env = "COPILOTKEY_POST_REFRESH")]
    post_refresh: Option<String>,

    /// Do not take the advisory lock around the refresh
    #[arg(long)]
    no_lock: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Refresh the key if it is missing or about to expire (default)
    Refresh,
    /// Report whether the cached key is fresh, without network access
    Status,
    /// Print the keys file path
    Path,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendArg {
    File,
    Env,
}

impl Cli {
    fn into_config(self) -> (RefreshConfig, Option<String>, Commands) {
        let mut config = RefreshConfig::from_env();
        if let Some(dir) = self.runtime_dir {
            config.runtime_dir = dir;
        }
        if let Some(namespace) = self.namespace {
            config.namespace = namespace;
        }
        if let Some(name) = self.name {
            config.credential_name = name;
        }
        if let Some(margin) = self.margin {
            config.margin = margin;
        }
        if let Some(backend) = self.backend {
            config.backend = match backend {
                BackendArg::File => StoreBackend::File,
                BackendArg::Env => StoreBackend::Env,
            };
        }
        if let Some(url) = self.probe_url {
            config.probe_url = url;
        }
        if let Some(timeout) = self.probe_timeout {
            config.probe_timeout = timeout;
        }
        if let Some(interval) = self.retry_interval {
            config.retry_interval = interval;
        }
        config.deadline = self.deadline;
        if let Some(url) = self.api_base_url {
            config.api_base_url = url;
        }
        if !self.upstream_configs.is_empty() {
            config.upstream_candidates = self.upstream_configs;
        }
        config.lock = !self.no_lock;

        (
            config,
            self.post_refresh,
            self.command.unwrap_or(Commands::Refresh),
        )
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("# Error: {e:#}");
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let (config, post_refresh, command) = cli.into_config();
    log::debug!("Configuration: {:?}", config);

    let client = Arc::new(build_http_client()?);
    let mut orchestrator = RefreshOrchestrator::from_config(config, client);
    if let Some(hook) = post_refresh.as_deref().and_then(CommandHook::parse) {
        orchestrator = orchestrator.with_hook(Arc::new(hook));
    }

    match command {
        Commands::Refresh => Ok(refresh(&orchestrator).await),
        Commands::Status => Ok(status(&orchestrator)),
        Commands::Path => {
            println!("{}", orchestrator.config().file_store().path().display());
            Ok(0)
        }
    }
}

async fn refresh(orchestrator: &RefreshOrchestrator) -> i32 {
    let result = orchestrator.run().await;
    match &result {
        Ok(RefreshOutcome::Fresh) => {}
        Ok(RefreshOutcome::Refreshed { value, persisted }) => {
            if !persisted {
                eprintln!("# Warning: new key is valid for this shell only, the keys file was not updated");
            }
            println!(
                "{}",
                export_line(&orchestrator.config().credential_name, value)
            );
        }
        Err(e) => eprintln!("# Error [{}]: {}", e.kind(), e),
    }
    exit_code(&result)
}

fn status(orchestrator: &RefreshOrchestrator) -> i32 {
    let name = &orchestrator.config().credential_name;
    let now = orchestrator.now();
    match orchestrator.cached() {
        Ok(Some(record)) => {
            let remaining = record.remaining_secs(now);
            let fresh = record.is_fresh_at(now, orchestrator.config().margin_secs());
            eprintln!(
                "# {}: {} ({}s remaining, expires {})",
                name,
                if fresh { "fresh" } else { "stale" },
                remaining.max(0),
                chrono::DateTime::from_timestamp(record.expiry, 0)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| record.expiry.to_string())
            );
            if fresh {
                0
            } else {
                1
            }
        }
        Ok(None) => {
            eprintln!("# {}: not cached", name);
            let candidates = orchestrator.locator().candidates();
            match candidates.iter().find(|path| path.exists()) {
                Some(path) => eprintln!("# next refresh reads GitHub token from {}", path.display()),
                None => eprintln!(
                    "# no GitHub token config present (looked for {})",
                    candidates
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            }
            1
        }
        Err(e) => {
            eprintln!("# Error [StoreIOError]: {}", e);
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_refresh() {
        let cli = Cli::try_parse_from(["copilotkey"]).expect("parse");
        let (_, hook, command) = cli.into_config();
        assert!(matches!(command, Commands::Refresh));
        assert!(hook.is_none());
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::try_parse_from([
            "copilotkey",
            "--runtime-dir",
            "/tmp/rt",
            "--margin",
            "0",
            "--backend",
            "env",
            "--deadline",
            "2m",
            "--upstream-config",
            "/a.json",
            "--upstream-config",
            "/b.json",
            "--no-lock",
            "status",
        ])
        .expect("parse");
        let (config, _, command) = cli.into_config();

        assert_eq!(config.runtime_dir, PathBuf::from("/tmp/rt"));
        assert_eq!(config.margin, Duration::ZERO);
        assert_eq!(config.backend, StoreBackend::Env);
        assert_eq!(config.deadline, Some(Duration::from_secs(120)));
        assert_eq!(
            config.upstream_candidates,
            vec![PathBuf::from("/a.json"), PathBuf::from("/b.json")]
        );
        assert!(!config.lock);
        assert!(matches!(command, Commands::Status));
    }
}
