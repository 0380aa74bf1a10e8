//! Glimpse CLI - hosts the gateway and manages the stored credential.
//!
//! ```text
//! glimpse serve              JSON-lines bus on stdin/stdout
//! glimpse credential set     read the API key from stdin, store it encrypted
//! glimpse credential clear   remove the stored API key
//! glimpse credential status  report whether a usable key is stored
//! ```
//!
//! stdout carries the bus protocol in `serve` mode, so logs only ever go to
//! `~/.glimpse/logs/glimpse.log` (fallback `./.glimpse/logs/glimpse.log`).

mod bus;

use anyhow::{Context, Result, bail};
use std::{
    env,
    fs::{self, OpenOptions},
    io::Read,
    path::PathBuf,
    sync::{Arc, Mutex},
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use glimpse_engine::{Gateway, GatewayConfig, GlimpseConfig, SecretStoreError};

const USAGE: &str = "usage: glimpse serve | glimpse credential <set|clear|status>";

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::try_new("warn").expect("warn filter is valid"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // No log file: drop logs rather than interleave them with bus output.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file() -> (Option<(PathBuf, std::fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.glimpse/logs/glimpse.log
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".glimpse").join("logs").join("glimpse.log"));
    }

    // Fallback: ./.glimpse/logs/glimpse.log
    candidates.push(PathBuf::from(".glimpse").join("logs").join("glimpse.log"));

    candidates
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Serve,
    Credential(CredentialAction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CredentialAction {
    Set,
    Clear,
    Status,
}

impl Command {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let command = match args.next().as_deref() {
            Some("serve") | None => Command::Serve,
            Some("credential") => match args.next().as_deref() {
                Some("set") => Command::Credential(CredentialAction::Set),
                Some("clear") => Command::Credential(CredentialAction::Clear),
                Some("status") => Command::Credential(CredentialAction::Status),
                Some(other) => bail!("unknown credential action '{other}'\n{USAGE}"),
                None => bail!("missing credential action\n{USAGE}"),
            },
            Some("-h" | "--help" | "help") => bail!("{USAGE}"),
            Some(other) => bail!("unknown command '{other}'\n{USAGE}"),
        };
        if let Some(extra) = args.next() {
            bail!("unexpected argument '{extra}'\n{USAGE}");
        }
        Ok(command)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let command = Command::parse(env::args().skip(1))?;

    let config = GatewayConfig::load().with_context(|| {
        let path = GlimpseConfig::path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        format!("failed to load configuration from {path}")
    })?;
    tracing::info!(
        base_url = config.endpoint.base_url(),
        data_dir = %config.data_dir.display(),
        models = config.allowed_models.len(),
        "Configuration loaded"
    );

    let gateway = Gateway::open(&config).with_context(|| {
        format!(
            "failed to open local storage in {}",
            config.data_dir.display()
        )
    })?;

    match command {
        Command::Serve => {
            bus::serve(Arc::new(gateway), tokio::io::stdin(), tokio::io::stdout()).await
        }
        Command::Credential(action) => run_credential(&gateway, action),
    }
}

fn run_credential(gateway: &Gateway, action: CredentialAction) -> Result<()> {
    let secrets = gateway.secrets();
    match action {
        CredentialAction::Set => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("failed to read credential from stdin")?;
            match secrets.store_credential(&input) {
                Ok(()) if input.trim().is_empty() => println!("credential cleared"),
                Ok(()) => println!("credential stored"),
                Err(e @ SecretStoreError::CryptoUnavailable(_)) => {
                    tracing::error!("Cannot store credential: {e}");
                    return Err(e).context("secure encryption is unavailable on this system");
                }
                Err(e) => return Err(e).context("failed to store credential"),
            }
        }
        CredentialAction::Clear => {
            secrets
                .clear_credential()
                .context("failed to clear credential")?;
            println!("credential cleared");
        }
        CredentialAction::Status => match secrets.load_credential() {
            Ok(Some(_)) => println!("credential: configured"),
            Ok(None) => println!("credential: not configured"),
            Err(e) => println!("credential: unreadable ({e})"),
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Command, CredentialAction};

    fn parse(args: &[&str]) -> anyhow::Result<Command> {
        Command::parse(args.iter().map(ToString::to_string))
    }

    #[test]
    fn parses_commands() {
        assert_eq!(parse(&[]).unwrap(), Command::Serve);
        assert_eq!(parse(&["serve"]).unwrap(), Command::Serve);
        assert_eq!(
            parse(&["credential", "set"]).unwrap(),
            Command::Credential(CredentialAction::Set)
        );
        assert_eq!(
            parse(&["credential", "status"]).unwrap(),
            Command::Credential(CredentialAction::Status)
        );
    }

    #[test]
    fn rejects_unknown_input() {
        assert!(parse(&["bogus"]).is_err());
        assert!(parse(&["credential"]).is_err());
        assert!(parse(&["credential", "rotate"]).is_err());
        assert!(parse(&["serve", "extra"]).is_err());
    }
}
