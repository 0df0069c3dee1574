//! Patch Bridge - command line entry point
//!
//! # Usage
//!
//! ```bash
//! # Watch a transcript file and forward new blocks (starts paused; type `t` + Enter)
//! patch-bridge watch --source chat.txt
//!
//! # One-shot extraction of blocks from a file or stdin
//! patch-bridge extract chat.txt
//! pbpaste | patch-bridge extract -
//!
//! # End a session so its blocks can be sent again
//! patch-bridge session end --session default
//! ```

use clap::{Parser, Subcommand};
use patch_bridge::config::ConfigError;
use patch_bridge::dedup::session_path;
use patch_bridge::{
    extract_blocks, Config, DedupStore, FileSource, HttpTransport, LogStatusSink, Scanner,
    ScannerCommand, ScannerOptions, ScannerState, ValidityFilter,
};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "patch-bridge", version, about = "Forward patch blocks from chat transcripts to a local backend")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll a transcript and forward new blocks
    Watch {
        /// Transcript file, re-read on every tick
        #[arg(short, long)]
        source: PathBuf,

        /// Backend URL
        #[arg(long)]
        endpoint: Option<String>,

        /// Scan period in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Session name
        #[arg(long)]
        session: Option<String>,

        /// Start scanning instead of paused
        #[arg(long)]
        start_scanning: bool,
    },

    /// Print the blocks found in a file (or `-` for stdin) as JSON lines
    Extract {
        #[arg(default_value = "-")]
        input: String,
    },

    /// Inspect or end a session
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Write a configuration file with every default filled in
    InitConfig {
        /// Destination, defaults to the standard config path
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum SessionAction {
    /// Show how many blocks were sent in a session
    Show {
        #[arg(long)]
        session: Option<String>,
    },
    /// End a session, forgetting every block sent in it
    End {
        #[arg(long)]
        session: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_config_path);
    let loaded = Config::load_from_path(&config_path);

    // Initialize logging
    let log_level = match &loaded {
        Ok(config) => config.general.log_level.clone(),
        Err(_) => "info".to_string(),
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or(log_level),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let mut config = settle_config(&config_path, loaded, &cli.command)?;

    match cli.command {
        Command::Watch {
            source,
            endpoint,
            interval_ms,
            session,
            start_scanning,
        } => {
            if let Some(endpoint) = endpoint {
                config.dispatch.endpoint = endpoint;
            }
            if let Some(interval_ms) = interval_ms {
                config.scan.interval_ms = interval_ms;
            }
            if let Some(session) = session {
                config.session.name = session;
            }
            if start_scanning {
                config.scan.start_paused = false;
            }
            watch(config, source).await
        }
        Command::Extract { input } => extract(&config, &input),
        Command::Session { action } => match action {
            SessionAction::Show { session } => {
                let store = open_session(&config, session)?;
                println!("{} block(s) sent", store.len());
                Ok(())
            }
            SessionAction::End { session } => {
                let mut store = open_session(&config, session)?;
                store.clear()?;
                println!("Session ended");
                Ok(())
            }
        },
        Command::InitConfig { path } => {
            let path = path.unwrap_or(config_path);
            Config::default().save_to_path(path.clone())?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}

async fn watch(config: Config, source: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let store = DedupStore::open(session_path(&config.session.dir(), &config.session.name))?;
    let transport = HttpTransport::new(config.dispatch.endpoint.clone(), config.dispatch.timeout())?;
    info!("Forwarding blocks to {}", transport.endpoint());

    let scanner = Scanner::new(
        ScannerState::new(store, config.scan.start_paused, config.status.corner),
        Box::new(FileSource::new(source)),
        Arc::new(transport),
        Box::new(LogStatusSink::new()),
        ScannerOptions::from_config(&config),
    );

    let (command_tx, command_rx) = mpsc::channel::<ScannerCommand>(16);

    // Control commands typed on stdin
    let stdin_tx = command_tx.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match parse_command(&line) {
                    Some(command) => {
                        if stdin_tx.send(command).await.is_err() {
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => warn!("Unknown command {:?} (t, p, r, m, s, q)", line.trim()),
                },
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });

    // Handle shutdown gracefully
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down...");
            let _ = command_tx.send(ScannerCommand::Shutdown).await;
        }
    });

    let mut state = scanner.run(command_rx).await;

    if config.session.clear_on_exit {
        state.store.clear()?;
    }

    Ok(())
}

/// Decide what to run with after loading the config file. A broken file
/// stops every command except `init-config`, which overwrites it.
fn settle_config(
    path: &Path,
    loaded: Result<Config, ConfigError>,
    command: &Command,
) -> Result<Config, ConfigError> {
    match loaded {
        Ok(config) => {
            if path.exists() {
                info!("Configuration loaded from {:?}", path);
            } else {
                info!("No config file found at {:?}, using defaults", path);
            }
            Ok(config)
        }
        Err(e) if matches!(command, Command::InitConfig { .. }) => {
            warn!("{}, replacing it with defaults", e);
            Ok(Config::default())
        }
        Err(e) => {
            error!("{}", e);
            Err(e)
        }
    }
}

fn parse_command(line: &str) -> Option<ScannerCommand> {
    match line.trim().to_ascii_lowercase().as_str() {
        "t" | "toggle" => Some(ScannerCommand::Toggle),
        "p" | "pause" => Some(ScannerCommand::Pause),
        "r" | "resume" => Some(ScannerCommand::Resume),
        "m" | "move" => Some(ScannerCommand::MoveCorner),
        "s" | "scan" => Some(ScannerCommand::ScanNow),
        "q" | "quit" => Some(ScannerCommand::Shutdown),
        _ => None,
    }
}

fn extract(config: &Config, input: &str) -> Result<(), Box<dyn std::error::Error>> {
    let text = if input == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        text
    } else {
        std::fs::read_to_string(input)?
    };

    let filter = ValidityFilter::new(config.scan.max_single_line_chars);
    for block in extract_blocks(&text) {
        let line = serde_json::json!({
            "file_path": block.file_path,
            "search_content": block.search_content,
            "replace_content": block.replace_content,
            "fingerprint": block.fingerprint(),
            "suspicious": filter.is_suspicious(&block),
        });
        println!("{}", line);
    }

    Ok(())
}

fn open_session(config: &Config, session: Option<String>) -> Result<DedupStore, Box<dyn std::error::Error>> {
    let name = session.unwrap_or_else(|| config.session.name.clone());
    Ok(DedupStore::open(session_path(&config.session.dir(), &name))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("t"), Some(ScannerCommand::Toggle));
        assert_eq!(parse_command("  Pause \n"), Some(ScannerCommand::Pause));
        assert_eq!(parse_command("m"), Some(ScannerCommand::MoveCorner));
        assert_eq!(parse_command("quit"), Some(ScannerCommand::Shutdown));
        assert_eq!(parse_command("launch"), None);
    }

    #[test]
    fn test_broken_config_stops_commands() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[dispatch]\nendpoint = 5").unwrap();

        let show = Cli::parse_from(["patch-bridge", "session", "show"]);
        let result = settle_config(&path, Config::load_from_path(&path), &show.command);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));

        let init = Cli::parse_from(["patch-bridge", "init-config"]);
        let config = settle_config(&path, Config::load_from_path(&path), &init.command).unwrap();
        assert_eq!(config.dispatch.endpoint, Config::default().dispatch.endpoint);
    }

    #[test]
    fn test_cli_parses_watch() {
        let cli = Cli::parse_from(["patch-bridge", "watch", "--source", "chat.txt", "--start-scanning"]);
        match cli.command {
            Command::Watch {
                source,
                start_scanning,
                ..
            } => {
                assert_eq!(source, PathBuf::from("chat.txt"));
                assert!(start_scanning);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
