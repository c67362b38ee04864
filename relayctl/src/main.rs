//! CLI entry point wiring `relay_core::Lifecycle`: bring the
//! connection/tunnel subsystem up and keep it running until interrupted.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::prelude::*;

use relay_core::{BuildInfo, Lifecycle, LogMode};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "relayctl")]
#[command(version = VERSION)]
#[command(about = "Overlay relay network client")]
struct Cli {
    /// Directory holding config.toml and the client database (defaults to
    /// the platform data directory).
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Enable debug-level logging.
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| config::default_db_path().parent().unwrap().to_path_buf());
    std::fs::create_dir_all(&data_dir).context("creating data directory")?;

    let figment = config::load(&data_dir);
    let mut cfg = config::resolve(&figment, data_dir.join("client.db"))
        .context("resolving configuration")?;
    cfg.debug = cfg.debug || cli.debug;

    let log_sink = init_tracing(&cfg);

    let build_info = BuildInfo {
        version: VERSION.to_string(),
        build_time: option_env!("RELAYCTL_BUILD_TIME")
            .unwrap_or("development")
            .to_string(),
    };

    // A real deployment derives this from a loaded keypair; relay-core
    // treats key derivation as an external collaborator.
    let client_pubkey = b"relayctl-placeholder-pubkey";

    let lifecycle = Lifecycle::init_with_log_sink(cfg, build_info, client_pubkey, log_sink)
        .context("initializing relay client")?;

    lifecycle.start().await.context("starting relay client")?;
    info!("relay client started, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    lifecycle.close().await.context("stopping relay client")?;
    Ok(())
}

/// Set up the global tracing subscriber per `cfg.log_mode`. An `EnvFilter`
/// seeded from `RUST_LOG` takes priority, falling back to a debug/info
/// directive selected by `cfg.debug`.
///
/// In `LogMode::File`, opens (creating/appending) `cfg.log_file_path` and
/// writes there instead of stdout, with ANSI color codes disabled since
/// the destination is a plain file. Returns the file handle so the caller
/// can hand it to `Lifecycle` for closing on shutdown — the subscriber
/// itself only ever sees a cloned handle.
fn init_tracing(cfg: &relay_core::Config) -> Option<std::fs::File> {
    let default_directive = if cfg.debug {
        "relay_core=debug,relayctl=debug,info"
    } else {
        "relay_core=info,relayctl=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    match cfg.log_mode {
        LogMode::Console => {
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer())
                .with(env_filter)
                .init();
            None
        }
        LogMode::File => {
            let path = cfg
                .log_file_path
                .clone()
                .unwrap_or_else(|| cfg.db_path.with_file_name("relayctl.log"));
            let file = match std::fs::OpenOptions::new().create(true).append(true).open(&path) {
                Ok(f) => f,
                Err(_) => {
                    // Best-effort: fall back to console rather than fail
                    // startup over a log file that couldn't be opened.
                    tracing_subscriber::registry()
                        .with(tracing_subscriber::fmt::layer())
                        .with(env_filter)
                        .init();
                    return None;
                }
            };
            let Ok(writer) = file.try_clone() else {
                tracing_subscriber::registry()
                    .with(tracing_subscriber::fmt::layer())
                    .with(env_filter)
                    .init();
                return None;
            };

            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_writer(std::sync::Mutex::new(writer))
                .with_ansi(false);
            if cfg.log_date_time {
                tracing_subscriber::registry()
                    .with(fmt_layer)
                    .with(env_filter)
                    .init();
            } else {
                tracing_subscriber::registry()
                    .with(fmt_layer.without_time())
                    .with(env_filter)
                    .init();
            }
            Some(file)
        }
    }
}
