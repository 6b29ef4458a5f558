//! `remobridge` – exposes Nature Remo appliances and sensors as local
//! accessories.
//!
//! `remobridge serve`:
//!
//! 1. Loads `~/.remobridge/config.toml` (or `--config`) and applies
//!    `REMOBRIDGE_*` overrides; an invalid pin aborts startup.
//! 2. Optionally wipes the state directory (`--reset`).
//! 3. Discovers accessories from the cloud account.
//! 4. Serves them until SIGINT/SIGTERM.

mod config;
mod telemetry;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use remobridge_accessory::{BridgeContext, discover};
use remobridge_remote::{CommandDispatcher, NatureClient, RemoteApi, RemoteSnapshotCache};
use remobridge_server::AccessoryServer;

#[derive(Parser, Debug)]
#[command(name = "remobridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the bridge.
    Serve(ServeArgs),
}

#[derive(clap::Args, Debug)]
struct ServeArgs {
    /// Config file [default: ~/.remobridge/config.toml].
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// State directory [default: ~/.remobridge/db].
    #[arg(short = 'f', long = "fs-store")]
    fs_store: Option<PathBuf>,

    /// Remove the state directory before starting.
    #[arg(long)]
    reset: bool,

    /// Log at debug level regardless of RUST_LOG.
    #[arg(long)]
    debug: bool,
}

fn main() -> ExitCode {
    let Command::Serve(args) = Args::parse().command;

    // Before the runtime so a runtime start failure is still logged. The OTLP
    // exporter is the simple one for the same reason: no tokio to batch on.
    let _guard = telemetry::init_tracing("remobridge", args.debug);
    print_banner();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(serve(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "bridge failed");
            eprintln!("{}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn serve(args: ServeArgs) -> Result<(), String> {
    let config_path = args.config.unwrap_or_else(config::config_path);
    let cfg = match config::load_from(&config_path)? {
        Some(cfg) => {
            info!(path = %config_path.display(), "config loaded");
            cfg
        }
        None => {
            warn!(path = %config_path.display(), "no config file, using defaults");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };
    debug!(config = ?cfg, "effective configuration");

    config::validate_pin(&cfg.pin)?;
    if cfg.token.is_empty() {
        return Err(format!(
            "No API token: set `token` in {} or REMOBRIDGE_TOKEN",
            config_path.display()
        ));
    }

    let store = args.fs_store.unwrap_or_else(config::store_path);
    if args.reset {
        config::reset_store(&store)?;
        info!(store = %store.display(), "state directory reset");
    }
    // Reserved for pairing state; nothing is persisted there yet.
    config::create_private_dir(&store)?;

    let api: Arc<dyn RemoteApi> =
        Arc::new(NatureClient::new(cfg.token.clone()).with_base_url(cfg.api_base_url.clone()));
    let ctx = BridgeContext {
        cache: Arc::new(RemoteSnapshotCache::new(Arc::clone(&api))),
        dispatcher: Arc::new(CommandDispatcher::new(Arc::clone(&api))),
        api,
    };
    let registry = discover(&cfg.name, &ctx).await;

    println!("  {} {}", "Bridge:".bold(), cfg.name.cyan());
    println!("  {} {}", "Pin:   ".bold(), cfg.pin.yellow().bold());
    println!("  {} {}", "Port:  ".bold(), cfg.port);
    println!("  {} {}", "Accessories:".bold(), registry.len());
    println!();
    info!(name = %cfg.name, pin = %cfg.pin, port = cfg.port, "bridge ready");

    let (stop_tx, stop_rx) = watch::channel(false);
    let stop_tx = Arc::new(stop_tx);
    let handler_tx = Arc::clone(&stop_tx);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Shutdown requested – stopping bridge …".yellow().bold());
        let _ = handler_tx.send(true);
    }) {
        warn!(error = %e, "failed to install signal handler; stop the process with SIGKILL");
    }

    AccessoryServer::new(Arc::new(registry), cfg.pin.clone())
        .with_port(cfg.port)
        .run(stop_rx)
        .await
        .map_err(|e| e.to_string())?;

    println!("{}", "  ✓ Bridge stopped.".green());
    Ok(())
}

fn print_banner() {
    println!();
    println!(
        "  {} {}",
        "remobridge".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Nature Remo accessory bridge");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_flags_parse() {
        let args = Args::try_parse_from([
            "remobridge", "serve", "-c", "/tmp/c.toml", "-f", "/tmp/db", "--reset",
        ])
        .unwrap();
        let Command::Serve(opts) = args.command;
        assert_eq!(opts.config, Some(PathBuf::from("/tmp/c.toml")));
        assert_eq!(opts.fs_store, Some(PathBuf::from("/tmp/db")));
        assert!(opts.reset);
        assert!(!opts.debug);
    }

    #[test]
    fn serve_is_required() {
        assert!(Args::try_parse_from(["remobridge"]).is_err());
    }

    #[tokio::test]
    async fn invalid_pin_fails_before_touching_the_network() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "token = \"t\"\npin = \"1234\"\n").expect("write");

        let err = serve(ServeArgs {
            config: Some(path),
            fs_store: Some(dir.path().join("db")),
            reset: false,
            debug: false,
        })
        .await
        .unwrap_err();
        assert!(err.contains("Invalid pin"));
        assert!(!dir.path().join("db").exists());
    }
}
