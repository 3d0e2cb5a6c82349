//! roguehunterd - per-process rogue resource consumer watchdog.
//!
//! Samples process-level resource usage, scores and tracks sustained
//! offenders, captures forensic detail on escalation, and streams every
//! sample to connected clients over a local socket.

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod daemon;
mod forensics_runner;
mod streaming;

use std::path::PathBuf;

use clap::Parser;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

/// Per-process rogue resource consumer watchdog.
#[derive(Parser)]
#[command(name = "roguehunterd", about = "Per-process rogue resource consumer watchdog", version)]
struct Args {
    /// Path to the TOML configuration file. Missing file falls back to defaults.
    #[arg(short, long, default_value = "/etc/roguehunter/config.toml")]
    config: PathBuf,

    /// Path to the sqlite database file.
    #[arg(long, default_value = "/var/db/roguehunter/roguehunter.db")]
    db: PathBuf,

    /// Path of the Unix stream socket to bind for the streaming server.
    #[arg(long, default_value = "/var/run/roguehunter.sock")]
    socket: PathBuf,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("roguehunterd={}", level).parse().unwrap())
        .add_directive(format!("roguehunter_core={}", level).parse().unwrap());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    info!(
        "roguehunterd {} ({}) starting",
        env!("CARGO_PKG_VERSION"),
        roguehunter_core::GIT_SHA
    );

    let paths = daemon::Paths {
        config: args.config,
        db: args.db,
        socket: args.socket,
    };

    if let Err(e) = daemon::run(paths).await {
        error!("roguehunterd exiting: {e}");
        std::process::exit(1);
    }
}
