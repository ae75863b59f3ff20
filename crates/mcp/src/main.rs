//! MCP server exposing doltvec synchronization tools.
//!
//! Communicates via JSON-RPC 2.0 over stdin/stdout. Logs go to stderr so
//! they never interleave with the protocol stream.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use doltvec_core::chroma::ChromaHttp;
use doltvec_core::db::Database;
use doltvec_core::deletion::DeletionTracker;
use doltvec_core::dolt::DoltCli;
use doltvec_core::sync::SyncManager;
use doltvec_core::AppConfig;

mod server;
mod tools;

use server::McpServer;

/// MCP server for Dolt/ChromaDB synchronization.
///
/// Exposes commit, push, merge, reset, and conflict-resolution operations
/// as MCP tools for AI agents.
#[derive(Parser)]
#[command(name = "doltvec-mcp")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, short, value_name = "PATH", default_value = "doltvec.toml")]
    config: PathBuf,

    /// Enable debug logging to stderr.
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::from_default_env().add_directive("doltvec=debug".parse()?)
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::load_and_resolve(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;

    let repo_path = config.dolt.repo_path.display().to_string();
    let dolt = Arc::new(DoltCli::new(&config.dolt.binary, &config.dolt.repo_path));
    let chroma = Arc::new(ChromaHttp::new(&config.chroma).context("building chroma client")?);

    let db = Arc::new(Database::open(config.ledger_path()).context("opening deletion ledger")?);
    let tracker = Arc::new(DeletionTracker::new(db));
    tracker
        .initialize(&repo_path)
        .context("initializing deletion ledger")?;

    let manager = Arc::new(SyncManager::new(
        dolt,
        chroma,
        tracker,
        config.sync.chunk_separator.clone(),
        config.sync.auto_resolve,
    ));

    let mut server = McpServer::new(manager, config.dolt.remote.clone());
    server.run().await.context("server error")?;
    Ok(())
}
