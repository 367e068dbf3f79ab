//! Huddle server binary.
//!
//! # Usage
//!
//! ```bash
//! # Flat-file tables in the current directory, localhost only
//! huddle-server 8080
//!
//! # Redb tables, reachable from the network, higher limits
//! huddle-server 8080 --bind-ip 0.0.0.0 --data-dir /var/lib/huddle --backend redb --max-sessions 500
//! ```

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use huddle_server::{
    FileStore, Limits, RecordStore, RedbStore, Server, ServerConfig, ServerError, StoreBackend,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// File name of the Redb database inside the data directory.
const REDB_FILE: &str = "huddle.redb";

/// Huddle chat server
#[derive(Parser, Debug)]
#[command(name = "huddle-server")]
#[command(about = "Line-oriented chat server with contacts and groups")]
#[command(version)]
struct Args {
    /// Port to listen on
    port: u16,

    /// IP address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    bind_ip: String,

    /// Directory holding the user and group tables
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    /// Record store backend (file, redb)
    #[arg(long, default_value = "file")]
    backend: StoreBackend,

    /// Maximum concurrent sessions
    #[arg(long, default_value = "100")]
    max_sessions: usize,

    /// Maximum number of groups
    #[arg(long, default_value = "10")]
    max_groups: usize,

    /// Pause between accepts in milliseconds
    #[arg(long, default_value = "1000")]
    accept_interval_ms: u64,

    /// Deadline for a single socket write in milliseconds
    #[arg(long, default_value = "5000")]
    write_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Huddle server starting");

    let config = ServerConfig {
        bind_address: format!("{}:{}", args.bind_ip, args.port),
        data_dir: args.data_dir,
        backend: args.backend,
        accept_interval: Duration::from_millis(args.accept_interval_ms),
        write_timeout: Duration::from_millis(args.write_timeout_ms),
        limits: Limits {
            max_sessions: args.max_sessions,
            max_groups: args.max_groups,
            ..Limits::default()
        },
    };

    tracing::info!("Binding to {}", config.bind_address);
    tracing::info!("Record store: {:?} in {}", config.backend, config.data_dir.display());

    match config.backend {
        StoreBackend::File => {
            let store = FileStore::open(&config.data_dir)?;
            serve(config, store).await?;
        },
        StoreBackend::Redb => {
            std::fs::create_dir_all(&config.data_dir)
                .map_err(|e| ServerError::Config(format!("unusable data directory: {e}")))?;
            let store = RedbStore::open(config.data_dir.join(REDB_FILE))?;
            serve(config, store).await?;
        },
    }

    Ok(())
}

async fn serve<S: RecordStore>(config: ServerConfig, store: S) -> Result<(), ServerError> {
    let server = Server::bind(config, store).await?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    server.run().await
}
