//! Sealform server binary.
//!
//! # Usage
//!
//! ```bash
//! # Development: in-memory storage, unsigned manifests, no bot check
//! sealform-server --bind 127.0.0.1:8080 --scales scales.json
//!
//! # Production
//! sealform-server --bind 0.0.0.0:8080 --db /var/lib/sealform/vault.redb \
//!     --signing-key /etc/sealform/manifest.key --turnstile-secret "$TURNSTILE_SECRET" \
//!     --scales /etc/sealform/scales.json
//! ```

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use sealform_core::{ExportPolicy, VaultConfig};
use sealform_server::{Server, ServerRuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Sealform E2EE survey vault
#[derive(Parser, Debug)]
#[command(name = "sealform-server")]
#[command(about = "End-to-end encrypted survey intake, export and key rotation")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    bind: String,

    /// Redb database file (in-memory storage when omitted)
    #[arg(long)]
    db: Option<PathBuf>,

    /// File holding a hex Ed25519 seed for manifest signing
    #[arg(long)]
    signing_key: Option<PathBuf>,

    /// Cloudflare Turnstile secret
    #[arg(long, env = "SEALFORM_TURNSTILE_SECRET", hide_env_values = true)]
    turnstile_secret: Option<String>,

    /// Export job lifetime in seconds
    #[arg(long, default_value = "300")]
    export_ttl_secs: u64,

    /// Window in which a repeated export request reuses the previous job
    #[arg(long, default_value = "30")]
    export_reuse_secs: u64,

    /// Minimum seconds between new export jobs per tenant
    #[arg(long, default_value = "10")]
    export_min_interval_secs: u64,

    /// JSON file of scales to seed at startup
    #[arg(long)]
    scales: Option<PathBuf>,

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

    tracing::info!("Sealform server starting");
    tracing::info!("Binding to {}", args.bind);

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        db_path: args.db,
        signing_key_path: args.signing_key,
        turnstile_secret: args.turnstile_secret,
        scales_path: args.scales,
        vault: VaultConfig {
            export: ExportPolicy {
                job_ttl: Duration::from_secs(args.export_ttl_secs),
                reuse_window: Duration::from_secs(args.export_reuse_secs),
                min_interval: Duration::from_secs(args.export_min_interval_secs),
            },
            ..VaultConfig::default()
        },
    };

    let server = Server::bind(config).await?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
