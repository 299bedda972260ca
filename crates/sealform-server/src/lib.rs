//! Sealform production server.
//!
//! Production glue around [`sealform_core`]: an axum HTTP surface, the redb
//! durable store, the system clock and OS RNG, an Ed25519 manifest signer
//! and the Cloudflare Turnstile client.
//!
//! # Architecture
//!
//! The core is synchronous and I/O free. This crate supplies the concrete
//! collaborators and runs every vault call on Tokio's blocking pool, since
//! storage and the Turnstile client block.
//!
//! # Components
//!
//! - [`Server`]: binds the listener and serves the router
//! - [`http::router`]: routes, identity extraction and error mapping
//! - [`RedbStorage`] / [`MemoryStorage`] / [`ChaoticStorage`]: storage back-ends
//! - [`SystemEnv`]: production environment (real clock, crypto RNG)
//! - [`Ed25519Signer`], [`CloudflareTurnstile`]: collaborators

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
pub mod http;
mod signer;
pub mod storage;
mod system_env;
mod turnstile;

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

use axum::Router;
pub use error::ServerError;
use sealform_core::{Scale, ScaleStore, Storage, Vault, VaultConfig};
pub use signer::Ed25519Signer;
pub use storage::{ChaoticStorage, MemoryStorage, RedbStorage};
pub use system_env::SystemEnv;
use tokio::net::TcpListener;
use tracing::{info, warn};
pub use turnstile::{CloudflareTurnstile, SITEVERIFY_URL};

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:8080")
    pub bind_address: String,
    /// Redb database file; in-memory storage when `None`
    pub db_path: Option<PathBuf>,
    /// Hex Ed25519 seed for manifest signing; unsigned manifests when `None`
    pub signing_key_path: Option<PathBuf>,
    /// Turnstile secret; protected scales reject every submission when `None`
    pub turnstile_secret: Option<String>,
    /// JSON array of scales to upsert at startup
    pub scales_path: Option<PathBuf>,
    /// Vault timing and limits
    pub vault: VaultConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            db_path: None,
            signing_key_path: None,
            turnstile_secret: None,
            scales_path: None,
            vault: VaultConfig::default(),
        }
    }
}

/// Production sealform server.
pub struct Server {
    listener: TcpListener,
    app: Router,
}

impl Server {
    /// Open storage, assemble the vault and bind the listener.
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        let app = match &config.db_path {
            Some(path) => {
                info!("Opening database at {}", path.display());
                build_app(RedbStorage::open(path)?, &config)?
            },
            None => {
                warn!("No database configured - responses are kept in memory only");
                build_app(MemoryStorage::new(), &config)?
            },
        };

        let listener = TcpListener::bind(&config.bind_address)
            .await
            .map_err(|e| ServerError::Transport(format!("{}: {e}", config.bind_address)))?;

        Ok(Self { listener, app })
    }

    /// Serve requests until Ctrl-C.
    pub async fn run(self) -> Result<(), ServerError> {
        info!("Server starting on {}", self.local_addr()?);

        axum::serve(self.listener, self.app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server stopped");
        Ok(())
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }
}

/// Upsert the scales listed in a JSON seed file. Returns how many were read.
pub fn seed_scales<S: ScaleStore>(storage: &S, path: &Path) -> Result<usize, ServerError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
    let scales: Vec<Scale> = serde_json::from_str(&raw)
        .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;

    for scale in &scales {
        storage.put_scale(scale)?;
    }
    Ok(scales.len())
}

fn build_app<S: Storage>(storage: S, config: &ServerRuntimeConfig) -> Result<Router, ServerError> {
    if let Some(path) = &config.scales_path {
        let count = seed_scales(&storage, path)?;
        info!("Seeded {count} scales from {}", path.display());
    }

    let mut vault = Vault::new(SystemEnv::new(), storage, config.vault.clone());

    match &config.signing_key_path {
        Some(path) => {
            let signer = Ed25519Signer::from_file(path)?;
            info!(verifying_key = %signer.verifying_key_hex(), "Manifest signing enabled");
            vault = vault.with_signer(Arc::new(signer));
        },
        None => warn!("No signing key configured - export manifests are unsigned"),
    }

    match &config.turnstile_secret {
        Some(secret) => {
            vault = vault.with_verifier(Arc::new(CloudflareTurnstile::new(secret.clone())));
        },
        None => warn!("No Turnstile secret - submissions to protected scales will be rejected"),
    }

    Ok(http::router(Arc::new(vault)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
