//! # Process Entry Point
//!
//! Purpose: Parse configuration, set up logging, bring the cache and
//! replication coordinator online, and run the accept loop until
//! shutdown.
//!
//! ## Design Principles
//! 1. **Fatal Errors Abort**: a bind failure or a replica handshake
//!    failure exits the process with a non-zero status; there is no
//!    partial-degraded mode.
//! 2. **`anyhow` At The Boundary**: only `main` needs rich error context
//!    for a human; everything below returns `KvError`/`std::io::Error`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use tidekv_common::info::ServerInfo;
use tidekv_engine::Cache;
use tidekv_server::connection::{handle_connection, handle_replica_connection, Shared};
use tidekv_server::replication::{handshake_replica, ReplicationCoordinator};
use tidekv_server::snapshot::SnapshotScheduler;
use tidekv_server::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::parse_args();

    let cache = Arc::new(Cache::new(config.shard_count, config.capacity_per_shard));
    let info = if let Some(master_addr) = config.replicaof.clone() {
        ServerInfo::replica(config.port, master_addr)
    } else {
        ServerInfo::master(config.port)
    };

    let shared = Arc::new(Shared {
        cache: Arc::clone(&cache),
        info,
        replication: ReplicationCoordinator::new(),
        metrics: tidekv_server::metrics::Metrics::new(),
        snapshot_path: config.snapshot_path(),
    });

    let listen_addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse().context("invalid listen port")?;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind :{}", config.port))?;
    tracing::info!(port = config.port, role = shared.info.role_line(), "listening");

    if let Some(master_addr) = config.replicaof.as_deref() {
        start_replica(master_addr, Arc::clone(&shared)).await?;
    }

    let scheduler = SnapshotScheduler::spawn(
        cache,
        shared.snapshot_path.clone(),
        Duration::from_secs(config.snapshot_interval_secs),
    );

    accept_loop(listener, Arc::clone(&shared)).await;

    scheduler.stop().await;
    Ok(())
}

/// Runs the replica-side handshake; a failure here is fatal per spec.
async fn start_replica(master_addr: &str, shared: Arc<Shared>) -> anyhow::Result<()> {
    let outcome = handshake_replica(master_addr, &shared.cache)
        .await
        .with_context(|| format!("replication handshake with {master_addr} failed"))?;
    let peer: SocketAddr = master_addr
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)));

    tracing::info!(master = master_addr, "replication handshake complete");
    tokio::spawn(handle_replica_connection(
        outcome.read_half,
        outcome.writer,
        outcome.leftover,
        peer,
        shared,
    ));
    Ok(())
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tracing::debug!(%peer, "accepted connection");
                tokio::spawn(handle_connection(stream, Arc::clone(&shared)));
            }
            Err(err) => {
                tracing::warn!(%err, "accept failed");
            }
        }
    }
}
