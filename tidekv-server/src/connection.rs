//! # Connection Pipeline
//!
//! Purpose: Decode → validate → execute → reply → propagate, for one
//! accepted TCP connection or one replica-handshake handoff.
//!
//! ## Design Principles
//! 1. **One Pipeline, Two Entry Points**: a freshly-accepted client
//!    connection and a post-handshake replica connection both end up
//!    running the same [`run`] loop; role-specific behaviour (reply
//!    suppression, no propagation) falls out of `ServerInfo::is_replica`
//!    rather than a second code path.
//! 2. **Writer Behind a Shared Lock From The Start**: every connection's
//!    write half is wrapped in `Arc<Mutex<_>>` up front so that handling
//!    `REPLSYNC` — which must hand a clone of that same writer to the
//!    replication coordinator — needs no special-case type.
//! 3. **A Replica's Write Failure Never Fails The Client**: propagation
//!    failures are handled entirely inside `ReplicationCoordinator`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};

use tidekv_common::codec::encode_bulk_array;
use tidekv_common::info::ServerInfo;
use tidekv_engine::Cache;

use crate::command::{self, Dispatch};
use crate::decoder::{decode_loop, QUEUE_CAPACITY};
use crate::metrics::Metrics;
use crate::replication::ReplicationCoordinator;

/// State shared by every connection on this process.
pub struct Shared {
    pub cache: Arc<Cache>,
    pub info: ServerInfo,
    pub replication: ReplicationCoordinator,
    pub metrics: Metrics,
    pub snapshot_path: String,
}

/// Runs the full pipeline over a freshly-accepted client connection.
pub async fn handle_connection(stream: TcpStream, shared: Arc<Shared>) {
    let peer = match stream.peer_addr() {
        Ok(addr) => addr,
        Err(_) => return,
    };
    stream.set_nodelay(true).ok();
    let (read_half, write_half) = stream.into_split();
    let writer = Arc::new(Mutex::new(write_half));
    run(read_half, writer, BytesMut::new(), peer, shared).await;
}

/// Runs the same pipeline over a connection that already completed the
/// replica handshake (see `replication::handshake_replica`), carrying
/// forward any bytes the master pipelined past the handshake frames.
pub async fn handle_replica_connection(
    read_half: OwnedReadHalf,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    leftover: BytesMut,
    peer: SocketAddr,
    shared: Arc<Shared>,
) {
    run(read_half, writer, leftover, peer, shared).await;
}

async fn run(
    read_half: OwnedReadHalf,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    leftover: BytesMut,
    peer: SocketAddr,
    shared: Arc<Shared>,
) {
    let (tx, mut rx) = mpsc::channel(QUEUE_CAPACITY);
    tokio::spawn(decode_loop(read_half, leftover, tx));

    while let Some(frame) = rx.recv().await {
        let Some((name, args)) = frame.into_command() else {
            write_reply(&writer, &encode_error("empty command")).await;
            continue;
        };

        let name_upper = command::upper(&name);
        let started = Instant::now();
        shared.metrics.record_request_start();

        if let Err(reason) = command::validate(&name_upper, &args) {
            shared.metrics.record_error();
            shared.metrics.record_request_end(started.elapsed());
            write_reply(&writer, &encode_error(&reason)).await;
            continue;
        }

        if name_upper == b"REPLSYNC" {
            handle_replsync(&writer, peer, &shared).await;
            shared.metrics.record_request_end(started.elapsed());
            continue;
        }

        match command::execute(&name_upper, &args, &shared.cache, &shared.info) {
            Dispatch::Reply(reply) => {
                shared.metrics.record_request_end(started.elapsed());
                if !reply.is_empty() {
                    if !write_reply(&writer, &reply).await {
                        break;
                    }
                }
                if command::is_mutating(&name_upper) && !shared.info.is_replica() {
                    shared.replication.propagate(&name, &args).await;
                }
            }
            Dispatch::ReplSync => unreachable!("REPLSYNC is intercepted above"),
        }
    }
}

async fn handle_replsync(writer: &Arc<Mutex<OwnedWriteHalf>>, peer: SocketAddr, shared: &Shared) {
    shared.replication.register(peer.ip().to_string(), peer.port(), writer.clone()).await;

    // No periodic snapshot has run yet on a freshly-started master (the
    // scheduler skips its first tick — see snapshot.rs); an empty payload
    // is a valid full sync, not an error, so a replica can still attach.
    let snapshot = std::fs::read(&shared.snapshot_path).unwrap_or_default();
    let reply = encode_bulk_array(&[b"FULLSYNC".as_slice(), &snapshot]);
    write_reply(writer, &reply).await;
}

fn encode_error(reason: &str) -> Vec<u8> {
    tidekv_common::codec::encode_bulk(format!("ERROR: {reason}").as_bytes())
}

/// Writes `bytes` on `writer`. Returns `false` on I/O failure, signalling
/// the caller to stop serving this connection.
async fn write_reply(writer: &Arc<Mutex<OwnedWriteHalf>>, bytes: &[u8]) -> bool {
    let mut guard = writer.lock().await;
    guard.write_all(bytes).await.is_ok()
}
