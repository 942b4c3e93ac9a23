//! # Replication Coordinator
//!
//! Purpose: Hold the master's replica set and drive both sides of the
//! `PING` → `REPLSYNC`/`FULLSYNC` handshake.
//!
//! ## Design Principles
//! 1. **Single Exclusive Lock, Async**: the replica set is written only
//!    by `REPLSYNC` handlers and by failed-propagation removal, and read
//!    by every mutating command; the lock is held across socket writes,
//!    so it is a `tokio::sync::Mutex`, not `parking_lot`.
//! 2. **Best-Effort, At-Most-Once**: there is no acknowledgement channel
//!    and no retry; a replica whose write fails is simply dropped from
//!    the set. A disconnected replica must re-initiate the handshake.
//! 3. **Snapshot Ingestion Without TTL**: the replica-side handshake
//!    applies the received snapshot with no expiry on any key — the
//!    snapshot format never carried TTL, so this is the only behaviour
//!    consistent with what is actually on the wire.

use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use tidekv_common::codec::{encode_bulk_array, Frame, FrameParser};
use tidekv_common::error::{KvError, KvResult};
use tidekv_engine::Cache;

/// A connected replica: enough to identify it in logs, plus a shared
/// handle to its write half for propagation.
pub struct ReplicaHandle {
    pub host: String,
    pub port: u16,
    writer: Arc<Mutex<OwnedWriteHalf>>,
}

/// The master-side replica set and propagation broadcast.
#[derive(Default)]
pub struct ReplicationCoordinator {
    replicas: Mutex<Vec<ReplicaHandle>>,
}

impl ReplicationCoordinator {
    pub fn new() -> Self {
        ReplicationCoordinator {
            replicas: Mutex::new(Vec::new()),
        }
    }

    /// Enrolls a newly-handshaken replica.
    pub async fn register(&self, host: String, port: u16, writer: Arc<Mutex<OwnedWriteHalf>>) {
        self.replicas.lock().await.push(ReplicaHandle { host, port, writer });
    }

    /// Number of currently attached replicas (diagnostic / test use).
    pub async fn len(&self) -> usize {
        self.replicas.lock().await.len()
    }

    /// Serialises `name`+`args` as a bulk-string array and writes it to
    /// every attached replica. A write failure removes that replica from
    /// the set; it never fails the caller's own command.
    pub async fn propagate(&self, name: &[u8], args: &[Vec<u8>]) {
        let mut items: Vec<&[u8]> = Vec::with_capacity(1 + args.len());
        items.push(name);
        for arg in args {
            items.push(arg);
        }
        let frame = encode_bulk_array(&items);

        let mut guard = self.replicas.lock().await;
        let mut survivors = Vec::with_capacity(guard.len());
        for replica in guard.drain(..) {
            let ok = {
                let mut writer = replica.writer.lock().await;
                writer.write_all(&frame).await.is_ok()
            };
            if ok {
                survivors.push(replica);
            } else {
                tracing::warn!(host = %replica.host, port = replica.port, "dropping replica after write failure");
            }
        }
        *guard = survivors;
    }
}

/// Reads one frame from `reader`, blocking (cooperatively) until a full
/// frame is available or the connection closes.
async fn read_one_frame(
    reader: &mut OwnedReadHalf,
    buf: &mut BytesMut,
    parser: &mut FrameParser,
) -> KvResult<Frame> {
    loop {
        if let Some(frame) = parser.parse(buf)? {
            return Ok(frame);
        }
        let n = reader.read_buf(buf).await?;
        if n == 0 {
            return Err(KvError::Handshake("connection closed during handshake".to_string()));
        }
    }
}

/// Result of a successful replica-side handshake: the read half, a
/// shared write half (reused by the normal connection pipeline so a
/// future `REPLSYNC` loop-back is impossible but the type stays
/// uniform), and any bytes the master already pipelined past the
/// `FULLSYNC` reply.
pub struct HandshakeOutcome {
    pub read_half: OwnedReadHalf,
    pub writer: Arc<Mutex<OwnedWriteHalf>>,
    pub leftover: BytesMut,
}

/// Performs the replica-side handshake against `master_addr`: `PING` →
/// `PONG`, then `REPLSYNC` → `[FULLSYNC, snapshot_bytes]`. The snapshot
/// is parsed and loaded into `cache` with no TTL on any key (see §9(c)
/// of the design notes: the snapshot format never carried expiry).
pub async fn handshake_replica(master_addr: &str, cache: &Cache) -> KvResult<HandshakeOutcome> {
    let stream = TcpStream::connect(master_addr).await?;
    stream.set_nodelay(true).ok();
    let (mut read_half, write_half) = stream.into_split();
    let writer = Arc::new(Mutex::new(write_half));

    let mut buf = BytesMut::with_capacity(8 * 1024);
    let mut parser = FrameParser::new();

    write_frame(&writer, &encode_bulk_array(&[b"PING".as_slice()])).await?;
    match read_one_frame(&mut read_half, &mut buf, &mut parser).await? {
        Frame::Simple(ref payload) if payload == b"PONG" => {}
        _ => return Err(KvError::Handshake("master did not reply PONG to PING".to_string())),
    }

    write_frame(&writer, &encode_bulk_array(&[b"REPLSYNC".as_slice()])).await?;
    match read_one_frame(&mut read_half, &mut buf, &mut parser).await? {
        Frame::Array(mut items) if items.first().map(|f| f.as_slice()) == Some(b"FULLSYNC") => {
            if items.len() == 2 {
                apply_snapshot(cache, &items.remove(1))?;
            }
        }
        Frame::Bulk(Some(payload)) if payload.starts_with(b"ERROR: ") => {
            return Err(KvError::Handshake(String::from_utf8_lossy(&payload).into_owned()));
        }
        _ => return Err(KvError::Handshake("master did not reply FULLSYNC to REPLSYNC".to_string())),
    }

    Ok(HandshakeOutcome {
        read_half,
        writer,
        leftover: buf,
    })
}

async fn write_frame(writer: &Arc<Mutex<OwnedWriteHalf>>, bytes: &[u8]) -> KvResult<()> {
    let mut guard = writer.lock().await;
    guard.write_all(bytes).await?;
    Ok(())
}

/// Loads every `[key, value]` frame in a snapshot payload into `cache`
/// with no expiry.
fn apply_snapshot(cache: &Cache, payload: &[u8]) -> KvResult<()> {
    let mut buf = BytesMut::from(payload);
    let mut parser = FrameParser::new();

    while !buf.is_empty() {
        match parser.parse(&mut buf)? {
            Some(Frame::Array(items)) if items.len() == 2 => {
                let mut items = items;
                let value = items.pop().unwrap();
                let key = items.pop().unwrap();
                cache.set(key.into(), value.into(), None);
            }
            Some(_) => return Err(KvError::Handshake("malformed snapshot entry".to_string())),
            None => break,
        }
    }
    Ok(())
}
