//! End-to-end tests driving a real `tidekv-server` pipeline over real TCP
//! sockets, using the sync `tidekv-client` the way an external caller would.

use std::sync::Arc;
use std::time::Duration;

use tidekv_client::KVClient;
use tidekv_engine::Cache;
use tokio::net::TcpListener;

use tidekv_server::connection::{handle_connection, handle_replica_connection, Shared};
use tidekv_server::metrics::Metrics;
use tidekv_server::replication::{handshake_replica, ReplicationCoordinator};

use tidekv_common::info::ServerInfo;

fn temp_path(name: &str) -> String {
    std::env::temp_dir()
        .join(format!("tidekv-it-{name}-{:?}", std::thread::current().id()))
        .to_string_lossy()
        .into_owned()
}

/// Binds a master on an ephemeral port, spawns the accept loop, and
/// returns its address alongside the `Shared` state so tests can poke
/// the cache directly.
async fn spawn_master(shard_count: usize, capacity_per_shard: usize, snapshot_path: String) -> (String, Arc<Shared>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shared = Arc::new(Shared {
        cache: Arc::new(Cache::new(shard_count, capacity_per_shard)),
        info: ServerInfo::master(addr.port()),
        replication: ReplicationCoordinator::new(),
        metrics: Metrics::new(),
        snapshot_path,
    });

    let accept_shared = Arc::clone(&shared);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _peer)) = listener.accept().await else {
                return;
            };
            tokio::spawn(handle_connection(stream, Arc::clone(&accept_shared)));
        }
    });

    (addr.to_string(), shared)
}

fn connect(addr: &str) -> KVClient {
    KVClient::connect(addr).expect("client connects")
}

#[tokio::test(flavor = "multi_thread")]
async fn ping_echo_and_info_roundtrip_through_a_real_socket() {
    let (addr, _shared) = spawn_master(4, 100, temp_path("ping")).await;
    let client = connect(&addr);

    assert_eq!(client.ping().unwrap(), b"PONG");
    assert_eq!(client.echo(&[b"hello", b"world"]).unwrap(), b"hello world");
    assert_eq!(client.info().unwrap(), b"role:master");
}

#[tokio::test(flavor = "multi_thread")]
async fn set_get_delete_roundtrip_through_a_real_socket() {
    let (addr, _shared) = spawn_master(4, 100, temp_path("setget")).await;
    let client = connect(&addr);

    assert_eq!(client.get(b"missing").unwrap(), None);

    client.set(b"k", b"v1").unwrap();
    assert_eq!(client.get(b"k").unwrap().as_deref(), Some(&b"v1"[..]));

    client.set(b"k", b"v2").unwrap();
    assert_eq!(client.get(b"k").unwrap().as_deref(), Some(&b"v2"[..]));

    client.delete(b"k").unwrap();
    assert_eq!(client.get(b"k").unwrap(), None);
}

#[tokio::test(flavor = "multi_thread")]
async fn set_with_px_expires_the_key() {
    let (addr, _shared) = spawn_master(4, 100, temp_path("px")).await;
    let client = connect(&addr);

    client.set_with_ttl_ms(b"k", b"v", 30).unwrap();
    assert_eq!(client.get(b"k").unwrap().as_deref(), Some(&b"v"[..]));

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(client.get(b"k").unwrap(), None);
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_commands_surface_as_server_errors_not_panics() {
    let (addr, _shared) = spawn_master(4, 100, temp_path("badset")).await;
    let client = connect(&addr);

    // ECHO with no arguments is rejected by validate() before execute().
    match client.echo(&[]) {
        Err(tidekv_client::ClientError::Server { message }) => {
            assert!(message.starts_with(b"ERROR: "));
        }
        other => panic!("expected a server error, got {other:?}"),
    }

    // EX is not PX: also rejected by validate(), never reaches the cache.
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    let mut stream = TcpStream::connect(&addr).await.unwrap();
    stream
        .write_all(&tidekv_common::codec::encode_bulk_array(&[
            b"SET".as_slice(),
            b"k".as_slice(),
            b"v".as_slice(),
            b"EX".as_slice(),
            b"10".as_slice(),
        ]))
        .await
        .unwrap();
    let mut buf = vec![0u8; 256];
    let n = stream.read(&mut buf).await.unwrap();
    assert!(buf[..n].starts_with(b"$"), "expected a bulk error reply, got {:?}", &buf[..n]);
    assert!(
        buf[..n].windows(7).any(|w| w == b"ERROR: "),
        "expected an ERROR reply, got {:?}",
        &buf[..n]
    );

    // The connection stays open after a validation error; the cache was
    // never touched by the rejected SET.
    assert_eq!(client.get(b"k").unwrap(), None);
}

#[tokio::test(flavor = "multi_thread")]
async fn master_propagates_mutations_to_an_attached_replica() {
    let (master_addr, master_shared) = spawn_master(2, 100, temp_path("propagate-master")).await;

    let replica_cache = Arc::new(Cache::new(2, 100));
    let replica_shared = Arc::new(Shared {
        cache: Arc::clone(&replica_cache),
        info: ServerInfo::replica(0, master_addr.clone()),
        replication: ReplicationCoordinator::new(),
        metrics: Metrics::new(),
        snapshot_path: temp_path("propagate-replica"),
    });

    // No snapshot file exists yet at this master (the scheduler has not
    // ticked) — the handshake must still succeed with an empty full sync,
    // matching a freshly-started master in practice.
    let outcome = handshake_replica(&master_addr, &replica_cache).await.unwrap();
    tokio::spawn(handle_replica_connection(
        outcome.read_half,
        outcome.writer,
        outcome.leftover,
        "127.0.0.1:1".parse().unwrap(),
        replica_shared,
    ));

    // The master now has exactly one registered replica.
    assert_eq!(master_shared.replication.len().await, 1);

    let client = connect(&master_addr);
    client.set(b"shared-key", b"shared-value").unwrap();

    let mut seen = None;
    for _ in 0..50 {
        if let Some(value) = replica_cache.get(b"shared-key") {
            seen = Some(value);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(seen.as_deref(), Some(&b"shared-value"[..]));

    client.delete(b"shared-key").unwrap();
    let mut gone = false;
    for _ in 0..50 {
        if replica_cache.get(b"shared-key").is_none() {
            gone = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(gone, "delete was not propagated to the replica");
}

#[tokio::test(flavor = "multi_thread")]
async fn replica_handshake_loads_the_master_snapshot_with_no_expiry() {
    let snapshot_path = temp_path("fullsync");
    let (master_addr, master_shared) = spawn_master(1, 100, snapshot_path.clone()).await;

    // A key with a short TTL on the master: the snapshot format drops TTL
    // entirely, so whatever the replica loads must never expire.
    master_shared.cache.set(Arc::from(&b"preexisting"[..]), Arc::from(&b"value"[..]), Some(30));
    master_shared.cache.snapshot(&snapshot_path).unwrap();

    let replica_cache = Arc::new(Cache::new(1, 100));
    let outcome = handshake_replica(&master_addr, &replica_cache).await.unwrap();
    drop(outcome);

    assert_eq!(replica_cache.get(b"preexisting").as_deref(), Some(&b"value"[..]));

    // Long past the original 30ms TTL, the replica's copy is still live.
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(replica_cache.get(b"preexisting").as_deref(), Some(&b"value"[..]));

    let _ = std::fs::remove_file(&snapshot_path);
}

#[tokio::test(flavor = "multi_thread")]
async fn replica_suppresses_replies_to_its_own_mutating_commands() {
    // A client issuing SET directly against a replica instance gets the
    // same suppressed-reply behaviour as a propagated mutation: no bytes
    // at all, not an empty-but-present frame. Driven over a raw socket
    // (not the blocking client) since a suppressed reply would hang a
    // caller that insists on reading one.
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let replica_addr = listener.local_addr().unwrap();
    let shared = Arc::new(Shared {
        cache: Arc::new(Cache::new(1, 100)),
        info: ServerInfo::replica(0, "127.0.0.1:1".to_string()),
        replication: ReplicationCoordinator::new(),
        metrics: Metrics::new(),
        snapshot_path: temp_path("replica-direct-snap"),
    });
    tokio::spawn(async move {
        loop {
            let Ok((stream, _peer)) = listener.accept().await else {
                return;
            };
            tokio::spawn(handle_connection(stream, Arc::clone(&shared)));
        }
    });

    let mut stream = TcpStream::connect(replica_addr).await.unwrap();
    stream.write_all(&tidekv_common::codec::encode_bulk_array(&[
        b"SET".as_slice(),
        b"k".as_slice(),
        b"v".as_slice(),
    ])).await.unwrap();

    let mut probe = [0u8; 1];
    let timed_out = tokio::time::timeout(Duration::from_millis(150), stream.read(&mut probe))
        .await
        .is_err();
    assert!(timed_out, "a replica must not write any bytes back for a suppressed reply");

    // The connection is still alive: PING on it still gets a reply.
    stream.write_all(&tidekv_common::codec::encode_bulk_array(&[b"PING".as_slice()])).await.unwrap();
    let mut buf = vec![0u8; 64];
    let n = stream.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"+PONG\r\n");
}
