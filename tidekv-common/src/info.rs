//! # Process-Wide Server Info
//!
//! Purpose: Hold the handful of facts about this instance (replica or
//! master, listen port, replication offset) that are written once at
//! startup and read from every connection handler thereafter.

use std::sync::atomic::{AtomicU64, Ordering};

/// Immutable-after-startup facts about this process, plus a mutable
/// replication offset counter.
#[derive(Debug)]
pub struct ServerInfo {
    is_replica: bool,
    master_addr: Option<String>,
    listen_port: u16,
    offset: AtomicU64,
}

impl ServerInfo {
    /// Builds a master's `ServerInfo`.
    pub fn master(listen_port: u16) -> Self {
        ServerInfo {
            is_replica: false,
            master_addr: None,
            listen_port,
            offset: AtomicU64::new(0),
        }
    }

    /// Builds a replica's `ServerInfo`.
    pub fn replica(listen_port: u16, master_addr: String) -> Self {
        ServerInfo {
            is_replica: true,
            master_addr: Some(master_addr),
            listen_port,
            offset: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn is_replica(&self) -> bool {
        self.is_replica
    }

    #[inline]
    pub fn master_addr(&self) -> Option<&str> {
        self.master_addr.as_deref()
    }

    #[inline]
    pub fn listen_port(&self) -> u16 {
        self.listen_port
    }

    /// Returns the `role:master`/`role:slave` line used by the INFO command.
    pub fn role_line(&self) -> &'static str {
        if self.is_replica {
            "role:slave"
        } else {
            "role:master"
        }
    }

    /// Returns the current replication offset.
    pub fn offset(&self) -> u64 {
        self.offset.load(Ordering::Relaxed)
    }

    /// Advances the replication offset by `delta` bytes.
    pub fn advance_offset(&self, delta: u64) {
        self.offset.fetch_add(delta, Ordering::Relaxed);
    }
}
