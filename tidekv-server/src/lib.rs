//! # tidekv-server
//!
//! Wires the streaming decoder, command registry, connection pipeline,
//! replication coordinator, and snapshot scheduler around a
//! [`tidekv_engine::Cache`] into a running TCP server, as either a
//! master or a replica.

pub mod command;
pub mod config;
pub mod connection;
pub mod decoder;
pub mod metrics;
pub mod replication;
pub mod snapshot;

pub use config::ServerConfig;
pub use connection::Shared;
