//! # Sync Client
//!
//! Provide a lightweight, synchronous client with connection pooling to
//! minimize TCP handshake overhead. Speaks the same wire codec
//! (`tidekv_common::codec`) as the server's decoder, so there is exactly
//! one place in the workspace that understands the frame grammar.

mod client;
mod pool;
mod resp;

pub use client::{ClientConfig, ClientError, ClientResult, KVClient};
