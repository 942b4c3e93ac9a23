//! # tidekv-common
//!
//! Shared wire codec, error taxonomy, and process-wide server info used by
//! both the server and the sync client.

pub mod codec;
pub mod error;
pub mod info;

pub use codec::{encode_bulk, encode_bulk_array, encode_nil_bulk, encode_simple, Frame, FrameParser};
pub use error::{DecodeError, KvError, KvResult};
pub use info::ServerInfo;
