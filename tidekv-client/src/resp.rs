//! # Response Reading
//!
//! Purpose: Pull one [`Frame`] at a time off a blocking `TcpStream`,
//! reusing the same [`FrameParser`] the server's streaming decoder runs
//! on, instead of maintaining a second copy of the frame grammar here.
//!
//! ## Design Principles
//! 1. **One Grammar, One Parser**: `tidekv_common::codec` is the single
//!    source of truth for what a frame looks like on the wire.
//! 2. **Buffer Reuse**: the caller keeps one `BytesMut` per connection so
//!    bytes that arrive past a response's boundary (pipelining) are not
//!    discarded.
//! 3. **Binary-Safe**: bulk strings are treated as raw bytes throughout.

use std::io::Read;
use std::net::TcpStream;

use bytes::BytesMut;
use tidekv_common::codec::{Frame, FrameParser};

use crate::client::{ClientError, ClientResult};

/// Reads exactly one frame from `stream`, blocking and growing `buf` as
/// needed. Bytes left in `buf` after a frame is parsed carry forward to
/// the next call, mirroring the server decoder's resumable-parse model.
pub fn read_frame(stream: &mut TcpStream, buf: &mut BytesMut) -> ClientResult<Frame> {
    let mut parser = FrameParser::new();
    let mut chunk = [0u8; 4096];

    loop {
        if let Some(frame) = parser.parse(buf).map_err(|_| ClientError::Protocol)? {
            return Ok(frame);
        }
        let read = stream.read(&mut chunk)?;
        if read == 0 {
            return Err(ClientError::Protocol);
        }
        buf.extend_from_slice(&chunk[..read]);
    }
}
