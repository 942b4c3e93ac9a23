//! # Wire Codec
//!
//! Purpose: Encode and decode the three frame kinds of the line-oriented
//! protocol — simple strings, bulk strings, and bulk-string arrays — without
//! requiring a frame to fit in a single read.
//!
//! ## Design Principles
//!
//! 1. **Pure Encoding**: `encode_*` functions are free functions over bytes,
//!    no allocation beyond the returned buffer.
//! 2. **Byte-Counted Lengths**: Every length prefix is a raw byte count,
//!    never a UTF-8 character count — payloads are arbitrary bytes.
//! 3. **Resumable Parsing**: `FrameParser::parse` is safe to call again
//!    with a partially-filled buffer; it reports `Ok(None)` instead of
//!    consuming anything when a frame is incomplete, so the caller can
//!    keep appending to the same buffer across socket reads.
//!
//! ## Grammar
//!
//! ```text
//! simple string:      '+' payload CRLF
//! bulk string:         '$' length CRLF [bytes(length) CRLF]   (length -1 == nil, no body)
//! bulk string array:   '*' count CRLF  (bulk string){count}
//! ```

use bytes::{Buf, BytesMut};

use crate::error::DecodeError;

/// A fully decoded wire unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `+payload\r\n`
    Simple(Vec<u8>),
    /// `$len\r\n...\r\n`, or `$-1\r\n` for nil.
    Bulk(Option<Vec<u8>>),
    /// `*count\r\n` followed by `count` bulk strings.
    Array(Vec<Vec<u8>>),
}

impl Frame {
    /// Splits a command frame into an upper-cased command name and its
    /// argument list, following spec: arrays are `[name, args...]`, a bare
    /// simple string or non-nil bulk string is a zero-argument command.
    pub fn into_command(self) -> Option<(Vec<u8>, Vec<Vec<u8>>)> {
        match self {
            Frame::Array(mut items) => {
                if items.is_empty() {
                    None
                } else {
                    let name = items.remove(0);
                    Some((name, items))
                }
            }
            Frame::Simple(payload) => Some((payload, Vec::new())),
            Frame::Bulk(Some(payload)) => Some((payload, Vec::new())),
            Frame::Bulk(None) => None,
        }
    }
}

/// Encodes a simple string frame. `payload` must not contain CR or LF.
pub fn encode_simple(payload: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 3);
    out.push(b'+');
    out.extend_from_slice(payload.as_bytes());
    out.extend_from_slice(b"\r\n");
    out
}

/// Encodes a bulk string frame over raw bytes.
pub fn encode_bulk(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 16);
    out.push(b'$');
    out.extend_from_slice(data.len().to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
    out
}

/// Encodes the nil bulk string (`$-1\r\n`).
pub fn encode_nil_bulk() -> Vec<u8> {
    b"$-1\r\n".to_vec()
}

/// Encodes a bulk-string array frame.
pub fn encode_bulk_array<T: AsRef<[u8]>>(items: &[T]) -> Vec<u8> {
    let mut out = Vec::with_capacity(32 + items.len() * 16);
    out.push(b'*');
    out.extend_from_slice(items.len().to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    for item in items {
        out.extend_from_slice(&encode_bulk(item.as_ref()));
    }
    out
}

/// Stateless parser for the streaming decoder. Holds no buffered data of
/// its own — callers own a `BytesMut` and call `parse` after every read.
#[derive(Debug, Default)]
pub struct FrameParser;

impl FrameParser {
    pub fn new() -> Self {
        FrameParser
    }

    /// Attempts to decode one frame from the front of `buf`.
    ///
    /// - `Ok(Some(frame))`: a full frame was decoded and removed from `buf`.
    /// - `Ok(None))`: `buf` does not yet contain a complete frame; nothing
    ///   is consumed, and the caller should read more bytes and retry.
    /// - `Err(_)`: the input is malformed; the connection must be closed.
    pub fn parse(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, DecodeError> {
        match parse_frame(buf)? {
            None => Ok(None),
            Some((frame, consumed)) => {
                buf.advance(consumed);
                Ok(Some(frame))
            }
        }
    }
}

/// Parses one frame from `data` without mutating it. Returns the frame and
/// the number of bytes it occupies, or `None` if more data is needed.
fn parse_frame(data: &[u8]) -> Result<Option<(Frame, usize)>, DecodeError> {
    let Some(&leader) = data.first() else {
        return Ok(None);
    };

    match leader {
        b'+' => match find_crlf(data, 1) {
            None => Ok(None),
            Some(crlf) => {
                let payload = data[1..crlf].to_vec();
                Ok(Some((Frame::Simple(payload), crlf + 2)))
            }
        },
        b'$' => match parse_bulk(data, 0)? {
            None => Ok(None),
            Some((value, consumed)) => Ok(Some((Frame::Bulk(value), consumed))),
        },
        b'*' => parse_array(data),
        _ => Err(DecodeError::BadLeader),
    }
}

/// Parses a bulk string starting at `start` (which must be `$`). Returns
/// the decoded value (`None` for nil) and the total bytes consumed from
/// `start`, or `None` if more data is needed.
fn parse_bulk(data: &[u8], start: usize) -> Result<Option<(Option<Vec<u8>>, usize)>, DecodeError> {
    debug_assert_eq!(data.get(start), Some(&b'$'));

    let Some(crlf) = find_crlf(data, start + 1) else {
        return Ok(None);
    };
    let len = parse_i64(&data[start + 1..crlf])?;

    if len == -1 {
        return Ok(Some((None, crlf + 2 - start)));
    }
    if len < 0 {
        return Err(DecodeError::BadLength);
    }
    let len = len as usize;

    let body_start = crlf + 2;
    let body_end = body_start + len;
    if data.len() < body_end + 2 {
        return Ok(None);
    }
    if &data[body_end..body_end + 2] != b"\r\n" {
        return Err(DecodeError::BadTerminator);
    }

    let value = data[body_start..body_end].to_vec();
    Ok(Some((Some(value), body_end + 2 - start)))
}

/// Parses a bulk-string array starting at offset 0 (which must be `*`).
fn parse_array(data: &[u8]) -> Result<Option<(Frame, usize)>, DecodeError> {
    let Some(crlf) = find_crlf(data, 1) else {
        return Ok(None);
    };
    let count = parse_i64(&data[1..crlf])?;
    if count < 0 {
        return Err(DecodeError::BadLength);
    }
    let count = count as usize;

    let mut offset = crlf + 2;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        if data.get(offset) != Some(&b'$') {
            if offset >= data.len() {
                return Ok(None);
            }
            return Err(DecodeError::BadArrayElement);
        }
        match parse_bulk(data, offset)? {
            None => return Ok(None),
            Some((None, _)) => return Err(DecodeError::BadArrayElement),
            Some((Some(value), consumed)) => {
                items.push(value);
                offset += consumed;
            }
        }
    }

    Ok(Some((Frame::Array(items), offset)))
}

/// Finds `\r\n` starting at `from`, returning the index of the `\r`.
fn find_crlf(data: &[u8], from: usize) -> Option<usize> {
    if from > data.len() {
        return None;
    }
    let rest = &data[from..];
    let pos = rest.windows(2).position(|w| w == b"\r\n")?;
    Some(from + pos)
}

/// Parses decimal ASCII (with optional leading `-`) into an `i64`.
fn parse_i64(data: &[u8]) -> Result<i64, DecodeError> {
    if data.is_empty() {
        return Err(DecodeError::BadLength);
    }
    let (negative, digits) = match data[0] {
        b'-' => (true, &data[1..]),
        _ => (false, data),
    };
    if digits.is_empty() {
        return Err(DecodeError::BadLength);
    }

    let mut value: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(DecodeError::BadLength);
        }
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add((b - b'0') as i64))
            .ok_or(DecodeError::BadLength)?;
    }

    Ok(if negative { -value } else { value })
}
