//! # Streaming Decoder
//!
//! Purpose: Pull bytes off one connection's read half and turn them into
//! a lazy sequence of [`Frame`]s delivered to a bounded queue, without
//! ever requiring a frame to fit inside a single socket read.
//!
//! ## Design Principles
//! 1. **Resumable Across Reads**: the same `BytesMut` carries forward
//!    between reads; `FrameParser::parse` reports `Ok(None)` rather than
//!    consuming anything on a partial frame.
//! 2. **Backpressure by Construction**: the decoder does not issue
//!    another socket read until every frame already buffered has been
//!    handed to the bounded channel, so a full channel stalls reads.
//! 3. **No Partial Frames on EOF/Error**: a read returning `0` bytes or
//!    an `Err` ends the loop immediately; a malformed leader or length
//!    ends it too. Either way the sender is dropped, closing the queue
//!    for the consumer without emitting anything further.

use bytes::BytesMut;
use tokio::io::AsyncRead;
use tokio::sync::mpsc::Sender;

use tidekv_common::codec::{Frame, FrameParser};

/// Bound on the per-connection frame queue.
pub const QUEUE_CAPACITY: usize = 32;

/// Drains `reader` into `buf`, emitting every complete frame to `tx` as
/// soon as it is decoded, until EOF, a read error, or malformed input.
///
/// `buf` may already contain bytes carried over from a prior handshake
/// read (see the replica-side handshake in `replication.rs`).
pub async fn decode_loop<R>(mut reader: R, mut buf: BytesMut, tx: Sender<Frame>)
where
    R: AsyncRead + Unpin,
{
    use tokio::io::AsyncReadExt;

    let mut parser = FrameParser::new();

    loop {
        loop {
            match parser.parse(&mut buf) {
                Ok(Some(frame)) => {
                    if tx.send(frame).await.is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(_) => return,
            }
        }

        match reader.read_buf(&mut buf).await {
            Ok(0) => return,
            Ok(_) => continue,
            Err(_) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidekv_common::codec::encode_bulk_array;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn emits_one_frame_per_buffered_command() {
        let mut wire = Vec::new();
        wire.extend(encode_bulk_array(&[b"PING".as_slice()]));
        wire.extend(encode_bulk_array(&[b"GET".as_slice(), b"k".as_slice()]));

        let (tx, mut rx) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(decode_loop(&wire[..], BytesMut::new(), tx));

        let first = rx.recv().await.unwrap();
        assert_eq!(first, Frame::Array(vec![b"PING".to_vec()]));
        let second = rx.recv().await.unwrap();
        assert_eq!(second, Frame::Array(vec![b"GET".to_vec(), b"k".to_vec()]));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn malformed_input_closes_the_queue_without_a_partial_frame() {
        let wire = b":not-a-frame\r\n".to_vec();
        let (tx, mut rx) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(decode_loop(&wire[..], BytesMut::new(), tx));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn leftover_bytes_from_a_prior_read_are_honored() {
        let wire = encode_bulk_array(&[b"PING".as_slice()]);
        let (tx, mut rx) = mpsc::channel(QUEUE_CAPACITY);
        // Simulate a handshake that already consumed the first byte into
        // its own buffer before handing the reader off to decode_loop.
        let mut seeded = BytesMut::new();
        seeded.extend_from_slice(&wire[..1]);
        tokio::spawn(decode_loop(&wire[1..], seeded, tx));

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame, Frame::Array(vec![b"PING".to_vec()]));
    }
}
