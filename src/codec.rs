use bytes::{Buf, BytesMut};
use std::io::Cursor;
use tokio_util::codec::Decoder;
use tracing::{debug, trace};

use crate::frame::{self, Frame};
use crate::Error;

pub const DEFAULT_MAX_FRAME_SIZE: usize = 512 * 1024 * 1024;

/// Decodes RESP frames out of a byte stream.
///
/// Besides frames, the codec keeps a running count of the bytes consumed by them. Replicas use
/// it to account for the replication stream. Right after `PSYNC` the stream carries a snapshot
/// instead of a frame, see [`FrameCodec::expect_payload`].
pub struct FrameCodec {
    max_frame_size: usize,
    expect_payload: bool,
    bytes_read: u64,
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            expect_payload: false,
            bytes_read: 0,
        }
    }

    /// The next item decoded is a `$<len>\r\n<bytes>` snapshot transfer. Its bytes are not added
    /// to [`FrameCodec::bytes_read`], which restarts from zero once it is delivered.
    pub fn expect_payload(&mut self) {
        self.expect_payload = true;
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        // Check if the frame size exceeds a certain limit to prevent DoS attacks
        if src.len() > self.max_frame_size {
            return Err("frame size exceeds limit".into());
        }

        let mut cursor = Cursor::new(&src[..]);
        let parsed = if self.expect_payload {
            Frame::parse_payload(&mut cursor)
        } else {
            Frame::parse(&mut cursor)
        };

        let frame = match parsed {
            Ok(frame) => frame,
            Err(frame::Error::Incomplete) => {
                // Not enough data to parse a frame.
                src.reserve(1024);
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        let position = cursor.position() as usize;

        // Remove the parsed frame from the buffer.
        src.advance(position);

        if self.expect_payload {
            self.expect_payload = false;
            self.bytes_read = 0;
        } else {
            self.bytes_read += position as u64;
        }

        trace!(bytes = position, "decoded frame");

        Ok(Some(frame))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                // The peer went away in the middle of a request; that is the end of the stream,
                // not a protocol violation.
                if !buf.is_empty() {
                    debug!(bytes = buf.len(), "discarding partial frame at end of stream");
                    buf.clear();
                }
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn decode_pipelined_commands() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&b"*1\r\n$4\r\nPING\r\n*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n"[..]);

        let first = codec.decode(&mut buf).unwrap();
        assert_eq!(first, Some(Frame::command(["PING"])));
        assert_eq!(codec.bytes_read(), 14);

        let second = codec.decode(&mut buf).unwrap();
        assert_eq!(second, Some(Frame::command(["GET", "foo"])));
        assert_eq!(codec.bytes_read(), 36);

        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn decode_partial_frame_waits_for_more_data() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&b"*2\r\n$3\r\nGET\r\n$3\r\nf"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(codec.bytes_read(), 0);

        buf.extend_from_slice(b"oo\r\n");
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::command(["GET", "foo"]))
        );
    }

    #[test]
    fn decode_malformed_count_is_an_error() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&b"*x\r\n"[..]);

        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn decode_eof_with_partial_frame_ends_stream() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&b"*2\r\n$3\r\nGET\r\n"[..]);

        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_payload_then_frames() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&b"+OK\r\n"[..]);
        codec.decode(&mut buf).unwrap();
        assert_eq!(codec.bytes_read(), 5);

        codec.expect_payload();
        buf.extend_from_slice(b"$9\r\nREDIS0011*1\r\n$4\r\nPING\r\n");

        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::Payload(Bytes::from("REDIS0011")))
        );
        assert_eq!(codec.bytes_read(), 0);

        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::command(["PING"]))
        );
        assert_eq!(codec.bytes_read(), 14);
    }

    #[test]
    fn decode_rejects_oversized_buffer() {
        let mut codec = FrameCodec::new(8);
        let mut buf = BytesMut::from(&b"*1\r\n$4\r\nPING\r\n"[..]);

        assert!(codec.decode(&mut buf).is_err());
    }
}
