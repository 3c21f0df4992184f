use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::FramedRead;
use uuid::Uuid;

use crate::codec::{FrameCodec, DEFAULT_MAX_FRAME_SIZE};
use crate::frame::Frame;
use crate::Error;

pub struct Connection {
    pub id: Uuid,
    // Data is read from the socket into the codec's read buffer. When a frame is parsed, the
    // corresponding data is removed from the buffer, anything pipelined after it stays there.
    reader: FramedRead<OwnedReadHalf, FrameCodec>,
    pub writer: OwnedWriteHalf,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Connection {
        Self::with_max_frame_size(stream, DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(stream: TcpStream, max_frame_size: usize) -> Connection {
        let (reader, writer) = stream.into_split();

        Connection {
            id: Uuid::new_v4(),
            reader: FramedRead::new(reader, FrameCodec::new(max_frame_size)),
            writer,
        }
    }

    /// Reads the next frame. `None` means the peer closed the connection.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, Error> {
        self.reader.next().await.transpose()
    }

    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), Error> {
        self.writer.write_all(&frame.serialize()).await?;
        Ok(())
    }

    /// Reads a snapshot transfer (`$<len>\r\n<bytes>`) instead of a regular frame.
    pub async fn read_payload(&mut self) -> Result<Option<Frame>, Error> {
        self.reader.decoder_mut().expect_payload();
        self.read_frame().await
    }

    /// Bytes consumed by frames since the connection opened or the last snapshot transfer.
    pub fn bytes_read(&self) -> u64 {
        self.reader.decoder().bytes_read()
    }
}
