//! The replica side of a full resynchronization.
//!
//! Ref: <https://redis.io/docs/latest/operate/oss_and_stack/management/replication/>

use strum_macros::Display;
use thiserror::Error as ThisError;
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::config::Upstream;
use crate::connection::Connection;
use crate::context::Context;
use crate::frame::Frame;
use crate::rdb::{self, Snapshot};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum HandshakeState {
    Connecting,
    PingSent,
    ReplconfPortSent,
    ReplconfCapaSent,
    PsyncSent,
    SnapshotLoading,
    Streaming,
}

#[derive(Debug, ThisError)]
pub enum HandshakeError {
    #[error("failed to connect to primary {upstream}: {source}")]
    Connect {
        upstream: Upstream,
        source: std::io::Error,
    },
    #[error("primary closed the connection in state {0}")]
    Closed(HandshakeState),
    #[error("unexpected reply from primary in state {state}: {reply}")]
    UnexpectedReply { state: HandshakeState, reply: Frame },
    #[error("invalid snapshot from primary: {0}")]
    Snapshot(#[from] rdb::Error),
    #[error("replication link failed in state {0}: {1}")]
    Link(HandshakeState, crate::Error),
}

/// Connects to `upstream`, performs a full resynchronization and seeds the store with the
/// received snapshot. The returned connection is positioned at the first propagated command.
pub async fn sync_with_primary(
    upstream: &Upstream,
    ctx: &Context,
) -> Result<Connection, HandshakeError> {
    info!(%upstream, "connecting to primary");

    let stream = TcpStream::connect((upstream.host.as_str(), upstream.port))
        .await
        .map_err(|source| HandshakeError::Connect {
            upstream: upstream.clone(),
            source,
        })?;

    let mut handshake = Handshake {
        conn: Connection::with_max_frame_size(stream, ctx.config.max_frame_size),
        ctx,
        state: HandshakeState::Connecting,
    };

    while handshake.state != HandshakeState::Streaming {
        handshake.state = handshake.step().await?;
        debug!(state = %handshake.state, "handshake progressed");
    }

    info!(
        replication_id = %ctx.replication.id(),
        offset = ctx.replication.offset(),
        "synchronized with primary"
    );

    Ok(handshake.conn)
}

struct Handshake<'a> {
    conn: Connection,
    ctx: &'a Context,
    state: HandshakeState,
}

impl Handshake<'_> {
    async fn step(&mut self) -> Result<HandshakeState, HandshakeError> {
        use HandshakeState::*;

        match self.state {
            Connecting => {
                self.send(Frame::command(["PING"])).await?;
                Ok(PingSent)
            }
            PingSent => {
                self.reply().await?;
                let port = self.ctx.config.port.to_string();
                self.send(Frame::command([
                    "REPLCONF".to_string(),
                    "listening-port".to_string(),
                    port,
                ]))
                .await?;
                Ok(ReplconfPortSent)
            }
            ReplconfPortSent => {
                self.reply().await?;
                self.send(Frame::command(["REPLCONF", "capa", "psync2"]))
                    .await?;
                Ok(ReplconfCapaSent)
            }
            ReplconfCapaSent => {
                self.reply().await?;
                self.send(Frame::command(["PSYNC", "?", "-1"])).await?;
                Ok(PsyncSent)
            }
            PsyncSent => {
                let reply = self.reply().await?;
                let (id, offset) = parse_full_resync(&reply).ok_or_else(|| {
                    HandshakeError::UnexpectedReply {
                        state: self.state,
                        reply: reply.clone(),
                    }
                })?;
                self.ctx.replication.follow(id, offset);
                Ok(SnapshotLoading)
            }
            SnapshotLoading => {
                let payload = self
                    .conn
                    .read_payload()
                    .await
                    .map_err(|err| HandshakeError::Link(self.state, err))?
                    .ok_or(HandshakeError::Closed(self.state))?;
                let Frame::Payload(payload) = payload else {
                    return Err(HandshakeError::UnexpectedReply {
                        state: self.state,
                        reply: payload,
                    });
                };

                let snapshot = Snapshot::decode(&payload)?;
                info!(keys = snapshot.records.len(), "loaded snapshot from primary");

                let mut store = self.ctx.store.lock();
                store.clear();
                store.restore(snapshot);

                Ok(Streaming)
            }
            Streaming => Ok(Streaming),
        }
    }

    async fn send(&mut self, frame: Frame) -> Result<(), HandshakeError> {
        self.conn
            .write_frame(&frame)
            .await
            .map_err(|err| HandshakeError::Link(self.state, err))
    }

    /// Reads one reply. Its content is not checked beyond not being an error.
    async fn reply(&mut self) -> Result<Frame, HandshakeError> {
        let reply = self
            .conn
            .read_frame()
            .await
            .map_err(|err| HandshakeError::Link(self.state, err))?
            .ok_or(HandshakeError::Closed(self.state))?;

        debug!(state = %self.state, %reply, "primary replied");

        match reply {
            Frame::Error(_) => Err(HandshakeError::UnexpectedReply {
                state: self.state,
                reply,
            }),
            reply => Ok(reply),
        }
    }
}

/// Parses `+FULLRESYNC <replication id> <offset>`.
fn parse_full_resync(reply: &Frame) -> Option<(String, u64)> {
    let Frame::Simple(line) = reply else {
        return None;
    };

    let mut fields = line.split_whitespace();
    if fields.next()? != "FULLRESYNC" {
        return None;
    }
    let id = fields.next()?.to_string();
    let offset = fields.next()?.parse().ok()?;

    Some((id, offset))
}
