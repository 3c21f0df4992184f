use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, info, instrument, warn};

use crate::commands::executable::Executable;
use crate::commands::Command;
use crate::config::Config;
use crate::connection::Connection;
use crate::context::Context;
use crate::frame::Frame;
use crate::rdb;
use crate::replication::handshake;
use crate::Error;

/// Who is on the other end of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Peer {
    Client,
    /// The primary this replica follows. Its commands are applied without being answered.
    Primary,
}

pub async fn run(config: Config) -> Result<(), Error> {
    let _ = tracing_subscriber::fmt()
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));

    let listener = TcpListener::bind(("127.0.0.1", config.port)).await?;
    let ctx = Context::new(config);

    let path = ctx.config.snapshot_path();
    match rdb::load(&path).await? {
        Some(snapshot) => ctx.store.lock().restore(snapshot),
        None => info!(path = %path.display(), "no snapshot found, starting empty"),
    }

    if let Some(period) = ctx.config.expiry_sweep_period() {
        ctx.store.spawn_expiry_sweeper(period);
    }

    if let Some(upstream) = ctx.replication.upstream() {
        let conn = handshake::sync_with_primary(upstream, &ctx).await?;
        let address = upstream.to_string();
        let ctx = ctx.clone();

        tokio::spawn(async move {
            if let Err(err) = handle_connection(conn, address, Peer::Primary, ctx).await {
                error!(%err, "replication link failed");
            }
        });
    }

    info!(
        role = %ctx.replication.role(),
        "Redis server listening on {}",
        listener.local_addr()?
    );

    loop {
        let (socket, client_address) = listener.accept().await?;
        let ctx = ctx.clone();
        info!("Accepted connection from {:?}", client_address);

        tokio::spawn(async move {
            let conn = Connection::with_max_frame_size(socket, ctx.config.max_frame_size);
            let address = client_address.to_string();
            if let Err(err) = handle_connection(conn, address, Peer::Client, ctx).await {
                error!(%err, "connection failed");
            }
        });
    }
}

#[instrument(
    name = "connection",
    skip(conn, client_address, ctx),
    fields(connection_id, client_address)
)]
async fn handle_connection(
    mut conn: Connection,
    client_address: String,
    peer: Peer,
    ctx: Context,
) -> Result<(), Error> {
    tracing::Span::current()
        .record("connection_id", conn.id.to_string())
        .record("client_address", client_address);

    let mut processed = conn.bytes_read();

    while let Some(frame) = conn.read_frame().await? {
        debug!("Received frame: {}", frame);

        let replies = match Command::try_from(frame.clone()) {
            Ok(Command::Psync(psync)) if peer == Peer::Client => match psync.resync(&ctx) {
                Ok((replies, link)) => {
                    for reply in &replies {
                        conn.write_frame(reply).await?;
                    }
                    return stream_to_replica(conn, link).await;
                }
                Err(err) => vec![error_reply(err)],
            },
            Ok(cmd) => {
                let answer = peer == Peer::Client || cmd.expects_ack();
                let replies = execute(cmd, &frame, &ctx);
                if answer {
                    replies
                } else {
                    vec![]
                }
            }
            Err(err) if peer == Peer::Client => vec![error_reply(err)],
            Err(err) => {
                warn!(%err, "ignoring invalid command from primary");
                vec![]
            }
        };

        for reply in &replies {
            debug!("Sending reply: {}", reply);
            conn.write_frame(reply).await?;
        }

        if peer == Peer::Primary {
            let read = conn.bytes_read();
            ctx.replication.advance(read - processed);
            processed = read;
        }
    }

    info!("Connection closed");
    Ok(())
}

/// Runs a command, forwarding it to the replicas when it is a write.
fn execute(cmd: Command, frame: &Frame, ctx: &Context) -> Vec<Frame> {
    let res = if cmd.is_write() {
        ctx.replication.write(frame, || cmd.exec(ctx.clone()))
    } else {
        cmd.exec(ctx.clone())
    };

    res.unwrap_or_else(|err| vec![error_reply(err)])
}

fn error_reply(err: Error) -> Frame {
    Frame::Error(format!("ERR {err}"))
}

/// Forwards every propagated write command to a replica until either side goes away.
async fn stream_to_replica(
    mut conn: Connection,
    mut link: Receiver<Bytes>,
) -> Result<(), Error> {
    info!("Streaming writes to replica");

    loop {
        tokio::select! {
            command = link.recv() => match command {
                Some(command) => conn.writer.write_all(&command).await?,
                None => break,
            },
            frame = conn.read_frame() => match frame? {
                Some(frame) => debug!("Received frame from replica: {}", frame),
                None => break,
            },
        }
    }

    info!("Replica disconnected");
    Ok(())
}
