use bytes::Bytes;
use tokio::sync::mpsc::Receiver;

use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::context::Context;
use crate::frame::Frame;
use crate::Error;

/// Starts replication from a primary. Partial resynchronization is not supported: whatever
/// id and offset the replica asks for, it receives a full snapshot.
///
/// Ref: <https://redis.io/docs/latest/commands/psync>
#[derive(Debug, PartialEq)]
pub struct Psync {
    pub replication_id: String,
    pub offset: i64,
}

impl Psync {
    /// Answers with `+FULLRESYNC <id> <offset>` followed by the snapshot payload, and returns
    /// the link on which every later write command is delivered.
    pub fn resync(self, ctx: &Context) -> Result<(Vec<Frame>, Receiver<Bytes>), Error> {
        let resync = ctx.replication.attach(&ctx.store)?;

        let frames = vec![
            Frame::Simple(format!("FULLRESYNC {} {}", resync.id, resync.offset)),
            Frame::Payload(resync.snapshot),
        ];

        Ok((frames, resync.link))
    }
}

impl Executable for Psync {
    /// Without a connection to stream to, the link is dropped right away and the registry
    /// forgets it on the next write.
    fn exec(self, ctx: Context) -> Result<Vec<Frame>, Error> {
        self.resync(&ctx).map(|(frames, _)| frames)
    }
}

impl TryFrom<&mut CommandParser> for Psync {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let replication_id = parser.next_string()?;
        let offset = parser.next_integer()?;

        Ok(Self {
            replication_id,
            offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;
    use crate::config::Config;
    use crate::rdb::Snapshot;

    #[test]
    fn parse() {
        let cmd = Command::try_from(Frame::command(["PSYNC", "?", "-1"])).unwrap();

        assert_eq!(
            cmd,
            Command::Psync(Psync {
                replication_id: "?".to_string(),
                offset: -1,
            })
        );
    }

    #[test]
    fn full_resync_ships_the_store() {
        let ctx = Context::default();
        ctx.store
            .lock()
            .set("foo".to_string(), Bytes::from("bar"));

        let psync = Psync {
            replication_id: "?".to_string(),
            offset: -1,
        };
        let (frames, _link) = psync.resync(&ctx).unwrap();

        assert_eq!(
            frames[0],
            Frame::Simple(format!("FULLRESYNC {} 0", ctx.replication.id()))
        );
        let Frame::Payload(payload) = &frames[1] else {
            panic!("expected a snapshot payload, got {}", frames[1]);
        };
        let snapshot = Snapshot::decode(payload).unwrap();
        assert_eq!(snapshot.records.len(), 1);
        assert_eq!(snapshot.records[0].key, "foo");
        assert_eq!(ctx.replication.replica_count(), 1);
    }

    #[test]
    fn replica_refuses() {
        let ctx = Context::new(Config {
            replicaof: Some("localhost 6379".parse().unwrap()),
            ..Config::default()
        });

        let cmd = Command::try_from(Frame::command(["PSYNC", "?", "-1"])).unwrap();

        assert!(cmd.exec(ctx).is_err());
    }
}
