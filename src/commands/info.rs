use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::context::Context;
use crate::frame::Frame;
use crate::Error;

/// Only the `replication` section is reported; any other request gets an empty bulk string.
///
/// Ref: <https://redis.io/docs/latest/commands/info>
#[derive(Debug, PartialEq)]
pub struct Info {
    pub section: Option<String>,
}

impl Executable for Info {
    fn exec(self, ctx: Context) -> Result<Vec<Frame>, Error> {
        if self.section.as_deref() != Some("replication") {
            return Ok(vec![Frame::Bulk(Bytes::new())]);
        }

        let replication = &ctx.replication;
        let info = format!(
            "role:{}\r\nmaster_replid:{}\r\nmaster_repl_offset:{}",
            replication.role(),
            replication.id(),
            replication.offset()
        );

        Ok(vec![Frame::Bulk(Bytes::from(info))])
    }
}

impl TryFrom<&mut CommandParser> for Info {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let section = match parser.next_string() {
            Ok(section) => Some(section),
            Err(CommandParserError::EndOfStream) => None,
            Err(err) => return Err(err.into()),
        };

        Ok(Self { section })
    }
}
