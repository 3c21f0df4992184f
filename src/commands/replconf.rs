use tracing::debug;

use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::context::Context;
use crate::frame::Frame;
use crate::Error;

/// Replication settings exchanged between a replica and its primary.
///
/// Ref: <https://redis.io/docs/latest/commands/replconf>
#[derive(Debug, PartialEq)]
pub enum Replconf {
    /// Asks a replica for the offset it has processed.
    GetAck,
    /// A replica reporting the offset it has processed.
    Ack { offset: i64 },
    /// `listening-port`, `capa` and anything else a replica announces during the handshake.
    Settings { args: Vec<String> },
}

impl Executable for Replconf {
    fn exec(self, ctx: Context) -> Result<Vec<Frame>, Error> {
        match self {
            Replconf::GetAck => {
                let offset = ctx.replication.offset().to_string();
                Ok(vec![Frame::command(["REPLCONF".to_string(), "ACK".to_string(), offset])])
            }
            Replconf::Ack { offset } => {
                debug!(offset, "replica acknowledged offset");
                Ok(vec![])
            }
            Replconf::Settings { args } => {
                debug!(?args, "replica settings");
                Ok(vec![Frame::Simple("OK".to_string())])
            }
        }
    }
}

impl TryFrom<&mut CommandParser> for Replconf {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let name = parser.next_string()?;

        if name.eq_ignore_ascii_case("getack") {
            // The argument, conventionally `*`, carries no meaning.
            parser.remaining_strings()?;
            return Ok(Replconf::GetAck);
        }

        if name.eq_ignore_ascii_case("ack") {
            let offset = parser.next_integer()?;
            return Ok(Replconf::Ack { offset });
        }

        let mut args = vec![name];
        args.extend(parser.remaining_strings()?);

        Ok(Replconf::Settings { args })
    }
}
