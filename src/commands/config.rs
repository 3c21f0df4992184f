use bytes::Bytes;
use strum_macros::{Display, EnumString};
use tracing::debug;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::context::Context;
use crate::frame::Frame;
use crate::Error;

/// `CONFIG GET <parameter>` for the few parameters this server exposes.
///
/// Ref: <https://redis.io/docs/latest/commands/config-get>
#[derive(Debug, PartialEq)]
pub struct Config {
    pub parameter: String,
}

#[derive(Debug, PartialEq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
enum Parameter {
    Dir,
    Dbfilename,
}

impl Executable for Config {
    fn exec(self, ctx: Context) -> Result<Vec<Frame>, Error> {
        // Unknown parameters are answered with nothing at all.
        let Ok(parameter) = self.parameter.parse::<Parameter>() else {
            debug!(parameter = %self.parameter, "ignoring unknown config parameter");
            return Ok(vec![]);
        };

        let value = match parameter {
            Parameter::Dir => &ctx.config.dir,
            Parameter::Dbfilename => &ctx.config.dbfilename,
        };

        Ok(vec![Frame::Array(vec![
            Frame::Bulk(Bytes::from(parameter.to_string())),
            Frame::Bulk(Bytes::from(value.clone())),
        ])])
    }
}

impl TryFrom<&mut CommandParser> for Config {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let subcommand = parser.next_string()?;

        if !subcommand.eq_ignore_ascii_case("get") {
            return Err(CommandParserError::InvalidCommandArgument {
                command: "config".to_string(),
                argument: subcommand,
            }
            .into());
        }

        let parameter = parser.next_string()?;

        Ok(Self { parameter })
    }
}
