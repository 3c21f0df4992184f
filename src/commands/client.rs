use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::context::Context;
use crate::frame::Frame;
use crate::Error;

/// Accepts any `CLIENT` subcommand (`SETNAME`, `SETINFO`, ...) so that stock clients can
/// announce themselves.
#[derive(Debug, PartialEq)]
pub struct Client {
    pub args: Vec<String>,
}

impl Executable for Client {
    fn exec(self, _ctx: Context) -> Result<Vec<Frame>, Error> {
        Ok(vec![Frame::Simple("OK".to_string())])
    }
}

impl TryFrom<&mut CommandParser> for Client {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let args = parser.remaining_strings()?;

        Ok(Self { args })
    }
}
