use bytes::Bytes;
use glob_match::glob_match;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::context::Context;
use crate::frame::Frame;
use crate::Error;

/// Lists the keys matching a glob-style pattern, or every key when no pattern is given.
/// Expired keys are never listed.
///
/// Ref: <https://redis.io/commands/keys>
#[derive(Debug, PartialEq)]
pub struct Keys {
    pub pattern: Option<String>,
}

impl Executable for Keys {
    fn exec(self, ctx: Context) -> Result<Vec<Frame>, Error> {
        let store = ctx.store.lock();

        let keys = store
            .keys()
            .filter(|key| {
                self.pattern
                    .as_deref()
                    .map_or(true, |pattern| glob_match(pattern, key.as_str()))
            })
            .map(|key| Frame::Bulk(Bytes::from(key.clone())))
            .collect();

        Ok(vec![Frame::Array(keys)])
    }
}

impl TryFrom<&mut CommandParser> for Keys {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let pattern = match parser.next_string() {
            Ok(pattern) => Some(pattern),
            Err(CommandParserError::EndOfStream) => None,
            Err(err) => return Err(err.into()),
        };

        Ok(Self { pattern })
    }
}
