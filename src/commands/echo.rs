use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::context::Context;
use crate::frame::Frame;
use crate::Error;

/// Replies with each argument as its own bulk string.
///
/// Ref: <https://redis.io/docs/latest/commands/echo>
#[derive(Debug, PartialEq)]
pub struct Echo {
    pub messages: Vec<Bytes>,
}

impl Executable for Echo {
    fn exec(self, _ctx: Context) -> Result<Vec<Frame>, Error> {
        Ok(self.messages.into_iter().map(Frame::Bulk).collect())
    }
}

impl TryFrom<&mut CommandParser> for Echo {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let mut messages = vec![];

        loop {
            match parser.next_bytes() {
                Ok(message) => messages.push(message),
                Err(CommandParserError::EndOfStream) if !messages.is_empty() => {
                    break;
                }
                Err(err) => return Err(err.into()),
            }
        }

        Ok(Self { messages })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;

    #[test]
    fn single_message() {
        let cmd = Command::try_from(Frame::command(["ECHO", "hey"])).unwrap();

        assert_eq!(
            cmd.exec(Context::default()).unwrap(),
            vec![Frame::Bulk(Bytes::from("hey"))]
        );
    }

    #[test]
    fn one_reply_per_message() {
        let cmd = Command::try_from(Frame::command(["ECHO", "a", "b"])).unwrap();

        assert_eq!(
            cmd.exec(Context::default()).unwrap(),
            vec![Frame::Bulk(Bytes::from("a")), Frame::Bulk(Bytes::from("b"))]
        );
    }

    #[test]
    fn without_message() {
        let err = Command::try_from(Frame::command(["ECHO"])).err().unwrap();
        let err = err.downcast_ref::<CommandParserError>().unwrap();

        assert_eq!(*err, CommandParserError::EndOfStream);
    }
}
