use bytes::Bytes;
use std::time::Duration;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::context::Context;
use crate::frame::Frame;
use crate::Error;

/// Set key to hold the string value, with an optional expiration in milliseconds (`PX`).
/// Setting a key without `PX` drops any expiration it had.
///
/// Ref: <https://redis.io/docs/latest/commands/set/>
#[derive(Debug, PartialEq)]
pub struct Set {
    pub key: String,
    pub value: Bytes,
    pub ttl: Option<Duration>,
}

impl Executable for Set {
    fn exec(self, ctx: Context) -> Result<Vec<Frame>, Error> {
        let mut store = ctx.store.lock();

        match self.ttl {
            Some(ttl) => store.set_with_ttl(self.key, self.value, ttl),
            None => store.set(self.key, self.value),
        }

        Ok(vec![Frame::Simple("OK".to_string())])
    }
}

impl TryFrom<&mut CommandParser> for Set {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let value = parser.next_bytes()?;

        let mut ttl = None;

        loop {
            let option = match parser.next_string() {
                Ok(option) => option,
                Err(CommandParserError::EndOfStream) => {
                    break;
                }
                Err(err) => return Err(err.into()),
            };

            match option.to_uppercase().as_str() {
                "PX" if ttl.is_none() => {
                    let millis = parser.next_integer()?;
                    let millis = u64::try_from(millis)
                        .ok()
                        .filter(|millis| *millis > 0)
                        .ok_or_else(|| CommandParserError::InvalidExpireTime {
                            command: "set".to_string(),
                        })?;
                    ttl = Some(Duration::from_millis(millis));
                }

                // Unexpected option
                _ => {
                    return Err(CommandParserError::InvalidCommandArgument {
                        command: "set".to_string(),
                        argument: option,
                    }
                    .into())
                }
            }
        }

        Ok(Self { key, value, ttl })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Command;

    #[test]
    fn parse_set_command() {
        let set_frame = Frame::Array(vec![
            Frame::Simple(String::from("SET")),
            Frame::Simple(String::from("foo")),
            Frame::Simple(String::from("baz")),
        ]);

        let set_command = Command::try_from(set_frame).unwrap();

        assert_eq!(
            set_command,
            Command::Set(Set {
                key: String::from("foo"),
                value: Bytes::from("baz"),
                ttl: None,
            })
        );

        let set_frame = Frame::Array(vec![
            Frame::Simple(String::from("SET")),
            Frame::Bulk(Bytes::from("foo")),
            Frame::Bulk(Bytes::from("baz")),
        ]);

        let set_command = Command::try_from(set_frame).unwrap();

        assert_eq!(
            set_command,
            Command::Set(Set {
                key: String::from("foo"),
                value: Bytes::from("baz"),
                ttl: None,
            })
        );
    }

    #[test]
    fn with_px() {
        for option in ["PX", "px", "pX"] {
            let cmd = Command::try_from(Frame::command(["SET", "foo", "bar", option, "100"])).unwrap();

            assert_eq!(
                cmd,
                Command::Set(Set {
                    key: String::from("foo"),
                    value: Bytes::from("bar"),
                    ttl: Some(Duration::from_millis(100)),
                })
            );
        }
    }

    #[test]
    fn px_not_an_integer() {
        let err = Command::try_from(Frame::command(["SET", "foo", "bar", "PX", "soon"]))
            .err()
            .unwrap();

        assert_eq!(err.to_string(), "value is not an integer or out of range");
    }

    #[test]
    fn px_not_positive() {
        for millis in ["0", "-5"] {
            let err = Command::try_from(Frame::command(["SET", "foo", "bar", "PX", millis]))
                .err()
                .unwrap();
            let err = err.downcast_ref::<CommandParserError>().unwrap();

            assert_eq!(
                *err,
                CommandParserError::InvalidExpireTime {
                    command: "set".to_string()
                }
            );
        }
    }

    #[test]
    fn px_without_value() {
        let err = Command::try_from(Frame::command(["SET", "foo", "bar", "PX"]))
            .err()
            .unwrap();
        let err = err.downcast_ref::<CommandParserError>().unwrap();

        assert_eq!(*err, CommandParserError::EndOfStream);
    }

    #[test]
    fn unknown_option() {
        let err = Command::try_from(Frame::command(["SET", "foo", "bar", "KEEPTTL"]))
            .err()
            .unwrap();
        let err = err.downcast_ref::<CommandParserError>().unwrap();

        assert_eq!(
            *err,
            CommandParserError::InvalidCommandArgument {
                command: "set".to_string(),
                argument: "KEEPTTL".to_string(),
            }
        );
    }

    #[test]
    fn missing_value() {
        let err = Command::try_from(Frame::command(["SET", "foo"])).err().unwrap();
        let err = err.downcast_ref::<CommandParserError>().unwrap();

        assert_eq!(*err, CommandParserError::EndOfStream);
    }

    #[test]
    fn set_then_get() {
        let ctx = Context::default();

        let set = Command::try_from(Frame::command(["SET", "foo", "bar"])).unwrap();
        assert_eq!(
            set.exec(ctx.clone()).unwrap(),
            vec![Frame::Simple("OK".to_string())]
        );

        assert_eq!(ctx.store.lock().get("foo"), Some(Bytes::from("bar")));
    }

    #[test]
    fn set_with_px_expires() {
        let ctx = Context::default();

        let set = Command::try_from(Frame::command(["SET", "foo", "bar", "PX", "50"])).unwrap();
        set.exec(ctx.clone()).unwrap();

        assert_eq!(ctx.store.lock().get("foo"), Some(Bytes::from("bar")));

        std::thread::sleep(Duration::from_millis(60));

        assert_eq!(ctx.store.lock().get("foo"), None);
    }

    #[test]
    fn overwrite_clears_expiry() {
        let ctx = Context::default();

        let set = Command::try_from(Frame::command(["SET", "foo", "1", "PX", "50"])).unwrap();
        set.exec(ctx.clone()).unwrap();
        let set = Command::try_from(Frame::command(["SET", "foo", "2"])).unwrap();
        set.exec(ctx.clone()).unwrap();

        std::thread::sleep(Duration::from_millis(60));

        assert_eq!(ctx.store.lock().get("foo"), Some(Bytes::from("2")));
    }
}
