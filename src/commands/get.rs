use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::context::Context;
use crate::frame::Frame;
use crate::Error;

// https://redis.io/commands/get
#[derive(Debug, PartialEq)]
pub struct Get {
    pub key: String,
}

impl Executable for Get {
    fn exec(self, ctx: Context) -> Result<Vec<Frame>, Error> {
        let value = ctx.store.lock().get(&self.key);

        let res = match value {
            Some(value) => Frame::Bulk(value),
            None => Frame::NullBulkString,
        };

        Ok(vec![res])
    }
}

impl TryFrom<&mut CommandParser> for Get {
    type Error = Error;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;

        Ok(Self { key })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::commands::Command;

    #[test]
    fn existing_key() {
        let ctx = Context::default();
        ctx.store
            .lock()
            .set(String::from("key1"), Bytes::from("1"));

        let cmd = Command::try_from(Frame::command(["GET", "key1"])).unwrap();

        assert_eq!(cmd.exec(ctx).unwrap(), vec![Frame::Bulk(Bytes::from("1"))]);
    }

    #[test]
    fn missing_key() {
        let cmd = Command::try_from(Frame::command(["GET", "nope"])).unwrap();

        assert_eq!(
            cmd.exec(Context::default()).unwrap(),
            vec![Frame::NullBulkString]
        );
    }

    #[test]
    fn expired_key() {
        let ctx = Context::default();
        ctx.store.lock().set_with_expiry(
            String::from("key1"),
            Bytes::from("1"),
            SystemTime::now() - Duration::from_millis(1),
        );

        let cmd = Command::try_from(Frame::command(["GET", "key1"])).unwrap();

        assert_eq!(cmd.exec(ctx).unwrap(), vec![Frame::NullBulkString]);
    }
}
