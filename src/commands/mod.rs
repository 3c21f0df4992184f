pub mod client;
pub mod config;
pub mod del;
pub mod echo;
pub mod executable;
pub mod get;
pub mod info;
pub mod keys;
pub mod ping;
pub mod psync;
pub mod replconf;
pub mod set;

use bytes::Bytes;
use std::{str, vec};
use thiserror::Error as ThisError;

use crate::commands::executable::Executable;
use crate::context::Context;
use crate::frame::Frame;
use crate::Error;

use client::Client;
use config::Config;
use del::Del;
use echo::Echo;
use get::Get;
use info::Info;
use keys::Keys;
use ping::Ping;
use psync::Psync;
use replconf::Replconf;
use set::Set;

#[derive(Debug, PartialEq)]
pub enum Command {
    Del(Del),
    Get(Get),
    Keys(Keys),
    Set(Set),

    Client(Client),
    Config(Config),
    Echo(Echo),
    Info(Info),
    Ping(Ping),
    Psync(Psync),
    Replconf(Replconf),
}

impl Command {
    /// Commands that modify the store, and therefore are forwarded to replicas.
    pub fn is_write(&self) -> bool {
        matches!(self, Command::Set(_) | Command::Del(_))
    }

    /// Whether a primary expects an answer when it sends this command over a replication link.
    pub fn expects_ack(&self) -> bool {
        matches!(self, Command::Replconf(Replconf::GetAck))
    }
}

impl Executable for Command {
    fn exec(self, ctx: Context) -> Result<Vec<Frame>, Error> {
        match self {
            Command::Client(cmd) => cmd.exec(ctx),
            Command::Config(cmd) => cmd.exec(ctx),
            Command::Del(cmd) => cmd.exec(ctx),
            Command::Echo(cmd) => cmd.exec(ctx),
            Command::Get(cmd) => cmd.exec(ctx),
            Command::Info(cmd) => cmd.exec(ctx),
            Command::Keys(cmd) => cmd.exec(ctx),
            Command::Ping(cmd) => cmd.exec(ctx),
            Command::Psync(cmd) => cmd.exec(ctx),
            Command::Replconf(cmd) => cmd.exec(ctx),
            Command::Set(cmd) => cmd.exec(ctx),
        }
    }
}

impl TryFrom<Frame> for Command {
    type Error = Error;

    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        // Clients send commands to the Redis server as RESP arrays.
        let frames = match frame {
            Frame::Array(array) => array,
            frame => {
                return Err(CommandParserError::InvalidFrame {
                    expected: "array".to_string(),
                    actual: frame,
                }
                .into())
            }
        };

        let parser = &mut CommandParser {
            parts: frames.into_iter(),
        };

        let command_name = parser.parse_command_name()?;

        match &command_name[..] {
            "client" => Client::try_from(parser).map(Command::Client),
            "config" => Config::try_from(parser).map(Command::Config),
            "del" => Del::try_from(parser).map(Command::Del),
            "echo" => Echo::try_from(parser).map(Command::Echo),
            "get" => Get::try_from(parser).map(Command::Get),
            "info" => Info::try_from(parser).map(Command::Info),
            "keys" => Keys::try_from(parser).map(Command::Keys),
            "ping" => Ping::try_from(parser).map(Command::Ping),
            "psync" => Psync::try_from(parser).map(Command::Psync),
            "replconf" => Replconf::try_from(parser).map(Command::Replconf),
            "set" => Set::try_from(parser).map(Command::Set),
            _ => Err(CommandParserError::UnknownCommand {
                command: command_name,
            }
            .into()),
        }
    }
}

pub(crate) struct CommandParser {
    parts: vec::IntoIter<Frame>,
}

impl CommandParser {
    fn parse_command_name(&mut self) -> Result<String, CommandParserError> {
        let command_name = self
            .parts
            .next()
            .ok_or_else(|| CommandParserError::EndOfStream)?;

        match command_name {
            Frame::Simple(s) => Ok(s.to_lowercase()),
            Frame::Bulk(bytes) => str::from_utf8(&bytes[..])
                .map(|s| s.to_lowercase())
                .map_err(CommandParserError::InvalidUTF8String),
            frame => Err(CommandParserError::InvalidFrame {
                expected: "simple string".to_string(),
                actual: frame,
            }),
        }
    }

    fn next_string(&mut self) -> Result<String, CommandParserError> {
        let frame = self
            .parts
            .next()
            .ok_or_else(|| CommandParserError::EndOfStream)?;

        match frame {
            // Both `Simple` and `Bulk` representation may be strings. Strings are parsed to UTF-8.
            // While errors are stored as strings, they are considered separate types.
            Frame::Simple(s) => Ok(s),
            Frame::Bulk(bytes) => str::from_utf8(&bytes[..])
                .map(|s| s.to_string())
                .map_err(CommandParserError::InvalidUTF8String),
            frame => Err(CommandParserError::InvalidFrame {
                expected: "simple or bulk string".to_string(),
                actual: frame,
            }),
        }
    }

    fn next_integer(&mut self) -> Result<i64, CommandParserError> {
        let frame = self
            .parts
            .next()
            .ok_or_else(|| CommandParserError::EndOfStream)?;

        match frame {
            Frame::Integer(i) => Ok(i),
            Frame::Simple(string) => string
                .parse::<i64>()
                .map_err(|_| CommandParserError::NotAnInteger { argument: string }),
            Frame::Bulk(bytes) => {
                let string = str::from_utf8(&bytes[..])
                    .map_err(CommandParserError::InvalidUTF8String)?;
                string
                    .parse::<i64>()
                    .map_err(|_| CommandParserError::NotAnInteger {
                        argument: string.to_string(),
                    })
            }
            frame => Err(CommandParserError::InvalidFrame {
                expected: "integer".to_string(),
                actual: frame,
            }),
        }
    }

    fn next_bytes(&mut self) -> Result<Bytes, CommandParserError> {
        let frame = self
            .parts
            .next()
            .ok_or_else(|| CommandParserError::EndOfStream)?;

        match frame {
            Frame::Simple(s) => Ok(Bytes::from(s)),
            Frame::Bulk(bytes) => Ok(bytes),
            frame => Err(CommandParserError::InvalidFrame {
                expected: "simple or bulk string".to_string(),
                actual: frame,
            }),
        }
    }

    /// Collects every remaining argument as a string.
    fn remaining_strings(&mut self) -> Result<Vec<String>, CommandParserError> {
        let mut args = vec![];

        loop {
            match self.next_string() {
                Ok(arg) => args.push(arg),
                Err(CommandParserError::EndOfStream) => return Ok(args),
                Err(err) => return Err(err),
            }
        }
    }
}

/// Errors produced while turning a frame into a [`Command`]. They are reported to the client
/// as `-ERR <message>` and the connection stays open.
#[derive(Debug, ThisError, PartialEq)]
pub(crate) enum CommandParserError {
    #[error("protocol error; invalid frame, expected {expected}, got {actual}")]
    InvalidFrame { expected: String, actual: Frame },
    #[error("unknown command '{command}'")]
    UnknownCommand { command: String },
    #[error("syntax error; unexpected argument '{argument}' for '{command}'")]
    InvalidCommandArgument { command: String, argument: String },
    #[error("value is not an integer or out of range")]
    NotAnInteger { argument: String },
    #[error("invalid expire time in '{command}' command")]
    InvalidExpireTime { command: String },
    #[error("protocol error; invalid UTF-8 string")]
    InvalidUTF8String(#[from] str::Utf8Error),
    #[error("wrong number of arguments")]
    EndOfStream,
}
