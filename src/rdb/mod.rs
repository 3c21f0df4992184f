//! RDB snapshots: the binary format used for the on-disk database file and for the payload a
//! primary ships to a replica during a full resynchronization.
//!
//! Ref: <https://rdb.fnordig.de/file_format.html>

mod decoder;
mod encoder;

use bytes::Bytes;
use std::io;
use std::path::Path;
use std::time::SystemTime;
use thiserror::Error as ThisError;
use tracing::info;

pub use decoder::{decode_size, decode_string};

pub(crate) const MAGIC: &[u8; 5] = b"REDIS";
pub(crate) const VERSION: &[u8; 4] = b"0011";
pub(crate) const HEADER_SIZE: usize = 9;

pub(crate) const OPCODE_AUX: u8 = 0xFA;
pub(crate) const OPCODE_RESIZE_DB: u8 = 0xFB;
pub(crate) const OPCODE_EXPIRE_TIME_MS: u8 = 0xFC;
pub(crate) const OPCODE_EXPIRE_TIME: u8 = 0xFD;
pub(crate) const OPCODE_SELECT_DB: u8 = 0xFE;
pub(crate) const OPCODE_EOF: u8 = 0xFF;
pub(crate) const TYPE_STRING: u8 = 0x00;

pub(crate) const ENC_INT8: u8 = 0xC0;
pub(crate) const ENC_INT16: u8 = 0xC1;
pub(crate) const ENC_INT32: u8 = 0xC2;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("unexpected end of snapshot")]
    UnexpectedEof,
    #[error("unexpected snapshot header {0:?}")]
    InvalidHeader(String),
    #[error("size encoding 0x{0:02X} is reserved for special string encodings")]
    ReservedSizeEncoding(u8),
    #[error("unsupported string encoding 0x{0:02X}")]
    UnsupportedStringEncoding(u8),
    #[error("unknown opcode 0x{opcode:02X} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: u64 },
    #[error("key at offset {0} is not valid UTF-8")]
    InvalidKey(u64),
    #[error("string of {0} bytes does not fit in a snapshot")]
    TooLarge(usize),
    #[error("failed to read snapshot: {0}")]
    Io(#[from] io::Error),
}

/// A decoded snapshot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    /// Auxiliary fields such as `redis-ver`, in file order.
    pub metadata: Vec<(String, String)>,
    pub records: Vec<Record>,
}

/// One string key-value pair.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub key: String,
    pub value: Bytes,
    pub expires_at: Option<SystemTime>,
}

impl Snapshot {
    pub fn decode(src: &[u8]) -> Result<Snapshot, Error> {
        decoder::decode(src)
    }

    pub fn encode(&self) -> Result<Bytes, Error> {
        encoder::encode(self)
    }
}

/// Reads the snapshot at `path`. A missing file is an empty database, reported as `None`.
pub async fn load(path: &Path) -> Result<Option<Snapshot>, Error> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    info!(path = %path.display(), bytes = bytes.len(), "loading snapshot");

    Snapshot::decode(&bytes).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    fn millis(ms: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(ms)
    }

    #[test]
    fn round_trip() {
        let snapshot = Snapshot {
            metadata: vec![("redis-ver".to_string(), "7.2.0".to_string())],
            records: vec![
                Record {
                    key: "foo".to_string(),
                    value: Bytes::from("bar"),
                    expires_at: None,
                },
                Record {
                    key: "small".to_string(),
                    value: Bytes::from("-12"),
                    expires_at: None,
                },
                Record {
                    key: "medium".to_string(),
                    value: Bytes::from("4242"),
                    expires_at: Some(millis(1_956_528_000_123)),
                },
                Record {
                    key: "large".to_string(),
                    value: Bytes::from("3000000000"),
                    expires_at: None,
                },
                Record {
                    key: "padded".to_string(),
                    value: Bytes::from("007"),
                    expires_at: Some(millis(1_640_995_200_000)),
                },
                Record {
                    key: "binary".to_string(),
                    value: Bytes::from_static(&[0xFF, 0x00, b'\r', b'\n']),
                    expires_at: None,
                },
            ],
        };

        let encoded = snapshot.encode().unwrap();
        let decoded = Snapshot::decode(&encoded).unwrap();

        assert_eq!(decoded, snapshot);
    }

    #[tokio::test]
    async fn load_missing_file_is_empty() {
        let path = std::env::temp_dir().join(format!("redisync-missing-{}.rdb", std::process::id()));

        let snapshot = load(&path).await.unwrap();

        assert!(snapshot.is_none());
    }

    #[tokio::test]
    async fn load_file() {
        let path = std::env::temp_dir().join(format!("redisync-load-{}.rdb", std::process::id()));
        let snapshot = Snapshot {
            metadata: vec![],
            records: vec![Record {
                key: "foo".to_string(),
                value: Bytes::from("bar"),
                expires_at: None,
            }],
        };
        tokio::fs::write(&path, snapshot.encode().unwrap())
            .await
            .unwrap();

        let loaded = load(&path).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        assert_eq!(loaded, Some(snapshot));
    }

    #[tokio::test]
    async fn load_foreign_file_fails() {
        let path = std::env::temp_dir().join(format!("redisync-foreign-{}.rdb", std::process::id()));
        tokio::fs::write(&path, b"NOTREDIS0011\xFF").await.unwrap();

        let loaded = load(&path).await;
        tokio::fs::remove_file(&path).await.unwrap();

        assert!(matches!(loaded, Err(Error::InvalidHeader(_))));
    }
}
