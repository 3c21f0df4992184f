use bytes::{Buf, Bytes};
use std::io::Cursor;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

use super::{
    Error, Record, Snapshot, ENC_INT16, ENC_INT32, ENC_INT8, HEADER_SIZE, MAGIC, OPCODE_AUX,
    OPCODE_EOF, OPCODE_EXPIRE_TIME, OPCODE_EXPIRE_TIME_MS, OPCODE_RESIZE_DB, OPCODE_SELECT_DB,
    TYPE_STRING,
};

pub(super) fn decode(src: &[u8]) -> Result<Snapshot, Error> {
    let mut src = Cursor::new(src);
    let mut snapshot = Snapshot::default();

    let header = get_bytes(&mut src, HEADER_SIZE)?;
    if !header.starts_with(MAGIC) {
        return Err(Error::InvalidHeader(
            String::from_utf8_lossy(&header).into_owned(),
        ));
    }

    // Auxiliary fields. The first byte that is not an AUX opcode is left for the body.
    while peek_u8(&src)? == OPCODE_AUX {
        src.advance(1);
        let name = decode_string(&mut src)?;
        let value = decode_string(&mut src)?;
        let (name, value) = (lossy(name), lossy(value));
        debug!(%name, %value, "snapshot metadata");
        snapshot.metadata.push((name, value));
    }

    // An expiration opcode applies to the key-value pair right after it only.
    let mut expires_at = None;

    loop {
        let offset = src.position();
        let opcode = get_u8(&mut src)?;

        match opcode {
            OPCODE_SELECT_DB => {
                let index = decode_size(&mut src)?;
                debug!(index, "snapshot database");
            }
            OPCODE_RESIZE_DB => {
                let keys = decode_size(&mut src)?;
                let expires = decode_size(&mut src)?;
                debug!(keys, expires, "snapshot hash table sizes");
            }
            OPCODE_EXPIRE_TIME_MS => {
                let millis = get_u64_le(&mut src)?;
                expires_at = Some(UNIX_EPOCH + Duration::from_millis(millis));
            }
            OPCODE_EXPIRE_TIME => {
                // Eight bytes on the wire, of which only the low 32 bits hold the seconds.
                let seconds = get_u64_le(&mut src)? as u32;
                expires_at = Some(UNIX_EPOCH + Duration::from_secs(u64::from(seconds)));
            }
            TYPE_STRING => {
                let key = String::from_utf8(decode_string(&mut src)?.to_vec())
                    .map_err(|_| Error::InvalidKey(offset + 1))?;
                let value = decode_string(&mut src)?;
                snapshot.records.push(Record {
                    key,
                    value,
                    expires_at: expires_at.take(),
                });
            }
            OPCODE_EOF => {
                // The trailing checksum is not verified.
                debug!(records = snapshot.records.len(), "snapshot decoded");
                return Ok(snapshot);
            }
            opcode => return Err(Error::UnknownOpcode { opcode, offset }),
        }
    }
}

/// Decodes a size: the two most significant bits of the first byte select how many bytes
/// follow.
///
/// * `00`: the remaining 6 bits are the size.
/// * `01`: the remaining 6 bits and the next byte form a 14-bit big-endian size.
/// * `10`: the remaining 6 bits are ignored, the next 4 bytes are a big-endian size.
/// * `11`: a special string encoding, see [`decode_string`].
pub fn decode_size(src: &mut Cursor<&[u8]>) -> Result<u32, Error> {
    let first = get_u8(src)?;

    match first >> 6 {
        0b00 => Ok(u32::from(first & 0x3F)),
        0b01 => {
            let next = get_u8(src)?;
            Ok(u32::from(first & 0x3F) << 8 | u32::from(next))
        }
        0b10 => {
            ensure_remaining(src, 4)?;
            Ok(src.get_u32())
        }
        _ => Err(Error::ReservedSizeEncoding(first)),
    }
}

/// Decodes a string. Integers stored in their binary form (`0xC0`, `0xC1`, `0xC2`) are rendered
/// back to decimal text; anything else is a size followed by that many raw bytes.
pub fn decode_string(src: &mut Cursor<&[u8]>) -> Result<Bytes, Error> {
    let first = peek_u8(src)?;

    if first >> 6 != 0b11 {
        let size = decode_size(src)? as usize;
        return get_bytes(src, size);
    }

    src.advance(1);
    let integer = match first {
        ENC_INT8 => {
            ensure_remaining(src, 1)?;
            i64::from(src.get_i8())
        }
        ENC_INT16 => {
            ensure_remaining(src, 2)?;
            i64::from(src.get_u16_le())
        }
        ENC_INT32 => {
            ensure_remaining(src, 4)?;
            i64::from(src.get_u32_le())
        }
        // 0xC3 is LZF compression, which is never produced here.
        encoding => return Err(Error::UnsupportedStringEncoding(encoding)),
    };

    Ok(Bytes::from(integer.to_string()))
}

fn lossy(bytes: Bytes) -> String {
    String::from_utf8_lossy(&bytes).into_owned()
}

fn ensure_remaining(src: &Cursor<&[u8]>, n: usize) -> Result<(), Error> {
    if src.remaining() < n {
        return Err(Error::UnexpectedEof);
    }
    Ok(())
}

fn peek_u8(src: &Cursor<&[u8]>) -> Result<u8, Error> {
    src.chunk().first().copied().ok_or(Error::UnexpectedEof)
}

fn get_u8(src: &mut Cursor<&[u8]>) -> Result<u8, Error> {
    ensure_remaining(src, 1)?;
    Ok(src.get_u8())
}

fn get_u64_le(src: &mut Cursor<&[u8]>) -> Result<u64, Error> {
    ensure_remaining(src, 8)?;
    Ok(src.get_u64_le())
}

fn get_bytes(src: &mut Cursor<&[u8]>, n: usize) -> Result<Bytes, Error> {
    ensure_remaining(src, n)?;
    Ok(src.copy_to_bytes(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size(data: &[u8]) -> Result<u32, Error> {
        decode_size(&mut Cursor::new(data))
    }

    fn string(data: &[u8]) -> Result<Bytes, Error> {
        decode_string(&mut Cursor::new(data))
    }

    #[test]
    fn size_encoding_boundaries() {
        assert_eq!(size(&[0x00]).unwrap(), 0);
        assert_eq!(size(&[0x3F]).unwrap(), 63);
        assert_eq!(size(&[0x40, 0x40]).unwrap(), 64);
        assert_eq!(size(&[0x7F, 0xFF]).unwrap(), 16383);
        assert_eq!(size(&[0x80, 0x00, 0x00, 0x40, 0x00]).unwrap(), 16384);
        assert_eq!(
            size(&[0x80, 0x12, 0x34, 0x56, 0x78]).unwrap(),
            0x1234_5678
        );
    }

    #[test]
    fn size_encoding_ignores_low_bits_of_32_bit_form() {
        assert_eq!(size(&[0xBF, 0x00, 0x00, 0x00, 0x0A]).unwrap(), 10);
    }

    #[test]
    fn size_encoding_rejects_special_form() {
        assert!(matches!(
            size(&[0xC0, 0x01]),
            Err(Error::ReservedSizeEncoding(0xC0))
        ));
    }

    #[test]
    fn size_encoding_truncated() {
        assert!(matches!(size(&[0x40]), Err(Error::UnexpectedEof)));
        assert!(matches!(size(&[0x80, 0x00]), Err(Error::UnexpectedEof)));
    }

    #[test]
    fn string_length_prefixed() {
        assert_eq!(string(b"\x03bar").unwrap(), Bytes::from("bar"));
        assert_eq!(string(b"\x00").unwrap(), Bytes::new());
    }

    #[test]
    fn string_integer_encodings() {
        assert_eq!(string(&[0xC0, 0x7B]).unwrap(), Bytes::from("123"));
        assert_eq!(string(&[0xC0, 0xFE]).unwrap(), Bytes::from("-2"));
        assert_eq!(string(&[0xC1, 0x39, 0x30]).unwrap(), Bytes::from("12345"));
        assert_eq!(
            string(&[0xC2, 0x87, 0xD6, 0x12, 0x00]).unwrap(),
            Bytes::from("1234567")
        );
    }

    #[test]
    fn string_compressed_is_unsupported() {
        assert!(matches!(
            string(&[0xC3, 0x01, 0x01, 0x00]),
            Err(Error::UnsupportedStringEncoding(0xC3))
        ));
    }

    #[test]
    fn string_truncated_payload() {
        assert!(matches!(string(b"\x05ab"), Err(Error::UnexpectedEof)));
    }

    const SINGLE_KEY: &[u8] = b"REDIS0011\
        \xFA\x09redis-ver\x057.2.0\
        \xFA\x0Aredis-bits\xC0\x40\
        \xFE\x00\xFB\x01\x00\
        \x00\x03foo\x03bar\
        \xFF\x00\x00\x00\x00\x00\x00\x00\x00";

    #[test]
    fn decode_single_key() {
        let snapshot = decode(SINGLE_KEY).unwrap();

        assert_eq!(
            snapshot.metadata,
            vec![
                ("redis-ver".to_string(), "7.2.0".to_string()),
                ("redis-bits".to_string(), "64".to_string()),
            ]
        );
        assert_eq!(
            snapshot.records,
            vec![Record {
                key: "foo".to_string(),
                value: Bytes::from("bar"),
                expires_at: None,
            }]
        );
    }

    #[test]
    fn decode_expiry_applies_to_next_pair_only() {
        let data = b"REDIS0011\
            \xFE\x00\xFB\x03\x02\
            \xFC\x15\x72\xE7\x07\x8F\x01\x00\x00\x00\x04milli\x01a\
            \xFD\x52\xED\x2A\x66\x00\x00\x00\x00\x00\x03sec\x01b\
            \x00\x04none\x01c\
            \xFF";

        let snapshot = decode(data).unwrap();

        assert_eq!(snapshot.records.len(), 3);
        assert_eq!(
            snapshot.records[0].expires_at,
            Some(UNIX_EPOCH + Duration::from_millis(0x018F_07E7_7215))
        );
        assert_eq!(
            snapshot.records[1].expires_at,
            Some(UNIX_EPOCH + Duration::from_secs(0x662A_ED52))
        );
        assert_eq!(snapshot.records[2].expires_at, None);
    }

    #[test]
    fn decode_empty_database() {
        let snapshot = decode(b"REDIS0011\xFA\x09redis-ver\x057.2.0\xFF").unwrap();

        assert!(snapshot.records.is_empty());
    }

    #[test]
    fn decode_foreign_header() {
        assert!(matches!(
            decode(b"RUBBISH01\xFF"),
            Err(Error::InvalidHeader(ref header)) if header == "RUBBISH01"
        ));
    }

    #[test]
    fn decode_unknown_opcode() {
        assert!(matches!(
            decode(b"REDIS0011\xFE\x00\x07"),
            Err(Error::UnknownOpcode { opcode: 0x07, offset: 11 })
        ));
    }

    #[test]
    fn decode_rejects_binary_keys() {
        assert!(matches!(
            decode(b"REDIS0011\x00\x02\xFF\xFE\x01v\xFF"),
            Err(Error::InvalidKey(10))
        ));
    }

    #[test]
    fn decode_missing_terminator() {
        assert!(matches!(
            decode(b"REDIS0011\x00\x03foo\x03bar"),
            Err(Error::UnexpectedEof)
        ));
    }
}
