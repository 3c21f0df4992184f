use bytes::{BufMut, Bytes, BytesMut};
use std::time::{SystemTime, UNIX_EPOCH};

use super::{
    Error, Snapshot, ENC_INT16, ENC_INT32, ENC_INT8, MAGIC, OPCODE_AUX, OPCODE_EOF,
    OPCODE_EXPIRE_TIME_MS, OPCODE_RESIZE_DB, OPCODE_SELECT_DB, TYPE_STRING, VERSION,
};

pub(super) fn encode(snapshot: &Snapshot) -> Result<Bytes, Error> {
    let mut dst = BytesMut::with_capacity(128);

    dst.put_slice(MAGIC);
    dst.put_slice(VERSION);

    for (name, value) in &snapshot.metadata {
        dst.put_u8(OPCODE_AUX);
        put_string(&mut dst, name.as_bytes())?;
        put_string(&mut dst, value.as_bytes())?;
    }

    if !snapshot.records.is_empty() {
        let expires = snapshot
            .records
            .iter()
            .filter(|record| record.expires_at.is_some())
            .count();

        dst.put_u8(OPCODE_SELECT_DB);
        put_size(&mut dst, 0)?;
        dst.put_u8(OPCODE_RESIZE_DB);
        put_size(&mut dst, snapshot.records.len())?;
        put_size(&mut dst, expires)?;

        for record in &snapshot.records {
            if let Some(expires_at) = record.expires_at {
                dst.put_u8(OPCODE_EXPIRE_TIME_MS);
                dst.put_u64_le(unix_millis(expires_at));
            }
            dst.put_u8(TYPE_STRING);
            put_string(&mut dst, record.key.as_bytes())?;
            put_string(&mut dst, &record.value)?;
        }
    }

    dst.put_u8(OPCODE_EOF);
    // A zeroed checksum tells readers that checksumming is disabled.
    dst.put_u64_le(0);

    Ok(dst.freeze())
}

fn put_size(dst: &mut BytesMut, size: usize) -> Result<(), Error> {
    match size {
        0..=0x3F => dst.put_u8(size as u8),
        0x40..=0x3FFF => dst.put_u16(0x4000 | size as u16),
        _ => {
            let size = u32::try_from(size).map_err(|_| Error::TooLarge(size))?;
            dst.put_u8(0x80);
            dst.put_u32(size);
        }
    }
    Ok(())
}

fn put_string(dst: &mut BytesMut, bytes: &[u8]) -> Result<(), Error> {
    match as_integer(bytes) {
        Some(i @ -128..=127) => {
            dst.put_u8(ENC_INT8);
            dst.put_i8(i as i8);
        }
        Some(i @ 0..=0xFFFF) => {
            dst.put_u8(ENC_INT16);
            dst.put_u16_le(i as u16);
        }
        Some(i @ 0..=0xFFFF_FFFF) => {
            dst.put_u8(ENC_INT32);
            dst.put_u32_le(i as u32);
        }
        _ => {
            put_size(dst, bytes.len())?;
            dst.put_slice(bytes);
        }
    }
    Ok(())
}

/// Parses `bytes` as an integer only when printing it back yields the very same bytes, so that
/// values like `007` or `+1` survive a round trip.
fn as_integer(bytes: &[u8]) -> Option<i64> {
    let text = std::str::from_utf8(bytes).ok()?;
    let integer = text.parse::<i64>().ok()?;
    (integer.to_string() == text).then_some(integer)
}

fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
