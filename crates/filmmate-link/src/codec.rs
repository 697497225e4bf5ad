//! Integer payload codec
//!
//! Commands and notifications carry a single signed integer in little-endian
//! two's-complement form. Outbound payloads have a fixed width; inbound
//! payloads are as wide as the peripheral chooses to make them.

use bytes::Bytes;

use crate::error::{LinkError, Result};

/// Encode `value` as exactly `width` little-endian two's-complement bytes
///
/// Widths above 8 bytes are sign-extended.
pub fn encode(value: i64, width: usize) -> Result<Bytes> {
    if width == 0 {
        return Err(LinkError::InvalidWidth(width));
    }
    if !fits(value, width) {
        return Err(LinkError::ValueOutOfRange { value, width });
    }

    let fill = if value < 0 { 0xFF } else { 0x00 };
    let mut out = vec![fill; width];
    let le = value.to_le_bytes();
    let n = width.min(le.len());
    out[..n].copy_from_slice(&le[..n]);
    Ok(Bytes::from(out))
}

/// Decode a little-endian two's-complement payload of any positive length
pub fn decode(bytes: &[u8]) -> Result<i64> {
    let last = *bytes.last().ok_or(LinkError::EmptyPayload)?;
    let negative = last & 0x80 != 0;
    let fill = if negative { 0xFF } else { 0x00 };

    if bytes.len() > 8 {
        // Everything past the low 8 bytes must be sign extension, and the
        // low 8 bytes must already carry the same sign.
        let sign_kept = (bytes[7] & 0x80 != 0) == negative;
        if !sign_kept || bytes[8..].iter().any(|b| *b != fill) {
            return Err(LinkError::PayloadOverflow { len: bytes.len() });
        }
    }

    let mut buf = [fill; 8];
    let n = bytes.len().min(8);
    buf[..n].copy_from_slice(&bytes[..n]);
    Ok(i64::from_le_bytes(buf))
}

fn fits(value: i64, width: usize) -> bool {
    if width >= 8 {
        return true;
    }
    let bits = (width * 8) as u32;
    let lo = -(1i64 << (bits - 1));
    let hi = (1i64 << (bits - 1)) - 1;
    (lo..=hi).contains(&value)
}
