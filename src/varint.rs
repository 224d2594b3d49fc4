//! Variable-length integer codecs shared by the whole wire format.
//!
//! Two codecs: an unsigned VInt and a sign-extending VSInt. Both emit at
//! most nine bytes: up to eight 7-bit groups with a continuation flag in
//! bit 7, then a ninth raw byte carrying a full eight bits. That bounds the
//! payload to exactly 64 bits (7×8 + 8) and makes the encoding
//! self-terminating without a length prefix.

use crate::{EncoderError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Writes `v` as an unsigned VInt (1..=9 bytes).
pub fn write_vint(writer: &mut BytesMut, v: u64) {
    let mut rest = v;
    for i in 0..9 {
        if rest == 0 && i != 0 {
            break;
        }
        if i == 8 {
            writer.put_u8(rest as u8);
            break;
        }
        let group = (rest & 0x7F) as u8;
        rest >>= 7;
        writer.put_u8(if rest == 0 { group } else { group | 0x80 });
    }
}

/// Writes `v` as a sign-extending VSInt (1..=9 bytes).
///
/// Emission stops once the dropped high bits are redundant with the sign
/// implied by the last payload bit written, so the decoder can sign-extend
/// from the bit width actually consumed. The ninth byte, if reached, is a
/// raw escape with no continuation flag.
pub fn write_vsint(writer: &mut BytesMut, v: i64) {
    if v >= 0 {
        let mut rest = v as u64;
        for i in 0..9 {
            if i == 8 {
                writer.put_u8(rest as u8);
                break;
            }
            let group = (rest & 0x7F) as u8;
            rest >>= 7;
            let more = rest != 0 || group & 0x40 != 0;
            if more {
                writer.put_u8(group | 0x80);
            } else {
                writer.put_u8(group);
                break;
            }
        }
    } else {
        let mut rest = v;
        for i in 0..9 {
            if i == 8 {
                writer.put_u8(rest as u8);
                break;
            }
            let group = (rest & 0x7F) as u8;
            rest >>= 7; // arithmetic shift keeps the sign
            let more = group & 0x40 == 0 || rest != -1;
            if more {
                writer.put_u8(group | 0x80);
            } else {
                writer.put_u8(group);
                break;
            }
        }
    }
}

/// Reads an unsigned VInt.
pub fn read_vint(reader: &mut Bytes) -> Result<u64> {
    let mut val = 0u64;
    for i in 0..9 {
        if reader.remaining() == 0 {
            return Err(EncoderError::TruncatedInput);
        }
        let b = reader.get_u8();
        let mask: u8 = if i == 8 { 0xFF } else { 0x7F };
        val |= ((b & mask) as u64) << (i * 7);
        if b & 0x80 == 0 {
            break;
        }
    }
    Ok(val)
}

/// Reads a sign-extending VSInt.
pub fn read_vsint(reader: &mut Bytes) -> Result<i64> {
    let mut val = 0i64;
    for i in 0..9 {
        if reader.remaining() == 0 {
            return Err(EncoderError::TruncatedInput);
        }
        let b = reader.get_u8();
        let mask: u8 = if i == 8 { 0xFF } else { 0x7F };
        val |= ((b & mask) as i64) << (i * 7);
        if i != 8 && b & 0x80 == 0 {
            // Replicate the sign bit of the last payload bit consumed.
            let shift = (7 - i) * 8 + i + 1;
            val = val << shift >> shift;
            break;
        }
    }
    Ok(val)
}
