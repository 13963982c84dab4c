//! Order-preserving binary encodings for storage keys. Encoded values sort the
//! same way bytewise as the values they encode, so keys can be range-scanned.

use crate::error::{Error, Result};

/// Encodes a byte slice, escaping 0x00 as 0x00 0xff and terminating with
/// 0x00 0x00, so that encoded slices keep their ordering when concatenated.
pub fn encode_bytes(bytes: &[u8]) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(bytes.len() + 2);
    for b in bytes {
        encoded.push(*b);
        if *b == 0x00 {
            encoded.push(0xff);
        }
    }
    encoded.extend([0x00, 0x00]);
    encoded
}

/// Encodes a u64 big-endian.
pub fn encode_u64(n: u64) -> [u8; 8] {
    n.to_be_bytes()
}

/// Takes a single byte from the front of a slice.
pub fn take_byte(bytes: &mut &[u8]) -> Result<u8> {
    if bytes.is_empty() {
        return Err(Error::Internal("Unexpected end of bytes".into()));
    }
    let b = bytes[0];
    *bytes = &bytes[1..];
    Ok(b)
}

/// Takes an encoded byte slice from the front of a slice and decodes it.
pub fn take_bytes(bytes: &mut &[u8]) -> Result<Vec<u8>> {
    let mut decoded = Vec::with_capacity(bytes.len() / 2);
    let mut iter = bytes.iter().enumerate();
    let taken = loop {
        match iter.next().map(|(_, b)| b) {
            Some(0x00) => match iter.next() {
                Some((i, 0x00)) => break i + 1,
                Some((_, 0xff)) => decoded.push(0x00),
                Some((_, b)) => {
                    return Err(Error::Internal(format!("Invalid byte escape {:x?}", b)))
                }
                None => return Err(Error::Internal("Unexpected end of bytes".into())),
            },
            Some(b) => decoded.push(*b),
            None => return Err(Error::Internal("Unexpected end of bytes".into())),
        }
    };
    *bytes = &bytes[taken..];
    Ok(decoded)
}

/// Takes a big-endian u64 from the front of a slice.
pub fn take_u64(bytes: &mut &[u8]) -> Result<u64> {
    if bytes.len() < 8 {
        return Err(Error::Internal(format!("Unable to decode u64 from {} bytes", bytes.len())));
    }
    let mut buf = [0; 8];
    buf.copy_from_slice(&bytes[0..8]);
    *bytes = &bytes[8..];
    Ok(u64::from_be_bytes(buf))
}
