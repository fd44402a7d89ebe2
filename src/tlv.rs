//! TLV primitives shared by every codec in this crate.
//!
//! Type and length are encoded as variable-size numbers: values below 253
//! occupy one byte; larger values use a marker byte (253/254/255) followed by
//! a big-endian u16/u32/u64. Decoding is strict: a truncated element or a
//! length that overruns the input is an error, never a partial read.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{OnboardError, Result};

/// One decoded TLV element borrowing from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    pub typ: u32,
    pub value: &'a [u8],
}

/// Append a varnum (type or length) to `buf`.
fn put_varnum(buf: &mut BytesMut, n: u64) {
    if n < 253 {
        buf.put_u8(n as u8);
    } else if n <= u64::from(u16::MAX) {
        buf.put_u8(253);
        buf.put_u16(n as u16);
    } else if n <= u64::from(u32::MAX) {
        buf.put_u8(254);
        buf.put_u32(n as u32);
    } else {
        buf.put_u8(255);
        buf.put_u64(n);
    }
}

/// Read a varnum from the front of `input`, returning it and the rest.
fn get_varnum(input: &[u8]) -> Result<(u64, &[u8])> {
    let (&first, rest) = input.split_first().ok_or(OnboardError::TlvTruncated)?;
    match first {
        0..=252 => Ok((u64::from(first), rest)),
        253 => {
            if rest.len() < 2 {
                return Err(OnboardError::TlvTruncated);
            }
            Ok((u64::from((&rest[..2]).get_u16()), &rest[2..]))
        }
        254 => {
            if rest.len() < 4 {
                return Err(OnboardError::TlvTruncated);
            }
            Ok((u64::from((&rest[..4]).get_u32()), &rest[4..]))
        }
        255 => {
            if rest.len() < 8 {
                return Err(OnboardError::TlvTruncated);
            }
            Ok(((&rest[..8]).get_u64(), &rest[8..]))
        }
    }
}

/// Append a complete TLV element to `buf`.
pub fn put_tlv(buf: &mut BytesMut, typ: u32, value: &[u8]) {
    put_varnum(buf, u64::from(typ));
    put_varnum(buf, value.len() as u64);
    buf.put_slice(value);
}

/// Append a TLV header for a value of `len` bytes that the caller will write.
pub fn put_tlv_header(buf: &mut BytesMut, typ: u32, len: usize) {
    put_varnum(buf, u64::from(typ));
    put_varnum(buf, len as u64);
}

/// The encoded size of a TLV element holding a value of `len` bytes.
pub fn tlv_size(typ: u32, len: usize) -> usize {
    varnum_size(u64::from(typ)) + varnum_size(len as u64) + len
}

fn varnum_size(n: u64) -> usize {
    if n < 253 {
        1
    } else if n <= u64::from(u16::MAX) {
        3
    } else if n <= u64::from(u32::MAX) {
        5
    } else {
        9
    }
}

/// Decode one TLV element from the front of `input`, returning it and the
/// remaining bytes.
pub fn get_tlv(input: &[u8]) -> Result<(Tlv<'_>, &[u8])> {
    let (typ, rest) = get_varnum(input)?;
    let typ = u32::try_from(typ).map_err(|_| OnboardError::TlvTruncated)?;
    let (len, rest) = get_varnum(rest)?;
    let len_usize = usize::try_from(len).map_err(|_| OnboardError::TlvLengthOverrun(len))?;
    if rest.len() < len_usize {
        return Err(OnboardError::TlvLengthOverrun(len));
    }
    Ok((
        Tlv {
            typ,
            value: &rest[..len_usize],
        },
        &rest[len_usize..],
    ))
}

/// Iterator over consecutive TLV elements in a buffer.
///
/// Yields `Err` once on a malformed element, then stops.
pub struct TlvIter<'a> {
    rest: &'a [u8],
    failed: bool,
}

impl<'a> TlvIter<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self {
            rest: input,
            failed: false,
        }
    }
}

impl<'a> Iterator for TlvIter<'a> {
    type Item = Result<Tlv<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.rest.is_empty() {
            return None;
        }
        match get_tlv(self.rest) {
            Ok((tlv, rest)) => {
                self.rest = rest;
                Some(Ok(tlv))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// A non-negative integer in the shortest of 1/2/4/8 big-endian bytes.
pub fn nni_bytes(n: u64) -> Vec<u8> {
    if n <= u64::from(u8::MAX) {
        vec![n as u8]
    } else if n <= u64::from(u16::MAX) {
        (n as u16).to_be_bytes().to_vec()
    } else if n <= u64::from(u32::MAX) {
        (n as u32).to_be_bytes().to_vec()
    } else {
        n.to_be_bytes().to_vec()
    }
}

/// Encode a non-negative integer TLV in the shortest width.
pub fn put_nni(buf: &mut BytesMut, typ: u32, n: u64) {
    put_tlv(buf, typ, &nni_bytes(n));
}

/// Decode a non-negative integer from a TLV value.
pub fn get_nni(value: &[u8]) -> Result<u64> {
    match value.len() {
        1 => Ok(u64::from(value[0])),
        2 => Ok(u64::from((&value[..]).get_u16())),
        4 => Ok(u64::from((&value[..]).get_u32())),
        8 => Ok((&value[..]).get_u64()),
        _ => Err(OnboardError::BadNni),
    }
}
