//! Hierarchical packet names.
//!
//! A name is a sequence of typed components. Three component types appear on
//! this crate's wire:
//!   0x08 generic text/binary component
//!   0x01 implicit SHA-256 digest of a whole encoded packet
//!   0x02 SHA-256 digest of an Interest's application parameters
//! The name itself is TLV type 0x07; components are nested TLVs.

use std::fmt;

use bytes::{Bytes, BytesMut};
use sha2::{Digest, Sha256};

use crate::error::{OnboardError, Result};
use crate::tlv;

/// TLV type of a whole name.
pub const TT_NAME: u32 = 0x07;
/// TLV type of a generic name component.
pub const TT_GENERIC: u32 = 0x08;
/// TLV type of an implicit packet-digest component.
pub const TT_IMPLICIT_DIGEST: u32 = 0x01;
/// TLV type of a parameters-digest component.
pub const TT_PARAMS_DIGEST: u32 = 0x02;

/// One name component: a TLV type plus opaque value bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Component {
    typ: u32,
    value: Bytes,
}

impl Component {
    /// A generic component with the given value bytes.
    pub fn generic(value: impl Into<Bytes>) -> Self {
        Self {
            typ: TT_GENERIC,
            value: value.into(),
        }
    }

    /// An implicit-digest component over `digest`.
    pub fn implicit_digest(digest: [u8; 32]) -> Self {
        Self {
            typ: TT_IMPLICIT_DIGEST,
            value: Bytes::copy_from_slice(&digest),
        }
    }

    /// A parameters-digest component over `digest`.
    pub fn params_digest(digest: [u8; 32]) -> Self {
        Self {
            typ: TT_PARAMS_DIGEST,
            value: Bytes::copy_from_slice(&digest),
        }
    }

    pub fn typ(&self) -> u32 {
        self.typ
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn is_implicit_digest(&self) -> bool {
        self.typ == TT_IMPLICIT_DIGEST && self.value.len() == 32
    }

    pub fn is_params_digest(&self) -> bool {
        self.typ == TT_PARAMS_DIGEST && self.value.len() == 32
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.typ {
            TT_IMPLICIT_DIGEST => write!(f, "sha256digest={}", ShortHex(&self.value)),
            TT_PARAMS_DIGEST => write!(f, "params-sha256={}", ShortHex(&self.value)),
            _ => {
                if self.value.iter().all(|b| b.is_ascii_graphic()) && !self.value.is_empty() {
                    write!(f, "{}", String::from_utf8_lossy(&self.value))
                } else {
                    write!(f, "{}%={}", self.typ, ShortHex(&self.value))
                }
            }
        }
    }
}

struct ShortHex<'a>(&'a [u8]);

impl fmt::Display for ShortHex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0.iter().take(8) {
            write!(f, "{b:02x}")?;
        }
        if self.0.len() > 8 {
            write!(f, "..")?;
        }
        Ok(())
    }
}

/// A packet name: an ordered list of [`Component`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Name {
    components: Vec<Component>,
}

impl Name {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a name of generic components from a `/`-separated URI.
    /// Used for fixtures and host configuration.
    pub fn from_uri(uri: &str) -> Self {
        let components = uri
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| Component::generic(Bytes::copy_from_slice(s.as_bytes())))
            .collect();
        Self { components }
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&Component> {
        self.components.get(i)
    }

    /// The `i`-th component counted from the end; `from_end(0)` is the last.
    pub fn from_end(&self, i: usize) -> Option<&Component> {
        self.len().checked_sub(i + 1).and_then(|j| self.components.get(j))
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn push(&mut self, component: Component) {
        self.components.push(component);
    }

    /// This name extended by one component.
    pub fn appending(&self, component: Component) -> Name {
        let mut name = self.clone();
        name.push(component);
        name
    }

    /// This name extended by every component of `other`.
    pub fn joining(&self, other: &Name) -> Name {
        let mut name = self.clone();
        name.components.extend(other.components.iter().cloned());
        name
    }

    /// The first `n` components as a new name.
    pub fn prefix(&self, n: usize) -> Name {
        Name {
            components: self.components[..n.min(self.len())].to_vec(),
        }
    }

    pub fn is_prefix_of(&self, other: &Name) -> bool {
        other.components.len() >= self.components.len()
            && other.components[..self.components.len()] == self.components[..]
    }

    /// True iff the final component is an implicit-digest component.
    pub fn ends_with_digest(&self) -> bool {
        self.from_end(0).is_some_and(Component::is_implicit_digest)
    }

    /// Encode the value portion (components only, no outer header).
    pub fn encode_value_into(&self, buf: &mut BytesMut) {
        for c in &self.components {
            tlv::put_tlv(buf, c.typ, &c.value);
        }
    }

    fn value_size(&self) -> usize {
        self.components
            .iter()
            .map(|c| tlv::tlv_size(c.typ, c.value.len()))
            .sum()
    }

    /// Encode as a complete name TLV.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(tlv::tlv_size(TT_NAME, self.value_size()));
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Encode a complete name TLV into `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        tlv::put_tlv_header(buf, TT_NAME, self.value_size());
        self.encode_value_into(buf);
    }

    /// Decode a complete name TLV (header included).
    pub fn decode(input: &[u8]) -> Result<Name> {
        let (outer, rest) = tlv::get_tlv(input)?;
        if outer.typ != TT_NAME || !rest.is_empty() {
            return Err(OnboardError::BadPacket("name"));
        }
        Self::decode_value(outer.value)
    }

    /// Decode the components of a name from a TLV value.
    pub fn decode_value(value: &[u8]) -> Result<Name> {
        let mut components = Vec::new();
        for item in tlv::TlvIter::new(value) {
            let item = item?;
            components.push(Component {
                typ: item.typ,
                value: Bytes::copy_from_slice(item.value),
            });
        }
        Ok(Name { components })
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return write!(f, "/");
        }
        for c in &self.components {
            write!(f, "/{c}")?;
        }
        Ok(())
    }
}

/// SHA-256 of `input` as a fixed array.
pub fn sha256(input: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_roundtrip() {
        let name = Name::from_uri("/example/device/alice");
        assert_eq!(name.len(), 3);
        assert_eq!(name.get(0).unwrap().value(), b"example");
        assert_eq!(name.to_string(), "/example/device/alice");
    }

    #[test]
    fn encode_decode_identity() {
        let mut name = Name::from_uri("/a/b");
        name.push(Component::implicit_digest([0xAB; 32]));
        let decoded = Name::decode(&name.encode()).unwrap();
        assert_eq!(decoded, name);
        assert!(decoded.ends_with_digest());
    }

    #[test]
    fn prefix_relation() {
        let a = Name::from_uri("/x/y");
        let b = Name::from_uri("/x/y/z");
        assert!(a.is_prefix_of(&b));
        assert!(!b.is_prefix_of(&a));
        assert!(a.is_prefix_of(&a));
    }

    #[test]
    fn from_end_indexing() {
        let name = Name::from_uri("/a/b/c");
        assert_eq!(name.from_end(0).unwrap().value(), b"c");
        assert_eq!(name.from_end(2).unwrap().value(), b"a");
        assert!(name.from_end(3).is_none());
    }

    #[test]
    fn digest_components_are_typed() {
        let d = Component::implicit_digest([0; 32]);
        assert!(d.is_implicit_digest());
        assert!(!d.is_params_digest());
        let p = Component::params_digest([0; 32]);
        assert!(p.is_params_digest());
    }
}
