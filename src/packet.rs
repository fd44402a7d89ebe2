//! Interest and Data packets.
//!
//! Wire layout (all nested TLV):
//!
//! ```text
//! Interest = 0x05 { Name, [ApplicationParameters 0x24] }
//! Data     = 0x06 { Name, Content 0x15, SignatureInfo 0x16, SignatureValue 0x17 }
//! ```
//!
//! A parameterized Interest carries a parameters-digest component as the last
//! component of its name; `check_params_digest` verifies it. A Data packet's
//! *full name* is its name plus an implicit-digest component over the entire
//! encoded packet; equality of full names identifies a packet uniquely.

use bytes::{Bytes, BytesMut};

use crate::error::{OnboardError, Result};
use crate::keys::{verify_signature, SigningKeyPair};
use crate::name::{sha256, Component, Name};
use crate::tlv;

pub const TT_INTEREST: u32 = 0x05;
pub const TT_DATA: u32 = 0x06;
pub const TT_APP_PARAMETERS: u32 = 0x24;
pub const TT_CONTENT: u32 = 0x15;
pub const TT_SIG_INFO: u32 = 0x16;
pub const TT_SIG_VALUE: u32 = 0x17;

/// Signature algorithm carried in SignatureInfo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SigType {
    /// Unauthenticated marker signature with an empty value.
    Null = 0x00,
    /// Ed25519 over name + content + signature type.
    Ed25519 = 0x05,
}

impl TryFrom<u8> for SigType {
    type Error = OnboardError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(SigType::Null),
            0x05 => Ok(SigType::Ed25519),
            _ => Err(OnboardError::BadPacket("signature type")),
        }
    }
}

/// A request packet, addressed by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interest {
    name: Name,
    app_parameters: Option<Bytes>,
}

impl Interest {
    /// A plain Interest fetching by exact name.
    pub fn new(name: Name) -> Self {
        Self {
            name,
            app_parameters: None,
        }
    }

    /// A parameterized Interest: appends the parameters-digest component to
    /// the name and attaches the parameters.
    pub fn parameterized(name: Name, params: impl Into<Bytes>) -> Self {
        let params = params.into();
        let name = name.appending(Component::params_digest(sha256(&params)));
        Self {
            name,
            app_parameters: Some(params),
        }
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn app_parameters(&self) -> Option<&[u8]> {
        self.app_parameters.as_deref()
    }

    /// True iff the name's last component is a parameters-digest component
    /// matching the attached parameters.
    pub fn check_params_digest(&self) -> bool {
        let (Some(last), Some(params)) = (self.name.from_end(0), self.app_parameters.as_ref())
        else {
            return false;
        };
        last.is_params_digest() && last.value() == sha256(params)
    }

    pub fn encode(&self) -> Bytes {
        let mut inner = BytesMut::new();
        self.name.encode_into(&mut inner);
        if let Some(params) = &self.app_parameters {
            tlv::put_tlv(&mut inner, TT_APP_PARAMETERS, params);
        }
        let mut buf = BytesMut::with_capacity(inner.len() + 4);
        tlv::put_tlv(&mut buf, TT_INTEREST, &inner);
        buf.freeze()
    }

    pub fn decode(input: &[u8]) -> Result<Interest> {
        let (outer, rest) = tlv::get_tlv(input)?;
        if outer.typ != TT_INTEREST || !rest.is_empty() {
            return Err(OnboardError::BadPacket("interest"));
        }
        let (name_tlv, rest) = tlv::get_tlv(outer.value)?;
        if name_tlv.typ != crate::name::TT_NAME {
            return Err(OnboardError::BadPacket("interest"));
        }
        let name = Name::decode_value(name_tlv.value)?;
        let app_parameters = if rest.is_empty() {
            None
        } else {
            let (params, tail) = tlv::get_tlv(rest)?;
            if params.typ != TT_APP_PARAMETERS || !tail.is_empty() {
                return Err(OnboardError::BadPacket("interest"));
            }
            Some(Bytes::copy_from_slice(params.value))
        };
        Ok(Interest {
            name,
            app_parameters,
        })
    }
}

/// A response packet: named, signed content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data {
    name: Name,
    content: Bytes,
    sig_type: SigType,
    signature: Bytes,
}

impl Data {
    /// Build a Data packet carrying the Null marker signature.
    pub fn null_signed(name: Name, content: impl Into<Bytes>) -> Self {
        Self {
            name,
            content: content.into(),
            sig_type: SigType::Null,
            signature: Bytes::new(),
        }
    }

    /// Build a Data packet signed with Ed25519.
    pub fn signed(name: Name, content: impl Into<Bytes>, keypair: &SigningKeyPair) -> Self {
        let mut data = Self {
            name,
            content: content.into(),
            sig_type: SigType::Ed25519,
            signature: Bytes::new(),
        };
        let sig = keypair.sign(&data.signed_portion());
        data.signature = Bytes::copy_from_slice(&sig);
        data
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn sig_type(&self) -> SigType {
        self.sig_type
    }

    /// The bytes covered by the signature: name TLV, content TLV, sig type.
    fn signed_portion(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.name.encode_into(&mut buf);
        tlv::put_tlv(&mut buf, TT_CONTENT, &self.content);
        buf.extend_from_slice(&[self.sig_type as u8]);
        buf.freeze()
    }

    /// Verify an Ed25519 signature against `public_key`.
    ///
    /// Null-signed packets never verify; they carry no authentication.
    pub fn verify(&self, public_key: &[u8; 32]) -> Result<()> {
        if self.sig_type != SigType::Ed25519 {
            return Err(OnboardError::SignatureInvalid);
        }
        verify_signature(public_key, &self.signed_portion(), &self.signature)
    }

    pub fn encode(&self) -> Bytes {
        let mut inner = BytesMut::new();
        self.name.encode_into(&mut inner);
        tlv::put_tlv(&mut inner, TT_CONTENT, &self.content);
        tlv::put_tlv(&mut inner, TT_SIG_INFO, &[self.sig_type as u8]);
        tlv::put_tlv(&mut inner, TT_SIG_VALUE, &self.signature);
        let mut buf = BytesMut::with_capacity(inner.len() + 4);
        tlv::put_tlv(&mut buf, TT_DATA, &inner);
        buf.freeze()
    }

    pub fn decode(input: &[u8]) -> Result<Data> {
        let (outer, rest) = tlv::get_tlv(input)?;
        if outer.typ != TT_DATA || !rest.is_empty() {
            return Err(OnboardError::BadPacket("data"));
        }
        let (name_tlv, rest) = tlv::get_tlv(outer.value)?;
        if name_tlv.typ != crate::name::TT_NAME {
            return Err(OnboardError::BadPacket("data"));
        }
        let name = Name::decode_value(name_tlv.value)?;
        let (content, rest) = tlv::get_tlv(rest)?;
        let (sig_info, rest) = tlv::get_tlv(rest)?;
        let (sig_value, rest) = tlv::get_tlv(rest)?;
        if content.typ != TT_CONTENT
            || sig_info.typ != TT_SIG_INFO
            || sig_value.typ != TT_SIG_VALUE
            || sig_info.value.len() != 1
            || !rest.is_empty()
        {
            return Err(OnboardError::BadPacket("data"));
        }
        Ok(Data {
            name,
            content: Bytes::copy_from_slice(content.value),
            sig_type: SigType::try_from(sig_info.value[0])?,
            signature: Bytes::copy_from_slice(sig_value.value),
        })
    }

    /// The full name: name plus implicit digest over the encoded packet.
    pub fn full_name(&self) -> Name {
        self.name
            .appending(Component::implicit_digest(sha256(&self.encode())))
    }

    /// True iff `interest` addresses this packet, by name or full name.
    pub fn satisfies(&self, interest: &Interest) -> bool {
        *interest.name() == self.name || *interest.name() == self.full_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interest_roundtrip() {
        let interest = Interest::parameterized(Name::from_uri("/svc/op"), Bytes::from_static(b"p"));
        let decoded = Interest::decode(&interest.encode()).unwrap();
        assert_eq!(decoded, interest);
        assert!(decoded.check_params_digest());
        assert_eq!(decoded.name().len(), 3);
    }

    #[test]
    fn plain_interest_has_no_digest() {
        let interest = Interest::new(Name::from_uri("/svc/op"));
        assert!(!interest.check_params_digest());
        let decoded = Interest::decode(&interest.encode()).unwrap();
        assert!(decoded.app_parameters().is_none());
    }

    #[test]
    fn tampered_params_fail_digest_check() {
        let interest = Interest::parameterized(Name::from_uri("/svc/op"), Bytes::from_static(b"p"));
        let mut wire = BytesMut::from(&interest.encode()[..]);
        let n = wire.len();
        wire[n - 1] ^= 0x01; // last byte of the parameters
        let decoded = Interest::decode(&wire).unwrap();
        assert!(!decoded.check_params_digest());
    }

    #[test]
    fn data_roundtrip_and_signature() {
        let kp = SigningKeyPair::generate();
        let data = Data::signed(Name::from_uri("/d"), Bytes::from_static(b"body"), &kp);
        let decoded = Data::decode(&data.encode()).unwrap();
        assert_eq!(decoded, data);
        decoded.verify(&kp.public_key_bytes()).unwrap();

        let other = SigningKeyPair::generate();
        assert!(decoded.verify(&other.public_key_bytes()).is_err());
    }

    #[test]
    fn null_signed_never_verifies() {
        let kp = SigningKeyPair::generate();
        let data = Data::null_signed(Name::from_uri("/d"), Bytes::new());
        assert!(data.verify(&kp.public_key_bytes()).is_err());
    }

    #[test]
    fn full_name_identifies_packet() {
        let a = Data::null_signed(Name::from_uri("/d"), Bytes::from_static(b"1"));
        let b = Data::null_signed(Name::from_uri("/d"), Bytes::from_static(b"2"));
        assert_eq!(a.name(), b.name());
        assert_ne!(a.full_name(), b.full_name());
        assert!(a.full_name().ends_with_digest());

        let by_full = Interest::new(a.full_name());
        assert!(a.satisfies(&by_full));
        assert!(!b.satisfies(&by_full));
    }
}
