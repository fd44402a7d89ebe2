//! The six onboarding message payloads and their codecs.
//!
//! Payload structs are plain data; the codec functions sit beside them so
//! tests can build and inspect payloads without going through the transport.
//! Decoders accept their recognized TLV types in any order, reject unknown
//! types and duplicates, and fail when a mandatory field is absent or a
//! fixed-width field has the wrong size.

use bytes::{Bytes, BytesMut};

use crate::error::{OnboardError, Result};
use crate::name::Name;
use crate::packet::Data;
use crate::pake::{CONFIRM_LEN, SPAKE2_MSG_LEN};
use crate::session::EncryptedPayload;
use crate::tlv::{self, Tlv, TlvIter};

/// Wire type registry. Stable across endpoints.
pub mod tt {
    pub const SPAKE2_T: u32 = 0xA1;
    pub const SPAKE2_S: u32 = 0xA2;
    pub const SPAKE2_FKCA: u32 = 0xA3;
    pub const SPAKE2_FKCB: u32 = 0xA4;
    pub const NC: u32 = 0xA5;
    pub const CA_PROFILE_NAME: u32 = 0xA6;
    pub const AUTHENTICATOR_CERT_NAME: u32 = 0xA7;
    pub const DEVICE_NAME: u32 = 0xA8;
    pub const TIMESTAMP: u32 = 0xA9;
    pub const T_REQ: u32 = 0xAA;
    pub const ISSUED_CERT_NAME: u32 = 0xAB;
    pub const INITIALIZATION_VECTOR: u32 = 0xAC;
    pub const AUTHENTICATION_TAG: u32 = 0xAD;
    pub const ENCRYPTED_PAYLOAD: u32 = 0xAE;
}

fn fixed<const N: usize>(tlv: Tlv<'_>) -> Result<[u8; N]> {
    tlv.value
        .try_into()
        .map_err(|_| OnboardError::BadFieldLength {
            typ: tlv.typ,
            expected: N,
            actual: tlv.value.len(),
        })
}

fn require<T>(field: Option<T>, typ: u32) -> Result<T> {
    field.ok_or(OnboardError::MissingField(typ))
}

fn reject_duplicate<T>(slot: &Option<T>, typ: u32) -> Result<()> {
    if slot.is_some() {
        return Err(OnboardError::UnexpectedTlv(typ));
    }
    Ok(())
}

/// Append the `{IV, AuthTag, EncryptedPayload}` triple to `buf`.
pub fn encode_encrypted_into(buf: &mut BytesMut, sealed: &EncryptedPayload) {
    tlv::put_tlv(buf, tt::INITIALIZATION_VECTOR, &sealed.iv);
    tlv::put_tlv(buf, tt::AUTHENTICATION_TAG, &sealed.tag);
    tlv::put_tlv(buf, tt::ENCRYPTED_PAYLOAD, &sealed.ciphertext);
}

/// Accumulator for the encrypted-envelope TLVs when they are interleaved
/// with other fields.
#[derive(Default)]
struct EncryptedParts {
    iv: Option<[u8; crate::session::IV_LEN]>,
    tag: Option<[u8; crate::session::TAG_LEN]>,
    ciphertext: Option<Bytes>,
}

impl EncryptedParts {
    /// Consume `tlv` if it belongs to the envelope.
    fn absorb(&mut self, tlv: Tlv<'_>) -> Result<bool> {
        match tlv.typ {
            tt::INITIALIZATION_VECTOR => {
                reject_duplicate(&self.iv, tlv.typ)?;
                self.iv = Some(fixed(tlv)?);
            }
            tt::AUTHENTICATION_TAG => {
                reject_duplicate(&self.tag, tlv.typ)?;
                self.tag = Some(fixed(tlv)?);
            }
            tt::ENCRYPTED_PAYLOAD => {
                reject_duplicate(&self.ciphertext, tlv.typ)?;
                self.ciphertext = Some(Bytes::copy_from_slice(tlv.value));
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn finish(self) -> Result<EncryptedPayload> {
        Ok(EncryptedPayload {
            iv: require(self.iv, tt::INITIALIZATION_VECTOR)?,
            tag: require(self.tag, tt::AUTHENTICATION_TAG)?,
            ciphertext: require(self.ciphertext, tt::ENCRYPTED_PAYLOAD)?,
        })
    }
}

/// Parse a payload that is nothing but one encrypted envelope.
pub fn decode_encrypted(input: &[u8]) -> Result<EncryptedPayload> {
    let mut parts = EncryptedParts::default();
    for item in TlvIter::new(input) {
        let item = item?;
        if !parts.absorb(item)? {
            return Err(OnboardError::UnexpectedTlv(item.typ));
        }
    }
    parts.finish()
}

// ── PAKE round ──────────────────────────────────────────────────────────

/// First Interest: the initiator's SPAKE2 message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PakeRequest {
    pub spake2_t: [u8; SPAKE2_MSG_LEN],
}

impl PakeRequest {
    pub fn encode_params(&self) -> Bytes {
        let mut buf = BytesMut::new();
        tlv::put_tlv(&mut buf, tt::SPAKE2_T, &self.spake2_t);
        buf.freeze()
    }

    pub fn decode_params(params: &[u8]) -> Result<Self> {
        let mut spake2_t = None;
        for item in TlvIter::new(params) {
            let item = item?;
            match item.typ {
                tt::SPAKE2_T => {
                    reject_duplicate(&spake2_t, item.typ)?;
                    spake2_t = Some(fixed(item)?);
                }
                other => return Err(OnboardError::UnexpectedTlv(other)),
            }
        }
        Ok(Self {
            spake2_t: require(spake2_t, tt::SPAKE2_T)?,
        })
    }
}

/// First Data: the responder's SPAKE2 message plus its confirmation MAC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PakeResponse {
    pub spake2_s: [u8; SPAKE2_MSG_LEN],
    pub spake2_fkcb: [u8; CONFIRM_LEN],
}

impl PakeResponse {
    pub fn encode_content(&self) -> Bytes {
        let mut buf = BytesMut::new();
        tlv::put_tlv(&mut buf, tt::SPAKE2_S, &self.spake2_s);
        tlv::put_tlv(&mut buf, tt::SPAKE2_FKCB, &self.spake2_fkcb);
        buf.freeze()
    }

    pub fn decode_content(content: &[u8]) -> Result<Self> {
        let mut spake2_s = None;
        let mut spake2_fkcb = None;
        for item in TlvIter::new(content) {
            let item = item?;
            match item.typ {
                tt::SPAKE2_S => {
                    reject_duplicate(&spake2_s, item.typ)?;
                    spake2_s = Some(fixed(item)?);
                }
                tt::SPAKE2_FKCB => {
                    reject_duplicate(&spake2_fkcb, item.typ)?;
                    spake2_fkcb = Some(fixed(item)?);
                }
                other => return Err(OnboardError::UnexpectedTlv(other)),
            }
        }
        Ok(Self {
            spake2_s: require(spake2_s, tt::SPAKE2_S)?,
            spake2_fkcb: require(spake2_fkcb, tt::SPAKE2_FKCB)?,
        })
    }
}

// ── Confirm round ───────────────────────────────────────────────────────

/// Second Interest: the initiator's confirmation MAC in the clear plus the
/// encrypted session parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmRequest {
    pub spake2_fkca: [u8; CONFIRM_LEN],
    pub nc: Bytes,
    pub ca_profile_name: Name,
    pub authenticator_cert_name: Name,
    pub device_name: Name,
    /// The initiator's wall clock, unix microseconds.
    pub timestamp: u64,
}

impl ConfirmRequest {
    /// The plaintext that travels inside the encrypted envelope.
    pub fn encode_inner(&self) -> Bytes {
        let mut buf = BytesMut::new();
        tlv::put_tlv(&mut buf, tt::NC, &self.nc);
        tlv::put_tlv(&mut buf, tt::CA_PROFILE_NAME, &self.ca_profile_name.encode());
        tlv::put_tlv(
            &mut buf,
            tt::AUTHENTICATOR_CERT_NAME,
            &self.authenticator_cert_name.encode(),
        );
        tlv::put_tlv(&mut buf, tt::DEVICE_NAME, &self.device_name.encode());
        tlv::put_nni(&mut buf, tt::TIMESTAMP, self.timestamp);
        buf.freeze()
    }

    /// The Interest parameters: cleartext Fkca followed by the envelope.
    pub fn encode_params(&self, sealed: &EncryptedPayload) -> Bytes {
        let mut buf = BytesMut::new();
        tlv::put_tlv(&mut buf, tt::SPAKE2_FKCA, &self.spake2_fkca);
        encode_encrypted_into(&mut buf, sealed);
        buf.freeze()
    }

    /// Split the Interest parameters into the cleartext Fkca and the
    /// still-sealed envelope.
    pub fn split_params(params: &[u8]) -> Result<([u8; CONFIRM_LEN], EncryptedPayload)> {
        let mut fkca = None;
        let mut parts = EncryptedParts::default();
        for item in TlvIter::new(params) {
            let item = item?;
            if item.typ == tt::SPAKE2_FKCA {
                reject_duplicate(&fkca, item.typ)?;
                fkca = Some(fixed(item)?);
            } else if !parts.absorb(item)? {
                return Err(OnboardError::UnexpectedTlv(item.typ));
            }
        }
        Ok((require(fkca, tt::SPAKE2_FKCA)?, parts.finish()?))
    }

    /// Parse the decrypted inner plaintext. Both referenced packet names
    /// must end with an implicit-digest component, binding each reference
    /// to one exact packet.
    pub fn from_parts(spake2_fkca: [u8; CONFIRM_LEN], plaintext: &[u8]) -> Result<Self> {
        let mut nc = None;
        let mut ca_profile_name = None;
        let mut authenticator_cert_name = None;
        let mut device_name = None;
        let mut timestamp = None;
        for item in TlvIter::new(plaintext) {
            let item = item?;
            match item.typ {
                tt::NC => {
                    reject_duplicate(&nc, item.typ)?;
                    nc = Some(Bytes::copy_from_slice(item.value));
                }
                tt::CA_PROFILE_NAME => {
                    reject_duplicate(&ca_profile_name, item.typ)?;
                    ca_profile_name = Some(Name::decode(item.value)?);
                }
                tt::AUTHENTICATOR_CERT_NAME => {
                    reject_duplicate(&authenticator_cert_name, item.typ)?;
                    authenticator_cert_name = Some(Name::decode(item.value)?);
                }
                tt::DEVICE_NAME => {
                    reject_duplicate(&device_name, item.typ)?;
                    device_name = Some(Name::decode(item.value)?);
                }
                tt::TIMESTAMP => {
                    reject_duplicate(&timestamp, item.typ)?;
                    timestamp = Some(tlv::get_nni(item.value)?);
                }
                other => return Err(OnboardError::UnexpectedTlv(other)),
            }
        }
        let req = Self {
            spake2_fkca,
            nc: require(nc, tt::NC)?,
            ca_profile_name: require(ca_profile_name, tt::CA_PROFILE_NAME)?,
            authenticator_cert_name: require(
                authenticator_cert_name,
                tt::AUTHENTICATOR_CERT_NAME,
            )?,
            device_name: require(device_name, tt::DEVICE_NAME)?,
            timestamp: require(timestamp, tt::TIMESTAMP)?,
        };
        if !req.ca_profile_name.ends_with_digest()
            || !req.authenticator_cert_name.ends_with_digest()
        {
            return Err(OnboardError::MissingDigestSuffix);
        }
        Ok(req)
    }
}

/// Second Data: the device's certificate-signing request, encrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmResponse {
    pub t_req: Data,
}

impl ConfirmResponse {
    pub fn encode_inner(&self) -> Bytes {
        let mut buf = BytesMut::new();
        tlv::put_tlv(&mut buf, tt::T_REQ, &self.t_req.encode());
        buf.freeze()
    }

    pub fn decode_inner(plaintext: &[u8]) -> Result<Self> {
        let mut t_req = None;
        for item in TlvIter::new(plaintext) {
            let item = item?;
            match item.typ {
                tt::T_REQ => {
                    reject_duplicate(&t_req, item.typ)?;
                    t_req = Some(Data::decode(item.value)?);
                }
                other => return Err(OnboardError::UnexpectedTlv(other)),
            }
        }
        Ok(Self {
            t_req: require(t_req, tt::T_REQ)?,
        })
    }
}

// ── Credential round ────────────────────────────────────────────────────

/// Third Interest: the full name of the issued certificate, encrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRequest {
    pub temp_cert_name: Name,
}

impl CredentialRequest {
    pub fn encode_inner(&self) -> Bytes {
        let mut buf = BytesMut::new();
        tlv::put_tlv(&mut buf, tt::ISSUED_CERT_NAME, &self.temp_cert_name.encode());
        buf.freeze()
    }

    pub fn decode_inner(plaintext: &[u8]) -> Result<Self> {
        let mut temp_cert_name = None;
        for item in TlvIter::new(plaintext) {
            let item = item?;
            match item.typ {
                tt::ISSUED_CERT_NAME => {
                    reject_duplicate(&temp_cert_name, item.typ)?;
                    temp_cert_name = Some(Name::decode(item.value)?);
                }
                other => return Err(OnboardError::UnexpectedTlv(other)),
            }
        }
        Ok(Self {
            temp_cert_name: require(temp_cert_name, tt::ISSUED_CERT_NAME)?,
        })
    }
}
