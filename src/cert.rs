//! Certificates expressed as signed Data packets.
//!
//! A certificate's name is `<subject>/KEY/<key-id>/<issuer>/<version>`; its
//! content carries the subject's Ed25519 public key and a validity period:
//!
//! ```text
//! Content = KeyBits 0x4B { pk:32B }
//!           ValidityPeriod 0xFD { NotBefore 0xFE{NNI} NotAfter 0xFF{NNI} }
//! ```
//!
//! The subject name is everything before the last `KEY` component. The
//! deterministic temp-subject derivation lives here because both endpoints
//! must compute it byte-identically.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{Bytes, BytesMut};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{OnboardError, Result};
use crate::keys::SigningKeyPair;
use crate::name::{Component, Name, TT_GENERIC};
use crate::packet::Data;
use crate::tlv;

const TT_KEY_BITS: u32 = 0x4B;
const TT_VALIDITY: u32 = 0xFD;
const TT_NOT_BEFORE: u32 = 0xFE;
const TT_NOT_AFTER: u32 = 0xFF;

/// The `KEY` marker component of a certificate name.
const KEY_MARKER: &[u8] = b"KEY";
/// Number of name components after the subject: KEY, key-id, issuer, version.
const SUFFIX_LEN: usize = 4;

/// Unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Unix time in microseconds.
pub fn unix_now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

/// A certificate validity window, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidityPeriod {
    pub not_before: u64,
    pub not_after: u64,
}

impl ValidityPeriod {
    pub fn new(not_before: u64, not_after: u64) -> Self {
        Self {
            not_before,
            not_after,
        }
    }

    /// A window starting at `now` and lasting `duration`.
    pub fn starting_now(duration: Duration) -> Self {
        let now = unix_now();
        Self::new(now, now.saturating_add(duration.as_secs()))
    }

    /// The widest representable window (used by self-signed requests).
    pub fn max() -> Self {
        Self::new(0, u64::MAX)
    }

    pub fn includes(&self, now: u64) -> bool {
        self.not_before <= now && now <= self.not_after
    }

    /// Err with the precise policy violation if `now` is outside the window.
    pub fn check(&self, now: u64) -> Result<()> {
        if now < self.not_before {
            return Err(OnboardError::CertNotYetValid {
                not_before: self.not_before,
                now,
            });
        }
        if now > self.not_after {
            return Err(OnboardError::CertExpired {
                not_after: self.not_after,
                now,
            });
        }
        Ok(())
    }
}

/// Issue a certificate for `public_key` under `subject`, signed by `signer`.
pub fn issue(
    subject: &Name,
    public_key: &[u8; 32],
    validity: ValidityPeriod,
    signer: &SigningKeyPair,
    issuer_tag: &[u8],
) -> Data {
    let mut key_id = [0u8; 8];
    OsRng.fill_bytes(&mut key_id);

    let mut name = subject.clone();
    name.push(Component::generic(Bytes::from_static(KEY_MARKER)));
    name.push(Component::generic(Bytes::copy_from_slice(&key_id)));
    name.push(Component::generic(Bytes::copy_from_slice(issuer_tag)));
    name.push(Component::generic(Bytes::from(tlv::nni_bytes(
        validity.not_before,
    ))));

    let mut content = BytesMut::new();
    tlv::put_tlv(&mut content, TT_KEY_BITS, public_key);
    let mut window = BytesMut::new();
    tlv::put_nni(&mut window, TT_NOT_BEFORE, validity.not_before);
    tlv::put_nni(&mut window, TT_NOT_AFTER, validity.not_after);
    tlv::put_tlv(&mut content, TT_VALIDITY, &window);

    Data::signed(name, content.freeze(), signer)
}

/// Issue a certificate for the signer's own key: issuer tag `self`.
pub fn self_sign(keypair: &SigningKeyPair, subject: &Name, validity: ValidityPeriod) -> Data {
    issue(subject, &keypair.public_key_bytes(), validity, keypair, b"self")
}

/// Extract the subject public key from a certificate's content.
pub fn key_bits(cert: &Data) -> Result<[u8; 32]> {
    let (bits, _) = tlv::get_tlv(cert.content())?;
    if bits.typ != TT_KEY_BITS {
        return Err(OnboardError::MissingField(TT_KEY_BITS));
    }
    bits.value
        .try_into()
        .map_err(|_| OnboardError::BadFieldLength {
            typ: TT_KEY_BITS,
            expected: 32,
            actual: bits.value.len(),
        })
}

/// Extract the validity window from a certificate's content.
pub fn validity(cert: &Data) -> Result<ValidityPeriod> {
    let (_, rest) = tlv::get_tlv(cert.content())?;
    let (window, _) = tlv::get_tlv(rest)?;
    if window.typ != TT_VALIDITY {
        return Err(OnboardError::MissingField(TT_VALIDITY));
    }
    let (nb, rest) = tlv::get_tlv(window.value)?;
    let (na, rest) = tlv::get_tlv(rest)?;
    if nb.typ != TT_NOT_BEFORE || na.typ != TT_NOT_AFTER || !rest.is_empty() {
        return Err(OnboardError::MissingField(TT_VALIDITY));
    }
    Ok(ValidityPeriod::new(
        tlv::get_nni(nb.value)?,
        tlv::get_nni(na.value)?,
    ))
}

/// Strip the `KEY/<key-id>/<issuer>/<version>` suffix from a certificate
/// name, yielding the subject name.
pub fn to_subject_name(cert_name: &Name) -> Result<Name> {
    let marker = cert_name
        .components()
        .iter()
        .rposition(|c| c.typ() == TT_GENERIC && c.value() == KEY_MARKER)
        .ok_or(OnboardError::NotACertName)?;
    if cert_name.len() != marker + SUFFIX_LEN {
        return Err(OnboardError::NotACertName);
    }
    Ok(cert_name.prefix(marker))
}

/// The deterministic subject for a device's temp certificate: the subject of
/// the authenticator's certificate followed by every component of the device
/// name. Both endpoints must produce byte-identical output.
pub fn compute_temp_subject_name(authenticator_cert_name: &Name, device_name: &Name) -> Result<Name> {
    Ok(to_subject_name(authenticator_cert_name)?.joining(device_name))
}

/// The CA profile: the CA's self-signed certificate with the public key and
/// validity pre-extracted.
#[derive(Debug, Clone)]
pub struct CaProfile {
    pub data: Data,
    pub public_key: [u8; 32],
    pub validity: ValidityPeriod,
}

impl CaProfile {
    pub fn from_data(data: Data) -> Result<Self> {
        let public_key = key_bits(&data)?;
        let validity = validity(&data)?;
        Ok(Self {
            data,
            public_key,
            validity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cert_fixture() -> (SigningKeyPair, Data) {
        let kp = SigningKeyPair::generate();
        let cert = self_sign(&kp, &Name::from_uri("/org/ca"), ValidityPeriod::new(1000, 2000));
        (kp, cert)
    }

    #[test]
    fn issue_roundtrip() {
        let (kp, cert) = cert_fixture();
        assert_eq!(key_bits(&cert).unwrap(), kp.public_key_bytes());
        assert_eq!(validity(&cert).unwrap(), ValidityPeriod::new(1000, 2000));
        cert.verify(&kp.public_key_bytes()).unwrap();
    }

    #[test]
    fn subject_name_strips_suffix() {
        let (_, cert) = cert_fixture();
        assert_eq!(cert.name().len(), 2 + 4);
        assert_eq!(to_subject_name(cert.name()).unwrap(), Name::from_uri("/org/ca"));
    }

    #[test]
    fn plain_name_is_not_a_cert_name() {
        assert!(to_subject_name(&Name::from_uri("/a/b")).is_err());
    }

    #[test]
    fn temp_subject_is_deterministic() {
        let (_, cert) = cert_fixture();
        let device = Name::from_uri("/example/device/alice");
        let a = compute_temp_subject_name(cert.name(), &device).unwrap();
        let b = compute_temp_subject_name(cert.name(), &device).unwrap();
        assert_eq!(a.encode(), b.encode());
        assert_eq!(a, Name::from_uri("/org/ca/example/device/alice"));
    }

    #[test]
    fn validity_check_errors() {
        let v = ValidityPeriod::new(100, 200);
        assert!(v.includes(150));
        assert!(matches!(
            v.check(50),
            Err(OnboardError::CertNotYetValid { .. })
        ));
        assert!(matches!(v.check(250), Err(OnboardError::CertExpired { .. })));
        assert!(ValidityPeriod::max().includes(unix_now()));
    }

    #[test]
    fn survives_packet_roundtrip() {
        let (kp, cert) = cert_fixture();
        let decoded = Data::decode(&cert.encode()).unwrap();
        let profile = CaProfile::from_data(decoded).unwrap();
        assert_eq!(profile.public_key, kp.public_key_bytes());
    }
}
