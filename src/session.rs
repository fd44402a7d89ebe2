//! The PAKE-keyed encrypted session and the onboarding name space.
//!
//! All onboarding Interests live under `<prefix>/<session-id>/<verb>` with a
//! parameters-digest component appended by the packet layer. The session id
//! is minted by the authenticator and bound by the device from the first
//! inbound Interest. Once the PAKE completes, the 32-byte shared key is
//! imported exactly once and payloads travel as AES-256-GCM
//! `{IV, AuthTag, EncryptedPayload}` triples.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use bytes::Bytes;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{OnboardError, Result};
use crate::name::{Component, Name};

/// Length of the session-id name component.
pub const SESSION_ID_LEN: usize = 8;
/// AEAD key length: the PAKE shared key is used as-is.
pub const KEY_LEN: usize = 32;
/// AES-GCM nonce length.
pub const IV_LEN: usize = 12;
/// AES-GCM tag length.
pub const TAG_LEN: usize = 16;

/// The well-known localhop onboarding prefix.
pub fn onboarding_prefix() -> Name {
    Name::from_uri("/localhop/onboarding")
}

pub fn pake_verb() -> Component {
    Component::generic(Bytes::from_static(b"pake"))
}

pub fn confirm_verb() -> Component {
    Component::generic(Bytes::from_static(b"confirm"))
}

pub fn credential_verb() -> Component {
    Component::generic(Bytes::from_static(b"credential"))
}

/// One AEAD-protected payload as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    pub iv: [u8; IV_LEN],
    pub tag: [u8; TAG_LEN],
    pub ciphertext: Bytes,
}

/// Per-session encryption state shared by both endpoints.
#[derive(Debug)]
pub struct EncryptSession {
    session_id: Option<Component>,
    key: Option<Zeroizing<[u8; KEY_LEN]>>,
    iv_prefix: [u8; 8],
    iv_counter: u32,
}

impl EncryptSession {
    pub fn new() -> Self {
        Self {
            session_id: None,
            key: None,
            iv_prefix: [0; 8],
            iv_counter: 0,
        }
    }

    /// Authenticator side: mint a fresh random session id and IV prefix.
    pub fn begin(&mut self) {
        let mut sid = [0u8; SESSION_ID_LEN];
        OsRng.fill_bytes(&mut sid);
        self.session_id = Some(Component::generic(Bytes::copy_from_slice(&sid)));
        OsRng.fill_bytes(&mut self.iv_prefix);
        self.iv_counter = 0;
        self.key = None;
    }

    /// Device side: bind the session id from an inbound onboarding Interest
    /// name. Returns false if the name is outside the onboarding prefix or
    /// carries a different session id than the one already bound.
    pub fn assign(&mut self, name: &Name) -> bool {
        let prefix = onboarding_prefix();
        if !prefix.is_prefix_of(name) {
            return false;
        }
        let Some(sid) = name.get(prefix.len()) else {
            return false;
        };
        if sid.value().len() != SESSION_ID_LEN {
            return false;
        }
        match &self.session_id {
            None => {
                self.session_id = Some(sid.clone());
                OsRng.fill_bytes(&mut self.iv_prefix);
                self.iv_counter = 0;
                true
            }
            Some(bound) => bound == sid,
        }
    }

    pub fn session_id(&self) -> Option<&Component> {
        self.session_id.as_ref()
    }

    /// Build `<prefix>/<session-id>/<verb>` for an outbound Interest.
    pub fn make_name(&self, verb: Component) -> Result<Name> {
        let sid = self.session_id.clone().ok_or(OnboardError::NoSessionId)?;
        Ok(onboarding_prefix().appending(sid).appending(verb))
    }

    /// Install the AEAD key. Exactly once per session.
    pub fn import_key(&mut self, key: &[u8]) -> Result<()> {
        if self.key.is_some() {
            return Err(OnboardError::KeyAlreadyImported);
        }
        let key: [u8; KEY_LEN] = key.try_into().map_err(|_| OnboardError::BadKeyLength {
            expected: KEY_LEN,
            actual: key.len(),
        })?;
        self.key = Some(Zeroizing::new(key));
        Ok(())
    }

    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        let key = self.key.as_ref().ok_or(OnboardError::NoSessionKey)?;
        Aes256Gcm::new_from_slice(key.as_ref()).map_err(|_| OnboardError::NoSessionKey)
    }

    /// Encrypt `plaintext` under a fresh IV. IVs are the 8-byte session
    /// prefix plus a strictly monotonic counter, never reused with this key.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<EncryptedPayload> {
        let cipher = self.cipher()?;
        let counter = self.iv_counter;
        self.iv_counter = counter.checked_add(1).ok_or(OnboardError::IvExhausted)?;

        let mut iv = [0u8; IV_LEN];
        iv[..8].copy_from_slice(&self.iv_prefix);
        iv[8..].copy_from_slice(&counter.to_be_bytes());

        let sealed = cipher
            .encrypt(
                Nonce::from_slice(&iv),
                Payload {
                    msg: plaintext,
                    aad: b"",
                },
            )
            .map_err(|_| OnboardError::AeadSeal)?;
        let split = sealed.len() - TAG_LEN;
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&sealed[split..]);
        Ok(EncryptedPayload {
            iv,
            tag,
            ciphertext: Bytes::copy_from_slice(&sealed[..split]),
        })
    }

    /// Verify the tag and recover the plaintext. Any failure leaves the
    /// session untouched; the caller treats the packet as never received.
    pub fn decrypt(&self, payload: &EncryptedPayload) -> Result<Vec<u8>> {
        let cipher = self.cipher()?;
        let mut sealed = Vec::with_capacity(payload.ciphertext.len() + TAG_LEN);
        sealed.extend_from_slice(&payload.ciphertext);
        sealed.extend_from_slice(&payload.tag);
        cipher
            .decrypt(
                Nonce::from_slice(&payload.iv),
                Payload {
                    msg: &sealed,
                    aad: b"",
                },
            )
            .map_err(|_| OnboardError::AeadOpen)
    }

    /// Discard the session id and zeroize the key.
    pub fn end(&mut self) {
        self.session_id = None;
        self.key = None;
        self.iv_prefix = [0; 8];
        self.iv_counter = 0;
    }
}

impl Default for EncryptSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed_pair() -> (EncryptSession, EncryptSession) {
        let mut a = EncryptSession::new();
        a.begin();
        let mut b = EncryptSession::new();
        assert!(b.assign(&a.make_name(pake_verb()).unwrap()));
        let key = [0x5Au8; KEY_LEN];
        a.import_key(&key).unwrap();
        b.import_key(&key).unwrap();
        (a, b)
    }

    #[test]
    fn name_shape() {
        let mut session = EncryptSession::new();
        session.begin();
        let name = session.make_name(confirm_verb()).unwrap();
        assert_eq!(name.len(), onboarding_prefix().len() + 2);
        assert!(onboarding_prefix().is_prefix_of(&name));
        assert_eq!(name.from_end(0).unwrap().value(), b"confirm");
    }

    #[test]
    fn assign_binds_once() {
        let mut authenticator = EncryptSession::new();
        authenticator.begin();
        let name = authenticator.make_name(pake_verb()).unwrap();

        let mut device = EncryptSession::new();
        assert!(device.assign(&name));
        assert!(device.assign(&name), "same id rebinds fine");

        let mut second = EncryptSession::new();
        second.begin();
        assert!(
            !device.assign(&second.make_name(pake_verb()).unwrap()),
            "different session id is rejected"
        );
        assert!(!device.assign(&Name::from_uri("/other/prefix/x/pake")));
    }

    #[test]
    fn import_key_is_once_only() {
        let mut session = EncryptSession::new();
        session.begin();
        assert!(matches!(
            session.import_key(&[0; 16]),
            Err(OnboardError::BadKeyLength { .. })
        ));
        session.import_key(&[0; KEY_LEN]).unwrap();
        assert!(matches!(
            session.import_key(&[0; KEY_LEN]),
            Err(OnboardError::KeyAlreadyImported)
        ));
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let (mut a, b) = keyed_pair();
        let sealed = a.encrypt(b"secret payload").unwrap();
        assert_eq!(b.decrypt(&sealed).unwrap(), b"secret payload");
    }

    #[test]
    fn tamper_is_rejected() {
        let (mut a, b) = keyed_pair();
        let mut sealed = a.encrypt(b"secret payload").unwrap();
        let mut ct = sealed.ciphertext.to_vec();
        ct[0] ^= 0x01;
        sealed.ciphertext = Bytes::from(ct);
        assert!(matches!(b.decrypt(&sealed), Err(OnboardError::AeadOpen)));

        let mut sealed = a.encrypt(b"secret payload").unwrap();
        sealed.tag[0] ^= 0x01;
        assert!(b.decrypt(&sealed).is_err());

        let mut sealed = a.encrypt(b"secret payload").unwrap();
        sealed.iv[11] ^= 0x01;
        assert!(b.decrypt(&sealed).is_err());
    }

    #[test]
    fn ivs_never_repeat() {
        let (mut a, _) = keyed_pair();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..64 {
            let sealed = a.encrypt(b"x").unwrap();
            assert!(seen.insert(sealed.iv), "IV reused within a session");
        }
    }

    #[test]
    fn end_drops_key_and_id() {
        let (mut a, _) = keyed_pair();
        a.end();
        assert!(!a.has_key());
        assert!(a.session_id().is_none());
        assert!(a.encrypt(b"x").is_err());
    }
}
