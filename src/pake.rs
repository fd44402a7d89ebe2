//! SPAKE2 driver: both roles of the password-authenticated exchange.
//!
//! Wraps the two-message SPAKE2 primitive and layers the key-confirmation
//! round on top: the raw shared secret is HKDF-expanded into two
//! confirmation keys plus the session key, and each side proves possession
//! with an HMAC over the first-message transcript before the session key is
//! released. Lifecycle per context:
//!
//! ```text
//! Start -> FirstSent -> FirstProcessed -> SecondSent -> Done
//!    (any failed step or misuse parks the context in Err)
//! ```
//!
//! The context is dropped by its owner once the session key has been
//! imported; the confirmation keys zeroize with it.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use spake2::{Ed25519Group, Identity, Password, Spake2};
use zeroize::Zeroizing;

use crate::error::{OnboardError, Result};

/// Length of a SPAKE2 first message: the side marker plus the group element.
pub const SPAKE2_MSG_LEN: usize = 33;
/// Length of a key-confirmation MAC.
pub const CONFIRM_LEN: usize = 32;
/// Length of the derived session key.
pub const SHARED_KEY_LEN: usize = 32;

const ID_INITIATOR: &[u8] = b"onboard-authenticator";
const ID_RESPONDER: &[u8] = b"onboard-device";
const CONFIRM_INFO: &[u8] = b"onboard key confirm";

type HmacSha256 = Hmac<Sha256>;

/// Which side of the exchange this context drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Start,
    FirstSent,
    FirstProcessed,
    SecondSent,
    Done,
    Err,
}

struct DerivedKeys {
    kc_initiator: Zeroizing<[u8; CONFIRM_LEN]>,
    kc_responder: Zeroizing<[u8; CONFIRM_LEN]>,
    shared: Zeroizing<[u8; SHARED_KEY_LEN]>,
}

/// One SPAKE2 exchange, created per `begin(password)` and destroyed after
/// the session key is imported.
pub struct Spake2Driver {
    role: Role,
    step: Step,
    state: Option<Spake2<Ed25519Group>>,
    our_first: [u8; SPAKE2_MSG_LEN],
    peer_first: [u8; SPAKE2_MSG_LEN],
    keys: Option<DerivedKeys>,
}

impl Spake2Driver {
    pub fn new(role: Role, password: &[u8]) -> Result<Self> {
        let password = Password::new(password);
        let id_a = Identity::new(ID_INITIATOR);
        let id_b = Identity::new(ID_RESPONDER);
        let (state, msg) = match role {
            Role::Initiator => Spake2::<Ed25519Group>::start_a(&password, &id_a, &id_b),
            Role::Responder => Spake2::<Ed25519Group>::start_b(&password, &id_a, &id_b),
        };
        let our_first = msg
            .as_slice()
            .try_into()
            .map_err(|_| OnboardError::Pake(format!("unexpected message size {}", msg.len())))?;
        Ok(Self {
            role,
            step: Step::Start,
            state: Some(state),
            our_first,
            peer_first: [0; SPAKE2_MSG_LEN],
            keys: None,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    fn advance(&mut self, from: Step, to: Step, op: &'static str) -> Result<()> {
        if self.step != from {
            self.step = Step::Err;
            return Err(OnboardError::PakeOutOfOrder(op));
        }
        self.step = to;
        Ok(())
    }

    /// Our own first message (T for the initiator, S for the responder).
    pub fn generate_first_message(&mut self) -> Result<[u8; SPAKE2_MSG_LEN]> {
        self.advance(Step::Start, Step::FirstSent, "generate first")?;
        Ok(self.our_first)
    }

    /// Consume the peer's first message and derive the key schedule.
    pub fn process_first_message(&mut self, peer: &[u8]) -> Result<()> {
        self.advance(Step::FirstSent, Step::FirstProcessed, "process first")?;
        let peer: [u8; SPAKE2_MSG_LEN] = peer.try_into().map_err(|_| {
            self.step = Step::Err;
            OnboardError::BadFieldLength {
                typ: 0,
                expected: SPAKE2_MSG_LEN,
                actual: peer.len(),
            }
        })?;
        let state = self.state.take().ok_or(OnboardError::PakeOutOfOrder("process first"))?;
        let raw = state.finish(&peer).map_err(|e| {
            self.step = Step::Err;
            OnboardError::Pake(format!("{e:?}"))
        })?;

        let hk = Hkdf::<Sha256>::new(None, &raw);
        let mut okm = Zeroizing::new([0u8; CONFIRM_LEN * 2 + SHARED_KEY_LEN]);
        hk.expand(CONFIRM_INFO, okm.as_mut()).map_err(|_| {
            self.step = Step::Err;
            OnboardError::Pake("key schedule expand".into())
        })?;
        let mut kc_initiator = Zeroizing::new([0u8; CONFIRM_LEN]);
        let mut kc_responder = Zeroizing::new([0u8; CONFIRM_LEN]);
        let mut shared = Zeroizing::new([0u8; SHARED_KEY_LEN]);
        kc_initiator.copy_from_slice(&okm[..CONFIRM_LEN]);
        kc_responder.copy_from_slice(&okm[CONFIRM_LEN..CONFIRM_LEN * 2]);
        shared.copy_from_slice(&okm[CONFIRM_LEN * 2..]);

        self.peer_first = peer;
        self.keys = Some(DerivedKeys {
            kc_initiator,
            kc_responder,
            shared,
        });
        Ok(())
    }

    /// The first-message transcript: initiator's message then responder's.
    fn transcript(&self) -> ([u8; SPAKE2_MSG_LEN], [u8; SPAKE2_MSG_LEN]) {
        match self.role {
            Role::Initiator => (self.our_first, self.peer_first),
            Role::Responder => (self.peer_first, self.our_first),
        }
    }

    fn confirm_mac(&self, key: &[u8; CONFIRM_LEN]) -> Result<[u8; CONFIRM_LEN]> {
        let (t, s) = self.transcript();
        let mut mac = HmacSha256::new_from_slice(key)
            .map_err(|_| OnboardError::Pake("mac init".into()))?;
        mac.update(&t);
        mac.update(&s);
        Ok(mac.finalize().into_bytes().into())
    }

    /// Our confirmation MAC (Fkca for the initiator, Fkcb for the responder).
    pub fn generate_second_message(&mut self) -> Result<[u8; CONFIRM_LEN]> {
        self.advance(Step::FirstProcessed, Step::SecondSent, "generate second")?;
        let keys = self.keys.as_ref().ok_or(OnboardError::PakeOutOfOrder("generate second"))?;
        let key = match self.role {
            Role::Initiator => &keys.kc_initiator,
            Role::Responder => &keys.kc_responder,
        };
        self.confirm_mac(key)
    }

    /// Verify the peer's confirmation MAC; completes the exchange.
    pub fn process_second_message(&mut self, peer: &[u8]) -> Result<()> {
        self.advance(Step::SecondSent, Step::Done, "process second")?;
        let keys = self.keys.as_ref().ok_or(OnboardError::PakeOutOfOrder("process second"))?;
        let key = match self.role {
            Role::Initiator => &keys.kc_responder,
            Role::Responder => &keys.kc_initiator,
        };
        let mut mac = HmacSha256::new_from_slice(key.as_ref())
            .map_err(|_| OnboardError::Pake("mac init".into()))?;
        let (t, s) = self.transcript();
        mac.update(&t);
        mac.update(&s);
        mac.verify_slice(peer).map_err(|_| {
            self.step = Step::Err;
            OnboardError::ConfirmationMismatch
        })
    }

    /// The session key, available only after both confirmations verified.
    pub fn shared_key(&self) -> Result<&[u8; SHARED_KEY_LEN]> {
        if self.step != Step::Done {
            return Err(OnboardError::PakeOutOfOrder("shared key"));
        }
        Ok(&self
            .keys
            .as_ref()
            .ok_or(OnboardError::PakeOutOfOrder("shared key"))?
            .shared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_first_round(
        initiator: &mut Spake2Driver,
        responder: &mut Spake2Driver,
    ) -> ([u8; CONFIRM_LEN], [u8; CONFIRM_LEN]) {
        let t = initiator.generate_first_message().unwrap();
        let s = responder.generate_first_message().unwrap();
        responder.process_first_message(&t).unwrap();
        let fkcb = responder.generate_second_message().unwrap();
        initiator.process_first_message(&s).unwrap();
        let fkca = initiator.generate_second_message().unwrap();
        (fkca, fkcb)
    }

    #[test]
    fn matching_passwords_agree() {
        let mut a = Spake2Driver::new(Role::Initiator, b"hunter2").unwrap();
        let mut b = Spake2Driver::new(Role::Responder, b"hunter2").unwrap();
        let (fkca, fkcb) = run_first_round(&mut a, &mut b);
        a.process_second_message(&fkcb).unwrap();
        b.process_second_message(&fkca).unwrap();
        assert_eq!(a.shared_key().unwrap(), b.shared_key().unwrap());
    }

    #[test]
    fn mismatched_passwords_fail_confirmation() {
        let mut a = Spake2Driver::new(Role::Initiator, b"hunter2").unwrap();
        let mut b = Spake2Driver::new(Role::Responder, b"hunter3").unwrap();
        let (fkca, fkcb) = run_first_round(&mut a, &mut b);
        assert!(matches!(
            a.process_second_message(&fkcb),
            Err(OnboardError::ConfirmationMismatch)
        ));
        assert!(matches!(
            b.process_second_message(&fkca),
            Err(OnboardError::ConfirmationMismatch)
        ));
        assert!(a.shared_key().is_err());
        assert!(b.shared_key().is_err());
    }

    #[test]
    fn out_of_order_is_rejected() {
        let mut a = Spake2Driver::new(Role::Initiator, b"pw").unwrap();
        assert!(a.process_first_message(&[0; SPAKE2_MSG_LEN]).is_err());

        let mut b = Spake2Driver::new(Role::Responder, b"pw").unwrap();
        b.generate_first_message().unwrap();
        assert!(b.generate_second_message().is_err(), "first not processed");
    }

    #[test]
    fn wrong_length_first_message() {
        let mut a = Spake2Driver::new(Role::Initiator, b"pw").unwrap();
        a.generate_first_message().unwrap();
        assert!(matches!(
            a.process_first_message(&[0; 16]),
            Err(OnboardError::BadFieldLength { .. })
        ));
    }

    #[test]
    fn shared_key_gated_on_done() {
        let mut a = Spake2Driver::new(Role::Initiator, b"pw").unwrap();
        let mut b = Spake2Driver::new(Role::Responder, b"pw").unwrap();
        let (_, fkcb) = run_first_round(&mut a, &mut b);
        assert!(a.shared_key().is_err());
        a.process_second_message(&fkcb).unwrap();
        assert!(a.shared_key().is_ok());
    }
}
