//! The authenticator: initiator of the onboarding exchange.
//!
//! Drives three Interests over the onboarding prefix — pake, confirm,
//! credential — and between confirm and credential serves the CA profile,
//! its own certificate, and the freshly issued temp certificate to the
//! device by full-name match.
//!
//! Every handler splits into a soft phase (decode, decrypt, policy; any
//! failure drops the packet and leaves state untouched) and a committed
//! phase returning `Result<AuthenticatorState>`; the dispatcher installs
//! the result with `unwrap_or(Failure)`, so a committed transition that
//! fails part-way can never leave a partial state behind.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use crate::cert::{self, unix_now_micros, ValidityPeriod};
use crate::error::{OnboardError, Result};
use crate::keys::SigningKeyPair;
use crate::name::Name;
use crate::packet::{Data, Interest};
use crate::pake::{Role, Spake2Driver};
use crate::payloads::{
    encode_encrypted_into, decode_encrypted, ConfirmRequest, ConfirmResponse, CredentialRequest,
    PakeRequest, PakeResponse,
};
use crate::pending::{PendingRequest, DEFAULT_TIMEOUT};
use crate::session::{confirm_verb, credential_verb, pake_verb, EncryptSession};
use crate::transport::{Outgoing, Packet, PacketMeta};

/// Host configuration for an [`Authenticator`].
pub struct AuthenticatorOptions {
    /// The CA profile Data handed to the device.
    pub ca_profile: Data,
    /// The authenticator's own certificate.
    pub cert: Data,
    /// The private key matching `cert`; signs the issued temp certificate.
    pub keypair: SigningKeyPair,
    /// Nonce bytes forwarded to the device inside the confirm request.
    pub nc: Bytes,
    /// The name the device will be onboarded under.
    pub device_name: Name,
    /// Deadline for each outstanding request.
    pub pending_timeout: Duration,
    /// Lifetime of the issued temp certificate.
    pub temp_cert_validity: Duration,
}

impl AuthenticatorOptions {
    pub fn new(
        ca_profile: Data,
        cert: Data,
        keypair: SigningKeyPair,
        nc: Bytes,
        device_name: Name,
    ) -> Self {
        Self {
            ca_profile,
            cert,
            keypair,
            nc,
            device_name,
            pending_timeout: DEFAULT_TIMEOUT,
            temp_cert_validity: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticatorState {
    Idle,
    SendPakeRequest,
    WaitPakeResponse,
    WaitConfirmResponse,
    SendCredentialRequest,
    WaitCredentialResponse,
    Success,
    Failure,
}

/// The initiator state machine.
pub struct Authenticator {
    opts: AuthenticatorOptions,
    state: AuthenticatorState,
    session: EncryptSession,
    spake2: Option<Spake2Driver>,
    pending: PendingRequest,
    issued: Option<Data>,
    outbox: VecDeque<Outgoing>,
}

impl Authenticator {
    pub fn new(opts: AuthenticatorOptions) -> Self {
        let pending = PendingRequest::new(opts.pending_timeout);
        Self {
            opts,
            state: AuthenticatorState::Idle,
            session: EncryptSession::new(),
            spake2: None,
            pending,
            issued: None,
            outbox: VecDeque::new(),
        }
    }

    pub fn state(&self) -> AuthenticatorState {
        self.state
    }

    pub fn options(&self) -> &AuthenticatorOptions {
        &self.opts
    }

    /// Mutable access for hosts that retarget configuration between
    /// sessions.
    pub fn options_mut(&mut self) -> &mut AuthenticatorOptions {
        &mut self.opts
    }

    /// The issued temp certificate, once built.
    pub fn issued_cert(&self) -> Option<&Data> {
        self.issued.as_ref()
    }

    /// Hand the queued outbound packets to the host transport.
    pub fn drain_outgoing(&mut self) -> Vec<Outgoing> {
        self.outbox.drain(..).collect()
    }

    /// Reset everything: session, PAKE context, stored packets, state.
    pub fn end(&mut self) {
        self.session.end();
        self.spake2 = None;
        self.pending.clear();
        self.issued = None;
        self.outbox.clear();
        self.state = AuthenticatorState::Idle;
    }

    /// Start (or restart) an onboarding session with `password`.
    pub fn begin(&mut self, password: &[u8]) -> Result<()> {
        self.end();
        self.session.begin();
        self.spake2 = Some(Spake2Driver::new(Role::Initiator, password)?);
        self.state = AuthenticatorState::SendPakeRequest;
        Ok(())
    }

    /// Periodic tick: sends from the Send* states, times out the Wait* ones.
    pub fn poll(&mut self) {
        match self.state {
            AuthenticatorState::SendPakeRequest => {
                let next = self.send_pake_request();
                self.commit(next);
            }
            AuthenticatorState::SendCredentialRequest => {
                let next = self.send_credential_request();
                self.commit(next);
            }
            AuthenticatorState::WaitPakeResponse
            | AuthenticatorState::WaitConfirmResponse
            | AuthenticatorState::WaitCredentialResponse => {
                if self.pending.expired() {
                    warn!(state = ?self.state, "request deadline passed");
                    self.commit(Err(OnboardError::Timeout));
                }
            }
            _ => {}
        }
    }

    /// Inbound Data dispatch. Returns true iff the packet advanced (or
    /// failed) the machine; dropped packets return false.
    pub fn process_data(&mut self, data: &Data, meta: &PacketMeta) -> bool {
        if !self.pending.match_pit_token(meta) {
            return false;
        }
        match self.state {
            AuthenticatorState::WaitPakeResponse => {
                let Ok(res) = PakeResponse::decode_content(data.content()) else {
                    debug!("dropping malformed pake response");
                    return false;
                };
                self.pending.clear();
                let next = self.handle_pake_response(res);
                self.commit(next);
                true
            }
            AuthenticatorState::WaitConfirmResponse => {
                let res = match self.accept_confirm_response(data) {
                    Ok(res) => res,
                    Err(e) => {
                        debug!(error = %e, "dropping confirm response");
                        return false;
                    }
                };
                self.pending.clear();
                let next = self.issue_temp_cert(&res);
                self.commit(next);
                true
            }
            AuthenticatorState::WaitCredentialResponse => {
                self.pending.clear();
                self.state = AuthenticatorState::Success;
                debug!("onboarding complete");
                true
            }
            _ => false,
        }
    }

    /// Serve one of the held packets by name match.
    pub fn process_interest(&mut self, interest: &Interest, meta: &PacketMeta) -> bool {
        if self.opts.ca_profile.satisfies(interest) {
            let data = self.opts.ca_profile.clone();
            self.reply(data, meta);
            return true;
        }
        if self.opts.cert.satisfies(interest) {
            let data = self.opts.cert.clone();
            self.reply(data, meta);
            return true;
        }
        if let Some(issued) = &self.issued {
            if issued.satisfies(interest) {
                let data = issued.clone();
                self.reply(data, meta);
                return true;
            }
        }
        false
    }

    fn reply(&mut self, data: Data, meta: &PacketMeta) {
        self.outbox.push_back(Outgoing {
            packet: Packet::Data(data),
            endpoint_id: meta.endpoint_id,
            pit_token: meta.pit_token,
        });
    }

    fn commit(&mut self, next: Result<AuthenticatorState>) {
        match next {
            Ok(state) => {
                debug!(?state, "transition");
                self.state = state;
            }
            Err(e) => {
                warn!(error = %e, kind = ?e.kind(), "session failed");
                self.spake2 = None;
                self.state = AuthenticatorState::Failure;
            }
        }
    }

    fn send_pake_request(&mut self) -> Result<AuthenticatorState> {
        let driver = self
            .spake2
            .as_mut()
            .ok_or(OnboardError::BadState("send a pake request"))?;
        let req = PakeRequest {
            spake2_t: driver.generate_first_message()?,
        };
        let name = self.session.make_name(pake_verb())?;
        let interest = Interest::parameterized(name, req.encode_params());
        self.pending.send(&mut self.outbox, interest, None);
        Ok(AuthenticatorState::WaitPakeResponse)
    }

    fn handle_pake_response(&mut self, res: PakeResponse) -> Result<AuthenticatorState> {
        let driver = self
            .spake2
            .as_mut()
            .ok_or(OnboardError::BadState("process a pake response"))?;
        driver.process_first_message(&res.spake2_s)?;
        let fkca = driver.generate_second_message()?;
        driver.process_second_message(&res.spake2_fkcb)?;
        let key = *driver.shared_key()?;
        self.session.import_key(&key)?;
        self.spake2 = None;

        let req = ConfirmRequest {
            spake2_fkca: fkca,
            nc: self.opts.nc.clone(),
            ca_profile_name: self.opts.ca_profile.full_name(),
            authenticator_cert_name: self.opts.cert.full_name(),
            device_name: self.opts.device_name.clone(),
            timestamp: unix_now_micros(),
        };
        let sealed = self.session.encrypt(&req.encode_inner())?;
        let name = self.session.make_name(confirm_verb())?;
        let interest = Interest::parameterized(name, req.encode_params(&sealed));
        self.pending.send(&mut self.outbox, interest, None);
        Ok(AuthenticatorState::WaitConfirmResponse)
    }

    /// Soft phase of the confirm response: decode, decrypt, and check that
    /// the request's subject is the one this session is onboarding. Any
    /// failure drops the packet; the device's reply will simply never come
    /// and this endpoint times out.
    fn accept_confirm_response(&self, data: &Data) -> Result<ConfirmResponse> {
        let sealed = decode_encrypted(data.content())?;
        let plaintext = self.session.decrypt(&sealed)?;
        let res = ConfirmResponse::decode_inner(&plaintext)?;
        let expected =
            cert::compute_temp_subject_name(self.opts.cert.name(), &self.opts.device_name)?;
        let actual = cert::to_subject_name(res.t_req.name())?;
        if expected != actual {
            return Err(OnboardError::SubjectMismatch);
        }
        Ok(res)
    }

    fn issue_temp_cert(&mut self, res: &ConfirmResponse) -> Result<AuthenticatorState> {
        let t_pub = cert::key_bits(&res.t_req)?;
        let subject =
            cert::compute_temp_subject_name(self.opts.cert.name(), &self.opts.device_name)?;
        let validity = ValidityPeriod::starting_now(self.opts.temp_cert_validity);
        let issued = cert::issue(&subject, &t_pub, validity, &self.opts.keypair, b"onboard");
        self.issued = Some(issued);
        Ok(AuthenticatorState::SendCredentialRequest)
    }

    fn send_credential_request(&mut self) -> Result<AuthenticatorState> {
        let issued = self
            .issued
            .as_ref()
            .ok_or(OnboardError::BadState("send a credential request"))?;
        let req = CredentialRequest {
            temp_cert_name: issued.full_name(),
        };
        let sealed = self.session.encrypt(&req.encode_inner())?;
        let mut params = BytesMut::new();
        encode_encrypted_into(&mut params, &sealed);
        let name = self.session.make_name(credential_verb())?;
        let interest = Interest::parameterized(name, params.freeze());
        self.pending.send(&mut self.outbox, interest, None);
        Ok(AuthenticatorState::WaitCredentialResponse)
    }
}
