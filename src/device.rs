//! The device: responder of the onboarding exchange and fetcher of the
//! referenced packets.
//!
//! Serves the pake / confirm / credential Interests, and between confirm
//! and credential pulls the CA profile, the authenticator's certificate,
//! and finally the issued temp certificate by exact full name. The reply to
//! a confirm or credential Interest is deferred until the corresponding
//! fetch completes, so the triggering Interest's name and packet metadata
//! are kept until then.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use tracing::{debug, warn};

use crate::cert::{self, unix_now, CaProfile, ValidityPeriod};
use crate::error::{OnboardError, Result};
use crate::keys::SigningKeyPair;
use crate::name::{Component, Name};
use crate::packet::{Data, Interest};
use crate::pake::{Role, Spake2Driver};
use crate::payloads::{
    decode_encrypted, encode_encrypted_into, ConfirmRequest, ConfirmResponse, CredentialRequest,
    PakeRequest, PakeResponse,
};
use crate::pending::{PendingRequest, DEFAULT_TIMEOUT};
use crate::session::{
    confirm_verb, credential_verb, onboarding_prefix, pake_verb, EncryptSession,
};
use crate::transport::{Outgoing, Packet, PacketMeta};

/// Host configuration for a [`Device`].
#[derive(Debug, Clone)]
pub struct DeviceOptions {
    /// Deadline for each outstanding fetch.
    pub pending_timeout: Duration,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            pending_timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Idle,
    WaitPakeRequest,
    WaitConfirmRequest,
    FetchCaProfile,
    WaitCaProfile,
    FetchAuthenticatorCert,
    WaitAuthenticatorCert,
    WaitCredentialRequest,
    FetchTempCert,
    WaitTempCert,
    Success,
    Failure,
}

/// The responder state machine.
pub struct Device {
    state: DeviceState,
    session: EncryptSession,
    spake2: Option<Spake2Driver>,
    pending: PendingRequest,
    /// Once a session is underway, how long to wait for the peer's next
    /// Interest before giving up on the session.
    progress_timeout: Duration,
    progress_deadline: Option<Instant>,
    outbox: VecDeque<Outgoing>,
    ca_profile: Option<CaProfile>,
    ca_profile_name: Option<Name>,
    authenticator_cert_name: Option<Name>,
    device_name: Option<Name>,
    temp_cert_name: Option<Name>,
    temp_keypair: Option<SigningKeyPair>,
    issued: Option<Data>,
    last_interest_name: Option<Name>,
    last_meta: PacketMeta,
    peer_timestamp: Option<u64>,
}

impl Device {
    pub fn new(opts: DeviceOptions) -> Self {
        Self {
            state: DeviceState::Idle,
            session: EncryptSession::new(),
            spake2: None,
            pending: PendingRequest::new(opts.pending_timeout),
            progress_timeout: opts.pending_timeout,
            progress_deadline: None,
            outbox: VecDeque::new(),
            ca_profile: None,
            ca_profile_name: None,
            authenticator_cert_name: None,
            device_name: None,
            temp_cert_name: None,
            temp_keypair: None,
            issued: None,
            last_interest_name: None,
            last_meta: PacketMeta::default(),
            peer_timestamp: None,
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// The fetched temp certificate; the host decides about persistence.
    pub fn issued_cert(&self) -> Option<&Data> {
        self.issued.as_ref()
    }

    /// The private key matching the issued certificate's public key.
    pub fn temp_keypair(&self) -> Option<&SigningKeyPair> {
        self.temp_keypair.as_ref()
    }

    /// The authenticator's wall clock (unix microseconds) as carried in the
    /// confirm request; hosts without an RTC may seed their clock from it.
    pub fn peer_clock_micros(&self) -> Option<u64> {
        self.peer_timestamp
    }

    /// Hand the queued outbound packets to the host transport.
    pub fn drain_outgoing(&mut self) -> Vec<Outgoing> {
        self.outbox.drain(..).collect()
    }

    /// Reset everything: session, PAKE context, stored names, state.
    pub fn end(&mut self) {
        self.session.end();
        self.spake2 = None;
        self.pending.clear();
        self.progress_deadline = None;
        self.outbox.clear();
        self.ca_profile = None;
        self.ca_profile_name = None;
        self.authenticator_cert_name = None;
        self.device_name = None;
        self.temp_cert_name = None;
        self.temp_keypair = None;
        self.issued = None;
        self.last_interest_name = None;
        self.last_meta = PacketMeta::default();
        self.peer_timestamp = None;
        self.state = DeviceState::Idle;
    }

    /// Start (or restart) waiting for an onboarding session with `password`.
    pub fn begin(&mut self, password: &[u8]) -> Result<()> {
        self.end();
        self.spake2 = Some(Spake2Driver::new(Role::Responder, password)?);
        self.state = DeviceState::WaitPakeRequest;
        Ok(())
    }

    /// Periodic tick: issues the pending fetch, times out the Wait* states.
    pub fn poll(&mut self) {
        match self.state {
            DeviceState::FetchCaProfile => {
                let name = self.ca_profile_name.clone();
                self.fetch(name, DeviceState::WaitCaProfile);
            }
            DeviceState::FetchAuthenticatorCert => {
                let name = self.authenticator_cert_name.clone();
                self.fetch(name, DeviceState::WaitAuthenticatorCert);
            }
            DeviceState::FetchTempCert => {
                let name = self.temp_cert_name.clone();
                self.fetch(name, DeviceState::WaitTempCert);
            }
            DeviceState::WaitCaProfile
            | DeviceState::WaitAuthenticatorCert
            | DeviceState::WaitTempCert => {
                if self.pending.expired() {
                    warn!(state = ?self.state, "fetch deadline passed");
                    self.commit(Err(OnboardError::Timeout));
                }
            }
            DeviceState::WaitConfirmRequest | DeviceState::WaitCredentialRequest => {
                if matches!(self.progress_deadline, Some(d) if Instant::now() > d) {
                    warn!(state = ?self.state, "peer went silent mid-session");
                    self.commit(Err(OnboardError::Timeout));
                }
            }
            _ => {}
        }
    }

    /// Inbound Interest dispatch by state. Returns true iff the packet
    /// advanced (or failed) the machine.
    pub fn process_interest(&mut self, interest: &Interest, meta: &PacketMeta) -> bool {
        match self.state {
            DeviceState::WaitPakeRequest => self.handle_pake_request(interest, meta),
            DeviceState::WaitConfirmRequest => self.handle_confirm_request(interest, meta),
            DeviceState::WaitCredentialRequest => self.handle_credential_request(interest, meta),
            _ => false,
        }
    }

    /// Inbound Data dispatch by state.
    pub fn process_data(&mut self, data: &Data, meta: &PacketMeta) -> bool {
        if !self.pending.match_pit_token(meta) {
            return false;
        }
        match self.state {
            DeviceState::WaitCaProfile => self.handle_ca_profile(data, meta),
            DeviceState::WaitAuthenticatorCert => self.handle_authenticator_cert(data, meta),
            DeviceState::WaitTempCert => self.handle_temp_cert(data, meta),
            _ => false,
        }
    }

    fn commit(&mut self, next: Result<DeviceState>) {
        match next {
            Ok(state) => {
                debug!(?state, "transition");
                self.state = state;
                // Mid-session request-wait states are bounded by the same
                // deadline as the fetches; an idle device keeps listening.
                self.progress_deadline = match state {
                    DeviceState::WaitConfirmRequest | DeviceState::WaitCredentialRequest => {
                        Some(Instant::now() + self.progress_timeout)
                    }
                    _ => None,
                };
            }
            Err(e) => {
                warn!(error = %e, kind = ?e.kind(), "session failed");
                self.spake2 = None;
                self.state = DeviceState::Failure;
            }
        }
    }

    fn reply(&mut self, data: Data, meta: &PacketMeta) {
        self.outbox.push_back(Outgoing {
            packet: Packet::Data(data),
            endpoint_id: meta.endpoint_id,
            pit_token: meta.pit_token,
        });
    }

    /// Shape check shared by all three onboarding Interests: the name is
    /// `<prefix>/<session-id>/<verb>/<params-digest>`, the digest verifies,
    /// and the session id matches the bound one (binding it on first use).
    fn check_interest_verb(&mut self, interest: &Interest, verb: &Component) -> bool {
        let prefix = onboarding_prefix();
        let name = interest.name();
        name.len() == prefix.len() + 3
            && prefix.is_prefix_of(name)
            && name.from_end(1) == Some(verb)
            && interest.check_params_digest()
            && self.session.assign(name)
    }

    fn save_current_interest(&mut self, interest: &Interest, meta: &PacketMeta) {
        self.last_interest_name = Some(interest.name().clone());
        self.last_meta = *meta;
    }

    fn handle_pake_request(&mut self, interest: &Interest, meta: &PacketMeta) -> bool {
        if !self.check_interest_verb(interest, &pake_verb()) {
            return false;
        }
        let Ok(req) = PakeRequest::decode_params(interest.app_parameters().unwrap_or_default())
        else {
            debug!("dropping malformed pake request");
            return false;
        };
        let next = self.respond_pake(req, interest, meta);
        self.commit(next);
        true
    }

    fn respond_pake(
        &mut self,
        req: PakeRequest,
        interest: &Interest,
        meta: &PacketMeta,
    ) -> Result<DeviceState> {
        let driver = self
            .spake2
            .as_mut()
            .ok_or(OnboardError::BadState("answer a pake request"))?;
        let spake2_s = driver.generate_first_message()?;
        driver.process_first_message(&req.spake2_t)?;
        let spake2_fkcb = driver.generate_second_message()?;
        let res = PakeResponse {
            spake2_s,
            spake2_fkcb,
        };
        let data = Data::null_signed(interest.name().clone(), res.encode_content());
        self.reply(data, meta);
        Ok(DeviceState::WaitConfirmRequest)
    }

    fn handle_confirm_request(&mut self, interest: &Interest, meta: &PacketMeta) -> bool {
        if !self.check_interest_verb(interest, &confirm_verb()) {
            return false;
        }
        let Ok((fkca, sealed)) =
            ConfirmRequest::split_params(interest.app_parameters().unwrap_or_default())
        else {
            debug!("dropping malformed confirm request");
            return false;
        };

        // Confirmation and key import are committed steps: a peer that fails
        // key confirmation held a different password, and the session dies.
        let confirmed: Result<()> = (|| {
            let driver = self
                .spake2
                .as_mut()
                .ok_or(OnboardError::BadState("confirm the exchange"))?;
            driver.process_second_message(&fkca)?;
            let key = *driver.shared_key()?;
            self.session.import_key(&key)?;
            self.spake2 = None;
            Ok(())
        })();
        if let Err(e) = confirmed {
            self.commit(Err(e));
            return true;
        }

        // Envelope open and inner parse are soft: an altered ciphertext is
        // dropped as if never received.
        let Ok(plaintext) = self.session.decrypt(&sealed) else {
            debug!("dropping confirm request with bad auth tag");
            return false;
        };
        let Ok(req) = ConfirmRequest::from_parts(fkca, &plaintext) else {
            debug!("dropping confirm request with malformed payload");
            return false;
        };

        self.peer_timestamp = Some(req.timestamp);
        self.save_current_interest(interest, meta);
        self.ca_profile_name = Some(req.ca_profile_name);
        self.authenticator_cert_name = Some(req.authenticator_cert_name);
        self.device_name = Some(req.device_name);
        self.commit(Ok(DeviceState::FetchCaProfile));
        true
    }

    fn handle_credential_request(&mut self, interest: &Interest, meta: &PacketMeta) -> bool {
        if !self.check_interest_verb(interest, &credential_verb()) {
            return false;
        }
        let Ok(sealed) = decode_encrypted(interest.app_parameters().unwrap_or_default()) else {
            return false;
        };
        let Ok(plaintext) = self.session.decrypt(&sealed) else {
            debug!("dropping credential request with bad auth tag");
            return false;
        };
        let Ok(req) = CredentialRequest::decode_inner(&plaintext) else {
            return false;
        };

        self.save_current_interest(interest, meta);
        self.temp_cert_name = Some(req.temp_cert_name);
        self.commit(Ok(DeviceState::FetchTempCert));
        true
    }

    fn fetch(&mut self, name: Option<Name>, next: DeviceState) {
        let result = match name {
            Some(name) => {
                self.pending.send(
                    &mut self.outbox,
                    Interest::new(name),
                    self.last_meta.endpoint_id,
                );
                Ok(next)
            }
            None => Err(OnboardError::BadState("fetch without a target name")),
        };
        self.commit(result);
    }

    fn handle_ca_profile(&mut self, data: &Data, meta: &PacketMeta) -> bool {
        let Some(expected) = self.ca_profile_name.clone() else {
            return false;
        };
        if !self.pending.match_data(meta, data, &expected) {
            return false;
        }
        let Ok(profile) = CaProfile::from_data(data.clone()) else {
            debug!("dropping unparseable ca profile");
            return false;
        };
        self.pending.clear();
        let next = profile.validity.check(unix_now()).map(|()| {
            self.ca_profile = Some(profile);
            DeviceState::FetchAuthenticatorCert
        });
        self.commit(next);
        true
    }

    fn handle_authenticator_cert(&mut self, data: &Data, meta: &PacketMeta) -> bool {
        let Some(expected) = self.authenticator_cert_name.clone() else {
            return false;
        };
        if !self.pending.match_data(meta, data, &expected) {
            return false;
        }
        self.pending.clear();
        let next = self.accept_authenticator_cert(data);
        self.commit(next);
        true
    }

    /// Committed phase after the authenticator cert arrived: verify it under
    /// the CA key, mint the temp key pair, and answer the saved confirm
    /// Interest with the encrypted signing request.
    fn accept_authenticator_cert(&mut self, data: &Data) -> Result<DeviceState> {
        let ca = self
            .ca_profile
            .as_ref()
            .ok_or(OnboardError::BadState("verify without a ca profile"))?;
        data.verify(&ca.public_key)?;
        cert::validity(data)?.check(unix_now())?;

        let device_name = self
            .device_name
            .as_ref()
            .ok_or(OnboardError::BadState("derive a subject name"))?;
        let subject = cert::compute_temp_subject_name(data.name(), device_name)?;

        let temp_keypair = SigningKeyPair::generate();
        let t_req = cert::self_sign(&temp_keypair, &subject, ValidityPeriod::max());
        self.temp_keypair = Some(temp_keypair);

        let res = ConfirmResponse { t_req };
        let sealed = self.session.encrypt(&res.encode_inner())?;
        let mut content = BytesMut::new();
        encode_encrypted_into(&mut content, &sealed);
        let name = self
            .last_interest_name
            .clone()
            .ok_or(OnboardError::BadState("answer without a saved interest"))?;
        let data = Data::null_signed(name, content.freeze());
        let meta = self.last_meta;
        self.reply(data, &meta);
        Ok(DeviceState::WaitCredentialRequest)
    }

    fn handle_temp_cert(&mut self, data: &Data, meta: &PacketMeta) -> bool {
        let Some(expected) = self.temp_cert_name.clone() else {
            return false;
        };
        if !self.pending.match_data(meta, data, &expected) {
            return false;
        }
        self.pending.clear();
        self.issued = Some(data.clone());

        let next = (|| -> Result<DeviceState> {
            let name = self
                .last_interest_name
                .clone()
                .ok_or(OnboardError::BadState("acknowledge without a saved interest"))?;
            let ack = Data::null_signed(name, bytes::Bytes::new());
            let meta = self.last_meta;
            self.reply(ack, &meta);
            Ok(DeviceState::Success)
        })();
        self.commit(next);
        true
    }
}
