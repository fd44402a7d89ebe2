//! Tracking of the single outstanding request per endpoint.
//!
//! The state machines never have more than one Interest in flight; this
//! tracker mints the PIT token, records the deadline, and answers the two
//! matching questions the machines ask: "is this Data for my request?" and
//! "is this Data the exact packet I asked for by name?".

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use rand::rngs::OsRng;
use rand::RngCore;

use crate::name::Name;
use crate::packet::{Data, Interest};
use crate::transport::{EndpointId, Outgoing, Packet, PacketMeta, PitToken};

/// Default deadline for an outstanding request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(4);

/// The one outstanding request of an endpoint.
#[derive(Debug)]
pub struct PendingRequest {
    timeout: Duration,
    token: Option<PitToken>,
    deadline: Option<Instant>,
    next_token: PitToken,
}

impl PendingRequest {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            token: None,
            deadline: None,
            next_token: OsRng.next_u64(),
        }
    }

    /// Queue `interest` with a fresh PIT token and start the deadline clock.
    ///
    /// Overwrites any previous outstanding request; the state machines only
    /// send while nothing is pending.
    pub fn send(
        &mut self,
        outbox: &mut VecDeque<Outgoing>,
        interest: Interest,
        endpoint_id: Option<EndpointId>,
    ) -> PitToken {
        let token = self.next_token;
        self.next_token = self.next_token.wrapping_add(1);
        self.token = Some(token);
        self.deadline = Some(Instant::now() + self.timeout);
        outbox.push_back(Outgoing {
            packet: Packet::Interest(interest),
            endpoint_id,
            pit_token: Some(token),
        });
        token
    }

    /// True iff the inbound packet carries the outstanding request's token.
    pub fn match_pit_token(&self, meta: &PacketMeta) -> bool {
        self.token.is_some() && meta.pit_token == self.token
    }

    /// [`match_pit_token`](Self::match_pit_token) plus a full-name match:
    /// the Data must be exactly the packet that was requested.
    pub fn match_data(&self, meta: &PacketMeta, data: &Data, expected: &Name) -> bool {
        self.match_pit_token(meta) && data.full_name() == *expected
    }

    /// True iff a request is outstanding and its deadline has passed.
    pub fn expired(&self) -> bool {
        matches!(self.deadline, Some(d) if Instant::now() > d)
    }

    /// Forget the outstanding request.
    pub fn clear(&mut self) {
        self.token = None;
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn meta(token: PitToken) -> PacketMeta {
        PacketMeta {
            endpoint_id: Some(1),
            pit_token: Some(token),
        }
    }

    #[test]
    fn token_matching() {
        let mut pending = PendingRequest::new(DEFAULT_TIMEOUT);
        let mut outbox = VecDeque::new();
        let token = pending.send(&mut outbox, Interest::new(Name::from_uri("/a")), None);
        assert_eq!(outbox.len(), 1);
        assert!(pending.match_pit_token(&meta(token)));
        assert!(!pending.match_pit_token(&meta(token.wrapping_add(1))));
        assert!(!pending.match_pit_token(&PacketMeta::default()));
    }

    #[test]
    fn full_name_matching() {
        let mut pending = PendingRequest::new(DEFAULT_TIMEOUT);
        let mut outbox = VecDeque::new();
        let data = Data::null_signed(Name::from_uri("/a"), Bytes::from_static(b"x"));
        let token = pending.send(&mut outbox, Interest::new(data.full_name()), None);
        assert!(pending.match_data(&meta(token), &data, &data.full_name()));

        let other = Data::null_signed(Name::from_uri("/a"), Bytes::from_static(b"y"));
        assert!(!pending.match_data(&meta(token), &other, &data.full_name()));
    }

    #[test]
    fn expiry() {
        let mut pending = PendingRequest::new(Duration::from_millis(1));
        assert!(!pending.expired(), "nothing outstanding");
        let mut outbox = VecDeque::new();
        pending.send(&mut outbox, Interest::new(Name::from_uri("/a")), None);
        std::thread::sleep(Duration::from_millis(5));
        assert!(pending.expired());
        pending.clear();
        assert!(!pending.expired());
    }
}
