//! The transport surface this crate consumes.
//!
//! Endpoints never own a socket. Outbound packets are queued as [`Outgoing`]
//! entries and the host drains them toward its message layer; inbound packets
//! arrive through `process_interest` / `process_data` together with a
//! [`PacketMeta`] describing where they came from. A Data reply echoes the
//! PIT token of the Interest it answers so the requester can correlate it.

use crate::packet::{Data, Interest};

/// Opaque identifier of a peer endpoint, assigned by the host transport.
pub type EndpointId = u64;

/// Correlator attached to an outbound Interest and echoed on the matching
/// Data.
pub type PitToken = u64;

/// Where an inbound packet came from and which request it answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketMeta {
    pub endpoint_id: Option<EndpointId>,
    pub pit_token: Option<PitToken>,
}

/// An outbound packet.
#[derive(Debug, Clone)]
pub enum Packet {
    Interest(Interest),
    Data(Data),
}

/// One entry in an endpoint's outbound queue.
#[derive(Debug, Clone)]
pub struct Outgoing {
    pub packet: Packet,
    /// Restrict delivery to one peer endpoint; `None` lets the host decide.
    pub endpoint_id: Option<EndpointId>,
    /// For Interests: the freshly minted correlator. For Data: the echoed
    /// token of the Interest being answered.
    pub pit_token: Option<PitToken>,
}
