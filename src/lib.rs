// ndn-onboard — PAKE-bootstrapped device onboarding over a named-data
// message layer.
//
// An unprovisioned device and an in-person authenticator share a low-entropy
// password. SPAKE2 bootstraps a symmetric session key, after which the
// authenticator conveys CA references and issues a short-lived certificate
// for a key pair the device generates on the spot:
//
//   Authenticator                        Device
//     |--- pake Interest ----------->|   SPAKE2 first messages
//     |<-- pake Data ----------------|
//     |--- confirm Interest -------->|   key confirmation + session params
//     |       |<== fetches: CA profile, authenticator cert ==>|
//     |<-- confirm Data (tReq) ------|
//     |--- credential Interest ----->|   issued cert name
//     |       |<== fetch: temp certificate ==>|
//     |<-- credential Data (ack) ----|
//
// Crate root: module declarations and public re-exports.

pub mod authenticator;
pub mod cert;
pub mod device;
pub mod error;
pub mod keys;
pub mod name;
pub mod packet;
pub mod pake;
pub mod payloads;
pub mod pending;
pub mod session;
pub mod tlv;
pub mod transport;

// Re-export the host-facing types at crate root for convenience.
pub use authenticator::{Authenticator, AuthenticatorOptions, AuthenticatorState};
pub use device::{Device, DeviceOptions, DeviceState};
pub use error::{ErrorKind, OnboardError, Result};
pub use keys::SigningKeyPair;
pub use name::Name;
pub use packet::{Data, Interest};
pub use transport::{Outgoing, Packet, PacketMeta};
