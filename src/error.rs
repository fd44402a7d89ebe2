// Crate-wide error types.

use thiserror::Error;

/// Coarse classification of an [`OnboardError`].
///
/// Both state machines collapse every error onto one of these five kinds at
/// the dispatch boundary; the kind decides whether a packet is silently
/// dropped or the whole session fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A TLV decode failed, a fixed-width field had the wrong size, or a
    /// required field was missing.
    MalformedPacket,
    /// A PAKE step, AEAD open, or signature verification failed.
    CryptoFailure,
    /// A certificate or name failed a policy check.
    PolicyViolation,
    /// No response to an outstanding request before its deadline.
    Timeout,
    /// Encoder overflow or an invariant violation inside this crate.
    InternalFailure,
}

/// Top-level error type for the onboarding protocol core.
#[derive(Debug, Error)]
pub enum OnboardError {
    // ── Malformed packets ───────────────────────────────────────────────
    #[error("TLV element truncated")]
    TlvTruncated,

    #[error("TLV length {0} exceeds remaining input")]
    TlvLengthOverrun(u64),

    #[error("unexpected TLV type 0x{0:02x}")]
    UnexpectedTlv(u32),

    #[error("missing mandatory field 0x{0:02x}")]
    MissingField(u32),

    #[error("field 0x{typ:02x} has length {actual}, expected {expected}")]
    BadFieldLength {
        typ: u32,
        expected: usize,
        actual: usize,
    },

    #[error("malformed non-negative integer")]
    BadNni,

    #[error("packet is not a well-formed {0}")]
    BadPacket(&'static str),

    // ── Crypto failures ─────────────────────────────────────────────────
    #[error("PAKE step out of order in step {0}")]
    PakeOutOfOrder(&'static str),

    #[error("PAKE failed: {0}")]
    Pake(String),

    #[error("key confirmation mismatch")]
    ConfirmationMismatch,

    #[error("AEAD seal failed")]
    AeadSeal,

    #[error("AEAD open failed")]
    AeadOpen,

    #[error("signature verification failed")]
    SignatureInvalid,

    // ── Policy violations ───────────────────────────────────────────────
    #[error("certificate expired: not_after={not_after}, now={now}")]
    CertExpired { not_after: u64, now: u64 },

    #[error("certificate not yet valid: not_before={not_before}, now={now}")]
    CertNotYetValid { not_before: u64, now: u64 },

    #[error("name does not end with an implicit digest component")]
    MissingDigestSuffix,

    #[error("certificate name lacks the KEY suffix")]
    NotACertName,

    #[error("subject name mismatch")]
    SubjectMismatch,

    // ── Timeout ─────────────────────────────────────────────────────────
    #[error("request timed out")]
    Timeout,

    // ── Internal failures ───────────────────────────────────────────────
    #[error("session key already imported")]
    KeyAlreadyImported,

    #[error("session key must be {expected} bytes, got {actual}")]
    BadKeyLength { expected: usize, actual: usize },

    #[error("no session key imported")]
    NoSessionKey,

    #[error("IV counter exhausted")]
    IvExhausted,

    #[error("no session identifier bound")]
    NoSessionId,

    #[error("endpoint cannot {0} in its current state")]
    BadState(&'static str),
}

impl OnboardError {
    /// Map this error onto the five-way taxonomy.
    pub fn kind(&self) -> ErrorKind {
        use OnboardError::*;
        match self {
            TlvTruncated | TlvLengthOverrun(_) | UnexpectedTlv(_) | MissingField(_)
            | BadFieldLength { .. } | BadNni | BadPacket(_) => ErrorKind::MalformedPacket,
            PakeOutOfOrder(_) | Pake(_) | ConfirmationMismatch | AeadSeal | AeadOpen
            | SignatureInvalid => ErrorKind::CryptoFailure,
            CertExpired { .. } | CertNotYetValid { .. } | MissingDigestSuffix | NotACertName
            | SubjectMismatch => ErrorKind::PolicyViolation,
            Timeout => ErrorKind::Timeout,
            KeyAlreadyImported | BadKeyLength { .. } | NoSessionKey | IvExhausted
            | NoSessionId | BadState(_) => ErrorKind::InternalFailure,
        }
    }
}

/// Crate-level result alias.
pub type Result<T> = std::result::Result<T, OnboardError>;
