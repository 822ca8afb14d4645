pub mod command;
pub mod frame;

pub use command::{ControlCommand, CONTROL_TAG};
pub use frame::Frame;

/// Reasons an inbound frame is refused.
///
/// Integrity and envelope problems are ordinary results: the responder drops the
/// frame and keeps the session. Payload problems found after the checksum has
/// already matched mean the peer is sending garbage it believes is valid; those
/// report `is_corrupt() == true` and end the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtoError {
    #[error("checksum mismatch: expected {expected}, found {found:?}")]
    ChecksumMismatch { expected: String, found: String },

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("malformed frame: value {0:?} is not an integer")]
    InvalidValue(String),

    #[error("unknown tag {0:?}")]
    UnknownTag(String),

    #[error("expected {expected} values, found {found}")]
    WrongArity { expected: usize, found: usize },
}

impl ProtoError {
    pub fn is_corrupt(&self) -> bool {
        matches!(self, ProtoError::InvalidValue(_) | ProtoError::WrongArity { .. })
    }
}
