use thiserror::Error;

/// Errors produced by the ARDP engine.
///
/// `BackPressure` is the one variant a caller is expected to retry on; every
/// other variant is terminal for the call that produced it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArdpError {
    #[error("send window exhausted")]
    BackPressure,

    #[error("no connection with id {0}")]
    UnknownConnection(u32),

    #[error("message requires more than 3 fragments for the negotiated segment size")]
    MessageTooLarge,

    #[error("connection is not in a state that permits this operation")]
    InvalidState,

    #[error("malformed ARDP header")]
    MalformedHeader,

    #[error("fragment count {0} outside the valid range [1, 3]")]
    InvalidFragmentCount(u16),

    #[error("retransmission limit exceeded")]
    RetriesExhausted,

    #[error("connection reset by peer")]
    Reset,
}

pub type Result<T> = std::result::Result<T, ArdpError>;
