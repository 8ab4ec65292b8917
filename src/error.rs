use lazy_static::lazy_static;
use thiserror::Error;

/// Errors surfaced across the STUN, TURN, ICE and pseudo-TCP layers.
///
/// Variant names track the taxonomy enumerated in the design: codec
/// validation failures, transaction-level failures, and pseudo-TCP socket
/// errors. Fixed, parameterless instances are exposed as `lazy_static`
/// constants below so call sites can compare by reference the way the
/// original C `gint` error codes were compared by value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("not a stun message")]
    ErrNotStun,
    #[error("stun message is incomplete")]
    ErrIncomplete,
    #[error("stun message is malformed: {0}")]
    ErrMalformed(String),
    #[error("stun bad request")]
    ErrBadRequest,
    #[error("stun unauthorized")]
    ErrUnauthorized,
    #[error("stun unauthorized and malformed")]
    ErrUnauthorizedBadRequest,
    #[error("stun response does not match any outstanding transaction")]
    ErrUnmatchedResponse,
    #[error("unknown comprehension-required attribute: {0}")]
    ErrUnknownAttribute(u16),
    #[error("unknown comprehension-optional attribute ignored: {0}")]
    ErrUnknownAttributeIgnored(u16),

    #[error("stun transaction timed out")]
    ErrTransactionTimeout,
    #[error("stun server redirected via alternate-server")]
    ErrAlternateServer,
    #[error("ice role conflict")]
    ErrRoleConflict,
    #[error("stun peer error {0}: {1}")]
    ErrPeerError(u16, String),

    #[error("no free stun transaction slot")]
    ErrTransactionSlotsFull,
    #[error("buffer too small to build message")]
    ErrBufferTooSmall,
    #[error("fingerprint mismatch")]
    ErrFingerprintMismatch,
    #[error("message-integrity mismatch")]
    ErrIntegrityMismatch,

    #[error("candidate or agent already closed")]
    ErrClosed,
    #[error("no candidate pairs remain on the checklist")]
    ErrNoCandidatePairs,
    #[error("stream id {0} is unknown")]
    ErrUnknownStream(u16),
    #[error("component id {0} is unknown")]
    ErrUnknownComponent(u16),
    #[error("remote credentials have not been set")]
    ErrRemoteCredentialsNotSet,
    #[error("no candidate available to send on")]
    ErrNoCandidateAvailable,
    #[error("address family of local and remote candidate differ")]
    ErrAddrFamilyMismatch,

    #[error("turn allocation request failed: {0}")]
    ErrTurnAllocationFailed(String),

    #[error("operation requires an established pseudo-tcp connection")]
    ErrNotConnected,
    #[error("operation would block")]
    ErrWouldBlock,
    #[error("write on a closed pseudo-tcp socket")]
    ErrPipe,
    #[error("pseudo-tcp connection reset by peer")]
    ErrConnReset,
    #[error("pseudo-tcp connection aborted")]
    ErrConnAborted,
    #[error("pseudo-tcp operation timed out")]
    ErrTimedOut,
    #[error("outbound packet exceeds path mtu")]
    ErrPacketTooLarge,

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn new(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Other(e.to_string())
    }
}

impl From<util::Error> for Error {
    fn from(e: util::Error) -> Self {
        Error::Other(e.to_string())
    }
}

lazy_static! {
    pub static ref ERR_NOT_STUN: Error = Error::ErrNotStun;
    pub static ref ERR_INCOMPLETE: Error = Error::ErrIncomplete;
    pub static ref ERR_BAD_REQUEST: Error = Error::ErrBadRequest;
    pub static ref ERR_UNAUTHORIZED: Error = Error::ErrUnauthorized;
    pub static ref ERR_UNAUTHORIZED_BAD_REQUEST: Error = Error::ErrUnauthorizedBadRequest;
    pub static ref ERR_UNMATCHED_RESPONSE: Error = Error::ErrUnmatchedResponse;
    pub static ref ERR_TRANSACTION_TIMEOUT: Error = Error::ErrTransactionTimeout;
    pub static ref ERR_ROLE_CONFLICT: Error = Error::ErrRoleConflict;
    pub static ref ERR_TRANSACTION_SLOTS_FULL: Error = Error::ErrTransactionSlotsFull;
    pub static ref ERR_BUFFER_TOO_SMALL: Error = Error::ErrBufferTooSmall;
    pub static ref ERR_CLOSED: Error = Error::ErrClosed;
    pub static ref ERR_NO_CANDIDATE_PAIRS: Error = Error::ErrNoCandidatePairs;
    pub static ref ERR_REMOTE_CREDENTIALS_NOT_SET: Error = Error::ErrRemoteCredentialsNotSet;
    pub static ref ERR_NO_CANDIDATE_AVAILABLE: Error = Error::ErrNoCandidateAvailable;
    pub static ref ERR_ADDR_FAMILY_MISMATCH: Error = Error::ErrAddrFamilyMismatch;
    pub static ref ERR_NOT_CONNECTED: Error = Error::ErrNotConnected;
    pub static ref ERR_WOULD_BLOCK: Error = Error::ErrWouldBlock;
    pub static ref ERR_PIPE: Error = Error::ErrPipe;
    pub static ref ERR_CONN_RESET: Error = Error::ErrConnReset;
    pub static ref ERR_CONN_ABORTED: Error = Error::ErrConnAborted;
    pub static ref ERR_TIMED_OUT: Error = Error::ErrTimedOut;
    pub static ref ERR_PACKET_TOO_LARGE: Error = Error::ErrPacketTooLarge;
}

pub type Result<T> = std::result::Result<T, Error>;
