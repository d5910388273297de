//! Shared error type across telelink crates.

use std::time::Duration;

use thiserror::Error;

use crate::outcome::RejectCause;

/// Stable error codes (safe to branch on, log, or export as metric labels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller-supplied message could not be encoded.
    Encoding,
    /// Batch send with no messages.
    EmptyBatch,
    /// Settlement did not arrive in time.
    SendTimeout,
    /// Link is closing, closed, or aborted.
    LinkClosed,
    /// Peer settled the delivery with something other than Accepted.
    DeliveryRejected,
    /// Graceful close did not confirm in time.
    CloseTimeout,
    /// Delivery tag is already in flight on this link.
    DuplicateTag,
    /// Frame bytes do not decode.
    Malformed,
    /// Frame version is not understood.
    UnsupportedVersion,
    /// Settlement descriptor is not one of the four terminal outcomes.
    UnknownSettlement,
    /// The transport failed the operation itself.
    Transport,
    /// Invalid configuration.
    Config,
}

impl ErrorKind {
    /// String representation used in logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Encoding => "ENCODING",
            ErrorKind::EmptyBatch => "EMPTY_BATCH",
            ErrorKind::SendTimeout => "SEND_TIMEOUT",
            ErrorKind::LinkClosed => "LINK_CLOSED",
            ErrorKind::DeliveryRejected => "DELIVERY_REJECTED",
            ErrorKind::CloseTimeout => "CLOSE_TIMEOUT",
            ErrorKind::DuplicateTag => "DUPLICATE_TAG",
            ErrorKind::Malformed => "MALFORMED",
            ErrorKind::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorKind::UnknownSettlement => "UNKNOWN_SETTLEMENT",
            ErrorKind::Transport => "TRANSPORT",
            ErrorKind::Config => "CONFIG",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, LinkError>;

/// Unified error type used by core and sender.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("encoding failed: {0}")]
    Encoding(String),
    #[error("batch must contain at least one message")]
    EmptyBatch,
    #[error("no settlement within {timeout:?}")]
    SendTimeout { timeout: Duration },
    #[error("link closed")]
    LinkClosed,
    #[error("delivery rejected: {0}")]
    DeliveryRejected(RejectCause),
    #[error("close not confirmed within {timeout:?}")]
    CloseTimeout { timeout: Duration },
    #[error("delivery tag {0} already in flight")]
    DuplicateTag(String),
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("unsupported frame version {0}")]
    UnsupportedVersion(u8),
    #[error("unknown settlement descriptor {0:#x}")]
    UnknownSettlement(u64),
    #[error("transport: {0}")]
    Transport(String),
    #[error("config: {0}")]
    Config(String),
}

impl LinkError {
    /// Map to a stable code.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LinkError::Encoding(_) => ErrorKind::Encoding,
            LinkError::EmptyBatch => ErrorKind::EmptyBatch,
            LinkError::SendTimeout { .. } => ErrorKind::SendTimeout,
            LinkError::LinkClosed => ErrorKind::LinkClosed,
            LinkError::DeliveryRejected(_) => ErrorKind::DeliveryRejected,
            LinkError::CloseTimeout { .. } => ErrorKind::CloseTimeout,
            LinkError::DuplicateTag(_) => ErrorKind::DuplicateTag,
            LinkError::Malformed(_) => ErrorKind::Malformed,
            LinkError::UnsupportedVersion(_) => ErrorKind::UnsupportedVersion,
            LinkError::UnknownSettlement(_) => ErrorKind::UnknownSettlement,
            LinkError::Transport(_) => ErrorKind::Transport,
            LinkError::Config(_) => ErrorKind::Config,
        }
    }

    /// True when resending the same message (with a fresh tag) on the same
    /// link may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            LinkError::SendTimeout { .. } | LinkError::Transport(_) => true,
            LinkError::DeliveryRejected(cause) => cause.is_transient(),
            _ => false,
        }
    }

    /// True when the link is unusable and the owner must attach a new one
    /// before retrying.
    pub fn requires_reattach(&self) -> bool {
        matches!(self, LinkError::LinkClosed | LinkError::CloseTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(LinkError::EmptyBatch.kind().as_str(), "EMPTY_BATCH");
        assert_eq!(LinkError::LinkClosed.kind().as_str(), "LINK_CLOSED");
        let e = LinkError::SendTimeout { timeout: Duration::from_millis(5) };
        assert_eq!(e.kind(), ErrorKind::SendTimeout);
    }

    #[test]
    fn retry_classification() {
        assert!(LinkError::SendTimeout { timeout: Duration::from_secs(1) }.is_transient());
        assert!(!LinkError::Encoding("x".into()).is_transient());
        assert!(LinkError::LinkClosed.requires_reattach());
        assert!(!LinkError::LinkClosed.is_transient());

        let quota = RejectCause::new(Some("amqp:resource-limit-exceeded".into()), None);
        assert!(!LinkError::DeliveryRejected(quota).is_transient());
        let busy = RejectCause::new(Some("com.microsoft:server-busy".into()), None);
        assert!(LinkError::DeliveryRejected(busy).is_transient());
    }
}
