//! Transport capability consumed by the sending link.
//!
//! The transport owns framing, flow control, and the connection; the link
//! only hands it envelopes with delivery tags and awaits settlements.

pub mod loopback;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use telelink_core::error::Result;
use telelink_core::{DeliveryTag, RawSettlement, WireEnvelope};

pub use loopback::LoopbackTransport;

/// Why a link closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Graceful close requested by the owner.
    LocalClose,
    /// Immediate abort requested by the owner.
    Aborted,
    /// Peer detached the link (optional error condition).
    PeerDetached(Option<String>),
    /// Underlying connection failed.
    ConnectionLost(String),
    /// The link was dropped without a close.
    Dropped,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::LocalClose => "local_close",
            CloseReason::Aborted => "aborted",
            CloseReason::PeerDetached(_) => "peer_detached",
            CloseReason::ConnectionLost(_) => "connection_lost",
            CloseReason::Dropped => "dropped",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerDetached(Some(c)) => write!(f, "peer_detached ({c})"),
            CloseReason::ConnectionLost(e) => write!(f, "connection_lost ({e})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Sender-side link of the underlying transport.
///
/// Implementations must allow concurrent `submit` calls from many tasks.
#[async_trait]
pub trait SenderTransport: Send + Sync {
    /// Attach the link.
    async fn open(&self, timeout: Duration) -> Result<()>;

    /// Write one envelope and wait for its settlement.
    ///
    /// The sender settles with no disposition of its own. Dropping the
    /// returned future abandons the delivery; a late settlement is discarded.
    async fn submit(&self, envelope: WireEnvelope, tag: DeliveryTag) -> Result<RawSettlement>;

    /// Detach gracefully and wait for the peer to confirm.
    async fn close_graceful(&self, timeout: Duration) -> Result<()>;

    /// Tear the link down without waiting.
    fn close_immediate(&self);

    /// Closure signal: `None` while open, `Some(reason)` once closed.
    fn closed(&self) -> watch::Receiver<Option<CloseReason>>;
}
