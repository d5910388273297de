//! telelink sender: the async half of the device-to-cloud sending link.
//!
//! This crate wires the transport capability, the send dispatcher, and the
//! lifecycle controller into `SendingLink`. It is consumed by the owning
//! transport-layer component and by integration tests.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod config;
pub mod dispatch;
pub mod lifecycle;
pub mod link;
pub mod obs;
pub mod transport;

pub use config::{LinkConfig, LinkSection};
pub use lifecycle::{ClosedEvent, LinkState};
pub use link::SendingLink;
pub use obs::LinkMetrics;
pub use transport::{CloseReason, LoopbackTransport, SenderTransport};
