//! Top-level facade crate for telelink.
//!
//! Re-exports the protocol core and the sending link so users can depend on a single crate.

pub mod core {
    pub use telelink_core::*;
}

pub mod sender {
    pub use telelink_sender::*;
}

pub use telelink_core::{LinkError, Message, MethodResponse, Outcome, Result, Telemetry};
pub use telelink_sender::{LinkConfig, SendingLink};
