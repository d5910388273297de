//! telelink core: runtime-free primitives for the sending side of a device link.
//!
//! This crate defines the wire envelope, the encoders that produce it from
//! domain messages, the batch composer, the frame codec, delivery tags, and
//! settlement outcomes. It carries no async runtime so the same contracts can
//! back any transport.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Every fallible path surfaces as `LinkError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod outcome;
pub mod protocol;

/// Shared result type.
pub use error::{ErrorKind, LinkError, Result};
pub use outcome::{translate, Outcome, RawSettlement, RejectCause};
pub use protocol::{
    batch::compose,
    envelope::{encode, FieldMap, FieldValue, MessageFormat, WireEnvelope},
    message::{Message, MessageKind, MethodResponse, Telemetry, TwinGet, TwinPatch},
    tag::{DeliveryTag, DeliveryTagAllocator},
};
