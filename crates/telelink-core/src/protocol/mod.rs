//! Protocol modules.
//!
//! - `message`: domain messages (telemetry, method response, twin get/patch).
//! - `envelope`: wire envelope + encoder.
//! - `batch`: telemetry batch composer.
//! - `frame`: binary frame codec for envelopes.
//! - `tag`: delivery tag allocation.
//!
//! The frame parser is panic-free: malformed input is reported as
//! `LinkError` instead of panicking or indexing raw buffers.

pub mod batch;
pub mod envelope;
pub mod frame;
pub mod message;
pub mod tag;
