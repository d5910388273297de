//! Send dispatcher exports.
//!
//! Re-exports the dispatcher so the link facade and tests can depend on this
//! module directly.

pub mod dispatcher;

pub use dispatcher::SendDispatcher;
