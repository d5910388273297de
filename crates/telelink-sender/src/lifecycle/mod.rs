//! Link lifecycle: state machine, graceful close, abort, and closure events.

mod controller;

pub use controller::{ClosedEvent, LifecycleController, LinkState};
