//! Settlement outcomes.
//!
//! The transport reports a raw settlement (descriptor code + fields); the
//! translator turns it into a typed `Outcome`. A batch gets exactly one
//! settlement, so its outcome is all-or-nothing.

use std::fmt;

use crate::error::{LinkError, Result};
use crate::protocol::envelope::FieldMap;

pub const DESCRIPTOR_ACCEPTED: u64 = 0x24;
pub const DESCRIPTOR_REJECTED: u64 = 0x25;
pub const DESCRIPTOR_RELEASED: u64 = 0x26;
pub const DESCRIPTOR_MODIFIED: u64 = 0x27;

/// Error conditions worth retrying on the same link.
const TRANSIENT_CONDITIONS: [&str; 4] = [
    "amqp:internal-error",
    "com.microsoft:timeout",
    "com.microsoft:server-busy",
    "com.microsoft:device-container-throttled",
];

/// Settlement as reported by the transport.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSettlement {
    pub descriptor: u64,
    /// Error condition (rejected only).
    pub condition: Option<String>,
    pub description: Option<String>,
    /// Modified only.
    pub delivery_failed: bool,
    pub undeliverable_here: bool,
    pub annotations: FieldMap,
}

impl RawSettlement {
    pub fn accepted() -> Self {
        Self {
            descriptor: DESCRIPTOR_ACCEPTED,
            ..Self::default()
        }
    }

    pub fn rejected(condition: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            descriptor: DESCRIPTOR_REJECTED,
            condition: Some(condition.into()),
            description: Some(description.into()),
            ..Self::default()
        }
    }

    pub fn released() -> Self {
        Self {
            descriptor: DESCRIPTOR_RELEASED,
            ..Self::default()
        }
    }

    pub fn modified(delivery_failed: bool, undeliverable_here: bool, annotations: FieldMap) -> Self {
        Self {
            descriptor: DESCRIPTOR_MODIFIED,
            delivery_failed,
            undeliverable_here,
            annotations,
            ..Self::default()
        }
    }
}

/// Why the peer did not accept a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectCause {
    pub condition: Option<String>,
    pub description: Option<String>,
}

impl RejectCause {
    pub fn new(condition: Option<String>, description: Option<String>) -> Self {
        Self { condition, description }
    }

    /// Transient causes may succeed on resend; the rest (quota, size,
    /// authorization, malformed) will not.
    pub fn is_transient(&self) -> bool {
        self.condition
            .as_deref()
            .is_some_and(|c| TRANSIENT_CONDITIONS.contains(&c))
    }
}

impl fmt::Display for RejectCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cond = self.condition.as_deref().unwrap_or("unspecified");
        match &self.description {
            Some(d) => write!(f, "{cond} ({d})"),
            None => f.write_str(cond),
        }
    }
}

/// Typed delivery outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Accepted,
    Rejected(RejectCause),
    Released,
    Modified {
        delivery_failed: bool,
        undeliverable_here: bool,
        annotations: FieldMap,
    },
}

impl Outcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Accepted)
    }

    /// Label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Accepted => "accepted",
            Outcome::Rejected(_) => "rejected",
            Outcome::Released => "released",
            Outcome::Modified { .. } => "modified",
        }
    }

    /// Fail with `DeliveryRejected` unless accepted.
    ///
    /// Batch sends have no per-message outcome, so they always go through here.
    pub fn assert_accepted(self) -> Result<Outcome> {
        match self {
            Outcome::Accepted => Ok(Outcome::Accepted),
            Outcome::Rejected(cause) => Err(LinkError::DeliveryRejected(cause)),
            Outcome::Released => Err(LinkError::DeliveryRejected(RejectCause::new(
                None,
                Some("delivery released by peer".into()),
            ))),
            Outcome::Modified { delivery_failed, undeliverable_here, .. } => {
                Err(LinkError::DeliveryRejected(RejectCause::new(
                    None,
                    Some(format!(
                        "delivery modified by peer (failed={delivery_failed}, undeliverable_here={undeliverable_here})"
                    )),
                )))
            }
        }
    }
}

/// Map a raw settlement to a typed outcome.
pub fn translate(raw: RawSettlement) -> Result<Outcome> {
    match raw.descriptor {
        DESCRIPTOR_ACCEPTED => Ok(Outcome::Accepted),
        DESCRIPTOR_REJECTED => Ok(Outcome::Rejected(RejectCause::new(
            raw.condition,
            raw.description,
        ))),
        DESCRIPTOR_RELEASED => Ok(Outcome::Released),
        DESCRIPTOR_MODIFIED => Ok(Outcome::Modified {
            delivery_failed: raw.delivery_failed,
            undeliverable_here: raw.undeliverable_here,
            annotations: raw.annotations,
        }),
        other => Err(LinkError::UnknownSettlement(other)),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]

    use super::*;
    use crate::protocol::envelope::FieldValue;

    #[test]
    fn translate_all_descriptors() {
        assert_eq!(translate(RawSettlement::accepted()).unwrap(), Outcome::Accepted);
        assert_eq!(translate(RawSettlement::released()).unwrap(), Outcome::Released);

        let out = translate(RawSettlement::rejected("amqp:decode-error", "bad body")).unwrap();
        let Outcome::Rejected(cause) = out else { panic!("expected rejected") };
        assert_eq!(cause.condition.as_deref(), Some("amqp:decode-error"));
        assert!(!cause.is_transient());

        let mut ann = FieldMap::new();
        ann.insert("x-opt-retry".into(), FieldValue::Long(2));
        let out = translate(RawSettlement::modified(true, false, ann.clone())).unwrap();
        assert_eq!(
            out,
            Outcome::Modified { delivery_failed: true, undeliverable_here: false, annotations: ann }
        );
    }

    #[test]
    fn unknown_descriptor_is_error() {
        let raw = RawSettlement { descriptor: 0x99, ..RawSettlement::default() };
        assert!(matches!(translate(raw), Err(LinkError::UnknownSettlement(0x99))));
    }

    #[test]
    fn assert_accepted_only_passes_accepted() {
        assert!(Outcome::Accepted.assert_accepted().is_ok());

        let rejected = Outcome::Rejected(RejectCause::new(Some("amqp:internal-error".into()), None));
        let err = rejected.assert_accepted().unwrap_err();
        assert!(err.is_transient());

        let err = Outcome::Released.assert_accepted().unwrap_err();
        assert_eq!(err.kind().as_str(), "DELIVERY_REJECTED");
    }

    #[test]
    fn cause_display() {
        let c = RejectCause::new(Some("amqp:not-found".into()), Some("no device".into()));
        assert_eq!(c.to_string(), "amqp:not-found (no device)");
        assert_eq!(RejectCause::new(None, None).to_string(), "unspecified");
    }
}
