//! Batch composer: many telemetry envelopes in one batch-format envelope.
//!
//! Each sub-part is the frame encoding of one input envelope, in input order,
//! so the peer can split the batch and recover per-message metadata.

use crate::error::{LinkError, Result};
use crate::protocol::envelope::{MessageFormat, WireEnvelope};
use crate::protocol::frame::{decode_frame, encode_frame};

/// Compose single-part envelopes into one envelope.
///
/// One input is returned unchanged (single format): the batch marker is only
/// set when there is more than one sub-part.
pub fn compose(envelopes: Vec<WireEnvelope>) -> Result<WireEnvelope> {
    if envelopes.is_empty() {
        return Err(LinkError::EmptyBatch);
    }

    for (i, env) in envelopes.iter().enumerate() {
        if env.format() != MessageFormat::Single || env.sections().len() != 1 {
            return Err(LinkError::Encoding(format!(
                "batch entry {i} is not a single-part envelope"
            )));
        }
    }

    if envelopes.len() == 1 {
        return envelopes
            .into_iter()
            .next()
            .ok_or(LinkError::EmptyBatch);
    }

    let parts = envelopes.iter().map(encode_frame).collect::<Result<Vec<_>>>()?;
    tracing::trace!(parts = parts.len(), "composed batch envelope");
    WireEnvelope::from_parts(MessageFormat::Batch, parts)
}

impl WireEnvelope {
    /// Split a batch back into its sub-envelopes, in order.
    ///
    /// A single-format envelope yields itself.
    pub fn batch_parts(&self) -> Result<Vec<WireEnvelope>> {
        if !self.is_batch() {
            return Ok(vec![self.clone()]);
        }
        self.sections()
            .iter()
            .map(|part| decode_frame(part.clone()))
            .collect()
    }
}
