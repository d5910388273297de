use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashSet;

use telelink_core::error::{LinkError, Result};
use telelink_core::{translate, DeliveryTag, DeliveryTagAllocator, MessageKind, Outcome, WireEnvelope};

use crate::lifecycle::LifecycleController;
use crate::obs::LinkMetrics;
use crate::transport::SenderTransport;

/// Hands envelopes to the transport and awaits their settlement.
///
/// One transport write per `dispatch`, no internal retries. Every in-flight
/// tag is registered for the duration of its dispatch.
pub struct SendDispatcher {
    transport: Arc<dyn SenderTransport>,
    lifecycle: Arc<LifecycleController>,
    metrics: Arc<LinkMetrics>,
    tags: DeliveryTagAllocator,
    in_flight: DashSet<DeliveryTag>,
}

/// In-flight registration, released on drop (settled, timed out, closed, or
/// cancelled by the caller).
struct TagLease<'a> {
    dispatcher: &'a SendDispatcher,
    tag: DeliveryTag,
}

impl Drop for TagLease<'_> {
    fn drop(&mut self) {
        if self.dispatcher.in_flight.remove(&self.tag).is_some() {
            self.dispatcher
                .metrics
                .in_flight
                .dec(&[("link", self.dispatcher.lifecycle.name())]);
        }
    }
}

impl SendDispatcher {
    pub fn new(
        transport: Arc<dyn SenderTransport>,
        lifecycle: Arc<LifecycleController>,
        metrics: Arc<LinkMetrics>,
        tags: DeliveryTagAllocator,
    ) -> Self {
        Self {
            transport,
            lifecycle,
            metrics,
            tags,
            in_flight: DashSet::new(),
        }
    }

    pub fn allocate_tag(&self) -> DeliveryTag {
        self.tags.allocate()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_in_flight(&self, tag: &DeliveryTag) -> bool {
        self.in_flight.contains(tag)
    }

    /// Submit `envelope` under `tag` and wait for its outcome.
    ///
    /// Resolves with the first of: settlement, `timeout` (`SendTimeout`), or
    /// the link reaching Closed/Aborted (`LinkClosed`). A settlement that
    /// arrives after the timeout is dropped with the transport future.
    pub async fn dispatch(
        &self,
        kind: MessageKind,
        envelope: WireEnvelope,
        tag: DeliveryTag,
        timeout: Duration,
    ) -> Result<Outcome> {
        let started = Instant::now();
        let tag_str = tag.to_string();
        let res = self.dispatch_inner(envelope, tag, timeout).await;
        let elapsed = started.elapsed();

        let link = self.lifecycle.name();
        let result = match &res {
            Ok(outcome) => outcome.as_str(),
            Err(e) => e.kind().as_str(),
        };
        self.metrics
            .sends
            .inc(&[("link", link), ("kind", kind.as_str()), ("result", result)]);

        match &res {
            Ok(Outcome::Accepted) => {
                self.metrics
                    .dispatch_duration
                    .observe(&[("link", link), ("kind", kind.as_str())], elapsed);
                tracing::debug!(link, tag = %tag_str, kind = kind.as_str(), ?elapsed, "delivery accepted");
            }
            Ok(other) => {
                self.metrics
                    .dispatch_duration
                    .observe(&[("link", link), ("kind", kind.as_str())], elapsed);
                tracing::warn!(link, tag = %tag_str, kind = kind.as_str(), outcome = ?other, "delivery not accepted");
            }
            Err(e) => {
                tracing::warn!(link, tag = %tag_str, kind = kind.as_str(), error = %e, "dispatch failed");
            }
        }
        res
    }

    async fn dispatch_inner(&self, envelope: WireEnvelope, tag: DeliveryTag, timeout: Duration) -> Result<Outcome> {
        // Subscribe before the open check so a concurrent abort is not missed.
        let mut state = self.lifecycle.subscribe_state();
        self.lifecycle.ensure_open()?;
        let _lease = self.lease(tag.clone())?;

        tokio::select! {
            biased;
            settled = self.transport.submit(envelope, tag) => translate(settled?),
            _ = state.wait_for(|s| s.is_terminal()) => Err(LinkError::LinkClosed),
            _ = tokio::time::sleep(timeout) => Err(LinkError::SendTimeout { timeout }),
        }
    }

    fn lease(&self, tag: DeliveryTag) -> Result<TagLease<'_>> {
        if !self.in_flight.insert(tag.clone()) {
            return Err(LinkError::DuplicateTag(tag.to_string()));
        }
        self.metrics.in_flight.inc(&[("link", self.lifecycle.name())]);
        Ok(TagLease { dispatcher: self, tag })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::transport::LoopbackTransport;

    fn setup() -> (Arc<LoopbackTransport>, Arc<LifecycleController>, SendDispatcher) {
        let t = Arc::new(LoopbackTransport::new());
        let metrics = Arc::new(LinkMetrics::default());
        let ctl = LifecycleController::new("d", t.clone(), metrics.clone()).unwrap();
        let d = SendDispatcher::new(t.clone(), ctl.clone(), metrics, DeliveryTagAllocator::default());
        (t, ctl, d)
    }

    #[tokio::test]
    async fn accepted_settlement_releases_tag() {
        let (t, _ctl, d) = setup();
        let tag = d.allocate_tag();
        let out = d
            .dispatch(MessageKind::Telemetry, WireEnvelope::single("x"), tag.clone(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(out, Outcome::Accepted);
        assert!(!d.is_in_flight(&tag));
        assert_eq!(t.write_count(), 1);
        assert_eq!(
            d.metrics.sends.get(&[("link", "d"), ("kind", "telemetry"), ("result", "accepted")]),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_in_flight_tag_is_refused() {
        let (t, _ctl, d) = setup();
        t.hold_settlements(true);
        let d = Arc::new(d);
        let tag = d.allocate_tag();

        let d2 = Arc::clone(&d);
        let tag2 = tag.clone();
        let first = tokio::spawn(async move {
            d2.dispatch(MessageKind::Telemetry, WireEnvelope::single("a"), tag2, Duration::from_secs(5))
                .await
        });
        while !d.is_in_flight(&tag) {
            tokio::task::yield_now().await;
        }

        let err = d
            .dispatch(MessageKind::Telemetry, WireEnvelope::single("b"), tag.clone(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::DuplicateTag(_)));
        assert_eq!(t.write_count(), 1);

        let err = first.await.unwrap().unwrap_err();
        assert!(matches!(err, LinkError::SendTimeout { .. }));
        assert_eq!(d.in_flight(), 0);
    }

    #[tokio::test]
    async fn transport_failure_surfaces() {
        let (t, _ctl, d) = setup();
        t.fail_writes(Some("socket reset".into()));
        let err = d
            .dispatch(MessageKind::TwinGet, WireEnvelope::empty(), d.allocate_tag(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::Transport(_)));
        assert!(err.is_transient());
        assert_eq!(d.in_flight(), 0);
    }
}
