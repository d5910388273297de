//! Sending link: the surface the owning transport-layer component talks to.
//!
//! Wraps encoder, batch composer, dispatcher, and lifecycle controller behind
//! one cloneable handle. Clones share the same link.

use std::sync::Arc;
use std::time::Duration;

use telelink_core::error::Result;
use telelink_core::protocol::envelope::encode_telemetry;
use telelink_core::{
    compose, encode, DeliveryTagAllocator, Message, MessageKind, MethodResponse, Outcome, Telemetry,
    TwinGet, TwinPatch, WireEnvelope,
};

use crate::config::{LinkConfig, LinkSection};
use crate::dispatch::SendDispatcher;
use crate::lifecycle::{ClosedEvent, LifecycleController, LinkState};
use crate::obs::LinkMetrics;
use crate::transport::SenderTransport;

#[derive(Clone)]
pub struct SendingLink {
    inner: Arc<LinkInner>,
}

struct LinkInner {
    cfg: LinkSection,
    lifecycle: Arc<LifecycleController>,
    dispatcher: SendDispatcher,
    metrics: Arc<LinkMetrics>,
}

impl SendingLink {
    /// Validate `cfg`, attach the transport link, and wrap it.
    pub async fn open(transport: Arc<dyn SenderTransport>, cfg: LinkConfig) -> Result<Self> {
        cfg.validate()?;
        let timeout = cfg.link.open_timeout();
        transport.open(timeout).await?;
        tracing::info!(link = %cfg.link.name, ?timeout, "link opened");
        Self::attach(transport, cfg)
    }

    /// Wrap a transport link that is already attached.
    ///
    /// Fails with `Transport` outside a tokio runtime.
    pub fn attach(transport: Arc<dyn SenderTransport>, cfg: LinkConfig) -> Result<Self> {
        let metrics = Arc::new(LinkMetrics::default());
        let lifecycle = LifecycleController::new(
            cfg.link.name.as_str(),
            Arc::clone(&transport),
            Arc::clone(&metrics),
        )?;
        let dispatcher = SendDispatcher::new(
            transport,
            Arc::clone(&lifecycle),
            Arc::clone(&metrics),
            DeliveryTagAllocator::new(cfg.link.delivery_tag_len),
        );
        Ok(Self {
            inner: Arc::new(LinkInner {
                cfg: cfg.link,
                lifecycle,
                dispatcher,
                metrics,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.cfg.name
    }

    pub fn config(&self) -> &LinkSection {
        &self.inner.cfg
    }

    pub fn state(&self) -> LinkState {
        self.inner.lifecycle.state()
    }

    pub fn metrics(&self) -> &LinkMetrics {
        &self.inner.metrics
    }

    /// Sends currently awaiting settlement.
    pub fn in_flight(&self) -> usize {
        self.inner.dispatcher.in_flight()
    }

    /// Closure notification, fired once per link whatever closed it.
    pub fn subscribe_closed(&self) -> ClosedEvent {
        self.inner.lifecycle.subscribe_closed()
    }

    /// Send one message. A rejection comes back as `Ok(Outcome::Rejected)`.
    pub async fn send_single(&self, message: Message, timeout: Duration) -> Result<Outcome> {
        let kind = message.kind();
        let envelope = encode(&message)?;
        self.dispatch(kind, envelope, timeout).await
    }

    /// Send telemetry as one batch envelope.
    ///
    /// All-or-nothing: anything but `Accepted` is `DeliveryRejected`.
    pub async fn send_batch(&self, messages: Vec<Telemetry>, timeout: Duration) -> Result<Outcome> {
        let envelope = compose(messages.iter().map(encode_telemetry).collect())?;
        let kind = if envelope.is_batch() {
            MessageKind::TelemetryBatch
        } else {
            MessageKind::Telemetry
        };
        self.dispatch(kind, envelope, timeout).await?.assert_accepted()
    }

    pub async fn send_method_response(&self, response: MethodResponse, timeout: Duration) -> Result<Outcome> {
        self.send_single(Message::MethodResponse(response), timeout).await
    }

    pub async fn send_twin_get(&self, correlation_id: impl Into<String>, timeout: Duration) -> Result<Outcome> {
        let msg = TwinGet {
            correlation_id: correlation_id.into(),
        };
        self.send_single(Message::TwinGet(msg), timeout).await
    }

    pub async fn send_twin_patch(
        &self,
        correlation_id: impl Into<String>,
        reported: serde_json::Value,
        timeout: Duration,
    ) -> Result<Outcome> {
        let msg = TwinPatch {
            correlation_id: correlation_id.into(),
            reported,
        };
        self.send_single(Message::TwinPatch(msg), timeout).await
    }

    /// Graceful close bounded by `timeout`.
    pub async fn close(&self, timeout: Duration) -> Result<()> {
        self.inner.lifecycle.close(timeout).await
    }

    /// Immediate teardown; pending sends fail with `LinkClosed`.
    pub fn abort(&self) {
        self.inner.lifecycle.abort();
    }

    async fn dispatch(&self, kind: MessageKind, envelope: WireEnvelope, timeout: Duration) -> Result<Outcome> {
        let tag = self.inner.dispatcher.allocate_tag();
        self.inner.dispatcher.dispatch(kind, envelope, tag, timeout).await
    }
}

impl std::fmt::Debug for SendingLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendingLink")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
