//! In-process loopback transport with a scriptable peer.
//!
//! Every write is recorded. The peer settles with a configurable disposition
//! after an optional delay, or holds settlements until `settle` is called by
//! tag. Closing and peer detach drive the closure signal like a real link.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{oneshot, watch};

use telelink_core::error::{LinkError, Result};
use telelink_core::{DeliveryTag, RawSettlement, WireEnvelope};

use super::{CloseReason, SenderTransport};

#[derive(Debug, Clone)]
struct PeerScript {
    disposition: RawSettlement,
    settle_delay: Duration,
    hold: bool,
    close_latency: Duration,
    fail_writes: Option<String>,
}

impl Default for PeerScript {
    fn default() -> Self {
        Self {
            disposition: RawSettlement::accepted(),
            settle_delay: Duration::ZERO,
            hold: false,
            close_latency: Duration::ZERO,
            fail_writes: None,
        }
    }
}

/// Loopback transport.
pub struct LoopbackTransport {
    script: Mutex<PeerScript>,
    writes: Mutex<Vec<(DeliveryTag, WireEnvelope)>>,
    held: DashMap<DeliveryTag, oneshot::Sender<RawSettlement>>,
    closed_tx: watch::Sender<Option<CloseReason>>,
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackTransport {
    pub fn new() -> Self {
        let (closed_tx, _) = watch::channel(None);
        Self {
            script: Mutex::new(PeerScript::default()),
            writes: Mutex::new(Vec::new()),
            held: DashMap::new(),
            closed_tx,
        }
    }

    fn with_script(&self, f: impl FnOnce(&mut PeerScript)) {
        // Poisoned script only happens if a test panicked mid-update; keep going.
        let mut g = self.script.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut *g);
    }

    fn script(&self) -> PeerScript {
        self.script
            .lock()
            .map(|g| g.clone())
            .unwrap_or_else(|p| p.into_inner().clone())
    }

    /// Disposition the peer applies to every delivery.
    pub fn set_disposition(&self, raw: RawSettlement) {
        self.with_script(|s| s.disposition = raw);
    }

    /// Delay before the peer settles.
    pub fn set_settle_delay(&self, d: Duration) {
        self.with_script(|s| s.settle_delay = d);
    }

    /// Park settlements until `settle` is called.
    pub fn hold_settlements(&self, hold: bool) {
        self.with_script(|s| s.hold = hold);
    }

    /// Time the peer takes to confirm a graceful close.
    pub fn set_close_latency(&self, d: Duration) {
        self.with_script(|s| s.close_latency = d);
    }

    /// Make every write fail at the transport level.
    pub fn fail_writes(&self, reason: Option<String>) {
        self.with_script(|s| s.fail_writes = reason);
    }

    /// Settle a held delivery. Returns false if nobody is waiting for it
    /// (unknown tag, or the sender gave up).
    pub fn settle(&self, tag: &DeliveryTag, raw: RawSettlement) -> bool {
        match self.held.remove(tag) {
            Some((_, tx)) => tx.send(raw).is_ok(),
            None => false,
        }
    }

    /// Tags of held deliveries.
    pub fn held_tags(&self) -> Vec<DeliveryTag> {
        self.held.iter().map(|e| e.key().clone()).collect()
    }

    /// Peer-initiated detach.
    pub fn detach(&self, condition: Option<String>) {
        self.signal_closed(CloseReason::PeerDetached(condition));
    }

    /// Connection failure below the link.
    pub fn drop_connection(&self, error: impl Into<String>) {
        self.signal_closed(CloseReason::ConnectionLost(error.into()));
    }

    /// Recorded writes, in submission order.
    pub fn writes(&self) -> Vec<(DeliveryTag, WireEnvelope)> {
        self.writes
            .lock()
            .map(|g| g.clone())
            .unwrap_or_else(|p| p.into_inner().clone())
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().map(|g| g.len()).unwrap_or_else(|p| p.into_inner().len())
    }

    pub fn is_closed(&self) -> bool {
        self.closed_tx.borrow().is_some()
    }

    fn signal_closed(&self, reason: CloseReason) {
        self.closed_tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(reason);
            true
        });
        // Pending deliveries die with the link.
        self.held.clear();
    }
}

#[async_trait]
impl SenderTransport for LoopbackTransport {
    async fn open(&self, _timeout: Duration) -> Result<()> {
        if self.is_closed() {
            return Err(LinkError::LinkClosed);
        }
        Ok(())
    }

    async fn submit(&self, envelope: WireEnvelope, tag: DeliveryTag) -> Result<RawSettlement> {
        if self.is_closed() {
            return Err(LinkError::LinkClosed);
        }
        let script = self.script();
        if let Some(reason) = script.fail_writes {
            return Err(LinkError::Transport(reason));
        }

        self.writes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((tag.clone(), envelope));

        if script.hold {
            let (tx, rx) = oneshot::channel();
            self.held.insert(tag, tx);
            return rx.await.map_err(|_| LinkError::LinkClosed);
        }

        if !script.settle_delay.is_zero() {
            tokio::time::sleep(script.settle_delay).await;
        }
        Ok(script.disposition)
    }

    async fn close_graceful(&self, _timeout: Duration) -> Result<()> {
        let latency = self.script().close_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.signal_closed(CloseReason::LocalClose);
        Ok(())
    }

    fn close_immediate(&self) {
        self.signal_closed(CloseReason::Aborted);
    }

    fn closed(&self) -> watch::Receiver<Option<CloseReason>> {
        self.closed_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test]
    async fn records_writes_and_accepts() {
        let t = LoopbackTransport::new();
        let tag = DeliveryTag::from_bytes(vec![1; 8]);
        let raw = t.submit(WireEnvelope::single("x"), tag.clone()).await.unwrap();
        assert_eq!(raw, RawSettlement::accepted());
        assert_eq!(t.write_count(), 1);
        assert_eq!(t.writes()[0].0, tag);
    }

    #[tokio::test]
    async fn held_settlement_is_delivered_by_tag() {
        let t = std::sync::Arc::new(LoopbackTransport::new());
        t.hold_settlements(true);
        let tag = DeliveryTag::from_bytes(vec![2; 8]);

        let t2 = std::sync::Arc::clone(&t);
        let tag2 = tag.clone();
        let pending = tokio::spawn(async move { t2.submit(WireEnvelope::empty(), tag2).await });

        while t.held_tags().is_empty() {
            tokio::task::yield_now().await;
        }
        assert!(t.settle(&tag, RawSettlement::released()));
        assert_eq!(pending.await.unwrap().unwrap(), RawSettlement::released());
        assert!(!t.settle(&tag, RawSettlement::accepted()));
    }

    #[tokio::test]
    async fn closed_transport_refuses_writes() {
        let t = LoopbackTransport::new();
        t.detach(Some("amqp:link:detach-forced".into()));
        let err = t.submit(WireEnvelope::empty(), DeliveryTag::from_bytes(vec![3; 8])).await;
        assert!(matches!(err, Err(LinkError::LinkClosed)));
        assert_eq!(t.write_count(), 0);
        assert_eq!(
            t.closed().borrow().clone(),
            Some(CloseReason::PeerDetached(Some("amqp:link:detach-forced".into())))
        );
    }
}
