use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;

use telelink_core::error::{LinkError, Result};

use crate::obs::LinkMetrics;
use crate::transport::{CloseReason, SenderTransport};

/// Link state.
///
/// `Open -> Closing -> Closed` (graceful), `Open|Closing -> Aborted` (abort),
/// `Open|Closing -> Closed` (transport closure). Closed and Aborted are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Open,
    Closing,
    Closed,
    Aborted,
}

impl LinkState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LinkState::Closed | LinkState::Aborted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LinkState::Open => "open",
            LinkState::Closing => "closing",
            LinkState::Closed => "closed",
            LinkState::Aborted => "aborted",
        }
    }
}

/// Closure subscription. Resolves once, with the first reason observed.
#[derive(Clone)]
pub struct ClosedEvent {
    rx: watch::Receiver<Option<CloseReason>>,
}

impl ClosedEvent {
    /// Wait for the link to close.
    pub async fn recv(&mut self) -> CloseReason {
        match self.rx.wait_for(Option::is_some).await {
            Ok(slot) => slot.clone().unwrap_or(CloseReason::Dropped),
            Err(_) => CloseReason::Dropped,
        }
    }

    /// Reason, if the link has already closed.
    pub fn try_recv(&self) -> Option<CloseReason> {
        self.rx.borrow().clone()
    }
}

/// Owns the link state and forwards transport closure to the owner.
///
/// State transitions go through `watch::Sender::send_if_modified`, which
/// checks and updates under one lock, so concurrent close/abort/closure
/// notifications cannot race each other.
pub struct LifecycleController {
    name: Arc<str>,
    transport: Arc<dyn SenderTransport>,
    state: watch::Sender<LinkState>,
    closed: watch::Sender<Option<CloseReason>>,
    metrics: Arc<LinkMetrics>,
}

impl LifecycleController {
    /// Create the controller and subscribe to the transport's closure signal.
    ///
    /// Fails with `Transport` when called outside a tokio runtime, since the
    /// closure watcher needs one to run on.
    pub fn new(
        name: impl Into<Arc<str>>,
        transport: Arc<dyn SenderTransport>,
        metrics: Arc<LinkMetrics>,
    ) -> Result<Arc<Self>> {
        let runtime = Handle::try_current()
            .map_err(|e| LinkError::Transport(format!("link needs a tokio runtime: {e}")))?;

        let (state, _) = watch::channel(LinkState::Open);
        let (closed, _) = watch::channel(None);
        let transport_closed = transport.closed();

        let ctl = Arc::new(Self {
            name: name.into(),
            transport,
            state,
            closed,
            metrics,
        });
        runtime.spawn(watch_transport(Arc::downgrade(&ctl), transport_closed));
        Ok(ctl)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    /// Fail with `LinkClosed` unless the link is open.
    pub fn ensure_open(&self) -> Result<()> {
        match self.state() {
            LinkState::Open => Ok(()),
            _ => Err(LinkError::LinkClosed),
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    pub fn subscribe_closed(&self) -> ClosedEvent {
        ClosedEvent {
            rx: self.closed.subscribe(),
        }
    }

    /// Graceful close, bounded by `timeout`.
    ///
    /// On timeout the transport close keeps running in the background and the
    /// link still reaches `Closed` when the transport confirms.
    pub async fn close(self: &Arc<Self>, timeout: Duration) -> Result<()> {
        let mut started = false;
        self.state.send_if_modified(|s| {
            if *s != LinkState::Open {
                return false;
            }
            *s = LinkState::Closing;
            started = true;
            true
        });

        match self.state() {
            LinkState::Closed => return Ok(()),
            LinkState::Aborted => return Err(LinkError::LinkClosed),
            LinkState::Open | LinkState::Closing => {}
        }

        if started {
            tracing::info!(link = %self.name, ?timeout, "closing link");
            let this = Arc::clone(self);
            tokio::spawn(async move {
                match this.transport.close_graceful(timeout).await {
                    Ok(()) => this.on_transport_closed(CloseReason::LocalClose),
                    Err(e) => tracing::warn!(
                        link = %this.name,
                        error = %e,
                        "graceful close failed, waiting for transport closure"
                    ),
                }
            });
        }

        let mut rx = self.state.subscribe();
        let waited = tokio::time::timeout(timeout, async {
            rx.wait_for(|s| s.is_terminal()).await.map(|s| *s)
        })
        .await;

        match waited {
            Ok(Ok(LinkState::Closed)) => Ok(()),
            Ok(_) => Err(LinkError::LinkClosed),
            Err(_) => {
                tracing::warn!(link = %self.name, ?timeout, "close not confirmed in time");
                Err(LinkError::CloseTimeout { timeout })
            }
        }
    }

    /// Immediate, best-effort teardown. In-flight sends resolve with
    /// `LinkClosed`.
    pub fn abort(&self) {
        let aborted = self.state.send_if_modified(|s| {
            if s.is_terminal() {
                return false;
            }
            *s = LinkState::Aborted;
            true
        });
        if !aborted {
            return;
        }
        tracing::info!(link = %self.name, "link aborted");
        self.transport.close_immediate();
        self.notify_closed(CloseReason::Aborted);
    }

    fn on_transport_closed(&self, reason: CloseReason) {
        let changed = self.state.send_if_modified(|s| {
            if s.is_terminal() {
                return false;
            }
            *s = LinkState::Closed;
            true
        });
        if changed {
            tracing::info!(link = %self.name, %reason, "link closed");
        }
        self.notify_closed(reason);
    }

    // At most one notification per link, whatever closed it.
    fn notify_closed(&self, reason: CloseReason) {
        let label = reason.as_str();
        let first = self.closed.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(reason);
            true
        });
        if first {
            self.metrics
                .closures
                .inc(&[("link", &*self.name), ("reason", label)]);
        }
    }
}

async fn watch_transport(ctl: Weak<LifecycleController>, mut rx: watch::Receiver<Option<CloseReason>>) {
    let reason = match rx.wait_for(Option::is_some).await {
        Ok(slot) => slot.clone().unwrap_or(CloseReason::Dropped),
        Err(_) => CloseReason::ConnectionLost("transport dropped its closure signal".into()),
    };
    if let Some(ctl) = ctl.upgrade() {
        ctl.on_transport_closed(reason);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::transport::LoopbackTransport;

    fn controller() -> (Arc<LoopbackTransport>, Arc<LifecycleController>) {
        let t = Arc::new(LoopbackTransport::new());
        let ctl = LifecycleController::new("test", t.clone(), Arc::new(LinkMetrics::default())).unwrap();
        (t, ctl)
    }

    #[tokio::test]
    async fn starts_open() {
        let (_t, ctl) = controller();
        assert_eq!(ctl.state(), LinkState::Open);
        assert!(ctl.ensure_open().is_ok());
        assert!(ctl.subscribe_closed().try_recv().is_none());
    }

    #[tokio::test]
    async fn abort_is_terminal_and_notifies_once() {
        let (t, ctl) = controller();
        let mut ev = ctl.subscribe_closed();
        ctl.abort();
        ctl.abort();
        assert_eq!(ctl.state(), LinkState::Aborted);
        assert!(t.is_closed());
        assert_eq!(ev.recv().await, CloseReason::Aborted);
        assert!(matches!(ctl.ensure_open(), Err(LinkError::LinkClosed)));

        // Transport closure after abort does not revive or re-notify.
        tokio::task::yield_now().await;
        assert_eq!(ctl.state(), LinkState::Aborted);
        assert_eq!(ctl.metrics.closures.get(&[("link", "test"), ("reason", "aborted")]), 1);
    }

    #[tokio::test]
    async fn close_after_abort_is_link_closed() {
        let (_t, ctl) = controller();
        ctl.abort();
        let err = ctl.close(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, LinkError::LinkClosed));
    }

    #[tokio::test]
    async fn peer_detach_closes_link() {
        let (t, ctl) = controller();
        let mut ev = ctl.subscribe_closed();
        t.detach(None);
        assert_eq!(ev.recv().await, CloseReason::PeerDetached(None));
        assert_eq!(ctl.state(), LinkState::Closed);
        // Closing an already closed link is a no-op.
        assert!(ctl.close(Duration::from_millis(10)).await.is_ok());
    }

    #[test]
    fn construction_outside_runtime_is_an_error() {
        let t = Arc::new(LoopbackTransport::new());
        let res = LifecycleController::new("no-rt", t, Arc::new(LinkMetrics::default()));
        assert!(matches!(res, Err(LinkError::Transport(_))));
    }
}
