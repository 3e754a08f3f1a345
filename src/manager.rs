//! Connection management: state machine, reconnection and the single
//! in-flight read/write slot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{BikeError, Result};
use crate::transport::{Transport, TransportEvent};

/// The state of the link to the bike
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No link; nothing in flight
    Disconnected,
    /// Opening the transport
    Connecting,
    /// Link is up, discovering services and characteristics
    DiscoveringServices,
    /// Fully usable: reads, writes and subscriptions are available
    Ready,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::DiscoveringServices => write!(f, "discovering services"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

/// A notification frame routed from the transport
#[derive(Debug, Clone)]
pub struct Notification {
    /// The characteristic that pushed the frame
    pub characteristic: Uuid,
    /// The raw frame bytes
    pub data: Vec<u8>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    state_tx: watch::Sender<ConnectionState>,
    /// One in-flight read or write per connection: the firmware binds
    /// every write to the most recently read challenge, so reads and
    /// writes must not race on that shared nonce.
    io_lock: Mutex<()>,
    connect_lock: Mutex<()>,
    notify_tx: broadcast::Sender<Notification>,
    shutdown: AtomicBool,
    reconnecting: AtomicBool,
    reconnect_delay: Duration,
}

impl Inner {
    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                debug!("connection state: {current} -> {state}");
                *current = state;
                true
            }
        });
    }

    async fn establish(&self) -> Result<()> {
        self.set_state(ConnectionState::Connecting);
        if let Err(error) = self.transport.connect().await {
            self.set_state(ConnectionState::Disconnected);
            return Err(error);
        }

        self.set_state(ConnectionState::DiscoveringServices);
        if let Err(error) = self.transport.discover_characteristics().await {
            let _ = self.transport.disconnect().await;
            self.set_state(ConnectionState::Disconnected);
            return Err(error);
        }

        self.set_state(ConnectionState::Ready);
        info!("connection ready");
        Ok(())
    }

    /// Retry establishing the link indefinitely with a fixed delay, until
    /// it succeeds or the caller disconnects.
    fn spawn_reconnect(self: Arc<Self>) {
        if self.reconnecting.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = self;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(inner.reconnect_delay).await;
                if inner.shutdown.load(Ordering::SeqCst) {
                    break;
                }
                let _guard = inner.connect_lock.lock().await;
                if *inner.state_tx.borrow() == ConnectionState::Ready {
                    break;
                }
                match inner.establish().await {
                    Ok(()) => break,
                    Err(error) => warn!("reconnect attempt failed: {error}"),
                }
            }
            inner.reconnecting.store(false, Ordering::SeqCst);
        });
    }

    fn ensure_ready(&self) -> Result<()> {
        if *self.state_tx.borrow() == ConnectionState::Ready {
            Ok(())
        } else {
            Err(BikeError::Disconnected)
        }
    }
}

/// Owns the transport link and drives it through the connection state
/// machine
///
/// Once [`ConnectionState::Ready`], three operations are available:
/// [`read`](Self::read), [`write`](Self::write) and
/// [`subscribe`](Self::subscribe). Reads and writes serialize behind a
/// single mutual-exclusion slot; notification delivery is independent of
/// that slot and may interleave with an in-flight operation.
///
/// Any failure drops the link back to `Disconnected` and schedules an
/// automatic reconnect after a fixed delay, unless the caller explicitly
/// [`disconnect`](Self::disconnect)ed.
pub struct ConnectionManager {
    inner: Arc<Inner>,
    supervisor: JoinHandle<()>,
}

impl ConnectionManager {
    /// Create a manager for one transport link.
    ///
    /// `reconnect_delay` is the fixed pause before every automatic
    /// reconnect attempt.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, reconnect_delay: Duration) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (notify_tx, _) = broadcast::channel(64);
        let inner = Arc::new(Inner {
            transport,
            state_tx,
            io_lock: Mutex::new(()),
            connect_lock: Mutex::new(()),
            notify_tx,
            shutdown: AtomicBool::new(false),
            reconnecting: AtomicBool::new(false),
            reconnect_delay,
        });

        let supervisor = tokio::spawn(Self::supervise(Arc::clone(&inner)));

        Self { inner, supervisor }
    }

    /// Route transport events: notifications to subscribers, unexpected
    /// disconnects into the state machine and the reconnect loop.
    async fn supervise(inner: Arc<Inner>) {
        let mut events = inner.transport.events();
        loop {
            match events.recv().await {
                Ok(TransportEvent::Notification { characteristic, data }) => {
                    let _ = inner.notify_tx.send(Notification { characteristic, data });
                }
                Ok(TransportEvent::Disconnected) => {
                    inner.set_state(ConnectionState::Disconnected);
                    if inner.shutdown.load(Ordering::SeqCst) {
                        debug!("link closed by request");
                    } else {
                        warn!("link dropped, scheduling reconnect");
                        Arc::clone(&inner).spawn_reconnect();
                    }
                }
                Ok(TransportEvent::Connected) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("dropped {missed} transport events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Bring the link up and suspend until it is ready.
    ///
    /// A no-op when already ready. On failure the error is returned to
    /// the caller and an automatic reconnect attempt is scheduled.
    ///
    /// # Errors
    ///
    /// Returns the transport error that prevented the link from coming
    /// up.
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.inner.connect_lock.lock().await;
        if *self.inner.state_tx.borrow() == ConnectionState::Ready {
            return Ok(());
        }
        self.inner.shutdown.store(false, Ordering::SeqCst);
        match self.inner.establish().await {
            Ok(()) => Ok(()),
            Err(error) => {
                Arc::clone(&self.inner).spawn_reconnect();
                Err(error)
            }
        }
    }

    /// Tear the link down and suppress automatic reconnection.
    ///
    /// Idempotent. All pending operations fail with a disconnected error
    /// before this returns.
    pub async fn disconnect(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        if let Err(error) = self.inner.transport.disconnect().await {
            debug!("transport disconnect: {error}");
        }
        self.inner.set_state(ConnectionState::Disconnected);
    }

    /// The current connection state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Watch connection state transitions
    #[must_use]
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Read a characteristic value, holding the single in-flight slot.
    ///
    /// # Errors
    ///
    /// Returns [`BikeError::Disconnected`] if the link is not ready, or
    /// the transport error otherwise.
    pub async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>> {
        let _slot = self.inner.io_lock.lock().await;
        self.inner.ensure_ready()?;
        self.inner.transport.read(characteristic).await
    }

    /// Write a characteristic value, holding the single in-flight slot.
    ///
    /// # Errors
    ///
    /// Returns [`BikeError::Disconnected`] if the link is not ready, or
    /// the transport error otherwise.
    pub async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()> {
        let _slot = self.inner.io_lock.lock().await;
        self.inner.ensure_ready()?;
        self.inner.transport.write(characteristic, data).await
    }

    /// Enable notifications for a characteristic.
    ///
    /// Subscriptions bypass the read/write slot; frames arrive on
    /// [`notifications`](Self::notifications) as they are pushed.
    ///
    /// # Errors
    ///
    /// Returns [`BikeError::Disconnected`] if the link is not ready, or
    /// the transport error otherwise.
    pub async fn subscribe(&self, characteristic: Uuid) -> Result<()> {
        self.inner.ensure_ready()?;
        self.inner.transport.subscribe(characteristic).await
    }

    /// Subscribe to notification frames
    #[must_use]
    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.inner.notify_tx.subscribe()
    }

    /// Read the received signal strength in dBm.
    ///
    /// Signal strength bypasses the read/write slot.
    ///
    /// # Errors
    ///
    /// Returns [`BikeError::Disconnected`] if the link is not ready, or
    /// the transport error otherwise.
    pub async fn signal_strength(&self) -> Result<i16> {
        self.inner.ensure_ready()?;
        self.inner.transport.read_rssi().await
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.supervisor.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// A transport that connects instantly and records call counts.
    struct LoopbackTransport {
        connected: AtomicBool,
        connects: AtomicUsize,
        writes: AtomicUsize,
        fail_connects: AtomicUsize,
        connect_delay_ms: AtomicUsize,
        events: broadcast::Sender<TransportEvent>,
    }

    impl LoopbackTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                connected: AtomicBool::new(false),
                connects: AtomicUsize::new(0),
                writes: AtomicUsize::new(0),
                fail_connects: AtomicUsize::new(0),
                connect_delay_ms: AtomicUsize::new(0),
                events: broadcast::channel(16).0,
            })
        }

        fn drop_link(&self) {
            self.connected.store(false, Ordering::SeqCst);
            let _ = self.events.send(TransportEvent::Disconnected);
        }
    }

    #[async_trait]
    impl Transport for LoopbackTransport {
        async fn connect(&self) -> Result<()> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let delay = self.connect_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay as u64)).await;
            }
            if self.fail_connects.load(Ordering::SeqCst) > 0 {
                self.fail_connects.fetch_sub(1, Ordering::SeqCst);
                return Err(BikeError::PeripheralNotFound);
            }
            self.connected.store(true, Ordering::SeqCst);
            let _ = self.events.send(TransportEvent::Connected);
            Ok(())
        }

        async fn discover_characteristics(&self) -> Result<()> {
            Ok(())
        }

        async fn read(&self, _characteristic: Uuid) -> Result<Vec<u8>> {
            if self.connected.load(Ordering::SeqCst) {
                Ok(vec![0x23, 0x42])
            } else {
                Err(BikeError::Disconnected)
            }
        }

        async fn write(&self, _characteristic: Uuid, _data: &[u8]) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn subscribe(&self, _characteristic: Uuid) -> Result<()> {
            Ok(())
        }

        async fn read_rssi(&self) -> Result<i16> {
            Ok(-42)
        }

        async fn disconnect(&self) -> Result<()> {
            self.connected.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        fn events(&self) -> broadcast::Receiver<TransportEvent> {
            self.events.subscribe()
        }
    }

    #[tokio::test]
    async fn test_connect_reaches_ready() {
        let transport = LoopbackTransport::new();
        let manager = ConnectionManager::new(transport.clone(), Duration::from_millis(10));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        manager.connect().await.unwrap();
        assert_eq!(manager.state(), ConnectionState::Ready);

        // already ready: no second transport connect
        manager.connect().await.unwrap();
        assert_eq!(transport.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_read_fails_when_disconnected() {
        let transport = LoopbackTransport::new();
        let manager = ConnectionManager::new(transport, Duration::from_millis(10));
        let error = manager.read(Uuid::nil()).await.unwrap_err();
        assert!(matches!(error, BikeError::Disconnected));
    }

    #[tokio::test]
    async fn test_unexpected_drop_reconnects_without_connect_call() {
        let transport = LoopbackTransport::new();
        let manager = ConnectionManager::new(transport.clone(), Duration::from_millis(10));
        manager.connect().await.unwrap();

        // slow the next connect down so the connecting state is observable
        transport.connect_delay_ms.store(50, Ordering::SeqCst);
        transport.drop_link();

        // the manager re-enters connecting on its own
        let mut entered_connecting = false;
        for _ in 0..200 {
            match manager.state() {
                ConnectionState::Connecting | ConnectionState::DiscoveringServices => {
                    entered_connecting = true;
                    break;
                }
                _ => tokio::time::sleep(Duration::from_millis(2)).await,
            }
        }
        assert!(entered_connecting, "no automatic reconnect attempt");

        // and comes all the way back without an explicit connect() call
        let mut states = manager.state_watch();
        while *states.borrow_and_update() != ConnectionState::Ready {
            states.changed().await.unwrap();
        }
        assert_eq!(transport.connects.load(Ordering::SeqCst), 2);
        assert_eq!(transport.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reconnect_retries_until_success() {
        let transport = LoopbackTransport::new();
        transport.fail_connects.store(2, Ordering::SeqCst);
        let manager = ConnectionManager::new(transport.clone(), Duration::from_millis(5));

        assert!(manager.connect().await.is_err());

        let mut states = manager.state_watch();
        while *states.borrow_and_update() != ConnectionState::Ready {
            states.changed().await.unwrap();
        }
        // the failed initial attempt, one failed retry, one that stuck
        assert_eq!(transport.connects.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_disconnect_suppresses_reconnection() {
        let transport = LoopbackTransport::new();
        let manager = ConnectionManager::new(transport.clone(), Duration::from_millis(5));
        manager.connect().await.unwrap();

        manager.disconnect().await;
        manager.disconnect().await; // idempotent
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(transport.connects.load(Ordering::SeqCst), 1);
    }
}
