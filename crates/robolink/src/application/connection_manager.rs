//! Connection manager: the state machine that owns negotiation and sessions.
//!
//! # Architecture
//!
//! ```text
//!  API handle ──Command──►┐
//!                         │     ┌──────────────────────┐   LinkEvent
//!                         ├────►│  coordinator task    ├──────────────► consumer
//!  negotiation task ──┐   │     │  (owns all state)    │
//!  session reader  ───┼───┘     └──────────────────────┘
//!  reconnect timer ───┘   Internal (tagged with epoch / ticket)
//! ```
//!
//! All mutable connection state lives in one coordinator task.  API calls and
//! worker reports arrive over channels and are handled one at a time, so every
//! transition is serialized and every event is emitted from a single place.
//!
//! Each connection attempt gets a new *epoch*.  Reports from a negotiation or
//! session that has since been cancelled carry an old epoch and are dropped,
//! which is how a cancelled read or a negotiation that finished after
//! `disconnect()` is kept from surfacing as an event.
//!
//! Cancellation is forcible: the task holding the in-flight connect future or
//! the read half is aborted, and the write half is closed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use robolink_core::{normalize_line, ConnectionState, DeviceId};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::device_store::DeviceStore;
use crate::application::error::LinkError;
use crate::application::events::LinkEvent;
use crate::application::negotiator::Negotiator;
use crate::application::session::{
    spawn_session, Session, SessionEnd, SessionReport, SessionWriter,
};
use crate::application::transport::{Link, Transport};

/// Default fixed delay before an automatic reconnect.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Runtime parameters for the connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSettings {
    /// Initial value of the auto-reconnect flag.
    pub auto_reconnect: bool,
    /// Delay between an unexpected session end and the reconnect attempt.
    pub reconnect_delay: Duration,
    /// Bytes requested per read in the receive loop.
    pub read_buffer_size: usize,
    /// Channel number used by the last negotiation strategy.
    pub fallback_channel: u8,
    /// Bound of the event channel.
    pub event_capacity: usize,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            auto_reconnect: false,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            read_buffer_size: 1024,
            fallback_channel: 1,
            event_capacity: 128,
        }
    }
}

// ── Messages ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Command {
    Connect(DeviceId),
    Reconnect,
    Disconnect,
    SetAutoReconnect(bool),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug)]
enum Internal {
    Negotiated {
        epoch: u64,
        result: Result<Link, LinkError>,
    },
    SessionLine {
        epoch: u64,
        line: String,
    },
    SessionEnded {
        epoch: u64,
        end: SessionEnd,
    },
    WriteFailed {
        epoch: u64,
        error: LinkError,
    },
    ReconnectDue {
        ticket: u64,
    },
}

/// Writer of the current session, as seen by `write_line`.
struct ActiveWriter {
    epoch: u64,
    writer: SessionWriter,
}

type WriterSlot = Arc<StdMutex<Option<ActiveWriter>>>;

// ── Public handle ─────────────────────────────────────────────────────────────

/// Handle to a running connection manager.
///
/// Every method returns immediately; outcomes are delivered as [`LinkEvent`]s
/// on the receiver returned by [`ConnectionManager::new`].  Dropping the
/// handle shuts the manager down.
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    internal: mpsc::UnboundedSender<Internal>,
    state: watch::Receiver<ConnectionState>,
    auto_reconnect: Arc<AtomicBool>,
    active: WriterSlot,
    coordinator: JoinHandle<()>,
}

impl ConnectionManager {
    /// Starts the coordinator task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn DeviceStore>,
        settings: LinkSettings,
    ) -> (Self, mpsc::Receiver<LinkEvent>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::channel(settings.event_capacity.max(1));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let auto_reconnect = Arc::new(AtomicBool::new(settings.auto_reconnect));
        let active: WriterSlot = Arc::new(StdMutex::new(None));

        let coordinator = Coordinator {
            negotiator: Negotiator::new(transport, store.clone(), settings.fallback_channel),
            store,
            settings,
            auto_reconnect: auto_reconnect.clone(),
            active: active.clone(),
            state: state_tx,
            events: events_tx,
            internal: internal_tx.clone(),
            epoch: 0,
            negotiation: None,
            session: None,
            pending_reconnect: None,
            next_ticket: 0,
        };
        let coordinator = tokio::spawn(coordinator.run(commands_rx, internal_rx));

        let manager = Self {
            commands: commands_tx,
            internal: internal_tx,
            state: state_rx,
            auto_reconnect,
            active,
            coordinator,
        };
        (manager, events_rx)
    }

    /// Cancels any attempt or session and starts negotiating with `device`.
    pub fn connect(&self, device: DeviceId) {
        self.submit(Command::Connect(device));
    }

    /// Connects to the persisted last device.
    ///
    /// Reports [`LinkError::NoLastDevice`] if none is stored.
    pub fn reconnect(&self) {
        self.submit(Command::Reconnect);
    }

    /// Tears down any attempt or session and disables auto-reconnect.
    pub fn disconnect(&self) {
        self.auto_reconnect.store(false, Ordering::SeqCst);
        self.submit(Command::Disconnect);
    }

    pub fn enable_auto_reconnect(&self) {
        self.auto_reconnect.store(true, Ordering::SeqCst);
        self.submit(Command::SetAutoReconnect(true));
    }

    /// Clears the flag and drops any reconnect that is already scheduled.
    pub fn disable_auto_reconnect(&self) {
        self.auto_reconnect.store(false, Ordering::SeqCst);
        self.submit(Command::SetAutoReconnect(false));
    }

    pub fn is_auto_reconnect_enabled(&self) -> bool {
        self.auto_reconnect.load(Ordering::SeqCst)
    }

    /// Snapshot of the current state.  May be stale as soon as it returns.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Sends `text` terminated with CRLF.  Dropped silently unless connected.
    ///
    /// A write failure is reported as a [`LinkEvent::Error`] and leaves the
    /// connection state unchanged.
    pub async fn write_line(&self, text: &str) {
        let target = match self.active.lock() {
            Ok(guard) => guard
                .as_ref()
                .map(|active| (active.epoch, active.writer.clone())),
            Err(_) => None,
        };
        let Some((epoch, writer)) = target else {
            debug!("write_line while not connected; dropping line");
            return;
        };

        let line = normalize_line(text);
        match writer.send(line.as_bytes()).await {
            Ok(()) => debug!("sent {:?}", line),
            // The session was closed between the lookup and the send.
            Err(LinkError::NotConnected) => debug!("session closed before write; dropping line"),
            Err(error) => {
                let _ = self.internal.send(Internal::WriteFailed { epoch, error });
            }
        }
    }

    /// Tears everything down and waits for the coordinator to finish.
    pub async fn shutdown(self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
        let _ = self.coordinator.await;
    }

    fn submit(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("connection manager is no longer running");
        }
    }
}

// ── Coordinator ───────────────────────────────────────────────────────────────

struct PendingReconnect {
    ticket: u64,
    timer: JoinHandle<()>,
}

struct Coordinator {
    negotiator: Negotiator,
    store: Arc<dyn DeviceStore>,
    settings: LinkSettings,
    auto_reconnect: Arc<AtomicBool>,
    active: WriterSlot,
    state: watch::Sender<ConnectionState>,
    events: mpsc::Sender<LinkEvent>,
    internal: mpsc::UnboundedSender<Internal>,
    epoch: u64,
    negotiation: Option<JoinHandle<()>>,
    session: Option<Session>,
    pending_reconnect: Option<PendingReconnect>,
    next_ticket: u64,
}

impl Coordinator {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        debug!("connection manager started");
        loop {
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(Command::Shutdown(done)) => {
                        self.teardown().await;
                        let _ = done.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        self.teardown().await;
                        break;
                    }
                },
                Some(message) = internal.recv() => self.handle_internal(message).await,
            }
        }
        debug!("connection manager stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect(device) => self.begin_connect(device).await,
            Command::Reconnect => self.reconnect_to_last().await,
            // Only the handle writes the auto-reconnect flag.
            Command::Disconnect => {
                self.teardown().await;
                self.epoch += 1;
                info!("disconnected");
                self.set_state(ConnectionState::Idle, "Disconnected").await;
            }
            Command::SetAutoReconnect(enabled) => {
                info!("auto-reconnect {}", if enabled { "enabled" } else { "disabled" });
                if !enabled {
                    self.cancel_pending_reconnect();
                }
            }
            Command::Shutdown(_) => {}
        }
    }

    async fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::Negotiated { epoch, result } => {
                if epoch != self.epoch || self.negotiation.is_none() {
                    debug!("discarding result of a cancelled negotiation");
                    return;
                }
                self.negotiation = None;
                match result {
                    Ok(link) => self.start_session(link).await,
                    Err(error) => {
                        self.emit(LinkEvent::Error(error)).await;
                        self.set_state(ConnectionState::Idle, "Connection failed").await;
                        self.schedule_reconnect();
                    }
                }
            }
            Internal::SessionLine { epoch, line } => {
                if epoch == self.epoch && self.session.is_some() {
                    self.emit(LinkEvent::LineReceived(line)).await;
                }
            }
            Internal::SessionEnded { epoch, end } => {
                if epoch != self.epoch || self.session.is_none() {
                    return;
                }
                self.clear_active_writer();
                if let Some(session) = self.session.take() {
                    session.close().await;
                }
                if let SessionEnd::Failed(e) = end {
                    self.emit(LinkEvent::Error(LinkError::Read(e))).await;
                }
                let detail = if self.auto_reconnect.load(Ordering::SeqCst) {
                    format!(
                        "Connection lost; reconnecting in {} ms",
                        self.settings.reconnect_delay.as_millis()
                    )
                } else {
                    "Connection lost".to_string()
                };
                self.set_state(ConnectionState::Idle, detail).await;
                self.schedule_reconnect();
            }
            Internal::WriteFailed { epoch, error } => {
                if epoch == self.epoch && self.session.is_some() {
                    self.emit(LinkEvent::Error(error)).await;
                }
            }
            Internal::ReconnectDue { ticket } => {
                let due = matches!(&self.pending_reconnect, Some(p) if p.ticket == ticket);
                if !due {
                    return;
                }
                self.pending_reconnect = None;
                if !self.auto_reconnect.load(Ordering::SeqCst) {
                    debug!("auto-reconnect disabled before the delay elapsed");
                    return;
                }
                info!("auto-reconnect firing");
                self.reconnect_to_last().await;
            }
        }
    }

    async fn begin_connect(&mut self, device: DeviceId) {
        self.teardown().await;
        self.epoch += 1;
        let epoch = self.epoch;

        info!("connecting to {device}");
        self.set_state(ConnectionState::Connecting, format!("Connecting to {device}"))
            .await;

        let negotiator = self.negotiator.clone();
        let internal = self.internal.clone();
        self.negotiation = Some(tokio::spawn(async move {
            let result = negotiator.attempt(&device).await;
            let _ = internal.send(Internal::Negotiated { epoch, result });
        }));
    }

    async fn reconnect_to_last(&mut self) {
        match self.store.load_last_device() {
            Ok(Some(device)) => self.begin_connect(device).await,
            Ok(None) => {
                warn!("reconnect requested but no device has been saved");
                self.emit(LinkEvent::Error(LinkError::NoLastDevice)).await;
            }
            Err(e) => {
                warn!("could not read the last device: {e}");
                self.emit(LinkEvent::Error(LinkError::Store(e))).await;
            }
        }
    }

    async fn start_session(&mut self, link: Link) {
        let epoch = self.epoch;
        let internal = self.internal.clone();
        let session = spawn_session(link, self.settings.read_buffer_size, move |report| {
            let message = match report {
                SessionReport::Line(line) => Internal::SessionLine { epoch, line },
                SessionReport::Ended(end) => Internal::SessionEnded { epoch, end },
            };
            let _ = internal.send(message);
        });

        let peer = session.peer.clone();
        if let Ok(mut slot) = self.active.lock() {
            *slot = Some(ActiveWriter {
                epoch,
                writer: session.writer(),
            });
        }
        self.session = Some(session);
        self.set_state(ConnectionState::Connected, format!("Connected to {peer}"))
            .await;
    }

    fn schedule_reconnect(&mut self) {
        if !self.auto_reconnect.load(Ordering::SeqCst) {
            return;
        }
        self.cancel_pending_reconnect();
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        let delay = self.settings.reconnect_delay;
        let internal = self.internal.clone();
        info!("reconnect scheduled in {} ms", delay.as_millis());
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = internal.send(Internal::ReconnectDue { ticket });
        });
        self.pending_reconnect = Some(PendingReconnect { ticket, timer });
    }

    fn cancel_pending_reconnect(&mut self) {
        if let Some(pending) = self.pending_reconnect.take() {
            pending.timer.abort();
            debug!("pending reconnect cancelled");
        }
    }

    fn clear_active_writer(&self) {
        if let Ok(mut slot) = self.active.lock() {
            *slot = None;
        }
    }

    /// Cancels the pending reconnect, the negotiation and the session.
    async fn teardown(&mut self) {
        self.cancel_pending_reconnect();
        if let Some(task) = self.negotiation.take() {
            task.abort();
            debug!("negotiation cancelled");
        }
        self.clear_active_writer();
        if let Some(session) = self.session.take() {
            session.close().await;
        }
    }

    async fn set_state(&mut self, state: ConnectionState, detail: impl Into<String>) {
        self.state.send_replace(state);
        self.emit(LinkEvent::StateChanged {
            state,
            detail: detail.into(),
        })
        .await;
    }

    async fn emit(&self, event: LinkEvent) {
        if self.events.send(event).await.is_err() {
            debug!("event receiver dropped; event discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::device_store::{MockDeviceStore, StoreError};
    use crate::application::error::ErrorKind;
    use crate::application::transport::Strategy;
    use async_trait::async_trait;
    use std::io;

    /// Transport that refuses every strategy.
    struct RefusingTransport;

    #[async_trait]
    impl Transport for RefusingTransport {
        async fn open(&self, _device: &DeviceId, _strategy: Strategy) -> io::Result<Link> {
            Err(io::Error::from(io::ErrorKind::ConnectionRefused))
        }
    }

    async fn next(events: &mut mpsc::Receiver<LinkEvent>) -> LinkEvent {
        tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    #[test]
    fn test_default_settings() {
        let settings = LinkSettings::default();
        assert!(!settings.auto_reconnect);
        assert_eq!(settings.reconnect_delay, Duration::from_secs(3));
        assert_eq!(settings.read_buffer_size, 1024);
        assert_eq!(settings.fallback_channel, 1);
    }

    #[tokio::test]
    async fn test_reconnect_with_store_failure_reports_storage_error() {
        let mut store = MockDeviceStore::new();
        store
            .expect_load_last_device()
            .times(1)
            .returning(|| Err(StoreError::Unavailable));
        let (manager, mut events) = ConnectionManager::new(
            Arc::new(RefusingTransport),
            Arc::new(store),
            LinkSettings::default(),
        );

        manager.reconnect();

        match next(&mut events).await {
            LinkEvent::Error(LinkError::Store(StoreError::Unavailable)) => {}
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(manager.state(), ConnectionState::Idle);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_disconnect_clears_auto_reconnect_flag() {
        let settings = LinkSettings {
            auto_reconnect: true,
            ..LinkSettings::default()
        };
        let (manager, mut events) = ConnectionManager::new(
            Arc::new(RefusingTransport),
            Arc::new(MockDeviceStore::new()),
            settings,
        );
        assert!(manager.is_auto_reconnect_enabled());

        manager.disconnect();

        assert!(!manager.is_auto_reconnect_enabled());
        match next(&mut events).await {
            LinkEvent::StateChanged { state, detail } => {
                assert_eq!(state, ConnectionState::Idle);
                assert_eq!(detail, "Disconnected");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_write_line_when_idle_is_a_no_op() {
        let (manager, mut events) = ConnectionManager::new(
            Arc::new(RefusingTransport),
            Arc::new(MockDeviceStore::new()),
            LinkSettings::default(),
        );

        manager.write_line("go").await;
        manager.shutdown().await;

        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_failed_negotiation_emits_error_then_idle() {
        let mut store = MockDeviceStore::new();
        store.expect_save_last_device().never();
        let (manager, mut events) = ConnectionManager::new(
            Arc::new(RefusingTransport),
            Arc::new(store),
            LinkSettings::default(),
        );

        manager.connect(DeviceId::new("robot").unwrap());

        assert!(matches!(
            next(&mut events).await,
            LinkEvent::StateChanged { state: ConnectionState::Connecting, .. }
        ));
        match next(&mut events).await {
            LinkEvent::Error(e) => assert_eq!(e.kind(), ErrorKind::NegotiationFailure),
            other => panic!("unexpected event: {other:?}"),
        }
        match next(&mut events).await {
            LinkEvent::StateChanged { state, detail } => {
                assert_eq!(state, ConnectionState::Idle);
                assert_eq!(detail, "Connection failed");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        manager.shutdown().await;
    }
}
