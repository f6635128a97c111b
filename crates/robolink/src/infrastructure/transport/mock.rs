//! Scripted in-memory transport for tests.
//!
//! `ScriptedTransport` replaces the network with [`tokio::io::duplex`] pipes.
//! Each call to `open` consumes the next scripted [`Outcome`]; when the script
//! is empty the default outcome applies.  Every attempt is recorded so tests
//! can assert on the exact strategy order.
//!
//! When an attempt is accepted, the device-side end of the pipe is handed to
//! the test through [`ScriptedTransport::next_peer`], so the test can play the
//! robot: write lines to it, read what the host sent, or drop it to simulate
//! the device going away.
//!
//! ```ignore
//! let transport = Arc::new(ScriptedTransport::accepting());
//! let (manager, mut events) = ConnectionManager::new(transport.clone(), store, settings);
//! manager.connect(DeviceId::new("robot")?);
//! let mut peer = transport.next_peer().await.unwrap();
//! peer.stream.write_all(b"ROBOT,1,2,N\n").await?;
//! ```

use std::collections::VecDeque;
use std::io;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use robolink_core::DeviceId;
use tokio::io::DuplexStream;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::application::transport::{Link, Strategy, Transport};

/// Pipe capacity of each accepted link.
const PIPE_CAPACITY: usize = 4096;

/// What a single `open` call does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Succeeds immediately.
    Accept,
    /// Fails immediately with the given error kind.
    Refuse(io::ErrorKind),
    /// Never completes until the attempt is cancelled.
    Hang,
    /// Succeeds after the delay.
    AcceptAfter(Duration),
}

/// The device end of an accepted link.
#[derive(Debug)]
pub struct DevicePeer {
    pub device: DeviceId,
    pub strategy: Strategy,
    pub stream: DuplexStream,
}

/// A [`Transport`] driven by a script of outcomes.
#[derive(Debug)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Outcome>>,
    fallback: Outcome,
    attempts: Mutex<Vec<(DeviceId, Strategy)>>,
    peers_tx: mpsc::UnboundedSender<DevicePeer>,
    peers_rx: AsyncMutex<mpsc::UnboundedReceiver<DevicePeer>>,
}

impl ScriptedTransport {
    /// Refuses every attempt that is not scripted.
    pub fn new() -> Self {
        Self::with_default(Outcome::Refuse(io::ErrorKind::ConnectionRefused))
    }

    /// Accepts every attempt that is not scripted.
    pub fn accepting() -> Self {
        Self::with_default(Outcome::Accept)
    }

    pub fn with_default(fallback: Outcome) -> Self {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            attempts: Mutex::new(Vec::new()),
            peers_tx,
            peers_rx: AsyncMutex::new(peers_rx),
        }
    }

    /// Appends one outcome to the script.
    pub fn push(&self, outcome: Outcome) -> &Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(outcome);
        }
        self
    }

    /// Every `(device, strategy)` attempted so far, in order.
    pub fn attempts(&self) -> Vec<(DeviceId, Strategy)> {
        self.attempts
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().map(|a| a.len()).unwrap_or_default()
    }

    /// Waits for the device end of the next accepted link.
    pub async fn next_peer(&self) -> Option<DevicePeer> {
        self.peers_rx.lock().await.recv().await
    }

    /// Returns the device end of an already accepted link, if any.
    pub fn try_next_peer(&self) -> Option<DevicePeer> {
        self.peers_rx.try_lock().ok()?.try_recv().ok()
    }

    fn next_outcome(&self) -> Outcome {
        self.script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or(self.fallback)
    }

    fn accept(&self, device: &DeviceId, strategy: Strategy) -> Link {
        let (host_end, device_end) = tokio::io::duplex(PIPE_CAPACITY);
        let _ = self.peers_tx.send(DevicePeer {
            device: device.clone(),
            strategy,
            stream: device_end,
        });
        Link::from_stream(device.to_string(), host_end)
    }
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, device: &DeviceId, strategy: Strategy) -> io::Result<Link> {
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.push((device.clone(), strategy));
        }

        match self.next_outcome() {
            Outcome::Accept => Ok(self.accept(device, strategy)),
            Outcome::Refuse(kind) => Err(io::Error::new(kind, format!("{strategy} refused"))),
            Outcome::Hang => std::future::pending::<io::Result<Link>>().await,
            Outcome::AcceptAfter(delay) => {
                tokio::time::sleep(delay).await;
                Ok(self.accept(device, strategy))
            }
        }
    }
}
