//! Transport negotiation: try an ordered list of strategies until one opens.
//!
//! ```text
//! 1. secure service     --fail-->
//! 2. insecure service   --fail-->
//! 3. raw channel N      --fail--> NegotiationFailure (cause of attempt 3)
//!        |
//!     success: persist device as last used, return the link
//! ```
//!
//! Each attempt is awaited with no extra timeout.  Cancelling the negotiation
//! means dropping the future returned by [`Negotiator::attempt`], which drops
//! whatever connection was in progress.

use std::io;
use std::sync::Arc;

use robolink_core::DeviceId;
use tracing::{debug, info, warn};

use crate::application::device_store::DeviceStore;
use crate::application::error::LinkError;
use crate::application::transport::{Link, Strategy, Transport};

/// Runs the fixed strategy sequence against one device.
#[derive(Clone)]
pub struct Negotiator {
    transport: Arc<dyn Transport>,
    store: Arc<dyn DeviceStore>,
    strategies: [Strategy; 3],
}

impl Negotiator {
    /// Creates a negotiator whose last strategy uses `fallback_channel`.
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn DeviceStore>,
        fallback_channel: u8,
    ) -> Self {
        Self {
            transport,
            store,
            strategies: Strategy::ordered(fallback_channel),
        }
    }

    /// The strategies in the order they are attempted.
    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    /// Tries each strategy in turn and returns the first link that opens.
    ///
    /// On success the device is saved as the last used device.  A failure to
    /// save is logged and does not fail the negotiation.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Negotiation`] carrying the last attempt's cause
    /// when every strategy fails.
    pub async fn attempt(&self, device: &DeviceId) -> Result<Link, LinkError> {
        let mut last_error = io::Error::new(io::ErrorKind::NotFound, "no strategy attempted");

        for strategy in self.strategies {
            debug!("attempting {strategy} connection to {device}");
            match self.transport.open(device, strategy).await {
                Ok(link) => {
                    info!("connected to {device} using {strategy}");
                    if let Err(e) = self.store.save_last_device(device) {
                        warn!("could not persist last device {device}: {e}");
                    }
                    return Ok(link);
                }
                Err(e) => {
                    warn!("{strategy} connection to {device} failed: {e}");
                    last_error = e;
                }
            }
        }

        Err(LinkError::Negotiation {
            device: device.clone(),
            source: last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::device_store::{MemoryDeviceStore, MockDeviceStore, StoreError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Transport that refuses every strategy except the ones listed.
    struct SelectiveTransport {
        accept: Vec<Strategy>,
        attempts: Mutex<Vec<Strategy>>,
    }

    impl SelectiveTransport {
        fn accepting(accept: Vec<Strategy>) -> Arc<Self> {
            Arc::new(Self {
                accept,
                attempts: Mutex::new(Vec::new()),
            })
        }

        fn attempts(&self) -> Vec<Strategy> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for SelectiveTransport {
        async fn open(&self, _device: &DeviceId, strategy: Strategy) -> io::Result<Link> {
            self.attempts.lock().unwrap().push(strategy);
            if self.accept.contains(&strategy) {
                let (near, _far) = tokio::io::duplex(16);
                Ok(Link::from_stream("robot", near))
            } else {
                Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    format!("{strategy} refused"),
                ))
            }
        }
    }

    fn device() -> DeviceId {
        DeviceId::new("98:D3:31:F5:12:7A").unwrap()
    }

    #[tokio::test]
    async fn test_attempt_stops_at_first_success() {
        let transport = SelectiveTransport::accepting(vec![Strategy::SecureService]);
        let store = Arc::new(MemoryDeviceStore::new());
        let negotiator = Negotiator::new(transport.clone(), store.clone(), 1);

        let link = negotiator.attempt(&device()).await;

        assert!(link.is_ok());
        assert_eq!(transport.attempts(), vec![Strategy::SecureService]);
        assert_eq!(store.load_last_device().unwrap(), Some(device()));
    }

    #[tokio::test]
    async fn test_attempt_falls_back_to_raw_channel() {
        let transport = SelectiveTransport::accepting(vec![Strategy::RawChannel(1)]);
        let store = Arc::new(MemoryDeviceStore::new());
        let negotiator = Negotiator::new(transport.clone(), store, 1);

        assert!(negotiator.attempt(&device()).await.is_ok());
        assert_eq!(
            transport.attempts(),
            vec![
                Strategy::SecureService,
                Strategy::InsecureService,
                Strategy::RawChannel(1)
            ]
        );
    }

    #[tokio::test]
    async fn test_attempt_exhausted_reports_last_cause_and_does_not_persist() {
        let transport = SelectiveTransport::accepting(vec![]);
        let store = Arc::new(MemoryDeviceStore::new());
        let negotiator = Negotiator::new(transport, store.clone(), 7);

        let err = negotiator.attempt(&device()).await.unwrap_err();

        match err {
            LinkError::Negotiation { device: d, source } => {
                assert_eq!(d, device());
                assert_eq!(source.to_string(), "raw channel 7 refused");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.load_last_device().unwrap(), None);
    }

    #[tokio::test]
    async fn test_attempt_succeeds_even_when_store_write_fails() {
        let transport = SelectiveTransport::accepting(vec![Strategy::InsecureService]);
        let mut store = MockDeviceStore::new();
        store
            .expect_save_last_device()
            .times(1)
            .returning(|_| Err(StoreError::Unavailable));
        let negotiator = Negotiator::new(transport, Arc::new(store), 1);

        assert!(negotiator.attempt(&device()).await.is_ok());
    }
}
