//! Event sink contract.
//!
//! The connection manager reports three kinds of notification: state changes,
//! received lines, and errors.  All of them are emitted by the single
//! coordinator task, so consumers see one ordered sequence and never a line
//! from a previous session after the state change that ended it.
//!
//! Consumers either read [`LinkEvent`]s straight from the channel returned by
//! [`ConnectionManager::new`](crate::application::connection_manager::ConnectionManager::new),
//! or implement [`EventSink`] and run [`forward_events`].

use robolink_core::ConnectionState;
use tokio::sync::mpsc;

use crate::application::error::LinkError;

#[cfg(test)]
use mockall::automock;

/// Notifications emitted by the connection manager.
#[derive(Debug)]
pub enum LinkEvent {
    /// The connection state changed.  `detail` is human-readable.
    StateChanged {
        state: ConnectionState,
        detail: String,
    },
    /// A decoded, trimmed, non-empty line from the device.
    LineReceived(String),
    /// A failure, with its cause chain available through `source()`.
    Error(LinkError),
}

impl LinkEvent {
    /// Delivers this event to the matching callback on `sink`.
    pub fn dispatch(&self, sink: &mut dyn EventSink) {
        match self {
            Self::StateChanged { state, detail } => sink.on_state_changed(*state, detail),
            Self::LineReceived(line) => sink.on_line_received(line),
            Self::Error(err) => sink.on_error(err),
        }
    }
}

/// Listener-style consumer of link events.
#[cfg_attr(test, automock)]
pub trait EventSink: Send {
    fn on_state_changed(&mut self, state: ConnectionState, detail: &str);
    fn on_line_received(&mut self, line: &str);
    fn on_error(&mut self, error: &LinkError);
}

/// Pumps every event from `events` into `sink` until the channel closes.
pub async fn forward_events<S>(mut events: mpsc::Receiver<LinkEvent>, mut sink: S) -> S
where
    S: EventSink,
{
    while let Some(event) = events.recv().await {
        event.dispatch(&mut sink);
    }
    sink
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use mockall::Sequence;

    #[test]
    fn test_dispatch_routes_each_variant() {
        let mut sink = MockEventSink::new();
        let mut seq = Sequence::new();
        sink.expect_on_state_changed()
            .with(eq(ConnectionState::Connected), eq("Connected to robot"))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        sink.expect_on_line_received()
            .with(eq("AB"))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        sink.expect_on_error()
            .withf(|e| matches!(e, LinkError::NoLastDevice))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());

        LinkEvent::StateChanged {
            state: ConnectionState::Connected,
            detail: "Connected to robot".into(),
        }
        .dispatch(&mut sink);
        LinkEvent::LineReceived("AB".into()).dispatch(&mut sink);
        LinkEvent::Error(LinkError::NoLastDevice).dispatch(&mut sink);
    }

    #[tokio::test]
    async fn test_forward_events_drains_until_channel_closes() {
        let (tx, rx) = mpsc::channel(8);
        let mut sink = MockEventSink::new();
        sink.expect_on_line_received().times(2).return_const(());

        tx.send(LinkEvent::LineReceived("one".into())).await.unwrap();
        tx.send(LinkEvent::LineReceived("two".into())).await.unwrap();
        drop(tx);

        let mut sink = forward_events(rx, sink).await;
        sink.checkpoint();
    }
}
