//! Session worker: owns one open link from negotiation success to session end.
//!
//! A session is split into two independently failing directions:
//!
//! - **Receive** – a tokio task reads up to `buffer_size` bytes at a time,
//!   feeds them to a fresh [`LineFramer`] and reports every completed line.
//!   It ends on EOF, on a read error, or when the task is aborted.  Aborting
//!   drops the read half, which is how the link is cancelled.
//! - **Send** – a [`SessionWriter`] shared with the connection manager.  Each
//!   call writes the whole buffer and flushes.  A failed write is returned to
//!   the caller and does not stop the receive task.  Closing the writer
//!   abandons a write that is stuck on a device which stopped reading.
//!
//! # Stream framing
//!
//! A single `read()` may return part of a line or several lines at once.  The
//! framer keeps the unterminated tail between reads, so lines are reported in
//! exactly the order their bytes arrived.

use std::fmt;
use std::io;
use std::sync::Arc;

use robolink_core::LineFramer;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::application::error::LinkError;
use crate::application::transport::{BoxedReader, BoxedWriter, Link};

/// Identifier included in every log line of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why the receive loop stopped.
#[derive(Debug)]
pub enum SessionEnd {
    /// The device closed the stream.
    Eof,
    /// A read failed.
    Failed(io::Error),
}

/// What the receive task reports back to its owner.
#[derive(Debug)]
pub enum SessionReport {
    Line(String),
    Ended(SessionEnd),
}

// ── Writer ────────────────────────────────────────────────────────────────────

/// Write half of a session, closable exactly once.
///
/// Clones share the same underlying half.  After [`close`](Self::close) every
/// clone reports [`LinkError::NotConnected`] on send, including a send that
/// was still in progress when `close` was called.
#[derive(Clone)]
pub struct SessionWriter {
    inner: Arc<Mutex<Option<BoxedWriter>>>,
    closed: Arc<watch::Sender<bool>>,
}

impl SessionWriter {
    pub fn new(writer: BoxedWriter) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(writer))),
            closed: Arc::new(watch::Sender::new(false)),
        }
    }

    /// Writes all of `bytes` and flushes.
    ///
    /// # Errors
    ///
    /// [`LinkError::NotConnected`] if the writer was closed before or during
    /// the send, [`LinkError::Write`] if the transport rejected the write or
    /// flush.
    pub async fn send(&self, bytes: &[u8]) -> Result<(), LinkError> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(LinkError::NotConnected);
        }

        tokio::select! {
            biased;
            () = async {
                let _ = closed.wait_for(|closed| *closed).await;
            } => Err(LinkError::NotConnected),
            result = async {
                let mut guard = self.inner.lock().await;
                let writer = guard.as_mut().ok_or(LinkError::NotConnected)?;
                writer.write_all(bytes).await.map_err(LinkError::Write)?;
                writer.flush().await.map_err(LinkError::Write)?;
                Ok::<(), LinkError>(())
            } => result,
        }
    }

    /// Shuts the write half down.  Later calls are no-ops.
    ///
    /// Never waits for an in-flight send: that send is abandoned first.
    pub async fn close(&self) {
        if self.closed.send_replace(true) {
            return;
        }
        let taken = self.inner.lock().await.take();
        if let Some(mut writer) = taken {
            if let Err(e) = writer.shutdown().await {
                debug!("error while closing link writer (ignored): {e}");
            }
        }
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

impl fmt::Debug for SessionWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionWriter").finish_non_exhaustive()
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// A live session: the receive task plus the shared writer.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub peer: String,
    reader_task: JoinHandle<()>,
    writer: SessionWriter,
}

impl Session {
    /// Handle for sending on this session.
    pub fn writer(&self) -> SessionWriter {
        self.writer.clone()
    }

    /// Cancels the receive task and closes the writer.
    ///
    /// No report is delivered for a cancelled session.
    pub async fn close(self) {
        self.reader_task.abort();
        self.writer.close().await;
        debug!("session {}: closed", self.id);
    }
}

/// Starts the receive task for `link` and returns the live session.
///
/// `report` is called from the receive task for each completed line and once
/// more when the loop ends on its own.
pub fn spawn_session<F>(link: Link, buffer_size: usize, report: F) -> Session
where
    F: Fn(SessionReport) + Send + 'static,
{
    let id = SessionId::new();
    let Link {
        peer,
        reader,
        writer,
    } = link;
    info!("session {id}: started with {peer}");

    let reader_task = tokio::spawn(receive_loop(id, reader, buffer_size.max(1), report));

    Session {
        id,
        peer,
        reader_task,
        writer: SessionWriter::new(writer),
    }
}

async fn receive_loop<F>(id: SessionId, mut reader: BoxedReader, buffer_size: usize, report: F)
where
    F: Fn(SessionReport),
{
    let mut framer = LineFramer::new();
    let mut buf = vec![0u8; buffer_size];

    let end = loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("session {id}: link closed by device (EOF)");
                break SessionEnd::Eof;
            }
            Ok(n) => {
                trace!("session {id}: read {n} bytes");
                for line in framer.feed(&buf[..n]) {
                    report(SessionReport::Line(line));
                }
            }
            Err(e) => {
                warn!("session {id}: read failed: {e}");
                break SessionEnd::Failed(e);
            }
        }
    };

    report(SessionReport::Ended(end));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    /// Collects reports and returns them once the session ends.
    fn collector() -> (
        impl Fn(SessionReport) + Send + 'static,
        Arc<StdMutex<Vec<SessionReport>>>,
    ) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        (move |r| sink.lock().unwrap().push(r), seen)
    }

    async fn wait_for_end(seen: &Arc<StdMutex<Vec<SessionReport>>>) {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if seen
                    .lock()
                    .unwrap()
                    .iter()
                    .any(|r| matches!(r, SessionReport::Ended(_)))
                {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("session did not end");
    }

    fn lines(seen: &[SessionReport]) -> Vec<String> {
        seen.iter()
            .filter_map(|r| match r {
                SessionReport::Line(l) => Some(l.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_receive_loop_reports_lines_across_reads_then_eof() {
        // Arrange
        let reader = tokio_test::io::Builder::new()
            .read(b"AB\r")
            .read(b"\nCD\n\nE")
            .read(b"F\n")
            .build();
        let link = Link::new("robot", Box::new(reader), Box::new(tokio::io::sink()));
        let (report, seen) = collector();

        // Act
        let _session = spawn_session(link, 1024, report);
        wait_for_end(&seen).await;

        // Assert
        let seen = seen.lock().unwrap();
        assert_eq!(lines(&seen), vec!["AB", "CD", "EF"]);
        assert!(matches!(
            seen.last(),
            Some(SessionReport::Ended(SessionEnd::Eof))
        ));
    }

    #[tokio::test]
    async fn test_receive_loop_reports_read_failure() {
        let reader = tokio_test::io::Builder::new()
            .read(b"hello\n")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let link = Link::new("robot", Box::new(reader), Box::new(tokio::io::sink()));
        let (report, seen) = collector();

        let _session = spawn_session(link, 8, report);
        wait_for_end(&seen).await;

        let seen = seen.lock().unwrap();
        assert_eq!(lines(&seen), vec!["hello"]);
        match seen.last() {
            Some(SessionReport::Ended(SessionEnd::Failed(e))) => {
                assert_eq!(e.kind(), io::ErrorKind::ConnectionReset)
            }
            other => panic!("unexpected final report: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unterminated_tail_is_not_reported_on_eof() {
        let reader = tokio_test::io::Builder::new().read(b"partial").build();
        let link = Link::new("robot", Box::new(reader), Box::new(tokio::io::sink()));
        let (report, seen) = collector();

        let _session = spawn_session(link, 64, report);
        wait_for_end(&seen).await;

        assert!(lines(&seen.lock().unwrap()).is_empty());
    }

    #[tokio::test]
    async fn test_writer_sends_exact_bytes() {
        let writer = tokio_test::io::Builder::new().write(b"go\r\n").build();
        let writer = SessionWriter::new(Box::new(writer));

        writer.send(b"go\r\n").await.unwrap();
    }

    #[tokio::test]
    async fn test_writer_close_is_idempotent() {
        let (near, _far) = tokio::io::duplex(16);
        let (_, write_half) = tokio::io::split(near);
        let writer = SessionWriter::new(Box::new(write_half));

        writer.close().await;
        writer.close().await;

        assert!(writer.is_closed());
        assert!(matches!(
            writer.send(b"x").await,
            Err(LinkError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_writer_failure_is_a_write_error() {
        let writer = tokio_test::io::Builder::new()
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "pipe"))
            .build();
        let writer = SessionWriter::new(Box::new(writer));

        let err = writer.send(b"go\r\n").await.unwrap_err();

        assert!(matches!(err, LinkError::Write(_)));
    }

    #[tokio::test]
    async fn test_close_abandons_write_blocked_on_full_pipe() {
        // Arrange: the device end never reads, so a large write fills the pipe.
        let (near, _far) = tokio::io::duplex(64);
        let (_, write_half) = tokio::io::split(near);
        let writer = SessionWriter::new(Box::new(write_half));
        let blocked = tokio::spawn({
            let writer = writer.clone();
            async move { writer.send(&[b'x'; 64 * 1024]).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished(), "write should be stuck on the full pipe");

        // Act
        tokio::time::timeout(Duration::from_secs(2), writer.close())
            .await
            .expect("close waited for the blocked write");

        // Assert
        let result = tokio::time::timeout(Duration::from_secs(2), blocked)
            .await
            .expect("blocked write never returned")
            .unwrap();
        assert!(matches!(result, Err(LinkError::NotConnected)));
        assert!(writer.is_closed());
    }

    #[tokio::test]
    async fn test_session_close_cancels_without_report_and_device_sees_eof() {
        // Arrange: the device never sends anything, so the read blocks.
        let (near, mut far) = tokio::io::duplex(64);
        let link = Link::from_stream("robot", near);
        let (report, seen) = collector();
        let session = spawn_session(link, 64, report);

        // Act
        session.close().await;

        // Assert: the device end observes the link going away.
        let mut buf = [0u8; 8];
        let n = tokio::time::timeout(Duration::from_secs(2), far.read(&mut buf))
            .await
            .expect("device end still open")
            .unwrap_or(0);
        assert_eq!(n, 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(seen.lock().unwrap().is_empty());
    }
}
