//! Byte-stream transports
//!
//! The session talks to the outside world through two traits: a
//! [`Connector`] that starts opening an endpoint and hands back a
//! [`Transport`] handle, and the [`EventSink`] through which the transport
//! reports the open outcome, inbound fragments and failures.
//!
//! Every event is tagged with the [`LinkId`] of the link that produced it,
//! so events from a link the session has already released can be told
//! apart and dropped.

mod error;
pub mod serial;
mod stream;
pub mod tcp;

use std::fmt;
use tokio::sync::mpsc;
use tracing::trace;

pub use error::TransportError;
pub use serial::SerialConnector;
pub use stream::StreamTransport;
pub use tcp::TcpConnector;

/// Identifier of one connect attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(u64);

impl LinkId {
    /// Wrap a raw id
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw id value
    pub fn get(&self) -> u64 {
        self.0
    }

    /// The id following this one
    pub fn next(&self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// Notification from a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Endpoint opened, link usable
    Opened,
    /// Endpoint could not be opened
    OpenFailed(String),
    /// One read worth of bytes
    Received(Vec<u8>),
    /// Several reads delivered together, in order
    ReceivedBatch(Vec<Vec<u8>>),
    /// Read or write failure, or the peer went away
    IoError(String),
}

/// A transport notification tagged with its link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEvent {
    /// Link that produced the event
    pub link: LinkId,
    /// What happened
    pub event: TransportEvent,
}

/// Reporting handle given to a transport when it is opened
///
/// Sends return `false` once the receiving side is gone, which tells the
/// transport nobody is listening any more.
#[derive(Debug, Clone)]
pub struct EventSink {
    link: LinkId,
    tx: mpsc::UnboundedSender<LinkEvent>,
}

impl EventSink {
    /// Sink reporting for `link` into `tx`
    pub fn new(link: LinkId, tx: mpsc::UnboundedSender<LinkEvent>) -> Self {
        Self { link, tx }
    }

    /// Link this sink reports for
    pub fn link(&self) -> LinkId {
        self.link
    }

    fn emit(&self, event: TransportEvent) -> bool {
        let delivered = self
            .tx
            .send(LinkEvent {
                link: self.link,
                event,
            })
            .is_ok();
        if !delivered {
            trace!(link = %self.link, "event receiver gone");
        }
        delivered
    }

    /// Report that the endpoint is open
    pub fn opened(&self) -> bool {
        self.emit(TransportEvent::Opened)
    }

    /// Report that the endpoint could not be opened
    pub fn open_failed(&self, reason: impl Into<String>) -> bool {
        self.emit(TransportEvent::OpenFailed(reason.into()))
    }

    /// Report one inbound fragment
    pub fn received(&self, chunk: Vec<u8>) -> bool {
        self.emit(TransportEvent::Received(chunk))
    }

    /// Report several inbound fragments at once
    pub fn received_batch(&self, chunks: Vec<Vec<u8>>) -> bool {
        self.emit(TransportEvent::ReceivedBatch(chunks))
    }

    /// Report a fatal read or write failure
    pub fn io_error(&self, reason: impl Into<String>) -> bool {
        self.emit(TransportEvent::IoError(reason.into()))
    }
}

/// An open (or opening) link owned by the session
pub trait Transport: Send {
    /// Queue one payload for writing
    ///
    /// The payload is written as a unit, never interleaved with other
    /// writes. Failures after queueing are reported through the sink.
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Release the link. Writes already queued are still delivered; no
    /// further events are expected afterwards, and any that still arrive
    /// are stale.
    fn close(&mut self);
}

/// Factory for transports
pub trait Connector: Send {
    /// Start opening `endpoint`
    ///
    /// Must return promptly. The outcome is reported through `sink` as
    /// [`TransportEvent::Opened`] or [`TransportEvent::OpenFailed`]; an `Err`
    /// here means the attempt could not even be started.
    fn open(&mut self, endpoint: &str, sink: EventSink) -> Result<Box<dyn Transport>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_id_sequence() {
        let first = LinkId::new(1);
        assert_eq!(first.next().get(), 2);
        assert_eq!(LinkId::new(u64::MAX).next().get(), 0);
        assert_eq!(first.to_string(), "link#1");
    }

    #[test]
    fn test_sink_tags_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(LinkId::new(7), tx);

        assert!(sink.opened());
        assert!(sink.received(b"abc".to_vec()));
        assert!(sink.io_error("gone"));

        let events: Vec<LinkEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.link == LinkId::new(7)));
        assert_eq!(events[1].event, TransportEvent::Received(b"abc".to_vec()));
        assert_eq!(events[2].event, TransportEvent::IoError("gone".to_string()));
    }

    #[test]
    fn test_sink_reports_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(LinkId::new(1), tx);
        drop(rx);
        assert!(!sink.opened());
    }
}
