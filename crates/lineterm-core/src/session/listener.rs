//! Listener events

use tokio::sync::mpsc;

use crate::buffer::RenderedText;

/// Everything a session reports to its host, in occurrence order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Link opened
    Connected,
    /// Link could not be opened; the session is disconnected again
    ConnectError(String),
    /// Display update for received data
    Received(RenderedText),
    /// Display form of a payload that was just sent
    Sent(String),
    /// Link failed; always followed by `Disconnected`
    IoError(String),
    /// Link released
    Disconnected,
}

/// Render sink attached to a session
///
/// Called with the session lock held: do not call back into the session
/// from here. Use [`ChannelListener`] when the host needs to react.
pub trait Listener: Send {
    /// Receive one event
    fn on_event(&mut self, event: SessionEvent);
}

impl<F> Listener for F
where
    F: FnMut(SessionEvent) + Send,
{
    fn on_event(&mut self, event: SessionEvent) {
        self(event)
    }
}

/// Listener that forwards events to an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelListener {
    /// Create the listener and the receiving end of its channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Listener for ChannelListener {
    fn on_event(&mut self, event: SessionEvent) {
        // A host that dropped its receiver no longer renders anything
        let _ = self.tx.send(event);
    }
}
