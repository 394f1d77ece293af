//! Connection management
//!
//! Handles the link lifecycle, outbound encoding and dispatch of inbound
//! fragments to the line buffer.

use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::{ConnectionState, Listener, SessionError, SessionEvent};
use crate::buffer::LineBuffer;
use crate::codec::{encode_payload, to_hex, Newline, RenderMode};
use crate::config::SessionConfig;
use crate::transport::{Connector, EventSink, LinkEvent, LinkId, Transport, TransportEvent};

/// The link and its transport handle; the handle exists exactly while a
/// link is connecting or connected
enum Link {
    Idle,
    Connecting {
        id: LinkId,
        endpoint: String,
        transport: Box<dyn Transport>,
    },
    Connected {
        id: LinkId,
        endpoint: String,
        transport: Box<dyn Transport>,
    },
}

impl Link {
    fn state(&self) -> ConnectionState {
        match self {
            Link::Idle => ConnectionState::Disconnected,
            Link::Connecting { .. } => ConnectionState::Connecting,
            Link::Connected { .. } => ConnectionState::Connected,
        }
    }

    fn id(&self) -> Option<LinkId> {
        match self {
            Link::Idle => None,
            Link::Connecting { id, .. } | Link::Connected { id, .. } => Some(*id),
        }
    }

    fn endpoint(&self) -> Option<&str> {
        match self {
            Link::Idle => None,
            Link::Connecting { endpoint, .. } | Link::Connected { endpoint, .. } => {
                Some(endpoint.as_str())
            }
        }
    }

    fn connected_transport(&mut self) -> Option<&mut Box<dyn Transport>> {
        match self {
            Link::Connected { transport, .. } => Some(transport),
            _ => None,
        }
    }
}

struct Inner {
    connector: Box<dyn Connector>,
    link: Link,
    next_link: LinkId,
    buffer: LineBuffer,
    newline: Newline,
    echo: bool,
    listener: Option<Box<dyn Listener>>,
}

impl Inner {
    fn notify(&mut self, event: SessionEvent) {
        match self.listener.as_mut() {
            Some(listener) => listener.on_event(event),
            None => trace!(?event, "no listener attached, event dropped"),
        }
    }

    fn connect(
        &mut self,
        endpoint: &str,
        events: &mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<(), SessionError> {
        let state = self.link.state();
        if !state.can_connect() {
            warn!(%state, endpoint, "connect refused");
            return Err(SessionError::InvalidState {
                operation: "connect",
                state,
            });
        }

        let id = self.next_link;
        self.next_link = id.next();
        self.buffer.discard_pending();

        info!(link = %id, endpoint, "connecting");
        match self.connector.open(endpoint, EventSink::new(id, events.clone())) {
            Ok(transport) => {
                self.link = Link::Connecting {
                    id,
                    endpoint: endpoint.to_string(),
                    transport,
                };
            }
            Err(e) => {
                warn!(link = %id, error = %e, "connect failed to start");
                self.notify(SessionEvent::ConnectError(e.to_string()));
            }
        }
        Ok(())
    }

    /// Close and drop the transport; returns the released link's id
    fn release(&mut self) -> Option<LinkId> {
        match mem::replace(&mut self.link, Link::Idle) {
            Link::Idle => None,
            Link::Connecting { id, mut transport, .. } | Link::Connected { id, mut transport, .. } => {
                transport.close();
                Some(id)
            }
        }
    }

    fn disconnect(&mut self) {
        if let Some(id) = self.release() {
            info!(link = %id, "disconnected");
            self.notify(SessionEvent::Disconnected);
        }
    }

    fn fail_io(&mut self, reason: String) {
        if !self.link.state().is_active() {
            return;
        }
        warn!(link = ?self.link.id(), %reason, "connection lost");
        self.notify(SessionEvent::IoError(reason));
        self.release();
        self.notify(SessionEvent::Disconnected);
    }

    fn send(&mut self, payload: &str) -> Result<(), SessionError> {
        if !self.link.state().can_send() {
            return Err(SessionError::NotConnected);
        }

        let mode = self.buffer.mode();
        let data = encode_payload(payload, mode, self.newline)?;
        if self.echo {
            let echo = match mode {
                RenderMode::Text => payload.to_string(),
                RenderMode::Hex => to_hex(&data),
            };
            self.notify(SessionEvent::Sent(echo));
        }

        let written = match self.link.connected_transport() {
            Some(transport) => transport.write(&data),
            None => return Err(SessionError::NotConnected),
        };
        match written {
            Ok(()) => debug!(bytes = data.len(), "payload queued"),
            Err(e) => self.fail_io(e.to_string()),
        }
        Ok(())
    }

    fn handle_event(&mut self, event: LinkEvent) {
        if self.link.id() != Some(event.link) {
            debug!(link = %event.link, "stale transport event ignored");
            return;
        }

        match event.event {
            TransportEvent::Opened => {
                self.link = match mem::replace(&mut self.link, Link::Idle) {
                    Link::Connecting {
                        id,
                        endpoint,
                        transport,
                    } => {
                        info!(link = %id, %endpoint, "connected");
                        Link::Connected {
                            id,
                            endpoint,
                            transport,
                        }
                    }
                    other => {
                        warn!(link = %event.link, "duplicate open notification");
                        other
                    }
                };
                if self.link.state() == ConnectionState::Connected {
                    self.notify(SessionEvent::Connected);
                }
            }
            TransportEvent::OpenFailed(reason) => {
                if self.link.state() != ConnectionState::Connecting {
                    warn!(link = %event.link, %reason, "open failure after open, ignored");
                    return;
                }
                warn!(link = %event.link, %reason, "connection failed");
                self.release();
                self.notify(SessionEvent::ConnectError(reason));
            }
            TransportEvent::Received(chunk) => {
                if let Some(update) = self.buffer.process(&chunk) {
                    self.notify(SessionEvent::Received(update));
                }
            }
            TransportEvent::ReceivedBatch(chunks) => {
                if let Some(update) = self.buffer.process_batch(chunks.iter().map(Vec::as_slice)) {
                    self.notify(SessionEvent::Received(update));
                }
            }
            TransportEvent::IoError(reason) => self.fail_io(reason),
        }
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Session control surface
///
/// Cheap to clone; all clones drive the same session. Every operation and
/// every applied transport event runs under one lock, so state changes
/// never overlap and each sent payload reaches the transport whole.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Mutex<Inner>>,
    events: mpsc::UnboundedSender<LinkEvent>,
}

impl ConnectionManager {
    /// Create a disconnected session and the pump that feeds it transport
    /// events
    ///
    /// The pump must be driven ([`EventPump::run`] or [`EventPump::drain`])
    /// for connects to complete and data to arrive.
    pub fn new(connector: impl Connector + 'static, config: SessionConfig) -> (Self, EventPump) {
        let inner = Arc::new(Mutex::new(Inner {
            connector: Box::new(connector),
            link: Link::Idle,
            next_link: LinkId::new(1),
            buffer: LineBuffer::new(config.render_mode, config.newline)
                .with_max_rendered(config.max_rendered),
            newline: config.newline,
            echo: config.echo,
            listener: None,
        }));
        let (events, rx) = mpsc::unbounded_channel();
        let pump = EventPump {
            inner: Arc::clone(&inner),
            events: rx,
        };
        (Self { inner, events }, pump)
    }

    /// Start connecting to `endpoint`
    ///
    /// Returns once the transport has been asked to open; the outcome
    /// arrives as `Connected` or `ConnectError`.
    pub fn connect(&self, endpoint: &str) -> Result<(), SessionError> {
        lock(&self.inner).connect(endpoint, &self.events)
    }

    /// Release the link. Does nothing when already disconnected.
    pub fn disconnect(&self) {
        lock(&self.inner).disconnect();
    }

    /// Encode `payload` in the current render mode, append the newline and
    /// hand it to the transport
    pub fn send(&self, payload: &str) -> Result<(), SessionError> {
        lock(&self.inner).send(payload)
    }

    /// Apply one transport event directly
    ///
    /// For hosts that serialize transport events themselves instead of
    /// driving an [`EventPump`].
    pub fn handle_event(&self, event: LinkEvent) {
        lock(&self.inner).handle_event(event);
    }

    /// Attach a listener, replacing any previous one
    pub fn attach(&self, listener: impl Listener + 'static) {
        lock(&self.inner).listener = Some(Box::new(listener));
    }

    /// Detach the listener; received data is still processed
    pub fn detach(&self) {
        lock(&self.inner).listener = None;
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        lock(&self.inner).link.state()
    }

    /// Endpoint of the current link
    pub fn endpoint(&self) -> Option<String> {
        lock(&self.inner).link.endpoint().map(str::to_string)
    }

    /// Id of the current link
    pub fn link_id(&self) -> Option<LinkId> {
        lock(&self.inner).link.id()
    }

    /// Current render mode
    pub fn render_mode(&self) -> RenderMode {
        lock(&self.inner).buffer.mode()
    }

    /// Switch render mode; text already delivered is left alone
    pub fn set_render_mode(&self, mode: RenderMode) {
        info!(?mode, "render mode changed");
        lock(&self.inner).buffer.set_mode(mode);
    }

    /// Terminator appended to sent payloads
    pub fn newline(&self) -> Newline {
        lock(&self.inner).newline
    }

    /// Change the terminator for sending and receiving
    pub fn set_newline(&self, newline: Newline) {
        let mut inner = lock(&self.inner);
        inner.newline = newline;
        inner.buffer.set_newline(newline);
    }

    /// Snapshot of the recent rendered text
    pub fn rendered(&self) -> String {
        lock(&self.inner).buffer.rendered().to_string()
    }

    /// Drop the rendered history
    pub fn clear_rendered(&self) {
        lock(&self.inner).buffer.clear();
    }
}

/// Serializes transport events into the session, in delivery order
pub struct EventPump {
    inner: Arc<Mutex<Inner>>,
    events: mpsc::UnboundedReceiver<LinkEvent>,
}

impl EventPump {
    /// Apply events until every sender is gone
    pub async fn run(mut self) {
        while self.next().await {}
        debug!("event pump stopped");
    }

    /// Wait for one event and apply it; `false` once no more can arrive
    pub async fn next(&mut self) -> bool {
        match self.events.recv().await {
            Some(event) => {
                lock(&self.inner).handle_event(event);
                true
            }
            None => false,
        }
    }

    /// Apply every event already queued, without waiting
    pub fn drain(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events.try_recv() {
            lock(&self.inner).handle_event(event);
            applied += 1;
        }
        applied
    }
}
