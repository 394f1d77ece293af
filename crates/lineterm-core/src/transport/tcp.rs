//! TCP transport, for serial-over-network bridges (ser2net and the like)

use std::io;
use tokio::net::TcpStream;
use tracing::info;

use super::{Connector, EventSink, StreamTransport, Transport, TransportError};
use crate::config::LinkSettings;

/// Connector for `host:port` endpoints
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    settings: LinkSettings,
}

impl TcpConnector {
    /// Connector using `settings` for every connection
    pub fn new(settings: LinkSettings) -> Self {
        Self { settings }
    }
}

impl Connector for TcpConnector {
    fn open(&mut self, endpoint: &str, sink: EventSink) -> Result<Box<dyn Transport>, TransportError> {
        let addr = endpoint.trim().to_string();
        if addr.is_empty() {
            return Err(TransportError::Open("empty address".to_string()));
        }
        info!(link = %sink.link(), %addr, "connecting");

        let open = async move {
            let stream = TcpStream::connect(addr.as_str()).await?;
            stream.set_nodelay(true)?;
            Ok::<_, io::Error>(stream)
        };
        let transport = StreamTransport::spawn(open, sink, &self.settings)?;
        Ok(Box::new(transport))
    }
}
