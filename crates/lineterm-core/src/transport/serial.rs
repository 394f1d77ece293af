//! Serial port transport
//!
//! Opens a local serial device (USB adapters, bound RFCOMM devices such as
//! `/dev/rfcomm0`, `COM3`) through `tokio-serial`.

use std::io;
use tokio_serial::SerialPortBuilderExt;
use tracing::info;

use super::{Connector, EventSink, StreamTransport, Transport, TransportError};
use crate::config::LinkSettings;

/// Connector for serial devices; the endpoint is the port name
#[derive(Debug, Clone, Default)]
pub struct SerialConnector {
    settings: LinkSettings,
}

impl SerialConnector {
    /// Connector using `settings` for every port it opens
    pub fn new(settings: LinkSettings) -> Self {
        Self { settings }
    }

    /// Settings applied to opened ports
    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }
}

impl Connector for SerialConnector {
    fn open(&mut self, endpoint: &str, sink: EventSink) -> Result<Box<dyn Transport>, TransportError> {
        if endpoint.trim().is_empty() {
            return Err(TransportError::Open("empty serial port name".to_string()));
        }

        let port_name = endpoint.to_string();
        let baud_rate = self.settings.baud_rate;
        info!(link = %sink.link(), port = %port_name, baud_rate, "opening serial port");

        let open = async move {
            tokio_serial::new(port_name, baud_rate)
                .open_native_async()
                .map_err(io::Error::from)
        };
        let transport = StreamTransport::spawn(open, sink, &self.settings)?;
        Ok(Box::new(transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LinkId;
    use tokio::sync::mpsc;

    #[test]
    fn test_empty_port_name_rejected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut connector = SerialConnector::default();
        let result = connector.open("  ", EventSink::new(LinkId::new(1), tx));
        assert!(matches!(result, Err(TransportError::Open(_))));
    }

    #[tokio::test]
    async fn test_missing_port_reports_open_failure() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut connector = SerialConnector::default();
        let _transport = connector
            .open("/dev/lineterm-does-not-exist", EventSink::new(LinkId::new(1), tx))
            .expect("open attempt starts");

        let event = rx.recv().await.expect("outcome reported").event;
        assert!(matches!(event, crate::transport::TransportEvent::OpenFailed(_)));
    }
}
