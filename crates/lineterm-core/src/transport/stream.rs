//! Async stream driver shared by the serial and TCP connectors
//!
//! One tokio task per link: it awaits the open future, reports the
//! outcome, then multiplexes reads and queued writes until the stream
//! fails or the handle is closed. Closing the handle ends the write queue;
//! the task flushes what is already queued, shuts the stream down and
//! exits. If that takes longer than the close grace period the task is
//! aborted.

use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{EventSink, Transport, TransportError};
use crate::config::LinkSettings;

/// Transport handle backed by a driver task
pub struct StreamTransport {
    /// `None` once closed
    outbound: Option<mpsc::UnboundedSender<Vec<u8>>>,
    task: JoinHandle<()>,
    close_grace: Duration,
}

impl StreamTransport {
    /// Spawn the driver task on the current runtime
    ///
    /// `open` produces the stream; it runs inside the task so the caller
    /// never waits on it.
    pub fn spawn<F, S>(open: F, sink: EventSink, settings: &LinkSettings) -> Result<Self, TransportError>
    where
        F: Future<Output = io::Result<S>> + Send + 'static,
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        let (outbound, rx) = mpsc::unbounded_channel();
        let task = runtime.spawn(drive(open, sink, rx, settings.read_buffer_size.max(1)));
        Ok(Self {
            outbound: Some(outbound),
            task,
            close_grace: Duration::from_millis(settings.close_grace_ms),
        })
    }

    /// True once the driver task has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Transport for StreamTransport {
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.outbound
            .as_ref()
            .ok_or(TransportError::Closed)?
            .send(data.to_vec())
            .map_err(|_| TransportError::Closed)
    }

    fn close(&mut self) {
        // Dropping the sender lets the task drain the queue and exit
        if self.outbound.take().is_none() || self.task.is_finished() {
            return;
        }

        let abort = self.task.abort_handle();
        let grace = self.close_grace;
        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    tokio::time::sleep(grace).await;
                    abort.abort();
                });
            }
            Err(_) => abort.abort(),
        }
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        self.close();
    }
}

async fn drive<F, S>(
    open: F,
    sink: EventSink,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    read_buffer_size: usize,
) where
    F: Future<Output = io::Result<S>>,
    S: AsyncRead + AsyncWrite + Unpin,
{
    let link = sink.link();

    // Writes queued before the stream exists are kept; a handle closed
    // before the open completes abandons the attempt
    tokio::pin!(open);
    let mut queued = Vec::new();
    let opened = loop {
        tokio::select! {
            biased;
            result = &mut open => break result,
            data = outbound.recv() => match data {
                Some(data) => queued.push(data),
                None => {
                    debug!(%link, "closed while opening");
                    return;
                }
            },
        }
    };

    let mut stream = match opened {
        Ok(stream) => stream,
        Err(e) => {
            warn!(%link, error = %e, "open failed");
            sink.open_failed(e.to_string());
            return;
        }
    };
    info!(%link, "stream open");
    if !sink.opened() {
        return;
    }

    for data in queued {
        if let Err(e) = write_frame(&mut stream, &data).await {
            warn!(%link, error = %e, "write failed");
            sink.io_error(e.to_string());
            return;
        }
    }

    let mut buf = vec![0u8; read_buffer_size];
    loop {
        tokio::select! {
            read = stream.read(&mut buf) => match read {
                Ok(0) => {
                    info!(%link, "stream closed by peer");
                    sink.io_error("connection closed by peer");
                    return;
                }
                Ok(n) => {
                    debug!(%link, bytes = n, "read");
                    sink.received(buf[..n].to_vec());
                }
                Err(e) => {
                    warn!(%link, error = %e, "read failed");
                    sink.io_error(e.to_string());
                    return;
                }
            },
            data = outbound.recv() => match data {
                Some(data) => {
                    debug!(%link, bytes = data.len(), "write");
                    if let Err(e) = write_frame(&mut stream, &data).await {
                        warn!(%link, error = %e, "write failed");
                        sink.io_error(e.to_string());
                        return;
                    }
                }
                None => {
                    if let Err(e) = stream.shutdown().await {
                        debug!(%link, error = %e, "shutdown failed");
                    }
                    info!(%link, "stream closed");
                    return;
                }
            },
        }
    }
}

async fn write_frame<S: AsyncWrite + Unpin>(stream: &mut S, data: &[u8]) -> io::Result<()> {
    stream.write_all(data).await?;
    stream.flush().await
}
