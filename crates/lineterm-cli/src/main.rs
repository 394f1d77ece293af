//! lineterm console host
//!
//! Wires stdin/stdout to a terminal session.
//!
//! Usage:
//!   lineterm [OPTIONS] ENDPOINT
//!
//! Input lines are sent to the device. Lines starting with `/` are host
//! commands: `/hex`, `/text`, `/connect`, `/disconnect`, `/clear`, `/quit`.

use anyhow::{Context, Result};
use clap::Parser;
use lineterm_core::prelude::*;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lineterm", version, about = "Line-oriented serial terminal")]
struct Cli {
    /// Serial port (e.g. /dev/rfcomm0, COM3), or host:port with --tcp
    endpoint: String,

    /// Treat the endpoint as a TCP address
    #[arg(long)]
    tcp: bool,

    /// Serial baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Start in hex mode
    #[arg(long)]
    hex: bool,

    /// Line terminator: crlf, lf, cr or none
    #[arg(long)]
    newline: Option<Newline>,

    /// Do not echo sent lines
    #[arg(long)]
    no_echo: bool,

    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn terminal_config(&self) -> Result<TerminalConfig> {
        let mut config = match &self.config {
            Some(path) => TerminalConfig::load(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => TerminalConfig::default(),
        };
        if let Some(baud) = self.baud {
            config.link.baud_rate = baud;
        }
        if let Some(newline) = self.newline {
            config.session.newline = newline;
        }
        if self.hex {
            config.session.render_mode = RenderMode::Hex;
        }
        if self.no_echo {
            config.session.echo = false;
        }
        Ok(config)
    }
}

fn status(msg: &str) {
    println!("{}", msg);
}

/// Write one session event to the terminal
fn render(event: SessionEvent) -> Result<()> {
    let mut out = std::io::stdout().lock();
    match event {
        SessionEvent::Connected => writeln!(out, "connected")?,
        SessionEvent::ConnectError(reason) => writeln!(out, "connection failed: {}", reason)?,
        SessionEvent::Received(update) => {
            // Erase a ^M that turned out to be half of a CR LF
            for _ in 0..update.retract {
                out.write_all(b"\x08 \x08")?;
            }
            out.write_all(update.text.as_bytes())?;
        }
        SessionEvent::Sent(echo) => writeln!(out, "{}", echo)?,
        SessionEvent::IoError(reason) => writeln!(out, "connection lost: {}", reason)?,
        SessionEvent::Disconnected => writeln!(out, "disconnected")?,
    }
    out.flush()?;
    Ok(())
}

/// Handle one input line; returns `false` when the user asked to quit
fn handle_input(session: &ConnectionManager, endpoint: &str, line: &str) -> bool {
    match line.trim() {
        "/quit" => return false,
        "/hex" => {
            session.set_render_mode(RenderMode::Hex);
            status("hex mode");
        }
        "/text" => {
            session.set_render_mode(RenderMode::Text);
            status("text mode");
        }
        "/disconnect" => session.disconnect(),
        "/connect" => match session.connect(endpoint) {
            Ok(()) => status("connecting..."),
            Err(e) => status(&e.to_string()),
        },
        "/clear" => session.clear_rendered(),
        _ => match session.send(line) {
            Ok(()) => {}
            Err(SessionError::NotConnected) => status("not connected"),
            Err(e) => status(&e.to_string()),
        },
    }
    true
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.terminal_config()?;

    let (session, pump) = if cli.tcp {
        ConnectionManager::new(TcpConnector::new(config.link.clone()), config.session.clone())
    } else {
        ConnectionManager::new(SerialConnector::new(config.link.clone()), config.session.clone())
    };
    let pump = tokio::spawn(pump.run());

    let (listener, mut events) = ChannelListener::new();
    session.attach(listener);

    status("connecting...");
    session
        .connect(&cli.endpoint)
        .with_context(|| format!("connecting to {}", cli.endpoint))?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => render(event)?,
                None => break,
            },
            line = lines.next_line() => match line.context("reading stdin")? {
                Some(line) => {
                    if !handle_input(&session, &cli.endpoint, &line) {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    session.detach();
    session.disconnect();

    // The pump ends once every link driver has flushed and exited
    drop(session);
    let grace = Duration::from_millis(config.link.close_grace_ms) + Duration::from_millis(500);
    if tokio::time::timeout(grace, pump).await.is_err() {
        tracing::warn!("link did not close in time");
    }
    Ok(())
}
