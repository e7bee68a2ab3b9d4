//! Printer connections
//!
//! Two strategies behind one contract:
//! - [`Protocol::Raw`]: persistent TCP socket, bytes written verbatim (TSPL/ZPL)
//! - [`Protocol::EscPos`]: rendered image sliced into raster strips, cut, and
//!   sent over a fresh TCP connection per job

pub mod manager;

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use spool_printer::{EscPosBuilder, NetworkPrinter, PersistentPrinter, PrintError, Printer};
use thiserror::Error;
use tracing::{debug, instrument};

pub use manager::ConnectionManager;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Unsupported printer protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("Invalid printer address: {0}")]
    InvalidAddress(String),

    #[error(transparent)]
    Device(#[from] PrintError),

    #[error("Image decode failed: {0}")]
    Image(#[from] image::ImageError),
}

pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Wire protocol spoken by a printer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Raw,
    EscPos,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Raw => "raw",
            Protocol::EscPos => "escpos",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" | "tspl" | "zpl" => Ok(Protocol::Raw),
            "escpos" | "esc-pos" | "esc/pos" => Ok(Protocol::EscPos),
            _ => Err(ConnectionError::UnsupportedProtocol(s.to_string())),
        }
    }
}

/// Pool key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub protocol: Protocol,
    pub ip: String,
    pub port: u16,
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.protocol, self.ip, self.port)
    }
}

/// Tunables shared by every connection the manager creates
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub connect_timeout: Duration,
    /// Printable width of the receipt head in dots (80 mm paper: 576)
    pub escpos_max_width: u32,
    /// Tallest raster block sent in one command
    pub escpos_max_strip_height: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            escpos_max_width: 576,
            escpos_max_strip_height: 1000,
        }
    }
}

/// Raw byte-stream strategy over a long-lived socket
#[derive(Debug)]
pub struct RawConnection {
    printer: PersistentPrinter,
}

impl RawConnection {
    /// Start connecting in the background; does not wait for the socket
    pub fn open(ip: &str, port: u16, settings: &ConnectionSettings) -> ConnectionResult<Self> {
        let printer = PersistentPrinter::connect(ip, port, settings.connect_timeout)
            .map_err(|e| match e {
                PrintError::InvalidConfig(msg) => ConnectionError::InvalidAddress(msg),
                other => ConnectionError::Device(other),
            })?;
        Ok(Self { printer })
    }
}

/// ESC/POS strategy: each send is one complete ticket
#[derive(Debug)]
pub struct EscPosConnection {
    printer: NetworkPrinter,
    max_width: u32,
    max_strip_height: u32,
    last_ok: AtomicBool,
}

impl EscPosConnection {
    pub fn open(ip: &str, port: u16, settings: &ConnectionSettings) -> ConnectionResult<Self> {
        let printer = NetworkPrinter::new(ip, port)
            .map_err(|e| ConnectionError::InvalidAddress(e.to_string()))?
            .with_timeout(settings.connect_timeout);
        Ok(Self {
            printer,
            max_width: settings.escpos_max_width,
            max_strip_height: settings.escpos_max_strip_height,
            last_ok: AtomicBool::new(true),
        })
    }

    /// Build the full command stream for one rendered image
    pub fn ticket_commands(&self, image_bytes: &[u8]) -> ConnectionResult<Vec<u8>> {
        let image = image::load_from_memory(image_bytes)?;
        let strips = spool_printer::raster_strips(&image, self.max_width, self.max_strip_height);

        let mut builder = EscPosBuilder::new();
        builder.center();
        for strip in &strips {
            builder.raster(strip);
        }
        builder.left().cut_feed(3);

        debug!(strips = strips.len(), bytes = builder.len(), "ESC/POS ticket built");
        Ok(builder.build())
    }
}

/// A live printer connection
#[derive(Debug)]
pub enum PrinterConnection {
    Raw(RawConnection),
    EscPos(EscPosConnection),
}

impl PrinterConnection {
    /// Construct the strategy for `key.protocol`
    pub fn open(key: &ConnectionKey, settings: &ConnectionSettings) -> ConnectionResult<Self> {
        match key.protocol {
            Protocol::Raw => Ok(Self::Raw(RawConnection::open(&key.ip, key.port, settings)?)),
            Protocol::EscPos => Ok(Self::EscPos(EscPosConnection::open(
                &key.ip, key.port, settings,
            )?)),
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Self::Raw(_) => Protocol::Raw,
            Self::EscPos(_) => Protocol::EscPos,
        }
    }

    /// Send one payload
    ///
    /// Raw payloads are written as-is. ESC/POS payloads are encoded images
    /// (PNG, JPEG, ...) rendered at printer resolution.
    #[instrument(skip(self, data), fields(protocol = %self.protocol(), bytes = data.len()))]
    pub async fn send(&self, data: &[u8]) -> ConnectionResult<()> {
        match self {
            Self::Raw(conn) => Ok(conn.printer.print(data).await?),
            Self::EscPos(conn) => {
                let commands = conn.ticket_commands(data)?;
                let result = conn.printer.print(&commands).await;
                conn.last_ok.store(result.is_ok(), Ordering::SeqCst);
                Ok(result?)
            }
        }
    }

    /// Raw: socket established. ESC/POS: last send (if any) succeeded.
    pub fn is_connected(&self) -> bool {
        match self {
            Self::Raw(conn) => conn.printer.is_connected(),
            Self::EscPos(conn) => conn.last_ok.load(Ordering::SeqCst),
        }
    }

    /// Raw: shut the socket. ESC/POS: nothing to tear down.
    pub async fn close(&self) {
        match self {
            Self::Raw(conn) => conn.printer.close().await,
            Self::EscPos(_) => {}
        }
    }
}
