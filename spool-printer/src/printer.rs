//! Printer adapters for sending raw command data
//!
//! Supports:
//! - One-shot network printers (connect, write, close per job)
//! - Persistent network printers (socket opened once, reused across jobs)

use crate::error::{PrintError, PrintResult};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Trait for printer adapters
#[allow(async_fn_in_trait)]
pub trait Printer {
    /// Send raw command data to the printer
    async fn print(&self, data: &[u8]) -> PrintResult<()>;

    /// Check if the printer is online/reachable
    async fn is_online(&self) -> bool;
}

fn parse_addr(host: &str, port: u16) -> PrintResult<SocketAddr> {
    let addr_str = format!("{}:{}", host, port);
    addr_str
        .parse()
        .map_err(|_| PrintError::InvalidConfig(format!("Invalid address: {}", addr_str)))
}

async fn connect(addr: SocketAddr, timeout: Duration) -> PrintResult<TcpStream> {
    tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| PrintError::Timeout(format!("Connection timeout: {}", addr)))?
        .map_err(|e| PrintError::Connection(format!("{}: {}", addr, e)))
}

/// Network printer (TCP port 9100)
///
/// Opens a fresh connection for every job. Thermal receipt printers drop
/// idle sockets, so this is the safe default for ESC/POS.
#[derive(Debug, Clone)]
pub struct NetworkPrinter {
    addr: SocketAddr,
    timeout: Duration,
}

impl NetworkPrinter {
    /// Create a new network printer
    pub fn new(host: &str, port: u16) -> PrintResult<Self> {
        Ok(Self {
            addr: parse_addr(host, port)?,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Set connection timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the printer address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Printer for NetworkPrinter {
    #[instrument(skip(data), fields(addr = %self.addr, data_len = data.len()))]
    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        debug!("Connecting to printer");
        let mut stream = connect(self.addr, self.timeout).await?;

        debug!("Connected, sending {} bytes", data.len());
        stream.write_all(data).await.map_err(|e| {
            PrintError::Io(std::io::Error::new(
                e.kind(),
                format!("Write failed: {}", e),
            ))
        })?;
        stream.flush().await?;
        let _ = stream.shutdown().await;

        info!("Print job sent successfully");
        Ok(())
    }

    #[instrument(fields(addr = %self.addr))]
    async fn is_online(&self) -> bool {
        match connect(self.addr, Duration::from_millis(500)).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Printer offline");
                false
            }
        }
    }
}

/// Network printer holding one long-lived TCP socket
///
/// The connection is started in the background as soon as the printer is
/// created; the first [`Printer::print`] waits for it. Socket errors are
/// logged and drop the socket. There is no reconnect: callers close this
/// printer and create a new one.
#[derive(Debug)]
pub struct PersistentPrinter {
    addr: SocketAddr,
    stream: Arc<Mutex<Option<TcpStream>>>,
    connected: Arc<AtomicBool>,
}

impl PersistentPrinter {
    /// Create the printer and start connecting in the background
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> PrintResult<Self> {
        let addr = parse_addr(host, port)?;
        let stream = Arc::new(Mutex::new(None));
        let connected = Arc::new(AtomicBool::new(false));

        // Hold the slot until the connect attempt settles so that an early
        // print waits instead of seeing an empty socket.
        let mut slot = stream
            .clone()
            .try_lock_owned()
            .map_err(|_| PrintError::Connection(format!("{}: socket slot busy", addr)))?;
        let flag = connected.clone();

        tokio::spawn(async move {
            match connect(addr, timeout).await {
                Ok(socket) => {
                    info!(%addr, "Printer socket connected");
                    *slot = Some(socket);
                    flag.store(true, Ordering::SeqCst);
                }
                Err(e) => {
                    error!(%addr, error = %e, "Printer socket connect failed");
                }
            }
        });

        Ok(Self {
            addr,
            stream,
            connected,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Whether the socket is currently established
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Shut the socket down; later prints fail with [`PrintError::NotConnected`]
    pub async fn close(&self) {
        let mut guard = self.stream.lock().await;
        if let Some(mut socket) = guard.take() {
            if let Err(e) = socket.shutdown().await {
                debug!(addr = %self.addr, error = %e, "Socket shutdown error");
            }
            info!(addr = %self.addr, "Printer socket closed");
        }
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl Printer for PersistentPrinter {
    #[instrument(skip(data), fields(addr = %self.addr, data_len = data.len()))]
    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        let mut guard = self.stream.lock().await;
        let Some(socket) = guard.as_mut() else {
            return Err(PrintError::NotConnected(self.addr.to_string()));
        };

        let result = async {
            socket.write_all(data).await?;
            socket.flush().await
        }
        .await;

        match result {
            Ok(()) => {
                debug!("Sent {} bytes", data.len());
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Printer socket error, dropping connection");
                guard.take();
                self.connected.store(false, Ordering::SeqCst);
                Err(PrintError::Io(e))
            }
        }
    }

    async fn is_online(&self) -> bool {
        self.is_connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[test]
    fn test_network_printer_new() {
        let printer = NetworkPrinter::new("192.168.1.100", 9100).unwrap();
        assert_eq!(printer.addr().port(), 9100);
    }

    #[test]
    fn test_invalid_addr() {
        assert!(NetworkPrinter::new("not an ip", 9100).is_err());
    }

    #[tokio::test]
    async fn test_network_printer_sends_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            socket.read_to_end(&mut buf).await.unwrap();
            buf
        });

        let printer = NetworkPrinter::new("127.0.0.1", port).unwrap();
        printer.print(b"hello").await.unwrap();

        assert_eq!(server.await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_persistent_printer_reuses_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            socket.read_to_end(&mut buf).await.unwrap();
            buf
        });

        let printer = PersistentPrinter::connect("127.0.0.1", port, DEFAULT_TIMEOUT).unwrap();
        printer.print(b"one,").await.unwrap();
        printer.print(b"two").await.unwrap();
        assert!(printer.is_connected());
        printer.close().await;
        assert!(!printer.is_connected());

        assert_eq!(server.await.unwrap(), b"one,two");
        assert!(matches!(
            printer.print(b"three").await,
            Err(PrintError::NotConnected(_))
        ));
    }

    #[tokio::test]
    async fn test_persistent_printer_connect_refused() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let printer = PersistentPrinter::connect("127.0.0.1", port, DEFAULT_TIMEOUT).unwrap();
        let result = printer.print(b"data").await;
        assert!(matches!(result, Err(PrintError::NotConnected(_))));
        assert!(!printer.is_connected());
    }
}
