//! Connection pool keyed by `(protocol, ip, port)`
//!
//! Raw sockets are kept for reuse across jobs. ESC/POS connections are
//! handed out once and dropped from the pool right away, since receipt
//! printers close idle sockets on their own.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info, warn};

use super::{ConnectionKey, ConnectionResult, ConnectionSettings, PrinterConnection, Protocol};
use crate::dispatch::{DeviceSender, DispatchResult, PrintTarget};

type Pool = Arc<DashMap<ConnectionKey, Arc<PrinterConnection>>>;

/// Process-local printer connection pool
pub struct ConnectionManager {
    connections: Pool,
    settings: ConnectionSettings,
}

impl ConnectionManager {
    pub fn new(settings: ConnectionSettings) -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
            settings,
        }
    }

    /// Return the pooled connection for the endpoint, creating it if needed
    ///
    /// Must be called from within a Tokio runtime: raw sockets connect in
    /// the background and ESC/POS entries are evicted by a spawned task.
    pub fn get_or_create(
        &self,
        ip: &str,
        port: u16,
        protocol: Protocol,
    ) -> ConnectionResult<Arc<PrinterConnection>> {
        let key = ConnectionKey {
            protocol,
            ip: ip.to_string(),
            port,
        };

        let conn = match self.connections.entry(key.clone()) {
            Entry::Occupied(entry) => return Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let conn = Arc::new(PrinterConnection::open(&key, &self.settings)?);
                entry.insert(conn.clone());
                info!(connection = %key, "Printer connection created");
                conn
            }
        };

        if protocol == Protocol::EscPos {
            let pool = self.connections.clone();
            let created = conn.clone();
            tokio::spawn(async move {
                if let Some((key, conn)) = pool.remove_if(&key, |_, c| Arc::ptr_eq(c, &created)) {
                    conn.close().await;
                    debug!(connection = %key, "One-shot connection released");
                }
            });
        }

        Ok(conn)
    }

    /// Same as [`get_or_create`](Self::get_or_create) with the protocol given by name
    pub fn get_or_create_named(
        &self,
        ip: &str,
        port: u16,
        protocol: &str,
    ) -> ConnectionResult<Arc<PrinterConnection>> {
        self.get_or_create(ip, port, protocol.parse()?)
    }

    /// Remove and close the connection; warns when nothing is pooled
    pub async fn close(&self, ip: &str, port: u16, protocol: Protocol) {
        let key = ConnectionKey {
            protocol,
            ip: ip.to_string(),
            port,
        };
        match self.connections.remove(&key) {
            Some((key, conn)) => {
                conn.close().await;
                info!(connection = %key, "Printer connection closed");
            }
            None => warn!(connection = %key, "No pooled connection to close"),
        }
    }

    /// Close every pooled connection (shutdown)
    pub async fn close_all(&self) {
        let keys: Vec<ConnectionKey> = self.connections.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((_, conn)) = self.connections.remove(&key) {
                conn.close().await;
            }
        }
        info!("All printer connections closed");
    }

    pub fn contains(&self, ip: &str, port: u16, protocol: Protocol) -> bool {
        self.connections.contains_key(&ConnectionKey {
            protocol,
            ip: ip.to_string(),
            port,
        })
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Drop a raw connection whose socket failed so the next send reconnects
    async fn evict(&self, target: &PrintTarget, failed: &Arc<PrinterConnection>) {
        let key = ConnectionKey {
            protocol: target.protocol,
            ip: target.ip.clone(),
            port: target.port,
        };
        if let Some((key, conn)) = self
            .connections
            .remove_if(&key, |_, c| Arc::ptr_eq(c, failed))
        {
            conn.close().await;
            warn!(connection = %key, "Evicted failed printer connection");
        }
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(ConnectionSettings::default())
    }
}

#[async_trait]
impl DeviceSender for ConnectionManager {
    async fn send(&self, target: &PrintTarget, payloads: &[Vec<u8>]) -> DispatchResult<()> {
        let conn = self.get_or_create(&target.ip, target.port, target.protocol)?;

        for payload in payloads {
            if let Err(e) = conn.send(payload).await {
                if conn.protocol() == Protocol::Raw {
                    self.evict(target, &conn).await;
                }
                return Err(e.into());
            }
        }
        Ok(())
    }
}
