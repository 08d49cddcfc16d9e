//! Accept side of the file server.
//!
//! Every accepted socket is paired with one of `max_connections` slots. A
//! client that arrives while all slots are taken stays in the kernel backlog
//! until an earlier [`Incoming`] is dropped.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::{FilebinError, Result};

/// Listening socket plus the pool of connection slots.
pub struct FileServer {
    listener: TcpListener,
    slots: Arc<Semaphore>,
    max_connections: usize,
}

/// An accepted client. Its slot is released when this value is dropped.
pub struct Incoming {
    pub stream: TcpStream,
    pub peer: SocketAddr,
    _slot: OwnedSemaphorePermit,
}

impl FileServer {
    /// Bind to `host:port` from the configuration.
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        info!(
            addr = %listener.local_addr()?,
            max_connections = config.max_connections,
            "File server listening"
        );

        Ok(Self {
            listener,
            slots: Arc::new(Semaphore::new(config.max_connections)),
            max_connections: config.max_connections,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Clients currently holding a slot.
    pub fn active_connections(&self) -> usize {
        self.max_connections.saturating_sub(self.slots.available_permits())
    }

    /// Wait for a free slot, then take the next client off the backlog.
    ///
    /// The returned socket has `TCP_NODELAY` set; response lines are small and
    /// the client waits on each one.
    pub async fn next_client(&self) -> Result<Incoming> {
        let slot = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| FilebinError::Io(std::io::ErrorKind::NotConnected.into()))?;

        let (stream, peer) = self.listener.accept().await?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %peer, error = %e, "Could not set TCP_NODELAY");
        }
        debug!(
            peer = %peer,
            active = self.active_connections(),
            "Accepted connection"
        );

        Ok(Incoming {
            stream,
            peer,
            _slot: slot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_config(max_connections: usize) -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            max_connections,
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let server = FileServer::bind(&test_config(10)).await.unwrap();

        assert_ne!(server.local_addr().unwrap().port(), 0);
        assert_eq!(server.max_connections(), 10);
        assert_eq!(server.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_bind_address_in_use() {
        let first = FileServer::bind(&test_config(1)).await.unwrap();
        let config = ServerConfig {
            port: first.local_addr().unwrap().port(),
            ..test_config(1)
        };

        assert!(matches!(
            FileServer::bind(&config).await,
            Err(FilebinError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_next_client_sets_nodelay() {
        let server = FileServer::bind(&test_config(4)).await.unwrap();
        let client = TcpStream::connect(server.local_addr().unwrap()).await.unwrap();

        let incoming = server.next_client().await.unwrap();
        assert_eq!(incoming.peer, client.local_addr().unwrap());
        assert!(incoming.stream.nodelay().unwrap());
        assert_eq!(server.active_connections(), 1);

        drop(incoming);
        assert_eq!(server.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_full_slots_hold_back_clients() {
        let server = FileServer::bind(&test_config(1)).await.unwrap();
        let addr = server.local_addr().unwrap();

        let _first = TcpStream::connect(addr).await.unwrap();
        let held = server.next_client().await.unwrap();

        let _second = TcpStream::connect(addr).await.unwrap();
        let waiting = tokio::time::timeout(Duration::from_millis(100), server.next_client()).await;
        assert!(waiting.is_err());

        drop(held);
        let second = server.next_client().await.unwrap();
        assert_eq!(server.active_connections(), 1);
        drop(second);
    }
}
