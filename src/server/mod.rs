//! Main TCP server for memcached protocol

mod connection;
mod handler;
mod transport;

pub use transport::{TcpTransport, Transport};

use crate::config::ServerConfig;
use crate::metrics::Metrics;
use crate::storage::EntryStore;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const TOO_MANY_CONNECTIONS: &[u8] = b"SERVER_ERROR too many open connections\r\n";

/// State shared by every connection task
pub(crate) struct Shared {
    pub(crate) config: ServerConfig,
    pub(crate) store: Arc<EntryStore>,
    pub(crate) metrics: Arc<Metrics>,
    pub(crate) cancel_token: CancellationToken,
}

/// Accept loop dispatching clients to per-connection tasks
pub struct Server<T: Transport = TcpTransport> {
    shared: Arc<Shared>,
    transport: T,
    connection_semaphore: Arc<Semaphore>,
}

impl Server<TcpTransport> {
    /// Bind a TCP listener on `config.listen_addr()`
    pub async fn bind(
        config: ServerConfig,
        store: Arc<EntryStore>,
        metrics: Arc<Metrics>,
        cancel_token: CancellationToken,
    ) -> crate::Result<Self> {
        let transport = TcpTransport::bind(&config.listen_addr()).await?;
        Ok(Self::new(transport, config, store, metrics, cancel_token))
    }
}

impl<T: Transport> Server<T> {
    /// Create a server over an already bound transport
    pub fn new(
        transport: T,
        config: ServerConfig,
        store: Arc<EntryStore>,
        metrics: Arc<Metrics>,
        cancel_token: CancellationToken,
    ) -> Self {
        let connection_semaphore = Arc::new(Semaphore::new(config.max_connections));

        Self {
            shared: Arc::new(Shared {
                config,
                store,
                metrics,
                cancel_token,
            }),
            transport,
            connection_semaphore,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Accept clients until the cancellation token fires
    pub async fn run(&self) -> crate::Result<()> {
        info!("Server listening on {}", self.local_addr()?);

        loop {
            tokio::select! {
                _ = self.shared.cancel_token.cancelled() => {
                    info!("Server shutting down");
                    break;
                }
                result = self.transport.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => self.dispatch(stream, peer_addr),
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn dispatch(&self, mut stream: T::Stream, peer_addr: SocketAddr) {
        let metrics = &self.shared.metrics;

        // Try to acquire connection permit
        match self.connection_semaphore.clone().try_acquire_owned() {
            Ok(permit) => {
                metrics.total_connections.inc();
                metrics.active_connections.inc();
                debug!("Accepted connection from {}", peer_addr);

                let shared = Arc::clone(&self.shared);
                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = connection::handle(shared, stream).await {
                        debug!("Connection error from {}: {}", peer_addr, e);
                    }
                    debug!("Connection from {} closed", peer_addr);
                });
            }
            Err(_) => {
                metrics.rejected_connections.inc();
                warn!(
                    "Connection limit reached, rejecting connection from {}",
                    peer_addr
                );

                let write_timeout = self.shared.config.idle_timeout();
                tokio::spawn(async move {
                    let reject = async {
                        stream.write_all(TOO_MANY_CONNECTIONS).await?;
                        stream.shutdown().await
                    };
                    let result = match write_timeout {
                        Some(limit) => tokio::time::timeout(limit, reject)
                            .await
                            .unwrap_or_else(|_| Err(io::ErrorKind::TimedOut.into())),
                        None => reject.await,
                    };
                    if let Err(e) = result {
                        debug!("Failed to notify rejected client {}: {}", peer_addr, e);
                    }
                });
            }
        }
    }
}
