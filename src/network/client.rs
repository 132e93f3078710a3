//! Reload client
//!
//! Connects to a running effect viewer and pushes reload commands to it.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use super::connection::{ConnectionState, ConnectionStats, Link, Shared};
use super::{watcher, NetworkConfig, Resolver, SystemResolver};
use crate::loader::AssetLoader;
use crate::protocol::{encode_reload_command, frame, CodecError};

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Already connected")]
    AlreadyConnected,

    #[error("Not connected")]
    NotConnected,

    #[error("Could not resolve {host}: {source}")]
    Resolution {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection to {0} timed out")]
    Timeout(SocketAddr),

    #[error("Transport error: {0}")]
    Transport(#[source] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Reload client
///
/// Holds at most one connection. The connection can be lost at any time
/// when the viewer goes away; [`Client::is_connected`] reflects that and
/// [`Client::start`] may be called again to reconnect.
pub struct Client {
    /// Client configuration
    config: NetworkConfig,
    /// Host name lookup
    resolver: Arc<dyn Resolver>,
    /// State shared with the liveness watcher
    shared: Arc<Shared>,
    /// Outstanding liveness watcher, joined by `stop`. Held across the
    /// join so every concurrent `stop` waits for the watcher to exit.
    watcher: AsyncMutex<Option<JoinHandle<()>>>,
    /// Serializes `start` calls
    lifecycle: AsyncMutex<()>,
}

impl Client {
    /// Create a new client
    pub fn new(config: NetworkConfig) -> Self {
        Self::with_resolver(config, Arc::new(SystemResolver))
    }

    /// Create a new client using a custom resolver
    pub fn with_resolver(config: NetworkConfig, resolver: Arc<dyn Resolver>) -> Self {
        Self {
            config,
            resolver,
            shared: Arc::new(Shared::default()),
            watcher: AsyncMutex::new(None),
            lifecycle: AsyncMutex::new(()),
        }
    }

    /// Connect to the viewer at `host:port`.
    ///
    /// Fails with [`ClientError::AlreadyConnected`] without touching the
    /// live connection. On any other failure nothing is left behind.
    pub async fn start(&self, host: &str, port: u16) -> ClientResult<()> {
        let _lifecycle = self.lifecycle.lock().await;

        if self.is_connected() {
            return Err(ClientError::AlreadyConnected);
        }

        // A watcher may still be outstanding from a connection it dropped
        self.stop().await;

        let addr = self
            .resolver
            .resolve(host, port)
            .await
            .map_err(|source| ClientError::Resolution {
                host: host.to_string(),
                source,
            })?;

        tracing::info!("Connecting to {} ({})", host, addr);

        let stream = self.connect(addr).await?;
        let local_addr = stream
            .local_addr()
            .map_err(|source| ClientError::Connect { addr, source })?;

        let (reader, writer) = stream.into_split();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        self.shared.attach(Link {
            remote_addr: addr,
            local_addr,
            port,
            writer: Arc::new(AsyncMutex::new(writer)),
            shutdown_tx,
        });

        let handle = tokio::spawn(watcher::run(
            reader,
            shutdown_rx,
            Arc::downgrade(&self.shared),
            addr,
        ));
        *self.watcher.lock().await = Some(handle);

        tracing::info!("Connected to {}", addr);
        Ok(())
    }

    async fn connect(&self, addr: SocketAddr) -> ClientResult<TcpStream> {
        let stream = match self.config.connect_timeout() {
            Some(timeout) => tokio::time::timeout(timeout, TcpStream::connect(addr))
                .await
                .map_err(|_| ClientError::Timeout(addr))?,
            None => TcpStream::connect(addr).await,
        }
        .map_err(|source| ClientError::Connect { addr, source })?;

        if self.config.nodelay {
            stream
                .set_nodelay(true)
                .map_err(|source| ClientError::Connect { addr, source })?;
        }

        Ok(stream)
    }

    /// Disconnect and wait for the liveness watcher to finish.
    ///
    /// Safe to call at any time, any number of times, concurrently.
    pub async fn stop(&self) {
        self.shared.teardown("client stopped").await;

        // The watcher never takes this lock, so waiting under it is safe
        let mut watcher = self.watcher.lock().await;
        if let Some(handle) = watcher.take() {
            if let Err(e) = handle.await {
                tracing::warn!("Liveness watcher ended abnormally: {}", e);
            }
        }
        drop(watcher);

        tracing::debug!("Client stopped");
    }

    /// Send one frame carrying `payload`.
    ///
    /// Any write failure disconnects the client.
    pub async fn send(&self, payload: &[u8]) -> ClientResult<()> {
        let Some((writer, mut shutdown_rx)) = self
            .shared
            .with_link(|link| (link.writer.clone(), link.shutdown_tx.subscribe()))
        else {
            return Err(ClientError::NotConnected);
        };

        let frame = frame(payload)?;

        let result = {
            let mut writer = writer.lock().await;
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionAborted,
                    "connection closed during send",
                )),

                result = async {
                    writer.write_all(&frame).await?;
                    writer.flush().await
                } => result,
            }
        };

        match result {
            Ok(()) => {
                self.shared.record_sent(frame.len());
                tracing::debug!("Sent frame of {} bytes", frame.len());
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Send failed: {}", e);
                self.stop().await;
                Err(ClientError::Transport(e))
            }
        }
    }

    /// Push `asset` to the viewer under `key`.
    pub async fn reload(&self, key: &str, asset: &[u8]) -> ClientResult<()> {
        let payload = encode_reload_command(key, asset)?;
        self.send(&payload).await
    }

    /// Load `path` through `loader` and push it under `key`.
    ///
    /// A path the loader cannot load is skipped: nothing is sent and the
    /// call succeeds with `Ok(false)`. Returns `Ok(true)` once the asset is
    /// on the wire.
    pub async fn reload_from<L>(&self, loader: &L, path: &Path, key: &str) -> ClientResult<bool>
    where
        L: AssetLoader + ?Sized,
    {
        let asset = match loader.load(path).await {
            Ok(asset) => asset,
            Err(e) => {
                tracing::warn!("Skipping reload of {}: {}", path.display(), e);
                return Ok(false);
            }
        };

        let result = self.reload(key, &asset).await;
        loader.unload(asset);
        result.map(|()| true)
    }

    /// Check if connected. The answer may be stale by the time it is used.
    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    /// Get the current state
    pub fn state(&self) -> ConnectionState {
        if self.is_connected() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Port of the live connection
    pub fn port(&self) -> Option<u16> {
        self.shared.with_link(|link| link.port)
    }

    /// Address of the viewer on the live connection
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.shared.with_link(|link| link.remote_addr)
    }

    /// Local address of the live connection
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared.with_link(|link| link.local_addr)
    }

    /// Get connection statistics
    pub fn stats(&self) -> ConnectionStats {
        self.shared.stats()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new(NetworkConfig::default())
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        // Wakes the watcher so it exits on its own
        self.shared.detach("client dropped");
    }
}
