//! Connection state shared between the client and its liveness watcher
//!
//! The live connection is a [`Link`] stored behind a short-lived mutex.
//! Taking the link out of that slot is the one and only way to disconnect,
//! so concurrent teardowns collapse into a single close.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{watch, Mutex as AsyncMutex};

/// State of the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Connection statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Frames fully written
    pub frames_sent: u64,
    /// Bytes fully written, headers included
    pub bytes_sent: u64,
    /// Connections actually closed
    pub disconnects: u64,
    /// Complete headers read from the viewer and discarded
    pub headers_ignored: u64,
}

/// One established connection
pub(crate) struct Link {
    pub remote_addr: SocketAddr,
    pub local_addr: SocketAddr,
    pub port: u16,
    pub writer: Arc<AsyncMutex<OwnedWriteHalf>>,
    /// Flipped to `true` when the link is torn down
    pub shutdown_tx: watch::Sender<bool>,
}

/// State shared by the client and the watcher
#[derive(Default)]
pub(crate) struct Shared {
    link: Mutex<Option<Link>>,
    connected: AtomicBool,
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
    disconnects: AtomicU64,
    headers_ignored: AtomicU64,
}

impl Shared {
    fn link(&self) -> MutexGuard<'_, Option<Link>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Install a freshly connected link.
    pub fn attach(&self, link: Link) {
        let mut slot = self.link();
        *slot = Some(link);
        self.connected.store(true, Ordering::SeqCst);
    }

    /// Run `f` against the live link, if any.
    pub fn with_link<T>(&self, f: impl FnOnce(&Link) -> T) -> Option<T> {
        self.link().as_ref().map(f)
    }

    /// Guarded check-and-flip.
    ///
    /// Returns the link only to the caller that actually disconnected it;
    /// everyone else gets `None`. The watcher and any in-flight send are
    /// signalled before this returns.
    pub fn detach(&self, reason: &str) -> Option<Link> {
        let link = {
            let mut slot = self.link();
            let link = slot.take()?;
            self.connected.store(false, Ordering::SeqCst);
            link
        };

        let _ = link.shutdown_tx.send(true);
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        tracing::info!("Disconnected from {} ({})", link.remote_addr, reason);
        Some(link)
    }

    /// Detach and close the socket. Returns whether this call did the close.
    pub async fn teardown(&self, reason: &str) -> bool {
        let Some(link) = self.detach(reason) else {
            return false;
        };

        let mut writer = link.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            tracing::debug!("Shutdown of {} failed: {}", link.remote_addr, e);
        }
        true
    }

    pub fn record_sent(&self, bytes: usize) {
        self.frames_sent.fetch_add(1, Ordering::SeqCst);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::SeqCst);
    }

    pub fn record_header_ignored(&self) {
        self.headers_ignored.fetch_add(1, Ordering::SeqCst);
    }

    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            frames_sent: self.frames_sent.load(Ordering::SeqCst),
            bytes_sent: self.bytes_sent.load(Ordering::SeqCst),
            disconnects: self.disconnects.load(Ordering::SeqCst),
            headers_ignored: self.headers_ignored.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    async fn link_pair() -> (Link, TcpStream, watch::Receiver<bool>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let client = client.unwrap();
        let (peer, _) = accepted.unwrap();

        let local_addr = client.local_addr().unwrap();
        let (_reader, writer) = client.into_split();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let link = Link {
            remote_addr: addr,
            local_addr,
            port: addr.port(),
            writer: Arc::new(AsyncMutex::new(writer)),
            shutdown_tx,
        };
        (link, peer, shutdown_rx)
    }

    #[tokio::test]
    async fn test_detach_only_once() {
        let shared = Shared::default();
        let (link, _peer, shutdown_rx) = link_pair().await;

        shared.attach(link);
        assert!(shared.is_connected());

        assert!(shared.detach("first").is_some());
        assert!(shared.detach("second").is_none());
        assert!(!shared.is_connected());
        assert_eq!(shared.stats().disconnects, 1);

        assert!(*shutdown_rx.borrow());
    }

    #[tokio::test]
    async fn test_teardown_when_disconnected() {
        let shared = Shared::default();
        assert!(!shared.teardown("idle").await);
        assert_eq!(shared.stats(), ConnectionStats::default());
    }

    #[tokio::test]
    async fn test_teardown_closes_write_side() {
        use tokio::io::AsyncReadExt;

        let shared = Shared::default();
        let (link, mut peer, _shutdown_rx) = link_pair().await;
        shared.attach(link);

        assert!(shared.teardown("test").await);

        let mut buf = [0u8; 1];
        assert_eq!(peer.read(&mut buf).await.unwrap(), 0);
    }
}
