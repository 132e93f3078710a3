//! Liveness watcher
//!
//! The viewer never talks back, so the only thing worth reading off the
//! socket is the end of it. The watcher blocks on a 4-byte header read; EOF
//! or an error means the viewer is gone and the connection is torn down.
//! Complete headers are logged and dropped.

use std::io;
use std::net::SocketAddr;
use std::sync::Weak;

use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::watch;

use super::connection::Shared;
use crate::protocol::{frame_length, FRAME_HEADER_SIZE};

/// Watch `reader` until the connection dies.
///
/// Holds only a weak reference to the shared state and tears down through
/// the guarded step, never through `Client::stop`, which would join this
/// very task.
pub(crate) async fn run(
    mut reader: OwnedReadHalf,
    mut shutdown_rx: watch::Receiver<bool>,
    shared: Weak<Shared>,
    remote_addr: SocketAddr,
) {
    tracing::debug!("Liveness watcher started for {}", remote_addr);

    let reason = loop {
        let mut header = [0u8; FRAME_HEADER_SIZE];

        tokio::select! {
            biased;

            // Torn down elsewhere
            _ = shutdown_rx.changed() => {
                tracing::debug!("Liveness watcher for {} stopped", remote_addr);
                return;
            }

            result = reader.read_exact(&mut header) => {
                match result {
                    Ok(_) => {
                        tracing::debug!(
                            "Ignoring header from {} announcing {} bytes",
                            remote_addr,
                            frame_length(&header)
                        );
                        if let Some(shared) = shared.upgrade() {
                            shared.record_header_ignored();
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                        break "peer closed the connection".to_string();
                    }
                    Err(e) => {
                        break format!("read error: {}", e);
                    }
                }
            }
        }
    };

    tracing::warn!("Lost connection to {}: {}", remote_addr, reason);

    if let Some(shared) = shared.upgrade() {
        shared.teardown(&reason).await;
    }
}
