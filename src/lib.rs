//! efkreload - Live reload client for effect viewers
//!
//! Keeps one TCP connection to a running viewer and pushes effect files to
//! it whenever they change. The viewer never answers; a background watcher
//! only notices when it goes away.

pub mod config;
pub mod loader;
pub mod network;
pub mod protocol;

pub use loader::{AssetLoader, FileAssetLoader, LoaderError};
pub use network::{Client, ClientError, ClientResult, ConnectionState, NetworkConfig};
