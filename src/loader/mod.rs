//! Asset loader module
//!
//! The client does not care where effect bytes come from; it asks an
//! [`AssetLoader`] for them and hands them back once sent.

use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

/// Loader errors
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Asset not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Asset too large: {path} is {size} bytes (max: {max})")]
    TooLarge { path: PathBuf, size: u64, max: u64 },

    #[error("Path escapes the asset root: {0}")]
    OutsideRoot(PathBuf),
}

pub type LoaderResult<T> = Result<T, LoaderError>;

/// Provides the raw bytes of an effect file
#[async_trait]
pub trait AssetLoader: Send + Sync {
    /// Load the asset at `path` into memory
    async fn load(&self, path: &Path) -> LoaderResult<Vec<u8>>;

    /// Release an asset returned by [`load`](Self::load)
    fn unload(&self, asset: Vec<u8>) {
        drop(asset);
    }
}

/// Loads assets from the local file system
#[derive(Debug, Clone, Default)]
pub struct FileAssetLoader {
    /// Relative paths are resolved under this directory
    root: Option<PathBuf>,
    /// Files larger than this are refused
    max_size: Option<u64>,
}

impl FileAssetLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = Some(max_size);
        self
    }

    /// Map `path` onto the file system.
    pub fn resolve(&self, path: &Path) -> LoaderResult<PathBuf> {
        let Some(root) = &self.root else {
            return Ok(path.to_path_buf());
        };

        if path.is_absolute() {
            return Ok(path.to_path_buf());
        }

        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(LoaderError::OutsideRoot(path.to_path_buf()));
        }

        Ok(root.join(path))
    }
}

#[async_trait]
impl AssetLoader for FileAssetLoader {
    async fn load(&self, path: &Path) -> LoaderResult<Vec<u8>> {
        let full_path = self.resolve(path)?;

        let io_error = |source: io::Error| {
            if source.kind() == io::ErrorKind::NotFound {
                LoaderError::NotFound(full_path.clone())
            } else {
                LoaderError::Io {
                    path: full_path.clone(),
                    source,
                }
            }
        };

        let metadata = tokio::fs::metadata(&full_path).await.map_err(io_error)?;
        if !metadata.is_file() {
            return Err(LoaderError::NotFound(full_path.clone()));
        }

        if let Some(max) = self.max_size {
            if metadata.len() > max {
                return Err(LoaderError::TooLarge {
                    path: full_path.clone(),
                    size: metadata.len(),
                    max,
                });
            }
        }

        let asset = tokio::fs::read(&full_path).await.map_err(io_error)?;
        tracing::debug!("Loaded {} ({} bytes)", full_path.display(), asset.len());
        Ok(asset)
    }
}
