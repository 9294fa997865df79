//! Remote session interface
//!
//! Defines the file primitives the bucket layer needs from a transport.
//! The wire protocol lives entirely behind these traits.

use std::sync::Arc;

use async_trait::async_trait;
use store_core::{ConnectionConfig, DirEntry, FileStat, OpenMode, RemoteResult};
use tokio::io::{AsyncRead, AsyncWrite};

/// An open remote file
///
/// Writers must be shut down (`AsyncWriteExt::shutdown`) before being
/// dropped, otherwise buffered data may never reach the remote side.
pub trait RemoteFile: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> RemoteFile for T {}

/// File primitives of a live remote session
///
/// All paths are `/`-separated and relative to the session root. Errors
/// must be classified into [`store_core::RemoteErrorKind`].
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Open a file; writing modes create it if missing but never its parents
    async fn open(&self, path: &str, mode: OpenMode) -> RemoteResult<Box<dyn RemoteFile>>;

    async fn stat(&self, path: &str) -> RemoteResult<FileStat>;

    /// List a directory, without `.` and `..`
    async fn list_entries(&self, path: &str) -> RemoteResult<Vec<DirEntry>>;

    async fn mkdir(&self, path: &str) -> RemoteResult<()>;

    /// Remove an empty directory
    async fn rmdir(&self, path: &str) -> RemoteResult<()>;

    /// Remove a file
    async fn remove(&self, path: &str) -> RemoteResult<()>;

    async fn rename(&self, from: &str, to: &str) -> RemoteResult<()>;

    /// Tear the session down; no other call is made afterwards
    async fn close(&self) -> RemoteResult<()> {
        Ok(())
    }
}

/// Establishes sessions from connection settings
///
/// Called once when a connection is created and again on every
/// re-establish, always with the original settings.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self, config: &ConnectionConfig) -> RemoteResult<Arc<dyn RemoteSession>>;
}
