//! Local filesystem session
//!
//! Serves a local directory tree through the [`RemoteSession`] interface.
//! Used for buckets on locally mounted storage and as the test transport.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use store_core::{
    ConnectionConfig, DirEntry, FileStat, OpenMode, RemoteError, RemoteErrorKind, RemoteResult,
};
use tokio::fs;
use tracing::{debug, info, instrument};

use crate::session::{RemoteFile, RemoteSession, SessionConnector};

/// Local filesystem session rooted at a directory
#[derive(Debug, Clone)]
pub struct LocalSession {
    /// Directory all session paths are resolved against
    root: PathBuf,
}

impl LocalSession {
    /// Create a new LocalSession
    ///
    /// # Arguments
    /// * `root` - Directory that plays the role of the remote root
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Resolve a session path to a local path
    fn resolve_path(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

#[async_trait]
impl RemoteSession for LocalSession {
    #[instrument(skip(self), fields(backend = "local"))]
    async fn open(&self, path: &str, mode: OpenMode) -> RemoteResult<Box<dyn RemoteFile>> {
        let full_path = self.resolve_path(path);
        debug!(?full_path, "Opening file");

        let mut options = fs::OpenOptions::new();
        match mode {
            OpenMode::Read => options.read(true),
            OpenMode::Write => options.write(true).create(true).truncate(true),
            OpenMode::Append => options.append(true).create(true),
        };

        let file = options
            .open(&full_path)
            .await
            .map_err(|e| RemoteError::from_io(path, &e))?;
        Ok(Box::new(file))
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn stat(&self, path: &str) -> RemoteResult<FileStat> {
        let metadata = fs::metadata(self.resolve_path(path))
            .await
            .map_err(|e| RemoteError::from_io(path, &e))?;
        Ok(FileStat {
            is_dir: metadata.is_dir(),
            size: metadata.len(),
        })
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn list_entries(&self, path: &str) -> RemoteResult<Vec<DirEntry>> {
        let mut entries = fs::read_dir(self.resolve_path(path))
            .await
            .map_err(|e| RemoteError::from_io(path, &e))?;

        let mut results = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RemoteError::from_io(path, &e))?
        {
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| RemoteError::from_io(path, &e))?;
            let name = entry.file_name().into_string().map_err(|raw| {
                RemoteError::new(
                    RemoteErrorKind::Other,
                    path,
                    format!("entry name is not valid UTF-8: {:?}", raw),
                )
            })?;

            results.push(DirEntry {
                name,
                is_dir: metadata.is_dir(),
                size: metadata.len(),
            });
        }

        debug!(count = results.len(), "Listed directory");
        Ok(results)
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn mkdir(&self, path: &str) -> RemoteResult<()> {
        fs::create_dir(self.resolve_path(path))
            .await
            .map_err(|e| RemoteError::from_io(path, &e))
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn rmdir(&self, path: &str) -> RemoteResult<()> {
        fs::remove_dir(self.resolve_path(path))
            .await
            .map_err(|e| RemoteError::from_io(path, &e))
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn remove(&self, path: &str) -> RemoteResult<()> {
        fs::remove_file(self.resolve_path(path))
            .await
            .map_err(|e| RemoteError::from_io(path, &e))
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn rename(&self, from: &str, to: &str) -> RemoteResult<()> {
        fs::rename(self.resolve_path(from), self.resolve_path(to))
            .await
            .map_err(|e| RemoteError::from_io(to, &e))
    }
}

/// Connector producing [`LocalSession`]s below a base directory
///
/// `config.root`, if set, selects a subdirectory of the base directory.
#[derive(Debug, Clone)]
pub struct LocalConnector {
    base_path: PathBuf,
}

impl LocalConnector {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl SessionConnector for LocalConnector {
    async fn connect(&self, config: &ConnectionConfig) -> RemoteResult<Arc<dyn RemoteSession>> {
        let root = match &config.root {
            Some(sub) => self.base_path.join(sub.trim_start_matches('/')),
            None => self.base_path.clone(),
        };
        let root_display = root.display().to_string();

        let metadata = fs::metadata(&root)
            .await
            .map_err(|e| RemoteError::from_io(root_display.clone(), &e))?;
        if !metadata.is_dir() {
            return Err(RemoteError::new(
                RemoteErrorKind::Other,
                root_display,
                "session root is not a directory",
            ));
        }

        info!(
            host = %config.host,
            login = %config.login,
            root = %root_display,
            "Local session established"
        );
        Ok(Arc::new(LocalSession::new(root)))
    }
}
