//! Remote connection: session lifecycle and bucket management

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use parking_lot::RwLock;
use store_core::{ConnectionConfig, Error, RemoteErrorKind, Result};
use tracing::{debug, info, instrument};

use crate::backend::Connection;
use crate::bucket::RemoteBucket;
use crate::codec::{codec_for, MetadataCodec};
use crate::layout::join;
use crate::session::{RemoteSession, SessionConnector};
use crate::walk::walk;

#[cfg(feature = "local")]
use crate::local::LocalConnector;

/// Connection to a remote host
///
/// Cheap to clone; clones share the same session. Buckets hold a clone of
/// the connection rather than the session, so they survive a
/// [`close`](Connection::close) / [`reestablish`](Connection::reestablish)
/// cycle. Calls made while closed fail with [`Error::Disconnected`].
#[derive(Clone)]
pub struct RemoteConnection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    config: ConnectionConfig,
    connector: Arc<dyn SessionConnector>,
    session: RwLock<Option<Arc<dyn RemoteSession>>>,
    codec: Arc<dyn MetadataCodec>,
}

impl RemoteConnection {
    /// Validate `config` and establish the first session
    pub async fn connect(
        config: ConnectionConfig,
        connector: Arc<dyn SessionConnector>,
    ) -> Result<Self> {
        config.validate()?;
        let session = connector.connect(&config).await?;
        info!(host = %config.host, port = config.port, login = %config.login, "Connected");

        let codec = codec_for(config.metadata_format);
        Ok(Self {
            inner: Arc::new(ConnectionInner {
                config,
                connector,
                session: RwLock::new(Some(session)),
                codec,
            }),
        })
    }

    /// Connect to a directory of the local filesystem
    #[cfg(feature = "local")]
    pub async fn local<P: AsRef<std::path::Path>>(base_path: P) -> Result<Self> {
        Self::connect(
            ConnectionConfig::default(),
            Arc::new(LocalConnector::new(base_path)),
        )
        .await
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn is_connected(&self) -> bool {
        self.inner.session.read().is_some()
    }

    /// The live session
    pub(crate) fn session(&self) -> Result<Arc<dyn RemoteSession>> {
        self.inner.session.read().clone().ok_or(Error::Disconnected)
    }

    pub(crate) fn codec(&self) -> &dyn MetadataCodec {
        self.inner.codec.as_ref()
    }

    /// Create every missing component of `dir`, outermost first
    ///
    /// Meant as the recovery step after a write failed on a missing parent.
    ///
    /// # Errors
    /// `AlreadyExists` if no component was missing
    #[instrument(skip(self))]
    pub async fn make_dirs(&self, dir: &str) -> Result<()> {
        let session = self.session()?;
        let mut current = String::new();
        let mut created = false;

        for component in dir.split('/').filter(|c| !c.is_empty()) {
            current = join(&current, component);
            if !self.contains_path(&current).await? {
                session.mkdir(&current).await?;
                debug!(path = %current, "Created directory");
                created = true;
            }
        }

        if !created {
            return Err(Error::AlreadyExists {
                path: dir.to_string(),
            });
        }
        Ok(())
    }

    /// Delete everything below `path`, keeping `path` itself
    ///
    /// Files are removed while walking; directories afterwards, deepest
    /// first.
    #[instrument(skip(self))]
    pub async fn purge(&self, path: &str) -> Result<()> {
        let session = self.session()?;
        let mut dirs = Vec::new();
        let mut files = 0usize;

        let mut walker = walk(session.clone(), path.to_string());
        while let Some(entry) = walker.try_next().await? {
            for file in &entry.files {
                session.remove(&join(&entry.dir, &file.name)).await?;
                files += 1;
            }
            if entry.dir != path {
                dirs.push(entry.dir);
            }
        }

        // A directory is always visited before its children
        for dir in dirs.iter().rev() {
            session.rmdir(dir).await?;
        }

        debug!(files, dirs = dirs.len(), "Purged tree");
        Ok(())
    }
}

#[async_trait]
impl Connection for RemoteConnection {
    type Bucket = RemoteBucket;

    async fn contains_path(&self, path: &str) -> Result<bool> {
        match self.session()?.stat(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    async fn create_bucket(&self, name: &str) -> Result<RemoteBucket> {
        let already_exists = || Error::AlreadyExists {
            path: name.to_string(),
        };

        if self.contains_path(name).await? {
            return Err(already_exists());
        }
        match self.session()?.mkdir(name).await {
            Ok(()) => {}
            Err(e) if e.kind == RemoteErrorKind::AlreadyExists => return Err(already_exists()),
            Err(e) => return Err(e.into()),
        }

        info!(bucket = %name, "Created bucket");
        Ok(RemoteBucket::new(self.clone(), name))
    }

    async fn open_bucket(&self, name: &str) -> Result<RemoteBucket> {
        if !self.contains_path(name).await? {
            return Err(Error::BucketNotFound {
                bucket: name.to_string(),
            });
        }
        Ok(RemoteBucket::new(self.clone(), name))
    }

    #[instrument(skip(self))]
    async fn delete_bucket(&self, name: &str, recursive: bool) -> Result<()> {
        if !self.contains_path(name).await? {
            return Err(Error::BucketNotFound {
                bucket: name.to_string(),
            });
        }

        if recursive {
            self.purge(name).await?;
        }

        match self.session()?.rmdir(name).await {
            Ok(()) => {
                info!(bucket = %name, "Deleted bucket");
                Ok(())
            }
            Err(e) if e.kind == RemoteErrorKind::NotEmpty => Err(Error::NotEmpty {
                path: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn close(&self) -> Result<()> {
        let session = self.inner.session.write().take();
        if let Some(session) = session {
            session.close().await?;
            info!(host = %self.inner.config.host, "Session closed");
        }
        Ok(())
    }

    async fn reestablish(&self) -> Result<()> {
        let session = self.inner.connector.connect(&self.inner.config).await?;
        let previous = self.inner.session.write().replace(session);
        if let Some(previous) = previous {
            previous.close().await?;
        }

        info!(host = %self.inner.config.host, "Session re-established");
        Ok(())
    }
}

impl fmt::Debug for RemoteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConnection")
            .field("host", &self.inner.config.host)
            .field("port", &self.inner.config.port)
            .field("connected", &self.is_connected())
            .finish()
    }
}
