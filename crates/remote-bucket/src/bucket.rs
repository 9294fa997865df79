//! Key-value bucket over a remote directory tree

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use store_core::{Error, Metadata, OpenMode, RemoteError, RemoteResult, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, instrument, warn};

use crate::backend::{Bucket, Connection, PayloadSource};
use crate::connection::RemoteConnection;
use crate::escape::{escape, unescape};
use crate::layout::{dir_may_hold, object_path, parent_dir, ObjectPaths, DATA_SUFFIX};
use crate::session::RemoteSession;
use crate::walk::{walk, walk_pruned, WalkEntry};

/// Bucket stored as a directory on the remote host
///
/// Objects map to `<bucket>/<escaped key>.dat` / `.meta`, with bulk data
/// keys sharded below `<bucket>/s3ql_data/` (see [`crate::layout`]).
#[derive(Debug, Clone)]
pub struct RemoteBucket {
    conn: RemoteConnection,
    name: String,
}

impl RemoteBucket {
    pub(crate) fn new(conn: RemoteConnection, name: impl Into<String>) -> Self {
        Self {
            conn,
            name: name.into(),
        }
    }

    /// Run `op` on `path`; if it fails because the parent directory is
    /// missing, create the directory chain and run it exactly once more
    async fn with_parent_dirs<T, F, Fut>(&self, path: &str, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = RemoteResult<T>>,
    {
        match op().await {
            Err(e) if e.is_not_found() => {
                let dir = parent_dir(path);
                warn!(bucket = %self.name, %dir, "Parent directory missing, creating it");
                self.conn.make_dirs(dir).await?;
                Ok(op().await?)
            }
            result => Ok(result?),
        }
    }

    /// Map a missing file to `KeyNotFound`
    fn key_error(key: &str, err: RemoteError) -> Error {
        if err.is_not_found() {
            Error::KeyNotFound {
                key: key.to_string(),
            }
        } else {
            Error::Transport(err)
        }
    }

    async fn read_metadata(
        &self,
        session: &Arc<dyn RemoteSession>,
        key: &str,
        paths: &ObjectPaths,
    ) -> Result<Metadata> {
        let mut src = session
            .open(&paths.meta, OpenMode::Read)
            .await
            .map_err(|e| Self::key_error(key, e))?;

        let mut buf = Vec::new();
        src.read_to_end(&mut buf)
            .await
            .map_err(|e| RemoteError::from_io(&paths.meta, &e))?;

        self.conn
            .codec()
            .decode(&buf)
            .map_err(|e| Error::CorruptMetadata {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    async fn write_metadata(
        &self,
        session: &Arc<dyn RemoteSession>,
        paths: &ObjectPaths,
        metadata: &Metadata,
    ) -> Result<()> {
        let encoded = self.conn.codec().encode(metadata)?;

        let mut dest = session.open(&paths.meta, OpenMode::Write).await?;
        dest.write_all(&encoded)
            .await
            .map_err(|e| RemoteError::from_io(&paths.meta, &e))?;
        dest.shutdown()
            .await
            .map_err(|e| RemoteError::from_io(&paths.meta, &e))?;
        Ok(())
    }

    /// Copy `source` from its current position into a freshly opened data file
    async fn write_data<R>(
        &self,
        session: &Arc<dyn RemoteSession>,
        paths: &ObjectPaths,
        source: &mut R,
    ) -> Result<u64>
    where
        R: AsyncRead + Send + Unpin + ?Sized,
    {
        let mut dest = self
            .with_parent_dirs(&paths.data, || session.open(&paths.data, OpenMode::Write))
            .await?;

        let size = tokio::io::copy(source, &mut dest)
            .await
            .map_err(|e| RemoteError::from_io(&paths.data, &e))?;
        dest.shutdown()
            .await
            .map_err(|e| RemoteError::from_io(&paths.data, &e))?;
        Ok(size)
    }
}

/// Keys in one walked directory that match `prefix`
fn matching_keys(entry: WalkEntry, prefix: &str) -> Vec<String> {
    entry
        .files
        .into_iter()
        .filter_map(|file| file.name.strip_suffix(DATA_SUFFIX).map(unescape))
        .filter(|key| key.starts_with(prefix))
        .collect()
}

/// Walk the part of `bucket` below `base` that can hold keys starting with
/// `prefix`
///
/// A missing `base` yields an empty walk unless it is the bucket itself.
async fn walk_from(
    conn: RemoteConnection,
    bucket: String,
    base: String,
    prefix: String,
) -> Result<BoxStream<'static, Result<WalkEntry>>> {
    let session = conn.session()?;
    if base != bucket && !conn.contains_path(&base).await? {
        debug!(%base, "Listing root does not exist");
        return Ok(stream::empty().boxed());
    }

    let escaped_prefix = escape(&prefix);
    Ok(walk_pruned(session, base, move |dir: &str| {
        dir_may_hold(&bucket, dir, &escaped_prefix)
    }))
}

#[async_trait]
impl Bucket for RemoteBucket {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(bucket = %self.name))]
    async fn contains(&self, key: &str) -> Result<bool> {
        let paths = ObjectPaths::new(&self.name, key);
        self.conn.contains_path(&paths.data).await
    }

    #[instrument(skip(self), fields(bucket = %self.name))]
    async fn fetch_metadata(&self, key: &str) -> Result<Metadata> {
        let session = self.conn.session()?;
        let paths = ObjectPaths::new(&self.name, key);
        self.read_metadata(&session, key, &paths).await
    }

    #[instrument(skip(self, sink), fields(bucket = %self.name))]
    async fn fetch(
        &self,
        key: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<Metadata> {
        let session = self.conn.session()?;
        let paths = ObjectPaths::new(&self.name, key);

        let mut src = session
            .open(&paths.data, OpenMode::Read)
            .await
            .map_err(|e| Self::key_error(key, e))?;
        let size = tokio::io::copy(&mut src, sink)
            .await
            .map_err(|e| RemoteError::from_io(&paths.data, &e))?;

        let metadata = self.read_metadata(&session, key, &paths).await?;
        debug!(size, "Fetched object");
        Ok(metadata)
    }

    #[instrument(skip(self, source, metadata), fields(bucket = %self.name))]
    async fn store(
        &self,
        key: &str,
        source: &mut dyn PayloadSource,
        metadata: &Metadata,
    ) -> Result<u64> {
        let session = self.conn.session()?;
        let paths = ObjectPaths::new(&self.name, key);

        source
            .rewind()
            .await
            .map_err(|e| RemoteError::from_io(&paths.data, &e))?;
        let size = self.write_data(&session, &paths, source).await?;
        self.write_metadata(&session, &paths, metadata).await?;

        debug!(size, path = %paths.data, "Stored object");
        Ok(size)
    }

    #[instrument(skip(self), fields(bucket = %self.name))]
    async fn delete(&self, key: &str, force: bool) -> Result<()> {
        let session = self.conn.session()?;
        let paths = ObjectPaths::new(&self.name, key);

        match session.remove(&paths.data).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() && force => {
                debug!("Object already absent");
                return Ok(());
            }
            Err(e) => return Err(Self::key_error(key, e)),
        }

        match session.remove(&paths.meta).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                warn!(path = %paths.meta, "Object had no metadata file");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self), fields(bucket = %self.name))]
    async fn rename(&self, old_key: &str, new_key: &str) -> Result<()> {
        let session = self.conn.session()?;
        let src = ObjectPaths::new(&self.name, old_key);
        let dest = ObjectPaths::new(&self.name, new_key);

        if !self.conn.contains_path(&src.data).await? {
            return Err(Error::KeyNotFound {
                key: old_key.to_string(),
            });
        }

        self.with_parent_dirs(&dest.data, || session.rename(&src.data, &dest.data))
            .await?;
        // Both files share a directory, which exists now
        match session.rename(&src.meta, &dest.meta).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                warn!(path = %src.meta, "Object had no metadata file");
            }
            Err(e) => return Err(e.into()),
        }

        debug!(from = %src.data, to = %dest.data, "Renamed object");
        Ok(())
    }

    #[instrument(skip(self, metadata), fields(bucket = %self.name))]
    async fn copy(
        &self,
        src_key: &str,
        dest_key: &str,
        metadata: Option<&Metadata>,
    ) -> Result<()> {
        if src_key == dest_key {
            // Copying onto itself would truncate the source while reading it
            if let Some(metadata) = metadata {
                return self.update_metadata(src_key, metadata).await;
            }
            if !self.contains(src_key).await? {
                return Err(Error::KeyNotFound {
                    key: src_key.to_string(),
                });
            }
            return Ok(());
        }

        let session = self.conn.session()?;
        let src = ObjectPaths::new(&self.name, src_key);
        let dest = ObjectPaths::new(&self.name, dest_key);

        let mut reader = session
            .open(&src.data, OpenMode::Read)
            .await
            .map_err(|e| Self::key_error(src_key, e))?;
        let metadata = match metadata {
            Some(metadata) => metadata.clone(),
            None => self.read_metadata(&session, src_key, &src).await?,
        };

        let size = self.write_data(&session, &dest, &mut reader).await?;
        self.write_metadata(&session, &dest, &metadata).await?;

        debug!(size, from = %src.data, to = %dest.data, "Copied object");
        Ok(())
    }

    #[instrument(skip(self, metadata), fields(bucket = %self.name))]
    async fn update_metadata(&self, key: &str, metadata: &Metadata) -> Result<()> {
        let session = self.conn.session()?;
        let paths = ObjectPaths::new(&self.name, key);

        if !self.conn.contains_path(&paths.data).await? {
            return Err(Error::KeyNotFound {
                key: key.to_string(),
            });
        }
        self.write_metadata(&session, &paths, metadata).await
    }

    #[instrument(skip(self), fields(bucket = %self.name))]
    async fn object_size(&self, key: &str) -> Result<u64> {
        let session = self.conn.session()?;
        let paths = ObjectPaths::new(&self.name, key);

        let stat = session
            .stat(&paths.data)
            .await
            .map_err(|e| Self::key_error(key, e))?;
        Ok(stat.size)
    }

    fn list(&self, prefix: &str) -> BoxStream<'_, Result<String>> {
        let base = if prefix.is_empty() {
            self.name.clone()
        } else {
            parent_dir(&object_path(&self.name, prefix)).to_string()
        };
        let prefix = prefix.to_string();

        let walker = walk_from(self.conn.clone(), self.name.clone(), base, prefix.clone());

        stream::once(walker)
            .try_flatten()
            .map_ok(move |entry| {
                stream::iter(matching_keys(entry, &prefix).into_iter().map(Ok::<_, Error>))
            })
            .try_flatten()
            .boxed()
    }

    #[instrument(skip(self), fields(bucket = %self.name))]
    async fn get_size(&self) -> Result<u64> {
        let session = self.conn.session()?;
        let mut walker = walk(session, self.name.clone());

        let mut size = 0u64;
        while let Some(entry) = walker.try_next().await? {
            size += entry
                .files
                .iter()
                .filter(|file| file.name.ends_with(DATA_SUFFIX))
                .map(|file| file.size)
                .sum::<u64>();
        }
        Ok(size)
    }

    #[instrument(skip(self), fields(bucket = %self.name))]
    async fn clear(&self) -> Result<()> {
        self.conn.purge(&self.name).await
    }
}

impl fmt::Display for RemoteBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<remote bucket, name={:?}>", self.name)
    }
}
