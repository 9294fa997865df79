//! Connection and bucket trait definitions
//!
//! Defines the async interface a transport-specific store implements.

use std::io::Cursor;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use store_core::{Metadata, Result};
use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite};

/// Payload source accepted by [`Bucket::store`]
///
/// Must be seekable: the store rewinds it before copying.
pub trait PayloadSource: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin + ?Sized> PayloadSource for T {}

/// A key-value namespace of objects
///
/// Each object is a binary payload plus a [`Metadata`] record. Payload and
/// metadata are written as two separate remote files, so a crash in the
/// middle of `store`, `rename` or `delete` can leave one without the other.
#[async_trait]
pub trait Bucket: Send + Sync {
    /// Bucket name, fixed at construction
    fn name(&self) -> &str;

    /// Check if an object is stored under `key`
    async fn contains(&self, key: &str) -> Result<bool>;

    /// Read the metadata of an object
    ///
    /// # Errors
    /// `KeyNotFound` if the object does not exist
    async fn fetch_metadata(&self, key: &str) -> Result<Metadata>;

    /// Copy the payload of an object into `sink` and return its metadata
    ///
    /// Writing starts at the sink's current position; positioning the sink
    /// is the caller's business.
    ///
    /// # Errors
    /// `KeyNotFound` if the object does not exist
    async fn fetch(
        &self,
        key: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<Metadata>;

    /// Store the whole of `source` under `key`
    ///
    /// The source is rewound first, so a buffer the caller has just filled
    /// can be passed as is. Overwrites any existing object. Missing parent
    /// directories are created on demand.
    ///
    /// # Returns
    /// Number of payload bytes written
    async fn store(
        &self,
        key: &str,
        source: &mut dyn PayloadSource,
        metadata: &Metadata,
    ) -> Result<u64>;

    /// Delete an object
    ///
    /// # Errors
    /// `KeyNotFound` if the object does not exist and `force` is false
    async fn delete(&self, key: &str, force: bool) -> Result<()>;

    /// Move an object to a new key, payload and metadata alike
    ///
    /// # Errors
    /// `KeyNotFound` if `old_key` does not exist; the bucket is left unchanged
    async fn rename(&self, old_key: &str, new_key: &str) -> Result<()>;

    /// Copy an object, optionally replacing its metadata
    async fn copy(
        &self,
        src_key: &str,
        dest_key: &str,
        metadata: Option<&Metadata>,
    ) -> Result<()>;

    /// Replace the metadata of an existing object
    async fn update_metadata(&self, key: &str, metadata: &Metadata) -> Result<()>;

    /// Payload size of one object
    async fn object_size(&self, key: &str) -> Result<u64>;

    /// Lazily list keys starting with `prefix` (all keys for `""`)
    fn list(&self, prefix: &str) -> BoxStream<'_, Result<String>>;

    /// Total payload size of all objects
    async fn get_size(&self) -> Result<u64>;

    /// Remove every object, keeping the bucket itself
    async fn clear(&self) -> Result<()>;

    /// Store an in-memory payload
    async fn store_bytes(&self, key: &str, data: Bytes, metadata: &Metadata) -> Result<u64> {
        let mut source = Cursor::new(data);
        self.store(key, &mut source, metadata).await
    }

    /// Fetch a payload into memory
    async fn fetch_bytes(&self, key: &str) -> Result<(Metadata, Bytes)> {
        let mut buf = Vec::new();
        let metadata = self.fetch(key, &mut buf).await?;
        Ok((metadata, Bytes::from(buf)))
    }
}

/// Owner of a remote session and factory of buckets
#[async_trait]
pub trait Connection: Send + Sync {
    type Bucket: Bucket;

    /// Check if a remote path exists
    async fn contains_path(&self, path: &str) -> Result<bool>;

    /// Create a new bucket
    ///
    /// # Errors
    /// `AlreadyExists` if a bucket of that name exists
    async fn create_bucket(&self, name: &str) -> Result<Self::Bucket>;

    /// Open an existing bucket
    ///
    /// # Errors
    /// `BucketNotFound` if there is no such bucket
    async fn open_bucket(&self, name: &str) -> Result<Self::Bucket>;

    /// Delete a bucket, purging its objects first if `recursive`
    ///
    /// # Errors
    /// `BucketNotFound` if there is no such bucket, `NotEmpty` if it still
    /// holds objects and `recursive` is false
    async fn delete_bucket(&self, name: &str, recursive: bool) -> Result<()>;

    /// Tear down the session (e.g. before forking)
    async fn close(&self) -> Result<()>;

    /// Reconnect with the original settings; existing buckets stay usable
    async fn reestablish(&self) -> Result<()>;
}
