//! Remote Bucket - Key-value object buckets on a remote filesystem
//!
//! Stores binary objects with small metadata records in directories of a
//! remote host reached through a stateful session (SFTP-like):
//! - Reversible key escaping so any string can be a key
//! - Sharded directory layout for high-cardinality data keys
//! - On-demand creation of missing parent directories
//! - Lazy key listing over the remote tree
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use remote_bucket::{Bucket, Connection, RemoteConnection};
//! use store_core::Metadata;
//!
//! # async fn example() -> store_core::Result<()> {
//! let conn = RemoteConnection::local("/srv/storage").await?;
//! let bucket = conn.create_bucket("backups").await?;
//! let meta = Metadata::new().with("compressed", false);
//! bucket.store_bytes("s3ql_data_1", Bytes::from_static(b"block"), &meta).await?;
//! let (meta, data) = bucket.fetch_bytes("s3ql_data_1").await?;
//! # Ok(())
//! # }
//! ```

mod backend;
mod bucket;
pub mod codec;
mod connection;
pub mod escape;
pub mod layout;
pub mod session;
pub mod walk;

#[cfg(feature = "local")]
mod local;

pub use backend::{Bucket, Connection, PayloadSource};
pub use bucket::RemoteBucket;
pub use codec::{BincodeCodec, JsonCodec, MetadataCodec};
pub use connection::RemoteConnection;
pub use session::{RemoteFile, RemoteSession, SessionConnector};

#[cfg(feature = "local")]
pub use local::{LocalConnector, LocalSession};
