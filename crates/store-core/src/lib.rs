//! Store Core - Foundation for the remote bucket store
//!
//! Provides the error taxonomy, connection configuration and the data
//! types shared between the session transports and the bucket layer.

pub mod config;
pub mod error;
pub mod types;

pub use config::{ConnectionConfig, MetadataFormat};
pub use error::{Error, RemoteError, RemoteErrorKind, RemoteResult, Result};
pub use types::*;
