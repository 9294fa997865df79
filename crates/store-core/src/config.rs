//! Connection configuration types

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Settings used to establish (and re-establish) a remote session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Remote host name or address
    pub host: String,

    /// Remote port
    pub port: u16,

    /// Login name
    pub login: String,

    /// Password, if password authentication is used
    pub password: Option<String>,

    /// Remote directory that buckets live under (session default if unset)
    pub root: Option<String>,

    /// Encoding of the per-object metadata files
    pub metadata_format: MetadataFormat,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 22,
            login: String::new(),
            password: None,
            root: None,
            metadata_format: MetadataFormat::default(),
        }
    }
}

impl ConnectionConfig {
    /// Config for `host` with everything else defaulted
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    pub fn with_credentials(mut self, login: impl Into<String>, password: Option<String>) -> Self {
        self.login = login.into();
        self.password = password;
        self
    }

    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn with_metadata_format(mut self, format: MetadataFormat) -> Self {
        self.metadata_format = format;
        self
    }

    /// Parse a JSON document and validate it
    pub fn from_json(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidConfig {
                message: "host must not be empty".to_string(),
            });
        }
        if self.port == 0 {
            return Err(Error::InvalidConfig {
                message: "port must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Metadata record encoding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataFormat {
    /// Self-describing JSON
    #[default]
    Json,

    /// Compact bincode
    Bincode,
}
