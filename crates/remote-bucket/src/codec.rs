//! Metadata record codecs

use std::sync::Arc;

use store_core::{Metadata, MetadataFormat, Result};

/// Encodes metadata records to bytes and back
pub trait MetadataCodec: Send + Sync {
    fn encode(&self, metadata: &Metadata) -> Result<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> Result<Metadata>;
}

/// JSON encoding via serde_json
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl MetadataCodec for JsonCodec {
    fn encode(&self, metadata: &Metadata) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(metadata)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Metadata> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Compact binary encoding via bincode
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl MetadataCodec for BincodeCodec {
    fn encode(&self, metadata: &Metadata) -> Result<Vec<u8>> {
        Ok(bincode::serialize(metadata)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Metadata> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Codec for a configured format
pub fn codec_for(format: MetadataFormat) -> Arc<dyn MetadataCodec> {
    match format {
        MetadataFormat::Json => Arc::new(JsonCodec),
        MetadataFormat::Bincode => Arc::new(BincodeCodec),
    }
}
