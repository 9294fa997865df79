//! Key to remote path mapping
//!
//! Flat keys live directly under the bucket directory. Bulk data keys
//! (escaped form starting with [`DATA_KEY_PREFIX`]) are sharded into nested
//! directories named after growing prefixes of their numeric suffix, which
//! keeps every directory at a bounded number of entries.

use crate::escape::escape;

/// Escaped-key prefix of the high-cardinality bulk data keys
pub const DATA_KEY_PREFIX: &str = "s3ql_data_";

/// Directory under the bucket that holds the sharded tree
pub const DATA_DIR: &str = "s3ql_data";

/// Characters added per shard level
pub const SHARD_WIDTH: usize = 3;

/// Suffix of payload files
pub const DATA_SUFFIX: &str = ".dat";

/// Suffix of metadata files
pub const META_SUFFIX: &str = ".meta";

/// Join remote path components with `/`
pub fn join(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), name)
    }
}

/// Directory part of a remote path (empty for a bare name)
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[..pos],
        None => "",
    }
}

/// Base path (without suffix) of the object stored under `key`
pub fn object_path(bucket: &str, key: &str) -> String {
    let escaped = escape(key);

    let Some(suffix) = escaped.strip_prefix(DATA_KEY_PREFIX) else {
        return join(bucket, &escaped);
    };

    let mut path = join(bucket, DATA_DIR);
    // Byte offsets of every SHARD_WIDTH-th character strictly inside the suffix
    for (count, (offset, _)) in suffix.char_indices().enumerate() {
        if count > 0 && count % SHARD_WIDTH == 0 {
            path = join(&path, &suffix[..offset]);
        }
    }
    join(&path, &escaped)
}

/// Check if the directory `dir` of `bucket` can hold objects whose escaped
/// key starts with `escaped_prefix`
///
/// Only the sharded tree is ever ruled out: a shard directory is named after
/// a prefix of its keys' suffix, so it can match only if that name and the
/// prefix's suffix agree as far as both go.
pub fn dir_may_hold(bucket: &str, dir: &str, escaped_prefix: &str) -> bool {
    let data_root = join(bucket, DATA_DIR);
    if dir == data_root {
        return prefix_compatible(escaped_prefix, DATA_KEY_PREFIX);
    }

    let Some(shard_path) = dir
        .strip_prefix(data_root.as_str())
        .and_then(|rest| rest.strip_prefix('/'))
    else {
        return true;
    };
    let shard = match shard_path.rfind('/') {
        Some(pos) => &shard_path[pos + 1..],
        None => shard_path,
    };

    match escaped_prefix.strip_prefix(DATA_KEY_PREFIX) {
        Some(suffix) => prefix_compatible(suffix, shard),
        None => prefix_compatible(escaped_prefix, DATA_KEY_PREFIX),
    }
}

fn prefix_compatible(a: &str, b: &str) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

/// Paths of the payload and metadata files of one object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectPaths {
    pub data: String,
    pub meta: String,
}

impl ObjectPaths {
    pub fn new(bucket: &str, key: &str) -> Self {
        let base = object_path(bucket, key);
        Self {
            data: format!("{}{}", base, DATA_SUFFIX),
            meta: format!("{}{}", base, META_SUFFIX),
        }
    }

    /// Directory both files live in
    pub fn dir(&self) -> &str {
        parent_dir(&self.data)
    }
}
