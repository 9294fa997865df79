use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use parking_lot::Mutex;
use remote_bucket::{
    Bucket, Connection, LocalSession, RemoteBucket, RemoteConnection, RemoteFile, RemoteSession,
    SessionConnector,
};
use store_core::{
    ConnectionConfig, DirEntry, Error, FileStat, Metadata, MetadataFormat, OpenMode, RemoteError,
    RemoteErrorKind, RemoteResult,
};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Injected failures and call counters shared by a session and its test
#[derive(Debug, Default)]
struct Faults {
    /// Fail every write-mode open of a `.dat` file with this kind
    fail_data_writes: Option<RemoteErrorKind>,
    data_write_opens: usize,
    mkdirs: usize,
    /// Directories listed, in call order
    listed: Vec<String>,
    /// Credentials presented on every connect
    logins: Vec<(String, Option<String>)>,
    closes: usize,
}

/// Local session wrapper that counts calls and injects failures
struct FaultySession {
    inner: LocalSession,
    faults: Arc<Mutex<Faults>>,
}

#[async_trait]
impl RemoteSession for FaultySession {
    async fn open(&self, path: &str, mode: OpenMode) -> RemoteResult<Box<dyn RemoteFile>> {
        if mode != OpenMode::Read && path.ends_with(".dat") {
            let injected = {
                let mut faults = self.faults.lock();
                faults.data_write_opens += 1;
                faults.fail_data_writes
            };
            if let Some(kind) = injected {
                return Err(RemoteError::new(kind, path, "injected failure"));
            }
        }
        self.inner.open(path, mode).await
    }

    async fn stat(&self, path: &str) -> RemoteResult<FileStat> {
        self.inner.stat(path).await
    }

    async fn list_entries(&self, path: &str) -> RemoteResult<Vec<DirEntry>> {
        self.faults.lock().listed.push(path.to_string());
        self.inner.list_entries(path).await
    }

    async fn mkdir(&self, path: &str) -> RemoteResult<()> {
        self.faults.lock().mkdirs += 1;
        self.inner.mkdir(path).await
    }

    async fn rmdir(&self, path: &str) -> RemoteResult<()> {
        self.inner.rmdir(path).await
    }

    async fn remove(&self, path: &str) -> RemoteResult<()> {
        self.inner.remove(path).await
    }

    async fn rename(&self, from: &str, to: &str) -> RemoteResult<()> {
        self.inner.rename(from, to).await
    }

    async fn close(&self) -> RemoteResult<()> {
        self.faults.lock().closes += 1;
        Ok(())
    }
}

struct FaultyConnector {
    base_path: PathBuf,
    faults: Arc<Mutex<Faults>>,
}

#[async_trait]
impl SessionConnector for FaultyConnector {
    async fn connect(&self, config: &ConnectionConfig) -> RemoteResult<Arc<dyn RemoteSession>> {
        self.faults
            .lock()
            .logins
            .push((config.login.clone(), config.password.clone()));
        Ok(Arc::new(FaultySession {
            inner: LocalSession::new(&self.base_path),
            faults: self.faults.clone(),
        }))
    }
}

async fn faulty_connection(base: &Path) -> Result<(RemoteConnection, Arc<Mutex<Faults>>)> {
    let faults = Arc::new(Mutex::new(Faults::default()));
    let connector = Arc::new(FaultyConnector {
        base_path: base.to_path_buf(),
        faults: faults.clone(),
    });
    let config = ConnectionConfig::new("sftp.example.org")
        .with_credentials("backup", Some("hunter2".to_string()));
    let conn = RemoteConnection::connect(config, connector).await?;
    Ok((conn, faults))
}

async fn local_bucket(temp_dir: &TempDir, name: &str) -> Result<RemoteBucket> {
    let conn = RemoteConnection::local(temp_dir.path()).await?;
    Ok(conn.create_bucket(name).await?)
}

fn meta(n: i64) -> Metadata {
    Metadata::new()
        .with("seq", n)
        .with("encrypted", true)
        .with("compression", "bzip2")
}

async fn list(bucket: &RemoteBucket, prefix: &str) -> Result<BTreeSet<String>> {
    Ok(bucket.list(prefix).try_collect().await?)
}

#[tokio::test]
async fn test_round_trip_flat_and_sharded() -> Result<()> {
    init_tracing();
    let temp_dir = TempDir::new()?;
    let bucket = local_bucket(&temp_dir, "fs").await?;

    let keys = [
        "s3ql_metadata",
        "with/slash",
        "with=marker",
        "with\0nul",
        "s3ql_data_7",
        "s3ql_data_000123",
        "s3ql_data_1234567890",
    ];
    for (i, key) in keys.iter().enumerate() {
        let payload = Bytes::from(format!("object #{} under {:?}", i, key));
        bucket.store_bytes(key, payload, &meta(i as i64)).await?;
    }

    for (i, key) in keys.iter().enumerate() {
        assert!(bucket.contains(key).await?);
        let (metadata, data) = bucket.fetch_bytes(key).await?;
        assert_eq!(metadata, meta(i as i64));
        assert_eq!(data, Bytes::from(format!("object #{} under {:?}", i, key)));
    }

    assert_eq!(
        list(&bucket, "").await?,
        keys.iter().map(|k| k.to_string()).collect::<BTreeSet<_>>()
    );
    Ok(())
}

#[tokio::test]
async fn test_list_sharded_and_flat() -> Result<()> {
    init_tracing();
    let temp_dir = TempDir::new()?;
    let bucket = local_bucket(&temp_dir, "fs").await?;

    for key in ["a", "b", "s3ql_data_000001", "s3ql_data_000123"] {
        bucket.store_bytes(key, Bytes::from("v"), &meta(0)).await?;
    }

    assert_eq!(
        list(&bucket, "").await?,
        BTreeSet::from(["a", "b", "s3ql_data_000001", "s3ql_data_000123"].map(String::from))
    );
    assert_eq!(
        list(&bucket, "s3ql_data_").await?,
        BTreeSet::from(["s3ql_data_000001", "s3ql_data_000123"].map(String::from))
    );

    // Listings are restartable
    assert_eq!(list(&bucket, "").await?.len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_overwrite_leaves_one_object() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let bucket = local_bucket(&temp_dir, "fs").await?;

    bucket
        .store_bytes("s3ql_data_99999", Bytes::from("old payload, longer"), &meta(1))
        .await?;
    bucket
        .store_bytes("s3ql_data_99999", Bytes::from("new"), &meta(2))
        .await?;

    let (metadata, data) = bucket.fetch_bytes("s3ql_data_99999").await?;
    assert_eq!(metadata, meta(2));
    assert_eq!(data, Bytes::from("new"));
    assert_eq!(list(&bucket, "").await?.len(), 1);
    assert_eq!(bucket.get_size().await?, 3);
    Ok(())
}

#[tokio::test]
async fn test_delete_force_semantics() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let bucket = local_bucket(&temp_dir, "fs").await?;

    let err = bucket.delete("absent", false).await.unwrap_err();
    assert!(matches!(err, Error::KeyNotFound { ref key } if key == "absent"));
    bucket.delete("absent", true).await?;
    bucket.delete("s3ql_data_000042", true).await?;
    Ok(())
}

#[tokio::test]
async fn test_rename_semantics() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let bucket = local_bucket(&temp_dir, "fs").await?;
    bucket.store_bytes("other", Bytes::from("o"), &meta(9)).await?;

    let err = bucket.rename("x", "y").await.unwrap_err();
    assert!(matches!(err, Error::KeyNotFound { .. }));
    assert_eq!(list(&bucket, "").await?, BTreeSet::from(["other".to_string()]));

    bucket.store_bytes("x", Bytes::from("payload"), &meta(5)).await?;
    bucket.rename("x", "y").await?;

    assert!(!bucket.contains("x").await?);
    assert!(bucket.contains("y").await?);
    let (metadata, data) = bucket.fetch_bytes("y").await?;
    assert_eq!(metadata, meta(5));
    assert_eq!(data, Bytes::from("payload"));
    assert!(matches!(
        bucket.fetch_metadata("x").await,
        Err(Error::KeyNotFound { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_get_size_across_shard_depths() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let bucket = local_bucket(&temp_dir, "fs").await?;

    let objects = [
        ("flat", 10usize),
        ("s3ql_data_1", 200),
        ("s3ql_data_123456", 3000),
        ("s3ql_data_123456789012", 40000),
    ];
    for (key, len) in objects {
        bucket
            .store_bytes(key, Bytes::from(vec![7u8; len]), &meta(len as i64))
            .await?;
    }

    assert_eq!(bucket.get_size().await?, 43210);

    bucket.delete("s3ql_data_123456", false).await?;
    assert_eq!(bucket.get_size().await?, 40210);
    Ok(())
}

#[tokio::test]
async fn test_delete_bucket() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let conn = RemoteConnection::local(temp_dir.path()).await?;
    let bucket = conn.create_bucket("fs").await?;
    bucket
        .store_bytes("s3ql_data_000001", Bytes::from("v"), &meta(0))
        .await?;
    bucket.store_bytes("flat", Bytes::from("v"), &meta(0)).await?;

    let err = conn.delete_bucket("fs", false).await.unwrap_err();
    assert!(matches!(err, Error::NotEmpty { .. }));
    assert!(conn.contains_path("fs").await?);

    conn.delete_bucket("fs", true).await?;
    assert!(!conn.contains_path("fs").await?);
    assert!(matches!(
        conn.open_bucket("fs").await,
        Err(Error::BucketNotFound { .. })
    ));

    // An empty bucket goes away without recursion
    conn.create_bucket("empty").await?;
    conn.delete_bucket("empty", false).await?;
    Ok(())
}

#[tokio::test]
async fn test_store_creates_parents_with_one_retry() -> Result<()> {
    init_tracing();
    let temp_dir = TempDir::new()?;
    let (conn, faults) = faulty_connection(temp_dir.path()).await?;
    let bucket = conn.create_bucket("fs").await?;
    assert_eq!(faults.lock().mkdirs, 1);

    bucket
        .store_bytes("s3ql_data_0001234", Bytes::from("v"), &meta(0))
        .await?;
    {
        let faults = faults.lock();
        assert_eq!(faults.data_write_opens, 2);
        // s3ql_data, 000 and 000123
        assert_eq!(faults.mkdirs, 4);
    }

    // Parents exist now, so no retry is needed
    bucket
        .store_bytes("s3ql_data_0001235", Bytes::from("v"), &meta(1))
        .await?;
    assert_eq!(faults.lock().data_write_opens, 3);
    assert_eq!(faults.lock().mkdirs, 4);
    Ok(())
}

#[tokio::test]
async fn test_other_open_failures_propagate() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (conn, faults) = faulty_connection(temp_dir.path()).await?;
    let bucket = conn.create_bucket("fs").await?;
    faults.lock().fail_data_writes = Some(RemoteErrorKind::Other);

    let err = bucket
        .store_bytes("s3ql_data_0001234", Bytes::from("v"), &meta(0))
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    match err {
        Error::Transport(remote) => {
            assert_eq!(remote.kind, RemoteErrorKind::Other);
            assert!(remote.path.ends_with("s3ql_data_0001234.dat"));
        }
        other => panic!("unexpected error: {other}"),
    }

    let faults = faults.lock();
    assert_eq!(faults.data_write_opens, 1);
    assert_eq!(faults.mkdirs, 1);
    Ok(())
}

#[tokio::test]
async fn test_retry_that_finds_nothing_to_create() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (conn, faults) = faulty_connection(temp_dir.path()).await?;
    let bucket = conn.create_bucket("fs").await?;
    faults.lock().fail_data_writes = Some(RemoteErrorKind::NotFound);

    let err = bucket
        .store_bytes("flat", Bytes::from("v"), &meta(0))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyExists { ref path } if path == "fs"));
    assert_eq!(faults.lock().data_write_opens, 1);
    Ok(())
}

#[tokio::test]
async fn test_buckets_survive_reestablish() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (conn, faults) = faulty_connection(temp_dir.path()).await?;
    let bucket = conn.create_bucket("fs").await?;
    bucket.store_bytes("k", Bytes::from("before"), &meta(1)).await?;

    conn.close().await?;
    assert!(matches!(
        bucket.fetch_bytes("k").await,
        Err(Error::Disconnected)
    ));
    conn.reestablish().await?;

    let (_, data) = bucket.fetch_bytes("k").await?;
    assert_eq!(data, Bytes::from("before"));

    let faults = faults.lock();
    let login = ("backup".to_string(), Some("hunter2".to_string()));
    assert_eq!(faults.logins, vec![login.clone(), login]);
    assert_eq!(faults.closes, 1);
    Ok(())
}

#[tokio::test]
async fn test_bincode_metadata_format() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = ConnectionConfig::default().with_metadata_format(MetadataFormat::Bincode);
    let conn = RemoteConnection::connect(
        config,
        Arc::new(remote_bucket::LocalConnector::new(temp_dir.path())),
    )
    .await?;
    let bucket = conn.create_bucket("fs").await?;

    bucket.store_bytes("k", Bytes::from("v"), &meta(3)).await?;
    assert_eq!(bucket.fetch_metadata("k").await?, meta(3));

    let raw = std::fs::read(temp_dir.path().join("fs/k.meta"))?;
    assert!(!raw.starts_with(b"{"));
    Ok(())
}

#[tokio::test]
async fn test_list_skips_unrelated_shards() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (conn, faults) = faulty_connection(temp_dir.path()).await?;
    let bucket = conn.create_bucket("fs").await?;
    for (i, key) in ["s3ql_data_0001234", "s3ql_data_0005551", "s3ql_data_9876543", "meta"]
        .iter()
        .enumerate()
    {
        bucket.store_bytes(key, Bytes::from("v"), &meta(i as i64)).await?;
    }

    faults.lock().listed.clear();
    assert_eq!(
        list(&bucket, "s3ql_data_0001").await?,
        BTreeSet::from(["s3ql_data_0001234".to_string()])
    );
    assert_eq!(
        faults.lock().listed,
        vec!["fs/s3ql_data/000".to_string(), "fs/s3ql_data/000/000123".to_string()]
    );

    faults.lock().listed.clear();
    assert_eq!(list(&bucket, "me").await?, BTreeSet::from(["meta".to_string()]));
    assert_eq!(faults.lock().listed, vec!["fs".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_store_from_file_just_written() -> Result<()> {
    use tokio::io::AsyncWriteExt;

    let temp_dir = TempDir::new()?;
    let bucket = local_bucket(&temp_dir, "fs").await?;

    let spool = temp_dir.path().join("spool");
    let mut file = tokio::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(&spool)
        .await?;
    file.write_all(b"compressed block").await?;
    file.flush().await?;

    let written = bucket.store("s3ql_data_77", &mut file, &meta(77)).await?;
    assert_eq!(written, 16);
    let (metadata, data) = bucket.fetch_bytes("s3ql_data_77").await?;
    assert_eq!(metadata, meta(77));
    assert_eq!(data, Bytes::from("compressed block"));
    Ok(())
}
