//! End-to-end relay tests over file storage

use std::convert::Infallible;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_test::{assert_err, assert_ok};

use live_relay::protocol::IngestFrame;
use live_relay::registry::{LogRegistry, PublisherId, RegistryConfig, RegistryError};
use live_relay::session::{CloseReason, IngestSession, SessionContext, ViewerSession};
use live_relay::stream_log::{
    FileBackend, LogStorage, MemoryStorage, StorageBackend, StorageReader, SyncMode,
};
use live_relay::Error;

type Frames = ReceiverStream<Result<IngestFrame, Infallible>>;

fn pid(s: &str) -> PublisherId {
    PublisherId::new(s).unwrap()
}

fn init(id: &str) -> IngestFrame {
    IngestFrame::Text(format!(
        r#"{{"type":"init","role":"publisher","publisherId":"{}"}}"#,
        id
    ))
}

fn binary(data: &[u8]) -> IngestFrame {
    IngestFrame::Binary(Bytes::copy_from_slice(data))
}

fn file_registry(dir: &TempDir) -> Arc<LogRegistry> {
    Arc::new(LogRegistry::with_backend(
        RegistryConfig::default(),
        Arc::new(FileBackend::new(dir.path(), "webm", SyncMode::OsDefault)),
    ))
}

fn ingest(registry: &Arc<LogRegistry>, session_id: u64) -> IngestSession {
    IngestSession::new(
        SessionContext::new(session_id, None),
        Arc::clone(registry),
        Duration::from_secs(5),
    )
}

fn frames() -> (mpsc::Sender<Result<IngestFrame, Infallible>>, Frames) {
    let (tx, rx) = mpsc::channel(16);
    (tx, ReceiverStream::new(rx))
}

async fn watch(registry: &LogRegistry, id: &str, grace: Duration) -> live_relay::Result<Vec<u8>> {
    let viewer =
        ViewerSession::attach(SessionContext::new(100, None), registry, &pid(id), grace).await?;
    let mut out = Vec::new();
    viewer.pipe_to(&mut out).await?;
    Ok(out)
}

#[tokio::test]
async fn test_viewer_attached_during_stream() {
    let dir = TempDir::new().unwrap();
    let registry = file_registry(&dir);
    let (tx, rx) = frames();

    let session = tokio::spawn(ingest(&registry, 1).run(rx));
    tx.send(Ok(init("s1"))).await.unwrap();

    let viewer = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { watch(&registry, "s1", Duration::from_secs(5)).await })
    };

    tx.send(Ok(binary(&[0x10, 0x20]))).await.unwrap();
    tx.send(Ok(binary(&[0x30]))).await.unwrap();
    drop(tx);

    let outcome = assert_ok!(session.await.unwrap());
    assert_eq!(outcome.publisher_id, pid("s1"));
    assert_eq!(outcome.reason, CloseReason::TransportClosed);
    assert_eq!(outcome.stats.bytes_received, 3);

    let received = assert_ok!(viewer.await.unwrap());
    assert_eq!(received, vec![0x10, 0x20, 0x30]);

    // The bytes are on disk
    let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(files.len(), 1);
    let path = files[0].as_ref().unwrap().path();
    assert_eq!(path.extension().unwrap(), "webm");
    assert_eq!(std::fs::read(path).unwrap(), vec![0x10, 0x20, 0x30]);
}

#[tokio::test]
async fn test_viewer_attached_after_stream_ended() {
    let dir = TempDir::new().unwrap();
    let registry = file_registry(&dir);

    let stream = tokio_stream::iter(vec![
        Ok::<_, Infallible>(init("s1")),
        Ok(binary(&[0x10, 0x20])),
        Ok(binary(&[0x30])),
        Ok(IngestFrame::Text(r#"{"type":"stop"}"#.into())),
    ]);
    let outcome = assert_ok!(ingest(&registry, 1).run(stream).await);
    assert_eq!(outcome.reason, CloseReason::Stop);

    let received = assert_ok!(watch(&registry, "s1", Duration::ZERO).await);
    assert_eq!(received, vec![0x10, 0x20, 0x30]);
}

#[tokio::test]
async fn test_concurrent_viewers_see_identical_bytes() {
    let dir = TempDir::new().unwrap();
    let registry = file_registry(&dir);
    let (tx, rx) = frames();

    let session = tokio::spawn(ingest(&registry, 1).run(rx));
    tx.send(Ok(init("s1"))).await.unwrap();

    let mut viewers = Vec::new();
    for _ in 0..2 {
        let registry = Arc::clone(&registry);
        viewers.push(tokio::spawn(async move {
            watch(&registry, "s1", Duration::from_secs(5)).await
        }));
    }

    for i in 0u8..50 {
        tx.send(Ok(binary(&[i; 100]))).await.unwrap();
        if i % 10 == 0 {
            tokio::task::yield_now().await;
        }
    }
    drop(tx);
    assert_ok!(session.await.unwrap());

    let expected: Vec<u8> = (0u8..50).flat_map(|i| [i; 100]).collect();
    for viewer in viewers {
        assert_eq!(assert_ok!(viewer.await.unwrap()), expected);
    }
}

#[tokio::test]
async fn test_second_publisher_rejected() {
    let dir = TempDir::new().unwrap();
    let registry = file_registry(&dir);
    let (tx, mut rx) = frames();

    let mut first = ingest(&registry, 1);
    tx.send(Ok(init("s1"))).await.unwrap();
    assert_ok!(first.handshake(&mut rx).await);

    let second = ingest(&registry, 2)
        .run(tokio_stream::iter(vec![Ok::<_, Infallible>(init("s1"))]))
        .await;
    let err = assert_err!(second);
    assert!(matches!(
        err,
        Error::Registry(RegistryError::AlreadyPublishing(_))
    ));

    // The first publisher keeps its writer
    tx.send(Ok(binary(b"still mine"))).await.unwrap();
    drop(tx);
    assert_ok!(first.stream(&mut rx).await);

    let received = assert_ok!(watch(&registry, "s1", Duration::ZERO).await);
    assert_eq!(received, b"still mine");
}

#[tokio::test]
async fn test_republish_after_close_starts_fresh_log() {
    let dir = TempDir::new().unwrap();
    let registry = file_registry(&dir);

    let first = tokio_stream::iter(vec![Ok::<_, Infallible>(init("s1")), Ok(binary(b"old"))]);
    assert_ok!(ingest(&registry, 1).run(first).await);

    // A viewer of the first broadcast attached before the publisher returns
    let old_viewer = ViewerSession::attach(
        SessionContext::new(50, None),
        &registry,
        &pid("s1"),
        Duration::ZERO,
    )
    .await
    .unwrap();

    let second = tokio_stream::iter(vec![Ok::<_, Infallible>(init("s1")), Ok(binary(b"new"))]);
    assert_ok!(ingest(&registry, 2).run(second).await);

    let mut out = Vec::new();
    old_viewer.pipe_to(&mut out).await.unwrap();
    assert_eq!(out, b"old");

    let received = assert_ok!(watch(&registry, "s1", Duration::ZERO).await);
    assert_eq!(received, b"new");
}

#[tokio::test]
async fn test_viewer_waits_for_late_publisher() {
    let dir = TempDir::new().unwrap();
    let registry = file_registry(&dir);

    let viewer = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { watch(&registry, "late", Duration::from_secs(5)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let stream = tokio_stream::iter(vec![Ok::<_, Infallible>(init("late")), Ok(binary(b"hi"))]);
    assert_ok!(ingest(&registry, 1).run(stream).await);

    assert_eq!(assert_ok!(viewer.await.unwrap()), b"hi");
}

#[tokio::test(start_paused = true)]
async fn test_unknown_stream_not_found_after_grace() {
    let registry = LogRegistry::new();

    let err = assert_err!(watch(&registry, "nobody", Duration::from_secs(10)).await);
    assert!(matches!(err, Error::Registry(RegistryError::NotFound(_))));
}

#[tokio::test]
async fn test_bad_handshake_registers_nothing() {
    let registry = Arc::new(LogRegistry::new());

    let stream = tokio_stream::iter(vec![Ok::<_, Infallible>(IngestFrame::Text(
        r#"{"type":"init","role":"viewer","publisherId":"s1"}"#.into(),
    ))]);
    let err = assert_err!(ingest(&registry, 1).run(stream).await);
    assert!(matches!(err, Error::Handshake(_)));
    assert_eq!(registry.stream_count(), 0);
}

/// Memory storage that refuses appends past a byte limit
struct LimitedStorage {
    inner: MemoryStorage,
    written: AtomicU64,
    limit: u64,
}

#[async_trait]
impl LogStorage for LimitedStorage {
    async fn append(&self, bytes: &[u8]) -> io::Result<()> {
        let written = self.written.load(Ordering::SeqCst);
        if written + bytes.len() as u64 > self.limit {
            return Err(io::Error::other("disk full"));
        }
        self.inner.append(bytes).await?;
        self.written.fetch_add(bytes.len() as u64, Ordering::SeqCst);
        Ok(())
    }

    async fn open_reader(&self) -> io::Result<Box<dyn StorageReader>> {
        self.inner.open_reader().await
    }

    async fn remove(&self) -> io::Result<()> {
        self.inner.remove().await
    }

    fn location(&self) -> String {
        self.inner.location()
    }
}

struct LimitedBackend(u64);

#[async_trait]
impl StorageBackend for LimitedBackend {
    async fn create(&self, id: &PublisherId, _generation: u64) -> io::Result<Arc<dyn LogStorage>> {
        Ok(Arc::new(LimitedStorage {
            inner: MemoryStorage::new(id.to_string()),
            written: AtomicU64::new(0),
            limit: self.0,
        }))
    }
}

#[tokio::test]
async fn test_storage_failure_ends_stream_for_viewers() {
    let registry = Arc::new(LogRegistry::with_backend(
        RegistryConfig::default(),
        Arc::new(LimitedBackend(4)),
    ));
    let (tx, rx) = frames();

    let session = tokio::spawn(ingest(&registry, 1).run(rx));
    tx.send(Ok(init("s1"))).await.unwrap();

    let viewer = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { watch(&registry, "s1", Duration::from_secs(5)).await })
    };

    tx.send(Ok(binary(b"abc"))).await.unwrap();
    tx.send(Ok(binary(b"defg"))).await.unwrap();

    let err = assert_err!(session.await.unwrap());
    assert!(err.is_storage());

    // Viewers drain what was committed and then finish
    assert_eq!(assert_ok!(viewer.await.unwrap()), b"abc");
    let log = registry.lookup(&pid("s1")).unwrap();
    assert!(log.is_closed());
    assert!(log.state().failed);
}
