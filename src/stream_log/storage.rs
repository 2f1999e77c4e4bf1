//! Storage backends for stream logs
//!
//! A [`StorageBackend`] creates one [`LogStorage`] per log instance. The
//! storage only ever sees appends from the single writer; readers get their
//! own [`StorageReader`] so a slow viewer never holds anything the writer
//! needs.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::registry::PublisherId;

/// Flush strategy for file-backed logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` the data after every append
    EveryWrite,
    /// Flush to the OS after every append and let the page cache do the rest
    #[default]
    OsDefault,
}

/// Creates storage for new log instances
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Create empty storage for `id`
    ///
    /// `generation` is unique per registry, so two logs created for the same
    /// id never share storage.
    async fn create(&self, id: &PublisherId, generation: u64) -> io::Result<Arc<dyn LogStorage>>;
}

/// Durable byte storage behind one stream log
#[async_trait]
pub trait LogStorage: Send + Sync {
    /// Append `bytes` at the current end. Called only by the log's writer.
    async fn append(&self, bytes: &[u8]) -> io::Result<()>;

    /// Open an independent read handle
    async fn open_reader(&self) -> io::Result<Box<dyn StorageReader>>;

    /// Release the underlying storage
    async fn remove(&self) -> io::Result<()>;

    /// Human-readable location, for logging
    fn location(&self) -> String;
}

/// Positional reader over committed log bytes
#[async_trait]
pub trait StorageReader: Send {
    /// Read exactly `len` bytes starting at `offset`
    async fn read_at(&mut self, offset: u64, len: usize) -> io::Result<Bytes>;
}

/// One file per log instance under a root directory
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
    extension: String,
    sync_mode: SyncMode,
}

impl FileBackend {
    /// Create a backend writing `<root>/<id>-<generation>.<extension>` files
    ///
    /// An existing file is never overwritten; a `-<n>` suffix is added to
    /// the name instead.
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>, sync_mode: SyncMode) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
            sync_mode,
        }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &PublisherId, generation: u64, attempt: u32) -> PathBuf {
        let mut name = format!("{}-{}", id.file_stem(), generation);
        if attempt > 0 {
            name.push_str(&format!("-{}", attempt));
        }
        if !self.extension.is_empty() {
            name.push('.');
            name.push_str(&self.extension);
        }
        self.root.join(name)
    }
}

/// Give up on finding a free file name after this many collisions
const MAX_NAME_ATTEMPTS: u32 = 1000;

#[async_trait]
impl StorageBackend for FileBackend {
    async fn create(&self, id: &PublisherId, generation: u64) -> io::Result<Arc<dyn LogStorage>> {
        fs::create_dir_all(&self.root).await?;

        // Generations restart with the process; files left by an earlier run
        // are never opened for writing.
        let mut attempt = 0;
        let (path, file) = loop {
            let path = self.path_for(id, generation, attempt);
            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => break (path, file),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists && attempt < MAX_NAME_ATTEMPTS => {
                    tracing::debug!(path = %path.display(), "Stream file exists, trying next name");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        tracing::debug!(publisher = %id, path = %path.display(), "Created stream file");

        Ok(Arc::new(FileStorage {
            path,
            file: Mutex::new(file),
            sync_mode: self.sync_mode,
        }))
    }
}

/// File-backed log storage
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    file: Mutex<File>,
    sync_mode: SyncMode,
}

impl FileStorage {
    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LogStorage for FileStorage {
    async fn append(&self, bytes: &[u8]) -> io::Result<()> {
        let mut file = self.file.lock().await;
        file.write_all(bytes).await?;
        file.flush().await?;
        if self.sync_mode == SyncMode::EveryWrite {
            file.sync_data().await?;
        }
        Ok(())
    }

    async fn open_reader(&self) -> io::Result<Box<dyn StorageReader>> {
        let file = File::open(&self.path).await?;
        Ok(Box::new(FileReader {
            file,
            position: 0,
        }))
    }

    async fn remove(&self) -> io::Result<()> {
        match fs::remove_file(&self.path).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

struct FileReader {
    file: File,
    position: u64,
}

#[async_trait]
impl StorageReader for FileReader {
    async fn read_at(&mut self, offset: u64, len: usize) -> io::Result<Bytes> {
        if offset != self.position {
            self.file.seek(io::SeekFrom::Start(offset)).await?;
            self.position = offset;
        }

        let mut buf = vec![0u8; len];
        self.file.read_exact(&mut buf).await?;
        self.position += len as u64;

        Ok(Bytes::from(buf))
    }
}

/// In-memory storage, for tests and ephemeral deployments
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend;

impl MemoryBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn create(&self, id: &PublisherId, generation: u64) -> io::Result<Arc<dyn LogStorage>> {
        Ok(Arc::new(MemoryStorage::new(format!("memory:{}#{}", id, generation))))
    }
}

/// Growable in-memory byte buffer
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    name: String,
    data: Arc<RwLock<Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Number of bytes stored
    pub fn len(&self) -> usize {
        self.data.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> io::Error {
    io::Error::other("memory storage lock poisoned")
}

#[async_trait]
impl LogStorage for MemoryStorage {
    async fn append(&self, bytes: &[u8]) -> io::Result<()> {
        self.data.write().map_err(poisoned)?.extend_from_slice(bytes);
        Ok(())
    }

    async fn open_reader(&self) -> io::Result<Box<dyn StorageReader>> {
        Ok(Box::new(MemoryReader {
            data: Arc::clone(&self.data),
        }))
    }

    async fn remove(&self) -> io::Result<()> {
        let mut data = self.data.write().map_err(poisoned)?;
        data.clear();
        data.shrink_to_fit();
        Ok(())
    }

    fn location(&self) -> String {
        self.name.clone()
    }
}

struct MemoryReader {
    data: Arc<RwLock<Vec<u8>>>,
}

#[async_trait]
impl StorageReader for MemoryReader {
    async fn read_at(&mut self, offset: u64, len: usize) -> io::Result<Bytes> {
        let data = self.data.read().map_err(poisoned)?;
        let start = usize::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset out of range"))?;
        let end = start.saturating_add(len);

        if end > data.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read past end of memory storage",
            ));
        }

        Ok(Bytes::copy_from_slice(&data[start..end]))
    }
}
