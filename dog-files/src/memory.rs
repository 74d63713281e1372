//! In-memory [`BucketStore`] for tests, demos and local development.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::StoreError;
use crate::store::{
    BlobBucket, BucketStore, DownloadSink, DownloadStream, FilesCollection, NameFilter,
    RawFileRecord, StoreResult, UploadSource, UploadStream,
};
use crate::{FileId, SessionHandle};

const DEFAULT_CHUNK_SIZE: usize = 255 * 1024;

#[derive(Debug, Clone)]
struct StoredFile {
    record: RawFileRecord,
    content: Bytes,
}

type Buckets = HashMap<String, BTreeMap<FileId, StoredFile>>;

/// Bucket store that keeps every partition in process memory.
///
/// Content moves in fixed-size chunks with a cancellation check (and an
/// optional delay) between chunks, so transfers can be observed and
/// interrupted the way they would be against a remote store.
#[derive(Clone)]
pub struct MemoryBucketStore {
    buckets: Arc<RwLock<Buckets>>,
    offline: Arc<AtomicBool>,
    sessions: Arc<Mutex<Vec<SessionHandle>>>,
    chunk_size: usize,
    chunk_delay: Option<Duration>,
}

impl Default for MemoryBucketStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBucketStore {
    pub fn new() -> Self {
        Self {
            buckets: Arc::new(RwLock::new(HashMap::new())),
            offline: Arc::new(AtomicBool::new(false)),
            sessions: Arc::new(Mutex::new(Vec::new())),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_delay: None,
        }
    }

    /// Set the transfer chunk size
    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes.max(1);
        self
    }

    /// Pause between chunks, simulating a slow link
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Make every call fail as if the store were unreachable
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
    }

    /// Number of files stored in a partition
    pub fn file_count(&self, bucket: &str) -> usize {
        self.buckets.read().get(bucket).map_or(0, |files| files.len())
    }

    /// Session handles passed to metadata updates, oldest first
    pub fn sessions_seen(&self) -> Vec<SessionHandle> {
        self.sessions.lock().clone()
    }

    fn check(&self, cancel: &CancellationToken) -> StoreResult<()> {
        if self.offline.load(Ordering::Acquire) {
            return Err(StoreError::unavailable(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "memory store is offline",
            )));
        }
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        Ok(())
    }

    async fn pause(&self, cancel: &CancellationToken) -> StoreResult<()> {
        match self.chunk_delay {
            Some(delay) => {
                tokio::select! {
                    _ = cancel.cancelled() => Err(StoreError::Cancelled),
                    _ = tokio::time::sleep(delay) => Ok(()),
                }
            }
            None => {
                tokio::task::yield_now().await;
                Ok(())
            }
        }
    }

    fn get(&self, bucket: &str, id: &FileId) -> Option<StoredFile> {
        self.buckets
            .read()
            .get(bucket)
            .and_then(|files| files.get(id))
            .cloned()
    }

    fn insert(&self, bucket: &str, file: StoredFile) -> StoreResult<()> {
        let mut buckets = self.buckets.write();
        let files = buckets.entry(bucket.to_string()).or_default();
        if files.contains_key(&file.record.id) {
            return Err(StoreError::unavailable(format!(
                "duplicate file id {} in bucket {}",
                file.record.id, bucket
            )));
        }
        debug!(bucket, id = %file.record.id, length = file.record.length, "stored file");
        files.insert(file.record.id, file);
        Ok(())
    }

    fn update<F>(&self, bucket: &str, id: &FileId, apply: F) -> bool
    where
        F: FnOnce(&mut StoredFile),
    {
        let mut buckets = self.buckets.write();
        match buckets.get_mut(bucket).and_then(|files| files.get_mut(id)) {
            Some(file) => {
                apply(file);
                true
            }
            None => false,
        }
    }

    fn records(&self, bucket: &str) -> Vec<RawFileRecord> {
        self.buckets
            .read()
            .get(bucket)
            .map(|files| files.values().map(|file| file.record.clone()).collect())
            .unwrap_or_default()
    }

    fn stored(&self, id: FileId, filename: &str, content: Vec<u8>, metadata: Option<Value>) -> StoredFile {
        StoredFile {
            record: RawFileRecord {
                id,
                length: content.len() as u64,
                upload_date: Utc::now(),
                filename: filename.to_string(),
                metadata,
            },
            content: Bytes::from(content),
        }
    }
}

impl BucketStore for MemoryBucketStore {
    fn bucket(&self, name: &str) -> Arc<dyn BlobBucket> {
        Arc::new(MemoryBucket {
            name: name.to_string(),
            store: self.clone(),
        })
    }

    fn files_collection(&self, bucket_name: &str) -> Arc<dyn FilesCollection> {
        Arc::new(MemoryFilesCollection {
            bucket: bucket_name.to_string(),
            store: self.clone(),
        })
    }
}

/// One partition of a [`MemoryBucketStore`]
pub struct MemoryBucket {
    name: String,
    store: MemoryBucketStore,
}

#[async_trait]
impl BlobBucket for MemoryBucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_all(&self, cancel: &CancellationToken) -> StoreResult<Vec<RawFileRecord>> {
        self.store.check(cancel)?;
        Ok(self.store.records(&self.name))
    }

    async fn find_by_name(
        &self,
        filter: &NameFilter,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<RawFileRecord>> {
        self.store.check(cancel)?;
        Ok(self
            .store
            .records(&self.name)
            .into_iter()
            .filter(|record| filter.matches(&record.filename))
            .collect())
    }

    async fn find_by_id(
        &self,
        id: &FileId,
        cancel: &CancellationToken,
    ) -> StoreResult<Option<RawFileRecord>> {
        self.store.check(cancel)?;
        Ok(self.store.get(&self.name, id).map(|file| file.record))
    }

    async fn download_to_writer(
        &self,
        id: &FileId,
        destination: DownloadSink<'_>,
        cancel: &CancellationToken,
    ) -> StoreResult<()> {
        self.store.check(cancel)?;
        let file = self
            .store
            .get(&self.name, id)
            .ok_or_else(|| StoreError::not_found(id.to_string()))?;

        for chunk in file.content.chunks(self.store.chunk_size) {
            if cancel.is_cancelled() {
                return Err(StoreError::Cancelled);
            }
            destination.write_all(chunk).await?;
            self.store.pause(cancel).await?;
        }
        destination.flush().await?;
        Ok(())
    }

    async fn open_download_stream(
        &self,
        id: &FileId,
        cancel: &CancellationToken,
    ) -> StoreResult<DownloadStream> {
        self.store.check(cancel)?;
        let file = self
            .store
            .get(&self.name, id)
            .ok_or_else(|| StoreError::not_found(id.to_string()))?;

        Ok(Box::pin(MemoryDownload {
            content: file.content,
            position: 0,
            chunk_size: self.store.chunk_size,
            cancel: cancel.clone(),
        }))
    }

    async fn upload_from_reader(
        &self,
        id: &FileId,
        filename: &str,
        source: UploadSource<'_>,
        metadata: Option<Value>,
        cancel: &CancellationToken,
    ) -> StoreResult<()> {
        self.store.check(cancel)?;

        let mut content = Vec::new();
        let mut chunk = vec![0u8; self.store.chunk_size];
        loop {
            if cancel.is_cancelled() {
                return Err(StoreError::Cancelled);
            }
            let n = source.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            content.extend_from_slice(&chunk[..n]);
            self.store.pause(cancel).await?;
        }

        let file = self.store.stored(*id, filename, content, metadata);
        self.store.insert(&self.name, file)
    }

    async fn open_upload_stream(
        &self,
        id: &FileId,
        filename: &str,
        metadata: Option<Value>,
        cancel: &CancellationToken,
    ) -> StoreResult<Box<dyn UploadStream>> {
        self.store.check(cancel)?;
        Ok(Box::new(MemoryUpload {
            id: *id,
            filename: filename.to_string(),
            metadata,
            buffer: Vec::new(),
            bucket: self.name.clone(),
            store: self.store.clone(),
            cancel: cancel.clone(),
        }))
    }

    async fn rename(&self, id: &FileId, new_name: &str, cancel: &CancellationToken) -> StoreResult<()> {
        self.store.check(cancel)?;
        let found = self.store.update(&self.name, id, |file| {
            file.record.filename = new_name.to_string();
        });
        if found {
            Ok(())
        } else {
            Err(StoreError::not_found(id.to_string()))
        }
    }

    async fn delete(&self, id: &FileId, cancel: &CancellationToken) -> StoreResult<()> {
        self.store.check(cancel)?;
        let removed = self
            .store
            .buckets
            .write()
            .get_mut(&self.name)
            .and_then(|files| files.remove(id));
        match removed {
            Some(_) => Ok(()),
            None => Err(StoreError::not_found(id.to_string())),
        }
    }
}

struct MemoryDownload {
    content: Bytes,
    position: usize,
    chunk_size: usize,
    cancel: CancellationToken,
}

impl AsyncRead for MemoryDownload {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.cancel.is_cancelled() {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::Interrupted, "download cancelled")));
        }
        let remaining = self.content.len() - self.position;
        let n = remaining.min(buf.remaining()).min(self.chunk_size);
        let start = self.position;
        buf.put_slice(&self.content[start..start + n]);
        self.position += n;
        Poll::Ready(Ok(()))
    }
}

struct MemoryUpload {
    id: FileId,
    filename: String,
    metadata: Option<Value>,
    buffer: Vec<u8>,
    bucket: String,
    store: MemoryBucketStore,
    cancel: CancellationToken,
}

impl AsyncWrite for MemoryUpload {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.cancel.is_cancelled() {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::Interrupted, "upload cancelled")));
        }
        self.buffer.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[async_trait]
impl UploadStream for MemoryUpload {
    fn id(&self) -> FileId {
        self.id
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.store.check(&self.cancel)?;
        let this = *self;
        let file = this
            .store
            .stored(this.id, &this.filename, this.buffer, this.metadata);
        this.store.insert(&this.bucket, file)
    }

    async fn abort(self: Box<Self>) -> StoreResult<()> {
        debug!(id = %self.id, bucket = %self.bucket, "discarded upload stream");
        Ok(())
    }
}

/// File documents of one [`MemoryBucketStore`] partition
pub struct MemoryFilesCollection {
    bucket: String,
    store: MemoryBucketStore,
}

impl MemoryFilesCollection {
    fn document(record: &RawFileRecord) -> Value {
        json!({
            "_id": record.id.to_string(),
            "length": record.length,
            "uploadDate": record.upload_date.to_rfc3339(),
            "filename": record.filename,
            "metadata": record.metadata.clone().unwrap_or(Value::Null),
        })
    }
}

#[async_trait]
impl FilesCollection for MemoryFilesCollection {
    async fn set_field(
        &self,
        id: &FileId,
        field: &str,
        value: Value,
        session: Option<&SessionHandle>,
        cancel: &CancellationToken,
    ) -> StoreResult<bool> {
        self.store.check(cancel)?;
        if let Some(session) = session {
            self.store.sessions.lock().push(session.clone());
        }

        match field {
            "metadata" => Ok(self.store.update(&self.bucket, id, |file| {
                file.record.metadata = if value.is_null() { None } else { Some(value) };
            })),
            "filename" => {
                let name = value
                    .as_str()
                    .ok_or_else(|| StoreError::unavailable("filename must be a string"))?
                    .to_string();
                Ok(self.store.update(&self.bucket, id, |file| file.record.filename = name))
            }
            other => Err(StoreError::unavailable(format!(
                "field {other} of a file document is read-only"
            ))),
        }
    }

    async fn find_ids_by_field(
        &self,
        path: &str,
        value: &Value,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<FileId>> {
        self.store.check(cancel)?;
        let pointer = format!("/{}", path.replace('.', "/"));
        Ok(self
            .store
            .records(&self.bucket)
            .iter()
            .filter(|record| Self::document(record).pointer(&pointer) == Some(value))
            .map(|record| record.id)
            .collect())
    }
}
