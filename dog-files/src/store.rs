use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::{error::StoreError, FileId, SessionHandle};

/// Result type for store primitives
pub type StoreResult<T> = Result<T, StoreError>;

/// Readable stream over a stored file's content
pub type DownloadStream = Pin<Box<dyn AsyncRead + Send>>;

/// Destination a bucket downloads into
pub type DownloadSink<'a> = &'a mut (dyn AsyncWrite + Send + Unpin);

/// Source a bucket uploads from
pub type UploadSource<'a> = &'a mut (dyn AsyncRead + Send + Unpin);

/// The store's native, metadata-only description of a stored file
#[derive(Debug, Clone, PartialEq)]
pub struct RawFileRecord {
    pub id: FileId,
    pub length: u64,
    pub upload_date: DateTime<Utc>,
    pub filename: String,
    pub metadata: Option<serde_json::Value>,
}

/// Name lookup mode for [`BlobBucket::find_by_name`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameFilter {
    /// Matches names equal to or containing the pattern
    Contains(String),
    Exact(String),
}

impl NameFilter {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Contains(pattern) => name == pattern || name.contains(pattern.as_str()),
            Self::Exact(pattern) => name == pattern,
        }
    }
}

/// Entry point of a document store that exposes bucket-style blob partitions
pub trait BucketStore: Send + Sync {
    /// Blob partition with the given name
    fn bucket(&self, name: &str) -> Arc<dyn BlobBucket>;

    /// Backing document collection of a partition's file records
    fn files_collection(&self, bucket_name: &str) -> Arc<dyn FilesCollection>;
}

/// Blob primitives against one named partition.
///
/// Every call observes `cancel` and fails with [`StoreError::Cancelled`] once it fires.
#[async_trait]
pub trait BlobBucket: Send + Sync {
    /// Partition name
    fn name(&self) -> &str;

    async fn find_all(&self, cancel: &CancellationToken) -> StoreResult<Vec<RawFileRecord>>;

    async fn find_by_name(
        &self,
        filter: &NameFilter,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<RawFileRecord>>;

    async fn find_by_id(
        &self,
        id: &FileId,
        cancel: &CancellationToken,
    ) -> StoreResult<Option<RawFileRecord>>;

    /// Copy a file's content into `destination`
    async fn download_to_writer(
        &self,
        id: &FileId,
        destination: DownloadSink<'_>,
        cancel: &CancellationToken,
    ) -> StoreResult<()>;

    /// Read a whole file into memory
    async fn download_bytes(&self, id: &FileId, cancel: &CancellationToken) -> StoreResult<Bytes> {
        let mut buffer: Vec<u8> = Vec::new();
        self.download_to_writer(id, &mut buffer, cancel).await?;
        Ok(Bytes::from(buffer))
    }

    async fn open_download_stream(
        &self,
        id: &FileId,
        cancel: &CancellationToken,
    ) -> StoreResult<DownloadStream>;

    /// Store the content of `source` under `id`
    async fn upload_from_reader(
        &self,
        id: &FileId,
        filename: &str,
        source: UploadSource<'_>,
        metadata: Option<serde_json::Value>,
        cancel: &CancellationToken,
    ) -> StoreResult<()>;

    async fn open_upload_stream(
        &self,
        id: &FileId,
        filename: &str,
        metadata: Option<serde_json::Value>,
        cancel: &CancellationToken,
    ) -> StoreResult<Box<dyn UploadStream>>;

    async fn rename(&self, id: &FileId, new_name: &str, cancel: &CancellationToken) -> StoreResult<()>;

    async fn delete(&self, id: &FileId, cancel: &CancellationToken) -> StoreResult<()>;
}

/// Writable stream that becomes a stored file once committed
#[async_trait]
pub trait UploadStream: AsyncWrite + Send + Unpin {
    /// Id the file is stored under
    fn id(&self) -> FileId;

    /// Flush remaining data and make the file visible
    async fn commit(self: Box<Self>) -> StoreResult<()>;

    /// Discard everything written so far
    async fn abort(self: Box<Self>) -> StoreResult<()>;
}

/// Document collection backing a partition's file records
#[async_trait]
pub trait FilesCollection: Send + Sync {
    /// Set one top-level field of a file document; returns whether a document matched
    async fn set_field(
        &self,
        id: &FileId,
        field: &str,
        value: serde_json::Value,
        session: Option<&SessionHandle>,
        cancel: &CancellationToken,
    ) -> StoreResult<bool>;

    /// Ids of the documents whose dotted `path` equals `value`
    async fn find_ids_by_field(
        &self,
        path: &str,
        value: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<FileId>>;
}
