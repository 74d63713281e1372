use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::error::StoreError;
use crate::events::{EventBus, ListenerId, TransferEvent, TransferListener};
use crate::record::{FileRecordProjector, JsonCodec, MetadataCodec};
use crate::session::{Interrupt, SessionRegistry, TransferOutcome, TransferSession};
use crate::store::{BlobBucket, BucketStore, DownloadStream, NameFilter};
use crate::stream::Tracked;
use crate::{
    FileError, FileId, FileRecord, OperationId, OperationKind, SessionHandle, TransferConfig,
    TransferOptions, TypedFileRecord, UploadHandle,
};

/// Field of a file document that holds its metadata
const METADATA_FIELD: &str = "metadata";

/// Upper bound of the buffer reserved up front by in-memory downloads
const INITIAL_BUFFER_BYTES: usize = 1024 * 1024;

/// Public façade for moving files in and out of a bucket store.
///
/// Every call runs in its own session with its own cancellation scope, so
/// concurrent calls on one manager never interfere. Outcomes are reported
/// through [`TransferEvent`]s and through the return value: `None`, empty
/// bytes or a non-completed [`TransferOutcome`] mean the call was cancelled
/// or failed, and the terminal event says which.
pub struct TransferManager {
    store: Arc<dyn BucketStore>,
    config: TransferConfig,
    events: EventBus,
    sessions: SessionRegistry,
    root: Mutex<CancellationToken>,
    projector: FileRecordProjector,
}

impl TransferManager {
    /// Create a new transfer manager
    pub fn new<S: BucketStore + 'static>(store: S, config: TransferConfig) -> Self {
        Self::with_store(Arc::new(store), config)
    }

    /// Create a manager over a shared store
    pub fn with_store(store: Arc<dyn BucketStore>, config: TransferConfig) -> Self {
        let events = EventBus::new(config.event_capacity);
        Self {
            store,
            config,
            events,
            sessions: SessionRegistry::default(),
            root: Mutex::new(CancellationToken::new()),
            projector: FileRecordProjector::json(),
        }
    }

    /// Get configuration
    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Receive every event emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<TransferEvent> {
        self.events.subscribe()
    }

    pub fn add_listener<L: TransferListener + 'static>(&self, listener: L) -> ListenerId {
        self.events.add_listener(Arc::new(listener))
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.events.remove_listener(id)
    }

    /// Number of operations currently running
    pub fn active_operations(&self) -> usize {
        self.sessions.len()
    }

    /// Cancel every running operation and force-close their streams.
    ///
    /// Operations started afterwards run under a fresh scope.
    pub fn cancel_all(&self) {
        let previous = std::mem::replace(&mut *self.root.lock(), CancellationToken::new());
        previous.cancel();
        let closed = self.sessions.close_all_streams();
        info!(closed_streams = closed, "cancelled all running operations");
    }

    /// Cancel one running operation; false if it already settled
    pub fn cancel_operation(&self, operation: OperationId) -> bool {
        let cancelled = self.sessions.cancel(operation);
        debug!(%operation, cancelled, "cancel requested");
        cancelled
    }

    fn open_session(&self, kind: OperationKind, options: &TransferOptions) -> TransferSession<'_> {
        let root = self.root.lock().clone();
        TransferSession::open(kind, &root, options.cancellation(), &self.events, &self.sessions)
    }

    fn bucket_name<'a>(&'a self, options: &'a TransferOptions) -> &'a str {
        options.collection_or(&self.config.default_collection)
    }

    fn bucket(&self, options: &TransferOptions) -> Arc<dyn BlobBucket> {
        self.store.bucket(self.bucket_name(options))
    }

    /// Token for streams that outlive the call returning them
    fn detached_token(&self, options: &TransferOptions) -> CancellationToken {
        match options.cancellation() {
            Some(external) => external.clone(),
            None => self.root.lock().child_token(),
        }
    }

    /// Preset id if it parses, a fresh time-ordered id otherwise
    fn resolve_upload_id(&self, options: &TransferOptions) -> FileId {
        match options.preset_id().map(FileId::parse) {
            Some(Ok(id)) => id,
            Some(Err(_)) => {
                debug!(preset = ?options.preset_id(), "preset id is not a file id, generating one");
                FileId::generate()
            }
            None => FileId::generate(),
        }
    }

    async fn resolve_length(
        &self,
        bucket: &dyn BlobBucket,
        id: &FileId,
        cancel: &CancellationToken,
    ) -> Result<u64, Interrupt> {
        bucket
            .find_by_id(id, cancel)
            .await?
            .map(|record| record.length)
            .ok_or_else(|| FileError::undefined_length(id.to_string()).into())
    }

    // ---- rename / delete / metadata -------------------------------------

    /// Rename a stored file
    #[instrument(skip(self, options), fields(collection = %self.bucket_name(&options)))]
    pub async fn rename(&self, id: &str, new_name: &str, options: TransferOptions) -> TransferOutcome {
        let session = self.open_session(OperationKind::Rename, &options);
        let result = self.rename_in(&session, id, new_name, &options).await;
        session.settle(result).0
    }

    async fn rename_in(
        &self,
        session: &TransferSession<'_>,
        id: &str,
        new_name: &str,
        options: &TransferOptions,
    ) -> Result<(), Interrupt> {
        let file_id = FileId::parse(id)?;
        self.bucket(options)
            .rename(&file_id, new_name, session.scope())
            .await?;
        Ok(())
    }

    /// Delete a stored file
    #[instrument(skip(self, options), fields(collection = %self.bucket_name(&options)))]
    pub async fn delete(&self, id: &str, options: TransferOptions) -> TransferOutcome {
        let session = self.open_session(OperationKind::Delete, &options);
        let result = self.delete_in(&session, id, &options).await;
        session.settle(result).0
    }

    async fn delete_in(
        &self,
        session: &TransferSession<'_>,
        id: &str,
        options: &TransferOptions,
    ) -> Result<(), Interrupt> {
        let file_id = FileId::parse(id)?;
        match self.bucket(options).delete(&file_id, session.scope()).await {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound { .. }) if self.config.tolerate_missing_on_delete => {
                debug!(%file_id, "file already deleted");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Replace the metadata document of a stored file.
    ///
    /// Only the metadata field of the file document is written. A
    /// transactional `session` handle is forwarded to the store when given.
    #[instrument(skip(self, metadata, options, session), fields(collection = %self.bucket_name(&options)))]
    pub async fn update_metadata<M: Serialize>(
        &self,
        id: &str,
        metadata: &M,
        options: TransferOptions,
        session: Option<&SessionHandle>,
    ) -> TransferOutcome {
        let transfer = self.open_session(OperationKind::MetadataUpdate, &options);
        let result = self
            .update_metadata_in(&transfer, id, metadata, &options, session)
            .await;
        transfer.settle(result).0
    }

    async fn update_metadata_in<M: Serialize>(
        &self,
        transfer: &TransferSession<'_>,
        id: &str,
        metadata: &M,
        options: &TransferOptions,
        session: Option<&SessionHandle>,
    ) -> Result<(), Interrupt> {
        let file_id = FileId::parse(id)?;
        let value = serde_json::to_value(metadata).map_err(FileError::serialization)?;
        let matched = self
            .store
            .files_collection(self.bucket_name(options))
            .set_field(&file_id, METADATA_FIELD, value, session, transfer.scope())
            .await?;

        if matched {
            Ok(())
        } else {
            Err(FileError::not_found(id).into())
        }
    }

    // ---- downloads -------------------------------------------------------

    /// Download a file into `destination`.
    ///
    /// On failure the destination is shut down before the crash is reported.
    #[instrument(skip(self, destination, options), fields(collection = %self.bucket_name(&options)))]
    pub async fn download<W>(&self, id: &str, destination: &mut W, options: TransferOptions) -> TransferOutcome
    where
        W: AsyncWrite + Send + Unpin,
    {
        let mut session = self.open_session(OperationKind::Download, &options);
        let mut sink = Tracked::new(destination);
        session.attach(sink.gate());

        let result = self.download_in(&mut session, id, &mut sink, &options).await;
        if let Err(Interrupt::Failed(_)) = &result {
            let _ = sink.shutdown().await;
        }
        session.settle(result).0
    }

    async fn download_in<W>(
        &self,
        session: &mut TransferSession<'_>,
        id: &str,
        sink: &mut Tracked<W>,
        options: &TransferOptions,
    ) -> Result<(), Interrupt>
    where
        W: AsyncWrite + Send + Unpin,
    {
        let (file_id, bucket) = self.locate_download(session, id, options).await?;
        self.transfer_into(session, &file_id, bucket.as_ref(), sink).await
    }

    /// Parse the id and resolve the stored length before anything is written
    async fn locate_download(
        &self,
        session: &mut TransferSession<'_>,
        id: &str,
        options: &TransferOptions,
    ) -> Result<(FileId, Arc<dyn BlobBucket>), Interrupt> {
        let file_id = FileId::parse(id)?;
        let bucket = self.bucket(options);
        let length = self.resolve_length(bucket.as_ref(), &file_id, session.scope()).await?;
        session.set_total_length(length);
        Ok((file_id, bucket))
    }

    async fn transfer_into<W>(
        &self,
        session: &TransferSession<'_>,
        file_id: &FileId,
        bucket: &dyn BlobBucket,
        sink: &mut Tracked<W>,
    ) -> Result<(), Interrupt>
    where
        W: AsyncWrite + Send + Unpin,
    {
        let scope = session.scope().clone();
        let probe = sink.probe();
        session
            .drive(
                probe,
                self.config.progress_interval,
                bucket.download_to_writer(file_id, sink, &scope),
            )
            .await?;

        info!(operation = %session.id(), %file_id, "download completed");
        Ok(())
    }

    /// Download a file into a local path, creating or truncating it.
    ///
    /// The destination is only touched once the file is known to exist.
    #[instrument(skip(self, path, options), fields(path = %path.as_ref().display()))]
    pub async fn download_to_path(
        &self,
        id: &str,
        path: impl AsRef<Path>,
        options: TransferOptions,
    ) -> TransferOutcome {
        let mut session = self.open_session(OperationKind::Download, &options);
        let result = self
            .download_to_path_in(&mut session, id, path.as_ref(), &options)
            .await;
        session.settle(result).0
    }

    async fn download_to_path_in(
        &self,
        session: &mut TransferSession<'_>,
        id: &str,
        path: &Path,
        options: &TransferOptions,
    ) -> Result<(), Interrupt> {
        let (file_id, bucket) = self.locate_download(session, id, options).await?;

        let file = tokio::fs::File::create(path).await?;
        let mut sink = Tracked::new(file);
        session.attach(sink.gate());

        let result = self
            .transfer_into(session, &file_id, bucket.as_ref(), &mut sink)
            .await;
        if let Err(Interrupt::Failed(_)) = &result {
            let _ = sink.shutdown().await;
        }
        result
    }

    /// Download a whole file into memory; empty on cancellation or failure
    #[instrument(skip(self, options), fields(collection = %self.bucket_name(&options)))]
    pub async fn download_bytes(&self, id: &str, options: TransferOptions) -> Bytes {
        let mut session = self.open_session(OperationKind::Download, &options);
        let result = self.download_bytes_in(&mut session, id, &options).await;
        session.settle(result).1.unwrap_or_default()
    }

    async fn download_bytes_in(
        &self,
        session: &mut TransferSession<'_>,
        id: &str,
        options: &TransferOptions,
    ) -> Result<Bytes, Interrupt> {
        let file_id = FileId::parse(id)?;
        let bucket = self.bucket(options);
        let length = self.resolve_length(bucket.as_ref(), &file_id, session.scope()).await?;

        let max = self.config.max_in_memory_bytes;
        let capacity = match usize::try_from(length) {
            Ok(capacity) if length <= max => capacity,
            _ => return Err(FileError::length_exceeded(length, max).into()),
        };
        session.set_total_length(length);

        let mut sink = Tracked::new(Vec::with_capacity(capacity.min(INITIAL_BUFFER_BYTES)));
        session.attach(sink.gate());
        self.transfer_into(session, &file_id, bucket.as_ref(), &mut sink)
            .await?;
        Ok(Bytes::from(sink.into_inner()))
    }

    /// Open a readable stream over a stored file.
    ///
    /// The stream honors the cancellation token of `options` (or
    /// [`cancel_all`](Self::cancel_all) when none is given) for as long as it is read.
    #[instrument(skip(self, options), fields(collection = %self.bucket_name(&options)))]
    pub async fn open_download_stream(&self, id: &str, options: TransferOptions) -> Option<DownloadStream> {
        let session = self.open_session(OperationKind::Download, &options);
        let result = self.open_download_stream_in(&session, id, &options).await;
        session.settle(result).1
    }

    async fn open_download_stream_in(
        &self,
        session: &TransferSession<'_>,
        id: &str,
        options: &TransferOptions,
    ) -> Result<DownloadStream, Interrupt> {
        let file_id = FileId::parse(id)?;
        if session.is_cancelled() {
            return Err(Interrupt::Cancelled);
        }
        let token = self.detached_token(options);
        Ok(self.bucket(options).open_download_stream(&file_id, &token).await?)
    }

    // ---- uploads ---------------------------------------------------------

    /// Upload `length` bytes from `source`; returns the stored file's id
    #[instrument(skip(self, source, options), fields(collection = %self.bucket_name(&options)))]
    pub async fn upload<R>(&self, file_name: &str, source: R, length: u64, options: TransferOptions) -> Option<String>
    where
        R: AsyncRead + Send + Unpin,
    {
        let mut session = self.open_session(OperationKind::Upload, &options);
        let result = self
            .upload_in(&mut session, file_name, source, length, Ok(None), &options)
            .await;
        session.settle(result).1
    }

    /// Upload with a metadata document serialized from `metadata`
    #[instrument(skip(self, source, metadata, options), fields(collection = %self.bucket_name(&options)))]
    pub async fn upload_with_metadata<R, M>(
        &self,
        file_name: &str,
        source: R,
        length: u64,
        metadata: &M,
        options: TransferOptions,
    ) -> Option<String>
    where
        R: AsyncRead + Send + Unpin,
        M: Serialize,
    {
        let metadata = serde_json::to_value(metadata)
            .map(Some)
            .map_err(FileError::serialization);
        let mut session = self.open_session(OperationKind::Upload, &options);
        let result = self
            .upload_in(&mut session, file_name, source, length, metadata, &options)
            .await;
        session.settle(result).1
    }

    /// Upload a local file under its own file name
    #[instrument(skip(self, path, options), fields(path = %path.as_ref().display()))]
    pub async fn upload_file(&self, path: impl AsRef<Path>, options: TransferOptions) -> Option<String> {
        let mut session = self.open_session(OperationKind::Upload, &options);
        let result = self
            .upload_file_in(&mut session, path.as_ref(), Ok(None), &options)
            .await;
        session.settle(result).1
    }

    /// Upload a local file with a metadata document
    #[instrument(skip(self, path, metadata, options), fields(path = %path.as_ref().display()))]
    pub async fn upload_file_with_metadata<M: Serialize>(
        &self,
        path: impl AsRef<Path>,
        metadata: &M,
        options: TransferOptions,
    ) -> Option<String> {
        let metadata = serde_json::to_value(metadata)
            .map(Some)
            .map_err(FileError::serialization);
        let mut session = self.open_session(OperationKind::Upload, &options);
        let result = self
            .upload_file_in(&mut session, path.as_ref(), metadata, &options)
            .await;
        session.settle(result).1
    }

    async fn upload_file_in(
        &self,
        session: &mut TransferSession<'_>,
        path: &Path,
        metadata: Result<Option<serde_json::Value>, FileError>,
        options: &TransferOptions,
    ) -> Result<String, Interrupt> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name")
            })?;

        let file = tokio::fs::File::open(path).await?;
        let length = file.metadata().await?.len();
        self.upload_in(session, &file_name, file, length, metadata, options)
            .await
    }

    async fn upload_in<R>(
        &self,
        session: &mut TransferSession<'_>,
        file_name: &str,
        source: R,
        length: u64,
        metadata: Result<Option<serde_json::Value>, FileError>,
        options: &TransferOptions,
    ) -> Result<String, Interrupt>
    where
        R: AsyncRead + Send + Unpin,
    {
        let metadata = metadata?;
        let file_id = self.resolve_upload_id(options);
        let bucket = self.bucket(options);
        session.set_total_length(length);

        let mut reader = Tracked::new(source);
        session.attach(reader.gate());

        let scope = session.scope().clone();
        let probe = reader.probe();
        session
            .drive(
                probe,
                self.config.progress_interval,
                bucket.upload_from_reader(&file_id, file_name, &mut reader, metadata, &scope),
            )
            .await?;

        info!(operation = %session.id(), %file_id, file_name, length, "upload completed");
        Ok(file_id.to_string())
    }

    /// Open a write handle for a new file.
    ///
    /// The file is stored once the handle is committed.
    #[instrument(skip(self, options), fields(collection = %self.bucket_name(&options)))]
    pub async fn open_upload_stream(&self, file_name: &str, options: TransferOptions) -> Option<UploadHandle> {
        let session = self.open_session(OperationKind::Upload, &options);
        let result = self.open_upload_stream_in(&session, file_name, &options).await;
        session.settle(result).1
    }

    async fn open_upload_stream_in(
        &self,
        session: &TransferSession<'_>,
        file_name: &str,
        options: &TransferOptions,
    ) -> Result<UploadHandle, Interrupt> {
        if session.is_cancelled() {
            return Err(Interrupt::Cancelled);
        }
        let file_id = self.resolve_upload_id(options);
        let token = self.detached_token(options);
        let stream = self
            .bucket(options)
            .open_upload_stream(&file_id, file_name, None, &token)
            .await?;
        Ok(UploadHandle::new(stream))
    }

    // ---- queries ---------------------------------------------------------

    /// Every file of the partition
    #[instrument(skip(self, options), fields(collection = %self.bucket_name(&options)))]
    pub async fn list_all(&self, options: TransferOptions) -> Option<Vec<FileRecord>> {
        let session = self.open_session(OperationKind::Query, &options);
        let result = self
            .bucket(&options)
            .find_all(session.scope())
            .await
            .map(|raws| self.projector.project_all(raws))
            .map_err(Interrupt::from);
        session.settle(result).1
    }

    /// Files whose name equals or contains `pattern`
    #[instrument(skip(self, options), fields(collection = %self.bucket_name(&options)))]
    pub async fn list_by_name(&self, pattern: &str, options: TransferOptions) -> Option<Vec<FileRecord>> {
        let session = self.open_session(OperationKind::Query, &options);
        let filter = NameFilter::Contains(pattern.to_string());
        let result = self
            .bucket(&options)
            .find_by_name(&filter, session.scope())
            .await
            .map(|raws| self.projector.project_all(raws))
            .map_err(Interrupt::from);
        session.settle(result).1
    }

    #[instrument(skip(self, options), fields(collection = %self.bucket_name(&options)))]
    pub async fn get_by_id(&self, id: &str, options: TransferOptions) -> Option<FileRecord> {
        let session = self.open_session(OperationKind::Query, &options);
        let result = self.get_by_id_in(&session, id, &options).await;
        session.settle(result).1
    }

    async fn get_by_id_in(
        &self,
        session: &TransferSession<'_>,
        id: &str,
        options: &TransferOptions,
    ) -> Result<FileRecord, Interrupt> {
        let file_id = FileId::parse(id)?;
        let raw = self
            .bucket(options)
            .find_by_id(&file_id, session.scope())
            .await?
            .ok_or_else(|| FileError::not_found(id))?;
        Ok(self.projector.project(raw))
    }

    /// Every file of the partition with metadata decoded as JSON into `M`
    pub async fn list_all_typed<M>(&self, options: TransferOptions) -> Option<Vec<TypedFileRecord<M>>>
    where
        M: Serialize + DeserializeOwned,
    {
        self.list_all_with(&JsonCodec, options).await
    }

    /// Every file of the partition with metadata decoded by `codec`.
    ///
    /// Any record that fails to decode fails the whole call, and so does a
    /// cancellation observed while records are being decoded.
    #[instrument(skip(self, codec, options), fields(collection = %self.bucket_name(&options)))]
    pub async fn list_all_with<M, C>(&self, codec: &C, options: TransferOptions) -> Option<Vec<TypedFileRecord<M>>>
    where
        C: MetadataCodec<M>,
    {
        let session = self.open_session(OperationKind::Query, &options);
        let result = self.list_typed_in(&session, None, codec, &options).await;
        session.settle(result).1
    }

    pub async fn list_by_name_typed<M>(
        &self,
        pattern: &str,
        options: TransferOptions,
    ) -> Option<Vec<TypedFileRecord<M>>>
    where
        M: Serialize + DeserializeOwned,
    {
        self.list_by_name_with(pattern, &JsonCodec, options).await
    }

    #[instrument(skip(self, codec, options), fields(collection = %self.bucket_name(&options)))]
    pub async fn list_by_name_with<M, C>(
        &self,
        pattern: &str,
        codec: &C,
        options: TransferOptions,
    ) -> Option<Vec<TypedFileRecord<M>>>
    where
        C: MetadataCodec<M>,
    {
        let session = self.open_session(OperationKind::Query, &options);
        let filter = NameFilter::Contains(pattern.to_string());
        let result = self
            .list_typed_in(&session, Some(&filter), codec, &options)
            .await;
        session.settle(result).1
    }

    async fn list_typed_in<M, C>(
        &self,
        session: &TransferSession<'_>,
        filter: Option<&NameFilter>,
        codec: &C,
        options: &TransferOptions,
    ) -> Result<Vec<TypedFileRecord<M>>, Interrupt>
    where
        C: MetadataCodec<M>,
    {
        let bucket = self.bucket(options);
        let raws = match filter {
            Some(filter) => bucket.find_by_name(filter, session.scope()).await?,
            None => bucket.find_all(session.scope()).await?,
        };

        let projector = FileRecordProjector::new(codec);
        let mut records = Vec::with_capacity(raws.len());
        for raw in raws {
            if session.is_cancelled() {
                return Err(Interrupt::Cancelled);
            }
            records.push(projector.project_typed(raw)?);
        }
        Ok(records)
    }

    pub async fn get_by_id_typed<M>(&self, id: &str, options: TransferOptions) -> Option<TypedFileRecord<M>>
    where
        M: Serialize + DeserializeOwned,
    {
        self.get_by_id_with(id, &JsonCodec, options).await
    }

    #[instrument(skip(self, codec, options), fields(collection = %self.bucket_name(&options)))]
    pub async fn get_by_id_with<M, C>(
        &self,
        id: &str,
        codec: &C,
        options: TransferOptions,
    ) -> Option<TypedFileRecord<M>>
    where
        C: MetadataCodec<M>,
    {
        let session = self.open_session(OperationKind::Query, &options);
        let result = self.get_by_id_typed_in(&session, id, codec, &options).await;
        session.settle(result).1
    }

    async fn get_by_id_typed_in<M, C>(
        &self,
        session: &TransferSession<'_>,
        id: &str,
        codec: &C,
        options: &TransferOptions,
    ) -> Result<TypedFileRecord<M>, Interrupt>
    where
        C: MetadataCodec<M>,
    {
        let file_id = FileId::parse(id)?;
        let raw = self
            .bucket(options)
            .find_by_id(&file_id, session.scope())
            .await?
            .ok_or_else(|| FileError::not_found(id))?;
        Ok(FileRecordProjector::new(codec).project_typed(raw)?)
    }

    /// Files whose metadata field `field` equals `value`, decoded as JSON into `M`
    pub async fn list_by_metadata_field<M, V>(
        &self,
        field: &str,
        value: &V,
        options: TransferOptions,
    ) -> Option<Vec<TypedFileRecord<M>>>
    where
        M: Serialize + DeserializeOwned,
        V: Serialize,
    {
        self.list_by_metadata_field_with(field, value, &JsonCodec, options)
            .await
    }

    /// Files whose metadata field `field` equals `value`.
    ///
    /// `field` is a dotted path below the metadata document; `"Id"` addresses
    /// the document's native id. Matches are re-read one by one, so this is
    /// meant for small administrative lookups rather than bulk queries.
    #[instrument(skip(self, value, codec, options), fields(collection = %self.bucket_name(&options)))]
    pub async fn list_by_metadata_field_with<M, V, C>(
        &self,
        field: &str,
        value: &V,
        codec: &C,
        options: TransferOptions,
    ) -> Option<Vec<TypedFileRecord<M>>>
    where
        V: Serialize,
        C: MetadataCodec<M>,
    {
        let session = self.open_session(OperationKind::Query, &options);
        let result = self
            .list_by_metadata_field_in(&session, field, value, codec, &options)
            .await;
        session.settle(result).1
    }

    async fn list_by_metadata_field_in<M, V, C>(
        &self,
        session: &TransferSession<'_>,
        field: &str,
        value: &V,
        codec: &C,
        options: &TransferOptions,
    ) -> Result<Vec<TypedFileRecord<M>>, Interrupt>
    where
        V: Serialize,
        C: MetadataCodec<M>,
    {
        let value = serde_json::to_value(value).map_err(FileError::serialization)?;
        let path = metadata_path(field);
        let bucket_name = self.bucket_name(options);

        let ids = self
            .store
            .files_collection(bucket_name)
            .find_ids_by_field(&path, &value, session.scope())
            .await?;

        let bucket = self.store.bucket(bucket_name);
        let projector = FileRecordProjector::new(codec);
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if session.is_cancelled() {
                return Err(Interrupt::Cancelled);
            }
            match bucket.find_by_id(&id, session.scope()).await? {
                Some(raw) => records.push(projector.project_typed(raw)?),
                None => debug!(%id, "matched file disappeared before it was read"),
            }
        }
        Ok(records)
    }
}

impl std::fmt::Debug for TransferManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferManager")
            .field("config", &self.config)
            .field("events", &self.events)
            .field("active_operations", &self.sessions.len())
            .finish()
    }
}

/// Document path of a metadata field, with `Id` mapped to the native id key
fn metadata_path(field: &str) -> String {
    let field = if field == "Id" { "_id" } else { field };
    format!("{METADATA_FIELD}.{field}")
}
