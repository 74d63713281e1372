//! # dog-files: Streaming file transfers over bucket-style document stores
//!
//! `dog-files` moves file content in and out of a chunked blob store (GridFS-style
//! buckets living next to a document collection of file records) and keeps callers
//! informed while it does so.
//!
//! ## Key Features
//!
//! - **Streaming-first**: uploads and downloads copy between async streams, never buffering whole files unless asked to
//! - **Progress events**: byte progress is sampled on a fixed interval and broadcast as [`TransferEvent`]s
//! - **Per-call cancellation**: every call owns its own scope, cancellable one by one or all at once
//! - **Typed metadata**: file records project their metadata document into your own types
//! - **Store agnostic**: anything implementing [`BucketStore`] works, an in-memory store ships for tests
//!
//! ## Quick Start
//!
//! ```rust
//! use dog_files::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Tag {
//!     tag: String,
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let manager = TransferManager::new(MemoryBucketStore::new(), TransferConfig::default());
//!
//! let data = b"Hello, world!";
//! let id = manager
//!     .upload_with_metadata("hello.txt", &data[..], data.len() as u64, &Tag { tag: "x".into() }, TransferOptions::new())
//!     .await
//!     .expect("upload completes");
//!
//! let content = manager.download_bytes(&id, TransferOptions::new()).await;
//! assert_eq!(&content[..], data);
//!
//! let tagged: Vec<TypedFileRecord<Tag>> = manager
//!     .list_by_metadata_field("tag", &"x", TransferOptions::new())
//!     .await
//!     .unwrap_or_default();
//! assert_eq!(tagged.len(), 1);
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────┐
//! │   Your Service    │  ← Business logic only
//! ├───────────────────┤
//! │  TransferManager  │  ← Sessions, progress, cancellation, events
//! ├───────────────────┤
//! │   BucketStore     │  ← Blob and file-record primitives
//! └───────────────────┘
//! ```
//!
//! Failures never surface as `Err` from the manager. A call that could not
//! finish returns its empty value (`None`, empty bytes, a non-completed
//! [`TransferOutcome`]) and reports the reason through its terminal event:
//!
//! ```rust
//! use dog_files::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let manager = TransferManager::new(MemoryBucketStore::new(), TransferConfig::default());
//! let mut events = manager.subscribe();
//!
//! let outcome = manager.delete("not-an-id", TransferOptions::new()).await;
//! assert!(matches!(outcome.error(), Some(FileError::InvalidIdFormat { .. })));
//!
//! assert_eq!(events.recv().await.unwrap().event_name(), "started");
//! assert_eq!(events.recv().await.unwrap().event_name(), "crashed");
//! # }
//! ```

mod config;
mod error;
mod events;
mod manager;
pub mod memory;
mod progress;
mod record;
mod session;
pub mod store;
mod stream;
mod types;
mod upload;

// Re-export main types for clean API
pub use config::TransferConfig;
pub use error::{error_chain, FileError, FileResult, StoreError};
pub use events::{EventBus, ListenerId, TransferEvent, TransferListener};
pub use manager::TransferManager;
pub use memory::MemoryBucketStore;
pub use progress::{ProgressSample, ProgressSampler};
pub use record::{FileRecord, FileRecordProjector, JsonCodec, MetadataCodec, TypedFileRecord};
pub use session::TransferOutcome;
pub use store::{
    BlobBucket, BucketStore, DownloadStream, FilesCollection, NameFilter, RawFileRecord, StoreResult,
    UploadStream,
};
pub use stream::{PositionProbe, StreamGate, Tracked};
pub use types::{FileId, OperationId, OperationKind, SessionHandle, TransferOptions, DEFAULT_COLLECTION};
pub use upload::UploadHandle;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        FileError, FileId, FileRecord, FileResult, MemoryBucketStore, TransferConfig, TransferEvent,
        TransferManager, TransferOptions, TransferOutcome, TypedFileRecord, UploadHandle,
    };
}
