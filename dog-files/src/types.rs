use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{FileError, FileResult};

/// Partition used when no collection name is given
pub const DEFAULT_COLLECTION: &str = "Files";

/// Store-native identifier of a stored file.
///
/// Identifiers are time-ordered (UUIDv7) and exchanged with callers in their
/// canonical hyphenated string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(Uuid);

impl FileId {
    /// Generate a new time-ordered file id
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Parse a caller-supplied id string
    pub fn parse(id: &str) -> FileResult<Self> {
        Uuid::parse_str(id.trim())
            .map(Self)
            .map_err(|_| FileError::invalid_id(id))
    }

    /// Check whether a string is a well-formed file id
    pub fn is_valid(id: &str) -> bool {
        !id.trim().is_empty() && Self::parse(id).is_ok()
    }

    /// Creation instant embedded in the id, if it carries one
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        let ts = self.0.get_timestamp()?;
        let (secs, nanos) = ts.to_unix();
        DateTime::from_timestamp(secs as i64, nanos)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for FileId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::str::FromStr for FileId {
    type Err = FileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Identifier of one manager operation, carried by every event it emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationId(u64);

static OPERATION_ID: AtomicU64 = AtomicU64::new(1);

impl OperationId {
    pub(crate) fn next() -> Self {
        Self(OPERATION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// Kind of work a session performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Upload,
    Download,
    Rename,
    Delete,
    MetadataUpdate,
    Query,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
            Self::Rename => "rename",
            Self::Delete => "delete",
            Self::MetadataUpdate => "metadata_update",
            Self::Query => "query",
        }
    }

    /// Whether the operation moves file content and is sampled for progress
    pub fn moves_data(&self) -> bool {
        matches!(self, Self::Upload | Self::Download)
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call options for manager operations
#[derive(Debug, Clone, Default)]
pub struct TransferOptions {
    collection_name: Option<String>,
    preset_id: Option<String>,
    cancellation: Option<CancellationToken>,
}

impl TransferOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target a named partition; blank names fall back to the default
    pub fn with_collection<S: Into<String>>(mut self, name: S) -> Self {
        let name = name.into();
        if !name.trim().is_empty() {
            self.collection_name = Some(name);
        }
        self
    }

    /// Store an upload under a caller-chosen id
    pub fn with_preset_id<S: Into<String>>(mut self, id: S) -> Self {
        let id = id.into();
        self.preset_id = if id.trim().is_empty() { None } else { Some(id) };
        self
    }

    /// Link the operation to an external cancellation signal
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn collection_name(&self) -> Option<&str> {
        self.collection_name.as_deref()
    }

    pub fn preset_id(&self) -> Option<&str> {
        self.preset_id.as_deref()
    }

    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    /// Resolve the partition name against a default
    pub(crate) fn collection_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.collection_name().unwrap_or(default)
    }
}

/// Opaque handle of an externally managed transactional session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle(String);

impl SessionHandle {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_id_round_trips_through_its_string_form() {
        let id = FileId::generate();
        let parsed = FileId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
        assert!(FileId::is_valid(&id.to_string()));
    }

    #[test]
    fn malformed_ids_are_rejected() {
        for bad in ["", "   ", "not-an-id", "507f1f77bcf86cd79943901", "zzzzzzzz-zzzz-zzzz-zzzz-zzzzzzzzzzzz"] {
            assert!(!FileId::is_valid(bad), "{bad:?} should be invalid");
            assert!(matches!(FileId::parse(bad), Err(FileError::InvalidIdFormat { .. })));
        }
    }

    #[test]
    fn generated_ids_are_time_ordered() {
        let first = FileId::generate();
        let second = FileId::generate();
        assert!(first < second);

        let created = first.created_at().unwrap();
        let drift = (Utc::now() - created).num_seconds().abs();
        assert!(drift < 5);
    }

    #[test]
    fn blank_options_fall_back() {
        let options = TransferOptions::new().with_collection("  ").with_preset_id("");
        assert_eq!(options.collection_or(DEFAULT_COLLECTION), DEFAULT_COLLECTION);
        assert!(options.preset_id().is_none());

        let options = TransferOptions::new().with_collection("media");
        assert_eq!(options.collection_or(DEFAULT_COLLECTION), "media");
    }
}
