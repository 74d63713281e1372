use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::store::RawFileRecord;
use crate::{FileError, FileResult};

/// Description of a stored file with its untyped metadata document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub length: u64,
    pub upload_date: DateTime<Utc>,
    pub file_name: String,
    pub raw_metadata: serde_json::Value,
}

/// Description of a stored file with metadata decoded into `M`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedFileRecord<M> {
    pub id: String,
    pub length: u64,
    pub upload_date: DateTime<Utc>,
    pub file_name: String,
    pub metadata: M,
}

/// Converts between metadata documents and caller types
pub trait MetadataCodec<M>: Send + Sync {
    fn decode(&self, raw: &serde_json::Value) -> FileResult<M>;

    fn encode(&self, metadata: &M) -> FileResult<serde_json::Value>;
}

/// serde_json-backed metadata codec
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<M> MetadataCodec<M> for JsonCodec
where
    M: Serialize + DeserializeOwned,
{
    fn decode(&self, raw: &serde_json::Value) -> FileResult<M> {
        M::deserialize(raw).map_err(FileError::deserialization)
    }

    fn encode(&self, metadata: &M) -> FileResult<serde_json::Value> {
        serde_json::to_value(metadata).map_err(FileError::serialization)
    }
}

impl<M, C> MetadataCodec<M> for &C
where
    C: MetadataCodec<M> + ?Sized,
{
    fn decode(&self, raw: &serde_json::Value) -> FileResult<M> {
        (**self).decode(raw)
    }

    fn encode(&self, metadata: &M) -> FileResult<serde_json::Value> {
        (**self).encode(metadata)
    }
}

/// Projects raw store records into caller-facing records
#[derive(Debug, Clone, Default)]
pub struct FileRecordProjector<C = JsonCodec> {
    codec: C,
}

impl FileRecordProjector<JsonCodec> {
    pub fn json() -> Self {
        Self { codec: JsonCodec }
    }
}

impl<C> FileRecordProjector<C> {
    pub fn new(codec: C) -> Self {
        Self { codec }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn project(&self, raw: RawFileRecord) -> FileRecord {
        FileRecord {
            id: raw.id.to_string(),
            length: raw.length,
            upload_date: raw.upload_date,
            file_name: raw.filename,
            raw_metadata: raw.metadata.unwrap_or(serde_json::Value::Null),
        }
    }

    /// Decode the metadata document of one record; failure rejects the record
    pub fn project_typed<M>(&self, raw: RawFileRecord) -> FileResult<TypedFileRecord<M>>
    where
        C: MetadataCodec<M>,
    {
        let record = self.project(raw);
        let metadata = self.codec.decode(&record.raw_metadata)?;
        Ok(TypedFileRecord {
            id: record.id,
            length: record.length,
            upload_date: record.upload_date,
            file_name: record.file_name,
            metadata,
        })
    }

    pub fn project_all(&self, raws: Vec<RawFileRecord>) -> Vec<FileRecord> {
        raws.into_iter().map(|raw| self.project(raw)).collect()
    }
}
