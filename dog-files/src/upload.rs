use tokio::io::AsyncWrite;

use crate::error::StoreError;
use crate::store::UploadStream;
use crate::{FileError, FileResult};

/// Write handle returned by [`TransferManager::open_upload_stream`](crate::TransferManager::open_upload_stream).
///
/// The handle may be empty; finalizing an empty handle is a no-op.
pub struct UploadHandle {
    stream: Option<Box<dyn UploadStream>>,
}

impl UploadHandle {
    pub(crate) fn new(stream: Box<dyn UploadStream>) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    /// A handle with no underlying stream
    pub fn empty() -> Self {
        Self { stream: None }
    }

    /// Id the file will be stored under
    pub fn id(&self) -> Option<String> {
        self.stream.as_ref().map(|stream| stream.id().to_string())
    }

    /// Stream to write the file content into
    pub fn write_stream(&mut self) -> Option<&mut (dyn AsyncWrite + Send + Unpin)> {
        self.stream
            .as_mut()
            .map(|stream| stream as &mut (dyn AsyncWrite + Send + Unpin))
    }

    /// Finalize the file and release the stream
    pub async fn commit_and_close(mut self) -> FileResult<()> {
        match self.stream.take() {
            Some(stream) => stream.commit().await.map_err(store_error),
            None => Ok(()),
        }
    }

    /// Discard the written content and release the stream
    pub async fn abort_and_close(mut self) -> FileResult<()> {
        match self.stream.take() {
            Some(stream) => stream.abort().await.map_err(store_error),
            None => Ok(()),
        }
    }
}

fn store_error(err: StoreError) -> FileError {
    err.into()
}

impl std::fmt::Debug for UploadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadHandle").field("id", &self.id()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_handle_is_a_no_op() {
        let mut handle = UploadHandle::empty();
        assert!(handle.id().is_none());
        assert!(handle.write_stream().is_none());
        handle.commit_and_close().await.unwrap();
        UploadHandle::empty().abort_and_close().await.unwrap();
    }
}
