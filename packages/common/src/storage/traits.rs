use std::io::Cursor;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use super::error::StorageError;

/// Type alias for a boxed async reader.
pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

/// Path-addressed durable object storage for source files and testcase fixtures.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store the reader's contents under `path`, replacing any previous object.
    async fn upload(&self, reader: BoxReader, path: &str) -> Result<(), StorageError>;

    /// Store bytes under `path`.
    async fn upload_bytes(&self, data: &[u8], path: &str) -> Result<(), StorageError> {
        let reader: BoxReader = Box::new(Cursor::new(data.to_vec()));
        self.upload(reader, path).await
    }

    /// Check whether an object exists.
    async fn exists(&self, path: &str) -> Result<bool, StorageError>;
}
