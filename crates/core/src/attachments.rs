use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::ApplicationError;

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("attachment `{0}` is not managed by this store")]
    UnknownUrl(String),
    #[error("attachment file name `{0}` is not allowed")]
    InvalidName(String),
    #[error("attachment io failure: {0}")]
    Io(#[from] std::io::Error),
}

impl From<AttachmentError> for ApplicationError {
    fn from(error: AttachmentError) -> Self {
        Self::Integration(error.to_string())
    }
}

/// Opaque blob storage for refund receipts.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn put(&self, file_name: &str, bytes: Vec<u8>) -> Result<String, AttachmentError>;
    async fn delete(&self, url: &str) -> Result<(), AttachmentError>;
}

/// Keeps only the extension of a caller-provided name.
pub fn stored_name(file_name: &str) -> Result<String, AttachmentError> {
    let trimmed = file_name.trim();
    if trimmed.is_empty() || trimmed.contains(['/', '\\']) || trimmed.starts_with('.') {
        return Err(AttachmentError::InvalidName(file_name.to_string()));
    }
    let extension = trimmed
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()));
    let id = Uuid::new_v4().simple().to_string();
    Ok(match extension {
        Some(ext) => format!("{id}.{ext}"),
        None => id,
    })
}

#[derive(Clone, Default)]
pub struct InMemoryAttachmentStore {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryAttachmentStore {
    const BASE: &'static str = "memory://attachments/";

    pub async fn contains(&self, url: &str) -> bool {
        self.blobs.read().await.contains_key(url)
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }
}

#[async_trait]
impl AttachmentStore for InMemoryAttachmentStore {
    async fn put(&self, file_name: &str, bytes: Vec<u8>) -> Result<String, AttachmentError> {
        let url = format!("{}{}", Self::BASE, stored_name(file_name)?);
        self.blobs.write().await.insert(url.clone(), bytes);
        Ok(url)
    }

    async fn delete(&self, url: &str) -> Result<(), AttachmentError> {
        match self.blobs.write().await.remove(url) {
            Some(_) => Ok(()),
            None => Err(AttachmentError::UnknownUrl(url.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{stored_name, AttachmentError, AttachmentStore, InMemoryAttachmentStore};

    #[test]
    fn stored_names_drop_everything_but_the_extension() {
        let name = stored_name("Receipt March.PNG").expect("name");
        assert!(name.ends_with(".png"));
        assert!(!name.contains("Receipt"));

        assert!(matches!(stored_name("../etc/passwd"), Err(AttachmentError::InvalidName(_))));
        assert!(matches!(stored_name(""), Err(AttachmentError::InvalidName(_))));
    }

    #[tokio::test]
    async fn put_then_delete() {
        let store = InMemoryAttachmentStore::default();
        let url = store.put("receipt.jpg", vec![1, 2, 3]).await.expect("put");
        assert!(store.contains(&url).await);

        store.delete(&url).await.expect("delete");
        assert_eq!(store.len().await, 0);
        assert!(matches!(store.delete(&url).await, Err(AttachmentError::UnknownUrl(_))));
    }
}
