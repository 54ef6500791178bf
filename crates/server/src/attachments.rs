use std::path::PathBuf;

use async_trait::async_trait;
use tally_core::attachments::{stored_name, AttachmentError, AttachmentStore};
use tally_core::config::AttachmentsConfig;

/// Receipt storage in a local directory, addressed as `{public_base_url}/{name}`.
#[derive(Clone, Debug)]
pub struct DiskAttachmentStore {
    root_dir: PathBuf,
    public_base_url: String,
}

impl DiskAttachmentStore {
    pub fn new(config: &AttachmentsConfig) -> Self {
        Self {
            root_dir: config.root_dir.clone(),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn path_for(&self, url: &str) -> Result<PathBuf, AttachmentError> {
        let name = url
            .strip_prefix(&self.public_base_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|name| {
                !name.is_empty() && !name.contains(['/', '\\']) && !name.starts_with('.')
            })
            .ok_or_else(|| AttachmentError::UnknownUrl(url.to_string()))?;
        Ok(self.root_dir.join(name))
    }
}

#[async_trait]
impl AttachmentStore for DiskAttachmentStore {
    async fn put(&self, file_name: &str, bytes: Vec<u8>) -> Result<String, AttachmentError> {
        let name = stored_name(file_name)?;
        tokio::fs::create_dir_all(&self.root_dir).await?;
        tokio::fs::write(self.root_dir.join(&name), bytes).await?;
        Ok(format!("{}/{}", self.public_base_url, name))
    }

    async fn delete(&self, url: &str) -> Result<(), AttachmentError> {
        let path = self.path_for(url)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Err(AttachmentError::UnknownUrl(url.to_string()))
            }
            Err(error) => Err(error.into()),
        }
    }
}
