//! Avatar uploads
//!
//! Files land in `{upload}/avatars/{user}-{uuid}.{ext}` and are served from
//! `/uploads/avatars/..`.

use crate::config::UploadConfig;
use crate::services::user::{UserService, UserServiceError};
use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use uuid::Uuid;

const AVATAR_URL_PREFIX: &str = "/uploads/avatars/";

pub struct AvatarService {
    users: Arc<UserService>,
    config: Arc<UploadConfig>,
}

impl AvatarService {
    pub fn new(users: Arc<UserService>, config: Arc<UploadConfig>) -> Self {
        Self { users, config }
    }

    fn avatar_dir(&self) -> PathBuf {
        self.config.path.join("avatars")
    }

    /// Store an uploaded image and make it the user's avatar, returning its URL
    pub async fn store_avatar(
        &self,
        user_id: i64,
        content_type: &str,
        data: &[u8],
    ) -> Result<String, UserServiceError> {
        if !self.config.is_type_allowed(content_type) {
            return Err(UserServiceError::ValidationError(format!(
                "Invalid file type: {}. Allowed types: {}",
                content_type,
                self.config.allowed_types.join(", ")
            )));
        }
        if data.is_empty() {
            return Err(UserServiceError::ValidationError("No file provided".to_string()));
        }
        if data.len() as u64 > self.config.max_file_size {
            return Err(UserServiceError::ValidationError(format!(
                "File too large. Maximum size: {} MB",
                self.config.max_file_size / 1024 / 1024
            )));
        }

        let dir = self.avatar_dir();
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let filename = format!(
            "{}-{}.{}",
            user_id,
            Uuid::new_v4(),
            self.config.get_extension(content_type)
        );
        let path = dir.join(&filename);
        fs::write(&path, data)
            .await
            .with_context(|| format!("Failed to save {}", path.display()))?;

        let url = format!("{}{}", AVATAR_URL_PREFIX, filename);
        let previous = match self.users.set_avatar(user_id, &url).await {
            Ok(previous) => previous,
            Err(e) => {
                let _ = fs::remove_file(&path).await;
                return Err(e);
            }
        };

        if let Some(old) = previous.as_deref().and_then(|p| p.strip_prefix(AVATAR_URL_PREFIX)) {
            // Only plain file names we wrote ourselves
            if !old.contains('/') && !old.contains("..") {
                if let Err(e) = fs::remove_file(dir.join(old)).await {
                    tracing::warn!("Failed to remove old avatar {}: {}", old, e);
                }
            }
        }

        Ok(url)
    }
}
