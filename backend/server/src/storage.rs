//! Avatar object storage on the local filesystem.
//!
//! Each upload lands at `{root}/avatars/{uid}` with its content type beside it
//! in `{uid}.type`. A new upload overwrites the old one.
use std::{io::ErrorKind, path::PathBuf};

use tokio::fs;
use tracing::info;

use crate::error::AppError;

pub const MAX_AVATAR_BYTES: usize = 2 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct AvatarStore {
    root: PathBuf,
}

fn check_uid(uid: &str) -> Result<(), AppError> {
    if uid.is_empty() || !uid.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::not_found("Avatar not found"));
    }
    Ok(())
}

pub fn check_upload(content_type: &str, size: usize) -> Result<(), AppError> {
    if size > MAX_AVATAR_BYTES {
        return Err(AppError::validation("File size must be less than 2MB"));
    }
    if !content_type.starts_with("image/") {
        return Err(AppError::validation("Only image files are allowed"));
    }
    Ok(())
}

impl AvatarStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn directory(&self) -> PathBuf {
        self.root.join("avatars")
    }

    pub async fn put(&self, uid: &str, content_type: &str, bytes: &[u8]) -> Result<(), AppError> {
        check_uid(uid)?;
        check_upload(content_type, bytes.len())?;

        let directory = self.directory();
        fs::create_dir_all(&directory).await.map_err(io_error)?;
        fs::write(directory.join(uid), bytes).await.map_err(io_error)?;
        fs::write(directory.join(format!("{uid}.type")), content_type)
            .await
            .map_err(io_error)?;

        info!("Stored avatar for {uid} ({} bytes)", bytes.len());
        Ok(())
    }

    /// Content type and bytes, or `None` when nothing was uploaded.
    pub async fn get(&self, uid: &str) -> Result<Option<(String, Vec<u8>)>, AppError> {
        check_uid(uid)?;

        let directory = self.directory();
        let bytes = match fs::read(directory.join(uid)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(e)),
        };
        let content_type = fs::read_to_string(directory.join(format!("{uid}.type")))
            .await
            .unwrap_or_else(|_| "application/octet-stream".to_string());

        Ok(Some((content_type, bytes)))
    }
}

fn io_error(e: std::io::Error) -> AppError {
    AppError::InternalError(Box::new(e))
}
