use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::StorageConfig;
use crate::error::{Result, VidError};

/// Name and size of a stored file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileProperties {
    pub name: String,
    pub size: u64,
}

/// Flat directory of video files on local disk
#[derive(Debug, Clone)]
pub struct Storage {
    config: StorageConfig,
}

impl Storage {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    pub fn directory(&self) -> &Path {
        &self.config.local_directory
    }

    /// Create the storage directory if it is missing
    pub async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(self.directory()).await?;
        info!("Storing videos in {}", self.directory().display());
        Ok(())
    }

    /// Resolve a logical file name inside the storage directory.
    ///
    /// Only plain names are accepted, nothing that could walk out of the
    /// directory.
    pub fn path_for(&self, filename: &str) -> Result<PathBuf> {
        let mut components = Path::new(filename).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) if name == filename => {
                Ok(self.directory().join(filename))
            }
            _ => Err(VidError::InvalidFileName(filename.to_string())),
        }
    }

    /// Check whether a file is stored under `filename`
    pub async fn exists(&self, filename: &str) -> Result<bool> {
        let path = self.path_for(filename)?;
        match fs::metadata(&path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Create a new, empty file for `filename`; existing files are never overwritten
    pub async fn create(&self, filename: &str) -> Result<fs::File> {
        let path = self.path_for(filename)?;

        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => VidError::FileExists(filename.to_string()),
                _ => VidError::Io(e),
            })
    }

    /// Delete a stored file
    pub async fn remove(&self, filename: &str) -> Result<()> {
        let path = self.path_for(filename)?;
        fs::remove_file(&path).await?;
        debug!("Removed {}", path.display());
        Ok(())
    }

    /// List every file in the storage directory, sorted by name
    pub fn list(&self) -> Result<Vec<FileProperties>> {
        let mut files = Vec::new();

        for entry in WalkDir::new(self.directory())
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }

            // Unreadable metadata is reported as size 0 instead of failing the listing
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            files.push(FileProperties {
                name: entry.file_name().to_string_lossy().to_string(),
                size,
            });
        }

        debug!("Listed {} stored files", files.len());
        Ok(files)
    }
}
