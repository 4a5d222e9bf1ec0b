use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::error::{Result, VidError};

pub const DEFAULT_LISTEN_PORT: u16 = 3000;
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 128;
pub const DEFAULT_MAX_PROCESSES: usize = 16;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1;

fn default_listen_port() -> u16 {
    DEFAULT_LISTEN_PORT
}

fn default_thumbnail_size() -> u32 {
    DEFAULT_THUMBNAIL_SIZE
}

fn default_max_processes() -> usize {
    DEFAULT_MAX_PROCESSES
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_local_directory() -> PathBuf {
    PathBuf::from("./videos")
}

fn default_binary_path() -> String {
    "ffmpeg".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub framer: FramerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub media: MediaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Production mode: INFO level JSON logs instead of coloured TRACE logs
    #[serde(default)]
    pub is_prod: bool,
    /// TCP port the HTTP server listens on
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// Width of the rectangle thumbnails are padded to
    #[serde(default = "default_thumbnail_size")]
    pub thumbnail_width: u32,
    /// Height of the rectangle thumbnails are padded to
    #[serde(default = "default_thumbnail_size")]
    pub thumbnail_height: u32,
    /// Optional cap on upload body size; uploads are unlimited when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_upload_bytes: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FramerConfig {
    /// Max number of concurrently running ffmpeg processes
    #[serde(default = "default_max_processes")]
    pub max_processes: usize,
    /// Number of jobs that may wait for admission. Kept small on purpose so
    /// callers feel backpressure instead of piling up work.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the stored video files
    #[serde(default = "default_local_directory")]
    pub local_directory: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    #[serde(default = "default_binary_path")]
    pub binary_path: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            is_prod: false,
            listen_port: DEFAULT_LISTEN_PORT,
            thumbnail_width: DEFAULT_THUMBNAIL_SIZE,
            thumbnail_height: DEFAULT_THUMBNAIL_SIZE,
            max_upload_bytes: None,
        }
    }
}

impl Default for FramerConfig {
    fn default() -> Self {
        Self {
            max_processes: DEFAULT_MAX_PROCESSES,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            local_directory: default_local_directory(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            binary_path: default_binary_path(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| VidError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;

        Ok(config.normalized())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| VidError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| VidError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Name of the per-environment config file, e.g. `config-local.toml`
    pub fn environment_file(environment: &str) -> PathBuf {
        PathBuf::from(format!("config-{}.toml", environment))
    }

    /// Replace zero values with defaults
    pub fn normalized(mut self) -> Self {
        if self.api.listen_port == 0 {
            self.api.listen_port = DEFAULT_LISTEN_PORT;
        }
        if self.api.thumbnail_width == 0 {
            self.api.thumbnail_width = DEFAULT_THUMBNAIL_SIZE;
        }
        if self.api.thumbnail_height == 0 {
            self.api.thumbnail_height = DEFAULT_THUMBNAIL_SIZE;
        }
        if self.api.max_upload_bytes == Some(0) {
            self.api.max_upload_bytes = None;
        }
        if self.framer.max_processes == 0 {
            self.framer.max_processes = DEFAULT_MAX_PROCESSES;
        }
        if self.framer.queue_capacity == 0 {
            self.framer.queue_capacity = DEFAULT_QUEUE_CAPACITY;
        }
        if self.media.binary_path.trim().is_empty() {
            self.media.binary_path = default_binary_path();
        }
        self
    }
}
