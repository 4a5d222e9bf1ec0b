use thiserror::Error;

#[derive(Error, Debug)]
pub enum VidError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Media processing error: {0}")]
    Media(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid file name: {0}")]
    InvalidFileName(String),

    #[error("File already exists: {0}")]
    FileExists(String),

    #[error("Frame dispatcher is already running")]
    AlreadyRunning,
}

pub type Result<T> = std::result::Result<T, VidError>;
