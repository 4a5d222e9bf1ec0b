// Frame extraction engine
//
// - Processor: ffmpeg-backed implementation of the extractor
// - Commands: command builders and filter chain construction

pub mod commands;
pub mod processor;

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub use commands::*;
pub use processor::*;

use crate::config::MediaConfig;
use crate::error::Result;
use crate::framer::FrameRequest;

/// Decodes a single video frame into a JPEG image
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// Extract the frame described by `request`.
    ///
    /// Returns an empty payload when the index is past the last frame.
    /// Must stop promptly once `cancel` fires.
    async fn extract(&self, cancel: &CancellationToken, request: &FrameRequest) -> Result<Vec<u8>>;

    /// Get extractor version information
    async fn version_info(&self) -> Result<String>;
}

/// Factory for creating frame extractor instances
pub struct FrameExtractorFactory;

impl FrameExtractorFactory {
    /// Create the default frame extractor implementation (FFmpeg-based)
    pub fn create_extractor(config: MediaConfig) -> Arc<dyn FrameExtractor> {
        Arc::new(processor::FfmpegFrameExtractor::new(config))
    }
}
