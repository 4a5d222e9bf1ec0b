use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::MediaConfig;
use crate::error::{Result, VidError};
use crate::framer::FrameRequest;
use super::{FrameExtractor, MediaCommandBuilder};

/// Concrete frame extractor backed by the ffmpeg binary
pub struct FfmpegFrameExtractor {
    config: MediaConfig,
    command_builder: MediaCommandBuilder,
}

impl FfmpegFrameExtractor {
    /// Create a new ffmpeg frame extractor
    pub fn new(config: MediaConfig) -> Self {
        let command_builder = MediaCommandBuilder::new(&config.binary_path);

        Self {
            config,
            command_builder,
        }
    }
}

#[async_trait]
impl FrameExtractor for FfmpegFrameExtractor {
    async fn extract(&self, cancel: &CancellationToken, request: &FrameRequest) -> Result<Vec<u8>> {
        debug!(
            path = %request.path.display(),
            index = request.index,
            width = ?request.width,
            height = ?request.height,
            thumbnail = request.thumbnail,
            "Extracting frame"
        );

        let command = self.command_builder.extract_frame(request);
        let data = command.capture(cancel).await?;

        // ffmpeg exits cleanly without output when the select filter never matches
        if data.is_empty() {
            debug!("Frame {} is past the end of {}", request.index, request.path.display());
        }

        Ok(data)
    }

    async fn version_info(&self) -> Result<String> {
        debug!("Getting ffmpeg version information from {}", self.config.binary_path);

        let output = self
            .command_builder
            .version_check()
            .capture(&CancellationToken::new())
            .await?;

        let version_info = String::from_utf8_lossy(&output);
        let first_line = version_info
            .lines()
            .next()
            .ok_or_else(|| VidError::Media("Empty ffmpeg version output".to_string()))?;

        info!("Media processor is available: {}", first_line);
        Ok(first_line.to_string())
    }
}
