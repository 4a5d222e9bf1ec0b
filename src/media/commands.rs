use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, VidError};
use crate::framer::FrameRequest;

/// Abstract media processing command representation
#[derive(Debug, Clone)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
}

impl MediaCommand {
    /// Create a new media processing command
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Only print errors, never read stdin
    pub fn quiet(self) -> Self {
        self.arg("-hide_banner")
            .arg("-loglevel").arg("error")
            .arg("-nostdin")
    }

    /// Add video filter
    pub fn video_filter<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-vf").arg(filter)
    }

    /// Set video codec
    pub fn video_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-vcodec").arg(codec)
    }

    /// Limit the number of encoded video frames
    pub fn max_frames(self, frames: u32) -> Self {
        self.arg("-vframes").arg(frames.to_string())
    }

    /// Force the output container format
    pub fn format<S: Into<String>>(self, format: S) -> Self {
        self.arg("-f").arg(format)
    }

    /// Write the output to stdout
    pub fn pipe_output(self) -> Self {
        self.arg("pipe:")
    }

    /// Run the command and return whatever it wrote to stdout.
    ///
    /// The child is killed as soon as `cancel` fires.
    pub async fn capture(&self, cancel: &CancellationToken) -> Result<Vec<u8>> {
        debug!("Executing media processing command: {} {:?}", self.binary_path, self.args);
        debug!("Description: {}", self.description);

        if cancel.is_cancelled() {
            return Err(VidError::Cancelled);
        }

        let child = Command::new(&self.binary_path)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VidError::Media(format!("Failed to execute media processor: {}", e)))?;

        // Dropping the wait future drops the child, which kills it.
        let output = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("{} cancelled", self.description);
                return Err(VidError::Cancelled);
            }
            output = child.wait_with_output() => output
                .map_err(|e| VidError::Media(format!("Failed to wait for media processor: {}", e)))?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VidError::Media(format!(
                "{} failed ({}): {}",
                self.description,
                output.status,
                stderr.trim()
            )));
        }

        Ok(output.stdout)
    }
}

/// Filter chain selecting, scaling and padding a single frame.
///
/// `select` keeps frames from `index` on; `-vframes 1` then takes the first
/// of them. Scaling never distorts the aspect ratio and only pads when both
/// sides of the thumbnail rectangle are known.
pub fn frame_filter(request: &FrameRequest) -> String {
    let mut filters = vec![format!("select=gte(n\\,{})", request.index)];

    if request.width.is_some() || request.height.is_some() {
        let width = request.width.map_or(-1, i64::from);
        let height = request.height.map_or(-1, i64::from);
        filters.push(format!(
            "scale={}:{}:force_original_aspect_ratio=decrease",
            width, height
        ));

        if let (true, Some(width), Some(height)) = (request.thumbnail, request.width, request.height) {
            filters.push(format!("pad={}:{}:(ow-iw)/2:(oh-ih)/2", width, height));
        }
    }

    filters.join(",")
}

/// Builder for common media processing operations
pub struct MediaCommandBuilder {
    binary_path: String,
}

impl MediaCommandBuilder {
    /// Create a new command builder
    pub fn new<S: Into<String>>(binary_path: S) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// Build single frame extraction command, encoding the frame as JPEG on stdout
    pub fn extract_frame(&self, request: &FrameRequest) -> MediaCommand {
        MediaCommand::new(&self.binary_path, format!("Frame {} extraction", request.index))
            .quiet()
            .input(&request.path)
            .video_filter(frame_filter(request))
            .max_frames(1)
            .format("image2")
            .video_codec("mjpeg")
            .pipe_output()
    }

    /// Build version check command
    pub fn version_check(&self) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Version check")
            .arg("-version")
    }

    /// Build custom command
    pub fn custom<S: Into<String>>(&self, description: S) -> MediaCommand {
        MediaCommand::new(&self.binary_path, description.into())
    }
}
