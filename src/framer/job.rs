use std::path::PathBuf;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::Result;

/// Outcome of one extraction: JPEG bytes (empty when the index is out of
/// bounds) or the engine error.
pub type FrameResult = Result<Vec<u8>>;

/// Parameters of a single frame extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRequest {
    /// Video file to decode
    pub path: PathBuf,
    /// Zero-based frame number in decode order
    pub index: u32,
    /// Target width, `None` keeps the original
    pub width: Option<u32>,
    /// Target height, `None` keeps the original
    pub height: Option<u32>,
    /// Pad the scaled frame to exactly `width` x `height`
    pub thumbnail: bool,
}

impl FrameRequest {
    /// Create a request; a zero width or height means "unset".
    pub fn new<P: Into<PathBuf>>(path: P, index: u32, width: u32, height: u32, thumbnail: bool) -> Self {
        Self {
            path: path.into(),
            index,
            width: (width > 0).then_some(width),
            height: (height > 0).then_some(height),
            thumbnail,
        }
    }
}

/// A queued extraction together with its single-use reply slot
#[derive(Debug)]
pub struct Job {
    pub id: Uuid,
    pub request: FrameRequest,
    /// Cancelled when the submitter no longer wants the result
    pub cancel: CancellationToken,
    pub reply: oneshot::Sender<FrameResult>,
}

impl Job {
    pub fn new(request: FrameRequest, cancel: CancellationToken) -> (Self, oneshot::Receiver<FrameResult>) {
        let (reply, receiver) = oneshot::channel();
        let job = Self {
            id: Uuid::new_v4(),
            request,
            cancel,
            reply,
        };
        (job, receiver)
    }

    /// The submitter gave up, either by cancelling or by dropping the receiver
    pub fn is_abandoned(&self) -> bool {
        self.cancel.is_cancelled() || self.reply.is_closed()
    }
}
