//! Vidframe - Video Frame Extraction Service
//!
//! Stores uploaded video files and serves single frames and thumbnails,
//! extracted with ffmpeg under a bounded number of concurrent processes.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod framer;
pub mod media;
pub mod storage;
