//! Common types and error handling for the contour pipeline.
//!
//! This module holds the error taxonomy shared by every pipeline stage and the
//! frame geometry type each video job pins down when its source is opened.

use std::fmt;

/// Width and height of every frame within one video job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameShape {
    pub width: u32,
    pub height: u32,
}

impl FrameShape {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels in one frame
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for FrameShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// All possible errors from the contour pipeline
///
/// `Open`, `Decode`, `FrameShape`, `Processing` and `Write` are scoped to a single video job:
/// the batch orchestrator records them against that job and moves on.
/// `InvalidInvocation` and `InvalidConfig` are raised before any job starts.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SegContourError {
    #[error("Failed to open video {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("Failed to decode frame {frame} of {path}: {reason}")]
    Decode { path: String, frame: u64, reason: String },

    #[error("Frame {frame} is {actual}, expected {expected}")]
    FrameShape {
        frame: u64,
        expected: FrameShape,
        actual: FrameShape,
    },

    #[error("Failed to process frame {frame}: {reason}")]
    Processing { frame: u64, reason: String },

    #[error("Failed to write {path}: {reason}")]
    Write { path: String, reason: String },

    #[error("Invalid invocation: {message}")]
    InvalidInvocation { message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl SegContourError {
    pub fn open(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Open {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn decode(path: impl Into<String>, frame: u64, reason: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            frame,
            reason: reason.into(),
        }
    }

    pub fn processing(frame: u64, reason: impl Into<String>) -> Self {
        Self::Processing {
            frame,
            reason: reason.into(),
        }
    }

    pub fn write(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Write {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invocation(message: impl Into<String>) -> Self {
        Self::InvalidInvocation {
            message: message.into(),
        }
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Whether this error only affects the video job it was raised in
    pub fn is_job_scoped(&self) -> bool {
        matches!(
            self,
            Self::Open { .. }
                | Self::Decode { .. }
                | Self::FrameShape { .. }
                | Self::Processing { .. }
                | Self::Write { .. }
        )
    }

    /// Short taxonomy name used in summaries and JSON output
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Open { .. } => "OpenError",
            Self::Decode { .. } => "DecodeError",
            Self::FrameShape { .. } => "FrameShapeError",
            Self::Processing { .. } => "ProcessingError",
            Self::Write { .. } => "WriteError",
            Self::InvalidInvocation { .. } => "InvalidInvocation",
            Self::InvalidConfig { .. } => "InvalidConfig",
        }
    }
}

/// Convenient Result type for pipeline operations
pub type Result<T> = std::result::Result<T, SegContourError>;
