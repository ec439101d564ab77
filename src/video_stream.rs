//! Video stream handling using OpenCV backend
//!
//! This module wraps OpenCV's VideoCapture behind the [`FrameSource`] trait.
//! Decoded `Mat`s are copied into owned [`Frame`]s as they are read.

use std::path::Path;

use opencv::{core::Mat, prelude::*, videoio};
use tracing::{debug, info, instrument, warn};

use crate::common::{FrameShape, Result, SegContourError};
use crate::frame::Frame;

/// Video metadata read when a source is opened
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub path: String,
    pub fps: f64,
    /// Frame count reported by the container; 0 when unknown
    pub frame_count: u64,
    pub width: u32,
    pub height: u32,
}

impl VideoInfo {
    pub fn shape(&self) -> FrameShape {
        FrameShape::new(self.width, self.height)
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.fps > 0.0 {
            self.frame_count as f64 / self.fps
        } else {
            0.0
        }
    }

    /// Get a human-readable description of the video
    pub fn description(&self) -> String {
        format!(
            "{}x{} at {:.2}fps, {} frames ({:.1}s duration)",
            self.width,
            self.height,
            self.fps,
            self.frame_count,
            self.duration_seconds()
        )
    }

    /// Check if this appears to be a valid video configuration
    pub fn is_valid(&self) -> bool {
        self.fps > 0.0 && self.frame_count > 0 && self.width > 0 && self.height > 0
    }
}

/// An ordered, finite, forward-only sequence of frames from one video
pub trait FrameSource {
    fn info(&self) -> &VideoInfo;

    /// The next frame, or `None` at end of sequence
    ///
    /// # Errors
    /// * `Decode` - if a frame inside the sequence cannot be decoded
    fn read_frame(&mut self) -> Result<Option<Frame>>;
}

/// Wrapper around OpenCV VideoCapture implementing [`FrameSource`]
pub struct VideoStream {
    cap: videoio::VideoCapture,
    info: VideoInfo,
    pending: Option<Frame>,
    frames_read: u64,
}

impl VideoStream {
    /// Open a video file for reading
    ///
    /// The first frame is decoded eagerly so that a container with no
    /// readable frames is rejected here rather than mid-job.
    ///
    /// # Errors
    /// * `Open` - if the file is missing, empty, unsupported, reports invalid
    ///   properties, or has no readable frames
    #[instrument(skip(path), fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self> {
        let display = path.display().to_string();
        info!("Opening video stream: {}", display);

        let metadata = std::fs::metadata(path)
            .map_err(|e| SegContourError::open(&display, format!("file not accessible: {}", e)))?;
        if !metadata.is_file() {
            return Err(SegContourError::open(&display, "not a regular file"));
        }
        if metadata.len() == 0 {
            return Err(SegContourError::open(&display, "file is empty"));
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| SegContourError::open(&display, "path is not valid UTF-8"))?;

        let mut cap = videoio::VideoCapture::from_file(path_str, videoio::CAP_ANY).map_err(|e| {
            warn!("Failed to create VideoCapture: {}", e);
            SegContourError::open(&display, e.to_string())
        })?;

        let is_opened = cap
            .is_opened()
            .map_err(|e| SegContourError::open(&display, e.to_string()))?;
        if !is_opened {
            return Err(SegContourError::open(&display, "unsupported or unreadable container"));
        }

        let property = |cap: &videoio::VideoCapture, id: i32, name: &str| {
            cap.get(id).map_err(|e| {
                warn!("Failed to get video {}: {}", name, e);
                SegContourError::open(&display, format!("cannot read {}: {}", name, e))
            })
        };

        let fps = property(&cap, videoio::CAP_PROP_FPS, "frame rate")?;
        let frame_count = property(&cap, videoio::CAP_PROP_FRAME_COUNT, "frame count")?;
        let width = property(&cap, videoio::CAP_PROP_FRAME_WIDTH, "frame width")?;
        let height = property(&cap, videoio::CAP_PROP_FRAME_HEIGHT, "frame height")?;

        if !fps.is_finite() || fps <= 0.0 {
            return Err(SegContourError::open(&display, format!("invalid frame rate {}", fps)));
        }
        if width <= 0.0 || height <= 0.0 {
            return Err(SegContourError::open(
                &display,
                format!("invalid frame size {}x{}", width, height),
            ));
        }

        let mut first = Mat::default();
        let decoded = cap
            .read(&mut first)
            .map_err(|e| SegContourError::open(&display, format!("first frame unreadable: {}", e)))?;
        if !decoded || first.empty() {
            return Err(SegContourError::open(&display, "no readable frames"));
        }
        let first = Frame::from_mat(&first)
            .map_err(|e| SegContourError::open(&display, e.to_string()))?
            .ok_or_else(|| SegContourError::open(&display, "unsupported pixel format"))?;

        if first.width() != width as u32 || first.height() != height as u32 {
            debug!(
                "Container reports {}x{} but frames are {}x{}",
                width,
                height,
                first.width(),
                first.height()
            );
        }

        let info = VideoInfo {
            path: display,
            fps,
            frame_count: frame_count.max(0.0) as u64,
            width: first.width(),
            height: first.height(),
        };

        info!("Video opened successfully - {}", info.description());

        Ok(Self {
            cap,
            info,
            pending: Some(first),
            frames_read: 0,
        })
    }
}

impl FrameSource for VideoStream {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(frame) = self.pending.take() {
            self.frames_read += 1;
            return Ok(Some(frame));
        }

        let mut mat = Mat::default();
        let decoded = self.cap.read(&mut mat).map_err(|e| {
            SegContourError::decode(&self.info.path, self.frames_read, format!("OpenCV read failed: {}", e))
        })?;

        if !decoded || mat.empty() {
            if self.frames_read < self.info.frame_count {
                debug!(
                    "Stream ended after {} of {} reported frames",
                    self.frames_read, self.info.frame_count
                );
            } else {
                debug!("Reached end of video at frame {}", self.frames_read);
            }
            return Ok(None);
        }

        let frame = Frame::from_mat(&mat)
            .map_err(|e| SegContourError::decode(&self.info.path, self.frames_read, e.to_string()))?
            .ok_or_else(|| {
                SegContourError::decode(&self.info.path, self.frames_read, "unsupported pixel format")
            })?;

        self.frames_read += 1;
        Ok(Some(frame))
    }
}

// Implement Debug manually to avoid showing internal OpenCV state
impl std::fmt::Debug for VideoStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoStream")
            .field("info", &self.info)
            .field("frames_read", &self.frames_read)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("seg_contour_stream_{}_{}", name, std::process::id()));
        if dir.exists() {
            fs::remove_dir_all(&dir).ok();
        }
        fs::create_dir_all(&dir).expect("Failed to create test directory");
        dir
    }

    fn sample_info() -> VideoInfo {
        VideoInfo {
            path: "test.mp4".to_string(),
            fps: 25.0,
            frame_count: 1000,
            width: 1920,
            height: 1080,
        }
    }

    #[test]
    fn test_video_info_description() {
        let info = sample_info();
        assert!(info.is_valid());
        assert_eq!(info.duration_seconds(), 40.0);
        assert!(info.description().contains("1920x1080"));
        assert!(info.description().contains("25.00fps"));
        assert!(info.description().contains("1000 frames"));
        assert_eq!(info.shape(), FrameShape::new(1920, 1080));
    }

    #[test]
    fn test_video_info_validation() {
        let valid = sample_info();

        assert!(!VideoInfo { fps: 0.0, ..valid.clone() }.is_valid());
        assert!(!VideoInfo { frame_count: 0, ..valid.clone() }.is_valid());
        assert!(!VideoInfo { width: 0, ..valid.clone() }.is_valid());
        assert!(!VideoInfo { height: 0, ..valid }.is_valid());
    }

    #[test]
    fn test_open_nonexistent_file() {
        let result = VideoStream::open(Path::new("nonexistent_video.mp4"));
        match result.unwrap_err() {
            SegContourError::Open { path, .. } => assert_eq!(path, "nonexistent_video.mp4"),
            other => panic!("Expected Open, got: {:?}", other),
        }
    }

    #[test]
    fn test_open_directory_instead_of_file() {
        let dir = scratch_dir("dir");
        let result = VideoStream::open(&dir);
        fs::remove_dir_all(&dir).ok();
        assert!(matches!(result.unwrap_err(), SegContourError::Open { .. }));
    }

    #[test]
    fn test_open_zero_byte_file() {
        let dir = scratch_dir("empty");
        let path = dir.join("empty.mp4");
        fs::write(&path, b"").unwrap();

        let result = VideoStream::open(&path);
        fs::remove_dir_all(&dir).ok();

        match result.unwrap_err() {
            SegContourError::Open { reason, .. } => assert_eq!(reason, "file is empty"),
            other => panic!("Expected Open, got: {:?}", other),
        }
    }

    #[test]
    fn test_open_garbage_file() {
        let dir = scratch_dir("garbage");
        let path = dir.join("garbage.avi");
        fs::write(&path, b"definitely not a video container").unwrap();

        let result = VideoStream::open(&path);
        fs::remove_dir_all(&dir).ok();

        assert!(matches!(result.unwrap_err(), SegContourError::Open { .. }));
    }
}
