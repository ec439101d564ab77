//! Video output using OpenCV's VideoWriter
//!
//! The sink mirrors the source: owned [`Frame`]s come in, `Mat`s are only
//! built at the point of encoding.

use std::path::{Path, PathBuf};

use opencv::{core::Size, prelude::*, videoio};
use tracing::{debug, info, instrument, warn};

use crate::common::{FrameShape, Result, SegContourError};
use crate::frame::Frame;
use crate::video_stream::VideoInfo;

/// Ordered consumer of output frames for one video
pub trait FrameSink {
    /// Append one frame
    ///
    /// # Errors
    /// * `FrameShape` - if the frame does not match the sink's size
    /// * `Write` - if the container rejects the frame
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    fn frames_written(&self) -> u64;

    /// Finalize the container so it is playable, keeping the file
    fn finish(self) -> Result<()>;

    /// Finalize the container and delete the file
    fn discard(self) -> Result<()>;
}

/// FourCC used for an output path, picked from its extension
pub fn codec_for_path(path: &Path) -> [char; 4] {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("avi") => ['M', 'J', 'P', 'G'],
        Some("mkv") => ['X', 'V', 'I', 'D'],
        _ => ['m', 'p', '4', 'v'],
    }
}

/// Wrapper around OpenCV VideoWriter implementing [`FrameSink`]
pub struct VideoSink {
    writer: videoio::VideoWriter,
    path: PathBuf,
    shape: FrameShape,
    frames_written: u64,
}

impl VideoSink {
    /// Create the output container, matching the source's frame rate and size
    ///
    /// # Errors
    /// * `Write` - if the container cannot be created
    #[instrument(skip(path, info), fields(path = %path.display()))]
    pub fn create(path: &Path, info: &VideoInfo) -> Result<Self> {
        let display = path.display().to_string();
        let path_str = path
            .to_str()
            .ok_or_else(|| SegContourError::write(&display, "path is not valid UTF-8"))?;

        let [c1, c2, c3, c4] = codec_for_path(path);
        let fourcc = videoio::VideoWriter::fourcc(c1, c2, c3, c4)
            .map_err(|e| SegContourError::write(&display, e.to_string()))?;

        let size = Size::new(info.width as i32, info.height as i32);
        let writer = videoio::VideoWriter::new(path_str, fourcc, info.fps, size, true).map_err(|e| {
            warn!("Failed to create VideoWriter: {}", e);
            SegContourError::write(&display, e.to_string())
        })?;

        let is_opened = writer
            .is_opened()
            .map_err(|e| SegContourError::write(&display, e.to_string()))?;
        if !is_opened {
            return Err(SegContourError::write(&display, "output container could not be created"));
        }

        info!(
            "Writing {} at {}x{} {:.2}fps with codec {}{}{}{}",
            display, info.width, info.height, info.fps, c1, c2, c3, c4
        );

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            shape: info.shape(),
            frames_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn release(&mut self) -> Result<()> {
        self.writer
            .release()
            .map_err(|e| SegContourError::write(self.path.display().to_string(), e.to_string()))
    }
}

impl FrameSink for VideoSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.shape() != self.shape {
            return Err(SegContourError::FrameShape {
                frame: self.frames_written,
                expected: self.shape,
                actual: frame.shape(),
            });
        }

        let mat = frame
            .to_bgr_mat()
            .map_err(|e| SegContourError::write(self.path.display().to_string(), e.to_string()))?;
        self.writer
            .write(&mat)
            .map_err(|e| SegContourError::write(self.path.display().to_string(), e.to_string()))?;

        self.frames_written += 1;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn finish(mut self) -> Result<()> {
        self.release()?;
        debug!("Finalized {} with {} frames", self.path.display(), self.frames_written);
        Ok(())
    }

    fn discard(mut self) -> Result<()> {
        if let Err(e) = self.release() {
            warn!("Release before discard failed: {}", e);
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Removed partial output {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SegContourError::write(self.path.display().to_string(), e.to_string())),
        }
    }
}

impl std::fmt::Debug for VideoSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoSink")
            .field("path", &self.path)
            .field("shape", &self.shape)
            .field("frames_written", &self.frames_written)
            .finish()
    }
}
