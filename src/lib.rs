//! Contour overlays for pre-segmented behaviour videos
//!
//! Each input video is expected to show a dark subject on a light
//! background. For every frame the crate extracts a foreground mask, finds
//! the subject's outer boundary, strokes it onto the frame and writes the
//! result to a new video. Batches run one video after another; a video that
//! fails does not stop the rest.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use seg_contour::{process_videos, PipelineConfig};
//!
//! let result = process_videos(&["session1.mp4", "session2.mp4"], "out", PipelineConfig::default())?;
//! println!("{}", result.summary());
//! for failure in result.failures() {
//!     println!("{}: {}", failure.input.display(), failure.error);
//! }
//! # Ok::<(), seg_contour::SegContourError>(())
//! ```

mod batch;
mod common;
mod compositor;
mod config;
mod contour;
mod foreground;
mod frame;
mod job;
mod video_stream;
mod video_writer;

// Re-export main types for public API
pub use batch::{BatchOrchestrator, BatchRequest, OpenCvBackend, VideoBackend};
pub use common::{FrameShape, Result, SegContourError};
pub use compositor::{FrameCompositor, StrokeColor, StrokeStyle};
pub use config::{PipelineConfig, DEFAULT_OUTPUT_PREFIX};
pub use contour::{find_contours, Contour, ContourLocator, DEFAULT_MIN_AREA_FRACTION};
pub use foreground::{ForegroundExtractor, ThresholdCalibration, ThresholdPolicy, AUTO_MIN_CONTRAST};
pub use frame::{Frame, Mask, Point};
pub use job::{
    BatchResult, JobFailure, JobStatus, JobWarning, PipelineEvent, ProgressListener, StopHandle, VideoJob,
};
pub use video_stream::{FrameSource, VideoInfo, VideoStream};
pub use video_writer::{codec_for_path, FrameSink, VideoSink};

use std::path::{Path, PathBuf};

use tracing::{info, instrument};

/// Process a batch of videos with the OpenCV backend
///
/// Outputs are written to `output_dir` as `<prefix><input file name>`.
/// Per-video failures are recorded in the returned [`BatchResult`]; this
/// function only fails when the batch cannot start at all.
///
/// # Errors
/// * `InvalidConfig` - if `config` fails validation
/// * `InvalidInvocation` - for an empty input list or an unusable output directory
#[instrument(skip(inputs, output_dir, config))]
pub fn process_videos<P: AsRef<Path>>(
    inputs: &[P],
    output_dir: impl AsRef<Path>,
    config: PipelineConfig,
) -> Result<BatchResult> {
    let request = BatchRequest::new(
        inputs.iter().map(|p| p.as_ref().to_path_buf()).collect::<Vec<PathBuf>>(),
        output_dir.as_ref(),
    );
    let orchestrator = BatchOrchestrator::new(OpenCvBackend, config)?;
    orchestrator.run(&request, &mut |_: &PipelineEvent| {}, &StopHandle::new())
}

/// Get video information without processing any frames
///
/// # Errors
/// * `Open` - if the video cannot be opened or has no readable frames
#[instrument(skip(video_path), fields(path = %video_path.as_ref().display()))]
pub fn get_video_info(video_path: impl AsRef<Path>) -> Result<VideoInfo> {
    let stream = VideoStream::open(video_path.as_ref())?;
    Ok(stream.info().clone())
}

/// Initialize tracing for the library
///
/// `RUST_LOG` takes precedence over `level` when set. Call this once at
/// the start of your application.
///
/// # Arguments
/// * `level` - Tracing level filter (e.g., "debug", "info", "warn", "error")
pub fn init_tracing(level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    info!("SegContour initialized with tracing level: {}", level);
}
