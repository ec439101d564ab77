//! Job records, progress events and batch results
//!
//! These are the values the batch orchestrator exchanges with whatever
//! front-end drives it: a job list going in, events and a final
//! [`BatchResult`] coming out.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::common::SegContourError;

/// Lifecycle of one video job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Skipped, or interrupted, by a stop request
    NotRun,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::NotRun => "not-run",
        };
        f.write_str(name)
    }
}

/// Non-fatal findings recorded against a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobWarning {
    /// No frame produced a qualifying contour; upstream segmentation likely failed
    NoSubjectFound { frames: u64 },
}

impl fmt::Display for JobWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSubjectFound { frames } => write!(
                f,
                "no subject contour found in any of {} frames, check the upstream segmentation",
                frames
            ),
        }
    }
}

/// One input video mapped to one output video
#[derive(Debug, Clone, PartialEq)]
pub struct VideoJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub status: JobStatus,
    /// Frames written to the output so far
    pub frame_count: u64,
    pub error: Option<SegContourError>,
    pub warning: Option<JobWarning>,
}

impl VideoJob {
    pub fn new(input: PathBuf, output: PathBuf) -> Self {
        Self {
            input,
            output,
            status: JobStatus::Pending,
            frame_count: 0,
            error: None,
            warning: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, JobStatus::Succeeded | JobStatus::Failed | JobStatus::NotRun)
    }
}

/// A failed job, as reported in the batch summary
#[derive(Debug, Clone, PartialEq)]
pub struct JobFailure {
    pub job_index: usize,
    pub input: PathBuf,
    pub error: SegContourError,
}

/// Aggregate outcome of one batch. Built once all jobs have resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    jobs: Vec<VideoJob>,
    stopped: bool,
}

impl BatchResult {
    pub(crate) fn new(jobs: Vec<VideoJob>, stopped: bool) -> Self {
        Self { jobs, stopped }
    }

    fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|job| job.status == status).count()
    }

    pub fn total(&self) -> usize {
        self.jobs.len()
    }

    pub fn succeeded(&self) -> usize {
        self.count(JobStatus::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(JobStatus::Failed)
    }

    pub fn not_run(&self) -> usize {
        self.count(JobStatus::NotRun)
    }

    /// Whether a stop request cut the batch short
    pub fn was_stopped(&self) -> bool {
        self.stopped
    }

    pub fn jobs(&self) -> &[VideoJob] {
        &self.jobs
    }

    pub fn failures(&self) -> Vec<JobFailure> {
        self.jobs
            .iter()
            .enumerate()
            .filter(|(_, job)| job.status == JobStatus::Failed)
            .filter_map(|(job_index, job)| {
                job.error.clone().map(|error| JobFailure {
                    job_index,
                    input: job.input.clone(),
                    error,
                })
            })
            .collect()
    }

    pub fn warnings(&self) -> Vec<(usize, JobWarning)> {
        self.jobs
            .iter()
            .enumerate()
            .filter_map(|(index, job)| job.warning.clone().map(|w| (index, w)))
            .collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.succeeded() == self.total()
    }

    /// One-line summary
    pub fn summary(&self) -> String {
        let mut text = format!(
            "{} of {} videos succeeded, {} failed",
            self.succeeded(),
            self.total(),
            self.failed()
        );
        if self.not_run() > 0 {
            text.push_str(&format!(", {} not run", self.not_run()));
        }
        if self.stopped {
            text.push_str(" (stopped)");
        }
        text
    }
}

/// Events emitted while a batch runs
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    JobStarted {
        job_index: usize,
        input: PathBuf,
        total_frames: u64,
    },
    FrameProcessed {
        job_index: usize,
        /// 1-based index of the frame just written
        frame_index: u64,
        /// Frame count reported by the container; 0 when unknown
        total_frames: u64,
    },
    JobFinished {
        job_index: usize,
        job: VideoJob,
    },
    BatchFinished(BatchResult),
}

impl PipelineEvent {
    /// Fraction of the current job completed, for `FrameProcessed` events
    pub fn progress_ratio(&self) -> Option<f64> {
        match self {
            Self::FrameProcessed {
                frame_index,
                total_frames,
                ..
            } if *total_frames > 0 => Some((*frame_index as f64 / *total_frames as f64).min(1.0)),
            _ => None,
        }
    }
}

/// Single subscriber to pipeline events
pub trait ProgressListener {
    fn on_event(&mut self, event: &PipelineEvent);
}

impl<F> ProgressListener for F
where
    F: FnMut(&PipelineEvent),
{
    fn on_event(&mut self, event: &PipelineEvent) {
        self(event)
    }
}

/// Forward events to another thread. A dropped receiver is ignored so the
/// batch keeps running if its front-end goes away.
impl ProgressListener for Sender<PipelineEvent> {
    fn on_event(&mut self, event: &PipelineEvent) {
        let _ = self.send(event.clone());
    }
}

/// Cooperative stop request, checked between frames
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    requested: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}
