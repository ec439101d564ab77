//! Batch orchestration: runs every frame of every input video through
//! extraction, contour location, compositing and encoding.
//!
//! Jobs run strictly one after another and frames strictly in order. Any
//! job-scoped error marks that job failed and the batch moves on; only an
//! invalid invocation stops the batch before it starts.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, instrument, trace, warn};

use crate::common::{FrameShape, Result, SegContourError};
use crate::compositor::FrameCompositor;
use crate::config::PipelineConfig;
use crate::contour::ContourLocator;
use crate::foreground::{ForegroundExtractor, ThresholdCalibration, ThresholdPolicy};
use crate::job::{BatchResult, JobStatus, JobWarning, PipelineEvent, ProgressListener, StopHandle, VideoJob};
use crate::video_stream::{FrameSource, VideoInfo, VideoStream};
use crate::video_writer::{FrameSink, VideoSink};

/// Opens frame sources and creates frame sinks for the orchestrator
pub trait VideoBackend {
    type Source: FrameSource;
    type Sink: FrameSink;

    fn open_source(&self, path: &Path) -> Result<Self::Source>;

    fn create_sink(&self, path: &Path, info: &VideoInfo) -> Result<Self::Sink>;
}

/// OpenCV-backed video files
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenCvBackend;

impl VideoBackend for OpenCvBackend {
    type Source = VideoStream;
    type Sink = VideoSink;

    fn open_source(&self, path: &Path) -> Result<VideoStream> {
        VideoStream::open(path)
    }

    fn create_sink(&self, path: &Path, info: &VideoInfo) -> Result<VideoSink> {
        VideoSink::create(path, info)
    }
}

/// Ordered input videos plus the directory their outputs go to
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    pub inputs: Vec<PathBuf>,
    pub output_dir: PathBuf,
}

impl BatchRequest {
    pub fn new(inputs: Vec<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            inputs,
            output_dir: output_dir.into(),
        }
    }
}

/// Counters for one pass over a job's frames
#[derive(Debug, Clone, Copy, Default)]
struct FrameRun {
    frames: u64,
    without_subject: u64,
    stopped: bool,
}

/// Output file name for `name`, with `_<n>` inserted before the extension
fn numbered_name(name: &Path, n: usize) -> OsString {
    let stem = name.file_stem().map(|s| s.to_os_string()).unwrap_or_default();
    let mut numbered = stem;
    numbered.push(format!("_{}", n));
    if let Some(extension) = name.extension() {
        numbered.push(".");
        numbered.push(extension);
    }
    numbered
}

/// Drives the per-frame pipeline across a batch of videos
#[derive(Debug)]
pub struct BatchOrchestrator<B> {
    backend: B,
    config: PipelineConfig,
    locator: ContourLocator,
    compositor: FrameCompositor,
}

impl<B: VideoBackend> BatchOrchestrator<B> {
    /// # Errors
    /// * `InvalidConfig` - if the configuration fails validation
    pub fn new(backend: B, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            locator: ContourLocator::new(config.min_area_fraction),
            compositor: FrameCompositor::new(config.stroke),
            backend,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Validate the invocation and build one pending job per input
    ///
    /// # Errors
    /// * `InvalidInvocation` - for an empty input list, an unusable output
    ///   directory, an input without a file name, or an input that would be
    ///   overwritten by its own output
    pub fn plan_jobs(&self, request: &BatchRequest) -> Result<Vec<VideoJob>> {
        if request.inputs.is_empty() {
            return Err(SegContourError::invocation("no input videos given"));
        }

        let output_dir = &request.output_dir;
        let mut claimed = HashSet::new();
        let mut planned = Vec::with_capacity(request.inputs.len());

        for input in &request.inputs {
            let base = input.file_name().ok_or_else(|| {
                SegContourError::invocation(format!("input {} has no file name", input.display()))
            })?;
            let mut name = OsString::from(&self.config.output_prefix);
            name.push(base);

            let mut output = output_dir.join(&name);
            let mut n = 1;
            while !claimed.insert(output.clone()) {
                output = output_dir.join(numbered_name(Path::new(&name), n));
                n += 1;
            }
            planned.push((input, output));
        }

        // Nothing touches the filesystem until every input has a name
        if output_dir.exists() && !output_dir.is_dir() {
            return Err(SegContourError::invocation(format!(
                "output path {} is not a directory",
                output_dir.display()
            )));
        }
        fs::create_dir_all(output_dir).map_err(|e| {
            SegContourError::invocation(format!(
                "cannot create output directory {}: {}",
                output_dir.display(),
                e
            ))
        })?;
        let canonical_dir = fs::canonicalize(output_dir).ok();

        let mut jobs = Vec::with_capacity(planned.len());
        for (input, output) in planned {
            if let (Some(dir), Ok(canonical_input)) = (&canonical_dir, fs::canonicalize(input)) {
                if let Some(file_name) = output.file_name() {
                    if dir.join(file_name) == canonical_input {
                        return Err(SegContourError::invocation(format!(
                            "output for {} would overwrite the input",
                            input.display()
                        )));
                    }
                }
            }

            debug!("Planned {} -> {}", input.display(), output.display());
            jobs.push(VideoJob::new(input.clone(), output));
        }

        Ok(jobs)
    }

    /// Process every job in order and return the aggregate result
    ///
    /// Emits a `FrameProcessed` event after each written frame, a
    /// `JobFinished` event for every job (including ones skipped by a stop
    /// request) and a final `BatchFinished` event.
    ///
    /// # Errors
    /// * `InvalidInvocation` - see [`Self::plan_jobs`]; no job has started
    #[instrument(skip(self, request, listener, stop), fields(inputs = request.inputs.len()))]
    pub fn run<L: ProgressListener + ?Sized>(
        &self,
        request: &BatchRequest,
        listener: &mut L,
        stop: &StopHandle,
    ) -> Result<BatchResult> {
        info!("Collecting {} input videos", request.inputs.len());
        let mut jobs = self.plan_jobs(request)?;

        info!("Processing {} jobs into {}", jobs.len(), request.output_dir.display());
        let mut stopped = false;

        for (index, job) in jobs.iter_mut().enumerate() {
            if !stopped && stop.is_stop_requested() {
                stopped = true;
            }
            if stopped {
                job.status = JobStatus::NotRun;
                listener.on_event(&PipelineEvent::JobFinished {
                    job_index: index,
                    job: job.clone(),
                });
                continue;
            }

            stopped = self.process_job(index, job, listener, stop);
        }

        let result = BatchResult::new(jobs, stopped);
        info!("Batch completed: {}", result.summary());
        listener.on_event(&PipelineEvent::BatchFinished(result.clone()));
        Ok(result)
    }

    /// Run one job to a terminal status. Returns true if a stop request
    /// interrupted it.
    fn process_job<L: ProgressListener + ?Sized>(
        &self,
        index: usize,
        job: &mut VideoJob,
        listener: &mut L,
        stop: &StopHandle,
    ) -> bool {
        info!("Job {}: {}", index, job.input.display());
        job.status = JobStatus::Running;

        let stopped = match self.run_job(index, job, listener, stop) {
            Ok(run) if run.stopped => {
                info!("Job {} stopped after {} frames", index, run.frames);
                job.status = JobStatus::NotRun;
                true
            }
            Ok(run) => {
                job.status = JobStatus::Succeeded;
                if run.frames > 0 && run.without_subject == run.frames {
                    let warning = JobWarning::NoSubjectFound { frames: run.frames };
                    warn!("Job {}: {}", index, warning);
                    job.warning = Some(warning);
                }
                info!(
                    "Job {} succeeded: {} frames, {} without a subject",
                    index, run.frames, run.without_subject
                );
                false
            }
            Err(e) => {
                error!("Job {} failed: {}", index, e);
                job.status = JobStatus::Failed;
                job.error = Some(e);
                false
            }
        };

        listener.on_event(&PipelineEvent::JobFinished {
            job_index: index,
            job: job.clone(),
        });
        stopped
    }

    fn run_job<L: ProgressListener + ?Sized>(
        &self,
        index: usize,
        job: &mut VideoJob,
        listener: &mut L,
        stop: &StopHandle,
    ) -> Result<FrameRun> {
        let calibration = match self.config.threshold {
            ThresholdPolicy::Calibrated => match self.calibrate(&job.input, stop)? {
                Some(calibration) => Some(calibration),
                None => {
                    return Ok(FrameRun {
                        stopped: true,
                        ..FrameRun::default()
                    })
                }
            },
            _ => None,
        };
        let extractor = ForegroundExtractor::new(self.config.threshold, calibration.as_ref());

        let mut source = self.backend.open_source(&job.input)?;
        let info = source.info().clone();
        debug!("Job {} source: {}", index, info.description());

        listener.on_event(&PipelineEvent::JobStarted {
            job_index: index,
            input: job.input.clone(),
            total_frames: info.frame_count,
        });

        let mut sink = self.backend.create_sink(&job.output, &info)?;

        let pumped = self.pump_frames(
            index,
            job,
            &mut source,
            &mut sink,
            &extractor,
            info.shape(),
            info.frame_count,
            listener,
            stop,
        );
        match pumped {
            Ok(run) => {
                if let Err(e) = sink.finish() {
                    if let Err(cleanup) = fs::remove_file(&job.output) {
                        debug!("Could not remove {}: {}", job.output.display(), cleanup);
                    }
                    return Err(e);
                }
                Ok(run)
            }
            Err(e) => {
                if let Err(cleanup) = sink.discard() {
                    warn!("Failed to discard partial output {}: {}", job.output.display(), cleanup);
                }
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn pump_frames<L: ProgressListener + ?Sized>(
        &self,
        index: usize,
        job: &mut VideoJob,
        source: &mut B::Source,
        sink: &mut B::Sink,
        extractor: &ForegroundExtractor,
        shape: FrameShape,
        total_frames: u64,
        listener: &mut L,
        stop: &StopHandle,
    ) -> Result<FrameRun> {
        let mut run = FrameRun::default();

        loop {
            if stop.is_stop_requested() {
                // A stop that lands after the last advertised frame does not
                // interrupt anything
                if total_frames == 0 || run.frames < total_frames {
                    run.stopped = true;
                }
                break;
            }
            let Some(frame) = source.read_frame()? else {
                break;
            };

            let mask = extractor.extract(&frame, shape, run.frames)?;
            let contour = self.locator.locate(&mask);
            match &contour {
                Some(c) => trace!(
                    "Job {} frame {}: contour of {} points, area {:.1}",
                    index,
                    run.frames,
                    c.points().len(),
                    c.area()
                ),
                None => {
                    trace!("Job {} frame {}: no subject", index, run.frames);
                    run.without_subject += 1;
                }
            }
            let output = self.compositor.composite(&frame, contour.as_ref(), run.frames)?;
            sink.write_frame(&output)?;

            run.frames = sink.frames_written();
            job.frame_count = run.frames;
            listener.on_event(&PipelineEvent::FrameProcessed {
                job_index: index,
                frame_index: run.frames,
                total_frames,
            });
        }

        Ok(run)
    }

    /// Record the Otsu level of every frame of a video. `None` if a stop
    /// request arrived first.
    fn calibrate(&self, input: &Path, stop: &StopHandle) -> Result<Option<ThresholdCalibration>> {
        let mut source = self.backend.open_source(input)?;
        let mut calibration = ThresholdCalibration::new();

        while !stop.is_stop_requested() {
            match source.read_frame()? {
                Some(frame) => calibration
                    .observe(&frame)
                    .map_err(|e| SegContourError::processing(calibration.frames(), e.to_string()))?,
                None => {
                    debug!(
                        "Calibrated on {} frames of {}: level {:?}",
                        calibration.frames(),
                        input.display(),
                        calibration.level()
                    );
                    return Ok(Some(calibration));
                }
            }
        }
        Ok(None)
    }
}
