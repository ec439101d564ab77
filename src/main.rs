//! Command-line interface for SegContour
//!
//! Processes a list of pre-segmented videos into an output directory and
//! reports the batch outcome. Exit status is 0 when every video succeeded,
//! 2 when any video failed or was not run, and 1 when the batch could not
//! start.

use std::env;
use std::path::PathBuf;
use std::process;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use seg_contour::{
    get_video_info, init_tracing, BatchOrchestrator, BatchRequest, BatchResult, OpenCvBackend,
    PipelineConfig, PipelineEvent, StopHandle, StrokeColor, ThresholdPolicy,
};
use tracing::{debug, info, warn};

/// Frames between progress log lines
const PROGRESS_LOG_INTERVAL: u64 = 500;

const USAGE: &str = "\
Usage: seg-contour <output_dir> <input>... [OPTIONS]
       seg-contour --info <input>...

Options:
--threshold <policy>     auto | calibrated | 0-255 (default: auto)
--min-area <fraction>    Minimum subject area as a fraction of the frame (default: 0.001)
--color <r,g,b>          Contour color (default: 255,255,255)
--stroke-width <n>       Contour width in pixels (default: 1)
--prefix <text>          Output file name prefix (default: processed_)
--format <fmt>           Output format: simple|detailed|json (default: simple)
--verbose                Enable debug logging
--info                   Show video information only
--help                   Show this help message";

/// Command-line arguments structure
#[derive(Debug)]
struct Args {
    output_dir: PathBuf,
    inputs: Vec<PathBuf>,
    config: PipelineConfig,
    verbose: bool,
    show_video_info: bool,
    show_help: bool,
    output_format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Simple,   // One summary line
    Detailed, // Per-job status lines
    Json,     // JSON format for integration
}

impl Default for Args {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::new(),
            inputs: Vec::new(),
            config: PipelineConfig::default(),
            verbose: false,
            show_video_info: false,
            show_help: false,
            output_format: OutputFormat::Simple,
        }
    }
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };
    process::exit(code);
}

fn run() -> anyhow::Result<i32> {
    let argv: Vec<String> = env::args().skip(1).collect();
    let args = parse_args(&argv).map_err(anyhow::Error::msg)?;

    if args.show_help {
        println!("{}", USAGE);
        return Ok(0);
    }

    let log_level = if args.verbose { "debug" } else { "info" };
    init_tracing(log_level);

    info!("SegContour CLI v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    if args.show_video_info {
        return show_video_info(&args.inputs);
    }

    let start_time = Instant::now();
    let orchestrator =
        BatchOrchestrator::new(OpenCvBackend, args.config.clone()).context("Invalid configuration")?;
    let request = BatchRequest::new(args.inputs.clone(), args.output_dir.clone());

    let result = orchestrator
        .run(&request, &mut log_progress, &StopHandle::new())
        .context("Batch could not start")?;
    let elapsed = start_time.elapsed();

    output_results(&result, &args, elapsed)?;

    Ok(if result.all_succeeded() { 0 } else { 2 })
}

fn log_progress(event: &PipelineEvent) {
    match event {
        PipelineEvent::JobStarted {
            job_index,
            input,
            total_frames,
        } => info!("[{}] {} ({} frames)", job_index + 1, input.display(), total_frames),
        PipelineEvent::FrameProcessed {
            job_index,
            frame_index,
            total_frames,
        } if frame_index % PROGRESS_LOG_INTERVAL == 0 => {
            let percent = event.progress_ratio().unwrap_or(0.0) * 100.0;
            debug!("[{}] {}/{} frames ({:.1}%)", job_index + 1, frame_index, total_frames, percent);
        }
        PipelineEvent::JobFinished { job_index, job } => match &job.error {
            Some(e) => warn!("[{}] {}: {}", job_index + 1, job.status, e),
            None => info!("[{}] {} ({} frames)", job_index + 1, job.status, job.frame_count),
        },
        _ => {}
    }
}

fn parse_args(argv: &[String]) -> Result<Args, String> {
    let mut parsed_args = Args::default();
    let mut positional = Vec::new();

    let mut i = 0;
    while i < argv.len() {
        let value = |name: &str| {
            argv.get(i + 1)
                .cloned()
                .ok_or_else(|| format!("{} requires a value", name))
        };

        match argv[i].as_str() {
            "--threshold" => {
                parsed_args.config.threshold = value("--threshold")?
                    .parse::<ThresholdPolicy>()
                    .map_err(|e| e.to_string())?;
                i += 2;
            }
            "--min-area" => {
                parsed_args.config.min_area_fraction = value("--min-area")?
                    .parse()
                    .map_err(|_| "Invalid min-area value".to_string())?;
                i += 2;
            }
            "--color" => {
                parsed_args.config.stroke.color = value("--color")?
                    .parse::<StrokeColor>()
                    .map_err(|e| e.to_string())?;
                i += 2;
            }
            "--stroke-width" => {
                parsed_args.config.stroke.width = value("--stroke-width")?
                    .parse()
                    .map_err(|_| "Invalid stroke-width value".to_string())?;
                i += 2;
            }
            "--prefix" => {
                parsed_args.config.output_prefix = value("--prefix")?;
                i += 2;
            }
            "--format" => {
                parsed_args.output_format = match value("--format")?.as_str() {
                    "simple" => OutputFormat::Simple,
                    "detailed" => OutputFormat::Detailed,
                    "json" => OutputFormat::Json,
                    _ => return Err("Invalid format. Use 'simple', 'detailed', or 'json'".to_string()),
                };
                i += 2;
            }
            "--verbose" => {
                parsed_args.verbose = true;
                i += 1;
            }
            "--info" => {
                parsed_args.show_video_info = true;
                i += 1;
            }
            "--help" | "-h" => {
                parsed_args.show_help = true;
                return Ok(parsed_args);
            }
            option if option.starts_with("--") => {
                return Err(format!("Unknown option: {}\n\n{}", option, USAGE));
            }
            path => {
                positional.push(PathBuf::from(path));
                i += 1;
            }
        }
    }

    if parsed_args.show_video_info {
        if positional.is_empty() {
            return Err(format!("--info requires at least one video\n\n{}", USAGE));
        }
        parsed_args.inputs = positional;
        return Ok(parsed_args);
    }

    if positional.len() < 2 {
        return Err(format!("Expected an output directory and at least one input video\n\n{}", USAGE));
    }
    parsed_args.output_dir = positional.remove(0);
    parsed_args.inputs = positional;

    Ok(parsed_args)
}

fn show_video_info(inputs: &[PathBuf]) -> anyhow::Result<i32> {
    let mut unreadable = 0;

    for input in inputs {
        info!("Analyzing video: {}", input.display());

        match get_video_info(input) {
            Ok(video_info) => {
                println!("Video Information:");
                println!("  Path: {}", video_info.path);
                println!("  Dimensions: {}x{}", video_info.width, video_info.height);
                println!("  Frame Rate: {:.2} fps", video_info.fps);
                println!("  Frame Count: {}", video_info.frame_count);
                println!("  Duration: {:.2} seconds", video_info.duration_seconds());

                if !video_info.is_valid() {
                    warn!("Video properties appear incomplete - frame count may be unknown");
                }
            }
            Err(e) => {
                println!("{}: {}", input.display(), e);
                unreadable += 1;
            }
        }
    }

    if unreadable == inputs.len() {
        bail!("none of the {} videos could be opened", inputs.len());
    }
    Ok(if unreadable == 0 { 0 } else { 2 })
}

fn results_json(result: &BatchResult, args: &Args, elapsed: Duration) -> serde_json::Value {
    let jobs: Vec<_> = result
        .jobs()
        .iter()
        .map(|job| {
            serde_json::json!({
                "input": job.input.display().to_string(),
                "output": job.output.display().to_string(),
                "status": job.status.to_string(),
                "frames": job.frame_count,
                "error_kind": job.error.as_ref().map(|e| e.kind()),
                "error": job.error.as_ref().map(|e| e.to_string()),
                "warning": job.warning.as_ref().map(|w| w.to_string()),
            })
        })
        .collect();

    serde_json::json!({
        "output_dir": args.output_dir.display().to_string(),
        "processing_time_ms": elapsed.as_millis() as u64,
        "total": result.total(),
        "succeeded": result.succeeded(),
        "failed": result.failed(),
        "not_run": result.not_run(),
        "stopped": result.was_stopped(),
        "jobs": jobs,
        "config": {
            "threshold": args.config.threshold.to_string(),
            "min_area_fraction": args.config.min_area_fraction,
            "color": args.config.stroke.color.to_string(),
            "stroke_width": args.config.stroke.width,
            "prefix": args.config.output_prefix,
        }
    })
}

fn output_results(result: &BatchResult, args: &Args, elapsed: Duration) -> anyhow::Result<()> {
    match args.output_format {
        OutputFormat::Simple => {
            println!("{}", result.summary());
        }
        OutputFormat::Detailed => {
            println!("Batch Results:");
            println!("  Processing time: {:.2}s", elapsed.as_secs_f64());
            println!("  {}", result.summary());
            for (i, job) in result.jobs().iter().enumerate() {
                println!("  [{}] {} -> {}", i + 1, job.input.display(), job.output.display());
                println!("      {} ({} frames)", job.status, job.frame_count);
                if let Some(e) = &job.error {
                    println!("      {}: {}", e.kind(), e);
                }
                if let Some(w) = &job.warning {
                    println!("      warning: {}", w);
                }
            }
        }
        OutputFormat::Json => {
            let json_output = results_json(result, args, elapsed);
            println!(
                "{}",
                serde_json::to_string_pretty(&json_output).context("JSON serialization failed")?
            );
        }
    }

    info!("Batch finished in {:.2}s: {}", elapsed.as_secs_f64(), result.summary());
    Ok(())
}
