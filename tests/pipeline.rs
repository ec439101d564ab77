//! End-to-end runs through the OpenCV backend on small generated clips

use std::fs;
use std::path::{Path, PathBuf};

use seg_contour::{
    process_videos, BatchOrchestrator, BatchRequest, FrameSink, FrameSource, Frame, JobStatus,
    OpenCvBackend, PipelineConfig, PipelineEvent, StopHandle, VideoInfo, VideoSink, VideoStream,
};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("seg_contour_it_{}_{}", name, std::process::id()));
    fs::remove_dir_all(&dir).ok();
    fs::create_dir_all(&dir).expect("Failed to create test directory");
    dir
}

/// 64x64 light frames with a dark 20x20 square at (22, 22)
fn write_square_clip(path: &Path, frames: u64) {
    let info = VideoInfo {
        path: path.display().to_string(),
        fps: 10.0,
        frame_count: frames,
        width: 64,
        height: 64,
    };
    let mut frame = Frame::filled(64, 64, 3, 220);
    frame.fill_rect(22, 22, 20, 20, 40);

    let mut sink = VideoSink::create(path, &info).expect("Failed to create test clip");
    for _ in 0..frames {
        sink.write_frame(&frame).expect("Failed to write test frame");
    }
    sink.finish().expect("Failed to finalize test clip");
}

fn read_all(path: &Path) -> Vec<Frame> {
    let mut stream = VideoStream::open(path).expect("Failed to open output");
    let mut frames = Vec::new();
    while let Some(frame) = stream.read_frame().expect("Failed to decode output") {
        frames.push(frame);
    }
    frames
}

#[test]
fn test_square_clip_round_trip() {
    let dir = scratch_dir("square");
    let input = dir.join("mouse.avi");
    write_square_clip(&input, 10);

    let output_dir = dir.join("out");
    let mut config = PipelineConfig::default();
    config.stroke.width = 3;
    let result = process_videos(&[&input], &output_dir, config).unwrap();

    assert_eq!(result.succeeded(), 1, "{:?}", result.failures());
    let job = &result.jobs()[0];
    assert_eq!(job.output, output_dir.join("processed_mouse.avi"));
    assert_eq!(job.frame_count, 10);
    assert!(job.warning.is_none());

    let frames = read_all(&job.output);
    assert_eq!(frames.len(), 10);
    for frame in &frames {
        assert_eq!((frame.width(), frame.height()), (64, 64));
        // Square interior stays dark; its top edge is stroked
        let gray = frame.to_gray().unwrap();
        assert!(gray.pixel(32, 32)[0] < 100);
        let edge = (20..=24).map(|y| gray.pixel(32, y)[0]).max().unwrap_or(0);
        assert!(edge > 235, "edge intensity {}", edge);
    }

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_zero_byte_input_is_isolated() {
    let dir = scratch_dir("isolation");
    let first = dir.join("first.avi");
    let empty = dir.join("empty.avi");
    let last = dir.join("last.avi");
    write_square_clip(&first, 4);
    fs::write(&empty, b"").unwrap();
    write_square_clip(&last, 4);

    let output_dir = dir.join("out");
    let orchestrator = BatchOrchestrator::new(OpenCvBackend, PipelineConfig::default()).unwrap();
    let request = BatchRequest::new(vec![first, empty, last], &output_dir);

    let mut finished = Vec::new();
    let result = orchestrator
        .run(
            &request,
            &mut |event: &PipelineEvent| {
                if let PipelineEvent::JobFinished { job, .. } = event {
                    finished.push(job.status);
                }
            },
            &StopHandle::new(),
        )
        .unwrap();

    assert_eq!(finished, vec![JobStatus::Succeeded, JobStatus::Failed, JobStatus::Succeeded]);
    assert_eq!(result.succeeded(), 2);

    let failures = result.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].job_index, 1);
    assert_eq!(failures[0].error.kind(), "OpenError");
    assert!(!output_dir.join("processed_empty.avi").exists());
    assert_eq!(read_all(&output_dir.join("processed_last.avi")).len(), 4);

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_stop_before_start_leaves_every_job_not_run() {
    let dir = scratch_dir("stopped");
    let input = dir.join("mouse.avi");
    write_square_clip(&input, 3);

    let output_dir = dir.join("out");
    let orchestrator = BatchOrchestrator::new(OpenCvBackend, PipelineConfig::default()).unwrap();
    let stop = StopHandle::new();
    stop.request_stop();

    let result = orchestrator
        .run(&BatchRequest::new(vec![input], &output_dir), &mut |_: &PipelineEvent| {}, &stop)
        .unwrap();

    assert!(result.was_stopped());
    assert_eq!(result.not_run(), 1);
    assert!(!output_dir.join("processed_mouse.avi").exists());

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_stop_mid_batch_keeps_finalized_partial_output() {
    let dir = scratch_dir("stop_mid");
    let first = dir.join("first.avi");
    let second = dir.join("second.avi");
    write_square_clip(&first, 10);
    write_square_clip(&second, 10);

    let output_dir = dir.join("out");
    let orchestrator = BatchOrchestrator::new(OpenCvBackend, PipelineConfig::default()).unwrap();
    let stop = StopHandle::new();
    let remote = stop.clone();
    let mut listener = |event: &PipelineEvent| {
        if let PipelineEvent::FrameProcessed { frame_index: 3, .. } = event {
            remote.request_stop();
        }
    };

    let result = orchestrator
        .run(&BatchRequest::new(vec![first, second], &output_dir), &mut listener, &stop)
        .unwrap();

    assert!(result.was_stopped());
    let jobs = result.jobs();
    assert_eq!(jobs[0].status, JobStatus::NotRun);
    assert_eq!(jobs[0].frame_count, 3);
    assert_eq!(jobs[1].status, JobStatus::NotRun);

    // The interrupted job's container was finalized and decodes cleanly
    let partial = read_all(&output_dir.join("processed_first.avi"));
    assert_eq!(partial.len(), 3);
    assert!(partial.iter().all(|f| (f.width(), f.height()) == (64, 64)));
    assert!(!output_dir.join("processed_second.avi").exists());

    fs::remove_dir_all(&dir).ok();
}
