//! Foreground extraction for bright-background footage
//!
//! Upstream segmentation leaves a uniformly bright background and a darker
//! subject, so a pixel is foreground when its intensity falls below a cutoff.
//! The cutoff is either fixed, chosen per frame with Otsu's method, or chosen
//! once per video from the Otsu levels of every frame.

use std::fmt;
use std::str::FromStr;

use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
};
use tracing::{debug, instrument, trace, warn};

use crate::common::{FrameShape, Result, SegContourError};
use crate::frame::{Frame, Mask};

/// Minimum gap between the dark and bright class means for an automatic
/// cutoff to be trusted. Below it the frame is treated as all background.
pub const AUTO_MIN_CONTRAST: f64 = 24.0;

/// How the foreground cutoff is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThresholdPolicy {
    /// Foreground iff intensity < value; 0 selects nothing
    Fixed(u8),
    /// Otsu cutoff recomputed for every frame
    #[default]
    Auto,
    /// One Otsu level per video: the median over a calibration pass
    Calibrated,
}

impl FromStr for ThresholdPolicy {
    type Err = SegContourError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "calibrated" => Ok(Self::Calibrated),
            other => other.parse::<u8>().map(Self::Fixed).map_err(|_| {
                SegContourError::config_error(format!(
                    "threshold must be 'auto', 'calibrated' or an integer in [0,255], got '{}'",
                    s
                ))
            }),
        }
    }
}

impl fmt::Display for ThresholdPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(value) => write!(f, "{}", value),
            Self::Auto => f.write_str("auto"),
            Self::Calibrated => f.write_str("calibrated"),
        }
    }
}

/// Otsu split of a single-channel image.
///
/// Returns the level (foreground iff intensity <= level) together with the
/// foreground mask, or `None` when one class is empty or the class means are
/// closer than `min_contrast`.
fn otsu_split(gray: &Mat, min_contrast: f64) -> opencv::Result<Option<(u8, Mat)>> {
    let mut dark = Mat::default();
    let level = imgproc::threshold(
        gray,
        &mut dark,
        0.0,
        255.0,
        imgproc::THRESH_BINARY_INV | imgproc::THRESH_OTSU,
    )?;

    let dark_count = core::count_non_zero(&dark)?;
    if dark_count == 0 || dark_count == gray.rows() * gray.cols() {
        return Ok(None);
    }

    let mut bright = Mat::default();
    imgproc::threshold(gray, &mut bright, level, 255.0, imgproc::THRESH_BINARY)?;
    let dark_mean = core::mean(gray, &dark)?[0];
    let bright_mean = core::mean(gray, &bright)?[0];

    if bright_mean - dark_mean < min_contrast {
        trace!(
            "Otsu level {} rejected, contrast {:.1} < {}",
            level,
            bright_mean - dark_mean,
            min_contrast
        );
        return Ok(None);
    }
    Ok(Some((level as u8, dark)))
}

/// Per-frame Otsu levels gathered in a pass over a whole video
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThresholdCalibration {
    levels: Vec<u8>,
    frames: u64,
}

impl ThresholdCalibration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the Otsu level of one frame. Frames without a usable split count
    /// towards `frames` but contribute no level.
    pub fn observe(&mut self, frame: &Frame) -> opencv::Result<()> {
        let gray = frame.to_gray_mat()?;
        if let Some((level, _)) = otsu_split(&gray, AUTO_MIN_CONTRAST)? {
            self.levels.push(level);
        }
        self.frames += 1;
        Ok(())
    }

    /// Number of frames observed
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Median of the recorded levels (lower middle for even counts), `None`
    /// if no frame had a usable split
    pub fn level(&self) -> Option<u8> {
        let mut levels = self.levels.clone();
        levels.sort_unstable();
        levels.get(levels.len().saturating_sub(1) / 2).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cutoff {
    /// Every pixel is background
    Nothing,
    /// Foreground iff intensity <= level
    Level(u8),
    PerFrame,
}

/// Converts frames into foreground masks
#[derive(Debug, Clone)]
pub struct ForegroundExtractor {
    cutoff: Cutoff,
    min_contrast: f64,
}

impl ForegroundExtractor {
    /// Build an extractor for one video.
    ///
    /// `calibration` is only consulted for [`ThresholdPolicy::Calibrated`];
    /// without it that policy falls back to per-frame cutoffs.
    #[instrument(skip(calibration))]
    pub fn new(policy: ThresholdPolicy, calibration: Option<&ThresholdCalibration>) -> Self {
        let cutoff = match (policy, calibration) {
            (ThresholdPolicy::Fixed(0), _) => Cutoff::Nothing,
            (ThresholdPolicy::Fixed(value), _) => Cutoff::Level(value - 1),
            (ThresholdPolicy::Auto, _) => Cutoff::PerFrame,
            (ThresholdPolicy::Calibrated, Some(calibration)) => {
                debug!(
                    "Calibrated level {:?} from {} frames",
                    calibration.level(),
                    calibration.frames()
                );
                calibration.level().map_or(Cutoff::Nothing, Cutoff::Level)
            }
            (ThresholdPolicy::Calibrated, None) => {
                warn!("Calibrated threshold requested without a calibration pass, using per-frame cutoffs");
                Cutoff::PerFrame
            }
        };

        Self {
            cutoff,
            min_contrast: AUTO_MIN_CONTRAST,
        }
    }

    /// The video-wide level (foreground iff intensity <= level), if one is in effect.
    /// `Some(None)` means every frame is treated as background.
    pub fn fixed_level(&self) -> Option<Option<u8>> {
        match self.cutoff {
            Cutoff::Nothing => Some(None),
            Cutoff::Level(level) => Some(Some(level)),
            Cutoff::PerFrame => None,
        }
    }

    fn mask_for(&self, frame: &Frame) -> opencv::Result<Option<Mask>> {
        let gray = frame.to_gray_mat()?;
        let mask = match self.cutoff {
            Cutoff::Nothing => return Ok(None),
            Cutoff::Level(level) => {
                let mut mask = Mat::default();
                imgproc::threshold(&gray, &mut mask, level as f64, 255.0, imgproc::THRESH_BINARY_INV)?;
                mask
            }
            Cutoff::PerFrame => match otsu_split(&gray, self.min_contrast)? {
                Some((level, mask)) => {
                    trace!("Otsu level {}", level);
                    mask
                }
                None => return Ok(None),
            },
        };
        Mask::from_mat(&mask)
    }

    /// Classify every pixel of `frame`; `frame_index` is only used for errors.
    ///
    /// # Errors
    /// * `FrameShape` - if the frame does not match the job's established shape
    /// * `Processing` - if OpenCV fails on the frame
    pub fn extract(&self, frame: &Frame, expected: FrameShape, frame_index: u64) -> Result<Mask> {
        let actual = frame.shape();
        if actual != expected {
            return Err(SegContourError::FrameShape {
                frame: frame_index,
                expected,
                actual,
            });
        }

        let mask = self
            .mask_for(frame)
            .map_err(|e| SegContourError::processing(frame_index, e.to_string()))?;
        Ok(mask.unwrap_or_else(|| Mask::empty(frame.width(), frame.height())))
    }
}
