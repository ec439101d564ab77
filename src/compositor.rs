//! Frame compositing: draws the subject's contour onto the original frame.

use std::fmt;
use std::str::FromStr;

use opencv::{
    core::{Mat, Point as CvPoint, Scalar, Vector, CV_8UC3},
    imgproc,
    prelude::*,
};
use tracing::trace;

use crate::common::{Result, SegContourError};
use crate::contour::Contour;
use crate::frame::Frame;

/// Stroke colour, stored as RGB and written to frames in BGR sample order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrokeColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl StrokeColor {
    pub const WHITE: StrokeColor = StrokeColor { r: 255, g: 255, b: 255 };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn bgr(&self) -> [u8; 3] {
        [self.b, self.g, self.r]
    }

    /// The colour as it lands on a single-channel frame (`COLOR_BGR2GRAY`)
    pub fn gray_level(&self) -> opencv::Result<u8> {
        let sample = Mat::new_rows_cols_with_default(1, 1, CV_8UC3, self.bgr_scalar())?;
        let mut gray = Mat::default();
        imgproc::cvt_color_def(&sample, &mut gray, imgproc::COLOR_BGR2GRAY)?;
        Ok(gray.data_bytes()?.first().copied().unwrap_or_default())
    }

    fn bgr_scalar(&self) -> Scalar {
        Scalar::new(self.b as f64, self.g as f64, self.r as f64, 0.0)
    }

    fn scalar_for(&self, channels: u8) -> opencv::Result<Scalar> {
        if channels == 1 {
            return Ok(Scalar::all(self.gray_level()? as f64));
        }
        Ok(self.bgr_scalar())
    }
}

impl FromStr for StrokeColor {
    type Err = SegContourError;

    /// Parses `R,G,B`
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let channel = |text: &str| {
            text.parse::<u8>().map_err(|_| {
                SegContourError::config_error(format!("colour must be R,G,B with values in [0,255], got '{}'", s))
            })
        };
        match parts.as_slice() {
            [r, g, b] => Ok(Self::new(channel(*r)?, channel(*g)?, channel(*b)?)),
            _ => Err(SegContourError::config_error(format!(
                "colour must be R,G,B with values in [0,255], got '{}'",
                s
            ))),
        }
    }
}

impl fmt::Display for StrokeColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.r, self.g, self.b)
    }
}

/// Colour and width of the drawn contour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrokeStyle {
    pub color: StrokeColor,
    pub width: u32,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            color: StrokeColor::WHITE,
            width: 1,
        }
    }
}

/// Draws contours onto copies of frames
#[derive(Debug, Clone, Default)]
pub struct FrameCompositor {
    style: StrokeStyle,
}

impl FrameCompositor {
    /// # Panics
    /// Panics if the stroke width is zero
    pub fn new(style: StrokeStyle) -> Self {
        assert!(style.width > 0, "Stroke width must be positive");
        Self { style }
    }

    pub fn style(&self) -> &StrokeStyle {
        &self.style
    }

    fn draw(&self, frame: &Frame, contour: &Contour) -> opencv::Result<Option<Frame>> {
        let mut canvas = frame.to_mat()?;
        let path: Vector<CvPoint> = contour.points().iter().map(|p| CvPoint::new(p.x, p.y)).collect();
        let mut paths = Vector::<Vector<CvPoint>>::new();
        paths.push(path);

        imgproc::polylines(
            &mut canvas,
            &paths,
            true,
            self.style.color.scalar_for(frame.channels())?,
            self.style.width as i32,
            imgproc::LINE_8,
            0,
        )?;
        Frame::from_mat(&canvas)
    }

    /// A new frame equal to `frame` with `contour` stroked on top as a closed
    /// polyline, or an unchanged copy when there is no contour.
    /// `frame_index` is only used for errors.
    ///
    /// # Errors
    /// * `Processing` - if OpenCV fails to draw on the frame
    pub fn composite(&self, frame: &Frame, contour: Option<&Contour>, frame_index: u64) -> Result<Frame> {
        let contour = match contour {
            Some(contour) if !contour.points().is_empty() => contour,
            _ => return Ok(frame.clone()),
        };

        trace!("Stroking {} boundary points", contour.points().len());
        match self.draw(frame, contour) {
            Ok(Some(output)) => Ok(output),
            Ok(None) => Err(SegContourError::processing(frame_index, "drawn frame has an unsupported layout")),
            Err(e) => Err(SegContourError::processing(frame_index, e.to_string())),
        }
    }
}
