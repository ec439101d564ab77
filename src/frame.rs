//! Owned frame, mask and point types passed between pipeline stages.
//!
//! Frames and masks own their samples so they can move freely between stages
//! and into progress events. Each stage converts to a `Mat` at its boundary
//! when it needs OpenCV.

use std::borrow::Cow;

use opencv::{
    core::{Mat, Scalar, CV_8U, CV_8UC1, CV_8UC3},
    imgproc,
    prelude::*,
};

use crate::common::FrameShape;

/// A pixel coordinate. Coordinates outside a grid are allowed and read as background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Ordering key for "topmost, then leftmost"
    pub fn raster_key(&self) -> (i32, i32) {
        (self.y, self.x)
    }
}

/// A decoded video frame: 8-bit samples, 1 (gray) or 3 (BGR) channels, row-major
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
}

/// Contiguous view of `mat`, cloning only when its rows are strided
fn contiguous(mat: &Mat) -> opencv::Result<Cow<'_, Mat>> {
    if mat.is_continuous() {
        Ok(Cow::Borrowed(mat))
    } else {
        Ok(Cow::Owned(mat.try_clone()?))
    }
}

impl Frame {
    /// Wrap raw samples. Returns `None` if the buffer does not match the geometry
    /// or the channel count is not 1 or 3.
    pub fn from_raw(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Option<Self> {
        if channels != 1 && channels != 3 {
            return None;
        }
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// A frame with every sample set to `value`
    pub fn filled(width: u32, height: u32, channels: u8, value: u8) -> Self {
        let channels = if channels == 1 { 1 } else { 3 };
        let len = width as usize * height as usize * channels as usize;
        Self {
            width,
            height,
            channels,
            data: vec![value; len],
        }
    }

    /// Copy a decoded `Mat` into a frame. BGRA input is reduced to BGR;
    /// returns `None` for depths and channel counts the pipeline does not handle.
    pub fn from_mat(mat: &Mat) -> opencv::Result<Option<Frame>> {
        if mat.depth() != CV_8U {
            return Ok(None);
        }

        let mut bgr = Mat::default();
        let mat = match mat.channels() {
            1 | 3 => mat,
            4 => {
                imgproc::cvt_color_def(mat, &mut bgr, imgproc::COLOR_BGRA2BGR)?;
                &bgr
            }
            _ => return Ok(None),
        };

        let mat = contiguous(mat)?;
        let bytes = mat.data_bytes()?.to_vec();
        Ok(Frame::from_raw(mat.cols() as u32, mat.rows() as u32, mat.channels() as u8, bytes))
    }

    /// `Mat` holding a copy of the samples, `CV_8UC1` or `CV_8UC3`
    pub fn to_mat(&self) -> opencv::Result<Mat> {
        let typ = if self.channels == 1 { CV_8UC1 } else { CV_8UC3 };
        let mut mat = Mat::new_rows_cols_with_default(self.height as i32, self.width as i32, typ, Scalar::all(0.0))?;
        mat.data_bytes_mut()?.copy_from_slice(&self.data);
        Ok(mat)
    }

    /// Three-channel `Mat`; gray frames are expanded with `COLOR_GRAY2BGR`
    pub fn to_bgr_mat(&self) -> opencv::Result<Mat> {
        let mat = self.to_mat()?;
        if self.channels == 3 {
            return Ok(mat);
        }
        let mut bgr = Mat::default();
        imgproc::cvt_color_def(&mat, &mut bgr, imgproc::COLOR_GRAY2BGR)?;
        Ok(bgr)
    }

    /// Single-channel intensity `Mat`; colour frames go through `COLOR_BGR2GRAY`
    pub fn to_gray_mat(&self) -> opencv::Result<Mat> {
        let mat = self.to_mat()?;
        if self.channels == 1 {
            return Ok(mat);
        }
        let mut gray = Mat::default();
        imgproc::cvt_color_def(&mat, &mut gray, imgproc::COLOR_BGR2GRAY)?;
        Ok(gray)
    }

    /// Single-channel copy of this frame
    pub fn to_gray(&self) -> opencv::Result<Frame> {
        let gray = self.to_gray_mat()?;
        Ok(Frame::from_mat(&gray)?.unwrap_or_else(|| Frame::filled(self.width, self.height, 1, 0)))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn shape(&self) -> FrameShape {
        FrameShape::new(self.width, self.height)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.channels as usize
    }

    /// Samples of one pixel (1 or 3 bytes)
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let start = self.offset(x, y);
        &self.data[start..start + self.channels as usize]
    }

    /// Set every sample of an axis-aligned rectangle to `value`, clipped to the frame
    pub fn fill_rect(&mut self, x: i32, y: i32, width: u32, height: u32, value: u8) {
        let x0 = x.clamp(0, self.width as i32) as u32;
        let y0 = y.clamp(0, self.height as i32) as u32;
        let x1 = (x + width as i32).clamp(0, self.width as i32) as u32;
        let y1 = (y + height as i32).clamp(0, self.height as i32) as u32;
        for row in y0..y1 {
            let start = self.offset(x0, row);
            let end = self.offset(x1, row);
            self.data[start..end].fill(value);
        }
    }
}

// Avoid dumping pixel data in logs
impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .finish()
    }
}

/// Binary foreground/background classification of one frame
#[derive(Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl Mask {
    /// An all-background mask
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![false; width as usize * height as usize],
        }
    }

    pub fn from_fn(width: u32, height: u32, mut is_foreground: impl FnMut(u32, u32) -> bool) -> Self {
        let mut bits = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                bits.push(is_foreground(x, y));
            }
        }
        Self { width, height, bits }
    }

    /// Read an 8-bit single-channel `Mat`; non-zero samples are foreground.
    /// Returns `None` for any other type.
    pub fn from_mat(mat: &Mat) -> opencv::Result<Option<Mask>> {
        if mat.typ() != CV_8UC1 {
            return Ok(None);
        }
        let mat = contiguous(mat)?;
        Ok(Some(Self {
            width: mat.cols() as u32,
            height: mat.rows() as u32,
            bits: mat.data_bytes()?.iter().map(|&v| v != 0).collect(),
        }))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn shape(&self) -> FrameShape {
        FrameShape::new(self.width, self.height)
    }

    /// Foreground test; anything outside the grid is background
    pub fn is_foreground(&self, x: i32, y: i32) -> bool {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return false;
        }
        self.bits[y as usize * self.width as usize + x as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, foreground: bool) {
        if x < self.width && y < self.height {
            self.bits[y as usize * self.width as usize + x as usize] = foreground;
        }
    }

    pub fn foreground_count(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }
}

impl std::fmt::Debug for Mask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mask")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("foreground", &self.foreground_count())
            .finish()
    }
}
