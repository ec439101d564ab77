//! In-memory pipeline options supplied at invocation

use tracing::debug;

use crate::common::{Result, SegContourError};
use crate::compositor::StrokeStyle;
use crate::contour::DEFAULT_MIN_AREA_FRACTION;
use crate::foreground::ThresholdPolicy;

/// Prefix added to each input's base name to form its output file name
pub const DEFAULT_OUTPUT_PREFIX: &str = "processed_";

/// Options shared by every job in a batch
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub threshold: ThresholdPolicy,
    /// Minimum subject area as a fraction of the frame area
    pub min_area_fraction: f64,
    pub stroke: StrokeStyle,
    pub output_prefix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threshold: ThresholdPolicy::default(),
            min_area_fraction: DEFAULT_MIN_AREA_FRACTION,
            stroke: StrokeStyle::default(),
            output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Check that the options are usable
    ///
    /// # Errors
    /// * `InvalidConfig` - for an area fraction outside [0, 1), a zero stroke
    ///   width, or a prefix containing path separators
    pub fn validate(&self) -> Result<()> {
        if !self.min_area_fraction.is_finite() || !(0.0..1.0).contains(&self.min_area_fraction) {
            return Err(SegContourError::config_error(format!(
                "minimum area fraction must be in [0, 1), got {}",
                self.min_area_fraction
            )));
        }
        if self.stroke.width == 0 {
            return Err(SegContourError::config_error("stroke width must be positive"));
        }
        if self.output_prefix.contains(|c: char| c == '/' || c == '\\') {
            return Err(SegContourError::config_error(format!(
                "output prefix must not contain path separators, got '{}'",
                self.output_prefix
            )));
        }

        debug!(
            "Configuration: threshold={}, min_area_fraction={}, stroke={}px {}",
            self.threshold, self.min_area_fraction, self.stroke.width, self.stroke.color
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::StrokeColor;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.threshold, ThresholdPolicy::Auto);
        assert_eq!(config.min_area_fraction, 0.001);
        assert_eq!(config.stroke.color, StrokeColor::WHITE);
        assert_eq!(config.stroke.width, 1);
        assert_eq!(config.output_prefix, "processed_");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let base = PipelineConfig::default();

        let config = PipelineConfig { min_area_fraction: -0.1, ..base.clone() };
        assert!(matches!(config.validate(), Err(SegContourError::InvalidConfig { .. })));

        let config = PipelineConfig { min_area_fraction: 1.0, ..base.clone() };
        assert!(config.validate().is_err());

        let config = PipelineConfig { min_area_fraction: f64::NAN, ..base.clone() };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            stroke: StrokeStyle { color: StrokeColor::WHITE, width: 0 },
            ..base.clone()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig { output_prefix: "out/".to_string(), ..base.clone() };
        assert!(config.validate().is_err());

        let config = PipelineConfig { output_prefix: String::new(), ..base };
        assert!(config.validate().is_ok());
    }
}
