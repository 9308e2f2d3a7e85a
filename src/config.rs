//! Camera configuration loaded from sensor YAML files.

use std::fs::File;
use std::path::Path;

use anyhow::{ensure, Context, Result};
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

/// Pinhole camera parameters.
///
/// Mirrors the usual sensor.yaml layout: focal lengths and principal
/// point in pixels plus the image resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub width: u32,
    pub height: u32,
}

impl CameraConfig {
    /// Load a camera configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("Failed to open camera config {:?}", path))?;
        let config: Self = serde_yaml::from_reader(file)
            .with_context(|| format!("Failed to parse camera config {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a camera configuration from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).context("Failed to parse camera config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.fx > 0.0 && self.fy > 0.0,
            "focal lengths must be positive, got fx={}, fy={}",
            self.fx,
            self.fy
        );
        Ok(())
    }

    /// The 3x3 intrinsics matrix K.
    pub fn k(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SENSOR_YAML: &str = "\
fx: 458.654
fy: 457.296
cx: 367.215
cy: 248.375
width: 752
height: 480
";

    #[test]
    fn parses_sensor_yaml() {
        let config = CameraConfig::from_yaml_str(SENSOR_YAML).unwrap();
        assert_eq!(config.width, 752);
        assert_eq!(config.height, 480);
        assert_relative_eq!(config.fx, 458.654);
    }

    #[test]
    fn intrinsics_matrix_is_upper_triangular_pinhole() {
        let config = CameraConfig::from_yaml_str(SENSOR_YAML).unwrap();
        let k = config.k();

        assert_relative_eq!(k[(0, 0)], 458.654);
        assert_relative_eq!(k[(1, 1)], 457.296);
        assert_relative_eq!(k[(0, 2)], 367.215);
        assert_relative_eq!(k[(1, 2)], 248.375);
        assert_relative_eq!(k[(2, 2)], 1.0);
        assert_relative_eq!(k[(1, 0)], 0.0);
        assert!(k.try_inverse().is_some());
    }

    #[test]
    fn missing_fields_are_an_error() {
        assert!(CameraConfig::from_yaml_str("fx: 500.0\nfy: 500.0\n").is_err());
    }

    #[test]
    fn non_positive_focal_length_is_rejected() {
        let yaml = "fx: 0.0\nfy: 500.0\ncx: 320.0\ncy: 240.0\nwidth: 640\nheight: 480\n";
        assert!(CameraConfig::from_yaml_str(yaml).is_err());
    }
}
