use dewarp_core::{CropBox, DisparityModel, Real, Vec3, INVALID_DISPARITY};
use dewarp_optim::{EdgeObjective, SolveOptions};
use image::{imageops, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::PipelineError;

/// Pose and focal length of the photo camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotoCameraConfig {
    /// Focal length in pixels (lens focal length over pixel pitch).
    pub focal: Real,
    /// Camera position in the depth sensor frame.
    pub position: [Real; 3],
    /// Point the optical axis passes through.
    pub target: [Real; 3],
}

impl Default for PhotoCameraConfig {
    fn default() -> Self {
        Self {
            focal: 86.0 / 0.009,
            position: [0.05, 0.0, -0.05],
            target: [-0.02, 0.03, 0.57],
        }
    }
}

impl PhotoCameraConfig {
    pub fn position(&self) -> Vec3 {
        Vec3::from(self.position)
    }

    pub fn target(&self) -> Vec3 {
        Vec3::from(self.target)
    }
}

/// Clockwise rotation applied to the photo before it is matched to the mesh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhotoRotation {
    None,
    #[default]
    Cw90,
    Cw180,
    Cw270,
}

impl PhotoRotation {
    /// Rotation for a clockwise angle in degrees (multiples of 90).
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees % 360 {
            0 => Some(Self::None),
            90 => Some(Self::Cw90),
            180 => Some(Self::Cw180),
            270 => Some(Self::Cw270),
            _ => None,
        }
    }

    pub fn apply(self, photo: &RgbaImage) -> RgbaImage {
        match self {
            Self::None => photo.clone(),
            Self::Cw90 => imageops::rotate90(photo),
            Self::Cw180 => imageops::rotate180(photo),
            Self::Cw270 => imageops::rotate270(photo),
        }
    }

    /// Image size `(width, height)` after rotation.
    pub fn rotated_size(self, (width, height): (u32, u32)) -> (u32, u32) {
        match self {
            Self::None | Self::Cw180 => (width, height),
            Self::Cw90 | Self::Cw270 => (height, width),
        }
    }
}

/// Parameters of a full dewarping run. Defaults reproduce the reference
/// book capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DewarpConfig {
    /// Region of the disparity grid holding the page; `None` keeps everything.
    pub crop: Option<CropBox>,
    /// Keep every `subsample`-th row and column after cropping.
    pub subsample: usize,
    /// Disparity values at or above this are missing measurements.
    pub outlier_sentinel: Real,
    /// Focal length of the depth camera in (full resolution) pixels.
    pub depth_focal: Real,
    pub disparity_model: DisparityModel,
    pub camera: PhotoCameraConfig,
    /// Photo-space spacing of the correspondence lattice, in pixels.
    pub lattice_spacing: Real,
    /// Longest side of the dewarped image, in pixels.
    pub output_max_dimension: Real,
    pub objective: EdgeObjective,
    pub solver: SolveOptions,
    pub photo_rotation: PhotoRotation,
}

impl Default for DewarpConfig {
    fn default() -> Self {
        Self {
            crop: Some(CropBox::from([230, 125, 400, 375])),
            subsample: 20,
            outlier_sentinel: INVALID_DISPARITY,
            depth_focal: 640.0,
            disparity_model: DisparityModel::default(),
            camera: PhotoCameraConfig::default(),
            lattice_spacing: 300.0,
            output_max_dimension: 2000.0,
            objective: EdgeObjective::default(),
            solver: SolveOptions::default(),
            photo_rotation: PhotoRotation::default(),
        }
    }
}

/// Renderer parameter file: `f, Tx, Ty, Tz, theta, phi, psi, k`.
///
/// Only the focal length feeds the pipeline; the remaining values describe the
/// simulated pose and are kept for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraParamsFile {
    pub focal: Real,
    pub translation: [Real; 3],
    /// Euler angles `(theta, phi, psi)`.
    pub angles: [Real; 3],
    pub k: Real,
}

impl CameraParamsFile {
    pub const NUM_VALUES: usize = 8;

    /// Parse whitespace-separated values (any line layout).
    pub fn parse(text: &str) -> Result<Self, PipelineError> {
        let values = text
            .split_whitespace()
            .map(|tok| {
                tok.parse::<Real>()
                    .map_err(|e| PipelineError::Params(format!("{tok:?}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if values.len() != Self::NUM_VALUES {
            return Err(PipelineError::Params(format!(
                "expected {} values, got {}",
                Self::NUM_VALUES,
                values.len()
            )));
        }
        Ok(Self {
            focal: values[0],
            translation: [values[1], values[2], values[3]],
            angles: [values[4], values[5], values[6]],
            k: values[7],
        })
    }

    /// Use this file's focal length for the depth camera.
    pub fn apply_to(&self, config: &mut DewarpConfig) {
        config.depth_focal = self.focal;
    }
}
