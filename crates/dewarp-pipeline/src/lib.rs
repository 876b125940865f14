//! End-to-end page dewarping: disparity grid → surface mesh → flattened layout
//! → photo correspondences → dewarped image.

pub mod config;
pub mod correspondence;
pub mod interpolate;
pub mod run;
pub mod warp;

use dewarp_core::DepthError;
use dewarp_optim::FlattenError;
use thiserror::Error;

pub use config::{CameraParamsFile, DewarpConfig, PhotoCameraConfig, PhotoRotation};
pub use correspondence::{
    extract_correspondences, Bounds2, CorrespondenceError, CorrespondenceQuad,
    CorrespondenceTable, RawCorrespondences,
};
pub use interpolate::{SampleLattice, TriangleInterpolator};
pub use run::{dewarp_image, run_dewarp, DewarpOutput, DewarpReport};
pub use warp::{ImageWarper, PiecewiseAffineWarper};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Depth(#[from] DepthError),
    #[error(transparent)]
    Flatten(#[from] FlattenError),
    #[error(transparent)]
    Correspondence(#[from] CorrespondenceError),
    #[error("invalid camera parameter file: {0}")]
    Params(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
