use dewarp_core::{
    cell_triangles, project_into_camera, DisparityGrid, ExtrinsicParameters, IntrinsicParameters,
    MeshBuilder, ProjectedLayout, Pt2, Pt3, Real, SurfaceMesh,
};
use dewarp_optim::{edge_distortion, flatten, FlattenResult, LmBackend, SolveReport};
use image::RgbaImage;
use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    extract_correspondences, CorrespondenceTable, DewarpConfig, ImageWarper, PipelineError,
    SampleLattice,
};

/// Everything computed by [`run_dewarp`].
#[derive(Debug, Clone)]
pub struct DewarpOutput {
    pub mesh: SurfaceMesh,
    /// Disparity cells replaced by the outlier clamp.
    pub clamped_outliers: usize,
    pub flatten: FlattenResult,
    pub photo_intrinsics: IntrinsicParameters,
    pub photo_extrinsics: ExtrinsicParameters,
    /// Mesh vertices in photo pixels.
    pub projected: ProjectedLayout,
    pub table: CorrespondenceTable,
    /// Lattice cells without full coverage.
    pub skipped_cells: usize,
}

/// Serializable summary of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DewarpReport {
    pub grid_rows: usize,
    pub grid_cols: usize,
    pub num_edges: usize,
    pub num_grid_edges: usize,
    pub clamped_outliers: usize,
    pub solve: SolveReport,
    pub sum_squared_residual: Real,
    pub relative_residual: Real,
    /// Edge distortion of the orthographic start and of the solved layout.
    pub initial_distortion: Real,
    pub solved_distortion: Real,
    pub unprojected_points: usize,
    pub num_quads: usize,
    pub skipped_cells: usize,
    pub output_scale: Real,
    pub output_size: (u32, u32),
}

impl DewarpOutput {
    pub fn report(&self) -> DewarpReport {
        let mesh = &self.mesh;
        DewarpReport {
            grid_rows: mesh.shape.rows,
            grid_cols: mesh.shape.cols,
            num_edges: mesh.edges.len(),
            num_grid_edges: mesh.grid_edges.len(),
            clamped_outliers: self.clamped_outliers,
            solve: self.flatten.report.clone(),
            sum_squared_residual: self.flatten.sum_squared_residual,
            relative_residual: self.flatten.relative_residual(),
            initial_distortion: edge_distortion(&self.flatten.initial, &mesh.points, &mesh.edges),
            solved_distortion: edge_distortion(&self.flatten.solved, &mesh.points, &mesh.edges),
            unprojected_points: self.projected.iter().filter(|p| p.is_none()).count(),
            num_quads: self.table.quads.len(),
            skipped_cells: self.skipped_cells,
            output_scale: self.table.output_scale,
            output_size: self.table.output_size,
        }
    }
}

fn validate(config: &DewarpConfig) -> Result<(), PipelineError> {
    let checks = [
        (config.depth_focal, "depth_focal"),
        (config.camera.focal, "camera.focal"),
        (config.lattice_spacing, "lattice_spacing"),
        (config.output_max_dimension, "output_max_dimension"),
    ];
    for (value, name) in checks {
        if !(value.is_finite() && value > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "{name} must be positive, got {value}"
            )));
        }
    }
    Ok(())
}

/// Flatten the surface measured by `disparity` and build the correspondence
/// table for a photo of `photo_size` (already rotated into place).
pub fn run_dewarp(
    disparity: DisparityGrid,
    photo_size: (u32, u32),
    config: &DewarpConfig,
) -> Result<DewarpOutput, PipelineError> {
    validate(config)?;

    // The optical centre refers to the full sensor frame.
    let depth_intrinsics =
        IntrinsicParameters::centered(config.depth_focal, disparity.cols(), disparity.rows());
    let mut builder =
        MeshBuilder::new(disparity, depth_intrinsics).with_model(config.disparity_model);
    if let Some(bbox) = config.crop {
        builder.crop(bbox)?;
    }
    builder.subsample(config.subsample)?;
    let clamped_outliers = builder.clamp_outliers(config.outlier_sentinel)?;
    let mesh = builder.build();
    info!(
        "mesh {}x{} from disparity ({} edges)",
        mesh.shape.rows,
        mesh.shape.cols,
        mesh.edges.len()
    );

    let flatten = flatten(&mesh, &LmBackend, &config.solver, config.objective)?;

    let (width, height) = photo_size;
    let photo_intrinsics = IntrinsicParameters::new(
        config.camera.focal,
        Pt2::new(width as Real / 2.0, height as Real / 2.0),
    );
    let photo_extrinsics = ExtrinsicParameters::looking_at(
        config.camera.position(),
        &Pt3::from(config.camera.target()),
    );
    let projected = project_into_camera(&mesh.points, &photo_intrinsics, &photo_extrinsics);

    let lattice = SampleLattice::for_image(width, height, config.lattice_spacing);
    let triangles = cell_triangles(mesh.shape);
    let raw = extract_correspondences(&projected, &flatten.solved, &triangles, &lattice)?;
    let skipped_cells = raw.skipped;
    let table = CorrespondenceTable::scaled(raw, config.output_max_dimension)?;

    Ok(DewarpOutput {
        mesh,
        clamped_outliers,
        flatten,
        photo_intrinsics,
        photo_extrinsics,
        projected,
        table,
        skipped_cells,
    })
}

/// Rotate `photo` per the config, run the pipeline and warp the photo.
pub fn dewarp_image<W: ImageWarper>(
    disparity: DisparityGrid,
    photo: &RgbaImage,
    config: &DewarpConfig,
    warper: &W,
) -> Result<(RgbaImage, DewarpOutput), PipelineError> {
    let photo = config.photo_rotation.apply(photo);
    let output = run_dewarp(disparity, photo.dimensions(), config)?;
    let image = warper.warp(&photo, &output.table);
    info!("dewarped image {}x{}", image.width(), image.height());
    Ok((image, output))
}
