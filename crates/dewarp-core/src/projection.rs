use crate::{ExtrinsicParameters, IntrinsicParameters, Pt2, Pt3};
use log::debug;

/// Image-plane position of every point cloud entry, same indexing.
///
/// `None` marks points that land at or behind the camera after the extrinsic
/// transform; such points have no meaningful pinhole projection.
pub type ProjectedLayout = Vec<Option<Pt2>>;

/// Project a world point cloud into a camera given its intrinsics and pose.
///
/// Each point is moved to the camera frame with `(P - T) · R` and then
/// projected with `center + f * (x, y) / z`.
pub fn project_into_camera(
    points: &[Pt3],
    intrinsics: &IntrinsicParameters,
    extrinsics: &ExtrinsicParameters,
) -> ProjectedLayout {
    let projected: ProjectedLayout = points
        .iter()
        .map(|p| intrinsics.project(&extrinsics.to_camera(p)))
        .collect();
    let behind = projected.iter().filter(|p| p.is_none()).count();
    if behind > 0 {
        debug!(
            "{behind} of {} points are behind the camera and were not projected",
            points.len()
        );
    }
    projected
}
