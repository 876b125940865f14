use crate::{Mat3, Pt3, Real, Vec3};
use serde::{Deserialize, Serialize};

/// Camera pose in world coordinates.
///
/// `rotation` holds the camera axes as columns, so a world point maps into the
/// camera frame as `Rᵀ (P - T)` (the row-vector form `(P - T) · R`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtrinsicParameters {
    pub translation: Vec3,
    pub rotation: Mat3,
}

impl Default for ExtrinsicParameters {
    fn default() -> Self {
        Self::identity_at(Vec3::zeros())
    }
}

impl ExtrinsicParameters {
    pub fn new(translation: Vec3, rotation: Mat3) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    /// Camera at `translation` looking down +Z with no rotation.
    pub fn identity_at(translation: Vec3) -> Self {
        Self::new(translation, Mat3::identity())
    }

    /// Camera at `position` whose optical axis passes through `target`.
    pub fn looking_at(position: Vec3, target: &Pt3) -> Self {
        let mut ext = Self::identity_at(position);
        ext.look_at(target);
        ext
    }

    /// Re-orient the camera toward `target`, keeping its position.
    ///
    /// Yaw and pitch are the spherical bearing of `target - T`; roll is zero.
    pub fn look_at(&mut self, target: &Pt3) {
        let q = target.coords - self.translation;
        let theta = q.x.atan2(q.z);
        let phi = (-q.y).atan2(q.x.hypot(q.z));
        self.rotation = yaw_matrix(theta).transpose() * pitch_matrix(phi).transpose();
    }

    /// World point expressed in the camera frame.
    pub fn to_camera(&self, p: &Pt3) -> Vec3 {
        self.rotation.tr_mul(&(p.coords - self.translation))
    }
}

fn yaw_matrix(theta: Real) -> Mat3 {
    let (s, c) = theta.sin_cos();
    Mat3::new(c, 0.0, -s, 0.0, 1.0, 0.0, s, 0.0, c)
}

fn pitch_matrix(phi: Real) -> Mat3 {
    let (s, c) = phi.sin_cos();
    Mat3::new(1.0, 0.0, 0.0, 0.0, c, s, 0.0, -s, c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn look_at_puts_target_on_optical_axis() {
        let ext = ExtrinsicParameters::looking_at(
            Vec3::new(0.05, 0.0, -0.05),
            &Pt3::new(-0.02, 0.03, 0.57),
        );
        let pc = ext.to_camera(&Pt3::new(-0.02, 0.03, 0.57));
        assert!(pc.z > 0.0);
        assert!(pc.x.abs() < 1e-12 && pc.y.abs() < 1e-12, "pc={pc}");

        let r = ext.rotation;
        assert!((r.transpose() * r - Mat3::identity()).norm() < 1e-12);
        assert!((r.determinant() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn look_at_has_no_roll() {
        let ext = ExtrinsicParameters::looking_at(Vec3::zeros(), &Pt3::new(1.0, -0.5, 2.0));
        // Camera x axis stays horizontal (no world-Y component).
        assert!(ext.rotation[(1, 0)].abs() < 1e-12);
    }

    #[test]
    fn straight_ahead_is_identity() {
        let ext = ExtrinsicParameters::looking_at(Vec3::new(0.0, 0.0, -1.0), &Pt3::new(0.0, 0.0, 3.0));
        assert!((ext.rotation - Mat3::identity()).norm() < 1e-12);
        let pc = ext.to_camera(&Pt3::new(0.2, 0.1, 1.0));
        assert!((pc - Vec3::new(0.2, 0.1, 2.0)).norm() < 1e-12);
    }
}
