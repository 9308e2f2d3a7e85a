//! SE(3) rigid-body transform: unit-quaternion rotation plus translation.

use nalgebra::{Matrix3, Matrix4, Rotation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// A rigid transform in 3D.
///
/// Composition and point transforms follow the usual convention
/// `T_a_b * p_b = p_a`: the transform maps coordinates expressed in its
/// source frame into its target frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SE3 {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl SE3 {
    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Build from a rotation matrix and a translation vector.
    ///
    /// The matrix must be a proper rotation (orthonormal, det = +1).
    pub fn from_rt(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        let rotation =
            UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rotation));
        Self {
            rotation,
            translation,
        }
    }

    /// The rotation as a 3x3 matrix.
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation.to_rotation_matrix().into_inner()
    }

    /// Inverse transform.
    pub fn inverse(&self) -> Self {
        let rot_inv = self.rotation.inverse();
        Self {
            rotation: rot_inv,
            translation: -(rot_inv * self.translation),
        }
    }

    /// Compose with another transform: `self * other`.
    pub fn compose(&self, other: &SE3) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    /// Apply the transform to a point.
    pub fn transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * p + self.translation
    }

    /// The transform as a 4x4 homogeneous matrix.
    pub fn to_homogeneous(&self) -> Matrix4<f64> {
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&self.rotation_matrix());
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        m
    }

    /// Build from a 4x4 homogeneous matrix whose upper-left block is a
    /// proper rotation.
    pub fn from_homogeneous(m: &Matrix4<f64>) -> Self {
        let rotation = m.fixed_view::<3, 3>(0, 0).into_owned();
        let translation = m.fixed_view::<3, 1>(0, 3).into_owned();
        Self::from_rt(rotation, translation)
    }

    /// Rotation angle to another transform, in radians.
    pub fn rotation_angle_to(&self, other: &SE3) -> f64 {
        self.rotation.angle_to(&other.rotation)
    }
}

impl Default for SE3 {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_transform() -> SE3 {
        SE3 {
            rotation: UnitQuaternion::from_euler_angles(0.1, -0.2, 0.3),
            translation: Vector3::new(1.0, -2.0, 0.5),
        }
    }

    #[test]
    fn inverse_composes_to_identity() {
        let t = sample_transform();
        let id = t.compose(&t.inverse());
        assert_relative_eq!(id.rotation_matrix(), Matrix3::identity(), epsilon = 1e-12);
        assert_relative_eq!(id.translation, Vector3::zeros(), epsilon = 1e-12);
    }

    #[test]
    fn transform_point_matches_homogeneous_form() {
        let t = sample_transform();
        let p = Vector3::new(0.3, 0.7, -1.1);

        let direct = t.transform_point(&p);
        let h = t.to_homogeneous() * nalgebra::Vector4::new(p.x, p.y, p.z, 1.0);

        assert_relative_eq!(direct, h.fixed_rows::<3>(0).into_owned(), epsilon = 1e-12);
    }

    #[test]
    fn homogeneous_round_trip() {
        let t = sample_transform();
        let back = SE3::from_homogeneous(&t.to_homogeneous());
        assert_relative_eq!(
            back.rotation_matrix(),
            t.rotation_matrix(),
            epsilon = 1e-12
        );
        assert_relative_eq!(back.translation, t.translation, epsilon = 1e-12);
    }

    #[test]
    fn compose_applies_right_to_left() {
        let a = sample_transform();
        let b = SE3 {
            rotation: UnitQuaternion::from_euler_angles(-0.3, 0.1, 0.0),
            translation: Vector3::new(0.0, 1.0, 2.0),
        };
        let p = Vector3::new(1.0, 1.0, 1.0);

        let composed = a.compose(&b).transform_point(&p);
        let stepped = a.transform_point(&b.transform_point(&p));
        assert_relative_eq!(composed, stepped, epsilon = 1e-12);
    }
}
