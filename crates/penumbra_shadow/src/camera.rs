//! Camera frustum input for a culling pass
//!
//! The culler only needs the camera's position, its forward direction and
//! the 8 world-space corners of the view frustum. Hosts either pass corners
//! directly or derive them from their view/projection matrices.

use glam::{Mat4, Quat, Vec3, Vec4};

use crate::bounds::Aabb;

/// Index of the first far-plane corner in [`CameraFrustum::corners`]
pub const FAR_CORNER_OFFSET: usize = 4;

/// NDC corners, near plane first (GL clip depth, -1 = near)
const NDC_CORNERS: [Vec4; 8] = [
    Vec4::new(-1.0, -1.0, -1.0, 1.0),
    Vec4::new(1.0, -1.0, -1.0, 1.0),
    Vec4::new(-1.0, 1.0, -1.0, 1.0),
    Vec4::new(1.0, 1.0, -1.0, 1.0),
    Vec4::new(-1.0, -1.0, 1.0, 1.0),
    Vec4::new(1.0, -1.0, 1.0, 1.0),
    Vec4::new(-1.0, 1.0, 1.0, 1.0),
    Vec4::new(1.0, 1.0, 1.0, 1.0),
];

/// World-space camera frustum
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraFrustum {
    /// Camera position
    pub position: Vec3,
    /// Unit view direction
    pub forward: Vec3,
    /// Near-plane corners (0..4) then far-plane corners (4..8)
    pub corners: [Vec3; 8],
}

impl CameraFrustum {
    /// Create from explicit corners
    pub fn new(position: Vec3, forward: Vec3, corners: [Vec3; 8]) -> Self {
        Self {
            position,
            forward: forward.normalize_or_zero(),
            corners,
        }
    }

    /// Derive from a camera view matrix and a GL-convention projection
    pub fn from_view_projection(view: &Mat4, projection: &Mat4) -> Self {
        let inv_view = view.inverse();
        let inv_view_proj = (*projection * *view).inverse();

        let corners = NDC_CORNERS.map(|ndc| {
            let world = inv_view_proj * ndc;
            world.truncate() / world.w
        });

        Self::new(
            inv_view.transform_point3(Vec3::ZERO),
            inv_view.transform_vector3(Vec3::NEG_Z),
            corners,
        )
    }

    /// Build a symmetric perspective frustum looking down the rotated -Z axis
    pub fn from_perspective(
        position: Vec3,
        rotation: Quat,
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Self {
        let forward = rotation * Vec3::NEG_Z;
        let up = rotation * Vec3::Y;
        let right = rotation * Vec3::X;
        let tan_half = (fov_y * 0.5).tan();

        let mut corners = [Vec3::ZERO; 8];
        for (plane, depth) in [near, far].into_iter().enumerate() {
            let half_h = tan_half * depth;
            let half_w = half_h * aspect;
            let center = position + forward * depth;
            let base = plane * FAR_CORNER_OFFSET;
            corners[base] = center - right * half_w - up * half_h;
            corners[base + 1] = center + right * half_w - up * half_h;
            corners[base + 2] = center - right * half_w + up * half_h;
            corners[base + 3] = center + right * half_w + up * half_h;
        }

        Self::new(position, forward, corners)
    }

    /// Pull the far plane in so no corner lies deeper than `max_distance`
    /// along the view direction
    ///
    /// Per-object shadows are rarely wanted out to the camera's far plane.
    pub fn with_max_distance(mut self, max_distance: f32) -> Self {
        for i in 0..FAR_CORNER_OFFSET {
            let near = self.corners[i];
            let far = self.corners[i + FAR_CORNER_OFFSET];
            let near_depth = (near - self.position).dot(self.forward);
            let far_depth = (far - self.position).dot(self.forward);
            if far_depth > max_distance && far_depth > near_depth {
                let t = ((max_distance - near_depth) / (far_depth - near_depth)).clamp(0.0, 1.0);
                self.corners[i + FAR_CORNER_OFFSET] = near.lerp(far, t);
            }
        }
        self
    }

    /// World-space bounds of the corners
    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(&self.corners)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_perspective_corners() {
        let frustum = CameraFrustum::from_perspective(
            Vec3::ZERO,
            Quat::IDENTITY,
            core::f32::consts::FRAC_PI_2,
            1.0,
            1.0,
            10.0,
        );

        assert_eq!(frustum.forward, Vec3::NEG_Z);
        // 90 degree fov: half height equals depth
        assert!(frustum.corners[0].abs_diff_eq(Vec3::new(-1.0, -1.0, -1.0), 1e-5));
        assert!(frustum.corners[7].abs_diff_eq(Vec3::new(10.0, 10.0, -10.0), 1e-4));
    }

    #[test]
    fn test_from_view_projection_matches_perspective() {
        let position = Vec3::new(3.0, 2.0, 5.0);
        let rotation = Quat::from_rotation_y(0.4);
        let fov = 1.0;
        let aspect = 1.5;

        let expected = CameraFrustum::from_perspective(position, rotation, fov, aspect, 0.5, 50.0);

        let view = Mat4::from_rotation_translation(rotation, position).inverse();
        let projection = Mat4::perspective_rh_gl(fov, aspect, 0.5, 50.0);
        let derived = CameraFrustum::from_view_projection(&view, &projection);

        assert!(derived.position.abs_diff_eq(position, 1e-4));
        assert!(derived.forward.abs_diff_eq(expected.forward, 1e-4));
        for (a, b) in derived.corners.iter().zip(expected.corners.iter()) {
            assert!(a.abs_diff_eq(*b, 5e-2), "{:?} vs {:?}", a, b);
        }
    }

    #[test]
    fn test_with_max_distance() {
        let frustum = CameraFrustum::from_perspective(
            Vec3::ZERO,
            Quat::IDENTITY,
            core::f32::consts::FRAC_PI_2,
            1.0,
            1.0,
            100.0,
        )
        .with_max_distance(20.0);

        for corner in &frustum.corners[FAR_CORNER_OFFSET..] {
            assert_abs_diff_eq!(-corner.z, 20.0, epsilon = 1e-3);
        }
        assert_abs_diff_eq!(frustum.bounds().max.x, 20.0, epsilon = 1e-3);
    }
}
