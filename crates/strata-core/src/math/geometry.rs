// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bounding volumes and the view frustum used by instance culling.

use super::matrix::Mat4;
use super::vector::{Vec3, Vec4};

/// A sphere enclosing a mesh, in the mesh's local space unless stated otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingSphere {
    /// Center of the sphere.
    pub center: Vec3,
    /// Radius of the sphere.
    pub radius: f32,
}

impl BoundingSphere {
    /// Creates a new sphere.
    #[inline]
    pub const fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Computes a sphere around a set of points, centered on their bounding box.
    ///
    /// Returns `None` for an empty input.
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let first = *points.first()?;
        let (mut min, mut max) = (first, first);
        for p in points {
            min = Vec3::new(min.x.min(p.x), min.y.min(p.y), min.z.min(p.z));
            max = Vec3::new(max.x.max(p.x), max.y.max(p.y), max.z.max(p.z));
        }
        let center = (min + max) * 0.5;
        let radius = points
            .iter()
            .map(|p| p.distance(center))
            .fold(0.0_f32, f32::max);
        Some(Self { center, radius })
    }

    /// Returns the sphere moved into the space described by `transform`.
    ///
    /// The radius grows by the largest axis scale, so the result stays
    /// conservative under non-uniform scale.
    #[inline]
    pub fn transformed(&self, transform: &Mat4) -> Self {
        Self {
            center: transform.transform_point3(self.center),
            radius: self.radius * transform.max_axis_scale(),
        }
    }

    /// Packs the sphere as `[x, y, z, radius]`.
    #[inline]
    pub fn to_array(&self) -> [f32; 4] {
        [self.center.x, self.center.y, self.center.z, self.radius]
    }

    /// Unpacks a sphere from `[x, y, z, radius]`.
    #[inline]
    pub fn from_array(v: [f32; 4]) -> Self {
        Self::new(Vec3::new(v[0], v[1], v[2]), v[3])
    }
}

/// A plane `normal · p + d = 0`. Points with a positive distance are inside.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Plane {
    /// Unit normal pointing to the inside half-space.
    pub normal: Vec3,
    /// Distance term.
    pub d: f32,
}

impl Plane {
    /// Builds a normalized plane from raw `(a, b, c, d)` coefficients.
    pub fn from_coefficients(v: Vec4) -> Self {
        let normal = v.truncate();
        let len = normal.length();
        if len > crate::math::EPSILON {
            Self {
                normal: normal * (1.0 / len),
                d: v.w / len,
            }
        } else {
            Self { normal, d: v.w }
        }
    }

    /// Signed distance from the plane to `point`.
    #[inline]
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.d
    }

    /// Packs the plane as `[nx, ny, nz, d]`.
    #[inline]
    pub fn to_array(&self) -> [f32; 4] {
        [self.normal.x, self.normal.y, self.normal.z, self.d]
    }

    /// Unpacks a plane from `[nx, ny, nz, d]`.
    #[inline]
    pub fn from_array(v: [f32; 4]) -> Self {
        Self {
            normal: Vec3::new(v[0], v[1], v[2]),
            d: v[3],
        }
    }
}

/// The six planes bounding a camera's view volume.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Frustum {
    /// Left, right, bottom, top, near, far.
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extracts the frustum from a view-projection matrix with a [0, 1] depth range.
    pub fn from_view_projection(view_projection: &Mat4) -> Self {
        let r0 = view_projection.get_row(0);
        let r1 = view_projection.get_row(1);
        let r2 = view_projection.get_row(2);
        let r3 = view_projection.get_row(3);
        Self {
            planes: [
                Plane::from_coefficients(r3 + r0),
                Plane::from_coefficients(r3 - r0),
                Plane::from_coefficients(r3 + r1),
                Plane::from_coefficients(r3 - r1),
                Plane::from_coefficients(r2),
                Plane::from_coefficients(r3 - r2),
            ],
        }
    }

    /// Rebuilds a frustum from packed planes.
    pub fn from_arrays(planes: &[[f32; 4]; 6]) -> Self {
        Self {
            planes: planes.map(Plane::from_array),
        }
    }

    /// Packs the planes for upload.
    pub fn to_arrays(&self) -> [[f32; 4]; 6] {
        self.planes.map(|p| p.to_array())
    }

    /// Returns `true` if the sphere is at least partially inside the frustum.
    #[inline]
    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(sphere.center) >= -sphere.radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::FRAC_PI_2;
    use approx::assert_relative_eq;

    fn camera_frustum() -> Frustum {
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0), Vec3::Y).unwrap();
        let proj = Mat4::perspective_rh_zo(FRAC_PI_2, 1.0, 0.1, 100.0);
        Frustum::from_view_projection(&(proj * view))
    }

    #[test]
    fn sphere_in_front_of_camera_is_visible() {
        let frustum = camera_frustum();
        let sphere = BoundingSphere::new(Vec3::new(0.0, 0.0, -10.0), 1.0);
        assert!(frustum.intersects_sphere(&sphere));
    }

    #[test]
    fn sphere_behind_camera_is_culled() {
        let frustum = camera_frustum();
        let sphere = BoundingSphere::new(Vec3::new(0.0, 0.0, 10.0), 1.0);
        assert!(!frustum.intersects_sphere(&sphere));
    }

    #[test]
    fn sphere_straddling_side_plane_is_kept() {
        let frustum = camera_frustum();
        // With a 90 degree fov the side planes pass through x = -z.
        let sphere = BoundingSphere::new(Vec3::new(10.5, 0.0, -10.0), 1.0);
        assert!(frustum.intersects_sphere(&sphere));
        let far_out = BoundingSphere::new(Vec3::new(30.0, 0.0, -10.0), 1.0);
        assert!(!frustum.intersects_sphere(&far_out));
    }

    #[test]
    fn sphere_beyond_far_plane_is_culled() {
        let frustum = camera_frustum();
        let sphere = BoundingSphere::new(Vec3::new(0.0, 0.0, -150.0), 1.0);
        assert!(!frustum.intersects_sphere(&sphere));
    }

    #[test]
    fn transformed_sphere_scales_radius() {
        let sphere = BoundingSphere::new(Vec3::ZERO, 1.0);
        let m = Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0)) * Mat4::from_scale(Vec3::new(3.0, 1.0, 1.0));
        let t = sphere.transformed(&m);
        assert_eq!(t.center, Vec3::new(0.0, 2.0, 0.0));
        assert_relative_eq!(t.radius, 3.0);
    }

    #[test]
    fn from_points_encloses_all_points() {
        let points = [Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0), Vec3::new(0.5, 0.0, 0.0)];
        let sphere = BoundingSphere::from_points(&points).unwrap();
        for p in points {
            assert!(p.distance(sphere.center) <= sphere.radius + 1e-5);
        }
        assert!(BoundingSphere::from_points(&[]).is_none());
    }
}
