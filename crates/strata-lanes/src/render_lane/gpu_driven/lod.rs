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


//! Screen-size driven level-of-detail selection, shared by the culling
//! kernel and CPU-side tooling.

use strata_core::math::{BoundingSphere, Vec3};
use strata_core::renderer::GpuMeshLod;

/// Projected size of a world-space sphere.
///
/// `1.0` means the sphere spans roughly the full screen height. An eye
/// inside the sphere gives `f32::INFINITY`, which selects the finest LOD.
///
/// ## Arguments
/// * `sphere` - The bounds, already in world space.
/// * `camera_position` - The eye position in world space.
/// * `lod_scale` - The projection's `[1][1]` element, `cot(fov_y / 2)`.
#[inline]
pub fn screen_size_metric(sphere: &BoundingSphere, camera_position: Vec3, lod_scale: f32) -> f32 {
    let distance = sphere.center.distance(camera_position);
    if distance <= sphere.radius {
        return f32::INFINITY;
    }
    sphere.radius * lod_scale / distance
}

/// Picks the LOD for `metric` among `lods`, ordered from most to least
/// detailed.
///
/// The first LOD whose threshold is `<= metric` wins; a metric below every
/// threshold falls back to the coarsest LOD. Returns `None` for a mesh
/// without LODs.
pub fn select_lod(lods: &[GpuMeshLod], metric: f32) -> Option<usize> {
    if lods.is_empty() {
        return None;
    }
    let index = lods
        .iter()
        .position(|lod| lod.screen_size_threshold <= metric)
        .unwrap_or(lods.len() - 1);
    Some(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn lods(thresholds: &[f32]) -> Vec<GpuMeshLod> {
        thresholds
            .iter()
            .map(|&t| GpuMeshLod {
                screen_size_threshold: t,
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn metric_between_thresholds_picks_the_coarser_side() {
        let lods = lods(&[0.8, 0.4, 0.1]);
        assert_eq!(select_lod(&lods, 0.5), Some(1));
        assert_eq!(select_lod(&lods, 0.8), Some(0));
        assert_eq!(select_lod(&lods, 2.0), Some(0));
        assert_eq!(select_lod(&lods, 0.1), Some(2));
    }

    #[test]
    fn tiny_metric_falls_back_to_coarsest() {
        let lods = lods(&[0.8, 0.4, 0.1]);
        assert_eq!(select_lod(&lods, 0.01), Some(2));
        assert_eq!(select_lod(&lods, 0.0), Some(2));
        assert_eq!(select_lod(&[], 0.5), None);
    }

    #[test]
    fn metric_scales_with_radius_over_distance() {
        let sphere = BoundingSphere::new(Vec3::new(0.0, 0.0, -10.0), 1.0);
        assert_relative_eq!(screen_size_metric(&sphere, Vec3::ZERO, 2.0), 0.2);
        let far = BoundingSphere::new(Vec3::new(0.0, 0.0, -20.0), 1.0);
        assert_relative_eq!(screen_size_metric(&far, Vec3::ZERO, 2.0), 0.1);
    }

    #[test]
    fn eye_inside_sphere_is_infinite() {
        let sphere = BoundingSphere::new(Vec3::new(0.5, 0.0, 0.0), 1.0);
        let metric = screen_size_metric(&sphere, Vec3::ZERO, 1.0);
        assert!(metric.is_infinite());
        assert_eq!(select_lod(&lods(&[0.8, 0.4]), metric), Some(0));
    }
}
