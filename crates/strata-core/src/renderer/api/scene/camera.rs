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

//! The camera the culling pass tests instances against.

use crate::math::{Frustum, Mat4, Vec3};

/// View and projection of the camera driving a culling pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CullingCamera {
    /// World-to-view transform.
    pub view: Mat4,
    /// View-to-clip transform with a [0, 1] depth range.
    pub projection: Mat4,
    /// Camera position in world space.
    pub position: Vec3,
}

impl CullingCamera {
    /// Builds a perspective camera looking from `eye` at `target`.
    ///
    /// Returns `None` if the view matrix is degenerate.
    pub fn look_at(
        eye: Vec3,
        target: Vec3,
        fov_y_radians: f32,
        aspect_ratio: f32,
        z_near: f32,
        z_far: f32,
    ) -> Option<Self> {
        Some(Self {
            view: Mat4::look_at_rh(eye, target, Vec3::Y)?,
            projection: Mat4::perspective_rh_zo(fov_y_radians, aspect_ratio, z_near, z_far),
            position: eye,
        })
    }

    /// `projection * view`.
    #[inline]
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// The view frustum in world space.
    #[inline]
    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(&self.view_projection())
    }

    /// Vertical projection scale, `cot(fov_y / 2)` for a perspective projection.
    #[inline]
    pub fn lod_scale(&self) -> f32 {
        self.projection.cols[1].y
    }
}
