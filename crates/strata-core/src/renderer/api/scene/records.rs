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

//! `#[repr(C)]` records mirrored byte-for-byte into the global scene buffers.
//!
//! Every record here is read by the culling kernel and the bindless draw
//! shaders, so field order and padding must match `gpu_cull.wgsl`.

use crate::math::{BoundingSphere, Frustum, Mat4};
use crate::renderer::api::descriptor::INVALID_DESCRIPTOR_INDEX;
use crate::strata_bitflags;
use bytemuck::{Pod, Zeroable};

/// Maximum number of bones in a skinned instance's palette.
pub const MAX_BONES_PER_PALETTE: usize = 64;

/// Skinning index meaning "not skinned".
pub const NO_SKINNING: u32 = u32::MAX;

/// A mesh: its geometry location and the range of its LOD records.
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
#[repr(C)]
pub struct GpuMesh {
    /// Local-space bounding sphere as `[x, y, z, radius]`.
    pub bounding_sphere: [f32; 4],
    /// Byte offset of the first vertex in the global vertex buffer.
    pub vertex_byte_offset: u32,
    /// Size of one vertex in bytes.
    pub vertex_stride: u32,
    /// `vertex_byte_offset / vertex_stride`, written into draw arguments.
    pub base_vertex: i32,
    /// Index of the first LOD record.
    pub lod_base_index: u32,
    /// Number of LOD records, ordered by decreasing detail.
    pub lod_count: u32,
    /// Padding to 16-byte alignment.
    pub _pad: [u32; 3],
}

impl GpuMesh {
    /// The local-space bounding sphere.
    #[inline]
    pub fn bounds(&self) -> BoundingSphere {
        BoundingSphere::from_array(self.bounding_sphere)
    }
}

/// One level of detail of a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
#[repr(C)]
pub struct GpuMeshLod {
    /// First index, in elements, within the global index buffer.
    pub first_index: u32,
    /// Number of indices.
    pub index_count: u32,
    /// Minimum projected screen size at which this LOD is selected.
    pub screen_size_threshold: f32,
    /// Padding to 16-byte alignment.
    pub _pad: u32,
}

strata_bitflags! {
    /// Per-instance behavior flags.
    pub struct InstanceFlags: u32 {
        /// The instance takes part in culling and drawing.
        const ENABLED = 1 << 0;
        /// The instance references a bone palette.
        const SKINNED = 1 << 1;
        /// The instance bypasses the frustum test.
        const ALWAYS_VISIBLE = 1 << 2;
        /// The instance is drawn by shadow passes.
        const CAST_SHADOWS = 1 << 3;
    }
}

/// A placed mesh.
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
#[repr(C)]
pub struct GpuInstance {
    /// World transform, column-major.
    pub transform: [[f32; 4]; 4],
    /// Index into the mesh buffer.
    pub mesh_index: u32,
    /// Index into the material buffer, [`SENTINEL_MATERIAL_INDEX`] for the pipeline's own material.
    ///
    /// [`SENTINEL_MATERIAL_INDEX`]: super::capacity::SENTINEL_MATERIAL_INDEX
    pub material_index: u32,
    /// Index into the unique pipeline table, which is also the draw batch.
    pub pipeline_index: u32,
    /// Index into the bone palette buffer, or [`NO_SKINNING`].
    pub skinning_index: u32,
    /// Raw [`InstanceFlags`] bits.
    pub flags: u32,
    /// Padding to 16-byte alignment.
    pub _pad: [u32; 3],
}

impl GpuInstance {
    /// The world transform.
    #[inline]
    pub fn world_transform(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.transform)
    }

    /// The typed flags.
    #[inline]
    pub fn instance_flags(&self) -> InstanceFlags {
        InstanceFlags::from_bits_truncate(self.flags)
    }
}

/// Material parameters referenced by instances.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct GpuMaterial {
    /// Linear RGBA base color.
    pub base_color: [f32; 4],
    /// Read view index of the albedo texture, or [`INVALID_DESCRIPTOR_INDEX`].
    pub albedo_texture: u32,
    /// Read view index of the normal map, or [`INVALID_DESCRIPTOR_INDEX`].
    pub normal_texture: u32,
    /// Metalness factor.
    pub metallic: f32,
    /// Roughness factor.
    pub roughness: f32,
}

impl Default for GpuMaterial {
    fn default() -> Self {
        Self {
            base_color: [1.0, 1.0, 1.0, 1.0],
            albedo_texture: INVALID_DESCRIPTOR_INDEX,
            normal_texture: INVALID_DESCRIPTOR_INDEX,
            metallic: 0.0,
            roughness: 0.5,
        }
    }
}

/// Bone matrices of one skinned instance.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct GpuBonePalette {
    /// Number of bones in use.
    pub bone_count: u32,
    /// Padding to 16-byte alignment.
    pub _pad: [u32; 3],
    /// Skinning matrices, column-major.
    pub bones: [[[f32; 4]; 4]; MAX_BONES_PER_PALETTE],
}

/// One entry of the compacted per-frame visible list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
#[repr(C)]
pub struct GpuVisibleInstance {
    /// Index of the instance record.
    pub instance_index: u32,
    /// Absolute index of the selected LOD record.
    pub lod_index: u32,
    /// The batch (pipeline index) the instance was appended to.
    pub batch_index: u32,
    /// The draw slot written for this instance.
    pub draw_slot: u32,
}

/// Arguments of one indexed indirect draw.
///
/// Layout shared by D3D12, Vulkan and WebGPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
#[repr(C)]
pub struct GpuDrawIndexedIndirect {
    /// Number of indices to draw.
    pub index_count: u32,
    /// Number of instances to draw.
    pub instance_count: u32,
    /// First index within the index buffer.
    pub first_index: u32,
    /// Value added to each index before fetching vertices.
    pub base_vertex: i32,
    /// First instance id, used as the draw slot by the bindless shaders.
    pub first_instance: u32,
}

/// Per-frame constants read by the culling kernel through a constant view.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct GpuCullingParams {
    /// Camera view-projection, column-major.
    pub view_projection: [[f32; 4]; 4],
    /// Frustum planes as `[nx, ny, nz, d]`: left, right, bottom, top, near, far.
    pub frustum_planes: [[f32; 4]; 6],
    /// Camera world position, `w` unused.
    pub camera_position: [f32; 4],
    /// Projection scale (`projection[1][1]`) used by the screen-size metric.
    pub lod_scale: f32,
    /// Number of instance slots to test.
    pub instance_count: u32,
    /// Number of mesh slots.
    pub mesh_count: u32,
    /// Number of LOD slots.
    pub lod_count: u32,
    /// Draw slots reserved per batch.
    pub batch_capacity: u32,
    /// Number of batches (unique pipelines).
    pub batch_count: u32,
    /// Padding to 16-byte alignment.
    pub _pad: [u32; 2],
}

impl GpuCullingParams {
    /// The frustum described by the packed planes.
    #[inline]
    pub fn frustum(&self) -> Frustum {
        Frustum::from_arrays(&self.frustum_planes)
    }
}
