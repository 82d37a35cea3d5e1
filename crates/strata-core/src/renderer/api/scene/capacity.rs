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

//! Hard ceilings of the global scene buffers.

use std::fmt;

/// Maximum number of meshes.
pub const MAX_MESHES: u32 = 16_384;
/// Maximum number of mesh LOD records.
pub const MAX_MESH_LODS: u32 = 65_536;
/// Maximum number of instances.
pub const MAX_INSTANCES: u32 = 65_536;
/// Maximum number of skinned instances (bone palettes).
pub const MAX_SKINNED_INSTANCES: u32 = 4_096;
/// Maximum number of materials, the reserved sentinel slot included.
pub const MAX_MATERIALS: u32 = 65_536;
/// Size of the global vertex buffer in bytes.
pub const MAX_VERTEX_BYTES: u64 = 128 * 1024 * 1024;
/// Size of the global index buffer in bytes.
pub const MAX_INDEX_BYTES: u64 = 128 * 1024 * 1024;
/// Maximum number of unique render pipelines, i.e. draw batches.
pub const MAX_UNIQUE_PIPELINES: u32 = 128;

/// Material index meaning "use the pipeline's own material".
pub const SENTINEL_MATERIAL_INDEX: u32 = 0;

/// The class of record (or byte range) stored in a global scene buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneBufferClass {
    /// Mesh records.
    Mesh,
    /// Mesh LOD records.
    MeshLod,
    /// Instance records.
    Instance,
    /// Bone palettes of skinned instances.
    SkinnedInstance,
    /// Material records.
    Material,
    /// Vertex bytes.
    Vertex,
    /// Index bytes.
    Index,
    /// The unique pipeline table.
    Pipeline,
    /// The draw slots of a single pipeline batch.
    PipelineBatch,
}

impl SceneBufferClass {
    /// The hard ceiling for the class, in records or bytes.
    pub const fn ceiling(self) -> u64 {
        match self {
            SceneBufferClass::Mesh => MAX_MESHES as u64,
            SceneBufferClass::MeshLod => MAX_MESH_LODS as u64,
            SceneBufferClass::Instance => MAX_INSTANCES as u64,
            SceneBufferClass::SkinnedInstance => MAX_SKINNED_INSTANCES as u64,
            SceneBufferClass::Material => MAX_MATERIALS as u64,
            SceneBufferClass::Vertex => MAX_VERTEX_BYTES,
            SceneBufferClass::Index => MAX_INDEX_BYTES,
            SceneBufferClass::Pipeline => MAX_UNIQUE_PIPELINES as u64,
            SceneBufferClass::PipelineBatch => MAX_INSTANCES as u64,
        }
    }
}

impl fmt::Display for SceneBufferClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SceneBufferClass::Mesh => "mesh",
            SceneBufferClass::MeshLod => "mesh LOD",
            SceneBufferClass::Instance => "instance",
            SceneBufferClass::SkinnedInstance => "skinned instance",
            SceneBufferClass::Material => "material",
            SceneBufferClass::Vertex => "vertex",
            SceneBufferClass::Index => "index",
            SceneBufferClass::Pipeline => "pipeline",
            SceneBufferClass::PipelineBatch => "pipeline batch",
        };
        f.write_str(name)
    }
}
