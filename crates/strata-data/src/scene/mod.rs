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

//! GPU-resident scene storage: meshes, LODs, instances, materials, bone
//! palettes, the shared vertex and index buffers, and the pipeline table.

mod buffers;
mod pipeline_table;
mod upload;

pub use self::buffers::{
    GlobalSceneBuffers, MeshDescriptor, MeshLodDescriptor, SceneBufferStats,
};
pub use self::pipeline_table::PipelineTable;
pub use self::upload::SceneUpload;
