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


//! Built-in shader sources of the GPU-driven path.
//!
//! Both shaders reach every resource through the bindless heap: one
//! binding array per descriptor kind, indexed by the inline constant block.
//! The word layouts of the inline blocks match
//! [`CullConstants`](crate::render_lane::gpu_driven::CullConstants) and
//! [`DrawConstants`](crate::render_lane::gpu_driven::DrawConstants).

/// Frustum and LOD culling compute shader, entry point [`GPU_CULL_ENTRY`].
pub const GPU_CULL_WGSL: &str = include_str!("gpu_cull.wgsl");

/// Compute entry point of [`GPU_CULL_WGSL`].
pub const GPU_CULL_ENTRY: &str = "cs_cull";

/// Vertex-pulling draw shader for indirect batches.
pub const BINDLESS_DRAW_WGSL: &str = include_str!("bindless_draw.wgsl");

/// Vertex entry point of [`BINDLESS_DRAW_WGSL`].
pub const BINDLESS_DRAW_VERTEX_ENTRY: &str = "vs_main";

/// Fragment entry point of [`BINDLESS_DRAW_WGSL`].
pub const BINDLESS_DRAW_FRAGMENT_ENTRY: &str = "fs_main";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_lane::gpu_driven::{CULL_CONSTANT_WORDS, DRAW_CONSTANT_WORDS};
    use std::mem::offset_of;
    use strata_core::renderer::GpuMesh;

    fn push_constant_fields(source: &str, block: &str) -> usize {
        let start = source
            .find(&format!("struct {block} {{"))
            .expect("push constant struct");
        let body = &source[start..];
        let end = body.find('}').expect("struct end");
        body[..end].matches(": u32").count()
    }

    #[test]
    fn test_gpu_cull_shader_valid() {
        assert!(GPU_CULL_WGSL.contains("@compute"));
        assert!(GPU_CULL_WGSL.contains(&format!("fn {GPU_CULL_ENTRY}(")));
        assert!(GPU_CULL_WGSL.contains("atomicAdd"));
    }

    #[test]
    fn test_bindless_draw_shader_valid() {
        assert!(BINDLESS_DRAW_WGSL.contains("@vertex"));
        assert!(BINDLESS_DRAW_WGSL.contains("@fragment"));
        assert!(BINDLESS_DRAW_WGSL.contains(&format!("fn {BINDLESS_DRAW_VERTEX_ENTRY}(")));
        assert!(BINDLESS_DRAW_WGSL.contains(&format!("fn {BINDLESS_DRAW_FRAGMENT_ENTRY}(")));
    }

    #[test]
    fn inline_blocks_match_the_host_layouts() {
        assert_eq!(
            push_constant_fields(GPU_CULL_WGSL, "CullConstants"),
            CULL_CONSTANT_WORDS as usize
        );
        assert_eq!(
            push_constant_fields(BINDLESS_DRAW_WGSL, "DrawConstants"),
            DRAW_CONSTANT_WORDS as usize
        );
    }

    #[test]
    fn vertex_pulling_follows_the_mesh_record() {
        let word = |field: usize| field / 4;
        for (name, offset) in [
            ("vertex_byte_offset", word(offset_of!(GpuMesh, vertex_byte_offset))),
            ("vertex_stride", word(offset_of!(GpuMesh, vertex_stride))),
            ("base_vertex", word(offset_of!(GpuMesh, base_vertex))),
        ] {
            let read = format!("read_u32(pc.meshes, mesh + {offset}u)");
            assert!(BINDLESS_DRAW_WGSL.contains(&read), "{name} is not read at word {offset}");
        }
        assert_eq!(std::mem::size_of::<GpuMesh>() / 4, 12);
        assert!(BINDLESS_DRAW_WGSL.contains("const MESH_WORDS: u32 = 12u;"));
    }
}
