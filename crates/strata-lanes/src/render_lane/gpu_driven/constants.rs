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


//! Inline constant blocks of the culling and draw pipelines.
//!
//! Both blocks carry nothing but heap indices (and the batch index for
//! draws); every other input lives behind a descriptor.

use strata_core::renderer::{
    DescriptorHandle, DescriptorKinds, DeviceError, GpuVisibleInstance, InlineConstants,
    LayoutError, LiteDescriptorHandle, PassBindingRequest,
};

/// Words in the culling block.
pub const CULL_CONSTANT_WORDS: u32 = 9;

/// Words in the draw block.
pub const DRAW_CONSTANT_WORDS: u32 = 9;

/// Inline constants of the culling kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CullConstants {
    /// Constant view of the [`GpuCullingParams`](strata_core::renderer::GpuCullingParams).
    pub params: LiteDescriptorHandle,
    /// Read view of the instance records.
    pub instances: LiteDescriptorHandle,
    /// Read view of the mesh records.
    pub meshes: LiteDescriptorHandle,
    /// Read view of the LOD records.
    pub lods: LiteDescriptorHandle,
    /// Read and write views of the visible instance records.
    pub visible: DescriptorHandle<GpuVisibleInstance>,
    /// Write view of the indirect draw arguments.
    pub draw_args: LiteDescriptorHandle,
    /// Write view of the per-batch draw counts.
    pub draw_counts: LiteDescriptorHandle,
    /// Write view of the draw slot to instance table.
    pub draw_ids: LiteDescriptorHandle,
}

impl CullConstants {
    /// What the culling pipeline binds.
    pub const fn binding_request() -> PassBindingRequest {
        PassBindingRequest::compute(CULL_CONSTANT_WORDS, DescriptorKinds::ALL)
    }

    /// Packs the block.
    pub fn to_inline(&self) -> Result<InlineConstants, LayoutError> {
        let mut block = InlineConstants::new();
        block
            .push_lite(self.params)?
            .push_lite(self.instances)?
            .push_lite(self.meshes)?
            .push_lite(self.lods)?
            .push_typed(self.visible)?
            .push_lite(self.draw_args)?
            .push_lite(self.draw_counts)?
            .push_lite(self.draw_ids)?;
        Ok(block)
    }

    /// Unpacks the block as seen by the kernel.
    /// ## Errors
    /// * `DeviceError::InvalidOperation` - if fewer words than needed were set.
    pub fn from_words(words: &[u32]) -> Result<Self, DeviceError> {
        let &[params, instances, meshes, lods, visible_read, visible_write, draw_args, draw_counts, draw_ids, ..] =
            words
        else {
            return Err(DeviceError::InvalidOperation(format!(
                "culling kernel needs {CULL_CONSTANT_WORDS} inline words, got {}",
                words.len()
            )));
        };
        Ok(Self {
            params: LiteDescriptorHandle::new(params),
            instances: LiteDescriptorHandle::new(instances),
            meshes: LiteDescriptorHandle::new(meshes),
            lods: LiteDescriptorHandle::new(lods),
            visible: DescriptorHandle::new(visible_read, visible_write),
            draw_args: LiteDescriptorHandle::new(draw_args),
            draw_counts: LiteDescriptorHandle::new(draw_counts),
            draw_ids: LiteDescriptorHandle::new(draw_ids),
        })
    }
}

/// Inline constants of a bindless draw pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawConstants {
    /// Constant view of the culling parameters (camera).
    pub params: LiteDescriptorHandle,
    /// Read view of the instance records.
    pub instances: LiteDescriptorHandle,
    /// Read view of the mesh records, for the vertex layout.
    pub meshes: LiteDescriptorHandle,
    /// Read view of the visible instance records.
    pub visible: LiteDescriptorHandle,
    /// Read view of the draw slot to instance table.
    pub draw_ids: LiteDescriptorHandle,
    /// Read view of the material records.
    pub materials: LiteDescriptorHandle,
    /// Read view of the raw vertex bytes.
    pub vertices: LiteDescriptorHandle,
    /// Read view of the bone palettes.
    pub skinning: LiteDescriptorHandle,
    /// The batch being drawn.
    pub batch_index: u32,
}

impl DrawConstants {
    /// What every bindless draw pipeline binds.
    pub const fn binding_request() -> PassBindingRequest {
        PassBindingRequest::graphics(
            DRAW_CONSTANT_WORDS,
            DescriptorKinds::CONSTANT_VIEW.with(DescriptorKinds::READ_VIEW),
        )
    }

    /// Packs the block.
    pub fn to_inline(&self) -> Result<InlineConstants, LayoutError> {
        let mut block = InlineConstants::new();
        block
            .push_lite(self.params)?
            .push_lite(self.instances)?
            .push_lite(self.meshes)?
            .push_lite(self.visible)?
            .push_lite(self.draw_ids)?
            .push_lite(self.materials)?
            .push_lite(self.vertices)?
            .push_lite(self.skinning)?
            .push_u32(self.batch_index)?;
        Ok(block)
    }
}
