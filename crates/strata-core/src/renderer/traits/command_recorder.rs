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

use crate::renderer::api::command::{
    BufferBarrier, CommandBufferId, ComputePassDescriptor, RenderPassDescriptor,
};
use crate::renderer::api::pipeline::{ComputePipelineId, InlineConstants, RenderPipelineId};
use crate::renderer::api::resource::BufferId;
use std::any::Any;

/// A trait representing an active render pass.
///
/// Geometry is never bound per draw: vertices are fetched through read views
/// and the per-draw state comes from the inline constants and the draw id.
pub trait RenderPass<'pass> {
    /// Sets the active render pipeline.
    fn set_pipeline(&mut self, pipeline: RenderPipelineId);

    /// Sets the inline constant block for subsequent draws.
    fn set_inline_constants(&mut self, constants: &InlineConstants);

    /// Binds the global index buffer (32-bit indices).
    fn set_index_buffer(&mut self, buffer: BufferId, offset: u64);

    /// Issues up to `max_count` indexed draws whose arguments start at
    /// `indirect_offset` and whose actual count is read by the GPU from
    /// `count_buffer` at `count_offset`.
    fn multi_draw_indexed_indirect_count(
        &mut self,
        indirect_buffer: BufferId,
        indirect_offset: u64,
        count_buffer: BufferId,
        count_offset: u64,
        max_count: u32,
    );
}

/// A trait representing an active compute pass.
pub trait ComputePass<'pass> {
    /// Sets the active compute pipeline.
    fn set_pipeline(&mut self, pipeline: ComputePipelineId);

    /// Sets the inline constant block for subsequent dispatches.
    fn set_inline_constants(&mut self, constants: &InlineConstants);

    /// Dispatches a grid of workgroups.
    fn dispatch_workgroups(&mut self, x: u32, y: u32, z: u32);
}

/// A trait for an object that records a sequence of GPU commands.
///
/// Only one pass can be active at a time: passes borrow the encoder
/// mutably and end when dropped.
pub trait CommandEncoder {
    /// Begins a new render pass.
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        descriptor: &RenderPassDescriptor<'encoder>,
    ) -> Box<dyn RenderPass<'encoder> + 'encoder>;

    /// Begins a new compute pass.
    fn begin_compute_pass<'encoder>(
        &'encoder mut self,
        descriptor: &ComputePassDescriptor<'encoder>,
    ) -> Box<dyn ComputePass<'encoder> + 'encoder>;

    /// Records a fill of `size` bytes (the rest of the buffer if `None`)
    /// with zeroes, executed on the GPU timeline.
    fn clear_buffer(&mut self, buffer: BufferId, offset: u64, size: Option<u64>);

    /// Records a buffer-to-buffer copy.
    fn copy_buffer_to_buffer(
        &mut self,
        source: BufferId,
        source_offset: u64,
        destination: BufferId,
        destination_offset: u64,
        size: u64,
    );

    /// Records an execution and memory barrier.
    fn barrier(&mut self, barrier: &BufferBarrier<'_>);

    /// Finalizes the recording.
    fn finish(self: Box<Self>) -> CommandBufferId;

    /// Returns a mutable reference to the underlying trait object as `Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
