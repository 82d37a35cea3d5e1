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

use super::device::SoftwareDevice;
use std::any::Any;
use strata_core::renderer::{
    BufferBarrier, BufferId, CommandBufferId, CommandEncoder, ComputePass, ComputePassDescriptor,
    ComputePipelineId, InlineConstants, RenderPass, RenderPassDescriptor, RenderPipelineId,
    ResourceAccess,
};

/// One recorded command, replayed when its submission executes.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RecordedCommand {
    BeginComputePass {
        label: Option<String>,
    },
    BeginRenderPass {
        label: Option<String>,
    },
    SetComputePipeline(ComputePipelineId),
    SetRenderPipeline(RenderPipelineId),
    SetInlineConstants(InlineConstants),
    SetIndexBuffer {
        buffer: BufferId,
        offset: u64,
    },
    Dispatch([u32; 3]),
    MultiDrawIndexedIndirectCount {
        indirect_buffer: BufferId,
        indirect_offset: u64,
        count_buffer: BufferId,
        count_offset: u64,
        max_count: u32,
    },
    ClearBuffer {
        buffer: BufferId,
        offset: u64,
        size: Option<u64>,
    },
    CopyBufferToBuffer {
        source: BufferId,
        source_offset: u64,
        destination: BufferId,
        destination_offset: u64,
        size: u64,
    },
    Barrier {
        buffers: Vec<BufferId>,
        before: ResourceAccess,
        after: ResourceAccess,
    },
}

/// A render pass being recorded.
pub struct SoftwareRenderPass<'a> {
    commands: &'a mut Vec<RecordedCommand>,
}

impl<'pass> RenderPass<'pass> for SoftwareRenderPass<'pass> {
    fn set_pipeline(&mut self, pipeline: RenderPipelineId) {
        self.commands.push(RecordedCommand::SetRenderPipeline(pipeline));
    }

    fn set_inline_constants(&mut self, constants: &InlineConstants) {
        self.commands
            .push(RecordedCommand::SetInlineConstants(*constants));
    }

    fn set_index_buffer(&mut self, buffer: BufferId, offset: u64) {
        self.commands
            .push(RecordedCommand::SetIndexBuffer { buffer, offset });
    }

    fn multi_draw_indexed_indirect_count(
        &mut self,
        indirect_buffer: BufferId,
        indirect_offset: u64,
        count_buffer: BufferId,
        count_offset: u64,
        max_count: u32,
    ) {
        self.commands
            .push(RecordedCommand::MultiDrawIndexedIndirectCount {
                indirect_buffer,
                indirect_offset,
                count_buffer,
                count_offset,
                max_count,
            });
    }
}

/// A compute pass being recorded.
pub struct SoftwareComputePass<'a> {
    commands: &'a mut Vec<RecordedCommand>,
}

impl<'pass> ComputePass<'pass> for SoftwareComputePass<'pass> {
    fn set_pipeline(&mut self, pipeline: ComputePipelineId) {
        self.commands
            .push(RecordedCommand::SetComputePipeline(pipeline));
    }

    fn set_inline_constants(&mut self, constants: &InlineConstants) {
        self.commands
            .push(RecordedCommand::SetInlineConstants(*constants));
    }

    fn dispatch_workgroups(&mut self, x: u32, y: u32, z: u32) {
        self.commands.push(RecordedCommand::Dispatch([x, y, z]));
    }
}

/// Records commands into a list the device replays at execution time.
#[derive(Debug)]
pub struct SoftwareCommandEncoder {
    pub(crate) label: Option<String>,
    pub(crate) commands: Vec<RecordedCommand>,
    pub(crate) device: SoftwareDevice,
}

impl SoftwareCommandEncoder {
    /// Number of commands recorded so far.
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }
}

impl CommandEncoder for SoftwareCommandEncoder {
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        descriptor: &RenderPassDescriptor<'encoder>,
    ) -> Box<dyn RenderPass<'encoder> + 'encoder> {
        self.commands.push(RecordedCommand::BeginRenderPass {
            label: descriptor.label.as_deref().map(str::to_owned),
        });
        Box::new(SoftwareRenderPass {
            commands: &mut self.commands,
        })
    }

    fn begin_compute_pass<'encoder>(
        &'encoder mut self,
        descriptor: &ComputePassDescriptor<'encoder>,
    ) -> Box<dyn ComputePass<'encoder> + 'encoder> {
        self.commands.push(RecordedCommand::BeginComputePass {
            label: descriptor.label.as_deref().map(str::to_owned),
        });
        Box::new(SoftwareComputePass {
            commands: &mut self.commands,
        })
    }

    fn clear_buffer(&mut self, buffer: BufferId, offset: u64, size: Option<u64>) {
        self.commands.push(RecordedCommand::ClearBuffer {
            buffer,
            offset,
            size,
        });
    }

    fn copy_buffer_to_buffer(
        &mut self,
        source: BufferId,
        source_offset: u64,
        destination: BufferId,
        destination_offset: u64,
        size: u64,
    ) {
        self.commands.push(RecordedCommand::CopyBufferToBuffer {
            source,
            source_offset,
            destination,
            destination_offset,
            size,
        });
    }

    fn barrier(&mut self, barrier: &BufferBarrier<'_>) {
        self.commands.push(RecordedCommand::Barrier {
            buffers: barrier.buffers.to_vec(),
            before: barrier.before,
            after: barrier.after,
        });
    }

    fn finish(self: Box<Self>) -> CommandBufferId {
        let this = *self;
        this.device.register_command_buffer(this.label, this.commands)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
