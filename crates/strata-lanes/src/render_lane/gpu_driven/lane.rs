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


//! Recording of one GPU-driven frame: clear, cull, barrier, indirect draws.

use super::batch::workgroup_count;
use super::constants::{CullConstants, DrawConstants};
use super::frame::{FrameStage, FrameStateMachine};
use super::kernel::GpuCullKernel;
use super::resources::GpuDrivenResources;
use crate::error::CullingError;
use crate::render_lane::shaders::{
    BINDLESS_DRAW_FRAGMENT_ENTRY, BINDLESS_DRAW_VERTEX_ENTRY, BINDLESS_DRAW_WGSL, GPU_CULL_ENTRY,
    GPU_CULL_WGSL,
};
use std::borrow::Cow;
use std::sync::Arc;
use strata_core::renderer::{
    BufferBarrier, CommandEncoder, ComputePassDescriptor, ComputePipelineDescriptor,
    ComputePipelineId, GraphicsDevice, ImageFormat, InlineConstants, RenderPassDescriptor,
    RenderPipelineDescriptor, RenderPipelineId, ResourceAccess, RootLayouts,
};

/// Workgroup size baked into `gpu_cull.wgsl`.
const SHADER_WORKGROUP_SIZE: u32 = 64;

/// The culling pipeline and the recipe of a frame.
#[derive(Debug)]
pub struct GpuDrivenLane {
    cull_pipeline: ComputePipelineId,
    workgroup_size: u32,
}

impl GpuDrivenLane {
    /// Creates the culling pipeline against the compute root layout.
    /// ## Errors
    /// * `LayoutError::Unsupported` - if the culling block does not fit the layout.
    /// * `DeviceError` - if the device refuses the pipeline.
    pub fn new<D>(device: &D, layouts: &RootLayouts, workgroup_size: u32) -> Result<Self, CullingError>
    where
        D: GraphicsDevice + ?Sized,
    {
        let workgroup_size = workgroup_size.max(1);
        let bindings = CullConstants::binding_request();
        let layout = layouts.resolve("gpu_cull", &bindings)?;

        let shader_source = if workgroup_size == SHADER_WORKGROUP_SIZE {
            Cow::Borrowed(GPU_CULL_WGSL)
        } else {
            Cow::Owned(GPU_CULL_WGSL.replace(
                &format!("@workgroup_size({SHADER_WORKGROUP_SIZE})"),
                &format!("@workgroup_size({workgroup_size})"),
            ))
        };
        let cull_pipeline = device.create_compute_pipeline(
            &ComputePipelineDescriptor {
                label: Some(Cow::Borrowed("gpu_cull")),
                shader_source,
                entry_point: Cow::Borrowed(GPU_CULL_ENTRY),
                bindings,
                kernel: Some(Arc::new(GpuCullKernel::new(workgroup_size))),
            },
            layout,
        )?;
        log::info!("GPU-driven lane ready (workgroup size {workgroup_size})");
        Ok(Self {
            cull_pipeline,
            workgroup_size,
        })
    }

    /// Creates a bindless draw pipeline against the graphics root layout.
    pub fn create_render_pipeline<D>(
        device: &D,
        layouts: &RootLayouts,
        label: &str,
    ) -> Result<RenderPipelineId, CullingError>
    where
        D: GraphicsDevice + ?Sized,
    {
        let bindings = DrawConstants::binding_request();
        let layout = layouts.resolve(label, &bindings)?;
        let id = device.create_render_pipeline(
            &RenderPipelineDescriptor {
                label: Some(Cow::Borrowed(label)),
                shader_source: Cow::Borrowed(BINDLESS_DRAW_WGSL),
                vertex_entry: Cow::Borrowed(BINDLESS_DRAW_VERTEX_ENTRY),
                fragment_entry: Some(Cow::Borrowed(BINDLESS_DRAW_FRAGMENT_ENTRY)),
                bindings,
                color_format: Some(ImageFormat::Rgba8UnormSrgb),
                depth_format: Some(ImageFormat::Depth32Float),
            },
            layout,
        )?;
        Ok(id)
    }

    /// The culling pipeline.
    pub fn cull_pipeline(&self) -> ComputePipelineId {
        self.cull_pipeline
    }

    /// Threads per culling workgroup.
    pub fn workgroup_size(&self) -> u32 {
        self.workgroup_size
    }

    /// Records one frame into `encoder`.
    ///
    /// `batches` lists the non-empty batches and their pipelines. Inline
    /// blocks are built before anything is recorded, so an error leaves the
    /// encoder untouched unless the frame machine itself rejects a step.
    /// ## Returns
    /// The number of culling workgroups dispatched.
    pub fn encode(
        &self,
        encoder: &mut dyn CommandEncoder,
        resources: &GpuDrivenResources,
        frame: &mut FrameStateMachine,
        instance_slots: u32,
        batches: &[(u32, RenderPipelineId)],
    ) -> Result<u32, CullingError> {
        if frame.stage() != FrameStage::Idle {
            return Err(CullingError::InvalidTransition {
                from: frame.stage(),
                to: FrameStage::Dispatched,
            });
        }
        let cull_block = resources.cull_constants()?.to_inline()?;
        let draw_blocks = batches
            .iter()
            .map(|&(batch, pipeline)| {
                let block = resources.draw_constants(batch)?.to_inline()?;
                Ok((batch, pipeline, block))
            })
            .collect::<Result<Vec<(u32, RenderPipelineId, InlineConstants)>, CullingError>>()?;
        let layout = resources.layout();
        let workgroups = workgroup_count(instance_slots, self.workgroup_size);

        // Counts are only ever cleared on the GPU timeline.
        encoder.clear_buffer(resources.draw_count_buffer(), 0, None);
        {
            let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                label: Some(Cow::Borrowed("gpu_cull")),
            });
            pass.set_pipeline(self.cull_pipeline);
            pass.set_inline_constants(&cull_block);
            if workgroups > 0 {
                pass.dispatch_workgroups(workgroups, 1, 1);
            }
        }
        frame.advance(FrameStage::Dispatched)?;

        let outputs = resources.culling_outputs();
        encoder.barrier(&BufferBarrier {
            buffers: &outputs,
            before: ResourceAccess::ComputeWrite,
            after: ResourceAccess::IndirectArgument,
        });
        frame.advance(FrameStage::Barrier)?;

        {
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some(Cow::Borrowed("gpu_driven_draw")),
                ..Default::default()
            });
            pass.set_index_buffer(resources.index_buffer(), 0);
            for (batch, pipeline, block) in &draw_blocks {
                pass.set_pipeline(*pipeline);
                pass.set_inline_constants(block);
                pass.multi_draw_indexed_indirect_count(
                    resources.draw_args_buffer(),
                    layout.args_offset(*batch),
                    resources.draw_count_buffer(),
                    layout.count_offset(*batch),
                    layout.batch_capacity(),
                );
            }
        }
        frame.advance(FrameStage::DrawIndirect)?;
        frame.advance(FrameStage::Idle)?;

        log::trace!(
            "Recorded GPU-driven frame: {workgroups} workgroup(s), {} batch(es)",
            draw_blocks.len()
        );
        Ok(workgroups)
    }
}
