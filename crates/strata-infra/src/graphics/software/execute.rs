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

//! Replay of recorded command buffers against device memory.

use super::command::RecordedCommand;
use super::stats::{DrawRecord, ExecutionStats};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use strata_core::renderer::{
    BufferId, BufferUsage, ComputeKernel, ComputePipelineId, DescriptorKind, DeviceError,
    FenceValue, GpuDrawIndexedIndirect, GpuResource, ImageDescriptor, ImageFormat, ImageId,
    InlineConstants, KernelMemory, RenderPipelineId, ResourceAccess, RootLayout,
};

const DRAW_ARGS_STRIDE: u64 = std::mem::size_of::<GpuDrawIndexedIndirect>() as u64;

#[derive(Debug)]
pub(crate) struct SoftwareBuffer {
    label: Option<String>,
    size: u64,
    #[allow(dead_code)]
    usage: BufferUsage,
    /// Grown on first write; bytes past its end read as zero.
    data: Vec<u8>,
}

impl SoftwareBuffer {
    pub(crate) fn new(label: Option<String>, size: u64, usage: BufferUsage) -> Self {
        Self {
            label,
            size,
            usage,
            data: Vec::new(),
        }
    }

    pub(crate) fn check_range(&self, offset: u64, len: u64) -> Result<(), DeviceError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(DeviceError::OutOfBounds(format!(
                "{len} bytes at {offset} in buffer '{}' of {} bytes",
                self.label.as_deref().unwrap_or("unlabeled"),
                self.size
            ))),
        }
    }

    pub(crate) fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>, DeviceError> {
        self.check_range(offset, len)?;
        let mut out = vec![0u8; len as usize];
        let start = offset as usize;
        if start < self.data.len() {
            let end = (start + len as usize).min(self.data.len());
            out[..end - start].copy_from_slice(&self.data[start..end]);
        }
        Ok(out)
    }

    pub(crate) fn write(&mut self, offset: u64, bytes: &[u8]) -> Result<(), DeviceError> {
        self.check_range(offset, bytes.len() as u64)?;
        let start = offset as usize;
        let end = start + bytes.len();
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(bytes);
        Ok(())
    }

    fn clear(&mut self, offset: u64, len: u64) -> Result<(), DeviceError> {
        self.check_range(offset, len)?;
        let start = (offset as usize).min(self.data.len());
        let end = ((offset + len) as usize).min(self.data.len());
        self.data[start..end].fill(0);
        Ok(())
    }
}

#[derive(Debug)]
#[allow(dead_code)]
pub(crate) struct SoftwareImage {
    label: Option<String>,
    width: u32,
    height: u32,
    format: ImageFormat,
}

impl SoftwareImage {
    pub(crate) fn new(descriptor: &ImageDescriptor) -> Self {
        Self {
            label: descriptor.label.as_deref().map(str::to_owned),
            width: descriptor.width,
            height: descriptor.height,
            format: descriptor.format,
        }
    }
}

#[derive(Debug)]
pub(crate) struct ComputePipelineEntry {
    pub(crate) label: String,
    pub(crate) kernel: Option<Arc<dyn ComputeKernel>>,
    pub(crate) layout: RootLayout,
}

#[derive(Debug)]
pub(crate) struct RenderPipelineEntry {
    pub(crate) label: String,
    pub(crate) layout: RootLayout,
}

#[derive(Debug)]
pub(crate) struct StagedWrite {
    pub(crate) buffer: BufferId,
    pub(crate) offset: u64,
    pub(crate) data: Vec<u8>,
}

#[derive(Debug)]
pub(crate) struct Submission {
    pub(crate) fence: FenceValue,
    pub(crate) label: Option<String>,
    pub(crate) writes: Vec<StagedWrite>,
    pub(crate) commands: Vec<RecordedCommand>,
}

/// Everything the GPU can see.
#[derive(Debug)]
pub(crate) struct Memory {
    pub(crate) buffers: HashMap<BufferId, SoftwareBuffer>,
    pub(crate) images: HashMap<ImageId, SoftwareImage>,
    pub(crate) heaps: [Vec<Option<GpuResource>>; 3],
    pub(crate) compute_pipelines: HashMap<ComputePipelineId, ComputePipelineEntry>,
    pub(crate) render_pipelines: HashMap<RenderPipelineId, RenderPipelineEntry>,
    pub(crate) stats: ExecutionStats,
    pub(crate) draws: Vec<DrawRecord>,
    pub(crate) record_draws: bool,
}

impl Memory {
    pub(crate) fn new(heaps: [Vec<Option<GpuResource>>; 3]) -> Self {
        Self {
            buffers: HashMap::new(),
            images: HashMap::new(),
            heaps,
            compute_pipelines: HashMap::new(),
            render_pipelines: HashMap::new(),
            stats: ExecutionStats::default(),
            draws: Vec::new(),
            record_draws: true,
        }
    }

    pub(crate) fn buffer(&self, id: BufferId) -> Result<&SoftwareBuffer, DeviceError> {
        self.buffers
            .get(&id)
            .ok_or_else(|| DeviceError::ResourceNotFound(format!("{id:?}")))
    }

    fn buffer_mut(&mut self, id: BufferId) -> Result<&mut SoftwareBuffer, DeviceError> {
        self.buffers
            .get_mut(&id)
            .ok_or_else(|| DeviceError::ResourceNotFound(format!("{id:?}")))
    }
}

/// Bindless view of device memory handed to compute kernels.
struct HeapMemory<'a> {
    buffers: &'a mut HashMap<BufferId, SoftwareBuffer>,
    heaps: &'a [Vec<Option<GpuResource>>; 3],
    /// Buffers written since the last compute-to-indirect barrier.
    written: &'a mut HashSet<BufferId>,
}

impl HeapMemory<'_> {
    fn view(&self, kind: DescriptorKind, index: u32, offset: u64, len: u64) -> Result<BufferId, DeviceError> {
        match self.heaps[kind.table_index()].get(index as usize) {
            Some(Some(GpuResource::Buffer { id, size, .. })) => {
                if offset.checked_add(len).is_some_and(|end| end <= *size) {
                    Ok(*id)
                } else {
                    Err(DeviceError::OutOfBounds(format!(
                        "{len} bytes at {offset} through {kind} slot {index} ({size} bytes)"
                    )))
                }
            }
            Some(Some(GpuResource::Image { .. })) => Err(DeviceError::InvalidOperation(format!(
                "{kind} slot {index} holds an image"
            ))),
            Some(None) => Err(DeviceError::ResourceNotFound(format!("{kind} slot {index} is empty"))),
            None => Err(DeviceError::OutOfBounds(format!("{kind} slot {index}"))),
        }
    }

    fn target(&mut self, index: u32, offset: u64, len: u64) -> Result<(BufferId, &mut SoftwareBuffer), DeviceError> {
        let id = self.view(DescriptorKind::WriteView, index, offset, len)?;
        let buffer = self
            .buffers
            .get_mut(&id)
            .ok_or_else(|| DeviceError::ResourceNotFound(format!("{id:?} behind write view {index}")))?;
        Ok((id, buffer))
    }
}

impl KernelMemory for HeapMemory<'_> {
    fn read(&self, kind: DescriptorKind, index: u32, offset: u64, len: u64) -> Result<Vec<u8>, DeviceError> {
        let id = self.view(kind, index, offset, len)?;
        self.buffers
            .get(&id)
            .ok_or_else(|| DeviceError::ResourceNotFound(format!("{id:?} behind {kind} {index}")))?
            .read(offset, len)
    }

    fn write(&mut self, index: u32, offset: u64, data: &[u8]) -> Result<(), DeviceError> {
        let (id, buffer) = self.target(index, offset, data.len() as u64)?;
        buffer.write(offset, data)?;
        self.written.insert(id);
        Ok(())
    }

    fn atomic_add_u32(&mut self, index: u32, offset: u64, value: u32) -> Result<u32, DeviceError> {
        let (id, buffer) = self.target(index, offset, 4)?;
        let bytes = buffer.read(offset, 4)?;
        let previous = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        buffer.write(offset, &previous.wrapping_add(value).to_le_bytes())?;
        self.written.insert(id);
        Ok(previous)
    }
}

#[derive(Debug, Default)]
struct PassState {
    compute_pipeline: Option<ComputePipelineId>,
    render_pipeline: Option<RenderPipelineId>,
    constants: InlineConstants,
    index_buffer: Option<(BufferId, u64)>,
    unsynced: HashSet<BufferId>,
}

/// Replays one submission. Any error faults the whole device.
pub(crate) fn run(memory: &mut Memory, submission: Submission) -> Result<(), DeviceError> {
    let Submission {
        fence,
        label,
        writes,
        commands,
    } = submission;

    for write in writes {
        memory.buffer_mut(write.buffer)?.write(write.offset, &write.data)?;
        memory.stats.bytes_uploaded += write.data.len() as u64;
    }

    let mut state = PassState::default();
    for command in commands {
        match command {
            RecordedCommand::BeginComputePass { .. } | RecordedCommand::BeginRenderPass { .. } => {
                state.compute_pipeline = None;
                state.render_pipeline = None;
                state.constants = InlineConstants::new();
            }
            RecordedCommand::SetComputePipeline(id) => {
                if !memory.compute_pipelines.contains_key(&id) {
                    return Err(DeviceError::ResourceNotFound(format!("{id:?}")));
                }
                state.compute_pipeline = Some(id);
            }
            RecordedCommand::SetRenderPipeline(id) => {
                if !memory.render_pipelines.contains_key(&id) {
                    return Err(DeviceError::ResourceNotFound(format!("{id:?}")));
                }
                state.render_pipeline = Some(id);
            }
            RecordedCommand::SetInlineConstants(constants) => state.constants = constants,
            RecordedCommand::SetIndexBuffer { buffer, offset } => {
                memory.buffer(buffer)?;
                state.index_buffer = Some((buffer, offset));
            }
            RecordedCommand::Dispatch(groups) => dispatch(memory, &mut state, groups)?,
            RecordedCommand::MultiDrawIndexedIndirectCount {
                indirect_buffer,
                indirect_offset,
                count_buffer,
                count_offset,
                max_count,
            } => {
                for buffer in [indirect_buffer, count_buffer] {
                    if state.unsynced.contains(&buffer) {
                        memory.stats.barrier_hazards += 1;
                        log::error!(
                            "SoftwareDevice: {buffer:?} read as indirect arguments without a barrier after compute wrote it"
                        );
                    }
                }
                let bytes = memory.buffer(count_buffer)?.read(count_offset, 4)?;
                let count = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                if count > max_count {
                    log::warn!("SoftwareDevice: draw count {count} clamped to {max_count}");
                }
                draw_indirect(memory, &state, fence, indirect_buffer, indirect_offset, count.min(max_count))?;
            }
            RecordedCommand::ClearBuffer {
                buffer,
                offset,
                size,
            } => {
                let target = memory.buffer_mut(buffer)?;
                let len = size.unwrap_or(target.size.saturating_sub(offset));
                target.clear(offset, len)?;
            }
            RecordedCommand::CopyBufferToBuffer {
                source,
                source_offset,
                destination,
                destination_offset,
                size,
            } => {
                let bytes = memory.buffer(source)?.read(source_offset, size)?;
                memory.buffer_mut(destination)?.write(destination_offset, &bytes)?;
            }
            RecordedCommand::Barrier {
                buffers, before, ..
            } => {
                if before == ResourceAccess::ComputeWrite {
                    for buffer in &buffers {
                        state.unsynced.remove(buffer);
                    }
                }
            }
        }
    }

    memory.stats.submissions += 1;
    log::trace!(
        "SoftwareDevice: executed '{}' ({fence})",
        label.as_deref().unwrap_or("unlabeled")
    );
    Ok(())
}

fn dispatch(memory: &mut Memory, state: &mut PassState, groups: [u32; 3]) -> Result<(), DeviceError> {
    let id = state
        .compute_pipeline
        .ok_or_else(|| DeviceError::InvalidOperation("dispatch without a compute pipeline".to_owned()))?;
    let entry = memory
        .compute_pipelines
        .get(&id)
        .ok_or_else(|| DeviceError::ResourceNotFound(format!("{id:?}")))?;
    if state.constants.byte_len() > entry.layout.inline_constant_bytes {
        return Err(DeviceError::InvalidOperation(format!(
            "'{}' was given {} inline bytes, its layout allows {}",
            entry.label,
            state.constants.byte_len(),
            entry.layout.inline_constant_bytes
        )));
    }
    let kernel = entry.kernel.clone().ok_or_else(|| {
        DeviceError::InvalidOperation(format!("compute pipeline '{}' has no CPU kernel", entry.label))
    })?;

    let mut view = HeapMemory {
        buffers: &mut memory.buffers,
        heaps: &memory.heaps,
        written: &mut state.unsynced,
    };
    kernel.dispatch(groups, state.constants.words(), &mut view)?;

    memory.stats.dispatches += 1;
    memory.stats.workgroups += groups.iter().map(|&g| u64::from(g)).product::<u64>();
    Ok(())
}

fn draw_indirect(
    memory: &mut Memory,
    state: &PassState,
    fence: FenceValue,
    indirect_buffer: BufferId,
    indirect_offset: u64,
    count: u32,
) -> Result<(), DeviceError> {
    let pipeline = state
        .render_pipeline
        .ok_or_else(|| DeviceError::InvalidOperation("draw without a render pipeline".to_owned()))?;
    if let Some(entry) = memory.render_pipelines.get(&pipeline) {
        if state.constants.byte_len() > entry.layout.inline_constant_bytes {
            return Err(DeviceError::InvalidOperation(format!(
                "'{}' was given {} inline bytes",
                entry.label,
                state.constants.byte_len()
            )));
        }
    }
    let bytes = memory
        .buffer(indirect_buffer)?
        .read(indirect_offset, u64::from(count) * DRAW_ARGS_STRIDE)?;
    let index_limit = match state.index_buffer {
        Some((buffer, offset)) => Some(memory.buffer(buffer)?.size.saturating_sub(offset) / 4),
        None => None,
    };

    memory.stats.multi_draw_calls += 1;
    for (draw_index, chunk) in bytes.chunks_exact(DRAW_ARGS_STRIDE as usize).enumerate() {
        let args: GpuDrawIndexedIndirect = bytemuck::pod_read_unaligned(chunk);
        let end = u64::from(args.first_index) + u64::from(args.index_count);
        if index_limit.is_some_and(|limit| end > limit) {
            memory.stats.out_of_range_draws += 1;
            log::warn!("SoftwareDevice: draw {draw_index} reads indices up to {end}, past the index buffer");
        }
        memory.stats.draws += 1;
        memory.stats.instances += u64::from(args.instance_count);
        memory.stats.indices += u64::from(args.index_count);
        if memory.record_draws {
            memory.draws.push(DrawRecord {
                submission: fence.0,
                pipeline: Some(pipeline),
                draw_index: draw_index as u32,
                args,
                constants: state.constants,
            });
        }
    }
    Ok(())
}
