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

use super::command::{RecordedCommand, SoftwareCommandEncoder};
use super::execute::{self, Memory, SoftwareBuffer, SoftwareImage, StagedWrite, Submission};
use super::stats::{DrawRecord, ExecutionStats};
use bytemuck::Pod;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use strata_core::renderer::{
    BufferDescriptor, BufferId, CommandBufferId, CommandEncoder, ComputePipelineDescriptor,
    ComputePipelineId, DescriptorHeapSettings, DescriptorKind, DeviceError, FenceValue,
    GpuResource, GpuTimeline, GraphicsDevice, ImageDescriptor, ImageId, RenderPipelineDescriptor,
    RenderPipelineId, RootLayout, RootLayoutKind,
};

/// When queued submissions run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Submissions run when the timeline is polled or waited on.
    #[default]
    Deferred,
    /// Submissions run inside `submit`.
    Immediate,
}

#[derive(Debug)]
struct Timeline {
    mode: ExecutionMode,
    last_submitted: FenceValue,
    completed: FenceValue,
    queue: VecDeque<Submission>,
    staged_writes: Vec<StagedWrite>,
    lost: Option<String>,
    stalled: bool,
}

impl Timeline {
    fn check_alive(&self) -> Result<(), DeviceError> {
        match &self.lost {
            Some(reason) => Err(DeviceError::DeviceLost {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// The internal, non-clonable state of the [`SoftwareDevice`].
#[derive(Debug)]
pub struct SoftwareDeviceInternal {
    memory: Mutex<Memory>,
    timeline: Mutex<Timeline>,
    /// Command buffers that have been finished but not yet submitted.
    pending_command_buffers: Mutex<HashMap<CommandBufferId, (Option<String>, Vec<RecordedCommand>)>>,

    next_buffer_id: AtomicUsize,
    next_image_id: AtomicUsize,
    next_pipeline_id: AtomicU64,
    command_buffer_id_counter: AtomicU64,
}

/// A clonable handle to an in-process GPU.
///
/// Memory, descriptor heaps and pipelines live behind the handle; command
/// buffers are replayed on the CPU in submission order. Compute pipelines
/// need a [`ComputeKernel`](strata_core::renderer::ComputeKernel) since no
/// shader source is compiled. A submission that faults during replay loses
/// the device, as a GPU hang would.
#[derive(Clone, Debug)]
pub struct SoftwareDevice {
    internal: Arc<SoftwareDeviceInternal>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SoftwareDevice {
    /// Creates a deferred-execution device whose heap tables match `heaps`.
    pub fn new(heaps: &DescriptorHeapSettings) -> Self {
        Self::with_mode(heaps, ExecutionMode::Deferred)
    }

    /// Creates a device with an explicit execution mode.
    pub fn with_mode(heaps: &DescriptorHeapSettings, mode: ExecutionMode) -> Self {
        let tables = DescriptorKind::ALL.map(|kind| vec![None; heaps.capacity(kind) as usize]);
        log::info!(
            "SoftwareDevice: created ({mode:?}, heaps {}/{}/{})",
            tables[0].len(),
            tables[1].len(),
            tables[2].len()
        );
        Self {
            internal: Arc::new(SoftwareDeviceInternal {
                memory: Mutex::new(Memory::new(tables)),
                timeline: Mutex::new(Timeline {
                    mode,
                    last_submitted: FenceValue::ZERO,
                    completed: FenceValue::ZERO,
                    queue: VecDeque::new(),
                    staged_writes: Vec::new(),
                    lost: None,
                    stalled: false,
                }),
                pending_command_buffers: Mutex::new(HashMap::new()),
                next_buffer_id: AtomicUsize::new(0),
                next_image_id: AtomicUsize::new(0),
                next_pipeline_id: AtomicU64::new(0),
                command_buffer_id_counter: AtomicU64::new(0),
            }),
        }
    }

    fn memory(&self) -> MutexGuard<'_, Memory> {
        lock(&self.internal.memory)
    }

    fn timeline(&self) -> MutexGuard<'_, Timeline> {
        lock(&self.internal.timeline)
    }

    fn generate_pipeline_id(&self) -> u64 {
        self.internal.next_pipeline_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn register_command_buffer(
        &self,
        label: Option<String>,
        commands: Vec<RecordedCommand>,
    ) -> CommandBufferId {
        let id = CommandBufferId(
            self.internal
                .command_buffer_id_counter
                .fetch_add(1, Ordering::Relaxed),
        );
        lock(&self.internal.pending_command_buffers).insert(id, (label, commands));
        id
    }

    /// Runs queued submissions up to and including `target`.
    fn execute_through(&self, target: FenceValue) -> Result<FenceValue, DeviceError> {
        let mut timeline = self.timeline();
        loop {
            timeline.check_alive()?;
            if !matches!(timeline.queue.front(), Some(s) if s.fence <= target) {
                break;
            }
            let Some(submission) = timeline.queue.pop_front() else {
                break;
            };
            let fence = submission.fence;
            let result = execute::run(&mut self.memory(), submission);
            match result {
                Ok(()) => timeline.completed = fence,
                Err(err) => {
                    let reason = format!("submission {fence} faulted: {err}");
                    log::error!("SoftwareDevice: {reason}");
                    timeline.lost = Some(reason.clone());
                    timeline.queue.clear();
                    return Err(DeviceError::DeviceLost { reason });
                }
            }
        }
        Ok(timeline.completed)
    }

    // --- Timeline control ---

    /// Runs every queued submission, as if the GPU caught up.
    pub fn poll(&self) -> Result<FenceValue, DeviceError> {
        let target = self.timeline().last_submitted;
        self.execute_through(target)
    }

    /// Runs only the oldest queued submission.
    pub fn step(&self) -> Result<FenceValue, DeviceError> {
        let target = {
            let timeline = self.timeline();
            timeline.check_alive()?;
            match timeline.queue.front() {
                Some(submission) => submission.fence,
                None => return Ok(timeline.completed),
            }
        };
        self.execute_through(target)
    }

    /// Number of submitted but not yet executed submissions.
    pub fn pending_submissions(&self) -> usize {
        self.timeline().queue.len()
    }

    /// Switches between deferred and immediate execution.
    pub fn set_execution_mode(&self, mode: ExecutionMode) {
        self.timeline().mode = mode;
    }

    /// Loses the device: queued work is dropped and every later timeline
    /// query or submission fails with `DeviceLost`.
    pub fn lose_device(&self, reason: &str) {
        let mut timeline = self.timeline();
        log::error!("SoftwareDevice: device lost ({reason})");
        timeline.lost = Some(reason.to_owned());
        timeline.queue.clear();
        timeline.staged_writes.clear();
    }

    /// While stalled, waits on unfinished fences time out.
    pub fn set_stalled(&self, stalled: bool) {
        self.timeline().stalled = stalled;
    }

    // --- Inspection ---

    /// Reads buffer contents as left by the last executed submission.
    pub fn read_buffer(&self, id: BufferId, offset: u64, len: u64) -> Result<Vec<u8>, DeviceError> {
        self.memory().buffer(id)?.read(offset, len)
    }

    /// Reads `count` records of `T` starting at record `first`.
    pub fn read_records<T: Pod>(&self, id: BufferId, first: u64, count: u64) -> Result<Vec<T>, DeviceError> {
        let stride = std::mem::size_of::<T>() as u64;
        let bytes = self.read_buffer(id, first * stride, count * stride)?;
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }

    /// The resource written into a heap slot, if any.
    pub fn descriptor(&self, kind: DescriptorKind, index: u32) -> Option<GpuResource> {
        self.memory().heaps[kind.table_index()]
            .get(index as usize)
            .copied()
            .flatten()
    }

    /// Execution counters so far.
    pub fn stats(&self) -> ExecutionStats {
        self.memory().stats
    }

    /// Returns and clears the draws executed so far.
    pub fn take_draw_records(&self) -> Vec<DrawRecord> {
        std::mem::take(&mut self.memory().draws)
    }

    /// Turns per-draw recording on or off. Counters are always kept.
    pub fn set_record_draws(&self, record: bool) {
        self.memory().record_draws = record;
    }

    /// Number of live buffers.
    pub fn buffer_count(&self) -> usize {
        self.memory().buffers.len()
    }

    fn create_pipeline_entry(
        &self,
        label: &str,
        layout: &RootLayout,
        expected: RootLayoutKind,
    ) -> Result<(), DeviceError> {
        if layout.kind != expected {
            return Err(DeviceError::InvalidOperation(format!(
                "pipeline '{label}' needs the {expected:?} root layout, got {:?}",
                layout.kind
            )));
        }
        self.timeline().check_alive()
    }
}

impl GpuTimeline for SoftwareDevice {
    fn completed_fence(&self) -> Result<FenceValue, DeviceError> {
        let timeline = self.timeline();
        timeline.check_alive()?;
        Ok(timeline.completed)
    }

    fn last_submitted_fence(&self) -> FenceValue {
        self.timeline().last_submitted
    }

    fn wait_for(&self, fence: FenceValue, timeout: Duration) -> Result<FenceValue, DeviceError> {
        {
            let timeline = self.timeline();
            timeline.check_alive()?;
            if fence > timeline.last_submitted {
                return Err(DeviceError::InvalidOperation(format!(
                    "waiting for {fence}, but the last submission is {}",
                    timeline.last_submitted
                )));
            }
            if fence <= timeline.completed {
                return Ok(timeline.completed);
            }
            if timeline.stalled {
                log::warn!("SoftwareDevice: wait for {fence} timed out");
                return Err(DeviceError::Timeout {
                    waiting_for: fence,
                    completed: timeline.completed,
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        }
        self.execute_through(fence)
    }
}

impl GraphicsDevice for SoftwareDevice {
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, DeviceError> {
        let id = BufferId(self.internal.next_buffer_id.fetch_add(1, Ordering::Relaxed));
        let label = descriptor.label.as_deref().map(str::to_owned);
        log::debug!(
            "SoftwareDevice: created buffer '{}' ({id:?}, {} bytes)",
            label.as_deref().unwrap_or("unlabeled"),
            descriptor.size
        );
        self.memory()
            .buffers
            .insert(id, SoftwareBuffer::new(label, descriptor.size, descriptor.usage));
        Ok(id)
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), DeviceError> {
        self.memory()
            .buffers
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| DeviceError::ResourceNotFound(format!("{id:?}")))
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), DeviceError> {
        self.memory()
            .buffer(id)?
            .check_range(offset, data.len() as u64)?;
        let mut timeline = self.timeline();
        timeline.check_alive()?;
        timeline.staged_writes.push(StagedWrite {
            buffer: id,
            offset,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn create_image(&self, descriptor: &ImageDescriptor) -> Result<ImageId, DeviceError> {
        let id = ImageId(self.internal.next_image_id.fetch_add(1, Ordering::Relaxed));
        self.memory().images.insert(id, SoftwareImage::new(descriptor));
        Ok(id)
    }

    fn destroy_image(&self, id: ImageId) -> Result<(), DeviceError> {
        self.memory()
            .images
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| DeviceError::ResourceNotFound(format!("{id:?}")))
    }

    fn write_descriptor(
        &self,
        kind: DescriptorKind,
        index: u32,
        resource: &GpuResource,
    ) -> Result<(), DeviceError> {
        let mut memory = self.memory();
        let exists = match resource {
            GpuResource::Buffer { id, size, .. } => {
                memory.buffer(*id)?.check_range(0, *size)?;
                true
            }
            GpuResource::Image { id } => memory.images.contains_key(id),
        };
        if !exists {
            return Err(DeviceError::ResourceNotFound(format!("{resource:?}")));
        }
        if !resource.class().supports(kind) {
            return Err(DeviceError::InvalidOperation(format!(
                "a {kind} cannot describe {resource:?}"
            )));
        }
        let table = &mut memory.heaps[kind.table_index()];
        let capacity = table.len();
        let slot = table.get_mut(index as usize).ok_or_else(|| {
            DeviceError::OutOfBounds(format!("{kind} slot {index} (table size {capacity})"))
        })?;
        *slot = Some(*resource);
        Ok(())
    }

    fn create_compute_pipeline(
        &self,
        descriptor: &ComputePipelineDescriptor,
        layout: &RootLayout,
    ) -> Result<ComputePipelineId, DeviceError> {
        let label = descriptor.label.as_deref().unwrap_or("compute").to_owned();
        self.create_pipeline_entry(&label, layout, RootLayoutKind::Compute)?;
        if descriptor.kernel.is_none() {
            log::warn!("SoftwareDevice: compute pipeline '{label}' has no CPU kernel; dispatching it will fault");
        }
        let id = ComputePipelineId(self.generate_pipeline_id());
        self.memory().compute_pipelines.insert(
            id,
            execute::ComputePipelineEntry {
                label,
                kernel: descriptor.kernel.clone(),
                layout: *layout,
            },
        );
        Ok(id)
    }

    fn create_render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor,
        layout: &RootLayout,
    ) -> Result<RenderPipelineId, DeviceError> {
        let label = descriptor.label.as_deref().unwrap_or("render").to_owned();
        self.create_pipeline_entry(&label, layout, RootLayoutKind::Graphics)?;
        let id = RenderPipelineId(self.generate_pipeline_id());
        log::debug!("SoftwareDevice: created render pipeline '{label}' ({id:?})");
        self.memory().render_pipelines.insert(
            id,
            execute::RenderPipelineEntry {
                label,
                layout: *layout,
            },
        );
        Ok(id)
    }

    fn create_command_encoder(&self, label: Option<&str>) -> Box<dyn CommandEncoder> {
        Box::new(SoftwareCommandEncoder {
            label: label.map(str::to_owned),
            commands: Vec::new(),
            device: self.clone(),
        })
    }

    fn submit(&self, command_buffer: CommandBufferId) -> Result<FenceValue, DeviceError> {
        let (label, commands) = lock(&self.internal.pending_command_buffers)
            .remove(&command_buffer)
            .ok_or_else(|| DeviceError::ResourceNotFound(format!("{command_buffer:?}")))?;

        let (fence, mode) = {
            let mut timeline = self.timeline();
            timeline.check_alive()?;
            let fence = timeline.last_submitted.next();
            let writes = std::mem::take(&mut timeline.staged_writes);
            timeline.queue.push_back(Submission {
                fence,
                label,
                writes,
                commands,
            });
            timeline.last_submitted = fence;
            (fence, timeline.mode)
        };
        log::trace!("SoftwareDevice: submitted {command_buffer:?} as {fence}");

        if mode == ExecutionMode::Immediate {
            self.execute_through(fence)?;
        }
        Ok(fence)
    }
}
