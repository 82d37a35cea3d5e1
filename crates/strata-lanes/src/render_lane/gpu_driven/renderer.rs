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


//! The orchestrator of the bindless core and the GPU-driven lane.

use super::frame::{FrameStage, FrameStateMachine};
use super::kernel::culling_params;
use super::lane::GpuDrivenLane;
use super::resources::GpuDrivenResources;
use crate::error::CullingError;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use strata_core::renderer::{
    BindlessSettings, CullingCamera, DescriptorError, DescriptorKinds, DeviceError, ExhaustionPolicy, FenceValue,
    GpuResource, GraphicsDevice, RenderPipelineId, RootLayouts,
};
use strata_data::descriptors::{BindlessHeap, ResourceDescriptorSet, SharedDescriptorSet};
use strata_data::scene::GlobalSceneBuffers;

/// How long `begin_frame` waits for a frame that is too far ahead when the
/// exhaustion policy carries no timeout of its own.
const DEFAULT_FRAME_WAIT: Duration = Duration::from_secs(2);

/// What one call to [`BindlessRenderer::render_frame`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    /// Zero-based index of the frame.
    pub frame_index: u64,
    /// The fence the frame's submission signals.
    pub fence: FenceValue,
    /// Instance slots the culling pass visited.
    pub instance_slots: u32,
    /// Culling workgroups dispatched.
    pub workgroups: u32,
    /// Batches that issued an indirect draw.
    pub batches: u32,
    /// Scene bytes uploaded before the frame.
    pub uploaded_bytes: u64,
}

/// Owns the descriptor heap, the scene buffers and the GPU-driven lane for
/// one device, and drives a frame from fence polling to submission.
///
/// All mutation happens through `&mut self` on the submission thread. Shared
/// descriptor sets may be dropped on any thread; their slots are collected at
/// the next [`begin_frame`](Self::begin_frame).
#[derive(Debug)]
pub struct BindlessRenderer {
    device: Arc<dyn GraphicsDevice>,
    settings: BindlessSettings,
    layouts: RootLayouts,
    heap: BindlessHeap,
    scene: GlobalSceneBuffers,
    resources: Option<GpuDrivenResources>,
    lane: GpuDrivenLane,
    frame: FrameStateMachine,
    in_flight: VecDeque<FenceValue>,
    frame_index: u64,
    lost: Option<String>,
}

impl BindlessRenderer {
    /// Validates `settings`, builds the root layouts and creates every
    /// GPU-side buffer of the GPU-driven path.
    /// ## Errors
    /// Settings, layout, descriptor and device errors are startup-fatal.
    pub fn new(device: Arc<dyn GraphicsDevice>, settings: BindlessSettings) -> Result<Self, CullingError> {
        settings.validate()?;
        let layouts = RootLayouts::build(&settings.heaps)?;
        let mut heap = BindlessHeap::new(&settings);
        let scene = GlobalSceneBuffers::new(&settings);

        // Everything created during startup is released with the first submission.
        heap.begin_submission(device.last_submitted_fence().next());
        let resources = GpuDrivenResources::new(device.as_ref(), &mut heap, &settings)?;
        let lane = match GpuDrivenLane::new(device.as_ref(), &layouts, settings.culling.workgroup_size) {
            Ok(lane) => lane,
            Err(err) => {
                resources.release(device.as_ref(), &mut heap);
                return Err(err);
            }
        };

        log::info!(
            "BindlessRenderer initialized: {} frame(s) in flight, {:?}",
            settings.frames_in_flight,
            settings.exhaustion_policy
        );
        Ok(Self {
            device,
            settings,
            layouts,
            heap,
            scene,
            resources: Some(resources),
            lane,
            frame: FrameStateMachine::new(),
            in_flight: VecDeque::new(),
            frame_index: 0,
            lost: None,
        })
    }

    // --- Accessors ---

    /// The device the renderer records for.
    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    /// The validated settings.
    pub fn settings(&self) -> &BindlessSettings {
        &self.settings
    }

    /// The two root layouts.
    pub fn layouts(&self) -> &RootLayouts {
        &self.layouts
    }

    /// The descriptor heap.
    pub fn heap(&self) -> &BindlessHeap {
        &self.heap
    }

    /// The global scene buffers.
    pub fn scene(&self) -> &GlobalSceneBuffers {
        &self.scene
    }

    /// Mutable access to the global scene buffers. Changes are uploaded by
    /// the next frame.
    pub fn scene_mut(&mut self) -> &mut GlobalSceneBuffers {
        &mut self.scene
    }

    /// The GPU-side buffers, `None` once shut down.
    pub fn resources(&self) -> Option<&GpuDrivenResources> {
        self.resources.as_ref()
    }

    /// The stage of the frame being recorded.
    pub fn frame_stage(&self) -> FrameStage {
        self.frame.stage()
    }

    /// Number of frames submitted so far.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Fences of the submissions not yet known to be complete.
    pub fn frames_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Returns `true` once the device was lost.
    pub fn is_device_lost(&self) -> bool {
        self.lost.is_some()
    }

    fn ensure_alive(&self) -> Result<(), CullingError> {
        match &self.lost {
            Some(reason) => Err(CullingError::RequiresReinitialization {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Routes a device result, turning device loss into [`on_device_lost`](Self::on_device_lost).
    fn checked<T>(&mut self, result: Result<T, DeviceError>) -> Result<T, CullingError> {
        result.map_err(|err| {
            if err.is_device_lost() {
                self.on_device_lost(&err.to_string());
            }
            CullingError::from(err)
        })
    }

    // --- Pipelines ---

    /// Creates a bindless draw pipeline and registers it as a new batch.
    /// ## Returns
    /// The batch index instances use as `pipeline_index`.
    pub fn create_render_pipeline(&mut self, label: &str) -> Result<u32, CullingError> {
        self.ensure_alive()?;
        let pipeline = GpuDrivenLane::create_render_pipeline(self.device.as_ref(), &self.layouts, label)?;
        Ok(self.scene.register_pipeline(pipeline)?)
    }

    /// Hot-reloads the pipeline of `batch`. Frames already submitted keep
    /// the previous pipeline.
    /// ## Returns
    /// The replaced pipeline.
    pub fn reload_render_pipeline(&mut self, batch: u32, label: &str) -> Result<RenderPipelineId, CullingError> {
        self.ensure_alive()?;
        let pipeline = GpuDrivenLane::create_render_pipeline(self.device.as_ref(), &self.layouts, label)?;
        let previous = self.scene.replace_pipeline(batch, pipeline)?;
        log::info!("Reloaded batch {batch}: {previous:?} -> {pipeline:?}");
        Ok(previous)
    }

    // --- Resource descriptors ---

    /// Configures heap views of `kinds` for `resource`.
    pub fn configure_resource(
        &mut self,
        resource: GpuResource,
        kinds: DescriptorKinds,
    ) -> Result<ResourceDescriptorSet, CullingError> {
        self.ensure_alive()?;
        let result = self.heap.configure(self.device.as_ref(), resource, kinds);
        self.checked_descriptor(result)
    }

    /// Points `set` at `new_resource`; see [`BindlessHeap::replace`].
    pub fn replace_resource(
        &mut self,
        set: &mut ResourceDescriptorSet,
        new_resource: GpuResource,
    ) -> Result<(), CullingError> {
        self.ensure_alive()?;
        let result = self.heap.replace(self.device.as_ref(), set, new_resource);
        self.checked_descriptor(result)
    }

    /// Releases the views of `set` once in-flight frames retire.
    pub fn release_resource(&mut self, set: ResourceDescriptorSet) -> Result<(), CullingError> {
        Ok(self.heap.release(set)?)
    }

    /// Turns `set` into an owner-counted set.
    pub fn share_resource(&self, set: ResourceDescriptorSet) -> SharedDescriptorSet {
        self.heap.share(set)
    }

    fn checked_descriptor<T>(
        &mut self,
        result: Result<T, DescriptorError>,
    ) -> Result<T, CullingError> {
        result.map_err(|err| {
            let err = CullingError::from(err);
            if err.is_device_lost() {
                self.on_device_lost(&err.to_string());
            }
            err
        })
    }

    // --- Frame flow ---

    fn frame_wait_timeout(&self) -> Duration {
        match self.settings.exhaustion_policy {
            ExhaustionPolicy::WaitForGpu { timeout_ms } => Duration::from_millis(timeout_ms),
            ExhaustionPolicy::Fail => DEFAULT_FRAME_WAIT,
        }
    }

    /// Opens the next submission.
    ///
    /// Polls the completed fence, waits while `frames_in_flight` frames are
    /// still running, tags later releases with the upcoming fence, turns
    /// dropped shared sets into releases and reclaims what the GPU retired.
    /// ## Returns
    /// The fence the next submission will signal.
    /// ## Errors
    /// * `CullingError::RequiresReinitialization` - if the device was lost before.
    /// * `DeviceError::DeviceLost` - if the device was lost just now.
    /// * `DeviceError::Timeout` - if an old frame did not finish in time.
    pub fn begin_frame(&mut self) -> Result<FenceValue, CullingError> {
        self.ensure_alive()?;
        let polled = self.device.completed_fence();
        let mut completed = self.checked(polled)?;
        self.in_flight.retain(|fence| *fence > completed);

        let max_in_flight = self.settings.frames_in_flight.max(1) as usize;
        while self.in_flight.len() >= max_in_flight {
            let Some(&oldest) = self.in_flight.front() else {
                break;
            };
            log::debug!("Frame throttle: waiting for {oldest}");
            let waited = self.device.wait_for(oldest, self.frame_wait_timeout());
            completed = self.checked(waited)?;
            self.in_flight.retain(|fence| *fence > completed);
        }

        let fence = self.device.last_submitted_fence().next();
        self.heap.begin_submission(fence);
        self.scene.begin_submission(fence);

        let collected = self.heap.collect_dropped()?;
        let reclaimed_slots = self.heap.reclaim(completed).len();
        let reclaimed_records = self.scene.reclaim(completed);
        if collected + reclaimed_slots + reclaimed_records > 0 {
            log::debug!(
                "Frame {}: {collected} dropped set(s), {reclaimed_slots} slot(s) and {reclaimed_records} scene range(s) reclaimed at {completed}",
                self.frame_index
            );
        }
        Ok(fence)
    }

    /// Uploads dirty scene data, culls and draws the scene from `camera`,
    /// then submits.
    pub fn render_frame(&mut self, camera: &CullingCamera) -> Result<FrameReport, CullingError> {
        let expected = self.begin_frame()?;
        let resources = self
            .resources
            .as_ref()
            .ok_or(CullingError::MissingResource("GPU-driven resources"))?;

        let mut uploaded_bytes = 0u64;
        let mut upload_result = Ok(());
        for upload in self.scene.take_uploads() {
            let Some(buffer) = resources.buffer_for(upload.class) else {
                log::warn!("No GPU buffer mirrors {} data; upload dropped", upload.class);
                continue;
            };
            if let Err(err) = self.device.write_buffer(buffer, upload.byte_offset, &upload.bytes) {
                upload_result = Err(err);
                break;
            }
            uploaded_bytes += upload.bytes.len() as u64;
        }
        if let Err(err) = upload_result {
            // Staged records are lost with the frame; resend them next time.
            self.scene.mark_all_dirty();
            return self.checked(Err(err));
        }

        let layout = resources.layout();
        let instance_slots = self.scene.instance_slot_count();
        let params = culling_params(
            camera,
            instance_slots,
            self.scene.mesh_slot_count(),
            self.scene.lod_slot_count(),
            &layout,
        );
        let params_buffer = resources.params_buffer();
        let batches: Vec<(u32, RenderPipelineId)> = self
            .scene
            .pipelines()
            .iter()
            .filter(|&(batch, _)| self.scene.batch_size(batch) > 0)
            .collect();

        let mut encoder = self.device.create_command_encoder(Some("gpu_driven_frame"));
        let encoded = self
            .lane
            .encode(encoder.as_mut(), resources, &mut self.frame, instance_slots, &batches);
        let workgroups = match encoded {
            Ok(workgroups) => workgroups,
            Err(err) => {
                self.frame.reset();
                return Err(err);
            }
        };

        let written = self
            .device
            .write_buffer(params_buffer, 0, bytemuck::bytes_of(&params));
        self.checked(written)?;
        let submitted = self.device.submit(encoder.finish());
        let fence = self.checked(submitted)?;
        if fence != expected {
            log::warn!("Frame {} signals {fence}, expected {expected}", self.frame_index);
        }
        self.in_flight.push_back(fence);

        let report = FrameReport {
            frame_index: self.frame_index,
            fence,
            instance_slots,
            workgroups,
            batches: batches.len() as u32,
            uploaded_bytes,
        };
        self.frame_index += 1;
        log::trace!("{report:?}");
        Ok(report)
    }

    /// Reacts to device loss: every deferred release is abandoned, the
    /// half-recorded frame is dropped and later calls fail with
    /// `CullingError::RequiresReinitialization`.
    pub fn on_device_lost(&mut self, reason: &str) {
        if self.lost.is_some() {
            return;
        }
        let slots = self.heap.abandon_pending();
        let records = self.scene.abandon_pending();
        self.in_flight.clear();
        self.frame.reset();
        log::error!(
            "Device lost ({reason}); abandoned {slots} pending slot(s) and {records} pending scene range(s)"
        );
        self.lost = Some(reason.to_owned());
    }

    /// Waits for the GPU to go idle and destroys the GPU-side buffers.
    pub fn shutdown(mut self) -> Result<(), CullingError> {
        self.ensure_alive()?;
        let last = self.device.last_submitted_fence();
        if last > FenceValue::ZERO {
            let waited = self.device.wait_for(last, self.frame_wait_timeout());
            self.checked(waited)?;
        }
        if let Some(resources) = self.resources.take() {
            resources.release(self.device.as_ref(), &mut self.heap);
        }
        log::info!("BindlessRenderer shut down after {} frame(s)", self.frame_index);
        Ok(())
    }
}
