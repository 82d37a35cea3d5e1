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

use super::command_recorder::CommandEncoder;
use super::timeline::GpuTimeline;
use crate::renderer::api::command::CommandBufferId;
use crate::renderer::api::descriptor::DescriptorKind;
use crate::renderer::api::pipeline::{
    ComputePipelineDescriptor, ComputePipelineId, RenderPipelineDescriptor, RenderPipelineId,
    RootLayout,
};
use crate::renderer::api::resource::{BufferDescriptor, BufferId, GpuResource, ImageDescriptor, ImageId};
use crate::renderer::api::sync::FenceValue;
use crate::renderer::error::DeviceError;
use std::fmt::Debug;

/// The backend contract of the bindless core.
///
/// A device owns GPU memory, the descriptor heap tables and the submission
/// queue. It is shared behind `Arc` and every method takes `&self`.
pub trait GraphicsDevice: GpuTimeline + Debug + 'static {
    /// Creates a new GPU buffer.
    /// ## Arguments
    /// * `descriptor` - Size, usage and label of the buffer.
    /// ## Returns
    /// The ID of the created buffer.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, DeviceError>;

    /// Destroys a GPU buffer. The caller guarantees no in-flight submission
    /// still references it.
    fn destroy_buffer(&self, id: BufferId) -> Result<(), DeviceError>;

    /// Schedules a write of `data` at `offset`. The write lands before the
    /// next submission executes and after every earlier one.
    /// ## Errors
    /// * `DeviceError::ResourceNotFound` - if the buffer does not exist.
    /// * `DeviceError::OutOfBounds` - if the range exceeds the buffer.
    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), DeviceError>;

    /// Creates a new GPU image.
    fn create_image(&self, descriptor: &ImageDescriptor) -> Result<ImageId, DeviceError>;

    /// Destroys a GPU image.
    fn destroy_image(&self, id: ImageId) -> Result<(), DeviceError>;

    /// Writes the view of `resource` into heap slot `index` of table `kind`.
    /// ## Errors
    /// * `DeviceError::OutOfBounds` - if `index` is outside the table.
    /// * `DeviceError::ResourceNotFound` - if the resource does not exist.
    fn write_descriptor(
        &self,
        kind: DescriptorKind,
        index: u32,
        resource: &GpuResource,
    ) -> Result<(), DeviceError>;

    /// Creates a compute pipeline against the compute root layout.
    fn create_compute_pipeline(
        &self,
        descriptor: &ComputePipelineDescriptor,
        layout: &RootLayout,
    ) -> Result<ComputePipelineId, DeviceError>;

    /// Creates a render pipeline against the graphics root layout.
    fn create_render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor,
        layout: &RootLayout,
    ) -> Result<RenderPipelineId, DeviceError>;

    /// Creates a new command encoder.
    fn create_command_encoder(&self, label: Option<&str>) -> Box<dyn CommandEncoder>;

    /// Submits a finished command buffer.
    /// ## Returns
    /// The fence value the submission signals when the GPU completes it.
    /// ## Errors
    /// * `DeviceError::DeviceLost` - if the device was lost.
    /// * `DeviceError::ResourceNotFound` - if the command buffer is unknown.
    fn submit(&self, command_buffer: CommandBufferId) -> Result<FenceValue, DeviceError>;
}
