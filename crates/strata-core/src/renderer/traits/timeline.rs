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

use crate::renderer::api::sync::FenceValue;
use crate::renderer::error::DeviceError;
use std::time::Duration;

/// The CPU's view of the GPU timeline.
///
/// Every submission signals the next [`FenceValue`]. The CPU never observes
/// GPU progress any other way.
pub trait GpuTimeline: Send + Sync {
    /// Returns the largest fence value the GPU has completed.
    /// ## Errors
    /// * `DeviceError::DeviceLost` - if the device was lost.
    fn completed_fence(&self) -> Result<FenceValue, DeviceError>;

    /// Returns the fence value signalled by the last submission.
    fn last_submitted_fence(&self) -> FenceValue;

    /// Blocks until `fence` is completed or `timeout` elapses.
    /// ## Returns
    /// The completed fence value, which is at least `fence`.
    /// ## Errors
    /// * `DeviceError::Timeout` - if the fence was not reached in time.
    /// * `DeviceError::DeviceLost` - if the device was lost.
    /// * `DeviceError::InvalidOperation` - if `fence` was never submitted.
    fn wait_for(&self, fence: FenceValue, timeout: Duration) -> Result<FenceValue, DeviceError>;
}
