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

use crate::renderer::api::descriptor::DescriptorKind;
use crate::renderer::error::DeviceError;
use std::fmt::Debug;

/// Bindless access to GPU memory from a host-executed kernel.
///
/// Buffers are reached only through heap indices, exactly as a shader
/// would reach them.
pub trait KernelMemory {
    /// Reads `len` bytes at `offset` from the buffer behind heap slot
    /// `index` of table `kind`.
    /// ## Errors
    /// * `DeviceError::ResourceNotFound` - if the slot is empty or not a buffer.
    /// * `DeviceError::OutOfBounds` - if the range exceeds the buffer.
    fn read(&self, kind: DescriptorKind, index: u32, offset: u64, len: u64) -> Result<Vec<u8>, DeviceError>;

    /// Writes `data` at `offset` into the buffer behind write view `index`.
    fn write(&mut self, index: u32, offset: u64, data: &[u8]) -> Result<(), DeviceError>;

    /// Atomically adds `value` to the `u32` at `offset` of the buffer behind
    /// write view `index`, returning the previous value.
    fn atomic_add_u32(&mut self, index: u32, offset: u64, value: u32) -> Result<u32, DeviceError>;
}

/// A compute kernel executed on the host by backends without a shader
/// compiler, against the same bindless inputs the shader version reads.
pub trait ComputeKernel: Send + Sync + Debug {
    /// A short name for logs.
    fn label(&self) -> &str;

    /// Threads per workgroup along X.
    fn workgroup_size(&self) -> u32;

    /// Runs `workgroups[0] * workgroups[1] * workgroups[2]` workgroups.
    /// ## Arguments
    /// * `workgroups` - The dispatch size.
    /// * `constants` - The inline constant words set on the pass.
    /// * `memory` - Bindless access to buffers.
    fn dispatch(
        &self,
        workgroups: [u32; 3],
        constants: &[u32],
        memory: &mut dyn KernelMemory,
    ) -> Result<(), DeviceError>;
}
