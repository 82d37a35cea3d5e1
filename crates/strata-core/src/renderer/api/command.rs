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

//! Types used while recording GPU commands.

use crate::renderer::api::resource::{BufferId, ImageId};
use std::borrow::Cow;

/// An opaque handle to a finished command buffer, ready for submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandBufferId(pub u64);

/// Describes a compute pass.
#[derive(Debug, Clone, Default)]
pub struct ComputePassDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
}

/// Describes a render pass.
#[derive(Debug, Clone, Default)]
pub struct RenderPassDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// Color target, if any.
    pub color_target: Option<ImageId>,
    /// Depth target, if any.
    pub depth_target: Option<ImageId>,
}

/// How a buffer is accessed on one side of a barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceAccess {
    /// Written by a compute shader (including atomics).
    ComputeWrite,
    /// Read as indirect draw arguments or draw counts.
    IndirectArgument,
    /// Read by a shader through a read view.
    ShaderRead,
    /// Written by a copy, clear or queue write.
    TransferWrite,
}

/// Orders accesses to a set of buffers within one submission.
#[derive(Debug, Clone, Copy)]
pub struct BufferBarrier<'a> {
    /// The buffers the barrier applies to.
    pub buffers: &'a [BufferId],
    /// How the buffers were accessed before the barrier.
    pub before: ResourceAccess,
    /// How the buffers will be accessed after the barrier.
    pub after: ResourceAccess,
}
