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


//! GPU-driven culling and indirect draw.
//!
//! # Architecture
//!
//! One frame is one submission with two stages:
//!
//! 1. **Culling (compute pass)**: one thread per instance slot tests the
//!    world-space bounding sphere against the camera frustum, picks a LOD from
//!    the projected screen size and appends an indirect draw to the batch of
//!    the instance's pipeline.
//! 2. **Drawing (render pass)**: after a compute-to-indirect barrier, every
//!    non-empty batch issues a single `multi_draw_indexed_indirect_count`
//!    whose count the GPU reads from the culling output.
//!
//! The CPU never reads the counts back. Its per-frame work is uploading dirty
//! scene ranges, writing the culling parameters and recording the commands.

mod batch;
mod constants;
mod frame;
mod kernel;
mod lane;
mod lod;
mod renderer;
mod resources;

pub use self::batch::{workgroup_count, DrawSlotLayout, DRAW_ARGS_STRIDE, DRAW_COUNT_STRIDE};
pub use self::constants::{CullConstants, DrawConstants, CULL_CONSTANT_WORDS, DRAW_CONSTANT_WORDS};
pub use self::frame::{FrameStage, FrameStateMachine};
pub use self::kernel::{culling_params, GpuCullKernel};
pub use self::lane::GpuDrivenLane;
pub use self::lod::{screen_size_metric, select_lod};
pub use self::renderer::{BindlessRenderer, FrameReport};
pub use self::resources::GpuDrivenResources;
