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


//! # Strata Lanes
//!
//! Hot-path execution for the GPU-driven renderer: the culling kernel, LOD
//! selection, the per-frame state machine, the lane that records culling and
//! indirect draws, and the [`BindlessRenderer`] that ties the descriptor heap,
//! the scene buffers and a device together.

#![warn(missing_docs)]

pub mod error;
pub mod render_lane;

pub use error::CullingError;
pub use render_lane::gpu_driven::{BindlessRenderer, FrameReport};
