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

//! A CPU-side GPU.
//!
//! Submissions queue up behind a fence timeline and only run when the
//! timeline is polled or waited on, so callers observe work in flight the
//! same way they would on hardware.

mod command;
mod device;
mod execute;
mod stats;

pub use self::command::{SoftwareCommandEncoder, SoftwareComputePass, SoftwareRenderPass};
pub use self::device::{ExecutionMode, SoftwareDevice};
pub use self::stats::{DrawRecord, ExecutionStats};
