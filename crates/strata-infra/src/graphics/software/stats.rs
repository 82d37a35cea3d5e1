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

use std::fmt;
use strata_core::renderer::{GpuDrawIndexedIndirect, InlineConstants, RenderPipelineId};

/// One draw the device executed from an indirect argument buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawRecord {
    /// The fence of the submission that issued the draw.
    pub submission: u64,
    /// The pipeline bound when the draw ran.
    pub pipeline: Option<RenderPipelineId>,
    /// Position of the draw within its multi-draw call.
    pub draw_index: u32,
    /// The arguments read from the indirect buffer.
    pub args: GpuDrawIndexedIndirect,
    /// The inline constants bound when the draw ran.
    pub constants: InlineConstants,
}

/// Counters accumulated over every executed submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutionStats {
    /// Submissions that ran to completion.
    pub submissions: u64,
    /// Compute dispatches.
    pub dispatches: u64,
    /// Workgroups launched by those dispatches.
    pub workgroups: u64,
    /// Multi-draw-indirect-count calls.
    pub multi_draw_calls: u64,
    /// Individual draws issued by those calls.
    pub draws: u64,
    /// Sum of the instance counts of all draws.
    pub instances: u64,
    /// Sum of the index counts of all draws.
    pub indices: u64,
    /// Indirect reads of a buffer written by compute with no barrier in between.
    pub barrier_hazards: u64,
    /// Draws whose index range fell outside the bound index buffer.
    pub out_of_range_draws: u64,
    /// Bytes written by staged buffer writes.
    pub bytes_uploaded: u64,
}

impl fmt::Display for ExecutionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} submission(s), {} dispatch(es) / {} workgroup(s), {} multi-draw(s) / {} draw(s), {} uploaded byte(s), {} hazard(s)",
            self.submissions,
            self.dispatches,
            self.workgroups,
            self.multi_draw_calls,
            self.draws,
            self.bytes_uploaded,
            self.barrier_hazards
        )
    }
}
