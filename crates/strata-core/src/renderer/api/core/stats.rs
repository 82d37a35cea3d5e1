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

//! Occupancy statistics exposed for logging and tests.

use crate::renderer::api::descriptor::DescriptorKind;
use std::fmt;

/// Occupancy of one descriptor heap table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    /// The table's kind.
    pub kind: DescriptorKind,
    /// Total slots.
    pub capacity: u32,
    /// Slots owned by live resources.
    pub occupied: u32,
    /// Slots waiting for their release fence.
    pub pending_release: u32,
}

impl HeapStats {
    /// Slots available for allocation right now.
    #[inline]
    pub fn free(&self) -> u32 {
        self.capacity - self.occupied - self.pending_release
    }
}

impl fmt::Display for HeapStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}/{} occupied, {} pending, {} free",
            self.kind,
            self.occupied,
            self.capacity,
            self.pending_release,
            self.free()
        )
    }
}
