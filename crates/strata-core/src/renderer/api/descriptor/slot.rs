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

//! Descriptor slot identity and lifecycle state.

use super::kind::DescriptorKind;
use crate::renderer::api::sync::FenceValue;

/// A slot in one of the heap's index spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorSlot {
    /// The index space the slot belongs to.
    pub kind: DescriptorKind,
    /// The index within that space.
    pub index: u32,
}

impl DescriptorSlot {
    /// Creates a new slot identity.
    pub const fn new(kind: DescriptorKind, index: u32) -> Self {
        Self { kind, index }
    }
}

/// Lifecycle of a heap slot.
///
/// `Free -> Occupied -> PendingRelease(fence) -> Free`. The last transition
/// only happens once the GPU has completed `fence`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotState {
    /// Available for allocation.
    #[default]
    Free,
    /// Owned by a live resource.
    Occupied,
    /// Released, waiting for the GPU to retire the tagged submission.
    PendingRelease(FenceValue),
}
