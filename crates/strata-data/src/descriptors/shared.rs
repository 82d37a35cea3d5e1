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

use super::set::ResourceDescriptorSet;
use std::ops::Deref;
use std::sync::Arc;
use strata_core::renderer::{DescriptorKind, DescriptorSlot, INVALID_DESCRIPTOR_INDEX};

/// Sent when the last owner of a [`SharedDescriptorSet`] goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseRequest {
    /// Slot index per table, `INVALID_DESCRIPTOR_INDEX` where the set had no slot.
    pub slots: [u32; 3],
}

impl ReleaseRequest {
    /// The slots to release.
    pub fn slots(&self) -> impl Iterator<Item = DescriptorSlot> + '_ {
        DescriptorKind::ALL
            .into_iter()
            .filter(|kind| self.slots[kind.table_index()] != INVALID_DESCRIPTOR_INDEX)
            .map(|kind| DescriptorSlot::new(kind, self.slots[kind.table_index()]))
    }
}

#[derive(Debug)]
struct SharedInner {
    set: ResourceDescriptorSet,
    on_drop: flume::Sender<ReleaseRequest>,
}

impl Drop for SharedInner {
    fn drop(&mut self) {
        let request = ReleaseRequest {
            slots: self.set.raw_slots(),
        };
        if self.on_drop.send(request).is_err() {
            // The heap is gone, and its slots with it.
            log::debug!("Shared descriptor set dropped after its heap");
        }
    }
}

/// A descriptor set with several owners.
///
/// Cloning is cheap. When the last clone is dropped, on any thread, the slots
/// are queued for release; the heap picks them up in
/// [`BindlessHeap::collect_dropped`](super::BindlessHeap::collect_dropped) and
/// defers them like any other release.
#[derive(Debug, Clone)]
pub struct SharedDescriptorSet {
    inner: Arc<SharedInner>,
}

impl SharedDescriptorSet {
    pub(crate) fn new(set: ResourceDescriptorSet, on_drop: flume::Sender<ReleaseRequest>) -> Self {
        Self {
            inner: Arc::new(SharedInner { set, on_drop }),
        }
    }

    /// Number of live owners.
    pub fn owner_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl Deref for SharedDescriptorSet {
    type Target = ResourceDescriptorSet;

    fn deref(&self) -> &Self::Target {
        &self.inner.set
    }
}
