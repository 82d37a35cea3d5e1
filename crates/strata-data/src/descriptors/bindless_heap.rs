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
use super::shared::{ReleaseRequest, SharedDescriptorSet};
use crate::allocators::DescriptorHeapAllocator;
use strata_core::renderer::{
    BindlessSettings, DescriptorError, DescriptorKind, DescriptorKinds, DescriptorSlot,
    FenceValue, GpuResource, GraphicsDevice, HeapStats, INVALID_DESCRIPTOR_INDEX,
};

/// Owns the descriptor heap bookkeeping for one device.
///
/// Constructed once at startup and passed by reference to whatever creates
/// or destroys GPU resources. All methods run on the submission thread; the
/// only cross-thread entry point is dropping a [`SharedDescriptorSet`].
#[derive(Debug)]
pub struct BindlessHeap {
    allocator: DescriptorHeapAllocator,
    drop_sender: flume::Sender<ReleaseRequest>,
    drop_receiver: flume::Receiver<ReleaseRequest>,
}

impl BindlessHeap {
    /// Creates the heap bookkeeping sized from `settings`.
    pub fn new(settings: &BindlessSettings) -> Self {
        let (drop_sender, drop_receiver) = flume::unbounded();
        Self {
            allocator: DescriptorHeapAllocator::new(settings),
            drop_sender,
            drop_receiver,
        }
    }

    /// Allocates one slot per kind in `kinds` for `resource` and writes the
    /// matching views into the device heap.
    ///
    /// Either every slot is configured or none is: slots allocated before a
    /// failure are returned to the heap immediately.
    /// ## Errors
    /// * `DescriptorError::EmptyUsage` - if `kinds` is empty.
    /// * `DescriptorError::InvalidDescriptorType` - if a kind cannot describe the resource.
    /// * `DescriptorError::HeapExhausted` - if a table has no free slot.
    /// * `DescriptorError::Device` - if the device rejected a descriptor write.
    pub fn configure<D>(
        &mut self,
        device: &D,
        resource: GpuResource,
        kinds: DescriptorKinds,
    ) -> Result<ResourceDescriptorSet, DescriptorError>
    where
        D: GraphicsDevice + ?Sized,
    {
        if kinds.is_empty() {
            return Err(DescriptorError::EmptyUsage);
        }
        let class = resource.class();
        if let Some(kind) = kinds.iter().find(|kind| !class.supports(*kind)) {
            return Err(DescriptorError::InvalidDescriptorType {
                kind,
                resource: class,
            });
        }

        let mut slots = [INVALID_DESCRIPTOR_INDEX; 3];
        for kind in kinds.iter() {
            let result = self
                .allocator
                .allocate_or_wait(kind, device)
                .and_then(|index| {
                    slots[kind.table_index()] = index;
                    device
                        .write_descriptor(kind, index, &resource)
                        .map_err(DescriptorError::from)
                });
            if let Err(err) = result {
                self.roll_back(&slots);
                log::warn!("Failed to configure {kinds:?} for {resource:?}: {err}");
                return Err(err);
            }
        }

        log::debug!("Configured {kinds:?} for {resource:?} at {slots:?}");
        Ok(ResourceDescriptorSet::new(resource, kinds, slots))
    }

    fn roll_back(&mut self, slots: &[u32; 3]) {
        for kind in DescriptorKind::ALL {
            let index = slots[kind.table_index()];
            if index == INVALID_DESCRIPTOR_INDEX {
                continue;
            }
            if let Err(err) = self.allocator.discard_unsubmitted(kind, index) {
                log::error!("Rollback of {kind} slot {index} failed: {err}");
            }
        }
    }

    /// Releases every slot of `set`. The slots become reusable once the
    /// current submission retires.
    /// ## Errors
    /// Returns the first failed release; the remaining slots are still released.
    pub fn release(&mut self, set: ResourceDescriptorSet) -> Result<(), DescriptorError> {
        self.release_slots(set.slots())
    }

    fn release_slots(
        &mut self,
        slots: impl Iterator<Item = DescriptorSlot>,
    ) -> Result<(), DescriptorError> {
        let mut first_error = None;
        for slot in slots {
            if let Err(err) = self.allocator.release(slot.kind, slot.index) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Points `set` at `new_resource`.
    ///
    /// The same kinds are configured on fresh slots and swapped into `set`;
    /// the previous slots are released through the deferred queue, so
    /// in-flight frames keep seeing the old resource. On failure `set` is
    /// left untouched.
    pub fn replace<D>(
        &mut self,
        device: &D,
        set: &mut ResourceDescriptorSet,
        new_resource: GpuResource,
    ) -> Result<(), DescriptorError>
    where
        D: GraphicsDevice + ?Sized,
    {
        let fresh = self.configure(device, new_resource, set.kinds())?;
        let previous = std::mem::replace(set, fresh);
        log::debug!(
            "Replaced {:?} with {:?}",
            previous.resource(),
            set.resource()
        );
        self.release(previous)
    }

    /// Turns `set` into an owner-counted set released when the last owner
    /// drops.
    pub fn share(&self, set: ResourceDescriptorSet) -> SharedDescriptorSet {
        SharedDescriptorSet::new(set, self.drop_sender.clone())
    }

    /// Defers the release of every shared set whose last owner dropped since
    /// the previous call.
    /// ## Returns
    /// The number of sets collected.
    pub fn collect_dropped(&mut self) -> Result<usize, DescriptorError> {
        let requests: Vec<ReleaseRequest> = self.drop_receiver.try_iter().collect();
        let mut first_error = None;
        for request in &requests {
            if let Err(err) = self.release_slots(request.slots()) {
                first_error.get_or_insert(err);
            }
        }
        if !requests.is_empty() {
            log::debug!("Collected {} dropped descriptor set(s)", requests.len());
        }
        first_error.map_or(Ok(requests.len()), Err)
    }

    /// Tags subsequent releases with `fence`.
    pub fn begin_submission(&mut self, fence: FenceValue) {
        self.allocator.begin_submission(fence);
    }

    /// Returns slots retired by `completed` to the free lists.
    pub fn reclaim(&mut self, completed: FenceValue) -> Vec<DescriptorSlot> {
        self.allocator.reclaim(completed)
    }

    /// Drops all deferred-release bookkeeping after device loss.
    pub fn abandon_pending(&mut self) -> usize {
        let stale: usize = self.drop_receiver.try_iter().count();
        stale + self.allocator.abandon_pending()
    }

    /// Occupancy of the table for `kind`.
    pub fn stats(&self, kind: DescriptorKind) -> HeapStats {
        self.allocator.stats(kind)
    }

    /// The underlying slot allocator.
    pub fn allocator(&self) -> &DescriptorHeapAllocator {
        &self.allocator
    }
}
