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

use strata_core::renderer::{
    DescriptorError, DescriptorHandle, DescriptorKind, DescriptorKinds, DescriptorSlot,
    GpuResource, LiteDescriptorHandle, INVALID_DESCRIPTOR_INDEX,
};

/// The heap slots owned by one GPU resource, one per configured kind.
///
/// A set is created by [`BindlessHeap::configure`] and must be handed back to
/// [`BindlessHeap::release`] (or shared and dropped) when the resource is
/// destroyed; it does not release anything on its own.
///
/// [`BindlessHeap::configure`]: super::BindlessHeap::configure
/// [`BindlessHeap::release`]: super::BindlessHeap::release
#[derive(Debug, PartialEq, Eq)]
#[must_use = "descriptor slots leak unless the set is released"]
pub struct ResourceDescriptorSet {
    resource: GpuResource,
    kinds: DescriptorKinds,
    slots: [u32; 3],
}

impl ResourceDescriptorSet {
    pub(crate) fn new(resource: GpuResource, kinds: DescriptorKinds, slots: [u32; 3]) -> Self {
        Self {
            resource,
            kinds,
            slots,
        }
    }

    /// The resource the slots describe.
    pub fn resource(&self) -> &GpuResource {
        &self.resource
    }

    /// The kinds this set was configured with.
    pub fn kinds(&self) -> DescriptorKinds {
        self.kinds
    }

    /// Returns the heap index for `kind`.
    /// ## Errors
    /// * `DescriptorError::InvalidDescriptorType` - if `kind` can never describe this resource.
    /// * `DescriptorError::UsageNotConfigured` - if the resource was not created with `kind`.
    pub fn get_index(&self, kind: DescriptorKind) -> Result<u32, DescriptorError> {
        let class = self.resource.class();
        if !class.supports(kind) {
            return Err(DescriptorError::InvalidDescriptorType {
                kind,
                resource: class,
            });
        }
        if !self.kinds.has(kind) {
            return Err(DescriptorError::UsageNotConfigured { kind });
        }
        Ok(self.slots[kind.table_index()])
    }

    /// A single-index handle for `kind`.
    pub fn lite_handle(&self, kind: DescriptorKind) -> Result<LiteDescriptorHandle, DescriptorError> {
        self.get_index(kind).map(LiteDescriptorHandle::new)
    }

    /// A typed handle pairing the read view with the write view, if any.
    /// ## Errors
    /// * `DescriptorError::UsageNotConfigured` - if the set has no read view.
    pub fn typed_handle<T>(&self) -> Result<DescriptorHandle<T>, DescriptorError> {
        let read = self.get_index(DescriptorKind::ReadView)?;
        let write = self
            .get_index(DescriptorKind::WriteView)
            .unwrap_or(INVALID_DESCRIPTOR_INDEX);
        Ok(DescriptorHandle::new(read, write))
    }

    /// Iterates over the owned slots in table order.
    pub fn slots(&self) -> impl Iterator<Item = DescriptorSlot> + '_ {
        self.kinds
            .iter()
            .map(move |kind| DescriptorSlot::new(kind, self.slots[kind.table_index()]))
    }

    pub(crate) fn raw_slots(&self) -> [u32; 3] {
        self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::renderer::{BufferId, ImageId, ResourceClass};

    fn buffer_set(kinds: DescriptorKinds) -> ResourceDescriptorSet {
        let resource = GpuResource::Buffer {
            id: BufferId(1),
            size: 256,
            stride: 16,
        };
        let mut slots = [INVALID_DESCRIPTOR_INDEX; 3];
        for kind in kinds.iter() {
            slots[kind.table_index()] = 10 + kind.table_index() as u32;
        }
        ResourceDescriptorSet::new(resource, kinds, slots)
    }

    #[test]
    fn read_only_buffer_rejects_constant_view_lookup() {
        let set = buffer_set(DescriptorKinds::READ_VIEW);
        assert_eq!(set.get_index(DescriptorKind::ReadView), Ok(11));
        assert_eq!(
            set.get_index(DescriptorKind::ConstantView),
            Err(DescriptorError::UsageNotConfigured {
                kind: DescriptorKind::ConstantView
            })
        );
    }

    #[test]
    fn image_constant_view_is_an_invalid_type_even_if_flagged() {
        let set = ResourceDescriptorSet::new(
            GpuResource::Image { id: ImageId(3) },
            DescriptorKinds::READ_VIEW | DescriptorKinds::CONSTANT_VIEW,
            [0, 0, INVALID_DESCRIPTOR_INDEX],
        );
        assert_eq!(
            set.get_index(DescriptorKind::ConstantView),
            Err(DescriptorError::InvalidDescriptorType {
                kind: DescriptorKind::ConstantView,
                resource: ResourceClass::Image
            })
        );
    }

    #[test]
    fn typed_handle_carries_both_views() {
        struct Particles;
        let set = buffer_set(DescriptorKinds::READ_VIEW | DescriptorKinds::WRITE_VIEW);
        let handle = set.typed_handle::<Particles>().unwrap();
        assert_eq!(handle.read_index(), 11);
        assert_eq!(handle.write_index(), 12);

        let read_only = buffer_set(DescriptorKinds::READ_VIEW);
        assert!(!read_only.typed_handle::<Particles>().unwrap().is_writable());
    }

    #[test]
    fn slots_follow_table_order() {
        let set = buffer_set(DescriptorKinds::WRITE_VIEW | DescriptorKinds::CONSTANT_VIEW);
        let slots: Vec<_> = set.slots().collect();
        assert_eq!(
            slots,
            vec![
                DescriptorSlot::new(DescriptorKind::ConstantView, 10),
                DescriptorSlot::new(DescriptorKind::WriteView, 12),
            ]
        );
    }
}
