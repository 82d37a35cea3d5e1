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

//! Shader-visible descriptor handles.
//!
//! Handles are plain indices into the bindless heap. They do not own the slot
//! they point to: the resource's descriptor set does, and a handle must not
//! be used after that set has been released.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Index value written for an absent view.
pub const INVALID_DESCRIPTOR_INDEX: u32 = u32::MAX;

/// An untyped handle: a single heap index of a known kind.
///
/// Costs one word of the inline constant block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(transparent)]
pub struct LiteDescriptorHandle {
    index: u32,
}

impl LiteDescriptorHandle {
    /// A handle that points at nothing.
    pub const INVALID: Self = Self {
        index: INVALID_DESCRIPTOR_INDEX,
    };

    /// Wraps a heap index.
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self { index }
    }

    /// The heap index.
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Returns `false` for [`LiteDescriptorHandle::INVALID`].
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.index != INVALID_DESCRIPTOR_INDEX
    }
}

/// A typed handle to a structured buffer of `T`.
///
/// Carries the read view index and the write view index of the same resource
/// (the write index is [`INVALID_DESCRIPTOR_INDEX`] for read-only resources).
/// Costs two words of the inline constant block. `T` only exists at compile
/// time to keep shader-side and host-side element types in agreement.
#[repr(C)]
pub struct DescriptorHandle<T> {
    read_index: u32,
    write_index: u32,
    _element: PhantomData<fn() -> T>,
}

impl<T> DescriptorHandle<T> {
    /// Builds a handle from the two view indices.
    #[inline]
    pub const fn new(read_index: u32, write_index: u32) -> Self {
        Self {
            read_index,
            write_index,
            _element: PhantomData,
        }
    }

    /// The read view index.
    #[inline]
    pub const fn read_index(&self) -> u32 {
        self.read_index
    }

    /// The write view index, or [`INVALID_DESCRIPTOR_INDEX`].
    #[inline]
    pub const fn write_index(&self) -> u32 {
        self.write_index
    }

    /// Returns `true` if the resource exposes a write view.
    #[inline]
    pub const fn is_writable(&self) -> bool {
        self.write_index != INVALID_DESCRIPTOR_INDEX
    }

    /// Drops the element type, keeping only the read view.
    #[inline]
    pub const fn to_read_lite(&self) -> LiteDescriptorHandle {
        LiteDescriptorHandle::new(self.read_index)
    }

    /// Drops the element type, keeping only the write view.
    #[inline]
    pub const fn to_write_lite(&self) -> LiteDescriptorHandle {
        LiteDescriptorHandle::new(self.write_index)
    }

    /// The two words written into the inline constant block.
    #[inline]
    pub const fn to_words(&self) -> [u32; 2] {
        [self.read_index, self.write_index]
    }

    /// Rebuilds a handle from its two inline words.
    #[inline]
    pub const fn from_words(words: [u32; 2]) -> Self {
        Self::new(words[0], words[1])
    }
}

impl<T> Clone for DescriptorHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for DescriptorHandle<T> {}

impl<T> PartialEq for DescriptorHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.read_index == other.read_index && self.write_index == other.write_index
    }
}

impl<T> Eq for DescriptorHandle<T> {}

impl<T> Hash for DescriptorHandle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.read_index.hash(state);
        self.write_index.hash(state);
    }
}

impl<T> fmt::Debug for DescriptorHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorHandle")
            .field("element", &std::any::type_name::<T>())
            .field("read_index", &self.read_index)
            .field("write_index", &self.write_index)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NotCopy;

    #[test]
    fn typed_handle_is_copy_for_any_element() {
        let handle = DescriptorHandle::<NotCopy>::new(3, 7);
        let copy = handle;
        assert_eq!(handle, copy);
        assert_eq!(copy.to_words(), [3, 7]);
        assert_eq!(copy.to_read_lite().index(), 3);
        assert_eq!(copy.to_write_lite().index(), 7);
    }

    #[test]
    fn read_only_handle_reports_not_writable() {
        let handle = DescriptorHandle::<u32>::new(1, INVALID_DESCRIPTOR_INDEX);
        assert!(!handle.is_writable());
        assert!(!handle.to_write_lite().is_valid());
    }

    #[test]
    fn lite_handle_is_one_word() {
        assert_eq!(std::mem::size_of::<LiteDescriptorHandle>(), 4);
        assert_eq!(std::mem::size_of::<DescriptorHandle<[f32; 16]>>(), 8);
    }
}
