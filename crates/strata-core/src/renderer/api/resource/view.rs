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

//! The resource a descriptor slot describes.

use super::buffer::BufferId;
use super::image::ImageId;
use crate::renderer::api::descriptor::DescriptorKind;
use std::fmt;

/// Broad class of a GPU resource, used to validate descriptor kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    /// A linear buffer.
    Buffer,
    /// A texture.
    Image,
}

impl ResourceClass {
    /// Returns `true` if a descriptor of `kind` can point at this class.
    ///
    /// Constant views only exist for buffers.
    #[inline]
    pub const fn supports(self, kind: DescriptorKind) -> bool {
        !matches!(
            (self, kind),
            (ResourceClass::Image, DescriptorKind::ConstantView)
        )
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceClass::Buffer => f.write_str("buffer"),
            ResourceClass::Image => f.write_str("image"),
        }
    }
}

/// A created GPU resource, as seen by the descriptor heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuResource {
    /// A buffer viewed as an array of `stride`-byte elements.
    Buffer {
        /// The buffer.
        id: BufferId,
        /// Size in bytes covered by the views.
        size: u64,
        /// Element stride in bytes, `0` for raw byte access.
        stride: u32,
    },
    /// An image.
    Image {
        /// The image.
        id: ImageId,
    },
}

impl GpuResource {
    /// The class of the resource.
    #[inline]
    pub const fn class(&self) -> ResourceClass {
        match self {
            GpuResource::Buffer { .. } => ResourceClass::Buffer,
            GpuResource::Image { .. } => ResourceClass::Image,
        }
    }

    /// The buffer id, if this is a buffer.
    #[inline]
    pub const fn buffer_id(&self) -> Option<BufferId> {
        match self {
            GpuResource::Buffer { id, .. } => Some(*id),
            GpuResource::Image { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn images_never_support_constant_views() {
        assert!(!ResourceClass::Image.supports(DescriptorKind::ConstantView));
        assert!(ResourceClass::Image.supports(DescriptorKind::ReadView));
        assert!(ResourceClass::Buffer.supports(DescriptorKind::ConstantView));
    }
}
