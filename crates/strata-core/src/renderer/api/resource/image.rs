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

//! Defines data structures related to GPU image resources.

use crate::strata_bitflags;
use std::borrow::Cow;

/// Texel formats the core needs to describe render targets and textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    /// 8-bit normalized RGBA.
    Rgba8Unorm,
    /// 8-bit normalized RGBA, sRGB encoded.
    Rgba8UnormSrgb,
    /// 16-bit float RGBA.
    Rgba16Float,
    /// 32-bit float depth.
    Depth32Float,
}

strata_bitflags! {
    /// A set of flags describing the allowed usages of an image.
    pub struct ImageUsage: u32 {
        /// The image can be written from the CPU.
        const COPY_DST = 1 << 0;
        /// The image can back a read view.
        const SAMPLED = 1 << 1;
        /// The image can back a write view.
        const STORAGE = 1 << 2;
        /// The image can be used as a render pass attachment.
        const RENDER_ATTACHMENT = 1 << 3;
    }
}

/// A descriptor used to create an image.
#[derive(Debug, Clone)]
pub struct ImageDescriptor<'a> {
    /// An optional debug label for the image.
    pub label: Option<Cow<'a, str>>,
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Texel format.
    pub format: ImageFormat,
    /// How the image will be used.
    pub usage: ImageUsage,
}

/// An opaque handle to a GPU image resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageId(pub usize);
