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

//! Defines data structures related to GPU buffer resources.

use crate::strata_bitflags;
use std::borrow::Cow;

strata_bitflags! {
    /// A set of flags describing the allowed usages of a buffer.
    pub struct BufferUsage: u32 {
        /// The buffer can be the source of a copy.
        const COPY_SRC = 1 << 0;
        /// The buffer can be the destination of a copy or a queue write.
        const COPY_DST = 1 << 1;
        /// The buffer can be bound as an index buffer.
        const INDEX = 1 << 2;
        /// The buffer can back a constant view.
        const UNIFORM = 1 << 3;
        /// The buffer can back read and write views.
        const STORAGE = 1 << 4;
        /// The buffer can hold indirect draw arguments or draw counts.
        const INDIRECT = 1 << 5;
    }
}

/// A descriptor used to create a buffer.
#[derive(Debug, Clone)]
pub struct BufferDescriptor<'a> {
    /// An optional debug label for the buffer.
    pub label: Option<Cow<'a, str>>,
    /// The total size of the buffer in bytes.
    pub size: u64,
    /// How the buffer will be used.
    pub usage: BufferUsage,
}

/// An opaque handle to a GPU buffer resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub usize);
