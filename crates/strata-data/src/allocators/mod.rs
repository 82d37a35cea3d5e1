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

//! Index allocators whose frees are gated on the GPU timeline.

mod descriptor_heap;
mod range_allocator;
mod release_queue;
mod slot_arena;

pub use self::descriptor_heap::DescriptorHeapAllocator;
pub use self::range_allocator::{RangeAllocator, SpanAllocation};
pub use self::release_queue::{DeferredReleaseEntry, DeferredReleaseQueue};
pub use self::slot_arena::SlotArena;
