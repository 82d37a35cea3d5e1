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

//! Binding of GPU resources to bindless heap slots.
//!
//! A resource is registered once with the kinds of view it needs and gets
//! one slot per kind. Shaders then address it purely through those indices.

mod bindless_heap;
mod set;
mod shared;

pub use self::bindless_heap::BindlessHeap;
pub use self::set::ResourceDescriptorSet;
pub use self::shared::{ReleaseRequest, SharedDescriptorSet};
