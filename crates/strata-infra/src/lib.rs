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

//! Concrete implementations of the `strata-core` backend contracts.
//!
//! The only backend in tree is the [`SoftwareDevice`](graphics::software::SoftwareDevice),
//! an in-process GPU that runs compute kernels and indirect draws on the CPU
//! with the same ordering rules as a hardware queue.

#![warn(missing_docs)]

pub mod graphics;

pub use graphics::software::{DrawRecord, ExecutionMode, ExecutionStats, SoftwareDevice};
