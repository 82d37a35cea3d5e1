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

//! # Strata Core
//!
//! Foundational crate containing the contracts of the bindless descriptor core:
//! descriptor kinds and handles, GPU record layouts, fence values, the two fixed
//! root layouts, settings, the error hierarchy and the device traits every
//! backend implements.

#![warn(missing_docs)]

pub mod math;
pub mod renderer;
pub mod utils;
