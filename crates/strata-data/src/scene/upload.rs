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

use strata_core::renderer::SceneBufferClass;

/// A byte range of one scene buffer that changed on the CPU and must be
/// written to its GPU copy before the next submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneUpload {
    /// The buffer the bytes belong to.
    pub class: SceneBufferClass,
    /// Destination offset in bytes.
    pub byte_offset: u64,
    /// The new contents.
    pub bytes: Vec<u8>,
}

impl SceneUpload {
    /// One past the last byte written.
    pub fn end(&self) -> u64 {
        self.byte_offset + self.bytes.len() as u64
    }
}
