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

//! Maps render pipelines to the dense batch indices the culling pass sorts by.

use std::collections::HashMap;
use strata_core::renderer::{RenderPipelineId, SceneBufferClass, SceneBufferError};

/// The dense list of render pipelines instances can reference.
///
/// The index of a pipeline is its draw batch. Entries are never removed, so
/// an index stays valid for the session; hot-reloaded pipelines take over
/// the slot of the pipeline they replace.
#[derive(Debug)]
pub struct PipelineTable {
    entries: Vec<RenderPipelineId>,
    lookup: HashMap<RenderPipelineId, u32>,
    capacity: u32,
}

impl PipelineTable {
    /// Creates an empty table.
    pub fn new(capacity: u32) -> Self {
        Self {
            entries: Vec::new(),
            lookup: HashMap::new(),
            capacity,
        }
    }

    /// Returns the index of `pipeline`, registering it on first use.
    /// ## Errors
    /// * `SceneBufferError::CapacityExceeded` - if the table is full.
    pub fn register(&mut self, pipeline: RenderPipelineId) -> Result<u32, SceneBufferError> {
        if let Some(&index) = self.lookup.get(&pipeline) {
            return Ok(index);
        }
        if self.entries.len() as u32 >= self.capacity {
            return Err(SceneBufferError::CapacityExceeded {
                class: SceneBufferClass::Pipeline,
                capacity: u64::from(self.capacity),
            });
        }
        let index = self.entries.len() as u32;
        self.entries.push(pipeline);
        self.lookup.insert(pipeline, index);
        log::debug!("Registered {pipeline:?} as batch {index}");
        Ok(index)
    }

    /// Points batch `index` at `pipeline`.
    /// ## Errors
    /// * `SceneBufferError::InvalidSlot` - if `index` was never registered.
    /// * `SceneBufferError::InvalidRecord` - if `pipeline` already owns another batch.
    pub fn replace(&mut self, index: u32, pipeline: RenderPipelineId) -> Result<RenderPipelineId, SceneBufferError> {
        let Some(slot) = self.entries.get_mut(index as usize) else {
            return Err(SceneBufferError::InvalidSlot {
                class: SceneBufferClass::Pipeline,
                index,
            });
        };
        match self.lookup.get(&pipeline) {
            Some(&existing) if existing != index => {
                return Err(SceneBufferError::InvalidRecord {
                    class: SceneBufferClass::Pipeline,
                    reason: format!("{pipeline:?} is already batch {existing}"),
                });
            }
            _ => {}
        }
        let previous = std::mem::replace(slot, pipeline);
        self.lookup.remove(&previous);
        self.lookup.insert(pipeline, index);
        Ok(previous)
    }

    /// The pipeline of batch `index`.
    pub fn get(&self, index: u32) -> Option<RenderPipelineId> {
        self.entries.get(index as usize).copied()
    }

    /// The batch index of `pipeline`, if registered.
    pub fn index_of(&self, pipeline: RenderPipelineId) -> Option<u32> {
        self.lookup.get(&pipeline).copied()
    }

    /// Iterates over `(batch index, pipeline)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (u32, RenderPipelineId)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, pipeline)| (index as u32, *pipeline))
    }

    /// Number of registered pipelines.
    pub fn len(&self) -> u32 {
        self.entries.len() as u32
    }

    /// Returns `true` if no pipeline is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
