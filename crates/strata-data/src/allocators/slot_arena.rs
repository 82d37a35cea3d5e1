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

//! Fixed-capacity record arenas mirrored into GPU storage buffers.

use super::release_queue::DeferredReleaseQueue;
use bytemuck::Pod;
use std::ops::Range;
use strata_core::renderer::{FenceValue, SceneBufferClass, SceneBufferError};

/// A dense array of GPU records addressed by stable `u32` indices.
///
/// Indices never move: removal zeroes the record in place and queues the
/// index for reuse after the removal's submission retires. The arena tracks
/// the range of records touched since the last upload so only that range is
/// written to the GPU copy.
#[derive(Debug)]
pub struct SlotArena<T: Pod> {
    class: SceneBufferClass,
    capacity: u32,
    records: Vec<T>,
    live: Vec<bool>,
    reserved: u32,
    free: Vec<u32>,
    pending: DeferredReleaseQueue<u32>,
    submission_fence: FenceValue,
    dirty: Option<Range<u32>>,
    live_count: u32,
}

impl<T: Pod> SlotArena<T> {
    /// Creates an empty arena holding at most `capacity` records.
    pub fn new(class: SceneBufferClass, capacity: u32) -> Self {
        Self {
            class,
            capacity,
            records: Vec::new(),
            live: Vec::new(),
            reserved: 0,
            free: Vec::new(),
            pending: DeferredReleaseQueue::new(),
            submission_fence: FenceValue::ZERO.next(),
            dirty: None,
            live_count: 0,
        }
    }

    /// Permanently occupies the next index with `record`.
    ///
    /// Reserved slots can be read but never updated or removed. Only valid
    /// before the first [`add`](Self::add).
    pub fn reserve(&mut self, record: T) -> Result<u32, SceneBufferError> {
        if self.records.len() as u32 != self.reserved {
            return Err(SceneBufferError::InvalidRecord {
                class: self.class,
                reason: "reserved slots must precede every regular slot".to_owned(),
            });
        }
        let index = self.push(record)?;
        self.reserved += 1;
        Ok(index)
    }

    fn push(&mut self, record: T) -> Result<u32, SceneBufferError> {
        let index = if let Some(index) = self.free.pop() {
            self.records[index as usize] = record;
            self.live[index as usize] = true;
            index
        } else if (self.records.len() as u32) < self.capacity {
            self.records.push(record);
            self.live.push(true);
            (self.records.len() - 1) as u32
        } else {
            return Err(SceneBufferError::CapacityExceeded {
                class: self.class,
                capacity: u64::from(self.capacity),
            });
        };
        self.live_count += 1;
        self.mark_dirty(index);
        Ok(index)
    }

    /// Stores `record` in a free slot.
    /// ## Errors
    /// * `SceneBufferError::CapacityExceeded` - if every slot is live or waiting for reuse.
    pub fn add(&mut self, record: T) -> Result<u32, SceneBufferError> {
        self.push(record)
    }

    fn check_mutable(&self, index: u32) -> Result<(), SceneBufferError> {
        if index < self.reserved || !self.is_live(index) {
            return Err(SceneBufferError::InvalidSlot {
                class: self.class,
                index,
            });
        }
        Ok(())
    }

    /// Overwrites the record at `index`.
    pub fn update(&mut self, index: u32, record: T) -> Result<(), SceneBufferError> {
        self.check_mutable(index)?;
        self.records[index as usize] = record;
        self.mark_dirty(index);
        Ok(())
    }

    /// Removes the record at `index`, returning it.
    ///
    /// The GPU copy is zeroed with the next upload; the index becomes
    /// reusable after the current submission retires.
    pub fn remove(&mut self, index: u32) -> Result<T, SceneBufferError> {
        self.check_mutable(index)?;
        let record = std::mem::replace(&mut self.records[index as usize], T::zeroed());
        self.live[index as usize] = false;
        self.live_count -= 1;
        self.pending.enqueue(index, self.submission_fence);
        self.mark_dirty(index);
        Ok(record)
    }

    /// The record at `index`, if it is live.
    pub fn get(&self, index: u32) -> Option<&T> {
        if self.is_live(index) {
            self.records.get(index as usize)
        } else {
            None
        }
    }

    /// Returns `true` if `index` holds a live record.
    pub fn is_live(&self, index: u32) -> bool {
        self.live.get(index as usize).copied().unwrap_or(false)
    }

    /// Iterates over live records with their indices.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.records
            .iter()
            .zip(&self.live)
            .enumerate()
            .filter(|(_, (_, live))| **live)
            .map(|(index, (record, _))| (index as u32, record))
    }

    /// Sets the fence new removals are tagged with.
    pub fn begin_submission(&mut self, fence: FenceValue) {
        self.submission_fence = self.submission_fence.max(fence);
    }

    /// Makes indices removed at or before `completed` reusable.
    pub fn reclaim(&mut self, completed: FenceValue) -> usize {
        let retired = self.pending.drain(completed);
        let count = retired.len();
        self.free.extend(retired);
        count
    }

    /// Drops pending removals after device loss.
    pub fn abandon_pending(&mut self) -> usize {
        self.pending.abandon()
    }

    fn mark_dirty(&mut self, index: u32) {
        self.dirty = Some(match self.dirty.take() {
            Some(range) => range.start.min(index)..range.end.max(index + 1),
            None => index..index + 1,
        });
    }

    /// Marks every record up to the high-water mark for upload.
    pub fn mark_all_dirty(&mut self) {
        let end = self.records.len() as u32;
        self.dirty = (end > 0).then_some(0..end);
    }

    /// Returns and clears the range of records changed since the last call.
    pub fn take_dirty(&mut self) -> Option<Range<u32>> {
        self.dirty.take()
    }

    /// The raw bytes of records in `range`, as laid out in the GPU buffer.
    pub fn bytes(&self, range: Range<u32>) -> &[u8] {
        bytemuck::cast_slice(&self.records[range.start as usize..range.end as usize])
    }

    /// Number of live records, reserved ones included.
    pub fn len(&self) -> u32 {
        self.live_count
    }

    /// Returns `true` if no record is live.
    pub fn is_empty(&self) -> bool {
        self.live_count == 0
    }

    /// One past the highest index ever handed out.
    pub fn high_water_mark(&self) -> u32 {
        self.records.len() as u32
    }

    /// Maximum number of records.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// The record class this arena stores.
    pub fn class(&self) -> SceneBufferClass {
        self.class
    }

    /// Size of one record in bytes.
    pub const fn stride() -> u64 {
        std::mem::size_of::<T>() as u64
    }
}
