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


//! Placement of per-batch draw arguments and counts.
//!
//! Every unique pipeline is a batch. Batch `b` owns the draw slots
//! `b * capacity .. (b + 1) * capacity` of the argument and draw-id buffers
//! and the `u32` at byte `b * 4` of the count buffer.

use strata_core::renderer::{GpuDrawIndexedIndirect, GpuVisibleInstance};

/// Size of one indirect draw record.
pub const DRAW_ARGS_STRIDE: u64 = std::mem::size_of::<GpuDrawIndexedIndirect>() as u64;

/// Size of one per-batch draw count.
pub const DRAW_COUNT_STRIDE: u64 = 4;

/// Fixed-size draw slot ranges for a number of batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawSlotLayout {
    batch_capacity: u32,
    batch_count: u32,
}

impl DrawSlotLayout {
    /// A layout of `batch_count` batches of `batch_capacity` draws.
    pub const fn new(batch_capacity: u32, batch_count: u32) -> Self {
        Self {
            batch_capacity,
            batch_count,
        }
    }

    /// Draw slots per batch, the CPU-side maximum draw count.
    #[inline]
    pub const fn batch_capacity(&self) -> u32 {
        self.batch_capacity
    }

    /// Number of batches.
    #[inline]
    pub const fn batch_count(&self) -> u32 {
        self.batch_count
    }

    /// Global draw slot of the `local`-th draw of `batch`, or `None` if
    /// either is out of range.
    #[inline]
    pub fn draw_slot(&self, batch: u32, local: u32) -> Option<u32> {
        if batch >= self.batch_count || local >= self.batch_capacity {
            return None;
        }
        Some(batch * self.batch_capacity + local)
    }

    /// Byte offset of the first draw record of `batch`.
    #[inline]
    pub fn args_offset(&self, batch: u32) -> u64 {
        u64::from(batch) * u64::from(self.batch_capacity) * DRAW_ARGS_STRIDE
    }

    /// Byte offset of the draw count of `batch`.
    #[inline]
    pub fn count_offset(&self, batch: u32) -> u64 {
        u64::from(batch) * DRAW_COUNT_STRIDE
    }

    /// Total number of draw slots.
    #[inline]
    pub fn total_draw_slots(&self) -> u64 {
        u64::from(self.batch_count) * u64::from(self.batch_capacity)
    }

    /// Size of the indirect argument buffer.
    pub fn args_buffer_size(&self) -> u64 {
        self.total_draw_slots() * DRAW_ARGS_STRIDE
    }

    /// Size of the draw count buffer.
    pub fn count_buffer_size(&self) -> u64 {
        u64::from(self.batch_count) * DRAW_COUNT_STRIDE
    }

    /// Size of the draw-id buffer, one `u32` per draw slot.
    pub fn draw_id_buffer_size(&self) -> u64 {
        self.total_draw_slots() * 4
    }

    /// Size of the visible instance buffer, one record per draw slot.
    pub fn visible_buffer_size(&self) -> u64 {
        self.total_draw_slots() * std::mem::size_of::<GpuVisibleInstance>() as u64
    }
}

/// Workgroups needed to give every instance slot one thread.
#[inline]
pub fn workgroup_count(instance_slots: u32, workgroup_size: u32) -> u32 {
    instance_slots.div_ceil(workgroup_size.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_partitioned_per_batch() {
        let layout = DrawSlotLayout::new(4, 3);
        assert_eq!(layout.draw_slot(0, 0), Some(0));
        assert_eq!(layout.draw_slot(1, 0), Some(4));
        assert_eq!(layout.draw_slot(2, 3), Some(11));
        assert_eq!(layout.draw_slot(1, 4), None);
        assert_eq!(layout.draw_slot(3, 0), None);
    }

    #[test]
    fn offsets_follow_record_sizes() {
        let layout = DrawSlotLayout::new(4, 3);
        assert_eq!(DRAW_ARGS_STRIDE, 20);
        assert_eq!(layout.args_offset(2), 160);
        assert_eq!(layout.count_offset(2), 8);
        assert_eq!(layout.args_buffer_size(), 240);
        assert_eq!(layout.count_buffer_size(), 12);
        assert_eq!(layout.draw_id_buffer_size(), 48);
        assert_eq!(layout.visible_buffer_size(), 192);
    }

    #[test]
    fn workgroups_round_up() {
        assert_eq!(workgroup_count(0, 64), 0);
        assert_eq!(workgroup_count(1, 64), 1);
        assert_eq!(workgroup_count(64, 64), 1);
        assert_eq!(workgroup_count(65, 64), 2);
    }
}
