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

//! First-fit byte range allocation for the shared vertex and index buffers.

use super::release_queue::DeferredReleaseQueue;
use std::collections::BTreeMap;
use strata_core::renderer::{FenceValue, SceneBufferClass, SceneBufferError};

/// A contiguous byte range handed out by a [`RangeAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanAllocation {
    /// Byte offset from the start of the buffer.
    pub offset: u64,
    /// Length in bytes, already rounded up to the allocator's alignment.
    pub size: u64,
}

impl SpanAllocation {
    /// One past the last byte of the span.
    #[inline]
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Manages a fixed byte budget as a set of free ranges.
///
/// Free ranges are keyed by offset and merged with their neighbours when a
/// freed span retires, so the buffer never needs compaction for
/// allocate/free patterns that stay below the budget.
#[derive(Debug)]
pub struct RangeAllocator {
    class: SceneBufferClass,
    capacity: u64,
    alignment: u64,
    /// offset -> size
    free_ranges: BTreeMap<u64, u64>,
    /// offset -> size of every span handed out and not yet freed.
    live: BTreeMap<u64, u64>,
    pending: DeferredReleaseQueue<SpanAllocation>,
    submission_fence: FenceValue,
    allocated: u64,
}

impl RangeAllocator {
    /// Creates an allocator over `capacity` bytes. `alignment` must be a
    /// power of two.
    pub fn new(class: SceneBufferClass, capacity: u64, alignment: u64) -> Self {
        debug_assert!(alignment.is_power_of_two());
        let mut free_ranges = BTreeMap::new();
        if capacity > 0 {
            free_ranges.insert(0, capacity);
        }
        Self {
            class,
            capacity,
            alignment,
            free_ranges,
            live: BTreeMap::new(),
            pending: DeferredReleaseQueue::new(),
            submission_fence: FenceValue::ZERO.next(),
            allocated: 0,
        }
    }

    fn align(&self, size: u64) -> u64 {
        (size + self.alignment - 1) & !(self.alignment - 1)
    }

    /// Reserves `size` bytes from the lowest free range that fits.
    /// ## Errors
    /// * `SceneBufferError::ByteBudgetExceeded` - if no free range is large enough.
    pub fn allocate(&mut self, size: u64) -> Result<SpanAllocation, SceneBufferError> {
        self.allocate_aligned(size, self.alignment)
    }

    /// Reserves `size` bytes starting at a multiple of `start_alignment`.
    ///
    /// `start_alignment` need not be a power of two, which lets vertex spans
    /// start on a whole vertex for any stride. It must be a multiple of the
    /// allocator's own alignment. The gap skipped in front of the span stays
    /// free.
    /// ## Errors
    /// * `SceneBufferError::ByteBudgetExceeded` - if no free range can hold the aligned span.
    pub fn allocate_aligned(
        &mut self,
        size: u64,
        start_alignment: u64,
    ) -> Result<SpanAllocation, SceneBufferError> {
        debug_assert!(start_alignment > 0 && start_alignment % self.alignment == 0);
        let size = self.align(size.max(1));
        let start_alignment = start_alignment.max(1);
        let found = self.free_ranges.iter().find_map(|(&offset, &len)| {
            let start = offset.div_ceil(start_alignment) * start_alignment;
            (start + size <= offset + len).then_some((offset, len, start))
        });

        let Some((offset, len, start)) = found else {
            return Err(SceneBufferError::ByteBudgetExceeded {
                class: self.class,
                requested: size,
                available: self.largest_free_range(),
            });
        };

        self.free_ranges.remove(&offset);
        if start > offset {
            self.free_ranges.insert(offset, start - offset);
        }
        let end = start + size;
        if offset + len > end {
            self.free_ranges.insert(end, offset + len - end);
        }
        self.live.insert(start, size);
        self.allocated += size;
        log::debug!("{}: allocated {size} bytes at {start}", self.class);
        Ok(SpanAllocation {
            offset: start,
            size,
        })
    }

    /// Whether `span` is exactly a live allocation of this allocator.
    pub fn is_live(&self, span: SpanAllocation) -> bool {
        self.live.get(&span.offset) == Some(&span.size)
    }

    /// Schedules `span` to be returned once the current submission retires.
    /// ## Errors
    /// * `SceneBufferError::InvalidSpan` - if `span` was already freed or was
    ///   never handed out by this allocator. Nothing changes in that case.
    pub fn free(&mut self, span: SpanAllocation) -> Result<(), SceneBufferError> {
        if !self.is_live(span) {
            log::error!(
                "{}: rejected free of {} bytes at {}, not a live allocation",
                self.class,
                span.size,
                span.offset
            );
            return Err(SceneBufferError::InvalidSpan {
                class: self.class,
                offset: span.offset,
                size: span.size,
            });
        }
        self.live.remove(&span.offset);
        self.allocated -= span.size;
        self.pending.enqueue(span, self.submission_fence);
        Ok(())
    }

    /// Sets the fence new frees are tagged with.
    pub fn begin_submission(&mut self, fence: FenceValue) {
        self.submission_fence = self.submission_fence.max(fence);
    }

    /// Returns retired spans to the free ranges, merging neighbours.
    pub fn reclaim(&mut self, completed: FenceValue) -> usize {
        let spans = self.pending.drain(completed);
        let count = spans.len();
        for span in spans {
            self.insert_free(span);
        }
        count
    }

    fn insert_free(&mut self, span: SpanAllocation) {
        let mut offset = span.offset;
        let mut size = span.size;

        if let Some((&prev_offset, &prev_size)) = self.free_ranges.range(..offset).next_back() {
            if prev_offset + prev_size == offset {
                self.free_ranges.remove(&prev_offset);
                offset = prev_offset;
                size += prev_size;
            }
        }
        if let Some(next_size) = self.free_ranges.remove(&(offset + size)) {
            size += next_size;
        }
        self.free_ranges.insert(offset, size);
    }

    /// Drops pending frees after device loss.
    pub fn abandon_pending(&mut self) -> usize {
        self.pending.abandon()
    }

    /// Total byte budget.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes held by live allocations.
    pub fn allocated(&self) -> u64 {
        self.allocated
    }

    /// Bytes that can be allocated right now, across all free ranges.
    pub fn available(&self) -> u64 {
        self.free_ranges.values().sum()
    }

    /// The largest single allocation that would currently succeed.
    pub fn largest_free_range(&self) -> u64 {
        self.free_ranges.values().copied().max().unwrap_or(0)
    }

    /// Number of disjoint free ranges.
    pub fn free_range_count(&self) -> usize {
        self.free_ranges.len()
    }
}
