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

//! Slot allocation for the three bindless heap tables.

use super::release_queue::DeferredReleaseQueue;
use std::time::Duration;
use strata_core::renderer::{
    BindlessSettings, DescriptorError, DescriptorKind, DescriptorSlot, ExhaustionPolicy,
    FenceValue, GpuTimeline, HeapStats, SlotState,
};

/// One heap table: a dense index space with a stack of freed indices.
#[derive(Debug)]
struct HeapTable {
    kind: DescriptorKind,
    capacity: u32,
    /// State of every index handed out so far; its length is the high-water mark.
    states: Vec<SlotState>,
    /// Retired indices available for reuse, most recently freed on top.
    free: Vec<u32>,
    pending: DeferredReleaseQueue<u32>,
    occupied: u32,
}

impl HeapTable {
    fn new(kind: DescriptorKind, capacity: u32) -> Self {
        Self {
            kind,
            capacity,
            states: Vec::new(),
            free: Vec::new(),
            pending: DeferredReleaseQueue::new(),
            occupied: 0,
        }
    }

    fn allocate(&mut self) -> Result<u32, DescriptorError> {
        let index = if let Some(index) = self.free.pop() {
            index
        } else if (self.states.len() as u32) < self.capacity {
            self.states.push(SlotState::Free);
            (self.states.len() - 1) as u32
        } else {
            return Err(DescriptorError::HeapExhausted {
                kind: self.kind,
                capacity: self.capacity,
            });
        };
        debug_assert_eq!(self.states[index as usize], SlotState::Free);
        self.states[index as usize] = SlotState::Occupied;
        self.occupied += 1;
        Ok(index)
    }

    fn state_mut(&mut self, index: u32) -> Result<&mut SlotState, DescriptorError> {
        if index >= self.capacity {
            return Err(DescriptorError::SlotOutOfRange {
                kind: self.kind,
                index,
                capacity: self.capacity,
            });
        }
        let kind = self.kind;
        self.states
            .get_mut(index as usize)
            .ok_or(DescriptorError::DoubleRelease { kind, index })
    }

    fn release(&mut self, index: u32, fence: FenceValue) -> Result<(), DescriptorError> {
        let kind = self.kind;
        let state = self.state_mut(index)?;
        match *state {
            SlotState::Occupied => {
                *state = SlotState::PendingRelease(fence);
                self.occupied -= 1;
                self.pending.enqueue(index, fence);
                log::trace!("Released {kind} slot {index}, retires at {fence}");
                Ok(())
            }
            other => {
                log::error!("Double release of {kind} slot {index} (state: {other:?})");
                Err(DescriptorError::DoubleRelease { kind, index })
            }
        }
    }

    fn discard(&mut self, index: u32) -> Result<(), DescriptorError> {
        let kind = self.kind;
        let state = self.state_mut(index)?;
        if *state != SlotState::Occupied {
            log::error!("Discard of {kind} slot {index} that is not occupied ({state:?})");
            return Err(DescriptorError::DoubleRelease { kind, index });
        }
        *state = SlotState::Free;
        self.occupied -= 1;
        self.free.push(index);
        Ok(())
    }

    fn reclaim(&mut self, completed: FenceValue, out: &mut Vec<DescriptorSlot>) {
        for index in self.pending.drain(completed) {
            self.states[index as usize] = SlotState::Free;
            self.free.push(index);
            out.push(DescriptorSlot::new(self.kind, index));
        }
    }

    fn stats(&self) -> HeapStats {
        HeapStats {
            kind: self.kind,
            capacity: self.capacity,
            occupied: self.occupied,
            pending_release: self.pending.len() as u32,
        }
    }
}

/// Allocates slot indices in the constant, read and write view tables.
///
/// Allocation is O(1). A released index is not reusable until the GPU has
/// completed the submission it was released in; [`reclaim`] moves retired
/// indices back to the free stacks and is meant to run once per frame.
///
/// [`reclaim`]: DescriptorHeapAllocator::reclaim
#[derive(Debug)]
pub struct DescriptorHeapAllocator {
    tables: [HeapTable; 3],
    submission_fence: FenceValue,
    policy: ExhaustionPolicy,
}

impl DescriptorHeapAllocator {
    /// Creates an allocator sized from the settings.
    pub fn new(settings: &BindlessSettings) -> Self {
        let tables = DescriptorKind::ALL.map(|kind| HeapTable::new(kind, settings.heaps.capacity(kind)));
        log::info!(
            "Descriptor heap allocator created ({} constant / {} read / {} write slots)",
            tables[0].capacity,
            tables[1].capacity,
            tables[2].capacity
        );
        Self {
            tables,
            submission_fence: FenceValue::ZERO.next(),
            policy: settings.exhaustion_policy,
        }
    }

    fn table(&self, kind: DescriptorKind) -> &HeapTable {
        &self.tables[kind.table_index()]
    }

    fn table_mut(&mut self, kind: DescriptorKind) -> &mut HeapTable {
        &mut self.tables[kind.table_index()]
    }

    /// Sets the fence the submission currently being recorded will signal.
    /// Every release from now on is tagged with it.
    pub fn begin_submission(&mut self, fence: FenceValue) {
        if fence < self.submission_fence {
            log::warn!(
                "Submission fence moved backwards ({} -> {fence}), keeping the newer one",
                self.submission_fence
            );
            return;
        }
        self.submission_fence = fence;
    }

    /// The fence new releases are tagged with.
    pub fn submission_fence(&self) -> FenceValue {
        self.submission_fence
    }

    /// Allocates a slot of `kind`.
    ///
    /// Fresh indices come out lowest first; retired indices are reused most
    /// recently freed first.
    /// ## Errors
    /// * `DescriptorError::HeapExhausted` - if no slot is free right now.
    pub fn allocate(&mut self, kind: DescriptorKind) -> Result<u32, DescriptorError> {
        let index = self.table_mut(kind).allocate()?;
        log::trace!("Allocated {kind} slot {index}");
        Ok(index)
    }

    /// Allocates a slot of `kind`, applying the exhaustion policy if the
    /// table is full.
    ///
    /// With [`ExhaustionPolicy::WaitForGpu`] the allocator first reclaims up
    /// to the completed fence, then blocks on the oldest pending release of
    /// `kind` and retries once. An unretired slot is never handed out.
    /// ## Errors
    /// * `DescriptorError::HeapExhausted` - if nothing can be reclaimed.
    /// * `DescriptorError::Device` - if waiting timed out or the device was lost.
    pub fn allocate_or_wait<T>(&mut self, kind: DescriptorKind, timeline: &T) -> Result<u32, DescriptorError>
    where
        T: GpuTimeline + ?Sized,
    {
        let exhausted = match self.allocate(kind) {
            Ok(index) => return Ok(index),
            Err(err @ DescriptorError::HeapExhausted { .. }) => err,
            Err(err) => return Err(err),
        };
        let ExhaustionPolicy::WaitForGpu { timeout_ms } = self.policy else {
            return Err(exhausted);
        };

        let completed = timeline.completed_fence()?;
        self.reclaim(completed);
        if let Ok(index) = self.allocate(kind) {
            return Ok(index);
        }

        let Some(oldest) = self.table(kind).pending.oldest_pending() else {
            return Err(exhausted);
        };
        if oldest > timeline.last_submitted_fence() {
            // The release belongs to the submission still being recorded.
            return Err(exhausted);
        }
        log::warn!("The {kind} heap is exhausted, waiting for {oldest} to retire");
        let completed = timeline.wait_for(oldest, Duration::from_millis(timeout_ms))?;
        self.reclaim(completed);
        self.allocate(kind)
    }

    /// Schedules slot `index` of `kind` for reuse once the current
    /// submission fence is completed.
    /// ## Errors
    /// * `DescriptorError::DoubleRelease` - if the slot is not occupied.
    /// * `DescriptorError::SlotOutOfRange` - if `index` is outside the table.
    pub fn release(&mut self, kind: DescriptorKind, index: u32) -> Result<(), DescriptorError> {
        let fence = self.submission_fence;
        self.table_mut(kind).release(index, fence)
    }

    /// Frees a slot immediately.
    ///
    /// Only for slots allocated during the current recording that no
    /// submission has referenced, e.g. when configuring a resource fails
    /// half-way.
    pub fn discard_unsubmitted(&mut self, kind: DescriptorKind, index: u32) -> Result<(), DescriptorError> {
        self.table_mut(kind).discard(index)
    }

    /// Returns every slot whose release fence is `<= completed` to the free
    /// stacks.
    /// ## Returns
    /// The reclaimed slots, in release order per table.
    pub fn reclaim(&mut self, completed: FenceValue) -> Vec<DescriptorSlot> {
        let mut reclaimed = Vec::new();
        for table in &mut self.tables {
            table.reclaim(completed, &mut reclaimed);
        }
        if !reclaimed.is_empty() {
            log::debug!("Reclaimed {} descriptor slot(s) up to {completed}", reclaimed.len());
        }
        reclaimed
    }

    /// Drops every pending release after device loss.
    ///
    /// The pending slots stay unusable: the heap must be rebuilt along with
    /// the device.
    pub fn abandon_pending(&mut self) -> usize {
        let dropped: usize = self.tables.iter_mut().map(|t| t.pending.abandon()).sum();
        if dropped > 0 {
            log::error!("Abandoned {dropped} pending descriptor release(s) after device loss");
        }
        dropped
    }

    /// Current state of a slot.
    pub fn slot_state(&self, kind: DescriptorKind, index: u32) -> SlotState {
        self.table(kind)
            .states
            .get(index as usize)
            .copied()
            .unwrap_or(SlotState::Free)
    }

    /// Occupancy of the table for `kind`.
    pub fn stats(&self, kind: DescriptorKind) -> HeapStats {
        self.table(kind).stats()
    }

    /// The capacity of the table for `kind`.
    pub fn capacity(&self, kind: DescriptorKind) -> u32 {
        self.table(kind).capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use strata_core::renderer::DeviceError;

    fn settings(read_views: u32, policy: ExhaustionPolicy) -> BindlessSettings {
        let mut settings = BindlessSettings::default();
        settings.heaps.read_views = read_views;
        settings.exhaustion_policy = policy;
        settings
    }

    /// A timeline whose GPU finishes work only when waited on.
    struct ManualTimeline {
        submitted: FenceValue,
        completed: Mutex<FenceValue>,
        hang: bool,
    }

    impl GpuTimeline for ManualTimeline {
        fn completed_fence(&self) -> Result<FenceValue, DeviceError> {
            Ok(*self.completed.lock().unwrap())
        }

        fn last_submitted_fence(&self) -> FenceValue {
            self.submitted
        }

        fn wait_for(&self, fence: FenceValue, timeout: Duration) -> Result<FenceValue, DeviceError> {
            let mut completed = self.completed.lock().unwrap();
            if self.hang {
                return Err(DeviceError::Timeout {
                    waiting_for: fence,
                    completed: *completed,
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            *completed = (*completed).max(fence);
            Ok(*completed)
        }
    }

    #[test]
    fn capacity_four_allocates_in_order_then_fails() {
        let mut heap = DescriptorHeapAllocator::new(&settings(4, ExhaustionPolicy::Fail));
        let indices: Vec<u32> = (0..4)
            .map(|_| heap.allocate(DescriptorKind::ReadView).unwrap())
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(
            heap.allocate(DescriptorKind::ReadView),
            Err(DescriptorError::HeapExhausted {
                kind: DescriptorKind::ReadView,
                capacity: 4
            })
        );
    }

    #[test]
    fn kinds_have_independent_index_spaces() {
        let mut heap = DescriptorHeapAllocator::new(&settings(4, ExhaustionPolicy::Fail));
        assert_eq!(heap.allocate(DescriptorKind::ReadView), Ok(0));
        assert_eq!(heap.allocate(DescriptorKind::WriteView), Ok(0));
        assert_eq!(heap.allocate(DescriptorKind::ConstantView), Ok(0));
    }

    #[test]
    fn released_slot_waits_for_its_fence() {
        let mut heap = DescriptorHeapAllocator::new(&settings(4, ExhaustionPolicy::Fail));
        let index = heap.allocate(DescriptorKind::ReadView).unwrap();
        heap.begin_submission(FenceValue(5));
        heap.release(DescriptorKind::ReadView, index).unwrap();
        assert_eq!(
            heap.slot_state(DescriptorKind::ReadView, index),
            SlotState::PendingRelease(FenceValue(5))
        );

        assert!(heap.reclaim(FenceValue(3)).is_empty());
        assert_eq!(
            heap.reclaim(FenceValue(5)),
            vec![DescriptorSlot::new(DescriptorKind::ReadView, index)]
        );
        assert!(heap.reclaim(FenceValue(5)).is_empty());
        assert_eq!(heap.slot_state(DescriptorKind::ReadView, index), SlotState::Free);
    }

    #[test]
    fn reclaimed_slot_is_reused_first() {
        let mut heap = DescriptorHeapAllocator::new(&settings(8, ExhaustionPolicy::Fail));
        for _ in 0..3 {
            heap.allocate(DescriptorKind::ReadView).unwrap();
        }
        heap.release(DescriptorKind::ReadView, 1).unwrap();
        heap.reclaim(FenceValue(1));
        assert_eq!(heap.allocate(DescriptorKind::ReadView), Ok(1));
        assert_eq!(heap.allocate(DescriptorKind::ReadView), Ok(3));
    }

    #[test]
    fn pending_slot_is_not_reused_before_retirement() {
        let mut heap = DescriptorHeapAllocator::new(&settings(2, ExhaustionPolicy::Fail));
        let a = heap.allocate(DescriptorKind::ReadView).unwrap();
        heap.allocate(DescriptorKind::ReadView).unwrap();
        heap.release(DescriptorKind::ReadView, a).unwrap();
        assert!(matches!(
            heap.allocate(DescriptorKind::ReadView),
            Err(DescriptorError::HeapExhausted { .. })
        ));
        let stats = heap.stats(DescriptorKind::ReadView);
        assert_eq!((stats.occupied, stats.pending_release, stats.free()), (1, 1, 0));
    }

    #[test]
    fn double_release_fails_loudly() {
        let mut heap = DescriptorHeapAllocator::new(&settings(4, ExhaustionPolicy::Fail));
        let index = heap.allocate(DescriptorKind::WriteView).unwrap();
        heap.release(DescriptorKind::WriteView, index).unwrap();
        assert_eq!(
            heap.release(DescriptorKind::WriteView, index),
            Err(DescriptorError::DoubleRelease {
                kind: DescriptorKind::WriteView,
                index
            })
        );
        assert_eq!(
            heap.release(DescriptorKind::WriteView, 3),
            Err(DescriptorError::DoubleRelease {
                kind: DescriptorKind::WriteView,
                index: 3
            })
        );
    }

    #[test]
    fn release_outside_capacity_is_rejected() {
        let mut heap = DescriptorHeapAllocator::new(&settings(4, ExhaustionPolicy::Fail));
        assert!(matches!(
            heap.release(DescriptorKind::ReadView, 4),
            Err(DescriptorError::SlotOutOfRange { index: 4, capacity: 4, .. })
        ));
    }

    #[test]
    fn discard_frees_immediately() {
        let mut heap = DescriptorHeapAllocator::new(&settings(1, ExhaustionPolicy::Fail));
        let index = heap.allocate(DescriptorKind::ReadView).unwrap();
        heap.discard_unsubmitted(DescriptorKind::ReadView, index).unwrap();
        assert_eq!(heap.allocate(DescriptorKind::ReadView), Ok(index));
    }

    #[test]
    fn random_sequences_never_duplicate_occupied_indices() {
        let mut heap = DescriptorHeapAllocator::new(&settings(16, ExhaustionPolicy::Fail));
        let mut live: Vec<u32> = Vec::new();
        // Small LCG keeps the sequence deterministic.
        let mut seed: u32 = 0x2545_f491;
        let mut fence = 1u64;
        for _ in 0..2_000 {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            match seed >> 30 {
                0 | 1 => {
                    if let Ok(index) = heap.allocate(DescriptorKind::ReadView) {
                        assert!(!live.contains(&index), "index {index} handed out twice");
                        live.push(index);
                    }
                }
                2 if !live.is_empty() => {
                    let index = live.swap_remove((seed as usize >> 8) % live.len());
                    heap.release(DescriptorKind::ReadView, index).unwrap();
                }
                _ => {
                    fence += 1;
                    heap.begin_submission(FenceValue(fence));
                    heap.reclaim(FenceValue(fence - 2));
                }
            }
            let unique: HashSet<_> = live.iter().collect();
            assert_eq!(unique.len(), live.len());
            assert_eq!(heap.stats(DescriptorKind::ReadView).occupied as usize, live.len());
        }
    }

    #[test]
    fn wait_policy_blocks_on_oldest_pending_release() {
        let mut heap = DescriptorHeapAllocator::new(&settings(
            1,
            ExhaustionPolicy::WaitForGpu { timeout_ms: 5 },
        ));
        let timeline = ManualTimeline {
            submitted: FenceValue(3),
            completed: Mutex::new(FenceValue(1)),
            hang: false,
        };
        let index = heap.allocate_or_wait(DescriptorKind::ReadView, &timeline).unwrap();
        heap.begin_submission(FenceValue(3));
        heap.release(DescriptorKind::ReadView, index).unwrap();

        assert_eq!(heap.allocate_or_wait(DescriptorKind::ReadView, &timeline), Ok(index));
        assert_eq!(*timeline.completed.lock().unwrap(), FenceValue(3));
    }

    #[test]
    fn wait_policy_reports_timeout() {
        let mut heap = DescriptorHeapAllocator::new(&settings(
            1,
            ExhaustionPolicy::WaitForGpu { timeout_ms: 5 },
        ));
        let timeline = ManualTimeline {
            submitted: FenceValue(2),
            completed: Mutex::new(FenceValue(0)),
            hang: true,
        };
        let index = heap.allocate(DescriptorKind::ReadView).unwrap();
        heap.begin_submission(FenceValue(2));
        heap.release(DescriptorKind::ReadView, index).unwrap();
        assert!(matches!(
            heap.allocate_or_wait(DescriptorKind::ReadView, &timeline),
            Err(DescriptorError::Device(DeviceError::Timeout { timeout_ms: 5, .. }))
        ));
    }

    #[test]
    fn wait_policy_does_not_wait_on_unsubmitted_work() {
        let mut heap = DescriptorHeapAllocator::new(&settings(
            1,
            ExhaustionPolicy::WaitForGpu { timeout_ms: 5 },
        ));
        let timeline = ManualTimeline {
            submitted: FenceValue(1),
            completed: Mutex::new(FenceValue(1)),
            hang: false,
        };
        let index = heap.allocate(DescriptorKind::ReadView).unwrap();
        heap.begin_submission(FenceValue(2));
        heap.release(DescriptorKind::ReadView, index).unwrap();
        assert!(matches!(
            heap.allocate_or_wait(DescriptorKind::ReadView, &timeline),
            Err(DescriptorError::HeapExhausted { .. })
        ));
    }

    #[test]
    fn abandon_drops_pending_releases() {
        let mut heap = DescriptorHeapAllocator::new(&settings(2, ExhaustionPolicy::Fail));
        let index = heap.allocate(DescriptorKind::ReadView).unwrap();
        heap.release(DescriptorKind::ReadView, index).unwrap();
        assert_eq!(heap.abandon_pending(), 1);
        assert!(heap.reclaim(FenceValue(100)).is_empty());
    }
}
