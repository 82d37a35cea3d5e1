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

//! A FIFO of released items waiting for the GPU to finish with them.

use std::collections::VecDeque;
use strata_core::renderer::FenceValue;

/// An item tagged with the fence of the submission that may still use it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredReleaseEntry<T> {
    /// The released item.
    pub item: T,
    /// The item may be reused once the completed fence reaches this value.
    pub retire_at: FenceValue,
}

/// Released items ordered by submission.
///
/// Fence tags are non-decreasing from front to back, so draining stops at
/// the first entry that is still in flight.
#[derive(Debug)]
pub struct DeferredReleaseQueue<T> {
    entries: VecDeque<DeferredReleaseEntry<T>>,
}

impl<T> Default for DeferredReleaseQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DeferredReleaseQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Queues `item` until `retire_at` is completed.
    ///
    /// A tag lower than the newest queued one is raised to it: the item then
    /// retires slightly later than needed, never earlier.
    pub fn enqueue(&mut self, item: T, retire_at: FenceValue) {
        let retire_at = match self.entries.back() {
            Some(last) if last.retire_at > retire_at => {
                log::warn!(
                    "Release tagged {retire_at} queued behind {}, delaying it to keep submission order",
                    last.retire_at
                );
                last.retire_at
            }
            _ => retire_at,
        };
        self.entries.push_back(DeferredReleaseEntry { item, retire_at });
    }

    /// Removes and returns every item whose fence is `<= completed`, in
    /// submission order.
    pub fn drain(&mut self, completed: FenceValue) -> Vec<T> {
        let ready = self
            .entries
            .iter()
            .take_while(|entry| entry.retire_at.is_retired_by(completed))
            .count();
        self.entries.drain(..ready).map(|entry| entry.item).collect()
    }

    /// The fence of the oldest queued item.
    pub fn oldest_pending(&self) -> Option<FenceValue> {
        self.entries.front().map(|entry| entry.retire_at)
    }

    /// Iterates over the queued entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &DeferredReleaseEntry<T>> {
        self.entries.iter()
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every queued item without returning it.
    ///
    /// Only valid when the timeline the fences refer to no longer exists,
    /// i.e. after device loss.
    pub fn abandon(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_returns_only_retired_items_in_order() {
        let mut queue = DeferredReleaseQueue::new();
        queue.enqueue("a", FenceValue(1));
        queue.enqueue("b", FenceValue(2));
        queue.enqueue("c", FenceValue(2));
        queue.enqueue("d", FenceValue(4));

        assert!(queue.drain(FenceValue::ZERO).is_empty());
        assert_eq!(queue.drain(FenceValue(2)), vec!["a", "b", "c"]);
        assert_eq!(queue.oldest_pending(), Some(FenceValue(4)));
        assert!(queue.drain(FenceValue(3)).is_empty());
        assert_eq!(queue.drain(FenceValue(10)), vec!["d"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn item_released_at_five_is_returned_exactly_once() {
        let mut queue = DeferredReleaseQueue::new();
        queue.enqueue(42u32, FenceValue(5));
        assert!(queue.drain(FenceValue(3)).is_empty());
        assert_eq!(queue.drain(FenceValue(5)), vec![42]);
        assert!(queue.drain(FenceValue(5)).is_empty());
        assert!(queue.drain(FenceValue(6)).is_empty());
    }

    #[test]
    fn out_of_order_tag_is_delayed_not_advanced() {
        let mut queue = DeferredReleaseQueue::new();
        queue.enqueue(1u32, FenceValue(6));
        queue.enqueue(2u32, FenceValue(3));
        assert!(queue.drain(FenceValue(3)).is_empty());
        assert_eq!(queue.drain(FenceValue(6)), vec![1, 2]);
    }

    #[test]
    fn abandon_clears_everything() {
        let mut queue = DeferredReleaseQueue::new();
        queue.enqueue(1u32, FenceValue(1));
        queue.enqueue(2u32, FenceValue(2));
        assert_eq!(queue.abandon(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.oldest_pending(), None);
    }
}
