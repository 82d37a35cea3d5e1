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

//! GPU timeline synchronization primitives.

use std::fmt;

/// A point on the GPU timeline.
///
/// Every submission signals a strictly larger value than the previous one.
/// Work tagged with a fence value may be considered finished by the GPU once
/// the completed fence is greater than or equal to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FenceValue(pub u64);

impl FenceValue {
    /// The value observed before any submission has completed.
    pub const ZERO: Self = Self(0);

    /// Returns the value signalled by the submission following this one.
    #[inline]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns `true` if work tagged with `self` is finished once `completed`
    /// has been reached.
    #[inline]
    pub const fn is_retired_by(self, completed: FenceValue) -> bool {
        self.0 <= completed.0
    }
}

impl fmt::Display for FenceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fence#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retirement_is_inclusive() {
        assert!(FenceValue(5).is_retired_by(FenceValue(5)));
        assert!(FenceValue(5).is_retired_by(FenceValue(9)));
        assert!(!FenceValue(5).is_retired_by(FenceValue(3)));
        assert_eq!(FenceValue::ZERO.next(), FenceValue(1));
    }
}
