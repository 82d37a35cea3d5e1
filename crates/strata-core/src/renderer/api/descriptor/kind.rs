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

//! The three descriptor index spaces of the bindless heap.

use crate::strata_bitflags;
use std::fmt;

/// The kind of view a descriptor slot exposes to shaders.
///
/// Each kind owns an independent, dense index space in the bindless heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DescriptorKind {
    /// A constant (uniform) buffer view.
    ConstantView,
    /// A shader-readable view.
    ReadView,
    /// A shader-writable view.
    WriteView,
}

impl DescriptorKind {
    /// Every kind, in heap table order.
    pub const ALL: [DescriptorKind; 3] = [
        DescriptorKind::ConstantView,
        DescriptorKind::ReadView,
        DescriptorKind::WriteView,
    ];

    /// Position of the kind's table in the heap.
    #[inline]
    pub const fn table_index(self) -> usize {
        match self {
            DescriptorKind::ConstantView => 0,
            DescriptorKind::ReadView => 1,
            DescriptorKind::WriteView => 2,
        }
    }

    /// The single-kind usage set.
    #[inline]
    pub const fn as_usage(self) -> DescriptorKinds {
        match self {
            DescriptorKind::ConstantView => DescriptorKinds::CONSTANT_VIEW,
            DescriptorKind::ReadView => DescriptorKinds::READ_VIEW,
            DescriptorKind::WriteView => DescriptorKinds::WRITE_VIEW,
        }
    }
}

impl fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DescriptorKind::ConstantView => "constant view",
            DescriptorKind::ReadView => "read view",
            DescriptorKind::WriteView => "write view",
        };
        f.write_str(name)
    }
}

strata_bitflags! {
    /// The set of descriptor kinds a resource is created to support.
    pub struct DescriptorKinds: u8 {
        /// The resource gets a constant view slot.
        const CONSTANT_VIEW = 1 << 0;
        /// The resource gets a read view slot.
        const READ_VIEW = 1 << 1;
        /// The resource gets a write view slot.
        const WRITE_VIEW = 1 << 2;
    }
}

impl DescriptorKinds {
    /// Iterates over the kinds in the set, in heap table order.
    pub fn iter(self) -> impl Iterator<Item = DescriptorKind> {
        DescriptorKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(kind.as_usage()))
    }

    /// Returns `true` if `kind` is part of the set.
    #[inline]
    pub const fn has(self, kind: DescriptorKind) -> bool {
        self.contains(kind.as_usage())
    }
}

impl From<DescriptorKind> for DescriptorKinds {
    fn from(kind: DescriptorKind) -> Self {
        kind.as_usage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iter_follows_table_order() {
        let kinds = DescriptorKinds::WRITE_VIEW | DescriptorKinds::CONSTANT_VIEW;
        let collected: Vec<_> = kinds.iter().collect();
        assert_eq!(
            collected,
            vec![DescriptorKind::ConstantView, DescriptorKind::WriteView]
        );
    }

    #[test]
    fn table_indices_are_dense() {
        for (i, kind) in DescriptorKind::ALL.iter().enumerate() {
            assert_eq!(kind.table_index(), i);
            assert!(DescriptorKinds::ALL.has(*kind));
        }
    }
}
