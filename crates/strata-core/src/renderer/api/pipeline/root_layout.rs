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

//! The two fixed root layouts every bindless pipeline is created against.
//!
//! Both layouts expose the same three heap tables (one per
//! [`DescriptorKind`]), one constant view slot for per-pass data
//! (camera, time, viewport) and a 128-byte block of inline constants.
//! A pipeline whose binding needs fall outside this shape cannot be
//! created; per-pass data must go through the pass constant view instead
//! of growing the inline block.

use super::inline::{INLINE_CONSTANT_BUDGET_BYTES, INLINE_CONSTANT_MAX_WORDS};
use crate::renderer::api::core::DescriptorHeapSettings;
use crate::renderer::api::descriptor::{DescriptorKind, DescriptorKinds};
use crate::renderer::error::LayoutError;

/// Which of the two fixed layouts a pipeline uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootLayoutKind {
    /// Layout for compute pipelines.
    Compute,
    /// Layout for render pipelines.
    Graphics,
}

/// What a pipeline needs to bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassBindingRequest {
    /// The pipeline stage family.
    pub stage: RootLayoutKind,
    /// Bytes of inline constants the pipeline reads.
    pub inline_constant_bytes: u32,
    /// Heap tables the shaders index into.
    pub heap_kinds: DescriptorKinds,
    /// Whether the pass constant view is read.
    pub uses_pass_constants: bool,
    /// Fixed-function vertex buffer bindings requested.
    pub vertex_buffer_bindings: u32,
    /// Bind groups requested beyond the heap tables.
    pub extra_bind_groups: u32,
}

impl PassBindingRequest {
    /// A compute request reading `inline_words` words of inline constants.
    pub const fn compute(inline_words: u32, heap_kinds: DescriptorKinds) -> Self {
        Self {
            stage: RootLayoutKind::Compute,
            inline_constant_bytes: inline_words * 4,
            heap_kinds,
            uses_pass_constants: false,
            vertex_buffer_bindings: 0,
            extra_bind_groups: 0,
        }
    }

    /// A graphics request reading `inline_words` words of inline constants.
    pub const fn graphics(inline_words: u32, heap_kinds: DescriptorKinds) -> Self {
        Self {
            stage: RootLayoutKind::Graphics,
            inline_constant_bytes: inline_words * 4,
            heap_kinds,
            uses_pass_constants: true,
            vertex_buffer_bindings: 0,
            extra_bind_groups: 0,
        }
    }
}

/// One of the two fixed layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootLayout {
    /// The layout kind.
    pub kind: RootLayoutKind,
    /// Size of the inline constant block in bytes.
    pub inline_constant_bytes: u32,
    /// Size of each heap table, indexed by [`DescriptorKind::table_index`].
    pub heap_table_sizes: [u32; 3],
    /// Whether the layout exposes the per-pass constant view slot.
    pub pass_constant_slot: bool,
}

impl RootLayout {
    /// Size of the heap table for `kind`.
    #[inline]
    pub fn table_size(&self, kind: DescriptorKind) -> u32 {
        self.heap_table_sizes[kind.table_index()]
    }
}

/// The compute and graphics layouts, built once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootLayouts {
    compute: RootLayout,
    graphics: RootLayout,
}

impl RootLayouts {
    /// Builds both layouts for the configured heap sizes.
    ///
    /// ## Errors
    /// * `LayoutError::Unsupported` - if a heap table would be empty.
    pub fn build(heaps: &DescriptorHeapSettings) -> Result<Self, LayoutError> {
        let sizes = [heaps.constant_views, heaps.read_views, heaps.write_views];
        for kind in DescriptorKind::ALL {
            if sizes[kind.table_index()] == 0 {
                return Err(LayoutError::Unsupported {
                    pipeline: "root layout".to_string(),
                    reason: format!("the {kind} heap table has no slots"),
                });
            }
        }
        debug_assert_eq!(INLINE_CONSTANT_MAX_WORDS * 4, INLINE_CONSTANT_BUDGET_BYTES as usize);
        let make = |kind| RootLayout {
            kind,
            inline_constant_bytes: INLINE_CONSTANT_BUDGET_BYTES,
            heap_table_sizes: sizes,
            pass_constant_slot: true,
        };
        log::info!(
            "Built bindless root layouts (heap tables: {} constant / {} read / {} write, {} inline bytes)",
            sizes[0],
            sizes[1],
            sizes[2],
            INLINE_CONSTANT_BUDGET_BYTES
        );
        Ok(Self {
            compute: make(RootLayoutKind::Compute),
            graphics: make(RootLayoutKind::Graphics),
        })
    }

    /// Returns the layout of the given kind.
    #[inline]
    pub fn get(&self, kind: RootLayoutKind) -> &RootLayout {
        match kind {
            RootLayoutKind::Compute => &self.compute,
            RootLayoutKind::Graphics => &self.graphics,
        }
    }

    /// Maps a pipeline's binding needs onto one of the two layouts.
    ///
    /// A failure here is fatal for the pipeline: it must be rewritten to go
    /// through the heap tables or the pass constant view.
    ///
    /// ## Errors
    /// * `LayoutError::InlineBudgetExceeded` - if the inline block is too small.
    /// * `LayoutError::Unsupported` - for any binding the layouts cannot express.
    pub fn resolve(&self, pipeline: &str, request: &PassBindingRequest) -> Result<&RootLayout, LayoutError> {
        let unsupported = |reason: &str| LayoutError::Unsupported {
            pipeline: pipeline.to_string(),
            reason: reason.to_string(),
        };

        if request.inline_constant_bytes > INLINE_CONSTANT_BUDGET_BYTES {
            log::error!(
                "Pipeline '{pipeline}' asks for {} inline bytes, budget is {INLINE_CONSTANT_BUDGET_BYTES}",
                request.inline_constant_bytes
            );
            return Err(LayoutError::InlineBudgetExceeded {
                requested: request.inline_constant_bytes,
                budget: INLINE_CONSTANT_BUDGET_BYTES,
            });
        }
        if request.inline_constant_bytes % 4 != 0 {
            return Err(unsupported("inline constants must be whole 32-bit words"));
        }
        if request.vertex_buffer_bindings > 0 {
            return Err(unsupported(
                "vertex buffers cannot be bound, fetch vertices through a read view",
            ));
        }
        if request.extra_bind_groups > 0 {
            return Err(unsupported(
                "extra bind groups cannot be bound, pass per-pass data through the pass constant view",
            ));
        }
        if request.heap_kinds.is_empty() && request.inline_constant_bytes > 0 {
            return Err(unsupported(
                "inline constants carry heap indices but no heap table is used",
            ));
        }

        let layout = self.get(request.stage);
        log::debug!(
            "Resolved pipeline '{pipeline}' onto the {:?} layout ({} inline bytes, tables {:?})",
            layout.kind,
            request.inline_constant_bytes,
            request.heap_kinds
        );
        Ok(layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layouts() -> RootLayouts {
        RootLayouts::build(&DescriptorHeapSettings::default()).unwrap()
    }

    #[test]
    fn both_layouts_share_the_inline_budget() {
        let layouts = layouts();
        for kind in [RootLayoutKind::Compute, RootLayoutKind::Graphics] {
            let layout = layouts.get(kind);
            assert_eq!(layout.kind, kind);
            assert_eq!(layout.inline_constant_bytes, 128);
            assert!(layout.pass_constant_slot);
        }
    }

    #[test]
    fn empty_heap_table_is_rejected() {
        let heaps = DescriptorHeapSettings {
            write_views: 0,
            ..DescriptorHeapSettings::default()
        };
        assert!(matches!(
            RootLayouts::build(&heaps),
            Err(LayoutError::Unsupported { .. })
        ));
    }

    #[test]
    fn request_within_budget_resolves_to_its_stage() {
        let layouts = layouts();
        let request = PassBindingRequest::compute(9, DescriptorKinds::ALL);
        let layout = layouts.resolve("cull", &request).unwrap();
        assert_eq!(layout.kind, RootLayoutKind::Compute);
    }

    #[test]
    fn oversized_inline_block_is_fatal() {
        let layouts = layouts();
        let request = PassBindingRequest::graphics(33, DescriptorKinds::READ_VIEW);
        assert_eq!(
            layouts.resolve("fat", &request),
            Err(LayoutError::InlineBudgetExceeded {
                requested: 132,
                budget: 128
            })
        );
    }

    #[test]
    fn vertex_buffers_and_extra_groups_are_unsupported() {
        let layouts = layouts();
        let mut request = PassBindingRequest::graphics(4, DescriptorKinds::READ_VIEW);
        request.vertex_buffer_bindings = 1;
        assert!(matches!(
            layouts.resolve("legacy", &request),
            Err(LayoutError::Unsupported { .. })
        ));

        let mut request = PassBindingRequest::graphics(4, DescriptorKinds::READ_VIEW);
        request.extra_bind_groups = 2;
        assert!(matches!(
            layouts.resolve("legacy", &request),
            Err(LayoutError::Unsupported { .. })
        ));
    }
}
