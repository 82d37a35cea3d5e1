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

//! The inline constant block pushed before each dispatch or draw.

use crate::renderer::api::descriptor::{DescriptorHandle, LiteDescriptorHandle};
use crate::renderer::error::LayoutError;

/// Size of the inline constant block in bytes.
pub const INLINE_CONSTANT_BUDGET_BYTES: u32 = 128;

/// Size of the inline constant block in 32-bit words.
pub const INLINE_CONSTANT_MAX_WORDS: usize = (INLINE_CONSTANT_BUDGET_BYTES / 4) as usize;

/// A bounded list of 32-bit words.
///
/// A lite handle takes one word, a typed handle two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InlineConstants {
    words: [u32; INLINE_CONSTANT_MAX_WORDS],
    len: usize,
}

impl Default for InlineConstants {
    fn default() -> Self {
        Self::new()
    }
}

impl InlineConstants {
    /// An empty block.
    pub const fn new() -> Self {
        Self {
            words: [0; INLINE_CONSTANT_MAX_WORDS],
            len: 0,
        }
    }

    /// Copies `words` into a new block.
    pub fn from_words(words: &[u32]) -> Result<Self, LayoutError> {
        let mut block = Self::new();
        for &word in words {
            block.push_u32(word)?;
        }
        Ok(block)
    }

    /// Appends a raw word.
    pub fn push_u32(&mut self, value: u32) -> Result<&mut Self, LayoutError> {
        if self.len == INLINE_CONSTANT_MAX_WORDS {
            return Err(LayoutError::InlineBudgetExceeded {
                requested: (self.len as u32 + 1) * 4,
                budget: INLINE_CONSTANT_BUDGET_BYTES,
            });
        }
        self.words[self.len] = value;
        self.len += 1;
        Ok(self)
    }

    /// Appends a float as its bit pattern.
    pub fn push_f32(&mut self, value: f32) -> Result<&mut Self, LayoutError> {
        self.push_u32(value.to_bits())
    }

    /// Appends a lite handle (one word).
    pub fn push_lite(&mut self, handle: LiteDescriptorHandle) -> Result<&mut Self, LayoutError> {
        self.push_u32(handle.index())
    }

    /// Appends a typed handle (two words).
    pub fn push_typed<T>(&mut self, handle: DescriptorHandle<T>) -> Result<&mut Self, LayoutError> {
        if self.len + 2 > INLINE_CONSTANT_MAX_WORDS {
            return Err(LayoutError::InlineBudgetExceeded {
                requested: (self.len as u32 + 2) * 4,
                budget: INLINE_CONSTANT_BUDGET_BYTES,
            });
        }
        let [read, write] = handle.to_words();
        self.push_u32(read)?;
        self.push_u32(write)
    }

    /// The words pushed so far.
    #[inline]
    pub fn words(&self) -> &[u32] {
        &self.words[..self.len]
    }

    /// The words pushed so far, as bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.words())
    }

    /// Number of bytes in use.
    #[inline]
    pub fn byte_len(&self) -> u32 {
        (self.len * 4) as u32
    }

    /// Returns `true` if nothing was pushed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_take_one_or_two_words() {
        let mut block = InlineConstants::new();
        block
            .push_lite(LiteDescriptorHandle::new(4))
            .unwrap()
            .push_typed(DescriptorHandle::<u32>::new(5, 6))
            .unwrap();
        assert_eq!(block.words(), &[4, 5, 6]);
        assert_eq!(block.byte_len(), 12);
        assert_eq!(block.as_bytes().len(), 12);
    }

    #[test]
    fn block_stops_at_128_bytes() {
        let mut block = InlineConstants::new();
        for i in 0..32 {
            block.push_u32(i).unwrap();
        }
        assert_eq!(block.byte_len(), INLINE_CONSTANT_BUDGET_BYTES);
        assert_eq!(
            block.push_u32(99),
            Err(LayoutError::InlineBudgetExceeded {
                requested: 132,
                budget: 128
            })
        );
    }

    #[test]
    fn typed_handle_is_not_split_across_the_limit() {
        let mut block = InlineConstants::from_words(&[0; 31]).unwrap();
        assert!(block.push_typed(DescriptorHandle::<u32>::new(1, 2)).is_err());
        assert_eq!(block.words().len(), 31);
    }
}
