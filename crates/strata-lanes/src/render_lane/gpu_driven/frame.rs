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


//! The per-frame stage machine of the GPU-driven lane.

use crate::error::CullingError;

/// Where a frame is in the cull-then-draw sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrameStage {
    /// Nothing recorded yet.
    #[default]
    Idle,
    /// The culling dispatch is recorded.
    Dispatched,
    /// The compute-to-indirect barrier is recorded.
    Barrier,
    /// The indirect draws are recorded.
    DrawIndirect,
}

impl FrameStage {
    /// The only stage reachable from `self`.
    pub const fn next(self) -> FrameStage {
        match self {
            FrameStage::Idle => FrameStage::Dispatched,
            FrameStage::Dispatched => FrameStage::Barrier,
            FrameStage::Barrier => FrameStage::DrawIndirect,
            FrameStage::DrawIndirect => FrameStage::Idle,
        }
    }
}

/// Enforces `Idle -> Dispatched -> Barrier -> DrawIndirect -> Idle`.
#[derive(Debug, Default)]
pub struct FrameStateMachine {
    stage: FrameStage,
    completed_frames: u64,
}

impl FrameStateMachine {
    /// A machine in [`FrameStage::Idle`].
    pub fn new() -> Self {
        Self::default()
    }

    /// The current stage.
    pub fn stage(&self) -> FrameStage {
        self.stage
    }

    /// Number of frames that went all the way back to `Idle`.
    pub fn completed_frames(&self) -> u64 {
        self.completed_frames
    }

    /// Moves to `to`.
    /// ## Errors
    /// * `CullingError::InvalidTransition` - if `to` does not follow the current stage.
    pub fn advance(&mut self, to: FrameStage) -> Result<(), CullingError> {
        if self.stage.next() != to {
            log::error!("Rejected frame transition {:?} -> {to:?}", self.stage);
            return Err(CullingError::InvalidTransition {
                from: self.stage,
                to,
            });
        }
        if to == FrameStage::Idle {
            self.completed_frames += 1;
        }
        self.stage = to;
        Ok(())
    }

    /// Drops a half-recorded frame, e.g. after device loss.
    pub fn reset(&mut self) {
        if self.stage != FrameStage::Idle {
            log::warn!("Abandoning a frame recorded up to {:?}", self.stage);
        }
        self.stage = FrameStage::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_cycle_returns_to_idle() {
        let mut frame = FrameStateMachine::new();
        for stage in [
            FrameStage::Dispatched,
            FrameStage::Barrier,
            FrameStage::DrawIndirect,
            FrameStage::Idle,
        ] {
            frame.advance(stage).unwrap();
        }
        assert_eq!(frame.stage(), FrameStage::Idle);
        assert_eq!(frame.completed_frames(), 1);
    }

    #[test]
    fn skipping_the_barrier_is_rejected() {
        let mut frame = FrameStateMachine::new();
        frame.advance(FrameStage::Dispatched).unwrap();
        let err = frame.advance(FrameStage::DrawIndirect).unwrap_err();
        assert!(matches!(
            err,
            CullingError::InvalidTransition {
                from: FrameStage::Dispatched,
                to: FrameStage::DrawIndirect
            }
        ));
        assert_eq!(frame.stage(), FrameStage::Dispatched);
    }

    #[test]
    fn idle_cannot_draw_or_stay_idle() {
        let mut frame = FrameStateMachine::new();
        assert!(frame.advance(FrameStage::DrawIndirect).is_err());
        assert!(frame.advance(FrameStage::Idle).is_err());
        assert_eq!(frame.completed_frames(), 0);
    }

    #[test]
    fn reset_abandons_the_frame() {
        let mut frame = FrameStateMachine::new();
        frame.advance(FrameStage::Dispatched).unwrap();
        frame.reset();
        assert_eq!(frame.stage(), FrameStage::Idle);
        assert!(frame.advance(FrameStage::Dispatched).is_ok());
    }
}
