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


//! Errors of the GPU-driven lanes.

use crate::render_lane::gpu_driven::FrameStage;
use strata_core::renderer::{
    DescriptorError, DeviceError, LayoutError, RenderError, SceneBufferError, SettingsError,
};
use thiserror::Error;

/// An error raised while building or recording a GPU-driven frame.
#[derive(Debug, Error)]
pub enum CullingError {
    /// The frame was driven through its stages out of order.
    #[error("Invalid frame transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// The stage the frame was in.
        from: FrameStage,
        /// The stage that was requested.
        to: FrameStage,
    },

    /// The renderer lost its device earlier and must be rebuilt.
    #[error("The renderer needs to be rebuilt after device loss: {reason}")]
    RequiresReinitialization {
        /// Why the device was lost.
        reason: String,
    },

    /// A GPU-side buffer the lane needs was never created.
    #[error("Missing GPU resource: {0}")]
    MissingResource(&'static str),

    /// An error from the bindless core.
    #[error("{0}")]
    Render(#[from] RenderError),
}

impl CullingError {
    /// Returns `true` if the error means the device is gone.
    pub fn is_device_lost(&self) -> bool {
        match self {
            CullingError::RequiresReinitialization { .. } => true,
            CullingError::Render(err) => err.is_device_lost(),
            _ => false,
        }
    }
}

impl From<DeviceError> for CullingError {
    fn from(err: DeviceError) -> Self {
        CullingError::Render(err.into())
    }
}

impl From<DescriptorError> for CullingError {
    fn from(err: DescriptorError) -> Self {
        CullingError::Render(err.into())
    }
}

impl From<SceneBufferError> for CullingError {
    fn from(err: SceneBufferError) -> Self {
        CullingError::Render(err.into())
    }
}

impl From<LayoutError> for CullingError {
    fn from(err: LayoutError) -> Self {
        CullingError::Render(err.into())
    }
}

impl From<SettingsError> for CullingError {
    fn from(err: SettingsError) -> Self {
        CullingError::Render(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_loss_is_detected_through_wrapping() {
        let err: CullingError = DeviceError::DeviceLost {
            reason: "hang".to_string(),
        }
        .into();
        assert!(err.is_device_lost());
        assert_eq!(
            err.to_string(),
            "Device error: The GPU device was lost: hang"
        );

        let err = CullingError::InvalidTransition {
            from: FrameStage::Idle,
            to: FrameStage::Barrier,
        };
        assert!(!err.is_device_lost());
        assert_eq!(err.to_string(), "Invalid frame transition from Idle to Barrier");
    }
}
