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

//! Defines the hierarchy of error types for the bindless core.

use crate::renderer::api::descriptor::DescriptorKind;
use crate::renderer::api::resource::ResourceClass;
use crate::renderer::api::scene::SceneBufferClass;
use crate::renderer::api::sync::FenceValue;
use std::fmt;

/// An error raised by the GPU device or its timeline.
///
/// `DeviceLost` and `Timeout` are fatal for the frame being recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The device was lost. Every in-flight submission is gone.
    DeviceLost {
        /// Backend-provided reason.
        reason: String,
    },
    /// Waiting on a fence took longer than allowed.
    Timeout {
        /// The fence being waited on.
        waiting_for: FenceValue,
        /// The last fence the GPU completed.
        completed: FenceValue,
        /// The timeout that elapsed.
        timeout_ms: u64,
    },
    /// A resource id does not name a live resource.
    ResourceNotFound(String),
    /// An access went outside a resource's bounds.
    OutOfBounds(String),
    /// The operation is not valid in the current state.
    InvalidOperation(String),
}

impl DeviceError {
    /// Returns `true` for errors after which the device must be rebuilt.
    #[inline]
    pub fn is_device_lost(&self) -> bool {
        matches!(self, DeviceError::DeviceLost { .. })
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::DeviceLost { reason } => write!(f, "The GPU device was lost: {reason}"),
            DeviceError::Timeout {
                waiting_for,
                completed,
                timeout_ms,
            } => write!(
                f,
                "Timed out after {timeout_ms} ms waiting for {waiting_for} (completed: {completed})"
            ),
            DeviceError::ResourceNotFound(what) => write!(f, "Resource not found: {what}"),
            DeviceError::OutOfBounds(what) => write!(f, "Resource access out of bounds: {what}"),
            DeviceError::InvalidOperation(what) => write!(f, "Invalid device operation: {what}"),
        }
    }
}

impl std::error::Error for DeviceError {}

/// An error related to descriptor slots and descriptor sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    /// Every slot of a heap table is occupied or pending release.
    HeapExhausted {
        /// The exhausted table.
        kind: DescriptorKind,
        /// Its capacity.
        capacity: u32,
    },
    /// The resource was not created with this descriptor kind.
    UsageNotConfigured {
        /// The requested kind.
        kind: DescriptorKind,
    },
    /// The kind can never describe this class of resource.
    InvalidDescriptorType {
        /// The requested kind.
        kind: DescriptorKind,
        /// The resource class.
        resource: ResourceClass,
    },
    /// A slot was released while already free or pending release.
    DoubleRelease {
        /// The slot's table.
        kind: DescriptorKind,
        /// The slot index.
        index: u32,
    },
    /// An index outside a table's capacity.
    SlotOutOfRange {
        /// The table.
        kind: DescriptorKind,
        /// The offending index.
        index: u32,
        /// The table capacity.
        capacity: u32,
    },
    /// A resource was configured with no descriptor kind at all.
    EmptyUsage,
    /// Writing a descriptor into the heap failed on the device.
    Device(DeviceError),
}

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorError::HeapExhausted { kind, capacity } => {
                write!(f, "The {kind} heap is exhausted ({capacity} slots)")
            }
            DescriptorError::UsageNotConfigured { kind } => {
                write!(f, "The resource was not created with a {kind}")
            }
            DescriptorError::InvalidDescriptorType { kind, resource } => {
                write!(f, "A {kind} cannot describe {resource} resources")
            }
            DescriptorError::DoubleRelease { kind, index } => {
                write!(f, "Double release of {kind} slot {index}")
            }
            DescriptorError::SlotOutOfRange {
                kind,
                index,
                capacity,
            } => write!(f, "{kind} slot {index} is outside the heap capacity {capacity}"),
            DescriptorError::EmptyUsage => {
                write!(f, "A resource must be configured with at least one descriptor kind")
            }
            DescriptorError::Device(err) => write!(f, "Descriptor write failed: {err}"),
        }
    }
}

impl std::error::Error for DescriptorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DescriptorError::Device(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DeviceError> for DescriptorError {
    fn from(err: DeviceError) -> Self {
        DescriptorError::Device(err)
    }
}

/// An error related to the global scene buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneBufferError {
    /// Every slot of a record class is in use.
    CapacityExceeded {
        /// The full class.
        class: SceneBufferClass,
        /// Its capacity.
        capacity: u64,
    },
    /// No free byte range is large enough.
    ByteBudgetExceeded {
        /// The byte class (vertex or index).
        class: SceneBufferClass,
        /// Bytes requested.
        requested: u64,
        /// Bytes still free, possibly fragmented.
        available: u64,
    },
    /// An index does not name a live record.
    InvalidSlot {
        /// The record class.
        class: SceneBufferClass,
        /// The offending index.
        index: u32,
    },
    /// A record references a slot that is not live.
    DanglingReference {
        /// The referencing class.
        from: SceneBufferClass,
        /// The referenced class.
        to: SceneBufferClass,
        /// The referenced index.
        index: u32,
    },
    /// A record cannot be removed while others reference it.
    InUse {
        /// The record class.
        class: SceneBufferClass,
        /// The record index.
        index: u32,
        /// Number of live references.
        references: u32,
    },
    /// A record's contents are inconsistent.
    InvalidRecord {
        /// The record class.
        class: SceneBufferClass,
        /// What is wrong.
        reason: String,
    },
    /// A byte span is not a live allocation of its buffer.
    InvalidSpan {
        /// The byte class (vertex, index or LOD).
        class: SceneBufferClass,
        /// Start of the span.
        offset: u64,
        /// Length of the span.
        size: u64,
    },
}

impl fmt::Display for SceneBufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SceneBufferError::CapacityExceeded { class, capacity } => {
                write!(f, "The {class} buffer is full ({capacity} slots)")
            }
            SceneBufferError::ByteBudgetExceeded {
                class,
                requested,
                available,
            } => write!(
                f,
                "The {class} buffer cannot fit {requested} bytes ({available} bytes free)"
            ),
            SceneBufferError::InvalidSlot { class, index } => {
                write!(f, "{class} slot {index} is not live")
            }
            SceneBufferError::DanglingReference { from, to, index } => {
                write!(f, "A {from} record references {to} slot {index}, which is not live")
            }
            SceneBufferError::InUse {
                class,
                index,
                references,
            } => write!(f, "{class} slot {index} is still referenced {references} time(s)"),
            SceneBufferError::InvalidRecord { class, reason } => {
                write!(f, "Invalid {class} record: {reason}")
            }
            SceneBufferError::InvalidSpan {
                class,
                offset,
                size,
            } => write!(
                f,
                "The {class} span at {offset} ({size} bytes) is not a live allocation"
            ),
        }
    }
}

impl std::error::Error for SceneBufferError {}

/// An error raised when a pipeline's bindings do not fit the root layouts.
///
/// Always fatal at pipeline creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// The inline constant block is too small for the request.
    InlineBudgetExceeded {
        /// Bytes requested.
        requested: u32,
        /// Bytes available.
        budget: u32,
    },
    /// The binding cannot be expressed with the fixed layouts.
    Unsupported {
        /// The pipeline being resolved.
        pipeline: String,
        /// Why it cannot be expressed.
        reason: String,
    },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::InlineBudgetExceeded { requested, budget } => write!(
                f,
                "Inline constants need {requested} bytes, the root layout provides {budget}"
            ),
            LayoutError::Unsupported { pipeline, reason } => {
                write!(f, "Pipeline '{pipeline}' cannot use the bindless layout: {reason}")
            }
        }
    }
}

impl std::error::Error for LayoutError {}

/// An error in the startup settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    /// The settings could not be parsed or serialized.
    Parse(String),
    /// A capacity is above its hard ceiling.
    CeilingExceeded {
        /// The class.
        class: SceneBufferClass,
        /// The configured value.
        requested: u64,
        /// The ceiling.
        ceiling: u64,
    },
    /// A value is out of its valid range.
    Invalid(String),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::Parse(msg) => write!(f, "Failed to parse settings: {msg}"),
            SettingsError::CeilingExceeded {
                class,
                requested,
                ceiling,
            } => write!(
                f,
                "The {class} capacity {requested} is above its ceiling of {ceiling}"
            ),
            SettingsError::Invalid(msg) => write!(f, "Invalid settings: {msg}"),
        }
    }
}

impl std::error::Error for SettingsError {}

/// A high-level error of the bindless core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// A descriptor operation failed.
    Descriptor(DescriptorError),
    /// A scene buffer operation failed.
    SceneBuffer(SceneBufferError),
    /// The device failed.
    Device(DeviceError),
    /// A pipeline does not fit the root layouts.
    Layout(LayoutError),
    /// The settings are invalid.
    Settings(SettingsError),
}

impl RenderError {
    /// Returns `true` if the error reports a lost device, directly or
    /// through a descriptor write.
    pub fn is_device_lost(&self) -> bool {
        match self {
            RenderError::Device(err) | RenderError::Descriptor(DescriptorError::Device(err)) => {
                err.is_device_lost()
            }
            _ => false,
        }
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Descriptor(err) => write!(f, "Descriptor error: {err}"),
            RenderError::SceneBuffer(err) => write!(f, "Scene buffer error: {err}"),
            RenderError::Device(err) => write!(f, "Device error: {err}"),
            RenderError::Layout(err) => write!(f, "Root layout error: {err}"),
            RenderError::Settings(err) => write!(f, "Settings error: {err}"),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Descriptor(err) => Some(err),
            RenderError::SceneBuffer(err) => Some(err),
            RenderError::Device(err) => Some(err),
            RenderError::Layout(err) => Some(err),
            RenderError::Settings(err) => Some(err),
        }
    }
}

impl From<DescriptorError> for RenderError {
    fn from(err: DescriptorError) -> Self {
        RenderError::Descriptor(err)
    }
}

impl From<SceneBufferError> for RenderError {
    fn from(err: SceneBufferError) -> Self {
        RenderError::SceneBuffer(err)
    }
}

impl From<DeviceError> for RenderError {
    fn from(err: DeviceError) -> Self {
        RenderError::Device(err)
    }
}

impl From<LayoutError> for RenderError {
    fn from(err: LayoutError) -> Self {
        RenderError::Layout(err)
    }
}

impl From<SettingsError> for RenderError {
    fn from(err: SettingsError) -> Self {
        RenderError::Settings(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn descriptor_error_display() {
        let err = DescriptorError::HeapExhausted {
            kind: DescriptorKind::ReadView,
            capacity: 4,
        };
        assert_eq!(format!("{err}"), "The read view heap is exhausted (4 slots)");

        let err = DescriptorError::InvalidDescriptorType {
            kind: DescriptorKind::ConstantView,
            resource: ResourceClass::Image,
        };
        assert_eq!(format!("{err}"), "A constant view cannot describe image resources");
    }

    #[test]
    fn render_error_chains_device_loss_through_descriptor_writes() {
        let lost = DeviceError::DeviceLost {
            reason: "driver reset".to_string(),
        };
        let render: RenderError = DescriptorError::from(lost).into();
        assert!(render.is_device_lost());
        assert!(render.source().is_some());
        assert!(render.source().unwrap().source().is_some());
        assert_eq!(
            format!("{render}"),
            "Descriptor error: Descriptor write failed: The GPU device was lost: driver reset"
        );
    }

    #[test]
    fn timeout_display_names_both_fences() {
        let err = DeviceError::Timeout {
            waiting_for: FenceValue(7),
            completed: FenceValue(5),
            timeout_ms: 10,
        };
        assert_eq!(
            format!("{err}"),
            "Timed out after 10 ms waiting for fence#7 (completed: fence#5)"
        );
        assert!(!err.is_device_lost());
    }
}
