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

//! Global settings for the bindless core, loaded once at startup.
//!
//! Nothing here can change mid-session: heap capacities and scene buffer
//! sizes are baked into GPU allocations and root layouts.

use crate::renderer::api::descriptor::DescriptorKind;
use crate::renderer::api::scene::{
    SceneBufferClass, MAX_INDEX_BYTES, MAX_INSTANCES, MAX_MATERIALS, MAX_MESHES, MAX_MESH_LODS,
    MAX_SKINNED_INSTANCES, MAX_UNIQUE_PIPELINES, MAX_VERTEX_BYTES,
};
use crate::renderer::error::SettingsError;
use serde::{Deserialize, Serialize};

/// Number of slots in each descriptor heap table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorHeapSettings {
    /// Constant view slots.
    pub constant_views: u32,
    /// Read view slots.
    pub read_views: u32,
    /// Write view slots.
    pub write_views: u32,
}

impl DescriptorHeapSettings {
    /// Capacity of the table for `kind`.
    #[inline]
    pub fn capacity(&self, kind: DescriptorKind) -> u32 {
        match kind {
            DescriptorKind::ConstantView => self.constant_views,
            DescriptorKind::ReadView => self.read_views,
            DescriptorKind::WriteView => self.write_views,
        }
    }
}

impl Default for DescriptorHeapSettings {
    fn default() -> Self {
        Self {
            constant_views: 1_024,
            read_views: 16_384,
            write_views: 4_096,
        }
    }
}

/// What to do when a descriptor heap table runs out of free slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// Fail the allocation with `HeapExhausted`.
    Fail,
    /// Block on the GPU timeline until the oldest pending release of the
    /// exhausted kind retires, then retry once.
    WaitForGpu {
        /// How long to wait before reporting a device timeout.
        timeout_ms: u64,
    },
}

impl Default for ExhaustionPolicy {
    fn default() -> Self {
        ExhaustionPolicy::WaitForGpu { timeout_ms: 2_000 }
    }
}

/// Sizes of the global scene buffers. Each may be lowered, never raised
/// above its hard ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneCapacities {
    /// Mesh records.
    pub meshes: u32,
    /// Mesh LOD records.
    pub mesh_lods: u32,
    /// Instance records.
    pub instances: u32,
    /// Bone palettes.
    pub skinned_instances: u32,
    /// Material records, the sentinel slot included.
    pub materials: u32,
    /// Vertex buffer bytes.
    pub vertex_bytes: u64,
    /// Index buffer bytes.
    pub index_bytes: u64,
    /// Unique render pipelines.
    pub pipelines: u32,
}

impl SceneCapacities {
    /// The configured size for `class`, in records or bytes.
    pub fn get(&self, class: SceneBufferClass) -> u64 {
        match class {
            SceneBufferClass::Mesh => self.meshes as u64,
            SceneBufferClass::MeshLod => self.mesh_lods as u64,
            SceneBufferClass::Instance => self.instances as u64,
            SceneBufferClass::SkinnedInstance => self.skinned_instances as u64,
            SceneBufferClass::Material => self.materials as u64,
            SceneBufferClass::Vertex => self.vertex_bytes,
            SceneBufferClass::Index => self.index_bytes,
            SceneBufferClass::Pipeline => self.pipelines as u64,
            SceneBufferClass::PipelineBatch => self.instances as u64,
        }
    }

    fn validate(&self) -> Result<(), SettingsError> {
        const CLASSES: [SceneBufferClass; 8] = [
            SceneBufferClass::Mesh,
            SceneBufferClass::MeshLod,
            SceneBufferClass::Instance,
            SceneBufferClass::SkinnedInstance,
            SceneBufferClass::Material,
            SceneBufferClass::Vertex,
            SceneBufferClass::Index,
            SceneBufferClass::Pipeline,
        ];
        for class in CLASSES {
            let requested = self.get(class);
            let ceiling = class.ceiling();
            if requested > ceiling {
                return Err(SettingsError::CeilingExceeded {
                    class,
                    requested,
                    ceiling,
                });
            }
            if requested == 0 {
                return Err(SettingsError::Invalid(format!("{class} capacity must not be zero")));
            }
        }
        if self.materials < 2 {
            return Err(SettingsError::Invalid(
                "materials must leave room beyond the sentinel slot".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SceneCapacities {
    fn default() -> Self {
        Self {
            meshes: MAX_MESHES,
            mesh_lods: MAX_MESH_LODS,
            instances: MAX_INSTANCES,
            skinned_instances: MAX_SKINNED_INSTANCES,
            materials: MAX_MATERIALS,
            vertex_bytes: MAX_VERTEX_BYTES,
            index_bytes: MAX_INDEX_BYTES,
            pipelines: MAX_UNIQUE_PIPELINES,
        }
    }
}

/// Parameters of the GPU culling pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CullingSettings {
    /// Threads per culling workgroup.
    pub workgroup_size: u32,
    /// Draw slots reserved per pipeline batch, the CPU-known maximum draw count.
    pub max_draws_per_batch: u32,
}

impl Default for CullingSettings {
    fn default() -> Self {
        Self {
            workgroup_size: 64,
            max_draws_per_batch: 4_096,
        }
    }
}

/// A collection of global settings for the bindless core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindlessSettings {
    /// Descriptor heap table sizes.
    pub heaps: DescriptorHeapSettings,
    /// Global scene buffer sizes.
    pub scene: SceneCapacities,
    /// Culling pass parameters.
    pub culling: CullingSettings,
    /// Heap exhaustion behavior.
    pub exhaustion_policy: ExhaustionPolicy,
    /// Number of frames the CPU may record ahead of the GPU.
    pub frames_in_flight: u32,
}

impl Default for BindlessSettings {
    fn default() -> Self {
        Self {
            heaps: DescriptorHeapSettings::default(),
            scene: SceneCapacities::default(),
            culling: CullingSettings::default(),
            exhaustion_policy: ExhaustionPolicy::default(),
            frames_in_flight: 2,
        }
    }
}

impl BindlessSettings {
    /// Parses and validates settings from JSON. Missing fields take their
    /// default value.
    pub fn from_json(source: &str) -> Result<Self, SettingsError> {
        let settings: Self =
            serde_json::from_str(source).map_err(|e| SettingsError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Serializes the settings as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, SettingsError> {
        serde_json::to_string_pretty(self).map_err(|e| SettingsError::Parse(e.to_string()))
    }

    /// Checks every value against the hard ceilings and basic sanity rules.
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.scene.validate()?;
        for kind in DescriptorKind::ALL {
            if self.heaps.capacity(kind) == 0 {
                return Err(SettingsError::Invalid(format!("the {kind} heap must not be empty")));
            }
        }
        if self.frames_in_flight == 0 {
            return Err(SettingsError::Invalid(
                "frames_in_flight must be at least 1".to_string(),
            ));
        }
        if self.culling.workgroup_size == 0 {
            return Err(SettingsError::Invalid(
                "culling workgroup size must not be zero".to_string(),
            ));
        }
        let max_draws = self.culling.max_draws_per_batch;
        if max_draws == 0 || max_draws > self.scene.instances {
            return Err(SettingsError::CeilingExceeded {
                class: SceneBufferClass::PipelineBatch,
                requested: max_draws as u64,
                ceiling: self.scene.instances as u64,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_sit_on_the_hard_ceilings() {
        let settings = BindlessSettings::default();
        assert_eq!(settings.frames_in_flight, 2);
        assert_eq!(settings.scene.meshes, 16_384);
        assert_eq!(settings.scene.mesh_lods, 65_536);
        assert_eq!(settings.scene.instances, 65_536);
        assert_eq!(settings.scene.skinned_instances, 4_096);
        assert_eq!(settings.scene.materials, 65_536);
        assert_eq!(settings.scene.vertex_bytes, 128 * 1024 * 1024);
        assert_eq!(settings.scene.index_bytes, 128 * 1024 * 1024);
        assert_eq!(settings.scene.pipelines, 128);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let settings = BindlessSettings::from_json(
            r#"{
                "frames_in_flight": 3,
                "heaps": { "read_views": 64 },
                "exhaustion_policy": { "mode": "fail" }
            }"#,
        )
        .unwrap();
        assert_eq!(settings.frames_in_flight, 3);
        assert_eq!(settings.heaps.read_views, 64);
        assert_eq!(settings.heaps.constant_views, 1_024);
        assert_eq!(settings.exhaustion_policy, ExhaustionPolicy::Fail);
    }

    #[test]
    fn raising_a_ceiling_is_rejected() {
        let err = BindlessSettings::from_json(
            r#"{ "scene": { "pipelines": 129 } }"#,
        )
        .unwrap_err();
        assert_eq!(
            err,
            SettingsError::CeilingExceeded {
                class: SceneBufferClass::Pipeline,
                requested: 129,
                ceiling: 128
            }
        );
    }

    #[test]
    fn malformed_json_reports_parse_error() {
        assert!(matches!(
            BindlessSettings::from_json("{ not json"),
            Err(SettingsError::Parse(_))
        ));
    }

    #[test]
    fn json_round_trip() {
        let settings = BindlessSettings {
            frames_in_flight: 3,
            exhaustion_policy: ExhaustionPolicy::WaitForGpu { timeout_ms: 50 },
            ..BindlessSettings::default()
        };
        let json = settings.to_json().unwrap();
        assert_eq!(BindlessSettings::from_json(&json).unwrap(), settings);
    }
}
