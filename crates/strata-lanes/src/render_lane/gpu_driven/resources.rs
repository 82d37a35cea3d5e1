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


//! GPU buffers of the GPU-driven path and their descriptor sets.

use super::batch::DrawSlotLayout;
use super::constants::{CullConstants, DrawConstants};
use crate::error::CullingError;
use std::borrow::Cow;
use strata_core::renderer::{
    BindlessSettings, BufferDescriptor, BufferId, BufferUsage, DescriptorKind, DescriptorKinds,
    GpuBonePalette, GpuCullingParams, GpuInstance, GpuMaterial, GpuMesh, GpuMeshLod, GpuResource,
    GpuVisibleInstance, GraphicsDevice, LiteDescriptorHandle, SceneBufferClass,
};
use strata_data::descriptors::{BindlessHeap, ResourceDescriptorSet};

/// A device buffer and the heap views configured for it.
#[derive(Debug)]
struct BoundBuffer {
    id: BufferId,
    set: Option<ResourceDescriptorSet>,
}

impl BoundBuffer {
    fn lite(&self, kind: DescriptorKind) -> Result<LiteDescriptorHandle, CullingError> {
        let set = self
            .set
            .as_ref()
            .ok_or(CullingError::MissingResource("descriptor set"))?;
        Ok(set.lite_handle(kind)?)
    }
}

/// Everything one buffer needs at creation.
struct BufferPlan {
    label: &'static str,
    size: u64,
    stride: u32,
    usage: BufferUsage,
    kinds: DescriptorKinds,
}

fn stride_of<T>() -> u32 {
    std::mem::size_of::<T>() as u32
}

/// Device buffers of the scene mirror and the per-frame culling output.
///
/// Scene buffers mirror [`GlobalSceneBuffers`](strata_data::scene::GlobalSceneBuffers)
/// at their full configured capacity, so uploads never reallocate. The
/// culling outputs are sized from the [`DrawSlotLayout`].
#[derive(Debug)]
pub struct GpuDrivenResources {
    layout: DrawSlotLayout,
    params: BoundBuffer,
    instances: BoundBuffer,
    meshes: BoundBuffer,
    lods: BoundBuffer,
    materials: BoundBuffer,
    skinning: BoundBuffer,
    vertices: BoundBuffer,
    indices: BoundBuffer,
    visible: BoundBuffer,
    draw_args: BoundBuffer,
    draw_counts: BoundBuffer,
    draw_ids: BoundBuffer,
}

impl GpuDrivenResources {
    /// Creates every buffer and configures its views in `heap`.
    ///
    /// On failure, whatever was already created is destroyed and its slots
    /// released.
    pub fn new<D>(device: &D, heap: &mut BindlessHeap, settings: &BindlessSettings) -> Result<Self, CullingError>
    where
        D: GraphicsDevice + ?Sized,
    {
        let caps = &settings.scene;
        let layout = DrawSlotLayout::new(settings.culling.max_draws_per_batch, caps.pipelines);
        let storage = BufferUsage::STORAGE | BufferUsage::COPY_DST;
        let records = |class: SceneBufferClass, stride: u32| caps.get(class).max(1) * u64::from(stride);
        let read = DescriptorKinds::READ_VIEW;
        let read_write = DescriptorKinds::READ_VIEW | DescriptorKinds::WRITE_VIEW;

        let plans = [
            BufferPlan {
                label: "culling_params",
                size: u64::from(stride_of::<GpuCullingParams>()),
                stride: stride_of::<GpuCullingParams>(),
                usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
                kinds: DescriptorKinds::CONSTANT_VIEW,
            },
            BufferPlan {
                label: "scene_instances",
                size: records(SceneBufferClass::Instance, stride_of::<GpuInstance>()),
                stride: stride_of::<GpuInstance>(),
                usage: storage,
                kinds: read,
            },
            BufferPlan {
                label: "scene_meshes",
                size: records(SceneBufferClass::Mesh, stride_of::<GpuMesh>()),
                stride: stride_of::<GpuMesh>(),
                usage: storage,
                kinds: read,
            },
            BufferPlan {
                label: "scene_mesh_lods",
                size: records(SceneBufferClass::MeshLod, stride_of::<GpuMeshLod>()),
                stride: stride_of::<GpuMeshLod>(),
                usage: storage,
                kinds: read,
            },
            BufferPlan {
                label: "scene_materials",
                size: records(SceneBufferClass::Material, stride_of::<GpuMaterial>()),
                stride: stride_of::<GpuMaterial>(),
                usage: storage,
                kinds: read,
            },
            BufferPlan {
                label: "scene_skinning",
                size: records(SceneBufferClass::SkinnedInstance, stride_of::<GpuBonePalette>()),
                stride: stride_of::<GpuBonePalette>(),
                usage: storage,
                kinds: read,
            },
            BufferPlan {
                label: "scene_vertices",
                size: caps.vertex_bytes.max(4),
                stride: 0,
                usage: storage,
                kinds: read,
            },
            BufferPlan {
                label: "scene_indices",
                size: caps.index_bytes.max(4),
                stride: 4,
                usage: BufferUsage::INDEX | storage,
                kinds: DescriptorKinds::EMPTY,
            },
            BufferPlan {
                label: "culling_visible",
                size: layout.visible_buffer_size().max(1),
                stride: stride_of::<GpuVisibleInstance>(),
                usage: BufferUsage::STORAGE,
                kinds: read_write,
            },
            BufferPlan {
                label: "culling_draw_args",
                size: layout.args_buffer_size().max(1),
                stride: 0,
                usage: BufferUsage::INDIRECT | BufferUsage::STORAGE,
                kinds: DescriptorKinds::WRITE_VIEW,
            },
            BufferPlan {
                label: "culling_draw_counts",
                size: layout.count_buffer_size().max(4),
                stride: 0,
                usage: BufferUsage::INDIRECT | storage,
                kinds: DescriptorKinds::WRITE_VIEW,
            },
            BufferPlan {
                label: "culling_draw_ids",
                size: layout.draw_id_buffer_size().max(4),
                stride: 4,
                usage: BufferUsage::STORAGE,
                kinds: read_write,
            },
        ];

        let mut created: Vec<BoundBuffer> = Vec::with_capacity(plans.len());
        for plan in &plans {
            match Self::create_buffer(device, heap, plan) {
                Ok(buffer) => created.push(buffer),
                Err(err) => {
                    log::error!("Failed to create GPU-driven buffer '{}': {err}", plan.label);
                    release_all(device, heap, created);
                    return Err(err);
                }
            }
        }

        let mut buffers = created.into_iter();
        let mut next = || buffers.next().ok_or(CullingError::MissingResource("GPU-driven buffer"));
        let resources = Self {
            layout,
            params: next()?,
            instances: next()?,
            meshes: next()?,
            lods: next()?,
            materials: next()?,
            skinning: next()?,
            vertices: next()?,
            indices: next()?,
            visible: next()?,
            draw_args: next()?,
            draw_counts: next()?,
            draw_ids: next()?,
        };
        log::info!(
            "GPU-driven resources: {} batches x {} draws",
            layout.batch_count(),
            layout.batch_capacity()
        );
        Ok(resources)
    }

    fn create_buffer<D>(device: &D, heap: &mut BindlessHeap, plan: &BufferPlan) -> Result<BoundBuffer, CullingError>
    where
        D: GraphicsDevice + ?Sized,
    {
        let id = device.create_buffer(&BufferDescriptor {
            label: Some(Cow::Borrowed(plan.label)),
            size: plan.size,
            usage: plan.usage,
        })?;
        if plan.kinds.is_empty() {
            return Ok(BoundBuffer { id, set: None });
        }
        let resource = GpuResource::Buffer {
            id,
            size: plan.size,
            stride: plan.stride,
        };
        match heap.configure(device, resource, plan.kinds) {
            Ok(set) => Ok(BoundBuffer { id, set: Some(set) }),
            Err(err) => {
                if let Err(destroy_err) = device.destroy_buffer(id) {
                    log::warn!("Could not destroy '{}' after a failed configuration: {destroy_err}", plan.label);
                }
                Err(err.into())
            }
        }
    }

    /// The draw slot layout of the output buffers.
    pub fn layout(&self) -> DrawSlotLayout {
        self.layout
    }

    /// The device buffer mirroring `class`, if the path keeps one.
    pub fn buffer_for(&self, class: SceneBufferClass) -> Option<BufferId> {
        let buffer = match class {
            SceneBufferClass::Mesh => &self.meshes,
            SceneBufferClass::MeshLod => &self.lods,
            SceneBufferClass::Instance => &self.instances,
            SceneBufferClass::SkinnedInstance => &self.skinning,
            SceneBufferClass::Material => &self.materials,
            SceneBufferClass::Vertex => &self.vertices,
            SceneBufferClass::Index => &self.indices,
            SceneBufferClass::Pipeline | SceneBufferClass::PipelineBatch => return None,
        };
        Some(buffer.id)
    }

    /// The culling parameter buffer.
    pub fn params_buffer(&self) -> BufferId {
        self.params.id
    }

    /// The global index buffer.
    pub fn index_buffer(&self) -> BufferId {
        self.indices.id
    }

    /// The visible instance buffer.
    pub fn visible_buffer(&self) -> BufferId {
        self.visible.id
    }

    /// The indirect argument buffer.
    pub fn draw_args_buffer(&self) -> BufferId {
        self.draw_args.id
    }

    /// The per-batch draw count buffer.
    pub fn draw_count_buffer(&self) -> BufferId {
        self.draw_counts.id
    }

    /// The draw slot to instance buffer.
    pub fn draw_id_buffer(&self) -> BufferId {
        self.draw_ids.id
    }

    /// Buffers written by the culling pass and read by the draws.
    pub fn culling_outputs(&self) -> [BufferId; 4] {
        [self.draw_args.id, self.draw_counts.id, self.draw_ids.id, self.visible.id]
    }

    /// The inline block of the culling dispatch.
    pub fn cull_constants(&self) -> Result<CullConstants, CullingError> {
        let visible = self
            .visible
            .set
            .as_ref()
            .ok_or(CullingError::MissingResource("visible instance views"))?
            .typed_handle::<GpuVisibleInstance>()?;
        Ok(CullConstants {
            params: self.params.lite(DescriptorKind::ConstantView)?,
            instances: self.instances.lite(DescriptorKind::ReadView)?,
            meshes: self.meshes.lite(DescriptorKind::ReadView)?,
            lods: self.lods.lite(DescriptorKind::ReadView)?,
            visible,
            draw_args: self.draw_args.lite(DescriptorKind::WriteView)?,
            draw_counts: self.draw_counts.lite(DescriptorKind::WriteView)?,
            draw_ids: self.draw_ids.lite(DescriptorKind::WriteView)?,
        })
    }

    /// The inline block of the draws of `batch`.
    pub fn draw_constants(&self, batch: u32) -> Result<DrawConstants, CullingError> {
        Ok(DrawConstants {
            params: self.params.lite(DescriptorKind::ConstantView)?,
            instances: self.instances.lite(DescriptorKind::ReadView)?,
            meshes: self.meshes.lite(DescriptorKind::ReadView)?,
            visible: self.visible.lite(DescriptorKind::ReadView)?,
            draw_ids: self.draw_ids.lite(DescriptorKind::ReadView)?,
            materials: self.materials.lite(DescriptorKind::ReadView)?,
            vertices: self.vertices.lite(DescriptorKind::ReadView)?,
            skinning: self.skinning.lite(DescriptorKind::ReadView)?,
            batch_index: batch,
        })
    }

    /// Releases every view and destroys every buffer.
    ///
    /// The views go through the deferred queue; the buffers are destroyed
    /// immediately, so the caller must know the GPU is done with them.
    pub fn release<D>(self, device: &D, heap: &mut BindlessHeap)
    where
        D: GraphicsDevice + ?Sized,
    {
        let Self {
            params,
            instances,
            meshes,
            lods,
            materials,
            skinning,
            vertices,
            indices,
            visible,
            draw_args,
            draw_counts,
            draw_ids,
            ..
        } = self;
        release_all(
            device,
            heap,
            vec![
                params, instances, meshes, lods, materials, skinning, vertices, indices, visible,
                draw_args, draw_counts, draw_ids,
            ],
        );
    }
}

fn release_all<D>(device: &D, heap: &mut BindlessHeap, buffers: Vec<BoundBuffer>)
where
    D: GraphicsDevice + ?Sized,
{
    for buffer in buffers {
        if let Some(set) = buffer.set {
            if let Err(err) = heap.release(set) {
                log::error!("Failed to release the views of {:?}: {err}", buffer.id);
            }
        }
        if let Err(err) = device.destroy_buffer(buffer.id) {
            log::warn!("Failed to destroy {:?}: {err}", buffer.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::renderer::ExhaustionPolicy;
    use strata_infra::SoftwareDevice;

    fn small_settings() -> BindlessSettings {
        let mut settings = BindlessSettings::default();
        settings.culling.max_draws_per_batch = 16;
        settings.scene.pipelines = 4;
        settings.scene.instances = 64;
        settings.scene.vertex_bytes = 1 << 16;
        settings.scene.index_bytes = 1 << 16;
        settings.exhaustion_policy = ExhaustionPolicy::Fail;
        settings
    }

    #[test]
    fn every_buffer_gets_its_views() {
        let settings = small_settings();
        let device = SoftwareDevice::new(&settings.heaps);
        let mut heap = BindlessHeap::new(&settings);

        let resources = GpuDrivenResources::new(&device, &mut heap, &settings).unwrap();

        assert_eq!(device.buffer_count(), 12);
        assert_eq!(heap.stats(DescriptorKind::ConstantView).occupied, 1);
        assert_eq!(heap.stats(DescriptorKind::ReadView).occupied, 8);
        assert_eq!(heap.stats(DescriptorKind::WriteView).occupied, 4);
        assert_eq!(resources.layout(), DrawSlotLayout::new(16, 4));
        assert_eq!(resources.buffer_for(SceneBufferClass::Index), Some(resources.index_buffer()));
        assert_eq!(resources.buffer_for(SceneBufferClass::Pipeline), None);

        let cull = resources.cull_constants().unwrap();
        assert!(cull.visible.is_writable());
        assert_eq!(
            device.descriptor(DescriptorKind::WriteView, cull.draw_counts.index()),
            Some(GpuResource::Buffer {
                id: resources.draw_count_buffer(),
                size: 16,
                stride: 0
            })
        );
        assert_eq!(resources.draw_constants(3).unwrap().batch_index, 3);
    }

    #[test]
    fn release_returns_views_and_buffers() {
        let settings = small_settings();
        let device = SoftwareDevice::new(&settings.heaps);
        let mut heap = BindlessHeap::new(&settings);
        let resources = GpuDrivenResources::new(&device, &mut heap, &settings).unwrap();

        resources.release(&device, &mut heap);

        assert_eq!(device.buffer_count(), 0);
        assert_eq!(heap.stats(DescriptorKind::ReadView).occupied, 0);
        assert_eq!(heap.stats(DescriptorKind::ReadView).pending_release, 8);
    }

    #[test]
    fn exhausted_heap_unwinds_partial_creation() {
        let mut settings = small_settings();
        settings.heaps.write_views = 2;
        let device = SoftwareDevice::new(&settings.heaps);
        let mut heap = BindlessHeap::new(&settings);

        let err = GpuDrivenResources::new(&device, &mut heap, &settings).unwrap_err();

        assert!(matches!(err, CullingError::Render(_)));
        assert_eq!(device.buffer_count(), 0);
        assert_eq!(heap.stats(DescriptorKind::WriteView).occupied, 0);
    }
}
