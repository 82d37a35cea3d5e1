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

use super::pipeline_table::PipelineTable;
use super::upload::SceneUpload;
use crate::allocators::{RangeAllocator, SlotArena, SpanAllocation};
use bytemuck::Pod;
use std::ops::Range;
use strata_core::math::BoundingSphere;
use strata_core::renderer::{
    BindlessSettings, FenceValue, GpuBonePalette, GpuInstance, GpuMaterial, GpuMesh, GpuMeshLod,
    InstanceFlags, RenderPipelineId, SceneBufferClass, SceneBufferError, MAX_BONES_PER_PALETTE,
    NO_SKINNING, SENTINEL_MATERIAL_INDEX,
};

/// One level of detail of a mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshLodDescriptor {
    /// First index, counted in elements from the start of the mesh's index span.
    pub first_index: u32,
    /// Number of indices.
    pub index_count: u32,
    /// Smallest projected size at which this LOD is used.
    pub screen_size_threshold: f32,
}

/// Everything needed to register a mesh whose geometry is already placed in
/// the shared vertex and index buffers.
///
/// The vertex span must come from
/// [`allocate_vertices`](GlobalSceneBuffers::allocate_vertices) with the
/// same stride, so it starts on a whole vertex and the base vertex can be
/// derived from its offset.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshDescriptor {
    /// Local-space bounds.
    pub bounds: BoundingSphere,
    /// Where the vertices live.
    pub vertices: SpanAllocation,
    /// Size of one vertex in bytes.
    pub vertex_stride: u32,
    /// Where the 32-bit indices live.
    pub indices: SpanAllocation,
    /// LODs ordered from most to least detailed.
    pub lods: Vec<MeshLodDescriptor>,
}

/// Live record counts and byte usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SceneBufferStats {
    /// Live meshes.
    pub meshes: u32,
    /// LOD records in use.
    pub mesh_lods: u64,
    /// Live instances.
    pub instances: u32,
    /// Live bone palettes.
    pub skinned_instances: u32,
    /// Live materials, sentinel included.
    pub materials: u32,
    /// Registered pipelines.
    pub pipelines: u32,
    /// Allocated vertex bytes.
    pub vertex_bytes: u64,
    /// Allocated index bytes.
    pub index_bytes: u64,
}

/// CPU mirror of every global scene buffer.
///
/// All records are addressed by index and cross-references are checked when
/// a record is added or updated, so the GPU never follows an index into a
/// dead slot. Changes accumulate as dirty ranges and leave through
/// [`take_uploads`](Self::take_uploads).
#[derive(Debug)]
pub struct GlobalSceneBuffers {
    batch_capacity: u32,
    meshes: SlotArena<GpuMesh>,
    lod_ranges: RangeAllocator,
    lods: Vec<GpuMeshLod>,
    lod_dirty: Option<Range<u32>>,
    instances: SlotArena<GpuInstance>,
    materials: SlotArena<GpuMaterial>,
    skinning: SlotArena<GpuBonePalette>,
    pipelines: PipelineTable,
    vertices: RangeAllocator,
    indices: RangeAllocator,
    staged: Vec<SceneUpload>,
    mesh_refs: Vec<u32>,
    material_refs: Vec<u32>,
    skinning_refs: Vec<u32>,
    batch_sizes: Vec<u32>,
}

fn bump(refs: &mut Vec<u32>, index: u32) {
    let index = index as usize;
    if refs.len() <= index {
        refs.resize(index + 1, 0);
    }
    refs[index] += 1;
}

fn drop_ref(refs: &mut [u32], index: u32) {
    if let Some(count) = refs.get_mut(index as usize) {
        *count = count.saturating_sub(1);
    }
}

fn ref_count(refs: &[u32], index: u32) -> u32 {
    refs.get(index as usize).copied().unwrap_or(0)
}

fn invalid(class: SceneBufferClass, reason: impl Into<String>) -> SceneBufferError {
    SceneBufferError::InvalidRecord {
        class,
        reason: reason.into(),
    }
}

fn check_stride(stride: u32) -> Result<(), SceneBufferError> {
    if stride == 0 || stride % 4 != 0 {
        return Err(invalid(
            SceneBufferClass::Vertex,
            format!("vertex stride {stride} is not a positive multiple of 4"),
        ));
    }
    Ok(())
}

fn arena_upload<T: Pod>(arena: &mut SlotArena<T>, out: &mut Vec<SceneUpload>) {
    if let Some(range) = arena.take_dirty() {
        out.push(SceneUpload {
            class: arena.class(),
            byte_offset: u64::from(range.start) * SlotArena::<T>::stride(),
            bytes: arena.bytes(range).to_vec(),
        });
    }
}

impl GlobalSceneBuffers {
    /// Creates empty buffers with the capacities from `settings`.
    ///
    /// Material slot 0 is filled with the sentinel material.
    pub fn new(settings: &BindlessSettings) -> Self {
        let caps = &settings.scene;
        let mut materials = SlotArena::new(SceneBufferClass::Material, caps.materials);
        if let Err(err) = materials.reserve(GpuMaterial::default()) {
            log::error!("Could not reserve the sentinel material: {err}");
        }
        log::info!(
            "Scene buffers: {} meshes, {} instances, {} materials, {} MiB vertices, {} MiB indices",
            caps.meshes,
            caps.instances,
            caps.materials,
            caps.vertex_bytes >> 20,
            caps.index_bytes >> 20
        );
        Self {
            batch_capacity: settings.culling.max_draws_per_batch,
            meshes: SlotArena::new(SceneBufferClass::Mesh, caps.meshes),
            lod_ranges: RangeAllocator::new(SceneBufferClass::MeshLod, u64::from(caps.mesh_lods), 1),
            lods: Vec::new(),
            lod_dirty: None,
            instances: SlotArena::new(SceneBufferClass::Instance, caps.instances),
            materials,
            skinning: SlotArena::new(SceneBufferClass::SkinnedInstance, caps.skinned_instances),
            pipelines: PipelineTable::new(caps.pipelines),
            vertices: RangeAllocator::new(SceneBufferClass::Vertex, caps.vertex_bytes, 4),
            indices: RangeAllocator::new(SceneBufferClass::Index, caps.index_bytes, 4),
            staged: Vec::new(),
            mesh_refs: Vec::new(),
            material_refs: Vec::new(),
            skinning_refs: Vec::new(),
            batch_sizes: Vec::new(),
        }
    }

    // --- Geometry ---

    /// Reserves room for `count` vertices of `stride` bytes in the shared
    /// vertex buffer. The span starts on a multiple of `stride`.
    /// ## Errors
    /// * `SceneBufferError::InvalidRecord` - if `stride` is not a positive multiple of 4.
    /// * `SceneBufferError::ByteBudgetExceeded` - if no free range can hold the vertices.
    pub fn allocate_vertices(&mut self, count: u32, stride: u32) -> Result<SpanAllocation, SceneBufferError> {
        check_stride(stride)?;
        self.vertices
            .allocate_aligned(u64::from(count) * u64::from(stride), u64::from(stride))
    }

    /// Reserves room for `count` 32-bit indices in the shared index buffer.
    pub fn allocate_indices(&mut self, count: u32) -> Result<SpanAllocation, SceneBufferError> {
        self.indices.allocate(u64::from(count) * 4)
    }

    /// Stages `data` for upload at the start of `span`.
    pub fn write_vertices(&mut self, span: SpanAllocation, data: &[u8]) -> Result<(), SceneBufferError> {
        if data.len() as u64 > span.size || data.len() % 4 != 0 {
            return Err(invalid(
                SceneBufferClass::Vertex,
                format!("{} bytes do not fit a {}-byte span in whole words", data.len(), span.size),
            ));
        }
        self.staged.push(SceneUpload {
            class: SceneBufferClass::Vertex,
            byte_offset: span.offset,
            bytes: data.to_vec(),
        });
        Ok(())
    }

    /// Stages `indices` for upload at the start of `span`.
    pub fn write_indices(&mut self, span: SpanAllocation, indices: &[u32]) -> Result<(), SceneBufferError> {
        let bytes: &[u8] = bytemuck::cast_slice(indices);
        if bytes.len() as u64 > span.size {
            return Err(invalid(
                SceneBufferClass::Index,
                format!("{} indices overflow a {}-byte span", indices.len(), span.size),
            ));
        }
        self.staged.push(SceneUpload {
            class: SceneBufferClass::Index,
            byte_offset: span.offset,
            bytes: bytes.to_vec(),
        });
        Ok(())
    }

    /// Returns a vertex span once the current submission retires.
    /// ## Errors
    /// * `SceneBufferError::InvalidSpan` - if `span` is not a live vertex allocation.
    pub fn free_vertices(&mut self, span: SpanAllocation) -> Result<(), SceneBufferError> {
        self.vertices.free(span)
    }

    /// Returns an index span once the current submission retires.
    /// ## Errors
    /// * `SceneBufferError::InvalidSpan` - if `span` is not a live index allocation.
    pub fn free_indices(&mut self, span: SpanAllocation) -> Result<(), SceneBufferError> {
        self.indices.free(span)
    }

    // --- Meshes ---

    fn validate_mesh(&self, mesh: &MeshDescriptor) -> Result<(), SceneBufferError> {
        let class = SceneBufferClass::Mesh;
        if mesh.lods.is_empty() {
            return Err(invalid(class, "a mesh needs at least one LOD"));
        }
        check_stride(mesh.vertex_stride)?;
        if !self.vertices.is_live(mesh.vertices) {
            return Err(SceneBufferError::InvalidSpan {
                class: SceneBufferClass::Vertex,
                offset: mesh.vertices.offset,
                size: mesh.vertices.size,
            });
        }
        if !self.indices.is_live(mesh.indices) {
            return Err(SceneBufferError::InvalidSpan {
                class: SceneBufferClass::Index,
                offset: mesh.indices.offset,
                size: mesh.indices.size,
            });
        }
        if mesh.vertices.offset % u64::from(mesh.vertex_stride) != 0 {
            return Err(invalid(
                class,
                format!(
                    "vertex span at {} does not start on a whole {}-byte vertex",
                    mesh.vertices.offset, mesh.vertex_stride
                ),
            ));
        }
        let base_vertex = mesh.vertices.offset / u64::from(mesh.vertex_stride);
        if base_vertex > i32::MAX as u64 || mesh.vertices.offset > u64::from(u32::MAX) {
            return Err(invalid(class, "vertex span is beyond the addressable range"));
        }
        if mesh.bounds.radius < 0.0 || !mesh.bounds.radius.is_finite() {
            return Err(invalid(class, "bounding radius must be finite and non-negative"));
        }
        let index_capacity = mesh.indices.size / 4;
        for (i, lod) in mesh.lods.iter().enumerate() {
            if lod.index_count == 0 {
                return Err(invalid(SceneBufferClass::MeshLod, format!("LOD {i} has no indices")));
            }
            if u64::from(lod.first_index) + u64::from(lod.index_count) > index_capacity {
                return Err(invalid(
                    SceneBufferClass::MeshLod,
                    format!("LOD {i} reads past the mesh's {index_capacity} indices"),
                ));
            }
        }
        let decreasing = mesh
            .lods
            .windows(2)
            .all(|pair| pair[0].screen_size_threshold > pair[1].screen_size_threshold);
        if !decreasing {
            return Err(invalid(
                SceneBufferClass::MeshLod,
                "LOD thresholds must be strictly decreasing",
            ));
        }
        Ok(())
    }

    fn mark_lods_dirty(&mut self, range: Range<u32>) {
        self.lod_dirty = Some(match self.lod_dirty.take() {
            Some(dirty) => dirty.start.min(range.start)..dirty.end.max(range.end),
            None => range,
        });
    }

    fn mesh_record(mesh: &MeshDescriptor, lod_base: u32) -> GpuMesh {
        GpuMesh {
            bounding_sphere: mesh.bounds.to_array(),
            vertex_byte_offset: mesh.vertices.offset as u32,
            vertex_stride: mesh.vertex_stride,
            base_vertex: (mesh.vertices.offset / u64::from(mesh.vertex_stride)) as i32,
            lod_base_index: lod_base,
            lod_count: mesh.lods.len() as u32,
            _pad: [0; 3],
        }
    }

    fn write_lods(&mut self, base: u32, mesh: &MeshDescriptor) {
        let base = base as usize;
        let end = base + mesh.lods.len();
        if self.lods.len() < end {
            self.lods.resize(end, GpuMeshLod::default());
        }
        let first_element = (mesh.indices.offset / 4) as u32;
        for (slot, lod) in self.lods[base..end].iter_mut().zip(&mesh.lods) {
            *slot = GpuMeshLod {
                first_index: first_element + lod.first_index,
                index_count: lod.index_count,
                screen_size_threshold: lod.screen_size_threshold,
                _pad: 0,
            };
        }
        self.mark_lods_dirty(base as u32..end as u32);
    }

    /// Clears the LODs of `record` and returns their range once the current
    /// submission retires.
    fn release_lods(&mut self, record: &GpuMesh) -> Result<(), SceneBufferError> {
        let base = record.lod_base_index;
        let end = base + record.lod_count;
        self.lod_ranges.free(SpanAllocation {
            offset: u64::from(base),
            size: u64::from(record.lod_count),
        })?;
        for lod in &mut self.lods[base as usize..end as usize] {
            *lod = GpuMeshLod::default();
        }
        self.mark_lods_dirty(base..end);
        Ok(())
    }

    fn allocate_lods(&mut self, count: usize) -> Result<SpanAllocation, SceneBufferError> {
        self.lod_ranges
            .allocate(count as u64)
            .map_err(|_| SceneBufferError::CapacityExceeded {
                class: SceneBufferClass::MeshLod,
                capacity: self.lod_ranges.capacity(),
            })
    }

    /// Registers a mesh and its LODs.
    ///
    /// The base vertex is the vertex span's offset in whole vertices.
    /// ## Errors
    /// * `SceneBufferError::InvalidRecord` - if the LODs are empty, unordered or out of range,
    ///   or the vertex span does not start on a whole vertex.
    /// * `SceneBufferError::InvalidSpan` - if the vertex or index span is not live.
    /// * `SceneBufferError::CapacityExceeded` - if the mesh or LOD storage is full.
    pub fn add_mesh(&mut self, mesh: &MeshDescriptor) -> Result<u32, SceneBufferError> {
        self.validate_mesh(mesh)?;

        let lod_span = self.allocate_lods(mesh.lods.len())?;
        let record = Self::mesh_record(mesh, lod_span.offset as u32);
        let index = match self.meshes.add(record) {
            Ok(index) => index,
            Err(err) => {
                // Nothing referenced the span yet.
                if let Err(free_err) = self.lod_ranges.free(lod_span) {
                    log::error!("Could not return the LOD range of a rejected mesh: {free_err}");
                }
                return Err(err);
            }
        };

        self.write_lods(record.lod_base_index, mesh);
        log::debug!(
            "Added mesh {index} with {} LOD(s) at {}",
            mesh.lods.len(),
            record.lod_base_index
        );
        Ok(index)
    }

    /// Rewrites a live mesh in place, so instances that reference it pick up
    /// the new geometry and LODs without being touched.
    ///
    /// The LOD range is reused when the LOD count is unchanged. Otherwise a
    /// new range is allocated and the old one is returned once the current
    /// submission retires.
    /// ## Errors
    /// * `SceneBufferError::InvalidSlot` - if `index` is not a live mesh.
    /// * `SceneBufferError::InvalidRecord` / `InvalidSpan` - as for [`add_mesh`](Self::add_mesh).
    /// * `SceneBufferError::CapacityExceeded` - if a larger LOD range does not fit.
    pub fn update_mesh(&mut self, index: u32, mesh: &MeshDescriptor) -> Result<(), SceneBufferError> {
        self.validate_mesh(mesh)?;
        let previous = *self.meshes.get(index).ok_or(SceneBufferError::InvalidSlot {
            class: SceneBufferClass::Mesh,
            index,
        })?;

        let lod_base = if previous.lod_count as usize == mesh.lods.len() {
            previous.lod_base_index
        } else {
            let lod_span = self.allocate_lods(mesh.lods.len())?;
            self.release_lods(&previous)?;
            lod_span.offset as u32
        };

        let record = Self::mesh_record(mesh, lod_base);
        self.meshes.update(index, record)?;
        self.write_lods(lod_base, mesh);
        log::debug!("Updated mesh {index} with {} LOD(s) at {lod_base}", mesh.lods.len());
        Ok(())
    }

    /// Removes a mesh and its LODs.
    /// ## Errors
    /// * `SceneBufferError::InUse` - while live instances reference it.
    /// * `SceneBufferError::InvalidSlot` - if `index` is not a live mesh.
    pub fn remove_mesh(&mut self, index: u32) -> Result<(), SceneBufferError> {
        let references = ref_count(&self.mesh_refs, index);
        if references > 0 {
            return Err(SceneBufferError::InUse {
                class: SceneBufferClass::Mesh,
                index,
                references,
            });
        }
        let record = self.meshes.remove(index)?;
        self.release_lods(&record)
    }

    /// The mesh record at `index`.
    pub fn mesh(&self, index: u32) -> Option<&GpuMesh> {
        self.meshes.get(index)
    }

    /// The LOD records of `mesh`, most detailed first.
    pub fn mesh_lods(&self, mesh: u32) -> Option<&[GpuMeshLod]> {
        let record = self.meshes.get(mesh)?;
        let base = record.lod_base_index as usize;
        self.lods.get(base..base + record.lod_count as usize)
    }

    // --- Materials ---

    /// Adds a material. Index 0 is never returned.
    pub fn add_material(&mut self, material: GpuMaterial) -> Result<u32, SceneBufferError> {
        self.materials.add(material)
    }

    /// Overwrites a material.
    pub fn update_material(&mut self, index: u32, material: GpuMaterial) -> Result<(), SceneBufferError> {
        self.materials.update(index, material)
    }

    /// Removes a material that no instance references.
    pub fn remove_material(&mut self, index: u32) -> Result<(), SceneBufferError> {
        let references = ref_count(&self.material_refs, index);
        if references > 0 {
            return Err(SceneBufferError::InUse {
                class: SceneBufferClass::Material,
                index,
                references,
            });
        }
        self.materials.remove(index).map(|_| ())
    }

    /// The material at `index`; index 0 is the sentinel.
    pub fn material(&self, index: u32) -> Option<&GpuMaterial> {
        self.materials.get(index)
    }

    // --- Skinning ---

    fn palette(bones: &[[[f32; 4]; 4]]) -> Result<GpuBonePalette, SceneBufferError> {
        if bones.is_empty() || bones.len() > MAX_BONES_PER_PALETTE {
            return Err(invalid(
                SceneBufferClass::SkinnedInstance,
                format!("{} bones, expected 1..={MAX_BONES_PER_PALETTE}", bones.len()),
            ));
        }
        let mut palette: GpuBonePalette = bytemuck::Zeroable::zeroed();
        palette.bone_count = bones.len() as u32;
        palette.bones[..bones.len()].copy_from_slice(bones);
        Ok(palette)
    }

    /// Adds a bone palette for one skinned instance.
    pub fn add_skinning(&mut self, bones: &[[[f32; 4]; 4]]) -> Result<u32, SceneBufferError> {
        let palette = Self::palette(bones)?;
        self.skinning.add(palette)
    }

    /// Overwrites the bones of a palette, typically once per animated frame.
    pub fn update_skinning(&mut self, index: u32, bones: &[[[f32; 4]; 4]]) -> Result<(), SceneBufferError> {
        let palette = Self::palette(bones)?;
        self.skinning.update(index, palette)
    }

    /// Removes a palette that no instance references.
    pub fn remove_skinning(&mut self, index: u32) -> Result<(), SceneBufferError> {
        let references = ref_count(&self.skinning_refs, index);
        if references > 0 {
            return Err(SceneBufferError::InUse {
                class: SceneBufferClass::SkinnedInstance,
                index,
                references,
            });
        }
        self.skinning.remove(index).map(|_| ())
    }

    // --- Pipelines ---

    /// Returns the batch index of `pipeline`, registering it on first use.
    pub fn register_pipeline(&mut self, pipeline: RenderPipelineId) -> Result<u32, SceneBufferError> {
        let index = self.pipelines.register(pipeline)?;
        if self.batch_sizes.len() <= index as usize {
            self.batch_sizes.resize(index as usize + 1, 0);
        }
        Ok(index)
    }

    /// Swaps the pipeline of a batch, keeping every instance in it.
    pub fn replace_pipeline(&mut self, index: u32, pipeline: RenderPipelineId) -> Result<RenderPipelineId, SceneBufferError> {
        self.pipelines.replace(index, pipeline)
    }

    /// The pipeline table.
    pub fn pipelines(&self) -> &PipelineTable {
        &self.pipelines
    }

    /// Number of live instances drawn with batch `batch`.
    pub fn batch_size(&self, batch: u32) -> u32 {
        ref_count(&self.batch_sizes, batch)
    }

    /// Maximum number of draws per batch.
    pub fn batch_capacity(&self) -> u32 {
        self.batch_capacity
    }

    // --- Instances ---

    fn validate_instance(&self, record: &GpuInstance) -> Result<(), SceneBufferError> {
        let dangling = |to, index| SceneBufferError::DanglingReference {
            from: SceneBufferClass::Instance,
            to,
            index,
        };
        if !self.meshes.is_live(record.mesh_index) {
            return Err(dangling(SceneBufferClass::Mesh, record.mesh_index));
        }
        if !self.materials.is_live(record.material_index) {
            return Err(dangling(SceneBufferClass::Material, record.material_index));
        }
        if record.pipeline_index >= self.pipelines.len() {
            return Err(dangling(SceneBufferClass::Pipeline, record.pipeline_index));
        }
        let skinned = record.instance_flags().contains(InstanceFlags::SKINNED);
        if skinned != (record.skinning_index != NO_SKINNING) {
            return Err(invalid(
                SceneBufferClass::Instance,
                "the SKINNED flag and the skinning index disagree",
            ));
        }
        if skinned && !self.skinning.is_live(record.skinning_index) {
            return Err(dangling(SceneBufferClass::SkinnedInstance, record.skinning_index));
        }
        Ok(())
    }

    fn check_batch_room(&self, batch: u32) -> Result<(), SceneBufferError> {
        if self.batch_size(batch) >= self.batch_capacity {
            return Err(SceneBufferError::CapacityExceeded {
                class: SceneBufferClass::PipelineBatch,
                capacity: u64::from(self.batch_capacity),
            });
        }
        Ok(())
    }

    fn acquire_refs(&mut self, record: &GpuInstance) {
        bump(&mut self.mesh_refs, record.mesh_index);
        if record.material_index != SENTINEL_MATERIAL_INDEX {
            bump(&mut self.material_refs, record.material_index);
        }
        if record.skinning_index != NO_SKINNING {
            bump(&mut self.skinning_refs, record.skinning_index);
        }
        bump(&mut self.batch_sizes, record.pipeline_index);
    }

    fn release_refs(&mut self, record: &GpuInstance) {
        drop_ref(&mut self.mesh_refs, record.mesh_index);
        if record.material_index != SENTINEL_MATERIAL_INDEX {
            drop_ref(&mut self.material_refs, record.material_index);
        }
        if record.skinning_index != NO_SKINNING {
            drop_ref(&mut self.skinning_refs, record.skinning_index);
        }
        drop_ref(&mut self.batch_sizes, record.pipeline_index);
    }

    /// Adds an instance after checking every index it carries.
    /// ## Errors
    /// * `SceneBufferError::DanglingReference` - if it names a dead mesh, material, palette or pipeline.
    /// * `SceneBufferError::CapacityExceeded` - if the instance buffer or its pipeline batch is full.
    pub fn add_instance(&mut self, record: GpuInstance) -> Result<u32, SceneBufferError> {
        self.validate_instance(&record)?;
        self.check_batch_room(record.pipeline_index)?;
        let index = self.instances.add(record)?;
        self.acquire_refs(&record);
        Ok(index)
    }

    /// Replaces an instance record, e.g. to move it or swap its material.
    pub fn update_instance(&mut self, index: u32, record: GpuInstance) -> Result<(), SceneBufferError> {
        let previous = *self.instances.get(index).ok_or(SceneBufferError::InvalidSlot {
            class: SceneBufferClass::Instance,
            index,
        })?;
        self.validate_instance(&record)?;
        if record.pipeline_index != previous.pipeline_index {
            self.check_batch_room(record.pipeline_index)?;
        }
        self.instances.update(index, record)?;
        self.release_refs(&previous);
        self.acquire_refs(&record);
        Ok(())
    }

    /// Updates only the transform of an instance.
    pub fn set_instance_transform(&mut self, index: u32, transform: [[f32; 4]; 4]) -> Result<(), SceneBufferError> {
        let mut record = *self.instances.get(index).ok_or(SceneBufferError::InvalidSlot {
            class: SceneBufferClass::Instance,
            index,
        })?;
        record.transform = transform;
        self.instances.update(index, record)
    }

    /// Removes an instance. Its slot is zeroed, so culling skips it from the
    /// next frame on.
    pub fn remove_instance(&mut self, index: u32) -> Result<(), SceneBufferError> {
        let record = self.instances.remove(index)?;
        self.release_refs(&record);
        Ok(())
    }

    /// The instance record at `index`.
    pub fn instance(&self, index: u32) -> Option<&GpuInstance> {
        self.instances.get(index)
    }

    /// Iterates over live instances.
    pub fn instances(&self) -> impl Iterator<Item = (u32, &GpuInstance)> {
        self.instances.iter()
    }

    /// Number of instance slots the culling pass must visit.
    pub fn instance_slot_count(&self) -> u32 {
        self.instances.high_water_mark()
    }

    /// Number of mesh slots in use, dead ones included.
    pub fn mesh_slot_count(&self) -> u32 {
        self.meshes.high_water_mark()
    }

    /// Number of LOD records in use, dead ones included.
    pub fn lod_slot_count(&self) -> u32 {
        self.lods.len() as u32
    }

    // --- Frame flow ---

    /// Tags subsequent removals with `fence`.
    pub fn begin_submission(&mut self, fence: FenceValue) {
        self.meshes.begin_submission(fence);
        self.lod_ranges.begin_submission(fence);
        self.instances.begin_submission(fence);
        self.materials.begin_submission(fence);
        self.skinning.begin_submission(fence);
        self.vertices.begin_submission(fence);
        self.indices.begin_submission(fence);
    }

    /// Makes slots and byte ranges removed at or before `completed` reusable.
    pub fn reclaim(&mut self, completed: FenceValue) -> usize {
        self.meshes.reclaim(completed)
            + self.lod_ranges.reclaim(completed)
            + self.instances.reclaim(completed)
            + self.materials.reclaim(completed)
            + self.skinning.reclaim(completed)
            + self.vertices.reclaim(completed)
            + self.indices.reclaim(completed)
    }

    /// Drops every pending removal after device loss.
    pub fn abandon_pending(&mut self) -> usize {
        self.meshes.abandon_pending()
            + self.lod_ranges.abandon_pending()
            + self.instances.abandon_pending()
            + self.materials.abandon_pending()
            + self.skinning.abandon_pending()
            + self.vertices.abandon_pending()
            + self.indices.abandon_pending()
    }

    /// Schedules every record for upload, e.g. into freshly created buffers.
    /// Staged vertex and index data is not kept and must be written again.
    pub fn mark_all_dirty(&mut self) {
        self.meshes.mark_all_dirty();
        self.instances.mark_all_dirty();
        self.materials.mark_all_dirty();
        self.skinning.mark_all_dirty();
        if !self.lods.is_empty() {
            self.lod_dirty = Some(0..self.lods.len() as u32);
        }
    }

    /// Returns and clears every pending upload.
    pub fn take_uploads(&mut self) -> Vec<SceneUpload> {
        let mut uploads = std::mem::take(&mut self.staged);
        arena_upload(&mut self.meshes, &mut uploads);
        if let Some(range) = self.lod_dirty.take() {
            uploads.push(SceneUpload {
                class: SceneBufferClass::MeshLod,
                byte_offset: u64::from(range.start) * std::mem::size_of::<GpuMeshLod>() as u64,
                bytes: bytemuck::cast_slice(&self.lods[range.start as usize..range.end as usize]).to_vec(),
            });
        }
        arena_upload(&mut self.instances, &mut uploads);
        arena_upload(&mut self.materials, &mut uploads);
        arena_upload(&mut self.skinning, &mut uploads);
        uploads
    }

    /// Current usage.
    pub fn stats(&self) -> SceneBufferStats {
        SceneBufferStats {
            meshes: self.meshes.len(),
            mesh_lods: self.lod_ranges.allocated(),
            instances: self.instances.len(),
            skinned_instances: self.skinning.len(),
            materials: self.materials.len(),
            pipelines: self.pipelines.len(),
            vertex_bytes: self.vertices.allocated(),
            index_bytes: self.indices.allocated(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::math::{Mat4, Vec3};

    fn small_settings() -> BindlessSettings {
        let mut settings = BindlessSettings::default();
        settings.scene.meshes = 4;
        settings.scene.mesh_lods = 8;
        settings.scene.instances = 8;
        settings.scene.skinned_instances = 2;
        settings.scene.materials = 4;
        settings.scene.vertex_bytes = 4096;
        settings.scene.index_bytes = 4096;
        settings.scene.pipelines = 2;
        settings.culling.max_draws_per_batch = 3;
        settings
    }

    fn cube_mesh(buffers: &mut GlobalSceneBuffers) -> MeshDescriptor {
        let vertices = buffers.allocate_vertices(8, 16).unwrap();
        let indices = buffers.allocate_indices(36).unwrap();
        MeshDescriptor {
            bounds: BoundingSphere::new(Vec3::ZERO, 1.0),
            vertices,
            vertex_stride: 16,
            indices,
            lods: vec![
                MeshLodDescriptor {
                    first_index: 0,
                    index_count: 36,
                    screen_size_threshold: 0.5,
                },
                MeshLodDescriptor {
                    first_index: 0,
                    index_count: 12,
                    screen_size_threshold: 0.1,
                },
            ],
        }
    }

    fn instance(mesh: u32, pipeline: u32) -> GpuInstance {
        GpuInstance {
            transform: Mat4::IDENTITY.to_cols_array_2d(),
            mesh_index: mesh,
            material_index: SENTINEL_MATERIAL_INDEX,
            pipeline_index: pipeline,
            skinning_index: NO_SKINNING,
            flags: InstanceFlags::ENABLED.bits(),
            _pad: [0; 3],
        }
    }

    fn populated() -> (GlobalSceneBuffers, u32, u32) {
        let mut buffers = GlobalSceneBuffers::new(&small_settings());
        let desc = cube_mesh(&mut buffers);
        let mesh = buffers.add_mesh(&desc).unwrap();
        let pipeline = buffers.register_pipeline(RenderPipelineId(1)).unwrap();
        (buffers, mesh, pipeline)
    }

    #[test]
    fn sentinel_material_occupies_slot_zero() {
        let mut buffers = GlobalSceneBuffers::new(&small_settings());
        assert_eq!(buffers.material(0), Some(&GpuMaterial::default()));
        assert_eq!(buffers.add_material(GpuMaterial::default()), Ok(1));
        assert!(buffers.remove_material(0).is_err());
    }

    #[test]
    fn mesh_lods_are_contiguous_and_absolute() {
        let (buffers, mesh, _) = populated();
        let record = buffers.mesh(mesh).unwrap();
        assert_eq!(record.lod_count, 2);
        let lods = buffers.mesh_lods(mesh).unwrap();
        assert_eq!(lods[0].index_count, 36);
        assert_eq!(lods[1].screen_size_threshold, 0.1);
        assert_eq!(lods[0].first_index, 0);
    }

    #[test]
    fn unordered_lods_are_rejected() {
        let mut buffers = GlobalSceneBuffers::new(&small_settings());
        let mut desc = cube_mesh(&mut buffers);
        desc.lods[1].screen_size_threshold = 0.9;
        assert!(matches!(
            buffers.add_mesh(&desc),
            Err(SceneBufferError::InvalidRecord { class: SceneBufferClass::MeshLod, .. })
        ));

        let mut desc = cube_mesh(&mut buffers);
        desc.lods[0].index_count = 100;
        assert!(buffers.add_mesh(&desc).is_err());
    }

    #[test]
    fn instance_references_are_checked() {
        let (mut buffers, mesh, pipeline) = populated();
        assert_eq!(
            buffers.add_instance(instance(mesh + 1, pipeline)),
            Err(SceneBufferError::DanglingReference {
                from: SceneBufferClass::Instance,
                to: SceneBufferClass::Mesh,
                index: mesh + 1
            })
        );

        let mut bad_material = instance(mesh, pipeline);
        bad_material.material_index = 3;
        assert!(matches!(
            buffers.add_instance(bad_material),
            Err(SceneBufferError::DanglingReference { to: SceneBufferClass::Material, .. })
        ));

        assert!(matches!(
            buffers.add_instance(instance(mesh, 1)),
            Err(SceneBufferError::DanglingReference { to: SceneBufferClass::Pipeline, .. })
        ));

        let mut skinned = instance(mesh, pipeline);
        skinned.flags |= InstanceFlags::SKINNED.bits();
        assert!(matches!(
            buffers.add_instance(skinned),
            Err(SceneBufferError::InvalidRecord { .. })
        ));
        skinned.skinning_index = 0;
        assert!(matches!(
            buffers.add_instance(skinned),
            Err(SceneBufferError::DanglingReference { to: SceneBufferClass::SkinnedInstance, .. })
        ));
        let palette = buffers.add_skinning(&[Mat4::IDENTITY.to_cols_array_2d()]).unwrap();
        skinned.skinning_index = palette;
        assert!(buffers.add_instance(skinned).is_ok());
        assert!(buffers.remove_skinning(palette).is_err());
    }

    #[test]
    fn referenced_mesh_cannot_be_removed() {
        let (mut buffers, mesh, pipeline) = populated();
        let a = buffers.add_instance(instance(mesh, pipeline)).unwrap();
        buffers.add_instance(instance(mesh, pipeline)).unwrap();
        assert_eq!(
            buffers.remove_mesh(mesh),
            Err(SceneBufferError::InUse {
                class: SceneBufferClass::Mesh,
                index: mesh,
                references: 2
            })
        );
        buffers.remove_instance(a).unwrap();
        buffers.remove_instance(a + 1).unwrap();
        assert_eq!(buffers.remove_mesh(mesh), Ok(()));
        assert_eq!(buffers.mesh_lods(mesh), None);
    }

    #[test]
    fn batch_capacity_is_enforced() {
        let (mut buffers, mesh, pipeline) = populated();
        for _ in 0..3 {
            buffers.add_instance(instance(mesh, pipeline)).unwrap();
        }
        assert_eq!(
            buffers.add_instance(instance(mesh, pipeline)),
            Err(SceneBufferError::CapacityExceeded {
                class: SceneBufferClass::PipelineBatch,
                capacity: 3
            })
        );
        let other = buffers.register_pipeline(RenderPipelineId(2)).unwrap();
        assert!(buffers.add_instance(instance(mesh, other)).is_ok());
        assert_eq!(buffers.batch_size(pipeline), 3);
    }

    #[test]
    fn instance_ceiling_is_enforced() {
        let mut settings = small_settings();
        settings.scene.instances = 2;
        let mut buffers = GlobalSceneBuffers::new(&settings);
        let desc = cube_mesh(&mut buffers);
        let mesh = buffers.add_mesh(&desc).unwrap();
        let pipeline = buffers.register_pipeline(RenderPipelineId(1)).unwrap();
        buffers.add_instance(instance(mesh, pipeline)).unwrap();
        buffers.add_instance(instance(mesh, pipeline)).unwrap();
        assert!(matches!(
            buffers.add_instance(instance(mesh, pipeline)),
            Err(SceneBufferError::CapacityExceeded { class: SceneBufferClass::Instance, .. })
        ));
        assert_eq!(buffers.batch_size(pipeline), 2);
    }

    #[test]
    fn uploads_cover_dirty_records_once() {
        let (mut buffers, mesh, pipeline) = populated();
        let desc = cube_mesh(&mut buffers);
        buffers.write_indices(desc.indices, &[0, 1, 2]).unwrap();
        buffers.add_instance(instance(mesh, pipeline)).unwrap();

        let uploads = buffers.take_uploads();
        let classes: Vec<_> = uploads.iter().map(|u| u.class).collect();
        assert_eq!(
            classes,
            vec![
                SceneBufferClass::Index,
                SceneBufferClass::Mesh,
                SceneBufferClass::MeshLod,
                SceneBufferClass::Instance,
                SceneBufferClass::Material,
            ]
        );
        let instances = &uploads[3];
        assert_eq!(instances.byte_offset, 0);
        assert_eq!(instances.bytes.len(), std::mem::size_of::<GpuInstance>());
        assert!(buffers.take_uploads().is_empty());
    }

    #[test]
    fn removed_instance_uploads_zeroes() {
        let (mut buffers, mesh, pipeline) = populated();
        let index = buffers.add_instance(instance(mesh, pipeline)).unwrap();
        buffers.take_uploads();
        buffers.remove_instance(index).unwrap();
        let uploads = buffers.take_uploads();
        assert_eq!(uploads.len(), 1);
        assert!(uploads[0].bytes.iter().all(|b| *b == 0));
        assert_eq!(buffers.batch_size(pipeline), 0);
    }

    #[test]
    fn too_many_bones_are_rejected() {
        let mut buffers = GlobalSceneBuffers::new(&small_settings());
        let bones = vec![Mat4::IDENTITY.to_cols_array_2d(); MAX_BONES_PER_PALETTE + 1];
        assert!(matches!(
            buffers.add_skinning(&bones),
            Err(SceneBufferError::InvalidRecord { .. })
        ));
    }

    #[test]
    fn freeing_a_span_twice_is_an_error() {
        let mut buffers = GlobalSceneBuffers::new(&small_settings());
        let vertices = buffers.allocate_vertices(4, 12).unwrap();
        let indices = buffers.allocate_indices(6).unwrap();
        buffers.free_vertices(vertices).unwrap();
        assert!(matches!(
            buffers.free_vertices(vertices),
            Err(SceneBufferError::InvalidSpan { class: SceneBufferClass::Vertex, .. })
        ));
        buffers.free_indices(indices).unwrap();
        assert!(buffers.free_indices(indices).is_err());
        assert_eq!(buffers.stats().vertex_bytes, 0);
        assert_eq!(buffers.stats().index_bytes, 0);
    }

    #[test]
    fn base_vertex_follows_the_vertex_span() {
        let mut buffers = GlobalSceneBuffers::new(&small_settings());
        // Free space now starts at byte 4.
        buffers.allocate_vertices(1, 4).unwrap();
        let mut desc = cube_mesh(&mut buffers);
        desc.vertices = buffers.allocate_vertices(8, 12).unwrap();
        desc.vertex_stride = 12;
        assert_eq!(desc.vertices.offset % 12, 0);

        let mesh = buffers.add_mesh(&desc).unwrap();
        let record = buffers.mesh(mesh).unwrap();
        assert_eq!(
            i64::from(record.base_vertex) * i64::from(record.vertex_stride),
            desc.vertices.offset as i64
        );
        assert_eq!(u64::from(record.vertex_byte_offset), desc.vertices.offset);
    }

    #[test]
    fn misaligned_vertex_span_is_rejected() {
        let mut buffers = GlobalSceneBuffers::new(&small_settings());
        let mut desc = cube_mesh(&mut buffers);
        // Allocated for a 16-byte stride, then described with a 12-byte one.
        desc.vertices = buffers.allocate_vertices(5, 16).unwrap();
        assert_eq!(desc.vertices.offset, 128);
        desc.vertex_stride = 12;
        assert!(matches!(
            buffers.add_mesh(&desc),
            Err(SceneBufferError::InvalidRecord { class: SceneBufferClass::Mesh, .. })
        ));

        assert!(buffers.allocate_vertices(4, 6).is_err());
        assert!(buffers.allocate_vertices(4, 0).is_err());
    }

    #[test]
    fn freed_span_cannot_back_a_mesh() {
        let mut buffers = GlobalSceneBuffers::new(&small_settings());
        let desc = cube_mesh(&mut buffers);
        buffers.free_vertices(desc.vertices).unwrap();
        assert!(matches!(
            buffers.add_mesh(&desc),
            Err(SceneBufferError::InvalidSpan { class: SceneBufferClass::Vertex, .. })
        ));
    }

    #[test]
    fn update_mesh_keeps_lod_range_when_count_is_unchanged() {
        let (mut buffers, mesh, pipeline) = populated();
        let instance_index = buffers.add_instance(instance(mesh, pipeline)).unwrap();
        buffers.take_uploads();

        let mut desc = cube_mesh(&mut buffers);
        desc.lods[1].index_count = 6;
        desc.bounds = BoundingSphere::new(Vec3::ZERO, 2.0);
        buffers.update_mesh(mesh, &desc).unwrap();

        let record = *buffers.mesh(mesh).unwrap();
        assert_eq!((record.lod_base_index, record.lod_count), (0, 2));
        assert_eq!(record.bounding_sphere[3], 2.0);
        assert_eq!(u64::from(record.vertex_byte_offset), desc.vertices.offset);
        let lods = buffers.mesh_lods(mesh).unwrap();
        assert_eq!(lods[1].index_count, 6);
        assert_eq!(lods[0].first_index, (desc.indices.offset / 4) as u32);

        let classes: Vec<_> = buffers.take_uploads().iter().map(|u| u.class).collect();
        assert_eq!(classes, vec![SceneBufferClass::Mesh, SceneBufferClass::MeshLod]);
        assert_eq!(buffers.instance(instance_index).map(|i| i.mesh_index), Some(mesh));
    }

    #[test]
    fn update_mesh_moves_lods_when_count_changes() {
        let (mut buffers, mesh, _) = populated();
        let mut desc = cube_mesh(&mut buffers);
        desc.lods.truncate(1);
        desc.lods[0].index_count = 12;

        buffers.begin_submission(FenceValue(2));
        buffers.update_mesh(mesh, &desc).unwrap();
        let record = *buffers.mesh(mesh).unwrap();
        assert_eq!((record.lod_base_index, record.lod_count), (2, 1));
        assert_eq!(buffers.mesh_lods(mesh).unwrap()[0].index_count, 12);
        assert_eq!(buffers.stats().mesh_lods, 1);

        // The old range is only reusable once the frame that read it retires.
        assert_eq!(buffers.reclaim(FenceValue(1)), 0);
        assert_eq!(buffers.reclaim(FenceValue(2)), 1);
        let other = cube_mesh(&mut buffers);
        let second = buffers.add_mesh(&other).unwrap();
        assert_eq!(buffers.mesh(second).unwrap().lod_base_index, 0);
    }

    #[test]
    fn update_of_dead_mesh_is_rejected() {
        let (mut buffers, mesh, _) = populated();
        let desc = cube_mesh(&mut buffers);
        assert_eq!(
            buffers.update_mesh(mesh + 1, &desc),
            Err(SceneBufferError::InvalidSlot {
                class: SceneBufferClass::Mesh,
                index: mesh + 1
            })
        );
        assert_eq!(buffers.stats().mesh_lods, 2);
    }
}
