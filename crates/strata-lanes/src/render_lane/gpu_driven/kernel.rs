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


//! Host implementation of the culling kernel.
//!
//! Mirrors `gpu_cull.wgsl` thread for thread, so devices without a shader
//! compiler produce the same counts, arguments and draw ids.

use super::batch::{DrawSlotLayout, DRAW_ARGS_STRIDE};
use super::constants::CullConstants;
use super::lod::{screen_size_metric, select_lod};
use bytemuck::Pod;
use strata_core::math::Vec3;
use strata_core::renderer::{
    ComputeKernel, CullingCamera, DescriptorKind, DeviceError, GpuCullingParams,
    GpuDrawIndexedIndirect, GpuInstance, GpuMesh, GpuMeshLod, GpuVisibleInstance, InstanceFlags,
    KernelMemory,
};

/// Builds the culling parameters for one frame.
///
/// ## Arguments
/// * `camera` - The culling camera.
/// * `instance_slots` - Instance slots to visit, dead ones included.
/// * `mesh_slots` - Mesh slots in use.
/// * `lod_slots` - LOD records in use.
/// * `layout` - The draw slot layout of the batches.
pub fn culling_params(
    camera: &CullingCamera,
    instance_slots: u32,
    mesh_slots: u32,
    lod_slots: u32,
    layout: &DrawSlotLayout,
) -> GpuCullingParams {
    let position = camera.position;
    GpuCullingParams {
        view_projection: camera.view_projection().to_cols_array_2d(),
        frustum_planes: camera.frustum().to_arrays(),
        camera_position: [position.x, position.y, position.z, 1.0],
        lod_scale: camera.lod_scale(),
        instance_count: instance_slots,
        mesh_count: mesh_slots,
        lod_count: lod_slots,
        batch_capacity: layout.batch_capacity(),
        batch_count: layout.batch_count(),
        _pad: [0; 2],
    }
}

fn read_records<T: Pod>(
    memory: &dyn KernelMemory,
    kind: DescriptorKind,
    index: u32,
    first: u32,
    count: u32,
) -> Result<Vec<T>, DeviceError> {
    let stride = std::mem::size_of::<T>() as u64;
    let bytes = memory.read(kind, index, u64::from(first) * stride, u64::from(count) * stride)?;
    Ok(bytemuck::pod_collect_to_vec(&bytes))
}

fn read_record<T: Pod>(
    memory: &dyn KernelMemory,
    kind: DescriptorKind,
    index: u32,
    record: u32,
) -> Result<T, DeviceError> {
    let stride = std::mem::size_of::<T>() as u64;
    let bytes = memory.read(kind, index, u64::from(record) * stride, stride)?;
    Ok(bytemuck::pod_read_unaligned(&bytes))
}

/// Frustum and LOD culling of every instance slot, appending one indirect
/// draw per visible instance to its pipeline's batch.
#[derive(Debug, Clone, Copy)]
pub struct GpuCullKernel {
    workgroup_size: u32,
}

impl GpuCullKernel {
    /// A kernel running `workgroup_size` threads per workgroup.
    pub fn new(workgroup_size: u32) -> Self {
        Self {
            workgroup_size: workgroup_size.max(1),
        }
    }

    /// One thread: culls instance slot `instance_index`.
    /// ## Returns
    /// `true` if a draw was appended.
    fn cull_instance(
        &self,
        memory: &mut dyn KernelMemory,
        constants: &CullConstants,
        params: &GpuCullingParams,
        instance_index: u32,
    ) -> Result<bool, DeviceError> {
        let instance: GpuInstance = read_record(
            memory,
            DescriptorKind::ReadView,
            constants.instances.index(),
            instance_index,
        )?;
        let flags = instance.instance_flags();
        if !flags.contains(InstanceFlags::ENABLED) || instance.mesh_index >= params.mesh_count {
            return Ok(false);
        }
        let mesh: GpuMesh = read_record(
            memory,
            DescriptorKind::ReadView,
            constants.meshes.index(),
            instance.mesh_index,
        )?;
        if mesh.lod_count == 0 || mesh.lod_base_index + mesh.lod_count > params.lod_count {
            return Ok(false);
        }

        let world = mesh.bounds().transformed(&instance.world_transform());
        if !flags.contains(InstanceFlags::ALWAYS_VISIBLE) && !params.frustum().intersects_sphere(&world) {
            return Ok(false);
        }

        let lods: Vec<GpuMeshLod> = read_records(
            memory,
            DescriptorKind::ReadView,
            constants.lods.index(),
            mesh.lod_base_index,
            mesh.lod_count,
        )?;
        let [x, y, z, _] = params.camera_position;
        let metric = screen_size_metric(&world, Vec3::new(x, y, z), params.lod_scale);
        let Some(local_lod) = select_lod(&lods, metric) else {
            return Ok(false);
        };
        let lod = lods[local_lod];

        let layout = DrawSlotLayout::new(params.batch_capacity, params.batch_count);
        let batch = instance.pipeline_index;
        if batch >= layout.batch_count() {
            return Ok(false);
        }
        let local = memory.atomic_add_u32(constants.draw_counts.index(), layout.count_offset(batch), 1)?;
        let Some(draw_slot) = layout.draw_slot(batch, local) else {
            // Past the batch capacity; the draw count is clamped when consumed.
            return Ok(false);
        };

        let visible = GpuVisibleInstance {
            instance_index,
            lod_index: mesh.lod_base_index + local_lod as u32,
            batch_index: batch,
            draw_slot,
        };
        let args = GpuDrawIndexedIndirect {
            index_count: lod.index_count,
            instance_count: 1,
            first_index: lod.first_index,
            base_vertex: mesh.base_vertex,
            first_instance: draw_slot,
        };
        let slot = u64::from(draw_slot);
        memory.write(
            constants.visible.write_index(),
            slot * std::mem::size_of::<GpuVisibleInstance>() as u64,
            bytemuck::bytes_of(&visible),
        )?;
        memory.write(constants.draw_ids.index(), slot * 4, &instance_index.to_le_bytes())?;
        memory.write(constants.draw_args.index(), slot * DRAW_ARGS_STRIDE, bytemuck::bytes_of(&args))?;
        Ok(true)
    }
}

impl ComputeKernel for GpuCullKernel {
    fn label(&self) -> &str {
        "gpu_cull"
    }

    fn workgroup_size(&self) -> u32 {
        self.workgroup_size
    }

    fn dispatch(
        &self,
        workgroups: [u32; 3],
        constants: &[u32],
        memory: &mut dyn KernelMemory,
    ) -> Result<(), DeviceError> {
        let constants = CullConstants::from_words(constants)?;
        let params: GpuCullingParams =
            read_record(memory, DescriptorKind::ConstantView, constants.params.index(), 0)?;

        let threads = workgroups.iter().map(|&g| u64::from(g)).product::<u64>()
            * u64::from(self.workgroup_size);
        let instance_count = threads.min(u64::from(params.instance_count)) as u32;

        let mut appended = 0u32;
        for instance_index in 0..instance_count {
            if self.cull_instance(memory, &constants, &params, instance_index)? {
                appended += 1;
            }
        }
        log::trace!("gpu_cull: {appended}/{instance_count} instance slot(s) visible");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_lane::gpu_driven::constants::CullConstants;
    use std::collections::HashMap;
    use strata_core::math::{Mat4, FRAC_PI_2};
    use strata_core::renderer::{DescriptorHandle, LiteDescriptorHandle};

    /// Heap slots backed by plain byte vectors.
    #[derive(Default)]
    struct VecMemory {
        views: HashMap<(DescriptorKind, u32), usize>,
        buffers: Vec<Vec<u8>>,
    }

    impl VecMemory {
        fn buffer(&mut self, bytes: Vec<u8>, views: &[(DescriptorKind, u32)]) -> usize {
            let id = self.buffers.len();
            self.buffers.push(bytes);
            for view in views {
                self.views.insert(*view, id);
            }
            id
        }

        fn slot(&self, kind: DescriptorKind, index: u32) -> Result<usize, DeviceError> {
            self.views
                .get(&(kind, index))
                .copied()
                .ok_or_else(|| DeviceError::ResourceNotFound(format!("{kind} {index}")))
        }
    }

    impl KernelMemory for VecMemory {
        fn read(&self, kind: DescriptorKind, index: u32, offset: u64, len: u64) -> Result<Vec<u8>, DeviceError> {
            let buffer = &self.buffers[self.slot(kind, index)?];
            let range = offset as usize..(offset + len) as usize;
            buffer
                .get(range)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| DeviceError::OutOfBounds(format!("{len} at {offset}")))
        }

        fn write(&mut self, index: u32, offset: u64, data: &[u8]) -> Result<(), DeviceError> {
            let id = self.slot(DescriptorKind::WriteView, index)?;
            let start = offset as usize;
            self.buffers[id][start..start + data.len()].copy_from_slice(data);
            Ok(())
        }

        fn atomic_add_u32(&mut self, index: u32, offset: u64, value: u32) -> Result<u32, DeviceError> {
            let bytes = self.read(DescriptorKind::WriteView, index, offset, 4)?;
            let previous = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            self.write(index, offset, &(previous + value).to_le_bytes())?;
            Ok(previous)
        }
    }

    fn instance_at(x: f32, z: f32, pipeline_index: u32, flags: InstanceFlags) -> GpuInstance {
        GpuInstance {
            transform: Mat4::from_translation(Vec3::new(x, 0.0, z)).to_cols_array_2d(),
            pipeline_index,
            flags: flags.bits(),
            ..Default::default()
        }
    }

    #[test]
    fn visible_instances_are_appended_to_their_batch() {
        use DescriptorKind::*;

        let camera =
            CullingCamera::look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, FRAC_PI_2, 1.0, 0.1, 100.0).unwrap();
        let layout = DrawSlotLayout::new(4, 2);
        let instances = [
            instance_at(0.0, 0.0, 0, InstanceFlags::ENABLED),
            instance_at(0.0, 50.0, 0, InstanceFlags::ENABLED),
            instance_at(100.0, 0.0, 1, InstanceFlags::ENABLED | InstanceFlags::ALWAYS_VISIBLE),
            instance_at(0.0, 0.0, 0, InstanceFlags::EMPTY),
        ];
        let mesh = GpuMesh {
            bounding_sphere: [0.0, 0.0, 0.0, 1.0],
            base_vertex: 3,
            lod_base_index: 0,
            lod_count: 2,
            ..Default::default()
        };
        let lods = [
            GpuMeshLod { first_index: 0, index_count: 36, screen_size_threshold: 0.5, _pad: 0 },
            GpuMeshLod { first_index: 36, index_count: 12, screen_size_threshold: 0.0, _pad: 0 },
        ];
        let params = culling_params(&camera, instances.len() as u32, 1, 2, &layout);

        let mut memory = VecMemory::default();
        memory.buffer(bytemuck::bytes_of(&params).to_vec(), &[(ConstantView, 0)]);
        memory.buffer(bytemuck::cast_slice(&instances).to_vec(), &[(ReadView, 0)]);
        memory.buffer(bytemuck::bytes_of(&mesh).to_vec(), &[(ReadView, 1)]);
        memory.buffer(bytemuck::cast_slice(&lods).to_vec(), &[(ReadView, 2)]);
        let visible = memory.buffer(vec![0; layout.visible_buffer_size() as usize], &[(WriteView, 0)]);
        let args = memory.buffer(vec![0; layout.args_buffer_size() as usize], &[(WriteView, 1)]);
        let counts = memory.buffer(vec![0; layout.count_buffer_size() as usize], &[(WriteView, 2)]);
        let ids = memory.buffer(vec![0; layout.draw_id_buffer_size() as usize], &[(WriteView, 3)]);

        let constants = CullConstants {
            params: LiteDescriptorHandle::new(0),
            instances: LiteDescriptorHandle::new(0),
            meshes: LiteDescriptorHandle::new(1),
            lods: LiteDescriptorHandle::new(2),
            visible: DescriptorHandle::new(3, 0),
            draw_args: LiteDescriptorHandle::new(1),
            draw_counts: LiteDescriptorHandle::new(2),
            draw_ids: LiteDescriptorHandle::new(3),
        };
        let block = constants.to_inline().unwrap();
        GpuCullKernel::new(64)
            .dispatch([1, 1, 1], block.words(), &mut memory)
            .unwrap();

        let counts: Vec<u32> = bytemuck::pod_collect_to_vec(&memory.buffers[counts]);
        assert_eq!(counts, vec![1, 1]);
        let ids: Vec<u32> = bytemuck::pod_collect_to_vec(&memory.buffers[ids]);
        assert_eq!(ids[0], 0);
        assert_eq!(ids[4], 2);

        let args: Vec<GpuDrawIndexedIndirect> = bytemuck::pod_collect_to_vec(&memory.buffers[args]);
        // 5 units away with a 90 degree fov: metric 0.2, below the finest threshold.
        assert_eq!(args[0].first_index, 36);
        assert_eq!(args[0].index_count, 12);
        assert_eq!(args[0].base_vertex, 3);
        assert_eq!(args[0].first_instance, 0);
        assert_eq!(args[4].first_instance, 4);

        let visible: Vec<GpuVisibleInstance> = bytemuck::pod_collect_to_vec(&memory.buffers[visible]);
        assert_eq!(
            visible[4],
            GpuVisibleInstance {
                instance_index: 2,
                lod_index: 1,
                batch_index: 1,
                draw_slot: 4
            }
        );
    }

    #[test]
    fn short_constant_block_faults() {
        let mut memory = VecMemory::default();
        let err = GpuCullKernel::new(64).dispatch([1, 1, 1], &[0, 1], &mut memory);
        assert!(matches!(err, Err(DeviceError::InvalidOperation(_))));
    }
}
