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


use std::sync::Arc;
use strata_core::math::{BoundingSphere, Mat4, Vec3, FRAC_PI_2};
use strata_core::renderer::{
    BindlessSettings, BufferDescriptor, BufferUsage, CullingCamera, DescriptorKind,
    DescriptorKinds, DeviceError, ExhaustionPolicy, GpuDrawIndexedIndirect, GpuInstance,
    GpuResource, GpuVisibleInstance, GraphicsDevice, InstanceFlags, RenderError, NO_SKINNING,
    SENTINEL_MATERIAL_INDEX,
};
use strata_data::scene::{MeshDescriptor, MeshLodDescriptor};
use strata_infra::SoftwareDevice;
use strata_lanes::render_lane::gpu_driven::{BindlessRenderer, FrameStage, DRAW_CONSTANT_WORDS};
use strata_lanes::CullingError;

// --- Helpers ---

/// The batch index closes the draw block.
const BATCH_WORD: usize = DRAW_CONSTANT_WORDS as usize - 1;

fn settings() -> BindlessSettings {
    let mut settings = BindlessSettings::default();
    settings.heaps.constant_views = 16;
    settings.heaps.read_views = 64;
    settings.heaps.write_views = 16;
    settings.scene.meshes = 16;
    settings.scene.mesh_lods = 64;
    settings.scene.instances = 256;
    settings.scene.skinned_instances = 4;
    settings.scene.materials = 64;
    settings.scene.vertex_bytes = 1 << 16;
    settings.scene.index_bytes = 1 << 16;
    settings.scene.pipelines = 4;
    settings.culling.max_draws_per_batch = 64;
    settings
}

fn setup(settings: BindlessSettings) -> (SoftwareDevice, BindlessRenderer) {
    let device = SoftwareDevice::new(&settings.heaps);
    let renderer = BindlessRenderer::new(Arc::new(device.clone()), settings).unwrap();
    (device, renderer)
}

/// Uploads a unit cube whose LOD `i` draws `36 - 12 * i` indices.
fn cube_descriptor(renderer: &mut BindlessRenderer, thresholds: &[f32]) -> MeshDescriptor {
    let scene = renderer.scene_mut();
    let positions: Vec<f32> = (0..8)
        .flat_map(|corner| {
            let bit = |b: u32| if corner & (1 << b) != 0 { 0.5 } else { -0.5 };
            [bit(0), bit(1), bit(2)]
        })
        .collect();
    let vertices = scene.allocate_vertices(8, 12).unwrap();
    scene
        .write_vertices(vertices, bytemuck::cast_slice(&positions))
        .unwrap();
    let cube: Vec<u32> = (0..36).map(|i| i % 8).collect();
    let indices = scene.allocate_indices(cube.len() as u32).unwrap();
    scene.write_indices(indices, &cube).unwrap();

    let lods = thresholds
        .iter()
        .enumerate()
        .map(|(i, &screen_size_threshold)| MeshLodDescriptor {
            first_index: 0,
            index_count: 36 - 12 * i as u32,
            screen_size_threshold,
        })
        .collect();
    MeshDescriptor {
        bounds: BoundingSphere::new(Vec3::ZERO, 1.0),
        vertices,
        vertex_stride: 12,
        indices,
        lods,
    }
}

fn add_cube(renderer: &mut BindlessRenderer, thresholds: &[f32]) -> u32 {
    let desc = cube_descriptor(renderer, thresholds);
    renderer.scene_mut().add_mesh(&desc).unwrap()
}

fn instance(mesh: u32, batch: u32, position: Vec3) -> GpuInstance {
    GpuInstance {
        transform: Mat4::from_translation(position).to_cols_array_2d(),
        mesh_index: mesh,
        material_index: SENTINEL_MATERIAL_INDEX,
        pipeline_index: batch,
        skinning_index: NO_SKINNING,
        flags: InstanceFlags::ENABLED.bits(),
        _pad: [0; 3],
    }
}

/// Looks down -Z from `z = 10` with a 90 degree field of view.
fn camera() -> CullingCamera {
    CullingCamera::look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, FRAC_PI_2, 1.0, 0.1, 100.0).unwrap()
}

fn storage_buffer(device: &SoftwareDevice, size: u64) -> GpuResource {
    let id = device
        .create_buffer(&BufferDescriptor {
            label: None,
            size,
            usage: BufferUsage::STORAGE,
        })
        .unwrap();
    GpuResource::Buffer { id, size, stride: 4 }
}

// --- Culling ---

#[test]
fn frustum_culling_keeps_only_visible_instances() {
    // --- 1. ARRANGE ---
    let (device, mut renderer) = setup(settings());
    let batch = renderer.create_render_pipeline("opaque").unwrap();
    let mesh = add_cube(&mut renderer, &[0.0]);
    let mut expected = Vec::new();
    for x in -3..=3 {
        let index = renderer
            .scene_mut()
            .add_instance(instance(mesh, batch, Vec3::new(x as f32 * 1.5, 0.0, 0.0)))
            .unwrap();
        expected.push(index);
    }
    for outside in [
        Vec3::new(0.0, 0.0, 50.0),
        Vec3::new(100.0, 0.0, 0.0),
        Vec3::new(0.0, 0.0, -200.0),
    ] {
        renderer
            .scene_mut()
            .add_instance(instance(mesh, batch, outside))
            .unwrap();
    }

    // --- 2. ACT ---
    let report = renderer.render_frame(&camera()).unwrap();
    device.poll().unwrap();

    // --- 3. ASSERT ---
    assert_eq!(report.instance_slots, 10);
    assert_eq!(report.workgroups, 1);
    assert_eq!(report.batches, 1);
    assert!(report.uploaded_bytes > 0);

    let resources = renderer.resources().unwrap();
    let counts: Vec<u32> = device.read_records(resources.draw_count_buffer(), 0, 1).unwrap();
    assert_eq!(counts, vec![7]);

    let mut drawn: Vec<u32> = device.read_records(resources.draw_id_buffer(), 0, 7).unwrap();
    drawn.sort_unstable();
    assert_eq!(drawn, expected);

    let visible: Vec<GpuVisibleInstance> = device.read_records(resources.visible_buffer(), 0, 7).unwrap();
    for (slot, record) in visible.iter().enumerate() {
        assert_eq!(record.draw_slot, slot as u32);
        assert_eq!(record.batch_index, batch);
        assert!(expected.contains(&record.instance_index));
    }

    let stats = device.stats();
    assert_eq!(stats.draws, 7);
    assert_eq!(stats.multi_draw_calls, 1);
    assert_eq!(stats.barrier_hazards, 0);
    assert_eq!(stats.out_of_range_draws, 0);
    assert_eq!(renderer.frame_stage(), FrameStage::Idle);
}

#[test]
fn lod_is_picked_from_projected_size() {
    // --- 1. ARRANGE ---
    let (device, mut renderer) = setup(settings());
    let batch = renderer.create_render_pipeline("opaque").unwrap();
    let mesh = add_cube(&mut renderer, &[0.8, 0.4, 0.1]);
    // Two units from the eye with a unit radius: metric 0.5.
    let near = renderer
        .scene_mut()
        .add_instance(instance(mesh, batch, Vec3::new(0.0, 0.0, 8.0)))
        .unwrap();

    // --- 2. ACT ---
    renderer.render_frame(&camera()).unwrap();
    device.poll().unwrap();

    // --- 3. ASSERT ---
    let resources = renderer.resources().unwrap();
    let lod_base = renderer.scene().mesh(mesh).unwrap().lod_base_index;
    let visible: Vec<GpuVisibleInstance> = device.read_records(resources.visible_buffer(), 0, 1).unwrap();
    assert_eq!(visible[0].instance_index, near);
    assert_eq!(visible[0].lod_index, lod_base + 1);

    let args: Vec<GpuDrawIndexedIndirect> = device.read_records(resources.draw_args_buffer(), 0, 1).unwrap();
    assert_eq!(args[0].index_count, 24);
    assert_eq!(args[0].instance_count, 1);
    assert_eq!(args[0].first_instance, 0);
}

#[test]
fn updated_mesh_is_drawn_with_its_new_lods() {
    // --- 1. ARRANGE ---
    let (device, mut renderer) = setup(settings());
    let batch = renderer.create_render_pipeline("opaque").unwrap();
    let mesh = add_cube(&mut renderer, &[0.8, 0.4, 0.1]);
    let drawn = renderer
        .scene_mut()
        .add_instance(instance(mesh, batch, Vec3::new(0.0, 0.0, 8.0)))
        .unwrap();
    renderer.render_frame(&camera()).unwrap();
    device.poll().unwrap();
    let old_base = renderer.scene().mesh(mesh).unwrap().lod_base_index;

    // --- 2. ACT ---
    let mut coarse = cube_descriptor(&mut renderer, &[0.0]);
    coarse.lods[0].index_count = 12;
    renderer.scene_mut().update_mesh(mesh, &coarse).unwrap();
    renderer.render_frame(&camera()).unwrap();
    device.poll().unwrap();

    // --- 3. ASSERT ---
    let record = *renderer.scene().mesh(mesh).unwrap();
    assert_ne!(record.lod_base_index, old_base);
    assert_eq!(u64::from(record.vertex_byte_offset), coarse.vertices.offset);
    assert_eq!(i64::from(record.base_vertex) * 12, coarse.vertices.offset as i64);

    let resources = renderer.resources().unwrap();
    let visible: Vec<GpuVisibleInstance> = device.read_records(resources.visible_buffer(), 0, 1).unwrap();
    assert_eq!(visible[0].instance_index, drawn);
    assert_eq!(visible[0].lod_index, record.lod_base_index);

    let args: Vec<GpuDrawIndexedIndirect> = device.read_records(resources.draw_args_buffer(), 0, 1).unwrap();
    assert_eq!(args[0].index_count, 12);
    assert_eq!(args[0].first_index, (coarse.indices.offset / 4) as u32);
    assert_eq!(args[0].base_vertex, record.base_vertex);
}

#[test]
fn instances_are_drawn_by_their_pipeline_batch() {
    // --- 1. ARRANGE ---
    let (device, mut renderer) = setup(settings());
    let opaque = renderer.create_render_pipeline("opaque").unwrap();
    let masked = renderer.create_render_pipeline("masked").unwrap();
    let unused = renderer.create_render_pipeline("unused").unwrap();
    let mesh = add_cube(&mut renderer, &[0.0]);
    for i in 0..6 {
        let batch = if i < 4 { opaque } else { masked };
        renderer
            .scene_mut()
            .add_instance(instance(mesh, batch, Vec3::new(i as f32 - 3.0, 0.0, 0.0)))
            .unwrap();
    }

    // --- 2. ACT ---
    let report = renderer.render_frame(&camera()).unwrap();
    device.poll().unwrap();

    // --- 3. ASSERT ---
    assert_eq!(report.batches, 2);
    let resources = renderer.resources().unwrap();
    let counts: Vec<u32> = device.read_records(resources.draw_count_buffer(), 0, 3).unwrap();
    assert_eq!(counts, vec![4, 2, 0]);

    let capacity = u64::from(resources.layout().batch_capacity());
    let masked_ids: Vec<u32> = device.read_records(resources.draw_id_buffer(), capacity, 2).unwrap();
    assert!(masked_ids.iter().all(|&id| id >= 4));

    let draws = device.take_draw_records();
    assert_eq!(draws.len(), 6);
    let pipelines = renderer.scene().pipelines();
    for draw in &draws {
        let batch = draw.constants.words()[BATCH_WORD];
        assert_ne!(batch, unused);
        assert_eq!(draw.pipeline, pipelines.get(batch));
    }
    assert_eq!(draws.iter().filter(|d| d.constants.words()[BATCH_WORD] == masked).count(), 2);
}

#[test]
fn empty_scene_still_submits_a_frame() {
    let (device, mut renderer) = setup(settings());
    renderer.create_render_pipeline("opaque").unwrap();

    let report = renderer.render_frame(&camera()).unwrap();
    device.poll().unwrap();

    assert_eq!(report.workgroups, 0);
    assert_eq!(report.batches, 0);
    assert_eq!(device.stats().submissions, 1);
    assert_eq!(device.stats().draws, 0);
}

#[test]
fn removed_instances_stop_being_drawn() {
    let (device, mut renderer) = setup(settings());
    let batch = renderer.create_render_pipeline("opaque").unwrap();
    let mesh = add_cube(&mut renderer, &[0.0]);
    let first = renderer
        .scene_mut()
        .add_instance(instance(mesh, batch, Vec3::ZERO))
        .unwrap();
    let second = renderer
        .scene_mut()
        .add_instance(instance(mesh, batch, Vec3::new(2.0, 0.0, 0.0)))
        .unwrap();
    renderer.render_frame(&camera()).unwrap();

    renderer.scene_mut().remove_instance(first).unwrap();
    renderer.render_frame(&camera()).unwrap();
    device.poll().unwrap();

    let resources = renderer.resources().unwrap();
    let counts: Vec<u32> = device.read_records(resources.draw_count_buffer(), 0, 1).unwrap();
    assert_eq!(counts, vec![1]);
    let ids: Vec<u32> = device.read_records(resources.draw_id_buffer(), 0, 1).unwrap();
    assert_eq!(ids, vec![second]);
}

// --- Frame pacing ---

#[test]
fn frames_in_flight_are_throttled() {
    let (device, mut renderer) = setup(settings());
    renderer.create_render_pipeline("opaque").unwrap();

    for _ in 0..3 {
        renderer.render_frame(&camera()).unwrap();
    }

    // The third frame had to wait for the first.
    assert_eq!(device.pending_submissions(), 2);
    assert_eq!(renderer.frames_in_flight(), 2);
    assert_eq!(renderer.frame_index(), 3);
}

#[test]
fn stalled_gpu_times_out_without_losing_the_renderer() {
    let mut settings = settings();
    settings.exhaustion_policy = ExhaustionPolicy::WaitForGpu { timeout_ms: 5 };
    let (device, mut renderer) = setup(settings);
    device.set_stalled(true);

    renderer.render_frame(&camera()).unwrap();
    renderer.render_frame(&camera()).unwrap();
    let err = renderer.render_frame(&camera()).unwrap_err();

    assert!(matches!(
        err,
        CullingError::Render(RenderError::Device(DeviceError::Timeout { .. }))
    ));
    assert!(!renderer.is_device_lost());

    device.set_stalled(false);
    assert!(renderer.render_frame(&camera()).is_ok());
}

// --- Descriptors ---

#[test]
fn hot_reload_keeps_the_old_view_until_its_frame_retires() {
    // --- 1. ARRANGE ---
    let (device, mut renderer) = setup(settings());
    let original = storage_buffer(&device, 256);
    let reloaded = storage_buffer(&device, 512);
    let mut set = renderer
        .configure_resource(original, DescriptorKinds::READ_VIEW)
        .unwrap();
    let old_index = set.get_index(DescriptorKind::ReadView).unwrap();
    let baseline = renderer.heap().stats(DescriptorKind::ReadView).occupied;

    // --- 2. ACT ---
    renderer.replace_resource(&mut set, reloaded).unwrap();
    let new_index = set.get_index(DescriptorKind::ReadView).unwrap();

    // --- 3. ASSERT ---
    assert_ne!(new_index, old_index);
    assert_eq!(device.descriptor(DescriptorKind::ReadView, new_index), Some(reloaded));
    assert_eq!(device.descriptor(DescriptorKind::ReadView, old_index), Some(original));
    assert_eq!(renderer.heap().stats(DescriptorKind::ReadView).pending_release, 1);

    renderer.render_frame(&camera()).unwrap();
    assert_eq!(renderer.heap().stats(DescriptorKind::ReadView).pending_release, 1);

    device.poll().unwrap();
    renderer.begin_frame().unwrap();
    let stats = renderer.heap().stats(DescriptorKind::ReadView);
    assert_eq!(stats.pending_release, 0);
    assert_eq!(stats.occupied, baseline);
}

#[test]
fn dropped_shared_set_is_released_at_the_next_frame() {
    let (device, mut renderer) = setup(settings());
    let buffer = storage_buffer(&device, 64);
    let set = renderer
        .configure_resource(buffer, DescriptorKinds::READ_VIEW | DescriptorKinds::WRITE_VIEW)
        .unwrap();
    let shared = renderer.share_resource(set);
    let other_owner = shared.clone();

    std::thread::spawn(move || drop(other_owner)).join().unwrap();
    drop(shared);
    assert_eq!(renderer.heap().stats(DescriptorKind::WriteView).pending_release, 0);

    renderer.render_frame(&camera()).unwrap();
    assert_eq!(renderer.heap().stats(DescriptorKind::ReadView).pending_release, 1);
    assert_eq!(renderer.heap().stats(DescriptorKind::WriteView).pending_release, 1);
}

#[test]
fn constant_view_of_an_image_is_rejected() {
    let (device, mut renderer) = setup(settings());
    let image = GpuResource::Image {
        id: device
            .create_image(&strata_core::renderer::ImageDescriptor {
                label: None,
                width: 4,
                height: 4,
                format: strata_core::renderer::ImageFormat::Rgba8Unorm,
                usage: strata_core::renderer::ImageUsage::SAMPLED,
            })
            .unwrap(),
    };

    let err = renderer
        .configure_resource(image, DescriptorKinds::CONSTANT_VIEW)
        .unwrap_err();

    assert!(matches!(err, CullingError::Render(RenderError::Descriptor(_))));
    assert!(!renderer.is_device_lost());
}

// --- Device loss ---

#[test]
fn device_loss_abandons_bookkeeping_and_requires_reinitialization() {
    // --- 1. ARRANGE ---
    let (device, mut renderer) = setup(settings());
    let batch = renderer.create_render_pipeline("opaque").unwrap();
    let mesh = add_cube(&mut renderer, &[0.0]);
    renderer
        .scene_mut()
        .add_instance(instance(mesh, batch, Vec3::ZERO))
        .unwrap();
    renderer.render_frame(&camera()).unwrap();

    let set = renderer
        .configure_resource(storage_buffer(&device, 64), DescriptorKinds::READ_VIEW)
        .unwrap();
    renderer.release_resource(set).unwrap();
    assert_eq!(renderer.heap().stats(DescriptorKind::ReadView).pending_release, 1);

    // --- 2. ACT ---
    device.lose_device("driver reset");
    let err = renderer.render_frame(&camera()).unwrap_err();

    // --- 3. ASSERT ---
    assert!(err.is_device_lost());
    assert!(renderer.is_device_lost());
    assert_eq!(renderer.heap().stats(DescriptorKind::ReadView).pending_release, 0);
    assert_eq!(renderer.frames_in_flight(), 0);

    let err = renderer.render_frame(&camera()).unwrap_err();
    assert!(matches!(err, CullingError::RequiresReinitialization { .. }));
    assert!(matches!(
        renderer.create_render_pipeline("late"),
        Err(CullingError::RequiresReinitialization { .. })
    ));
}

#[test]
fn shutdown_destroys_every_buffer() {
    let (device, mut renderer) = setup(settings());
    renderer.create_render_pipeline("opaque").unwrap();
    renderer.render_frame(&camera()).unwrap();

    renderer.shutdown().unwrap();

    assert_eq!(device.buffer_count(), 0);
    assert_eq!(device.pending_submissions(), 0);
}
