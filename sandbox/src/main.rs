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


// Strata Sandbox
// Orbits a camera around a grid of cubes and prints what the GPU-driven lane drew.

use std::sync::Arc;

use anyhow::{Context, Result};
use strata_core::math::{BoundingSphere, Mat4, Vec3, FRAC_PI_3};
use strata_core::renderer::{
    BindlessSettings, CullingCamera, DescriptorKind, DescriptorKinds, GpuInstance, GpuMaterial,
    GpuResource, GraphicsDevice, ImageDescriptor, ImageFormat, ImageUsage, InstanceFlags,
    NO_SKINNING,
};
use strata_data::scene::{MeshDescriptor, MeshLodDescriptor};
use strata_infra::SoftwareDevice;
use strata_lanes::BindlessRenderer;

const GRID: i32 = 12;
const SPACING: f32 = 3.0;
const FRAMES: u32 = 8;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    position: [f32; 3],
}

/// Eight corners of a unit cube; bit `n` of the index selects the sign on axis `n`.
fn cube_vertices() -> Vec<Vertex> {
    (0..8u32)
        .map(|corner| {
            let axis = |bit: u32| if corner & (1 << bit) != 0 { 0.5 } else { -0.5 };
            Vertex {
                position: [axis(0), axis(1), axis(2)],
            }
        })
        .collect()
}

const CUBE_INDICES: &[u32] = &[
    0, 2, 1, 1, 2, 3, // -z
    4, 5, 6, 5, 7, 6, // +z
    0, 1, 4, 1, 5, 4, // -y
    2, 6, 3, 3, 6, 7, // +y
    0, 4, 2, 2, 4, 6, // -x
    1, 3, 5, 3, 7, 5, // +x
];

/// Uploads the cube and registers it with a full LOD and two coarser ones
/// that drop faces as it shrinks on screen.
fn add_cube_mesh(renderer: &mut BindlessRenderer) -> Result<u32> {
    let scene = renderer.scene_mut();
    let vertices = cube_vertices();
    let stride = std::mem::size_of::<Vertex>() as u32;
    let vertex_span = scene.allocate_vertices(vertices.len() as u32, stride)?;
    scene.write_vertices(vertex_span, bytemuck::cast_slice(&vertices))?;
    let index_span = scene.allocate_indices(CUBE_INDICES.len() as u32)?;
    scene.write_indices(index_span, CUBE_INDICES)?;

    let mesh = scene.add_mesh(&MeshDescriptor {
        bounds: BoundingSphere::new(Vec3::ZERO, 0.87),
        vertices: vertex_span,
        vertex_stride: stride,
        indices: index_span,
        lods: vec![
            MeshLodDescriptor {
                first_index: 0,
                index_count: 36,
                screen_size_threshold: 0.5,
            },
            MeshLodDescriptor {
                first_index: 0,
                index_count: 18,
                screen_size_threshold: 0.15,
            },
            MeshLodDescriptor {
                first_index: 0,
                index_count: 6,
                screen_size_threshold: 0.0,
            },
        ],
    })?;
    Ok(mesh)
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let mut settings = BindlessSettings::default();
    settings.scene.instances = 1024;
    settings.scene.meshes = 64;
    settings.scene.mesh_lods = 256;
    settings.scene.skinned_instances = 16;
    settings.scene.materials = 64;
    settings.scene.vertex_bytes = 1 << 20;
    settings.scene.index_bytes = 1 << 20;
    settings.scene.pipelines = 4;
    settings.culling.max_draws_per_batch = 1024;

    let device = SoftwareDevice::new(&settings.heaps);
    let mut renderer = BindlessRenderer::new(Arc::new(device.clone()), settings)
        .context("failed to create the bindless renderer")?;

    // One textured material, read through the heap by index.
    let albedo = device.create_image(&ImageDescriptor {
        label: Some("checker_albedo".into()),
        width: 64,
        height: 64,
        format: ImageFormat::Rgba8Unorm,
        usage: ImageUsage::SAMPLED,
    })?;
    let albedo_set = renderer.configure_resource(GpuResource::Image { id: albedo }, DescriptorKinds::READ_VIEW)?;
    let albedo_view = albedo_set.get_index(DescriptorKind::ReadView)?;

    let opaque = renderer.create_render_pipeline("opaque")?;
    let tinted = renderer.create_render_pipeline("tinted")?;
    let cube = add_cube_mesh(&mut renderer)?;
    let scene = renderer.scene_mut();
    let checker = scene.add_material(GpuMaterial {
        albedo_texture: albedo_view,
        ..Default::default()
    })?;
    let red = scene.add_material(GpuMaterial {
        base_color: [0.9, 0.2, 0.1, 1.0],
        ..Default::default()
    })?;

    let half = GRID as f32 * SPACING / 2.0;
    for x in 0..GRID {
        for z in 0..GRID {
            let position = Vec3::new(x as f32 * SPACING - half, 0.0, z as f32 * SPACING - half);
            let tinted_cell = (x + z) % 2 == 0;
            scene.add_instance(GpuInstance {
                transform: Mat4::from_translation(position).to_cols_array_2d(),
                mesh_index: cube,
                material_index: if tinted_cell { red } else { checker },
                pipeline_index: if tinted_cell { tinted } else { opaque },
                skinning_index: NO_SKINNING,
                flags: InstanceFlags::ENABLED.bits(),
                _pad: [0; 3],
            })?;
        }
    }
    log::info!("Scene: {:?}", renderer.scene().stats());

    for frame in 0..FRAMES {
        let angle = frame as f32 / FRAMES as f32 * std::f32::consts::TAU;
        let eye = Vec3::new(angle.cos() * 20.0, 8.0, angle.sin() * 20.0);
        let camera = CullingCamera::look_at(eye, Vec3::ZERO, FRAC_PI_3, 16.0 / 9.0, 0.1, 200.0)
            .context("degenerate camera")?;

        let report = renderer.render_frame(&camera)?;
        device.poll()?;
        let draws = device.take_draw_records();
        log::info!(
            "Frame {} (fence {:?}): {} draw(s) from {} slot(s), {} batch(es), {} byte(s) uploaded",
            report.frame_index,
            report.fence,
            draws.len(),
            report.instance_slots,
            report.batches,
            report.uploaded_bytes
        );
    }

    // Swap the opaque pipeline mid-run; the previous one stays valid for frames in flight.
    let previous = renderer.reload_render_pipeline(opaque, "opaque_reloaded")?;
    log::info!("Replaced opaque pipeline {previous:?}");

    renderer.release_resource(albedo_set)?;
    for kind in DescriptorKind::ALL {
        log::info!("{}", renderer.heap().stats(kind));
    }

    renderer.shutdown()?;
    log::info!("Device: {}", device.stats());
    Ok(())
}
