//! Primary-visibility pass.
//!
//! Fills a per-pixel surface buffer the collect pass gathers around: camera
//! rays are traced through specular chains (mirror and glass interactions)
//! until they land on a diffuse surface, an emitter, or nothing. Each texel
//! is four vec4s (position + kind, normal, throughput-weighted albedo, view
//! direction), 64 bytes.

use bytemuck::Zeroable;
use wgpu::util::DeviceExt;

use crate::error::SppmResult;
use crate::passes::bind_groups::{storage_buffer_entry, uniform_buffer_entry};
use crate::scene::GpuScene;

pub const GBUFFER_TEXEL_SIZE: u64 = 64;

/// Camera basis and scene counts, packed so the scalars ride in the vec3
/// padding lanes.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct VisibilityParamsStd140 {
    eye: [f32; 3],
    width: u32,
    right: [f32; 3],
    height: u32,
    up: [f32; 3],
    triangle_count: u32,
    forward: [f32; 3],
    spec_rough_cutoff: f32,
}

pub struct VisibilityPass {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    params_buffer: wgpu::Buffer,
    gbuffer: wgpu::Buffer,
    width: u32,
    height: u32,
}

impl VisibilityPass {
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> SppmResult<Self> {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sppm-visibility"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/visibility.wgsl").into()),
        });

        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("sppm-visibility-bgl"),
                entries: &[
                    storage_buffer_entry(0, true),  // triangles
                    storage_buffer_entry(1, false), // gbuffer
                    uniform_buffer_entry(2),
                ],
            });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sppm-visibility-pl"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("sppm-visibility-pipeline"),
            layout: Some(&layout),
            module: &shader,
            entry_point: "main",
        });

        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("sppm-visibility-params"),
            contents: bytemuck::bytes_of(&VisibilityParamsStd140::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let gbuffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sppm-gbuffer"),
            size: width as u64 * height as u64 * GBUFFER_TEXEL_SIZE,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        Ok(Self {
            pipeline,
            bind_group_layout,
            params_buffer,
            gbuffer,
            width,
            height,
        })
    }

    pub fn gbuffer(&self) -> &wgpu::Buffer {
        &self.gbuffer
    }

    pub fn execute(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        scene: &GpuScene,
        spec_rough_cutoff: f32,
    ) {
        let aspect = self.width as f32 / self.height as f32;
        let (right, up, forward) = scene.camera.basis(aspect);
        queue.write_buffer(
            &self.params_buffer,
            0,
            bytemuck::bytes_of(&VisibilityParamsStd140 {
                eye: scene.camera.eye.to_array(),
                width: self.width,
                right: right.to_array(),
                height: self.height,
                up: up.to_array(),
                triangle_count: scene.triangle_count,
                forward: forward.to_array(),
                spec_rough_cutoff,
            }),
        );

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sppm-visibility-bg"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: scene.triangles.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.gbuffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.params_buffer.as_entire_binding(),
                },
            ],
        });

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("sppm-visibility-pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups((self.width + 7) / 8, (self.height + 7) / 8, 1);
    }
}
