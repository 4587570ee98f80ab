//! Photon trace pass.
//!
//! One ray per cell of the square photon grid: sample an emitter flux
//! weighted, walk up to `max_depth` bounces, and deposit a record plus
//! radius-sized bounding box into the caustic or global pool through the
//! atomic counter. Clears the counter and both pools first so nothing from
//! a previous frame survives into this frame's index.

use bytemuck::Zeroable;
use wgpu::util::DeviceExt;

use crate::counter::PhotonCounter;
use crate::error::SppmResult;
use crate::passes::bind_groups::{storage_buffer_entry, uniform_buffer_entry};
use crate::pool::{PerClass, PhotonClass, PhotonPool};
use crate::scene::GpuScene;

/// CPU-side trace controls.
#[derive(Clone, Copy, Debug)]
pub struct TraceParams {
    pub frame_index: u32,
    /// Resolved seed: the fixed seed in fixed-seed mode, else the frame index.
    pub seed: u32,
    pub max_depth: u32,
    pub grid_side: u32,
    pub radii: PerClass<f32>,
    pub capacity: u32,
    pub use_alpha_test: bool,
    pub spec_rough_cutoff: f32,
}

/// GPU-side std140 layout.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TraceParamsStd140 {
    pub frame_index: u32,
    pub seed: u32,
    pub max_depth: u32,
    pub grid_side: u32,
    pub caustic_radius: f32,
    pub global_radius: f32,
    pub spec_rough_cutoff: f32,
    pub use_alpha_test: u32,
    pub capacity: u32,
    pub triangle_count: u32,
    pub emitter_count: u32,
    pub _pad0: u32,
}

impl TraceParams {
    fn std140(&self, scene: &GpuScene) -> TraceParamsStd140 {
        TraceParamsStd140 {
            frame_index: self.frame_index,
            seed: self.seed,
            max_depth: self.max_depth,
            grid_side: self.grid_side,
            caustic_radius: self.radii[PhotonClass::Caustic],
            global_radius: self.radii[PhotonClass::Global],
            spec_rough_cutoff: self.spec_rough_cutoff,
            use_alpha_test: u32::from(self.use_alpha_test),
            capacity: self.capacity,
            triangle_count: scene.triangle_count,
            emitter_count: scene.emitter_count,
            _pad0: 0,
        }
    }
}

pub struct TracePass {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    params_buffer: wgpu::Buffer,
}

impl TracePass {
    pub fn new(device: &wgpu::Device) -> SppmResult<Self> {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sppm-photon-trace"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/photon_trace.wgsl").into()),
        });

        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("sppm-trace-bgl"),
                entries: &[
                    storage_buffer_entry(0, true),  // triangles
                    storage_buffer_entry(1, true),  // emitters + alias
                    storage_buffer_entry(2, true),  // seeds
                    storage_buffer_entry(3, false), // caustic records
                    storage_buffer_entry(4, false), // global records
                    storage_buffer_entry(5, false), // caustic bounds
                    storage_buffer_entry(6, false), // global bounds
                    storage_buffer_entry(7, false), // counter
                    uniform_buffer_entry(8),
                ],
            });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sppm-trace-pl"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("sppm-trace-pipeline"),
            layout: Some(&layout),
            module: &shader,
            entry_point: "main",
        });

        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("sppm-trace-params"),
            contents: bytemuck::bytes_of(&TraceParamsStd140::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        Ok(Self {
            pipeline,
            bind_group_layout,
            params_buffer,
        })
    }

    /// Record clears plus the trace dispatch. Counter and pool clears sit in
    /// the same encoder before the dispatch, so their writes are ordered
    /// ahead of the kernel's.
    pub fn execute(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        scene: &GpuScene,
        pools: &PerClass<PhotonPool>,
        counter: &PhotonCounter,
        params: &TraceParams,
    ) {
        queue.write_buffer(
            &self.params_buffer,
            0,
            bytemuck::bytes_of(&params.std140(scene)),
        );

        counter.clear(encoder);
        for (_, pool) in pools.iter() {
            pool.clear(encoder);
        }

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sppm-trace-bg"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: scene.triangles.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: scene.emitters.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: scene.seeds.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: pools[PhotonClass::Caustic].records().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: pools[PhotonClass::Global].records().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: pools[PhotonClass::Caustic].bounds().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: pools[PhotonClass::Global].bounds().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 7,
                    resource: counter.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 8,
                    resource: self.params_buffer.as_entire_binding(),
                },
            ],
        });

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("sppm-trace-pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        let wg = (params.grid_side + 7) / 8;
        pass.dispatch_workgroups(wg, wg, 1);
    }
}
