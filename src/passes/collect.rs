//! Photon collect pass.
//!
//! For every pixel with a valid surface in the visibility buffer, walks the
//! photon indices selected by the instance table, sums the flux of photons
//! whose cells overlap the surface point, and folds the estimate into a
//! running per-pixel average. The average lives in a storage buffer; each
//! frame resolves it into the output texture so frame `k` shows the mean of
//! all iterations since the last reset.
//!
//! The gather and an index occupancy debug view share one shader; a small
//! separate kernel blanks the average and the output without touching any
//! photon data, so it also serves frames with nothing to render.

use bytemuck::Zeroable;
use wgpu::util::DeviceExt;

use crate::accel::{PreparedIndex, TopLevelIndex};
use crate::error::{SppmError, SppmResult};
use crate::gpu::align_copy_bpr;
use crate::passes::bind_groups::{
    output_texture_entry, storage_buffer_entry, uniform_buffer_entry,
};
use crate::pool::{PerClass, PhotonClass, PhotonPool};

/// Per-frame collect controls.
#[derive(Clone, Copy, Debug)]
pub struct CollectParams {
    pub frame_index: u32,
    pub collect_caustic: bool,
    pub collect_global: bool,
    pub debug_show_index: bool,
}

impl CollectParams {
    /// Instance-mask filter: bit 0 selects the caustic pool, bit 1 the
    /// global pool. Lets either pool be muted without rebuilding anything.
    fn query_mask(&self) -> u32 {
        let mut mask = 0;
        if self.collect_caustic {
            mask |= PhotonClass::Caustic.visibility_mask();
        }
        if self.collect_global {
            mask |= PhotonClass::Global.visibility_mask();
        }
        mask
    }
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct CollectParamsStd140 {
    width: u32,
    height: u32,
    frame_index: u32,
    query_mask: u32,
}

pub struct CollectPass {
    collect_pipeline: wgpu::ComputePipeline,
    debug_pipeline: wgpu::ComputePipeline,
    clear_pipeline: wgpu::ComputePipeline,
    gather_layout: wgpu::BindGroupLayout,
    clear_layout: wgpu::BindGroupLayout,
    params_buffer: wgpu::Buffer,
    accum: wgpu::Buffer,
    output: wgpu::Texture,
    output_view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl CollectPass {
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> SppmResult<Self> {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sppm-photon-collect"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/photon_collect.wgsl").into()),
        });
        // The clear entry binds a different layout, so it lives in its own
        // module to keep each module's binding table single-purpose.
        let clear_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sppm-collect-clear"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/collect_clear.wgsl").into()),
        });

        let gather_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sppm-collect-bgl"),
            entries: &[
                storage_buffer_entry(0, true),  // gbuffer
                storage_buffer_entry(1, true),  // caustic nodes
                storage_buffer_entry(2, true),  // global nodes
                storage_buffer_entry(3, true),  // caustic records
                storage_buffer_entry(4, true),  // global records
                storage_buffer_entry(5, false), // running average
                uniform_buffer_entry(6),        // instance table
                uniform_buffer_entry(7),        // params
                output_texture_entry(8),
            ],
        });
        let clear_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sppm-collect-clear-bgl"),
            entries: &[
                storage_buffer_entry(0, false),
                uniform_buffer_entry(1),
                output_texture_entry(2),
            ],
        });

        let gather_pl = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sppm-collect-pl"),
            bind_group_layouts: &[&gather_layout],
            push_constant_ranges: &[],
        });
        let clear_pl = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sppm-collect-clear-pl"),
            bind_group_layouts: &[&clear_layout],
            push_constant_ranges: &[],
        });

        let collect_pipeline =
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("sppm-collect-pipeline"),
                layout: Some(&gather_pl),
                module: &shader,
                entry_point: "main",
            });
        let debug_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("sppm-collect-debug-pipeline"),
            layout: Some(&gather_pl),
            module: &shader,
            entry_point: "debug_index",
        });
        let clear_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("sppm-collect-clear-pipeline"),
            layout: Some(&clear_pl),
            module: &clear_shader,
            entry_point: "main",
        });

        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("sppm-collect-params"),
            contents: bytemuck::bytes_of(&CollectParamsStd140::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let accum = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sppm-collect-accum"),
            size: width as u64 * height as u64 * 16,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });
        let output = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("sppm-output"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba32Float,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let output_view = output.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Self {
            collect_pipeline,
            debug_pipeline,
            clear_pipeline,
            gather_layout,
            clear_layout,
            params_buffer,
            accum,
            output,
            output_view,
            width,
            height,
        })
    }

    fn write_params(&self, queue: &wgpu::Queue, frame_index: u32, query_mask: u32) {
        queue.write_buffer(
            &self.params_buffer,
            0,
            bytemuck::bytes_of(&CollectParamsStd140 {
                width: self.width,
                height: self.height,
                frame_index,
                query_mask,
            }),
        );
    }

    /// Gather photons around every visible surface and resolve the running
    /// average into the output texture.
    pub fn execute(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        gbuffer: &wgpu::Buffer,
        pools: &PerClass<PhotonPool>,
        indices: &PerClass<PreparedIndex>,
        top_level: &TopLevelIndex,
        params: &CollectParams,
    ) {
        self.write_params(queue, params.frame_index, params.query_mask());

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sppm-collect-bg"),
            layout: &self.gather_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: gbuffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: indices[PhotonClass::Caustic].nodes().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: indices[PhotonClass::Global].nodes().as_entire_binding(),
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
                    resource: self.accum.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: top_level.instances().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 7,
                    resource: self.params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 8,
                    resource: wgpu::BindingResource::TextureView(&self.output_view),
                },
            ],
        });

        let pipeline = if params.debug_show_index {
            &self.debug_pipeline
        } else {
            &self.collect_pipeline
        };
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("sppm-collect-pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups((self.width + 7) / 8, (self.height + 7) / 8, 1);
    }

    /// Blank the running average and the output. Touches nothing else, so
    /// it is safe on frames where no scene or pools exist yet.
    pub fn execute_clear(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
    ) {
        self.write_params(queue, 0, 0);

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sppm-collect-clear-bg"),
            layout: &self.clear_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.accum.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&self.output_view),
                },
            ],
        });

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("sppm-collect-clear-pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.clear_pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups((self.width + 7) / 8, (self.height + 7) / 8, 1);
    }

    pub fn output(&self) -> &wgpu::Texture {
        &self.output
    }

    /// Copy the output texture to the host as row-major RGBA f32.
    pub fn read_output(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> SppmResult<Vec<f32>> {
        let bpr = align_copy_bpr(self.width * 16);
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sppm-output-staging"),
            size: bpr as u64 * self.height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("sppm-output-readback"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.output,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(bpr),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = sender.send(res);
        });
        device.poll(wgpu::Maintain::Wait);
        pollster::block_on(receiver.receive())
            .ok_or_else(|| SppmError::readback("output readback channel closed"))?
            .map_err(|e| SppmError::readback(format!("output map failed: {e:?}")))?;

        let data = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for row in 0..self.height {
            let start = row as usize * bpr as usize;
            let end = start + self.width as usize * 16;
            pixels.extend_from_slice(bytemuck::cast_slice(&data[start..end]));
        }
        drop(data);
        staging.unmap();
        Ok(pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(collect_caustic: bool, collect_global: bool) -> CollectParams {
        CollectParams {
            frame_index: 0,
            collect_caustic,
            collect_global,
            debug_show_index: false,
        }
    }

    #[test]
    fn query_mask_matches_the_switch_combinations() {
        assert_eq!(params(false, false).query_mask(), 0);
        assert_eq!(
            params(true, false).query_mask(),
            PhotonClass::Caustic.visibility_mask()
        );
        assert_eq!(
            params(false, true).query_mask(),
            PhotonClass::Global.visibility_mask()
        );
        assert_eq!(params(true, true).query_mask(), 0b11);
    }
}
