// src/accel/builder.rs
// GPU builder for the per-pool bottom-level photon index: Morton codes,
// radix sort, Karras topology linking, and a bottom-up AABB refit.
// Structural storage is prepared once per capacity; data builds recycle it
// every frame at the sized active count.
// RELEVANT FILES:src/shaders/index_morton.wgsl,src/shaders/index_sort.wgsl,src/shaders/index_link.wgsl,src/accel/types.rs

use anyhow::Result;
use bytemuck::{cast_slice, Pod, Zeroable};

use crate::accel::types::{
    node_count_for, sort_workgroups, Aabb, IndexPrebuildInfo, RADIX_BINS, SORT_WORKGROUP_SIZE,
};
use crate::pool::PhotonClass;

/// Uniforms for Morton code generation
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct MortonParams {
    count: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
    world_min: [f32; 3],
    _pad3: f32,
    world_extent: [f32; 3],
    _pad4: f32,
}

/// Uniforms for one radix sort pass
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct SortParams {
    count: u32,
    pass_shift: u32,
    num_workgroups: u32,
    _pad0: u32,
}

/// Uniforms for leaf init and topology linking
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct LinkParams {
    count: u32,
    node_count: u32,
    leaf_offset: u32,
    _pad0: u32,
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Compute pipelines for bottom-level index construction, shared by both
/// pools. Per-pool storage lives in `PreparedIndex`.
pub struct PhotonIndexBuilder {
    morton_pipeline: wgpu::ComputePipeline,
    sort_clear_pipeline: wgpu::ComputePipeline,
    sort_count_pipeline: wgpu::ComputePipeline,
    sort_scan_pipeline: wgpu::ComputePipeline,
    sort_scatter_pipeline: wgpu::ComputePipeline,
    init_leaves_pipeline: wgpu::ComputePipeline,
    link_nodes_pipeline: wgpu::ComputePipeline,
    refit_pipeline: wgpu::ComputePipeline,

    morton_layout: wgpu::BindGroupLayout,
    sort_layout: wgpu::BindGroupLayout,
    link_layout: wgpu::BindGroupLayout,
    refit_layout: wgpu::BindGroupLayout,
}

impl PhotonIndexBuilder {
    pub fn new(device: &wgpu::Device) -> Result<Self> {
        let morton_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("index-morton"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/index_morton.wgsl").into()),
        });
        let sort_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("index-sort"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/index_sort.wgsl").into()),
        });
        let link_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("index-link"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/index_link.wgsl").into()),
        });
        let refit_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("index-refit"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/index_refit.wgsl").into()),
        });

        // bounds in, codes + identity slot permutation out
        let morton_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("index-morton-layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, false),
                storage_entry(2, false),
                uniform_entry(3),
            ],
        });

        // src keys/vals, dst keys/vals, histogram
        let sort_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("index-sort-layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, true),
                storage_entry(2, false),
                storage_entry(3, false),
                storage_entry(4, false),
                uniform_entry(5),
            ],
        });

        // sorted codes/slots, bounds, nodes out
        let link_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("index-link-layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, false),
                uniform_entry(4),
            ],
        });

        // nodes, arrival flags
        let refit_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("index-refit-layout"),
            entries: &[storage_entry(0, false), storage_entry(1, false), uniform_entry(2)],
        });

        let morton_pl = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("index-morton-pl"),
            bind_group_layouts: &[&morton_layout],
            push_constant_ranges: &[],
        });
        let sort_pl = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("index-sort-pl"),
            bind_group_layouts: &[&sort_layout],
            push_constant_ranges: &[],
        });
        let link_pl = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("index-link-pl"),
            bind_group_layouts: &[&link_layout],
            push_constant_ranges: &[],
        });
        let refit_pl = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("index-refit-pl"),
            bind_group_layouts: &[&refit_layout],
            push_constant_ranges: &[],
        });

        let compute = |label, layout: &wgpu::PipelineLayout, module, entry| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(layout),
                module,
                entry_point: entry,
            })
        };

        Ok(Self {
            morton_pipeline: compute("index-morton-pipeline", &morton_pl, &morton_shader, "main"),
            sort_clear_pipeline: compute(
                "index-sort-clear",
                &sort_pl,
                &sort_shader,
                "clear_histogram",
            ),
            sort_count_pipeline: compute(
                "index-sort-histogram",
                &sort_pl,
                &sort_shader,
                "build_histogram",
            ),
            sort_scan_pipeline: compute("index-sort-scan", &sort_pl, &sort_shader, "scan_histogram"),
            sort_scatter_pipeline: compute(
                "index-sort-scatter",
                &sort_pl,
                &sort_shader,
                "scatter_keys",
            ),
            init_leaves_pipeline: compute("index-init-leaves", &link_pl, &link_shader, "init_leaves"),
            link_nodes_pipeline: compute("index-link-nodes", &link_pl, &link_shader, "link_nodes"),
            refit_pipeline: compute("index-refit", &refit_pl, &refit_shader, "refit"),
            morton_layout,
            sort_layout,
            link_layout,
            refit_layout,
        })
    }

    /// Structural prepare for one pool: allocate result and scratch storage
    /// for `capacity` photons over the pool's `bounds` buffer and wire up
    /// the bind groups the data builds replay. Must be re-run whenever the
    /// pool's storage is swapped.
    pub fn prepare(
        &self,
        device: &wgpu::Device,
        class: PhotonClass,
        bounds: &wgpu::Buffer,
        capacity: u32,
    ) -> PreparedIndex {
        let info = IndexPrebuildInfo::for_capacity(capacity);
        let node_count = node_count_for(capacity);
        let label = class.label();
        log::info!(
            "index prepare ({label}): capacity {} result {} B scratch {} B",
            capacity,
            info.result_size,
            info.scratch_size
        );

        let storage = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC;
        let make = |name: &str, size: u64| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(name),
                size: size.max(4),
                usage: storage,
                mapped_at_creation: false,
            })
        };

        let nodes = make(&format!("index-{label}-nodes"), info.result_size);
        let codes = [
            make(&format!("index-{label}-codes-a"), capacity as u64 * 4),
            make(&format!("index-{label}-codes-b"), capacity as u64 * 4),
        ];
        let slots = [
            make(&format!("index-{label}-slots-a"), capacity as u64 * 4),
            make(&format!("index-{label}-slots-b"), capacity as u64 * 4),
        ];
        let histogram = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("index-{label}-histogram")),
            size: sort_workgroups(capacity) as u64 * RADIX_BINS as u64 * 4,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });
        let flags = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("index-{label}-flags")),
            size: (node_count as u64 * 4).max(4),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniform = wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST;
        let morton_params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("index-{label}-morton-params")),
            size: std::mem::size_of::<MortonParams>() as u64,
            usage: uniform,
            mapped_at_creation: false,
        });
        let sort_params: Vec<wgpu::Buffer> = (0..4)
            .map(|pass| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("index-{label}-sort-params-{pass}")),
                    size: std::mem::size_of::<SortParams>() as u64,
                    usage: uniform,
                    mapped_at_creation: false,
                })
            })
            .collect();
        let link_params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("index-{label}-link-params")),
            size: std::mem::size_of::<LinkParams>() as u64,
            usage: uniform,
            mapped_at_creation: false,
        });

        let morton_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("index-{label}-morton-bg")),
            layout: &self.morton_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: bounds.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: codes[0].as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: slots[0].as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: morton_params.as_entire_binding(),
                },
            ],
        });

        // Radix passes ping-pong a/b; four passes land the sorted order
        // back in buffer a.
        let sort_bgs: Vec<wgpu::BindGroup> = (0..4)
            .map(|pass| {
                let src = pass % 2;
                let dst = 1 - src;
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!("index-{label}-sort-bg-{pass}")),
                    layout: &self.sort_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: codes[src].as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: slots[src].as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: codes[dst].as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: slots[dst].as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 4,
                            resource: histogram.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 5,
                            resource: sort_params[pass].as_entire_binding(),
                        },
                    ],
                })
            })
            .collect();

        let link_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("index-{label}-link-bg")),
            layout: &self.link_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: codes[0].as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: slots[0].as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: bounds.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: nodes.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: link_params.as_entire_binding(),
                },
            ],
        });

        let refit_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("index-{label}-refit-bg")),
            layout: &self.refit_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: nodes.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: flags.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: link_params.as_entire_binding(),
                },
            ],
        });

        PreparedIndex {
            class,
            info,
            active_count: 0,
            nodes,
            flags,
            morton_params,
            sort_params,
            link_params,
            morton_bg,
            sort_bgs,
            link_bg,
            refit_bg,
        }
    }

    /// Data build: refresh the prepared index over the first `active_count`
    /// photons. Records Morton, sort, link and refit passes into `encoder`;
    /// pass boundaries order each stage's writes before the next stage's
    /// reads. `active_count` must not exceed the prepared capacity.
    pub fn build(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        prepared: &mut PreparedIndex,
        active_count: u32,
        world_bounds: &Aabb,
    ) {
        debug_assert!(active_count <= prepared.info.capacity);
        let count = active_count.min(prepared.info.capacity);
        prepared.active_count = count;
        if count == 0 {
            return;
        }

        let extent = world_bounds.extent();
        queue.write_buffer(
            &prepared.morton_params,
            0,
            cast_slice(&[MortonParams {
                count,
                _pad0: 0,
                _pad1: 0,
                _pad2: 0,
                world_min: world_bounds.min,
                _pad3: 0.0,
                world_extent: [extent[0].max(1e-6), extent[1].max(1e-6), extent[2].max(1e-6)],
                _pad4: 0.0,
            }]),
        );
        let num_workgroups = sort_workgroups(count);
        for pass in 0..4 {
            queue.write_buffer(
                &prepared.sort_params[pass],
                0,
                cast_slice(&[SortParams {
                    count,
                    pass_shift: pass as u32 * 8,
                    num_workgroups,
                    _pad0: 0,
                }]),
            );
        }
        queue.write_buffer(
            &prepared.link_params,
            0,
            cast_slice(&[LinkParams {
                count,
                node_count: node_count_for(count),
                leaf_offset: count - 1,
                _pad0: 0,
            }]),
        );

        let wg = (count + SORT_WORKGROUP_SIZE - 1) / SORT_WORKGROUP_SIZE;
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("index-morton-pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.morton_pipeline);
            pass.set_bind_group(0, &prepared.morton_bg, &[]);
            pass.dispatch_workgroups(wg, 1, 1);
        }

        // 8-bit digits, 4 passes over the 30-bit codes.
        for sort_pass in 0..4 {
            let bg = &prepared.sort_bgs[sort_pass];
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("index-sort-clear"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.sort_clear_pipeline);
                pass.set_bind_group(0, bg, &[]);
                let clear_wg = (num_workgroups * RADIX_BINS + SORT_WORKGROUP_SIZE - 1) / SORT_WORKGROUP_SIZE;
                pass.dispatch_workgroups(clear_wg, 1, 1);
            }
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("index-sort-histogram"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.sort_count_pipeline);
                pass.set_bind_group(0, bg, &[]);
                pass.dispatch_workgroups(num_workgroups, 1, 1);
            }
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("index-sort-scan"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.sort_scan_pipeline);
                pass.set_bind_group(0, bg, &[]);
                pass.dispatch_workgroups(1, 1, 1);
            }
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("index-sort-scatter"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.sort_scatter_pipeline);
                pass.set_bind_group(0, bg, &[]);
                pass.dispatch_workgroups(num_workgroups, 1, 1);
            }
        }

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("index-init-leaves"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.init_leaves_pipeline);
            pass.set_bind_group(0, &prepared.link_bg, &[]);
            pass.dispatch_workgroups(wg, 1, 1);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("index-link-nodes"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.link_nodes_pipeline);
            pass.set_bind_group(0, &prepared.link_bg, &[]);
            pass.dispatch_workgroups(wg, 1, 1);
        }

        encoder.clear_buffer(&prepared.flags, 0, None);
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("index-refit"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.refit_pipeline);
            pass.set_bind_group(0, &prepared.refit_bg, &[]);
            pass.dispatch_workgroups(wg, 1, 1);
        }
    }
}

/// Result and scratch storage for one pool's bottom-level index, valid for
/// builds at any active count up to the prepared capacity.
pub struct PreparedIndex {
    pub class: PhotonClass,
    pub info: IndexPrebuildInfo,
    /// Photons resident in the last data build.
    pub active_count: u32,
    nodes: wgpu::Buffer,
    flags: wgpu::Buffer,
    morton_params: wgpu::Buffer,
    sort_params: Vec<wgpu::Buffer>,
    link_params: wgpu::Buffer,
    morton_bg: wgpu::BindGroup,
    sort_bgs: Vec<wgpu::BindGroup>,
    link_bg: wgpu::BindGroup,
    refit_bg: wgpu::BindGroup,
}

impl PreparedIndex {
    pub fn nodes(&self) -> &wgpu::Buffer {
        &self.nodes
    }

    pub fn node_count(&self) -> u32 {
        node_count_for(self.active_count)
    }
}
