// src/accel/mod.rs
// Two-level photon index: GPU-built bottom level per pool, instance-table
// top level combining both pools for the collect kernel.
// RELEVANT FILES:src/accel/builder.rs,src/accel/types.rs,src/passes/collect.rs

pub mod builder;
pub mod types;

pub use builder::{PhotonIndexBuilder, PreparedIndex};
pub use types::{Aabb, IndexNode, IndexPrebuildInfo, InstanceRecord};

use bytemuck::cast_slice;

use crate::pool::{PerClass, PhotonClass};

/// Per-class inputs for one top-level refresh.
#[derive(Clone, Copy, Debug, Default)]
pub struct BottomLevelSummary {
    pub active_count: u32,
    pub node_count: u32,
    pub search_radius: f32,
}

/// Instance table over both bottom-level indices. Structure is fixed at two
/// entries (identity transforms, instance id 0 caustic / 1 global, mask bit
/// per class); `build` refreshes counts and radii every frame after the
/// bottom-level builds are recorded.
pub struct TopLevelIndex {
    instances: wgpu::Buffer,
    records: PerClass<InstanceRecord>,
}

impl TopLevelIndex {
    pub fn prepare(device: &wgpu::Device) -> Self {
        let records = PerClass::from_fn(|class| {
            InstanceRecord::new(class as u32, class.visibility_mask())
        });
        let instances = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("index-top-level-instances"),
            size: 2 * types::INSTANCE_RECORD_SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self { instances, records }
    }

    /// Refresh the instance table. The queued write lands before any
    /// command buffer submitted afterwards, so recording this after the
    /// bottom-level builds and before submitting collect keeps the
    /// top level consistent with both bottom levels.
    pub fn build(&mut self, queue: &wgpu::Queue, summaries: &PerClass<BottomLevelSummary>) {
        for (class, summary) in summaries.iter() {
            let record = &mut self.records[class];
            record.active_count = summary.active_count;
            record.node_count = summary.node_count;
            record.search_radius = summary.search_radius;
        }
        queue.write_buffer(&self.instances, 0, cast_slice(self.records.as_array()));
    }

    pub fn instances(&self) -> &wgpu::Buffer {
        &self.instances
    }

    pub fn record(&self, class: PhotonClass) -> &InstanceRecord {
        &self.records[class]
    }
}
