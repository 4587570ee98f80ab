// src/accel/types.rs
// GPU-compatible types for the two-level photon index: AABBs, nodes,
// instance records, and the prebuild size estimate.
// RELEVANT FILES:src/accel/builder.rs,src/shaders/index_link.wgsl,src/pool.rs

use bytemuck::{Pod, Zeroable};

/// Axis-aligned bounding box, GPU compatible layout
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Aabb {
    pub min: [f32; 3],
    pub _pad0: f32,
    pub max: [f32; 3],
    pub _pad1: f32,
}

pub const AABB_SIZE: u64 = std::mem::size_of::<Aabb>() as u64;

impl Aabb {
    /// Empty AABB (inverted bounds for union operations)
    pub fn empty() -> Self {
        Self {
            min: [f32::INFINITY; 3],
            _pad0: 0.0,
            max: [f32::NEG_INFINITY; 3],
            _pad1: 0.0,
        }
    }

    pub fn new(min: [f32; 3], max: [f32; 3]) -> Self {
        Self {
            min,
            _pad0: 0.0,
            max,
            _pad1: 0.0,
        }
    }

    /// Box of half-extent `radius` around a deposit position; the shape the
    /// trace kernel writes for every stored photon.
    pub fn from_sphere(center: [f32; 3], radius: f32) -> Self {
        Self::new(
            [center[0] - radius, center[1] - radius, center[2] - radius],
            [center[0] + radius, center[1] + radius, center[2] + radius],
        )
    }

    pub fn expand_point(&mut self, point: [f32; 3]) {
        for i in 0..3 {
            self.min[i] = self.min[i].min(point[i]);
            self.max[i] = self.max[i].max(point[i]);
        }
    }

    pub fn expand_aabb(&mut self, other: &Aabb) {
        for i in 0..3 {
            self.min[i] = self.min[i].min(other.min[i]);
            self.max[i] = self.max[i].max(other.max[i]);
        }
    }

    pub fn center(&self) -> [f32; 3] {
        [
            (self.min[0] + self.max[0]) * 0.5,
            (self.min[1] + self.max[1]) * 0.5,
            (self.min[2] + self.max[2]) * 0.5,
        ]
    }

    pub fn extent(&self) -> [f32; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }

    /// Grow symmetrically on all axes.
    pub fn padded(&self, amount: f32) -> Self {
        Self::new(
            [
                self.min[0] - amount,
                self.min[1] - amount,
                self.min[2] - amount,
            ],
            [
                self.max[0] + amount,
                self.max[1] + amount,
                self.max[2] + amount,
            ],
        )
    }

    pub fn is_valid(&self) -> bool {
        self.min[0] <= self.max[0] && self.min[1] <= self.max[1] && self.min[2] <= self.max[2]
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

/// Bottom-level index node, layout matching the WGSL struct.
///
/// Leaves store the photon slot in `left_idx` so the collect kernel reaches
/// the matching records entry without an extra indirection buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct IndexNode {
    pub aabb: Aabb,
    pub kind: u32, // 0 = internal, 1 = leaf
    pub left_idx: u32,
    pub right_idx: u32,
    pub parent_idx: u32,
}

pub const INDEX_NODE_SIZE: u64 = std::mem::size_of::<IndexNode>() as u64;

impl IndexNode {
    pub fn internal(aabb: Aabb, left: u32, right: u32) -> Self {
        Self {
            aabb,
            kind: 0,
            left_idx: left,
            right_idx: right,
            parent_idx: u32::MAX,
        }
    }

    /// Leaf over one photon: `slot` indexes the pool's records and bounds.
    pub fn leaf(aabb: Aabb, slot: u32) -> Self {
        Self {
            aabb,
            kind: 1,
            left_idx: slot,
            right_idx: 1,
            parent_idx: u32::MAX,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.kind == 1
    }

    pub fn photon_slot(&self) -> Option<u32> {
        self.is_leaf().then_some(self.left_idx)
    }
}

/// Number of nodes a bottom-level index holds for `leaf_count` photons.
/// Internal nodes occupy `[0, n-1)`, leaves `[n-1, 2n-1)`.
#[inline]
pub fn node_count_for(leaf_count: u32) -> u32 {
    match leaf_count {
        0 => 0,
        n => 2 * n - 1,
    }
}

/// Deterministic size estimate for one bottom-level index at a given pool
/// capacity, computed before any storage is touched. Result storage must
/// outlive every frame built at this capacity; scratch is reused per build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexPrebuildInfo {
    pub capacity: u32,
    /// Node storage in bytes.
    pub result_size: u64,
    /// Morton codes, slot permutation (both ping-pong), sort histogram and
    /// refit flags, in bytes.
    pub scratch_size: u64,
}

pub const SORT_WORKGROUP_SIZE: u32 = 256;
pub const RADIX_BINS: u32 = 256;

pub fn sort_workgroups(count: u32) -> u32 {
    ((count + SORT_WORKGROUP_SIZE - 1) / SORT_WORKGROUP_SIZE).max(1)
}

impl IndexPrebuildInfo {
    pub fn for_capacity(capacity: u32) -> Self {
        let n = capacity as u64;
        let node_count = node_count_for(capacity) as u64;
        let result_size = node_count * INDEX_NODE_SIZE;
        let codes = 2 * n * 4;
        let slots = 2 * n * 4;
        let histogram = sort_workgroups(capacity) as u64 * RADIX_BINS as u64 * 4;
        let flags = node_count * 4;
        Self {
            capacity,
            result_size,
            scratch_size: codes + slots + histogram + flags,
        }
    }

    pub fn total_size(&self) -> u64 {
        self.result_size + self.scratch_size
    }
}

/// One entry of the top-level instance table. Both photon pools enter the
/// top level with an identity transform; `instance_id` selects the records
/// buffer in the collect kernel and `mask` gates visibility per class.
/// 80 bytes, usable from a uniform buffer (stride is a multiple of 16).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceRecord {
    /// Rows of a 3x4 affine transform.
    pub transform: [f32; 12],
    pub instance_id: u32,
    pub mask: u32,
    /// Shader-group offset, carried for layout parity with hardware
    /// instance descriptors; always 0 here.
    pub hit_group_offset: u32,
    /// Photons resident in this instance's bottom level this frame.
    pub active_count: u32,
    pub node_count: u32,
    pub search_radius: f32,
    pub _pad0: u32,
    pub _pad1: u32,
}

pub const INSTANCE_RECORD_SIZE: u64 = std::mem::size_of::<InstanceRecord>() as u64;

pub const IDENTITY_TRANSFORM: [f32; 12] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0,
];

impl InstanceRecord {
    pub fn new(instance_id: u32, mask: u32) -> Self {
        Self {
            transform: IDENTITY_TRANSFORM,
            instance_id,
            mask,
            hit_group_offset: 0,
            active_count: 0,
            node_count: 0,
            search_radius: 0.0,
            _pad0: 0,
            _pad1: 0,
        }
    }
}

/// Spread the low 10 bits of `v` so consecutive bits land 3 apart.
#[inline]
pub fn expand_bits10(v: u32) -> u32 {
    let mut v = v & 0x3ff;
    v = (v | (v << 16)) & 0x030000ff;
    v = (v | (v << 8)) & 0x0300f00f;
    v = (v | (v << 4)) & 0x030c30c3;
    v = (v | (v << 2)) & 0x09249249;
    v
}

/// 30-bit Morton code from coordinates normalized to [0, 1). CPU mirror of
/// the code the morton kernel computes; kept for tests and debugging.
#[inline]
pub fn morton3d(x: f32, y: f32, z: f32) -> u32 {
    let scale = 1024.0;
    let xi = ((x * scale).clamp(0.0, 1023.0)) as u32;
    let yi = ((y * scale).clamp(0.0, 1023.0)) as u32;
    let zi = ((z * scale).clamp(0.0, 1023.0)) as u32;
    (expand_bits10(xi) << 2) | (expand_bits10(yi) << 1) | expand_bits10(zi)
}

const _: () = assert!(std::mem::size_of::<IndexNode>() == 48);
const _: () = assert!(std::mem::size_of::<InstanceRecord>() == 80);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_bounds_are_symmetric() {
        let b = Aabb::from_sphere([1.0, 2.0, 3.0], 0.05);
        assert!(b.is_valid());
        assert_eq!(b.center(), [1.0, 2.0, 3.0]);
        assert!((b.extent()[0] - 0.1).abs() < 1e-6);
        assert!((b.extent()[2] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn empty_aabb_unions_correctly() {
        let mut b = Aabb::empty();
        assert!(!b.is_valid());
        b.expand_point([1.0, -1.0, 0.5]);
        b.expand_point([-1.0, 1.0, 0.0]);
        assert!(b.is_valid());
        assert_eq!(b.min, [-1.0, -1.0, 0.0]);
        assert_eq!(b.max, [1.0, 1.0, 0.5]);
    }

    #[test]
    fn node_counts() {
        assert_eq!(node_count_for(0), 0);
        assert_eq!(node_count_for(1), 1);
        assert_eq!(node_count_for(2), 3);
        assert_eq!(node_count_for(1 << 20), (1 << 21) - 1);
    }

    #[test]
    fn prebuild_estimate_scales_with_capacity() {
        let small = IndexPrebuildInfo::for_capacity(1024);
        assert_eq!(small.result_size, 2047 * INDEX_NODE_SIZE);
        // codes + slots ping-pong
        let codes_slots = 4 * 1024 * 4;
        let histogram = 4 * 256 * 4;
        let flags = 2047 * 4;
        assert_eq!(small.scratch_size, codes_slots + histogram + flags);

        let big = IndexPrebuildInfo::for_capacity(1 << 20);
        assert!(big.result_size > small.result_size);
        assert!(big.total_size() < 512 * 1024 * 1024);
    }

    #[test]
    fn leaf_nodes_carry_their_slot() {
        let leaf = IndexNode::leaf(Aabb::from_sphere([0.0; 3], 0.01), 42);
        assert!(leaf.is_leaf());
        assert_eq!(leaf.photon_slot(), Some(42));
        let inner = IndexNode::internal(Aabb::empty(), 1, 2);
        assert_eq!(inner.photon_slot(), None);
    }

    #[test]
    fn morton_orders_along_axes() {
        // x is the highest-weight axis in the interleave.
        assert!(morton3d(0.9, 0.1, 0.1) > morton3d(0.1, 0.9, 0.9));
        assert_eq!(morton3d(0.0, 0.0, 0.0), 0);
        // All 30 bits set at the top corner.
        assert_eq!(morton3d(1.0, 1.0, 1.0), (1 << 30) - 1);
        // Interleave keeps neighbors close: same cell, same code.
        assert_eq!(morton3d(0.5, 0.5, 0.5), morton3d(0.5004, 0.5, 0.5));
    }

    #[test]
    fn instance_records_default_identity() {
        let inst = InstanceRecord::new(1, 0b10);
        assert_eq!(inst.transform, IDENTITY_TRANSFORM);
        assert_eq!(inst.instance_id, 1);
        assert_eq!(inst.mask, 0b10);
        assert_eq!(inst.hit_group_offset, 0);
        assert_eq!(INSTANCE_RECORD_SIZE, 80);
    }
}
