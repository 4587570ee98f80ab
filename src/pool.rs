// src/pool.rs
// Photon pool storage: one records+bounds pair per photon class
// RELEVANT FILES: src/accel/builder.rs, src/passes/trace.rs, src/sppm.rs

use std::ops::{Index, IndexMut};

use crate::accel::types::{Aabb, AABB_SIZE};
use crate::radius::RadiusSchedule;

/// Photon classes, in pool order. The numeric values are wired into the
/// top-level instance table (instance id) and the trace kernel (pool slot),
/// so they are fixed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PhotonClass {
    Caustic = 0,
    Global = 1,
}

impl PhotonClass {
    pub const ALL: [PhotonClass; 2] = [PhotonClass::Caustic, PhotonClass::Global];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Instance mask bit for the top-level index (bit 0 caustic, bit 1 global).
    #[inline]
    pub fn visibility_mask(self) -> u32 {
        1 << (self as u32)
    }

    pub fn label(self) -> &'static str {
        match self {
            PhotonClass::Caustic => "caustic",
            PhotonClass::Global => "global",
        }
    }
}

/// Fixed-order pair of per-class values, indexable by `PhotonClass`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PerClass<T>([T; 2]);

impl<T> PerClass<T> {
    pub fn new(caustic: T, global: T) -> Self {
        Self([caustic, global])
    }

    pub fn from_fn(mut f: impl FnMut(PhotonClass) -> T) -> Self {
        Self([f(PhotonClass::Caustic), f(PhotonClass::Global)])
    }

    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> PerClass<U> {
        PerClass([f(&self.0[0]), f(&self.0[1])])
    }

    pub fn iter(&self) -> impl Iterator<Item = (PhotonClass, &T)> {
        PhotonClass::ALL.iter().map(move |&c| (c, &self.0[c.index()]))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (PhotonClass, &mut T)> {
        PhotonClass::ALL.iter().copied().zip(self.0.iter_mut())
    }

    pub fn as_array(&self) -> &[T; 2] {
        &self.0
    }
}

impl<T> Index<PhotonClass> for PerClass<T> {
    type Output = T;

    fn index(&self, class: PhotonClass) -> &T {
        &self.0[class.index()]
    }
}

impl<T> IndexMut<PhotonClass> for PerClass<T> {
    fn index_mut(&mut self, class: PhotonClass) -> &mut T {
        &mut self.0[class.index()]
    }
}

/// Packed photon payload: radiant flux plus incident direction. The deposit
/// position is not stored here; collect recovers it from the matching
/// bounds entry (box center). 32 bytes, std430-compatible.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PhotonRecord {
    pub flux: [f32; 3],
    pub _pad0: f32,
    pub dir: [f32; 3],
    pub _pad1: f32,
}

pub const PHOTON_RECORD_SIZE: u64 = std::mem::size_of::<PhotonRecord>() as u64;

/// GPU storage for one photon class. `records` and `bounds` are parallel
/// arrays of `capacity` entries; slot i of one corresponds to slot i of the
/// other. Storage is keyed by capacity: `ensure` reallocates only when the
/// requested capacity differs from what is resident.
pub struct PhotonPool {
    pub class: PhotonClass,
    pub radius: RadiusSchedule,
    capacity: u32,
    records: Option<wgpu::Buffer>,
    bounds: Option<wgpu::Buffer>,
}

impl PhotonPool {
    pub fn new(class: PhotonClass, radius: RadiusSchedule) -> Self {
        Self {
            class,
            radius,
            capacity: 0,
            records: None,
            bounds: None,
        }
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Byte size of the records array at the current capacity.
    pub fn records_size(&self) -> u64 {
        self.capacity as u64 * PHOTON_RECORD_SIZE
    }

    /// Byte size of the bounds array at the current capacity.
    pub fn bounds_size(&self) -> u64 {
        self.capacity as u64 * AABB_SIZE
    }

    /// Make `capacity` photons of storage resident. Existing contents are
    /// discarded on reallocation. Returns true when buffers were swapped,
    /// which obligates the caller to re-prepare any index built over them.
    pub fn ensure(&mut self, device: &wgpu::Device, capacity: u32) -> bool {
        if capacity == self.capacity && self.records.is_some() {
            return false;
        }
        let usage = wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_DST
            | wgpu::BufferUsages::COPY_SRC;
        self.capacity = capacity;
        self.records = Some(device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(match self.class {
                PhotonClass::Caustic => "sppm-caustic-records",
                PhotonClass::Global => "sppm-global-records",
            }),
            size: self.records_size(),
            usage,
            mapped_at_creation: false,
        }));
        self.bounds = Some(device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(match self.class {
                PhotonClass::Caustic => "sppm-caustic-bounds",
                PhotonClass::Global => "sppm-global-bounds",
            }),
            size: self.bounds_size(),
            usage,
            mapped_at_creation: false,
        }));
        log::info!(
            "photon pool {}: allocated {} slots ({} B records, {} B bounds)",
            self.class.label(),
            capacity,
            self.records_size(),
            self.bounds_size()
        );
        true
    }

    /// Panics if called before `ensure`; the frame plan guarantees
    /// allocation happens first.
    pub fn records(&self) -> &wgpu::Buffer {
        self.records
            .as_ref()
            .unwrap_or_else(|| panic!("{} pool used before allocation", self.class.label()))
    }

    pub fn bounds(&self) -> &wgpu::Buffer {
        self.bounds
            .as_ref()
            .unwrap_or_else(|| panic!("{} pool used before allocation", self.class.label()))
    }

    /// Zero both arrays so stale photons from a previous frame (possibly
    /// written under a larger radius) never survive into this frame's index.
    pub fn clear(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.clear_buffer(self.records(), 0, None);
        encoder.clear_buffer(self.bounds(), 0, None);
    }
}

// Compile-time layout checks for GPU-visible structs.
const _: () = assert!(std::mem::size_of::<PhotonRecord>() == 32);
const _: () = assert!(std::mem::size_of::<Aabb>() == 32);
