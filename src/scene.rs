// src/scene.rs
// Scene glue for the photon pass: CPU triangle scene with inlined materials,
// flux-weighted emitter table (Walker alias method), per-cell seed buffer,
// and the GPU upload consumed by the trace/visibility kernels.
// RELEVANT FILES: src/passes/trace.rs, src/passes/visibility.rs, src/sppm.rs

use bytemuck::{cast_slice, Pod, Zeroable};
use glam::Vec3;
use wgpu::util::DeviceExt;

use crate::accel::types::Aabb;
use crate::error::{SppmError, SppmResult};

/// Surface transport class. Roughness additionally splits `Opaque` into
/// mirror-like and diffuse responses at the configured cutoff.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum MaterialKind {
    Opaque = 0,
    Glass = 1,
}

#[derive(Clone, Copy, Debug)]
pub struct Material {
    pub albedo: Vec3,
    pub emission: Vec3,
    pub roughness: f32,
    pub ior: f32,
    pub kind: MaterialKind,
}

impl Material {
    pub fn diffuse(albedo: Vec3) -> Self {
        Self {
            albedo,
            emission: Vec3::ZERO,
            roughness: 1.0,
            ior: 1.0,
            kind: MaterialKind::Opaque,
        }
    }

    pub fn mirror(albedo: Vec3) -> Self {
        Self {
            albedo,
            emission: Vec3::ZERO,
            roughness: 0.0,
            ior: 1.0,
            kind: MaterialKind::Opaque,
        }
    }

    pub fn glass(ior: f32) -> Self {
        Self {
            albedo: Vec3::ONE,
            emission: Vec3::ZERO,
            roughness: 0.0,
            ior,
            kind: MaterialKind::Glass,
        }
    }

    pub fn emissive(radiance: Vec3) -> Self {
        Self {
            albedo: Vec3::ZERO,
            emission: radiance,
            roughness: 1.0,
            ior: 1.0,
            kind: MaterialKind::Opaque,
        }
    }

    pub fn is_emissive(&self) -> bool {
        self.emission.max_element() > 0.0
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Triangle {
    pub v0: Vec3,
    pub v1: Vec3,
    pub v2: Vec3,
    pub material: Material,
}

impl Triangle {
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3, material: Material) -> Self {
        Self { v0, v1, v2, material }
    }

    pub fn normal(&self) -> Vec3 {
        (self.v1 - self.v0).cross(self.v2 - self.v0).normalize_or_zero()
    }

    pub fn area(&self) -> f32 {
        (self.v1 - self.v0).cross(self.v2 - self.v0).length() * 0.5
    }

    pub fn aabb(&self) -> Aabb {
        let mut b = Aabb::empty();
        b.expand_point(self.v0.to_array());
        b.expand_point(self.v1.to_array());
        b.expand_point(self.v2.to_array());
        b
    }

    /// Total emitted power assuming a diffuse emitter: pi * area * radiance.
    pub fn flux(&self) -> Vec3 {
        self.material.emission * self.area() * std::f32::consts::PI
    }
}

/// Packed triangle with inlined material, matching the WGSL layout.
/// Edges are precomputed for the intersection test. 96 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct TriangleGpu {
    pub p0: [f32; 3],
    pub _pad0: f32,
    pub e1: [f32; 3],
    pub _pad1: f32,
    pub e2: [f32; 3],
    pub _pad2: f32,
    pub normal: [f32; 3],
    pub _pad3: f32,
    pub albedo: [f32; 3],
    pub roughness: f32,
    pub emission: [f32; 3],
    pub kind_ior: f32,
}

impl TriangleGpu {
    fn pack(tri: &Triangle) -> Self {
        // kind and ior share one float: glass stores its ior, opaque 0.
        let kind_ior = match tri.material.kind {
            MaterialKind::Opaque => 0.0,
            MaterialKind::Glass => tri.material.ior,
        };
        Self {
            p0: tri.v0.to_array(),
            _pad0: 0.0,
            e1: (tri.v1 - tri.v0).to_array(),
            _pad1: 0.0,
            e2: (tri.v2 - tri.v0).to_array(),
            _pad2: 0.0,
            normal: tri.normal().to_array(),
            _pad3: 0.0,
            albedo: tri.material.albedo.to_array(),
            roughness: tri.material.roughness,
            emission: tri.material.emission.to_array(),
            kind_ior,
        }
    }
}

/// Packed emitter with its Walker alias entry inlined, so emitter table and
/// alias table ride in one storage buffer. 80 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct EmitterGpu {
    pub p0: [f32; 3],
    pub area: f32,
    pub e1: [f32; 3],
    /// Walker acceptance threshold for this bin.
    pub prob: f32,
    pub e2: [f32; 3],
    /// Walker alias target when the draw exceeds `prob`.
    pub alias: u32,
    pub normal: [f32; 3],
    /// Selection pdf of this emitter under flux weighting.
    pub select_pdf: f32,
    pub radiance: [f32; 3],
    pub _pad0: f32,
}

/// Walker's alias method over emitter fluxes. Returned entries are
/// (prob, alias, pdf) triples in emitter order.
fn build_alias(weights: &[f32]) -> Vec<(f32, u32, f32)> {
    let n = weights.len();
    let total: f32 = weights.iter().sum();
    if n == 0 {
        return Vec::new();
    }
    if total <= 0.0 {
        let pdf = 1.0 / n as f32;
        return (0..n).map(|_| (1.0, 0, pdf)).collect();
    }

    let scale = n as f32 / total;
    let mut scaled: Vec<f32> = weights.iter().map(|w| w * scale).collect();
    let mut prob = vec![0.0f32; n];
    let mut alias = vec![0u32; n];

    let mut small = Vec::with_capacity(n);
    let mut large = Vec::with_capacity(n);
    for (i, &w) in scaled.iter().enumerate() {
        if w < 1.0 {
            small.push(i);
        } else {
            large.push(i);
        }
    }
    while let (Some(s), Some(l)) = (small.pop(), large.pop()) {
        prob[s] = scaled[s];
        alias[s] = l as u32;
        scaled[l] = scaled[l] + scaled[s] - 1.0;
        if scaled[l] < 1.0 {
            small.push(l);
        } else {
            large.push(l);
        }
    }
    for &i in small.iter().chain(large.iter()) {
        prob[i] = 1.0;
    }

    (0..n)
        .map(|i| (prob[i], alias[i], weights[i] / total))
        .collect()
}

/// Per-cell trace seeds, generated host-side once per scene bind. Seeds
/// depend only on cell index and the base seed, so fixed-seed runs replay
/// identical photon sets.
pub fn make_seeds(cell_count: u32, base_seed: u32) -> Vec<u32> {
    (0..cell_count)
        .map(|i| {
            // splitmix32
            let mut z = i.wrapping_add(base_seed).wrapping_add(0x9e3779b9);
            z = (z ^ (z >> 16)).wrapping_mul(0x21f0aaad);
            z = (z ^ (z >> 15)).wrapping_mul(0x735a2d97);
            z ^ (z >> 15)
        })
        .collect()
}

#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub vfov_deg: f32,
}

impl Camera {
    /// Orthonormal basis scaled for ray generation at unit focal distance:
    /// (right, up, forward) with right/up scaled by the half-fov tangents.
    pub fn basis(&self, aspect: f32) -> (Vec3, Vec3, Vec3) {
        let forward = (self.target - self.eye).normalize();
        let right = forward.cross(self.up).normalize();
        let up = right.cross(forward);
        let half_h = (self.vfov_deg.to_radians() * 0.5).tan();
        let half_w = half_h * aspect;
        (right * half_w, up * half_h, forward)
    }
}

/// CPU-side scene description.
#[derive(Clone, Debug)]
pub struct SceneData {
    pub triangles: Vec<Triangle>,
    pub camera: Camera,
}

impl SceneData {
    pub fn bounds(&self) -> Aabb {
        let mut b = Aabb::empty();
        for tri in &self.triangles {
            b.expand_aabb(&tri.aabb());
        }
        b
    }

    pub fn emitters(&self) -> impl Iterator<Item = &Triangle> {
        self.triangles.iter().filter(|t| t.material.is_emissive())
    }

    /// Cornell-style demo box: diffuse walls, area light in the ceiling,
    /// one glass cube for caustics and one diffuse block.
    pub fn cornell_box() -> Self {
        let white = Material::diffuse(Vec3::new(0.73, 0.73, 0.73));
        let red = Material::diffuse(Vec3::new(0.65, 0.05, 0.05));
        let green = Material::diffuse(Vec3::new(0.12, 0.45, 0.15));
        let light = Material::emissive(Vec3::new(17.0, 14.0, 9.0));
        let glass = Material::glass(1.5);

        let mut triangles = Vec::new();
        let mut quad = |a: Vec3, b: Vec3, c: Vec3, d: Vec3, m: Material| {
            triangles.push(Triangle::new(a, b, c, m));
            triangles.push(Triangle::new(a, c, d, m));
        };

        let lo = Vec3::ZERO;
        let hi = Vec3::ONE;
        // Floor, ceiling, back, left, right. Winding keeps normals inward.
        quad(
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(lo.x, lo.y, hi.z),
            white,
        );
        quad(
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, lo.z),
            white,
        );
        quad(
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            white,
        );
        quad(
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(lo.x, hi.y, lo.z),
            red,
        );
        quad(
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            green,
        );
        // Ceiling light, slightly below the ceiling plane.
        let ly = hi.y - 1e-3;
        quad(
            Vec3::new(0.35, ly, 0.35),
            Vec3::new(0.65, ly, 0.35),
            Vec3::new(0.65, ly, 0.65),
            Vec3::new(0.35, ly, 0.65),
            light,
        );

        let mut cube = |min: Vec3, max: Vec3, m: Material| {
            let v = |x, y, z| Vec3::new(x, y, z);
            // Six faces, outward winding.
            quad(v(min.x, min.y, max.z), v(max.x, min.y, max.z), v(max.x, max.y, max.z), v(min.x, max.y, max.z), m);
            quad(v(max.x, min.y, min.z), v(min.x, min.y, min.z), v(min.x, max.y, min.z), v(max.x, max.y, min.z), m);
            quad(v(min.x, min.y, min.z), v(min.x, min.y, max.z), v(min.x, max.y, max.z), v(min.x, max.y, min.z), m);
            quad(v(max.x, min.y, max.z), v(max.x, min.y, min.z), v(max.x, max.y, min.z), v(max.x, max.y, max.z), m);
            quad(v(min.x, max.y, max.z), v(max.x, max.y, max.z), v(max.x, max.y, min.z), v(min.x, max.y, min.z), m);
            quad(v(min.x, min.y, min.z), v(max.x, min.y, min.z), v(max.x, min.y, max.z), v(min.x, min.y, max.z), m);
        };
        cube(
            Vec3::new(0.55, 0.0, 0.15),
            Vec3::new(0.85, 0.35, 0.45),
            glass,
        );
        cube(
            Vec3::new(0.15, 0.0, 0.5),
            Vec3::new(0.45, 0.6, 0.8),
            white,
        );

        Self {
            triangles,
            camera: Camera {
                eye: Vec3::new(0.5, 0.5, 2.4),
                target: Vec3::new(0.5, 0.5, 0.5),
                up: Vec3::Y,
                vfov_deg: 40.0,
            },
        }
    }
}

/// Device-resident scene consumed by the kernels. Uploaded once at scene
/// bind; seeds depend on the photon grid and base seed.
pub struct GpuScene {
    pub triangles: wgpu::Buffer,
    pub emitters: wgpu::Buffer,
    pub seeds: wgpu::Buffer,
    pub triangle_count: u32,
    pub emitter_count: u32,
    pub bounds: Aabb,
    pub camera: Camera,
    pub total_flux: f32,
}

impl GpuScene {
    pub fn upload(
        device: &wgpu::Device,
        scene: &SceneData,
        grid_side: u32,
        base_seed: u32,
    ) -> SppmResult<Self> {
        if scene.triangles.is_empty() {
            return Err(SppmError::unsupported("scene has no geometry"));
        }
        let emitter_tris: Vec<&Triangle> = scene.emitters().collect();
        if emitter_tris.is_empty() {
            return Err(SppmError::unsupported(
                "scene has no emissive surfaces to trace photons from",
            ));
        }

        let packed: Vec<TriangleGpu> = scene.triangles.iter().map(TriangleGpu::pack).collect();

        let luminance = |v: Vec3| v.dot(Vec3::new(0.2126, 0.7152, 0.0722));
        let weights: Vec<f32> = emitter_tris.iter().map(|t| luminance(t.flux())).collect();
        let alias = build_alias(&weights);
        let total_flux: f32 = weights.iter().sum();

        let emitters_packed: Vec<EmitterGpu> = emitter_tris
            .iter()
            .zip(alias.iter())
            .map(|(tri, &(prob, alias, select_pdf))| EmitterGpu {
                p0: tri.v0.to_array(),
                area: tri.area(),
                e1: (tri.v1 - tri.v0).to_array(),
                prob,
                e2: (tri.v2 - tri.v0).to_array(),
                alias,
                normal: tri.normal().to_array(),
                select_pdf,
                radiance: tri.material.emission.to_array(),
                _pad0: 0.0,
            })
            .collect();

        let seeds = make_seeds(grid_side * grid_side, base_seed);

        let triangles = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("sppm-scene-triangles"),
            contents: cast_slice(&packed),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let emitters = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("sppm-scene-emitters"),
            contents: cast_slice(&emitters_packed),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let seeds = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("sppm-trace-seeds"),
            contents: cast_slice(&seeds),
            usage: wgpu::BufferUsages::STORAGE,
        });

        log::info!(
            "scene upload: {} triangles ({} emissive), total flux {:.3}, {} seeds",
            packed.len(),
            emitters_packed.len(),
            total_flux,
            grid_side * grid_side
        );

        Ok(Self {
            triangles,
            emitters,
            seeds,
            triangle_count: packed.len() as u32,
            emitter_count: emitters_packed.len() as u32,
            bounds: scene.bounds(),
            camera: scene.camera,
            total_flux,
        })
    }
}

const _: () = assert!(std::mem::size_of::<TriangleGpu>() == 96);
const _: () = assert!(std::mem::size_of::<EmitterGpu>() == 80);
