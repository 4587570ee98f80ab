use once_cell::sync::OnceCell;

use crate::error::{SppmError, SppmResult};

pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter: wgpu::Adapter,
}

static CTX: OnceCell<GpuContext> = OnceCell::new();

fn init_context() -> SppmResult<GpuContext> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))
    .ok_or_else(|| SppmError::device("no suitable GPU adapter"))?;

    // Default limits, not downlevel: the trace and collect kernels bind up
    // to eight storage buffers in one stage.
    let (device, queue) = pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            label: Some("sppm-device"),
        },
        None,
    ))
    .map_err(|e| SppmError::device(format!("request_device failed: {e}")))?;

    Ok(GpuContext {
        device,
        queue,
        adapter,
    })
}

/// Process-wide context; first call performs blocking device acquisition.
/// Machines without a usable adapter get the error, not a panic.
pub fn try_ctx() -> SppmResult<&'static GpuContext> {
    CTX.get_or_try_init(init_context)
}

/// Align to WebGPU's required bytes-per-row for copies.
#[inline]
pub fn align_copy_bpr(unpadded: u32) -> u32 {
    let a = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    ((unpadded + a - 1) / a) * a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_row_alignment() {
        assert_eq!(align_copy_bpr(0), 0);
        assert_eq!(align_copy_bpr(1), wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        assert_eq!(align_copy_bpr(256), 256);
        assert_eq!(align_copy_bpr(257), 512);
    }
}
