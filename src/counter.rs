// src/counter.rs
// Device photon counter and its one-frame-late readback channel
// RELEVANT FILES: src/passes/trace.rs, src/sppm.rs, tests/test_pool_and_counter.rs

use bytemuck::cast_slice;

use crate::error::{SppmError, SppmResult};
use crate::pool::{PerClass, PhotonClass};

/// Photon yields read back from a completed frame. Always one frame stale
/// by the time a build is sized from them.
#[derive(Clone, Copy, Debug, Default)]
pub struct PhotonYield {
    pub counts: PerClass<u32>,
    /// Frame index the counts were produced at.
    pub produced_at: u32,
}

/// Index build size from a stale count: scaled headroom, clamped to the
/// pool capacity. A yield above capacity means the trace dropped photons;
/// the clamp keeps the build in bounds either way.
pub fn sized_active(count: u32, scale: f32, capacity: u32) -> u32 {
    let scaled = (count as f64 * scale as f64).ceil() as u64;
    scaled.min(capacity as u64) as u32
}

/// Two-lane atomic photon counter (slot 0 caustic, slot 1 global), cleared
/// at trace start, incremented per reserved slot by the trace kernel, and
/// copied out at frame end. The readback is an explicit single-slot
/// produce/consume channel: `stage_copy` produces at frame k, `consume`
/// yields at frame k+1. At most one copy is in flight.
pub struct PhotonCounter {
    counter: wgpu::Buffer,
    staging: wgpu::Buffer,
    pending: Option<u32>,
}

const COUNTER_SIZE: u64 = 2 * std::mem::size_of::<u32>() as u64;

impl PhotonCounter {
    pub fn new(device: &wgpu::Device) -> Self {
        let counter = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sppm-photon-counter"),
            size: COUNTER_SIZE,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sppm-photon-counter-staging"),
            size: COUNTER_SIZE,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            counter,
            staging,
            pending: None,
        }
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.counter
    }

    /// Zero both lanes; recorded at the head of every trace.
    pub fn clear(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.clear_buffer(&self.counter, 0, None);
    }

    /// Produce: snapshot the counter into the staging slot. Skipped if the
    /// previous snapshot has not been consumed yet, keeping the channel
    /// single-slot.
    pub fn stage_copy(&mut self, encoder: &mut wgpu::CommandEncoder, frame_index: u32) {
        if self.pending.is_some() {
            log::warn!("photon counter snapshot dropped: previous readback still pending");
            return;
        }
        encoder.copy_buffer_to_buffer(&self.counter, 0, &self.staging, 0, COUNTER_SIZE);
        self.pending = Some(frame_index);
    }

    /// Consume the staged snapshot, blocking until the producing frame's
    /// GPU work has finished. Returns `None` when nothing was produced
    /// (the first frame of a sequence).
    pub fn consume(&mut self, device: &wgpu::Device) -> SppmResult<Option<PhotonYield>> {
        let produced_at = match self.pending.take() {
            Some(f) => f,
            None => return Ok(None),
        };

        let slice = self.staging.slice(..);
        let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device.poll(wgpu::Maintain::Wait);
        match pollster::block_on(receiver.receive()) {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                return Err(SppmError::readback(format!("counter map failed: {e}")))
            }
            None => return Err(SppmError::readback("counter map callback dropped")),
        }

        let counts = {
            let view = slice.get_mapped_range();
            let words: &[u32] = cast_slice(&view);
            PerClass::new(
                words[PhotonClass::Caustic.index()],
                words[PhotonClass::Global.index()],
            )
        };
        self.staging.unmap();

        log::debug!(
            "photon yield from frame {produced_at}: caustic {} global {}",
            counts[PhotonClass::Caustic],
            counts[PhotonClass::Global]
        );
        Ok(Some(PhotonYield { counts, produced_at }))
    }

    /// True when a produced snapshot is waiting to be consumed.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizing_applies_headroom_and_clamp() {
        assert_eq!(sized_active(1000, 1.1, 1 << 20), 1100);
        assert_eq!(sized_active(0, 1.1, 1 << 20), 0);
        // Clamp: even a count beyond capacity never sizes past it.
        assert_eq!(sized_active(1 << 20, 1.1, 1 << 20), 1 << 20);
        assert_eq!(sized_active(u32::MAX, 4.0, 1 << 20), 1 << 20);
        // Rounding is upward so one photon keeps one slot.
        assert_eq!(sized_active(1, 1.1, 1 << 20), 2);
    }
}
