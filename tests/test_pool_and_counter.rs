// tests/test_pool_and_counter.rs
// Capacity-keyed pool storage and the one-frame-late photon counter
// channel, exercised against a real device when one is available.
// RELEVANT FILES:src/pool.rs,src/counter.rs,src/sppm.rs

use sppm::counter::PhotonCounter;
use sppm::gpu::{self, GpuContext};
use sppm::pool::{PhotonClass, PhotonPool, PHOTON_RECORD_SIZE};
use sppm::radius::RadiusSchedule;

fn ctx_or_skip(test: &str) -> Option<&'static GpuContext> {
    match gpu::try_ctx() {
        Ok(ctx) => Some(ctx),
        Err(err) => {
            eprintln!("{test}: skipped, no GPU adapter ({err})");
            None
        }
    }
}

fn read_words(ctx: &GpuContext, buffer: &wgpu::Buffer, size: u64) -> Vec<u32> {
    let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("test-readback"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("test-readback-copy"),
        });
    encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
    ctx.queue.submit(Some(encoder.finish()));

    let slice = staging.slice(..);
    let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    ctx.device.poll(wgpu::Maintain::Wait);
    pollster::block_on(receiver.receive())
        .expect("map callback dropped")
        .expect("readback map failed");
    let words = {
        let view = slice.get_mapped_range();
        bytemuck::cast_slice::<u8, u32>(&view).to_vec()
    };
    staging.unmap();
    words
}

fn schedule() -> RadiusSchedule {
    RadiusSchedule::new(0.01, 0.7, 1e-5)
}

#[test]
fn pool_reallocates_only_on_capacity_change() {
    let Some(ctx) = ctx_or_skip("pool_reallocates_only_on_capacity_change") else {
        return;
    };
    let mut pool = PhotonPool::new(PhotonClass::Caustic, schedule());
    assert_eq!(pool.capacity(), 0);

    assert!(pool.ensure(&ctx.device, 1024), "first allocation must swap");
    assert_eq!(pool.capacity(), 1024);
    assert_eq!(pool.records_size(), 1024 * PHOTON_RECORD_SIZE);
    assert_eq!(pool.bounds_size(), 1024 * 32);
    assert_eq!(pool.records().size(), pool.records_size());
    assert_eq!(pool.bounds().size(), pool.bounds_size());

    // Same capacity: storage stays resident, no swap reported.
    assert!(!pool.ensure(&ctx.device, 1024));

    // Different capacity in either direction swaps.
    assert!(pool.ensure(&ctx.device, 512));
    assert_eq!(pool.records_size(), 512 * PHOTON_RECORD_SIZE);
    assert_eq!(pool.records().size(), pool.records_size());
    assert!(pool.ensure(&ctx.device, 4096));
    assert_eq!(pool.capacity(), 4096);
}

#[test]
fn pool_clear_zeroes_both_arrays() {
    let Some(ctx) = ctx_or_skip("pool_clear_zeroes_both_arrays") else {
        return;
    };
    let mut pool = PhotonPool::new(PhotonClass::Global, schedule());
    pool.ensure(&ctx.device, 64);

    let dirty = vec![0xffu8; (64 * PHOTON_RECORD_SIZE) as usize];
    ctx.queue.write_buffer(pool.records(), 0, &dirty);
    ctx.queue.write_buffer(pool.bounds(), 0, &dirty);

    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("test-pool-clear"),
        });
    pool.clear(&mut encoder);
    ctx.queue.submit(Some(encoder.finish()));

    let records = read_words(ctx, pool.records(), pool.records_size());
    let bounds = read_words(ctx, pool.bounds(), pool.bounds_size());
    assert!(records.iter().all(|&w| w == 0), "records not cleared");
    assert!(bounds.iter().all(|&w| w == 0), "bounds not cleared");
}

#[test]
fn counter_channel_is_single_slot() {
    let Some(ctx) = ctx_or_skip("counter_channel_is_single_slot") else {
        return;
    };
    let mut counter = PhotonCounter::new(&ctx.device);

    // Nothing produced yet.
    assert!(!counter.has_pending());
    assert!(counter.consume(&ctx.device).expect("consume").is_none());

    // Produce a snapshot of counts (5 caustic, 9 global) at frame 3.
    ctx.queue
        .write_buffer(counter.buffer(), 0, bytemuck::cast_slice(&[5u32, 9u32]));
    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("test-counter-stage"),
        });
    counter.stage_copy(&mut encoder, 3);
    ctx.queue.submit(Some(encoder.finish()));
    assert!(counter.has_pending());

    // A second produce before the consume is dropped, keeping the channel
    // single-slot; the frame-3 snapshot survives.
    ctx.queue
        .write_buffer(counter.buffer(), 0, bytemuck::cast_slice(&[100u32, 100u32]));
    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("test-counter-second-stage"),
        });
    counter.stage_copy(&mut encoder, 4);
    ctx.queue.submit(Some(encoder.finish()));

    let staged = counter
        .consume(&ctx.device)
        .expect("consume")
        .expect("a snapshot was produced");
    assert_eq!(staged.produced_at, 3);
    assert_eq!(staged.counts[PhotonClass::Caustic], 5);
    assert_eq!(staged.counts[PhotonClass::Global], 9);

    // Consumed: the slot is free again and empty until the next produce.
    assert!(!counter.has_pending());
    assert!(counter.consume(&ctx.device).expect("consume").is_none());

    // The freed slot accepts the next snapshot.
    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("test-counter-third-stage"),
        });
    counter.stage_copy(&mut encoder, 7);
    ctx.queue.submit(Some(encoder.finish()));
    let staged = counter
        .consume(&ctx.device)
        .expect("consume")
        .expect("a snapshot was produced");
    assert_eq!(staged.produced_at, 7);
    assert_eq!(staged.counts[PhotonClass::Caustic], 100);
    assert_eq!(staged.counts[PhotonClass::Global], 100);
}

#[test]
fn counter_clear_zeroes_both_lanes() {
    let Some(ctx) = ctx_or_skip("counter_clear_zeroes_both_lanes") else {
        return;
    };
    let mut counter = PhotonCounter::new(&ctx.device);
    ctx.queue
        .write_buffer(counter.buffer(), 0, bytemuck::cast_slice(&[7u32, 7u32]));

    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("test-counter-clear"),
        });
    counter.clear(&mut encoder);
    counter.stage_copy(&mut encoder, 0);
    ctx.queue.submit(Some(encoder.finish()));

    let staged = counter
        .consume(&ctx.device)
        .expect("consume")
        .expect("a snapshot was produced");
    assert_eq!(staged.counts[PhotonClass::Caustic], 0);
    assert_eq!(staged.counts[PhotonClass::Global], 0);
}
