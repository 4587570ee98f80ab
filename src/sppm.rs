// src/sppm.rs
// Frame driver for the progressive photon pipeline
// Owns the pools, the index builder, the passes and the frame state machine;
// render_frame executes exactly what plan_frame decides, in plan order.
// RELEVANT FILES: src/frame.rs, src/accel/builder.rs, src/passes/mod.rs

use crate::accel::{BottomLevelSummary, PhotonIndexBuilder, PreparedIndex, TopLevelIndex};
use crate::config::SppmConfig;
use crate::counter::{sized_active, PhotonCounter};
use crate::error::{SppmError, SppmResult};
use crate::frame::{plan_frame, ExternalSignals, FramePlan, FrameReport, FrameState};
use crate::gpu::{self, GpuContext};
use crate::passes::{CollectParams, CollectPass, TraceParams, TracePass, VisibilityPass};
use crate::pool::{PerClass, PhotonClass, PhotonPool};
use crate::radius::RadiusSchedule;
use crate::scene::{GpuScene, SceneData};
use crate::timing::FrameTimer;

/// Progressive photon-mapping renderer.
///
/// Drives the per-frame sequence: photon trace into the two pools, sized
/// bottom-level index builds over last frame's yield, top-level refresh,
/// per-pixel collect, and the radius step. Host-visible events (config
/// edits, camera motion, scene swaps) are latched and consumed by the next
/// `render_frame` call.
pub struct SppmRenderer {
    ctx: &'static GpuContext,
    config: SppmConfig,
    width: u32,
    height: u32,

    state: FrameState,
    pools: PerClass<PhotonPool>,
    counter: PhotonCounter,
    builder: PhotonIndexBuilder,
    indices: Option<PerClass<PreparedIndex>>,
    top_level: TopLevelIndex,

    trace: TracePass,
    visibility: VisibilityPass,
    collect: CollectPass,

    scene_data: Option<SceneData>,
    scene: Option<GpuScene>,
    timer: FrameTimer,

    // Latched host signals, consumed by the next frame's plan.
    options_changed: bool,
    camera_moved: bool,
    requested_capacity: Option<u32>,
}

impl SppmRenderer {
    pub fn new(width: u32, height: u32, config: SppmConfig) -> SppmResult<Self> {
        config.validate()?;
        if width == 0 || height == 0 {
            return Err(SppmError::unsupported("output must be at least 1x1"));
        }
        let ctx = gpu::try_ctx()?;
        let device = &ctx.device;

        let pools = PerClass::from_fn(|class| {
            PhotonPool::new(class, Self::schedule_for(&config, class))
        });
        let counter = PhotonCounter::new(device);
        let builder = PhotonIndexBuilder::new(device)
            .map_err(|e| SppmError::device(format!("index pipelines: {e}")))?;
        let top_level = TopLevelIndex::prepare(device);
        let trace = TracePass::new(device)?;
        let visibility = VisibilityPass::new(device, width, height)?;
        let collect = CollectPass::new(device, width, height)?;

        log::info!(
            "sppm renderer: {}x{}, photon grid {}^2, pool max {}",
            width,
            height,
            config.photon_grid_side,
            config.max_pool_capacity
        );

        Ok(Self {
            ctx,
            state: FrameState::initial(&config),
            config,
            width,
            height,
            pools,
            counter,
            builder,
            indices: None,
            top_level,
            trace,
            visibility,
            collect,
            scene_data: None,
            scene: None,
            timer: FrameTimer::new(),
            options_changed: false,
            camera_moved: false,
            requested_capacity: None,
        })
    }

    fn schedule_for(config: &SppmConfig, class: PhotonClass) -> RadiusSchedule {
        let initial = match class {
            PhotonClass::Caustic => config.caustic_init_radius,
            PhotonClass::Global => config.global_init_radius,
        };
        RadiusSchedule::new(initial, config.alpha, config.min_radius)
    }

    pub fn config(&self) -> &SppmConfig {
        &self.config
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Search radii the next collect will use.
    pub fn radii(&self) -> PerClass<f32> {
        self.pools.map(|p| p.radius.current())
    }

    /// Replace the options. Any output-affecting difference restarts the
    /// progressive sequence on the next frame.
    pub fn set_config(&mut self, config: SppmConfig) -> SppmResult<()> {
        config.validate()?;
        if config == self.config {
            return Ok(());
        }
        let grid_changed = config.photon_grid_side != self.config.photon_grid_side
            || config.fixed_seed != self.config.fixed_seed;
        self.config = config;
        self.options_changed = true;
        // Seeds are sized per grid cell, so a grid change re-uploads them.
        if grid_changed {
            if let Some(data) = self.scene_data.take() {
                self.bind_scene(data)?;
            }
        }
        Ok(())
    }

    /// Upload a scene and make it current. Restarts the sequence.
    pub fn bind_scene(&mut self, scene: SceneData) -> SppmResult<()> {
        let uploaded = GpuScene::upload(
            &self.ctx.device,
            &scene,
            self.config.photon_grid_side,
            self.config.fixed_seed,
        )?;
        self.scene = Some(uploaded);
        self.scene_data = Some(scene);
        self.options_changed = true;
        Ok(())
    }

    /// Drop the current scene; subsequent frames clear the output only.
    pub fn unbind_scene(&mut self) {
        self.scene = None;
        self.scene_data = None;
        self.options_changed = true;
    }

    pub fn notify_camera_moved(&mut self) {
        self.camera_moved = true;
    }

    /// Ask for a different per-pool capacity; clamped to the configured
    /// maximum when the next frame is planned.
    pub fn request_capacity(&mut self, capacity: u32) {
        self.requested_capacity = Some(capacity);
    }

    /// Render one frame into the output texture and return its summary.
    pub fn render_frame(&mut self) -> SppmResult<FrameReport> {
        let signals = ExternalSignals {
            options_changed: std::mem::take(&mut self.options_changed),
            camera_moved: std::mem::take(&mut self.camera_moved),
            scene_bound: self.scene.is_some(),
            requested_capacity: self.requested_capacity.take(),
        };
        let (next, plan) = plan_frame(&self.state, &signals, &self.config);
        self.state = next;
        self.execute_plan(&plan)
    }

    fn execute_plan(&mut self, plan: &FramePlan) -> SppmResult<FrameReport> {
        let device = &self.ctx.device;
        let queue = &self.ctx.queue;

        let mut report = FrameReport {
            options_changed: plan.report_options_changed,
            frame_index: plan.frame_index,
            ..FrameReport::default()
        };

        if plan.clear_only {
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("sppm-clear-frame"),
            });
            self.collect.execute_clear(device, queue, &mut encoder);
            queue.submit(Some(encoder.finish()));
            return Ok(report);
        }

        if plan.reset_timer {
            self.timer.reset();
        }
        if plan.reset_constants {
            for (class, pool) in self.pools.iter_mut() {
                pool.radius = Self::schedule_for(&self.config, class);
            }
        }
        if plan.reset_radii {
            for (_, pool) in self.pools.iter_mut() {
                pool.radius.reset();
            }
        }

        if let Some(capacity) = plan.allocate_pools {
            for (_, pool) in self.pools.iter_mut() {
                pool.ensure(device, capacity);
            }
        }
        if plan.prepare_index {
            let builder = &self.builder;
            let pools = &self.pools;
            let capacity = self.state.capacity;
            self.indices = Some(PerClass::from_fn(|class| {
                builder.prepare(device, class, pools[class].bounds(), capacity)
            }));
        }

        debug_assert!(plan.run_stages);
        let scene = self
            .scene
            .as_ref()
            .ok_or_else(|| SppmError::device("stage run planned without a bound scene"))?;
        let indices = self
            .indices
            .as_mut()
            .ok_or_else(|| SppmError::device("stage run planned before index prepare"))?;
        let capacity = self.state.capacity;

        // Last frame's yield, read one frame late. Without one (first frame
        // of a sequence, or a dropped copy) the builds cover full capacity.
        let stale_yield = self.counter.consume(device)?;
        let sized = PerClass::from_fn(|class| match &stale_yield {
            Some(y) => sized_active(y.counts[class], self.config.photon_as_scale, capacity),
            None => capacity,
        });
        if let Some(y) = &stale_yield {
            report.yields = y.counts;
        }
        report.active_counts = sized;
        report.radii = self.pools.map(|p| p.radius.current());

        let radii = report.radii;
        let seed = if self.config.use_fixed_seed {
            self.config.fixed_seed
        } else {
            plan.frame_index
        };

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("sppm-frame"),
        });

        self.trace.execute(
            device,
            queue,
            &mut encoder,
            scene,
            &self.pools,
            &self.counter,
            &TraceParams {
                frame_index: plan.frame_index,
                seed,
                max_depth: self.config.max_depth,
                grid_side: self.config.photon_grid_side,
                radii,
                capacity,
                use_alpha_test: self.config.use_alpha_test,
                spec_rough_cutoff: self.config.spec_rough_cutoff,
            },
        );

        self.visibility
            .execute(device, queue, &mut encoder, scene, self.config.spec_rough_cutoff);

        // Morton normalization domain: scene bounds grown by the larger
        // search radius so every photon box center maps inside [0, 1).
        let morton_bounds = scene.bounds.padded(radii[PhotonClass::Caustic].max(radii[PhotonClass::Global]));
        for (class, prepared) in indices.iter_mut() {
            self.builder
                .build(queue, &mut encoder, prepared, sized[class], &morton_bounds);
        }

        let summaries = PerClass::from_fn(|class| BottomLevelSummary {
            active_count: indices[class].active_count,
            node_count: indices[class].node_count(),
            search_radius: radii[class],
        });
        self.top_level.build(queue, &summaries);

        self.collect.execute(
            device,
            queue,
            &mut encoder,
            self.visibility.gbuffer(),
            &self.pools,
            indices,
            &self.top_level,
            &CollectParams {
                frame_index: plan.frame_index,
                collect_caustic: self.config.collect_caustic,
                collect_global: self.config.collect_global,
                debug_show_index: self.config.debug_show_index,
            },
        );

        // This frame's counter value rides home asynchronously; the copy is
        // consumed by a later frame.
        self.counter.stage_copy(&mut encoder, plan.frame_index);

        queue.submit(Some(encoder.finish()));

        // Shrink after collect so this frame used the pre-step radii and the
        // next frame sees the advanced ones.
        for (_, pool) in self.pools.iter_mut() {
            pool.radius.step(plan.frame_index);
        }

        if self.config.use_timer {
            report.elapsed = Some(self.timer.record());
        }
        log::debug!(
            "frame {}: radii {:.5}/{:.5}, built {}/{} photons",
            plan.frame_index,
            radii[PhotonClass::Caustic],
            radii[PhotonClass::Global],
            sized[PhotonClass::Caustic],
            sized[PhotonClass::Global]
        );

        Ok(report)
    }

    /// Copy the current output to the host as row-major RGBA f32.
    pub fn read_output(&self) -> SppmResult<Vec<f32>> {
        self.collect.read_output(&self.ctx.device, &self.ctx.queue)
    }
}
