// src/frame.rs
// Frame state machine for the progressive photon-mapping loop
// The per-frame decision is a pure function so reset/resize/rebuild ordering
// is testable without a device.
// RELEVANT FILES: src/sppm.rs, src/config.rs, tests/test_frame_plan.rs

use crate::config::SppmConfig;
use crate::pool::PerClass;

/// Sticky frame-machine state carried between frames. Triggers stay set
/// until a plan consumes them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameState {
    /// 0-based progressive iteration the next frame will render as.
    pub frame_index: u32,
    /// Per-pool photon capacity currently requested of storage.
    pub capacity: u32,
    pub reset_iteration: bool,
    pub reset_constants: bool,
    pub reset_timer: bool,
    pub resize_pools: bool,
    pub create_buffers: bool,
    pub rebuild_index: bool,
}

impl FrameState {
    /// State before the first frame: everything must be created and built.
    pub fn initial(config: &SppmConfig) -> Self {
        Self {
            frame_index: 0,
            capacity: config.estimated_capacity(),
            reset_iteration: false,
            reset_constants: true,
            reset_timer: true,
            resize_pools: true,
            create_buffers: false,
            rebuild_index: false,
        }
    }
}

/// Host-observed inputs for one frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExternalSignals {
    /// Any output-affecting option changed since the last frame.
    pub options_changed: bool,
    pub camera_moved: bool,
    pub scene_bound: bool,
    /// Host request for a different per-pool capacity.
    pub requested_capacity: Option<u32>,
}

/// Ordered actions for one frame. Field order mirrors execution order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FramePlan {
    /// Tell the host its temporal history is invalid.
    pub report_options_changed: bool,
    /// No scene: clear the output image and run nothing else.
    pub clear_only: bool,
    pub reset_timer: bool,
    /// Re-initialize both search radii to configured values.
    pub reset_radii: bool,
    /// Re-upload config-derived kernel constants.
    pub reset_constants: bool,
    /// Reallocate pool storage at this capacity before tracing.
    pub allocate_pools: Option<u32>,
    /// Structural prepare of both bottom-level indices and the top level.
    pub prepare_index: bool,
    /// Trace, data builds, top-level refresh, collect, readback.
    pub run_stages: bool,
    /// Iteration this frame renders as.
    pub frame_index: u32,
}

/// Decide one frame. Pure: `(state, signals, config) -> (state', plan)`.
///
/// Evaluation order is a correctness requirement and matches the stage
/// ordering contract: option invalidation, scene gate, iteration reset,
/// radius/capacity re-init at iteration 0, pool allocation, index prepare,
/// then the always-on stage sequence.
pub fn plan_frame(
    state: &FrameState,
    signals: &ExternalSignals,
    config: &SppmConfig,
) -> (FrameState, FramePlan) {
    let mut st = *state;
    let mut plan = FramePlan::default();

    // 1. Option changes invalidate the host's accumulated history and
    //    restart the progressive sequence.
    if signals.options_changed {
        plan.report_options_changed = true;
        st.reset_timer = true;
        st.reset_iteration = true;
        st.reset_constants = true;
    }

    // 2. Nothing to render without a scene; triggers stay pending.
    if !signals.scene_bound {
        plan.clear_only = true;
        return (st, plan);
    }

    // 3. Restart the sequence on camera motion or a pending reset. This
    //    never touches pool storage or index structure.
    if st.reset_iteration || signals.camera_moved {
        st.frame_index = 0;
        st.reset_iteration = false;
        st.reset_timer = true;
    }

    plan.reset_timer = st.reset_timer;
    st.reset_timer = false;

    // 4. Iteration 0 re-derives radii and the worst-case capacity estimate.
    if st.frame_index == 0 {
        plan.reset_radii = true;
        let estimate = config.estimated_capacity();
        if estimate != st.capacity {
            st.capacity = estimate;
            st.resize_pools = true;
        }
    }

    // Host capacity requests take effect the same way a re-estimate does.
    if let Some(requested) = signals.requested_capacity {
        let clamped = requested.min(config.max_pool_capacity).max(1);
        if clamped != st.capacity {
            st.capacity = clamped;
            st.resize_pools = true;
        }
    }

    // 5. Capacity changes force reallocation and a structural rebuild.
    if st.resize_pools {
        st.resize_pools = false;
        st.create_buffers = true;
        st.rebuild_index = true;
    }
    if st.create_buffers {
        plan.allocate_pools = Some(st.capacity);
        st.create_buffers = false;
    }

    // 6. Structural prepare must precede any data build that consumes it.
    if st.rebuild_index {
        plan.prepare_index = true;
        st.rebuild_index = false;
    }

    // 7. The stage sequence always runs once a scene is bound.
    plan.reset_constants = st.reset_constants;
    st.reset_constants = false;
    plan.run_stages = true;
    plan.frame_index = st.frame_index;

    // 8. The successor state renders the next iteration.
    st.frame_index += 1;

    (st, plan)
}

/// Per-frame summary handed back to the host.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameReport {
    /// Host temporal accumulation over this output is invalid.
    pub options_changed: bool,
    /// Iteration the frame rendered as.
    pub frame_index: u32,
    /// Search radii used by this frame's collect.
    pub radii: PerClass<f32>,
    /// Stale photon yields the data builds were sized from.
    pub yields: PerClass<u32>,
    /// Active primitive counts submitted to the bottom-level builds.
    pub active_counts: PerClass<u32>,
    /// Seconds since the sequence started, if the timer is enabled.
    pub elapsed: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SppmConfig {
        SppmConfig::default()
    }

    fn bound() -> ExternalSignals {
        ExternalSignals {
            scene_bound: true,
            ..ExternalSignals::default()
        }
    }

    #[test]
    fn first_frame_allocates_prepares_and_runs() {
        let cfg = cfg();
        let st = FrameState::initial(&cfg);
        let (next, plan) = plan_frame(&st, &bound(), &cfg);
        assert!(!plan.clear_only);
        assert!(plan.reset_radii);
        assert!(plan.reset_constants);
        assert_eq!(plan.allocate_pools, Some(cfg.estimated_capacity()));
        assert!(plan.prepare_index);
        assert!(plan.run_stages);
        assert_eq!(plan.frame_index, 0);
        assert_eq!(next.frame_index, 1);
    }

    #[test]
    fn steady_state_only_runs_stages() {
        let cfg = cfg();
        let mut st = FrameState::initial(&cfg);
        for _ in 0..3 {
            let (next, _) = plan_frame(&st, &bound(), &cfg);
            st = next;
        }
        let (next, plan) = plan_frame(&st, &bound(), &cfg);
        assert!(!plan.reset_radii);
        assert!(!plan.reset_constants);
        assert_eq!(plan.allocate_pools, None);
        assert!(!plan.prepare_index);
        assert!(plan.run_stages);
        assert_eq!(plan.frame_index, 3);
        assert_eq!(next.frame_index, 4);
    }

    #[test]
    fn no_scene_clears_and_keeps_triggers_pending() {
        let cfg = cfg();
        let st = FrameState::initial(&cfg);
        let signals = ExternalSignals {
            options_changed: true,
            ..ExternalSignals::default()
        };
        let (next, plan) = plan_frame(&st, &signals, &cfg);
        assert!(plan.clear_only);
        assert!(plan.report_options_changed);
        assert!(!plan.run_stages);
        // The pending reset fires once a scene shows up.
        assert!(next.reset_iteration);
        assert_eq!(next.frame_index, 0);
        let (_, plan2) = plan_frame(&next, &bound(), &cfg);
        assert!(plan2.reset_radii);
        assert_eq!(plan2.frame_index, 0);
    }

    #[test]
    fn camera_motion_resets_iteration_without_rebuild() {
        let cfg = cfg();
        let mut st = FrameState::initial(&cfg);
        for _ in 0..50 {
            let (next, _) = plan_frame(&st, &bound(), &cfg);
            st = next;
        }
        assert_eq!(st.frame_index, 50);
        let moved = ExternalSignals {
            camera_moved: true,
            ..bound()
        };
        let (next, plan) = plan_frame(&st, &moved, &cfg);
        assert_eq!(plan.frame_index, 0);
        assert!(plan.reset_radii);
        assert!(plan.reset_timer);
        assert_eq!(plan.allocate_pools, None);
        assert!(!plan.prepare_index);
        assert_eq!(next.frame_index, 1);
    }

    #[test]
    fn options_change_resets_next_frame() {
        let cfg = cfg();
        let mut st = FrameState::initial(&cfg);
        for _ in 0..5 {
            let (next, _) = plan_frame(&st, &bound(), &cfg);
            st = next;
        }
        let changed = ExternalSignals {
            options_changed: true,
            ..bound()
        };
        let (next, plan) = plan_frame(&st, &changed, &cfg);
        assert!(plan.report_options_changed);
        assert!(plan.reset_radii);
        assert!(plan.reset_constants);
        assert_eq!(plan.frame_index, 0);
        assert_eq!(next.frame_index, 1);
        // Option edits that leave the capacity estimate alone (collect
        // switches, debug view, seed mode) restart without touching pool
        // storage or index structure.
        assert_eq!(plan.allocate_pools, None);
        assert!(!plan.prepare_index);
        assert!(plan.run_stages);
    }

    #[test]
    fn capacity_growth_reallocates_and_prepares() {
        let cfg = cfg();
        let mut st = FrameState::initial(&cfg);
        let (next, _) = plan_frame(&st, &bound(), &cfg);
        st = next;
        let grow = ExternalSignals {
            requested_capacity: Some(cfg.max_pool_capacity),
            ..bound()
        };
        // Default estimate already equals the maximum, so shrink first.
        let shrink = ExternalSignals {
            requested_capacity: Some(1 << 16),
            ..bound()
        };
        let (next, plan) = plan_frame(&st, &shrink, &cfg);
        assert_eq!(plan.allocate_pools, Some(1 << 16));
        assert!(plan.prepare_index);
        st = next;
        let (_, plan) = plan_frame(&st, &grow, &cfg);
        assert_eq!(plan.allocate_pools, Some(cfg.max_pool_capacity));
        assert!(plan.prepare_index);
        assert!(plan.run_stages);
    }

    #[test]
    fn capacity_requests_clamp_to_configured_maximum() {
        let cfg = cfg();
        let mut st = FrameState::initial(&cfg);
        let (next, _) = plan_frame(&st, &bound(), &cfg);
        st = next;
        let huge = ExternalSignals {
            requested_capacity: Some(u32::MAX),
            ..bound()
        };
        let (_, plan) = plan_frame(&st, &huge, &cfg);
        // Already at the maximum: no reallocation happens.
        assert_eq!(plan.allocate_pools, None);
    }
}
