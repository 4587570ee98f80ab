// tests/test_sppm_renderer.rs
// End-to-end render sequences over the demo box against a real device:
// progressive iterations, radius shrink, restart semantics, and both the
// cleared and the debug output paths.
// RELEVANT FILES:src/sppm.rs,src/frame.rs,src/passes/collect.rs

use sppm::{PhotonClass, SceneData, SppmConfig, SppmRenderer};

const W: u32 = 64;
const H: u32 = 64;

fn small_config() -> SppmConfig {
    SppmConfig {
        photon_grid_side: 64,
        ..SppmConfig::default()
    }
}

fn renderer_or_skip(test: &str, config: SppmConfig) -> Option<SppmRenderer> {
    match SppmRenderer::new(W, H, config) {
        Ok(r) => Some(r),
        Err(err) => {
            eprintln!("{test}: skipped, no GPU adapter ({err})");
            None
        }
    }
}

#[test]
fn progressive_frames_shrink_radii_and_produce_light() {
    let Some(mut renderer) = renderer_or_skip(
        "progressive_frames_shrink_radii_and_produce_light",
        small_config(),
    ) else {
        return;
    };
    renderer
        .bind_scene(SceneData::cornell_box())
        .expect("scene bind");

    let mut reports = Vec::new();
    for i in 0..4 {
        let report = renderer.render_frame().expect("frame");
        assert_eq!(report.frame_index, i);
        reports.push(report);
    }

    // The first frame uses the configured radii; each later frame ran its
    // collect before the shrink, so reported radii strictly decrease.
    let cfg = renderer.config().clone();
    assert_eq!(
        reports[0].radii[PhotonClass::Caustic],
        cfg.caustic_init_radius
    );
    assert_eq!(reports[0].radii[PhotonClass::Global], cfg.global_init_radius);
    for pair in reports.windows(2) {
        for class in PhotonClass::ALL {
            assert!(
                pair[1].radii[class] < pair[0].radii[class],
                "radius did not shrink between frames"
            );
        }
    }

    // Yields arrive one frame late: frame 0 sizes at full capacity, frame 1
    // sees frame 0's counts. A closed box full of diffuse walls always
    // deposits global photons.
    assert_eq!(reports[0].yields[PhotonClass::Global], 0);
    assert!(reports[1].yields[PhotonClass::Global] > 0);
    for report in &reports[1..] {
        for class in PhotonClass::ALL {
            assert!(
                report.active_counts[class] >= report.yields[class],
                "headroom sizing fell below the stale yield"
            );
        }
    }
    assert!(reports[0].elapsed.is_some(), "timer enabled by default");

    let pixels = renderer.read_output().expect("readback");
    assert_eq!(pixels.len(), (W * H * 4) as usize);
    assert!(pixels.iter().all(|v| v.is_finite()), "non-finite output");
    let energy: f32 = pixels.chunks_exact(4).map(|p| p[0] + p[1] + p[2]).sum();
    assert!(energy > 0.0, "image stayed black after four frames");
}

#[test]
fn restarts_and_debug_view() {
    let Some(mut renderer) = renderer_or_skip("restarts_and_debug_view", small_config()) else {
        return;
    };
    renderer
        .bind_scene(SceneData::cornell_box())
        .expect("scene bind");

    for _ in 0..3 {
        renderer.render_frame().expect("frame");
    }
    let shrunk = renderer.radii();
    assert!(shrunk[PhotonClass::Global] < renderer.config().global_init_radius);

    // Camera motion restarts the progressive sequence at the initial radii
    // without touching pool storage.
    renderer.notify_camera_moved();
    let report = renderer.render_frame().expect("frame");
    assert_eq!(report.frame_index, 0);
    assert_eq!(
        report.radii[PhotonClass::Caustic],
        renderer.config().caustic_init_radius
    );
    assert_eq!(
        report.radii[PhotonClass::Global],
        renderer.config().global_init_radius
    );

    // An option change reports the invalidation and also restarts.
    let debug = SppmConfig {
        debug_show_index: true,
        ..renderer.config().clone()
    };
    renderer.set_config(debug).expect("config");
    let report = renderer.render_frame().expect("debug frame");
    assert!(report.options_changed);
    assert_eq!(report.frame_index, 0);

    let pixels = renderer.read_output().expect("readback");
    assert!(pixels.iter().all(|v| v.is_finite()));

    // Unbinding leaves only the clear path; the output is black again.
    renderer.unbind_scene();
    let report = renderer.render_frame().expect("clear frame");
    assert!(report.options_changed);
    assert_eq!(report.yields[PhotonClass::Global], 0);
    let pixels = renderer.read_output().expect("readback");
    for px in pixels.chunks_exact(4) {
        assert_eq!(px[0], 0.0);
        assert_eq!(px[1], 0.0);
        assert_eq!(px[2], 0.0);
        assert_eq!(px[3], 1.0);
    }
}

#[test]
fn fixed_seed_repeats_the_first_frame_yield() {
    let config = SppmConfig {
        use_fixed_seed: true,
        fixed_seed: 42,
        ..small_config()
    };
    let Some(mut renderer) = renderer_or_skip("fixed_seed_repeats_the_first_frame_yield", config)
    else {
        return;
    };
    renderer
        .bind_scene(SceneData::cornell_box())
        .expect("scene bind");

    // With a fixed seed every frame traces the identical photon set, so
    // consecutive stale yields agree exactly.
    renderer.render_frame().expect("frame");
    let a = renderer.render_frame().expect("frame");
    let b = renderer.render_frame().expect("frame");
    assert!(a.yields[PhotonClass::Global] > 0);
    for class in PhotonClass::ALL {
        assert_eq!(a.yields[class], b.yields[class], "fixed seed drifted");
    }
}

#[test]
fn collect_switches_mute_pools_without_rebuild() {
    // Fixed seed: every frame traces the identical photon set, so the
    // restarted frame-0 renders stay comparable across the toggles.
    let config = SppmConfig {
        use_fixed_seed: true,
        fixed_seed: 11,
        ..small_config()
    };
    let Some(mut renderer) =
        renderer_or_skip("collect_switches_mute_pools_without_rebuild", config)
    else {
        return;
    };
    renderer
        .bind_scene(SceneData::cornell_box())
        .expect("scene bind");

    renderer.render_frame().expect("frame");
    let both_on = renderer.read_output().expect("readback");

    // Muting the global pool is an option change, so the sequence restarts,
    // but it only drops a bit from the query mask: pool storage and the
    // prepared indices stay resident and photons keep being traced.
    let no_global = SppmConfig {
        collect_global: false,
        ..renderer.config().clone()
    };
    renderer.set_config(no_global).expect("config");
    let report = renderer.render_frame().expect("frame");
    assert!(report.options_changed);
    assert_eq!(report.frame_index, 0);
    assert!(
        report.yields[PhotonClass::Global] > 0,
        "trace stopped depositing while the gather was muted"
    );
    let caustic_only = renderer.read_output().expect("readback");

    let neither = SppmConfig {
        collect_caustic: false,
        ..renderer.config().clone()
    };
    renderer.set_config(neither).expect("config");
    let report = renderer.render_frame().expect("frame");
    assert_eq!(report.frame_index, 0);
    let muted = renderer.read_output().expect("readback");

    // Gathered flux is a sum of non-negative terms, so muting a pool can
    // only remove energy from a pixel, never add it.
    for (m, c) in muted.chunks_exact(4).zip(caustic_only.chunks_exact(4)) {
        assert!(
            m[0] <= c[0] && m[1] <= c[1] && m[2] <= c[2],
            "muting the caustic pool added energy"
        );
    }

    let sum = |img: &[f32]| -> f32 { img.chunks_exact(4).map(|p| p[0] + p[1] + p[2]).sum() };
    assert!(
        sum(&caustic_only) < sum(&both_on),
        "muting the global pool did not darken the image"
    );
    // With both pools muted only the directly seen emitter survives; the
    // diffuse walls that the global gather lit go back to black.
    assert!(sum(&muted) > 0.0, "emitter passthrough vanished");
    let lit = |img: &[f32]| {
        img.chunks_exact(4)
            .filter(|p| p[0] + p[1] + p[2] > 0.0)
            .count()
    };
    assert!(
        lit(&muted) < lit(&both_on),
        "muting both pools left gathered pixels lit"
    );
}

#[test]
fn rejects_invalid_config() {
    let bad = SppmConfig {
        alpha: 1.5,
        ..SppmConfig::default()
    };
    assert!(SppmRenderer::new(W, H, bad).is_err());
}
