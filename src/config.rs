// src/config.rs
// Type-safe configuration for the SPPM pass
// Exists to unify photon-budget, radius-schedule, and trace knobs in one serde struct
// RELEVANT FILES: src/frame.rs, src/sppm.rs, src/pool.rs

use serde::{Deserialize, Serialize};

use crate::error::{SppmError, SppmResult};

/// Options for one SPPM render sequence. Any change to these between frames
/// must be reported through `ExternalSignals::options_changed` so the frame
/// driver restarts the progressive estimate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SppmConfig {
    /// Maximum photon bounces per emitted ray.
    #[serde(default = "SppmConfig::default_max_depth")]
    pub max_depth: u32,
    /// Side length of the square photon dispatch grid; one emitted ray per cell.
    #[serde(default = "SppmConfig::default_photon_grid_side")]
    pub photon_grid_side: u32,
    /// Hard upper bound on per-pool photon storage, in photons.
    #[serde(default = "SppmConfig::default_max_pool_capacity")]
    pub max_pool_capacity: u32,
    #[serde(default = "SppmConfig::default_caustic_init_radius")]
    pub caustic_init_radius: f32,
    #[serde(default = "SppmConfig::default_global_init_radius")]
    pub global_init_radius: f32,
    /// Progressive shrink exponent, in (0, 1).
    #[serde(default = "SppmConfig::default_alpha")]
    pub alpha: f32,
    /// Numerical floor for both search radii.
    #[serde(default = "SppmConfig::default_min_radius")]
    pub min_radius: f32,
    /// Headroom factor applied to last frame's photon yield when sizing
    /// the per-frame index builds.
    #[serde(default = "SppmConfig::default_photon_as_scale")]
    pub photon_as_scale: f32,
    #[serde(default)]
    pub use_fixed_seed: bool,
    #[serde(default)]
    pub fixed_seed: u32,
    #[serde(default = "SppmConfig::default_true")]
    pub use_alpha_test: bool,
    /// Roughness below which an interaction counts as specular for
    /// caustic classification.
    #[serde(default = "SppmConfig::default_spec_rough_cutoff")]
    pub spec_rough_cutoff: f32,
    #[serde(default = "SppmConfig::default_true")]
    pub collect_global: bool,
    #[serde(default = "SppmConfig::default_true")]
    pub collect_caustic: bool,
    #[serde(default = "SppmConfig::default_true")]
    pub use_timer: bool,
    /// Render photon-index occupancy instead of radiance.
    #[serde(default)]
    pub debug_show_index: bool,
}

impl SppmConfig {
    const fn default_max_depth() -> u32 {
        4
    }

    const fn default_photon_grid_side() -> u32 {
        512
    }

    const fn default_max_pool_capacity() -> u32 {
        1024 * 1024
    }

    const fn default_caustic_init_radius() -> f32 {
        0.01
    }

    const fn default_global_init_radius() -> f32 {
        0.05
    }

    const fn default_alpha() -> f32 {
        0.7
    }

    const fn default_min_radius() -> f32 {
        1e-5
    }

    const fn default_photon_as_scale() -> f32 {
        1.1
    }

    const fn default_spec_rough_cutoff() -> f32 {
        0.55
    }

    const fn default_true() -> bool {
        true
    }

    /// Worst-case photon yield of one trace dispatch: every cell deposits
    /// at every bounce. Clamped to the configured pool maximum; this is the
    /// capacity estimate recomputed at iteration 0.
    pub fn estimated_capacity(&self) -> u32 {
        let cells = self.photon_grid_side as u64 * self.photon_grid_side as u64;
        let worst = cells.saturating_mul(self.max_depth as u64);
        worst.min(self.max_pool_capacity as u64) as u32
    }

    pub fn validate(&self) -> SppmResult<()> {
        if self.max_depth == 0 {
            return Err(SppmError::allocation("max-depth must be at least 1"));
        }
        if self.photon_grid_side == 0 || self.photon_grid_side > 8192 {
            return Err(SppmError::allocation(format!(
                "photon-grid-side {} outside supported range 1..=8192",
                self.photon_grid_side
            )));
        }
        if self.max_pool_capacity == 0 {
            return Err(SppmError::allocation("max-pool-capacity must be nonzero"));
        }
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(SppmError::allocation(format!(
                "alpha {} outside open interval (0, 1)",
                self.alpha
            )));
        }
        if self.caustic_init_radius <= 0.0 || self.global_init_radius <= 0.0 {
            return Err(SppmError::allocation("initial radii must be positive"));
        }
        if self.min_radius <= 0.0 || self.min_radius > self.caustic_init_radius.min(self.global_init_radius) {
            return Err(SppmError::allocation(
                "min-radius must be positive and below both initial radii",
            ));
        }
        if self.photon_as_scale < 1.0 {
            return Err(SppmError::allocation("photon-as-scale must be at least 1.0"));
        }
        Ok(())
    }

    pub fn from_json(text: &str) -> SppmResult<Self> {
        let cfg: SppmConfig = serde_json::from_str(text)
            .map_err(|e| SppmError::allocation(format!("config parse failed: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn to_json(&self) -> String {
        // Serialization of a plain struct with no map keys cannot fail.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    pub fn load(path: &std::path::Path) -> SppmResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

impl Default for SppmConfig {
    fn default() -> Self {
        Self {
            max_depth: Self::default_max_depth(),
            photon_grid_side: Self::default_photon_grid_side(),
            max_pool_capacity: Self::default_max_pool_capacity(),
            caustic_init_radius: Self::default_caustic_init_radius(),
            global_init_radius: Self::default_global_init_radius(),
            alpha: Self::default_alpha(),
            min_radius: Self::default_min_radius(),
            photon_as_scale: Self::default_photon_as_scale(),
            use_fixed_seed: false,
            fixed_seed: 0,
            use_alpha_test: true,
            spec_rough_cutoff: Self::default_spec_rough_cutoff(),
            collect_global: true,
            collect_caustic: true,
            use_timer: true,
            debug_show_index: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = SppmConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.max_depth, 4);
        assert_eq!(cfg.photon_grid_side, 512);
        assert_eq!(cfg.max_pool_capacity, 1 << 20);
        assert_eq!(cfg.caustic_init_radius, 0.01);
        assert_eq!(cfg.global_init_radius, 0.05);
    }

    #[test]
    fn estimated_capacity_clamps_to_maximum() {
        let cfg = SppmConfig::default();
        // 512*512 rays * 4 bounces == 2^20 == the default maximum.
        assert_eq!(cfg.estimated_capacity(), 1 << 20);

        let small = SppmConfig {
            photon_grid_side: 64,
            ..SppmConfig::default()
        };
        assert_eq!(small.estimated_capacity(), 64 * 64 * 4);

        let capped = SppmConfig {
            max_depth: 64,
            ..SppmConfig::default()
        };
        assert_eq!(capped.estimated_capacity(), capped.max_pool_capacity);
    }

    #[test]
    fn json_round_trip_kebab_case() {
        let cfg = SppmConfig {
            use_fixed_seed: true,
            fixed_seed: 7,
            ..SppmConfig::default()
        };
        let text = cfg.to_json();
        assert!(text.contains("\"use-fixed-seed\""));
        assert!(text.contains("\"photon-as-scale\""));
        let back = SppmConfig::from_json(&text).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg = SppmConfig::from_json(r#"{"max-depth": 8}"#).unwrap();
        assert_eq!(cfg.max_depth, 8);
        assert_eq!(cfg.photon_grid_side, 512);
        assert!(cfg.use_alpha_test);
    }

    #[test]
    fn rejects_bad_alpha_and_scale() {
        let cfg = SppmConfig {
            alpha: 1.0,
            ..SppmConfig::default()
        };
        assert!(cfg.validate().is_err());
        let cfg = SppmConfig {
            photon_as_scale: 0.5,
            ..SppmConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
