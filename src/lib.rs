//! Stochastic progressive photon mapping on wgpu compute.
//! Two photon pools (caustic + global), GPU-built bounding box indices over
//! the photons each frame, per-pixel gather, shrinking search radii.

pub mod accel;
pub mod config;
pub mod counter;
pub mod error;
pub mod frame;
pub mod gpu;
pub mod passes;
pub mod pool;
pub mod radius;
pub mod scene;
pub mod sppm;
pub mod timing;

pub use config::SppmConfig;
pub use error::{SppmError, SppmResult};
pub use frame::{plan_frame, ExternalSignals, FramePlan, FrameReport, FrameState};
pub use pool::{PerClass, PhotonClass};
pub use scene::{Camera, Material, SceneData, Triangle};
pub use sppm::SppmRenderer;
