//! Compute passes of the photon pipeline: photon trace, primary
//! visibility, and the per-pixel collect that produces the image.

pub mod bind_groups;
pub mod collect;
pub mod trace;
pub mod visibility;

pub use collect::{CollectParams, CollectPass};
pub use trace::{TraceParams, TracePass};
pub use visibility::{VisibilityPass, GBUFFER_TEXEL_SIZE};
