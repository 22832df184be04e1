// Aim-assist trajectory preview.
//
// The sampler is a pure closed-form projectile integration; the preview
// driver feeds the sampled poly-line to an external rendering surface. The
// preview is a visual aid only and never resolves actual flight.

pub mod preview;
pub mod sampler;

pub use preview::{PolylineSink, PreviewConfig, TrajectoryPreview};
pub use sampler::sample_trajectory;
