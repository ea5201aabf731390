//! Core InSAR post-processing modules

pub mod deramp;
pub mod linalg;
pub mod unwrap;

// Re-export main types
pub use deramp::{fit_plane_to_samples, DerampParams, PlaneDeramper};
pub use unwrap::{CorrectionDirection, PhaseDerotator, UnwrapParams};
