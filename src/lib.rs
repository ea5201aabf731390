//! phasedem: InSAR Phase Post-Processing for DEM Generation
//!
//! This library implements the numerical post-processing steps of an
//! interferometric DEM pipeline: recentering and quasi-unwrapping of
//! wrapped phase (removal of a single global 2*pi ambiguity left by an
//! external branch-cut unwrapper), and least-squares plane deramping of
//! the resulting phase or height raster.
//!
//! Rasters are `ndarray::Array2<f32>` with NaN marking missing pixels;
//! every operation preserves shape and the missing mask. File I/O,
//! interferogram formation, and terrain correction live upstream and
//! downstream of this crate.

pub mod core;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    HeightImage, InsarError, InsarResult, PhaseImage, PlaneModel, PlaneSample,
};

pub use crate::core::{
    fit_plane_to_samples, CorrectionDirection, DerampParams, PhaseDerotator, PlaneDeramper,
    UnwrapParams,
};
