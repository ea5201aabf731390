use ndarray::Array2;

/// Real-valued interferometric phase raster (radians).
///
/// Indexed as (row, column). NaN marks missing/invalid pixels; every
/// operation in this crate preserves NaN at its original position.
pub type PhaseImage = Array2<f32>;

/// Real-valued height raster (meters). Same layout and missing-value
/// convention as [`PhaseImage`]; the deramp step accepts either.
pub type HeightImage = Array2<f32>;

/// One valid (non-NaN) sample drawn from a raster for the plane fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneSample {
    pub row: usize,
    pub col: usize,
    pub value: f32,
}

/// Best-fit plane z = a*row + b*col + c.
///
/// Coefficients are kept in f64 because the normal-equation solve
/// accumulates sums of squared indices that overflow f32 precision
/// on large rasters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneModel {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl PlaneModel {
    /// Evaluate the plane at a grid position.
    pub fn evaluate(&self, row: usize, col: usize) -> f32 {
        (self.a * row as f64 + self.b * col as f64 + self.c) as f32
    }
}

/// Error types for InSAR post-processing
#[derive(Debug, thiserror::Error)]
pub enum InsarError {
    #[error("Insufficient samples for plane fit: got {actual}, need at least {required}")]
    InsufficientSamples { required: usize, actual: usize },

    #[error("Degenerate plane fit: {0}")]
    DegenerateFit(String),

    #[error("Degenerate cost curve: {0}")]
    DegenerateCostCurve(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for InSAR post-processing operations
pub type InsarResult<T> = Result<T, InsarError>;
