use crate::core::linalg::fit_parabola;
use crate::types::{InsarError, InsarResult, PhaseImage};
use std::f32::consts::PI;

const TWO_PI: f32 = 2.0 * PI;

/// Which side of the wrap boundary receives the 2*pi correction.
///
/// The reference pipeline couples the correction side to the sign of the
/// candidate offset; `FromOffsetSign` reproduces that. The explicit
/// variants let a caller pin the direction from pipeline knowledge (e.g.
/// the sign of the height of ambiguity) instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionDirection {
    /// Offset < 0 adds 2*pi below the offset, otherwise subtracts above it
    FromOffsetSign,
    /// Subtract 2*pi from every value above the offset
    SubtractAbove,
    /// Add 2*pi to every value below the offset
    AddBelow,
}

/// Parameters for phase derotation and quasi-unwrapping
#[derive(Debug, Clone)]
pub struct UnwrapParams {
    /// Number of equal-width histogram bins over the observed range
    pub histogram_bins: usize,
    /// Adjacent-pixel phase difference counted as a discontinuity (radians)
    pub discontinuity_threshold: f32,
    /// Half-width of the offset search window around the initial guess (radians)
    pub search_half_width: f32,
    /// Number of candidate offsets evaluated across the search window
    pub search_steps: usize,
    /// Correction-direction policy applied at each candidate offset
    pub correction: CorrectionDirection,
}

impl Default for UnwrapParams {
    fn default() -> Self {
        Self {
            histogram_bins: 50,
            discontinuity_threshold: 5.0,
            search_half_width: 0.2,
            search_steps: 25,
            correction: CorrectionDirection::FromOffsetSign,
        }
    }
}

/// Histogram of the finite values of a raster.
struct Histogram {
    counts: Vec<usize>,
    min: f32,
    bin_width: f32,
}

impl Histogram {
    fn bin_center(&self, bin: usize) -> f32 {
        self.min + (bin as f32 + 0.5) * self.bin_width
    }
}

/// Phase derotation processor (quasi-unwrapper)
///
/// Recenters a wrapped-phase raster around zero and removes a single
/// global 2*pi-multiple jump left over by an external branch-cut
/// unwrapper, whose output is wrapped into an unpredictable interval.
/// This is not a per-pixel unwrapper: it assumes the true values already
/// lie within one 2*pi-wide interval and only locates the fold boundary.
pub struct PhaseDerotator {
    params: UnwrapParams,
}

impl PhaseDerotator {
    /// Create a new derotator with default parameters
    pub fn new() -> Self {
        Self {
            params: UnwrapParams::default(),
        }
    }

    /// Create a derotator with custom parameters
    pub fn with_params(params: UnwrapParams) -> Self {
        Self { params }
    }

    /// Recenter phase values roughly on zero.
    ///
    /// Subtracts the midpoint of the fullest histogram bin (the dominant
    /// phase cluster) from every value. NaN pixels are ignored by the
    /// histogram and pass through unchanged.
    pub fn zero_phase(&self, phase: &PhaseImage) -> InsarResult<PhaseImage> {
        let hist = self.histogram(phase)?;
        let peak = argmax(&hist.counts);
        let offset = if hist.bin_width > 0.0 {
            hist.bin_center(peak)
        } else {
            hist.min
        };

        log::debug!("Recentering phase by {:.4} rad (peak bin {})", offset, peak);
        Ok(phase.mapv(|v| v - offset))
    }

    /// Remove a single global 2*pi ambiguity from recentered phase.
    ///
    /// Estimates the fold boundary by coarse histogram search followed by
    /// parabolic interpolation of the discontinuity cost, then applies
    /// the 2*pi correction at the interpolated offset. A cost curve with
    /// no usable minimum (constant costs, non-convex or ill-conditioned
    /// parabola) surfaces [`InsarError::DegenerateCostCurve`].
    pub fn quasi_unwrap(&self, phase: &PhaseImage) -> InsarResult<PhaseImage> {
        if self.params.search_steps < 3 {
            return Err(InsarError::Processing(format!(
                "Search needs at least 3 candidate offsets, got {}",
                self.params.search_steps
            )));
        }

        let hist = self.histogram(phase)?;
        // The fold boundary sits in a sparsely populated part of the
        // histogram: real data clusters away from the discontinuity.
        let initial_guess = if hist.bin_width > 0.0 {
            hist.bin_center(argmin(&hist.counts))
        } else {
            0.0
        };
        log::debug!("Initial fold-boundary guess: {:.4} rad", initial_guess);

        let low = initial_guess - self.params.search_half_width;
        let step =
            2.0 * self.params.search_half_width / (self.params.search_steps as f32 - 1.0);
        let candidates: Vec<f32> = (0..self.params.search_steps)
            .map(|i| low + i as f32 * step)
            .collect();

        let costs = self.candidate_costs(phase, &candidates);
        let offset = Self::interpolate_offset(&candidates, &costs)?;

        if offset < low || offset > initial_guess + self.params.search_half_width {
            log::warn!(
                "Interpolated offset {:.4} rad lies outside the search window [{:.4}, {:.4}]",
                offset,
                low,
                initial_guess + self.params.search_half_width
            );
        }

        log::info!("Applying 2*pi correction at offset {:.4} rad", offset);
        Ok(self.apply_correction(phase, offset))
    }

    /// Recenter and quasi-unwrap in one call, the sequence used by the
    /// DEM pipeline on the output of the external unwrapper.
    pub fn recenter_and_unwrap(&self, phase: &PhaseImage) -> InsarResult<PhaseImage> {
        let recentered = self.zero_phase(phase)?;
        let unwrapped = self.quasi_unwrap(&recentered)?;
        debug_assert_eq!(unwrapped.dim(), phase.dim());
        Ok(unwrapped)
    }

    /// Count adjacent-pixel pairs (horizontal and vertical) whose phase
    /// difference exceeds the discontinuity threshold. Pairs touching a
    /// NaN pixel are skipped.
    pub fn count_discontinuities(&self, phase: &PhaseImage) -> usize {
        let (rows, cols) = phase.dim();
        let threshold = self.params.discontinuity_threshold;
        let mut count = 0usize;

        for i in 0..rows.saturating_sub(1) {
            for j in 0..cols {
                let (a, b) = (phase[[i, j]], phase[[i + 1, j]]);
                if a.is_finite() && b.is_finite() && (a - b).abs() > threshold {
                    count += 1;
                }
            }
        }
        for i in 0..rows {
            for j in 0..cols.saturating_sub(1) {
                let (a, b) = (phase[[i, j]], phase[[i, j + 1]]);
                if a.is_finite() && b.is_finite() && (a - b).abs() > threshold {
                    count += 1;
                }
            }
        }
        count
    }

    /// Discontinuity count after a trial 2*pi correction at `offset`.
    pub fn discontinuity_cost(&self, phase: &PhaseImage, offset: f32) -> usize {
        let corrected = self.apply_correction(phase, offset);
        self.count_discontinuities(&corrected)
    }

    /// Apply the 2*pi correction at `offset` per the configured
    /// correction-direction policy. NaN comparisons are false, so missing
    /// pixels pass through untouched.
    pub fn apply_correction(&self, phase: &PhaseImage, offset: f32) -> PhaseImage {
        match self.resolve_direction(offset) {
            CorrectionDirection::AddBelow => {
                phase.mapv(|v| if v < offset { v + TWO_PI } else { v })
            }
            CorrectionDirection::SubtractAbove => {
                phase.mapv(|v| if v > offset { v - TWO_PI } else { v })
            }
            CorrectionDirection::FromOffsetSign => unreachable!("resolved above"),
        }
    }

    /// Locate the cost-minimizing offset from the sampled cost curve by
    /// fitting a parabola and taking its vertex -b/(2a).
    ///
    /// A curve with no usable minimum is rejected: constant costs, an
    /// ill-conditioned fit, or a quadratic coefficient that is
    /// non-finite, ~zero (linear curve), or negative (concave curve,
    /// whose vertex is a maximum).
    fn interpolate_offset(candidates: &[f32], costs: &[usize]) -> InsarResult<f32> {
        if costs.iter().all(|&c| c == costs[0]) {
            return Err(InsarError::DegenerateCostCurve(format!(
                "Constant cost {} across all {} candidate offsets",
                costs[0],
                costs.len()
            )));
        }

        let xs: Vec<f64> = candidates.iter().map(|&x| x as f64).collect();
        let ys: Vec<f64> = costs.iter().map(|&c| c as f64).collect();
        let coeffs = fit_parabola(&xs, &ys).ok_or_else(|| {
            InsarError::DegenerateCostCurve("Ill-conditioned parabola fit".to_string())
        })?;

        let (a, b) = (coeffs[0], coeffs[1]);
        if !a.is_finite() || a <= 1e-9 {
            return Err(InsarError::DegenerateCostCurve(format!(
                "Quadratic coefficient {:.3e} has no interior minimum",
                a
            )));
        }

        let offset = (-b / (2.0 * a)) as f32;
        if !offset.is_finite() {
            return Err(InsarError::DegenerateCostCurve(
                "Parabola vertex is not finite".to_string(),
            ));
        }
        Ok(offset)
    }

    fn resolve_direction(&self, offset: f32) -> CorrectionDirection {
        match self.params.correction {
            CorrectionDirection::FromOffsetSign => {
                if offset < 0.0 {
                    CorrectionDirection::AddBelow
                } else {
                    CorrectionDirection::SubtractAbove
                }
            }
            explicit => explicit,
        }
    }

    #[cfg(feature = "parallel")]
    fn candidate_costs(&self, phase: &PhaseImage, candidates: &[f32]) -> Vec<usize> {
        use rayon::prelude::*;
        candidates
            .par_iter()
            .map(|&offset| self.discontinuity_cost(phase, offset))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn candidate_costs(&self, phase: &PhaseImage, candidates: &[f32]) -> Vec<usize> {
        candidates
            .iter()
            .map(|&offset| self.discontinuity_cost(phase, offset))
            .collect()
    }

    fn histogram(&self, phase: &PhaseImage) -> InsarResult<Histogram> {
        let bins = self.params.histogram_bins;
        if bins == 0 {
            return Err(InsarError::Processing(
                "Histogram bin count must be positive".to_string(),
            ));
        }

        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for &v in phase.iter() {
            if v.is_finite() {
                min = min.min(v);
                max = max.max(v);
            }
        }
        if min > max {
            return Err(InsarError::Processing(
                "No finite pixels to histogram".to_string(),
            ));
        }

        let bin_width = (max - min) / bins as f32;
        let mut counts = vec![0usize; bins];
        if bin_width > 0.0 {
            for &v in phase.iter() {
                if v.is_finite() {
                    let bin = (((v - min) / bin_width) as usize).min(bins - 1);
                    counts[bin] += 1;
                }
            }
        } else {
            // Degenerate range: every finite value is identical
            counts[0] = phase.iter().filter(|v| v.is_finite()).count();
        }

        Ok(Histogram {
            counts,
            min,
            bin_width,
        })
    }
}

impl Default for PhaseDerotator {
    fn default() -> Self {
        Self::new()
    }
}

// First-occurrence tie-breaking, matching the coarse-search behavior the
// cost interpolation was tuned against.
fn argmax(counts: &[usize]) -> usize {
    let mut best = 0;
    for (i, &c) in counts.iter().enumerate() {
        if c > counts[best] {
            best = i;
        }
    }
    best
}

fn argmin(counts: &[usize]) -> usize {
    let mut best = 0;
    for (i, &c) in counts.iter().enumerate() {
        if c < counts[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    /// Two-region raster with a wrapped jump: left columns near -pi,
    /// right columns near +pi, true surface one smooth 2*pi interval.
    fn wrapped_jump_field(rows: usize, cols: usize) -> PhaseImage {
        Array2::from_shape_fn((rows, cols), |(_, j)| {
            if j < cols / 2 {
                -PI + 0.05 * j as f32
            } else {
                -PI + 0.05 * (j - cols / 2) as f32 + TWO_PI - 0.5
            }
        })
    }

    #[test]
    fn test_zero_phase_recenters_dominant_cluster() {
        let mut phase = Array2::from_elem((10, 10), 2.0f32);
        for j in 0..10 {
            phase[[0, j]] = 0.5;
        }

        let derotator = PhaseDerotator::new();
        let recentered = derotator.zero_phase(&phase).unwrap();
        assert_eq!(recentered.dim(), (10, 10));

        // Dominant value lands within one bin width of zero
        let bin_width = 1.5 / 50.0;
        assert!(recentered[[5, 5]].abs() <= bin_width);
    }

    #[test]
    fn test_zero_phase_near_idempotent() {
        let mut phase = Array2::from_elem((10, 10), 2.0f32);
        for j in 0..10 {
            phase[[0, j]] = 0.5;
        }

        let derotator = PhaseDerotator::new();
        let once = derotator.zero_phase(&phase).unwrap();
        let twice = derotator.zero_phase(&once).unwrap();

        let bin_width = 1.5 / 50.0;
        for (&a, &b) in once.iter().zip(twice.iter()) {
            assert!((a - b).abs() <= bin_width + 1e-6);
        }
    }

    #[test]
    fn test_zero_phase_preserves_nan() {
        let mut phase = Array2::from_elem((6, 6), 1.0f32);
        phase[[2, 2]] = f32::NAN;
        phase[[0, 5]] = -0.5;

        let recentered = PhaseDerotator::new().zero_phase(&phase).unwrap();
        assert!(recentered[[2, 2]].is_nan());
        assert!(recentered[[1, 1]].is_finite());
    }

    #[test]
    fn test_zero_phase_all_nan_fails() {
        let phase = Array2::from_elem((4, 4), f32::NAN);
        assert!(matches!(
            PhaseDerotator::new().zero_phase(&phase),
            Err(InsarError::Processing(_))
        ));
    }

    /// Smooth column ramp spanning slightly less than 2*pi, wrapped at
    /// +pi so the last columns fold back near -pi. The emptiest histogram
    /// bin is the narrow notch between the folded-back cluster and the
    /// bottom of the main ramp.
    fn folded_ramp_field(rows: usize) -> PhaseImage {
        Array2::from_shape_fn((rows, 40), |(_, j)| {
            let t = -2.5 + 6.1 * j as f32 / 39.0;
            if t > PI {
                t - TWO_PI
            } else {
                t
            }
        })
    }

    #[test]
    fn test_cost_lowest_at_true_boundary() {
        let phase = folded_ramp_field(20);
        let params = UnwrapParams::default();
        let derotator = PhaseDerotator::new();

        // Reproduce the coarse search: the first empty bin of this
        // fixture is bin 3, the notch between the folded-back cluster
        // and the bottom of the ramp.
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for &v in phase.iter() {
            min = min.min(v);
            max = max.max(v);
        }
        let bin_width = (max - min) / params.histogram_bins as f32;
        let boundary = min + 3.5 * bin_width;

        // The window edges split a cluster on either side of the notch
        // and create extra jumps; the boundary itself removes them all.
        let at_boundary = derotator.discontinuity_cost(&phase, boundary);
        let at_left_edge =
            derotator.discontinuity_cost(&phase, boundary - params.search_half_width);
        let at_right_edge =
            derotator.discontinuity_cost(&phase, boundary + params.search_half_width);

        assert_eq!(at_boundary, 0);
        assert!(at_boundary < at_left_edge);
        assert!(at_boundary < at_right_edge);
    }

    #[test]
    fn test_concave_cost_curve_degenerate() {
        // Costs peaking mid-window fit a downward parabola whose vertex
        // is a maximum, not a usable minimum
        let candidates: Vec<f32> = (0..11).map(|i| -0.2 + 0.04 * i as f32).collect();
        let costs: Vec<usize> = vec![0, 5, 9, 12, 14, 15, 14, 12, 9, 5, 0];

        assert!(matches!(
            PhaseDerotator::interpolate_offset(&candidates, &costs),
            Err(InsarError::DegenerateCostCurve(_))
        ));
    }

    #[test]
    fn test_linear_cost_curve_degenerate() {
        // A linear cost trend has a ~zero quadratic coefficient and no
        // interior minimum to interpolate
        let candidates: Vec<f32> = (0..11).map(|i| -1.25 + 0.25 * i as f32).collect();
        let costs: Vec<usize> = (0..11).map(|i| 22 - 2 * i).collect();

        assert!(matches!(
            PhaseDerotator::interpolate_offset(&candidates, &costs),
            Err(InsarError::DegenerateCostCurve(_))
        ));
    }

    #[test]
    fn test_quasi_unwrap_removes_global_jump() {
        let mut phase = Array2::from_elem((20, 20), 3.0f32);
        for i in 0..20 {
            for j in 0..10 {
                phase[[i, j]] = -3.0;
            }
        }

        let derotator = PhaseDerotator::new();
        let before = derotator.count_discontinuities(&phase);
        assert_eq!(before, 20);

        let unwrapped = derotator.quasi_unwrap(&phase).unwrap();
        assert_eq!(unwrapped.dim(), (20, 20));

        let after = derotator.count_discontinuities(&unwrapped);
        assert!(after < before);
    }

    #[test]
    fn test_quasi_unwrap_preserves_nan() {
        let mut phase = Array2::from_elem((20, 20), 3.0f32);
        for i in 0..20 {
            for j in 0..10 {
                phase[[i, j]] = -3.0;
            }
        }
        phase[[4, 4]] = f32::NAN;

        let unwrapped = PhaseDerotator::new().quasi_unwrap(&phase).unwrap();
        assert!(unwrapped[[4, 4]].is_nan());
    }

    #[test]
    fn test_constant_field_degenerate_cost_curve() {
        let phase = Array2::from_elem((8, 8), 1.25f32);
        assert!(matches!(
            PhaseDerotator::new().quasi_unwrap(&phase),
            Err(InsarError::DegenerateCostCurve(_))
        ));
    }

    #[test]
    fn test_recenter_and_unwrap_full_sequence() {
        let mut phase = Array2::from_elem((20, 20), 3.0f32);
        for i in 0..20 {
            for j in 0..10 {
                phase[[i, j]] = -3.0;
            }
        }

        let derotator = PhaseDerotator::new();
        let result = derotator.recenter_and_unwrap(&phase).unwrap();
        assert_eq!(result.dim(), (20, 20));

        // All values end up in one smooth interval near zero
        assert_eq!(derotator.count_discontinuities(&result), 0);
        for &v in result.iter() {
            assert!(v.abs() < PI);
        }
    }

    #[test]
    fn test_explicit_correction_direction() {
        let params = UnwrapParams {
            correction: CorrectionDirection::AddBelow,
            ..UnwrapParams::default()
        };
        let derotator = PhaseDerotator::with_params(params);

        let phase = Array2::from_shape_fn((4, 4), |(_, j)| j as f32);
        let corrected = derotator.apply_correction(&phase, 1.5);

        // Values below the offset gain 2*pi even though the offset is positive
        assert!((corrected[[0, 0]] - TWO_PI).abs() < 1e-6);
        assert!((corrected[[0, 1]] - (1.0 + TWO_PI)).abs() < 1e-6);
        assert!((corrected[[0, 2]] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_search_steps_validation() {
        let params = UnwrapParams {
            search_steps: 2,
            ..UnwrapParams::default()
        };
        let phase = wrapped_jump_field(10, 10);
        assert!(matches!(
            PhaseDerotator::with_params(params).quasi_unwrap(&phase),
            Err(InsarError::Processing(_))
        ));
    }
}
