use crate::core::linalg::solve_3x3;
use crate::types::{HeightImage, InsarError, InsarResult, PlaneModel, PlaneSample};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Minimum number of valid samples for the 3-unknown plane fit.
const MIN_SAMPLES: usize = 3;

/// Parameters for plane deramping
#[derive(Debug, Clone)]
pub struct DerampParams {
    /// Number of random samples drawn for the fit (with replacement)
    pub num_samples: usize,
    /// Seed for the sampling RNG; None draws fresh entropy per call
    pub seed: Option<u64>,
}

impl Default for DerampParams {
    fn default() -> Self {
        Self {
            num_samples: 5000, // Typical pipeline range is 1k-10k
            seed: None,
        }
    }
}

/// Plane deramping processor
///
/// Fits a best-fit plane to a raster from randomly sampled points and
/// subtracts it, leaving only the higher-frequency residual. Used on
/// unwrapped phase (or the derived height band) to remove the linear
/// trend left over from baseline errors.
///
/// Sampling is uniform with replacement, so the fit cost is independent
/// of raster size and no single dense region dominates the regression.
/// Outliers among the samples are not down-weighted; only NaN samples
/// are excluded.
pub struct PlaneDeramper {
    params: DerampParams,
}

impl PlaneDeramper {
    /// Create a new deramper with default parameters
    pub fn new() -> Self {
        Self {
            params: DerampParams::default(),
        }
    }

    /// Create a deramper with custom parameters
    pub fn with_params(params: DerampParams) -> Self {
        Self { params }
    }

    /// Convenience constructor with a fixed seed for reproducible runs
    pub fn with_seed(seed: u64) -> Self {
        Self::with_params(DerampParams {
            seed: Some(seed),
            ..DerampParams::default()
        })
    }

    /// Fit a plane to randomly sampled raster values.
    ///
    /// Draws `num_samples` (row, col) index pairs uniformly with
    /// replacement, discards NaN hits, and solves the least-squares
    /// system for z = a*row + b*col + c.
    pub fn fit_plane(&self, field: &HeightImage) -> InsarResult<PlaneModel> {
        let (rows, cols) = field.dim();
        if rows == 0 || cols == 0 {
            return Err(InsarError::Processing(
                "Cannot fit a plane to an empty raster".to_string(),
            ));
        }
        if self.params.num_samples == 0 {
            return Err(InsarError::Processing(
                "Sample count must be positive".to_string(),
            ));
        }

        let mut rng = match self.params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut samples = Vec::with_capacity(self.params.num_samples);
        for _ in 0..self.params.num_samples {
            let row = rng.gen_range(0..rows);
            let col = rng.gen_range(0..cols);
            let value = field[[row, col]];
            if value.is_finite() {
                samples.push(PlaneSample { row, col, value });
            }
        }

        log::debug!(
            "Plane fit: {} valid of {} drawn samples on {}x{} raster",
            samples.len(),
            self.params.num_samples,
            rows,
            cols
        );

        fit_plane_to_samples(&samples)
    }

    /// Remove the best-fit plane from a raster.
    ///
    /// Returns `field - plane` evaluated over the full grid, same shape
    /// as the input. NaN pixels are excluded from the fit and remain NaN
    /// in the output at the same position.
    pub fn remove_plane(&self, field: &HeightImage) -> InsarResult<HeightImage> {
        let model = self.fit_plane(field)?;
        log::info!(
            "Removing plane a={:.3e} b={:.3e} c={:.3e}",
            model.a,
            model.b,
            model.c
        );

        let mut residual = field.clone();
        for ((row, col), value) in residual.indexed_iter_mut() {
            // NaN - prediction stays NaN, preserving the missing mask
            *value -= model.evaluate(row, col);
        }

        debug_assert_eq!(residual.dim(), field.dim());
        Ok(residual)
    }
}

impl Default for PlaneDeramper {
    fn default() -> Self {
        Self::new()
    }
}

/// Least-squares plane fit through an explicit set of samples.
///
/// Solves the normal equations of the over-determined system
/// `[row col 1] * [a b c]^T = value`. Three non-colinear samples are the
/// exact minimum; fewer yield [`InsarError::InsufficientSamples`], and a
/// rank-deficient system (colinear or duplicated points) yields
/// [`InsarError::DegenerateFit`].
pub fn fit_plane_to_samples(samples: &[PlaneSample]) -> InsarResult<PlaneModel> {
    if samples.len() < MIN_SAMPLES {
        return Err(InsarError::InsufficientSamples {
            required: MIN_SAMPLES,
            actual: samples.len(),
        });
    }

    // Normal equations (A^T A) p = A^T b, accumulated in f64
    let mut ata = [[0.0f64; 3]; 3];
    let mut atb = [0.0f64; 3];
    for s in samples {
        let x = s.row as f64;
        let y = s.col as f64;
        let z = s.value as f64;
        let a_row = [x, y, 1.0];
        for i in 0..3 {
            for j in 0..3 {
                ata[i][j] += a_row[i] * a_row[j];
            }
            atb[i] += a_row[i] * z;
        }
    }

    let coeffs = solve_3x3(&ata, &atb).ok_or_else(|| {
        InsarError::DegenerateFit(format!(
            "Rank-deficient design matrix from {} samples (colinear or duplicated points)",
            samples.len()
        ))
    })?;

    Ok(PlaneModel {
        a: coeffs[0],
        b: coeffs[1],
        c: coeffs[2],
    })
}
