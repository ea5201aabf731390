//! Small dense linear algebra shared by the deramp and unwrap steps.
//!
//! Both the plane fit and the cost-curve parabola reduce to 3-unknown
//! least-squares problems, so their normal equations are always 3x3 and a
//! direct Gaussian elimination avoids pulling in a general solver.

/// Solve a 3x3 linear system `M x = b` via Gaussian elimination with
/// partial pivoting.
///
/// Returns `None` when the system is singular or close enough to singular
/// that the solution would be numerically meaningless. Singularity is
/// judged relative to the largest entry of `M`, so uniformly scaled
/// systems are treated consistently.
pub fn solve_3x3(m: &[[f64; 3]; 3], b: &[f64; 3]) -> Option<[f64; 3]> {
    let mut a = *m;
    let mut rhs = *b;

    let max_entry = a
        .iter()
        .flatten()
        .fold(0.0f64, |acc, v| acc.max(v.abs()));
    if max_entry == 0.0 || !max_entry.is_finite() {
        return None;
    }
    let pivot_tol = max_entry * 1e-12;

    for col in 0..3 {
        // Pick the largest remaining pivot in this column
        let mut pivot_row = col;
        let mut pivot_abs = a[col][col].abs();
        for row in (col + 1)..3 {
            if a[row][col].abs() > pivot_abs {
                pivot_abs = a[row][col].abs();
                pivot_row = row;
            }
        }
        if pivot_abs < pivot_tol {
            return None;
        }
        if pivot_row != col {
            a.swap(col, pivot_row);
            rhs.swap(col, pivot_row);
        }

        let pivot = a[col][col];
        for row in (col + 1)..3 {
            let factor = a[row][col] / pivot;
            for j in col..3 {
                a[row][j] -= factor * a[col][j];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut x = [0.0f64; 3];
    for i in (0..3).rev() {
        let mut sum = rhs[i];
        for j in (i + 1)..3 {
            sum -= a[i][j] * x[j];
        }
        x[i] = sum / a[i][i];
    }

    if x.iter().all(|v| v.is_finite()) {
        Some(x)
    } else {
        None
    }
}

/// Least-squares fit of `y = a*x^2 + b*x + c` to a set of points.
///
/// Builds the 3x3 normal equations of the Vandermonde system and solves
/// them directly. Returns `None` for fewer than 3 points or a singular
/// system (e.g. all x values identical).
pub fn fit_parabola(xs: &[f64], ys: &[f64]) -> Option<[f64; 3]> {
    if xs.len() != ys.len() || xs.len() < 3 {
        return None;
    }

    // Accumulate the moments of x up to x^4 and the mixed sums with y.
    let mut s = [0.0f64; 5];
    let mut t = [0.0f64; 3];
    for (&x, &y) in xs.iter().zip(ys.iter()) {
        let x2 = x * x;
        s[0] += 1.0;
        s[1] += x;
        s[2] += x2;
        s[3] += x2 * x;
        s[4] += x2 * x2;
        t[0] += x2 * y;
        t[1] += x * y;
        t[2] += y;
    }

    let m = [[s[4], s[3], s[2]], [s[3], s[2], s[1]], [s[2], s[1], s[0]]];
    solve_3x3(&m, &t)
}
