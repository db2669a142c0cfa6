//! Numeric sanitation at data boundaries.
//!
//! Encoder output is not guaranteed finite. Every place externally
//! supplied numbers enter the crate goes through this one primitive:
//! NaN becomes 0, +Inf becomes +1, -Inf becomes -1, and the caller gets
//! back a flag saying whether anything was scrubbed so it can log the
//! anomaly. Sanitation never fails.

use faer::Mat;

/// Scrub a single value. Finite values pass through untouched.
pub fn sanitize_value(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else if v == f64::INFINITY {
        1.0
    } else if v == f64::NEG_INFINITY {
        -1.0
    } else {
        v
    }
}

/// Scrub a slice in place. Returns true if any value was replaced.
pub fn sanitize_slice(values: &mut [f64]) -> bool {
    let mut dirty = false;
    for v in values.iter_mut() {
        if !v.is_finite() {
            *v = sanitize_value(*v);
            dirty = true;
        }
    }
    dirty
}

/// Scrub a matrix in place. Returns true if any value was replaced.
pub fn sanitize_mat(mat: &mut Mat<f64>) -> bool {
    let mut dirty = false;
    for i in 0..mat.nrows() {
        for j in 0..mat.ncols() {
            let v = mat.read(i, j);
            if !v.is_finite() {
                mat.write(i, j, sanitize_value(v));
                dirty = true;
            }
        }
    }
    dirty
}
