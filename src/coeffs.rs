// coeffs.rs — smoothing-filter coefficient generation.
//
// Pure CPU code: produces the normalized 2D gaussian coefficient table
// that the smoothing filter consumes as a read-only device buffer. No
// GPU types appear here, which keeps the whole module unit-testable
// without a device.

use crate::error::FilterError;

/// Compute a normalized 2D gaussian coefficient table.
///
/// Returns a row-major `kernel_size × kernel_size` array where entry
/// `(i, j)` (offsets measured from the center) is
/// `exp(-(i² + j²) / (2σ²))`, with the whole table divided by its sum so
/// the coefficients total exactly 1. All entries are non-negative and the
/// table is symmetric under 180° rotation.
///
/// # Errors
/// `kernel_size` must be odd and positive (a gaussian window needs a
/// center tap) and `sigma` strictly positive; anything else is
/// [`FilterError::InvalidCoefficients`].
pub fn gaussian_coefficients(kernel_size: u32, sigma: f32) -> Result<Vec<f32>, FilterError> {
    if kernel_size == 0 || kernel_size % 2 == 0 || sigma <= 0.0 {
        return Err(FilterError::InvalidCoefficients { kernel_size, sigma });
    }

    let k = kernel_size as usize;
    let half = (kernel_size / 2) as i32;
    let two_sigma_sq = 2.0 * sigma * sigma;

    let mut coeffs = vec![0.0f32; k * k];
    let mut sum = 0.0f32;
    for i in -half..=half {
        for j in -half..=half {
            let value = (-((i * i + j * j) as f32) / two_sigma_sq).exp();
            coeffs[(i + half) as usize * k + (j + half) as usize] = value;
            sum += value;
        }
    }

    for value in &mut coeffs {
        *value /= sum;
    }

    Ok(coeffs)
}
