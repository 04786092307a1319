use crate::types::{FloodError, FloodResult};
use ndarray::{Array2, Zip};

/// Speckle filtering parameters
#[derive(Debug, Clone)]
pub struct SpeckleFilterParams {
    /// Filter window size (must be odd)
    pub window_size: usize,
}

impl Default for SpeckleFilterParams {
    fn default() -> Self {
        Self {
            window_size: 3, // 3x3 window
        }
    }
}

/// Available speckle filter types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeckleFilterType {
    /// Mean filter (simple averaging)
    Mean,
    /// Lee filter (adaptive)
    Lee,
}

/// Speckle filter applied to single scenes before compositing.
///
/// Works on dB backscatter: every finite sample in the window takes part,
/// NaN pixels stay NaN.
pub struct SpeckleFilter {
    params: SpeckleFilterParams,
}

impl SpeckleFilter {
    /// Create a new speckle filter with default parameters
    pub fn new() -> Self {
        Self {
            params: SpeckleFilterParams::default(),
        }
    }

    /// Create a speckle filter with custom parameters
    pub fn with_params(params: SpeckleFilterParams) -> Self {
        Self { params }
    }

    /// Apply speckle filtering to a backscatter image
    pub fn apply_filter(
        &self,
        image: &Array2<f32>,
        filter_type: SpeckleFilterType,
    ) -> FloodResult<Array2<f32>> {
        log::debug!("Applying {:?} speckle filter, window {}", filter_type, self.params.window_size);

        // Validate input
        let (height, width) = image.dim();
        if height < self.params.window_size || width < self.params.window_size {
            return Err(FloodError::Processing(format!(
                "Image size {}x{} is too small for window size {}",
                height, width, self.params.window_size
            )));
        }

        // Validate window size is odd
        if self.params.window_size % 2 == 0 {
            return Err(FloodError::Processing(
                "Window size must be odd".to_string()
            ));
        }

        let half_window = self.params.window_size / 2;
        let mut filtered = Array2::<f32>::zeros((height, width));

        #[cfg(feature = "parallel")]
        Zip::indexed(&mut filtered).par_for_each(|(i, j), out| {
            *out = Self::filter_pixel(image, i, j, half_window, filter_type);
        });

        #[cfg(not(feature = "parallel"))]
        Zip::indexed(&mut filtered).for_each(|(i, j), out| {
            *out = Self::filter_pixel(image, i, j, half_window, filter_type);
        });

        Ok(filtered)
    }

    fn filter_pixel(
        image: &Array2<f32>,
        i: usize,
        j: usize,
        half_window: usize,
        filter_type: SpeckleFilterType,
    ) -> f32 {
        let center_value = image[[i, j]];
        if !center_value.is_finite() {
            return center_value;
        }

        let (local_mean, local_variance) = match Self::local_statistics(image, i, j, half_window) {
            Some(stats) => stats,
            None => return center_value,
        };

        match filter_type {
            SpeckleFilterType::Mean => local_mean,
            SpeckleFilterType::Lee => {
                let mean_sq = local_mean * local_mean;
                if mean_sq <= f32::EPSILON {
                    return center_value;
                }
                // Weight grows with the local variance-to-mean ratio
                let ratio = local_variance / mean_sq;
                let weight = ratio / (ratio + 1.0);
                local_mean + weight * (center_value - local_mean)
            }
        }
    }

    /// Mean and sample variance of the finite samples in the window
    fn local_statistics(
        image: &Array2<f32>,
        center_i: usize,
        center_j: usize,
        half_window: usize,
    ) -> Option<(f32, f32)> {
        let (height, width) = image.dim();
        let mut sum = 0.0f64;
        let mut sum_sq = 0.0f64;
        let mut count = 0usize;

        let i_start = center_i.saturating_sub(half_window);
        let i_end = (center_i + half_window + 1).min(height);
        let j_start = center_j.saturating_sub(half_window);
        let j_end = (center_j + half_window + 1).min(width);

        for i in i_start..i_end {
            for j in j_start..j_end {
                let pixel_val = image[[i, j]];
                if pixel_val.is_finite() {
                    let v = pixel_val as f64;
                    sum += v;
                    sum_sq += v * v;
                    count += 1;
                }
            }
        }

        if count == 0 {
            return None;
        }
        let n = count as f64;
        let mean = sum / n;
        // n - 1 denominator; a lone sample has no spread
        let variance = if count > 1 {
            (sum_sq - n * mean * mean) / (n - 1.0)
        } else {
            0.0
        };
        Some((mean as f32, variance.max(0.0) as f32))
    }
}

impl Default for SpeckleFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_uniform_image_is_unchanged() {
        let image = Array2::from_elem((5, 5), -18.0f32);
        let filter = SpeckleFilter::new();

        for filter_type in [SpeckleFilterType::Mean, SpeckleFilterType::Lee] {
            let filtered = filter.apply_filter(&image, filter_type).unwrap();
            for &v in filtered.iter() {
                assert!((v + 18.0).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_lee_smooths_towards_local_mean() {
        let mut image = Array2::from_elem((5, 5), -20.0f32);
        image[[2, 2]] = -10.0;

        let filtered = SpeckleFilter::new()
            .apply_filter(&image, SpeckleFilterType::Lee)
            .unwrap();

        let local_mean = (8.0 * -20.0 - 10.0) / 9.0;
        assert!(filtered[[2, 2]] < -10.0);
        assert!(filtered[[2, 2]] > local_mean);
    }

    #[test]
    fn test_lee_uses_sample_variance() {
        let mut image = Array2::from_elem((5, 5), -20.0f32);
        image[[2, 2]] = -10.0;

        let filtered = SpeckleFilter::new()
            .apply_filter(&image, SpeckleFilterType::Lee)
            .unwrap();

        let window = [-20.0f64, -20.0, -20.0, -20.0, -10.0, -20.0, -20.0, -20.0, -20.0];
        let mean = window.iter().sum::<f64>() / 9.0;
        let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / 8.0;
        let ratio = variance / (mean * mean);
        let weight = ratio / (ratio + 1.0);
        let expected = mean + weight * (-10.0 - mean);

        assert_relative_eq!(filtered[[2, 2]] as f64, expected, epsilon = 1e-4);
    }

    #[test]
    fn test_nan_pixels_are_preserved() {
        let mut image = Array2::from_elem((3, 3), -15.0f32);
        image[[1, 1]] = f32::NAN;

        let filtered = SpeckleFilter::new()
            .apply_filter(&image, SpeckleFilterType::Mean)
            .unwrap();
        assert!(filtered[[1, 1]].is_nan());
        assert!((filtered[[0, 0]] + 15.0).abs() < 1e-5);
    }

    #[test]
    fn test_invalid_window() {
        let image = Array2::from_elem((5, 5), -15.0f32);

        let even = SpeckleFilter::with_params(SpeckleFilterParams { window_size: 4 });
        assert!(even.apply_filter(&image, SpeckleFilterType::Lee).is_err());

        let oversized = SpeckleFilter::with_params(SpeckleFilterParams { window_size: 7 });
        assert!(oversized.apply_filter(&image, SpeckleFilterType::Lee).is_err());
    }
}
