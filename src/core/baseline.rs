use crate::types::{
    ClassificationRaster, FloodError, FloodResult, Raster, RasterGrid, WaterClass, YearSeries,
};
use ndarray::{Array2, Zip};

/// Baseline classification parameters
#[derive(Debug, Clone)]
pub struct BaselineParams {
    /// Minimum water occurrence (fraction of all periods) for perennial water
    pub perennial_threshold: f64,
}

impl Default for BaselineParams {
    fn default() -> Self {
        Self {
            perennial_threshold: 0.95,
        }
    }
}

/// Multi-year water occurrence and the permanent/never-water classification
/// derived from it
#[derive(Debug, Clone)]
pub struct Baseline {
    /// Fraction of all periods of all years in which each pixel was water
    pub occurrence: Raster<f64>,
    /// Perennial (1), non-water (2) or unclassified (0)
    pub classification: ClassificationRaster,
    pub total_periods: usize,
}

/// Classifies perennial water and never-water pixels over every configured year
pub struct BaselineClassifier {
    params: BaselineParams,
}

impl BaselineClassifier {
    pub fn new() -> Self {
        Self {
            params: BaselineParams::default(),
        }
    }

    pub fn with_params(params: BaselineParams) -> Self {
        Self { params }
    }

    pub fn classify(&self, series: &[YearSeries]) -> FloodResult<Baseline> {
        let grid = common_grid(series)?;
        let total_periods: usize = series.iter().map(YearSeries::len).sum();
        if total_periods == 0 {
            return Err(FloodError::Processing(
                "No periods available for the baseline classification".to_string(),
            ));
        }

        let mut water_count = Array2::<u32>::zeros(grid.dim());
        for period in series.iter().flat_map(|s| s.periods.iter()) {
            Zip::from(&mut water_count)
                .and(period.water.data())
                .for_each(|count, &water| {
                    if water {
                        *count += 1;
                    }
                });
        }

        let occurrence = water_count.mapv(|count| count as f64 / total_periods as f64);

        // Never-water is written second, so it wins wherever both tests pass
        let perennial_threshold = self.params.perennial_threshold;
        let mut classification = Array2::from_elem(grid.dim(), WaterClass::Unclassified.code());
        Zip::from(&mut classification)
            .and(&occurrence)
            .for_each(|code, &occ| {
                if occ >= perennial_threshold {
                    *code = WaterClass::Perennial.code();
                }
            });
        Zip::from(&mut classification)
            .and(&occurrence)
            .for_each(|code, &occ| {
                if occ == 0.0 {
                    *code = WaterClass::NonWater.code();
                }
            });

        let perennial = classification.iter().filter(|&&c| c == WaterClass::Perennial.code()).count();
        let non_water = classification.iter().filter(|&&c| c == WaterClass::NonWater.code()).count();
        log::info!(
            "Baseline over {} periods: {} perennial, {} non-water, {} unclassified pixels",
            total_periods,
            perennial,
            non_water,
            grid.pixel_count() - perennial - non_water
        );

        Ok(Baseline {
            occurrence: Raster::from_parts(grid, occurrence),
            classification: Raster::from_parts(grid, classification),
            total_periods,
        })
    }
}

impl Default for BaselineClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Grid shared by every period mask; mismatches are configuration errors
pub(crate) fn common_grid(series: &[YearSeries]) -> FloodResult<RasterGrid> {
    let mut masks = series.iter().flat_map(|s| s.periods.iter());
    let first = masks.next().ok_or_else(|| {
        FloodError::Processing("No period masks to classify".to_string())
    })?;
    let grid = *first.water.grid();

    for mask in masks {
        grid.ensure_matches(
            mask.water.grid(),
            &format!("period {} of {}", mask.period_index, mask.year),
        )?;
    }
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PeriodMask;
    use chrono::{TimeZone, Utc};
    use ndarray::array;

    fn series(year: i32, masks: Vec<Array2<bool>>) -> YearSeries {
        let grid = RasterGrid::with_pixel_size(masks[0].nrows(), masks[0].ncols(), 10.0);
        YearSeries {
            year,
            periods: masks
                .into_iter()
                .enumerate()
                .map(|(i, water)| PeriodMask {
                    year,
                    period_index: i,
                    start: Utc.with_ymd_and_hms(year, 5, 1, 0, 0, 0).unwrap(),
                    has_new_data: true,
                    water: Raster::new(grid, water).unwrap(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_perennial_and_non_water() {
        let always = array![[true, true, false]];
        let sometimes = array![[true, false, false]];
        let input = vec![
            series(2022, vec![always.clone(), always.clone()]),
            series(2023, vec![always.clone(), sometimes]),
        ];

        let baseline = BaselineClassifier::new().classify(&input).unwrap();
        assert_eq!(baseline.total_periods, 4);
        assert_eq!(baseline.occurrence.data()[[0, 1]], 0.75);
        assert_eq!(baseline.classification.data(), &array![[1u8, 0, 2]]);
    }

    #[test]
    fn test_non_water_wins_with_zero_threshold() {
        let input = vec![series(2023, vec![array![[false, true]]])];
        let classifier = BaselineClassifier::with_params(BaselineParams {
            perennial_threshold: 0.0,
        });

        let baseline = classifier.classify(&input).unwrap();
        assert_eq!(baseline.classification.data(), &array![[2u8, 1]]);
    }

    #[test]
    fn test_empty_series_is_an_error() {
        assert!(BaselineClassifier::new().classify(&[]).is_err());
        let empty = YearSeries { year: 2023, periods: Vec::new() };
        assert!(matches!(
            BaselineClassifier::new().classify(&[empty]),
            Err(FloodError::Processing(_))
        ));
    }

    #[test]
    fn test_grid_mismatch_is_rejected() {
        let input = vec![
            series(2022, vec![array![[true, false]]]),
            series(2023, vec![array![[true, false, true]]]),
        ];
        assert!(matches!(
            BaselineClassifier::new().classify(&input),
            Err(FloodError::Configuration(_))
        ));
    }
}
