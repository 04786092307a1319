//! Per-period classification into seasonal, flood and new perennial water.
//!
//! A working copy of the baseline is refined for one (year, period) target:
//! pixels dry in the target period become non-water, the remaining
//! unclassified pixels are split by how often they were wet at the same
//! period across all years and how often they were wet during the target
//! year. Every call builds a fresh raster; the baseline is never mutated.

use crate::config::YearFrequencyDenominator;
use crate::core::baseline::common_grid;
use crate::types::{
    ClassificationRaster, FloodError, FloodResult, PeriodMask, Raster, RasterGrid, WaterClass,
    YearSeries,
};
use ndarray::{Array2, Zip};

/// Year and period index being classified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeriodTarget {
    pub year: i32,
    pub period_index: usize,
}

impl PeriodTarget {
    pub fn new(year: i32, period_index: usize) -> Self {
        Self { year, period_index }
    }
}

impl std::fmt::Display for PeriodTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} period {}", self.year, self.period_index)
    }
}

/// Water frequency rasters for one target
#[derive(Debug, Clone)]
pub struct PeriodFrequencies {
    /// Share of configured years that were wet at the target period index
    pub this_period: Array2<f64>,
    /// Wet periods of the target year over the configured denominator
    pub this_year: Array2<f64>,
}

/// Classification output for one (target, weekFreq, yearFreq) combination
#[derive(Debug, Clone)]
pub struct PeriodClassification {
    pub target: PeriodTarget,
    pub week_freq: f64,
    pub year_freq: f64,
    pub classification: ClassificationRaster,
    /// Pixels classified as flood water
    pub flood: Raster<bool>,
}

impl PeriodClassification {
    pub fn count(&self, class: WaterClass) -> usize {
        let code = class.code();
        self.classification.data().iter().filter(|&&c| c == code).count()
    }
}

/// Refines the baseline for a selected period
pub struct PeriodClassifier<'a> {
    baseline: &'a ClassificationRaster,
    series: &'a [YearSeries],
    denominator: YearFrequencyDenominator,
}

impl<'a> PeriodClassifier<'a> {
    pub fn new(baseline: &'a ClassificationRaster, series: &'a [YearSeries]) -> Self {
        Self {
            baseline,
            series,
            denominator: YearFrequencyDenominator::default(),
        }
    }

    pub fn with_denominator(mut self, denominator: YearFrequencyDenominator) -> Self {
        self.denominator = denominator;
        self
    }

    /// Grid of the baseline being refined
    pub fn grid(&self) -> &'a RasterGrid {
        self.baseline.grid()
    }

    /// Mask of the target period; missing years or periods are `NotFound`
    pub fn selected_mask(&self, target: PeriodTarget) -> FloodResult<&'a PeriodMask> {
        let series = self
            .series
            .iter()
            .find(|s| s.year == target.year)
            .ok_or_else(|| FloodError::NotFound(format!("year {} has no series", target.year)))?;

        series.period(target.period_index).ok_or_else(|| {
            FloodError::NotFound(format!(
                "{} does not exist ({} periods)",
                target,
                series.len()
            ))
        })
    }

    pub fn frequencies(&self, target: PeriodTarget) -> FloodResult<PeriodFrequencies> {
        let grid = common_grid(self.series)?;
        let selected = self
            .series
            .iter()
            .find(|s| s.year == target.year)
            .ok_or_else(|| FloodError::NotFound(format!("year {} has no series", target.year)))?;

        let mut period_sum = Array2::<u32>::zeros(grid.dim());
        for mask in self.series.iter().filter_map(|s| s.period(target.period_index)) {
            accumulate(&mut period_sum, mask);
        }

        let mut year_sum = Array2::<u32>::zeros(grid.dim());
        for mask in &selected.periods {
            accumulate(&mut year_sum, mask);
        }

        let year_count = self.series.len() as f64;
        let year_denominator = match self.denominator {
            YearFrequencyDenominator::AllYears => self.series.iter().map(YearSeries::len).sum::<usize>(),
            YearFrequencyDenominator::SelectedYear => selected.len(),
        };
        if year_denominator == 0 {
            return Err(FloodError::Processing(format!(
                "no periods to normalize the yearly water frequency of {}",
                target.year
            )));
        }
        let year_denominator = year_denominator as f64;

        Ok(PeriodFrequencies {
            this_period: period_sum.mapv(|n| n as f64 / year_count),
            this_year: year_sum.mapv(|n| n as f64 / year_denominator),
        })
    }

    pub fn classify(
        &self,
        target: PeriodTarget,
        week_freq: f64,
        year_freq: f64,
    ) -> FloodResult<PeriodClassification> {
        for (name, value) in [("weekFreq", week_freq), ("yearFreq", year_freq)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(FloodError::Configuration(format!(
                    "{} must lie in [0, 1], got {}",
                    name, value
                )));
            }
        }

        let selected = self.selected_mask(target)?;
        self.baseline
            .grid()
            .ensure_matches(selected.water.grid(), "baseline vs period mask")?;
        let frequencies = self.frequencies(target)?;

        let unclassified = WaterClass::Unclassified.code();
        let mut codes = self.baseline.data().clone();

        // Dry in the target period
        Zip::from(&mut codes)
            .and(selected.water.data())
            .for_each(|code, &water| {
                if *code == unclassified && !water {
                    *code = WaterClass::NonWater.code();
                }
            });

        Zip::from(&mut codes)
            .and(&frequencies.this_period)
            .and(&frequencies.this_year)
            .for_each(|code, &period_freq, &year_freq_px| {
                if *code != unclassified {
                    return;
                }
                *code = if period_freq >= week_freq && year_freq_px < year_freq {
                    WaterClass::Seasonal.code()
                } else if period_freq < week_freq && year_freq_px < year_freq {
                    WaterClass::Flood.code()
                } else {
                    WaterClass::NewPerennial.code()
                };
            });

        let grid = *self.baseline.grid();
        let flood = codes.mapv(|code| code == WaterClass::Flood.code());
        let result = PeriodClassification {
            target,
            week_freq,
            year_freq,
            classification: Raster::from_parts(grid, codes),
            flood: Raster::from_parts(grid, flood),
        };

        log::debug!(
            "{} at weekFreq {} yearFreq {}: {} seasonal, {} flood, {} new perennial",
            target,
            week_freq,
            year_freq,
            result.count(WaterClass::Seasonal),
            result.count(WaterClass::Flood),
            result.count(WaterClass::NewPerennial)
        );

        Ok(result)
    }
}

fn accumulate(sum: &mut Array2<u32>, mask: &PeriodMask) {
    Zip::from(sum).and(mask.water.data()).for_each(|n, &water| {
        if water {
            *n += 1;
        }
    });
}
