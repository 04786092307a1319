//! Gap-filled temporal composites per fixed-length period.
//!
//! Each year's active window is split into periods of `period_weeks` weeks.
//! A period with scenes gets the per-pixel mean backscatter of those scenes;
//! a period without scenes reuses the last composite that had real data.
//! Only when no composite has been observed yet in the year does the water
//! mask fall back to a constant 0 dB image, and that fallback never becomes
//! the carried-forward state.

use crate::config::{FloodConfig, RetryPolicy};
use crate::core::speckle_filter::{SpeckleFilter, SpeckleFilterParams, SpeckleFilterType};
use crate::io::scene_source::{fetch_with_retry, SceneSource};
use crate::types::{
    BackscatterImage, FloodError, FloodResult, PeriodMask, Raster, RasterGrid, Scene, WaterMask,
    YearSeries,
};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use ndarray::{Array2, Zip};
use std::borrow::Cow;
use std::sync::Arc;

/// Day of `monsoon_end` that closes the window (clamped to the month length)
const WINDOW_END_DAY: u32 = 30;

/// Compositing parameters
#[derive(Debug, Clone)]
pub struct CompositorParams {
    /// Water when the composite is below this value (dB)
    pub threshold_db: f32,
    /// Inclusive first month of the active window
    pub monsoon_start: u32,
    /// Inclusive last month of the active window
    pub monsoon_end: u32,
    pub period_weeks: u32,
    /// Optional per-scene smoothing before averaging
    pub speckle_filter: Option<SpeckleFilterType>,
    pub speckle_window: usize,
    pub retry: RetryPolicy,
}

impl Default for CompositorParams {
    fn default() -> Self {
        Self {
            threshold_db: -16.0,
            monsoon_start: 5,
            monsoon_end: 10,
            period_weeks: 2,
            speckle_filter: None,
            speckle_window: 3,
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&FloodConfig> for CompositorParams {
    fn from(config: &FloodConfig) -> Self {
        Self {
            threshold_db: config.threshold,
            monsoon_start: config.monsoon_start,
            monsoon_end: config.monsoon_end,
            period_weeks: config.period_weeks,
            speckle_filter: config.speckle_filter.then_some(SpeckleFilterType::Lee),
            speckle_window: config.speckle_window,
            retry: config.retry.clone(),
        }
    }
}

/// Start instants of every period in `year`'s active window.
///
/// The window runs from the 1st of `start_month` to day 30 of `end_month`;
/// the period count is the number of whole `period_weeks` spans that fit.
pub fn period_window_starts(
    year: i32,
    start_month: u32,
    end_month: u32,
    period_weeks: u32,
) -> FloodResult<Vec<DateTime<Utc>>> {
    if period_weeks == 0 {
        return Err(FloodError::Configuration("period length must be at least one week".to_string()));
    }
    let start = NaiveDate::from_ymd_opt(year, start_month, 1).ok_or_else(|| {
        FloodError::Configuration(format!("invalid window start {}-{:02}", year, start_month))
    })?;
    let end_day = WINDOW_END_DAY.min(days_in_month(year, end_month)?);
    let end = NaiveDate::from_ymd_opt(year, end_month, end_day).ok_or_else(|| {
        FloodError::Configuration(format!("invalid window end {}-{:02}-{:02}", year, end_month, end_day))
    })?;
    if end < start {
        return Err(FloodError::Configuration(format!(
            "window end {} precedes window start {}",
            end, start
        )));
    }

    let weeks = (end - start).num_days() as f64 / 7.0;
    let count = (weeks / period_weeks as f64).floor() as i64;
    let origin = start
        .and_hms_opt(0, 0, 0)
        .map(|midnight| Utc.from_utc_datetime(&midnight))
        .ok_or_else(|| FloodError::Configuration(format!("invalid window start {}", start)))?;

    Ok((0..count)
        .map(|i| origin + Duration::weeks(i * period_weeks as i64))
        .collect())
}

fn days_in_month(year: i32, month: u32) -> FloodResult<u32> {
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    next.and_then(|n| n.pred_opt())
        .map(|last| last.day())
        .ok_or_else(|| FloodError::Configuration(format!("invalid month {}-{:02}", year, month)))
}

/// Water indicator of a composite. NaN compares false, so missing pixels
/// are "not water".
pub fn water_mask(composite: &BackscatterImage, threshold_db: f32) -> WaterMask {
    composite.mapv(|v| v < threshold_db)
}

/// Composite state of one period after gap filling
#[derive(Debug, Clone)]
pub struct PeriodComposite {
    pub period_index: usize,
    pub start: DateTime<Utc>,
    /// True when scenes fell into this period
    pub has_new_data: bool,
    /// Latest observed composite up to this period; shared with the periods
    /// that carry it forward. `None` before the year's first observation.
    pub composite: Option<Arc<BackscatterImage>>,
}

/// Gap-filled composites of one year, kept so water masks can be derived
/// at any backscatter threshold without compositing again
#[derive(Debug, Clone)]
pub struct YearComposites {
    pub year: i32,
    pub grid: RasterGrid,
    pub periods: Vec<PeriodComposite>,
}

impl YearComposites {
    /// Period water masks at `threshold_db`. Periods without a composite
    /// use the 0 dB fallback image.
    pub fn water_series(&self, threshold_db: f32) -> YearSeries {
        let fallback = water_mask(&Array2::zeros(self.grid.dim()), threshold_db);
        let periods = self
            .periods
            .iter()
            .map(|period| {
                let water = match &period.composite {
                    Some(composite) => water_mask(composite, threshold_db),
                    None => fallback.clone(),
                };
                PeriodMask {
                    year: self.year,
                    period_index: period.period_index,
                    start: period.start,
                    has_new_data: period.has_new_data,
                    water: Raster::from_parts(self.grid, water),
                }
            })
            .collect();

        YearSeries {
            year: self.year,
            periods,
        }
    }
}

/// Per-year fold state: the last composite with real data and the periods so far
struct CarryForward {
    last_composite: Option<Arc<BackscatterImage>>,
    periods: Vec<PeriodComposite>,
}

/// Builds gap-filled period composites and water masks from a scene source
pub struct TemporalCompositor<'a, S: SceneSource + ?Sized> {
    params: CompositorParams,
    grid: RasterGrid,
    source: &'a S,
}

impl<'a, S: SceneSource + ?Sized> TemporalCompositor<'a, S> {
    pub fn new(params: CompositorParams, grid: RasterGrid, source: &'a S) -> Self {
        Self { params, grid, source }
    }

    pub fn params(&self) -> &CompositorParams {
        &self.params
    }

    pub fn period_starts(&self, year: i32) -> FloodResult<Vec<DateTime<Utc>>> {
        period_window_starts(
            year,
            self.params.monsoon_start,
            self.params.monsoon_end,
            self.params.period_weeks,
        )
    }

    /// Fetch and composite every period of one year
    pub fn composite_year(&self, year: i32) -> FloodResult<YearComposites> {
        let starts = self.period_starts(year)?;
        let period_length = Duration::weeks(self.params.period_weeks as i64);
        log::info!("Compositing {} periods for {}", starts.len(), year);

        let initial = CarryForward {
            last_composite: None,
            periods: Vec::with_capacity(starts.len()),
        };

        let state = starts.iter().enumerate().try_fold(initial, |mut state, (period_index, &start)| {
            let scenes = fetch_with_retry(self.source, start, start + period_length, &self.params.retry)?;
            let composite = self.mean_composite(&scenes)?;
            let has_new_data = composite.is_some();

            if let Some(composite) = composite {
                state.last_composite = Some(Arc::new(composite));
            } else if state.last_composite.is_some() {
                log::debug!("{} period {}: no scenes, carrying forward", year, period_index);
            } else {
                log::warn!(
                    "{} period {}: no scenes and nothing to carry forward, using 0 dB fallback",
                    year,
                    period_index
                );
            }

            state.periods.push(PeriodComposite {
                period_index,
                start,
                has_new_data,
                composite: state.last_composite.clone(),
            });
            Ok::<_, FloodError>(state)
        })?;

        let observed = state.periods.iter().filter(|p| p.has_new_data).count();
        log::info!("{}: {} of {} periods had new scenes", year, observed, state.periods.len());

        Ok(YearComposites {
            year,
            grid: self.grid,
            periods: state.periods,
        })
    }

    /// Composites of every year, in the order given
    pub fn composite_all(&self, years: &[i32]) -> FloodResult<Vec<YearComposites>> {
        #[cfg(feature = "parallel")]
        let composites: FloodResult<Vec<YearComposites>> = {
            use rayon::prelude::*;
            years.par_iter().map(|&year| self.composite_year(year)).collect()
        };

        #[cfg(not(feature = "parallel"))]
        let composites: FloodResult<Vec<YearComposites>> =
            years.iter().map(|&year| self.composite_year(year)).collect();

        composites
    }

    /// Period masks of one year at the configured threshold
    pub fn build_year(&self, year: i32) -> FloodResult<YearSeries> {
        Ok(self.composite_year(year)?.water_series(self.params.threshold_db))
    }

    /// Series of every year, in the order given
    pub fn build_all(&self, years: &[i32]) -> FloodResult<Vec<YearSeries>> {
        let composites = self.composite_all(years)?;
        Ok(composites
            .iter()
            .map(|year| year.water_series(self.params.threshold_db))
            .collect())
    }

    /// Per-pixel mean over the finite samples of all scenes; `None` without scenes
    fn mean_composite(&self, scenes: &[Scene]) -> FloodResult<Option<BackscatterImage>> {
        if scenes.is_empty() {
            return Ok(None);
        }

        let filter = self.params.speckle_filter.map(|filter_type| {
            let filter = SpeckleFilter::with_params(SpeckleFilterParams {
                window_size: self.params.speckle_window,
            });
            (filter, filter_type)
        });

        let dim = self.grid.dim();
        let mut sum = Array2::<f32>::zeros(dim);
        let mut count = Array2::<u32>::zeros(dim);

        for scene in scenes {
            if scene.backscatter.dim() != dim {
                return Err(FloodError::Configuration(format!(
                    "scene acquired {} has shape {:?}, expected {:?}",
                    scene.acquired,
                    scene.backscatter.dim(),
                    dim
                )));
            }

            let image: Cow<'_, BackscatterImage> = match &filter {
                Some((filter, filter_type)) => Cow::Owned(filter.apply_filter(&scene.backscatter, *filter_type)?),
                None => Cow::Borrowed(&scene.backscatter),
            };

            Zip::from(&mut sum)
                .and(&mut count)
                .and(&*image)
                .for_each(|s, c, &v| {
                    if v.is_finite() {
                        *s += v;
                        *c += 1;
                    }
                });
        }

        Zip::from(&mut sum).and(&count).for_each(|s, &c| {
            *s = if c > 0 { *s / c as f32 } else { f32::NAN };
        });

        log::debug!("Composited {} scenes", scenes.len());
        Ok(Some(sum))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::scene_source::SceneCollection;
    use crate::types::{AcquisitionMode, BoundingBox, Polarization};

    fn grid() -> RasterGrid {
        RasterGrid::with_pixel_size(2, 2, 30.0)
    }

    fn scene(year: i32, month: u32, day: u32, values: [f32; 4]) -> Scene {
        Scene {
            acquired: Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap(),
            footprint: BoundingBox { min_lon: 76.0, max_lon: 76.1, min_lat: 9.5, max_lat: 9.6 },
            polarization: Polarization::VV,
            mode: AcquisitionMode::IW,
            backscatter: Array2::from_shape_vec((2, 2), values.to_vec()).unwrap(),
        }
    }

    fn params() -> CompositorParams {
        CompositorParams {
            retry: RetryPolicy::none(),
            ..CompositorParams::default()
        }
    }

    #[test]
    fn test_monsoon_window_has_thirteen_periods() {
        let starts = period_window_starts(2023, 5, 10, 2).unwrap();
        assert_eq!(starts.len(), 13);
        assert_eq!(starts[0], Utc.with_ymd_and_hms(2023, 5, 1, 0, 0, 0).unwrap());
        assert_eq!(starts[1], Utc.with_ymd_and_hms(2023, 5, 15, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_window_end_clamped_for_february() {
        // Feb 1 .. Feb 28 spans 27 days, one whole two-week period
        let starts = period_window_starts(2023, 2, 2, 2).unwrap();
        assert_eq!(starts.len(), 1);
        assert_eq!(period_window_starts(2023, 2, 2, 1).unwrap().len(), 3);
        assert!(period_window_starts(2023, 5, 10, 0).is_err());
    }

    #[test]
    fn test_mean_composite_ignores_nan() {
        let source = SceneCollection::new(vec![
            scene(2023, 5, 2, [-20.0, -10.0, f32::NAN, f32::NAN]),
            scene(2023, 5, 9, [-10.0, -10.0, -18.0, f32::NAN]),
        ]);
        let compositor = TemporalCompositor::new(params(), grid(), &source);
        let series = compositor.build_year(2023).unwrap();

        let first = &series.periods[0];
        assert!(first.has_new_data);
        // mean(-20, -10) = -15 is not water; NaN-only pixel is not water
        let water = first.water.data();
        assert!(!water[[0, 0]]);
        assert!(!water[[0, 1]]);
        assert!(water[[1, 0]]);
        assert!(!water[[1, 1]]);
    }

    #[test]
    fn test_carry_forward_skips_zero_fallback() {
        // Period 0 and 1 empty, period 2 observed, periods 3.. empty
        let source = SceneCollection::new(vec![scene(2023, 6, 1, [-20.0, -5.0, -20.0, -5.0])]);
        let compositor = TemporalCompositor::new(params(), grid(), &source);
        let series = compositor.build_year(2023).unwrap();

        assert_eq!(series.len(), 13);
        for period in &series.periods[..2] {
            assert!(!period.has_new_data);
            assert_eq!(period.water.count_true(), 0);
        }
        assert!(series.periods[2].has_new_data);
        for period in &series.periods[3..] {
            assert!(!period.has_new_data);
            assert_eq!(period.water.data(), series.periods[2].water.data());
        }
    }

    #[test]
    fn test_composites_rethreshold_without_refetching() {
        let source = SceneCollection::new(vec![scene(2023, 6, 1, [-20.0, -5.0, -20.0, -5.0])]);
        let compositor = TemporalCompositor::new(params(), grid(), &source);
        let composites = compositor.composite_year(2023).unwrap();

        assert_eq!(composites.periods.len(), 13);
        assert!(composites.periods[0].composite.is_none());
        // Carried periods share the observed composite
        let observed = composites.periods[2].composite.as_ref().unwrap();
        assert!(Arc::ptr_eq(observed, composites.periods[12].composite.as_ref().unwrap()));

        let strict = composites.water_series(-16.0);
        let loose = composites.water_series(-3.0);
        assert_eq!(strict.periods[2].water.count_true(), 2);
        assert_eq!(loose.periods[2].water.count_true(), 4);
        assert_eq!(loose.periods[0].water.count_true(), 0);
        assert_eq!(strict.periods[5].water, strict.periods[2].water);

        // Same masks as the direct build at the configured threshold
        let direct = compositor.build_year(2023).unwrap();
        assert_eq!(direct.periods[7].water, strict.periods[7].water);
    }

    #[test]
    fn test_scene_shape_mismatch() {
        let mut bad = scene(2023, 5, 2, [-20.0; 4]);
        bad.backscatter = Array2::from_elem((3, 3), -20.0);
        let source = SceneCollection::new(vec![bad]);
        let compositor = TemporalCompositor::new(params(), grid(), &source);

        assert!(matches!(compositor.build_year(2023), Err(FloodError::Configuration(_))));
    }
}
