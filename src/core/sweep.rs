//! Threshold sweep over (weekFreq, yearFreq) combinations, optionally
//! crossed with backscatter and perennial thresholds.
//!
//! Every combination is classified and evaluated independently from the same
//! immutable baseline, so points are computed in parallel and only joined for
//! sorting, AUC and best-point selection. Threshold pairs change the masks
//! and the baseline, so `ThresholdSweep` rebuilds both per pair from retained
//! composites and runs the frequency grid on each.

use crate::config::YearFrequencyDenominator;
use crate::core::area_filter::FloodExtentFilter;
use crate::core::baseline::{BaselineClassifier, BaselineParams};
use crate::core::compositor::YearComposites;
use crate::core::confusion::{ConfusionCounts, ConfusionEvaluator, ReferenceRaster};
use crate::core::period_classifier::{PeriodClassifier, PeriodTarget};
use crate::types::{FloodError, FloodResult, YearSeries};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

/// Backscatter cutoff and perennial occurrence threshold behind one baseline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdPair {
    pub threshold_db: f32,
    pub perennial_threshold: f64,
}

impl Default for ThresholdPair {
    fn default() -> Self {
        Self {
            threshold_db: -16.0,
            perennial_threshold: 0.95,
        }
    }
}

impl std::fmt::Display for ThresholdPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "threshold {} dB, perennialThreshold {}",
            self.threshold_db, self.perennial_threshold
        )
    }
}

/// Candidate thresholds; the sweep covers their Cartesian product.
///
/// Empty `thresholds` / `perennial_thresholds` keep the base pair of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterGrid {
    pub week_freqs: Vec<f64>,
    pub year_freqs: Vec<f64>,
    #[serde(default)]
    pub thresholds: Vec<f32>,
    #[serde(default)]
    pub perennial_thresholds: Vec<f64>,
}

impl ParameterGrid {
    pub fn new(week_freqs: Vec<f64>, year_freqs: Vec<f64>) -> Self {
        Self {
            week_freqs,
            year_freqs,
            thresholds: Vec::new(),
            perennial_thresholds: Vec::new(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: Vec<f32>, perennial_thresholds: Vec<f64>) -> Self {
        self.thresholds = thresholds;
        self.perennial_thresholds = perennial_thresholds;
        self
    }

    /// All (weekFreq, yearFreq) pairs, week-major
    pub fn combinations(&self) -> Vec<(f64, f64)> {
        self.week_freqs
            .iter()
            .flat_map(|&w| self.year_freqs.iter().map(move |&y| (w, y)))
            .collect()
    }

    /// Backscatter thresholds to sweep; `base` when none are listed
    pub fn threshold_values(&self, base: f32) -> Vec<f32> {
        if self.thresholds.is_empty() {
            vec![base]
        } else {
            self.thresholds.clone()
        }
    }

    /// Perennial thresholds to sweep; `base` when none are listed
    pub fn perennial_values(&self, base: f64) -> Vec<f64> {
        if self.perennial_thresholds.is_empty() {
            vec![base]
        } else {
            self.perennial_thresholds.clone()
        }
    }

    /// Threshold pairs, threshold-major
    pub fn threshold_pairs(&self, base: ThresholdPair) -> Vec<ThresholdPair> {
        let perennials = self.perennial_values(base.perennial_threshold);
        self.threshold_values(base.threshold_db)
            .into_iter()
            .flat_map(|threshold_db| {
                perennials.iter().map(move |&perennial_threshold| ThresholdPair {
                    threshold_db,
                    perennial_threshold,
                })
            })
            .collect()
    }

    /// Number of evaluated points, every axis included
    pub fn len(&self) -> usize {
        self.week_freqs.len()
            * self.year_freqs.len()
            * self.thresholds.len().max(1)
            * self.perennial_thresholds.len().max(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One evaluated combination
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RocPoint {
    pub threshold_db: f32,
    pub perennial_threshold: f64,
    pub week_freq: f64,
    pub year_freq: f64,
    /// `None` when the reference has no flood pixels
    pub tpr: Option<f64>,
    /// `None` when the reference has no dry pixels
    pub fpr: Option<f64>,
    pub counts: ConfusionCounts,
}

impl RocPoint {
    /// Point at the default threshold pair
    pub fn from_counts(week_freq: f64, year_freq: f64, counts: ConfusionCounts) -> Self {
        let thresholds = ThresholdPair::default();
        Self {
            threshold_db: thresholds.threshold_db,
            perennial_threshold: thresholds.perennial_threshold,
            week_freq,
            year_freq,
            tpr: counts.tpr(),
            fpr: counts.fpr(),
            counts,
        }
    }

    pub fn with_thresholds(mut self, thresholds: ThresholdPair) -> Self {
        self.threshold_db = thresholds.threshold_db;
        self.perennial_threshold = thresholds.perennial_threshold;
        self
    }

    pub fn thresholds(&self) -> ThresholdPair {
        ThresholdPair {
            threshold_db: self.threshold_db,
            perennial_threshold: self.perennial_threshold,
        }
    }

    pub fn is_defined(&self) -> bool {
        self.tpr.is_some() && self.fpr.is_some()
    }

    /// TPR − FPR, when both rates are defined
    pub fn youden_index(&self) -> Option<f64> {
        Some(self.tpr? - self.fpr?)
    }
}

/// A grid point that produced no ROC point
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedCombination {
    pub thresholds: ThresholdPair,
    pub week_freq: f64,
    pub year_freq: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestCombination {
    pub point: RocPoint,
    pub youden_index: f64,
}

/// Result of a sweep
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Points with both rates defined, ascending by FPR, then weekFreq,
    /// yearFreq, threshold and perennialThreshold
    pub points: Vec<RocPoint>,
    /// Points with an undefined rate; excluded from AUC and best selection
    pub undefined: Vec<RocPoint>,
    pub skipped: Vec<SkippedCombination>,
    pub auc: f64,
    pub best: Option<BestCombination>,
    /// True when the sweep stopped early; completed points are still reported
    pub cancelled: bool,
}

impl SweepReport {
    /// Assemble a report from unordered points
    pub fn from_points(
        points: Vec<RocPoint>,
        skipped: Vec<SkippedCombination>,
        cancelled: bool,
    ) -> Self {
        let (mut points, mut undefined): (Vec<RocPoint>, Vec<RocPoint>) =
            points.into_iter().partition(RocPoint::is_defined);

        points.sort_by(compare_points);
        undefined.sort_by(compare_parameters);

        let auc = trapezoidal_auc(&points);
        let best = select_best(&points);

        Self {
            points,
            undefined,
            skipped,
            auc,
            best,
            cancelled,
        }
    }
}

fn compare_points(a: &RocPoint, b: &RocPoint) -> Ordering {
    let fpr_a = a.fpr.unwrap_or(f64::NAN);
    let fpr_b = b.fpr.unwrap_or(f64::NAN);
    fpr_a.total_cmp(&fpr_b).then_with(|| compare_parameters(a, b))
}

fn compare_parameters(a: &RocPoint, b: &RocPoint) -> Ordering {
    a.week_freq
        .total_cmp(&b.week_freq)
        .then(a.year_freq.total_cmp(&b.year_freq))
        .then(a.threshold_db.total_cmp(&b.threshold_db))
        .then(a.perennial_threshold.total_cmp(&b.perennial_threshold))
}

/// Trapezoidal area under (FPR, TPR) over points already sorted by FPR.
/// Fewer than two points give 0.
pub fn trapezoidal_auc(points: &[RocPoint]) -> f64 {
    points
        .windows(2)
        .filter_map(|pair| {
            let (x0, y0) = (pair[0].fpr?, pair[0].tpr?);
            let (x1, y1) = (pair[1].fpr?, pair[1].tpr?);
            Some((x1 - x0) * (y0 + y1) / 2.0)
        })
        .fold(0.0, |area, trapezoid| area + trapezoid)
}

/// Maximum Youden index; the earliest point wins ties
pub fn select_best(points: &[RocPoint]) -> Option<BestCombination> {
    let mut best: Option<BestCombination> = None;
    for point in points {
        let Some(youden_index) = point.youden_index() else {
            continue;
        };
        if best.map_or(true, |current| youden_index > current.youden_index) {
            best = Some(BestCombination {
                point: *point,
                youden_index,
            });
        }
    }
    best
}

/// Cooperative cancellation flag shared with a running sweep
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, AtomicOrdering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(AtomicOrdering::SeqCst)
    }
}

/// Called with every completed point, from the evaluating thread
pub type PointObserver<'a> = &'a (dyn Fn(&RocPoint) + Sync);

enum Outcome {
    Point(RocPoint),
    Skipped(SkippedCombination),
    Cancelled,
}

/// Unsorted results of one or more grid runs
#[derive(Default)]
struct Collected {
    points: Vec<RocPoint>,
    skipped: Vec<SkippedCombination>,
    cancelled: bool,
}

impl Collected {
    fn merge(&mut self, other: Collected) {
        self.points.extend(other.points);
        self.skipped.extend(other.skipped);
        self.cancelled |= other.cancelled;
    }

    fn into_report(self, total: usize) -> SweepReport {
        if self.cancelled {
            log::warn!(
                "Sweep cancelled after {} of {} combinations",
                self.points.len() + self.skipped.len(),
                total
            );
        }

        let report = SweepReport::from_points(self.points, self.skipped, self.cancelled);
        for point in &report.undefined {
            log::warn!(
                "weekFreq {} yearFreq {} ({}): undefined rate (TPR {:?}, FPR {:?})",
                point.week_freq,
                point.year_freq,
                point.thresholds(),
                point.tpr,
                point.fpr
            );
        }
        log::info!(
            "Sweep finished: {} points, AUC {:.4}",
            report.points.len(),
            report.auc
        );
        report
    }
}

/// Runs the frequency axes of a `ParameterGrid` for one target period
/// against one baseline
pub struct SweepController<'a> {
    classifier: &'a PeriodClassifier<'a>,
    evaluator: ConfusionEvaluator<'a>,
    target: PeriodTarget,
    thresholds: ThresholdPair,
    post_filter: Option<FloodExtentFilter>,
    sequential: bool,
    observer: Option<PointObserver<'a>>,
}

impl<'a> SweepController<'a> {
    pub fn new(
        classifier: &'a PeriodClassifier<'a>,
        reference: &'a ReferenceRaster,
        target: PeriodTarget,
    ) -> Self {
        Self {
            classifier,
            evaluator: ConfusionEvaluator::new(reference),
            target,
            thresholds: ThresholdPair::default(),
            post_filter: None,
            sequential: false,
            observer: None,
        }
    }

    /// Thresholds the classifier's masks and baseline were built with
    pub fn with_thresholds(mut self, thresholds: ThresholdPair) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Filter each predicted flood raster before it is evaluated
    pub fn with_post_filter(mut self, filter: FloodExtentFilter) -> Self {
        self.post_filter = Some(filter);
        self
    }

    /// Evaluate combinations one at a time, in grid order
    pub fn sequential(mut self) -> Self {
        self.sequential = true;
        self
    }

    pub fn with_observer(mut self, observer: PointObserver<'a>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn run(&self, grid: &ParameterGrid, cancel: &CancellationToken) -> FloodResult<SweepReport> {
        let total = grid.combinations().len();
        Ok(self.collect(grid, cancel)?.into_report(total))
    }

    fn collect(&self, grid: &ParameterGrid, cancel: &CancellationToken) -> FloodResult<Collected> {
        // Checked once; a mismatch fails the whole run
        self.evaluator
            .reference_grid()
            .ensure_matches(self.classifier.grid(), "reference vs baseline")?;

        let combinations = grid.combinations();
        log::info!(
            "Sweeping {} combinations ({} weekFreq x {} yearFreq) for {} at {}",
            combinations.len(),
            grid.week_freqs.len(),
            grid.year_freqs.len(),
            self.target,
            self.thresholds
        );

        let outcomes: FloodResult<Vec<Outcome>> = if self.sequential {
            combinations
                .iter()
                .map(|&(w, y)| self.evaluate_point(w, y, cancel))
                .collect()
        } else {
            self.evaluate_all(&combinations, cancel)
        };

        let mut collected = Collected {
            points: Vec::with_capacity(combinations.len()),
            ..Collected::default()
        };
        for outcome in outcomes? {
            match outcome {
                Outcome::Point(point) => collected.points.push(point),
                Outcome::Skipped(skip) => collected.skipped.push(skip),
                Outcome::Cancelled => collected.cancelled = true,
            }
        }
        Ok(collected)
    }

    #[cfg(feature = "parallel")]
    fn evaluate_all(&self, combinations: &[(f64, f64)], cancel: &CancellationToken) -> FloodResult<Vec<Outcome>> {
        use rayon::prelude::*;
        combinations
            .par_iter()
            .map(|&(w, y)| self.evaluate_point(w, y, cancel))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn evaluate_all(&self, combinations: &[(f64, f64)], cancel: &CancellationToken) -> FloodResult<Vec<Outcome>> {
        combinations
            .iter()
            .map(|&(w, y)| self.evaluate_point(w, y, cancel))
            .collect()
    }

    fn evaluate_point(&self, week_freq: f64, year_freq: f64, cancel: &CancellationToken) -> FloodResult<Outcome> {
        if cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }

        match self.score(week_freq, year_freq) {
            Ok(point) => {
                log::debug!(
                    "weekFreq {} yearFreq {}: TPR {:?} FPR {:?}",
                    week_freq,
                    year_freq,
                    point.tpr,
                    point.fpr
                );
                if let Some(observer) = self.observer {
                    observer(&point);
                }
                Ok(Outcome::Point(point))
            }
            Err(err @ (FloodError::NotFound(_) | FloodError::Configuration(_))) => {
                log::warn!(
                    "Skipping weekFreq {} yearFreq {} ({}): {}",
                    week_freq,
                    year_freq,
                    self.thresholds,
                    err
                );
                Ok(Outcome::Skipped(SkippedCombination {
                    thresholds: self.thresholds,
                    week_freq,
                    year_freq,
                    reason: err.to_string(),
                }))
            }
            Err(err) => Err(err),
        }
    }

    fn score(&self, week_freq: f64, year_freq: f64) -> FloodResult<RocPoint> {
        let classification = self.classifier.classify(self.target, week_freq, year_freq)?;
        let predicted = match &self.post_filter {
            Some(filter) => filter.apply(&classification.flood),
            None => classification.flood,
        };
        let counts = self.evaluator.evaluate(&predicted)?;
        Ok(RocPoint::from_counts(week_freq, year_freq, counts).with_thresholds(self.thresholds))
    }
}

/// Sweeps threshold pairs as well as frequencies.
///
/// Each pair re-thresholds the retained composites, rebuilds the baseline
/// and then runs the frequency grid through a `SweepController`. Pairs are
/// processed one after another; the frequency grid of each pair fans out.
pub struct ThresholdSweep<'a> {
    composites: &'a [YearComposites],
    reference: &'a ReferenceRaster,
    target: PeriodTarget,
    denominator: YearFrequencyDenominator,
    base: ThresholdPair,
    post_filter: Option<FloodExtentFilter>,
}

impl<'a> ThresholdSweep<'a> {
    pub fn new(composites: &'a [YearComposites], reference: &'a ReferenceRaster, target: PeriodTarget) -> Self {
        Self {
            composites,
            reference,
            target,
            denominator: YearFrequencyDenominator::default(),
            base: ThresholdPair::default(),
            post_filter: None,
        }
    }

    pub fn with_denominator(mut self, denominator: YearFrequencyDenominator) -> Self {
        self.denominator = denominator;
        self
    }

    /// Values used for threshold axes the grid leaves empty
    pub fn with_base(mut self, base: ThresholdPair) -> Self {
        self.base = base;
        self
    }

    pub fn with_post_filter(mut self, filter: FloodExtentFilter) -> Self {
        self.post_filter = Some(filter);
        self
    }

    pub fn run(&self, grid: &ParameterGrid, cancel: &CancellationToken) -> FloodResult<SweepReport> {
        let pairs = grid.threshold_pairs(self.base);
        log::info!(
            "Sweeping {} threshold pairs x {} frequency combinations for {}",
            pairs.len(),
            grid.combinations().len(),
            self.target
        );

        let mut collected = Collected::default();
        'thresholds: for threshold_db in grid.threshold_values(self.base.threshold_db) {
            let series: Vec<YearSeries> = self
                .composites
                .iter()
                .map(|year| year.water_series(threshold_db))
                .collect();

            for perennial_threshold in grid.perennial_values(self.base.perennial_threshold) {
                if cancel.is_cancelled() {
                    collected.cancelled = true;
                    break 'thresholds;
                }

                let pair = ThresholdPair {
                    threshold_db,
                    perennial_threshold,
                };
                let baseline = BaselineClassifier::with_params(BaselineParams { perennial_threshold })
                    .classify(&series)?;
                let classifier = PeriodClassifier::new(&baseline.classification, &series)
                    .with_denominator(self.denominator);

                let mut controller = SweepController::new(&classifier, self.reference, self.target)
                    .with_thresholds(pair);
                if let Some(filter) = &self.post_filter {
                    controller = controller.with_post_filter(filter.clone());
                }
                collected.merge(controller.collect(grid, cancel)?);
            }
        }

        Ok(collected.into_report(grid.len()))
    }
}
