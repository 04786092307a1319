//! Config-driven end-to-end run: composite every year, build the baseline,
//! then sweep the thresholds for the selected period.

use crate::config::FloodConfig;
use crate::core::{
    Baseline, BaselineClassifier, BaselineParams, CancellationToken, CompositorParams,
    FloodExtentFilter, ParameterGrid, PeriodClassification, PeriodClassifier, PeriodTarget,
    ReferenceRaster, SweepController, SweepReport, TemporalCompositor, ThresholdPair,
    ThresholdSweep, YearComposites,
};
use crate::io::scene_source::SceneSource;
use crate::types::{FloodError, FloodResult, Raster, RasterGrid, WaterClass, YearSeries};

/// Everything a pipeline run produces
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Composites behind every mask, reusable at other thresholds
    pub composites: Vec<YearComposites>,
    /// Masks at the configured threshold
    pub series: Vec<YearSeries>,
    pub baseline: Baseline,
    pub report: SweepReport,
}

/// Classifications of a batch of (year, period) targets
#[derive(Debug, Clone, Default)]
pub struct BatchClassification {
    /// Successful targets, in batch order
    pub classifications: Vec<PeriodClassification>,
    /// Targets whose year or period does not exist
    pub missing: Vec<PeriodTarget>,
}

pub struct FloodPipeline {
    config: FloodConfig,
}

impl FloodPipeline {
    pub fn new(config: FloodConfig) -> FloodResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &FloodConfig {
        &self.config
    }

    pub fn target(&self) -> PeriodTarget {
        PeriodTarget::new(self.config.selected_year, self.config.selected_period)
    }

    /// Scalar thresholds of the configuration
    pub fn thresholds(&self) -> ThresholdPair {
        ThresholdPair {
            threshold_db: self.config.threshold,
            perennial_threshold: self.config.perennial_threshold,
        }
    }

    pub fn parameter_grid(&self) -> ParameterGrid {
        ParameterGrid::new(self.config.sweep_week_freqs(), self.config.sweep_year_freqs()).with_thresholds(
            self.config.threshold_list.clone(),
            self.config.perennial_threshold_list.clone(),
        )
    }

    /// Batch targets, year-major
    pub fn batch_targets(&self) -> Vec<PeriodTarget> {
        self.config
            .batch_targets()
            .into_iter()
            .map(|(year, period)| PeriodTarget::new(year, period))
            .collect()
    }

    pub fn build_composites<S: SceneSource + ?Sized>(
        &self,
        source: &S,
        grid: RasterGrid,
    ) -> FloodResult<Vec<YearComposites>> {
        let compositor = TemporalCompositor::new(CompositorParams::from(&self.config), grid, source);
        compositor.composite_all(&self.config.years)
    }

    pub fn build_series<S: SceneSource + ?Sized>(
        &self,
        source: &S,
        grid: RasterGrid,
    ) -> FloodResult<Vec<YearSeries>> {
        let compositor = TemporalCompositor::new(CompositorParams::from(&self.config), grid, source);
        compositor.build_all(&self.config.years)
    }

    pub fn build_baseline(&self, series: &[YearSeries]) -> FloodResult<Baseline> {
        BaselineClassifier::with_params(BaselineParams {
            perennial_threshold: self.config.perennial_threshold,
        })
        .classify(series)
    }

    fn classifier<'a>(&self, baseline: &'a Baseline, series: &'a [YearSeries]) -> PeriodClassifier<'a> {
        PeriodClassifier::new(&baseline.classification, series)
            .with_denominator(self.config.year_frequency_denominator)
    }

    /// Classification of the selected period at the scalar weekFreq / yearFreq
    pub fn classify_selected(
        &self,
        baseline: &Baseline,
        series: &[YearSeries],
    ) -> FloodResult<PeriodClassification> {
        self.classifier(baseline, series)
            .classify(self.target(), self.config.week_freq, self.config.year_freq)
    }

    /// Classify every batch target at the scalar weekFreq / yearFreq.
    ///
    /// Targets without a series or period are collected in `missing`; any
    /// other failure aborts the batch.
    pub fn classify_batch(
        &self,
        baseline: &Baseline,
        series: &[YearSeries],
    ) -> FloodResult<BatchClassification> {
        let classifier = self.classifier(baseline, series);
        let targets = self.batch_targets();
        log::info!("Classifying {} batch targets", targets.len());

        let classify = |target: &PeriodTarget| -> FloodResult<Option<PeriodClassification>> {
            match classifier.classify(*target, self.config.week_freq, self.config.year_freq) {
                Ok(classification) => Ok(Some(classification)),
                Err(FloodError::NotFound(reason)) => {
                    log::warn!("Skipping batch target {}: {}", target, reason);
                    Ok(None)
                }
                Err(err) => Err(err),
            }
        };

        #[cfg(feature = "parallel")]
        let results: FloodResult<Vec<Option<PeriodClassification>>> = {
            use rayon::prelude::*;
            targets.par_iter().map(classify).collect()
        };

        #[cfg(not(feature = "parallel"))]
        let results: FloodResult<Vec<Option<PeriodClassification>>> =
            targets.iter().map(classify).collect();

        let mut batch = BatchClassification::default();
        for (target, result) in targets.into_iter().zip(results?) {
            match result {
                Some(classification) => batch.classifications.push(classification),
                None => batch.missing.push(target),
            }
        }
        Ok(batch)
    }

    /// Dilated, area-filtered seasonal and flood extent of a classification
    pub fn flood_extent(&self, classification: &PeriodClassification) -> Raster<bool> {
        FloodExtentFilter::from(&self.config).flood_extent(
            &classification.classification,
            &[WaterClass::Seasonal, WaterClass::Flood],
        )
    }

    /// Frequency sweep against one baseline built at the scalar thresholds
    pub fn sweep(
        &self,
        baseline: &Baseline,
        series: &[YearSeries],
        reference: &ReferenceRaster,
        cancel: &CancellationToken,
    ) -> FloodResult<SweepReport> {
        let classifier = self.classifier(baseline, series);
        SweepController::new(&classifier, reference, self.target())
            .with_thresholds(self.thresholds())
            .run(&self.parameter_grid(), cancel)
    }

    /// Sweep over every threshold pair as well as the frequencies
    pub fn threshold_sweep(
        &self,
        composites: &[YearComposites],
        reference: &ReferenceRaster,
        cancel: &CancellationToken,
    ) -> FloodResult<SweepReport> {
        ThresholdSweep::new(composites, reference, self.target())
            .with_denominator(self.config.year_frequency_denominator)
            .with_base(self.thresholds())
            .run(&self.parameter_grid(), cancel)
    }

    pub fn run<S: SceneSource + ?Sized>(
        &self,
        source: &S,
        grid: RasterGrid,
        reference: &ReferenceRaster,
        cancel: &CancellationToken,
    ) -> FloodResult<PipelineOutput> {
        log::info!(
            "Running flood pipeline for years {:?}, target {}",
            self.config.years,
            self.target()
        );

        let composites = self.build_composites(source, grid)?;
        let series: Vec<YearSeries> = composites
            .iter()
            .map(|year| year.water_series(self.config.threshold))
            .collect();
        let baseline = self.build_baseline(&series)?;
        let report = if self.config.sweeps_thresholds() {
            self.threshold_sweep(&composites, reference, cancel)?
        } else {
            self.sweep(&baseline, &series, reference, cancel)?
        };

        Ok(PipelineOutput {
            composites,
            series,
            baseline,
            report,
        })
    }
}
