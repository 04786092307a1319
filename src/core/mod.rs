//! Core flood mapping stages

pub mod area_filter;
pub mod baseline;
pub mod compositor;
pub mod confusion;
pub mod period_classifier;
pub mod speckle_filter;
pub mod sweep;

// Re-export main types
pub use area_filter::{dilate, extent_mask, label_components, remove_small_regions, FloodExtentFilter};
pub use baseline::{Baseline, BaselineClassifier, BaselineParams};
pub use compositor::{
    period_window_starts, water_mask, CompositorParams, PeriodComposite, TemporalCompositor,
    YearComposites,
};
pub use confusion::{ConfusionCounts, ConfusionEvaluator, ReferenceRaster};
pub use period_classifier::{PeriodClassification, PeriodClassifier, PeriodFrequencies, PeriodTarget};
pub use speckle_filter::{SpeckleFilter, SpeckleFilterParams, SpeckleFilterType};
pub use sweep::{
    select_best, trapezoidal_auc, BestCombination, CancellationToken, ParameterGrid, PointObserver,
    RocPoint, SkippedCombination, SweepController, SweepReport, ThresholdPair, ThresholdSweep,
};
