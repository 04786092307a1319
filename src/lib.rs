//! sarflood: SAR surface water and flood classification
//!
//! Builds gap-filled multi-year water masks from Sentinel-1 backscatter,
//! classifies perennial, seasonal, flood and new perennial water for a
//! selected period, and scores the flood class against a reference raster
//! with an ROC sweep over the frequency and backscatter thresholds.

pub mod config;
pub mod core;
pub mod io;
pub mod pipeline;
pub mod types;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use config::{FloodConfig, RetryPolicy, YearFrequencyDenominator};
pub use pipeline::{BatchClassification, FloodPipeline, PipelineOutput};
pub use types::{
    AcquisitionMode, BackscatterImage, BoundingBox, ClassificationRaster, CoordinateSystem,
    FloodError, FloodResult, GeoTransform, PeriodMask, Polarization, Raster, RasterGrid, Scene,
    WaterClass, WaterMask, YearSeries,
};

pub use crate::core::{
    Baseline, BaselineClassifier, CancellationToken, ConfusionCounts, ConfusionEvaluator,
    FloodExtentFilter, ParameterGrid, PeriodClassification, PeriodClassifier, PeriodTarget,
    ReferenceRaster, RocPoint, SweepController, SweepReport, TemporalCompositor, ThresholdPair,
    ThresholdSweep, YearComposites,
};
pub use crate::io::{write_roc_csv, write_roc_csv_file, AcquisitionError, SceneCollection, SceneSource};
