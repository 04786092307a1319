use crate::core::area_filter::remove_small_regions;
use crate::types::{FloodError, FloodResult, Raster, RasterGrid};
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

/// Pixel counts of a predicted flood raster against a reference
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionCounts {
    pub true_positive: u64,
    pub false_positive: u64,
    pub false_negative: u64,
    pub true_negative: u64,
}

impl ConfusionCounts {
    /// TP / (TP + FN), undefined without reference flood pixels
    pub fn tpr(&self) -> Option<f64> {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }

    /// FP / (FP + TN), undefined without reference dry pixels
    pub fn fpr(&self) -> Option<f64> {
        ratio(self.false_positive, self.false_positive + self.true_negative)
    }

    pub fn total(&self) -> u64 {
        self.true_positive + self.false_positive + self.false_negative + self.true_negative
    }
}

fn ratio(numerator: u64, denominator: u64) -> Option<f64> {
    if denominator == 0 {
        None
    } else {
        Some(numerator as f64 / denominator as f64)
    }
}

/// Ground-truth flood extent with the area of interest it is valid for
#[derive(Debug, Clone)]
pub struct ReferenceRaster {
    flood: Raster<bool>,
    footprint: Array2<bool>,
}

impl ReferenceRaster {
    /// Reference valid over the whole grid
    pub fn new(flood: Raster<bool>) -> Self {
        let footprint = Array2::from_elem(flood.dim(), true);
        Self { flood, footprint }
    }

    /// Flood wherever the categorical reference equals `flood_value`
    pub fn from_categorical(reference: &Raster<u8>, flood_value: u8) -> Self {
        Self::new(reference.map(|&v| v == flood_value))
    }

    /// Restrict evaluation to `footprint`
    pub fn with_footprint(mut self, footprint: Array2<bool>) -> FloodResult<Self> {
        if footprint.dim() != self.flood.dim() {
            return Err(FloodError::Configuration(format!(
                "footprint shape {:?} does not match reference shape {:?}",
                footprint.dim(),
                self.flood.dim()
            )));
        }
        self.footprint = footprint;
        Ok(self)
    }

    /// Drop reference flood regions smaller than `min_area_sqm`
    pub fn filtered_by_area(&self, min_area_sqm: f64) -> Self {
        Self {
            flood: remove_small_regions(&self.flood, min_area_sqm),
            footprint: self.footprint.clone(),
        }
    }

    pub fn flood(&self) -> &Raster<bool> {
        &self.flood
    }

    pub fn footprint(&self) -> &Array2<bool> {
        &self.footprint
    }
}

/// Compares predicted flood rasters against one reference
pub struct ConfusionEvaluator<'a> {
    reference: &'a ReferenceRaster,
}

impl<'a> ConfusionEvaluator<'a> {
    pub fn new(reference: &'a ReferenceRaster) -> Self {
        Self { reference }
    }

    pub fn reference_grid(&self) -> &'a RasterGrid {
        self.reference.flood.grid()
    }

    pub fn evaluate(&self, predicted: &Raster<bool>) -> FloodResult<ConfusionCounts> {
        self.reference
            .flood
            .grid()
            .ensure_matches(predicted.grid(), "reference vs prediction")?;

        let mut counts = ConfusionCounts::default();
        Zip::from(predicted.data())
            .and(self.reference.flood.data())
            .and(&self.reference.footprint)
            .for_each(|&pred, &truth, &inside| {
                if !inside {
                    return;
                }
                match (pred, truth) {
                    (true, true) => counts.true_positive += 1,
                    (true, false) => counts.false_positive += 1,
                    (false, true) => counts.false_negative += 1,
                    (false, false) => counts.true_negative += 1,
                }
            });

        Ok(counts)
    }
}
