//! Run configuration
//!
//! Every stage receives its thresholds and window bounds explicitly from a
//! `FloodConfig` value; nothing is read from global state. JSON keys are
//! camelCase (`monsoonStart`, `perennialThreshold`, `weekFreq`, ...).

use crate::types::{AcquisitionMode, FloodError, FloodResult, Polarization};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Denominator used for the per-year water frequency of the selected year.
///
/// `AllYears` divides by the summed period count of every configured year,
/// and is the default. `SelectedYear` divides by the
/// selected year's own period count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum YearFrequencyDenominator {
    #[default]
    AllYears,
    SelectedYear,
}

/// Retry schedule for transient acquisition failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// No retries and no waiting
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: 0,
            backoff_multiplier: 1.0,
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        let millis = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(millis.max(0.0).round() as u64)
    }
}

/// Complete configuration for compositing, classification and the ROC sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FloodConfig {
    // Time parameters
    pub years: Vec<i32>,
    /// Inclusive first month of the active window
    pub monsoon_start: u32,
    /// Inclusive last month of the active window
    pub monsoon_end: u32,
    pub period_weeks: u32,

    // Classification thresholds
    /// Backscatter cutoff in dB; below it a pixel is water
    pub threshold: f32,
    pub perennial_threshold: f64,
    pub week_freq: f64,
    pub year_freq: f64,
    pub year_frequency_denominator: YearFrequencyDenominator,

    // Sweep
    pub week_freq_list: Vec<f64>,
    pub year_freq_list: Vec<f64>,
    /// Backscatter cutoffs to sweep (dB); each one re-thresholds the composites
    pub threshold_list: Vec<f32>,
    /// Perennial thresholds to sweep; each one rebuilds the baseline
    pub perennial_threshold_list: Vec<f64>,
    pub selected_year: i32,
    pub selected_period: usize,

    // Batch classification over year x period targets
    pub batch_years: Vec<i32>,
    pub batch_periods: Vec<usize>,

    // Post filtering
    pub min_area_sqm: f64,
    pub dilation_radius_m: f64,

    // Scene handling
    pub speckle_filter: bool,
    pub speckle_window: usize,
    pub polarization: Polarization,
    pub acquisition_mode: AcquisitionMode,
    pub retry: RetryPolicy,
}

impl Default for FloodConfig {
    fn default() -> Self {
        Self {
            years: (2018..=2024).collect(),
            monsoon_start: 5,
            monsoon_end: 10,
            period_weeks: 2,
            threshold: -16.0,
            perennial_threshold: 0.95,
            week_freq: 0.3,
            year_freq: 0.3,
            year_frequency_denominator: YearFrequencyDenominator::AllYears,
            week_freq_list: Vec::new(),
            year_freq_list: Vec::new(),
            threshold_list: Vec::new(),
            perennial_threshold_list: Vec::new(),
            selected_year: 2023,
            selected_period: 5,
            batch_years: Vec::new(),
            batch_periods: Vec::new(),
            min_area_sqm: 50_000.0,
            dilation_radius_m: 25.0,
            speckle_filter: false,
            speckle_window: 3,
            polarization: Polarization::VV,
            acquisition_mode: AcquisitionMode::IW,
            retry: RetryPolicy::default(),
        }
    }
}

impl FloodConfig {
    pub fn from_json_str(json: &str) -> FloodResult<Self> {
        let config: FloodConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> FloodResult<Self> {
        log::info!("Reading configuration: {}", path.as_ref().display());
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Week frequencies to sweep; the scalar `weekFreq` when no list is given
    pub fn sweep_week_freqs(&self) -> Vec<f64> {
        if self.week_freq_list.is_empty() {
            vec![self.week_freq]
        } else {
            self.week_freq_list.clone()
        }
    }

    /// Year frequencies to sweep; the scalar `yearFreq` when no list is given
    pub fn sweep_year_freqs(&self) -> Vec<f64> {
        if self.year_freq_list.is_empty() {
            vec![self.year_freq]
        } else {
            self.year_freq_list.clone()
        }
    }

    /// Backscatter thresholds to sweep; the scalar `threshold` when no list is given
    pub fn sweep_thresholds(&self) -> Vec<f32> {
        if self.threshold_list.is_empty() {
            vec![self.threshold]
        } else {
            self.threshold_list.clone()
        }
    }

    /// Perennial thresholds to sweep; the scalar `perennialThreshold` when no list is given
    pub fn sweep_perennial_thresholds(&self) -> Vec<f64> {
        if self.perennial_threshold_list.is_empty() {
            vec![self.perennial_threshold]
        } else {
            self.perennial_threshold_list.clone()
        }
    }

    /// True when either threshold axis lists more than the scalar value
    pub fn sweeps_thresholds(&self) -> bool {
        !self.threshold_list.is_empty() || !self.perennial_threshold_list.is_empty()
    }

    /// (year, period) pairs of a batch run, year-major. Empty lists fall
    /// back to the selected year and period.
    pub fn batch_targets(&self) -> Vec<(i32, usize)> {
        let years = if self.batch_years.is_empty() {
            vec![self.selected_year]
        } else {
            self.batch_years.clone()
        };
        let periods = if self.batch_periods.is_empty() {
            vec![self.selected_period]
        } else {
            self.batch_periods.clone()
        };
        years
            .iter()
            .flat_map(|&year| periods.iter().map(move |&period| (year, period)))
            .collect()
    }

    pub fn validate(&self) -> FloodResult<()> {
        if self.years.is_empty() {
            return Err(config_error("years must not be empty"));
        }
        for (name, month) in [("monsoonStart", self.monsoon_start), ("monsoonEnd", self.monsoon_end)] {
            if !(1..=12).contains(&month) {
                return Err(config_error(&format!("{} must be a month in 1..=12, got {}", name, month)));
            }
        }
        if self.monsoon_start > self.monsoon_end {
            return Err(config_error(&format!(
                "monsoonStart ({}) is after monsoonEnd ({})",
                self.monsoon_start, self.monsoon_end
            )));
        }
        if self.period_weeks == 0 {
            return Err(config_error("periodWeeks must be at least 1"));
        }
        if !self.threshold.is_finite() || self.threshold_list.iter().any(|t| !t.is_finite()) {
            return Err(config_error("threshold and thresholdList must hold finite dB values"));
        }
        check_fraction("perennialThreshold", self.perennial_threshold)?;
        check_fraction("weekFreq", self.week_freq)?;
        check_fraction("yearFreq", self.year_freq)?;
        for value in &self.week_freq_list {
            check_fraction("weekFreqList", *value)?;
        }
        for value in &self.year_freq_list {
            check_fraction("yearFreqList", *value)?;
        }
        for value in &self.perennial_threshold_list {
            check_fraction("perennialThresholdList", *value)?;
        }
        if !self.years.contains(&self.selected_year) {
            return Err(config_error(&format!(
                "selectedYear {} is not one of the configured years {:?}",
                self.selected_year, self.years
            )));
        }
        if let Some(year) = self.batch_years.iter().find(|year| !self.years.contains(year)) {
            return Err(config_error(&format!(
                "batchYears entry {} is not one of the configured years {:?}",
                year, self.years
            )));
        }
        if !(self.min_area_sqm >= 0.0) || !(self.dilation_radius_m >= 0.0) {
            return Err(config_error("minAreaSqm and dilationRadiusM must be non-negative"));
        }
        if self.speckle_filter && (self.speckle_window < 3 || self.speckle_window % 2 == 0) {
            return Err(config_error(&format!(
                "speckleWindow must be odd and at least 3, got {}",
                self.speckle_window
            )));
        }
        Ok(())
    }
}

fn config_error(message: &str) -> FloodError {
    FloodError::Configuration(message.to_string())
}

fn check_fraction(name: &str, value: f64) -> FloodResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(config_error(&format!("{} must lie in [0, 1], got {}", name, value)))
    }
}
