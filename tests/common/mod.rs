//! Synthetic four-year scene series over a 4x4 grid.
//!
//! Each pixel follows one backscatter pattern; every period of every year
//! has exactly one scene, three days after the period start.

#![allow(dead_code)]

use chrono::Duration;
use ndarray::Array2;
use sarflood::core::period_window_starts;
use sarflood::{
    AcquisitionMode, BoundingBox, FloodConfig, Polarization, RasterGrid, RetryPolicy, Scene,
    SceneCollection,
};

pub const YEARS: [i32; 4] = [2020, 2021, 2022, 2023];
pub const WET: f32 = -20.0;
pub const DRY: f32 = -5.0;

#[derive(Debug, Clone, Copy)]
pub enum Pattern {
    /// Water in every period
    Always,
    /// Never water
    Never,
    /// Water at period 5 of 2022 and 2023
    RecurringPeriod5,
    /// Water at period 5 of 2023 only
    Only2023Period5,
    /// Water through all of 2023, dry before
    Whole2023,
    /// Water in 2023 before period 5
    Early2023,
    /// No valid samples
    NoData,
    /// Water except the first period of 2020
    AlmostAlways,
}

/// Row-major layout of the 4x4 test grid
pub const LAYOUT: [[Pattern; 4]; 4] = [
    [Pattern::Always, Pattern::Always, Pattern::Never, Pattern::Never],
    [Pattern::RecurringPeriod5, Pattern::RecurringPeriod5, Pattern::Only2023Period5, Pattern::Only2023Period5],
    [Pattern::Whole2023, Pattern::Whole2023, Pattern::Early2023, Pattern::Early2023],
    [Pattern::NoData, Pattern::NoData, Pattern::AlmostAlways, Pattern::AlmostAlways],
];

pub fn backscatter(pattern: Pattern, year: i32, period: usize) -> f32 {
    let wet = match pattern {
        Pattern::Always => true,
        Pattern::Never => false,
        Pattern::RecurringPeriod5 => period == 5 && (year == 2022 || year == 2023),
        Pattern::Only2023Period5 => period == 5 && year == 2023,
        Pattern::Whole2023 => year == 2023,
        Pattern::Early2023 => year == 2023 && period < 5,
        Pattern::NoData => return f32::NAN,
        Pattern::AlmostAlways => !(year == 2020 && period == 0),
    };
    if wet {
        WET
    } else {
        DRY
    }
}

pub fn grid() -> RasterGrid {
    RasterGrid::with_pixel_size(4, 4, 10.0)
}

pub fn scenes_for(years: &[i32]) -> Vec<Scene> {
    let mut scenes = Vec::new();
    for &year in years {
        let starts = period_window_starts(year, 5, 10, 2).unwrap();
        for (period, start) in starts.into_iter().enumerate() {
            let image = Array2::from_shape_fn((4, 4), |(i, j)| backscatter(LAYOUT[i][j], year, period));
            scenes.push(Scene {
                acquired: start + Duration::days(3),
                footprint: BoundingBox { min_lon: 76.3, max_lon: 76.4, min_lat: 9.4, max_lat: 9.5 },
                polarization: Polarization::VV,
                mode: AcquisitionMode::IW,
                backscatter: image,
            });
        }
    }
    scenes
}

pub fn source() -> SceneCollection {
    SceneCollection::new(scenes_for(&YEARS))
}

pub fn config() -> FloodConfig {
    FloodConfig {
        years: YEARS.to_vec(),
        threshold: -16.0,
        week_freq: 0.3,
        year_freq: 0.8,
        selected_year: 2023,
        selected_period: 5,
        retry: RetryPolicy::none(),
        ..FloodConfig::default()
    }
}
