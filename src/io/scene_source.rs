use crate::config::RetryPolicy;
use crate::types::{AcquisitionMode, FloodError, FloodResult, Polarization, Scene};
use chrono::{DateTime, Utc};

/// Failure reported by a scene source
#[derive(Debug, Clone, thiserror::Error)]
pub enum AcquisitionError {
    /// Worth retrying (timeouts, throttling, dropped connections)
    #[error("transient acquisition failure: {0}")]
    Transient(String),

    #[error("permanent acquisition failure: {0}")]
    Permanent(String),
}

/// Supplier of backscatter scenes, already filtered to one polarization and
/// acquisition mode and clipped to the area of interest.
pub trait SceneSource: Sync {
    /// Scenes acquired in the half-open window `[start, end)`
    fn scenes_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Scene>, AcquisitionError>;
}

/// In-memory scene time series
#[derive(Debug, Clone, Default)]
pub struct SceneCollection {
    scenes: Vec<Scene>,
}

impl SceneCollection {
    pub fn new(mut scenes: Vec<Scene>) -> Self {
        scenes.sort_by_key(|s| s.acquired);
        Self { scenes }
    }

    /// Keep only scenes matching the given polarization and mode
    pub fn filtered(scenes: Vec<Scene>, polarization: Polarization, mode: AcquisitionMode) -> Self {
        let total = scenes.len();
        let kept: Vec<Scene> = scenes
            .into_iter()
            .filter(|s| s.polarization == polarization && s.mode == mode)
            .collect();
        if kept.len() < total {
            log::debug!(
                "Dropped {} of {} scenes not matching {} / {:?}",
                total - kept.len(),
                total,
                polarization,
                mode
            );
        }
        Self::new(kept)
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

impl SceneSource for SceneCollection {
    fn scenes_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Scene>, AcquisitionError> {
        Ok(self
            .scenes
            .iter()
            .filter(|s| s.acquired >= start && s.acquired < end)
            .cloned()
            .collect())
    }
}

/// Fetch scenes for one window, retrying transient failures with backoff.
///
/// A window whose transient failures outlast the retry budget yields no
/// scenes, so the compositor gap-fills it. Permanent failures are errors.
pub fn fetch_with_retry<S: SceneSource + ?Sized>(
    source: &S,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    policy: &RetryPolicy,
) -> FloodResult<Vec<Scene>> {
    let attempts = policy.max_retries + 1;

    for attempt in 1..=attempts {
        match source.scenes_between(start, end) {
            Ok(scenes) => {
                if attempt > 1 {
                    log::info!("Scene fetch for {} succeeded on attempt {}", start.date_naive(), attempt);
                }
                return Ok(scenes);
            }
            Err(AcquisitionError::Transient(reason)) => {
                if attempt < attempts {
                    let delay = policy.delay_for(attempt);
                    log::warn!(
                        "Scene fetch attempt {} of {} for {} failed ({}), retrying in {:?}",
                        attempt,
                        attempts,
                        start.date_naive(),
                        reason,
                        delay
                    );
                    std::thread::sleep(delay);
                } else {
                    log::warn!(
                        "Scene fetch for {} failed after {} attempts ({}); treating period as empty",
                        start.date_naive(),
                        attempts,
                        reason
                    );
                }
            }
            Err(AcquisitionError::Permanent(reason)) => {
                return Err(FloodError::Acquisition(format!(
                    "scenes for {} .. {}: {}",
                    start, end, reason
                )));
            }
        }
    }

    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;
    use chrono::TimeZone;
    use ndarray::Array2;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scene_at(day: u32, polarization: Polarization) -> Scene {
        Scene {
            acquired: Utc.with_ymd_and_hms(2023, 5, day, 6, 0, 0).unwrap(),
            footprint: BoundingBox { min_lon: 76.0, max_lon: 77.0, min_lat: 9.0, max_lat: 10.0 },
            polarization,
            mode: AcquisitionMode::IW,
            backscatter: Array2::from_elem((2, 2), -20.0),
        }
    }

    struct FlakySource {
        failures: usize,
        calls: AtomicUsize,
        permanent: bool,
    }

    impl SceneSource for FlakySource {
        fn scenes_between(
            &self,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<Vec<Scene>, AcquisitionError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.permanent {
                return Err(AcquisitionError::Permanent("catalog rejected query".to_string()));
            }
            if call < self.failures {
                Err(AcquisitionError::Transient("timeout".to_string()))
            } else {
                Ok(vec![scene_at(3, Polarization::VV)])
            }
        }
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2023, 5, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2023, 5, 15, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_collection_window_is_half_open() {
        let collection = SceneCollection::new(vec![
            scene_at(1, Polarization::VV),
            scene_at(14, Polarization::VV),
            scene_at(15, Polarization::VV),
        ]);
        let (start, end) = window();
        let end = end + chrono::Duration::hours(6);
        // 15th at 06:00 is exactly the end and excluded
        assert_eq!(collection.scenes_between(start, end).unwrap().len(), 2);
    }

    #[test]
    fn test_filtered_drops_other_polarizations() {
        let collection = SceneCollection::filtered(
            vec![scene_at(2, Polarization::VV), scene_at(3, Polarization::VH)],
            Polarization::VV,
            AcquisitionMode::IW,
        );
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn test_transient_failures_are_retried() {
        let source = FlakySource { failures: 2, calls: AtomicUsize::new(0), permanent: false };
        let (start, end) = window();
        let mut policy = RetryPolicy::none();
        policy.max_retries = 3;

        let scenes = fetch_with_retry(&source, start, end, &policy).unwrap();
        assert_eq!(scenes.len(), 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_exhausted_retries_yield_empty_period() {
        let source = FlakySource { failures: 10, calls: AtomicUsize::new(0), permanent: false };
        let (start, end) = window();
        let mut policy = RetryPolicy::none();
        policy.max_retries = 2;

        let scenes = fetch_with_retry(&source, start, end, &policy).unwrap();
        assert!(scenes.is_empty());
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_permanent_failure_is_an_error() {
        let source = FlakySource { failures: 0, calls: AtomicUsize::new(0), permanent: true };
        let (start, end) = window();

        let result = fetch_with_retry(&source, start, end, &RetryPolicy::default());
        assert!(matches!(result, Err(FloodError::Acquisition(_))));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }
}
