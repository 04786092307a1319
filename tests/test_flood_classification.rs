mod common;

use approx::assert_relative_eq;
use ndarray::array;
use sarflood::core::{PeriodTarget, TemporalCompositor};
use sarflood::{
    FloodConfig, FloodError, FloodPipeline, SceneCollection, WaterClass, YearFrequencyDenominator,
};

#[test]
fn test_four_by_four_scenario() {
    let _ = env_logger::builder().is_test(true).try_init();

    let pipeline = FloodPipeline::new(common::config()).unwrap();
    let series = pipeline.build_series(&common::source(), common::grid()).unwrap();
    assert_eq!(series.len(), 4);
    assert!(series.iter().all(|s| s.len() == 13));

    let baseline = pipeline.build_baseline(&series).unwrap();
    assert_eq!(baseline.total_periods, 52);
    assert_relative_eq!(baseline.occurrence.data()[[3, 3]], 51.0 / 52.0);
    assert_eq!(
        baseline.classification.data(),
        &array![[1u8, 1, 2, 2], [0, 0, 0, 0], [0, 0, 0, 0], [2, 2, 1, 1]]
    );

    let result = pipeline.classify_selected(&baseline, &series).unwrap();
    assert_eq!(
        result.classification.data(),
        &array![[1u8, 1, 2, 2], [3, 3, 4, 4], [4, 4, 2, 2], [2, 2, 1, 1]]
    );
    assert_eq!(result.flood.count_true(), 4);
    assert_eq!(result.count(WaterClass::Unclassified), 0);
}

#[test]
fn test_selected_year_denominator() {
    let mut config = common::config();
    config.year_frequency_denominator = YearFrequencyDenominator::SelectedYear;
    let pipeline = FloodPipeline::new(config).unwrap();

    let series = pipeline.build_series(&common::source(), common::grid()).unwrap();
    let baseline = pipeline.build_baseline(&series).unwrap();
    let result = pipeline.classify_selected(&baseline, &series).unwrap();

    // Wet through all of 2023: 13/13 >= 0.8 becomes new perennial water
    assert_eq!(
        result.classification.data(),
        &array![[1u8, 1, 2, 2], [3, 3, 4, 4], [5, 5, 2, 2], [2, 2, 1, 1]]
    );
    assert_eq!(result.flood.count_true(), 2);
}

#[test]
fn test_year_without_scenes() {
    let mut config = common::config();
    config.years = vec![2019, 2020, 2021, 2022, 2023];
    let pipeline = FloodPipeline::new(config).unwrap();

    // No scenes are generated for 2019
    let series = pipeline.build_series(&common::source(), common::grid()).unwrap();
    let empty = series.iter().find(|s| s.year == 2019).unwrap();
    assert_eq!(empty.len(), 13);
    assert!(empty.periods.iter().all(|p| !p.has_new_data && p.water.count_true() == 0));

    let baseline = pipeline.build_baseline(&series).unwrap();
    assert_eq!(baseline.total_periods, 65);
    // 52/65 < 0.95: the always-wet pixel drops out of the perennial class
    assert_eq!(baseline.classification.data()[[0, 0]], 0);
    assert_eq!(baseline.classification.data()[[0, 2]], 2);
}

#[test]
fn test_classification_is_idempotent() {
    let pipeline = FloodPipeline::new(common::config()).unwrap();
    let series = pipeline.build_series(&common::source(), common::grid()).unwrap();
    let baseline = pipeline.build_baseline(&series).unwrap();
    let before = baseline.classification.clone();

    let first = pipeline.classify_selected(&baseline, &series).unwrap();
    let second = pipeline.classify_selected(&baseline, &series).unwrap();

    assert_eq!(first.classification, second.classification);
    assert_eq!(first.flood, second.flood);
    assert_eq!(baseline.classification, before);
}

#[test]
fn test_missing_period_is_not_found() {
    let mut config = common::config();
    config.selected_period = 13;
    let pipeline = FloodPipeline::new(config).unwrap();
    let series = pipeline.build_series(&common::source(), common::grid()).unwrap();
    let baseline = pipeline.build_baseline(&series).unwrap();

    assert!(matches!(
        pipeline.classify_selected(&baseline, &series),
        Err(FloodError::NotFound(_))
    ));
}

#[test]
fn test_gap_filled_periods_carry_last_composite() {
    // Keep only the scenes of 2023 periods 2 and 6
    let scenes: Vec<_> = common::scenes_for(&[2023])
        .into_iter()
        .enumerate()
        .filter(|(i, _)| *i == 2 || *i == 6)
        .map(|(_, s)| s)
        .collect();
    let source = SceneCollection::new(scenes);
    let config = FloodConfig {
        years: vec![2023],
        ..common::config()
    };

    let compositor = TemporalCompositor::new((&config).into(), common::grid(), &source);
    let year = compositor.build_year(2023).unwrap();

    let observed: Vec<usize> = year.periods.iter().filter(|p| p.has_new_data).map(|p| p.period_index).collect();
    assert_eq!(observed, vec![2, 6]);

    // Before the first observation the zero fallback leaves everything dry
    assert_eq!(year.periods[0].water.count_true(), 0);
    assert_eq!(year.periods[1].water.count_true(), 0);

    // Periods 3..=5 repeat period 2, 7.. repeat period 6
    for p in 3..=5 {
        assert_eq!(year.periods[p].water, year.periods[2].water);
    }
    for p in 7..13 {
        assert_eq!(year.periods[p].water, year.periods[6].water);
    }
    // Early-2023 pixels are wet at period 2 and dry again by period 6
    assert!(year.periods[2].water.data()[[2, 2]]);
    assert!(!year.periods[6].water.data()[[2, 2]]);
}

#[test]
fn test_config_from_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{ "years": [2020, 2021, 2022, 2023], "weekFreq": 0.3, "yearFreq": 0.8, "selectedPeriod": 5 }"#,
    )
    .unwrap();

    let config = FloodConfig::from_json_file(&path).unwrap();
    assert_eq!(config.years, common::YEARS.to_vec());
    assert_eq!(config.year_freq, 0.8);
    assert_eq!(config.selected_year, 2023);

    assert!(FloodConfig::from_json_file(dir.path().join("missing.json")).is_err());
}

#[test]
fn test_batch_targets() {
    let mut config = common::config();
    config.batch_years = vec![2022, 2023];
    config.batch_periods = vec![5, 20];
    let pipeline = FloodPipeline::new(config).unwrap();

    let series = pipeline.build_series(&common::source(), common::grid()).unwrap();
    let baseline = pipeline.build_baseline(&series).unwrap();
    let batch = pipeline.classify_batch(&baseline, &series).unwrap();

    let classified: Vec<PeriodTarget> = batch.classifications.iter().map(|c| c.target).collect();
    assert_eq!(classified, vec![PeriodTarget::new(2022, 5), PeriodTarget::new(2023, 5)]);
    assert_eq!(batch.missing, vec![PeriodTarget::new(2022, 20), PeriodTarget::new(2023, 20)]);

    // The 2023 entry matches the single-target classification
    let selected = pipeline.classify_selected(&baseline, &series).unwrap();
    assert_eq!(batch.classifications[1].classification, selected.classification);
    // In 2022 only the recurring pixels are wet at period 5, and they are seasonal
    assert_eq!(batch.classifications[0].count(WaterClass::Seasonal), 2);
    assert_eq!(batch.classifications[0].flood.count_true(), 0);
}

#[test]
fn test_batch_defaults_to_selected_target() {
    let pipeline = FloodPipeline::new(common::config()).unwrap();
    assert_eq!(pipeline.batch_targets(), vec![PeriodTarget::new(2023, 5)]);
}
