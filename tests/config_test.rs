//! Configuration loading and validation

use pado::config::Config;
use pado::models::SourceType;

#[test]
fn default_config_validates() {
    let config = Config::default();
    assert!(config.validate().is_ok());

    // the full recognized option surface carries sensible defaults
    let d = &config.detection;
    assert!(d.min_mentions_breakthrough > d.min_mentions_to_trend);
    assert!(d.min_source_count >= 2);
    assert_eq!(d.baseline_window_days, 30);
    assert!(d.suppress_evergreen);
    assert!(d.evergreen_volume_override > 0);
    for st in SourceType::all() {
        assert!(d.source_weight(st) > 0.0);
    }
}

#[test]
fn config_loads_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pado.toml");
    std::fs::write(
        &path,
        r#"
        [detection]
        min_mentions_to_trend = 7
        min_spike_ratio = 4.0
        suppress_evergreen = false

        [detection.source_weights]
        news = 1.0
        social = 0.4

        [storage]
        sqlite_path = "/tmp/custom.db"

        [server]
        bind_addr = "0.0.0.0:9000"
        "#,
    )
    .unwrap();

    let config = Config::from_file(&path).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.detection.min_mentions_to_trend, 7);
    assert!(!config.detection.suppress_evergreen);
    assert!((config.detection.source_weight(SourceType::Social) - 0.4).abs() < f64::EPSILON);
    assert_eq!(config.server.bind_addr, "0.0.0.0:9000");
    // sections absent from the file keep their defaults
    assert_eq!(config.projector.score_ttl_hours, 6);
}

#[test]
fn invalid_config_is_rejected() {
    let mut config = Config::default();
    config.detection.min_source_count = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.detection.similarity_threshold = 1.5;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.detection.archive_after_hours = config.detection.stale_after_hours;
    assert!(config.validate().is_err());
}

#[test]
fn unknown_source_weight_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pado.toml");
    std::fs::write(
        &path,
        r#"
        [detection.source_weights]
        telegraph = 2.0
        "#,
    )
    .unwrap();

    let config = Config::from_file(&path).unwrap();
    assert!(config.validate().is_err());
}
