//! Configuration loading from files, with environment overrides and validation.

use std::io::Write;
use std::time::Duration;

use daq_scan::config::{AppConfig, BackgroundPolicy, ScannerConfig};
use daq_scan::scanner::ScanLayout;
use tempfile::NamedTempFile;

const ADAPTIVE: &str = r#"
    [application]
    name = "Adaptive fluence scan"
    log_level = "debug"
    log_format = "json"

    [scan]
    adaptive = true
    timeout = "30s"

    [scan.adaptive_limits]
    max_steps = 25
    probe = "det1/ch0"

    [scan.background]
    policy = "first_average"

    [scanner]
    type = "adaptive"
    actuator = "attenuator"
    lower = 0.0
    upper = 2.0
"#;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_sample_config_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/scan.toml");
    let config = AppConfig::load_from(path).unwrap();
    config.validate().unwrap();

    assert_eq!(config.scan.n_average, 2);
    assert_eq!(config.scan.settle_delay, Duration::from_millis(5));
    assert_eq!(config.scan.live_channels().len(), 3);
    assert_eq!(config.mock.detectors[0].trace_len, Some(64));

    let source = config.scanner.build(&config.scan).unwrap();
    let layout = ScanLayout::for_source(&source, config.scan.n_average);
    assert_eq!(layout.shape, vec![2, 11]);
}

#[test]
fn test_adaptive_config_from_file() {
    let file = write_config(ADAPTIVE);
    let config = AppConfig::load_from(file.path()).unwrap();
    config.validate().unwrap();

    assert!(config.scan.adaptive);
    assert_eq!(config.scan.timeout, Some(Duration::from_secs(30)));
    assert_eq!(config.scan.background.policy, BackgroundPolicy::FirstAverage);
    // Renames fall back to the built-in table
    assert_eq!(
        config.scan.background.renames.get("Bg_fluo").map(String::as_str),
        Some("I_ON")
    );
    assert!(matches!(config.scanner, ScannerConfig::Adaptive { .. }));

    let source = config.scanner.build(&config.scan).unwrap();
    assert!(source.is_adaptive());
    assert_eq!(source.probe(), Some("det1/ch0"));
    let layout = ScanLayout::for_source(&source, 1);
    assert_eq!(layout.shape, vec![25]);
}

#[test]
fn test_adaptive_flag_must_match_scanner() {
    let file = write_config(&ADAPTIVE.replace("adaptive = true", "adaptive = false"));
    let config = AppConfig::load_from(file.path()).unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("does not match scanner type"));
}

#[test]
fn test_invalid_log_level_rejected() {
    let file = write_config(&ADAPTIVE.replace("\"debug\"", "\"verbose\""));
    let config = AppConfig::load_from(file.path()).unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("Invalid log_level"));
}

#[test]
fn test_missing_scanner_section_fails_to_load() {
    let file = write_config(
        r#"
        [application]
        name = "No scanner"
        log_level = "info"
        "#,
    );
    assert!(AppConfig::load_from(file.path()).is_err());
}
