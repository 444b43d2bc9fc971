//! Configuration down to the validated loop parameters.

use std::io::Write;
use std::path::Path;
use stealwatch_common::config::{resolve_config_path, ConfigError, LoopConfig, MonitorConfig};
use stealwatch_common::error::{ExitStatus, MonitorError};

#[test]
fn test_timeout_range_limits() {
    assert!(LoopConfig::new(1, None, true).is_ok());
    assert!(LoopConfig::new(3_600_000, None, true).is_ok());
    assert!(matches!(
        LoopConfig::new(0, None, true),
        Err(ConfigError::TimeoutOutOfRange { value_ms: 0 })
    ));
    assert!(LoopConfig::new(3_600_001, None, true).is_err());
}

#[test]
fn test_threshold_must_be_positive_and_finite() {
    assert!(LoopConfig::new(200, Some(0.5), true).is_ok());
    for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
        assert!(LoopConfig::new(200, Some(bad), true).is_err(), "{bad} accepted");
    }
}

#[test]
fn test_file_to_loop_config() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
timeout = "750ms"
steal_threshold_percent = 25.0

[realtime]
set_priority = false
lock_memory = false

[logging]
verbosity = 2
"#
    )
    .unwrap();

    let path = resolve_config_path(Some(file.path()), None, Path::new("/nonexistent")).unwrap();
    let config = MonitorConfig::from_file(&path).unwrap();
    let loop_config = config.validate().unwrap();

    assert_eq!(loop_config.timeout_ms(), 750);
    assert_eq!(loop_config.wait_budget_ms(), 250);
    assert_eq!(loop_config.steal_threshold_override(), Some(25.0));
    assert!(!loop_config.priority_elevation_enabled());
    assert_eq!(config.logging.level(), "trace");
}

#[test]
fn test_out_of_range_file_timeout_is_config_error() {
    let config = MonitorConfig::from_toml("timeout = \"2h\"").unwrap();
    let err = config.validate().unwrap_err();

    let status = ExitStatus::from(&MonitorError::from(err));
    assert_eq!(status, ExitStatus::ConfigError);
    assert_eq!(status.code(), 1);
}
