//! Configuration loading from TOML files and environment overrides.

use scan_driver_mock::MockMode;
use spectroscan::config::AppConfig;
use std::path::PathBuf;

#[test]
fn missing_file_yields_defaults() {
    figment::Jail::expect_with(|_jail| {
        let config = AppConfig::load_from("does-not-exist.toml")?;
        assert_eq!(config, AppConfig::default());
        assert!(config.validate().is_ok());
        Ok(())
    });
}

#[test]
fn toml_sections_are_loaded() {
    figment::Jail::expect_with(|jail| {
        jail.create_file(
            "spectroscan.toml",
            r#"
            [application]
            log_level = "debug"

            [storage]
            output_dir = "runs"
            cube_policy = "truncate"

            [scan]
            step_x = 5.0
            starting_corner = "bottom-right"
            await = 0.2
            sequence_exposure_times = "20;50"

            [simulation]
            mode = "realistic"
            seed = 42
            "#,
        )?;

        let config = AppConfig::load_from("spectroscan.toml")?;
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.application.log_format, "pretty");
        assert_eq!(config.storage.output_dir, PathBuf::from("runs"));
        assert_eq!(config.scan.step_x, 5.0);
        assert_eq!(config.scan.step_y, 20.0);
        assert_eq!(config.scan.await_s, 0.2);
        assert_eq!(config.simulation.mode, MockMode::Realistic);
        assert_eq!(config.simulation.seed, Some(42));
        assert!(config.validate().is_ok());

        let snapshot = config.scan.normalize();
        assert_eq!(snapshot.step_x_um, 5);
        assert_eq!(snapshot.sequence_exposures_ms, vec![20.0, 50.0]);
        Ok(())
    });
}

#[test]
fn environment_overrides_file() {
    figment::Jail::expect_with(|jail| {
        jail.create_file(
            "spectroscan.toml",
            r#"
            [scan]
            width = 100.0
            "#,
        )?;
        jail.set_env("SPECTROSCAN_SCAN__WIDTH", "40.5");
        jail.set_env("SPECTROSCAN_APPLICATION__LOG_FORMAT", "json");
        jail.set_env("SPECTROSCAN_SIMULATION__MISSING_SAMPLE_RATE", "0.25");

        let config = AppConfig::load_from("spectroscan.toml")?;
        assert_eq!(config.scan.width, 40.5);
        assert_eq!(config.application.log_format, "json");
        assert_eq!(config.simulation.missing_sample_rate, 0.25);
        Ok(())
    });
}

#[test]
fn invalid_values_fail_validation() {
    figment::Jail::expect_with(|jail| {
        jail.create_file(
            "spectroscan.toml",
            r#"
            [simulation]
            source = "camera"
            "#,
        )?;
        let config = AppConfig::load_from("spectroscan.toml")?;
        let err = config.validate().expect_err("unknown source rejected");
        assert!(err.contains("camera"));
        Ok(())
    });
}

#[test]
fn shipped_config_file_parses() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/spectroscan.toml");
    let config = AppConfig::load_from(&path).expect("shipped config loads");
    assert!(config.validate().is_ok());
    assert_eq!(config.scan.pixels, 2048);
}
