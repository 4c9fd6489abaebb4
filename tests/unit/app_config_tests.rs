/*!
 * Tests for application configuration
 */

use archivist::app_config::{Config, ExtractionConfig, LogLevel};
use std::path::PathBuf;

use crate::common;

#[test]
fn test_config_default_shouldValidate() {
    let config = Config::default();

    assert!(config.validate().is_ok());
    assert_eq!(config.default_export_path, PathBuf::from("data/telegram_dump.json"));
    assert_eq!(config.log_dir, PathBuf::from("logs"));
    assert_eq!(config.log_level, LogLevel::Info);
    assert_eq!(config.extraction.endpoint, "http://localhost:11434");
    assert_eq!(config.extraction.max_consecutive_failures, 5);
}

#[test]
fn test_config_emptyStateFile_shouldFailValidation() {
    let config = Config {
        state_file: PathBuf::new(),
        ..Config::default()
    };

    assert!(config.validate().is_err());
}

#[test]
fn test_config_extractionWithoutModel_shouldFailValidation() {
    let mut config = Config::default();
    config.extraction.enabled = true;
    config.extraction.model = "  ".to_string();

    assert!(config.validate().is_err());
}

#[test]
fn test_config_emptyModelWhileDisabled_shouldValidate() {
    let mut config = Config::default();
    config.extraction.model = String::new();

    assert!(config.validate().is_ok());
}

#[test]
fn test_config_templateWithoutContext_shouldFailValidation() {
    let mut config = Config::default();
    config.extraction.prompt_template = "Only {message}".to_string();

    let error = config.validate().unwrap_err();
    assert!(error.to_string().contains("{context}"));
}

#[test]
fn test_config_zeroFailureBudget_shouldFailValidation() {
    let config = Config {
        extraction: ExtractionConfig {
            max_consecutive_failures: 0,
            ..ExtractionConfig::default()
        },
        ..Config::default()
    };

    assert!(config.validate().is_err());
}

#[test]
fn test_loadOrCreate_missingFile_shouldWriteDefault() {
    let temp_dir = common::create_temp_dir().unwrap();
    let path = temp_dir.path().join("conf.json");

    let config = Config::load_or_create(&path).unwrap();

    assert!(path.exists());
    assert_eq!(config, Config::default());
    let reloaded = Config::load_or_create(&path).unwrap();
    assert_eq!(reloaded, config);
}

#[test]
fn test_loadOrCreate_existingFile_shouldReadOverrides() {
    let temp_dir = common::create_temp_dir().unwrap();
    let path = common::create_test_file(
        temp_dir.path(),
        "conf.json",
        r#"{
            "state_file": "state/progress.json",
            "log_level": "debug",
            "context": {"window_size": 1, "reply_depth": 0, "include_target": false},
            "extraction": {"enabled": true, "model": "llama3.2:3b", "output_path": "out/facts.jsonl"}
        }"#,
    )
    .unwrap();

    let config = Config::load_or_create(&path).unwrap();

    assert_eq!(config.state_file, PathBuf::from("state/progress.json"));
    assert_eq!(config.log_level, LogLevel::Debug);
    assert!(!config.context.include_target);
    assert!(config.extraction.enabled);
    assert_eq!(config.extraction.model, "llama3.2:3b");
    assert_eq!(config.extraction.output_path, Some(PathBuf::from("out/facts.jsonl")));
    assert!(config.validate().is_ok());
}

#[test]
fn test_loadOrCreate_invalidJson_shouldFail() {
    let temp_dir = common::create_temp_dir().unwrap();
    let path = common::create_test_file(temp_dir.path(), "conf.json", "{ nope").unwrap();

    assert!(Config::load_or_create(&path).is_err());
}

#[test]
fn test_config_excessiveRetries_shouldFailValidation() {
    let mut config = Config::default();
    config.extraction.max_retries = 1_000;

    let error = config.validate().unwrap_err();
    assert!(error.to_string().contains("max_retries"));

    config.extraction.max_retries = archivist::app_config::MAX_RETRIES_LIMIT;
    assert!(config.validate().is_ok());
}
