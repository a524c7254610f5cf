// crates/camstate-config/tests/load_validation.rs
// ============================================================================
// Module: Config Load Validation Tests
// Description: Validate config loading guards and field validation.
// Purpose: Ensure config input handling is strict and fail-closed.
// ============================================================================

//! ## Overview
//! Loader guards (path, size, encoding), defaults, unknown field rejection,
//! and cross-field validation for `camstate.toml`.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use camstate_config::AuditSinkKind;
use camstate_config::CamstateConfig;
use camstate_config::ConfigError;
use camstate_store_sqlite::SqliteStoreMode;
use tempfile::NamedTempFile;

type TestResult = Result<(), String>;

fn assert_invalid(result: Result<CamstateConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config".to_string()),
    }
}

fn write_config(content: &[u8]) -> Result<NamedTempFile, String> {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(content).map_err(|err| err.to_string())?;
    Ok(file)
}

#[test]
fn load_rejects_path_component_too_long() -> TestResult {
    let long_component = "a".repeat(300);
    assert_invalid(CamstateConfig::load(Some(Path::new(&long_component))), "config path component too long")
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let file = write_config(&vec![b'#'; 1_048_577])?;
    assert_invalid(CamstateConfig::load(Some(file.path())), "config file exceeds size limit")
}

#[test]
fn load_rejects_non_utf8_file() -> TestResult {
    let file = write_config(&[0xFF, 0xFE, 0xFF])?;
    assert_invalid(CamstateConfig::load(Some(file.path())), "config file must be utf-8")
}

#[test]
fn load_reports_missing_file_as_io() -> TestResult {
    match CamstateConfig::load(Some(Path::new("/nonexistent/camstate.toml"))) {
        Err(ConfigError::Io(_)) => Ok(()),
        Err(other) => Err(format!("expected io error, got {other}")),
        Ok(_) => Err("expected missing file to fail".to_string()),
    }
}

#[test]
fn empty_file_uses_defaults() -> TestResult {
    let file = write_config(b"")?;
    let config = CamstateConfig::load(Some(file.path())).map_err(|err| err.to_string())?;
    if config.source.as_deref() != Some(file.path()) {
        return Err("source path not recorded".to_string());
    }
    if !config.reset.preserve_keys.contains("categories") || !config.reset.preserve_keys.contains("categoryCounter") {
        return Err("default preserve keys missing".to_string());
    }
    if config.dispatch.to_dispatch_config().observer_timeout != Duration::from_millis(2_000) {
        return Err("default observer timeout mismatch".to_string());
    }
    if config.audit.sink != AuditSinkKind::None {
        return Err("default audit sink should be none".to_string());
    }
    Ok(())
}

#[test]
fn full_file_parses() -> TestResult {
    let config = CamstateConfig::from_toml_str(
        r#"
[storage]
state_path = "/tmp/camstate/state.sqlite"
metadata_path = "/tmp/camstate/metadata.sqlite"
busy_timeout_ms = 250
journal_mode = "delete"
sync_mode = "normal"

[dispatch]
lanes = 2
queue_capacity = 16
observer_timeout_ms = 100

[reset]
preserve_keys = ["categories"]

[audit]
sink = "file"
path = "/tmp/camstate/audit.jsonl"

[logging]
filter = "camstate=debug"
"#,
    )
    .map_err(|err| err.to_string())?;
    let metadata = config.storage.metadata_store();
    if metadata.busy_timeout_ms != 250 || metadata.journal_mode != SqliteStoreMode::Delete {
        return Err("storage settings not applied".to_string());
    }
    if config.dispatch.to_dispatch_config().lanes != 2 || config.reset.preserve_keys.len() != 1 {
        return Err("dispatch or reset settings not applied".to_string());
    }
    Ok(())
}

#[test]
fn unknown_field_is_rejected() -> TestResult {
    match CamstateConfig::from_toml_str("[dispatch]\nworkers = 3\n") {
        Err(ConfigError::Parse(_)) => Ok(()),
        _ => Err("expected parse error for unknown field".to_string()),
    }
}

#[test]
fn zero_lanes_are_rejected() -> TestResult {
    assert_invalid(CamstateConfig::from_toml_str("[dispatch]\nlanes = 0\n"), "dispatch.lanes")
}

#[test]
fn zero_timeout_is_rejected() -> TestResult {
    assert_invalid(CamstateConfig::from_toml_str("[dispatch]\nobserver_timeout_ms = 0\n"), "observer_timeout_ms")
}

#[test]
fn file_audit_requires_path() -> TestResult {
    assert_invalid(CamstateConfig::from_toml_str("[audit]\nsink = \"file\"\n"), "audit.path")
}

#[test]
fn blank_preserve_key_is_rejected() -> TestResult {
    assert_invalid(CamstateConfig::from_toml_str("[reset]\npreserve_keys = [\" \"]\n"), "preserve_keys")
}

#[test]
fn shared_database_path_is_rejected() -> TestResult {
    assert_invalid(
        CamstateConfig::from_toml_str("[storage]\nstate_path = \"/tmp/a.sqlite\"\nmetadata_path = \"/tmp/a.sqlite\"\n"),
        "must differ",
    )
}
