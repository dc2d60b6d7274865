//! fanjvm.toml 加载

use std::fs;

use fanjvm::util::config::{
    load_project_config, project_config_path, to_toml, FinallyStrategy, ProjectConfig,
};
use fanjvm::util::logger::LogLevel;

#[test]
fn test_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_project_config(dir.path()).unwrap();
    assert_eq!(config, ProjectConfig::default());
}

#[test]
fn test_project_file_overrides() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        project_config_path(dir.path()),
        r#"
[emit]
class_major = 50
finally_strategy = "subroutine"
emit_dynamic_subclasses = true

[log]
level = "debug"
"#,
    )
    .unwrap();
    let config = load_project_config(dir.path()).unwrap();
    assert_eq!(config.emit.class_major, 50);
    assert_eq!(config.emit.finally_strategy, FinallyStrategy::Subroutine);
    assert!(config.emit.emit_dynamic_subclasses);
    assert!(config.emit.line_numbers);
    assert_eq!(config.log.level, LogLevel::Debug);
}

#[test]
fn test_invalid_project_file_rejected() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        project_config_path(dir.path()),
        "[emit]\nclass_major = 52\nfinally_strategy = \"subroutine\"\n",
    )
    .unwrap();
    assert!(load_project_config(dir.path()).is_err());
}

#[test]
fn test_written_config_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ProjectConfig::default();
    config.emit.parallel = true;
    config.emit.source_files = false;
    fs::write(project_config_path(dir.path()), to_toml(&config).unwrap()).unwrap();
    assert_eq!(load_project_config(dir.path()).unwrap(), config);
}
