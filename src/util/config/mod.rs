//! fanjvm 配置系统
//!
//! 后端行为通过项目级 `fanjvm.toml` 调整，缺省值即可直接使用。
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. CLI arguments
//! 2. Project-level (fanjvm.toml)
//! 3. Default values
//! ```
//!
//! # Example
//!
//! ```toml
//! [emit]
//! class_major = 49
//! finally_strategy = "subroutine"
//!
//! [log]
//! level = "debug"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::util::logger::LogLevel;

/// 项目配置文件名
pub const CONFIG_FILE_NAME: &str = "fanjvm.toml";

/// 不再允许 JSR/RET 的第一个 class 文件主版本
const FIRST_MAJOR_WITHOUT_JSR: u16 = 51;

/// Project-level configuration (`fanjvm.toml`)
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProjectConfig {
    /// Backend settings
    #[serde(default)]
    pub emit: EmitConfig,
    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
}

/// finally 块的降级方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinallyStrategy {
    /// 在每个出口处复制 finally 块
    #[default]
    Inline,
    /// JSR/RET 子程序（仅限 class 版本 <= 50）
    Subroutine,
}

/// Backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmitConfig {
    /// Class file major version
    #[serde(default = "default_class_major")]
    pub class_major: u16,
    /// finally lowering
    #[serde(default)]
    pub finally_strategy: FinallyStrategy,
    /// Emit `T$Dynamic` for every concrete class
    #[serde(default)]
    pub emit_dynamic_subclasses: bool,
    /// Emit LineNumberTable attributes
    #[serde(default = "default_true")]
    pub line_numbers: bool,
    /// Emit SourceFile attributes
    #[serde(default = "default_true")]
    pub source_files: bool,
    /// Emit types in parallel
    #[serde(default)]
    pub parallel: bool,
}

fn default_class_major() -> u16 {
    49
}

fn default_true() -> bool {
    true
}

impl Default for EmitConfig {
    fn default() -> Self {
        Self {
            class_major: default_class_major(),
            finally_strategy: FinallyStrategy::Inline,
            emit_dynamic_subclasses: false,
            line_numbers: true,
            source_files: true,
            parallel: false,
        }
    }
}

impl EmitConfig {
    /// 校验配置组合
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(45..=52).contains(&self.class_major) {
            return Err(ConfigError::Invalid(format!(
                "class_major {} not supported (45..=52)",
                self.class_major
            )));
        }
        if self.finally_strategy == FinallyStrategy::Subroutine
            && self.class_major >= FIRST_MAJOR_WITHOUT_JSR
        {
            return Err(ConfigError::Invalid(format!(
                "finally_strategy = \"subroutine\" needs class_major < {}",
                FIRST_MAJOR_WITHOUT_JSR
            )));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct LogConfig {
    #[serde(default)]
    pub level: LogLevel,
}

/// Load a config file from an explicit path
pub fn load_config(path: &Path) -> Result<ProjectConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::IoError)?;
    parse_config(&content)
}

/// Parse config text and validate it
pub fn parse_config(content: &str) -> Result<ProjectConfig, ConfigError> {
    let config: ProjectConfig = toml::from_str(content).map_err(ConfigError::ParseError)?;
    config.emit.validate()?;
    Ok(config)
}

/// Project config path for a directory
pub fn project_config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE_NAME)
}

/// Load `fanjvm.toml` from a directory, falling back to defaults when absent
pub fn load_project_config(dir: &Path) -> Result<ProjectConfig, ConfigError> {
    let path = project_config_path(dir);
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }
    load_config(&path)
}

/// Serialize config back to TOML
pub fn to_toml(config: &ProjectConfig) -> Result<String, ConfigError> {
    toml::to_string_pretty(config).map_err(ConfigError::SerializeError)
}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    ParseError(toml::de::Error),
    SerializeError(toml::ser::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::ParseError(e) => write!(f, "Config parse error: {}", e),
            ConfigError::SerializeError(e) => write!(f, "Config serialize error: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EmitConfig::default();
        assert_eq!(config.class_major, 49);
        assert_eq!(config.finally_strategy, FinallyStrategy::Inline);
        assert!(config.line_numbers);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial() {
        let config = parse_config("[emit]\nfinally_strategy = \"subroutine\"\n").unwrap();
        assert_eq!(config.emit.finally_strategy, FinallyStrategy::Subroutine);
        assert_eq!(config.emit.class_major, 49);
        assert_eq!(config.log.level, LogLevel::Info);
    }

    #[test]
    fn test_subroutine_requires_old_major() {
        let err = parse_config("[emit]\nclass_major = 51\nfinally_strategy = \"subroutine\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_bad_major() {
        let config = EmitConfig {
            class_major: 60,
            ..EmitConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_project_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_project_config(dir.path()).unwrap();
        assert_eq!(config, ProjectConfig::default());
    }

    #[test]
    fn test_round_trip_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ProjectConfig::default();
        config.emit.emit_dynamic_subclasses = true;
        config.log.level = LogLevel::Debug;
        fs::write(project_config_path(dir.path()), to_toml(&config).unwrap()).unwrap();
        let loaded = load_project_config(dir.path()).unwrap();
        assert_eq!(loaded, config);
    }
}
