//! Configuration discovery and the strict-mode rule toggles (§10.4).
//!
//! Grounded on zizmor's `Config` (`config.rs`): the same
//! `CONFIG_CANDIDATES` + walk-up-to-`.git` discovery procedure, the same
//! per-rule `disable`/`severity` override shape, reduced to the flat rule
//! set this analyzer actually has (there's no per-audit nested config
//! here, since strict-mode rules take no rule-specific settings beyond
//! on/off and severity).

use std::{collections::HashMap, fs};

use camino::Utf8Path;
use serde::Deserialize;
use thiserror::Error;

use crate::diagnostic::Severity;

const CONFIG_CANDIDATES: &[&str] = &[
    ".awaitly-analyzer.yml",
    ".awaitly-analyzer.yaml",
    "awaitly-analyzer.yml",
    "awaitly-analyzer.yaml",
];

#[derive(Error, Debug)]
#[error("configuration error in {path}")]
pub(crate) struct ConfigError {
    path: String,
    #[source]
    pub(crate) source: ConfigErrorInner,
}

#[derive(Error, Debug)]
pub(crate) enum ConfigErrorInner {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration syntax")]
    Syntax(#[source] serde_yaml::Error),
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RuleConfig {
    #[serde(default)]
    disable: bool,
    severity: Option<Severity>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    rules: HashMap<String, RuleConfig>,
    /// Treat every warning-severity diagnostic as a fatal error (§6).
    #[serde(default)]
    warnings_as_errors: bool,
    /// Run strict-mode rules (§4.7) even for workflows that didn't opt in
    /// with `strict: true`.
    #[serde(default)]
    force_strict: bool,
}

impl RawConfig {
    fn load(contents: &str) -> Result<Self, ConfigErrorInner> {
        serde_yaml::from_str(contents).map_err(ConfigErrorInner::Syntax)
    }
}

/// The strict-mode rule engine's resolved configuration for one run.
#[derive(Clone, Debug, Default)]
pub(crate) struct Config {
    raw: RawConfig,
}

impl Config {
    fn load(contents: &str) -> Result<Self, ConfigErrorInner> {
        Ok(Self {
            raw: RawConfig::load(contents)?,
        })
    }

    pub(crate) fn disables(&self, rule_id: &str) -> bool {
        self.raw
            .rules
            .get(rule_id)
            .map(|r| r.disable)
            .unwrap_or(false)
    }

    pub(crate) fn severity_override(&self, rule_id: &str) -> Option<Severity> {
        self.raw.rules.get(rule_id).and_then(|r| r.severity)
    }

    pub(crate) fn warnings_as_errors(&self) -> bool {
        self.raw.warnings_as_errors
    }

    pub(crate) fn force_strict(&self) -> bool {
        self.raw.force_strict
    }

    /// Discover a config by walking up from `start` looking for one of
    /// [`CONFIG_CANDIDATES`], stopping at the first `.git` directory or
    /// the filesystem root.
    pub(crate) fn discover(start: &Utf8Path) -> Result<Option<Self>, ConfigError> {
        let to_err = |err: ConfigErrorInner, path: &Utf8Path| ConfigError {
            path: path.to_string(),
            source: err,
        };

        let mut dir = if start.is_dir() {
            start.to_path_buf()
        } else {
            match start.parent() {
                Some(p) if !p.as_str().is_empty() => p.to_path_buf(),
                _ => Utf8Path::new(".").to_path_buf(),
            }
        };

        loop {
            for candidate in CONFIG_CANDIDATES {
                let candidate_path = dir.join(candidate);
                if candidate_path.is_file() {
                    let contents =
                        fs::read_to_string(&candidate_path).map_err(ConfigErrorInner::from)
                            .map_err(|e| to_err(e, &candidate_path))?;
                    return Self::load(&contents)
                        .map(Some)
                        .map_err(|e| to_err(e, &candidate_path));
                }
            }

            if dir.join(".git").is_dir() {
                return Ok(None);
            }

            match dir.parent() {
                Some(parent) => dir = parent.to_path_buf(),
                None => return Ok(None),
            }
        }
    }

    /// Loads an explicit `--config <file>` override.
    pub(crate) fn from_path(path: &Utf8Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)
            .map_err(ConfigErrorInner::from)
            .map_err(|e| ConfigError {
                path: path.to_string(),
                source: e,
            })?;
        Self::load(&contents).map_err(|e| ConfigError {
            path: path.to_string(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rule_disable_and_severity() {
        let config = Config::load(
            "rules:\n  missing-step-id:\n    disable: true\n  missing-errors:\n    severity: error\nwarnings-as-errors: true\n",
        )
        .unwrap();

        assert!(config.disables("missing-step-id"));
        assert!(!config.disables("missing-errors"));
        assert_eq!(config.severity_override("missing-errors"), Some(Severity::Error));
        assert!(config.warnings_as_errors());
    }
}
