use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub const CONFIG_FILE: &str = "photon.toml";

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Deepest allowed nesting of concrete calls.
    pub max_call_depth: usize,
    /// Distinct specializations allowed per template.
    pub max_specializations: usize,
    /// `tracing` filter directive, e.g. `photon_lang=debug`.
    pub log: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 128,
            max_specializations: 256,
            log: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {error}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
    #[error("invalid config {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("invalid value `{value}` for {variable}")]
    Environment { variable: String, value: String },
}

impl EngineConfig {
    /// Reads `path`, or `photon.toml` in the working directory when no path
    /// is given, then applies environment overrides. A missing default file
    /// yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Path::new(CONFIG_FILE);
                if path.exists() {
                    Self::from_file(path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_overrides(|name| env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|error| ConfigError::Io {
            path: path.to_path_buf(),
            error,
        })?;
        toml::from_str(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: error.to_string(),
        })
    }

    /// Applies `PHOTON_*` variables as returned by `lookup`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(depth) = parse_override(&lookup, "PHOTON_MAX_CALL_DEPTH")? {
            self.max_call_depth = depth;
        }
        if let Some(limit) = parse_override(&lookup, "PHOTON_MAX_SPECIALIZATIONS")? {
            self.max_specializations = limit;
        }
        if let Some(filter) = lookup("PHOTON_LOG") {
            self.log = Some(filter);
        }
        Ok(())
    }
}

fn parse_override(
    lookup: &impl Fn(&str) -> Option<String>,
    variable: &str,
) -> Result<Option<usize>, ConfigError> {
    let Some(value) = lookup(variable) else {
        return Ok(None);
    };
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::Environment {
            variable: variable.to_string(),
            value,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(content.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn missing_fields_use_defaults() {
        let file = write_config("max_call_depth = 64\n");
        let config = EngineConfig::from_file(file.path()).expect("valid config");

        assert_eq!(config.max_call_depth, 64);
        assert_eq!(config.max_specializations, 256);
        assert_eq!(config.log, None);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let file = write_config("max_depth = 64\n");
        let error = EngineConfig::from_file(file.path()).expect_err("unknown field");
        assert!(matches!(error, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_explicit_file_is_an_io_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let error = EngineConfig::from_file(&dir.path().join("absent.toml")).expect_err("missing");
        assert!(matches!(error, ConfigError::Io { .. }));
    }

    #[test]
    fn environment_overrides_file_values() {
        let file = write_config("max_specializations = 8\nlog = \"warn\"\n");
        let mut config = EngineConfig::from_file(file.path()).expect("valid config");

        config
            .apply_overrides(|name| match name {
                "PHOTON_MAX_SPECIALIZATIONS" => Some("16".into()),
                "PHOTON_LOG" => Some("photon_lang=debug".into()),
                _ => None,
            })
            .expect("valid overrides");

        assert_eq!(config.max_specializations, 16);
        assert_eq!(config.max_call_depth, 128);
        assert_eq!(config.log.as_deref(), Some("photon_lang=debug"));
    }

    #[test]
    fn malformed_overrides_are_reported() {
        let mut config = EngineConfig::default();
        let error = config
            .apply_overrides(|name| (name == "PHOTON_MAX_CALL_DEPTH").then(|| "deep".to_string()))
            .expect_err("not a number");

        assert_eq!(error.to_string(), "invalid value `deep` for PHOTON_MAX_CALL_DEPTH");
    }
}
