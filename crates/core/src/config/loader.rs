//! Configuration file loading

use super::schema::ConfigSchema;
use crate::error::{Error, Result, ResultExt};
use std::path::{Path, PathBuf};

/// Configuration wrapper
#[derive(Debug, Clone)]
pub struct Config {
    pub schema: ConfigSchema,
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file path or use defaults
    ///
    /// An explicit path must exist. Without one, the standard locations are
    /// searched and the built-in defaults apply when none is present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) if !p.exists() => return Err(Error::config_not_found(p)),
            Some(p) => Some(p.to_path_buf()),
            None => find_config_file(),
        };

        let schema = if let Some(ref p) = config_path {
            load_config_file(p)?
        } else {
            ConfigSchema::default()
        };

        Ok(Self {
            schema,
            path: config_path,
        })
    }

    /// Load with defaults only (no file)
    pub fn default() -> Self {
        Self {
            schema: ConfigSchema::default(),
            path: None,
        }
    }
}

/// Find configuration file in standard locations
fn find_config_file() -> Option<PathBuf> {
    let candidates = [
        ".downloader-tools.toml",
        "downloader-tools.toml",
        ".config/downloader-tools.toml",
    ];

    candidates
        .into_iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.exists())
}

/// Load and parse a TOML configuration file
fn load_config_file(path: &Path) -> Result<ConfigSchema> {
    let content = std::fs::read_to_string(path)
        .map_err(Error::from)
        .context(format!("Failed to read config file {}", path.display()))?;

    parse(&content).context(format!("Failed to parse config file {}", path.display()))
}

/// Parse configuration from TOML text
pub(crate) fn parse(content: &str) -> Result<ConfigSchema> {
    let schema: ConfigSchema = toml::from_str(content)?;
    schema.validate()?;
    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.path.is_none());
        assert_eq!(config.schema.registration.files.len(), 5);
    }

    #[test]
    fn test_config_explicit_missing_file() {
        let err = Config::load(Some(Path::new("/nonexistent/downloader-tools.toml"))).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigNotFound);
    }

    #[test]
    fn test_config_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("downloader-tools.toml");
        std::fs::write(
            &path,
            r#"
[project]
pbxproj = "Other.xcodeproj/project.pbxproj"

[registration]
skip_existing = true
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.path.as_deref(), Some(path.as_path()));
        assert_eq!(config.schema.project.pbxproj, "Other.xcodeproj/project.pbxproj");
        assert!(config.schema.registration.skip_existing);
        assert_eq!(config.schema.registration.phase.label, "Sources");
    }

    #[test]
    fn test_config_parse_error_has_context() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[registration\nfiles = 3").unwrap();

        let err = Config::load(Some(&path)).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigParseError);
        assert!(err.context.unwrap().contains("broken.toml"));
    }
}
