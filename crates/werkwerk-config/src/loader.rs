//! Configuration loader.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ConfigError;
use crate::schema::Config;

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid"));

/// Configuration loader with environment variable substitution.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    /// Load configuration from a file, falling back to defaults when the
    /// file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::NotFound(_)) => Ok(Config::default()),
            other => other,
        }
    }

    /// Load configuration from a string.
    pub fn load_str(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let config: Config = toml::from_str(&expanded)?;
        Ok(config)
    }

    /// Expand `${VAR}` references from the environment. Comment lines are
    /// left alone so they can document the syntax.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let mut result = String::with_capacity(content.len());

        for line in content.split_inclusive('\n') {
            if line.trim_start().starts_with('#') {
                result.push_str(line);
                continue;
            }
            let mut last = 0;
            for cap in ENV_VAR.captures_iter(line) {
                let whole = cap.get(0).map_or(0..0, |m| m.range());
                let var_name = &cap[1];
                let value = std::env::var(var_name)
                    .map_err(|_| ConfigError::EnvVarNotSet(var_name.to_string()))?;
                result.push_str(&line[last..whole.start]);
                result.push_str(&value);
                last = whole.end;
            }
            result.push_str(&line[last..]);
        }

        Ok(result)
    }

    /// Expand shell-style paths (e.g., `~/.werkwerk/logs`).
    pub fn expand_path(path: &str) -> String {
        shellexpand::tilde(path).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::LogFormat;
    use crate::validator::ConfigValidator;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_empty_config() {
        let config = ConfigLoader::load_str("").unwrap();
        assert_eq!(config.worker.job_name, "demo");
        assert_eq!(config.worker.interval_ms, 1000);
    }

    #[test]
    fn test_load_worker_section() {
        let content = r#"
            [worker]
            job_name = "send-email"
            max_retries = 5
            interval_ms = 250
            count = 4
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.worker.job_name, "send-email");
        assert_eq!(config.worker.max_retries, 5);
        assert_eq!(config.worker.interval_ms, 250);
        assert_eq!(config.worker.count, 4);
    }

    #[test]
    fn test_load_full_config() {
        let content = r#"
            [worker]
            job_name = "reports"

            [store]
            retry_delay_ms = 1500

            [logging]
            level = "debug"
            format = "json"
            dir = "/var/log/werkwerk"
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.worker.job_name, "reports");
        assert_eq!(config.store.retry_delay_ms, 1500);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.logging.dir.is_some());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[worker]").unwrap();
        writeln!(file, "interval_ms = 5000").unwrap();

        let config = ConfigLoader::load(file.path()).unwrap();
        assert_eq!(config.worker.interval_ms, 5000);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = ConfigLoader::load(Path::new("/nonexistent/path/werkwerk.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_or_default_nonexistent_file() {
        let config =
            ConfigLoader::load_or_default(Path::new("/nonexistent/path/werkwerk.toml")).unwrap();
        assert_eq!(config.worker.job_name, "demo");
    }

    #[test]
    fn test_load_invalid_toml() {
        let result = ConfigLoader::load_str("invalid = [unclosed");
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn test_expand_env_vars() {
        // SAFETY: This test runs in isolation and sets a unique test-only env var
        unsafe {
            std::env::set_var("WERKWERK_TEST_JOB", "nightly");
        }
        let config = ConfigLoader::load_str("[worker]\njob_name = \"${WERKWERK_TEST_JOB}\"").unwrap();
        assert_eq!(config.worker.job_name, "nightly");
        unsafe {
            std::env::remove_var("WERKWERK_TEST_JOB");
        }
    }

    #[test]
    fn test_expand_env_vars_not_set() {
        let content = "value = \"${NONEXISTENT_WERKWERK_VAR_12345}\"";
        let result = ConfigLoader::expand_env_vars(content);
        assert!(matches!(result, Err(ConfigError::EnvVarNotSet(_))));
    }

    #[test]
    fn test_expand_env_vars_no_vars() {
        let content = "value = \"no variables here\"";
        let expanded = ConfigLoader::expand_env_vars(content).unwrap();
        assert_eq!(expanded, content);
    }

    #[test]
    fn test_expand_env_vars_skips_comments() {
        let content = "# set ${UNSET_WERKWERK_VAR_678} to override\n  # ${ALSO_UNSET}\n[worker]\n";
        let expanded = ConfigLoader::expand_env_vars(content).unwrap();
        assert_eq!(expanded, content);
    }

    #[test]
    fn test_shipped_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/werkwerk.toml");
        assert!(path.exists());
        let config = ConfigLoader::load_or_default(&path).unwrap();
        assert_eq!(config.worker.job_name, "send-email");
        assert_eq!(config.worker.count, 2);
        assert!(ConfigValidator::validate(&config).is_valid());
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let expanded = ConfigLoader::expand_path("~/logs");
        assert!(!expanded.starts_with('~'));
        assert!(expanded.ends_with("/logs"));
    }
}
