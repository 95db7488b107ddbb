//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::Config;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Convert the first error into a [`ConfigError`].
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(ConfigError::InvalidValue {
                field: error.path,
                message: error.message,
            }),
            None => Ok(self.warnings),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_worker(config, &mut result);
        Self::validate_logging(config, &mut result);

        result
    }

    fn validate_worker(config: &Config, result: &mut ValidationResult) {
        if config.worker.job_name.trim().is_empty() {
            result.add_error(ValidationError::new(
                "worker.job_name",
                "Job name cannot be empty",
            ));
        }

        if config.worker.count == 0 {
            result.add_error(ValidationError::new(
                "worker.count",
                "count must be at least 1",
            ));
        }

        if config.worker.interval_ms == 0 {
            result.add_warning(ValidationWarning::new(
                "worker.interval_ms",
                "interval is 0, idle workers will poll the store continuously",
            ));
        }

        if config.worker.max_retries > 100 {
            result.add_warning(ValidationWarning::new(
                "worker.max_retries",
                "max_retries is very high (>100), failing jobs may be retried for a long time",
            ));
        }
    }

    fn validate_logging(config: &Config, result: &mut ValidationResult) {
        if config.logging.level.trim().is_empty() {
            result.add_error(ValidationError::new(
                "logging.level",
                "Log level cannot be empty",
            ));
        }

        if let Some(dir) = &config.logging.dir {
            if dir.as_os_str().is_empty() {
                result.add_error(ValidationError::new(
                    "logging.dir",
                    "Log directory cannot be an empty path",
                ));
            }
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
