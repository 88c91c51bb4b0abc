//! Configuration and input validation
//!
//! Collects every problem with a configuration in one pass instead of
//! failing on the first bad value, so an operator sees the whole list.
//!
//! # Example
//!
//! ```rust
//! use proximity_core::validation::Validator;
//!
//! let result = Validator::new()
//!     .positive("join.grid_size", 0.01)
//!     .at_least("join.filter_margin_factor", 1.2, 1.0)
//!     .sql_identifier("tables.distances", "realestate.location_distances")
//!     .validate();
//!
//! assert!(result.is_valid());
//! ```

use crate::error::{Error, ErrorCode, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Optionally schema-qualified SQL identifier: `name` or `schema.name`
static SQL_IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}(\.[A-Za-z_][A-Za-z0-9_]{0,62})?$")
        .expect("identifier pattern is valid")
});

/// Returns true if `value` can be spliced into SQL as a table or column name.
pub fn is_sql_identifier(value: &str) -> bool {
    SQL_IDENTIFIER.is_match(value)
}

/// Validation error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    /// Field that failed validation
    pub field: String,
    /// Error message
    pub message: String,
    /// Error code
    pub code: String,
    /// Expected value (if applicable)
    pub expected: Option<String>,
    /// Actual value (if applicable)
    pub actual: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validation result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    errors: Vec<ValidationError>,
    warnings: Vec<ValidationError>,
}

impl ValidationResult {
    /// Create a new empty result
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Get all errors
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Get all warnings
    pub fn warnings(&self) -> &[ValidationError] {
        &self.warnings
    }

    /// Add an error
    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Add a warning
    pub fn add_warning(&mut self, warning: ValidationError) {
        self.warnings.push(warning);
    }

    /// Merge another result into this one
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Convert to Result type
    pub fn to_result(self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            let messages: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
            Err(Error::new(
                ErrorCode::ConfigValidationError,
                format!("Validation failed: {}", messages.join("; ")),
            ))
        }
    }
}

/// Fluent validator builder
pub struct Validator {
    result: ValidationResult,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator {
    /// Create a new validator
    pub fn new() -> Self {
        Self {
            result: ValidationResult::new(),
        }
    }

    fn error(mut self, field: &str, message: String, code: &str, expected: Option<String>, actual: Option<String>) -> Self {
        self.result.add_error(ValidationError {
            field: field.to_string(),
            message,
            code: code.to_string(),
            expected,
            actual,
        });
        self
    }

    /// Validate that a float is finite and strictly greater than zero
    pub fn positive(self, field: &str, value: f64) -> Self {
        if !value.is_finite() || value <= 0.0 {
            return self.error(
                field,
                "Must be a finite number greater than zero".to_string(),
                "POSITIVE",
                Some("> 0".to_string()),
                Some(value.to_string()),
            );
        }
        self
    }

    /// Validate that a count is non-zero
    pub fn non_zero(self, field: &str, value: usize) -> Self {
        if value == 0 {
            return self.error(
                field,
                "Must be at least 1".to_string(),
                "NON_ZERO",
                Some(">= 1".to_string()),
                Some("0".to_string()),
            );
        }
        self
    }

    /// Validate a lower bound
    pub fn at_least(self, field: &str, value: f64, min: f64) -> Self {
        if !value.is_finite() || value < min {
            return self.error(
                field,
                format!("Must be at least {}", min),
                "MIN_VALUE",
                Some(format!(">= {}", min)),
                Some(value.to_string()),
            );
        }
        self
    }

    /// Validate a numeric range
    pub fn range<T: PartialOrd + std::fmt::Display>(self, field: &str, value: T, min: T, max: T) -> Self {
        if value < min || value > max {
            let expected = format!("{} - {}", min, max);
            return self.error(
                field,
                format!("Must be between {} and {}", min, max),
                "RANGE",
                Some(expected),
                Some(value.to_string()),
            );
        }
        self
    }

    /// Validate a table or column name
    pub fn sql_identifier(self, field: &str, value: &str) -> Self {
        if !is_sql_identifier(value) {
            return self.error(
                field,
                "Must be a plain SQL identifier, optionally schema-qualified".to_string(),
                "SQL_IDENTIFIER",
                Some("name or schema.name".to_string()),
                Some(value.to_string()),
            );
        }
        self
    }

    /// Add a custom validation
    pub fn custom<F>(self, field: &str, f: F) -> Self
    where
        F: FnOnce() -> Option<String>,
    {
        if let Some(message) = f() {
            return self.error(field, message, "CUSTOM", None, None);
        }
        self
    }

    /// Add a warning (non-blocking)
    pub fn warn_if(mut self, field: &str, condition: bool, message: &str) -> Self {
        if condition {
            self.result.add_warning(ValidationError {
                field: field.to_string(),
                message: message.to_string(),
                code: "WARNING".to_string(),
                expected: None,
                actual: None,
            });
        }
        self
    }

    /// Complete validation and return result
    pub fn validate(self) -> ValidationResult {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_rejects_zero_negative_and_nan() {
        for value in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let result = Validator::new().positive("join.grid_size", value).validate();
            assert!(!result.is_valid(), "{} should be rejected", value);
            assert_eq!(result.errors()[0].code, "POSITIVE");
        }
        assert!(Validator::new().positive("join.grid_size", 0.01).validate().is_valid());
    }

    #[test]
    fn test_at_least_validation() {
        let result = Validator::new().at_least("join.filter_margin_factor", 0.9, 1.0).validate();
        assert!(!result.is_valid());
        assert_eq!(result.errors()[0].code, "MIN_VALUE");
        assert!(Validator::new().at_least("m", 1.0, 1.0).validate().is_valid());
    }

    #[test]
    fn test_range_validation() {
        let result = Validator::new().range("retry.max_attempts", 150, 1, 100).validate();
        assert!(!result.is_valid());
        assert_eq!(result.errors()[0].code, "RANGE");
    }

    #[test]
    fn test_sql_identifier() {
        assert!(is_sql_identifier("location_distances"));
        assert!(is_sql_identifier("realestate.location_distances"));
        assert!(!is_sql_identifier("a.b.c"));
        assert!(!is_sql_identifier("1table"));
        assert!(!is_sql_identifier("users; DROP TABLE users"));
        assert!(!is_sql_identifier("\"quoted\""));
        assert!(!is_sql_identifier(""));
    }

    #[test]
    fn test_warnings_do_not_invalidate() {
        let result = Validator::new()
            .warn_if("join.grid_size", true, "grid smaller than radius")
            .validate();
        assert!(result.is_valid());
        assert_eq!(result.warnings().len(), 1);
    }

    #[test]
    fn test_errors_are_collected() {
        let result = Validator::new()
            .positive("join.max_distance", -5.0)
            .non_zero("join.chunk_size", 0)
            .sql_identifier("tables.origins", "bad name")
            .validate();
        assert_eq!(result.errors().len(), 3);

        let err = result.to_result().unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigValidationError);
        assert!(err.message.contains("join.chunk_size"));
    }
}
