//! Local validation of the environment create/edit form.
//!
//! Only the rules that need no server round-trip live here. Uniqueness of
//! code and name is checked remotely by the workflow layer.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const CODE_MAX_LEN: usize = 30;
pub const NAME_MAX_LEN: usize = 10;
pub const DESCRIPTION_MAX_LEN: usize = 60;

fn code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z]([-a-z0-9]*[a-z0-9])?$").expect("environment code pattern is valid")
    })
}

/// Fields of the environment form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentForm {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormField {
    Code,
    Name,
    Description,
}

impl fmt::Display for FormField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormField::Code => write!(f, "code"),
            FormField::Name => write!(f, "name"),
            FormField::Description => write!(f, "description"),
        }
    }
}

/// One violated form rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "kebab-case")]
pub enum ValidationError {
    Required { field: FormField },
    TooLong { field: FormField, max: usize, actual: usize },
    /// Lowercase letters, digits, and hyphens; starts with a letter and
    /// does not end with a hyphen.
    InvalidCode { code: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Required { field } => write!(f, "{} is required", field),
            ValidationError::TooLong { field, max, actual } => {
                write!(f, "{} is {} characters long (max {})", field, actual, max)
            }
            ValidationError::InvalidCode { code } => write!(
                f,
                "code '{}' must start with a lowercase letter and contain only lowercase letters, digits, and inner hyphens",
                code
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

fn check_length(
    errors: &mut Vec<ValidationError>,
    field: FormField,
    value: &str,
    max: usize,
) -> bool {
    let actual = value.chars().count();
    if actual > max {
        errors.push(ValidationError::TooLong { field, max, actual });
        return false;
    }
    true
}

/// Validate the code field alone.
pub fn validate_code(code: &str) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if code.is_empty() {
        errors.push(ValidationError::Required {
            field: FormField::Code,
        });
        return errors;
    }
    check_length(&mut errors, FormField::Code, code, CODE_MAX_LEN);
    if !code_pattern().is_match(code) {
        errors.push(ValidationError::InvalidCode {
            code: code.to_string(),
        });
    }
    errors
}

/// Validate a create form. Every violated rule is reported.
pub fn validate_form(form: &EnvironmentForm) -> Result<(), Vec<ValidationError>> {
    let mut errors = validate_code(&form.code);
    errors.extend(validate_edit_fields(form));
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate the fields an edit may change (name and description).
pub fn validate_edit(form: &EnvironmentForm) -> Result<(), Vec<ValidationError>> {
    let errors = validate_edit_fields(form);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_edit_fields(form: &EnvironmentForm) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if form.name.trim().is_empty() {
        errors.push(ValidationError::Required {
            field: FormField::Name,
        });
    } else {
        check_length(&mut errors, FormField::Name, &form.name, NAME_MAX_LEN);
    }
    if let Some(description) = &form.description {
        check_length(
            &mut errors,
            FormField::Description,
            description,
            DESCRIPTION_MAX_LEN,
        );
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(code: &str, name: &str) -> EnvironmentForm {
        EnvironmentForm {
            code: code.to_string(),
            name: name.to_string(),
            ..EnvironmentForm::default()
        }
    }

    #[test]
    fn accepts_well_formed_codes() {
        for code in ["a", "staging", "eu-west-2", "x1"] {
            assert!(validate_code(code).is_empty(), "{} should be valid", code);
        }
    }

    #[test]
    fn rejects_malformed_codes() {
        for code in ["Prod", "1env", "dev-", "-dev", "dev_1", "dév"] {
            assert_eq!(
                validate_code(code),
                vec![ValidationError::InvalidCode { code: code.into() }],
                "{} should be rejected",
                code
            );
        }
    }

    #[test]
    fn collects_every_violation() {
        let mut f = form(&"a".repeat(31), "");
        f.description = Some("d".repeat(61));
        let errors = validate_form(&f).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::TooLong {
                    field: FormField::Code,
                    max: 30,
                    actual: 31
                },
                ValidationError::Required {
                    field: FormField::Name
                },
                ValidationError::TooLong {
                    field: FormField::Description,
                    max: 60,
                    actual: 61
                },
            ]
        );
    }

    #[test]
    fn name_length_counts_characters_not_bytes() {
        assert!(validate_form(&form("prod", "生产环境生产环境")).is_ok());
        assert!(validate_form(&form("prod", "production-1")).is_err());
    }

    #[test]
    fn edit_ignores_code() {
        assert!(validate_edit(&form("", "prod")).is_ok());
    }
}
