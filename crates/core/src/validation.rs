//! Input validation and normalisation for order intake.
//!
//! Identifier formats live in `careplan-types`; this module wraps them with the error codes and
//! messages the order form reports, and adds the free-text parsers for the comma separated
//! fields.

use careplan_types::{IdentifierError, Icd10Code, Mrn, Npi};
use chrono::NaiveDate;

/// A single validation failure with a stable machine code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<IdentifierError> for ValidationError {
    fn from(err: IdentifierError) -> Self {
        ValidationError::new(err.code(), err.to_string())
    }
}

/// Oldest accepted patient age, in whole years of 365 days.
const MAX_AGE_YEARS: i64 = 120;

pub fn validate_npi(value: &str) -> Result<Npi, ValidationError> {
    Ok(Npi::parse(value)?)
}

pub fn validate_mrn(value: &str) -> Result<Mrn, ValidationError> {
    Ok(Mrn::parse(value)?)
}

pub fn validate_icd10_code(value: &str) -> Result<Icd10Code, ValidationError> {
    Ok(Icd10Code::parse(value)?)
}

/// Validate a list of ICD-10 codes, reporting every bad code at once.
///
/// Blank entries are skipped. Accepted codes are returned normalised.
///
/// # Errors
///
/// Returns `invalid_icd10_list` naming each rejected code.
pub fn validate_icd10_codes_list(codes: &[String]) -> Result<Vec<Icd10Code>, ValidationError> {
    let mut validated = Vec::with_capacity(codes.len());
    let mut errors = Vec::new();

    for raw in codes {
        let code = normalize_icd10(raw);
        if code.is_empty() {
            continue;
        }
        match Icd10Code::parse(&code) {
            Ok(parsed) => validated.push(parsed),
            Err(e) => errors.push(format!("Code '{code}': {e}")),
        }
    }

    if !errors.is_empty() {
        return Err(ValidationError::new(
            "invalid_icd10_list",
            format!("Invalid ICD-10 codes: {}", errors.join("; ")),
        ));
    }
    Ok(validated)
}

/// Reject dates of birth in the future or implying an age over 120 years.
pub fn validate_dob(dob: NaiveDate, today: NaiveDate) -> Result<(), ValidationError> {
    if dob > today {
        return Err(ValidationError::new(
            "future_dob",
            "Date of birth cannot be in the future",
        ));
    }

    let age_years = (today - dob).num_days() / 365;
    if age_years > MAX_AGE_YEARS {
        return Err(ValidationError::new(
            "unreasonable_dob",
            "Date of birth indicates age over 120 years",
        ));
    }
    Ok(())
}

pub fn normalize_npi(value: &str) -> String {
    value.trim().to_string()
}

pub fn normalize_mrn(value: &str) -> String {
    value.trim().to_string()
}

pub fn normalize_icd10(value: &str) -> String {
    value.trim().to_uppercase()
}

/// `"I10, k21.0,,"` becomes `["I10", "K21.0"]`.
pub fn parse_comma_separated_codes(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(normalize_icd10)
        .filter(|code| !code.is_empty())
        .collect()
}

/// Split a comma separated medication list, keeping each entry's case.
pub fn parse_medication_history(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|med| !med.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse an ISO `YYYY-MM-DD` date.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}
