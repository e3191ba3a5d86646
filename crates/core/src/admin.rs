//! Record maintenance for the admin console.
//!
//! Updates re-run the duplicate rules with the record itself excluded, so saving an unchanged
//! record never reports itself. Identifier conflicts block; everything else is returned as a
//! warning next to the saved record.

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;

use crate::constants::{MAX_PATIENT_NAME_LEN, MAX_PROVIDER_NAME_LEN};
use crate::duplicates::{self, DuplicateResult};
use crate::models::{Patient, Provider};
use crate::repositories::{patients, providers};
use crate::validation::{validate_dob, validate_mrn, validate_npi, ValidationError};
use crate::{CarePlanError, CarePlanResult};

/// A saved record and any non-blocking duplicate warnings raised while saving it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Updated<T> {
    pub record: T,
    pub warnings: Vec<DuplicateResult>,
}

fn invalid(err: ValidationError) -> CarePlanError {
    CarePlanError::InvalidInput(err.message)
}

/// Non-blank and within the column's length limit.
fn name_field(field: &str, value: &str, max_len: usize) -> CarePlanResult<()> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CarePlanError::InvalidInput(format!("{field} is required")));
    }
    let len = value.chars().count();
    if len > max_len {
        return Err(CarePlanError::InvalidInput(format!(
            "{field} must be at most {max_len} characters (it has {len})."
        )));
    }
    Ok(())
}

/// Update a provider's name and NPI.
///
/// # Errors
///
/// * `InvalidInput` - blank or over-long name, or malformed NPI.
/// * `DuplicateBlocked` - another provider already holds the NPI.
/// * `NotFound` - no provider with this id.
pub fn update_provider_checked(
    conn: &Connection,
    id: i64,
    name: &str,
    npi: &str,
) -> CarePlanResult<Updated<Provider>> {
    name_field("Name", name, MAX_PROVIDER_NAME_LEN)?;
    let npi = validate_npi(npi).map_err(invalid)?;

    let check = duplicates::check_provider_duplicate(conn, name, npi.as_str(), Some(id))?;
    if check.is_blocking() {
        return Err(CarePlanError::DuplicateBlocked(check.message));
    }

    let record = providers::update_provider(conn, id, name, &npi)?;
    tracing::info!(provider_id = id, "provider updated");
    Ok(Updated {
        record,
        warnings: check.is_warning().then_some(check).into_iter().collect(),
    })
}

/// Update a patient's demographics.
///
/// # Errors
///
/// * `InvalidInput` - blank or over-long names, malformed MRN or an unacceptable date of birth.
/// * `DuplicateBlocked` - another patient already holds the MRN.
/// * `NotFound` - no patient with this id.
pub fn update_patient_checked(
    conn: &Connection,
    id: i64,
    first_name: &str,
    last_name: &str,
    mrn: &str,
    dob: NaiveDate,
    today: NaiveDate,
) -> CarePlanResult<Updated<Patient>> {
    name_field("First name", first_name, MAX_PATIENT_NAME_LEN)?;
    name_field("Last name", last_name, MAX_PATIENT_NAME_LEN)?;
    let mrn = validate_mrn(mrn).map_err(invalid)?;
    validate_dob(dob, today).map_err(invalid)?;

    // The order form reuses a patient by MRN; here a shared MRN would merge two records.
    if let Some(other) = patients::find_other_patient_with_mrn(conn, mrn.as_str(), Some(id))? {
        return Err(CarePlanError::DuplicateBlocked(format!(
            "Patient with MRN {mrn} already exists: {}",
            other.full_name()
        )));
    }

    let check =
        duplicates::check_patient_duplicate(conn, first_name, last_name, mrn.as_str(), Some(dob), Some(id))?;
    let record = patients::update_patient(conn, id, first_name, last_name, &mrn, dob)?;
    tracing::info!(patient_id = id, "patient updated");
    Ok(Updated {
        record,
        warnings: check.is_warning().then_some(check).into_iter().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::open_memory_database;
    use crate::repositories::test_support;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn dob() -> NaiveDate {
        NaiveDate::from_ymd_opt(1980, 1, 15).unwrap()
    }

    #[test]
    fn test_saving_unchanged_provider_reports_nothing() {
        let conn = open_memory_database().unwrap();
        let provider = test_support::provider(&conn, "Dr. Jane Smith", "1234567890");

        let updated = update_provider_checked(&conn, provider.id, "Dr. Jane Smith", "1234567890").unwrap();
        assert_eq!(updated.record.id, provider.id);
        assert!(updated.warnings.is_empty());
    }

    #[test]
    fn test_provider_npi_taken_by_another_is_blocked() {
        let conn = open_memory_database().unwrap();
        let provider = test_support::provider(&conn, "Dr. Jane Smith", "1234567890");
        test_support::provider(&conn, "Dr. Bob Jones", "2222222222");

        let err = update_provider_checked(&conn, provider.id, "Dr. Jane Smith", "2222222222")
            .expect_err("NPI belongs to another provider");
        assert!(matches!(err, CarePlanError::DuplicateBlocked(msg) if msg.contains("Bob Jones")));
    }

    #[test]
    fn test_provider_rename_to_similar_name_warns() {
        let conn = open_memory_database().unwrap();
        let provider = test_support::provider(&conn, "Dr. Alice Brown", "1234567890");
        test_support::provider(&conn, "Dr. Jane Smith", "2222222222");

        let updated = update_provider_checked(&conn, provider.id, "Dr. Jane Doe", "1234567890").unwrap();
        assert_eq!(updated.record.name, "Dr. Jane Doe");
        assert_eq!(updated.warnings.len(), 1);
        assert!(updated.warnings[0].is_warning());
    }

    #[test]
    fn test_provider_update_rejects_bad_npi_and_blank_name() {
        let conn = open_memory_database().unwrap();
        let provider = test_support::provider(&conn, "Dr. Jane Smith", "1234567890");

        assert!(matches!(
            update_provider_checked(&conn, provider.id, "Dr. Jane Smith", "12345"),
            Err(CarePlanError::InvalidInput(_))
        ));
        assert!(matches!(
            update_provider_checked(&conn, provider.id, "  ", "1234567890"),
            Err(CarePlanError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_provider_update_rejects_over_long_name() {
        let conn = open_memory_database().unwrap();
        let provider = test_support::provider(&conn, "Dr. Jane Smith", "1234567890");

        let err = update_provider_checked(&conn, provider.id, &"x".repeat(256), "1234567890")
            .expect_err("256 characters is too long");
        assert!(matches!(err, CarePlanError::InvalidInput(msg) if msg.contains("at most 255")));

        let longest = "é".repeat(255);
        let updated = update_provider_checked(&conn, provider.id, &longest, "1234567890").unwrap();
        assert_eq!(updated.record.name, longest);
    }

    #[test]
    fn test_unknown_provider_is_not_found() {
        let conn = open_memory_database().unwrap();
        let err = update_provider_checked(&conn, 99, "Dr. Jane Smith", "1234567890").unwrap_err();
        assert!(matches!(err, CarePlanError::NotFound { entity: "provider", id: 99 }));
    }

    #[test]
    fn test_patient_mrn_taken_by_another_is_blocked() {
        let conn = open_memory_database().unwrap();
        let patient = test_support::patient(&conn, "John", "Doe", "123456", (1980, 1, 15));
        test_support::patient(&conn, "Mary", "Major", "654321", (1975, 3, 2));

        let err = update_patient_checked(&conn, patient.id, "John", "Doe", "654321", dob(), today())
            .expect_err("MRN belongs to another patient");
        assert!(matches!(err, CarePlanError::DuplicateBlocked(msg) if msg.contains("Mary Major")));
    }

    #[test]
    fn test_patient_update_warns_on_same_name_and_dob() {
        let conn = open_memory_database().unwrap();
        let patient = test_support::patient(&conn, "Jon", "Doe", "123456", (1980, 1, 15));
        test_support::patient(&conn, "John", "Doe", "654321", (1980, 1, 15));

        let updated =
            update_patient_checked(&conn, patient.id, "John", "Doe", "123456", dob(), today()).unwrap();
        assert_eq!(updated.record.first_name, "John");
        assert_eq!(updated.warnings.len(), 1);
        assert!(updated.warnings[0].message.contains("654321"));
    }

    #[test]
    fn test_patient_update_rejects_over_long_names() {
        let conn = open_memory_database().unwrap();
        let patient = test_support::patient(&conn, "John", "Doe", "123456", (1980, 1, 15));
        let long = "x".repeat(101);

        let first = update_patient_checked(&conn, patient.id, &long, "Doe", "123456", dob(), today())
            .unwrap_err();
        assert!(matches!(first, CarePlanError::InvalidInput(msg) if msg.starts_with("First name")));
        let last = update_patient_checked(&conn, patient.id, "John", &long, "123456", dob(), today())
            .unwrap_err();
        assert!(matches!(last, CarePlanError::InvalidInput(msg) if msg.starts_with("Last name")));
    }

    #[test]
    fn test_patient_update_rejects_future_dob() {
        let conn = open_memory_database().unwrap();
        let patient = test_support::patient(&conn, "John", "Doe", "123456", (1980, 1, 15));
        let future = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();

        let err = update_patient_checked(&conn, patient.id, "John", "Doe", "123456", future, today())
            .unwrap_err();
        assert!(matches!(err, CarePlanError::InvalidInput(msg) if msg.contains("future")));
    }
}
