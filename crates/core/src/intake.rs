//! Order intake: the form a medical assistant submits to file a care plan order.
//!
//! Intake runs in three steps:
//!
//! 1. [`OrderForm::clean`] checks every field and collects all errors into [`FormErrors`].
//! 2. [`OrderForm::review`] adds the cross-record duplicate checks for provider and patient.
//! 3. [`create_order`] reuses or creates the provider and patient, inserts the order and runs the
//!    order duplicate check against the other orders of that patient.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use careplan_types::{Icd10Code, Mrn, Npi};

use crate::constants::{
    MAX_DIAGNOSIS_CODE_LEN, MAX_DIAGNOSIS_DESCRIPTION_LEN, MAX_MEDICATION_NAME_LEN,
    MAX_PATIENT_NAME_LEN, MAX_PROVIDER_NAME_LEN,
};
use crate::duplicates::{self, DuplicateResult};
use crate::models::{NewOrder, Order, Patient, Provider};
use crate::repositories::{orders, patients, providers};
use crate::validation;
use crate::{CarePlanError, CarePlanResult};

const REQUIRED: &str = "This field is required.";
const DOB_REQUIRED: &str = "Date of birth is required for care plan generation.";

/// Raw order form fields, exactly as submitted.
#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct OrderForm {
    #[schema(example = "Dr. Jane Smith")]
    pub provider_name: String,
    #[schema(example = "1234567890")]
    pub provider_npi: String,
    #[schema(example = "John")]
    pub patient_first_name: String,
    #[schema(example = "Doe")]
    pub patient_last_name: String,
    #[schema(example = "123456")]
    pub patient_mrn: String,
    /// `YYYY-MM-DD`.
    #[schema(example = "1980-01-15")]
    pub patient_dob: String,
    #[schema(example = "G70.00")]
    pub primary_diagnosis_code: String,
    #[schema(example = "Myasthenia gravis")]
    pub primary_diagnosis_description: String,
    /// Comma separated ICD-10 codes.
    #[schema(example = "I10, K21.0")]
    pub additional_diagnoses: String,
    #[schema(example = "IVIG")]
    pub medication_name: String,
    /// Comma separated medication names.
    #[schema(example = "Prednisone, Pyridostigmine")]
    pub medication_history: String,
    pub patient_records: String,
}

/// Field errors keyed by form field, plus errors that belong to the form as a whole.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct FormErrors {
    pub fields: BTreeMap<String, Vec<String>>,
    pub non_field: Vec<String>,
}

impl FormErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn add_non_field(&mut self, message: impl Into<String>) {
        self.non_field.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.non_field.is_empty()
    }

    pub fn field(&self, name: &str) -> &[String] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Order form after field validation. Every value is trimmed and normalised.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CleanedOrder {
    pub provider_name: String,
    pub provider_npi: Npi,
    pub patient_first_name: String,
    pub patient_last_name: String,
    pub patient_mrn: Mrn,
    pub patient_dob: NaiveDate,
    pub primary_diagnosis_code: Icd10Code,
    pub primary_diagnosis_description: String,
    pub additional_diagnoses: Vec<Icd10Code>,
    pub medication_name: String,
    pub medication_history: Vec<String>,
    pub patient_records: String,
}

/// A cleaned order that passed the blocking duplicate rules, with any advisory warnings.
#[derive(Clone, Debug)]
pub struct ReviewedOrder {
    pub order: CleanedOrder,
    pub provider_warning: Option<DuplicateResult>,
    pub patient_warning: Option<DuplicateResult>,
}

/// Result of [`create_order`].
#[derive(Clone, Debug)]
pub struct CreatedOrder {
    pub order: Order,
    pub provider: Provider,
    pub patient: Patient,
    /// Provider, patient and order warnings, in that order.
    pub warnings: Vec<DuplicateResult>,
}

fn text_field(
    errors: &mut FormErrors,
    field: &str,
    value: &str,
    max_len: Option<usize>,
    required: bool,
) -> Option<String> {
    let value = value.trim();
    if value.is_empty() && required {
        errors.add(field, REQUIRED);
        return None;
    }
    if let Some(max_len) = max_len {
        let len = value.chars().count();
        if len > max_len {
            errors.add(
                field,
                format!("Ensure this value has at most {max_len} characters (it has {len})."),
            );
            return None;
        }
    }
    Some(value.to_string())
}

fn checked<T>(
    errors: &mut FormErrors,
    field: &str,
    result: Result<T, validation::ValidationError>,
) -> Option<T> {
    result.map_err(|e| errors.add(field, e.message)).ok()
}

impl OrderForm {
    /// Validate every field, collecting all errors.
    ///
    /// # Arguments
    ///
    /// * `today` - Reference date for the date of birth checks.
    ///
    /// # Errors
    ///
    /// Returns the complete set of field errors when any field is invalid.
    pub fn clean(&self, today: NaiveDate) -> Result<CleanedOrder, FormErrors> {
        let mut errors = FormErrors::default();

        let provider_name = text_field(
            &mut errors,
            "provider_name",
            &self.provider_name,
            Some(MAX_PROVIDER_NAME_LEN),
            true,
        );
        let provider_npi = checked(
            &mut errors,
            "provider_npi",
            validation::validate_npi(&self.provider_npi),
        );
        let patient_first_name = text_field(
            &mut errors,
            "patient_first_name",
            &self.patient_first_name,
            Some(MAX_PATIENT_NAME_LEN),
            true,
        );
        let patient_last_name = text_field(
            &mut errors,
            "patient_last_name",
            &self.patient_last_name,
            Some(MAX_PATIENT_NAME_LEN),
            true,
        );
        let patient_mrn = checked(
            &mut errors,
            "patient_mrn",
            validation::validate_mrn(&self.patient_mrn),
        );

        let patient_dob = if self.patient_dob.trim().is_empty() {
            errors.add("patient_dob", DOB_REQUIRED);
            None
        } else {
            match validation::parse_date(&self.patient_dob) {
                Some(dob) => checked(
                    &mut errors,
                    "patient_dob",
                    validation::validate_dob(dob, today).map(|_| dob),
                ),
                None => {
                    errors.add("patient_dob", "Enter a valid date.");
                    None
                }
            }
        };

        let primary_diagnosis_code = text_field(
            &mut errors,
            "primary_diagnosis_code",
            &self.primary_diagnosis_code,
            Some(MAX_DIAGNOSIS_CODE_LEN),
            true,
        )
        .and_then(|code| {
            checked(
                &mut errors,
                "primary_diagnosis_code",
                validation::validate_icd10_code(&code),
            )
        });
        let primary_diagnosis_description = text_field(
            &mut errors,
            "primary_diagnosis_description",
            &self.primary_diagnosis_description,
            Some(MAX_DIAGNOSIS_DESCRIPTION_LEN),
            false,
        );
        let additional_diagnoses = checked(
            &mut errors,
            "additional_diagnoses",
            validation::validate_icd10_codes_list(&validation::parse_comma_separated_codes(
                &self.additional_diagnoses,
            )),
        );
        let medication_name = text_field(
            &mut errors,
            "medication_name",
            &self.medication_name,
            Some(MAX_MEDICATION_NAME_LEN),
            true,
        );
        let medication_history = validation::parse_medication_history(&self.medication_history);
        let patient_records = if self.patient_records.trim().is_empty() {
            errors.add("patient_records", REQUIRED);
            None
        } else {
            Some(self.patient_records.clone())
        };

        match (
            provider_name,
            provider_npi,
            patient_first_name,
            patient_last_name,
            patient_mrn,
            patient_dob,
            primary_diagnosis_code,
            primary_diagnosis_description,
            additional_diagnoses,
            medication_name,
            patient_records,
        ) {
            (
                Some(provider_name),
                Some(provider_npi),
                Some(patient_first_name),
                Some(patient_last_name),
                Some(patient_mrn),
                Some(patient_dob),
                Some(primary_diagnosis_code),
                Some(primary_diagnosis_description),
                Some(additional_diagnoses),
                Some(medication_name),
                Some(patient_records),
            ) if errors.is_empty() => Ok(CleanedOrder {
                provider_name,
                provider_npi,
                patient_first_name,
                patient_last_name,
                patient_mrn,
                patient_dob,
                primary_diagnosis_code,
                primary_diagnosis_description,
                additional_diagnoses,
                medication_name,
                medication_history,
                patient_records,
            }),
            _ => Err(errors),
        }
    }

    /// Clean the form, then apply the provider and patient duplicate rules.
    ///
    /// # Errors
    ///
    /// * `InvalidForm` - one or more fields failed validation, or the NPI is registered to a
    ///   provider with a different name (reported as a non-field error).
    pub fn review(&self, conn: &Connection, today: NaiveDate) -> CarePlanResult<ReviewedOrder> {
        let order = self.clean(today).map_err(CarePlanError::InvalidForm)?;

        // A provider already registered under this NPI and name is simply reused.
        let known_provider = duplicates::get_existing_provider_by_npi(conn, order.provider_npi.as_str())?
            .is_some_and(|p| p.name.to_lowercase() == order.provider_name.to_lowercase());
        let provider_check = if known_provider {
            DuplicateResult::ok()
        } else {
            duplicates::check_provider_duplicate(
                conn,
                &order.provider_name,
                order.provider_npi.as_str(),
                None,
            )?
        };
        if provider_check.is_blocking() {
            tracing::info!(npi = %order.provider_npi, "order blocked by provider duplicate");
            let mut errors = FormErrors::default();
            errors.add_non_field(provider_check.message);
            return Err(CarePlanError::InvalidForm(errors));
        }

        let patient_check = duplicates::check_patient_duplicate(
            conn,
            &order.patient_first_name,
            &order.patient_last_name,
            order.patient_mrn.as_str(),
            Some(order.patient_dob),
            None,
        )?;

        Ok(ReviewedOrder {
            order,
            provider_warning: provider_check.is_warning().then_some(provider_check),
            patient_warning: patient_check.is_warning().then_some(patient_check),
        })
    }
}

/// Persist a reviewed order.
///
/// The provider is reused by NPI and the patient by MRN, creating either when absent. The new
/// order starts in draft; its duplicate check ignores the order itself.
///
/// # Arguments
///
/// * `duplicate_window_days` - Look-back window for the order duplicate check.
pub fn create_order(
    conn: &Connection,
    reviewed: ReviewedOrder,
    duplicate_window_days: i64,
) -> CarePlanResult<CreatedOrder> {
    let ReviewedOrder {
        order: cleaned,
        provider_warning,
        patient_warning,
    } = reviewed;

    let tx = conn.unchecked_transaction()?;

    let provider = match duplicates::get_existing_provider_by_npi(&tx, cleaned.provider_npi.as_str())? {
        Some(existing) => existing,
        None => providers::insert_provider(&tx, &cleaned.provider_name, &cleaned.provider_npi)?,
    };
    let patient = match duplicates::get_existing_patient_by_mrn(&tx, cleaned.patient_mrn.as_str())? {
        Some(existing) => existing,
        None => patients::insert_patient(
            &tx,
            &cleaned.patient_first_name,
            &cleaned.patient_last_name,
            &cleaned.patient_mrn,
            cleaned.patient_dob,
        )?,
    };

    let order = orders::insert_order(
        &tx,
        &NewOrder {
            patient_id: patient.id,
            provider_id: provider.id,
            primary_diagnosis_code: cleaned.primary_diagnosis_code,
            primary_diagnosis_description: cleaned.primary_diagnosis_description,
            additional_diagnoses: cleaned.additional_diagnoses,
            medication_name: cleaned.medication_name,
            medication_history: cleaned.medication_history,
            patient_records: cleaned.patient_records,
        },
    )?;

    let order_check = duplicates::check_order_duplicate(
        &tx,
        patient.id,
        &order.medication_name,
        duplicate_window_days,
        Some(order.id),
    )?;
    tx.commit()?;

    let warnings: Vec<DuplicateResult> = [provider_warning, patient_warning]
        .into_iter()
        .flatten()
        .chain(order_check.is_warning().then_some(order_check))
        .collect();

    tracing::info!(
        order_id = order.id,
        patient_id = patient.id,
        provider_id = provider.id,
        warnings = warnings.len(),
        "order created"
    );

    Ok(CreatedOrder {
        order,
        provider,
        patient,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::open_memory_database;
    use crate::duplicates::Severity;
    use crate::models::OrderStatus;
    use crate::repositories::test_support;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn valid_form() -> OrderForm {
        OrderForm {
            provider_name: "Dr. Jane Smith".into(),
            provider_npi: "1234567890".into(),
            patient_first_name: "John".into(),
            patient_last_name: "Doe".into(),
            patient_mrn: "123456".into(),
            patient_dob: "1980-01-15".into(),
            primary_diagnosis_code: "g70.00".into(),
            primary_diagnosis_description: "Myasthenia gravis".into(),
            additional_diagnoses: "I10, k21.0".into(),
            medication_name: "IVIG".into(),
            medication_history: "Prednisone, Pyridostigmine".into(),
            patient_records: "Patient presents with fatigue.".into(),
        }
    }

    #[test]
    fn test_clean_normalises_valid_form() {
        let cleaned = valid_form().clean(today()).expect("clean should succeed");
        assert_eq!(cleaned.primary_diagnosis_code.as_str(), "G70.00");
        let extra: Vec<_> = cleaned.additional_diagnoses.iter().map(Icd10Code::as_str).collect();
        assert_eq!(extra, vec!["I10", "K21.0"]);
        assert_eq!(cleaned.medication_history, vec!["Prednisone", "Pyridostigmine"]);
    }

    #[test]
    fn test_clean_collects_every_field_error() {
        let form = OrderForm {
            provider_npi: "123".into(),
            patient_mrn: "12345A".into(),
            primary_diagnosis_code: "bad".into(),
            additional_diagnoses: "I10, nope".into(),
            ..OrderForm::default()
        };
        let errors = form.clean(today()).expect_err("form should be invalid");

        assert_eq!(errors.field("provider_name"), ["This field is required."]);
        assert_eq!(errors.field("provider_npi"), ["NPI must be exactly 10 digits"]);
        assert_eq!(errors.field("patient_mrn"), ["MRN must be exactly 6 digits"]);
        assert_eq!(
            errors.field("patient_dob"),
            ["Date of birth is required for care plan generation."]
        );
        assert!(errors.field("primary_diagnosis_code")[0].starts_with("Invalid ICD-10 code format"));
        assert!(errors.field("additional_diagnoses")[0].starts_with("Invalid ICD-10 codes: Code 'NOPE'"));
        assert_eq!(errors.field("patient_records"), ["This field is required."]);
        assert!(errors.field("primary_diagnosis_description").is_empty());
    }

    #[test]
    fn test_clean_rejects_future_and_malformed_dob() {
        let mut form = valid_form();
        form.patient_dob = "2030-01-01".into();
        let errors = form.clean(today()).unwrap_err();
        assert_eq!(errors.field("patient_dob"), ["Date of birth cannot be in the future"]);

        form.patient_dob = "15/01/1980".into();
        let errors = form.clean(today()).unwrap_err();
        assert_eq!(errors.field("patient_dob"), ["Enter a valid date."]);
    }

    #[test]
    fn test_clean_enforces_length_limits() {
        let mut form = valid_form();
        form.patient_first_name = "x".repeat(101);
        let errors = form.clean(today()).unwrap_err();
        assert_eq!(
            errors.field("patient_first_name"),
            ["Ensure this value has at most 100 characters (it has 101)."]
        );
    }

    #[test]
    fn test_review_blocks_on_provider_npi_conflict() {
        let conn = open_memory_database().unwrap();
        test_support::provider(&conn, "Dr. Other Person", "1234567890");

        let err = valid_form().review(&conn, today()).expect_err("review should block");
        match err {
            CarePlanError::InvalidForm(errors) => {
                assert!(errors.fields.is_empty());
                assert_eq!(
                    errors.non_field,
                    ["Provider with NPI 1234567890 already exists: Dr. Other Person"]
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_review_reports_invalid_form() {
        let conn = open_memory_database().unwrap();
        let err = OrderForm::default().review(&conn, today()).unwrap_err();
        assert!(matches!(err, CarePlanError::InvalidForm(_)));
    }

    #[test]
    fn test_create_order_creates_provider_patient_and_draft_order() {
        let conn = open_memory_database().unwrap();
        let reviewed = valid_form().review(&conn, today()).unwrap();
        assert!(reviewed.provider_warning.is_none());
        assert!(reviewed.patient_warning.is_none());

        let created = create_order(&conn, reviewed, 30).expect("create should succeed");
        assert_eq!(created.order.status, OrderStatus::Draft);
        assert_eq!(created.provider.npi.as_str(), "1234567890");
        assert_eq!(created.patient.mrn.as_str(), "123456");
        assert!(created.warnings.is_empty(), "a new order must not flag itself");
    }

    #[test]
    fn test_create_order_reuses_patient_and_warns_on_repeat() {
        let conn = open_memory_database().unwrap();
        let first = create_order(&conn, valid_form().review(&conn, today()).unwrap(), 30).unwrap();

        let mut repeat = valid_form();
        repeat.patient_first_name = "Johnny".into();
        let reviewed = repeat.review(&conn, today()).unwrap();
        assert!(reviewed.patient_warning.as_ref().is_some_and(DuplicateResult::is_warning));

        let second = create_order(&conn, reviewed, 30).unwrap();
        assert_eq!(second.patient.id, first.patient.id);
        assert_eq!(second.patient.first_name, "John");
        assert_eq!(second.provider.id, first.provider.id);
        assert_eq!(second.warnings.len(), 2);
        assert_eq!(second.warnings[1].severity, Severity::High);
    }
}
