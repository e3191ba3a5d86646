//! Duplicate detection for providers, patients and orders.
//!
//! Each check is a single pass over a few indexed queries and yields a [`DuplicateResult`]:
//!
//! - providers: an exact NPI match blocks, a similar name under another NPI warns
//! - patients: never block; an MRN reused with a different name or DOB warns, as does the same
//!   name and DOB under another MRN
//! - orders: the same patient and medication within the window warns, with high severity when
//!   the earlier order was created the same day

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::Connection;
use serde::Serialize;
use utoipa::ToSchema;

use careplan_types::{Mrn, Npi};

use crate::constants::{NAME_PREFIXES, SIMILAR_PROVIDER_LIMIT};
use crate::models::{Patient, Provider};
use crate::repositories::{orders, patients, providers};
use crate::{CarePlanError, CarePlanResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateKind {
    Ok,
    Warn,
    Block,
}

/// Display weight of a warning.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    #[default]
    Medium,
    Low,
}

/// A record that triggered a duplicate result. Only the fields relevant to the entity are set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct SimilarItem {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub npi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mrn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dob: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medication: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl SimilarItem {
    fn provider(provider: &Provider) -> Self {
        Self {
            id: provider.id,
            name: Some(provider.name.clone()),
            npi: Some(provider.npi.to_string()),
            ..Self::default()
        }
    }

    fn patient(patient: &Patient) -> Self {
        Self {
            id: patient.id,
            name: Some(patient.full_name()),
            mrn: Some(patient.mrn.to_string()),
            dob: Some(patient.dob.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct DuplicateResult {
    #[serde(rename = "type")]
    pub kind: DuplicateKind,
    pub message: String,
    pub similar_items: Vec<SimilarItem>,
    pub severity: Severity,
}

impl DuplicateResult {
    pub fn ok() -> Self {
        Self {
            kind: DuplicateKind::Ok,
            message: String::new(),
            similar_items: Vec::new(),
            severity: Severity::default(),
        }
    }

    fn new(kind: DuplicateKind, message: String, similar_items: Vec<SimilarItem>) -> Self {
        Self {
            kind,
            message,
            similar_items,
            severity: Severity::default(),
        }
    }

    fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.kind == DuplicateKind::Ok
    }

    pub fn is_warning(&self) -> bool {
        self.kind == DuplicateKind::Warn
    }

    pub fn is_blocking(&self) -> bool {
        self.kind == DuplicateKind::Block
    }

    pub fn is_high_severity(&self) -> bool {
        self.severity == Severity::High
    }
}

/// Name parts worth matching on: longer than three characters and not a courtesy prefix.
fn significant_name_parts(name: &str) -> Vec<String> {
    name.split_whitespace()
        .filter(|part| part.chars().count() > 3)
        .filter(|part| {
            let bare = part.to_lowercase();
            !NAME_PREFIXES.contains(&bare.trim_end_matches('.'))
        })
        .map(str::to_string)
        .collect()
}

/// Check a provider name and NPI against existing providers.
///
/// # Arguments
///
/// * `exclude_id` - Provider being edited, ignored by both rules.
///
/// # Returns
///
/// `Block` when another provider holds the NPI, `Warn` when up to five providers under other
/// NPIs share one of the first two significant name parts, otherwise `Ok`.
pub fn check_provider_duplicate(
    conn: &Connection,
    name: &str,
    npi: &str,
    exclude_id: Option<i64>,
) -> CarePlanResult<DuplicateResult> {
    let npi = npi.trim();
    if name.trim().is_empty() || npi.is_empty() {
        return Ok(DuplicateResult::ok());
    }

    if let Some(existing) = providers::find_other_provider_with_npi(conn, npi, exclude_id)? {
        return Ok(DuplicateResult::new(
            DuplicateKind::Block,
            format!("Provider with NPI {npi} already exists: {}", existing.name),
            vec![SimilarItem::provider(&existing)],
        ));
    }

    let parts = significant_name_parts(name);
    if parts.is_empty() {
        return Ok(DuplicateResult::ok());
    }
    let search: Vec<String> = parts.into_iter().take(2).collect();

    let similar = providers::find_providers_with_similar_name(
        conn,
        &search,
        npi,
        exclude_id,
        SIMILAR_PROVIDER_LIMIT,
    )?;
    if similar.is_empty() {
        return Ok(DuplicateResult::ok());
    }

    Ok(DuplicateResult::new(
        DuplicateKind::Warn,
        "Similar provider name exists with a different NPI. Please verify this is correct.".into(),
        similar.iter().map(SimilarItem::provider).collect(),
    ))
}

/// Check patient details against existing patients. Patients are never blocked: an existing MRN
/// means the existing record is reused for the order.
pub fn check_patient_duplicate(
    conn: &Connection,
    first_name: &str,
    last_name: &str,
    mrn: &str,
    dob: Option<NaiveDate>,
    exclude_id: Option<i64>,
) -> CarePlanResult<DuplicateResult> {
    let mrn = mrn.trim();
    if mrn.is_empty() {
        return Ok(DuplicateResult::ok());
    }

    if let Some(existing) = patients::find_other_patient_with_mrn(conn, mrn, exclude_id)? {
        let name_matches = existing.first_name.to_lowercase() == first_name.trim().to_lowercase()
            && existing.last_name.to_lowercase() == last_name.trim().to_lowercase();
        let dob_matches = dob.is_none_or(|dob| dob == existing.dob);

        if name_matches && dob_matches {
            return Ok(DuplicateResult::ok());
        }
        return Ok(DuplicateResult::new(
            DuplicateKind::Warn,
            format!(
                "Patient with MRN {mrn} already exists as {} {} (DOB: {}). \
                 The existing patient record will be used for this order.",
                existing.first_name, existing.last_name, existing.dob
            ),
            vec![SimilarItem::patient(&existing)],
        ));
    }

    let (first_name, last_name) = (first_name.trim(), last_name.trim());
    let Some(dob) = dob else {
        return Ok(DuplicateResult::ok());
    };
    if first_name.is_empty() || last_name.is_empty() {
        return Ok(DuplicateResult::ok());
    }

    match patients::find_patient_by_name_and_dob(conn, first_name, last_name, dob, mrn, exclude_id)? {
        Some(similar) => Ok(DuplicateResult::new(
            DuplicateKind::Warn,
            format!(
                "Patient with same name and date of birth exists with MRN {}. Is this a duplicate?",
                similar.mrn
            ),
            vec![SimilarItem::patient(&similar)],
        )),
        None => Ok(DuplicateResult::ok()),
    }
}

/// Check for an earlier order of the same medication for the same patient.
pub fn check_order_duplicate(
    conn: &Connection,
    patient_id: i64,
    medication_name: &str,
    days_window: i64,
    exclude_id: Option<i64>,
) -> CarePlanResult<DuplicateResult> {
    check_order_duplicate_at(conn, patient_id, medication_name, days_window, exclude_id, Utc::now())
}

/// [`check_order_duplicate`] against an explicit clock.
///
/// Only the most recent matching order created on or after `now - days_window` is considered.
pub fn check_order_duplicate_at(
    conn: &Connection,
    patient_id: i64,
    medication_name: &str,
    days_window: i64,
    exclude_id: Option<i64>,
    now: DateTime<Utc>,
) -> CarePlanResult<DuplicateResult> {
    let medication = medication_name.trim();
    if patient_id <= 0 || medication.is_empty() {
        return Ok(DuplicateResult::ok());
    }

    let cutoff = Duration::try_days(days_window)
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or_else(|| {
            CarePlanError::InvalidInput(format!(
                "order duplicate window of {days_window} days is out of range"
            ))
        })?;
    let Some(recent) =
        orders::find_recent_order_for_medication(conn, patient_id, medication, cutoff, exclude_id)?
    else {
        return Ok(DuplicateResult::ok());
    };

    let item = SimilarItem {
        id: recent.id,
        medication: Some(recent.medication_name.clone()),
        created_at: Some(recent.created_at.format("%Y-%m-%d %H:%M").to_string()),
        status: Some(recent.status.to_string()),
        ..SimilarItem::default()
    };

    let result = if recent.created_at.date_naive() == now.date_naive() {
        DuplicateResult::new(
            DuplicateKind::Warn,
            format!(
                "⚠️ DUPLICATE ALERT: An order for {medication_name} was ALREADY created for this \
                 patient TODAY at {}. This is likely a duplicate order.",
                recent.created_at.format("%I:%M %p")
            ),
            vec![item],
        )
        .with_severity(Severity::High)
    } else {
        DuplicateResult::new(
            DuplicateKind::Warn,
            format!(
                "An order for {medication_name} was created for this patient on {}. Is this a duplicate?",
                recent.created_at.format("%Y-%m-%d")
            ),
            vec![item],
        )
        .with_severity(Severity::Medium)
    };
    Ok(result)
}

/// Existing provider for an NPI, looked up only once the NPI has its full length.
pub fn get_existing_provider_by_npi(conn: &Connection, npi: &str) -> CarePlanResult<Option<Provider>> {
    if npi.len() != Npi::LEN {
        return Ok(None);
    }
    providers::find_provider_by_npi(conn, npi)
}

/// Existing patient for an MRN, looked up only once the MRN has its full length.
pub fn get_existing_patient_by_mrn(conn: &Connection, mrn: &str) -> CarePlanResult<Option<Patient>> {
    if mrn.len() != Mrn::LEN {
        return Ok(None);
    }
    patients::find_patient_by_mrn(conn, mrn)
}
