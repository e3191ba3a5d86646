//! Domain records for providers, patients, orders and care plans.
//!
//! These are the shapes stored in SQLite and returned by the REST API. Identifiers use the
//! validated types from `careplan-types`, so a record loaded from the database is as trustworthy
//! as one that has just passed the order form.

use careplan_types::{Icd10Code, Mrn, Npi};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Referring physician.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Provider {
    pub id: i64,
    /// Full name, e.g. "Dr. Jane Smith".
    pub name: String,
    /// National Provider Identifier, unique.
    #[schema(value_type = String, example = "1234567890")]
    pub npi: Npi,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (NPI: {})", self.name, self.npi)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Patient {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    /// Medical Record Number, unique.
    #[schema(value_type = String, example = "123456")]
    pub mrn: Mrn,
    pub dob: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl std::fmt::Display for Patient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (MRN: {})", self.full_name(), self.mrn)
    }
}

/// Lifecycle of an order. New orders start as `Draft`; generating a care plan completes them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Draft,
    Submitted,
    Completed,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Draft => "draft",
            OrderStatus::Submitted => "submitted",
            OrderStatus::Completed => "completed",
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = crate::CarePlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(OrderStatus::Draft),
            "submitted" => Ok(OrderStatus::Submitted),
            "completed" => Ok(OrderStatus::Completed),
            other => Err(crate::CarePlanError::CorruptRow {
                field: "status",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A care plan order linking a patient, a provider, a diagnosis and a medication.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: i64,
    pub patient_id: i64,
    pub provider_id: i64,
    #[schema(value_type = String, example = "G70.00")]
    pub primary_diagnosis_code: Icd10Code,
    pub primary_diagnosis_description: String,
    #[schema(value_type = Vec<String>)]
    pub additional_diagnoses: Vec<Icd10Code>,
    pub medication_name: String,
    pub medication_history: Vec<String>,
    /// Clinical notes pasted by the medical assistant; the model's main input.
    pub patient_records: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// `"{code} - {description}"`, as shown in prompts and downloads.
    pub fn primary_diagnosis(&self) -> String {
        format!(
            "{} - {}",
            self.primary_diagnosis_code, self.primary_diagnosis_description
        )
    }
}

/// Fields needed to insert an order.
#[derive(Clone, Debug)]
pub struct NewOrder {
    pub patient_id: i64,
    pub provider_id: i64,
    pub primary_diagnosis_code: Icd10Code,
    pub primary_diagnosis_description: String,
    pub additional_diagnoses: Vec<Icd10Code>,
    pub medication_name: String,
    pub medication_history: Vec<String>,
    pub patient_records: String,
}

/// An order together with the patient and provider it references.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct OrderDetail {
    pub order: Order,
    pub patient: Patient,
    pub provider: Provider,
}

/// Generated care plan for one order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CarePlan {
    pub id: i64,
    pub order_id: i64,
    pub content: String,
    /// Model identifier, e.g. "claude-sonnet-4-5-20250929".
    pub model_used: String,
    pub generated_at: DateTime<Utc>,
    pub generation_time_ms: Option<i64>,
    /// Set once a person has edited the generated text.
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewCarePlan {
    pub content: String,
    pub model_used: String,
    pub generation_time_ms: Option<i64>,
}

/// A care plan loaded with its order context, used for few-shot examples.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct CarePlanWithOrder {
    pub care_plan: CarePlan,
    pub order: OrderDetail,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_order_status_round_trips_through_text() {
        for status in [OrderStatus::Draft, OrderStatus::Submitted, OrderStatus::Completed] {
            assert_eq!(OrderStatus::from_str(status.as_str()).unwrap(), status);
        }
        assert!(OrderStatus::from_str("cancelled").is_err());
    }

    #[test]
    fn test_order_status_serialises_lowercase() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::Completed).unwrap(),
            "\"completed\""
        );
        assert_eq!(OrderStatus::default(), OrderStatus::Draft);
    }
}
