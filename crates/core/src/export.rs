//! CSV export of orders for reporting.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::models::CarePlan;
use crate::repositories::{care_plans, orders};
use crate::CarePlanResult;

const HEADER: [&str; 17] = [
    "Order ID",
    "Status",
    "Created Date",
    "Patient First Name",
    "Patient Last Name",
    "Patient MRN",
    "Patient DOB",
    "Provider Name",
    "Provider NPI",
    "Primary Diagnosis Code",
    "Primary Diagnosis Description",
    "Additional Diagnoses",
    "Medication Name",
    "Medication History",
    "Care Plan Generated",
    "Care Plan Model",
    "Generation Time (ms)",
];

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn push_row<S: AsRef<str>>(out: &mut String, fields: &[S]) {
    let row = fields
        .iter()
        .map(|f| escape_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    out.push_str(&row);
    out.push_str("\r\n");
}

/// All orders, newest first, with their care plan summary, as CSV text.
pub fn export_orders_csv(conn: &Connection) -> CarePlanResult<String> {
    let plans: HashMap<i64, CarePlan> = care_plans::list_care_plans(conn, None)?
        .into_iter()
        .map(|p| (p.care_plan.order_id, p.care_plan))
        .collect();
    let details = orders::list_order_details(conn, None)?;

    let mut out = String::new();
    push_row(&mut out, &HEADER);

    for detail in &details {
        let order = &detail.order;
        let plan = plans.get(&order.id);
        let additional: Vec<&str> = order.additional_diagnoses.iter().map(|c| c.as_str()).collect();

        push_row(
            &mut out,
            &[
                order.id.to_string(),
                order.status.to_string(),
                order.created_at.format("%Y-%m-%d %H:%M").to_string(),
                detail.patient.first_name.clone(),
                detail.patient.last_name.clone(),
                detail.patient.mrn.to_string(),
                detail.patient.dob.format("%Y-%m-%d").to_string(),
                detail.provider.name.clone(),
                detail.provider.npi.to_string(),
                order.primary_diagnosis_code.to_string(),
                order.primary_diagnosis_description.clone(),
                additional.join(", "),
                order.medication_name.clone(),
                order.medication_history.join(", "),
                if plan.is_some() { "Yes" } else { "No" }.to_string(),
                plan.map(|p| p.model_used.clone()).unwrap_or_default(),
                plan.and_then(|p| p.generation_time_ms)
                    .map(|ms| ms.to_string())
                    .unwrap_or_default(),
            ],
        );
    }

    tracing::info!(rows = details.len(), "exported orders to CSV");
    Ok(out)
}

/// `orders_export_YYYYmmdd_HHMMSS.csv`
pub fn export_filename(now: DateTime<Utc>) -> String {
    format!("orders_export_{}.csv", now.format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::open_memory_database;
    use crate::models::NewCarePlan;
    use crate::repositories::test_support;
    use chrono::TimeZone;

    #[test]
    fn test_escape_field_quotes_only_when_needed() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("I10, K21.0"), "\"I10, K21.0\"");
        assert_eq!(escape_field("Dr. \"Jay\" Smith"), "\"Dr. \"\"Jay\"\" Smith\"");
        assert_eq!(escape_field("line\nbreak"), "\"line\nbreak\"");
        assert_eq!(escape_field(""), "");
    }

    #[test]
    fn test_export_empty_database_has_header_only() {
        let conn = open_memory_database().unwrap();
        let csv = export_orders_csv(&conn).unwrap();
        assert_eq!(csv.lines().count(), 1);
        assert!(csv.starts_with("Order ID,Status,Created Date,"));
        assert!(csv.ends_with("Care Plan Generated,Care Plan Model,Generation Time (ms)\r\n"));
    }

    #[test]
    fn test_export_rows_with_and_without_care_plan() {
        let conn = open_memory_database().unwrap();
        let provider = test_support::provider(&conn, "Dr. Smith, Jane", "1234567890");
        let patient = test_support::patient(&conn, "John", "Doe", "123456", (1980, 1, 15));

        let mut new = test_support::new_order(&patient, &provider, "IVIG");
        new.additional_diagnoses = vec![careplan_types::Icd10Code::parse("I10").unwrap()];
        new.medication_history = vec!["Prednisone".into()];
        let with_plan = orders::insert_order(&conn, &new).unwrap();
        let without_plan = test_support::order(&conn, &patient, &provider, "Rituximab");
        test_support::backdate_order(&conn, with_plan.id, Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 0).unwrap());
        care_plans::insert_care_plan(
            &conn,
            with_plan.id,
            &NewCarePlan {
                content: "Plan".into(),
                model_used: "mock-claude-model".into(),
                generation_time_ms: Some(512),
            },
            Utc::now(),
        )
        .unwrap();

        let csv = export_orders_csv(&conn).unwrap();
        let rows: Vec<&str> = csv.split("\r\n").filter(|r| !r.is_empty()).collect();
        assert_eq!(rows.len(), 3);

        // Newest first: the backdated order is last.
        assert!(rows[1].starts_with(&format!("{},draft,", without_plan.id)));
        assert!(rows[1].ends_with(",Rituximab,,No,,"));
        assert_eq!(
            rows[2],
            format!(
                "{},draft,2024-01-02 03:04,John,Doe,123456,1980-01-15,\"Dr. Smith, Jane\",1234567890,\
                 G70.00,Myasthenia gravis,I10,IVIG,Prednisone,Yes,mock-claude-model,512",
                with_plan.id
            )
        );
    }

    #[test]
    fn test_export_filename_format() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(export_filename(now), "orders_export_20240309_140507.csv");
    }
}
