use careplan_types::Icd10Code;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::patients::{patient_from_row, PATIENT_COLUMNS, PATIENT_COLUMN_COUNT};
use super::providers::{provider_from_row, PROVIDER_COLUMNS};
use super::{json_list_column, parse_column, search_needle, timestamp_column, to_db_timestamp};
use crate::models::{NewOrder, Order, OrderDetail, OrderStatus};
use crate::{CarePlanError, CarePlanResult};

pub(crate) const ORDER_COLUMNS: &str = "o.id, o.patient_id, o.provider_id, o.primary_diagnosis_code, \
     o.primary_diagnosis_description, o.additional_diagnoses, o.medication_name, \
     o.medication_history, o.patient_records, o.status, o.created_at, o.updated_at";
pub(crate) const ORDER_COLUMN_COUNT: usize = 12;

const DETAIL_FROM: &str = "FROM orders o
     JOIN patients pa ON pa.id = o.patient_id
     JOIN providers pr ON pr.id = o.provider_id";

pub(crate) fn order_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Order> {
    let additional_idx = offset + 5;
    let additional_diagnoses = json_list_column(row, additional_idx)?
        .iter()
        .map(|code| Icd10Code::parse(code))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(additional_idx, Type::Text, Box::new(e)))?;

    Ok(Order {
        id: row.get(offset)?,
        patient_id: row.get(offset + 1)?,
        provider_id: row.get(offset + 2)?,
        primary_diagnosis_code: parse_column(row, offset + 3, Icd10Code::parse)?,
        primary_diagnosis_description: row.get(offset + 4)?,
        additional_diagnoses,
        medication_name: row.get(offset + 6)?,
        medication_history: json_list_column(row, offset + 7)?,
        patient_records: row.get(offset + 8)?,
        status: parse_column(row, offset + 9, |s| s.parse::<OrderStatus>())?,
        created_at: timestamp_column(row, offset + 10)?,
        updated_at: timestamp_column(row, offset + 11)?,
    })
}

pub(crate) fn order_detail_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<OrderDetail> {
    let patient_offset = offset + ORDER_COLUMN_COUNT;
    Ok(OrderDetail {
        order: order_from_row(row, offset)?,
        patient: patient_from_row(row, patient_offset)?,
        provider: provider_from_row(row, patient_offset + PATIENT_COLUMN_COUNT)?,
    })
}

pub(crate) fn order_detail_select() -> String {
    format!("SELECT {ORDER_COLUMNS}, {PATIENT_COLUMNS}, {PROVIDER_COLUMNS} {DETAIL_FROM}")
}

pub fn insert_order(conn: &Connection, new: &NewOrder) -> CarePlanResult<Order> {
    let additional: Vec<&str> = new.additional_diagnoses.iter().map(Icd10Code::as_str).collect();
    let additional_json = serde_json::to_string(&additional).map_err(CarePlanError::Serialization)?;
    let history_json =
        serde_json::to_string(&new.medication_history).map_err(CarePlanError::Serialization)?;
    let now = to_db_timestamp(Utc::now());

    conn.execute(
        "INSERT INTO orders (patient_id, provider_id, primary_diagnosis_code,
             primary_diagnosis_description, additional_diagnoses, medication_name,
             medication_history, patient_records, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
        params![
            new.patient_id,
            new.provider_id,
            new.primary_diagnosis_code.as_str(),
            new.primary_diagnosis_description.trim(),
            additional_json,
            new.medication_name.trim(),
            history_json,
            new.patient_records,
            OrderStatus::Draft.as_str(),
            now
        ],
    )?;
    let id = conn.last_insert_rowid();
    tracing::debug!(order_id = id, patient_id = new.patient_id, "order inserted");
    get_order(conn, id)?.ok_or(CarePlanError::NotFound { entity: "order", id })
}

pub fn get_order(conn: &Connection, id: i64) -> CarePlanResult<Option<Order>> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders o WHERE o.id = ?1");
    Ok(conn
        .query_row(&sql, params![id], |row| order_from_row(row, 0))
        .optional()?)
}

pub fn get_order_detail(conn: &Connection, id: i64) -> CarePlanResult<Option<OrderDetail>> {
    let sql = format!("{} WHERE o.id = ?1", order_detail_select());
    Ok(conn
        .query_row(&sql, params![id], |row| order_detail_from_row(row, 0))
        .optional()?)
}

/// Order detail or `NotFound`.
pub fn require_order_detail(conn: &Connection, id: i64) -> CarePlanResult<OrderDetail> {
    get_order_detail(conn, id)?.ok_or(CarePlanError::NotFound { entity: "order", id })
}

/// Orders with patient and provider, newest first.
pub fn list_order_details(conn: &Connection, limit: Option<usize>) -> CarePlanResult<Vec<OrderDetail>> {
    let sql = format!(
        "{} ORDER BY o.created_at DESC, o.id DESC LIMIT ?1",
        order_detail_select()
    );
    let limit = limit.map(|l| l as i64).unwrap_or(-1);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![limit], |row| order_detail_from_row(row, 0))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Admin search: filter by status and by patient name, MRN or medication.
pub fn search_order_details(
    conn: &Connection,
    status: Option<OrderStatus>,
    search: Option<&str>,
) -> CarePlanResult<Vec<OrderDetail>> {
    let sql = format!(
        "{} WHERE (?1 IS NULL OR o.status = ?1)
           AND (?2 IS NULL
                OR instr(fold_case(pa.first_name), ?2) > 0
                OR instr(fold_case(pa.last_name), ?2) > 0
                OR instr(pa.mrn, ?2) > 0
                OR instr(fold_case(o.medication_name), ?2) > 0)
         ORDER BY o.created_at DESC, o.id DESC",
        order_detail_select()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![status.map(OrderStatus::as_str), search_needle(search)],
        |row| order_detail_from_row(row, 0),
    )?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Most recent order for this patient and medication (case-insensitive) created at or after `since`.
pub fn find_recent_order_for_medication(
    conn: &Connection,
    patient_id: i64,
    medication_name: &str,
    since: DateTime<Utc>,
    exclude_id: Option<i64>,
) -> CarePlanResult<Option<Order>> {
    let sql = format!(
        "SELECT {ORDER_COLUMNS} FROM orders o
         WHERE o.patient_id = ?1 AND fold_case(o.medication_name) = ?2 AND o.created_at >= ?3
           AND (?4 IS NULL OR o.id != ?4)
         ORDER BY o.created_at DESC, o.id DESC LIMIT 1"
    );
    Ok(conn
        .query_row(
            &sql,
            params![
                patient_id,
                medication_name.trim().to_lowercase(),
                to_db_timestamp(since),
                exclude_id
            ],
            |row| order_from_row(row, 0),
        )
        .optional()?)
}

pub fn set_order_status(conn: &Connection, id: i64, status: OrderStatus) -> CarePlanResult<()> {
    let changed = conn.execute(
        "UPDATE orders SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), to_db_timestamp(Utc::now()), id],
    )?;
    if changed == 0 {
        return Err(CarePlanError::NotFound { entity: "order", id });
    }
    Ok(())
}

/// Delete an order and its care plan.
pub fn delete_order(conn: &Connection, id: i64) -> CarePlanResult<()> {
    let changed = conn.execute("DELETE FROM orders WHERE id = ?1", params![id])?;
    if changed == 0 {
        return Err(CarePlanError::NotFound { entity: "order", id });
    }
    tracing::info!(order_id = id, "order deleted");
    Ok(())
}
