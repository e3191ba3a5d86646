use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::orders::{order_detail_from_row, ORDER_COLUMNS};
use super::patients::PATIENT_COLUMNS;
use super::providers::PROVIDER_COLUMNS;
use super::{optional_timestamp_column, timestamp_column, to_db_timestamp};
use crate::models::{CarePlan, CarePlanWithOrder, NewCarePlan};
use crate::{CarePlanError, CarePlanResult};

pub(crate) const CARE_PLAN_COLUMNS: &str = "cp.id, cp.order_id, cp.content, cp.model_used, \
     cp.generated_at, cp.generation_time_ms, cp.is_edited, cp.edited_at";
pub(crate) const CARE_PLAN_COLUMN_COUNT: usize = 8;

pub(crate) fn care_plan_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<CarePlan> {
    Ok(CarePlan {
        id: row.get(offset)?,
        order_id: row.get(offset + 1)?,
        content: row.get(offset + 2)?,
        model_used: row.get(offset + 3)?,
        generated_at: timestamp_column(row, offset + 4)?,
        generation_time_ms: row.get(offset + 5)?,
        is_edited: row.get(offset + 6)?,
        edited_at: optional_timestamp_column(row, offset + 7)?,
    })
}

fn care_plan_with_order_from_row(row: &Row<'_>) -> rusqlite::Result<CarePlanWithOrder> {
    Ok(CarePlanWithOrder {
        care_plan: care_plan_from_row(row, 0)?,
        order: order_detail_from_row(row, CARE_PLAN_COLUMN_COUNT)?,
    })
}

fn with_order_select() -> String {
    format!(
        "SELECT {CARE_PLAN_COLUMNS}, {ORDER_COLUMNS}, {PATIENT_COLUMNS}, {PROVIDER_COLUMNS}
         FROM care_plans cp
         JOIN orders o ON o.id = cp.order_id
         JOIN patients pa ON pa.id = o.patient_id
         JOIN providers pr ON pr.id = o.provider_id"
    )
}

pub fn insert_care_plan(
    conn: &Connection,
    order_id: i64,
    new: &NewCarePlan,
    generated_at: DateTime<Utc>,
) -> CarePlanResult<CarePlan> {
    conn.execute(
        "INSERT INTO care_plans (order_id, content, model_used, generated_at, generation_time_ms, is_edited)
         VALUES (?1, ?2, ?3, ?4, ?5, 0)",
        params![
            order_id,
            new.content,
            new.model_used,
            to_db_timestamp(generated_at),
            new.generation_time_ms
        ],
    )?;
    let id = conn.last_insert_rowid();
    get_care_plan(conn, id)?.ok_or(CarePlanError::NotFound {
        entity: "care plan",
        id,
    })
}

pub fn get_care_plan(conn: &Connection, id: i64) -> CarePlanResult<Option<CarePlan>> {
    let sql = format!("SELECT {CARE_PLAN_COLUMNS} FROM care_plans cp WHERE cp.id = ?1");
    Ok(conn
        .query_row(&sql, params![id], |row| care_plan_from_row(row, 0))
        .optional()?)
}

pub fn get_care_plan_for_order(conn: &Connection, order_id: i64) -> CarePlanResult<Option<CarePlan>> {
    let sql = format!("SELECT {CARE_PLAN_COLUMNS} FROM care_plans cp WHERE cp.order_id = ?1");
    Ok(conn
        .query_row(&sql, params![order_id], |row| care_plan_from_row(row, 0))
        .optional()?)
}

/// Care plan together with its order, patient and provider.
pub fn get_care_plan_with_order(conn: &Connection, id: i64) -> CarePlanResult<Option<CarePlanWithOrder>> {
    let sql = format!("{} WHERE cp.id = ?1", with_order_select());
    Ok(conn
        .query_row(&sql, params![id], care_plan_with_order_from_row)
        .optional()?)
}

/// Returns true when a plan existed and was removed.
pub fn delete_care_plan_for_order(conn: &Connection, order_id: i64) -> CarePlanResult<bool> {
    let removed = conn.execute("DELETE FROM care_plans WHERE order_id = ?1", params![order_id])?;
    Ok(removed > 0)
}

/// Store edited content and mark the plan as edited.
pub fn update_care_plan_content(
    conn: &Connection,
    id: i64,
    content: &str,
    edited_at: DateTime<Utc>,
) -> CarePlanResult<CarePlan> {
    let changed = conn.execute(
        "UPDATE care_plans SET content = ?1, is_edited = 1, edited_at = ?2 WHERE id = ?3",
        params![content, to_db_timestamp(edited_at), id],
    )?;
    if changed == 0 {
        return Err(CarePlanError::NotFound {
            entity: "care plan",
            id,
        });
    }
    get_care_plan(conn, id)?.ok_or(CarePlanError::NotFound {
        entity: "care plan",
        id,
    })
}

/// Most recently generated care plans with their order context.
///
/// # Arguments
///
/// * `limit` - Maximum number of plans to return.
/// * `exclude_order_id` - Order whose own plan must not be returned.
pub fn recent_care_plans(
    conn: &Connection,
    limit: usize,
    exclude_order_id: Option<i64>,
) -> CarePlanResult<Vec<CarePlanWithOrder>> {
    let sql = format!(
        "{} WHERE (?1 IS NULL OR cp.order_id != ?1)
         ORDER BY cp.generated_at DESC, cp.id DESC LIMIT ?2",
        with_order_select()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![exclude_order_id, limit as i64], care_plan_with_order_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Admin listing, newest first, optionally filtered by exact model name.
pub fn list_care_plans(conn: &Connection, model_used: Option<&str>) -> CarePlanResult<Vec<CarePlanWithOrder>> {
    let model = model_used.map(str::trim).filter(|m| !m.is_empty());
    let sql = format!(
        "{} WHERE (?1 IS NULL OR cp.model_used = ?1)
         ORDER BY cp.generated_at DESC, cp.id DESC",
        with_order_select()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![model], care_plan_with_order_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}
