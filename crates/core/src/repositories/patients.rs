use careplan_types::Mrn;
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{date_column, parse_column, search_needle, timestamp_column, to_db_date, to_db_timestamp};
use crate::models::Patient;
use crate::{CarePlanError, CarePlanResult};

pub(crate) const PATIENT_COLUMNS: &str =
    "pa.id, pa.first_name, pa.last_name, pa.mrn, pa.dob, pa.created_at, pa.updated_at";
pub(crate) const PATIENT_COLUMN_COUNT: usize = 7;

pub(crate) fn patient_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Patient> {
    Ok(Patient {
        id: row.get(offset)?,
        first_name: row.get(offset + 1)?,
        last_name: row.get(offset + 2)?,
        mrn: parse_column(row, offset + 3, Mrn::parse)?,
        dob: date_column(row, offset + 4)?,
        created_at: timestamp_column(row, offset + 5)?,
        updated_at: timestamp_column(row, offset + 6)?,
    })
}

pub fn insert_patient(
    conn: &Connection,
    first_name: &str,
    last_name: &str,
    mrn: &Mrn,
    dob: NaiveDate,
) -> CarePlanResult<Patient> {
    let now = to_db_timestamp(Utc::now());
    conn.execute(
        "INSERT INTO patients (first_name, last_name, mrn, dob, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![
            first_name.trim(),
            last_name.trim(),
            mrn.as_str(),
            to_db_date(dob),
            now
        ],
    )?;
    let id = conn.last_insert_rowid();
    get_patient(conn, id)?.ok_or(CarePlanError::NotFound {
        entity: "patient",
        id,
    })
}

pub fn get_patient(conn: &Connection, id: i64) -> CarePlanResult<Option<Patient>> {
    let sql = format!("SELECT {PATIENT_COLUMNS} FROM patients pa WHERE pa.id = ?1");
    Ok(conn
        .query_row(&sql, params![id], |row| patient_from_row(row, 0))
        .optional()?)
}

pub fn find_patient_by_mrn(conn: &Connection, mrn: &str) -> CarePlanResult<Option<Patient>> {
    find_other_patient_with_mrn(conn, mrn, None)
}

/// Patient holding `mrn`, other than `exclude_id`.
pub fn find_other_patient_with_mrn(
    conn: &Connection,
    mrn: &str,
    exclude_id: Option<i64>,
) -> CarePlanResult<Option<Patient>> {
    let sql = format!(
        "SELECT {PATIENT_COLUMNS} FROM patients pa
         WHERE pa.mrn = ?1 AND (?2 IS NULL OR pa.id != ?2)
         ORDER BY pa.id LIMIT 1"
    );
    Ok(conn
        .query_row(&sql, params![mrn.trim(), exclude_id], |row| {
            patient_from_row(row, 0)
        })
        .optional()?)
}

/// A patient with a different MRN but the same name (case-insensitive) and date of birth.
pub fn find_patient_by_name_and_dob(
    conn: &Connection,
    first_name: &str,
    last_name: &str,
    dob: NaiveDate,
    exclude_mrn: &str,
    exclude_id: Option<i64>,
) -> CarePlanResult<Option<Patient>> {
    let sql = format!(
        "SELECT {PATIENT_COLUMNS} FROM patients pa
         WHERE fold_case(pa.first_name) = ?1 AND fold_case(pa.last_name) = ?2 AND pa.dob = ?3
           AND pa.mrn != ?4 AND (?5 IS NULL OR pa.id != ?5)
         ORDER BY pa.last_name, pa.first_name, pa.id LIMIT 1"
    );
    Ok(conn
        .query_row(
            &sql,
            params![
                first_name.trim().to_lowercase(),
                last_name.trim().to_lowercase(),
                to_db_date(dob),
                exclude_mrn.trim(),
                exclude_id
            ],
            |row| patient_from_row(row, 0),
        )
        .optional()?)
}

/// All patients ordered by last then first name, optionally filtered by name or MRN.
pub fn list_patients(conn: &Connection, search: Option<&str>) -> CarePlanResult<Vec<Patient>> {
    let sql = format!(
        "SELECT {PATIENT_COLUMNS} FROM patients pa
         WHERE ?1 IS NULL
            OR instr(fold_case(pa.first_name), ?1) > 0
            OR instr(fold_case(pa.last_name), ?1) > 0
            OR instr(pa.mrn, ?1) > 0
         ORDER BY pa.last_name, pa.first_name, pa.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![search_needle(search)], |row| {
        patient_from_row(row, 0)
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn update_patient(
    conn: &Connection,
    id: i64,
    first_name: &str,
    last_name: &str,
    mrn: &Mrn,
    dob: NaiveDate,
) -> CarePlanResult<Patient> {
    let changed = conn.execute(
        "UPDATE patients SET first_name = ?1, last_name = ?2, mrn = ?3, dob = ?4, updated_at = ?5
         WHERE id = ?6",
        params![
            first_name.trim(),
            last_name.trim(),
            mrn.as_str(),
            to_db_date(dob),
            to_db_timestamp(Utc::now()),
            id
        ],
    )?;
    if changed == 0 {
        return Err(CarePlanError::NotFound {
            entity: "patient",
            id,
        });
    }
    get_patient(conn, id)?.ok_or(CarePlanError::NotFound {
        entity: "patient",
        id,
    })
}

/// Delete a patient together with their orders and care plans.
///
/// Returns the number of orders removed by the cascade.
pub fn delete_patient(conn: &Connection, id: i64) -> CarePlanResult<usize> {
    let order_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM orders WHERE patient_id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    let changed = conn.execute("DELETE FROM patients WHERE id = ?1", params![id])?;
    if changed == 0 {
        return Err(CarePlanError::NotFound {
            entity: "patient",
            id,
        });
    }
    tracing::info!(patient_id = id, orders_removed = order_count, "patient deleted");
    Ok(order_count as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::open_memory_database;
    use crate::repositories::{orders, test_support};

    #[test]
    fn test_insert_and_find_by_mrn() {
        let conn = open_memory_database().unwrap();
        let patient = test_support::patient(&conn, " John ", "Doe", "123456", (1980, 1, 15));

        assert_eq!(patient.first_name, "John");
        assert_eq!(patient.full_name(), "John Doe");
        assert_eq!(patient.dob, NaiveDate::from_ymd_opt(1980, 1, 15).unwrap());
        assert_eq!(find_patient_by_mrn(&conn, "123456").unwrap(), Some(patient));
        assert!(find_patient_by_mrn(&conn, "654321").unwrap().is_none());
    }

    #[test]
    fn test_find_by_name_and_dob_ignores_case_and_same_mrn() {
        let conn = open_memory_database().unwrap();
        test_support::patient(&conn, "John", "Doe", "123456", (1980, 1, 15));
        let dob = NaiveDate::from_ymd_opt(1980, 1, 15).unwrap();

        let found = find_patient_by_name_and_dob(&conn, "JOHN", "doe", dob, "654321", None).unwrap();
        assert_eq!(found.map(|p| p.mrn.to_string()), Some("123456".to_string()));

        let same_mrn = find_patient_by_name_and_dob(&conn, "John", "Doe", dob, "123456", None).unwrap();
        assert!(same_mrn.is_none());
    }

    #[test]
    fn test_list_patients_orders_by_last_then_first_name() {
        let conn = open_memory_database().unwrap();
        test_support::patient(&conn, "Zoe", "Adams", "111111", (1990, 1, 1));
        test_support::patient(&conn, "Amy", "Brown", "222222", (1990, 1, 1));
        test_support::patient(&conn, "Abe", "Adams", "333333", (1990, 1, 1));

        let names: Vec<_> = list_patients(&conn, None)
            .unwrap()
            .iter()
            .map(Patient::full_name)
            .collect();
        assert_eq!(names, vec!["Abe Adams", "Zoe Adams", "Amy Brown"]);

        assert_eq!(list_patients(&conn, Some("brown")).unwrap().len(), 1);
        assert_eq!(list_patients(&conn, Some("33333")).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_patient_cascades_to_orders() {
        let conn = open_memory_database().unwrap();
        let provider = test_support::provider(&conn, "Dr. A", "1111111111");
        let patient = test_support::patient(&conn, "John", "Doe", "123456", (1980, 1, 15));
        let order = test_support::order(&conn, &patient, &provider, "IVIG");

        let removed = delete_patient(&conn, patient.id).unwrap();
        assert_eq!(removed, 1);
        assert!(orders::get_order(&conn, order.id).unwrap().is_none());
        assert!(matches!(
            delete_patient(&conn, patient.id),
            Err(CarePlanError::NotFound { .. })
        ));
    }
}
