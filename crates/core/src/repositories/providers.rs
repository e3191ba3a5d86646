use careplan_types::Npi;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{parse_column, search_needle, timestamp_column, to_db_timestamp};
use crate::models::Provider;
use crate::{CarePlanError, CarePlanResult};

pub(crate) const PROVIDER_COLUMNS: &str = "pr.id, pr.name, pr.npi, pr.created_at, pr.updated_at";

pub(crate) fn provider_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Provider> {
    Ok(Provider {
        id: row.get(offset)?,
        name: row.get(offset + 1)?,
        npi: parse_column(row, offset + 2, Npi::parse)?,
        created_at: timestamp_column(row, offset + 3)?,
        updated_at: timestamp_column(row, offset + 4)?,
    })
}

pub fn insert_provider(conn: &Connection, name: &str, npi: &Npi) -> CarePlanResult<Provider> {
    let now = to_db_timestamp(Utc::now());
    conn.execute(
        "INSERT INTO providers (name, npi, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
        params![name.trim(), npi.as_str(), now],
    )?;
    let id = conn.last_insert_rowid();
    get_provider(conn, id)?.ok_or(CarePlanError::NotFound {
        entity: "provider",
        id,
    })
}

pub fn get_provider(conn: &Connection, id: i64) -> CarePlanResult<Option<Provider>> {
    let sql = format!("SELECT {PROVIDER_COLUMNS} FROM providers pr WHERE pr.id = ?1");
    Ok(conn
        .query_row(&sql, params![id], |row| provider_from_row(row, 0))
        .optional()?)
}

pub fn find_provider_by_npi(conn: &Connection, npi: &str) -> CarePlanResult<Option<Provider>> {
    let sql = format!("SELECT {PROVIDER_COLUMNS} FROM providers pr WHERE pr.npi = ?1");
    Ok(conn
        .query_row(&sql, params![npi.trim()], |row| provider_from_row(row, 0))
        .optional()?)
}

/// Provider holding `npi`, other than `exclude_id`.
pub fn find_other_provider_with_npi(
    conn: &Connection,
    npi: &str,
    exclude_id: Option<i64>,
) -> CarePlanResult<Option<Provider>> {
    let sql = format!(
        "SELECT {PROVIDER_COLUMNS} FROM providers pr
         WHERE pr.npi = ?1 AND (?2 IS NULL OR pr.id != ?2)
         ORDER BY pr.id LIMIT 1"
    );
    Ok(conn
        .query_row(&sql, params![npi.trim(), exclude_id], |row| {
            provider_from_row(row, 0)
        })
        .optional()?)
}

/// Providers with a different NPI whose name contains any of `name_parts` (case-insensitive).
pub fn find_providers_with_similar_name(
    conn: &Connection,
    name_parts: &[String],
    exclude_npi: &str,
    exclude_id: Option<i64>,
    limit: usize,
) -> CarePlanResult<Vec<Provider>> {
    if name_parts.is_empty() {
        return Ok(Vec::new());
    }

    let name_clause = (0..name_parts.len())
        .map(|i| format!("instr(fold_case(pr.name), ?{}) > 0", i + 4))
        .collect::<Vec<_>>()
        .join(" OR ");
    let sql = format!(
        "SELECT {PROVIDER_COLUMNS} FROM providers pr
         WHERE pr.npi != ?1 AND (?2 IS NULL OR pr.id != ?2) AND ({name_clause})
         ORDER BY pr.name, pr.id LIMIT ?3"
    );

    let mut values: Vec<Box<dyn rusqlite::ToSql>> = vec![
        Box::new(exclude_npi.trim().to_string()),
        Box::new(exclude_id),
        Box::new(limit as i64),
    ];
    for part in name_parts {
        values.push(Box::new(part.to_lowercase()));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(values.iter()), |row| {
        provider_from_row(row, 0)
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// All providers ordered by name, optionally filtered by name or NPI.
pub fn list_providers(conn: &Connection, search: Option<&str>) -> CarePlanResult<Vec<Provider>> {
    let sql = format!(
        "SELECT {PROVIDER_COLUMNS} FROM providers pr
         WHERE ?1 IS NULL OR instr(fold_case(pr.name), ?1) > 0 OR instr(pr.npi, ?1) > 0
         ORDER BY pr.name, pr.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![search_needle(search)], |row| {
        provider_from_row(row, 0)
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn update_provider(
    conn: &Connection,
    id: i64,
    name: &str,
    npi: &Npi,
) -> CarePlanResult<Provider> {
    let changed = conn.execute(
        "UPDATE providers SET name = ?1, npi = ?2, updated_at = ?3 WHERE id = ?4",
        params![name.trim(), npi.as_str(), to_db_timestamp(Utc::now()), id],
    )?;
    if changed == 0 {
        return Err(CarePlanError::NotFound {
            entity: "provider",
            id,
        });
    }
    get_provider(conn, id)?.ok_or(CarePlanError::NotFound {
        entity: "provider",
        id,
    })
}

/// Delete a provider. Providers that still have orders cannot be deleted.
pub fn delete_provider(conn: &Connection, id: i64) -> CarePlanResult<()> {
    let provider = get_provider(conn, id)?.ok_or(CarePlanError::NotFound {
        entity: "provider",
        id,
    })?;

    let order_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM orders WHERE provider_id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    if order_count > 0 {
        return Err(CarePlanError::ProtectedDelete(format!(
            "Cannot delete provider {provider}: {order_count} order(s) still reference it"
        )));
    }

    conn.execute("DELETE FROM providers WHERE id = ?1", params![id])?;
    tracing::info!(provider_id = id, "provider deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::open_memory_database;
    use crate::repositories::test_support;

    #[test]
    fn test_insert_and_find_by_npi() {
        let conn = open_memory_database().unwrap();
        let created = test_support::provider(&conn, "  Dr. Jane Smith ", "1234567890");

        assert_eq!(created.name, "Dr. Jane Smith");
        let found = find_provider_by_npi(&conn, " 1234567890 ")
            .unwrap()
            .expect("provider should be found");
        assert_eq!(found, created);
        assert!(find_provider_by_npi(&conn, "0000000000").unwrap().is_none());
    }

    #[test]
    fn test_npi_is_unique() {
        let conn = open_memory_database().unwrap();
        test_support::provider(&conn, "Dr. A", "1234567890");
        let err = insert_provider(&conn, "Dr. B", &Npi::parse("1234567890").unwrap())
            .expect_err("duplicate NPI must fail");
        assert!(matches!(err, CarePlanError::Database(_)));
    }

    #[test]
    fn test_similar_name_search_is_case_insensitive_and_skips_same_npi() {
        let conn = open_memory_database().unwrap();
        test_support::provider(&conn, "Dr. Jane Smith", "1234567890");
        test_support::provider(&conn, "Dr. JANE Doe", "2222222222");

        let found = find_providers_with_similar_name(
            &conn,
            &["jane".to_string()],
            "2222222222",
            None,
            5,
        )
        .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].npi.as_str(), "1234567890");
    }

    #[test]
    fn test_list_providers_orders_by_name_and_filters() {
        let conn = open_memory_database().unwrap();
        test_support::provider(&conn, "Dr. Zed", "1111111111");
        test_support::provider(&conn, "Dr. Adams", "2222222222");

        let names: Vec<_> = list_providers(&conn, None)
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Dr. Adams", "Dr. Zed"]);

        let by_npi = list_providers(&conn, Some("11111")).unwrap();
        assert_eq!(by_npi.len(), 1);
        assert_eq!(by_npi[0].name, "Dr. Zed");
    }

    #[test]
    fn test_update_provider_changes_name() {
        let conn = open_memory_database().unwrap();
        let provider = test_support::provider(&conn, "Dr. Typo", "1111111111");
        let updated = update_provider(&conn, provider.id, "Dr. Fixed", &provider.npi).unwrap();
        assert_eq!(updated.name, "Dr. Fixed");
        assert!(updated.updated_at >= provider.updated_at);
    }

    #[test]
    fn test_delete_provider_with_orders_is_blocked() {
        let conn = open_memory_database().unwrap();
        let provider = test_support::provider(&conn, "Dr. Busy", "1111111111");
        let patient = test_support::patient(&conn, "John", "Doe", "123456", (1980, 1, 15));
        test_support::order(&conn, &patient, &provider, "IVIG");

        let err = delete_provider(&conn, provider.id).expect_err("delete should be blocked");
        assert!(matches!(err, CarePlanError::ProtectedDelete(_)));
        assert!(get_provider(&conn, provider.id).unwrap().is_some());
    }

    #[test]
    fn test_delete_provider_without_orders() {
        let conn = open_memory_database().unwrap();
        let provider = test_support::provider(&conn, "Dr. Idle", "1111111111");
        delete_provider(&conn, provider.id).unwrap();
        assert!(get_provider(&conn, provider.id).unwrap().is_none());
        assert!(matches!(
            delete_provider(&conn, provider.id),
            Err(CarePlanError::NotFound { .. })
        ));
    }
}
