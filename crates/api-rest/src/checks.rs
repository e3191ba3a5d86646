//! Live duplicate checks used while the order form is being filled in.
//!
//! These never fail on incomplete input: until an identifier reaches its full length the result
//! is simply `ok`.

use axum::{extract::State, response::Json};
use careplan_core::duplicates::{self, DuplicateResult};
use careplan_core::validation::parse_date;
use careplan_types::{Mrn, Npi};

use crate::error::{ApiError, ErrorRes};
use crate::types::{
    CheckOrderReq, CheckOrderRes, CheckPatientReq, CheckPatientRes, CheckProviderReq,
    CheckProviderRes,
};
use crate::AppState;

#[utoipa::path(
    post,
    path = "/api/check-provider",
    request_body = CheckProviderReq,
    responses(
        (status = 200, description = "Existing provider or duplicate result", body = CheckProviderRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
/// Check a provider name and NPI before the form is submitted
///
/// A provider already registered under the NPI is returned as `existing`; otherwise the
/// duplicate rules run.
#[axum::debug_handler]
pub async fn check_provider(
    State(state): State<AppState>,
    Json(req): Json<CheckProviderReq>,
) -> Result<Json<CheckProviderRes>, ApiError> {
    let name = req.provider_name.trim().to_string();
    let npi = req.provider_npi.trim().to_string();

    let res = state
        .with_db(move |conn| {
            if name.is_empty() {
                return Ok(CheckProviderRes {
                    existing: None,
                    result: DuplicateResult::ok(),
                });
            }
            if let Some(existing) = duplicates::get_existing_provider_by_npi(conn, &npi)? {
                return Ok(CheckProviderRes {
                    existing: Some(existing),
                    result: DuplicateResult::ok(),
                });
            }
            let result = if npi.len() == Npi::LEN {
                duplicates::check_provider_duplicate(conn, &name, &npi, None)?
            } else {
                DuplicateResult::ok()
            };
            Ok(CheckProviderRes {
                existing: None,
                result,
            })
        })
        .await?;
    Ok(Json(res))
}

#[utoipa::path(
    post,
    path = "/api/check-patient",
    request_body = CheckPatientReq,
    responses(
        (status = 200, description = "Existing patient or duplicate result", body = CheckPatientRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
/// Check patient details before the form is submitted
///
/// A patient already registered under the MRN is returned as `existing`; otherwise the name and
/// date of birth rule runs. An unparsable date of birth is ignored.
#[axum::debug_handler]
pub async fn check_patient(
    State(state): State<AppState>,
    Json(req): Json<CheckPatientReq>,
) -> Result<Json<CheckPatientRes>, ApiError> {
    let dob = parse_date(&req.patient_dob);

    let res = state
        .with_db(move |conn| {
            let mrn = req.patient_mrn.trim();
            if let Some(existing) = duplicates::get_existing_patient_by_mrn(conn, mrn)? {
                return Ok(CheckPatientRes {
                    existing: Some(existing),
                    result: DuplicateResult::ok(),
                });
            }
            let result = if mrn.len() == Mrn::LEN {
                duplicates::check_patient_duplicate(
                    conn,
                    &req.patient_first_name,
                    &req.patient_last_name,
                    mrn,
                    dob,
                    None,
                )?
            } else {
                DuplicateResult::ok()
            };
            Ok(CheckPatientRes {
                existing: None,
                result,
            })
        })
        .await?;
    Ok(Json(res))
}

#[utoipa::path(
    post,
    path = "/api/check-order",
    request_body = CheckOrderReq,
    responses(
        (status = 200, description = "Order duplicate result", body = CheckOrderRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
/// Check for a recent order of the same medication for a patient
#[axum::debug_handler]
pub async fn check_order(
    State(state): State<AppState>,
    Json(req): Json<CheckOrderReq>,
) -> Result<Json<CheckOrderRes>, ApiError> {
    let window = state.cfg.order_duplicate_window_days();
    let result = state
        .with_db(move |conn| {
            duplicates::check_order_duplicate(
                conn,
                req.patient_id,
                &req.medication_name,
                window,
                req.exclude_id,
            )
        })
        .await?;
    Ok(Json(CheckOrderRes { result }))
}

#[cfg(test)]
mod tests {
    use crate::router;
    use crate::test_support::*;
    use axum::http::StatusCode;
    use serde_json::json;
    use tower::ServiceExt;

    async fn post(state: &crate::AppState, uri: &str, body: serde_json::Value) -> serde_json::Value {
        let response = router(state.clone())
            .oneshot(json_request("POST", uri, body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        body_json(response).await
    }

    async fn seed_order(state: &crate::AppState) -> i64 {
        let response = router(state.clone())
            .oneshot(json_request("POST", "/orders", order_form()))
            .await
            .unwrap();
        body_json(response).await["order"]["patient"]["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_check_provider_returns_existing_by_npi() {
        let state = state();
        seed_order(&state).await;

        let body = post(
            &state,
            "/api/check-provider",
            json!({ "provider_name": "Dr. Jane Smith", "provider_npi": "1234567890" }),
        )
        .await;
        assert_eq!(body["existing"]["name"], "Dr. Jane Smith");
        assert_eq!(body["result"]["type"], "ok");
    }

    #[tokio::test]
    async fn test_check_provider_warns_on_similar_name() {
        let state = state();
        seed_order(&state).await;

        let body = post(
            &state,
            "/api/check-provider",
            json!({ "provider_name": "Dr. Jane Doe", "provider_npi": "2222222222" }),
        )
        .await;
        assert!(body["existing"].is_null());
        assert_eq!(body["result"]["type"], "warn");
        assert_eq!(body["result"]["similar_items"][0]["npi"], "1234567890");
    }

    #[tokio::test]
    async fn test_check_provider_ignores_partial_npi() {
        let state = state();
        seed_order(&state).await;

        let body = post(
            &state,
            "/api/check-provider",
            json!({ "provider_name": "Dr. Jane Doe", "provider_npi": "12345" }),
        )
        .await;
        assert_eq!(body["result"]["type"], "ok");
    }

    #[tokio::test]
    async fn test_check_patient_existing_and_name_dob_match() {
        let state = state();
        seed_order(&state).await;

        let existing = post(
            &state,
            "/api/check-patient",
            json!({ "patient_mrn": "123456" }),
        )
        .await;
        assert_eq!(existing["existing"]["first_name"], "John");

        let similar = post(
            &state,
            "/api/check-patient",
            json!({
                "patient_first_name": "john",
                "patient_last_name": "DOE",
                "patient_mrn": "999999",
                "patient_dob": "1980-01-15"
            }),
        )
        .await;
        assert!(similar["existing"].is_null());
        assert_eq!(similar["result"]["type"], "warn");

        let bad_dob = post(
            &state,
            "/api/check-patient",
            json!({
                "patient_first_name": "John",
                "patient_last_name": "Doe",
                "patient_mrn": "999999",
                "patient_dob": "not-a-date"
            }),
        )
        .await;
        assert_eq!(bad_dob["result"]["type"], "ok");
    }

    #[tokio::test]
    async fn test_check_order_flags_recent_same_medication() {
        let state = state();
        let patient_id = seed_order(&state).await;

        let body = post(
            &state,
            "/api/check-order",
            json!({ "patient_id": patient_id, "medication_name": "ivig" }),
        )
        .await;
        assert_eq!(body["result"]["type"], "warn");
        assert_eq!(body["result"]["severity"], "high");

        let other = post(
            &state,
            "/api/check-order",
            json!({ "patient_id": patient_id, "medication_name": "Rituximab" }),
        )
        .await;
        assert_eq!(other["result"]["type"], "ok");
    }
}
