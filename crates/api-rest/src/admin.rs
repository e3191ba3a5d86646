//! Admin console endpoints: search, filtered listing, updates and deletes.

use axum::{
    extract::{Path as AxumPath, Query, State},
    response::Json,
};
use careplan_core::admin::{update_patient_checked, update_provider_checked};
use careplan_core::repositories::{care_plans, orders, patients, providers};
use careplan_core::validation::parse_date;
use careplan_core::CarePlanError;
use chrono::Utc;

use crate::error::{ApiError, ErrorRes};
use crate::types::{
    CarePlanFilterQuery, DeleteRes, ListCarePlansRes, ListOrdersRes, ListPatientsRes,
    ListProvidersRes, OrderFilterQuery, SearchQuery, UpdatePatientReq, UpdatePatientRes,
    UpdateProviderReq, UpdateProviderRes,
};
use crate::AppState;

#[utoipa::path(
    get,
    path = "/admin/providers",
    params(SearchQuery),
    responses(
        (status = 200, description = "Providers ordered by name", body = ListProvidersRes)
    )
)]
#[axum::debug_handler]
pub async fn list_providers(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ListProvidersRes>, ApiError> {
    let providers = state
        .with_db(move |conn| providers::list_providers(conn, query.q.as_deref()))
        .await?;
    Ok(Json(ListProvidersRes { providers }))
}

#[utoipa::path(
    put,
    path = "/admin/providers/{id}",
    params(("id" = i64, Path, description = "Provider id")),
    request_body = UpdateProviderReq,
    responses(
        (status = 200, description = "Provider updated", body = UpdateProviderRes),
        (status = 400, description = "Invalid name or NPI", body = ErrorRes),
        (status = 404, description = "Provider not found", body = ErrorRes),
        (status = 409, description = "NPI held by another provider", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn update_provider(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i64>,
    Json(req): Json<UpdateProviderReq>,
) -> Result<Json<UpdateProviderRes>, ApiError> {
    let updated = state
        .with_db(move |conn| update_provider_checked(conn, id, &req.name, &req.npi))
        .await?;
    Ok(Json(UpdateProviderRes {
        provider: updated.record,
        warnings: updated.warnings,
    }))
}

#[utoipa::path(
    delete,
    path = "/admin/providers/{id}",
    params(("id" = i64, Path, description = "Provider id")),
    responses(
        (status = 200, description = "Provider deleted", body = DeleteRes),
        (status = 404, description = "Provider not found", body = ErrorRes),
        (status = 409, description = "Provider still has orders", body = ErrorRes)
    )
)]
/// Delete a provider that has no orders
#[axum::debug_handler]
pub async fn delete_provider(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i64>,
) -> Result<Json<DeleteRes>, ApiError> {
    state
        .with_db(move |conn| providers::delete_provider(conn, id))
        .await?;
    Ok(Json(DeleteRes {
        success: true,
        orders_removed: 0,
    }))
}

#[utoipa::path(
    get,
    path = "/admin/patients",
    params(SearchQuery),
    responses(
        (status = 200, description = "Patients ordered by last and first name", body = ListPatientsRes)
    )
)]
#[axum::debug_handler]
pub async fn list_patients(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ListPatientsRes>, ApiError> {
    let patients = state
        .with_db(move |conn| patients::list_patients(conn, query.q.as_deref()))
        .await?;
    Ok(Json(ListPatientsRes { patients }))
}

#[utoipa::path(
    put,
    path = "/admin/patients/{id}",
    params(("id" = i64, Path, description = "Patient id")),
    request_body = UpdatePatientReq,
    responses(
        (status = 200, description = "Patient updated", body = UpdatePatientRes),
        (status = 400, description = "Invalid demographics", body = ErrorRes),
        (status = 404, description = "Patient not found", body = ErrorRes),
        (status = 409, description = "MRN held by another patient", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn update_patient(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i64>,
    Json(req): Json<UpdatePatientReq>,
) -> Result<Json<UpdatePatientRes>, ApiError> {
    let dob = parse_date(&req.dob)
        .ok_or_else(|| CarePlanError::InvalidInput("Enter a valid date.".into()))?;
    let today = Utc::now().date_naive();

    let updated = state
        .with_db(move |conn| {
            update_patient_checked(conn, id, &req.first_name, &req.last_name, &req.mrn, dob, today)
        })
        .await?;
    Ok(Json(UpdatePatientRes {
        patient: updated.record,
        warnings: updated.warnings,
    }))
}

#[utoipa::path(
    delete,
    path = "/admin/patients/{id}",
    params(("id" = i64, Path, description = "Patient id")),
    responses(
        (status = 200, description = "Patient and their orders deleted", body = DeleteRes),
        (status = 404, description = "Patient not found", body = ErrorRes)
    )
)]
/// Delete a patient together with their orders and care plans
#[axum::debug_handler]
pub async fn delete_patient(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i64>,
) -> Result<Json<DeleteRes>, ApiError> {
    let orders_removed = state
        .with_db(move |conn| patients::delete_patient(conn, id))
        .await?;
    Ok(Json(DeleteRes {
        success: true,
        orders_removed,
    }))
}

#[utoipa::path(
    get,
    path = "/admin/orders",
    operation_id = "admin_list_orders",
    params(OrderFilterQuery),
    responses(
        (status = 200, description = "Orders, newest first", body = ListOrdersRes)
    )
)]
/// Search orders by patient name, MRN or medication, optionally filtered by status
#[axum::debug_handler]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderFilterQuery>,
) -> Result<Json<ListOrdersRes>, ApiError> {
    let orders = state
        .with_db(move |conn| orders::search_order_details(conn, query.status, query.q.as_deref()))
        .await?;
    Ok(Json(ListOrdersRes { orders }))
}

#[utoipa::path(
    delete,
    path = "/admin/orders/{id}",
    params(("id" = i64, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order and its care plan deleted", body = DeleteRes),
        (status = 404, description = "Order not found", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn delete_order(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i64>,
) -> Result<Json<DeleteRes>, ApiError> {
    state.with_db(move |conn| orders::delete_order(conn, id)).await?;
    Ok(Json(DeleteRes {
        success: true,
        orders_removed: 1,
    }))
}

#[utoipa::path(
    get,
    path = "/admin/care-plans",
    params(CarePlanFilterQuery),
    responses(
        (status = 200, description = "Care plans, newest first", body = ListCarePlansRes)
    )
)]
#[axum::debug_handler]
pub async fn list_care_plans(
    State(state): State<AppState>,
    Query(query): Query<CarePlanFilterQuery>,
) -> Result<Json<ListCarePlansRes>, ApiError> {
    let plans = state
        .with_db(move |conn| care_plans::list_care_plans(conn, query.model.as_deref()))
        .await?;
    Ok(Json(ListCarePlansRes {
        care_plans: plans.into_iter().map(Into::into).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use crate::router;
    use crate::test_support::*;
    use axum::http::StatusCode;
    use serde_json::json;
    use tower::ServiceExt;

    async fn seed(state: &crate::AppState) -> serde_json::Value {
        let response = router(state.clone())
            .oneshot(json_request("POST", "/orders", order_form()))
            .await
            .unwrap();
        body_json(response).await["order"].clone()
    }

    #[tokio::test]
    async fn test_provider_search_and_protected_delete() {
        let state = state();
        let order = seed(&state).await;
        let provider_id = order["provider"]["id"].as_i64().unwrap();

        let found = router(state.clone())
            .oneshot(empty_request("GET", "/admin/providers?q=SMITH"))
            .await
            .unwrap();
        assert_eq!(body_json(found).await["providers"].as_array().unwrap().len(), 1);

        let none = router(state.clone())
            .oneshot(empty_request("GET", "/admin/providers?q=nobody"))
            .await
            .unwrap();
        assert!(body_json(none).await["providers"].as_array().unwrap().is_empty());

        let blocked = router(state)
            .oneshot(empty_request("DELETE", &format!("/admin/providers/{provider_id}")))
            .await
            .unwrap();
        assert_eq!(blocked.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_patient_delete_cascades_to_orders() {
        let state = state();
        let order = seed(&state).await;
        let patient_id = order["patient"]["id"].as_i64().unwrap();

        let deleted = router(state.clone())
            .oneshot(empty_request("DELETE", &format!("/admin/patients/{patient_id}")))
            .await
            .unwrap();
        assert_eq!(deleted.status(), StatusCode::OK);
        assert_eq!(body_json(deleted).await["orders_removed"], 1);

        let orders = router(state)
            .oneshot(empty_request("GET", "/admin/orders"))
            .await
            .unwrap();
        assert!(body_json(orders).await["orders"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_patient_validates_and_saves() {
        let state = state();
        let order = seed(&state).await;
        let patient_id = order["patient"]["id"].as_i64().unwrap();
        let uri = format!("/admin/patients/{patient_id}");

        let bad_date = router(state.clone())
            .oneshot(json_request(
                "PUT",
                &uri,
                json!({ "first_name": "John", "last_name": "Doe", "mrn": "123456", "dob": "15/01/1980" }),
            ))
            .await
            .unwrap();
        assert_eq!(bad_date.status(), StatusCode::BAD_REQUEST);

        let saved = router(state)
            .oneshot(json_request(
                "PUT",
                &uri,
                json!({ "first_name": "Johnny", "last_name": "Doe", "mrn": "123456", "dob": "1980-01-15" }),
            ))
            .await
            .unwrap();
        assert_eq!(saved.status(), StatusCode::OK);
        let body = body_json(saved).await;
        assert_eq!(body["patient"]["first_name"], "Johnny");
        assert!(body["warnings"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_over_long_names_are_bad_requests() {
        let state = state();
        let order = seed(&state).await;
        let patient_id = order["patient"]["id"].as_i64().unwrap();
        let provider_id = order["provider"]["id"].as_i64().unwrap();

        let patient = router(state.clone())
            .oneshot(json_request(
                "PUT",
                &format!("/admin/patients/{patient_id}"),
                json!({ "first_name": "x".repeat(101), "last_name": "Doe", "mrn": "123456", "dob": "1980-01-15" }),
            ))
            .await
            .unwrap();
        assert_eq!(patient.status(), StatusCode::BAD_REQUEST);

        let provider = router(state)
            .oneshot(json_request(
                "PUT",
                &format!("/admin/providers/{provider_id}"),
                json!({ "name": "x".repeat(256), "npi": "1234567890" }),
            ))
            .await
            .unwrap();
        assert_eq!(provider.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(provider).await["error"]
            .as_str()
            .unwrap()
            .contains("at most 255"));
    }

    #[tokio::test]
    async fn test_order_filters_by_status_and_delete() {
        let state = state();
        let order = seed(&state).await;
        let order_id = order["order"]["id"].as_i64().unwrap();

        let completed = router(state.clone())
            .oneshot(empty_request("GET", "/admin/orders?status=completed"))
            .await
            .unwrap();
        assert!(body_json(completed).await["orders"].as_array().unwrap().is_empty());

        let drafts = router(state.clone())
            .oneshot(empty_request("GET", "/admin/orders?status=draft&q=ivig"))
            .await
            .unwrap();
        assert_eq!(body_json(drafts).await["orders"].as_array().unwrap().len(), 1);

        let deleted = router(state.clone())
            .oneshot(empty_request("DELETE", &format!("/admin/orders/{order_id}")))
            .await
            .unwrap();
        assert_eq!(deleted.status(), StatusCode::OK);

        let again = router(state)
            .oneshot(empty_request("DELETE", &format!("/admin/orders/{order_id}")))
            .await
            .unwrap();
        assert_eq!(again.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_care_plans_filter_by_model() {
        let state = state();
        let order = seed(&state).await;
        let order_id = order["order"]["id"].as_i64().unwrap();
        router(state.clone())
            .oneshot(empty_request("POST", &format!("/orders/{order_id}/generate")))
            .await
            .unwrap();

        let mock = router(state.clone())
            .oneshot(empty_request("GET", "/admin/care-plans?model=mock-claude-model"))
            .await
            .unwrap();
        assert_eq!(body_json(mock).await["care_plans"].as_array().unwrap().len(), 1);

        let other = router(state)
            .oneshot(empty_request("GET", "/admin/care-plans?model=claude-other"))
            .await
            .unwrap();
        assert!(body_json(other).await["care_plans"].as_array().unwrap().is_empty());
    }
}
