//! Order intake, listing and export endpoints.

use axum::{
    extract::{Path as AxumPath, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use careplan_core::constants::ORDER_LIST_LIMIT;
use careplan_core::export::{export_filename, export_orders_csv};
use careplan_core::intake::{self, OrderForm};
use careplan_core::repositories::{care_plans, orders};
use chrono::Utc;

use crate::error::{ApiError, ErrorRes};
use crate::types::{CreateOrderRes, ListOrdersRes, OrderDetailRes};
use crate::AppState;

#[utoipa::path(
    get,
    path = "/orders",
    responses(
        (status = 200, description = "Most recent orders", body = ListOrdersRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
/// List the 50 most recent orders with their patient and provider
#[axum::debug_handler]
pub async fn list_orders(State(state): State<AppState>) -> Result<Json<ListOrdersRes>, ApiError> {
    let orders = state
        .with_db(|conn| orders::list_order_details(conn, Some(ORDER_LIST_LIMIT)))
        .await?;
    Ok(Json(ListOrdersRes { orders }))
}

#[utoipa::path(
    post,
    path = "/orders",
    request_body = OrderForm,
    responses(
        (status = 201, description = "Order created", body = CreateOrderRes),
        (status = 400, description = "Invalid order form or NPI registered to another provider", body = ErrorRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
/// Create an order from the intake form
///
/// Validates every field, applies the provider and patient duplicate rules, then stores the
/// order. Existing providers and patients are reused by NPI and MRN. Non-blocking duplicate
/// findings are returned as warnings alongside the new order.
///
/// # Errors
/// Returns `400 Bad Request` with per-field messages if the form is invalid. An NPI that belongs
/// to a provider with a different name is reported as a form-level (`non_field`) error.
#[axum::debug_handler]
pub async fn create_order(
    State(state): State<AppState>,
    Json(form): Json<OrderForm>,
) -> Result<(StatusCode, Json<CreateOrderRes>), ApiError> {
    let window = state.cfg.order_duplicate_window_days();
    let (created, detail) = state
        .with_db(move |conn| {
            let reviewed = form.review(conn, Utc::now().date_naive())?;
            let created = intake::create_order(conn, reviewed, window)?;
            let detail = orders::require_order_detail(conn, created.order.id)?;
            Ok((created, detail))
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateOrderRes {
            message: format!(
                "Order #{} created successfully. Ready to generate care plan.",
                created.order.id
            ),
            order: detail,
            warnings: created.warnings,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/orders/{id}",
    params(("id" = i64, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with its care plan", body = OrderDetailRes),
        (status = 404, description = "Order not found", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn get_order(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i64>,
) -> Result<Json<OrderDetailRes>, ApiError> {
    let (order, care_plan) = state
        .with_db(move |conn| {
            let order = orders::require_order_detail(conn, id)?;
            let care_plan = care_plans::get_care_plan_for_order(conn, id)?;
            Ok((order, care_plan))
        })
        .await?;
    Ok(Json(OrderDetailRes { order, care_plan }))
}

#[utoipa::path(
    get,
    path = "/export/csv",
    responses(
        (status = 200, description = "All orders as a CSV attachment", body = String, content_type = "text/csv"),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
/// Export every order with its care plan summary as CSV
#[axum::debug_handler]
pub async fn export_csv(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let csv = state.with_db(export_orders_csv).await?;
    let disposition = format!("attachment; filename=\"{}\"", export_filename(Utc::now()));
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    ))
}
