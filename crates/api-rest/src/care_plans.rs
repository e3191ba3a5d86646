//! Care plan generation, download and editing endpoints.

use axum::{
    extract::{Path as AxumPath, State},
    http::header,
    response::{IntoResponse, Json},
};
use careplan_core::care_plan::{care_plan_download_for_order, edit_care_plan, save_generated_care_plan};
use careplan_core::repositories::{care_plans, orders};
use careplan_core::CarePlanError;

use crate::error::{ApiError, ErrorRes};
use crate::types::{CarePlanRes, EditCarePlanReq, GenerateCarePlanRes};
use crate::{run_blocking, AppState};

#[utoipa::path(
    post,
    path = "/orders/{id}/generate",
    params(("id" = i64, Path, description = "Order id")),
    responses(
        (status = 200, description = "Care plan generated", body = GenerateCarePlanRes),
        (status = 404, description = "Order not found", body = ErrorRes),
        (status = 502, description = "Language model call failed", body = ErrorRes)
    )
)]
/// Generate, or regenerate, the care plan for an order
///
/// The prompt is built from the order and recent care plans of other orders. The database is
/// released while the model runs. An existing plan is replaced only once the new one has been
/// generated, and the order is marked completed.
///
/// # Errors
/// Returns `502 Bad Gateway` if the model is not configured or the call fails; the previous
/// care plan, if any, is kept.
#[axum::debug_handler]
pub async fn generate_care_plan(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i64>,
) -> Result<Json<GenerateCarePlanRes>, ApiError> {
    // Fail before touching the order when no model is available.
    let generator = state.generator()?;

    let prepared = {
        let generator = generator.clone();
        state.with_db(move |conn| generator.prepare(conn, id)).await?
    };
    let generated = run_blocking(move || generator.generate(&prepared).map_err(ApiError::from)).await?;
    let elapsed_ms = generated.generation_time_ms;
    let saved = state
        .with_db(move |conn| save_generated_care_plan(conn, id, &generated))
        .await?;

    Ok(Json(GenerateCarePlanRes {
        care_plan: saved.care_plan,
        regenerated: saved.regenerated,
        message: format!("Care plan generated successfully in {elapsed_ms}ms!"),
    }))
}

#[utoipa::path(
    get,
    path = "/orders/{id}/download",
    params(("id" = i64, Path, description = "Order id")),
    responses(
        (status = 200, description = "Care plan as a text attachment", body = String, content_type = "text/plain"),
        (status = 404, description = "Order or care plan not found", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn download_care_plan(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let download = state
        .with_db(move |conn| care_plan_download_for_order(conn, id))
        .await?;
    let disposition = format!("attachment; filename=\"{}\"", download.filename);
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        download.body,
    ))
}

#[utoipa::path(
    get,
    path = "/api/care-plans/{id}",
    params(("id" = i64, Path, description = "Care plan id")),
    responses(
        (status = 200, description = "Care plan with its order", body = CarePlanRes),
        (status = 404, description = "Care plan not found", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn get_care_plan(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i64>,
) -> Result<Json<CarePlanRes>, ApiError> {
    let plan = state
        .with_db(move |conn| {
            care_plans::get_care_plan_with_order(conn, id)?.ok_or(CarePlanError::NotFound {
                entity: "care plan",
                id,
            })
        })
        .await?;
    Ok(Json(plan.into()))
}

#[utoipa::path(
    put,
    path = "/api/care-plans/{id}",
    params(("id" = i64, Path, description = "Care plan id")),
    request_body = EditCarePlanReq,
    responses(
        (status = 200, description = "Edited care plan", body = CarePlanRes),
        (status = 400, description = "Empty content", body = ErrorRes),
        (status = 404, description = "Care plan not found", body = ErrorRes)
    )
)]
/// Save a pharmacist's edit of a care plan
///
/// Content is trimmed and must not be empty. The plan is flagged as edited.
#[axum::debug_handler]
pub async fn save_care_plan(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i64>,
    Json(req): Json<EditCarePlanReq>,
) -> Result<Json<CarePlanRes>, ApiError> {
    let res = state
        .with_db(move |conn| {
            let care_plan = edit_care_plan(conn, id, &req.content)?;
            let order = orders::require_order_detail(conn, care_plan.order_id)?;
            Ok(CarePlanRes { care_plan, order })
        })
        .await?;
    Ok(Json(res))
}
