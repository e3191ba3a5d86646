//! # API REST
//!
//! REST API for the care plan generator.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, attachments)
//!
//! Domain rules live in `careplan-core`; handlers only move data between HTTP and the core
//! functions. The SQLite connection sits behind a mutex and is only touched on blocking worker
//! threads. Model calls run without holding it.

#![warn(rust_2018_idioms)]

mod admin;
mod care_plans;
mod checks;
pub mod error;
mod orders;
pub mod types;

use std::sync::{Arc, Mutex};

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use careplan_core::care_plan::CarePlanGenerator;
use careplan_core::{CarePlanError, CarePlanResult, CoreConfig, LlmClient};
use rusqlite::Connection;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::error::ApiError;
use crate::types::HealthRes;

/// Application state shared across REST API handlers.
#[derive(Clone)]
pub struct AppState {
    cfg: Arc<CoreConfig>,
    db: Arc<Mutex<Connection>>,
    /// `None` when no model client could be built; generation then reports the missing key.
    generator: Option<CarePlanGenerator>,
}

impl AppState {
    pub fn new(cfg: Arc<CoreConfig>, conn: Connection, client: Option<Arc<dyn LlmClient>>) -> Self {
        let generator = client.map(|client| CarePlanGenerator::new(client, cfg.few_shot_limit()));
        Self {
            cfg,
            db: Arc::new(Mutex::new(conn)),
            generator,
        }
    }

    fn generator(&self) -> Result<CarePlanGenerator, ApiError> {
        self.generator
            .clone()
            .ok_or(ApiError::Core(CarePlanError::LlmNotConfigured))
    }

    /// Run `f` against the database on a blocking worker thread.
    async fn with_db<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Connection) -> CarePlanResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        run_blocking(move || {
            let conn = db
                .lock()
                .map_err(|_| ApiError::internal("database mutex poisoned"))?;
            f(&conn).map_err(ApiError::from)
        })
        .await
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        tracing::error!("Blocking task error: {:?}", e);
        ApiError::internal("blocking task failed")
    })?
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        orders::list_orders,
        orders::create_order,
        orders::get_order,
        orders::export_csv,
        care_plans::generate_care_plan,
        care_plans::download_care_plan,
        care_plans::get_care_plan,
        care_plans::save_care_plan,
        checks::check_provider,
        checks::check_patient,
        checks::check_order,
        admin::list_providers,
        admin::update_provider,
        admin::delete_provider,
        admin::list_patients,
        admin::update_patient,
        admin::delete_patient,
        admin::list_orders,
        admin::delete_order,
        admin::list_care_plans,
    ),
    components(schemas(
        careplan_core::models::Provider,
        careplan_core::models::Patient,
        careplan_core::models::Order,
        careplan_core::models::OrderStatus,
        careplan_core::models::OrderDetail,
        careplan_core::models::CarePlan,
        careplan_core::intake::OrderForm,
        careplan_core::intake::FormErrors,
        careplan_core::duplicates::DuplicateResult,
        careplan_core::duplicates::DuplicateKind,
        careplan_core::duplicates::Severity,
        careplan_core::duplicates::SimilarItem,
        error::ErrorRes,
        types::HealthRes,
        types::ListOrdersRes,
        types::CreateOrderRes,
        types::OrderDetailRes,
        types::GenerateCarePlanRes,
        types::CheckProviderReq,
        types::CheckProviderRes,
        types::CheckPatientReq,
        types::CheckPatientRes,
        types::CheckOrderReq,
        types::CheckOrderRes,
        types::CarePlanRes,
        types::EditCarePlanReq,
        types::ListProvidersRes,
        types::ListPatientsRes,
        types::ListCarePlansRes,
        types::UpdateProviderReq,
        types::UpdateProviderRes,
        types::UpdatePatientReq,
        types::UpdatePatientRes,
        types::DeleteRes,
    ))
)]
struct ApiDoc;

/// Build the REST router with Swagger UI and permissive CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/orders", get(orders::list_orders).post(orders::create_order))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/generate", post(care_plans::generate_care_plan))
        .route("/orders/:id/download", get(care_plans::download_care_plan))
        .route("/api/check-provider", post(checks::check_provider))
        .route("/api/check-patient", post(checks::check_patient))
        .route("/api/check-order", post(checks::check_order))
        .route(
            "/api/care-plans/:id",
            get(care_plans::get_care_plan).put(care_plans::save_care_plan),
        )
        .route("/export/csv", get(orders::export_csv))
        .route("/admin/providers", get(admin::list_providers))
        .route(
            "/admin/providers/:id",
            axum::routing::put(admin::update_provider).delete(admin::delete_provider),
        )
        .route("/admin/patients", get(admin::list_patients))
        .route(
            "/admin/patients/:id",
            axum::routing::put(admin::update_patient).delete(admin::delete_patient),
        )
        .route("/admin/orders", get(admin::list_orders))
        .route("/admin/orders/:id", axum::routing::delete(admin::delete_order))
        .route("/admin/care-plans", get(admin::list_care_plans))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Used for monitoring and load balancer health checks.
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "Care plan REST API is alive".into(),
    })
}
