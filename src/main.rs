use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{router, AppState};
use careplan_core::config::core_config_from_env;
use careplan_core::database::open_database;
use careplan_core::llm::client_from_settings;

/// Main entry point for the care plan generator
///
/// Resolves configuration once, opens (and migrates) the SQLite database, builds the language
/// model client and serves the REST API.
///
/// # Environment Variables
/// - `CAREPLAN_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `CAREPLAN_DATABASE_PATH`: SQLite database file (default: "careplan.sqlite3")
/// - `ANTHROPIC_API_KEY`: API key for the Anthropic Messages API
/// - `LLM_MOCK_MODE`: Generate demonstration plans without calling the model
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - configuration values are invalid,
/// - the database cannot be opened or migrated, or
/// - the server address cannot be bound.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("careplan_core=info".parse()?)
                .add_directive("api_rest=info".parse()?)
                .add_directive("careplan_run=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("CAREPLAN_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let cfg = Arc::new(core_config_from_env()?);
    let database_path = cfg.database_path();
    if let Some(parent) = database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            anyhow::bail!("Database directory does not exist: {}", parent.display());
        }
    }
    let conn = open_database(database_path)?;

    let client = match client_from_settings(cfg.llm()) {
        Ok(client) => {
            if cfg.llm().mock_mode {
                tracing::warn!("LLM_MOCK_MODE is enabled; care plans are demonstration output");
            }
            Some(client)
        }
        Err(e) => {
            tracing::warn!("Care plan generation unavailable: {}", e);
            None
        }
    };

    tracing::info!("++ Starting care plan REST on {}", rest_addr);

    let app = router(AppState::new(cfg, conn, client));
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
