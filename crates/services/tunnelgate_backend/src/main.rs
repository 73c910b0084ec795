// File: services/tunnelgate_backend/src/main.rs
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tunnelgate_backend::{app, AppState};
use tunnelgate_common::{logging, Context, TunnelgateError};
use tunnelgate_config::load_config;

#[tokio::main]
async fn main() -> Result<(), TunnelgateError> {
    logging::init();

    let config = Arc::new(load_config().context("Failed to load config")?);
    let state = Arc::new(AppState::new(config.clone()).await?);

    #[allow(unused_mut)] // mutated only with the openapi feature
    let mut app = app(state);

    // Conditionally add Swagger UI and JSON endpoint if openapi feature enabled
    #[cfg(feature = "openapi")]
    {
        use tunnelgate_backend::doc::TunnelgateApiDoc;
        use utoipa::OpenApi;
        use utoipa_swagger_ui::SwaggerUi;

        info!("Adding Swagger UI at /api/docs");
        let swagger_ui =
            SwaggerUi::new("/api/docs").url("/api/docs/openapi.json", TunnelgateApiDoc::openapi());
        app = app.merge(swagger_ui);
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Starting server at http://{}", addr);
    info!("API endpoints available at http://{}/api", addr);

    axum::serve(listener, app.into_make_service())
        .await
        .context("Server error")?;
    Ok(())
}
