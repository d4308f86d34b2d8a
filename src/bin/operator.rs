use std::future::IntoFuture as _;

use clap::Parser as _;
use pgadmin_operator::{
    config::OperatorConfig,
    operator::{self, State},
    telemetry,
};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = OperatorConfig::parse();
    telemetry::init(config.log_json).await?;

    // Initialize Kubernetes controller state
    let state = State::default();
    let controller = operator::PGAdminController::new(state.clone());

    // Start web server
    let listener = TcpListener::bind(config.listen).await?;
    let router = handlers::router();
    let server = axum::serve(listener, router.with_state(state));
    info!("Serving metrics and diagnostics on {}", config.listen);

    // Run both the http server and the controller, failing if either finish early
    tokio::select! {
        c = controller.run(config) => {
            c.and_then(|()| Err(anyhow::anyhow!("controller exited early")))
        },
        s = server.into_future() => {
            s.map_err(anyhow::Error::from)
                .and_then(|()| Err(anyhow::anyhow!("server exited early")))
        }
    }
}

/// Handlers for the web server portion of the operator
mod handlers {
    use axum::{extract::State, http::StatusCode, response::IntoResponse, routing, Json, Router};
    use prometheus::{Encoder, TextEncoder};

    use pgadmin_operator::operator::State as OperatorState;

    /// Construct the router for all the handlers
    pub fn router() -> Router<OperatorState> {
        Router::new()
            .route("/metrics", routing::get(metrics))
            .route("/health", routing::get(health))
            .route("/", routing::get(index))
    }

    /// Handler for exposing prometheus metrics
    async fn metrics(State(state): State<OperatorState>) -> impl IntoResponse {
        let metrics = state.metrics();
        let encoder = TextEncoder::new();
        let mut buffer = vec![];
        match encoder.encode(&metrics, &mut buffer) {
            Ok(()) => (StatusCode::OK, buffer),
            Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string().into_bytes()),
        }
    }

    /// Handler for checking the health of the server
    async fn health() -> impl IntoResponse {
        (StatusCode::OK, Json("healthy"))
    }

    /// Handler for interacting with the operator
    async fn index(State(state): State<OperatorState>) -> impl IntoResponse {
        let diagnostics = state.diagnostics().await;

        (StatusCode::OK, Json(diagnostics))
    }
}
