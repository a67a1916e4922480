use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::{Body, Bytes},
    extract::{rejection::BytesRejection, Query, State},
    http::{header, Method, Request, StatusCode},
    middleware,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, on, MethodFilter, MethodRouter},
    Extension, Router,
};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultOnFailure, TraceLayer},
};
use tracing::{debug, info, info_span, instrument, warn, Level, Span};

use crate::config::Config;
use crate::delay::{self, Deadline};
use crate::metrics::HttpMetrics;
use crate::params::{Capability, SimulationParameters};
use crate::simulation::{simulate, Dice};
use crate::web::middleware::{attach_deadline, track_metrics};
use crate::web::response;

/// HTTP front of the simulator
pub struct WebServer {
    state: AppState,
}

/// Everything a request needs, constructed once at startup
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub metrics: Arc<HttpMetrics>,
    pub dice: Arc<dyn Dice>,
}

impl AppState {
    pub fn new(config: Arc<Config>, dice: Arc<dyn Dice>) -> Self {
        Self {
            config,
            metrics: Arc::new(HttpMetrics::new()),
            dice,
        }
    }
}

impl WebServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    pub async fn run(&self, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
        let addr = self.state.config.bind_addr();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", addr, e))?;
        info!("📈 kpi-sim listening on http://{}", listener.local_addr()?);
        self.serve(listener, shutdown).await
    }

    pub async fn serve(
        &self,
        listener: tokio::net::TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

/// Assemble routes and the middleware stack. Stages run outermost first:
/// trace span, metrics, deadline, then the handler.
pub fn build_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);
    let service = state.config.service.clone();
    let metrics = state.metrics.clone();
    let cors = state.config.server.cors;

    let mut router = Router::new()
        .route("/healthz", get(healthz))
        .route("/kpi/availability", simulation_route(Capability::Availability))
        .route("/kpi/performance", simulation_route(Capability::Performance))
        .route("/kpi/errors", simulation_route(Capability::ErrorRate))
        .route("/benchmark", simulation_route(Capability::Benchmark))
        .route("/metrics", get(metrics_text))
        .route("/docs", get(docs))
        .route("/docs/openapi.json", get(openapi))
        .fallback(not_found)
        .with_state(state);

    if cors {
        router = router.layer(CorsLayer::permissive());
    }

    router.layer(
        ServiceBuilder::new()
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(move |req: &Request<Body>| {
                        info_span!(
                            "http_request",
                            service = %service.name,
                            env = %service.env,
                            method = %req.method(),
                            uri = %req.uri(),
                        )
                    })
                    // Simulated 5xx answers are the service working as intended
                    .on_failure(DefaultOnFailure::new().level(Level::DEBUG)),
            )
            .layer(middleware::from_fn_with_state(metrics, track_metrics))
            .layer(middleware::from_fn_with_state(timeout, attach_deadline)),
    )
}

/// GET reads the query string, POST/PUT/PATCH read a JSON body
fn simulation_route(capability: Capability) -> MethodRouter<AppState> {
    let accepted = MethodFilter::GET
        .or(MethodFilter::POST)
        .or(MethodFilter::PUT)
        .or(MethodFilter::PATCH);
    on(
        accepted,
        move |State(state): State<AppState>,
              method: Method,
              query: Option<Query<HashMap<String, String>>>,
              deadline: Option<Extension<Deadline>>,
              body: Result<Bytes, BytesRejection>| async move {
            // An undecodable query string or an unreadable (e.g. oversized)
            // body both mean "no overrides"
            let query = query.map(|Query(q)| q).unwrap_or_default();
            let body = body.unwrap_or_else(|rejection| {
                debug!("Ignoring request body: {}", rejection);
                Bytes::new()
            });
            let deadline = deadline.map(|Extension(d)| d);
            run_simulation(capability, &state, method, &query, deadline, &body).await
        },
    )
}

/// Resolve, draw, hold, compose
#[instrument(
    name = "simulate",
    skip_all,
    fields(capability = %capability, method = %method, latency_ms = tracing::field::Empty)
)]
async fn run_simulation(
    capability: Capability,
    state: &AppState,
    method: Method,
    query: &HashMap<String, String>,
    deadline: Option<Deadline>,
    body: &[u8],
) -> Response {
    let start = Instant::now();
    let params = SimulationParameters::from_request(capability, &method, query, body, &state.config.simulation);
    let outcome = simulate(&params, state.dice.as_ref());
    debug!(?params, ?outcome, "Trial drawn");

    if let Some(delay) = outcome.induced_delay {
        if let Err(err) = delay::hold(delay, deadline).await {
            warn!("Simulated delay of {:?} abandoned after {:?}", delay, err.elapsed);
            let (status, body) = response::deadline_exceeded(&err, &method);
            return (status, Json(body)).into_response();
        }
    }

    let elapsed = start.elapsed();
    Span::current().record("latency_ms", elapsed.as_millis() as u64);

    let (status, body) = response::compose(&params, &outcome, elapsed, &method);
    (status, Json(body)).into_response()
}

async fn healthz(State(state): State<AppState>) -> Json<Value> {
    Json(response::health(&state.config.service.version))
}

/// Prometheus scrape endpoint
async fn metrics_text(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.render(),
    )
}

/// API documentation - embedded single page
async fn docs() -> Html<&'static str> {
    Html(include_str!("../../static/docs.html"))
}

async fn openapi() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/json")],
        include_str!("../../static/openapi.json"),
    )
}

async fn not_found() -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "not_found" })))
}
