//! HTTP API server for customer registration.
//!
//! Exposes the registration saga over REST, wires it to the CRM and identity
//! system through reqwest adapters, and provides structured logging (tracing)
//! and Prometheus metrics.

pub mod clients;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{CrmService, IdentityService, RegistrationSaga, SagaError, Transformer};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use clients::{HttpCrmClient, HttpIdentityClient, TemplateTransformer};
use config::Config;
use routes::registration::AppState;

/// Application state backed by the remote adapters.
pub type HttpAppState = AppState<HttpCrmClient, HttpIdentityClient, TemplateTransformer>;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<C, I, T>(state: Arc<AppState<C, I, T>>, metrics_handle: PrometheusHandle) -> Router
where
    C: CrmService + 'static,
    I: IdentityService + 'static,
    T: Transformer + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<C, I, T>))
        .route("/register", post(routes::registration::register::<C, I, T>))
        .with_state(state)
        .merge(metrics_router)
        .layer(CatchPanicLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Builds application state around an arbitrary set of ports.
pub fn create_state<C, I, T>(
    crm: C,
    identity: I,
    transformer: T,
    config: &Config,
) -> Arc<AppState<C, I, T>>
where
    C: CrmService,
    I: IdentityService + 'static,
    T: Transformer,
{
    Arc::new(AppState {
        saga: RegistrationSaga::new(crm, identity, transformer, config.policy()),
        crm_auth_token: config.crm_api_token.clone(),
    })
}

/// Creates the default application state with the HTTP adapters.
///
/// Fails if the HTTP client cannot be built or a CRM template cannot be loaded.
pub fn create_default_state(config: &Config) -> Result<Arc<HttpAppState>, SagaError> {
    let client = clients::http_client(config.http_timeout)?;
    let crm = HttpCrmClient::new(client.clone(), &config.crm_base_url);
    let identity = HttpIdentityClient::new(client, &config.identity_base_url);
    let policy = config.policy();
    let transformer = TemplateTransformer::load(
        &config.template_root,
        &[&policy.create_template, &policy.update_template],
    )?;
    Ok(create_state(crm, identity, transformer, config))
}
