// HTTP surface of the daemon: notebook lifecycle routes for the Jupyter
// extension, plus `/healthz`.

pub mod cors;
pub mod error;
pub mod handlers;
pub mod validation;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{DefaultBodyLimit, Request},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use gitseal_common::protocol::routes;
use tracing::info;

use crate::command::CommandExecutor;
use crate::config::ServerConfig;
use crate::seal::SealService;
use error::{attach_request_id_header, request_id_from_headers_or_generate, with_request_id_scope};
use handlers::AppState;
use validation::MAX_REQUEST_BODY_BYTES;

pub fn router<E: CommandExecutor + 'static>(
    seal: Arc<SealService<E>>,
    server: &ServerConfig,
) -> Router {
    let notebook_routes = Router::new()
        .route(routes::LOCK_NOTEBOOK, post(handlers::lock_notebook::<E>))
        .route(routes::UNLOCK_NOTEBOOK, post(handlers::unlock_notebook::<E>))
        .route(routes::NOTEBOOK_STATUS, post(handlers::notebook_status::<E>))
        .route(routes::COMMIT_NOTEBOOK, post(handlers::commit_notebook::<E>))
        .route(routes::REMOVE_SIGNATURE, post(handlers::remove_signature::<E>))
        .route(routes::REPOSITORY_STATUS, post(handlers::repository_status::<E>))
        .route(routes::USER_INFO, get(handlers::user_info::<E>))
        .with_state(AppState { seal });

    apply_middleware(notebook_routes.route(routes::HEALTHZ, get(healthz)), server)
}

fn apply_middleware(router: Router, server: &ServerConfig) -> Router {
    router
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(middleware::from_fn(request_context_middleware))
        .layer(cors::cors_layer(&server.cors_origins))
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn request_context_middleware(request: Request, next: Next) -> Response {
    let request_id = request_id_from_headers_or_generate(request.headers());
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started_at = Instant::now();

    let mut response = with_request_id_scope(request_id.clone(), next.run(request)).await;
    attach_request_id_header(&mut response, &request_id);

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started_at.elapsed().as_millis() as u64,
        "request completed"
    );

    response
}
