// CORS for the notebook extension.
//
// Origins come from `[server] cors_origins`. An empty list allows the local
// Jupyter origins; `["*"]` allows any origin without credentials.

use axum::http::{header, HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

const DEFAULT_LOCAL_ORIGINS: &[&str] = &[
    "http://localhost:8888",
    "http://127.0.0.1:8888",
    "http://localhost:8889",
    "http://127.0.0.1:8889",
];

pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
            HeaderName::from_static("x-xsrftoken"),
        ])
        .expose_headers([HeaderName::from_static("x-request-id")])
        .max_age(std::time::Duration::from_secs(3600));

    if origins.iter().any(|origin| origin.trim() == "*") {
        return base.allow_origin(AllowOrigin::any());
    }
    let allowed = if origins.is_empty() {
        parse_origins(DEFAULT_LOCAL_ORIGINS.iter().copied())
    } else {
        parse_origins(origins.iter().map(String::as_str))
    };
    base.allow_origin(allowed).allow_credentials(true)
}

fn parse_origins<'a>(origins: impl Iterator<Item = &'a str>) -> Vec<HeaderValue> {
    origins
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| HeaderValue::from_str(s).ok())
        .collect()
}
