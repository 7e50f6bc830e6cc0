use crate::constants::{ACCEPT_DATETIME, LINK_FORMAT_MIME, REDIRECT_CONTENT_TYPE};
use crate::error::{Result, TimegateError, UpstreamError};
use crate::registry::TimeMapFormat;
use crate::response::RedirectResponse;
use crate::timegate::{TimeGate, TimeMapBody};
use axum::{
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Health check endpoint
async fn health(State(timegate): State<Arc<TimeGate>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "timegate",
        "version": env!("CARGO_PKG_VERSION"),
        "handlers": timegate.registry().len(),
    }))
}

async fn not_found() -> TimegateError {
    TimegateError::NotFound("no such endpoint".to_string())
}

/// Rebuild the identifier as the client sent it, query string included.
fn identifier(path: String, query: Option<String>) -> String {
    match query {
        Some(query) if !query.is_empty() => format!("{}?{}", path, query),
        _ => path,
    }
}

fn wants_fresh(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::CACHE_CONTROL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|directive| directive.trim().eq_ignore_ascii_case("no-cache"))
}

fn accept_datetime(headers: &HeaderMap) -> Result<Option<&str>> {
    headers
        .get(ACCEPT_DATETIME)
        .map(|value| {
            value.to_str().map_err(|_| {
                TimegateError::Validation("Accept-Datetime is not valid ASCII".to_string())
            })
        })
        .transpose()
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_bytes(value.as_bytes()).map_err(|_| {
        UpstreamError::Failed(format!("'{}' cannot be sent in a header", value)).into()
    })
}

fn redirect(response: RedirectResponse) -> Result<Response> {
    let mut headers = HeaderMap::new();
    headers.insert(header::LOCATION, header_value(&response.location)?);
    headers.insert(header::LINK, header_value(&response.link_header())?);
    headers.insert(header::VARY, HeaderValue::from_static(ACCEPT_DATETIME));
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(REDIRECT_CONTENT_TYPE));
    Ok((StatusCode::FOUND, headers).into_response())
}

async fn serve_timegate(
    timegate: &TimeGate,
    uri_r: String,
    query: Option<String>,
    headers: &HeaderMap,
) -> Result<Response> {
    let response = timegate
        .timegate(
            &identifier(uri_r, query),
            accept_datetime(headers)?,
            wants_fresh(headers),
        )
        .await?;
    redirect(response)
}

async fn serve_timemap(
    timegate: &TimeGate,
    format: String,
    uri_r: String,
    query: Option<String>,
    headers: &HeaderMap,
) -> Result<Response> {
    let format: TimeMapFormat = format.parse()?;
    let body = timegate
        .timemap(format, &identifier(uri_r, query), wants_fresh(headers))
        .await?;
    Ok(match body {
        TimeMapBody::Link(body) => ([(header::CONTENT_TYPE, LINK_FORMAT_MIME)], body).into_response(),
        TimeMapBody::Json(document) => Json(document).into_response(),
    })
}

async fn timegate_handler(
    State(timegate): State<Arc<TimeGate>>,
    Path(uri_r): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response> {
    serve_timegate(&timegate, uri_r, query, &headers).await
}

// A wildcard never matches an empty tail, so "/timegate/" needs its own route
async fn timegate_empty_handler(
    State(timegate): State<Arc<TimeGate>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response> {
    serve_timegate(&timegate, String::new(), query, &headers).await
}

async fn timemap_handler(
    State(timegate): State<Arc<TimeGate>>,
    Path((format, uri_r)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response> {
    serve_timemap(&timegate, format, uri_r, query, &headers).await
}

async fn timemap_empty_handler(
    State(timegate): State<Arc<TimeGate>>,
    Path(format): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response> {
    serve_timemap(&timegate, format, String::new(), query, &headers).await
}

/// Create the HTTP router. `GET` routes answer `HEAD` as well.
pub fn create_server(timegate: Arc<TimeGate>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::HEAD])
        .allow_headers(Any)
        .expose_headers([header::LINK, header::LOCATION, header::VARY]);

    Router::new()
        .route("/health", get(health))
        .route("/timegate/", get(timegate_empty_handler))
        .route("/timegate/*uri_r", get(timegate_handler))
        .route("/timemap/:format/", get(timemap_empty_handler))
        .route("/timemap/:format/*uri_r", get(timemap_handler))
        .fallback(not_found)
        .layer(ServiceBuilder::new().layer(cors))
        .with_state(timegate)
}

/// Start the HTTP server on `bind`
pub async fn start_server(timegate: Arc<TimeGate>, bind: &str) -> Result<()> {
    let host = timegate.host().to_string();
    let app = create_server(timegate);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("TimeGate listening on {} (serving as {})", bind, host);
    info!("Health check: {}/health", host);

    axum::serve(listener, app).await?;
    Ok(())
}
