//! Request router.
//!
//! ```text
//! /
//! ├── GET  /reader      - active reader, or the NoDevice sentinel
//! ├── GET  /nfctag      - tag or emulated tag, or the NoDevice sentinel
//! ├── GET  /readthing   - Thing stored on the tag
//! ├── POST /writething  - store a Thing on the tag (OPTIONS for preflight)
//! ├── GET  /settings    - root directory and bytes served
//! ├── PUT  /settings    - replace the root directory
//! ├── GET  /index.html  - <RootDir>/media/index.html
//! ├── GET  /status      - device state and cached record
//! ├── PUT  /emulation   - toggle emulation mode
//! └── POST /rescan      - rediscover readers
//! ```
//!
//! Every response carries permissive CORS headers. Handler panics become a
//! 500 response with a JSON error body.

use crate::error::ApiError;
use crate::media::{INDEX_RESOURCE, StaticResource};
use crate::settings::{ServerSettings, Settings};
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderValue, Response, StatusCode, Uri, header};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;
use tagproxy_core::{DeviceDescriptor, Record, Thing};
use tagproxy_device::{DeviceController, DeviceState};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// State shared by all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub device: DeviceController,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(device: DeviceController, settings: Settings) -> Self {
        Self {
            device,
            settings: Arc::new(settings),
        }
    }
}

/// Body of `GET /status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusResponse {
    pub state: DeviceState,
    pub emulating: bool,
    pub reader: DeviceDescriptor,
    pub tag: DeviceDescriptor,
    pub readers: Vec<String>,
    pub record: Option<Record>,
}

/// Body of `PUT /emulation`.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EmulationRequest {
    pub enabled: bool,
}

/// Build the router with all routes and layers.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/reader", get(get_reader))
        .route("/nfctag", get(get_tag))
        .route("/readthing", get(read_thing))
        .route("/writething", post(write_thing).options(preflight))
        .route("/settings", get(get_settings).put(put_settings))
        .route("/index.html", get(index_html))
        .route("/status", get(get_status))
        .route("/emulation", put(put_emulation))
        .route("/rescan", post(rescan))
        .fallback(not_found)
        .with_state(state)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, PUT, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type, Accept, X-Requested-With"),
        ))
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let message = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("handler panicked");
    error!(panic = message, "Request handler panicked");
    ApiError::Internal(message.to_string()).into_response()
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(e.to_string()))
}

async fn get_reader(State(state): State<AppState>) -> Json<DeviceDescriptor> {
    Json(state.device.snapshot().reader_descriptor())
}

async fn get_tag(State(state): State<AppState>) -> Json<DeviceDescriptor> {
    Json(state.device.snapshot().tag_descriptor())
}

async fn read_thing(State(state): State<AppState>) -> Result<Json<Thing>, ApiError> {
    Ok(Json(state.device.read_thing().await?))
}

async fn write_thing(State(state): State<AppState>, body: Bytes) -> Result<StatusCode, ApiError> {
    if !state.device.snapshot().state.has_record_source() {
        return Err(ApiError::NoTagPresent);
    }
    let thing: Thing = parse_body(&body)?;
    info!(id = %thing.id(), thing_type = %thing.thing_type(), "Writing thing");
    state.device.write_thing(thing).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn get_settings(State(state): State<AppState>) -> Json<ServerSettings> {
    Json(state.settings.snapshot())
}

async fn put_settings(State(state): State<AppState>, body: Bytes) -> Result<StatusCode, ApiError> {
    let update: ServerSettings = parse_body(&body)?;
    info!(root_dir = %update.root_dir.display(), "Root directory changed");
    state.settings.set_root_dir(&update.root_dir);
    Ok(StatusCode::NO_CONTENT)
}

async fn index_html(State(state): State<AppState>) -> Result<StaticResource, ApiError> {
    let resource = StaticResource::load(&state.settings.root_dir(), INDEX_RESOURCE).await?;
    state.settings.add_bytes_served(resource.body.len() as u64);
    Ok(resource)
}

async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let snapshot = state.device.snapshot();
    Json(StatusResponse {
        state: snapshot.state,
        emulating: snapshot.is_emulating(),
        reader: snapshot.reader_descriptor(),
        tag: snapshot.tag_descriptor(),
        readers: snapshot.readers.iter().map(|r| r.name.clone()).collect(),
        record: snapshot.record,
    })
}

async fn put_emulation(State(state): State<AppState>, body: Bytes) -> Result<StatusCode, ApiError> {
    let request: EmulationRequest = parse_body(&body)?;
    state
        .device
        .set_emulation(request.enabled)
        .await
        .map_err(ApiError::from_toggle)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn rescan(State(state): State<AppState>) -> Result<Json<DeviceDescriptor>, ApiError> {
    state.device.rescan().await?;
    Ok(Json(state.device.snapshot().reader_descriptor()))
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(uri.path().to_string())
}
