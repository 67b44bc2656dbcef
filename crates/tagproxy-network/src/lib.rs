//! HTTP surface of the tagproxy device service.
//!
//! This crate exposes the reader, the tag and its record over a small JSON
//! API built on axum. Request handlers only talk to the shared
//! [`DeviceController`](tagproxy_device::DeviceController); they never
//! touch hardware directly.
//!
//! # Components
//!
//! - **HttpServer**: listener lifecycle and graceful shutdown
//! - **router**: routes, CORS headers, panic and trace layers
//! - **ApiError**: mapping of device errors to HTTP status codes
//!
//! # Example
//!
//! ```
//! use tagproxy_device::{DeviceConfig, DeviceController};
//! use tagproxy_network::{AppState, Settings, router};
//!
//! let state = AppState::new(DeviceController::new(DeviceConfig::default()), Settings::default());
//! let app = router(state);
//! # let _ = app;
//! ```

pub mod error;
pub mod media;
pub mod routes;
pub mod server;
pub mod settings;

pub use error::{ApiError, HttpServerError};
pub use routes::{AppState, EmulationRequest, StatusResponse, router};
pub use server::{HttpServer, HttpServerConfig};
pub use settings::{ServerSettings, Settings};
