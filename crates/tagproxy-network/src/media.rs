//! Static resources below the root directory.

use crate::error::ApiError;
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::{debug, error};

/// Resource served at `/index.html`, relative to the root directory.
pub const INDEX_RESOURCE: &str = "media/index.html";

/// Content types by file extension.
const MIME_TYPES: &[(&str, &str)] = &[
    ("css", "text/css"),
    ("gif", "image/gif"),
    ("htm", "text/html"),
    ("html", "text/html"),
    ("ico", "image/x-icon"),
    ("jpeg", "image/jpeg"),
    ("jpg", "image/jpeg"),
    ("js", "application/x-javascript"),
    ("json", "application/json"),
    ("pdf", "application/pdf"),
    ("png", "image/png"),
    ("svg", "image/svg+xml"),
    ("txt", "text/plain"),
    ("woff", "font/woff"),
    ("xml", "text/xml"),
];

/// Content type for `path`, `application/octet-stream` when unknown.
pub fn content_type(path: &Path) -> &'static str {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| {
            MIME_TYPES
                .iter()
                .find(|(known, _)| known.eq_ignore_ascii_case(ext))
                .map(|(_, mime)| *mime)
        })
        .unwrap_or("application/octet-stream")
}

/// HTTP date as used by `Last-Modified`.
fn http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// A file read for delivery.
#[derive(Debug)]
pub struct StaticResource {
    pub body: Vec<u8>,
    pub content_type: &'static str,
    pub last_modified: Option<DateTime<Utc>>,
}

impl StaticResource {
    /// Read `relative` below `root`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the file does not exist, `Internal` if it cannot be
    /// read.
    pub async fn load(root: &Path, relative: &str) -> Result<Self, ApiError> {
        let path = root.join(relative);
        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                error!(path = %path.display(), "Static resource does not exist");
                return Err(ApiError::NotFound(relative.to_string()));
            }
            Err(e) => return Err(ApiError::Internal(format!("{}: {e}", path.display()))),
        };
        let last_modified = tokio::fs::metadata(&path)
            .await
            .and_then(|metadata| metadata.modified())
            .ok()
            .map(DateTime::<Utc>::from);
        debug!(path = %path.display(), len = body.len(), "Static resource loaded");

        Ok(Self {
            body,
            content_type: content_type(&path),
            last_modified,
        })
    }
}

impl IntoResponse for StaticResource {
    fn into_response(self) -> Response {
        let mut response = self.body.into_response();
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(self.content_type),
        );
        if let Some(value) = self
            .last_modified
            .and_then(|modified| HeaderValue::from_str(&http_date(modified)).ok())
        {
            headers.insert(header::LAST_MODIFIED, value);
        }
        response
    }
}
