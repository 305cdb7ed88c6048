//! Standardized translation of transport-level failures into [`RegistryError`]

use crate::error::RegistryError;
use reqwest::StatusCode;

/// Standard error handler for HTTP download responses
pub struct HttpErrorHandler;

impl HttpErrorHandler {
    /// Map a non-success download status to the error taxonomy
    pub fn handle_download_error(status: StatusCode, url: &str) -> RegistryError {
        match status {
            StatusCode::NOT_FOUND => RegistryError::NotFound(format!("content at {} not found", url)),
            _ => RegistryError::Transport(format!("unexpected status code {}: {}", url, status)),
        }
    }

    /// Range requests must come back as partial content
    pub fn handle_range_error(status: StatusCode, url: &str, range: &str) -> RegistryError {
        match status {
            StatusCode::NOT_FOUND => RegistryError::NotFound(format!("content at {} not found", url)),
            _ => RegistryError::Transport(format!(
                "range {} of {} answered with status {}",
                range, url, status
            )),
        }
    }
}

/// Network error categorization
pub struct NetworkErrorHandler;

impl NetworkErrorHandler {
    /// Turn a failure into an I/O error for use inside byte streams
    pub fn to_io_error(error: impl std::fmt::Display) -> std::io::Error {
        std::io::Error::other(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_not_found() {
        let err = HttpErrorHandler::handle_download_error(StatusCode::NOT_FOUND, "http://x/y");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "not found: content at http://x/y not found");
    }

    #[test]
    fn test_other_status_maps_to_transport() {
        let err = HttpErrorHandler::handle_download_error(StatusCode::FORBIDDEN, "http://x/y");
        assert!(matches!(err, RegistryError::Transport(_)));
    }

    #[test]
    fn test_range_error() {
        let err = HttpErrorHandler::handle_range_error(StatusCode::OK, "http://x", "bytes=0-9");
        assert!(err.to_string().contains("bytes=0-9"));
    }
}
