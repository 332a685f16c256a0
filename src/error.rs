//! Errors returned by the data sources

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Network or availability problem. Reads fall back to the local cache
    #[error("Remote store unavailable: {0}")]
    Transient(String),

    #[error("Permission denied on collection {collection}")]
    PermissionDenied { collection: String },

    #[error("Invalid record identifier {0:?}")]
    InvalidId(String),

    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Local cache error: {0}")]
    LocalCache(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 300;

impl StoreError {
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let cut: String = body.chars().take(MAX_ERROR_BODY_LENGTH).collect();
            format!("{}... (truncated, {} total bytes)", cut, body.len())
        }
    }

    /// Map a non-success HTTP status from the remote store
    pub fn from_status(status: reqwest::StatusCode, body: &str, collection: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 | 403 => StoreError::PermissionDenied { collection: collection.to_string() },
            404 => StoreError::NotFound(truncated),
            409 | 412 => StoreError::Conflict(truncated),
            429 => StoreError::Transient("rate limited".to_string()),
            500..=599 => StoreError::Transient(format!("Status {}: {}", status, truncated)),
            _ => StoreError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    pub fn is_permission(&self) -> bool {
        matches!(self, StoreError::PermissionDenied { .. })
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_) | StoreError::Http(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn status_mapping() {
        assert!(StoreError::from_status(StatusCode::FORBIDDEN, "", "doctors").is_permission());
        assert!(StoreError::from_status(StatusCode::UNAUTHORIZED, "", "doctors").is_permission());
        assert!(StoreError::from_status(StatusCode::SERVICE_UNAVAILABLE, "down", "doctors").is_transient());
        assert!(StoreError::from_status(StatusCode::TOO_MANY_REQUESTS, "", "doctors").is_transient());
        assert!(matches!(StoreError::from_status(StatusCode::PRECONDITION_FAILED, "", "shifts"), StoreError::Conflict(_)));
        assert!(matches!(StoreError::from_status(StatusCode::NOT_FOUND, "", "shifts"), StoreError::NotFound(_)));
        assert!(matches!(StoreError::from_status(StatusCode::IM_A_TEAPOT, "", "shifts"), StoreError::InvalidResponse(_)));
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(2000);
        match StoreError::from_status(StatusCode::BAD_REQUEST, &body, "doctors") {
            StoreError::InvalidResponse(msg) => {
                assert!(msg.len() < 400);
                assert!(msg.contains("2000 total bytes"));
            },
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn permission_error_names_the_collection() {
        let err = StoreError::PermissionDenied { collection: "shifts".to_string() };
        assert_eq!(err.to_string(), "Permission denied on collection shifts");
    }
}
