//! Error types for admin API calls.

use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur when calling a security server's admin API.
#[derive(Error, Debug)]
pub enum ApiError {
    /// HTTP request failed (connection refused, timeout, TLS, ...).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned a non-2xx response.
    #[error("API error: {method} {path} returned {status}: {message}")]
    Api {
        method: String,
        path: String,
        status: u16,
        message: String,
    },

    /// Server URL could not be parsed.
    #[error("Invalid server URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error body returned by the admin API, e.g.
/// `{"status": 409, "error": {"code": "certificate_already_exists"}}`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    code: Option<String>,
}

impl ApiError {
    /// HTTP status of an API error response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the credential was rejected or lacks permissions.
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }

    /// Whether the resource already exists on the server.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }

    /// Machine-readable error code from the response body, if any.
    #[must_use]
    pub fn error_code(&self) -> Option<String> {
        let Self::Api { message, .. } = self else {
            return None;
        };
        serde_json::from_str::<ErrorBody>(message)
            .ok()
            .and_then(|body| body.error)
            .and_then(|detail| detail.code)
    }

    /// Human explanation for well-known failures.
    #[must_use]
    pub fn explain(&self) -> Option<&'static str> {
        if let Some(code) = self.error_code() {
            let hint = match code.as_str() {
                "certificate_already_exists" => Some("The certificate has already been imported"),
                "client_already_exists" => Some("The client already exists on this server"),
                "global_conf_outdated" => {
                    Some("Global configuration is outdated; wait for the next configuration download")
                }
                "pin_incorrect" | "token_pin_incorrect" => Some("The software token PIN is wrong"),
                "anchor_not_found" => Some("The configuration anchor has not been imported yet"),
                "wrong_cert_usage" => Some("The certificate usage does not match the key it belongs to"),
                "key_not_found" => {
                    Some("No key on the token matches the certificate; generate keys and CSRs first")
                }
                _ => None,
            };
            if hint.is_some() {
                return hint;
            }
        }

        match self {
            Self::Http(e) if e.is_timeout() => Some("The server did not respond in time"),
            Self::Http(e) if e.is_connect() => Some("The server could not be reached"),
            _ => match self.status() {
                Some(401) => Some("The API key is invalid, expired or revoked"),
                Some(403) => Some("The API key lacks a role required for this operation"),
                Some(409) => Some("The resource already exists or is in a conflicting state"),
                _ => None,
            },
        }
    }
}
