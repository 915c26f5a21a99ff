//! Error type definitions for the records service
//!
//! This module defines the error types used throughout the application.
//! Scheduler-internal faults (stalls, worker timeouts) are not Rust errors:
//! they are recorded in the owning service's store as
//! [`ServiceErrorEntry`](crate::models::ServiceErrorEntry) values and never
//! interrupt the loop.

use thiserror::Error;

/// Top-level application error type
///
/// Every layer-specific error converts into this one, which is what the web
/// layer maps onto HTTP status codes.
#[derive(Error, Debug)]
pub enum AppError {
    /// Service lifecycle errors
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// Web layer errors
    #[error("Web error: {0}")]
    Web(#[from] WebError),

    /// Resource not found errors
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },
}

/// Errors raised while validating or launching a service run
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The service spec was rejected before registration
    #[error("won't start service '{service}': {message}")]
    InvalidSpec { service: String, message: String },

    /// No worker is registered under the requested name
    #[error("no worker registered for service '{name}'")]
    UnknownWorker { name: String },
}

/// Errors produced by workers while fetching from an external source
#[derive(Error, Debug)]
pub enum SourceError {
    /// Network connection timeouts
    #[error("Connection timeout: {url}")]
    Timeout { url: String },

    /// Transport-level request failures
    #[error("Request failed: {url} - {message}")]
    Request { url: String, message: String },

    /// Non-success HTTP responses from the source
    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },

    /// Parsing errors for source data
    #[error("Parse error: {source_type} - {message}")]
    ParseError { source_type: String, message: String },

    /// A worker was built without anything to fetch
    #[error("No endpoints configured for '{index}'")]
    NoEndpoints { index: String },

    /// Local I/O failures (e.g. reading /proc)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by a forwarder; logged and dropped by the scheduler
#[derive(Error, Debug)]
pub enum ForwardError {
    /// The sink could not be reached
    #[error("Sink transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The sink answered with a non-success status
    #[error("Sink rejected document: {status} - {body}")]
    Status { status: u16, body: String },

    /// The record could not be encoded
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Web layer specific errors
#[derive(Error, Debug)]
pub enum WebError {
    /// Invalid request format
    #[error("Invalid request: {field} - {message}")]
    InvalidRequest { field: String, message: String },

    /// Invalid authentication token
    #[error("Invalid authentication: {message}")]
    InvalidAuth { message: String },
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a not found error for a specific resource
    pub fn not_found<R: Into<String>, I: Into<String>>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }
}

impl ServiceError {
    /// Create an invalid spec error
    pub fn invalid_spec<S: Into<String>, M: Into<String>>(service: S, message: M) -> Self {
        Self::InvalidSpec {
            service: service.into(),
            message: message.into(),
        }
    }
}

impl SourceError {
    /// Create a request failed error
    pub fn request<U: Into<String>, M: Into<String>>(url: U, message: M) -> Self {
        Self::Request {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse_error<S: Into<String>, M: Into<String>>(source_type: S, message: M) -> Self {
        Self::ParseError {
            source_type: source_type.into(),
            message: message.into(),
        }
    }
}

impl WebError {
    /// Create an invalid request error
    pub fn invalid_request<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::InvalidRequest {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an invalid auth error
    pub fn invalid_auth<M: Into<String>>(message: M) -> Self {
        Self::InvalidAuth {
            message: message.into(),
        }
    }
}
