//! Centralized error handling for the records service
//!
//! # Error Categories
//!
//! - **Service Errors**: spec validation and worker lookup at launch time
//! - **Source Errors**: worker fetch and parse failures
//! - **Forward Errors**: sink delivery failures (logged, never retried)
//! - **Web Errors**: HTTP request and authentication issues

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for Source Results
pub type SourceResult<T> = Result<T, SourceError>;

/// Convenience type alias for Forward Results
pub type ForwardResult<T> = Result<T, ForwardError>;
