//! Scheduled data-collection services.
//!
//! Each configured service periodically invokes a [`sources::Worker`],
//! accumulates the resulting records in a per-service store, forwards new
//! records to an indexing sink and exposes its state through the
//! [`collector::ServiceRegistry`] and the management API in [`web`].

pub mod collector;
pub mod config;
pub mod errors;
pub mod forwarder;
pub mod models;
pub mod sources;
pub mod utils;
pub mod web;
