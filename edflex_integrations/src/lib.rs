//! Edflex integrations: the HTTP client for the upstream self-service API.

pub mod client;

pub use client::{EdflexApiClient, CONTENT_BATCH_SIZE};
