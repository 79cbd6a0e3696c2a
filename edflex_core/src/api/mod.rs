//! Upstream API contract.
//!
//! The synchronizers only depend on `EdflexApi`; the HTTP implementation lives
//! in `edflex_integrations`.

pub mod models;
pub mod traits;
