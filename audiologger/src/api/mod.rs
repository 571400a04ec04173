//! HTTP surface (C9): stateless handlers over the recorder, cache, and
//! extractor.

pub mod error;
pub mod models;
pub mod routes;
pub mod server;

pub use server::{ApiServer, ApiServerConfig, AppState};
