//! # Relaycast Gateway
//!
//! HTTP API surface over the dispatch engine. Thin by design: the handlers
//! extract the tenant, deserialize the request, call one engine/ledger
//! operation, and map the result to JSON.

pub mod routes;
pub mod server;

pub use server::{AppState, build_router, start};
