//! HTTP API Module
//!
//! Exposes the cache and the election state over HTTP.

mod http;

pub use http::{AppState, HttpServer};
