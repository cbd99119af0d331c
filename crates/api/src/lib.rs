//! HTTP API: configuration, routing and the queue trigger endpoint.

pub mod app;
pub mod config;
pub mod middleware;
