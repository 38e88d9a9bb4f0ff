//! Axum request extractors.

pub mod auth;
