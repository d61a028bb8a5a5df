//! HTTP API layer: request/response models and route handlers.

pub mod handlers;
pub mod models;
