//! HTTP handlers for the xray service.

pub mod analyze;
pub mod app;
