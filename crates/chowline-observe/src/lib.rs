//! Observability setup for Chowline: structured logging and optional
//! OpenTelemetry trace export.

pub mod tracing_setup;
