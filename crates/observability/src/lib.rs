//! # confluxus-observability
//!
//! Structured Logging fuer Confluxus via tracing-subscriber, wahlweise als
//! Text oder JSON.

pub mod logging;

pub use logging::{log_format_gueltig, log_level_gueltig, logging_initialisieren, LogFormat};
