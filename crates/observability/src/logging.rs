//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable (ueberschreibt die Konfigurationsdatei):
//! - `CONFLUXUS_LOG_LEVEL`: Level oder Filter-Direktive, Standard: info
//! - `CONFLUXUS_LOG_FORMAT`: Format (text/json), Standard: text

use tracing_subscriber::{fmt, EnvFilter};

pub const ENV_LOG_LEVEL: &str = "CONFLUXUS_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "CONFLUXUS_LOG_FORMAT";

/// Ausgabeformat der Logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    pub fn parse(format: &str) -> Option<Self> {
        match format {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Initialisiert das Logging-System.
///
/// Umgebungsvariablen haben Vorrang vor `level` und `format`. Ein ungueltiger
/// Filter faellt auf `info` zurueck, ein unbekanntes Format auf `text`.
/// Schlaegt fehl, wenn bereits ein globaler Subscriber gesetzt ist.
pub fn logging_initialisieren(level: &str, format: &str) -> anyhow::Result<()> {
    let level = std::env::var(ENV_LOG_LEVEL).unwrap_or_else(|_| level.to_string());
    let format = std::env::var(ENV_LOG_FORMAT).unwrap_or_else(|_| format.to_string());

    let filter = filter_erstellen(&level);

    let ergebnis = match LogFormat::parse(&format).unwrap_or_default() {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init(),
        LogFormat::Text => fmt().with_env_filter(filter).with_target(true).try_init(),
    };

    ergebnis.map_err(|e| anyhow::anyhow!("Logging konnte nicht initialisiert werden: {e}"))
}

fn filter_erstellen(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    LogFormat::parse(format).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_gueltige_werte() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            assert!(log_level_gueltig(level), "{level}");
        }
    }

    #[test]
    fn log_level_ungueltige_werte() {
        assert!(!log_level_gueltig("verbose"));
        assert!(!log_level_gueltig("INFO")); // Gross-/Kleinschreibung
        assert!(!log_level_gueltig(""));
    }

    #[test]
    fn log_format_parsen() {
        assert_eq!(LogFormat::parse("json"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("text"), Some(LogFormat::Text));
        assert_eq!(LogFormat::parse("JSON"), None);
        assert!(!log_format_gueltig("xml"));
        assert_eq!(LogFormat::default(), LogFormat::Text);
    }

    #[test]
    fn filter_mit_direktiven() {
        let filter = filter_erstellen("confluxus_relay=debug,info");
        assert!(filter.to_string().contains("confluxus_relay=debug"));
    }

    #[test]
    fn zweite_initialisierung_schlaegt_fehl() {
        // Der erste Aufruf darf scheitern, falls schon ein Subscriber gesetzt ist
        let _ = logging_initialisieren("info", "text");
        assert!(logging_initialisieren("info", "text").is_err());
    }
}
