//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use confluxus_observability::{log_format_gueltig, log_level_gueltig};
use confluxus_relay::{EntschluesselungsModus, RelayConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Umgebungsvariable fuer den Pfad der Konfigurationsdatei
pub const ENV_CONFIG: &str = "CONFLUXUS_CONFIG";
/// Umgebungsvariable fuer das geteilte Passwort (ueberschreibt die Datei)
pub const ENV_PASSWORT: &str = "CONFLUXUS_PASSWORT";

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Payload-Verschluesselung
    pub verschluesselung: VerschluesselungsEinstellungen,
    /// Grenzen und Deadlines pro Verbindung
    pub verbindung: VerbindungsEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Maximale Anzahl gleichzeitiger Clients
    pub max_clients: usize,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Confluxus Server".into(),
            max_clients: 256,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Hostname oder IP fuer den Listener
    pub host: String,
    pub port: u16,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5000,
        }
    }
}

/// Verschluesselungs-Einstellungen
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerschluesselungsEinstellungen {
    pub aktiviert: bool,
    /// Geteiltes Passwort aller Teilnehmer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passwort: Option<String>,
    /// Umgang mit nicht entschluesselbaren Nachrichten: "lenient" oder "strict"
    pub entschluesselung: EntschluesselungsModus,
}

impl Default for VerschluesselungsEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            passwort: None,
            entschluesselung: EntschluesselungsModus::Lenient,
        }
    }
}

impl std::fmt::Debug for VerschluesselungsEinstellungen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerschluesselungsEinstellungen")
            .field("aktiviert", &self.aktiviert)
            .field("passwort", &self.passwort.as_ref().map(|_| "[REDACTED]"))
            .field("entschluesselung", &self.entschluesselung)
            .finish()
    }
}

/// Grenzen und Deadlines pro Verbindung
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerbindungsEinstellungen {
    /// Ausstehende Nachrichten pro Client, bevor er als zu langsam gilt
    pub send_queue_groesse: usize,
    /// Maximale Zeilenlaenge in Bytes
    pub max_frame_groesse: usize,
    pub handshake_timeout_sek: u64,
    pub schreib_timeout_sek: u64,
}

impl Default for VerbindungsEinstellungen {
    fn default() -> Self {
        Self {
            send_queue_groesse: 64,
            max_frame_groesse: 64 * 1024,
            handshake_timeout_sek: 30,
            schreib_timeout_sek: 10,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    /// `CONFLUXUS_PASSWORT` ueberschreibt ein Passwort aus der Datei.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let mut config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => Self::aus_toml(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };

        if let Ok(passwort) = std::env::var(ENV_PASSWORT) {
            config.passwort_setzen(passwort);
        }
        config
            .validieren()
            .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
        Ok(config)
    }

    /// Prueft Werte, die TOML allein nicht einschraenken kann
    pub fn validieren(&self) -> anyhow::Result<()> {
        if !log_level_gueltig(&self.logging.level) {
            anyhow::bail!("Ungueltiges Log-Level '{}'", self.logging.level);
        }
        if !log_format_gueltig(&self.logging.format) {
            anyhow::bail!("Ungueltiges Log-Format '{}'", self.logging.format);
        }
        Ok(())
    }

    pub fn aus_toml(inhalt: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(inhalt)
    }

    /// Setzt das geteilte Passwort; ein leerer Wert entfernt es
    pub fn passwort_setzen(&mut self, passwort: String) {
        self.verschluesselung.passwort = Some(passwort).filter(|p| !p.is_empty());
    }

    /// Gibt die vollstaendige Bind-Adresse zurueck
    pub fn bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.host, self.netzwerk.port)
    }

    /// Wirksames Passwort: nur wenn die Verschluesselung aktiviert ist
    pub fn effektives_passwort(&self) -> Option<&str> {
        if !self.verschluesselung.aktiviert {
            return None;
        }
        self.verschluesselung
            .passwort
            .as_deref()
            .filter(|p| !p.is_empty())
    }

    /// Erzeugt die Konfiguration fuer den Relay-Service
    pub fn relay_config(&self) -> RelayConfig {
        let passwort = self.effektives_passwort().map(str::to_string);
        if self.verschluesselung.aktiviert && passwort.is_none() {
            tracing::warn!(
                "Verschluesselung aktiviert, aber kein Passwort gesetzt ({}): Nachrichten werden unverschluesselt uebertragen",
                ENV_PASSWORT
            );
        }

        RelayConfig {
            server_name: self.server.name.clone(),
            max_clients: self.server.max_clients,
            send_queue_groesse: self.verbindung.send_queue_groesse,
            max_frame_groesse: self.verbindung.max_frame_groesse,
            handshake_timeout: Duration::from_secs(self.verbindung.handshake_timeout_sek),
            schreib_timeout: Duration::from_secs(self.verbindung.schreib_timeout_sek),
            entschluesselung: self.verschluesselung.entschluesselung,
            passwort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.server.max_clients, 256);
        assert_eq!(cfg.netzwerk.port, 5000);
        assert!(cfg.verschluesselung.aktiviert);
        assert_eq!(cfg.verbindung.send_queue_groesse, 64);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn bind_adresse() {
        assert_eq!(ServerConfig::default().bind_adresse(), "localhost:5000");
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [server]
            max_clients = 10

            [netzwerk]
            host = "0.0.0.0"

            [verschluesselung]
            passwort = "geheim"
            entschluesselung = "strict"

            [verbindung]
            schreib_timeout_sek = 3
        "#;
        let cfg = ServerConfig::aus_toml(toml).unwrap();
        assert_eq!(cfg.server.max_clients, 10);
        assert_eq!(cfg.bind_adresse(), "0.0.0.0:5000");
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.verbindung.handshake_timeout_sek, 30);

        let relay = cfg.relay_config();
        assert_eq!(relay.passwort.as_deref(), Some("geheim"));
        assert_eq!(relay.entschluesselung, EntschluesselungsModus::Strict);
        assert_eq!(relay.schreib_timeout, Duration::from_secs(3));
        assert_eq!(relay.max_clients, 10);
    }

    #[test]
    fn ungueltiger_modus_wird_abgelehnt() {
        let toml = r#"
            [verschluesselung]
            entschluesselung = "egal"
        "#;
        assert!(ServerConfig::aus_toml(toml).is_err());
    }

    #[test]
    fn ohne_passwort_unverschluesselt() {
        let cfg = ServerConfig::default();
        assert!(cfg.relay_config().passwort.is_none());
    }

    #[test]
    fn deaktiviert_ignoriert_passwort() {
        let mut cfg = ServerConfig::default();
        cfg.passwort_setzen("geheim".into());
        cfg.verschluesselung.aktiviert = false;
        assert_eq!(cfg.effektives_passwort(), None);
        assert!(!cfg.relay_config().verschluesselung_aktiv());
    }

    #[test]
    fn leeres_passwort_zaehlt_nicht() {
        let mut cfg = ServerConfig::default();
        cfg.passwort_setzen(String::new());
        assert_eq!(cfg.effektives_passwort(), None);
    }

    #[test]
    fn fehlende_datei_ergibt_standardwerte() {
        let cfg = ServerConfig::laden("/nicht/vorhanden/confluxus.toml").unwrap();
        assert_eq!(cfg.netzwerk.port, 5000);
    }

    #[test]
    fn ungueltiges_logging_wird_abgelehnt() {
        assert!(ServerConfig::default().validieren().is_ok());

        let cfg = ServerConfig::aus_toml("[logging]\nlevel = \"verbose\"").unwrap();
        let fehler = cfg.validieren().unwrap_err();
        assert!(fehler.to_string().contains("verbose"));

        let cfg = ServerConfig::aus_toml("[logging]\nformat = \"xml\"").unwrap();
        assert!(cfg.validieren().is_err());
    }

    #[test]
    fn debug_verbirgt_passwort() {
        let mut cfg = ServerConfig::default();
        cfg.passwort_setzen("streng-geheim".into());
        assert!(!format!("{cfg:?}").contains("streng-geheim"));
    }
}
