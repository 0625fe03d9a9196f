//! Gemeinsamer Server-Zustand fuer den Relay-Service
//!
//! Haelt Konfiguration, Registry und Router als Arc-Referenzen,
//! die sicher zwischen tokio-Tasks geteilt werden koennen.

use confluxus_protocol::wire::DEFAULT_MAX_FRAME_SIZE;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::broadcast::BroadcastRouter;
use crate::registry::ClientRegistry;

/// Verhalten wenn eine eingehende Nachricht nicht entschluesselt werden kann
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntschluesselungsModus {
    /// Rohtext weiterleiten (Clients ohne Verschluesselung bleiben kompatibel)
    #[default]
    Lenient,
    /// Nachricht verwerfen, Fehler nur an den Absender
    Strict,
}

/// Konfiguration fuer den Relay-Service
#[derive(Clone)]
pub struct RelayConfig {
    /// Anzeigename des Servers
    pub server_name: String,
    /// Maximale Anzahl registrierter Clients
    pub max_clients: usize,
    /// Groesse der Send-Queue pro Client
    pub send_queue_groesse: usize,
    /// Maximale Laenge einer Zeile auf der Leitung
    pub max_frame_groesse: usize,
    /// Zeit bis der Client seinen Namen gesendet haben muss
    pub handshake_timeout: Duration,
    /// Deadline fuer jeden einzelnen Schreibvorgang
    pub schreib_timeout: Duration,
    pub entschluesselung: EntschluesselungsModus,
    /// Geteiltes Passwort; `None` deaktiviert die Verschluesselung
    pub passwort: Option<String>,
}

impl RelayConfig {
    pub fn verschluesselung_aktiv(&self) -> bool {
        self.passwort.is_some()
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            server_name: "Confluxus".to_string(),
            max_clients: 256,
            send_queue_groesse: 64,
            max_frame_groesse: DEFAULT_MAX_FRAME_SIZE,
            handshake_timeout: Duration::from_secs(30),
            schreib_timeout: Duration::from_secs(10),
            entschluesselung: EntschluesselungsModus::Lenient,
            passwort: None,
        }
    }
}

impl std::fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConfig")
            .field("server_name", &self.server_name)
            .field("max_clients", &self.max_clients)
            .field("send_queue_groesse", &self.send_queue_groesse)
            .field("max_frame_groesse", &self.max_frame_groesse)
            .field("handshake_timeout", &self.handshake_timeout)
            .field("schreib_timeout", &self.schreib_timeout)
            .field("entschluesselung", &self.entschluesselung)
            .field("passwort", &self.passwort.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
pub struct RelayState {
    /// Server-Konfiguration
    pub config: Arc<RelayConfig>,
    /// Alle registrierten Clients
    pub registry: ClientRegistry,
    /// Verteilt Nachrichten an die Registry-Mitglieder
    pub router: BroadcastRouter,
    /// Startzeitpunkt des Servers (fuer Uptime-Berechnung)
    pub start_time: Instant,
}

impl RelayState {
    /// Erstellt einen neuen RelayState
    pub fn neu(config: RelayConfig) -> Arc<Self> {
        let registry = ClientRegistry::mit_limit(config.send_queue_groesse, config.max_clients);
        let router = BroadcastRouter::neu(registry.clone());
        Arc::new(Self {
            config: Arc::new(config),
            registry,
            router,
            start_time: Instant::now(),
        })
    }

    /// Gibt die Uptime in Sekunden zurueck
    pub fn uptime_sek(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
