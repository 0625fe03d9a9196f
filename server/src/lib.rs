//! confluxus-server – Bibliotheks-Root
//!
//! Deklariert alle Server-Module und stellt den oeffentlichen Einstiegspunkt
//! fuer Integrationstests bereit.

pub mod config;

use anyhow::Result;
use config::ServerConfig;
use confluxus_relay::{ClientRegistry, RelayServer, RelayState};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Baut den Relay-Zustand auf und bindet den Listener
    pub async fn binden(self) -> Result<GebundenerServer> {
        let bind_adresse = self.config.bind_adresse();
        let state = RelayState::neu(self.config.relay_config());

        let relay = RelayServer::binden(Arc::clone(&state), bind_adresse.as_str())
            .await
            .map_err(|e| anyhow::anyhow!("Bind auf '{bind_adresse}' fehlgeschlagen: {e}"))?;
        let adresse = relay.lokale_adresse()?;

        tracing::info!(
            server_name = %self.config.server.name,
            adresse = %adresse,
            max_clients = self.config.server.max_clients,
            "Server gebunden"
        );

        Ok(GebundenerServer {
            state,
            relay,
            adresse,
        })
    }

    /// Startet den Server und laeuft bis Ctrl-C
    pub async fn starten(self) -> Result<()> {
        let gebunden = self.binden().await?;
        gebunden
            .laufen_bis(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(fehler = %e, "Ctrl-C Handler nicht verfuegbar");
                    std::future::pending::<()>().await;
                }
            })
            .await
    }
}

/// Server mit gebundenem Listener, bereit zum Annehmen von Verbindungen
pub struct GebundenerServer {
    state: Arc<RelayState>,
    relay: RelayServer,
    adresse: SocketAddr,
}

impl GebundenerServer {
    pub fn adresse(&self) -> SocketAddr {
        self.adresse
    }

    pub fn state(&self) -> &Arc<RelayState> {
        &self.state
    }

    /// Nimmt Verbindungen an bis `shutdown` abgeschlossen ist
    ///
    /// Danach erhalten alle Verbindungen das Shutdown-Signal.
    pub async fn laufen_bis<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let haushalt = haushalt_starten(&self.state.registry, shutdown_rx.clone());
        let accept = tokio::spawn(self.relay.starten(shutdown_rx));

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        shutdown.await;
        tracing::info!("Shutdown-Signal empfangen, Server wird beendet");

        // Alle Receiver koennen bereits beendet sein
        let _ = shutdown_tx.send(true);

        accept
            .await
            .map_err(|e| anyhow::anyhow!("Accept-Task abgebrochen: {e}"))??;
        let _ = haushalt.await;

        tracing::info!(
            uptime_sek = self.state.uptime_sek(),
            "Server gestoppt"
        );
        Ok(())
    }
}

/// Beobachtet die Client-Anzahl und meldet, wenn der Raum leer wird
fn haushalt_starten(
    registry: &ClientRegistry,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let mut anzahl = registry.subscribe_count();

    tokio::spawn(async move {
        let mut vorher = *anzahl.borrow_and_update();
        loop {
            tokio::select! {
                geaendert = anzahl.changed() => {
                    if geaendert.is_err() {
                        break;
                    }
                    let jetzt = *anzahl.borrow_and_update();
                    if jetzt == 0 && vorher > 0 {
                        tracing::info!("Raum leer: alle Clients getrennt");
                    } else {
                        tracing::debug!(clients = jetzt, "Client-Anzahl geaendert");
                    }
                    vorher = jetzt;
                }

                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use confluxus_client::{ChatClient, ClientEvent};
    use tokio::sync::oneshot;

    fn test_config(passwort: Option<&str>) -> ServerConfig {
        let mut config = ServerConfig::default();
        config.netzwerk.host = "127.0.0.1".into();
        config.netzwerk.port = 0;
        config.verschluesselung.passwort = passwort.map(str::to_string);
        config
    }

    #[tokio::test]
    async fn server_startet_und_stoppt() {
        let gebunden = Server::neu(test_config(Some("geheim")))
            .binden()
            .await
            .unwrap();
        let adresse = gebunden.adresse();
        let state = Arc::clone(gebunden.state());

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let lauf = tokio::spawn(gebunden.laufen_bis(async {
            let _ = stop_rx.await;
        }));

        let mut alice = ChatClient::connect(adresse, "Alice", Some("geheim"))
            .await
            .unwrap();
        assert!(alice.is_encrypted());
        assert_eq!(state.registry.count(), 1);

        stop_tx.send(()).unwrap();
        assert_eq!(
            alice.next_event().await,
            ClientEvent::SystemMessage("Server is shutting down.".into())
        );
        lauf.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn bind_fehler_wird_gemeldet() {
        let mut config = test_config(None);
        config.netzwerk.host = "256.0.0.1".into();
        assert!(Server::neu(config).binden().await.is_err());
    }
}
