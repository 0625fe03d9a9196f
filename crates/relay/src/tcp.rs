//! TCP-Listener – Bindet Socket, akzeptiert Verbindungen
//!
//! Der `RelayServer` bindet einen TCP-Socket und startet fuer jede
//! eingehende Verbindung einen eigenen tokio-Task mit einer `ClientConnection`.
//! Verbindungs-Tasks laufen auf dem Multi-Thread-Runtime, die Accept-Loop
//! ist selbst nur ein weiterer Task.

use confluxus_protocol::{Envelope, EnvelopeCodec};
use futures_util::SinkExt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::watch;
use tokio_util::codec::Framed;

use crate::connection::{ClientConnection, MELDUNG_SERVER_VOLL};
use crate::server_state::RelayState;

/// TCP-Relay-Server
pub struct RelayServer {
    state: Arc<RelayState>,
    listener: TcpListener,
}

impl RelayServer {
    /// Bindet den Listener an `addr`
    ///
    /// Port `0` waehlt einen freien Port, siehe [`RelayServer::lokale_adresse`].
    pub async fn binden(state: Arc<RelayState>, addr: impl ToSocketAddrs) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { state, listener })
    }

    /// Tatsaechlich gebundene Adresse
    pub fn lokale_adresse(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Akzeptiert Verbindungen bis `shutdown_rx` ein `true`-Signal empfaengt
    ///
    /// Offene Verbindungen erhalten dasselbe Signal und beenden sich selbst.
    pub async fn starten(self, mut shutdown_rx: watch::Receiver<bool>) -> io::Result<()> {
        let lokale_addr = self.listener.local_addr()?;
        tracing::info!(
            server = %self.state.config.server_name,
            adresse = %lokale_addr,
            verschluesselung = self.state.config.verschluesselung_aktiv(),
            "TCP Relay-Server gestartet"
        );

        loop {
            tokio::select! {
                // Neue eingehende Verbindung
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            // Client-Limit pruefen
                            let online = self.state.registry.count();
                            if online >= self.state.config.max_clients {
                                tracing::warn!(
                                    peer = %peer_addr,
                                    max = self.state.config.max_clients,
                                    "Server voll: Verbindung abgelehnt"
                                );
                                tokio::spawn(abweisen(
                                    stream,
                                    peer_addr,
                                    self.state.config.schreib_timeout,
                                ));
                                continue;
                            }

                            if let Err(e) = stream.set_nodelay(true) {
                                tracing::debug!(peer = %peer_addr, fehler = %e, "TCP_NODELAY nicht gesetzt");
                            }

                            tracing::debug!(peer = %peer_addr, "Verbindung akzeptiert");

                            let verbindung = ClientConnection::neu(
                                Arc::clone(&self.state),
                                peer_addr,
                            );
                            let shutdown_rx_clone = shutdown_rx.clone();

                            tokio::spawn(async move {
                                verbindung.verarbeiten(stream, shutdown_rx_clone).await;
                            });
                        }
                        Err(e) => {
                            tracing::warn!(fehler = %e, "TCP-Accept-Fehler");
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        }
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Relay-Server: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        tracing::info!("TCP Relay-Server gestoppt");
        Ok(())
    }
}

/// Sendet die Ablehnung an einen Client ueber dem Limit und schliesst
async fn abweisen(stream: TcpStream, peer_addr: SocketAddr, schreib_timeout: Duration) {
    let mut framed = Framed::new(stream, EnvelopeCodec::new());
    let ablehnung = framed.send(Envelope::error(MELDUNG_SERVER_VOLL));
    match tokio::time::timeout(schreib_timeout, ablehnung).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(peer = %peer_addr, fehler = %e, "Ablehnung nicht zugestellt"),
        Err(_) => tracing::debug!(peer = %peer_addr, "Ablehnung: Timeout"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server_state::RelayConfig;
    use std::time::Duration;

    #[tokio::test]
    async fn bindet_freien_port() {
        let state = RelayState::neu(RelayConfig::default());
        let server = RelayServer::binden(state, "127.0.0.1:0").await.unwrap();
        assert_ne!(server.lokale_adresse().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn shutdown_beendet_accept_loop() {
        let state = RelayState::neu(RelayConfig::default());
        let server = RelayServer::binden(state, "127.0.0.1:0").await.unwrap();
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(server.starten(rx));

        tx.send(true).unwrap();
        let ergebnis = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("Accept-Loop muss enden")
            .unwrap();
        assert!(ergebnis.is_ok());
    }
}
