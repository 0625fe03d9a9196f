//! Client-Connection – Verwaltet eine einzelne TCP-Verbindung
//!
//! Jede TCP-Verbindung bekommt eine `ClientConnection` in einem eigenen
//! tokio-Task. Der Task besitzt den Socket exklusiv: eingehende Frames liest
//! er selbst, ausgehende Nachrichten kommen ueber die Send-Queue aus der
//! Registry und werden nur von hier auf den Socket geschrieben.
//!
//! ## State Machine
//! ```text
//! Connecting -> AwaitingName -> KeyExchange -> Active -> Closing -> Closed
//!                    |               |                     ^
//!                    +---------------+---------------------+
//! ```
//!
//! ## Verschluesselung
//! Jede Verbindung hat einen eigenen Schluessel. Eingehende Nachrichten
//! werden mit dem Schluessel des Absenders entschluesselt, ausgehende
//! `chat`-Payloads mit dem Schluessel des Empfaengers verschluesselt.
//! `system`- und `error`-Payloads bleiben Klartext.

use confluxus_core::{CoreError, DisplayName};
use confluxus_crypto::{chiffretext_laenge, CryptoSession};
use confluxus_protocol::{Envelope, EnvelopeCodec, EnvelopeKind, Frame};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio_util::codec::Framed;

use crate::error::{RelayError, RelayResult};
use crate::registry::Client;
use crate::server_state::{EntschluesselungsModus, RelayState};

/// Antwort auf einen leeren Anzeigenamen
pub const MELDUNG_NAME_LEER: &str = "Username must not be empty.";
/// Abschiedsnachricht beim Herunterfahren
pub const MELDUNG_SHUTDOWN: &str = "Server is shutting down.";
/// Antwort im Strict-Modus auf nicht entschluesselbare Nachrichten
pub const MELDUNG_NICHT_ENTSCHLUESSELBAR: &str = "Message could not be decrypted.";
/// Antwort wenn die verteilte Nachricht das Frame-Limit ueberschreiten wuerde
pub const MELDUNG_ZU_LANG: &str = "Message is too long.";
/// Ablehnung bei erreichter Client-Obergrenze
pub const MELDUNG_SERVER_VOLL: &str = "Server is full.";
const MELDUNG_INTERN: &str = "Internal server error.";

type Verbindung<S> = Framed<S, EnvelopeCodec>;

// ---------------------------------------------------------------------------
// Verbindungszustand
// ---------------------------------------------------------------------------

/// Zustand der Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket akzeptiert, noch nichts gelesen
    Connecting,
    /// Warten auf den Anzeigenamen
    AwaitingName,
    /// Name registriert, Schluessel wird abgeleitet
    KeyExchange,
    /// Nachrichten werden ausgetauscht
    Active,
    /// Austragen aus der Registry, Austrittsmeldung
    Closing,
    /// Socket freigegeben
    Closed,
}

// ---------------------------------------------------------------------------
// ClientConnection
// ---------------------------------------------------------------------------

/// Verarbeitet eine einzelne Verbindung
///
/// Generisch ueber den Stream, damit Tests mit `tokio::io::duplex` laufen.
pub struct ClientConnection {
    state: Arc<RelayState>,
    peer_addr: SocketAddr,
    zustand: ConnectionState,
}

impl ClientConnection {
    /// Erstellt eine neue ClientConnection
    pub fn neu(state: Arc<RelayState>, peer_addr: SocketAddr) -> Self {
        Self {
            state,
            peer_addr,
            zustand: ConnectionState::Connecting,
        }
    }

    pub fn zustand(&self) -> ConnectionState {
        self.zustand
    }

    fn uebergang(&mut self, naechster: ConnectionState) {
        tracing::trace!(
            peer = %self.peer_addr,
            von = ?self.zustand,
            nach = ?naechster,
            "Zustandswechsel"
        );
        self.zustand = naechster;
    }

    /// Startet die Verbindungs-Verarbeitung
    ///
    /// Laeuft bis die Verbindung getrennt, der Client entfernt oder ein
    /// Shutdown-Signal empfangen wird.
    pub async fn verarbeiten<S>(mut self, stream: S, mut shutdown_rx: watch::Receiver<bool>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let peer_addr = self.peer_addr;
        tracing::info!(peer = %peer_addr, "Neue Verbindung");

        let codec = EnvelopeCodec::with_max_size(self.state.config.max_frame_groesse);
        let mut framed = Framed::new(stream, codec);

        self.uebergang(ConnectionState::AwaitingName);
        let (client, outbox) = match self.name_registrieren(&mut framed, &mut shutdown_rx).await {
            Ok(registriert) => registriert,
            Err(grund) => {
                self.ende_protokollieren(&grund);
                self.uebergang(ConnectionState::Closed);
                return;
            }
        };

        self.uebergang(ConnectionState::KeyExchange);
        let session = match self.schluessel_aushandeln(&mut framed, &client).await {
            Ok(session) => session,
            Err(grund) => {
                // Noch kein Beitritt gemeldet, also auch kein Austritt
                if let Some(entfernt) = self.state.registry.unregister(client.id()) {
                    entfernt.schliessen();
                }
                self.ende_protokollieren(&grund);
                self.uebergang(ConnectionState::Closed);
                return;
            }
        };

        tracing::info!(
            peer = %peer_addr,
            client = %client.id(),
            name = %client.name(),
            verschluesselt = session.is_enabled(),
            "Client beigetreten"
        );
        self.state
            .router
            .distribute(&Envelope::beigetreten(client.name().as_str()), Some(client.id()));

        self.uebergang(ConnectionState::Active);
        let grund = self
            .aktiv(&mut framed, &client, &session, outbox, &mut shutdown_rx)
            .await;

        self.uebergang(ConnectionState::Closing);
        // Nach einer Eviction ist der Client bereits entfernt und gemeldet
        if let Some(entfernt) = self.state.registry.unregister(client.id()) {
            entfernt.schliessen();
            self.state
                .router
                .distribute(&Envelope::verlassen(entfernt.name().as_str()), None);
        }
        self.ende_protokollieren(&grund);

        drop(framed);
        self.uebergang(ConnectionState::Closed);
        tracing::info!(peer = %peer_addr, name = %client.name(), "Verbindungs-Task beendet");
    }

    /// AwaitingName: liest den Namen und registriert den Client
    async fn name_registrieren<S>(
        &self,
        framed: &mut Verbindung<S>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> RelayResult<(Client, mpsc::Receiver<Envelope>)>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let frame = tokio::select! {
            ergebnis = tokio::time::timeout(self.state.config.handshake_timeout, framed.next()) => {
                match ergebnis {
                    Err(_) => return Err(RelayError::Timeout),
                    Ok(None) => return Err(RelayError::PeerClosed),
                    Ok(Some(Err(e))) => return Err(RelayError::Io(e)),
                    Ok(Some(Ok(frame))) => frame,
                }
            }
            _ = signal_abwarten(shutdown_rx) => return Err(RelayError::Shutdown),
        };

        let roh = frame.into_text();
        let name = match DisplayName::parse(&roh) {
            Ok(name) => name,
            Err(fehler) => {
                let meldung = match fehler {
                    CoreError::NameLeer => MELDUNG_NAME_LEER.to_string(),
                    CoreError::NameZuLang { max, .. } => {
                        format!("Username must be at most {max} characters.")
                    }
                    CoreError::NameSteuerzeichen => {
                        "Username must not contain control characters.".to_string()
                    }
                };
                let _ = self.senden(framed, Envelope::error(meldung)).await;
                return Err(RelayError::protokoll(fehler.to_string()));
            }
        };

        match self.state.registry.register(name.clone(), self.peer_addr) {
            Ok(registriert) => Ok(registriert),
            Err(fehler) => {
                let antwort = match &fehler {
                    RelayError::ServerVoll { .. } => Envelope::error(MELDUNG_SERVER_VOLL),
                    _ => Envelope::name_vergeben(name.as_str()),
                };
                let _ = self.senden(framed, antwort).await;
                Err(fehler)
            }
        }
    }

    /// KeyExchange: Salt erzeugen, Schluessel ableiten, Willkommen senden
    async fn schluessel_aushandeln<S>(
        &self,
        framed: &mut Verbindung<S>,
        client: &Client,
    ) -> RelayResult<CryptoSession>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let session = match self.state.config.passwort.clone() {
            Some(passwort) => {
                let abgeleitet =
                    tokio::task::spawn_blocking(move || CryptoSession::negotiate(&passwort))
                        .await
                        .map_err(|e| RelayError::intern(format!("KDF-Task: {e}")))
                        .and_then(|ergebnis| ergebnis.map_err(RelayError::from));
                match abgeleitet {
                    Ok(session) => session,
                    Err(fehler) => {
                        let _ = self.senden(framed, Envelope::error(MELDUNG_INTERN)).await;
                        return Err(fehler);
                    }
                }
            }
            None => CryptoSession::disabled(),
        };

        let willkommen = Envelope::willkommen(client.name().as_str(), session.encryption_info());
        self.senden(framed, willkommen).await?;
        Ok(session)
    }

    /// Active: Empfangs- und Sende-Schleife
    ///
    /// Gibt den Grund fuer das Verbindungsende zurueck.
    async fn aktiv<S>(
        &self,
        framed: &mut Verbindung<S>,
        client: &Client,
        session: &CryptoSession,
        mut outbox: mpsc::Receiver<Envelope>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> RelayError
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut schliessen = client.schliess_signal();

        loop {
            tokio::select! {
                // Eingehende Nachricht vom Client
                frame = framed.next() => {
                    match frame {
                        Some(Ok(frame)) => {
                            if let Err(e) = self.eingehend(framed, client, session, frame).await {
                                return e;
                            }
                        }
                        Some(Err(e)) => return RelayError::Io(e),
                        None => return RelayError::PeerClosed,
                    }
                }

                // Ausgehende Nachricht aus der Send-Queue
                Some(envelope) = outbox.recv() => {
                    if let Err(e) = self.ausgehend(framed, session, envelope).await {
                        return e;
                    }
                }

                // Client wurde vom Router entfernt
                _ = signal_abwarten(&mut schliessen) => return RelayError::SendFehler,

                // Shutdown-Signal
                _ = signal_abwarten(shutdown_rx) => {
                    let _ = self.senden(framed, Envelope::error(MELDUNG_SHUTDOWN)).await;
                    return RelayError::Shutdown;
                }
            }
        }
    }

    async fn eingehend<S>(
        &self,
        framed: &mut Verbindung<S>,
        client: &Client,
        session: &CryptoSession,
        frame: Frame,
    ) -> RelayResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let roh = frame.into_text();
        let text = roh.trim();
        if text.is_empty() {
            return Ok(());
        }

        let klartext = match self.state.config.entschluesselung {
            EntschluesselungsModus::Lenient => session.decrypt_lenient(text),
            EntschluesselungsModus::Strict => match session.decrypt(text) {
                Ok(klartext) => klartext,
                Err(e) => {
                    tracing::debug!(
                        peer = %self.peer_addr,
                        name = %client.name(),
                        fehler = %e,
                        "Nachricht verworfen"
                    );
                    return self
                        .senden(framed, Envelope::error(MELDUNG_NICHT_ENTSCHLUESSELBAR))
                        .await;
                }
            },
        };

        if klartext.trim().is_empty() {
            return Ok(());
        }

        tracing::trace!(
            peer = %self.peer_addr,
            name = %client.name(),
            laenge = klartext.len(),
            "Nachricht empfangen"
        );

        let envelope = Envelope::chat_von(client.name().as_str(), &klartext);
        let laenge = self.ausgehende_laenge(&envelope)?;
        if laenge > self.state.config.max_frame_groesse {
            tracing::debug!(
                peer = %self.peer_addr,
                name = %client.name(),
                laenge,
                max = self.state.config.max_frame_groesse,
                "Nachricht zu lang fuer die Verteilung"
            );
            return self.senden(framed, Envelope::error(MELDUNG_ZU_LANG)).await;
        }

        let report = self.state.router.distribute(&envelope, Some(client.id()));
        tracing::trace!(
            zugestellt = report.delivered,
            entfernt = report.evicted.len(),
            "Nachricht verteilt"
        );
        Ok(())
    }

    async fn ausgehend<S>(
        &self,
        framed: &mut Verbindung<S>,
        session: &CryptoSession,
        envelope: Envelope,
    ) -> RelayResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let envelope = if envelope.kind() == EnvelopeKind::Chat {
            let chiffretext = session.encrypt(envelope.payload())?;
            envelope.with_payload(chiffretext)
        } else {
            envelope
        };
        self.senden(framed, envelope).await
    }

    /// Laengste Zeile, die `envelope` bei irgendeinem Empfaenger ergibt
    ///
    /// Ist die Verschluesselung aktiv, zaehlt auch die Base64-Laenge des
    /// Chiffretexts.
    fn ausgehende_laenge(&self, envelope: &Envelope) -> RelayResult<usize> {
        let zeilen_laenge = |envelope: &Envelope| {
            envelope
                .encode()
                .map(|zeile| zeile.len() - 1)
                .map_err(|e| RelayError::intern(e.to_string()))
        };

        let klartext = zeilen_laenge(envelope)?;
        if !self.state.config.verschluesselung_aktiv() {
            return Ok(klartext);
        }
        let rahmen = zeilen_laenge(&envelope.clone().with_payload(String::new()))?;
        Ok(klartext.max(rahmen + chiffretext_laenge(envelope.payload().len())))
    }

    /// Schreibt ein Envelope mit Deadline
    async fn senden<S>(&self, framed: &mut Verbindung<S>, envelope: Envelope) -> RelayResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match tokio::time::timeout(self.state.config.schreib_timeout, framed.send(envelope)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(RelayError::Io(e)),
            Err(_) => Err(RelayError::Timeout),
        }
    }

    fn ende_protokollieren(&self, grund: &RelayError) {
        let peer = self.peer_addr;
        match grund {
            RelayError::PeerClosed => {
                tracing::info!(peer = %peer, "Verbindung vom Client getrennt");
            }
            RelayError::Shutdown => {
                tracing::info!(peer = %peer, "Shutdown-Signal: Verbindung wird getrennt");
            }
            RelayError::NameTaken(name) => {
                tracing::info!(peer = %peer, name = %name, "Name bereits vergeben");
            }
            RelayError::ServerVoll { max } => {
                tracing::info!(peer = %peer, max = *max, "Server voll: Client abgelehnt");
            }
            RelayError::ProtocolViolation(grund) => {
                tracing::info!(peer = %peer, grund = %grund, "Handshake abgelehnt");
            }
            RelayError::Io(e) => {
                tracing::debug!(peer = %peer, fehler = %e, "IO-Fehler");
            }
            anderer => {
                tracing::warn!(peer = %peer, fehler = %anderer, "Verbindung beendet");
            }
        }
    }
}

/// Wartet bis ein Signal (Shutdown, Schliessen) `true` ist
///
/// Wird der Sender verworfen, kommt das Signal nie.
async fn signal_abwarten(signal: &mut watch::Receiver<bool>) {
    if signal.wait_for(|aktiv| *aktiv).await.is_err() {
        std::future::pending::<()>().await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
