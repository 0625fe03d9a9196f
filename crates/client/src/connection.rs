//! Client-seitige Verbindung zum Confluxus-Relay
//!
//! Nutzt den `EnvelopeCodec` aus confluxus-protocol fuer das Wire-Format
//! (eine JSON-Zeile pro Envelope). Alle Operationen sind async.

use confluxus_crypto::CryptoSession;
use confluxus_protocol::{Envelope, EnvelopeCodec, EnvelopeKind, Frame};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

use crate::error::{ClientError, ClientResult};
use crate::events::{is_quit_command, ClientEvent, ClientEventHandler};

// ---------------------------------------------------------------------------
// ChatClient
// ---------------------------------------------------------------------------

/// Verbindung zum Relay nach erfolgreichem Handshake
pub struct ChatClient<S = TcpStream> {
    framed: Framed<S, EnvelopeCodec>,
    name: String,
    welcome: Envelope,
    session: CryptoSession,
}

impl ChatClient<TcpStream> {
    /// Baut eine TCP-Verbindung auf und fuehrt den Handshake durch
    pub async fn connect(
        addr: impl ToSocketAddrs,
        name: &str,
        password: Option<&str>,
    ) -> ClientResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        if let Ok(peer) = stream.peer_addr() {
            tracing::info!("TCP-Verbindung hergestellt zu {}", peer);
        }
        Self::handshake(stream, name, password).await
    }
}

impl<S> ChatClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Handshake ueber einen bereits verbundenen Stream
    ///
    /// Sendet den Namen als Rohtext, wartet auf die Willkommensnachricht und
    /// leitet bei Bedarf den Schluessel aus dem angekuendigten Salt ab.
    pub async fn handshake(stream: S, name: &str, password: Option<&str>) -> ClientResult<Self> {
        let mut framed = Framed::new(stream, EnvelopeCodec::new());
        let name = name.trim().to_string();

        framed.send(Frame::Text(name.clone())).await?;

        let welcome = match framed.next().await {
            Some(Ok(Frame::Envelope(envelope))) => match envelope.kind() {
                EnvelopeKind::System => envelope,
                EnvelopeKind::Error => {
                    return Err(ClientError::Rejected(envelope.into_payload()));
                }
                EnvelopeKind::Chat => {
                    return Err(ClientError::UnerwarteteAntwort(
                        "Chat-Nachricht vor der Willkommensnachricht".into(),
                    ));
                }
            },
            Some(Ok(Frame::Text(text))) => return Err(ClientError::UnerwarteteAntwort(text)),
            Some(Err(e)) => return Err(ClientError::Io(e)),
            None => return Err(ClientError::VerbindungGetrennt),
        };

        let session = Self::session_aushandeln(&welcome, password).await?;
        tracing::info!(
            name = %name,
            verschluesselt = session.is_enabled(),
            "Handshake abgeschlossen"
        );

        Ok(Self {
            framed,
            name,
            welcome,
            session,
        })
    }

    async fn session_aushandeln(
        welcome: &Envelope,
        password: Option<&str>,
    ) -> ClientResult<CryptoSession> {
        let Some(info) = welcome.encryption().filter(|info| info.encrypted) else {
            return Ok(CryptoSession::disabled());
        };

        let Some(salt) = info.salt.clone() else {
            tracing::warn!("Server kuendigt Verschluesselung ohne Salt an, sende unverschluesselt");
            return Ok(CryptoSession::disabled());
        };

        let Some(password) = password.map(str::to_string) else {
            tracing::warn!("Server verlangt Verschluesselung, aber kein Passwort gesetzt");
            return Ok(CryptoSession::disabled());
        };

        let session = tokio::task::spawn_blocking(move || CryptoSession::from_salt(&password, &salt))
            .await
            .map_err(|e| ClientError::UnerwarteteAntwort(format!("KDF-Task: {e}")))??;
        Ok(session)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Die Willkommensnachricht des Servers
    pub fn welcome(&self) -> &Envelope {
        &self.welcome
    }

    pub fn is_encrypted(&self) -> bool {
        self.session.is_enabled()
    }

    /// Verschluesselt und sendet eine Benutzereingabe
    ///
    /// Leere Eingaben werden nicht gesendet.
    pub async fn send_user_text(&mut self, text: &str) -> ClientResult<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        let payload = self.session.encrypt(text)?;
        self.framed.send(Envelope::chat(payload)).await?;
        Ok(())
    }

    /// Wartet auf das naechste Ereignis vom Server
    pub async fn next_event(&mut self) -> ClientEvent {
        loop {
            match self.framed.next().await {
                Some(Ok(Frame::Envelope(envelope))) => return self.ereignis_aus(envelope),
                Some(Ok(Frame::Text(text))) => {
                    if !text.trim().is_empty() {
                        return ClientEvent::SystemMessage(text);
                    }
                }
                Some(Err(e)) => {
                    tracing::debug!(fehler = %e, "Lesefehler");
                    return ClientEvent::ConnectionLost;
                }
                None => return ClientEvent::ConnectionLost,
            }
        }
    }

    fn ereignis_aus(&self, envelope: Envelope) -> ClientEvent {
        match envelope.kind() {
            EnvelopeKind::Chat => {
                let klartext = self.session.decrypt_lenient(envelope.payload());
                match envelope.sender() {
                    Some(sender) => {
                        let praefix = format!("[{sender}]: ");
                        let text = klartext
                            .strip_prefix(&praefix)
                            .map(str::to_string)
                            .unwrap_or_else(|| klartext.clone());
                        ClientEvent::ChatMessage {
                            sender: sender.to_string(),
                            text,
                        }
                    }
                    None => ClientEvent::SystemMessage(klartext),
                }
            }
            EnvelopeKind::System | EnvelopeKind::Error => {
                ClientEvent::SystemMessage(envelope.into_payload())
            }
        }
    }

    /// Treibt die Sitzung bis zum Verbindungsverlust oder einem Quit-Befehl
    ///
    /// Eingaben kommen aus `input`, Ereignisse gehen an `handler`. Wird die
    /// Eingabe-Queue geschlossen, endet die Sitzung ebenfalls.
    pub async fn run<H>(
        mut self,
        handler: &mut H,
        mut input: mpsc::Receiver<String>,
    ) -> ClientResult<()>
    where
        H: ClientEventHandler,
    {
        loop {
            tokio::select! {
                event = self.next_event() => {
                    handler.handle(&event);
                    if event == ClientEvent::ConnectionLost {
                        return Ok(());
                    }
                }
                zeile = input.recv() => {
                    let Some(zeile) = zeile else {
                        return Ok(());
                    };
                    if is_quit_command(&zeile) {
                        tracing::info!(name = %self.name, "Sitzung vom Benutzer beendet");
                        return Ok(());
                    }
                    self.send_user_text(&zeile).await?;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use confluxus_protocol::EncryptionInfo;
    use tokio::io::DuplexStream;

    type Gegenstelle = Framed<DuplexStream, EnvelopeCodec>;

    /// Simulierter Server: liest den Namen, antwortet mit `antwort`
    async fn server_antwortet(server: &mut Gegenstelle, antwort: Envelope) -> String {
        let name = match server.next().await {
            Some(Ok(frame)) => frame.into_text(),
            anderes => panic!("Name erwartet, erhalten: {anderes:?}"),
        };
        server.send(antwort).await.unwrap();
        name
    }

    fn paar() -> (DuplexStream, Gegenstelle) {
        let (client_io, server_io) = tokio::io::duplex(16 * 1024);
        (client_io, Framed::new(server_io, EnvelopeCodec::new()))
    }

    #[derive(Default)]
    struct Aufzeichnung {
        system: Vec<String>,
        chat: Vec<(String, String)>,
        verloren: bool,
    }

    impl ClientEventHandler for Aufzeichnung {
        fn on_system_message(&mut self, text: &str) {
            self.system.push(text.to_string());
        }

        fn on_chat_message(&mut self, sender: &str, text: &str) {
            self.chat.push((sender.to_string(), text.to_string()));
        }

        fn on_connection_lost(&mut self) {
            self.verloren = true;
        }
    }

    #[tokio::test]
    async fn handshake_ohne_verschluesselung() {
        let (client_io, mut server) = paar();
        let server_task = tokio::spawn(async move {
            let name = server_antwortet(
                &mut server,
                Envelope::willkommen("Alice", EncryptionInfo::deaktiviert()),
            )
            .await;
            (name, server)
        });

        let client = ChatClient::handshake(client_io, " Alice ", None).await.unwrap();
        let (name, _server) = server_task.await.unwrap();

        assert_eq!(name, "Alice");
        assert_eq!(client.name(), "Alice");
        assert!(!client.is_encrypted());
        assert!(client.welcome().payload().starts_with("Welcome to the chat, Alice!"));
    }

    #[tokio::test]
    async fn vergebener_name_wird_abgelehnt() {
        let (client_io, mut server) = paar();
        tokio::spawn(async move {
            server_antwortet(&mut server, Envelope::name_vergeben("Alice")).await;
        });

        match ChatClient::handshake(client_io, "Alice", None).await {
            Err(ClientError::Rejected(meldung)) => assert_eq!(
                meldung,
                "Username 'Alice' is already taken. Please choose another."
            ),
            anderes => panic!("Rejected erwartet: {:?}", anderes.err()),
        }
    }

    #[tokio::test]
    async fn server_trennt_im_handshake() {
        let (client_io, server) = paar();
        drop(server);
        assert!(ChatClient::handshake(client_io, "Alice", None).await.is_err());
    }

    #[tokio::test]
    async fn verschluesselter_austausch() {
        let (client_io, mut server) = paar();
        let server_session = CryptoSession::negotiate("geheim").unwrap();
        let info = server_session.encryption_info();

        let server_task = tokio::spawn(async move {
            server_antwortet(&mut server, Envelope::willkommen("Alice", info)).await;

            // Client -> Server
            let eingehend = match server.next().await {
                Some(Ok(Frame::Envelope(envelope))) => envelope,
                anderes => panic!("Envelope erwartet: {anderes:?}"),
            };
            let klartext = server_session.decrypt(eingehend.payload()).unwrap();

            // Server -> Client
            let antwort = Envelope::chat_von("Bob", "hi");
            let chiffre = server_session.encrypt(antwort.payload()).unwrap();
            server.send(antwort.with_payload(chiffre)).await.unwrap();
            server.send(Envelope::hinweis("Bob left the chat!")).await.unwrap();
            (klartext, server)
        });

        let mut client = ChatClient::handshake(client_io, "Alice", Some("geheim"))
            .await
            .unwrap();
        assert!(client.is_encrypted());

        client.send_user_text("hello").await.unwrap();
        assert_eq!(
            client.next_event().await,
            ClientEvent::ChatMessage {
                sender: "Bob".into(),
                text: "hi".into()
            }
        );
        assert_eq!(
            client.next_event().await,
            ClientEvent::SystemMessage("[SYSTEM]: Bob left the chat!".into())
        );

        let (klartext, server) = server_task.await.unwrap();
        assert_eq!(klartext, "hello");
        drop(server);
        assert_eq!(client.next_event().await, ClientEvent::ConnectionLost);
    }

    #[tokio::test]
    async fn verschluesselung_ohne_passwort_bleibt_klartext() {
        let (client_io, mut server) = paar();
        tokio::spawn(async move {
            server_antwortet(
                &mut server,
                Envelope::willkommen("Alice", EncryptionInfo::mit_salt("c2FsdHNhbHRzYWx0")),
            )
            .await;
            server
        });

        let client = ChatClient::handshake(client_io, "Alice", None).await.unwrap();
        assert!(!client.is_encrypted());
    }

    #[tokio::test]
    async fn run_endet_mit_quit_befehl() {
        let (client_io, mut server) = paar();
        let server_task = tokio::spawn(async move {
            server_antwortet(
                &mut server,
                Envelope::willkommen("Alice", EncryptionInfo::deaktiviert()),
            )
            .await;
            server.send(Envelope::chat_von("Bob", "hallo")).await.unwrap();

            let eingehend = match server.next().await {
                Some(Ok(frame)) => frame.into_text(),
                anderes => panic!("Nachricht erwartet: {anderes:?}"),
            };
            // Nach /quit schliesst der Client die Verbindung
            let ende = server.next().await;
            (eingehend, ende.is_none())
        });

        let client = ChatClient::handshake(client_io, "Alice", None).await.unwrap();
        let (tx, rx) = mpsc::channel(8);
        let mut aufzeichnung = Aufzeichnung::default();

        let eingaben = tokio::spawn(async move {
            tx.send("  ".to_string()).await.unwrap();
            tx.send("tschuess".to_string()).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            tx.send("/quit".to_string()).await.unwrap();
        });

        client.run(&mut aufzeichnung, rx).await.unwrap();
        eingaben.await.unwrap();

        let (eingehend, geschlossen) = server_task.await.unwrap();
        assert_eq!(eingehend, "tschuess");
        assert!(geschlossen);
        assert_eq!(aufzeichnung.chat, vec![("Bob".to_string(), "hallo".to_string())]);
        assert!(!aufzeichnung.verloren);
    }

    #[tokio::test]
    async fn run_meldet_verbindungsverlust() {
        let (client_io, mut server) = paar();
        tokio::spawn(async move {
            server_antwortet(
                &mut server,
                Envelope::willkommen("Alice", EncryptionInfo::deaktiviert()),
            )
            .await;
            server.send(Envelope::error("Server is shutting down.")).await.unwrap();
        });

        let client = ChatClient::handshake(client_io, "Alice", None).await.unwrap();
        let (_tx, rx) = mpsc::channel(8);
        let mut aufzeichnung = Aufzeichnung::default();
        client.run(&mut aufzeichnung, rx).await.unwrap();

        assert_eq!(aufzeichnung.system, vec!["Server is shutting down.".to_string()]);
        assert!(aufzeichnung.verloren);
    }
}
