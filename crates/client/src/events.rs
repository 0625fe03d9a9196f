//! Ereignisse fuer die Darstellungsschicht

/// Befehle, mit denen der Benutzer die Sitzung beendet
pub const QUIT_COMMANDS: [&str; 3] = ["/quit", "/exit", "/q"];

/// Prueft ob eine Eingabezeile ein Quit-Befehl ist (Gross-/Kleinschreibung egal)
pub fn is_quit_command(zeile: &str) -> bool {
    let zeile = zeile.trim();
    QUIT_COMMANDS
        .iter()
        .any(|befehl| zeile.eq_ignore_ascii_case(befehl))
}

/// Ein vom Server empfangenes Ereignis
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// System-Hinweis oder Fehlermeldung des Servers
    SystemMessage(String),
    /// Chat-Nachricht eines anderen Clients
    ChatMessage { sender: String, text: String },
    /// Verbindung zum Server verloren
    ConnectionLost,
}

/// Schnittstelle zur Darstellung (Terminal, GUI)
pub trait ClientEventHandler {
    fn on_system_message(&mut self, text: &str);

    fn on_chat_message(&mut self, sender: &str, text: &str);

    fn on_connection_lost(&mut self) {}

    /// Leitet ein Ereignis an die passende Methode weiter
    fn handle(&mut self, event: &ClientEvent) {
        match event {
            ClientEvent::SystemMessage(text) => self.on_system_message(text),
            ClientEvent::ChatMessage { sender, text } => self.on_chat_message(sender, text),
            ClientEvent::ConnectionLost => self.on_connection_lost(),
        }
    }
}
