//! confluxus-client – Client-Seite des Confluxus-Protokolls
//!
//! Baut die Verbindung zum Relay auf, fuehrt den Handshake (Name,
//! Schluessel-Austausch) durch und uebersetzt eingehende Envelopes in
//! `ClientEvent`s. Die Darstellung uebernimmt ein `ClientEventHandler`.

pub mod connection;
pub mod error;
pub mod events;

pub use connection::ChatClient;
pub use error::{ClientError, ClientResult};
pub use events::{is_quit_command, ClientEvent, ClientEventHandler, QUIT_COMMANDS};
