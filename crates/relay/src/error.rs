//! Fehlertypen fuer den Relay-Service

use confluxus_crypto::CryptoError;
use thiserror::Error;

/// Fehlertyp fuer den Relay-Service
#[derive(Debug, Error)]
pub enum RelayError {
    /// Anzeigename ist bereits an einen verbundenen Client vergeben
    #[error("Name bereits vergeben: {0}")]
    NameTaken(String),

    /// Protokollfehler (leerer oder ungueltiger Name)
    #[error("Protokollfehler: {0}")]
    ProtocolViolation(String),

    /// Maximale Anzahl Clients erreicht
    #[error("Server voll (max {max})")]
    ServerVoll { max: usize },

    /// Gegenstelle hat die Verbindung geschlossen
    #[error("Verbindung getrennt")]
    PeerClosed,

    /// IO-Fehler (TCP, Socket, Frame zu gross)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Handshake- oder Schreib-Deadline abgelaufen
    #[error("Timeout")]
    Timeout,

    /// Zustellung an den Client fehlgeschlagen, Client wurde entfernt
    #[error("Senden fehlgeschlagen")]
    SendFehler,

    /// Server wird heruntergefahren
    #[error("Server wird heruntergefahren")]
    Shutdown,

    #[error("Krypto-Fehler: {0}")]
    Crypto(#[from] CryptoError),

    /// Interner Fehler
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl RelayError {
    /// Erstellt einen internen Fehler
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Erstellt einen Protokollfehler
    pub fn protokoll(msg: impl Into<String>) -> Self {
        Self::ProtocolViolation(msg.into())
    }
}

/// Result-Typ fuer den Relay-Service
pub type RelayResult<T> = Result<T, RelayError>;
