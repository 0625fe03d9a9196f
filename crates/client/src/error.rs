//! Fehlertypen fuer den Client

use confluxus_crypto::CryptoError;
use thiserror::Error;

/// Fehler die bei der Server-Verbindung auftreten koennen
#[derive(Debug, Error)]
pub enum ClientError {
    /// TCP-Verbindung fehlgeschlagen
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Server hat den Handshake abgelehnt (z.B. Name vergeben)
    #[error("Vom Server abgelehnt: {0}")]
    Rejected(String),

    /// Verbindung vor Abschluss des Handshakes getrennt
    #[error("Verbindung vom Server getrennt")]
    VerbindungGetrennt,

    #[error("Unerwartete Antwort: {0}")]
    UnerwarteteAntwort(String),

    #[error("Krypto-Fehler: {0}")]
    Crypto(#[from] CryptoError),
}

pub type ClientResult<T> = Result<T, ClientError>;
