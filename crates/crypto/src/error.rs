//! Fehlertypen fuer das Kryptografie-Subsystem

use thiserror::Error;

/// Fehler im Kryptografie-Subsystem
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Verschluesselung fehlgeschlagen: {0}")]
    Verschluesselung(String),

    /// Manipulierter Chiffretext, falscher Schluessel oder kein Chiffretext
    #[error("Entschluesselung fehlgeschlagen: {0}")]
    Entschluesselung(String),

    #[error("Key Derivation fehlgeschlagen: {0}")]
    KeyDerivation(String),

    #[error("Ungueltige Salt-Laenge: mindestens {minimum}, erhalten {erhalten}")]
    UngueltigesSalt { minimum: usize, erhalten: usize },

    #[error("Base64-Dekodierung fehlgeschlagen: {0}")]
    Base64(#[from] base64::DecodeError),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
