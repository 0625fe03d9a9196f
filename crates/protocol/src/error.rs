//! Fehlertypen fuer das Protokoll-Crate

use thiserror::Error;

/// Protokoll-Fehler
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Bytes ergeben kein gueltiges Envelope
    #[error("Ungueltiges Envelope: {0}")]
    MalformedEnvelope(#[from] serde_json::Error),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
