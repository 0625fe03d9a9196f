//! confluxus-protocol – Netzwerkprotokoll-Definitionen
//!
//! Dieses Crate definiert das Envelope-Format, das nach dem Handshake
//! zwischen Client und Server ausgetauscht wird, sowie den zeilenbasierten
//! Wire-Codec fuer `tokio_util::codec::Framed`.

pub mod envelope;
pub mod error;
pub mod wire;

pub use envelope::{EncryptionInfo, Envelope, EnvelopeKind};
pub use error::{ProtocolError, ProtocolResult};
pub use wire::{EnvelopeCodec, Frame};
