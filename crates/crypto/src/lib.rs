//! # confluxus-crypto
//!
//! Payload-Verschluesselung fuer Confluxus.
//!
//! Jede Verbindung leitet aus einem vorab geteilten Passwort und einem vom
//! Server gewaehlten Salt einen eigenen Schluessel ab. Das ist eine
//! Verschleierung auf Anwendungsebene, keine Transportsicherheit: der
//! Schluessel-Austausch ist nicht authentifiziert.
//!
//! ## Module
//! - `kdf` - Argon2id Schluesselableitung, Salt-Erzeugung
//! - `cipher` - AES-256-GCM Verschluesselung als Base64url-Text
//! - `session` - `CryptoSession`, der Adapter den Server und Client verwenden
//! - `types` - `SessionKey`
//! - `error` - Fehlertypen

pub mod cipher;
pub mod error;
pub mod kdf;
pub mod session;
pub mod types;

// Bequeme Re-Exports
pub use cipher::{chiffretext_laenge, decrypt, encrypt};
pub use error::{CryptoError, CryptoResult};
pub use kdf::{derive_key, generate_salt};
pub use session::CryptoSession;
pub use types::SessionKey;
