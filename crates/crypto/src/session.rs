//! CryptoSession – Verschluesselungszustand einer einzelnen Verbindung
//!
//! Server und Client arbeiten nur mit diesem Typ. Ist die Verschluesselung
//! deaktiviert, verhalten sich `encrypt` und `decrypt` wie die Identitaet.

use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use confluxus_protocol::EncryptionInfo;

use crate::cipher;
use crate::error::CryptoResult;
use crate::kdf::{derive_key, generate_salt};
use crate::types::SessionKey;

#[derive(Debug, Clone)]
enum Modus {
    Deaktiviert,
    Aktiv { key: SessionKey, salt: Vec<u8> },
}

/// Verschluesselungszustand einer Verbindung
#[derive(Debug, Clone)]
pub struct CryptoSession {
    modus: Modus,
}

impl CryptoSession {
    /// Session ohne Verschluesselung
    pub fn disabled() -> Self {
        Self {
            modus: Modus::Deaktiviert,
        }
    }

    /// Server-Seite: frisches Salt erzeugen und Schluessel ableiten
    pub fn negotiate(password: &str) -> CryptoResult<Self> {
        let salt = generate_salt();
        let key = derive_key(password, &salt)?;
        Ok(Self {
            modus: Modus::Aktiv {
                key,
                salt: salt.to_vec(),
            },
        })
    }

    /// Client-Seite: Schluessel aus dem angekuendigten Salt ableiten
    pub fn from_salt(password: &str, salt_b64: &str) -> CryptoResult<Self> {
        let salt = URL_SAFE.decode(salt_b64.trim())?;
        let key = derive_key(password, &salt)?;
        Ok(Self {
            modus: Modus::Aktiv { key, salt },
        })
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self.modus, Modus::Aktiv { .. })
    }

    /// Base64url-kodiertes Salt (nur bei aktiver Verschluesselung)
    pub fn salt_b64(&self) -> Option<String> {
        match &self.modus {
            Modus::Aktiv { salt, .. } => Some(URL_SAFE.encode(salt)),
            Modus::Deaktiviert => None,
        }
    }

    /// Parameter fuer die Willkommensnachricht
    pub fn encryption_info(&self) -> EncryptionInfo {
        match self.salt_b64() {
            Some(salt) => EncryptionInfo::mit_salt(salt),
            None => EncryptionInfo::deaktiviert(),
        }
    }

    pub fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        match &self.modus {
            Modus::Aktiv { key, .. } => cipher::encrypt(plaintext, key),
            Modus::Deaktiviert => Ok(plaintext.to_string()),
        }
    }

    pub fn decrypt(&self, token: &str) -> CryptoResult<String> {
        match &self.modus {
            Modus::Aktiv { key, .. } => cipher::decrypt(token, key),
            Modus::Deaktiviert => Ok(token.to_string()),
        }
    }

    /// Entschluesselt, faellt bei Fehlern aber auf den unveraenderten Text zurueck
    ///
    /// Erlaubt Clients ohne Verschluesselung die Teilnahme an einem
    /// verschluesselten Raum.
    pub fn decrypt_lenient(&self, token: &str) -> String {
        match self.decrypt(token) {
            Ok(klartext) => klartext,
            Err(e) => {
                tracing::debug!("Entschluesselung fehlgeschlagen, verwende Klartext: {}", e);
                token.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CryptoError;

    #[test]
    fn deaktiviert_ist_identitaet() {
        let session = CryptoSession::disabled();
        assert!(!session.is_enabled());
        assert_eq!(session.encrypt("hallo").unwrap(), "hallo");
        assert_eq!(session.decrypt("hallo").unwrap(), "hallo");
        assert_eq!(session.encryption_info(), EncryptionInfo::deaktiviert());
    }

    #[test]
    fn server_und_client_teilen_schluessel() {
        let server = CryptoSession::negotiate("geheim").unwrap();
        let info = server.encryption_info();
        assert!(info.encrypted);

        let client = CryptoSession::from_salt("geheim", info.salt.as_deref().unwrap()).unwrap();
        let token = client.encrypt("hello").unwrap();
        assert_eq!(server.decrypt(&token).unwrap(), "hello");

        let antwort = server.encrypt("[Bob]: hi").unwrap();
        assert_eq!(client.decrypt(&antwort).unwrap(), "[Bob]: hi");
    }

    #[test]
    fn jede_verbindung_eigenes_salt() {
        let a = CryptoSession::negotiate("geheim").unwrap();
        let b = CryptoSession::negotiate("geheim").unwrap();
        assert_ne!(a.salt_b64(), b.salt_b64());

        let token = a.encrypt("nur fuer a").unwrap();
        assert!(b.decrypt(&token).is_err());
    }

    #[test]
    fn falsches_passwort() {
        let server = CryptoSession::negotiate("geheim").unwrap();
        let salt = server.salt_b64().unwrap();
        let client = CryptoSession::from_salt("falsch", &salt).unwrap();
        let token = client.encrypt("hello").unwrap();
        assert!(server.decrypt(&token).is_err());
        assert_eq!(server.decrypt_lenient(&token), token);
    }

    #[test]
    fn lenient_laesst_klartext_durch() {
        let server = CryptoSession::negotiate("geheim").unwrap();
        assert_eq!(server.decrypt_lenient("plain hello"), "plain hello");
    }

    #[test]
    fn ungueltiges_salt() {
        assert!(matches!(
            CryptoSession::from_salt("geheim", "%%%"),
            Err(CryptoError::Base64(_))
        ));
        assert!(matches!(
            CryptoSession::from_salt("geheim", "YWI="),
            Err(CryptoError::UngueltigesSalt { .. })
        ));
    }
}
