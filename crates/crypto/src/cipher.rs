//! AES-256-GCM Verschluesselung einzelner Nachrichten
//!
//! Format des Chiffretexts: `base64url(nonce || ciphertext || tag)`.
//! Jede Nachricht bekommt eine frische Zufalls-Nonce, der Authentifizierungs-Tag
//! erkennt Manipulation und falsche Schluessel.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use rand::{rngs::OsRng, RngCore};

use crate::error::{CryptoError, CryptoResult};
use crate::types::SessionKey;

/// Nonce-Laenge fuer AES-GCM
pub const NONCE_LAENGE: usize = 12;

/// Laenge des GCM Authentifizierungs-Tags
pub const TAG_LAENGE: usize = 16;

/// Laenge des Tokens, das [`encrypt`] fuer `klartext_laenge` Bytes erzeugt
pub fn chiffretext_laenge(klartext_laenge: usize) -> usize {
    (NONCE_LAENGE + klartext_laenge + TAG_LAENGE).div_ceil(3) * 4
}

fn cipher_fuer(key: &SessionKey) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()))
}

/// Verschluesselt einen Klartext zu einem druckbaren Token
pub fn encrypt(plaintext: &str, key: &SessionKey) -> CryptoResult<String> {
    let mut nonce_bytes = [0u8; NONCE_LAENGE];
    OsRng.fill_bytes(&mut nonce_bytes);

    let ciphertext = cipher_fuer(key)
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
        .map_err(|e| CryptoError::Verschluesselung(e.to_string()))?;

    let mut out = Vec::with_capacity(NONCE_LAENGE + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(URL_SAFE.encode(out))
}

/// Entschluesselt ein mit [`encrypt`] erzeugtes Token
///
/// Jede Abweichung (kein Base64, zu kurz, falscher Schluessel, veraenderte
/// Bytes, kein UTF-8) ergibt `CryptoError::Entschluesselung`.
pub fn decrypt(token: &str, key: &SessionKey) -> CryptoResult<String> {
    let daten = URL_SAFE
        .decode(token.trim())
        .map_err(|e| CryptoError::Entschluesselung(format!("kein Base64: {e}")))?;

    if daten.len() < NONCE_LAENGE + TAG_LAENGE {
        return Err(CryptoError::Entschluesselung(format!(
            "Daten zu kurz: {} Bytes",
            daten.len()
        )));
    }

    let (nonce_bytes, ciphertext) = daten.split_at(NONCE_LAENGE);
    let klartext = cipher_fuer(key)
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| {
            CryptoError::Entschluesselung("Authentifizierung fehlgeschlagen".into())
        })?;

    String::from_utf8(klartext)
        .map_err(|_| CryptoError::Entschluesselung("Klartext ist kein UTF-8".into()))
}
