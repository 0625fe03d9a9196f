//! Argon2id Schluesselableitung
//!
//! Server und Client muessen identische Parameter verwenden, sonst passen
//! die abgeleiteten Schluessel nicht zueinander. Die Parameter sind daher
//! feste Konstanten und nicht konfigurierbar.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::{rngs::OsRng, RngCore};

use crate::error::{CryptoError, CryptoResult};
use crate::types::{SessionKey, KEY_LAENGE};

/// Laenge eines neu erzeugten Salts in Bytes
pub const SALT_LAENGE: usize = 16;

/// Mindestlaenge die Argon2 fuer ein Salt akzeptiert
pub const MIN_SALT_LAENGE: usize = 8;

/// Speicherbedarf in KiB
const ARGON2_M_COST: u32 = 19 * 1024;
const ARGON2_T_COST: u32 = 2;
const ARGON2_P_COST: u32 = 1;

/// Erzeugt ein frisches Zufalls-Salt
pub fn generate_salt() -> [u8; SALT_LAENGE] {
    let mut salt = [0u8; SALT_LAENGE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Leitet aus Passwort und Salt einen 256-Bit Schluessel ab
///
/// Deterministisch: gleiche Eingaben ergeben denselben Schluessel.
pub fn derive_key(password: &str, salt: &[u8]) -> CryptoResult<SessionKey> {
    if salt.len() < MIN_SALT_LAENGE {
        return Err(CryptoError::UngueltigesSalt {
            minimum: MIN_SALT_LAENGE,
            erhalten: salt.len(),
        });
    }

    let params = Params::new(
        ARGON2_M_COST,
        ARGON2_T_COST,
        ARGON2_P_COST,
        Some(KEY_LAENGE),
    )
    .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = [0u8; KEY_LAENGE];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    let session_key = SessionKey::new(key);
    key.iter_mut().for_each(|b| *b = 0);
    Ok(session_key)
}
