//! Gemeinsame Typen fuer das Kryptografie-Subsystem

/// Laenge eines Sitzungsschluessels in Bytes (AES-256)
pub const KEY_LAENGE: usize = 32;

/// Abgeleiteter symmetrischer Schluessel einer Verbindung (wird beim Drop genullt)
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey([u8; KEY_LAENGE]);

impl SessionKey {
    pub fn new(bytes: [u8; KEY_LAENGE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LAENGE] {
        &self.0
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionKey([REDACTED] {} bytes)", KEY_LAENGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_zeigt_keinen_schluessel() {
        let key = SessionKey::new([0xAB; KEY_LAENGE]);
        let ausgabe = format!("{key:?}");
        assert!(ausgabe.contains("REDACTED"));
        assert!(!ausgabe.to_lowercase().contains("ab, ab"));
    }
}
