//! Fehlertypen fuer Confluxus-Basistypen

use thiserror::Error;

/// Result-Alias fuer die Basistypen
pub type Result<T> = std::result::Result<T, CoreError>;

/// Fehler beim Konstruieren der gemeinsamen Typen
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("Anzeigename ist leer")]
    NameLeer,

    #[error("Anzeigename zu lang: {laenge} Zeichen (Maximum: {max})")]
    NameZuLang { laenge: usize, max: usize },

    #[error("Anzeigename enthaelt Steuerzeichen")]
    NameSteuerzeichen,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = CoreError::NameZuLang { laenge: 80, max: 64 };
        assert_eq!(e.to_string(), "Anzeigename zu lang: 80 Zeichen (Maximum: 64)");
    }
}
