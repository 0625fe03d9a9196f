//! Gemeinsame Identifikationstypen fuer Confluxus
//!
//! Newtypes verhindern Verwechslungen zwischen Verbindungs-IDs und
//! beliebigen Zahlen bzw. zwischen geprueften Namen und Rohtext.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};

/// Maximale Laenge eines Anzeigenamens in Zeichen
pub const MAX_NAME_LAENGE: usize = 64;

// ---------------------------------------------------------------------------
// ConnectionId
// ---------------------------------------------------------------------------

/// Stabile Kennung einer Verbindung
///
/// Wird von der Registry monoton vergeben und innerhalb eines Prozesses
/// nie wiederverwendet. Die natuerliche Ordnung entspricht der
/// Beitrittsreihenfolge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    /// Gibt den inneren Zaehlerwert zurueck
    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// DisplayName
// ---------------------------------------------------------------------------

/// Gepruefter Anzeigename eines Clients
///
/// Garantiert: nicht leer nach Trimmen, hoechstens `MAX_NAME_LAENGE`
/// Zeichen, keine Steuerzeichen. Vergleiche sind exakt (Gross-/Klein-
/// schreibung wird unterschieden).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DisplayName(String);

impl DisplayName {
    /// Prueft und normalisiert einen Rohnamen (Whitespace am Rand wird entfernt)
    pub fn parse(roh: &str) -> Result<Self> {
        let name = roh.trim();
        if name.is_empty() {
            return Err(CoreError::NameLeer);
        }
        let laenge = name.chars().count();
        if laenge > MAX_NAME_LAENGE {
            return Err(CoreError::NameZuLang {
                laenge,
                max: MAX_NAME_LAENGE,
            });
        }
        if name.chars().any(char::is_control) {
            return Err(CoreError::NameSteuerzeichen);
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DisplayName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for DisplayName {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let roh = String::deserialize(deserializer)?;
        DisplayName::parse(&roh).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_ordnung_folgt_zaehler() {
        assert!(ConnectionId(1) < ConnectionId(2));
        assert_eq!(ConnectionId(7).to_string(), "conn:7");
    }

    #[test]
    fn name_wird_getrimmt() {
        let name = DisplayName::parse("  Alice \n").unwrap();
        assert_eq!(name.as_str(), "Alice");
    }

    #[test]
    fn leerer_name_abgelehnt() {
        assert_eq!(DisplayName::parse(""), Err(CoreError::NameLeer));
        assert_eq!(DisplayName::parse("   \t "), Err(CoreError::NameLeer));
    }

    #[test]
    fn zu_langer_name_abgelehnt() {
        let roh = "x".repeat(MAX_NAME_LAENGE + 1);
        assert!(matches!(
            DisplayName::parse(&roh),
            Err(CoreError::NameZuLang { .. })
        ));
        assert!(DisplayName::parse(&"x".repeat(MAX_NAME_LAENGE)).is_ok());
    }

    #[test]
    fn steuerzeichen_abgelehnt() {
        assert_eq!(
            DisplayName::parse("Ali\nce"),
            Err(CoreError::NameSteuerzeichen)
        );
    }

    #[test]
    fn gross_klein_unterschieden() {
        let a = DisplayName::parse("alice").unwrap();
        let b = DisplayName::parse("Alice").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn name_serde_prueft_beim_lesen() {
        let name: DisplayName = serde_json::from_str("\"Bob\"").unwrap();
        assert_eq!(name.as_str(), "Bob");
        assert!(serde_json::from_str::<DisplayName>("\"  \"").is_err());
    }
}
