//! Envelope – die Protokolleinheit nach dem Handshake
//!
//! ## JSON-Format
//!
//! ```text
//! {"type":"chat","message":"[Alice]: hallo","sender":"Alice"}
//! {"type":"system","message":"Welcome ...","encryption":{"encrypted":true,"salt":"..."}}
//! {"type":"error","message":"Username 'Alice' is already taken. Please choose another."}
//! ```
//!
//! `sender` wird nur bei `chat` gesetzt und stammt immer vom Server.
//! `encryption` traegt ausschliesslich die Willkommensnachricht.
//! Ein Envelope ist nach dem Konstruieren unveraenderlich.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolResult;

/// Praefix fuer vom Server formatierte System-Hinweise
pub const SYSTEM_PRAEFIX: &str = "[SYSTEM]";

// ---------------------------------------------------------------------------
// EnvelopeKind
// ---------------------------------------------------------------------------

/// Art eines Envelopes (JSON-Feld `type`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    /// Chat-Nachricht eines Clients
    Chat,
    /// Hinweis des Servers (Willkommen, Beitritt, Austritt)
    System,
    /// Fehlermeldung an genau einen Client
    Error,
}

// ---------------------------------------------------------------------------
// EncryptionInfo
// ---------------------------------------------------------------------------

/// Verschluesselungs-Parameter aus der Willkommensnachricht
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionInfo {
    pub encrypted: bool,
    /// Base64url-kodiertes Salt (nur wenn `encrypted`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
}

impl EncryptionInfo {
    pub fn deaktiviert() -> Self {
        Self {
            encrypted: false,
            salt: None,
        }
    }

    pub fn mit_salt(salt: impl Into<String>) -> Self {
        Self {
            encrypted: true,
            salt: Some(salt.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Ein einzelnes Envelope auf der Leitung
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    kind: EnvelopeKind,
    #[serde(rename = "message")]
    payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encryption: Option<EncryptionInfo>,
}

impl Envelope {
    /// Chat-Envelope wie es ein Client sendet (ohne Absender)
    pub fn chat(payload: impl Into<String>) -> Self {
        Self {
            kind: EnvelopeKind::Chat,
            payload: payload.into(),
            sender: None,
            encryption: None,
        }
    }

    /// Chat-Envelope fuer den Broadcast
    ///
    /// Der Absender wird vom Server gestempelt, `message` ist bereits als
    /// `[<sender>]: <text>` formatiert.
    pub fn chat_von(sender: &str, text: &str) -> Self {
        Self {
            kind: EnvelopeKind::Chat,
            payload: format!("[{sender}]: {text}"),
            sender: Some(sender.to_string()),
            encryption: None,
        }
    }

    /// System-Envelope mit unveraendertem Text
    pub fn system(payload: impl Into<String>) -> Self {
        Self {
            kind: EnvelopeKind::System,
            payload: payload.into(),
            sender: None,
            encryption: None,
        }
    }

    /// System-Hinweis im Format `[SYSTEM]: <text>`
    pub fn hinweis(text: &str) -> Self {
        Self::system(format!("{SYSTEM_PRAEFIX}: {text}"))
    }

    pub fn error(payload: impl Into<String>) -> Self {
        Self {
            kind: EnvelopeKind::Error,
            payload: payload.into(),
            sender: None,
            encryption: None,
        }
    }

    /// Willkommensnachricht inklusive Schluessel-Austausch
    pub fn willkommen(name: &str, encryption: EncryptionInfo) -> Self {
        Self {
            kind: EnvelopeKind::System,
            payload: format!("Welcome to the chat, {name}! Type your messages below."),
            sender: None,
            encryption: Some(encryption),
        }
    }

    /// Ablehnung eines bereits vergebenen Namens
    pub fn name_vergeben(name: &str) -> Self {
        Self::error(format!(
            "Username '{name}' is already taken. Please choose another."
        ))
    }

    pub fn beigetreten(name: &str) -> Self {
        Self::hinweis(&format!("{name} joined the chat!"))
    }

    pub fn verlassen(name: &str) -> Self {
        Self::hinweis(&format!("{name} left the chat!"))
    }

    pub fn kind(&self) -> EnvelopeKind {
        self.kind
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    pub fn encryption(&self) -> Option<&EncryptionInfo> {
        self.encryption.as_ref()
    }

    /// Gibt den Payload-String zurueck und verwirft den Rest
    pub fn into_payload(self) -> String {
        self.payload
    }

    /// Erzeugt ein neues Envelope mit ersetztem Payload (z.B. Chiffretext)
    pub fn with_payload(self, payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            ..self
        }
    }

    /// Serialisiert als eine JSON-Zeile inklusive abschliessendem `\n`
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let mut bytes = serde_json::to_vec(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Strikte Dekodierung eines einzelnen Datensatzes
    ///
    /// Umgebender Whitespace (auch das Zeilenende) wird ignoriert.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes.trim_ascii())?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn als_json(envelope: &Envelope) -> Value {
        serde_json::from_slice(&envelope.encode().unwrap()).unwrap()
    }

    #[test]
    fn chat_broadcast_format() {
        let env = Envelope::chat_von("Alice", "hello");
        assert_eq!(
            als_json(&env),
            json!({"type": "chat", "message": "[Alice]: hello", "sender": "Alice"})
        );
    }

    #[test]
    fn willkommen_mit_salt() {
        let env = Envelope::willkommen("Alice", EncryptionInfo::mit_salt("c2FsdA=="));
        let wert = als_json(&env);
        assert_eq!(wert["type"], "system");
        assert_eq!(
            wert["message"],
            "Welcome to the chat, Alice! Type your messages below."
        );
        assert_eq!(wert["encryption"], json!({"encrypted": true, "salt": "c2FsdA=="}));
        assert!(wert.get("sender").is_none());
    }

    #[test]
    fn willkommen_ohne_verschluesselung() {
        let env = Envelope::willkommen("Bob", EncryptionInfo::deaktiviert());
        assert_eq!(als_json(&env)["encryption"], json!({"encrypted": false}));
    }

    #[test]
    fn name_vergeben_text() {
        let env = Envelope::name_vergeben("Alice");
        assert_eq!(
            als_json(&env),
            json!({
                "type": "error",
                "message": "Username 'Alice' is already taken. Please choose another."
            })
        );
    }

    #[test]
    fn system_hinweise_formatiert() {
        assert_eq!(
            Envelope::beigetreten("Bob").payload(),
            "[SYSTEM]: Bob joined the chat!"
        );
        assert_eq!(
            Envelope::verlassen("Bob").payload(),
            "[SYSTEM]: Bob left the chat!"
        );
    }

    #[test]
    fn encode_endet_mit_zeilenumbruch() {
        let bytes = Envelope::system("x\ny").encode().unwrap();
        assert_eq!(bytes.last(), Some(&b'\n'));
        // Eingebettete Zeilenumbrueche werden von JSON maskiert
        assert_eq!(bytes.iter().filter(|b| **b == b'\n').count(), 1);
    }

    #[test]
    fn decode_client_chat_ohne_sender() {
        let env = Envelope::decode(br#"{"type":"chat","message":"hi"}"#).unwrap();
        assert_eq!(env.kind(), EnvelopeKind::Chat);
        assert_eq!(env.payload(), "hi");
        assert_eq!(env.sender(), None);
    }

    #[test]
    fn decode_lehnt_unbekannten_typ_ab() {
        assert!(Envelope::decode(br#"{"type":"shout","message":"hi"}"#).is_err());
    }

    #[test]
    fn decode_lehnt_klartext_ab() {
        assert!(Envelope::decode(b"einfach nur text").is_err());
    }

    #[test]
    fn with_payload_behaelt_metadaten() {
        let env = Envelope::chat_von("Alice", "hello").with_payload("geheim");
        assert_eq!(env.payload(), "geheim");
        assert_eq!(env.sender(), Some("Alice"));
        assert_eq!(env.kind(), EnvelopeKind::Chat);
    }
}
