//! Wire-Format fuer TCP-Verbindungen
//!
//! Zeilenbasiertes Protokoll: ein Datensatz pro Zeile, abgeschlossen mit `\n`.
//!
//! ## Frame-Format
//!
//! ```text
//! {"type":"chat","message":"..."}\n     -> Frame::Envelope
//! Alice\n                               -> Frame::Text
//! ```
//!
//! Der Decoder sammelt Teil-Lesevorgaenge, bis eine Zeile vollstaendig ist,
//! und liefert mehrere Zeilen aus einem Lesevorgang einzeln aus. Zeilen, die
//! kein gueltiges Envelope sind (Handshake-Name, Alt-Clients), kommen als
//! `Frame::Text` heraus statt die Verbindung abzubrechen.

use bytes::{BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use crate::envelope::Envelope;

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Zeilenlaenge (64 KiB, ohne Zeilenende)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// Ein dekodierter Datensatz
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Gueltiges Envelope
    Envelope(Envelope),
    /// Rohtext (Handshake-Name oder nicht parsebare Zeile)
    Text(String),
}

impl Frame {
    /// Gibt den Textinhalt zurueck: den Payload eines Envelopes oder den Rohtext
    pub fn into_text(self) -> String {
        match self {
            Frame::Envelope(envelope) => envelope.into_payload(),
            Frame::Text(text) => text,
        }
    }

    fn aus_zeile(zeile: &[u8]) -> Self {
        let zeile = zeile.strip_suffix(b"\r").unwrap_or(zeile);
        match Envelope::decode(zeile) {
            Ok(envelope) => Frame::Envelope(envelope),
            Err(_) => Frame::Text(String::from_utf8_lossy(zeile).into_owned()),
        }
    }
}

impl From<Envelope> for Frame {
    fn from(envelope: Envelope) -> Self {
        Frame::Envelope(envelope)
    }
}

// ---------------------------------------------------------------------------
// EnvelopeCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer zeilenbasierte TCP-Verbindungen
///
/// # Beispiel
///
/// ```rust,no_run
/// use tokio_util::codec::Framed;
/// use confluxus_protocol::wire::EnvelopeCodec;
///
/// // let stream = TcpStream::connect(...).await?;
/// // let framed = Framed::new(stream, EnvelopeCodec::new());
/// ```
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    /// Maximale erlaubte Zeilenlaenge in Bytes
    max_frame_size: usize,
    /// Bis hierhin wurde der Buffer bereits erfolglos nach `\n` durchsucht
    gesucht_bis: usize,
}

impl EnvelopeCodec {
    /// Erstellt einen neuen `EnvelopeCodec` mit Standard-Limits
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Erstellt einen `EnvelopeCodec` mit benutzerdefinierter maximaler Zeilenlaenge
    pub fn with_max_size(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            gesucht_bis: 0,
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    fn zu_gross(&self, laenge: usize) -> io::Error {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Frame zu gross: {} Bytes (Maximum: {} Bytes)",
                laenge, self.max_frame_size
            ),
        )
    }
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Decoder-Implementierung
// ---------------------------------------------------------------------------

impl Decoder for EnvelopeCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let start = self.gesucht_bis.min(src.len());

        match src[start..].iter().position(|b| *b == b'\n') {
            Some(offset) => {
                let ende = start + offset;
                self.gesucht_bis = 0;

                if ende > self.max_frame_size {
                    return Err(self.zu_gross(ende));
                }

                let zeile = src.split_to(ende + 1);
                Ok(Some(Frame::aus_zeile(&zeile[..ende])))
            }
            None => {
                if src.len() > self.max_frame_size {
                    return Err(self.zu_gross(src.len()));
                }
                // Beim naechsten Aufruf nur die neuen Bytes durchsuchen
                self.gesucht_bis = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }

        // Letzte Zeile ohne Zeilenende
        self.gesucht_bis = 0;
        let rest = src.split_to(src.len());
        Ok(Some(Frame::aus_zeile(&rest)))
    }
}

// ---------------------------------------------------------------------------
// Encoder-Implementierung
// ---------------------------------------------------------------------------

impl Encoder<Frame> for EnvelopeCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Frame::Envelope(envelope) => <Self as Encoder<Envelope>>::encode(self, envelope, dst),
            Frame::Text(text) => {
                if text.contains('\n') {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "Text-Frame darf keinen Zeilenumbruch enthalten",
                    ));
                }
                if text.len() > self.max_frame_size {
                    return Err(self.zu_gross(text.len()));
                }
                dst.reserve(text.len() + 1);
                dst.put_slice(text.as_bytes());
                dst.put_u8(b'\n');
                Ok(())
            }
        }
    }
}

impl Encoder<Envelope> for EnvelopeCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let zeile = item.encode().map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("JSON-Serialisierung fehlgeschlagen: {}", e),
            )
        })?;

        // Ohne abschliessendes `\n` gemessen
        if zeile.len() - 1 > self.max_frame_size {
            return Err(self.zu_gross(zeile.len() - 1));
        }

        dst.reserve(zeile.len());
        dst.put_slice(&zeile);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
