//! Broadcast-Router – Verteilt Envelopes an alle registrierten Clients
//!
//! Zustellung ist best effort und pro Empfaenger unabhaengig: ein Client
//! mit voller oder geschlossener Send-Queue haelt die anderen nicht auf,
//! sondern wird nach dem Durchlauf entfernt (Eviction).
//!
//! ## Reihenfolge
//! Jeder Client hat genau eine Queue, die genau ein Task leert. Nachrichten
//! an denselben Empfaenger kommen daher in Einreihungsreihenfolge an.

use confluxus_core::ConnectionId;
use confluxus_protocol::Envelope;

use crate::registry::{Client, ClientRegistry};

// ---------------------------------------------------------------------------
// DeliveryReport
// ---------------------------------------------------------------------------

/// Ergebnis eines `distribute`-Aufrufs
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Anzahl erfolgreich eingereihter Zustellungen der Original-Nachricht
    pub delivered: usize,
    /// Alle in diesem Aufruf entfernten Clients
    pub evicted: Vec<ConnectionId>,
}

// ---------------------------------------------------------------------------
// BroadcastRouter
// ---------------------------------------------------------------------------

/// Fan-out ueber eine Registry
///
/// Clone teilt die Registry.
#[derive(Clone)]
pub struct BroadcastRouter {
    registry: ClientRegistry,
}

impl BroadcastRouter {
    pub fn neu(registry: ClientRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Reiht `envelope` bei allen Clients ausser `exclude` ein
    ///
    /// Gibt die Clients zurueck, deren Zustellung fehlgeschlagen ist. Der
    /// Aufruf selbst schlaegt nie fehl.
    pub fn broadcast(&self, envelope: &Envelope, exclude: Option<ConnectionId>) -> Vec<Client> {
        self.an_alle_senden(envelope, exclude).1
    }

    fn an_alle_senden(
        &self,
        envelope: &Envelope,
        exclude: Option<ConnectionId>,
    ) -> (usize, Vec<Client>) {
        let mut gesendet = 0;
        let mut fehlgeschlagen = Vec::new();

        for client in self.registry.snapshot() {
            if Some(client.id()) == exclude {
                continue;
            }
            if client.zustellen(envelope.clone()) {
                gesendet += 1;
            } else {
                fehlgeschlagen.push(client);
            }
        }

        tracing::trace!(
            gesendet,
            fehlgeschlagen = fehlgeschlagen.len(),
            "Broadcast verteilt"
        );
        (gesendet, fehlgeschlagen)
    }

    /// Broadcast mit anschliessender Eviction
    ///
    /// Jeder fehlgeschlagene Empfaenger wird entfernt, geschlossen und den
    /// uebrigen als "left" gemeldet. Scheitert die Zustellung dieser
    /// Austrittsmeldung, wird der Empfaenger ebenfalls entfernt, aber ohne
    /// weitere Meldung.
    pub fn distribute(&self, envelope: &Envelope, exclude: Option<ConnectionId>) -> DeliveryReport {
        let (delivered, fehlgeschlagen) = self.an_alle_senden(envelope, exclude);
        let mut report = DeliveryReport {
            delivered,
            evicted: Vec::new(),
        };

        let mut nachzuegler = Vec::new();
        for client in fehlgeschlagen {
            let Some(entfernt) = self.entfernen(&client) else {
                continue;
            };
            report.evicted.push(entfernt.id());

            let meldung = Envelope::verlassen(entfernt.name().as_str());
            nachzuegler.extend(self.broadcast(&meldung, None));
        }

        for client in nachzuegler {
            if let Some(entfernt) = self.entfernen(&client) {
                report.evicted.push(entfernt.id());
            }
        }

        report
    }

    fn entfernen(&self, client: &Client) -> Option<Client> {
        let entfernt = self.registry.unregister(client.id())?;
        entfernt.schliessen();
        tracing::info!(
            client = %entfernt.id(),
            name = %entfernt.name(),
            "Client nach fehlgeschlagener Zustellung entfernt"
        );
        Some(entfernt)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
