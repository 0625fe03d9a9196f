//! Client-Registry – Wer ist verbunden
//!
//! Die Registry haelt alle registrierten Clients, garantiert eindeutige
//! Anzeigenamen und stellt die Send-Queue jedes Clients bereit.
//!
//! Register, Unregister und Snapshot laufen unter genau einem Mutex. Die
//! Pruefung auf einen freien Namen und das Eintragen sind dadurch eine
//! einzige atomare Operation. Unter dem Lock wird nie ge-await-et.

use chrono::{DateTime, Utc};
use confluxus_core::{ConnectionId, DisplayName};
use confluxus_protocol::Envelope;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::error::{RelayError, RelayResult};

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Handle auf einen registrierten Client
///
/// Andere Tasks erreichen den Client nur ueber seine Send-Queue, der Socket
/// gehoert exklusiv dem Verbindungs-Task.
#[derive(Clone, Debug)]
pub struct Client {
    id: ConnectionId,
    name: DisplayName,
    joined_at: DateTime<Utc>,
    peer_addr: SocketAddr,
    tx: mpsc::Sender<Envelope>,
    schliessen: Arc<watch::Sender<bool>>,
}

impl Client {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn name(&self) -> &DisplayName {
        &self.name
    }

    pub fn joined_at(&self) -> DateTime<Utc> {
        self.joined_at
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Reiht ein Envelope nicht-blockierend in die Send-Queue ein
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist.
    pub fn zustellen(&self, envelope: Envelope) -> bool {
        match self.tx.try_send(envelope) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(client = %self.id, name = %self.name, "Send-Queue voll");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(client = %self.id, name = %self.name, "Send-Queue geschlossen");
                false
            }
        }
    }

    /// Signalisiert dem Verbindungs-Task, dass er sich beenden soll
    pub fn schliessen(&self) {
        self.schliessen.send_replace(true);
    }

    pub fn ist_geschlossen(&self) -> bool {
        *self.schliessen.borrow()
    }

    /// Signal, das beim Schliessen auf `true` wechselt
    pub fn schliess_signal(&self) -> watch::Receiver<bool> {
        self.schliessen.subscribe()
    }
}

// ---------------------------------------------------------------------------
// ClientRegistry
// ---------------------------------------------------------------------------

/// Registry aller verbundenen Clients
///
/// Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct ClientRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    zustand: Mutex<Zustand>,
    anzahl_tx: watch::Sender<usize>,
    queue_groesse: usize,
    max_clients: usize,
}

#[derive(Default)]
struct Zustand {
    clients: BTreeMap<ConnectionId, Client>,
    namen: HashSet<String>,
    naechste_id: u64,
}

impl ClientRegistry {
    /// Erstellt eine leere Registry mit der gegebenen Queue-Groesse pro Client
    pub fn neu(queue_groesse: usize) -> Self {
        Self::mit_limit(queue_groesse, usize::MAX)
    }

    /// Wie [`ClientRegistry::neu`], nimmt aber hoechstens `max_clients` Clients auf
    pub fn mit_limit(queue_groesse: usize, max_clients: usize) -> Self {
        let (anzahl_tx, _) = watch::channel(0);
        Self {
            inner: Arc::new(RegistryInner {
                zustand: Mutex::new(Zustand::default()),
                anzahl_tx,
                queue_groesse: queue_groesse.max(1),
                max_clients,
            }),
        }
    }

    /// Registriert einen Client unter `name`
    ///
    /// Gibt den Client-Handle und die Empfangsseite seiner Send-Queue zurueck.
    /// Die `ClientConnection` liest aus dieser Queue und schreibt auf den Socket.
    pub fn register(
        &self,
        name: DisplayName,
        peer_addr: SocketAddr,
    ) -> RelayResult<(Client, mpsc::Receiver<Envelope>)> {
        let (tx, rx) = mpsc::channel(self.inner.queue_groesse);

        let mut zustand = self.inner.zustand.lock();
        if zustand.clients.len() >= self.inner.max_clients {
            return Err(RelayError::ServerVoll {
                max: self.inner.max_clients,
            });
        }
        if zustand.namen.contains(name.as_str()) {
            return Err(RelayError::NameTaken(name.as_str().to_string()));
        }

        zustand.naechste_id += 1;
        let client = Client {
            id: ConnectionId(zustand.naechste_id),
            name,
            joined_at: Utc::now(),
            peer_addr,
            tx,
            schliessen: Arc::new(watch::channel(false).0),
        };

        zustand.namen.insert(client.name.as_str().to_string());
        zustand.clients.insert(client.id, client.clone());
        self.inner.anzahl_tx.send_replace(zustand.clients.len());
        drop(zustand);

        tracing::debug!(client = %client.id, name = %client.name, "Client registriert");
        Ok((client, rx))
    }

    /// Entfernt einen Client
    ///
    /// Idempotent: gibt den entfernten Client nur beim ersten Aufruf zurueck.
    pub fn unregister(&self, id: ConnectionId) -> Option<Client> {
        let mut zustand = self.inner.zustand.lock();
        let client = zustand.clients.remove(&id)?;
        zustand.namen.remove(client.name.as_str());
        self.inner.anzahl_tx.send_replace(zustand.clients.len());
        drop(zustand);

        tracing::debug!(client = %id, name = %client.name, "Client entfernt");
        Some(client)
    }

    /// Momentaufnahme aller Clients in Beitrittsreihenfolge
    pub fn snapshot(&self) -> Vec<Client> {
        self.inner.zustand.lock().clients.values().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.inner.zustand.lock().clients.len()
    }

    /// Prueft ob ein Name aktuell vergeben ist (exakter Vergleich)
    pub fn contains_name(&self, name: &str) -> bool {
        self.inner.zustand.lock().namen.contains(name)
    }

    /// Beobachtet die Anzahl registrierter Clients
    ///
    /// Der Wert wird im selben kritischen Abschnitt wie die Aenderung
    /// aktualisiert. Ein Wechsel auf `0` bedeutet: der Raum ist leer.
    pub fn subscribe_count(&self) -> watch::Receiver<usize> {
        self.inner.anzahl_tx.subscribe()
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::neu(64)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
