//! confluxus-relay – TCP Relay-Service
//!
//! Dieser Crate implementiert den zentralen Relay-Server fuer Confluxus.
//! Er nimmt TCP-Verbindungen an, registriert eindeutige Anzeigenamen und
//! verteilt jede Nachricht an alle anderen verbundenen Clients.
//!
//! ## Architektur
//!
//! ```text
//! TCP Listener (RelayServer)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task)
//!     |  Connecting -> AwaitingName -> KeyExchange -> Active -> Closing -> Closed
//!     |
//!     v
//! BroadcastRouter  – Fan-out an alle ausser dem Absender, Eviction
//!     |
//!     v
//! ClientRegistry   – Wer ist verbunden, Name eindeutig, Send-Queues
//! ```

pub mod broadcast;
pub mod connection;
pub mod error;
pub mod registry;
pub mod server_state;
pub mod tcp;

// Bequeme Re-Exporte
pub use broadcast::{BroadcastRouter, DeliveryReport};
pub use connection::{ClientConnection, ConnectionState};
pub use error::{RelayError, RelayResult};
pub use registry::{Client, ClientRegistry};
pub use server_state::{EntschluesselungsModus, RelayConfig, RelayState};
pub use tcp::RelayServer;
