//! Popup login handshake with the identity provider.
//!
//! The main context opens the provider's login page in a secondary context
//! and waits for a result message on the `MessageChannel`. The
//! `HandshakeCoordinator` reconciles the racing signals (a result message,
//! the popup being closed) into one `LoginOutcome` per attempt.

pub mod callback;
pub mod channel;
pub mod context;
pub mod coordinator;
pub mod message;

pub use callback::{CallbackServer, CALLBACK_PATH, DEFAULT_CALLBACK_PORT};
pub use channel::{Listener, MessageChannel};
pub use context::{BrowserContext, CloseHandle, ContextOpener, SecondaryContext, WindowFeatures};
pub use coordinator::{HandshakeCoordinator, LoginError, LoginOutcome, DEFAULT_POLL_INTERVAL};
pub use message::{HandshakeMessage, InboundEnvelope, OriginPolicy};
