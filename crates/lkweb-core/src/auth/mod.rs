//! Authentication module for the token session and the logged-in user.
//!
//! This module provides:
//! - `SessionStore`: the persisted token slot (file, OS keychain or memory)
//! - `Auth`: the shared view of the current user, with refresh and logout
//! - `LoginControl`: the busy/idle state of the login button

pub mod control;
pub mod session;
pub mod state;

pub use control::{BusyGuard, LoginControl};
pub use session::{FileSlot, KeyringSlot, MemorySlot, SessionData, SessionStore, TokenSlot};
pub use state::{display_name, Auth, AuthSnapshot, DEFAULT_DISPLAY_NAME};
