//! Connection session state for realmwire.
//!
//! This crate holds the minimal authority state the dispatcher needs:
//!
//! 1. **Session** — one connection's lifecycle
//!    (`Unauthenticated → Authenticated → Closed`) and its actor identity
//!    ([`Session`], [`SessionState`], [`CloseReason`])
//! 2. **Authentication** — the hook that turns an auth request into an
//!    actor ([`Authenticator`] trait, [`AuthDecision`])
//! 3. **Registry** — one live connection per actor ([`SessionRegistry`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Dispatch Layer (above)  ← checks session state before every handler call
//!     ↕
//! Session Layer (this crate)  ← authority state per connection
//!     ↕
//! Protocol Layer (below)  ← provides ActorId, PacketReader, Message
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod registry;
mod session;

pub use auth::{AuthDecision, Authenticator};
pub use error::SessionError;
pub use registry::SessionRegistry;
pub use session::{CloseReason, Session, SessionState};
