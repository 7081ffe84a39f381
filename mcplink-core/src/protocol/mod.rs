//! MCP protocol layer: method names and the connection handshake.
//!
//! ## Handshake States
//!
//! ```text
//! AwaitingInitialize → AwaitingInitializeResponse → AwaitingInitialized → Ready
//!         ↑                                                   │            │
//!         └──────────────────── 404 (session lost) ───────────┴────────────┘
//! ```
//!
//! The state machine itself is pure. [`route`], [`on_reply`] and
//! [`on_failure`] each map the current state and one event to the next state
//! and the effect the owner must apply. [`Session`] owns one state value
//! together with the session identifier and the pending queue, and is the
//! only thing that mutates them.

mod handshake;
mod methods;

pub use handshake::*;
pub use methods::*;
