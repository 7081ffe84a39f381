//! Handshake state machine and per-process session state.

use std::collections::VecDeque;
use std::fmt;

use tracing::debug;

use crate::error::HandshakeError;

use super::methods::{INITIALIZE, INITIALIZED};

/// HTTP status the remote uses to report an unknown or expired session.
pub const SESSION_NOT_FOUND: u16 = 404;

// ─────────────────────────────────────────────────────────────────────────────
// States and Transitions
// ─────────────────────────────────────────────────────────────────────────────

/// Connection state of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakeState {
    /// No session. Only `initialize` is legal.
    #[default]
    AwaitingInitialize,
    /// `initialize` has been sent and its reply is outstanding.
    AwaitingInitializeResponse,
    /// `initialize` succeeded; waiting for `notifications/initialized`.
    AwaitingInitialized,
    /// Handshake complete; everything is forwarded immediately.
    Ready,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingInitialize => write!(f, "awaiting_initialize"),
            Self::AwaitingInitializeResponse => write!(f, "awaiting_initialize_response"),
            Self::AwaitingInitialized => write!(f, "awaiting_initialized"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

/// The kind of remote round trip a message was sent as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exchange {
    /// The `initialize` request.
    Initialize,
    /// The `notifications/initialized` notification.
    Initialized,
    /// Any message sent once the session is ready.
    Forward,
}

/// What to do with an inbound message, decided by [`route`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// POST the message to the remote as the given exchange.
    Send(Exchange),
    /// Append the raw message to the pending queue.
    Enqueue,
}

/// What to do with a remote reply, decided by [`on_reply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyEffect {
    /// Emit the reply body. When `capture_session` is set, adopt the reply's
    /// session header if no session identifier is held yet.
    Deliver {
        /// Whether the reply may assign the session identifier.
        capture_session: bool,
    },
    /// Emit the reply body, then forward every queued message in order.
    DeliverAndDrain,
    /// Session lost: clear the identifier, discard the queue and the body.
    ResetSession,
}

/// Route an inbound message. `method` is `None` for responses and batches.
///
/// # Errors
///
/// Returns [`HandshakeError::ExpectedInitialize`] when anything other than
/// `initialize` arrives in [`HandshakeState::AwaitingInitialize`]. The state
/// is unchanged in that case.
pub fn route(
    state: HandshakeState,
    method: Option<&str>,
) -> Result<(HandshakeState, Routing), HandshakeError> {
    use HandshakeState::*;

    let next = match (state, method) {
        (AwaitingInitialize, Some(INITIALIZE)) => {
            (AwaitingInitializeResponse, Routing::Send(Exchange::Initialize))
        }
        (AwaitingInitialize, other) => {
            return Err(HandshakeError::ExpectedInitialize {
                found: other.unwrap_or("a message without a method").to_string(),
            });
        }
        (AwaitingInitializeResponse, _) => (state, Routing::Enqueue),
        (AwaitingInitialized, Some(INITIALIZED)) => (state, Routing::Send(Exchange::Initialized)),
        (AwaitingInitialized, _) => (state, Routing::Enqueue),
        (Ready, _) => (Ready, Routing::Send(Exchange::Forward)),
    };

    Ok(next)
}

/// The remote replied to `exchange` with `status`.
pub fn on_reply(
    state: HandshakeState,
    exchange: Exchange,
    status: u16,
) -> (HandshakeState, ReplyEffect) {
    if status == SESSION_NOT_FOUND {
        return (HandshakeState::AwaitingInitialize, ReplyEffect::ResetSession);
    }
    match exchange {
        Exchange::Initialize => (
            HandshakeState::AwaitingInitialized,
            ReplyEffect::Deliver {
                capture_session: true,
            },
        ),
        Exchange::Initialized => (HandshakeState::Ready, ReplyEffect::DeliverAndDrain),
        Exchange::Forward => (
            state,
            ReplyEffect::Deliver {
                capture_session: false,
            },
        ),
    }
}

/// `exchange` got no reply (timeout or transport failure). The message is
/// dropped and the state reverts to what it was before it was sent.
pub fn on_failure(state: HandshakeState, exchange: Exchange) -> HandshakeState {
    match exchange {
        Exchange::Initialize => HandshakeState::AwaitingInitialize,
        Exchange::Initialized => HandshakeState::AwaitingInitialized,
        Exchange::Forward => state,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// What to do with an admitted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Send it now as the given exchange.
    Send(Exchange),
    /// It was queued until the handshake completes.
    Queued,
}

/// What to do with a remote reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// Emit the reply body.
    Deliver,
    /// Emit the reply body, then forward `drained` in order as ready messages.
    Ready {
        /// The pending queue, taken in arrival order.
        drained: Vec<String>,
    },
    /// Session lost. The reply body must not be emitted.
    SessionLost {
        /// Number of queued messages thrown away.
        discarded: usize,
    },
}

/// Connection state, session identifier, and pending queue for one bridge.
///
/// Created once per proxy. State changes come only from [`route`],
/// [`on_reply`] and [`on_failure`]; the session applies their effects.
#[derive(Debug, Default)]
pub struct Session {
    state: HandshakeState,
    session_id: Option<String>,
    pending: VecDeque<String>,
}

impl Session {
    /// A fresh session in [`HandshakeState::AwaitingInitialize`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Current handshake state.
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Server-assigned session identifier, once the remote has issued one.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Number of messages waiting for the handshake to complete.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Route an inbound message.
    ///
    /// # Errors
    ///
    /// Propagates [`HandshakeError`] from [`route`]; the session is left
    /// untouched.
    pub fn admit(&mut self, method: Option<&str>, raw: &str) -> Result<Admission, HandshakeError> {
        let (next, routing) = route(self.state, method)?;
        self.move_to(next);

        match routing {
            Routing::Send(exchange) => Ok(Admission::Send(exchange)),
            Routing::Enqueue => {
                self.pending.push_back(raw.to_string());
                debug!(queued = self.pending.len(), "message queued until handshake completes");
                Ok(Admission::Queued)
            }
        }
    }

    /// Apply the remote's reply to an exchange.
    ///
    /// `session_header` is the value of the reply's session header, if any.
    pub fn settle(
        &mut self,
        exchange: Exchange,
        status: u16,
        session_header: Option<&str>,
    ) -> Settlement {
        let (next, effect) = on_reply(self.state, exchange, status);
        self.move_to(next);

        match effect {
            ReplyEffect::Deliver { capture_session } => {
                if capture_session && self.session_id.is_none() {
                    if let Some(id) = session_header {
                        debug!(session_id = id, "session established");
                        self.session_id = Some(id.to_string());
                    }
                }
                Settlement::Deliver
            }
            ReplyEffect::DeliverAndDrain => Settlement::Ready {
                drained: self.pending.drain(..).collect(),
            },
            ReplyEffect::ResetSession => {
                let discarded = self.pending.len();
                self.pending.clear();
                self.session_id = None;
                Settlement::SessionLost { discarded }
            }
        }
    }

    /// Record that an exchange got no reply. State reverts to what it was
    /// before the message was sent.
    pub fn abandon(&mut self, exchange: Exchange) {
        let next = on_failure(self.state, exchange);
        self.move_to(next);
    }

    fn move_to(&mut self, next: HandshakeState) {
        if next != self.state {
            debug!(from = %self.state, to = %next, "handshake state changed");
            self.state = next;
        }
    }
}
