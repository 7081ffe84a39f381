//! The stdio ↔ Streamable HTTP proxy loop.
//!
//! One stdin line is processed completely (validated, admitted by the
//! handshake, posted, its reply decoded and written) before the next line is
//! read. At most one request is ever in flight, and the session state is only
//! touched from this loop.
//!
//! # Shutdown Triggers
//!
//! | Trigger                         | Result                     |
//! |---------------------------------|----------------------------|
//! | stdin EOF                       | `Ok(())`                   |
//! | Non-`initialize` first message  | `ProxyError::Handshake`    |
//! | stdin read / stdout write fails | `ProxyError::Io`           |

mod helpers;

use futures_util::StreamExt;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tracing::{debug, error, info, warn};

use mcplink_core::error::UpstreamError;
use mcplink_core::protocol::{
    Admission, Exchange, HandshakeState, Session, Settlement, is_handshake_method,
};
use mcplink_core::transport::{
    McpTransport, RemoteResponse, SseDecoder, UpstreamClient, UpstreamConfig, is_event_stream,
};

use crate::error::{FramingError, ProxyError};
use crate::shim::ndjson::{MAX_MESSAGE_BYTES, parse_stdio_message};

use helpers::{bounded_read_line, write_line};

/// Result of one remote round trip, as seen by the loop.
#[derive(Debug)]
enum Dispatch {
    /// Reply delivered (or the body was unreadable); nothing else to do.
    Delivered,
    /// No reply; the message was dropped.
    Dropped,
    /// The handshake just completed; these queued messages must go next.
    Ready(Vec<String>),
    /// The remote no longer knows the session.
    SessionLost,
}

/// Bridges one local stdio peer to one remote MCP endpoint.
pub struct StdioProxy<T> {
    transport: T,
    session: Session,
    max_response_bytes: usize,
}

impl<T: McpTransport> StdioProxy<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            session: Session::new(),
            max_response_bytes: UpstreamConfig::default().max_response_size,
        }
    }

    /// Cap on buffered (non-SSE) reply bodies.
    pub fn with_max_response_bytes(mut self, max_response_bytes: usize) -> Self {
        self.max_response_bytes = max_response_bytes;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run until `reader` reaches EOF.
    ///
    /// # Errors
    ///
    /// See the module-level shutdown table. Malformed lines, remote failures,
    /// and session loss are logged and never end the run.
    pub async fn run<R, W>(&mut self, mut reader: R, writer: &mut W) -> Result<(), ProxyError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut raw_buf = Vec::new();

        loop {
            raw_buf.clear();

            let bytes_read =
                match bounded_read_line(&mut reader, &mut raw_buf, MAX_MESSAGE_BYTES).await {
                    Ok(n) => n,
                    Err(FramingError::Io(e)) => return Err(ProxyError::Io(e)),
                    Err(e) => {
                        warn!(error = %e, error_type = e.error_type(), "dropping stdin line");
                        continue;
                    }
                };

            if bytes_read == 0 {
                debug!(state = %self.session.state(), "stdin EOF");
                return Ok(());
            }

            let line = match std::str::from_utf8(&raw_buf) {
                Ok(s) => s,
                Err(_) => {
                    let e = FramingError::InvalidUtf8;
                    warn!(len = raw_buf.len(), error_type = e.error_type(), "{e}, skipping");
                    continue;
                }
            };

            self.handle_line(line, writer).await?;
        }
    }

    /// Process one stdin line to completion.
    ///
    /// # Errors
    ///
    /// `ProxyError::Handshake` when the line is a valid message that cannot
    /// open a session; `ProxyError::Io` if stdout fails.
    pub async fn handle_line<W>(&mut self, line: &str, writer: &mut W) -> Result<(), ProxyError>
    where
        W: AsyncWrite + Unpin,
    {
        if line.trim().is_empty() {
            return Ok(());
        }

        let msg = match parse_stdio_message(line) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, error_type = e.error_type(), "dropping invalid message");
                return Ok(());
            }
        };

        let admission = match self.session.admit(msg.method(), &msg.raw) {
            Ok(admission) => admission,
            Err(e) => {
                error!(error = %e, message = %msg.envelope.label(), "handshake violation");
                return Err(e.into());
            }
        };

        match admission {
            Admission::Queued => {
                debug!(
                    message = %msg.envelope.label(),
                    queued = self.session.pending_len(),
                    state = %self.session.state(),
                    "queued until handshake completes"
                );
                Ok(())
            }
            Admission::Send(exchange) => {
                if msg.method().is_some_and(is_handshake_method) {
                    debug!(
                        method = ?msg.method(),
                        state = %self.session.state(),
                        "handshake message"
                    );
                }
                self.send(exchange, &msg.raw, writer).await
            }
        }
    }

    /// Send one message, then drain the queue if that completed the handshake.
    async fn send<W>(
        &mut self,
        exchange: Exchange,
        raw: &str,
        writer: &mut W,
    ) -> Result<(), ProxyError>
    where
        W: AsyncWrite + Unpin,
    {
        let Dispatch::Ready(backlog) = self.dispatch(exchange, raw, writer).await? else {
            return Ok(());
        };

        info!(session_id = ?self.session.session_id(), queued = backlog.len(), "session ready");

        let mut backlog = backlog.into_iter();
        while let Some(queued) = backlog.next() {
            let outcome = self.dispatch(Exchange::Forward, &queued, writer).await?;
            if matches!(outcome, Dispatch::SessionLost) {
                let remaining = backlog.len();
                if remaining > 0 {
                    warn!(discarded = remaining, "session lost while draining queue");
                }
                break;
            }
        }
        Ok(())
    }

    async fn dispatch<W>(
        &mut self,
        exchange: Exchange,
        raw: &str,
        writer: &mut W,
    ) -> Result<Dispatch, ProxyError>
    where
        W: AsyncWrite + Unpin,
    {
        let response = match self.transport.post(raw, self.session.session_id()).await {
            Ok(response) => response,
            Err(e) => {
                self.session.abandon(exchange);
                log_upstream_error(&e, exchange, self.session.state());
                return Ok(Dispatch::Dropped);
            }
        };

        let status = response.status;
        debug!(?exchange, status, "remote replied");

        match self
            .session
            .settle(exchange, status, response.session_id.as_deref())
        {
            Settlement::SessionLost { discarded } => {
                warn!(
                    status,
                    ?exchange,
                    discarded,
                    "remote session not found, waiting for a new initialize"
                );
                Ok(Dispatch::SessionLost)
            }
            Settlement::Deliver => {
                self.deliver(response, writer).await?;
                Ok(Dispatch::Delivered)
            }
            Settlement::Ready { drained } => {
                self.deliver(response, writer).await?;
                Ok(Dispatch::Ready(drained))
            }
        }
    }

    /// Write a reply body to stdout: one line per SSE event, or the whole
    /// body as one line.
    async fn deliver<W>(&self, response: RemoteResponse, writer: &mut W) -> Result<(), ProxyError>
    where
        W: AsyncWrite + Unpin,
    {
        if !is_event_stream(&response.content_type) {
            match response.text(self.max_response_bytes).await {
                Ok(text) => {
                    write_line(writer, &text).await?;
                }
                Err(e) => warn!(error = %e, error_type = e.error_type(), "dropping reply body"),
            }
            return Ok(());
        }

        let mut decoder = SseDecoder::new();
        let mut body = response.body;
        let mut events = 0usize;
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(
                        error = %e,
                        error_type = e.error_type(),
                        events,
                        "event stream ended early"
                    );
                    break;
                }
            };
            for payload in decoder.push(&chunk) {
                if write_line(writer, &payload).await? {
                    events += 1;
                }
            }
        }

        if decoder.buffered_len() > 0 {
            debug!(
                bytes = decoder.buffered_len(),
                "discarding unterminated event at end of stream"
            );
        }
        Ok(())
    }
}

fn log_upstream_error(e: &UpstreamError, exchange: Exchange, state: HandshakeState) {
    if e.is_timeout() {
        warn!(error = %e, ?exchange, %state, "remote timed out, message dropped");
    } else {
        error!(
            error = %e,
            error_type = e.error_type(),
            ?exchange,
            %state,
            "remote request failed, message dropped"
        );
    }
}

/// Bridge this process's stdin/stdout to the configured endpoint.
///
/// # Errors
///
/// `ProxyError::Config` if the client cannot be built; otherwise as
/// [`StdioProxy::run`].
pub async fn run_stdio(config: UpstreamConfig) -> Result<(), ProxyError> {
    let max_response_bytes = config.max_response_size;
    info!(url = %config.url, "starting MCP bridge");

    let client = UpstreamClient::new(config)?;
    let mut proxy = StdioProxy::new(client).with_max_response_bytes(max_response_bytes);

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    proxy.run(stdin, &mut stdout).await
}
