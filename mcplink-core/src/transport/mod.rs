//! Remote side of the bridge: the Streamable HTTP client and SSE decoding.

pub mod sse;
pub mod upstream;

pub use sse::{SseDecoder, is_event_stream};
pub use upstream::{
    BodyStream, McpTransport, RemoteResponse, SESSION_HEADER, UpstreamClient, UpstreamConfig,
};
