//! The stdio side of the bridge.
//!
//! `ndjson` validates individual lines; `proxy` owns the read loop, the
//! handshake session, and the output sink.

pub mod ndjson;
pub mod proxy;
