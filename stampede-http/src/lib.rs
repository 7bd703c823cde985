//! Transport collaborator for stampede
//!
//! The engine only ever sees "sent a request, got status/latency/body back"
//! or "failed". This crate provides that contract ([`Transport`]), a pooled
//! reqwest implementation ([`HttpTransport`]) and an in-memory
//! [`ScriptedTransport`] used to drive the engine deterministically in tests.

pub mod client;
pub mod errors;
pub mod options;
pub mod scripted;
pub mod types;

// Re-export main types for convenience
pub use client::{HttpTransport, Transport};
pub use errors::TransportError;
pub use options::TransportOptions;
pub use scripted::{RecordedRequest, ScriptedReply, ScriptedTransport};
pub use types::{
    HttpMethod, HttpMethodError, ResponseBody, TransportRequest, TransportResponse,
};
