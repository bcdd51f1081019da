//! ComfyUI REST client library.
//!
//! HTTP API wrapper, fail-open schema discovery, a bounded retry helper
//! and the output-locating strategies used to fetch finished images.

pub mod api;
pub mod discovery;
pub mod output;
pub mod retry;
