#![forbid(unsafe_code)]
//! Client for SurrealDB's websocket RPC endpoint using the CBOR subprotocol.
//!
//! A [`SurrealClient`] owns one connection at a time and multiplexes any
//! number of concurrent [`SurrealClient::call`]s over it, correlating
//! responses by request id. A background task reads responses; callers wait
//! on a per-request slot with a timeout.

mod client;
mod error;
mod pending;
pub mod protocol;
mod quote;
mod results;
mod sequence;

pub use ciborium::Value;
pub use client::{ConnectionState, SurrealClient, DEFAULT_CALL_TIMEOUT, SUBPROTOCOL};
pub use error::RpcError;
pub use protocol::{Datetime, QueryResult};
pub use quote::{quote_ident, quote_record_id};
pub use results::QueryResults;

#[cfg(test)]
mod test_support;
#[cfg(test)]
mod tests_client;
