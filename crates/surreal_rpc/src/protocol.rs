//! Frame layout of the CBOR websocket RPC.
//!
//! Every request is a map `{id, method, params}` sent as one binary message.
//! Responses echo the `id` and carry either `result` or `error`.

use chrono::{DateTime, TimeZone, Utc};
use ciborium::{tag::Required, Value};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize, Serializer};

use crate::RpcError;

/// CBOR tag SurrealDB uses for `[seconds, nanoseconds]` datetimes.
pub const TAG_DATETIME: u64 = 12;

#[derive(Debug, Serialize)]
pub struct Request<'a, P> {
    pub id: u64,
    pub method: &'a str,
    pub params: P,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: i64,
    pub message: String,
}

/// One statement's outcome in a `query` result array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub status: String,
    pub result: Value,
}

impl QueryResult {
    pub fn is_ok(&self) -> bool {
        self.status == "OK"
    }
}

/// A UTC timestamp encoded as tag 12 over `[seconds, nanoseconds]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Datetime(pub DateTime<Utc>);

impl From<DateTime<Utc>> for Datetime {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value)
    }
}

impl Serialize for Datetime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let parts = (self.0.timestamp(), self.0.timestamp_subsec_nanos());
        Required::<_, TAG_DATETIME>(parts).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Datetime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let Required((secs, nanos)) =
            Required::<(i64, u32), TAG_DATETIME>::deserialize(deserializer)?;
        Utc.timestamp_opt(secs, nanos)
            .single()
            .map(Datetime)
            .ok_or_else(|| serde::de::Error::custom("datetime out of range"))
    }
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, RpcError> {
    let mut out = Vec::new();
    ciborium::into_writer(value, &mut out).map_err(|err| RpcError::Encode(err.to_string()))?;
    Ok(out)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, RpcError> {
    ciborium::from_reader(bytes).map_err(|err| RpcError::Decode(err.to_string()))
}

/// Converts an opaque result into a concrete type.
pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T, RpcError> {
    value
        .deserialized()
        .map_err(|err| RpcError::Decode(err.to_string()))
}
