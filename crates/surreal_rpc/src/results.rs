use ciborium::Value;
use serde::de::DeserializeOwned;

use crate::{
    protocol::{self, QueryResult},
    RpcError,
};

/// Per-statement outcomes of one `query` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResults(Vec<QueryResult>);

impl QueryResults {
    pub fn from_value(value: Value) -> Result<Self, RpcError> {
        protocol::from_value(value).map(Self)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn statements(&self) -> &[QueryResult] {
        &self.0
    }

    /// Decodes the result of statement `index`, failing if that statement
    /// reported an error.
    pub fn at<T: DeserializeOwned>(&self, index: usize) -> Result<T, RpcError> {
        let statement = self.0.get(index).ok_or(RpcError::OutOfRange {
            index,
            len: self.0.len(),
        })?;
        check(statement)?;
        protocol::from_value(statement.result.clone())
    }

    /// Fails with the first statement error, if any.
    pub fn ensure_ok(&self) -> Result<(), RpcError> {
        self.0.iter().try_for_each(check)
    }
}

fn check(statement: &QueryResult) -> Result<(), RpcError> {
    if statement.is_ok() {
        return Ok(());
    }
    let message = match &statement.result {
        Value::Text(text) => text.clone(),
        other => format!("{} ({other:?})", statement.status),
    };
    Err(RpcError::Query(message))
}
