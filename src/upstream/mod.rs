//! Access to the remote hypervisor control API.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::UpstreamError;

pub mod pve;
pub mod session;

pub use pve::PveGateway;
pub use session::SessionContext;

/// Request parameters. Ordered so the same inputs always encode to the
/// same payload.
pub type Params = BTreeMap<String, String>;

/// Builds a [`Params`] map from key/value pairs.
pub fn params<K, V, I>(pairs: I) -> Params
where
    K: Into<String>,
    V: ToString,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.to_string()))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    /// Read and delete calls carry their parameters in the query string,
    /// everything else in a form-encoded body.
    pub fn uses_query(self) -> bool {
        matches!(self, Method::Get | Method::Delete)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The JSON object every upstream endpoint answers with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Envelope(pub Map<String, Value>);

impl Envelope {
    pub fn data(&self) -> Option<&Value> {
        self.0.get("data").filter(|v| !v.is_null())
    }

    /// The `data` field when it is a non-empty string.
    pub fn data_str(&self) -> Option<&str> {
        self.data()
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn errors(&self) -> Option<&Value> {
        self.0.get("errors").filter(|v| !v.is_null())
    }

    /// Copies every top-level key of `other` into `self`, later keys win.
    pub fn merge(&mut self, other: Envelope) {
        self.0.extend(other.0);
    }
}

/// A client for the upstream control API.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Issues one authenticated call. `path` is relative to the API base
    /// URL, e.g. `/api2/json/cluster/nextid`.
    async fn call(
        &self,
        method: Method,
        path: &str,
        params: &Params,
    ) -> Result<Envelope, UpstreamError>;
}
