use serde::{Deserialize, Serialize};
use std::fmt;

pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// An opaque pagination token returned by the server in
/// `pageInfo.endCursor`
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Cursor {
    fn from(value: String) -> Cursor {
        Cursor(value)
    }
}

impl From<&str> for Cursor {
    fn from(value: &str) -> Cursor {
        Cursor(value.to_owned())
    }
}

impl From<Cursor> for serde_json::Value {
    fn from(value: Cursor) -> serde_json::Value {
        value.0.into()
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to a query stored on the server, sent in place of the query text
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PersistedQuery {
    pub version: u32,
    #[serde(rename = "sha256Hash")]
    pub sha256_hash: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Extensions {
    pub persisted_query: PersistedQuery,
}
