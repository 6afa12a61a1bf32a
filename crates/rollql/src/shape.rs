use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// The location of a value within a response document, rendered as
/// `$.data.trades.edges[0]`
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct JsonPath(Vec<Segment>);

#[derive(Clone, Debug, Eq, PartialEq)]
enum Segment {
    Key(String),
    Index(usize),
}

impl JsonPath {
    fn with(&self, seg: Segment) -> JsonPath {
        let mut segments = self.0.clone();
        segments.push(seg);
        JsonPath(segments)
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$")?;
        for seg in &self.0 {
            match seg {
                Segment::Key(key) => write!(f, ".{key}")?,
                Segment::Index(i) => write!(f, "[{i}]")?,
            }
        }
        Ok(())
    }
}

/// A borrowed value inside a response document together with the path used
/// to reach it, so that traversal failures can say where they happened.
///
/// Keys whose value is `null` are treated the same as absent keys.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Node<'a> {
    value: &'a Value,
    path: JsonPath,
}

impl<'a> Node<'a> {
    pub fn root(value: &'a Value) -> Node<'a> {
        Node {
            value,
            path: JsonPath::default(),
        }
    }

    pub fn value(&self) -> &'a Value {
        self.value
    }

    pub fn path(&self) -> &JsonPath {
        &self.path
    }

    /// Descend into the field `key` of this object, failing if the field is
    /// absent or `null`
    pub fn get(&self, key: &str) -> Result<Node<'a>, ShapeError> {
        self.get_opt(key)?.ok_or_else(|| ShapeError::MissingKey {
            key: key.to_owned(),
            path: self.path.clone(),
        })
    }

    /// Descend into the field `key` of this object if it is present and not
    /// `null`
    pub fn get_opt(&self, key: &str) -> Result<Option<Node<'a>>, ShapeError> {
        let Some(map) = self.value.as_object() else {
            return Err(self.wrong_type("an object"));
        };
        Ok(map.get(key).filter(|v| !v.is_null()).map(|value| Node {
            value,
            path: self.path.with(Segment::Key(key.to_owned())),
        }))
    }

    /// Iterate over the elements of this array.  The iterator borrows only
    /// the document, not this node.
    pub fn elements(&self) -> Result<impl Iterator<Item = Node<'a>> + use<'a>, ShapeError> {
        let Some(array) = self.value.as_array() else {
            return Err(self.wrong_type("an array"));
        };
        let path = self.path.clone();
        Ok(array.iter().enumerate().map(move |(i, value)| Node {
            value,
            path: path.with(Segment::Index(i)),
        }))
    }

    pub fn as_str(&self) -> Result<&'a str, ShapeError> {
        self.value
            .as_str()
            .ok_or_else(|| self.wrong_type("a string"))
    }

    fn wrong_type(&self, expected: &'static str) -> ShapeError {
        ShapeError::WrongType {
            expected,
            path: self.path.clone(),
        }
    }
}

/// Error returned when a decoded response does not have the structure the
/// caller walks through
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ShapeError {
    #[error("missing key {key:?} in {path}")]
    MissingKey { key: String, path: JsonPath },
    #[error("expected {expected} at {path}")]
    WrongType {
        expected: &'static str,
        path: JsonPath,
    },
}

impl ShapeError {
    /// Returns the name of the missing key, if this is a missing-key error
    pub fn missing_key(&self) -> Option<&str> {
        match self {
            ShapeError::MissingKey { key, .. } => Some(key),
            ShapeError::WrongType { .. } => None,
        }
    }
}
