//! JSON Patch (RFC 6902) over `serde_json::Value`
//!
//! Only the standard operations are supported. Paths are RFC 6901 JSON
//! Pointers. `apply_patch` never touches its input: the batch is applied to
//! a copy, so a failing op leaves the caller's document as it was.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors from pointer parsing and patch application
#[derive(Debug, Error, PartialEq)]
pub enum PatchError {
    #[error("path not found: {0}")]
    NotFound(String),
    #[error("invalid array index at {0}")]
    InvalidIndex(String),
    #[error("cannot address into a scalar at {0}")]
    InvalidTarget(String),
    #[error("cannot move {from} into its own child {path}")]
    MoveIntoChild { from: String, path: String },
    #[error("test failed at {0}")]
    Test(String),
    #[error("invalid JSON pointer '{0}'")]
    InvalidPointer(String),
    #[error("unsupported op '{0}'")]
    UnknownOp(String),
    #[error("op '{op}' is missing '{field}'")]
    MissingField { op: String, field: &'static str },
}

/// A parsed JSON Pointer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pointer(Vec<String>);

impl Pointer {
    /// Parse an RFC 6901 pointer. The empty string is the document root.
    pub fn parse(pointer: &str) -> Result<Self, PatchError> {
        if pointer.is_empty() {
            return Ok(Self::root());
        }
        let Some(rest) = pointer.strip_prefix('/') else {
            return Err(PatchError::InvalidPointer(pointer.to_string()));
        };
        Ok(Self(rest.split('/').map(unescape).collect()))
    }

    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn tokens(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    fn split_last(&self) -> Option<(&[String], &String)> {
        self.0.split_last().map(|(last, parent)| (parent, last))
    }

    fn starts_with(&self, other: &Pointer) -> bool {
        self.0.len() >= other.0.len() && self.0[..other.0.len()] == other.0[..]
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.0 {
            write!(f, "/{}", token.replace('~', "~0").replace('/', "~1"))?;
        }
        Ok(())
    }
}

fn unescape(token: &str) -> String {
    if !token.contains('~') {
        return token.to_string();
    }
    // ~1 first, so "~01" decodes to "~1"
    token.replace("~1", "/").replace("~0", "~")
}

/// One operation as it appears on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOperation {
    pub op: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

/// A validated patch operation
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Add { path: Pointer, value: Value },
    Remove { path: Pointer },
    Replace { path: Pointer, value: Value },
    Move { from: Pointer, path: Pointer },
    Copy { from: Pointer, path: Pointer },
    Test { path: Pointer, value: Value },
}

impl Operation {
    pub fn path(&self) -> &Pointer {
        match self {
            Operation::Add { path, .. }
            | Operation::Remove { path }
            | Operation::Replace { path, .. }
            | Operation::Move { path, .. }
            | Operation::Copy { path, .. }
            | Operation::Test { path, .. } => path,
        }
    }

    /// The value carried by the op, if it carries one
    pub fn value_mut(&mut self) -> Option<&mut Value> {
        match self {
            Operation::Add { value, .. }
            | Operation::Replace { value, .. }
            | Operation::Test { value, .. } => Some(value),
            _ => None,
        }
    }
}

impl TryFrom<RawOperation> for Operation {
    type Error = PatchError;

    fn try_from(raw: RawOperation) -> Result<Self, Self::Error> {
        let path = Pointer::parse(&raw.path)?;
        let value = |raw: RawOperation| {
            raw.value.ok_or(PatchError::MissingField {
                op: raw.op,
                field: "value",
            })
        };
        let from = |raw: &RawOperation| -> Result<Pointer, PatchError> {
            let from = raw.from.as_deref().ok_or_else(|| PatchError::MissingField {
                op: raw.op.clone(),
                field: "from",
            })?;
            Pointer::parse(from)
        };

        let op = raw.op.clone();
        match op.as_str() {
            "add" => Ok(Operation::Add {
                path,
                value: value(raw)?,
            }),
            "remove" => Ok(Operation::Remove { path }),
            "replace" => Ok(Operation::Replace {
                path,
                value: value(raw)?,
            }),
            "move" => Ok(Operation::Move {
                from: from(&raw)?,
                path,
            }),
            "copy" => Ok(Operation::Copy {
                from: from(&raw)?,
                path,
            }),
            "test" => Ok(Operation::Test {
                path,
                value: value(raw)?,
            }),
            _ => Err(PatchError::UnknownOp(raw.op)),
        }
    }
}

/// Apply `ops` in order to a copy of `doc` and return the result.
pub fn apply_patch(doc: &Value, ops: &[Operation]) -> Result<Value, PatchError> {
    let mut working = doc.clone();
    for op in ops {
        apply_op(&mut working, op)?;
    }
    Ok(working)
}

fn apply_op(doc: &mut Value, op: &Operation) -> Result<(), PatchError> {
    match op {
        Operation::Add { path, value } => add(doc, path, value.clone()),
        Operation::Remove { path } => remove(doc, path).map(drop),
        Operation::Replace { path, value } => replace(doc, path, value.clone()),
        Operation::Copy { from, path } => {
            let value = get(doc, from)?.clone();
            add(doc, path, value)
        }
        Operation::Move { from, path } => {
            if from == path {
                return Ok(());
            }
            if path.starts_with(from) {
                return Err(PatchError::MoveIntoChild {
                    from: from.to_string(),
                    path: path.to_string(),
                });
            }
            let value = remove(doc, from)?;
            add(doc, path, value)
        }
        Operation::Test { path, value } => {
            if get(doc, path)? == value {
                Ok(())
            } else {
                Err(PatchError::Test(path.to_string()))
            }
        }
    }
}

fn get<'a>(doc: &'a Value, path: &Pointer) -> Result<&'a Value, PatchError> {
    path.tokens().iter().try_fold(doc, |node, token| match node {
        Value::Object(map) => map
            .get(token)
            .ok_or_else(|| PatchError::NotFound(path.to_string())),
        Value::Array(items) => {
            let idx = parse_index(token, path)?;
            items
                .get(idx)
                .ok_or_else(|| PatchError::NotFound(path.to_string()))
        }
        _ => Err(PatchError::InvalidTarget(path.to_string())),
    })
}

fn parent_mut<'a>(
    doc: &'a mut Value,
    tokens: &[String],
    path: &Pointer,
) -> Result<&'a mut Value, PatchError> {
    let mut node = doc;
    for token in tokens {
        node = match node {
            Value::Object(map) => map
                .get_mut(token)
                .ok_or_else(|| PatchError::NotFound(path.to_string()))?,
            Value::Array(items) => {
                let idx = parse_index(token, path)?;
                items
                    .get_mut(idx)
                    .ok_or_else(|| PatchError::NotFound(path.to_string()))?
            }
            _ => return Err(PatchError::InvalidTarget(path.to_string())),
        };
    }
    Ok(node)
}

fn parse_index(token: &str, path: &Pointer) -> Result<usize, PatchError> {
    if token.len() > 1 && token.starts_with('0') {
        return Err(PatchError::InvalidIndex(path.to_string()));
    }
    token
        .parse()
        .map_err(|_| PatchError::InvalidIndex(path.to_string()))
}

fn add(doc: &mut Value, path: &Pointer, value: Value) -> Result<(), PatchError> {
    let Some((parent, key)) = path.split_last() else {
        *doc = value;
        return Ok(());
    };
    match parent_mut(doc, parent, path)? {
        Value::Object(map) => {
            map.insert(key.clone(), value);
            Ok(())
        }
        Value::Array(items) => {
            if key == "-" {
                items.push(value);
                return Ok(());
            }
            let idx = parse_index(key, path)?;
            if idx > items.len() {
                return Err(PatchError::InvalidIndex(path.to_string()));
            }
            items.insert(idx, value);
            Ok(())
        }
        _ => Err(PatchError::InvalidTarget(path.to_string())),
    }
}

fn remove(doc: &mut Value, path: &Pointer) -> Result<Value, PatchError> {
    let Some((parent, key)) = path.split_last() else {
        return Err(PatchError::InvalidTarget(path.to_string()));
    };
    match parent_mut(doc, parent, path)? {
        Value::Object(map) => map
            .remove(key)
            .ok_or_else(|| PatchError::NotFound(path.to_string())),
        Value::Array(items) => {
            let idx = parse_index(key, path)?;
            if idx >= items.len() {
                return Err(PatchError::NotFound(path.to_string()));
            }
            Ok(items.remove(idx))
        }
        _ => Err(PatchError::InvalidTarget(path.to_string())),
    }
}

fn replace(doc: &mut Value, path: &Pointer, value: Value) -> Result<(), PatchError> {
    let Some((parent, key)) = path.split_last() else {
        *doc = value;
        return Ok(());
    };
    match parent_mut(doc, parent, path)? {
        Value::Object(map) => {
            let slot = map
                .get_mut(key)
                .ok_or_else(|| PatchError::NotFound(path.to_string()))?;
            *slot = value;
            Ok(())
        }
        Value::Array(items) => {
            let idx = parse_index(key, path)?;
            let slot = items
                .get_mut(idx)
                .ok_or_else(|| PatchError::NotFound(path.to_string()))?;
            *slot = value;
            Ok(())
        }
        _ => Err(PatchError::InvalidTarget(path.to_string())),
    }
}
