//! Structural patches over JSON values (RFC 6902).
//!
//! `SurfacesUpdate::Update` carries an ordered list of [`PatchOperation`]s
//! that must be applied one after another against the entry's last known
//! state.  [`apply_patch`] does exactly that, atomically: if any operation
//! fails the target is left as it was.  [`diff`] produces such a list from
//! two snapshots.
//!
//! ```json
//! [
//!   {"op":"replace","path":"/displayName","value":"Desk"},
//!   {"op":"add","path":"/surfaces/-","value":{"id":"sd:2"}},
//!   {"op":"remove","path":"/index"}
//! ]
//! ```

mod diff;
mod pointer;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use diff::diff;

use crate::value::json_equal;

/// Errors raised while applying a patch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PatchError {
    /// The pointer is not a valid RFC 6901 pointer.
    #[error("invalid JSON pointer \"{pointer}\"")]
    InvalidPointer { pointer: String },

    /// Nothing exists at the addressed location (or its parent).
    #[error("path \"{path}\" does not exist")]
    PathNotFound { path: String },

    /// An array was addressed with something other than an index.
    #[error("\"{token}\" is not a valid array index in \"{path}\"")]
    InvalidIndex { path: String, token: String },

    /// An array index is past the end of the array.
    #[error("index {index} is out of bounds for array of length {len} at \"{path}\"")]
    IndexOutOfBounds {
        path: String,
        index: usize,
        len: usize,
    },

    /// The addressed parent is a scalar and cannot hold children.
    #[error("value at \"{path}\" cannot contain children")]
    NotAContainer { path: String },

    /// `remove` addressed the whole document.
    #[error("cannot remove the document root")]
    CannotRemoveRoot,

    /// `move` tried to move a value inside itself.
    #[error("cannot move \"{from}\" into its own child \"{path}\"")]
    MoveIntoDescendant { from: String, path: String },

    /// A `test` operation did not match.
    #[error("test failed at \"{path}\"")]
    TestFailed { path: String },
}

/// One structural patch step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
    Move { from: String, path: String },
    Copy { from: String, path: String },
    Test { path: String, value: Value },
}

impl PatchOperation {
    /// The location this operation writes to (or checks, for `test`).
    pub fn path(&self) -> &str {
        match self {
            PatchOperation::Add { path, .. }
            | PatchOperation::Remove { path }
            | PatchOperation::Replace { path, .. }
            | PatchOperation::Move { path, .. }
            | PatchOperation::Copy { path, .. }
            | PatchOperation::Test { path, .. } => path,
        }
    }
}

/// Applies `operations` to `target` in order.
///
/// # Errors
///
/// Returns the first [`PatchError`] encountered; `target` is unchanged in
/// that case.
pub fn apply_patch(target: &mut Value, operations: &[PatchOperation]) -> Result<(), PatchError> {
    let mut working = target.clone();
    for operation in operations {
        apply_one(&mut working, operation)?;
    }
    *target = working;
    Ok(())
}

fn apply_one(doc: &mut Value, operation: &PatchOperation) -> Result<(), PatchError> {
    match operation {
        PatchOperation::Add { path, value } => add(doc, path, value.clone()),
        PatchOperation::Remove { path } => remove(doc, path).map(drop),
        PatchOperation::Replace { path, value } => replace(doc, path, value.clone()),
        PatchOperation::Move { from, path } => {
            if from == path {
                return Ok(());
            }
            if path.starts_with(&format!("{from}/")) {
                return Err(PatchError::MoveIntoDescendant {
                    from: from.clone(),
                    path: path.clone(),
                });
            }
            let value = remove(doc, from)?;
            add(doc, path, value)
        }
        PatchOperation::Copy { from, path } => {
            let tokens = pointer::parse(from)?;
            let value = pointer::resolve(doc, &tokens)
                .cloned()
                .ok_or_else(|| PatchError::PathNotFound { path: from.clone() })?;
            add(doc, path, value)
        }
        PatchOperation::Test { path, value } => {
            let tokens = pointer::parse(path)?;
            match pointer::resolve(doc, &tokens) {
                Some(actual) if json_equal(actual, value) => Ok(()),
                _ => Err(PatchError::TestFailed { path: path.clone() }),
            }
        }
    }
}

fn add(doc: &mut Value, path: &str, value: Value) -> Result<(), PatchError> {
    let tokens = pointer::parse(path)?;
    let Some((last, parent_tokens)) = tokens.split_last() else {
        *doc = value;
        return Ok(());
    };
    let parent = pointer::resolve_mut(doc, parent_tokens).ok_or_else(|| PatchError::PathNotFound {
        path: path.to_string(),
    })?;
    match parent {
        Value::Object(map) => {
            map.insert(last.clone(), value);
            Ok(())
        }
        Value::Array(items) => {
            if last == "-" {
                items.push(value);
                return Ok(());
            }
            let index = index_token(last, path)?;
            if index > items.len() {
                return Err(PatchError::IndexOutOfBounds {
                    path: path.to_string(),
                    index,
                    len: items.len(),
                });
            }
            items.insert(index, value);
            Ok(())
        }
        _ => Err(PatchError::NotAContainer {
            path: path.to_string(),
        }),
    }
}

fn remove(doc: &mut Value, path: &str) -> Result<Value, PatchError> {
    let tokens = pointer::parse(path)?;
    let Some((last, parent_tokens)) = tokens.split_last() else {
        return Err(PatchError::CannotRemoveRoot);
    };
    let not_found = || PatchError::PathNotFound {
        path: path.to_string(),
    };
    match pointer::resolve_mut(doc, parent_tokens).ok_or_else(not_found)? {
        Value::Object(map) => map.remove(last).ok_or_else(not_found),
        Value::Array(items) => {
            let index = index_token(last, path)?;
            if index >= items.len() {
                return Err(PatchError::IndexOutOfBounds {
                    path: path.to_string(),
                    index,
                    len: items.len(),
                });
            }
            Ok(items.remove(index))
        }
        _ => Err(not_found()),
    }
}

fn replace(doc: &mut Value, path: &str, value: Value) -> Result<(), PatchError> {
    let tokens = pointer::parse(path)?;
    let target = pointer::resolve_mut(doc, &tokens).ok_or_else(|| PatchError::PathNotFound {
        path: path.to_string(),
    })?;
    *target = value;
    Ok(())
}

fn index_token(token: &str, path: &str) -> Result<usize, PatchError> {
    pointer::array_index(token).ok_or_else(|| PatchError::InvalidIndex {
        path: path.to_string(),
        token: token.to_string(),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
