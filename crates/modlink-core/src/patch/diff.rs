//! Patch generation from two snapshots.

use serde_json::{Map, Value};

use crate::patch::pointer::escape;
use crate::patch::PatchOperation;
use crate::value::json_equal;

/// Computes a patch that turns `old` into `new`.
///
/// Objects are compared key by key and arrays element by element; anything
/// else that differs is replaced whole.  Applying the result to `old` with
/// [`apply_patch`](crate::patch::apply_patch) yields a value equal to `new`.
pub fn diff(old: &Value, new: &Value) -> Vec<PatchOperation> {
    let mut ops = Vec::new();
    diff_into(&mut ops, String::new(), old, new);
    ops
}

fn diff_into(ops: &mut Vec<PatchOperation>, path: String, old: &Value, new: &Value) {
    if json_equal(old, new) {
        return;
    }
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => diff_objects(ops, &path, a, b),
        (Value::Array(a), Value::Array(b)) => diff_arrays(ops, &path, a, b),
        _ => ops.push(PatchOperation::Replace {
            path,
            value: new.clone(),
        }),
    }
}

fn diff_objects(ops: &mut Vec<PatchOperation>, path: &str, old: &Map<String, Value>, new: &Map<String, Value>) {
    for key in old.keys().filter(|k| !new.contains_key(*k)) {
        ops.push(PatchOperation::Remove {
            path: format!("{path}/{}", escape(key)),
        });
    }
    for (key, value) in new {
        let child = format!("{path}/{}", escape(key));
        match old.get(key) {
            Some(previous) => diff_into(ops, child, previous, value),
            None => ops.push(PatchOperation::Add {
                path: child,
                value: value.clone(),
            }),
        }
    }
}

fn diff_arrays(ops: &mut Vec<PatchOperation>, path: &str, old: &[Value], new: &[Value]) {
    let shared = old.len().min(new.len());
    for i in 0..shared {
        diff_into(ops, format!("{path}/{i}"), &old[i], &new[i]);
    }
    // Trailing removals run back to front so earlier indices stay valid.
    for i in (shared..old.len()).rev() {
        ops.push(PatchOperation::Remove {
            path: format!("{path}/{i}"),
        });
    }
    for value in &new[shared..] {
        ops.push(PatchOperation::Add {
            path: format!("{path}/-"),
            value: value.clone(),
        });
    }
}
