//! Keys the typed model reads but would not write back.
//!
//! Serde skips `None` and empty collections on output, so a document that
//! spelled out `"description": null` or `"tags": []` would lose those keys
//! on save. At parse time the input is compared against a re-serialization
//! of the typed value; every key that did not survive is recorded with its
//! path and restored when the manifest is written, unless the typed side now
//! produces a value of its own.

use serde_json::{Map, Value};

/// One step into a JSON document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Segment {
    Key(String),
    Index(usize),
    /// Array element whose `"id"` is this string.
    Id(String),
}

/// A key present in the input but absent from the typed output.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Omitted {
    parent: Vec<Segment>,
    key: String,
    value: Value,
}

/// Record every key of `input` under `path` that `output` does not carry.
pub(crate) fn collect(
    input: &Value,
    output: &Value,
    path: &mut Vec<Segment>,
    omitted: &mut Vec<Omitted>,
) {
    match (input, output) {
        (Value::Object(input), Value::Object(output)) => {
            for (key, value) in input {
                match output.get(key) {
                    Some(written) => {
                        path.push(Segment::Key(key.clone()));
                        collect(value, written, path, omitted);
                        path.pop();
                    }
                    None => omitted.push(Omitted {
                        parent: path.clone(),
                        key: key.clone(),
                        value: value.clone(),
                    }),
                }
            }
        }
        (Value::Array(input), Value::Array(output)) if input.len() == output.len() => {
            for (index, (value, written)) in input.iter().zip(output).enumerate() {
                path.push(Segment::Index(index));
                collect(value, written, path, omitted);
                path.pop();
            }
        }
        _ => {}
    }
}

/// Put recorded keys back into `document` where their parent still exists.
pub(crate) fn restore(document: &mut Value, omitted: &[Omitted]) {
    for item in omitted {
        let Some(parent) = resolve(document, &item.parent) else {
            continue;
        };
        if !parent.contains_key(&item.key) {
            parent.insert(item.key.clone(), item.value.clone());
        }
    }
}

fn resolve<'a>(mut node: &'a mut Value, path: &[Segment]) -> Option<&'a mut Map<String, Value>> {
    for segment in path {
        node = match segment {
            Segment::Key(key) => node.as_object_mut()?.get_mut(key)?,
            Segment::Index(index) => node.as_array_mut()?.get_mut(*index)?,
            Segment::Id(id) => node
                .as_array_mut()?
                .iter_mut()
                .find(|item| item.get("id").and_then(Value::as_str) == Some(id.as_str()))?,
        };
    }
    node.as_object_mut()
}
