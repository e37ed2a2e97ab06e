//! Query and patch model for the document store.
//!
//! Documents are JSON objects; fields are addressed with dotted paths
//! (`accessControl.read`). Equality is JSON value equality, so structured
//! elements (e.g. `{route, method}` pairs) compare by value.

use serde_json::{Map, Value};

use warden_core::set_ops;

use super::r#trait::StoreError;

/// A single filter condition on a dotted field path.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Field equals the value.
    Eq { field: String, value: Value },
    /// Field is absent or differs from the value.
    Ne { field: String, value: Value },
    /// Field equals one of the values.
    In { field: String, values: Vec<Value> },
    /// Field is an array containing the value.
    Contains { field: String, value: Value },
}

/// Conjunction of conditions. An empty query matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    conditions: Vec<Condition>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn ne(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Ne {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn is_in(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.conditions.push(Condition::In {
            field: field.into(),
            values,
        });
        self
    }

    pub fn contains(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Contains {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.conditions.iter().all(|c| match c {
            Condition::Eq { field, value } => get_path(doc, field) == Some(value),
            Condition::Ne { field, value } => get_path(doc, field) != Some(value),
            Condition::In { field, values } => {
                get_path(doc, field).is_some_and(|v| values.contains(v))
            }
            Condition::Contains { field, value } => get_path(doc, field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value)),
        })
    }

    /// JSON containment document covering the `Eq`/`Contains` conditions.
    ///
    /// Backends with a containment operator use this as a pre-filter and then
    /// apply `matches` for exact semantics.
    pub fn containment(&self) -> Value {
        let mut root = Value::Object(Map::new());
        for condition in &self.conditions {
            let (field, value) = match condition {
                Condition::Eq { field, value } => (field, value.clone()),
                Condition::Contains { field, value } => (field, Value::Array(vec![value.clone()])),
                Condition::Ne { .. } | Condition::In { .. } => continue,
            };
            if get_path(&root, field).is_some() {
                continue;
            }
            if let Ok(slot) = path_entry(&mut root, field) {
                *slot = value;
            }
        }
        root
    }
}

/// Document mutation applied by `update_many`.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    /// Union into an array field (created when absent).
    AddToSet { field: String, values: Vec<Value> },
    /// Remove every equal element from an array field (compacting).
    Pull { field: String, values: Vec<Value> },
}

impl Patch {
    pub fn add_to_set(field: impl Into<String>, values: Vec<Value>) -> Self {
        Patch::AddToSet {
            field: field.into(),
            values,
        }
    }

    pub fn pull(field: impl Into<String>, values: Vec<Value>) -> Self {
        Patch::Pull {
            field: field.into(),
            values,
        }
    }

    /// Apply to `doc` in place.
    pub fn apply(&self, doc: &mut Value) -> Result<(), StoreError> {
        match self {
            Patch::AddToSet { field, values } => {
                let items = array_entry(doc, field)?;
                set_ops::push_unique(items, values);
            }
            Patch::Pull { field, values } => {
                let items = array_entry(doc, field)?;
                set_ops::pull_all(items, values);
            }
        }
        Ok(())
    }
}

/// Apply every patch in order.
pub fn apply_patches(doc: &mut Value, patches: &[Patch]) -> Result<(), StoreError> {
    patches.iter().try_for_each(|p| p.apply(doc))
}

pub fn get_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |value, segment| value.get(segment))
}

/// Mutable slot at `path`, creating intermediate objects (leaf defaults to null).
fn path_entry<'a>(doc: &'a mut Value, path: &str) -> Result<&'a mut Value, StoreError> {
    let mut current = doc;
    for segment in path.split('.') {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        let object = current.as_object_mut().ok_or_else(|| {
            StoreError::InvalidPatch(format!("'{path}' crosses a non-object value"))
        })?;
        current = object.entry(segment.to_string()).or_insert(Value::Null);
    }
    Ok(current)
}

fn array_entry<'a>(doc: &'a mut Value, path: &str) -> Result<&'a mut Vec<Value>, StoreError> {
    let slot = path_entry(doc, path)?;
    if slot.is_null() {
        *slot = Value::Array(Vec::new());
    }
    slot.as_array_mut()
        .ok_or_else(|| StoreError::InvalidPatch(format!("'{path}' is not an array")))
}
