//! Attribute paths
//!
//! A path addresses a position inside a dynamic value: a sequence of
//! attribute lookups and collection indexes. Paths identify changed
//! attributes in plans, address diagnostics, and drive the schema lookup
//! during change detection.

use std::fmt;

use crate::error::{Error, Result};
use crate::value::{Type, Value};

/// One step of a [`Path`]: a closed sum, not a hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub enum PathStep {
    /// Descend into a named attribute of an object.
    GetAttr(String),
    /// Descend into a collection element; the key is a string (maps) or an
    /// integer-valued number (lists and sets).
    Index(Value),
}

/// An ordered sequence of steps addressing a position in a value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Path {
    pub steps: Vec<PathStep>,
}

impl Path {
    pub fn root() -> Self {
        Self { steps: Vec::new() }
    }

    /// Single-step path to a named attribute.
    pub fn attr(name: impl Into<String>) -> Self {
        Self {
            steps: vec![PathStep::GetAttr(name.into())],
        }
    }

    pub fn get_attr(mut self, name: impl Into<String>) -> Self {
        self.steps.push(PathStep::GetAttr(name.into()));
        self
    }

    pub fn index_int(mut self, idx: i64) -> Self {
        self.steps.push(PathStep::Index(Value::number_int(idx)));
        self
    }

    pub fn index_key(mut self, key: impl Into<String>) -> Self {
        self.steps.push(PathStep::Index(Value::string(key)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub(crate) fn push(&mut self, step: PathStep) {
        self.steps.push(step);
    }

    pub(crate) fn pop(&mut self) {
        self.steps.pop();
    }

    /// Apply this path to a value, descending structurally. Descending into
    /// a null yields a typed null of the addressed type; into an unknown, a
    /// typed unknown.
    pub fn apply(&self, value: &Value) -> Result<Value> {
        let mut current = value.clone();
        for step in &self.steps {
            current = match step {
                PathStep::GetAttr(name) => current.get_attr(name)?,
                PathStep::Index(key) => Self::apply_index(&current, key)?,
            };
        }
        Ok(current)
    }

    fn apply_index(value: &Value, key: &Value) -> Result<Value> {
        let elem_ty = value
            .ty()
            .element_type()
            .ok_or_else(|| {
                Error::Path(format!("cannot index into {:?}", value.ty()))
            })?
            .clone();

        if value.is_null() {
            return Ok(Value::null(elem_ty));
        }
        if value.is_unknown() {
            return Ok(Value::unknown(elem_ty));
        }

        match (value.ty(), key.ty()) {
            (Type::List(_) | Type::Set(_), Type::Number) => {
                let idx = integer_key(key)?;
                let elems = value.elements()?;
                elems
                    .get(idx as usize)
                    .cloned()
                    .ok_or_else(|| Error::Path(format!("index {idx} out of range")))
            }
            (Type::Map(_), Type::String) => {
                let k = key
                    .as_str()
                    .ok_or_else(|| Error::Path("map key is not a known string".to_string()))?;
                // absent map entries are typed absence, not an error
                Ok(value
                    .entries()?
                    .get(k)
                    .cloned()
                    .unwrap_or(Value::null(elem_ty)))
            }
            (vty, kty) => Err(Error::Path(format!(
                "cannot index {vty:?} with key of type {kty:?}"
            ))),
        }
    }
}

/// Extract an integer index from a number-typed key value.
pub fn integer_key(key: &Value) -> Result<i64> {
    use bigdecimal::ToPrimitive;

    let n = key
        .as_number()
        .ok_or_else(|| Error::Path("index key is not a known number".to_string()))?;
    if !n.is_integer() {
        return Err(Error::Path(format!("key is not an integer: {n}")));
    }
    n.to_i64()
        .ok_or_else(|| Error::Path(format!("key out of range: {n}")))
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            match step {
                PathStep::GetAttr(name) => write!(f, ".{name}")?,
                PathStep::Index(key) => match key.as_str() {
                    Some(s) => write!(f, "[{s:?}]")?,
                    None => match key.as_number() {
                        Some(n) => write!(f, "[{n}]")?,
                        None => write!(f, "[?]")?,
                    },
                },
            }
        }
        Ok(())
    }
}
