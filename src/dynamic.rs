//! Opaque dynamic values
//!
//! Some resources cannot have a static schema — an arbitrary API object,
//! for example. A [`Dynamic`] field holds the raw wire value verbatim and
//! converts to and from a generic JSON map for author code that wants to
//! work with plain data.

use std::collections::BTreeMap;

use bigdecimal::{BigDecimal, FromPrimitive, ToPrimitive};
use serde_json::{Map, Value as JsonValue};

use crate::error::{Error, Result};
use crate::value::{Type, Value};

/// Owned container for a value whose type is only known at runtime.
///
/// The default instance holds nothing; unmarshal stores whatever arrived on
/// the wire, including typed null and unknown.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dynamic {
    pub value: Option<Value>,
}

impl Dynamic {
    pub fn new(value: Value) -> Self {
        Self { value: Some(value) }
    }

    /// Replace the held value with one inferred from a JSON object map.
    pub fn set_value_from_map(&mut self, map: &Map<String, JsonValue>) -> Result<()> {
        let mut fields = BTreeMap::new();
        for (key, val) in map {
            fields.insert(key.clone(), value_from_json(val)?);
        }
        self.value = Some(Value::object(fields));
        Ok(())
    }

    /// Render the held value as a JSON object map. An absent or null value
    /// yields `None`.
    pub fn value_to_map(&self) -> Result<Option<Map<String, JsonValue>>> {
        let value = match &self.value {
            None => return Ok(None),
            Some(v) if v.is_null() => return Ok(None),
            Some(v) => v,
        };
        match value_to_json(value)? {
            JsonValue::Object(map) => Ok(Some(map)),
            other => Err(Error::TypeMismatch {
                expected: "object".to_string(),
                actual: other.to_string(),
            }),
        }
    }
}

/// Infer a typed value from plain JSON. Objects infer object types;
/// homogeneous arrays infer lists of the element type, mixed arrays fall
/// back to `List(Dynamic)` with individually typed elements.
pub(crate) fn value_from_json(j: &JsonValue) -> Result<Value> {
    match j {
        JsonValue::Null => Ok(Value::null(Type::Dynamic)),
        JsonValue::Bool(b) => Ok(Value::bool(*b)),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(Value::number_int(i));
            }
            if let Some(u) = n.as_u64() {
                return Ok(Value::number(BigDecimal::from(u)));
            }
            n.as_f64()
                .and_then(BigDecimal::from_f64)
                .map(Value::number)
                .ok_or_else(|| Error::Decode(format!("number out of range: {n}")))
        }
        JsonValue::String(s) => Ok(Value::string(s.clone())),
        JsonValue::Array(items) => {
            let elems = items
                .iter()
                .map(value_from_json)
                .collect::<Result<Vec<_>>>()?;
            match elems.first().map(|e| e.ty().clone()) {
                None => Ok(Value::empty_list(Type::Dynamic)),
                Some(first) if elems.iter().all(|e| e.ty() == &first) => {
                    Ok(Value::sequence(Type::List(Box::new(first)), elems))
                }
                Some(_) => Ok(Value::sequence(Type::List(Box::new(Type::Dynamic)), elems)),
            }
        }
        JsonValue::Object(map) => {
            let mut fields = BTreeMap::new();
            for (key, val) in map {
                fields.insert(key.clone(), value_from_json(val)?);
            }
            Ok(Value::object(fields))
        }
    }
}

/// Render a wholly known value as plain JSON; unknown anywhere is an error.
pub(crate) fn value_to_json(v: &Value) -> Result<JsonValue> {
    if v.is_unknown() {
        return Err(Error::Encode(
            "cannot render an unknown value as JSON".to_string(),
        ));
    }
    if v.is_null() {
        return Ok(JsonValue::Null);
    }
    if let Some(s) = v.as_str() {
        return Ok(JsonValue::String(s.to_string()));
    }
    if let Some(b) = v.as_bool() {
        return Ok(JsonValue::Bool(b));
    }
    if let Some(n) = v.as_number() {
        if n.is_integer() {
            if let Some(i) = n.to_i64() {
                return Ok(JsonValue::Number(i.into()));
            }
            if let Some(u) = n.to_u64() {
                return Ok(JsonValue::Number(u.into()));
            }
        }
        return n
            .to_f64()
            .and_then(serde_json::Number::from_f64)
            .map(JsonValue::Number)
            .ok_or_else(|| Error::Encode(format!("number not representable in JSON: {n}")));
    }
    match v.ty() {
        Type::List(_) | Type::Set(_) => {
            let items = v
                .elements()?
                .iter()
                .map(value_to_json)
                .collect::<Result<Vec<_>>>()?;
            Ok(JsonValue::Array(items))
        }
        Type::Map(_) | Type::Object(_) => {
            let mut map = Map::new();
            for (key, val) in v.entries()? {
                map.insert(key.clone(), value_to_json(val)?);
            }
            Ok(JsonValue::Object(map))
        }
        other => Err(Error::Encode(format!("cannot render {other:?} as JSON"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_value_maps_to_none() {
        let dyn_val = Dynamic::default();
        assert_eq!(dyn_val.value_to_map().unwrap(), None);
    }

    #[test]
    fn null_value_maps_to_none() {
        let dyn_val = Dynamic::new(Value::null(Type::Map(Box::new(Type::String))));
        assert_eq!(dyn_val.value_to_map().unwrap(), None);
    }

    #[test]
    fn set_then_get_round_trips() {
        let source = json!({
            "kind": "ConfigMap",
            "metadata": { "name": "app", "labels": { "env": "prod" } },
            "replicas": 3,
            "ready": true,
        });
        let JsonValue::Object(source_map) = source else {
            unreachable!()
        };

        let mut dyn_val = Dynamic::default();
        dyn_val.set_value_from_map(&source_map).unwrap();

        let out = dyn_val.value_to_map().unwrap().unwrap();
        assert_eq!(out, source_map);
    }

    #[test]
    fn mixed_arrays_type_elements_individually() {
        let v = value_from_json(&json!(["a", 1, true])).unwrap();
        assert_eq!(v.ty().element_type(), Some(&Type::Dynamic));
        assert_eq!(v.elements().unwrap().len(), 3);

        let homogeneous = value_from_json(&json!(["a", "b"])).unwrap();
        assert_eq!(homogeneous.ty().element_type(), Some(&Type::String));
    }

    #[test]
    fn unknown_cannot_render() {
        let dyn_val = Dynamic::new(Value::unknown(Type::Dynamic));
        assert!(dyn_val.value_to_map().is_err());
    }
}
