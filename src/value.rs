//! Dynamic value model
//!
//! The value algebra the whole engine is built on: every value carries a
//! concrete type plus a presence (known, null, or unknown). Null is typed
//! absence; unknown means the shape is settled but the content will only be
//! determined at apply time. Both propagate through path application.
//!
//! Numbers are arbitrary-precision: a wire integer or float of any
//! magnitude survives a decode/encode round trip without loss.

use std::collections::BTreeMap;

use bigdecimal::{BigDecimal, FromPrimitive};

use crate::error::{Error, Result};
use crate::path::Path;

/// Type of a [`Value`]. Object field and map entry types are held sorted so
/// derived encodings are deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    String,
    Number,
    Bool,
    /// Erased type for values whose schema cannot be static.
    Dynamic,
    List(Box<Type>),
    Set(Box<Type>),
    Map(Box<Type>),
    Object(BTreeMap<String, Type>),
}

impl Type {
    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::String | Type::Number | Type::Bool)
    }

    /// Element type of a list, set, or map.
    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::List(e) | Type::Set(e) | Type::Map(e) => Some(e),
            _ => None,
        }
    }

    /// Type of a named object attribute.
    pub fn attribute_type(&self, name: &str) -> Option<&Type> {
        match self {
            Type::Object(attrs) => attrs.get(name),
            _ => None,
        }
    }

    /// JSON type descriptor in list form: `"string"`, `["list","string"]`,
    /// `["object",{...}]`. Embedded in schema attributes and in the wire
    /// encoding of dynamic values.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            Type::String => json!("string"),
            Type::Number => json!("number"),
            Type::Bool => json!("bool"),
            Type::Dynamic => json!("dynamic"),
            Type::List(e) => json!(["list", e.to_json()]),
            Type::Set(e) => json!(["set", e.to_json()]),
            Type::Map(e) => json!(["map", e.to_json()]),
            Type::Object(attrs) => {
                let fields: serde_json::Map<String, serde_json::Value> = attrs
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect();
                json!(["object", fields])
            }
        }
    }

    pub fn from_json(j: &serde_json::Value) -> Result<Type> {
        match j {
            serde_json::Value::String(s) => match s.as_str() {
                "string" => Ok(Type::String),
                "number" => Ok(Type::Number),
                "bool" => Ok(Type::Bool),
                "dynamic" => Ok(Type::Dynamic),
                other => Err(Error::Decode(format!("unknown type keyword: {other}"))),
            },
            serde_json::Value::Array(items) => {
                let kind = items
                    .first()
                    .and_then(|k| k.as_str())
                    .ok_or_else(|| Error::Decode("type descriptor missing kind".to_string()))?;
                let arg = items
                    .get(1)
                    .ok_or_else(|| Error::Decode("type descriptor missing argument".to_string()))?;
                match kind {
                    "list" => Ok(Type::List(Box::new(Type::from_json(arg)?))),
                    "set" => Ok(Type::Set(Box::new(Type::from_json(arg)?))),
                    "map" => Ok(Type::Map(Box::new(Type::from_json(arg)?))),
                    "object" => {
                        let fields = arg.as_object().ok_or_else(|| {
                            Error::Decode("object type descriptor needs a field map".to_string())
                        })?;
                        let mut attrs = BTreeMap::new();
                        for (name, fty) in fields {
                            attrs.insert(name.clone(), Type::from_json(fty)?);
                        }
                        Ok(Type::Object(attrs))
                    }
                    other => Err(Error::Decode(format!("unknown type kind: {other}"))),
                }
            }
            other => Err(Error::Decode(format!("malformed type descriptor: {other}"))),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Type::String => "string",
            Type::Number => "number",
            Type::Bool => "bool",
            Type::Dynamic => "dynamic",
            Type::List(_) => "list",
            Type::Set(_) => "set",
            Type::Map(_) => "map",
            Type::Object(_) => "object",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Repr {
    Null,
    Unknown,
    String(String),
    Number(BigDecimal),
    Bool(bool),
    /// Lists and sets both.
    List(Vec<Value>),
    /// Maps and objects both; sorted keys keep encoding deterministic.
    Map(BTreeMap<String, Value>),
}

/// A value in the dynamic algebra: a concrete [`Type`] plus a presence.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    ty: Type,
    repr: Repr,
}

impl Value {
    pub fn string(s: impl Into<String>) -> Value {
        Value {
            ty: Type::String,
            repr: Repr::String(s.into()),
        }
    }

    pub fn number(n: BigDecimal) -> Value {
        Value {
            ty: Type::Number,
            repr: Repr::Number(n),
        }
    }

    pub fn number_int(n: i64) -> Value {
        Value::number(BigDecimal::from(n))
    }

    /// Number from a float. Non-finite floats have no numeric value and
    /// are a programming error.
    pub fn number_float(n: f64) -> Value {
        match BigDecimal::from_f64(n) {
            Some(d) => Value::number(d),
            None => panic!("non-finite number: {n}"),
        }
    }

    pub fn bool(b: bool) -> Value {
        Value {
            ty: Type::Bool,
            repr: Repr::Bool(b),
        }
    }

    /// Typed absence.
    pub fn null(ty: Type) -> Value {
        Value {
            ty,
            repr: Repr::Null,
        }
    }

    /// Shape known, content to be determined.
    pub fn unknown(ty: Type) -> Value {
        Value {
            ty,
            repr: Repr::Unknown,
        }
    }

    /// Object value; the type is implied by the field values.
    pub fn object(fields: BTreeMap<String, Value>) -> Value {
        let ty = Type::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), v.ty.clone()))
                .collect(),
        );
        Value {
            ty,
            repr: Repr::Map(fields),
        }
    }

    /// Non-empty list; all elements must share one type.
    pub fn list(elems: Vec<Value>) -> Result<Value> {
        let elem_ty = Self::unified_type(&elems, "list")?;
        Ok(Value {
            ty: Type::List(Box::new(elem_ty)),
            repr: Repr::List(elems),
        })
    }

    pub fn empty_list(elem: Type) -> Value {
        Value {
            ty: Type::List(Box::new(elem)),
            repr: Repr::List(Vec::new()),
        }
    }

    pub fn set(elems: Vec<Value>) -> Result<Value> {
        let elem_ty = Self::unified_type(&elems, "set")?;
        Ok(Value {
            ty: Type::Set(Box::new(elem_ty)),
            repr: Repr::List(elems),
        })
    }

    pub fn empty_set(elem: Type) -> Value {
        Value {
            ty: Type::Set(Box::new(elem)),
            repr: Repr::List(Vec::new()),
        }
    }

    /// Non-empty map; all entries must share one type.
    pub fn map(entries: BTreeMap<String, Value>) -> Result<Value> {
        let elem_ty = {
            let mut iter = entries.values();
            let first = iter
                .next()
                .ok_or_else(|| Error::TypeMismatch {
                    expected: "at least one map entry".to_string(),
                    actual: "empty map".to_string(),
                })?
                .ty
                .clone();
            for v in iter {
                if v.ty != first {
                    return Err(Error::TypeMismatch {
                        expected: first.name().to_string(),
                        actual: v.ty.name().to_string(),
                    });
                }
            }
            first
        };
        Ok(Value {
            ty: Type::Map(Box::new(elem_ty)),
            repr: Repr::Map(entries),
        })
    }

    pub fn empty_map(elem: Type) -> Value {
        Value {
            ty: Type::Map(Box::new(elem)),
            repr: Repr::Map(BTreeMap::new()),
        }
    }

    /// Sequence value with a caller-supplied list or set type; the codec
    /// uses this for `Dynamic`-element sequences, whose elements carry
    /// individually refined types.
    pub(crate) fn sequence(ty: Type, elems: Vec<Value>) -> Value {
        Value {
            ty,
            repr: Repr::List(elems),
        }
    }

    /// Mapping value with a caller-supplied map type; see [`Value::sequence`].
    pub(crate) fn mapping(ty: Type, entries: BTreeMap<String, Value>) -> Value {
        Value {
            ty,
            repr: Repr::Map(entries),
        }
    }

    fn unified_type(elems: &[Value], what: &str) -> Result<Type> {
        let mut iter = elems.iter();
        let first = iter
            .next()
            .ok_or_else(|| Error::TypeMismatch {
                expected: format!("at least one {what} element"),
                actual: format!("empty {what}"),
            })?
            .ty
            .clone();
        for v in iter {
            if v.ty != first {
                return Err(Error::TypeMismatch {
                    expected: first.name().to_string(),
                    actual: v.ty.name().to_string(),
                });
            }
        }
        Ok(first)
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn is_null(&self) -> bool {
        matches!(self.repr, Repr::Null)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self.repr, Repr::Unknown)
    }

    pub fn is_known(&self) -> bool {
        !self.is_unknown()
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.repr {
            Repr::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<&BigDecimal> {
        match &self.repr {
            Repr::Number(n) => Some(n),
            _ => None,
        }
    }

    /// Lossy convenience view of a number.
    pub fn as_f64(&self) -> Option<f64> {
        use bigdecimal::ToPrimitive;
        match &self.repr {
            Repr::Number(n) => n.to_f64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match &self.repr {
            Repr::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// True iff this is the known boolean `true`.
    pub fn is_true(&self) -> bool {
        matches!(self.repr, Repr::Bool(true))
    }

    /// Elements of a known list or set.
    pub fn elements(&self) -> Result<&[Value]> {
        match &self.repr {
            Repr::List(elems) => Ok(elems),
            _ => Err(Error::TypeMismatch {
                expected: "known list or set".to_string(),
                actual: self.describe(),
            }),
        }
    }

    /// Entries of a known map or object.
    pub fn entries(&self) -> Result<&BTreeMap<String, Value>> {
        match &self.repr {
            Repr::Map(entries) => Ok(entries),
            _ => Err(Error::TypeMismatch {
                expected: "known map or object".to_string(),
                actual: self.describe(),
            }),
        }
    }

    /// Consume a known object or map, yielding its entries.
    pub fn into_object_entries(self) -> Result<BTreeMap<String, Value>> {
        match self.repr {
            Repr::Map(entries) => Ok(entries),
            _ => Err(Error::TypeMismatch {
                expected: "known object".to_string(),
                actual: self.describe(),
            }),
        }
    }

    /// Descend into a named attribute of an object value. Null and unknown
    /// propagate as typed null/unknown of the attribute type.
    pub fn get_attr(&self, name: &str) -> Result<Value> {
        let att_ty = match &self.ty {
            Type::Object(attrs) => attrs
                .get(name)
                .ok_or_else(|| Error::Path(format!("no attribute {name:?} in object type")))?,
            other => {
                return Err(Error::Path(format!(
                    "cannot get attribute {name:?} on {}",
                    other.name()
                )))
            }
        };
        match &self.repr {
            Repr::Null => Ok(Value::null(att_ty.clone())),
            Repr::Unknown => Ok(Value::unknown(att_ty.clone())),
            Repr::Map(fields) => Ok(fields
                .get(name)
                .cloned()
                .unwrap_or_else(|| Value::null(att_ty.clone()))),
            _ => Err(Error::Path(format!(
                "object value has non-object representation at {name:?}"
            ))),
        }
    }

    /// Three-valued equality: unknown if either side contains an unknown at
    /// a compared position, otherwise a known bool.
    pub fn equals(&self, other: &Value) -> Value {
        match self.partial_equals(other) {
            Some(b) => Value::bool(b),
            None => Value::unknown(Type::Bool),
        }
    }

    fn partial_equals(&self, other: &Value) -> Option<bool> {
        if self.ty != other.ty {
            return Some(false);
        }
        if self.is_unknown() || other.is_unknown() {
            return None;
        }
        match (&self.repr, &other.repr) {
            (Repr::Null, Repr::Null) => Some(true),
            (Repr::Null, _) | (_, Repr::Null) => Some(false),
            (Repr::String(a), Repr::String(b)) => Some(a == b),
            (Repr::Number(a), Repr::Number(b)) => Some(a == b),
            (Repr::Bool(a), Repr::Bool(b)) => Some(a == b),
            (Repr::List(a), Repr::List(b)) => {
                if a.len() != b.len() {
                    return Some(false);
                }
                Self::combine_all(a.iter().zip(b).map(|(x, y)| x.partial_equals(y)))
            }
            (Repr::Map(a), Repr::Map(b)) => {
                if a.len() != b.len() || !a.keys().eq(b.keys()) {
                    return Some(false);
                }
                Self::combine_all(
                    a.iter()
                        .map(|(k, x)| x.partial_equals(b.get(k).expect("keys checked equal"))),
                )
            }
            _ => Some(false),
        }
    }

    // false dominates unknown; all-true is true
    fn combine_all(results: impl Iterator<Item = Option<bool>>) -> Option<bool> {
        let mut saw_unknown = false;
        for r in results {
            match r {
                Some(false) => return Some(false),
                None => saw_unknown = true,
                Some(true) => {}
            }
        }
        if saw_unknown {
            None
        } else {
            Some(true)
        }
    }

    /// Pre-order traversal. `visit` receives the path *to* each node and may
    /// return `false` to skip that node's children. Null and unknown
    /// composites have no children.
    pub fn walk<F>(&self, visit: &mut F) -> Result<()>
    where
        F: FnMut(&Path, &Value) -> Result<bool>,
    {
        let mut path = Path::root();
        self.walk_inner(&mut path, visit)
    }

    fn walk_inner<F>(&self, path: &mut Path, visit: &mut F) -> Result<()>
    where
        F: FnMut(&Path, &Value) -> Result<bool>,
    {
        if !visit(path, self)? {
            return Ok(());
        }
        match &self.repr {
            Repr::List(elems) => {
                for (i, elem) in elems.iter().enumerate() {
                    path.push(crate::path::PathStep::Index(Value::number_int(i as i64)));
                    elem.walk_inner(path, visit)?;
                    path.pop();
                }
            }
            Repr::Map(entries) => {
                for (key, val) in entries {
                    let step = match &self.ty {
                        Type::Object(_) => crate::path::PathStep::GetAttr(key.clone()),
                        _ => crate::path::PathStep::Index(Value::string(key.clone())),
                    };
                    path.push(step);
                    val.walk_inner(path, visit)?;
                    path.pop();
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Structural rebuild: children are transformed before their parent,
    /// and `f`'s return value substitutes for each node.
    pub fn transform<F>(&self, f: &mut F) -> Result<Value>
    where
        F: FnMut(&Path, Value) -> Result<Value>,
    {
        let mut path = Path::root();
        self.transform_inner(&mut path, f)
    }

    fn transform_inner<F>(&self, path: &mut Path, f: &mut F) -> Result<Value>
    where
        F: FnMut(&Path, Value) -> Result<Value>,
    {
        let rebuilt = match &self.repr {
            Repr::List(elems) => {
                let mut out = Vec::with_capacity(elems.len());
                for (i, elem) in elems.iter().enumerate() {
                    path.push(crate::path::PathStep::Index(Value::number_int(i as i64)));
                    out.push(elem.transform_inner(path, f)?);
                    path.pop();
                }
                Value {
                    ty: self.ty.clone(),
                    repr: Repr::List(out),
                }
            }
            Repr::Map(entries) => {
                let mut out = BTreeMap::new();
                for (key, val) in entries {
                    let step = match &self.ty {
                        Type::Object(_) => crate::path::PathStep::GetAttr(key.clone()),
                        _ => crate::path::PathStep::Index(Value::string(key.clone())),
                    };
                    path.push(step);
                    out.insert(key.clone(), val.transform_inner(path, f)?);
                    path.pop();
                }
                Value {
                    ty: self.ty.clone(),
                    repr: Repr::Map(out),
                }
            }
            _ => self.clone(),
        };
        f(path, rebuilt)
    }

    fn describe(&self) -> String {
        match &self.repr {
            Repr::Null => format!("null {}", self.ty.name()),
            Repr::Unknown => format!("unknown {}", self.ty.name()),
            _ => self.ty.name().to_string(),
        }
    }

    pub(crate) fn repr(&self) -> &Repr {
        &self.repr
    }
}
