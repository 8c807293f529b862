//! State binding layer
//!
//! Maps between schema-shaped dynamic values and provider-authored records.
//! The contract is a bijection: any in-range record marshals to a value
//! conforming to the derived schema, and any wholly known conforming value
//! unmarshals back to the same record. Null and unknown exist only on the
//! value side; unmarshal leaves the corresponding field at its current
//! value, which is how [`Defaulter`] seeding survives.
//!
//! There is no reflection here. The [`state_model!`] macro enumerates a
//! record's tagged fields statically and emits the per-record schema,
//! unmarshal, and marshal functions, the same shape a build-time generator
//! would produce.

use std::collections::{BTreeMap, HashMap};

use bigdecimal::{BigDecimal, FromPrimitive, ToPrimitive};
use chrono::{DateTime, Utc};

use crate::capability::Capabilities;
use crate::dynamic::Dynamic;
use crate::error::{Error, Result};
use crate::schema::{Attribute, Schema};
use crate::value::{Type, Value};

/// The generated surface of a bound record: schema derivation plus state
/// conversion in both directions.
pub trait StateModel {
    fn schema(&self) -> Result<Schema>;
    fn unmarshal_state(&mut self, v: &Value) -> Result<()>;
    fn marshal_state(&self) -> Result<Value>;
}

/// Implied type of a target's block.
pub fn block_type<T: StateModel + ?Sized>(target: &T) -> Result<Type> {
    Ok(target.schema()?.block.implied_type())
}

/// Seed defaults (when the target is a [`Defaulter`]) and unmarshal a
/// non-null source. This is the one ordering guarantee the engine makes
/// within a call: defaults, then unmarshal, then the lifecycle method.
pub fn unmarshal_with_defaults<T>(target: &mut T, v: &Value) -> Result<()>
where
    T: StateModel + Capabilities + ?Sized,
{
    if let Some(d) = target.defaulter() {
        d.set_defaults();
    }
    if !v.is_null() {
        target.unmarshal_state(v)?;
    }
    Ok(())
}

/// Append an attribute unless the name is already present: flattened
/// records splice in declaration order and the first contributor wins.
pub fn push_attr(attrs: &mut Vec<Attribute>, att: Attribute) {
    if attrs.iter().all(|a| a.name != att.name) {
        attrs.push(att);
    }
}

/// Per-field mapping between a Rust type and the value algebra.
pub trait FieldType: Sized {
    fn field_type() -> Result<Type>;

    /// Convert from a known, non-null value.
    fn from_value(v: &Value) -> Result<Self>;

    fn to_value(&self) -> Result<Value>;

    /// Store `v` into a record field. A null or unknown source leaves the
    /// field at its current value.
    fn assign(slot: &mut Self, v: &Value) -> Result<()> {
        if v.is_null() || !v.is_known() {
            return Ok(());
        }
        *slot = Self::from_value(v)?;
        Ok(())
    }
}

fn expect_number(v: &Value) -> Result<&BigDecimal> {
    v.as_number().ok_or_else(|| Error::TypeMismatch {
        expected: "number".to_string(),
        actual: format!("{:?}", v.ty()),
    })
}

impl FieldType for String {
    fn field_type() -> Result<Type> {
        Ok(Type::String)
    }

    fn from_value(v: &Value) -> Result<Self> {
        v.as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::TypeMismatch {
                expected: "string".to_string(),
                actual: format!("{:?}", v.ty()),
            })
    }

    fn to_value(&self) -> Result<Value> {
        Ok(Value::string(self.clone()))
    }
}

impl FieldType for bool {
    fn field_type() -> Result<Type> {
        Ok(Type::Bool)
    }

    fn from_value(v: &Value) -> Result<Self> {
        v.as_bool().ok_or_else(|| Error::TypeMismatch {
            expected: "bool".to_string(),
            actual: format!("{:?}", v.ty()),
        })
    }

    fn to_value(&self) -> Result<Value> {
        Ok(Value::bool(*self))
    }
}

// covers the combined i64/u64 range; anything outside has no integer field
fn expect_integer(v: &Value) -> Result<i128> {
    let n = expect_number(v)?;
    if !n.is_integer() {
        return Err(Error::TypeMismatch {
            expected: "integer".to_string(),
            actual: n.to_string(),
        });
    }
    if let Some(u) = n.to_u64() {
        return Ok(u as i128);
    }
    n.to_i64().map(|i| i as i128).ok_or_else(|| Error::TypeMismatch {
        expected: "integer".to_string(),
        actual: n.to_string(),
    })
}

macro_rules! integer_field {
    ($($t:ty => $via:ty),*) => {$(
        impl FieldType for $t {
            fn field_type() -> Result<Type> {
                Ok(Type::Number)
            }

            fn from_value(v: &Value) -> Result<Self> {
                let i = expect_integer(v)?;
                <$t>::try_from(i).map_err(|_| Error::TypeMismatch {
                    expected: stringify!($t).to_string(),
                    actual: i.to_string(),
                })
            }

            fn to_value(&self) -> Result<Value> {
                Ok(Value::number(BigDecimal::from(*self as $via)))
            }
        }
    )*};
}

integer_field!(
    i8 => i64, i16 => i64, i32 => i64, i64 => i64, isize => i64,
    u8 => u64, u16 => u64, u32 => u64, u64 => u64, usize => u64
);

macro_rules! float_field {
    ($($t:ty),*) => {$(
        impl FieldType for $t {
            fn field_type() -> Result<Type> {
                Ok(Type::Number)
            }

            fn from_value(v: &Value) -> Result<Self> {
                expect_number(v)?
                    .to_f64()
                    .map(|f| f as $t)
                    .ok_or_else(|| Error::TypeMismatch {
                        expected: stringify!($t).to_string(),
                        actual: format!("{:?}", v.ty()),
                    })
            }

            fn to_value(&self) -> Result<Value> {
                BigDecimal::from_f64(*self as f64)
                    .map(Value::number)
                    .ok_or_else(|| Error::Encode(format!(
                        "number is not finite: {self}"
                    )))
            }
        }
    )*};
}

float_field!(f32, f64);

impl FieldType for DateTime<Utc> {
    fn field_type() -> Result<Type> {
        Ok(Type::String)
    }

    fn from_value(v: &Value) -> Result<Self> {
        let s = v.as_str().ok_or_else(|| Error::TypeMismatch {
            expected: "RFC3339 string".to_string(),
            actual: format!("{:?}", v.ty()),
        })?;
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| Error::Decode(format!("invalid RFC3339 timestamp {s:?}: {e}")))
    }

    fn to_value(&self) -> Result<Value> {
        Ok(Value::string(self.to_rfc3339()))
    }
}

impl FieldType for Dynamic {
    fn field_type() -> Result<Type> {
        Ok(Type::Dynamic)
    }

    fn from_value(v: &Value) -> Result<Self> {
        Ok(Dynamic::new(v.clone()))
    }

    fn to_value(&self) -> Result<Value> {
        Ok(self
            .value
            .clone()
            .unwrap_or_else(|| Value::null(Type::Dynamic)))
    }

    // the raw wire value is stored verbatim, null and unknown included
    fn assign(slot: &mut Self, v: &Value) -> Result<()> {
        *slot = Dynamic::new(v.clone());
        Ok(())
    }
}

impl<T: FieldType> FieldType for Option<T> {
    fn field_type() -> Result<Type> {
        T::field_type()
    }

    fn from_value(v: &Value) -> Result<Self> {
        if v.is_null() {
            Ok(None)
        } else {
            T::from_value(v).map(Some)
        }
    }

    fn to_value(&self) -> Result<Value> {
        match self {
            Some(inner) => inner.to_value(),
            None => Ok(Value::null(T::field_type()?)),
        }
    }
}

impl<T: FieldType> FieldType for Vec<T> {
    fn field_type() -> Result<Type> {
        Ok(Type::List(Box::new(T::field_type()?)))
    }

    fn from_value(v: &Value) -> Result<Self> {
        v.elements()?.iter().map(T::from_value).collect()
    }

    fn to_value(&self) -> Result<Value> {
        if self.is_empty() {
            return Ok(Value::empty_list(T::field_type()?));
        }
        Value::list(
            self.iter()
                .map(T::to_value)
                .collect::<Result<Vec<_>>>()?,
        )
    }
}

impl<T: FieldType> FieldType for HashMap<String, T> {
    fn field_type() -> Result<Type> {
        Ok(Type::Map(Box::new(T::field_type()?)))
    }

    fn from_value(v: &Value) -> Result<Self> {
        v.entries()?
            .iter()
            .map(|(k, val)| Ok((k.clone(), T::from_value(val)?)))
            .collect()
    }

    fn to_value(&self) -> Result<Value> {
        if self.is_empty() {
            return Ok(Value::empty_map(T::field_type()?));
        }
        let entries: BTreeMap<String, Value> = self
            .iter()
            .map(|(k, val)| Ok((k.clone(), val.to_value()?)))
            .collect::<Result<_>>()?;
        Value::map(entries)
    }
}

/// Bind a record's fields to schema attributes, generating its
/// [`StateModel`] implementation. Each entry pairs a field with its
/// annotation value list; a `..field` entry flattens a nested record's
/// attributes into this block (the nested type must implement `Default`
/// and `StateModel`).
///
/// ```ignore
/// #[derive(Debug, Default)]
/// struct ServerResource {
///     name: String,
///     id: Option<String>,
/// }
///
/// tfsdk::state_model! {
///     ServerResource {
///         name: String => "name,required,forcenew",
///         id: Option<String> => "id,computed",
///     }
/// }
/// ```
#[macro_export]
macro_rules! state_model {
    ($ty:ty { $($body:tt)* }) => {
        impl $crate::state::StateModel for $ty {
            fn schema(&self) -> $crate::error::Result<$crate::schema::Schema> {
                let mut attrs: ::std::vec::Vec<$crate::schema::Attribute> =
                    ::std::vec::Vec::new();
                $crate::__state_model_schema!(attrs; $($body)*);
                ::std::result::Result::Ok($crate::schema::Schema {
                    version: 0,
                    block: $crate::schema::Block {
                        version: 0,
                        attributes: attrs,
                    },
                })
            }

            fn unmarshal_state(
                &mut self,
                v: &$crate::value::Value,
            ) -> $crate::error::Result<()> {
                if v.is_null() || !v.is_known() {
                    return ::std::result::Result::Ok(());
                }
                let this = &mut *self;
                $crate::__state_model_unmarshal!(this, v; $($body)*);
                ::std::result::Result::Ok(())
            }

            fn marshal_state(&self) -> $crate::error::Result<$crate::value::Value> {
                let this = &*self;
                let mut fields: ::std::collections::BTreeMap<
                    ::std::string::String,
                    $crate::value::Value,
                > = ::std::collections::BTreeMap::new();
                $crate::__state_model_marshal!(this, fields; $($body)*);
                ::std::result::Result::Ok($crate::value::Value::object(fields))
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __state_model_schema {
    ($attrs:ident;) => {};
    ($attrs:ident; .. $field:ident : $fty:ty $(, $($rest:tt)*)?) => {
        {
            let nested = <$fty as ::std::default::Default>::default();
            let nested_schema = $crate::state::StateModel::schema(&nested)?;
            for att in nested_schema.block.attributes {
                $crate::state::push_attr(&mut $attrs, att);
            }
        }
        $crate::__state_model_schema!($attrs; $($($rest)*)?);
    };
    ($attrs:ident; $field:ident : $fty:ty => $tag:literal $(, $($rest:tt)*)?) => {
        {
            let tag = $crate::tag::TagInfo::parse_list($tag)?;
            if !tag.omit {
                let att = tag.into_attribute(
                    stringify!($field),
                    <$fty as $crate::state::FieldType>::field_type()?,
                )?;
                $crate::state::push_attr(&mut $attrs, att);
            }
        }
        $crate::__state_model_schema!($attrs; $($($rest)*)?);
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __state_model_unmarshal {
    ($this:ident, $v:ident;) => {};
    ($this:ident, $v:ident; .. $field:ident : $fty:ty $(, $($rest:tt)*)?) => {
        $crate::state::StateModel::unmarshal_state(&mut $this.$field, $v)?;
        $crate::__state_model_unmarshal!($this, $v; $($($rest)*)?);
    };
    ($this:ident, $v:ident; $field:ident : $fty:ty => $tag:literal $(, $($rest:tt)*)?) => {
        {
            let tag = $crate::tag::TagInfo::parse_list($tag)?;
            if !tag.omit {
                let src = $v.get_attr(&tag.resolved_name(stringify!($field)))?;
                <$fty as $crate::state::FieldType>::assign(&mut $this.$field, &src)?;
            }
        }
        $crate::__state_model_unmarshal!($this, $v; $($($rest)*)?);
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __state_model_marshal {
    ($this:ident, $fields:ident;) => {};
    ($this:ident, $fields:ident; .. $field:ident : $fty:ty $(, $($rest:tt)*)?) => {
        {
            let nested = $crate::state::StateModel::marshal_state(&$this.$field)?;
            for (name, val) in nested.into_object_entries()? {
                $fields.entry(name).or_insert(val);
            }
        }
        $crate::__state_model_marshal!($this, $fields; $($($rest)*)?);
    };
    ($this:ident, $fields:ident; $field:ident : $fty:ty => $tag:literal $(, $($rest:tt)*)?) => {
        {
            let tag = $crate::tag::TagInfo::parse_list($tag)?;
            if !tag.omit {
                let name = tag.resolved_name(stringify!($field));
                if !$fields.contains_key(&name) {
                    let val = <$fty as $crate::state::FieldType>::to_value(&$this.$field)?;
                    $fields.insert(name, val);
                }
            }
        }
        $crate::__state_model_marshal!($this, $fields; $($($rest)*)?);
    };
}

/// Make a bound record usable as a nested object field of another record.
/// Requires `Default` to build the probe instance.
#[macro_export]
macro_rules! object_field {
    ($ty:ty) => {
        impl $crate::state::FieldType for $ty {
            fn field_type() -> $crate::error::Result<$crate::value::Type> {
                let probe = <$ty as ::std::default::Default>::default();
                ::std::result::Result::Ok(
                    $crate::state::StateModel::schema(&probe)?
                        .block
                        .implied_type(),
                )
            }

            fn from_value(v: &$crate::value::Value) -> $crate::error::Result<Self> {
                let mut out = <$ty as ::std::default::Default>::default();
                $crate::state::StateModel::unmarshal_state(&mut out, v)?;
                ::std::result::Result::Ok(out)
            }

            fn to_value(&self) -> $crate::error::Result<$crate::value::Value> {
                $crate::state::StateModel::marshal_state(self)
            }

            // recurse into the record in place so null or unknown leaves
            // inside a known subtree keep the fields the slot already holds
            fn assign(
                slot: &mut Self,
                v: &$crate::value::Value,
            ) -> $crate::error::Result<()> {
                if v.is_null() || !v.is_known() {
                    return ::std::result::Result::Ok(());
                }
                $crate::state::StateModel::unmarshal_state(slot, v)
            }
        }
    };
}
