//! Msgpack codec for dynamic values
//!
//! Encoding and decoding are driven by the schema's implied type, never by
//! the value alone: a wire value of mismatched shape fails to decode, and a
//! value that does not conform to the declared type fails to encode.
//!
//! Unknown values travel as the msgpack extension `fixext1, type 0`. A
//! position declared `Dynamic` carries its own type alongside the value as
//! a two-element array of JSON type-descriptor bytes and the encoded value.
//! Object and map keys encode in sorted order, so a decoded value
//! re-encodes byte-identically.

use std::collections::BTreeMap;

use bigdecimal::{BigDecimal, FromPrimitive, ToPrimitive};

use crate::error::{Error, Result};
use crate::value::{Repr, Type, Value};

/// Extension type code marking an unknown value.
const UNKNOWN_EXT_TYPE: i8 = 0;

/// Decode a wire buffer against a declared type. An empty buffer is the
/// front-end's spelling of an absent body and decodes as typed null.
pub fn decode(bytes: &[u8], ty: &Type) -> Result<Value> {
    if bytes.is_empty() {
        return Ok(Value::null(ty.clone()));
    }
    let mut rd = bytes;
    let raw = rmpv::decode::read_value(&mut rd)
        .map_err(|e| Error::Decode(format!("msgpack read failed: {e}")))?;
    from_msgpack(&raw, ty)
}

/// Encode a value against a declared type, rejecting mismatches including
/// at null and unknown leaves.
pub fn encode(value: &Value, ty: &Type) -> Result<Vec<u8>> {
    if !conforms(value.ty(), ty) {
        return Err(Error::Encode(format!(
            "value of type {:?} does not conform to {:?}",
            value.ty(),
            ty
        )));
    }
    let raw = to_msgpack(value, ty)?;
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, &raw)
        .map_err(|e| Error::Encode(format!("msgpack write failed: {e}")))?;
    Ok(buf)
}

/// Structural conformance; `Dynamic` in the declared type erases the
/// position and accepts any actual type.
fn conforms(actual: &Type, declared: &Type) -> bool {
    match (actual, declared) {
        (_, Type::Dynamic) => true,
        (Type::List(a), Type::List(d)) => conforms(a, d),
        (Type::Set(a), Type::Set(d)) => conforms(a, d),
        (Type::Map(a), Type::Map(d)) => conforms(a, d),
        (Type::Object(a), Type::Object(d)) => {
            a.len() == d.len()
                && a.iter()
                    .zip(d.iter())
                    .all(|((an, at), (dn, dt))| an == dn && conforms(at, dt))
        }
        _ => actual == declared,
    }
}

fn unknown_ext() -> rmpv::Value {
    rmpv::Value::Ext(UNKNOWN_EXT_TYPE, vec![0])
}

fn is_unknown_ext(raw: &rmpv::Value) -> bool {
    matches!(raw, rmpv::Value::Ext(code, _) if *code == UNKNOWN_EXT_TYPE)
}

fn to_msgpack(value: &Value, ty: &Type) -> Result<rmpv::Value> {
    if let Type::Dynamic = ty {
        // null/unknown may carry no refined type; everything else does
        return match value.ty() {
            Type::Dynamic => match value.repr() {
                Repr::Null => Ok(rmpv::Value::Nil),
                Repr::Unknown => Ok(unknown_ext()),
                _ => Err(Error::Encode(
                    "known value cannot have the erased dynamic type".to_string(),
                )),
            },
            refined => {
                let ty_json = serde_json::to_vec(&refined.to_json())
                    .map_err(|e| Error::Encode(format!("type descriptor: {e}")))?;
                let refined = refined.clone();
                Ok(rmpv::Value::Array(vec![
                    rmpv::Value::Binary(ty_json),
                    to_msgpack(value, &refined)?,
                ]))
            }
        };
    }

    match value.repr() {
        Repr::Null => Ok(rmpv::Value::Nil),
        Repr::Unknown => Ok(unknown_ext()),
        Repr::Bool(b) => Ok(rmpv::Value::Boolean(*b)),
        Repr::Number(n) => number_to_msgpack(n),
        Repr::String(s) => Ok(rmpv::Value::String(s.as_str().into())),
        Repr::List(elems) => {
            let elem_ty = ty.element_type().ok_or_else(|| {
                Error::Encode(format!("sequence value declared as {ty:?}"))
            })?;
            let items = elems
                .iter()
                .map(|e| to_msgpack(e, elem_ty))
                .collect::<Result<Vec<_>>>()?;
            Ok(rmpv::Value::Array(items))
        }
        Repr::Map(entries) => match ty {
            Type::Map(elem_ty) => {
                let mut pairs = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    pairs.push((
                        rmpv::Value::String(k.as_str().into()),
                        to_msgpack(v, elem_ty)?,
                    ));
                }
                Ok(rmpv::Value::Map(pairs))
            }
            Type::Object(attrs) => {
                let mut pairs = Vec::with_capacity(attrs.len());
                for (name, att_ty) in attrs {
                    let v = entries.get(name).ok_or_else(|| {
                        Error::Encode(format!("object value missing attribute {name:?}"))
                    })?;
                    pairs.push((rmpv::Value::String(name.as_str().into()), to_msgpack(v, att_ty)?));
                }
                Ok(rmpv::Value::Map(pairs))
            }
            _ => Err(Error::Encode(format!("mapping value declared as {ty:?}"))),
        },
    }
}

// integral values encode as msgpack integers, which is what the
// orchestrator's encoder emits; everything else is a binary float
fn number_to_msgpack(n: &BigDecimal) -> Result<rmpv::Value> {
    if n.is_integer() {
        if let Some(u) = n.to_u64() {
            return Ok(rmpv::Value::Integer(u.into()));
        }
        if let Some(i) = n.to_i64() {
            return Ok(rmpv::Value::Integer(i.into()));
        }
    }
    n.to_f64()
        .filter(|f| f.is_finite())
        .map(rmpv::Value::F64)
        .ok_or_else(|| Error::Encode(format!("number not representable on the wire: {n}")))
}

fn from_msgpack(raw: &rmpv::Value, ty: &Type) -> Result<Value> {
    if is_unknown_ext(raw) {
        return Ok(Value::unknown(ty.clone()));
    }
    if matches!(raw, rmpv::Value::Nil) {
        return Ok(Value::null(ty.clone()));
    }

    match ty {
        Type::Dynamic => {
            let items = match raw {
                rmpv::Value::Array(items) if items.len() == 2 => items,
                other => {
                    return Err(Error::Decode(format!(
                        "dynamic value must be a [type, value] pair, got {other}"
                    )))
                }
            };
            let ty_bytes = match &items[0] {
                rmpv::Value::Binary(b) => b.as_slice(),
                rmpv::Value::String(s) => s.as_bytes(),
                other => {
                    return Err(Error::Decode(format!(
                        "dynamic type descriptor must be bytes, got {other}"
                    )))
                }
            };
            let ty_json: serde_json::Value = serde_json::from_slice(ty_bytes)
                .map_err(|e| Error::Decode(format!("dynamic type descriptor: {e}")))?;
            let refined = Type::from_json(&ty_json)?;
            from_msgpack(&items[1], &refined)
        }
        Type::String => match raw {
            rmpv::Value::String(s) => s
                .as_str()
                .map(Value::string)
                .ok_or_else(|| Error::Decode("string is not valid UTF-8".to_string())),
            other => Err(mismatch("string", other)),
        },
        Type::Number => match raw {
            rmpv::Value::Integer(i) => {
                if let Some(u) = i.as_u64() {
                    return Ok(Value::number(BigDecimal::from(u)));
                }
                i.as_i64()
                    .map(|x| Value::number(BigDecimal::from(x)))
                    .ok_or_else(|| Error::Decode("integer out of range".to_string()))
            }
            rmpv::Value::F32(f) => BigDecimal::from_f32(*f)
                .map(Value::number)
                .ok_or_else(|| Error::Decode(format!("number is not finite: {f}"))),
            rmpv::Value::F64(f) => BigDecimal::from_f64(*f)
                .map(Value::number)
                .ok_or_else(|| Error::Decode(format!("number is not finite: {f}"))),
            other => Err(mismatch("number", other)),
        },
        Type::Bool => match raw {
            rmpv::Value::Boolean(b) => Ok(Value::bool(*b)),
            other => Err(mismatch("bool", other)),
        },
        Type::List(elem_ty) | Type::Set(elem_ty) => match raw {
            rmpv::Value::Array(items) => {
                let mut elems = Vec::with_capacity(items.len());
                for item in items {
                    elems.push(from_msgpack(item, elem_ty)?);
                }
                Ok(Value::sequence(ty.clone(), elems))
            }
            other => Err(mismatch("array", other)),
        },
        Type::Map(elem_ty) => {
            let pairs = map_pairs(raw)?;
            let mut entries = BTreeMap::new();
            for (key, val) in pairs {
                entries.insert(key, from_msgpack(val, elem_ty)?);
            }
            Ok(Value::mapping(ty.clone(), entries))
        }
        Type::Object(attrs) => {
            let pairs = map_pairs(raw)?;
            if pairs.len() != attrs.len() {
                return Err(Error::Decode(format!(
                    "object has {} entries, schema implies {}",
                    pairs.len(),
                    attrs.len()
                )));
            }
            let mut entries = BTreeMap::new();
            for (key, val) in pairs {
                let att_ty = attrs.get(&key).ok_or_else(|| {
                    Error::Decode(format!("unexpected object attribute {key:?}"))
                })?;
                entries.insert(key, from_msgpack(val, att_ty)?);
            }
            Ok(Value::object(entries))
        }
    }
}

fn map_pairs(raw: &rmpv::Value) -> Result<Vec<(String, &rmpv::Value)>> {
    match raw {
        rmpv::Value::Map(pairs) => pairs
            .iter()
            .map(|(k, v)| match k {
                rmpv::Value::String(s) => s
                    .as_str()
                    .map(|s| (s.to_string(), v))
                    .ok_or_else(|| Error::Decode("map key is not valid UTF-8".to_string())),
                other => Err(Error::Decode(format!("map key must be a string, got {other}"))),
            })
            .collect(),
        other => Err(mismatch("map", other)),
    }
}

fn mismatch(expected: &str, got: &rmpv::Value) -> Error {
    Error::Decode(format!("expected {expected}, got {got}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Type, Value};

    fn server_type() -> Type {
        Type::Object(
            [
                ("name".to_string(), Type::String),
                ("port".to_string(), Type::Number),
                ("enabled".to_string(), Type::Bool),
                ("tags".to_string(), Type::Map(Box::new(Type::String))),
            ]
            .into_iter()
            .collect(),
        )
    }

    fn server_value() -> Value {
        let mut tags = BTreeMap::new();
        tags.insert("env".to_string(), Value::string("prod"));
        Value::object(
            [
                ("name".to_string(), Value::string("web")),
                ("port".to_string(), Value::number_int(8080)),
                ("enabled".to_string(), Value::bool(true)),
                ("tags".to_string(), Value::map(tags).unwrap()),
            ]
            .into_iter()
            .collect(),
        )
    }

    #[test]
    fn round_trip_is_byte_identical() {
        let ty = server_type();
        let bytes = encode(&server_value(), &ty).unwrap();
        let decoded = decode(&bytes, &ty).unwrap();
        let again = encode(&decoded, &ty).unwrap();
        assert_eq!(bytes, again);
        assert_eq!(decoded, server_value());
    }

    #[test]
    fn null_encodes_as_nil_and_empty_decodes_as_null() {
        let ty = server_type();
        let bytes = encode(&Value::null(ty.clone()), &ty).unwrap();
        assert_eq!(bytes, vec![0xc0]);

        let decoded = decode(&[], &ty).unwrap();
        assert!(decoded.is_null());
        assert_eq!(decoded.ty(), &ty);
    }

    #[test]
    fn unknown_is_the_fixext1_tag() {
        let bytes = encode(&Value::unknown(Type::String), &Type::String).unwrap();
        assert_eq!(bytes, vec![0xd4, 0x00, 0x00]);

        let decoded = decode(&bytes, &Type::String).unwrap();
        assert!(decoded.is_unknown());
        assert_eq!(decoded.ty(), &Type::String);
    }

    #[test]
    fn unknown_inside_object_round_trips() {
        let ty = Type::Object(
            [
                ("id".to_string(), Type::String),
                ("name".to_string(), Type::String),
            ]
            .into_iter()
            .collect(),
        );
        let v = Value::object(
            [
                ("id".to_string(), Value::unknown(Type::String)),
                ("name".to_string(), Value::string("x")),
            ]
            .into_iter()
            .collect(),
        );

        let bytes = encode(&v, &ty).unwrap();
        let decoded = decode(&bytes, &ty).unwrap();
        assert!(decoded.get_attr("id").unwrap().is_unknown());
        assert_eq!(encode(&decoded, &ty).unwrap(), bytes);
    }

    #[test]
    fn decode_is_strict_about_shape() {
        let bytes = encode(&Value::string("hello"), &Type::String).unwrap();
        assert!(decode(&bytes, &Type::Number).is_err());
        assert!(decode(&bytes, &server_type()).is_err());
    }

    #[test]
    fn encode_rejects_nonconforming_values() {
        assert!(encode(&Value::string("x"), &Type::Number).is_err());
        assert!(encode(&Value::null(Type::String), &Type::Number).is_err());

        let list = Value::list(vec![Value::number_int(1)]).unwrap();
        assert!(encode(&list, &Type::List(Box::new(Type::String))).is_err());
    }

    #[test]
    fn integral_numbers_encode_as_integers() {
        let bytes = encode(&Value::number_int(5), &Type::Number).unwrap();
        assert_eq!(bytes, vec![0x05]);

        let decoded = decode(&bytes, &Type::Number).unwrap();
        assert_eq!(encode(&decoded, &Type::Number).unwrap(), bytes);

        let frac = encode(&Value::number_float(1.5), &Type::Number).unwrap();
        assert_eq!(frac[0], 0xcb); // f64 marker
    }

    #[test]
    fn dynamic_positions_carry_their_type() {
        let inner = Value::object(
            [("kind".to_string(), Value::string("ConfigMap"))]
                .into_iter()
                .collect(),
        );
        let bytes = encode(&inner, &Type::Dynamic).unwrap();
        let decoded = decode(&bytes, &Type::Dynamic).unwrap();
        assert_eq!(decoded, inner);
        assert_eq!(encode(&decoded, &Type::Dynamic).unwrap(), bytes);
    }

    #[test]
    fn dynamic_null_and_unknown_need_no_refined_type() {
        let null_bytes = encode(&Value::null(Type::Dynamic), &Type::Dynamic).unwrap();
        assert_eq!(null_bytes, vec![0xc0]);
        assert!(decode(&null_bytes, &Type::Dynamic).unwrap().is_null());

        let unk_bytes = encode(&Value::unknown(Type::Dynamic), &Type::Dynamic).unwrap();
        assert!(decode(&unk_bytes, &Type::Dynamic).unwrap().is_unknown());
    }

    #[test]
    fn empty_collections_round_trip() {
        let ty = Type::List(Box::new(Type::String));
        let bytes = encode(&Value::empty_list(Type::String), &ty).unwrap();
        let decoded = decode(&bytes, &ty).unwrap();
        assert_eq!(decoded.elements().unwrap().len(), 0);
        assert_eq!(decoded.ty(), &ty);
    }

    #[test]
    fn object_with_wrong_attribute_count_fails() {
        let ty = server_type();
        let partial = Type::Object(
            [("name".to_string(), Type::String)].into_iter().collect(),
        );
        let bytes = encode(
            &Value::object(
                [("name".to_string(), Value::string("web"))]
                    .into_iter()
                    .collect(),
            ),
            &partial,
        )
        .unwrap();
        assert!(decode(&bytes, &ty).is_err());
    }
}
