//! Wire message mirrors
//!
//! The transport-facing shapes an RPC front-end serializes: schemas with
//! JSON type descriptors, attribute paths, and diagnostics with integer
//! severity codes. The engine's own types convert into these; the front-end
//! never sees the internal representations.

use serde::{Deserialize, Serialize};

use crate::diag;
use crate::error::{Error, Result};
use crate::path;
use crate::schema;

/// Protocol version exchanged during the plugin handshake.
pub const PROTOCOL_VERSION: u32 = 5;

/// Magic cookie pair gating plugin startup; a host that does not present
/// the value is refused.
pub const MAGIC_COOKIE_KEY: &str = "TF_PLUGIN_MAGIC_COOKIE";
pub const MAGIC_COOKIE_VALUE: &str =
    "d602bf8f470bc67ca7faa0386276bbdd4330efaf76d1a219cb4d6991ca9872b2";

/// A tagged value body: msgpack is authoritative, JSON optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DynamicValue {
    pub msgpack: Vec<u8>,
    pub json: Vec<u8>,
}

impl DynamicValue {
    pub fn msgpack(bytes: Vec<u8>) -> Self {
        Self {
            msgpack: bytes,
            json: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub version: i64,
    pub block: Block,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub version: i64,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    /// JSON type descriptor bytes, e.g. `"string"` or `["list","string"]`.
    pub r#type: Vec<u8>,
    pub description: String,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub sensitive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributePath {
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Step {
    AttributeName(String),
    ElementKeyString(String),
    ElementKeyInt(i64),
}

/// Severity codes on the wire: ERROR=1, WARNING=2.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: i32,
    pub summary: String,
    pub detail: String,
    pub attribute: Option<AttributePath>,
}

impl TryFrom<&schema::Attribute> for Attribute {
    type Error = Error;

    fn try_from(att: &schema::Attribute) -> Result<Self> {
        let type_json = serde_json::to_vec(&att.ty.to_json())
            .map_err(|e| Error::Encode(format!("unable to marshal attribute type {}: {e}", att.name)))?;

        let mut computed = att.computed;
        if att.optional && att.ty.is_primitive() {
            // optional primitives stay computable on the wire so provider-side
            // defaults survive the diff; internal classification is unchanged
            computed = true;
        }

        Ok(Attribute {
            name: att.name.clone(),
            r#type: type_json,
            description: att.description.clone(),
            required: att.required,
            optional: att.optional,
            computed,
            sensitive: att.sensitive,
        })
    }
}

impl TryFrom<&schema::Block> for Block {
    type Error = Error;

    fn try_from(block: &schema::Block) -> Result<Self> {
        let attributes = block
            .attributes
            .iter()
            .map(Attribute::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(Block {
            version: block.version,
            attributes,
        })
    }
}

impl TryFrom<&schema::Schema> for Schema {
    type Error = Error;

    fn try_from(s: &schema::Schema) -> Result<Self> {
        Ok(Schema {
            version: s.version,
            block: Block::try_from(&s.block)?,
        })
    }
}

impl TryFrom<&path::PathStep> for Step {
    type Error = Error;

    fn try_from(step: &path::PathStep) -> Result<Self> {
        match step {
            path::PathStep::GetAttr(name) => Ok(Step::AttributeName(name.clone())),
            path::PathStep::Index(key) => {
                if let Some(s) = key.as_str() {
                    return Ok(Step::ElementKeyString(s.to_string()));
                }
                Ok(Step::ElementKeyInt(path::integer_key(key)?))
            }
        }
    }
}

impl TryFrom<&path::Path> for AttributePath {
    type Error = Error;

    fn try_from(p: &path::Path) -> Result<Self> {
        let steps = p
            .steps
            .iter()
            .map(Step::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(AttributePath { steps })
    }
}

impl TryFrom<&diag::Diagnostic> for Diagnostic {
    type Error = Error;

    fn try_from(d: &diag::Diagnostic) -> Result<Self> {
        let attribute = match &d.path {
            Some(p) => Some(AttributePath::try_from(p)?),
            None => None,
        };
        Ok(Diagnostic {
            severity: d.severity as i32,
            summary: d.summary.clone(),
            detail: d.detail.clone(),
            attribute,
        })
    }
}

/// Convert a whole diagnostics sequence for a response body.
pub fn diagnostics(diags: &diag::Diagnostics) -> Result<Vec<Diagnostic>> {
    diags.iter().map(Diagnostic::try_from).collect()
}

/// Convert the replace paths of a plan response.
pub fn attribute_paths(paths: &[path::Path]) -> Result<Vec<AttributePath>> {
    paths.iter().map(AttributePath::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::{Diagnostic as EngineDiag, Diagnostics, Severity};
    use crate::path::Path;
    use crate::value::{Type, Value};

    fn att(name: &str, ty: Type, required: bool, optional: bool, computed: bool) -> schema::Attribute {
        schema::Attribute {
            name: name.to_string(),
            description: String::new(),
            ty,
            required,
            optional,
            computed,
            sensitive: false,
            force_new: false,
        }
    }

    #[test]
    fn severity_codes_match_the_wire() {
        assert_eq!(Severity::Error as i32, 1);
        assert_eq!(Severity::Warning as i32, 2);

        let d = Diagnostic::try_from(&EngineDiag::warning("w", "d")).unwrap();
        assert_eq!(d.severity, 2);
    }

    #[test]
    fn attribute_type_is_a_json_descriptor() {
        let a = Attribute::try_from(&att("tags", Type::Map(Box::new(Type::String)), true, false, false))
            .unwrap();
        assert_eq!(a.r#type, br#"["map","string"]"#.to_vec());
    }

    #[test]
    fn optional_primitives_are_marked_computed_on_the_wire() {
        let a = Attribute::try_from(&att("region", Type::String, false, true, false)).unwrap();
        assert!(a.computed);
        assert!(a.optional);

        // non-primitive optionals keep their declared flag
        let list = Attribute::try_from(&att(
            "tags",
            Type::List(Box::new(Type::String)),
            false,
            true,
            false,
        ))
        .unwrap();
        assert!(!list.computed);

        // required primitives too
        let req = Attribute::try_from(&att("name", Type::String, true, false, false)).unwrap();
        assert!(!req.computed);
    }

    #[test]
    fn path_steps_translate_by_key_type() {
        let p = Path::attr("tags").index_key("env");
        let wire = AttributePath::try_from(&p).unwrap();
        assert_eq!(
            wire.steps,
            vec![
                Step::AttributeName("tags".to_string()),
                Step::ElementKeyString("env".to_string()),
            ]
        );

        let p = Path::attr("ports").index_int(2);
        let wire = AttributePath::try_from(&p).unwrap();
        assert_eq!(wire.steps[1], Step::ElementKeyInt(2));
    }

    #[test]
    fn fractional_index_keys_are_rejected() {
        let p = Path {
            steps: vec![crate::path::PathStep::Index(Value::number_float(1.5))],
        };
        assert!(AttributePath::try_from(&p).is_err());
    }

    #[test]
    fn diagnostics_convert_with_paths() {
        let diags = Diagnostics(vec![
            EngineDiag::error("bad", "detail").with_path(Path::attr("url")),
            EngineDiag::warning("note", ""),
        ]);
        let wire = diagnostics(&diags).unwrap();
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0].severity, 1);
        assert!(wire[0].attribute.is_some());
        assert!(wire[1].attribute.is_none());
    }
}
