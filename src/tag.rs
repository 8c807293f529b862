//! Field annotation parsing
//!
//! Record fields bind to schema attributes through a `tf` annotation: a
//! comma-separated list whose first token is the attribute name (empty for
//! the lower-cased field name, `-` to omit the field) followed by flag
//! tokens. The full annotation syntax mirrors struct tags — space-separated
//! `key:"value"` pairs — so tooling that reads annotations off source
//! records can hand them here verbatim; a tag without a `tf` key omits the
//! field.

use crate::error::{Error, Result};
use crate::schema::Attribute;
use crate::value::Type;

const TAG_KEY: &str = "tf";

const FLAG_REQUIRED: &str = "required";
const FLAG_OPTIONAL: &str = "optional";
const FLAG_COMPUTED: &str = "computed";
const FLAG_FORCE_NEW: &str = "forcenew";
const FLAG_SENSITIVE: &str = "sensitive";

/// Binding-time metadata parsed from a field annotation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagInfo {
    pub name: String,
    pub omit: bool,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub force_new: bool,
    pub sensitive: bool,
}

impl TagInfo {
    /// Parse a full annotation such as `tf:"url,required"`. An annotation
    /// with no `tf` key omits the field.
    pub fn parse(tag: &str) -> Result<TagInfo> {
        match lookup(tag, TAG_KEY) {
            Some(value) => Self::parse_list(&value),
            None => Ok(TagInfo {
                omit: true,
                ..TagInfo::default()
            }),
        }
    }

    /// Parse the comma list form: `url,required,forcenew`.
    pub fn parse_list(value: &str) -> Result<TagInfo> {
        let mut tokens = value.split(',');
        let name = tokens.next().unwrap_or_default();

        if name == "-" {
            return Ok(TagInfo {
                omit: true,
                ..TagInfo::default()
            });
        }

        let mut info = TagInfo {
            name: name.to_string(),
            ..TagInfo::default()
        };
        for token in tokens {
            match token {
                FLAG_REQUIRED => info.required = true,
                FLAG_OPTIONAL => info.optional = true,
                FLAG_COMPUTED => info.computed = true,
                FLAG_FORCE_NEW => info.force_new = true,
                FLAG_SENSITIVE => info.sensitive = true,
                other => {
                    return Err(Error::InvalidTag(format!(
                        "unknown flag {other:?} in tag {value:?}"
                    )))
                }
            }
        }
        Ok(info)
    }

    /// The attribute name, defaulting to the lower-cased field name.
    pub fn resolved_name(&self, field: &str) -> String {
        if self.name.is_empty() {
            field.to_lowercase()
        } else {
            self.name.clone()
        }
    }

    /// Derive a schema attribute for a field of the given type, enforcing
    /// the flag validity rules.
    pub fn into_attribute(self, field: &str, ty: Type) -> Result<Attribute> {
        let att = Attribute {
            name: self.resolved_name(field),
            description: String::new(),
            ty,
            required: self.required,
            optional: self.optional,
            computed: self.computed,
            sensitive: self.sensitive,
            force_new: self.force_new,
        };
        att.validate()?;
        Ok(att)
    }
}

/// Find the value of one key in a `key:"value"` annotation string.
fn lookup(tag: &str, key: &str) -> Option<String> {
    let mut rest = tag.trim_start();
    while !rest.is_empty() {
        let colon = rest.find(':')?;
        let (k, after) = rest.split_at(colon);
        let k = k.trim();
        let after = after.strip_prefix(':')?;
        let after = after.strip_prefix('"')?;
        let close = after.find('"')?;
        let (value, remainder) = after.split_at(close);
        if k == key {
            return Some(value.to_string());
        }
        rest = remainder.strip_prefix('"')?.trim_start();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> TagInfo {
        TagInfo {
            name: name.to_string(),
            ..TagInfo::default()
        }
    }

    #[test]
    fn parse_cases() {
        for (tag, expected) in [
            (
                r#"tf:"url,required""#,
                TagInfo {
                    required: true,
                    ..named("url")
                },
            ),
            (
                r#"tf:"request_headers,optional""#,
                TagInfo {
                    optional: true,
                    ..named("request_headers")
                },
            ),
            (
                r#"tf:"body,computed""#,
                TagInfo {
                    computed: true,
                    ..named("body")
                },
            ),
            (
                r#"tf:"foo,optional,computed""#,
                TagInfo {
                    optional: true,
                    computed: true,
                    ..named("foo")
                },
            ),
            (
                r#"tf:",required""#,
                TagInfo {
                    required: true,
                    ..named("")
                },
            ),
            (
                r#"json:"url,omitempty""#,
                TagInfo {
                    omit: true,
                    ..TagInfo::default()
                },
            ),
            (
                r#"tf:"-""#,
                TagInfo {
                    omit: true,
                    ..TagInfo::default()
                },
            ),
        ] {
            assert_eq!(TagInfo::parse(tag).unwrap(), expected, "tag: {tag}");
        }
    }

    #[test]
    fn parse_finds_tf_among_other_keys() {
        let info = TagInfo::parse(r#"json:"url,omitempty" tf:"url,required""#).unwrap();
        assert_eq!(info.name, "url");
        assert!(info.required);
    }

    #[test]
    fn unknown_flags_error() {
        assert!(TagInfo::parse_list("url,mandatory").is_err());
    }

    #[test]
    fn resolved_name_defaults_to_lowercased_field() {
        assert_eq!(named("").resolved_name("Url"), "url");
        assert_eq!(named("endpoint").resolved_name("Url"), "endpoint");
    }

    #[test]
    fn into_attribute_enforces_validity() {
        let ok = TagInfo::parse_list("url,required,forcenew")
            .unwrap()
            .into_attribute("url", Type::String)
            .unwrap();
        assert!(ok.required && ok.force_new);
        assert!(ok.is_argument());

        // forcenew on a computed attribute is rejected at derivation time
        assert!(TagInfo::parse_list("id,computed,forcenew")
            .unwrap()
            .into_attribute("id", Type::String)
            .is_err());

        // flagless fields are rejected outright
        assert!(TagInfo::parse_list("bare")
            .unwrap()
            .into_attribute("bare", Type::String)
            .is_err());
    }
}
