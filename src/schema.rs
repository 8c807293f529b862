//! Schema model
//!
//! A schema describes one block of configuration or state: a versioned,
//! flat list of typed attributes. The block's implied type drives every
//! wire decode and encode for that block.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::path::{Path, PathStep};
use crate::value::Type;

/// Versioned description of a provider, resource, or data-source block.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub version: i64,
    pub block: Block,
}

/// A flat attribute block.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub version: i64,
    pub attributes: Vec<Attribute>,
}

impl Block {
    pub fn lookup(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|att| att.name == name)
    }

    /// Resolve a value path to the attribute it falls under. Attributes are
    /// not nested, so only the first step matters; it must be a `GetAttr`.
    pub fn apply_path(&self, path: &Path) -> Result<Option<&Attribute>> {
        let first = path
            .steps
            .first()
            .ok_or_else(|| Error::Path("path length must be at least 1".to_string()))?;
        match first {
            PathStep::GetAttr(name) => Ok(self.lookup(name)),
            PathStep::Index(_) => Err(Error::Path(
                "first path step into a block must be an attribute".to_string(),
            )),
        }
    }

    /// `Object({att.name -> att.type})` over all attributes.
    pub fn implied_type(&self) -> Type {
        let attrs: BTreeMap<String, Type> = self
            .attributes
            .iter()
            .map(|att| (att.name.clone(), att.ty.clone()))
            .collect();
        Type::Object(attrs)
    }
}

/// A named, typed field in a block.
///
/// Exactly one of `required`, `optional`, `computed`, or the combination
/// `optional` + `computed` must hold; [`Attribute::validate`] enforces this
/// at construction time.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub description: String,
    pub ty: Type,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub sensitive: bool,
    pub force_new: bool,
}

impl Attribute {
    /// An argument is user-provided: required or optional.
    pub fn is_argument(&self) -> bool {
        self.required || self.optional
    }

    pub fn validate(&self) -> Result<()> {
        if self.required && self.optional {
            return Err(Error::InvalidSchema(format!(
                "attributes cannot be both required and optional: {}",
                self.name
            )));
        }
        if self.required && self.computed {
            return Err(Error::InvalidSchema(format!(
                "attributes cannot be both required and computed: {}",
                self.name
            )));
        }
        if !self.required && !self.optional && !self.computed {
            return Err(Error::InvalidSchema(format!(
                "attributes must be required, optional, or computed: {}",
                self.name
            )));
        }
        if self.force_new && !self.required && !self.optional {
            return Err(Error::InvalidSchema(format!(
                "force new attributes must be required or optional: {}",
                self.name
            )));
        }
        if self.force_new && self.computed {
            return Err(Error::InvalidSchema(format!(
                "force new attributes cannot be computed: {}",
                self.name
            )));
        }
        Ok(())
    }
}
