//! Parsing of type names as they appear in payloads and context URLs.
//!
//! Payload type names may carry a leading `#`, use the short form of a
//! primitive name (`#Int32` for `Edm.Int32`) and wrap an item type in
//! `Collection(...)`.

use super::PrimitiveKind;

/// A payload type name split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeName<'a> {
    /// An `Edm` primitive, short or qualified.
    Primitive(PrimitiveKind),
    /// `Edm.Untyped`
    Untyped,
    /// Any other qualified name.
    Named(&'a str),
    /// `Collection(...)`
    Collection(Box<TypeName<'a>>),
}

impl<'a> TypeName<'a> {
    /// Parses a type name, tolerating a leading `#`.
    #[must_use]
    pub fn parse(raw: &'a str) -> Self {
        let name = strip_hash(raw.trim());
        if let Some(item) = collection_item(name) {
            return TypeName::Collection(Box::new(TypeName::parse(item)));
        }
        if name == "Edm.Untyped" || name == "Untyped" {
            return TypeName::Untyped;
        }
        match PrimitiveKind::from_name(name) {
            Some(kind) => TypeName::Primitive(kind),
            None => TypeName::Named(name),
        }
    }

    /// Whether this is `Collection(...)`.
    #[must_use]
    pub fn is_collection(&self) -> bool {
        matches!(self, TypeName::Collection(..))
    }

    /// The fully qualified spelling, without a `#`.
    #[must_use]
    pub fn qualified(&self) -> String {
        match self {
            TypeName::Primitive(kind) => kind.name().to_owned(),
            TypeName::Untyped => "Edm.Untyped".to_owned(),
            TypeName::Named(name) => (*name).to_owned(),
            TypeName::Collection(item) => format!("Collection({})", item.qualified()),
        }
    }
}

fn strip_hash(name: &str) -> &str {
    name.strip_prefix('#').unwrap_or(name)
}

/// Returns `X` for `Collection(X)`.
#[must_use]
pub fn collection_item(name: &str) -> Option<&str> {
    name.strip_prefix("Collection(")
        .and_then(|rest| rest.strip_suffix(')'))
        .map(str::trim)
}

/// Normalises a payload type name to its qualified spelling.
#[must_use]
pub fn qualify(raw: &str) -> String {
    TypeName::parse(raw).qualified()
}
