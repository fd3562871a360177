//! The entity data model consulted by the reader.
//!
//! The reader only needs lookups, expressed by the [`Model`] trait. [`EdmModel`]
//! is a small in-memory implementation assembled with builder methods:
//!
//! ```
//! use jsonlight::{EdmModel, Model, PrimitiveKind, StructuredType, TypeRef};
//!
//! let model = EdmModel::new()
//!     .with_type(
//!         StructuredType::entity("NS.Customer")
//!             .key("Id")
//!             .property("Id", TypeRef::primitive(PrimitiveKind::Int32).not_null())
//!             .navigation("Orders", "NS.Order", true),
//!     )
//!     .with_type(StructuredType::entity("NS.Order").key("Id"))
//!     .with_entity_set("Customers", "NS.Customer");
//! assert!(model.navigation_source("Customers").is_some());
//! ```

mod type_name;

use std::collections::BTreeMap;

pub use type_name::{TypeName, collection_item, qualify};

/// The Edm primitive types the reader converts.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    /// `Edm.Boolean`
    Boolean,
    /// `Edm.Byte`
    Byte,
    /// `Edm.SByte`
    SByte,
    /// `Edm.Int16`
    Int16,
    /// `Edm.Int32`
    Int32,
    /// `Edm.Int64`, quoted in IEEE754 compatible mode.
    Int64,
    /// `Edm.Single`
    Single,
    /// `Edm.Double`
    Double,
    /// `Edm.Decimal`, quoted in IEEE754 compatible mode.
    Decimal,
    /// `Edm.String`
    String,
    /// `Edm.Guid`
    Guid,
    /// `Edm.Date`
    Date,
    /// `Edm.DateTimeOffset`
    DateTimeOffset,
    /// `Edm.TimeOfDay`
    TimeOfDay,
    /// `Edm.Duration`
    Duration,
    /// `Edm.Binary`, base64 in payloads.
    Binary,
    /// `Edm.Stream`
    Stream,
}

impl PrimitiveKind {
    const ALL: [PrimitiveKind; 17] = [
        Self::Boolean,
        Self::Byte,
        Self::SByte,
        Self::Int16,
        Self::Int32,
        Self::Int64,
        Self::Single,
        Self::Double,
        Self::Decimal,
        Self::String,
        Self::Guid,
        Self::Date,
        Self::DateTimeOffset,
        Self::TimeOfDay,
        Self::Duration,
        Self::Binary,
        Self::Stream,
    ];

    /// The qualified name, e.g. `Edm.Int32`.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Boolean => "Edm.Boolean",
            Self::Byte => "Edm.Byte",
            Self::SByte => "Edm.SByte",
            Self::Int16 => "Edm.Int16",
            Self::Int32 => "Edm.Int32",
            Self::Int64 => "Edm.Int64",
            Self::Single => "Edm.Single",
            Self::Double => "Edm.Double",
            Self::Decimal => "Edm.Decimal",
            Self::String => "Edm.String",
            Self::Guid => "Edm.Guid",
            Self::Date => "Edm.Date",
            Self::DateTimeOffset => "Edm.DateTimeOffset",
            Self::TimeOfDay => "Edm.TimeOfDay",
            Self::Duration => "Edm.Duration",
            Self::Binary => "Edm.Binary",
            Self::Stream => "Edm.Stream",
        }
    }

    /// Accepts both `Edm.Int32` and the short `Int32`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let short = name.strip_prefix("Edm.").unwrap_or(name);
        Self::ALL
            .into_iter()
            .find(|kind| &kind.name()["Edm.".len()..] == short)
    }

    /// Types whose JSON form depends on IEEE754 compatibility.
    #[must_use]
    pub fn is_ieee754_sensitive(self) -> bool {
        matches!(self, Self::Int64 | Self::Decimal)
    }
}

/// What a value is expected to be.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    /// A primitive type.
    Primitive(PrimitiveKind),
    /// An enum type, by qualified name.
    Enum(String),
    /// A complex type, by qualified name.
    Complex(String),
    /// An entity type, by qualified name.
    Entity(String),
    /// A collection of the boxed item type.
    Collection(Box<TypeRef>),
    /// A type definition, by qualified name.
    TypeDefinition(String),
    /// `Edm.Untyped`, or a structured value of an unknown type. The name is
    /// kept when the payload supplied one.
    Untyped(Option<String>),
}

/// A type with its nullability.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    /// The type.
    pub kind: TypeKind,
    /// Whether `null` is allowed. Defaults to `true`.
    pub nullable: bool,
}

impl TypeRef {
    /// A nullable reference to `kind`.
    #[must_use]
    pub fn new(kind: TypeKind) -> Self {
        Self { kind, nullable: true }
    }

    /// A nullable primitive type.
    #[must_use]
    pub fn primitive(kind: PrimitiveKind) -> Self {
        Self::new(TypeKind::Primitive(kind))
    }

    /// A nullable complex type.
    #[must_use]
    pub fn complex(name: &str) -> Self {
        Self::new(TypeKind::Complex(name.to_owned()))
    }

    /// A nullable entity type.
    #[must_use]
    pub fn entity(name: &str) -> Self {
        Self::new(TypeKind::Entity(name.to_owned()))
    }

    /// A nullable enum type.
    #[must_use]
    pub fn enumeration(name: &str) -> Self {
        Self::new(TypeKind::Enum(name.to_owned()))
    }

    /// A nullable type definition.
    #[must_use]
    pub fn type_definition(name: &str) -> Self {
        Self::new(TypeKind::TypeDefinition(name.to_owned()))
    }

    /// `Edm.Untyped`
    #[must_use]
    pub fn untyped() -> Self {
        Self::new(TypeKind::Untyped(None))
    }

    /// `Collection(item)`
    #[must_use]
    pub fn collection(item: TypeRef) -> Self {
        Self::new(TypeKind::Collection(Box::new(item)))
    }

    /// Disallows `null`.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Whether this is a collection type.
    #[must_use]
    pub fn is_collection(&self) -> bool {
        matches!(self.kind, TypeKind::Collection(..))
    }

    /// Whether this is a complex or entity type.
    #[must_use]
    pub fn is_structured(&self) -> bool {
        matches!(self.kind, TypeKind::Complex(..) | TypeKind::Entity(..))
    }

    /// Whether this is `Edm.Untyped` or an unknown structured type.
    #[must_use]
    pub fn is_untyped(&self) -> bool {
        matches!(self.kind, TypeKind::Untyped(..))
    }

    /// The item type of a collection.
    #[must_use]
    pub fn item_type(&self) -> Option<&TypeRef> {
        match &self.kind {
            TypeKind::Collection(item) => Some(item),
            _ => None,
        }
    }

    /// The qualified type name, `None` for an anonymous untyped value.
    #[must_use]
    pub fn name(&self) -> Option<String> {
        Some(match &self.kind {
            TypeKind::Primitive(kind) => kind.name().to_owned(),
            TypeKind::Enum(name)
            | TypeKind::Complex(name)
            | TypeKind::Entity(name)
            | TypeKind::TypeDefinition(name) => name.clone(),
            TypeKind::Collection(item) => {
                format!("Collection({})", item.name().as_deref().unwrap_or("Edm.Untyped"))
            }
            TypeKind::Untyped(name) => return name.clone(),
        })
    }

    /// Like [`TypeRef::name`], spelling anonymous values `Edm.Untyped`.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name().unwrap_or_else(|| "Edm.Untyped".to_owned())
    }
}

/// Entity or complex.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuredKind {
    /// Has a key and an identity.
    Entity,
    /// A value without identity.
    Complex,
}

/// A primitive, enum, complex or collection property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralProperty {
    /// The property name.
    pub name: String,
    /// Its type.
    pub type_ref: TypeRef,
}

/// A property pointing at related entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationProperty {
    /// The property name.
    pub name: String,
    /// Qualified name of the target entity type.
    pub target_type: String,
    /// Whether it points at many entities.
    pub is_collection: bool,
    /// Whether a single target may be `null`.
    pub nullable: bool,
}

/// An entity or complex type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredType {
    /// Qualified name.
    pub name: String,
    /// Entity or complex.
    pub kind: StructuredKind,
    /// Qualified name of the base type.
    pub base_type: Option<String>,
    /// Whether undeclared properties are allowed.
    pub is_open: bool,
    /// Key property names. Empty for complex types and derived entity types.
    pub key: Vec<String>,
    /// Declared structural properties.
    pub properties: Vec<StructuralProperty>,
    /// Declared navigation properties.
    pub navigation_properties: Vec<NavigationProperty>,
}

impl StructuredType {
    fn new(name: &str, kind: StructuredKind) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            base_type: None,
            is_open: false,
            key: Vec::new(),
            properties: Vec::new(),
            navigation_properties: Vec::new(),
        }
    }

    /// A closed entity type with no properties.
    #[must_use]
    pub fn entity(name: &str) -> Self {
        Self::new(name, StructuredKind::Entity)
    }

    /// A closed complex type with no properties.
    #[must_use]
    pub fn complex(name: &str) -> Self {
        Self::new(name, StructuredKind::Complex)
    }

    /// Derives from `base_type`.
    #[must_use]
    pub fn base(mut self, base_type: &str) -> Self {
        self.base_type = Some(base_type.to_owned());
        self
    }

    /// Allows undeclared properties.
    #[must_use]
    pub fn open(mut self) -> Self {
        self.is_open = true;
        self
    }

    /// Adds `name` to the key.
    #[must_use]
    pub fn key(mut self, name: &str) -> Self {
        self.key.push(name.to_owned());
        self
    }

    /// Declares a structural property.
    #[must_use]
    pub fn property(mut self, name: &str, type_ref: TypeRef) -> Self {
        self.properties.push(StructuralProperty {
            name: name.to_owned(),
            type_ref,
        });
        self
    }

    /// Declares a nullable navigation property.
    #[must_use]
    pub fn navigation(mut self, name: &str, target_type: &str, is_collection: bool) -> Self {
        self.navigation_properties.push(NavigationProperty {
            name: name.to_owned(),
            target_type: target_type.to_owned(),
            is_collection,
            nullable: true,
        });
        self
    }

    /// A nullable reference to this type.
    #[must_use]
    pub fn type_ref(&self) -> TypeRef {
        match self.kind {
            StructuredKind::Entity => TypeRef::entity(&self.name),
            StructuredKind::Complex => TypeRef::complex(&self.name),
        }
    }
}

/// An enum type and its members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    /// Qualified name.
    pub name: String,
    /// Whether values may combine members.
    pub is_flags: bool,
    /// Member names and values.
    pub members: Vec<(String, i64)>,
}

impl EnumType {
    /// An enum whose members take the values 0, 1, 2, ... in order.
    #[must_use]
    pub fn new(name: &str, members: &[&str]) -> Self {
        Self {
            name: name.to_owned(),
            is_flags: false,
            members: members
                .iter()
                .zip(0_i64..)
                .map(|(m, v)| ((*m).to_owned(), v))
                .collect(),
        }
    }

    /// Marks the enum as a flags enum.
    #[must_use]
    pub fn flags(mut self) -> Self {
        self.is_flags = true;
        self
    }

    /// Whether `value` names a member, or a comma separated member list for
    /// flags enums. Integral values are accepted as-is.
    #[must_use]
    pub fn accepts(&self, value: &str) -> bool {
        let is_member = |v: &str| {
            let v = v.trim();
            v.parse::<i64>().is_ok() || self.members.iter().any(|(m, _)| m == v)
        };
        if self.is_flags {
            value.split(',').all(is_member)
        } else {
            is_member(value)
        }
    }
}

/// A named alias over a primitive type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDefinition {
    /// Qualified name.
    pub name: String,
    /// The type values are converted as.
    pub underlying: PrimitiveKind,
}

/// Entity set or singleton.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationSourceKind {
    /// A set of entities.
    EntitySet,
    /// A single entity.
    Singleton,
}

/// An entity set or singleton with its navigation property bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationSource {
    /// The name used in context URLs.
    pub name: String,
    /// Set or singleton.
    pub kind: NavigationSourceKind,
    /// Qualified name of the entity type.
    pub entity_type: String,
    /// Navigation property paths bound to other navigation sources.
    pub bindings: BTreeMap<String, String>,
}

/// A property found by name on a structured type or one of its bases.
#[derive(Debug, Clone, Copy)]
pub enum PropertyRef<'a> {
    /// A structural property.
    Structural(&'a StructuralProperty),
    /// A navigation property.
    Navigation(&'a NavigationProperty),
}

/// Lookups the reader performs against a schema.
pub trait Model {
    /// The entity or complex type called `name`.
    fn structured_type(&self, name: &str) -> Option<&StructuredType>;

    /// The enum type called `name`.
    fn enum_type(&self, name: &str) -> Option<&EnumType>;

    /// The type definition called `name`.
    fn type_definition(&self, name: &str) -> Option<&TypeDefinition>;

    /// The entity set or singleton called `name`.
    fn navigation_source(&self, name: &str) -> Option<&NavigationSource>;

    /// The navigation source reached from `source` through `path`.
    fn navigation_target(&self, source: &str, path: &str) -> Option<&NavigationSource> {
        let target = self.navigation_source(source)?.bindings.get(path)?;
        self.navigation_source(target)
    }

    /// Finds a property on `type_name` or its base types.
    fn find_property(&self, type_name: &str, name: &str) -> Option<PropertyRef<'_>> {
        let mut current = self.structured_type(type_name);
        while let Some(ty) = current {
            if let Some(p) = ty.properties.iter().find(|p| p.name == name) {
                return Some(PropertyRef::Structural(p));
            }
            if let Some(n) = ty.navigation_properties.iter().find(|n| n.name == name) {
                return Some(PropertyRef::Navigation(n));
            }
            current = ty.base_type.as_deref().and_then(|b| self.structured_type(b));
        }
        None
    }

    /// Navigation properties of `type_name`, base types first.
    fn navigation_properties(&self, type_name: &str) -> Vec<&NavigationProperty> {
        let mut chain = Vec::new();
        let mut current = self.structured_type(type_name);
        while let Some(ty) = current {
            chain.push(ty);
            current = ty.base_type.as_deref().and_then(|b| self.structured_type(b));
        }
        chain
            .into_iter()
            .rev()
            .flat_map(|ty| ty.navigation_properties.iter())
            .collect()
    }

    /// Key property names, taken from the first type in the base chain that
    /// declares a key.
    fn key_properties(&self, type_name: &str) -> Vec<String> {
        let mut current = self.structured_type(type_name);
        while let Some(ty) = current {
            if !ty.key.is_empty() {
                return ty.key.clone();
            }
            current = ty.base_type.as_deref().and_then(|b| self.structured_type(b));
        }
        Vec::new()
    }

    /// Whether a value of type `derived` may stand where `base` is expected.
    fn is_assignable(&self, base: &str, derived: &str) -> bool {
        let mut current = Some(derived);
        while let Some(name) = current {
            if name == base {
                return true;
            }
            current = self.structured_type(name).and_then(|t| t.base_type.as_deref());
        }
        false
    }

    /// Resolves a payload type name against the model. `None` when the name
    /// is neither primitive nor defined in the model.
    fn resolve_type(&self, raw: &str) -> Option<TypeRef> {
        self.resolve_parsed(&TypeName::parse(raw))
    }

    #[doc(hidden)]
    fn resolve_parsed(&self, name: &TypeName<'_>) -> Option<TypeRef> {
        match name {
            TypeName::Primitive(kind) => Some(TypeRef::primitive(*kind)),
            TypeName::Untyped => Some(TypeRef::untyped()),
            TypeName::Collection(item) => self.resolve_parsed(item).map(TypeRef::collection),
            TypeName::Named(name) => {
                if let Some(ty) = self.structured_type(name) {
                    Some(ty.type_ref())
                } else if self.enum_type(name).is_some() {
                    Some(TypeRef::enumeration(name))
                } else if self.type_definition(name).is_some() {
                    Some(TypeRef::type_definition(name))
                } else {
                    None
                }
            }
        }
    }
}

/// An in-memory [`Model`].
#[derive(Debug, Clone, Default)]
pub struct EdmModel {
    types: BTreeMap<String, StructuredType>,
    enums: BTreeMap<String, EnumType>,
    type_definitions: BTreeMap<String, TypeDefinition>,
    sources: BTreeMap<String, NavigationSource>,
}

impl EdmModel {
    /// An empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entity or complex type.
    #[must_use]
    pub fn with_type(mut self, ty: StructuredType) -> Self {
        self.types.insert(ty.name.clone(), ty);
        self
    }

    /// Adds an enum type.
    #[must_use]
    pub fn with_enum(mut self, ty: EnumType) -> Self {
        self.enums.insert(ty.name.clone(), ty);
        self
    }

    /// Adds a type definition over a primitive type.
    #[must_use]
    pub fn with_type_definition(mut self, name: &str, underlying: PrimitiveKind) -> Self {
        self.type_definitions.insert(
            name.to_owned(),
            TypeDefinition {
                name: name.to_owned(),
                underlying,
            },
        );
        self
    }

    fn with_source(mut self, name: &str, kind: NavigationSourceKind, entity_type: &str) -> Self {
        self.sources.insert(
            name.to_owned(),
            NavigationSource {
                name: name.to_owned(),
                kind,
                entity_type: entity_type.to_owned(),
                bindings: BTreeMap::new(),
            },
        );
        self
    }

    /// Adds an entity set of `entity_type`.
    #[must_use]
    pub fn with_entity_set(self, name: &str, entity_type: &str) -> Self {
        self.with_source(name, NavigationSourceKind::EntitySet, entity_type)
    }

    /// Adds a singleton of `entity_type`.
    #[must_use]
    pub fn with_singleton(self, name: &str, entity_type: &str) -> Self {
        self.with_source(name, NavigationSourceKind::Singleton, entity_type)
    }

    /// Binds navigation property `path` of `source` to the source `target`.
    /// Ignored when `source` has not been added.
    #[must_use]
    pub fn with_binding(mut self, source: &str, path: &str, target: &str) -> Self {
        if let Some(s) = self.sources.get_mut(source) {
            s.bindings.insert(path.to_owned(), target.to_owned());
        }
        self
    }
}

impl Model for EdmModel {
    fn structured_type(&self, name: &str) -> Option<&StructuredType> {
        self.types.get(name)
    }

    fn enum_type(&self, name: &str) -> Option<&EnumType> {
        self.enums.get(name)
    }

    fn type_definition(&self, name: &str) -> Option<&TypeDefinition> {
        self.type_definitions.get(name)
    }

    fn navigation_source(&self, name: &str) -> Option<&NavigationSource> {
        self.sources.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::{EdmModel, EnumType, Model, PrimitiveKind, PropertyRef, StructuredType, TypeKind, TypeRef};

    fn model() -> EdmModel {
        EdmModel::new()
            .with_type(
                StructuredType::entity("NS.Person")
                    .key("Id")
                    .property("Id", TypeRef::primitive(PrimitiveKind::Int32).not_null())
                    .navigation("Friends", "NS.Person", true),
            )
            .with_type(
                StructuredType::entity("NS.Employee")
                    .base("NS.Person")
                    .navigation("Manager", "NS.Employee", false),
            )
            .with_enum(EnumType::new("NS.Color", &["Red", "Green"]).flags())
            .with_entity_set("People", "NS.Person")
            .with_binding("People", "Friends", "People")
    }

    #[test]
    fn base_chain_lookups() {
        let m = model();
        assert!(matches!(
            m.find_property("NS.Employee", "Id"),
            Some(PropertyRef::Structural(p)) if p.type_ref.kind == TypeKind::Primitive(PrimitiveKind::Int32)
        ));
        let navs: Vec<_> = m
            .navigation_properties("NS.Employee")
            .into_iter()
            .map(|n| n.name.as_str())
            .collect();
        assert_eq!(navs, ["Friends", "Manager"]);
        assert_eq!(m.key_properties("NS.Employee"), ["Id"]);
        assert!(m.is_assignable("NS.Person", "NS.Employee"));
        assert!(!m.is_assignable("NS.Employee", "NS.Person"));
        assert_eq!(m.navigation_target("People", "Friends").map(|s| s.name.as_str()), Some("People"));
    }

    #[test]
    fn resolves_payload_type_names() {
        let m = model();
        assert_eq!(m.resolve_type("#Int64"), Some(TypeRef::primitive(PrimitiveKind::Int64)));
        assert_eq!(
            m.resolve_type("#Collection(NS.Color)"),
            Some(TypeRef::collection(TypeRef::enumeration("NS.Color")))
        );
        assert_eq!(m.resolve_type("NS.Unknown"), None);
        assert_eq!(
            TypeRef::collection(TypeRef::untyped()).display_name(),
            "Collection(Edm.Untyped)"
        );
    }

    #[test]
    fn flags_enum_accepts_member_lists() {
        let m = model();
        let color = m.enum_type("NS.Color").unwrap();
        assert!(color.accepts("Red, Green"));
        assert!(color.accepts("3"));
        assert!(!color.accepts("Blue"));
    }
}
