//! The items a reader hands out.
//!
//! Items are plain values. The reader keeps the current one and replaces it
//! on the next `read`; callers clone what they need to keep.

use crate::{primitive::Primitive, reader::ReaderState};

/// A materialized value.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum ODataValue {
    /// JSON `null`.
    Null,
    /// A primitive value.
    Primitive(Primitive),
    /// A member of an enum type, kept as its payload text.
    Enum {
        /// Qualified name of the enum type.
        type_name: String,
        /// Member name or flags list as written.
        value: String,
    },
    /// A value of a type definition, converted as its underlying type.
    Defined {
        /// Qualified name of the type definition.
        type_name: String,
        /// The converted value.
        value: Primitive,
    },
    /// A complex or untyped structured value read inline.
    Resource(Box<Resource>),
    /// A collection of primitive, enum or complex values.
    Collection {
        /// `Collection(...)` type name, when known.
        type_name: Option<String>,
        /// The items in payload order.
        items: Vec<ODataValue>,
    },
    /// Raw JSON text of an untyped value.
    Untyped(String),
}

impl ODataValue {
    /// Whether this is [`ODataValue::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The qualified type name, where the value carries one.
    #[must_use]
    pub fn type_name(&self) -> Option<String> {
        match self {
            ODataValue::Null | ODataValue::Untyped(_) => None,
            ODataValue::Primitive(p) => Some(p.kind().name().to_owned()),
            ODataValue::Enum { type_name, .. } | ODataValue::Defined { type_name, .. } => Some(type_name.clone()),
            ODataValue::Resource(r) => r.type_name.clone(),
            ODataValue::Collection { type_name, .. } => type_name.clone(),
        }
    }
}

impl From<Primitive> for ODataValue {
    fn from(p: Primitive) -> Self {
        Self::Primitive(p)
    }
}

/// An annotation on an object or a property.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceAnnotation {
    /// Term name without the leading `@`, e.g. `ns.note`.
    pub name: String,
    /// The value.
    pub value: ODataValue,
}

/// A structural property of a resource.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    /// The property name.
    pub name: String,
    /// The value.
    pub value: ODataValue,
    /// Custom `name@term` annotations.
    pub annotations: Vec<InstanceAnnotation>,
}

/// Media resource links of a media entity or a stream property.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamReference {
    /// `odata.mediaEditLink`
    pub edit_link: Option<String>,
    /// `odata.mediaReadLink`
    pub read_link: Option<String>,
    /// `odata.mediaContentType`
    pub content_type: Option<String>,
    /// `odata.mediaEtag`
    pub etag: Option<String>,
}

impl StreamReference {
    /// Whether no link or metadata was given.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Marks a resource of a delta payload as deleted.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Removed {
    /// `changed` or `deleted`, when given.
    pub reason: Option<String>,
}

/// One entity or complex instance.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resource {
    /// Qualified name of the resolved type.
    pub type_name: Option<String>,
    /// `odata.id`
    pub id: Option<String>,
    /// `odata.etag`
    pub etag: Option<String>,
    /// `odata.editLink`
    pub edit_link: Option<String>,
    /// `odata.readLink`
    pub read_link: Option<String>,
    /// Present on media entities.
    pub media: Option<StreamReference>,
    /// Present on deleted entries of a delta payload.
    pub removed: Option<Removed>,
    /// Primitive, enum and collection properties in payload order.
    pub properties: Vec<Property>,
    /// Custom instance annotations.
    pub instance_annotations: Vec<InstanceAnnotation>,
    /// Advertised actions and functions (`#NS.Action` members).
    pub operations: Vec<String>,
}

impl Resource {
    /// The property called `name`.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// A feed of resources, top-level or nested.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceSet {
    /// Item type of the set.
    pub type_name: Option<String>,
    /// `odata.count`
    pub count: Option<i64>,
    /// `odata.nextLink`. May only be known at the end of the set.
    pub next_link: Option<String>,
    /// `odata.deltaLink`
    pub delta_link: Option<String>,
    /// Whether the context URL ends in `/$delta`.
    pub is_delta: bool,
    /// Custom instance annotations.
    pub instance_annotations: Vec<InstanceAnnotation>,
}

/// A navigation property, or a complex or untyped property read as a
/// nested resource or resource set.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NestedResourceInfo {
    /// The property name.
    pub name: String,
    /// `None` while the cardinality is not known from the model.
    pub is_collection: Option<bool>,
    /// `odata.navigationLink`
    pub url: Option<String>,
    /// `odata.associationLink`
    pub association_link_url: Option<String>,
    /// `odata.count` of the nested set.
    pub count: Option<i64>,
    /// `odata.nextLink` of the nested set.
    pub next_link: Option<String>,
    /// Whether the property is complex rather than a navigation property.
    pub is_complex: bool,
}

/// A related resource bound by URL in a request (`odata.bind`).
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityReferenceLink {
    /// The bound URL as written.
    pub url: String,
}

/// The item attached to the reader's current state.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Item {
    /// Before the first read, after the last one, or after an error.
    #[default]
    None,
    /// The current resource set.
    ResourceSet(ResourceSet),
    /// `None` for a `null` resource.
    Resource(Option<Resource>),
    /// The current nested resource info.
    NestedResourceInfo(NestedResourceInfo),
    /// A top-level primitive, enum or collection value.
    Primitive(ODataValue),
    /// The current bind link.
    EntityReferenceLink(EntityReferenceLink),
}

/// One observable step of a reader: the state it entered and its item.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum ReaderEvent {
    /// A resource set begins. Links given after its items are missing.
    ResourceSetStart(ResourceSet),
    /// A resource set ends, with every link and annotation.
    ResourceSetEnd(ResourceSet),
    /// A resource begins. Properties read so far are filled in.
    ResourceStart(Option<Resource>),
    /// A resource ends, with all its properties.
    ResourceEnd(Option<Resource>),
    /// A nested resource or set follows.
    NestedResourceInfoStart(NestedResourceInfo),
    /// The nested content is done.
    NestedResourceInfoEnd(NestedResourceInfo),
    /// A top-level value.
    Primitive(ODataValue),
    /// An `odata.bind` URL.
    EntityReferenceLink(EntityReferenceLink),
}

impl ReaderEvent {
    /// Pairs a state with its item. `None` for `Start`, `Completed`,
    /// `Exception`, or a state whose item has the wrong shape.
    #[must_use]
    pub fn new(state: ReaderState, item: &Item) -> Option<Self> {
        Some(match (state, item) {
            (ReaderState::ResourceSetStart, Item::ResourceSet(s)) => Self::ResourceSetStart(s.clone()),
            (ReaderState::ResourceSetEnd, Item::ResourceSet(s)) => Self::ResourceSetEnd(s.clone()),
            (ReaderState::ResourceStart, Item::Resource(r)) => Self::ResourceStart(r.clone()),
            (ReaderState::ResourceEnd, Item::Resource(r)) => Self::ResourceEnd(r.clone()),
            (ReaderState::NestedResourceInfoStart, Item::NestedResourceInfo(n)) => {
                Self::NestedResourceInfoStart(n.clone())
            }
            (ReaderState::NestedResourceInfoEnd, Item::NestedResourceInfo(n)) => Self::NestedResourceInfoEnd(n.clone()),
            (ReaderState::Primitive, Item::Primitive(v)) => Self::Primitive(v.clone()),
            (ReaderState::EntityReferenceLink, Item::EntityReferenceLink(l)) => Self::EntityReferenceLink(l.clone()),
            _ => return None,
        })
    }
}
