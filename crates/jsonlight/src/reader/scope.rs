use std::collections::VecDeque;

use super::ReaderState;
use crate::{
    annotations::PropertyAndAnnotationCollector,
    edm::{Model, TypeRef},
    item::{Item, NestedResourceInfo, Resource},
    metadata_builder::MetadataBuilder,
};

/// One frame of the reader's scope stack.
#[derive(Debug, Clone)]
pub(crate) struct Scope {
    pub state: ReaderState,
    pub item: Item,
    pub navigation_source: Option<String>,
    /// Type of the scope's content: the set's item type, the resource type
    /// or the target of a nested link.
    pub expected_type: Option<TypeRef>,
    /// Navigation segments from the payload's navigation source.
    pub path: Vec<String>,
    pub kind: ScopeKind,
}

impl Scope {
    pub(crate) fn new(state: ReaderState, item: Item, kind: ScopeKind) -> Self {
        Self {
            state,
            item,
            navigation_source: None,
            expected_type: None,
            path: Vec::new(),
            kind,
        }
    }

    pub(crate) fn with_context(
        mut self,
        navigation_source: Option<String>,
        expected_type: Option<TypeRef>,
        path: Vec<String>,
    ) -> Self {
        self.navigation_source = navigation_source;
        self.expected_type = expected_type;
        self.path = path;
        self
    }
}

#[derive(Debug, Clone)]
pub(crate) enum ScopeKind {
    Start,
    ResourceSet(Box<SetScope>),
    Resource(Box<ResourceScope>),
    NullResource,
    NestedResourceInfo(Box<NestedScope>),
    Primitive,
    EntityReferenceLink,
    Completed,
}

/// Where resources live, for computing their canonical paths.
#[derive(Debug, Clone, Default)]
pub(crate) struct Container {
    pub path: Option<String>,
    pub single_valued: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct SetScope {
    pub top_level: bool,
    /// Property of the parent resource holding the set; its trailing
    /// annotations describe the set.
    pub owner: Option<String>,
    pub container: Container,
    /// Collector of the top-level object, for the epilogue.
    pub collector: Option<PropertyAndAnnotationCollector>,
}

#[derive(Debug, Clone)]
pub(crate) struct ResourceScope {
    pub resource: Resource,
    /// Structured type properties are looked up on.
    pub type_name: Option<String>,
    /// The type was already taken from a lookahead, so a late
    /// `@odata.type` is fine.
    pub type_peeked: bool,
    pub collector: PropertyAndAnnotationCollector,
    pub builder: Option<MetadataBuilder>,
    /// Found while reading properties, reported next.
    pub pending: Option<NestedScope>,
    /// The reader is on the resource's `}`.
    pub at_end: bool,
}

impl ResourceScope {
    /// Fills in the conventional id and edit link from the key read so far.
    pub(crate) fn complete_metadata(&mut self, model: &dyn Model) {
        let Some(builder) = self.builder.as_mut() else {
            return;
        };
        let key = self
            .type_name
            .as_deref()
            .map(|t| model.key_properties(t))
            .unwrap_or_default();
        builder.complete(&mut self.resource, &key);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NestedContent {
    /// No inline value.
    Deferred,
    /// The reader is on the inline value.
    Inline,
    /// The reader is on the array of a `Nav@delta` member.
    Delta,
    Done,
}

#[derive(Debug, Clone)]
pub(crate) struct NestedScope {
    pub info: NestedResourceInfo,
    pub content: NestedContent,
    /// Type of a single inline value, or the collection type of an inline
    /// set.
    pub target: Option<TypeRef>,
    pub navigation_source: Option<String>,
    pub container: Container,
    pub binds: VecDeque<String>,
    /// Reported for a navigation property, as opposed to a structural one.
    pub is_navigation: bool,
    /// The inline object's type came from a lookahead.
    pub type_peeked: bool,
}

impl NestedScope {
    pub(crate) fn new(info: NestedResourceInfo, content: NestedContent, target: Option<TypeRef>) -> Self {
        Self {
            info,
            content,
            target,
            navigation_source: None,
            container: Container::default(),
            binds: VecDeque::new(),
            is_navigation: false,
            type_peeked: false,
        }
    }
}
