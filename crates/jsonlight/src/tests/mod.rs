mod errors;

use std::sync::Arc;

use crate::{
    EdmModel, MessageKind, ODataValue, Primitive, PrimitiveKind, ReaderEvent, ReaderOptions, ReaderTarget,
    ResourceReader, Result, StructuredType, TypeRef,
};

/// `Foo` is open and has no navigation properties; `Orders` links to `Foo`
/// and `Lines` through bindings.
pub(crate) fn model() -> EdmModel {
    EdmModel::new()
        .with_type(
            StructuredType::entity("NS.Foo")
                .key("Id")
                .property("Id", TypeRef::primitive(PrimitiveKind::Int32).not_null())
                .property("Name", TypeRef::primitive(PrimitiveKind::String))
                .open(),
        )
        .with_type(
            StructuredType::complex("NS.Address")
                .property("City", TypeRef::primitive(PrimitiveKind::String))
                .property("Zip", TypeRef::primitive(PrimitiveKind::Int32).not_null()),
        )
        .with_type(
            StructuredType::entity("NS.Order")
                .key("Id")
                .property("Id", TypeRef::primitive(PrimitiveKind::Int32).not_null())
                .property("ShipTo", TypeRef::complex("NS.Address"))
                .property("Notes", TypeRef::collection(TypeRef::primitive(PrimitiveKind::String)))
                .navigation("Customer", "NS.Foo", false)
                .navigation("Lines", "NS.Line", true),
        )
        .with_type(
            StructuredType::entity("NS.Line")
                .key("No")
                .property("No", TypeRef::primitive(PrimitiveKind::Int32).not_null()),
        )
        .with_entity_set("Foo", "NS.Foo")
        .with_entity_set("Orders", "NS.Order")
        .with_entity_set("Lines", "NS.Line")
        .with_singleton("Me", "NS.Foo")
        .with_binding("Orders", "Customer", "Foo")
        .with_binding("Orders", "Lines", "Lines")
}

pub(crate) fn read_all(json: &str, target: ReaderTarget, options: ReaderOptions) -> Result<Vec<ReaderEvent>> {
    ResourceReader::from_str(json, Arc::new(model()), target, options).collect()
}

pub(crate) fn streaming() -> ReaderOptions {
    ReaderOptions {
        enable_reordering: false,
        ..ReaderOptions::default()
    }
}

pub(crate) fn request() -> ReaderOptions {
    ReaderOptions {
        message_kind: MessageKind::Request,
        ..ReaderOptions::default()
    }
}

pub(crate) fn kinds(events: &[ReaderEvent]) -> Vec<&'static str> {
    events
        .iter()
        .map(|e| match e {
            ReaderEvent::ResourceSetStart(_) => "ResourceSetStart",
            ReaderEvent::ResourceSetEnd(_) => "ResourceSetEnd",
            ReaderEvent::ResourceStart(_) => "ResourceStart",
            ReaderEvent::ResourceEnd(_) => "ResourceEnd",
            ReaderEvent::NestedResourceInfoStart(_) => "NestedResourceInfoStart",
            ReaderEvent::NestedResourceInfoEnd(_) => "NestedResourceInfoEnd",
            ReaderEvent::Primitive(_) => "Primitive",
            ReaderEvent::EntityReferenceLink(_) => "EntityReferenceLink",
        })
        .collect()
}

pub(crate) fn int(n: i32) -> ODataValue {
    ODataValue::Primitive(Primitive::Int32(n))
}

pub(crate) fn string(s: &str) -> ODataValue {
    ODataValue::Primitive(Primitive::String(s.to_owned()))
}
