//! A streaming, annotation-aware reader for JSON Light payloads.
//!
//! `jsonlight` reads the JSON format of OData services: resource sets,
//! resources, nested navigation links, annotations and typed property
//! values, guided by a schema [`Model`]. Input is consumed incrementally,
//! from a string, a blocking [`std::io::Read`] or a tokio `AsyncRead`, and
//! the payload is reported as a sequence of [`ReaderEvent`]s:
//!
//! ```
//! use std::sync::Arc;
//!
//! use jsonlight::{
//!     EdmModel, ODataValue, Primitive, PrimitiveKind, ReaderEvent, ReaderOptions, ReaderTarget, ResourceReader,
//!     StructuredType, TypeRef,
//! };
//!
//! let model = EdmModel::new()
//!     .with_type(
//!         StructuredType::entity("NS.Customer")
//!             .key("Id")
//!             .property("Id", TypeRef::primitive(PrimitiveKind::Int32))
//!             .property("Name", TypeRef::primitive(PrimitiveKind::String)),
//!     )
//!     .with_entity_set("Customers", "NS.Customer");
//!
//! let json = r#"{"@odata.context":"$metadata#Customers/$entity","Id":7,"Name":"Ada"}"#;
//! let mut reader = ResourceReader::from_str(json, Arc::new(model), ReaderTarget::default(), ReaderOptions::default());
//! let Some(Ok(ReaderEvent::ResourceStart(Some(customer)))) = reader.next() else {
//!     panic!("expected a resource");
//! };
//! assert_eq!(customer.id.as_deref(), Some("Customers(7)"));
//! assert_eq!(
//!     customer.property("Name").map(|p| &p.value),
//!     Some(&ODataValue::Primitive(Primitive::String("Ada".into())))
//! );
//! ```
//!
//! Unless disabled with [`ReaderOptions::enable_reordering`], the members of
//! every object are buffered and reordered so that the annotations a
//! consumer needs (`@odata.context`, `@odata.type`, `@odata.id`, ...) come
//! before the data they describe.

mod annotations;
mod classifier;
mod context_url;
mod edm;
mod error;
mod item;
mod json_reader;
mod materializer;
mod metadata_builder;
mod options;
mod primitive;
mod reader;
mod token;
mod type_resolver;
mod value;

#[cfg(test)]
mod tests;

pub use annotations::{AnnotationValue, MemberName, PropertyAndAnnotationCollector};
pub use context_url::{ContextUrlInfo, ContextUrlKind, ContextUrlParser, DefaultContextUrlParser};
pub use edm::{
    EdmModel, EnumType, Model, NavigationProperty, NavigationSource, NavigationSourceKind, PrimitiveKind,
    PropertyRef, StructuralProperty, StructuredKind, StructuredType, TypeDefinition, TypeKind, TypeRef,
};
pub use error::{ReaderError, Result};
pub use item::{
    EntityReferenceLink, InstanceAnnotation, Item, NestedResourceInfo, ODataValue, Property, ReaderEvent, Removed,
    Resource, ResourceSet, StreamReference,
};
pub use json_reader::JsonReader;
pub use options::{AnnotationFilter, MessageKind, PrimitiveTypeResolver, ReaderOptions};
pub use primitive::Primitive;
#[cfg(feature = "tokio")]
pub use reader::AsyncResourceReader;
pub use reader::{
    PayloadKind, ReaderCore, ReaderState, ReaderTarget, ResourceReader, SharedContextUrlParser, SharedModel,
};
pub use token::{Scalar, SyntaxError, Token, Tokenizer};
pub use value::Value;
