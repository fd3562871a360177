//! What a single member of a resource turns into: an inline property, a
//! piece of resource metadata, or a nested resource info to report next.

use log::debug;

use super::scope::{NestedContent, NestedScope, ResourceScope};
use crate::{
    annotations::{self, AnnotationValue, PropertyAndAnnotationCollector},
    edm::{NavigationProperty, PrimitiveKind, PropertyRef, TypeKind, TypeRef},
    error::{ReaderError, Result},
    item::{NestedResourceInfo, ODataValue},
    json_reader::JsonReader,
    materializer::{Materializer, property, read_resource_annotation, stream_reference},
    options::MessageKind,
    primitive::Primitive,
    token::Token,
    type_resolver::{Resolved, Shape},
};

/// Reads the members of one resource.
pub(super) struct ContentReader<'a> {
    pub m: Materializer<'a>,
    /// Depth of the resource's scope.
    pub depth: usize,
}

impl ContentReader<'_> {
    fn is_request(&self) -> bool {
        self.m.options.message_kind == MessageKind::Request
    }

    /// A reserved instance annotation of the resource.
    pub(super) fn annotation(&self, reader: &mut JsonReader, rs: &mut ResourceScope, annotation: &str) -> Result<()> {
        match annotation {
            annotations::TYPE => {
                if rs.collector.has_processed_data() && !rs.type_peeked {
                    return Err(ReaderError::TypeAnnotationNotFirst);
                }
                let payload = reader.read_string()?;
                let (structured, reported) = self
                    .m
                    .resolver()
                    .resolve_object_type(rs.type_name.as_deref(), &payload)?;
                rs.type_name = structured;
                rs.resource.type_name = reported;
            }
            annotations::CONTEXT => reader.skip_value()?,
            _ => {
                if !read_resource_annotation(reader, &mut rs.resource, annotation)? {
                    debug!("ignoring '@{annotation}' on a resource");
                    reader.skip_value()?;
                }
            }
        }
        Ok(())
    }

    /// A member with a value. Returns the nested info to report when the
    /// value is not read inline.
    pub(super) fn with_value(
        &self,
        reader: &mut JsonReader,
        rs: &mut ResourceScope,
        name: String,
    ) -> Result<Option<NestedScope>> {
        let declared = rs.type_name.as_deref().and_then(|t| self.m.model.find_property(t, &name));
        let expected = match declared {
            Some(PropertyRef::Navigation(nav)) => {
                return self.navigation(reader, rs, nav, NestedContent::Inline).map(Some);
            }
            Some(PropertyRef::Structural(p)) => Some(p.type_ref.clone()),
            None => {
                if let Some(type_name) = rs.type_name.as_deref() {
                    self.m.check_declared(type_name, &name)?;
                }
                None
            }
        };

        if self.is_request() && rs.collector.annotation(&name, annotations::BIND).is_some() {
            return self.undeclared_binds(rs, name, NestedContent::Inline).map(Some);
        }

        let payload = rs.collector.text(&name, annotations::TYPE).map(str::to_owned);
        let peeked = payload.is_none() && *reader.token() == Token::StartObject && !reader.is_reordering();
        let resolved = self.m.resolve_at(reader, expected.as_ref(), payload.as_deref(), &name)?;
        if let Some(mut nested) = self.structural_nested(reader, &resolved, &name)? {
            nested.type_peeked = peeked;
            return Ok(Some(nested));
        }
        let value = self.m.read_resolved(reader, &resolved, &name, self.depth)?;
        rs.resource.properties.push(property(name, value, &rs.collector));
        Ok(None)
    }

    /// Structured values of structural properties are reported as nested
    /// resources; everything else is read inline.
    fn structural_nested(&self, reader: &JsonReader, resolved: &Resolved, name: &str) -> Result<Option<NestedScope>> {
        let type_ref = &resolved.type_ref;
        let token = reader.token();
        let untyped_inline = self.m.options.read_untyped_as_string;
        let is_collection = match &type_ref.kind {
            TypeKind::Complex(_) | TypeKind::Entity(_) => {
                match token {
                    Token::StartObject => {}
                    Token::Primitive(s) if s.is_null() => {
                        if !type_ref.nullable && !resolved.inferred {
                            return Err(ReaderError::NullNotAllowed {
                                name: name.to_owned(),
                                type_name: type_ref.display_name(),
                            });
                        }
                    }
                    other => {
                        return Err(ReaderError::TypeMismatch {
                            expected: type_ref.display_name(),
                            found: Shape::of(other)?.describe().to_owned(),
                        });
                    }
                }
                false
            }
            TypeKind::Collection(item) if item.is_structured() && *token == Token::StartArray => true,
            TypeKind::Collection(item) if item.is_untyped() && !untyped_inline && *token == Token::StartArray => true,
            TypeKind::Untyped(_) if !untyped_inline => match token {
                Token::StartObject => false,
                Token::StartArray => true,
                _ => return Ok(None),
            },
            _ => return Ok(None),
        };

        let info = NestedResourceInfo {
            name: name.to_owned(),
            is_collection: Some(is_collection),
            is_complex: true,
            ..NestedResourceInfo::default()
        };
        let target = match (&type_ref.kind, is_collection) {
            (TypeKind::Untyped(_), true) => TypeRef::collection(TypeRef::untyped()),
            _ => type_ref.clone(),
        };
        Ok(Some(NestedScope::new(info, NestedContent::Inline, Some(target))))
    }

    /// A member with annotations but no value.
    pub(super) fn without_value(
        &self,
        reader: &mut JsonReader,
        rs: &mut ResourceScope,
        name: String,
    ) -> Result<Option<NestedScope>> {
        let declared = rs.type_name.as_deref().and_then(|t| self.m.model.find_property(t, &name));
        match declared {
            Some(PropertyRef::Navigation(nav)) => self.navigation(reader, rs, nav, NestedContent::Deferred).map(Some),
            Some(PropertyRef::Structural(p)) if p.type_ref.kind == TypeKind::Primitive(PrimitiveKind::Stream) => {
                self.push_stream(rs, name);
                Ok(None)
            }
            Some(PropertyRef::Structural(_)) => Err(ReaderError::PropertyWithoutValue(name)),
            None => {
                if let Some(type_name) = rs.type_name.as_deref() {
                    self.m.check_declared(type_name, &name)?;
                }
                let c = &rs.collector;
                if self.is_request() && c.annotation(&name, annotations::BIND).is_some() {
                    return self.undeclared_binds(rs, name, NestedContent::Deferred).map(Some);
                }
                let has_links = c.text(&name, annotations::NAVIGATION_LINK).is_some()
                    || c.text(&name, annotations::ASSOCIATION_LINK).is_some();
                if has_links && !self.is_request() {
                    let mut nested = NestedScope::new(links(&name, None, c), NestedContent::Deferred, None);
                    nested.is_navigation = true;
                    return Ok(Some(nested));
                }
                if !stream_reference(c, &name).is_empty() {
                    self.push_stream(rs, name);
                    return Ok(None);
                }
                Err(ReaderError::PropertyWithoutValue(name))
            }
        }
    }

    fn push_stream(&self, rs: &mut ResourceScope, name: String) {
        let value = ODataValue::Primitive(Primitive::Stream(stream_reference(&rs.collector, &name)));
        rs.resource.properties.push(property(name, value, &rs.collector));
    }

    /// A `Nav@delta` member; the reader is on its array.
    pub(super) fn delta(&self, reader: &mut JsonReader, rs: &mut ResourceScope, name: String) -> Result<NestedScope> {
        let unexpected = |name: &str| ReaderError::UnexpectedAnnotation(format!("{name}@{}", annotations::DELTA));
        if self.is_request() {
            return Err(unexpected(&name));
        }
        let declared = rs.type_name.as_deref().and_then(|t| self.m.model.find_property(t, &name));
        match declared {
            Some(PropertyRef::Navigation(nav)) => self.navigation(reader, rs, nav, NestedContent::Delta),
            Some(PropertyRef::Structural(_)) => Err(unexpected(&name)),
            None => {
                if let Some(type_name) = rs.type_name.as_deref() {
                    self.m.check_declared(type_name, &name)?;
                }
                if *reader.token() != Token::StartArray {
                    return Err(ReaderError::CollectionExpected(name));
                }
                let info = links(&name, Some(true), &rs.collector);
                let target = TypeRef::collection(TypeRef::untyped());
                let mut nested = NestedScope::new(info, NestedContent::Delta, Some(target));
                nested.is_navigation = true;
                Ok(nested)
            }
        }
    }

    /// A declared navigation property, with or without content.
    fn navigation(
        &self,
        reader: &JsonReader,
        rs: &ResourceScope,
        nav: &NavigationProperty,
        content: NestedContent,
    ) -> Result<NestedScope> {
        let name = nav.name.as_str();
        let invalid = |reason| ReaderError::InvalidNavigationValue {
            name: name.to_owned(),
            reason,
        };
        match (content, reader.token()) {
            (NestedContent::Inline, Token::StartObject) if !nav.is_collection => {}
            (NestedContent::Inline, Token::Primitive(s)) if s.is_null() && !nav.is_collection => {}
            (NestedContent::Inline | NestedContent::Delta, Token::StartArray) if nav.is_collection => {}
            (NestedContent::Inline, Token::StartArray) => {
                return Err(invalid("an array for a single-valued navigation property"));
            }
            (NestedContent::Inline, Token::Primitive(s)) if s.is_null() => {
                return Err(invalid("null for a collection-valued navigation property"));
            }
            (NestedContent::Inline, _) => {
                return Err(invalid(if nav.is_collection {
                    "a collection-valued navigation property needs an array"
                } else {
                    "a single-valued navigation property needs an object or null"
                }));
            }
            (NestedContent::Delta, _) => {
                return Err(invalid("a delta needs a collection-valued navigation property and an array"));
            }
            (NestedContent::Deferred | NestedContent::Done, _) => {}
        }

        let mut binds = Vec::new();
        match (rs.collector.annotation(name, annotations::BIND), self.is_request()) {
            (Some(_), false) => {
                return Err(ReaderError::UnexpectedAnnotation(format!("{name}@{}", annotations::BIND)));
            }
            (Some(AnnotationValue::Links(_)), true) if !nav.is_collection => {
                return Err(invalid("an array of odata.bind links for a single-valued navigation property"));
            }
            (Some(AnnotationValue::Text(_)), true) if nav.is_collection => {
                return Err(invalid("a single odata.bind link for a collection-valued navigation property"));
            }
            (Some(AnnotationValue::Text(_)), true) if content == NestedContent::Inline => {
                return Err(ReaderError::BindConflict(name.to_owned()));
            }
            (Some(AnnotationValue::Text(url)), true) => binds.push(url.clone()),
            (Some(AnnotationValue::Links(urls)), true) => binds.extend(urls.iter().cloned()),
            (Some(_), true) => return Err(invalid("odata.bind must be a URL or an array of URLs")),
            (None, true) if content == NestedContent::Deferred => {
                return Err(ReaderError::PropertyWithoutValue(name.to_owned()));
            }
            (None, _) => {}
        }

        let target = TypeRef::entity(&nav.target_type);
        let target = if nav.is_collection {
            TypeRef::collection(target)
        } else {
            target
        };
        let mut nested = NestedScope::new(links(name, Some(nav.is_collection), &rs.collector), content, Some(target));
        nested.is_navigation = true;
        nested.binds.extend(binds);
        Ok(nested)
    }

    /// `odata.bind` on a property the model does not declare. The
    /// cardinality follows the shape of the annotation.
    fn undeclared_binds(&self, rs: &ResourceScope, name: String, content: NestedContent) -> Result<NestedScope> {
        let urls = match rs.collector.annotation(&name, annotations::BIND) {
            Some(AnnotationValue::Text(_)) if content == NestedContent::Inline => {
                return Err(ReaderError::BindConflict(name));
            }
            Some(AnnotationValue::Text(url)) => vec![url.clone()],
            Some(AnnotationValue::Links(urls)) => urls.clone(),
            _ => {
                return Err(ReaderError::InvalidNavigationValue {
                    name,
                    reason: "odata.bind must be a URL or an array of URLs",
                });
            }
        };
        let is_collection = matches!(rs.collector.annotation(&name, annotations::BIND), Some(AnnotationValue::Links(_)));
        let target = TypeRef::untyped();
        let target = if is_collection { TypeRef::collection(target) } else { target };
        let mut nested = NestedScope::new(links(&name, Some(is_collection), &rs.collector), content, Some(target));
        nested.is_navigation = true;
        nested.binds.extend(urls);
        Ok(nested)
    }
}

/// The nested info of `name` with the links its annotations carry.
pub(super) fn links(name: &str, is_collection: Option<bool>, collector: &PropertyAndAnnotationCollector) -> NestedResourceInfo {
    let text = |a| collector.text(name, a).map(str::to_owned);
    NestedResourceInfo {
        name: name.to_owned(),
        is_collection,
        url: text(annotations::NAVIGATION_LINK),
        association_link_url: text(annotations::ASSOCIATION_LINK),
        count: collector.count(name),
        next_link: text(annotations::NEXT_LINK),
        is_complex: false,
    }
}

/// The nested info reported for a declared navigation property the payload
/// left out.
pub(super) fn missing_navigation(nav: &NavigationProperty, collector: &PropertyAndAnnotationCollector) -> NestedScope {
    let mut nested = NestedScope::new(
        links(&nav.name, Some(nav.is_collection), collector),
        NestedContent::Deferred,
        None,
    );
    nested.is_navigation = true;
    nested
}
