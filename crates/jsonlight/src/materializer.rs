//! Reading values once their type is known.

use log::debug;

use crate::{
    annotations::{self, PropertyAndAnnotationCollector},
    classifier::{PropertyKind, classify},
    edm::{Model, PrimitiveKind, PropertyRef, TypeKind, TypeRef},
    error::{ReaderError, Result},
    item::{InstanceAnnotation, ODataValue, Property, Removed, Resource, StreamReference},
    json_reader::JsonReader,
    options::ReaderOptions,
    primitive::{Primitive, convert, infer_kind},
    token::{Scalar, Token},
    type_resolver::{Resolved, Shape, TypeResolver, peek_object_type},
};

#[derive(Clone, Copy)]
pub(crate) struct Materializer<'a> {
    pub model: &'a dyn Model,
    pub options: &'a ReaderOptions,
}

impl<'a> Materializer<'a> {
    pub(crate) fn new(model: &'a dyn Model, options: &'a ReaderOptions) -> Self {
        Self { model, options }
    }

    pub(crate) fn resolver(&self) -> TypeResolver<'a> {
        TypeResolver {
            model: self.model,
            options: self.options,
        }
    }

    /// Resolves the type of the value at the current token, looking inside
    /// objects for `@odata.type` when the reader does not reorder.
    pub(crate) fn resolve_at(
        &self,
        reader: &mut JsonReader,
        expected: Option<&TypeRef>,
        payload_type: Option<&str>,
        name: &str,
    ) -> Result<Resolved> {
        let peeked = if payload_type.is_none()
            && *reader.token() == Token::StartObject
            && !reader.is_reordering()
            && !reader.is_buffering()
        {
            peek_object_type(reader)?
        } else {
            None
        };
        let shape = Shape::of(reader.token())?;
        self.resolver()
            .resolve(expected, payload_type.or(peeked.as_deref()), shape, name)
    }

    /// Reads the value at the current token and leaves the reader after it.
    ///
    /// `depth` is the nesting level of the value's container.
    pub(crate) fn read_value(
        &self,
        reader: &mut JsonReader,
        expected: Option<&TypeRef>,
        payload_type: Option<&str>,
        name: &str,
        depth: usize,
    ) -> Result<ODataValue> {
        let resolved = self.resolve_at(reader, expected, payload_type, name)?;
        self.read_resolved(reader, &resolved, name, depth)
    }

    pub(crate) fn read_resolved(
        &self,
        reader: &mut JsonReader,
        resolved: &Resolved,
        name: &str,
        depth: usize,
    ) -> Result<ODataValue> {
        let type_ref = &resolved.type_ref;
        if reader.token().is_null() {
            if !type_ref.nullable && !resolved.inferred {
                return Err(ReaderError::NullNotAllowed {
                    name: name.to_owned(),
                    type_name: type_ref.display_name(),
                });
            }
            reader.read()?;
            return Ok(ODataValue::Null);
        }

        match &type_ref.kind {
            TypeKind::Untyped(type_name) => match reader.token() {
                Token::Primitive(scalar) => {
                    let value = match infer_kind(scalar, self.options.ieee754_compatible) {
                        Some(kind) => ODataValue::Primitive(convert(kind, scalar, self.options.ieee754_compatible, false)?),
                        None => ODataValue::Null,
                    };
                    reader.read()?;
                    Ok(value)
                }
                _ if self.options.read_untyped_as_string => {
                    Ok(ODataValue::Untyped(reader.read_raw_value()?.to_string()))
                }
                Token::StartObject => self.read_object(reader, None, type_name.clone(), name, depth),
                _ => {
                    let item = TypeRef::untyped();
                    self.read_collection(reader, Some(&item), type_ref.name(), name, depth)
                }
            },
            TypeKind::Primitive(kind) => {
                let value = self.convert_scalar(reader, *kind, type_ref, !resolved.inferred)?;
                Ok(ODataValue::Primitive(value))
            }
            TypeKind::Enum(type_name) => {
                let value = match reader.token() {
                    Token::Primitive(Scalar::String(s)) => s.clone(),
                    other => {
                        return Err(ReaderError::TypeMismatch {
                            expected: type_name.clone(),
                            found: Shape::of(other)?.describe().to_owned(),
                        });
                    }
                };
                if !self.model.enum_type(type_name).is_none_or(|e| e.accepts(&value)) {
                    return Err(ReaderError::InvalidEnumValue {
                        type_name: type_name.clone(),
                        value,
                    });
                }
                reader.read()?;
                Ok(ODataValue::Enum {
                    type_name: type_name.clone(),
                    value,
                })
            }
            TypeKind::TypeDefinition(type_name) => {
                let declared = self.model.type_definition(type_name).map(|d| d.underlying);
                let underlying = match (declared, reader.token()) {
                    (Some(kind), _) => kind,
                    (None, Token::Primitive(scalar)) => {
                        infer_kind(scalar, self.options.ieee754_compatible).unwrap_or(PrimitiveKind::String)
                    }
                    (None, other) => {
                        return Err(ReaderError::TypeMismatch {
                            expected: type_name.clone(),
                            found: Shape::of(other)?.describe().to_owned(),
                        });
                    }
                };
                let value = self
                    .convert_scalar(reader, underlying, type_ref, declared.is_some())
                    .map_err(|e| match e {
                        ReaderError::Overflow { value, .. } => ReaderError::Overflow {
                            type_name: type_name.clone(),
                            value,
                        },
                        other => other,
                    })?;
                Ok(ODataValue::Defined {
                    type_name: type_name.clone(),
                    value,
                })
            }
            TypeKind::Collection(item) => {
                if *reader.token() != Token::StartArray {
                    return Err(ReaderError::CollectionExpected(name.to_owned()));
                }
                // items of an unknown named type are only inferred
                let item = Some(item.as_ref()).filter(|i| !matches!(i.kind, TypeKind::Untyped(Some(_))));
                self.read_collection(reader, item, type_ref.name(), name, depth)
            }
            TypeKind::Complex(type_name) | TypeKind::Entity(type_name) => {
                if *reader.token() != Token::StartObject {
                    return Err(ReaderError::TypeMismatch {
                        expected: type_name.clone(),
                        found: Shape::of(reader.token())?.describe().to_owned(),
                    });
                }
                self.read_object(reader, Some(type_name.clone()), None, name, depth)
            }
        }
    }

    fn convert_scalar(
        &self,
        reader: &mut JsonReader,
        kind: PrimitiveKind,
        type_ref: &TypeRef,
        check_lexical_form: bool,
    ) -> Result<Primitive> {
        let value = match reader.token() {
            Token::Primitive(scalar) => convert(kind, scalar, self.options.ieee754_compatible, check_lexical_form)?,
            other => {
                return Err(ReaderError::TypeMismatch {
                    expected: type_ref.display_name(),
                    found: Shape::of(other)?.describe().to_owned(),
                });
            }
        };
        reader.read()?;
        Ok(value)
    }

    fn check_depth(&self, depth: usize) -> Result<()> {
        if depth > self.options.max_nesting_depth {
            return Err(ReaderError::RecursionDepthExceeded {
                max: self.options.max_nesting_depth,
            });
        }
        Ok(())
    }

    /// Reads the array at the current token. Without an item type every
    /// non-null item must have the type of the first one.
    pub(crate) fn read_collection(
        &self,
        reader: &mut JsonReader,
        item: Option<&TypeRef>,
        type_name: Option<String>,
        name: &str,
        depth: usize,
    ) -> Result<ODataValue> {
        self.check_depth(depth + 1)?;
        reader.read()?;
        let mut items = Vec::new();
        let mut first: Option<String> = None;
        while *reader.token() != Token::EndArray {
            let value = self.read_value(reader, item, None, name, depth + 1)?;
            if item.is_none() && !value.is_null() {
                let kind = value_kind(&value);
                match &first {
                    None => first = Some(kind),
                    Some(f) if *f != kind => {
                        return Err(ReaderError::InconsistentCollectionItems {
                            first: f.clone(),
                            other: kind,
                        });
                    }
                    Some(_) => {}
                }
            }
            items.push(value);
        }
        reader.read()?;
        Ok(ODataValue::Collection { type_name, items })
    }

    /// Reads a complex or untyped object inline.
    #[allow(clippy::too_many_lines)]
    fn read_object(
        &self,
        reader: &mut JsonReader,
        structured: Option<String>,
        untyped_name: Option<String>,
        name: &str,
        depth: usize,
    ) -> Result<ODataValue> {
        self.check_depth(depth + 1)?;
        reader.read()?;
        let mut resource = Resource {
            type_name: structured.clone().or(untyped_name),
            ..Resource::default()
        };
        let mut type_name = structured;
        let mut collector = PropertyAndAnnotationCollector::new();
        let mut read_custom =
            |r: &mut JsonReader, annotation: &str| self.read_value(r, None, None, annotation, depth + 1);

        loop {
            let member = classify(reader, &mut collector, self.options, &mut read_custom)?;
            match member.kind {
                PropertyKind::EndOfObject => break,
                PropertyKind::ODataInstanceAnnotation if member.name == annotations::TYPE => {
                    // already seen by the lookahead when the reader does not reorder
                    let payload = reader.read_string()?;
                    let (structured, reported) = self.resolver().resolve_object_type(type_name.as_deref(), &payload)?;
                    type_name = structured;
                    resource.type_name = reported;
                }
                PropertyKind::ODataInstanceAnnotation => {
                    if !read_resource_annotation(reader, &mut resource, &member.name)? {
                        debug!("ignoring '@{}' inside '{name}'", member.name);
                        reader.skip_value()?;
                    }
                }
                PropertyKind::CustomInstanceAnnotation => {
                    let annotation = self.read_instance_annotation(reader, &collector, &member.name, depth)?;
                    resource.instance_annotations.push(annotation);
                }
                PropertyKind::PropertyWithValue => {
                    let expected = self.declared_type(type_name.as_deref(), &member.name)?;
                    let payload = collector.text(&member.name, annotations::TYPE).map(str::to_owned);
                    let value = self.read_value(reader, expected.as_ref(), payload.as_deref(), &member.name, depth + 1)?;
                    resource.properties.push(property(member.name, value, &collector));
                }
                PropertyKind::PropertyWithoutValue => {
                    let declared = type_name.as_deref().and_then(|t| self.model.find_property(t, &member.name));
                    match declared {
                        Some(PropertyRef::Structural(p)) if p.type_ref.kind == TypeKind::Primitive(PrimitiveKind::Stream) => {
                            let value = ODataValue::Primitive(Primitive::Stream(stream_reference(&collector, &member.name)));
                            resource.properties.push(property(member.name, value, &collector));
                        }
                        Some(PropertyRef::Navigation(_)) => {
                            debug!("ignoring deferred link '{}' inside '{name}'", member.name);
                        }
                        _ => return Err(ReaderError::PropertyWithoutValue(member.name)),
                    }
                }
                PropertyKind::MetadataReferenceProperty => {
                    reader.skip_value()?;
                    resource.operations.push(member.name);
                }
                PropertyKind::NestedDeltaResourceSet => {
                    return Err(ReaderError::UnexpectedAnnotation(format!(
                        "{}@{}",
                        member.name,
                        annotations::DELTA
                    )));
                }
            }
        }
        reader.read()?;
        Ok(ODataValue::Resource(Box::new(resource)))
    }

    /// The declared type of a property of `type_name`; `None` for dynamic
    /// properties of open and untyped values.
    pub(crate) fn declared_type(&self, type_name: Option<&str>, property: &str) -> Result<Option<TypeRef>> {
        let Some(type_name) = type_name else {
            return Ok(None);
        };
        Ok(match self.model.find_property(type_name, property) {
            Some(PropertyRef::Structural(p)) => Some(p.type_ref.clone()),
            Some(PropertyRef::Navigation(nav)) => {
                let target = TypeRef::entity(&nav.target_type);
                Some(if nav.is_collection {
                    TypeRef::collection(target)
                } else {
                    target
                })
            }
            None => {
                self.check_declared(type_name, property)?;
                None
            }
        })
    }

    /// Fails for undeclared properties of a non-open type when configured
    /// to.
    pub(crate) fn check_declared(&self, type_name: &str, property: &str) -> Result<()> {
        let closed = self.model.structured_type(type_name).is_some_and(|t| !t.is_open);
        if closed && self.options.throw_on_undeclared_property {
            return Err(ReaderError::UndeclaredProperty {
                name: property.to_owned(),
                type_name: type_name.to_owned(),
            });
        }
        Ok(())
    }

    /// Reads the value of custom instance annotation `name`, typed by an
    /// `@name@odata.type` collected earlier.
    pub(crate) fn read_instance_annotation(
        &self,
        reader: &mut JsonReader,
        collector: &PropertyAndAnnotationCollector,
        name: &str,
        depth: usize,
    ) -> Result<InstanceAnnotation> {
        let payload = collector.text(&format!("@{name}"), annotations::TYPE).map(str::to_owned);
        let value = self.read_value(reader, None, payload.as_deref(), name, depth + 1)?;
        Ok(InstanceAnnotation {
            name: name.to_owned(),
            value,
        })
    }
}

pub(crate) fn property(name: String, value: ODataValue, collector: &PropertyAndAnnotationCollector) -> Property {
    let annotations = collector
        .custom(&name)
        .map(|(a, v)| InstanceAnnotation {
            name: a.to_owned(),
            value: v.clone(),
        })
        .collect();
    Property {
        name,
        value,
        annotations,
    }
}

/// The media links collected for `property`.
pub(crate) fn stream_reference(collector: &PropertyAndAnnotationCollector, property: &str) -> StreamReference {
    let text = |a| collector.text(property, a).map(str::to_owned);
    StreamReference {
        edit_link: text(annotations::MEDIA_EDIT_LINK),
        read_link: text(annotations::MEDIA_READ_LINK),
        content_type: text(annotations::MEDIA_CONTENT_TYPE),
        etag: text(annotations::MEDIA_ETAG),
    }
}

/// Applies a reserved instance annotation that describes a resource.
/// Returns `false`, without reading, for annotations that do not.
pub(crate) fn read_resource_annotation(reader: &mut JsonReader, resource: &mut Resource, annotation: &str) -> Result<bool> {
    match annotation {
        annotations::ID => resource.id = read_optional_string(reader)?,
        annotations::ETAG => resource.etag = read_optional_string(reader)?,
        annotations::EDIT_LINK => resource.edit_link = read_optional_string(reader)?,
        annotations::READ_LINK => resource.read_link = read_optional_string(reader)?,
        annotations::MEDIA_EDIT_LINK => media(resource).edit_link = read_optional_string(reader)?,
        annotations::MEDIA_READ_LINK => media(resource).read_link = read_optional_string(reader)?,
        annotations::MEDIA_CONTENT_TYPE => media(resource).content_type = read_optional_string(reader)?,
        annotations::MEDIA_ETAG => media(resource).etag = read_optional_string(reader)?,
        annotations::REMOVED => {
            let value = reader.read_raw_value()?;
            resource.removed = Some(Removed {
                reason: value.get("reason").and_then(|r| r.as_str()).map(str::to_owned),
            });
        }
        _ => return Ok(false),
    }
    Ok(true)
}

fn media(resource: &mut Resource) -> &mut StreamReference {
    resource.media.get_or_insert_with(StreamReference::default)
}

fn read_optional_string(reader: &mut JsonReader) -> Result<Option<String>> {
    if reader.token().is_null() {
        reader.read()?;
        return Ok(None);
    }
    reader.read_string().map(Some)
}

/// The type name collection items are compared by.
fn value_kind(value: &ODataValue) -> String {
    value.type_name().unwrap_or_else(|| match value {
        ODataValue::Collection { .. } => "Collection(Edm.Untyped)".to_owned(),
        _ => "Edm.Untyped".to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::Materializer;
    use crate::{
        edm::{EdmModel, EnumType, PrimitiveKind, StructuredType, TypeRef},
        error::ReaderError,
        item::ODataValue,
        json_reader::JsonReader,
        options::ReaderOptions,
        primitive::Primitive,
    };

    fn model() -> EdmModel {
        EdmModel::new()
            .with_type(
                StructuredType::complex("NS.Address")
                    .property("City", TypeRef::primitive(PrimitiveKind::String))
                    .property("Zip", TypeRef::primitive(PrimitiveKind::Int32).not_null()),
            )
            .with_type(StructuredType::complex("NS.Bag").open())
            .with_enum(EnumType::new("NS.Color", &["Red", "Green"]))
            .with_type_definition("NS.Small", PrimitiveKind::Byte)
    }

    fn read(json: &str, expected: Option<&TypeRef>, options: &ReaderOptions) -> Result<ODataValue, ReaderError> {
        let model = model();
        let mut reader = JsonReader::from_complete(json, options.enable_reordering);
        reader.read()?;
        Materializer::new(&model, options).read_value(&mut reader, expected, None, "P", 0)
    }

    #[test]
    fn complex_values_read_inline() {
        let value = read(
            r#"{"City":"Oslo","Zip":1234}"#,
            Some(&TypeRef::complex("NS.Address")),
            &ReaderOptions::default(),
        )
        .unwrap();
        let ODataValue::Resource(address) = value else {
            panic!("expected a resource, got {value:?}");
        };
        assert_eq!(address.type_name.as_deref(), Some("NS.Address"));
        assert_eq!(
            address.property("Zip").map(|p| &p.value),
            Some(&ODataValue::Primitive(Primitive::Int32(1234)))
        );
    }

    #[test]
    fn null_for_non_nullable_property() {
        let err = read(
            r#"{"Zip":null}"#,
            Some(&TypeRef::complex("NS.Address")),
            &ReaderOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ReaderError::NullNotAllowed { name, .. } if name == "Zip"));
    }

    #[test]
    fn undeclared_properties() {
        let closed = Some(TypeRef::complex("NS.Address"));
        let err = read(r#"{"Other":1}"#, closed.as_ref(), &ReaderOptions::default()).unwrap_err();
        assert!(matches!(err, ReaderError::UndeclaredProperty { .. }));

        let lenient = ReaderOptions {
            throw_on_undeclared_property: false,
            ..ReaderOptions::default()
        };
        assert!(read(r#"{"Other":1}"#, closed.as_ref(), &lenient).is_ok());
        assert!(read(r#"{"Other":1}"#, Some(&TypeRef::complex("NS.Bag")), &ReaderOptions::default()).is_ok());
    }

    #[test]
    fn enums_must_be_strings() {
        let color = TypeRef::enumeration("NS.Color");
        assert_eq!(
            read(r#""Red""#, Some(&color), &ReaderOptions::default()).unwrap(),
            ODataValue::Enum {
                type_name: "NS.Color".into(),
                value: "Red".into()
            }
        );
        assert!(matches!(
            read(r#"{"x":1}"#, Some(&color), &ReaderOptions::default()),
            Err(ReaderError::TypeMismatch { .. })
        ));
        assert!(matches!(
            read(r#""Blue""#, Some(&color), &ReaderOptions::default()),
            Err(ReaderError::InvalidEnumValue { .. })
        ));
    }

    #[test]
    fn type_definition_overflow_names_the_definition() {
        let err = read("300", Some(&TypeRef::type_definition("NS.Small")), &ReaderOptions::default()).unwrap_err();
        assert!(matches!(err, ReaderError::Overflow { type_name, .. } if type_name == "NS.Small"));
    }

    #[test]
    fn ieee754_lexical_form_is_checked_for_declared_types() {
        let int64 = TypeRef::primitive(PrimitiveKind::Int64);
        let compatible = ReaderOptions {
            ieee754_compatible: true,
            ..ReaderOptions::default()
        };
        assert!(matches!(
            read("12", Some(&int64), &compatible),
            Err(ReaderError::Ieee754Mismatch { .. })
        ));
        assert_eq!(
            read(r#""12""#, Some(&int64), &compatible).unwrap(),
            ODataValue::Primitive(Primitive::Int64(12))
        );
        // inferred values are not checked
        assert_eq!(
            read("12345678901", None, &compatible).unwrap(),
            ODataValue::Primitive(Primitive::Int64(12_345_678_901))
        );
    }

    #[test]
    fn items_of_unknown_collection_types_must_agree() {
        let model = model();
        let options = ReaderOptions::default();
        let read_unknown = |json: &str| {
            let mut reader = JsonReader::from_complete(json, false);
            reader.read()?;
            Materializer::new(&model, &options).read_value(&mut reader, None, Some("#Collection(NS.Unknown)"), "P", 0)
        };
        let err = read_unknown(r#"[1,"a"]"#).unwrap_err();
        assert!(matches!(err, ReaderError::InconsistentCollectionItems { .. }));
        let ok = read_unknown("[1,null,2]").unwrap();
        assert!(matches!(ok, ODataValue::Collection { items, .. } if items.len() == 3));

        // untyped collections take anything
        let mixed = read(r#"["a","b",3]"#, None, &options).unwrap();
        assert!(matches!(mixed, ODataValue::Collection { items, .. } if items.len() == 3));
    }

    #[test]
    fn untyped_values_as_raw_text() {
        let options = ReaderOptions {
            read_untyped_as_string: true,
            ..ReaderOptions::default()
        };
        assert_eq!(
            read(r#"{"a":[1, 2]}"#, Some(&TypeRef::untyped()), &options).unwrap(),
            ODataValue::Untyped(r#"{"a":[1,2]}"#.into())
        );
    }

    #[test]
    fn depth_guard() {
        let json = format!("{}{}", "[".repeat(50), "]".repeat(50));
        let options = ReaderOptions {
            max_nesting_depth: 10,
            enable_reordering: false,
            ..ReaderOptions::default()
        };
        assert!(matches!(
            read(&json, None, &options),
            Err(ReaderError::RecursionDepthExceeded { max: 10 })
        ));
    }
}
