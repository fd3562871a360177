//! Choosing the type a value is read as.
//!
//! The decision combines the type the model declares for the position, the
//! type named by the payload (`@odata.type`) and the JSON shape of the value:
//!
//! 1. A declared type wins, unless it is `Edm.Untyped` and untyped values
//!    are read as strings. A payload type may narrow it to a derived type.
//! 2. A caller supplied resolver may classify primitives.
//! 3. Otherwise the type is inferred from the shape and the payload type.
//!    Primitives named by an unknown payload type are read as a synthetic
//!    type definition of that name.

use crate::{
    annotations::{self, MemberName},
    edm::{Model, StructuredType, TypeKind, TypeName, TypeRef, collection_item, qualify},
    error::{ReaderError, Result},
    json_reader::JsonReader,
    options::ReaderOptions,
    primitive::infer_kind,
    token::{Scalar, Token},
};

/// JSON shape of a value.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Shape<'a> {
    Primitive(&'a Scalar),
    Object,
    Array,
}

impl<'a> Shape<'a> {
    pub(crate) fn of(token: &'a Token) -> Result<Self> {
        match token {
            Token::Primitive(s) => Ok(Shape::Primitive(s)),
            Token::StartObject => Ok(Shape::Object),
            Token::StartArray => Ok(Shape::Array),
            other => Err(ReaderError::unexpected("a value", other)),
        }
    }

    pub(crate) fn describe(self) -> &'static str {
        match self {
            Shape::Primitive(Scalar::Null) => "null",
            Shape::Primitive(_) => "a primitive value",
            Shape::Object => "an object",
            Shape::Array => "an array",
        }
    }

    fn is_null(self) -> bool {
        matches!(self, Shape::Primitive(Scalar::Null))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Resolved {
    pub type_ref: TypeRef,
    /// Not declared or named by the payload. Inferred primitives skip the
    /// IEEE754 lexical form check and nullability.
    pub inferred: bool,
}

impl Resolved {
    fn declared(type_ref: TypeRef) -> Self {
        Self {
            type_ref,
            inferred: false,
        }
    }

    fn inferred(type_ref: TypeRef) -> Self {
        Self {
            type_ref,
            inferred: true,
        }
    }
}

pub(crate) struct TypeResolver<'a> {
    pub model: &'a dyn Model,
    pub options: &'a ReaderOptions,
}

impl TypeResolver<'_> {
    /// Resolves the type of a value.
    ///
    /// # Errors
    ///
    /// The shape contradicts the declared type, the payload type is not
    /// compatible with it, or the payload type is unknown where a declared
    /// type requires a known one.
    pub(crate) fn resolve(
        &self,
        expected: Option<&TypeRef>,
        payload_type: Option<&str>,
        shape: Shape<'_>,
        name: &str,
    ) -> Result<Resolved> {
        let expected = expected.filter(|e| !e.is_untyped() || !self.options.read_untyped_as_string);
        if let Some(expected) = expected {
            return self.resolve_declared(expected, payload_type, shape, name);
        }

        if let (Shape::Primitive(scalar), Some(resolver)) = (shape, &self.options.primitive_type_resolver) {
            if !scalar.is_null() {
                if let Some(type_ref) = resolver(Some(name).filter(|n| !n.is_empty()), scalar) {
                    return Ok(Resolved::inferred(type_ref));
                }
            }
        }

        match shape {
            Shape::Primitive(scalar) => self.infer_primitive(scalar, payload_type, name),
            Shape::Object => match payload_type {
                None => Ok(Resolved::inferred(TypeRef::untyped())),
                Some(p) => match self.model.resolve_type(p) {
                    Some(t) if t.is_structured() || t.is_untyped() => Ok(Resolved::declared(t)),
                    Some(t) => Err(ReaderError::TypeMismatch {
                        expected: t.display_name(),
                        found: shape.describe().to_owned(),
                    }),
                    None => Ok(Resolved::declared(self.untyped_named(&qualify(p)))),
                },
            },
            Shape::Array => match payload_type {
                None => Ok(Resolved::inferred(TypeRef::collection(TypeRef::untyped()))),
                Some(p) => {
                    if !TypeName::parse(p).is_collection() {
                        return Err(ReaderError::TypeMismatch {
                            expected: "a collection type".to_owned(),
                            found: qualify(p),
                        });
                    }
                    Ok(Resolved::declared(self.model.resolve_type(p).unwrap_or_else(|| {
                        let qualified = qualify(p);
                        let item = collection_item(&qualified).unwrap_or_default();
                        TypeRef::collection(self.untyped_named(item))
                    })))
                }
            },
        }
    }

    fn resolve_declared(
        &self,
        expected: &TypeRef,
        payload_type: Option<&str>,
        shape: Shape<'_>,
        name: &str,
    ) -> Result<Resolved> {
        if !shape.is_null() && !expected.is_untyped() {
            match (expected.is_collection(), shape) {
                (true, Shape::Primitive(_) | Shape::Object) => {
                    return Err(ReaderError::CollectionExpected(name.to_owned()));
                }
                (false, Shape::Array) => return Err(ReaderError::UnexpectedCollection(name.to_owned())),
                _ => {}
            }
        }

        let Some(payload) = payload_type else {
            return Ok(Resolved::declared(expected.clone()));
        };
        match self.model.resolve_type(payload) {
            Some(mut actual) => {
                self.check_compatible(expected, &actual)?;
                if expected.is_untyped() && actual.is_collection() != matches!(shape, Shape::Array) && !shape.is_null() {
                    return Err(ReaderError::TypeMismatch {
                        expected: actual.display_name(),
                        found: shape.describe().to_owned(),
                    });
                }
                actual.nullable = expected.nullable;
                Ok(Resolved::declared(actual))
            }
            None if expected.is_untyped() => Ok(Resolved::declared(self.untyped_named(&qualify(payload)))),
            None => Err(ReaderError::UnknownType(qualify(payload))),
        }
    }

    /// Whether a value of `actual` may stand where `expected` is declared.
    pub(crate) fn check_compatible(&self, expected: &TypeRef, actual: &TypeRef) -> Result<()> {
        let compatible = match (&expected.kind, &actual.kind) {
            (TypeKind::Untyped(_), _) => true,
            (TypeKind::Primitive(e), TypeKind::Primitive(a)) => e == a,
            (TypeKind::Enum(e), TypeKind::Enum(a)) | (TypeKind::TypeDefinition(e), TypeKind::TypeDefinition(a)) => {
                e == a
            }
            (TypeKind::Entity(e), TypeKind::Entity(a)) | (TypeKind::Complex(e), TypeKind::Complex(a)) => {
                self.model.is_assignable(e, a)
            }
            (TypeKind::Collection(e), TypeKind::Collection(a)) => return self.check_compatible(e, a),
            _ => false,
        };
        if compatible {
            Ok(())
        } else {
            Err(ReaderError::IncompatibleType {
                expected: expected.display_name(),
                found: actual.display_name(),
            })
        }
    }

    fn infer_primitive(&self, scalar: &Scalar, payload_type: Option<&str>, name: &str) -> Result<Resolved> {
        let Some(payload) = payload_type else {
            return Ok(Resolved::inferred(match infer_kind(scalar, self.options.ieee754_compatible) {
                Some(kind) => TypeRef::primitive(kind),
                None => TypeRef::untyped(),
            }));
        };
        match self.model.resolve_type(payload) {
            Some(t) if t.is_collection() && !scalar.is_null() => Err(ReaderError::CollectionExpected(name.to_owned())),
            Some(t) if t.is_structured() && !scalar.is_null() => Err(ReaderError::TypeMismatch {
                expected: t.display_name(),
                found: Shape::Primitive(scalar).describe().to_owned(),
            }),
            Some(t) => Ok(Resolved::declared(t)),
            // a synthetic definition; its underlying type follows the token
            None => Ok(Resolved::declared(TypeRef::type_definition(&qualify(payload)))),
        }
    }

    /// Resolves the `@odata.type` found inside an object. `declared` is the
    /// structured type the object was expected to have.
    ///
    /// Returns the structured type to look properties up on (`None` for an
    /// untyped object) and the type name to report.
    pub(crate) fn resolve_object_type(
        &self,
        declared: Option<&str>,
        payload: &str,
    ) -> Result<(Option<String>, Option<String>)> {
        let declared_ref = declared.and_then(|d| self.model.structured_type(d)).map(StructuredType::type_ref);
        match self.model.resolve_type(payload) {
            Some(actual) if actual.is_structured() => {
                if let Some(declared) = &declared_ref {
                    self.check_compatible(declared, &actual)?;
                }
                let name = actual.name();
                Ok((name.clone(), name))
            }
            Some(actual) if actual.is_untyped() => Ok((declared.map(str::to_owned), declared.map(str::to_owned))),
            Some(actual) => Err(ReaderError::TypeMismatch {
                expected: actual.display_name(),
                found: Shape::Object.describe().to_owned(),
            }),
            None if declared_ref.is_some() => Err(ReaderError::UnknownType(qualify(payload))),
            None => Ok((None, self.untyped_named(&qualify(payload)).name())),
        }
    }

    fn untyped_named(&self, name: &str) -> TypeRef {
        let name = Some(name)
            .filter(|n| self.options.generate_untyped_type_names && !n.is_empty())
            .map(str::to_owned);
        TypeRef::new(TypeKind::Untyped(name))
    }
}

/// Looks ahead into the object at the current token for its `@odata.type`
/// and rewinds.
///
/// # Errors
///
/// Read errors, or a non-string `@odata.type`.
pub(crate) fn peek_object_type(reader: &mut JsonReader) -> Result<Option<String>> {
    reader.start_buffering();
    let found = scan_for_type(reader);
    reader.stop_buffering();
    found
}

fn scan_for_type(reader: &mut JsonReader) -> Result<Option<String>> {
    reader.read()?;
    loop {
        let is_type = match reader.token() {
            Token::Property(name) => {
                matches!(MemberName::parse(name), MemberName::InstanceAnnotation(a) if a == annotations::TYPE)
            }
            _ => return Ok(None),
        };
        reader.read()?;
        if is_type {
            return reader.read_string().map(Some);
        }
        reader.skip_value()?;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{Resolved, Shape, TypeResolver, peek_object_type};
    use crate::{
        edm::{EdmModel, PrimitiveKind, StructuredType, TypeKind, TypeRef},
        error::ReaderError,
        json_reader::JsonReader,
        options::ReaderOptions,
        token::{Scalar, Token},
    };

    fn model() -> EdmModel {
        EdmModel::new()
            .with_type(StructuredType::complex("NS.Address"))
            .with_type(StructuredType::complex("NS.HomeAddress").base("NS.Address"))
            .with_type(StructuredType::complex("NS.Other"))
    }

    fn resolve(
        options: &ReaderOptions,
        expected: Option<&TypeRef>,
        payload: Option<&str>,
        shape: Shape<'_>,
    ) -> Result<Resolved, ReaderError> {
        let model = model();
        TypeResolver {
            model: &model,
            options,
        }
        .resolve(expected, payload, shape, "P")
    }

    #[test]
    fn declared_primitive_round_trips() {
        let declared = TypeRef::primitive(PrimitiveKind::Int16);
        let one = Scalar::Number("1".into());
        let r = resolve(&ReaderOptions::default(), Some(&declared), None, Shape::Primitive(&one)).unwrap();
        assert_eq!(r.type_ref, declared);
        assert!(!r.inferred);
    }

    #[test]
    fn open_property_takes_payload_type_name() {
        let r = resolve(&ReaderOptions::default(), None, Some("#NS.Foo"), Shape::Object).unwrap();
        assert_eq!(r.type_ref.kind, TypeKind::Untyped(Some("NS.Foo".into())));

        let anonymous = ReaderOptions {
            generate_untyped_type_names: false,
            ..ReaderOptions::default()
        };
        let r = resolve(&anonymous, None, Some("#NS.Foo"), Shape::Object).unwrap();
        assert_eq!(r.type_ref.kind, TypeKind::Untyped(None));

        let s = Scalar::String("x".into());
        let r = resolve(&ReaderOptions::default(), None, Some("#NS.Code"), Shape::Primitive(&s)).unwrap();
        assert_eq!(r.type_ref, TypeRef::type_definition("NS.Code"));
    }

    #[test]
    fn derived_types_narrow_declared_ones() {
        let declared = TypeRef::complex("NS.Address").not_null();
        let r = resolve(&ReaderOptions::default(), Some(&declared), Some("#NS.HomeAddress"), Shape::Object).unwrap();
        assert_eq!(r.type_ref, TypeRef::complex("NS.HomeAddress").not_null());
        assert!(matches!(
            resolve(&ReaderOptions::default(), Some(&declared), Some("#NS.Other"), Shape::Object),
            Err(ReaderError::IncompatibleType { .. })
        ));
    }

    #[test]
    fn collection_boundary() {
        let scalar_type = TypeRef::primitive(PrimitiveKind::String);
        assert!(matches!(
            resolve(&ReaderOptions::default(), Some(&scalar_type), None, Shape::Array),
            Err(ReaderError::UnexpectedCollection(_))
        ));
        let collection = TypeRef::collection(scalar_type);
        let s = Scalar::String("x".into());
        assert!(matches!(
            resolve(&ReaderOptions::default(), Some(&collection), None, Shape::Primitive(&s)),
            Err(ReaderError::CollectionExpected(_))
        ));
        assert!(matches!(
            resolve(&ReaderOptions::default(), None, Some("#NS.Address"), Shape::Array),
            Err(ReaderError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn untyped_as_string_falls_back_to_inference() {
        let options = ReaderOptions {
            read_untyped_as_string: true,
            ..ReaderOptions::default()
        };
        let n = Scalar::Number("2.5".into());
        let r = resolve(&options, Some(&TypeRef::untyped()), None, Shape::Primitive(&n)).unwrap();
        assert_eq!(r.type_ref, TypeRef::primitive(PrimitiveKind::Decimal));
        assert!(r.inferred);
    }

    #[test]
    fn caller_resolver_classifies_primitives() {
        let options = ReaderOptions {
            primitive_type_resolver: Some(Arc::new(|name, _| {
                (name == Some("P")).then(|| TypeRef::primitive(PrimitiveKind::Guid))
            })),
            ..ReaderOptions::default()
        };
        let s = Scalar::String("x".into());
        let r = resolve(&options, None, None, Shape::Primitive(&s)).unwrap();
        assert_eq!(r.type_ref, TypeRef::primitive(PrimitiveKind::Guid));
    }

    #[test]
    fn lookahead_finds_type_and_rewinds() {
        let mut reader = JsonReader::from_complete(r##"{"A":{"@odata.type":"#X"},"@odata.type":"#NS.T"}"##, false);
        reader.read().unwrap();
        assert_eq!(peek_object_type(&mut reader).unwrap().as_deref(), Some("#NS.T"));
        assert_eq!(reader.token(), &Token::StartObject);
        assert_eq!(reader.read().unwrap(), &Token::Property("A".into()));
    }
}
