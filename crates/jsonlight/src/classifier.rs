//! Classification of object members.
//!
//! [`classify`] scans forward from the current `Property` or `}` token,
//! collecting property annotations along the way, and stops at the first
//! member the caller has to act on.

use log::debug;

use crate::{
    annotations::{self, AnnotationValue, MemberName, PropertyAndAnnotationCollector},
    error::{ReaderError, Result},
    item::ODataValue,
    json_reader::JsonReader,
    options::ReaderOptions,
    token::{Scalar, Token},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PropertyKind {
    /// The reader is on `}`.
    EndOfObject,
    /// The reader is on the value.
    PropertyWithValue,
    /// Only annotations were found for the property. The reader is on the
    /// member after them.
    PropertyWithoutValue,
    /// A reserved `@odata.*` annotation; the reader is on the value.
    ODataInstanceAnnotation,
    /// The reader is on the value.
    CustomInstanceAnnotation,
    /// A `#NS.Operation` member; the reader is on the value.
    MetadataReferenceProperty,
    /// `Nav@delta`; the reader is on the value.
    NestedDeltaResourceSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Classified {
    pub kind: PropertyKind,
    /// Property name, or annotation name for instance annotations.
    pub name: String,
}

impl Classified {
    fn new(kind: PropertyKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

/// Reads the value of a custom annotation; called with the reader on the
/// value and the annotation name.
pub(crate) type CustomValueReader<'r> = dyn FnMut(&mut JsonReader, &str) -> Result<ODataValue> + 'r;

/// Classifies the next member of the object the reader is in.
///
/// # Errors
///
/// Duplicate members, annotations of instance annotations that never show
/// up, malformed annotation values and read errors.
pub(crate) fn classify(
    reader: &mut JsonReader,
    collector: &mut PropertyAndAnnotationCollector,
    options: &ReaderOptions,
    read_custom: &mut CustomValueReader<'_>,
) -> Result<Classified> {
    // the property whose annotations are being collected
    let mut pending: Option<String> = None;
    loop {
        let name = match reader.token() {
            Token::EndObject => {
                return match pending {
                    Some(x) => without_value(x, collector),
                    None => Ok(Classified::new(PropertyKind::EndOfObject, String::new())),
                };
            }
            Token::Property(name) => name.clone(),
            other => return Err(ReaderError::unexpected("a property or '}'", other)),
        };

        let member = MemberName::parse(&name);
        let owner = match &member {
            MemberName::Data(n) | MemberName::MetadataReference(n) => n.clone(),
            MemberName::PropertyAnnotation { property, .. } => property.clone(),
            MemberName::InstanceAnnotation(a) => format!("@{a}"),
        };
        let previous = pending.take();
        if let Some(x) = previous.as_ref().filter(|x| **x != owner) {
            return without_value(x.clone(), collector);
        }

        match member {
            MemberName::PropertyAnnotation { property, annotation } => {
                if annotation == annotations::DELTA {
                    collector.mark_processed(&property)?;
                    reader.read()?;
                    return Ok(Classified::new(PropertyKind::NestedDeltaResourceSet, property));
                }
                let skip = if annotations::is_odata(&annotation) {
                    !annotations::is_known_property_annotation(&annotation)
                } else {
                    !options.include_annotation(&annotation)
                };
                reader.read()?;
                if skip {
                    debug!("skipping property annotation '{name}'");
                    reader.skip_value()?;
                    pending = previous;
                    continue;
                }
                let value = read_annotation_value(reader, &annotation, read_custom)?;
                collector.add_annotation(&property, &annotation, value)?;
                pending = Some(property);
            }
            MemberName::InstanceAnnotation(annotation) => {
                if annotations::is_odata(&annotation) && !annotations::is_known_instance_annotation(&annotation) {
                    debug!("skipping unknown instance annotation '{name}'");
                    reader.read()?;
                    reader.skip_value()?;
                    continue;
                }
                collector.mark_processed(&owner)?;
                reader.read()?;
                if annotations::is_odata(&annotation) {
                    return Ok(Classified::new(PropertyKind::ODataInstanceAnnotation, annotation));
                }
                if !options.include_annotation(&annotation) {
                    debug!("annotation filter skipped '{name}'");
                    reader.skip_value()?;
                    continue;
                }
                return Ok(Classified::new(PropertyKind::CustomInstanceAnnotation, annotation));
            }
            MemberName::MetadataReference(n) => {
                collector.mark_processed(&n)?;
                reader.read()?;
                return Ok(Classified::new(PropertyKind::MetadataReferenceProperty, n));
            }
            MemberName::Data(n) => {
                collector.mark_processed(&n)?;
                reader.read()?;
                return Ok(Classified::new(PropertyKind::PropertyWithValue, n));
            }
        }
    }
}

fn without_value(name: String, collector: &mut PropertyAndAnnotationCollector) -> Result<Classified> {
    if let Some(target) = name.strip_prefix('@') {
        if collector.annotation(&name, annotations::TYPE).is_some() {
            return Err(ReaderError::TypeAnnotationWithoutValue(target.to_owned()));
        }
        let annotation = collector
            .annotations(&name)
            .first()
            .map(|(a, _)| a.clone())
            .unwrap_or_default();
        return Err(ReaderError::AnnotationWithoutValue {
            annotation,
            target: target.to_owned(),
        });
    }
    collector.mark_processed(&name)?;
    Ok(Classified::new(PropertyKind::PropertyWithoutValue, name))
}

fn read_annotation_value(
    reader: &mut JsonReader,
    annotation: &str,
    read_custom: &mut CustomValueReader<'_>,
) -> Result<AnnotationValue> {
    match annotation {
        annotations::COUNT => read_count(reader).map(AnnotationValue::Count),
        annotations::BIND if *reader.token() == Token::StartArray => {
            reader.read()?;
            let mut links = Vec::new();
            while *reader.token() != Token::EndArray {
                links.push(reader.read_string()?);
            }
            reader.read()?;
            Ok(AnnotationValue::Links(links))
        }
        a if annotations::is_odata(a) => reader.read_string().map(AnnotationValue::Text),
        a => read_custom(reader, a).map(AnnotationValue::Custom),
    }
}

/// Reads an `odata.count` value, a number or a quoted number.
pub(crate) fn read_count(reader: &mut JsonReader) -> Result<i64> {
    let count = match reader.token() {
        Token::Primitive(Scalar::Number(n) | Scalar::String(n)) => {
            n.parse::<i64>().map_err(|_| ReaderError::Conversion {
                type_name: "Edm.Int64".to_owned(),
                value: n.clone(),
                reason: "odata.count must be an integer",
            })?
        }
        other => return Err(ReaderError::unexpected("an odata.count value", other)),
    };
    reader.read()?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::{PropertyKind, classify};
    use crate::{
        annotations::{self, AnnotationValue, PropertyAndAnnotationCollector},
        error::{ReaderError, Result},
        item::ODataValue,
        json_reader::JsonReader,
        options::ReaderOptions,
    };

    fn classify_all(json: &str, options: &ReaderOptions) -> Result<(Vec<(PropertyKind, String)>, PropertyAndAnnotationCollector)> {
        let mut reader = JsonReader::from_complete(json, false);
        reader.read()?;
        reader.read()?;
        let mut collector = PropertyAndAnnotationCollector::new();
        let mut out = Vec::new();
        let mut read_custom = |r: &mut JsonReader, _: &str| -> Result<ODataValue> {
            Ok(ODataValue::Untyped(r.read_raw_value()?.to_string()))
        };
        loop {
            let c = classify(&mut reader, &mut collector, options, &mut read_custom)?;
            out.push((c.kind, c.name));
            match c.kind {
                PropertyKind::EndOfObject => return Ok((out, collector)),
                PropertyKind::PropertyWithoutValue => {}
                _ => reader.skip_value()?,
            }
        }
    }

    #[test]
    fn taxonomy() {
        let (kinds, collector) = classify_all(
            r##"{"@odata.context":"c","@ns.note":1,"@odata.unknown":2,"Id@odata.type":"#Int32","Id":1,
                "Nav@odata.navigationLink":"n","#NS.Act":{},"Delta@delta":[],"Name@odata.future":0,"Name":"x"}"##,
            &ReaderOptions::default(),
        )
        .unwrap();
        assert_eq!(
            kinds,
            [
                (PropertyKind::ODataInstanceAnnotation, "odata.context".to_owned()),
                (PropertyKind::CustomInstanceAnnotation, "ns.note".to_owned()),
                (PropertyKind::PropertyWithValue, "Id".to_owned()),
                (PropertyKind::PropertyWithoutValue, "Nav".to_owned()),
                (PropertyKind::MetadataReferenceProperty, "#NS.Act".to_owned()),
                (PropertyKind::NestedDeltaResourceSet, "Delta".to_owned()),
                (PropertyKind::PropertyWithValue, "Name".to_owned()),
                (PropertyKind::EndOfObject, String::new()),
            ]
        );
        assert_eq!(collector.text("Id", annotations::TYPE), Some("#Int32"));
        assert_eq!(
            collector.annotation("Nav", annotations::NAVIGATION_LINK),
            Some(&AnnotationValue::Text("n".into()))
        );
    }

    #[test]
    fn property_without_value_at_end_of_object() {
        let (kinds, _) = classify_all(r#"{"Nav@odata.count":3}"#, &ReaderOptions::default()).unwrap();
        assert_eq!(kinds[0], (PropertyKind::PropertyWithoutValue, "Nav".to_owned()));
    }

    #[test]
    fn filtered_custom_annotations_are_skipped() {
        let options = ReaderOptions::default().with_annotation_patterns(&["keep.*"]);
        let (kinds, collector) =
            classify_all(r#"{"@drop.me":1,"@keep.me":2,"P@drop.x":3,"P@keep.y":4,"P":5}"#, &options).unwrap();
        assert_eq!(kinds[0], (PropertyKind::CustomInstanceAnnotation, "keep.me".to_owned()));
        assert_eq!(kinds[1], (PropertyKind::PropertyWithValue, "P".to_owned()));
        assert_eq!(collector.custom("P").map(|(a, _)| a).collect::<Vec<_>>(), ["keep.y"]);
    }

    #[test]
    fn duplicate_property_is_an_error() {
        let err = classify_all(r#"{"Id":1,"Id":1}"#, &ReaderOptions::default()).unwrap_err();
        assert!(matches!(err, ReaderError::DuplicateProperty(name) if name == "Id"));
    }

    #[test]
    fn annotation_of_missing_instance_annotation() {
        let err = classify_all(r##"{"@ns.a@odata.type":"#Int32","X":1}"##, &ReaderOptions::default()).unwrap_err();
        assert!(matches!(err, ReaderError::TypeAnnotationWithoutValue(t) if t == "ns.a"));

        let err = classify_all(r#"{"@ns.a@ns.b":1}"#, &ReaderOptions::default()).unwrap_err();
        assert!(matches!(err, ReaderError::AnnotationWithoutValue { annotation, .. } if annotation == "ns.b"));

        let (kinds, _) =
            classify_all(r##"{"@ns.a@odata.type":"#Int32","@ns.a":1}"##, &ReaderOptions::default()).unwrap();
        assert_eq!(kinds[0], (PropertyKind::CustomInstanceAnnotation, "ns.a".to_owned()));
    }

    #[test]
    fn classification_is_repeatable_over_a_buffer() {
        let json = r##"{"A@odata.type":"#String","A":"x","@ns.n":1,"B":2}"##;
        let mut reader = JsonReader::from_complete(json, false);
        reader.read().unwrap();
        reader.read().unwrap();
        let options = ReaderOptions::default();
        let mut read_custom = |r: &mut JsonReader, _: &str| -> Result<ODataValue> {
            Ok(ODataValue::Untyped(r.read_raw_value()?.to_string()))
        };
        let mut pass = |reader: &mut JsonReader| {
            let mut collector = PropertyAndAnnotationCollector::new();
            let mut kinds = Vec::new();
            loop {
                let c = classify(reader, &mut collector, &options, &mut read_custom).unwrap();
                if c.kind == PropertyKind::EndOfObject {
                    return kinds;
                }
                kinds.push(c);
                reader.skip_value().unwrap();
            }
        };
        reader.start_buffering();
        let first = pass(&mut reader);
        reader.stop_buffering();
        let second = pass(&mut reader);
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }
}
