use std::sync::Arc;

use rstest::rstest;

use super::{kinds, model, read_all, request, streaming};
use crate::{ReaderError, ReaderEvent, ReaderOptions, ReaderState, ReaderTarget, ResourceReader};

#[test]
fn duplicate_property_fails_before_the_resource_is_reported() {
    let json = r#"{"@odata.context":"$metadata#Foo/$entity","Id":1,"Id":1}"#;
    let mut reader = ResourceReader::from_str(json, Arc::new(model()), ReaderTarget::default(), ReaderOptions::default());
    assert!(matches!(reader.next(), Some(Err(ReaderError::DuplicateProperty(name))) if name == "Id"));
    assert!(reader.next().is_none());
}

#[test]
fn failed_reader_is_poisoned() {
    let json = r#"{"@odata.context":"$metadata#Foo","value":[{"Id":2,"Id":2}]}"#;
    let mut reader = ResourceReader::from_str(json, Arc::new(model()), ReaderTarget::default(), streaming());
    assert!(reader.read().unwrap());
    assert_eq!(reader.state(), ReaderState::ResourceSetStart);
    assert!(matches!(reader.read(), Err(ReaderError::DuplicateProperty(_))));
    assert_eq!(reader.state(), ReaderState::Exception);
    assert!(matches!(reader.read(), Err(ReaderError::Poisoned)));
    assert_eq!(reader.core().event(), None);
}

#[test]
fn annotation_after_its_property() {
    let json = r##"{"@odata.context":"$metadata#Foo","value":[{"Id":1,"Id@odata.type":"#Int32"}]}"##;
    let leading = r##"{"@odata.context":"$metadata#Foo","value":[{"Id@odata.type":"#Int32","Id":1}]}"##;

    let events = read_all(json, ReaderTarget::resource_set("Foo"), ReaderOptions::default()).unwrap();
    let expected = read_all(leading, ReaderTarget::resource_set("Foo"), ReaderOptions::default()).unwrap();
    assert_eq!(events, expected);
    assert_eq!(
        kinds(&events),
        ["ResourceSetStart", "ResourceStart", "ResourceEnd", "ResourceSetEnd"]
    );

    let mut reader = ResourceReader::from_str(json, Arc::new(model()), ReaderTarget::resource_set("Foo"), streaming());
    assert!(matches!(reader.next(), Some(Ok(ReaderEvent::ResourceSetStart(_)))));
    assert!(matches!(reader.next(), Some(Err(ReaderError::UnexpectedAnnotation(a))) if a == "Id@odata.type"));
}

#[test]
fn type_annotation_after_data() {
    let json = r##"{"@odata.context":"$metadata#Foo/$entity","Id":1,"@odata.type":"#NS.Foo"}"##;
    let events = read_all(json, ReaderTarget::default(), ReaderOptions::default()).unwrap();
    let ReaderEvent::ResourceStart(Some(foo)) = &events[0] else {
        panic!("expected a resource, got {:?}", events[0]);
    };
    assert_eq!(foo.type_name.as_deref(), Some("NS.Foo"));

    let err = read_all(json, ReaderTarget::default(), streaming()).unwrap_err();
    assert!(matches!(err, ReaderError::TypeAnnotationNotFirst));
}

#[test]
fn trailing_type_of_a_value_payload() {
    let json = r##"{"@odata.context":"$metadata#Edm.String","value":"hi","value@odata.type":"#String"}"##;
    let mut reader = ResourceReader::from_str(json, Arc::new(model()), ReaderTarget::default(), streaming());
    assert!(matches!(reader.next(), Some(Ok(ReaderEvent::Primitive(_)))));
    assert!(matches!(reader.next(), Some(Err(ReaderError::TypeAnnotationNotFirst))));
}

#[test]
fn response_needs_a_context_url() {
    let err = read_all(r#"{"Id":1}"#, ReaderTarget::resource("Foo"), ReaderOptions::default()).unwrap_err();
    assert!(matches!(err, ReaderError::MissingContextUrl));

    let events = read_all(r#"{"Id":1}"#, ReaderTarget::resource("Foo"), request()).unwrap();
    assert_eq!(events.len(), 2);
}

#[test]
fn context_url_must_match_the_target() {
    let err = read_all(
        r#"{"@odata.context":"$metadata#Foo","value":[]}"#,
        ReaderTarget::resource_set("Orders"),
        ReaderOptions::default(),
    )
    .unwrap_err();
    assert!(
        matches!(&err, ReaderError::ContextUrlMismatch { expected, found } if expected == "Orders" && found == "$metadata#Foo"),
        "unexpected error: {err:?}"
    );

    let err = read_all(
        r#"{"@odata.context":"$metadata#Foo/$entity","Id":1}"#,
        ReaderTarget::resource_set("Foo"),
        ReaderOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, ReaderError::ContextUrlMismatch { .. }));
}

#[test]
fn unknown_context_url() {
    let err = read_all(
        r#"{"@odata.context":"$metadata#Nowhere","value":[]}"#,
        ReaderTarget::default(),
        ReaderOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, ReaderError::InvalidContextUrl(_)));
}

#[rstest]
#[case::reordering(ReaderOptions::default())]
#[case::streaming(streaming())]
fn nesting_depth_is_bounded(#[case] options: ReaderOptions) {
    let depth = 200;
    let json = format!(
        r#"{{"@odata.context":"$metadata#Foo/$entity","Id":1,"Deep":{}1{}}}"#,
        r#"{"a":"#.repeat(depth),
        "}".repeat(depth)
    );
    let err = read_all(&json, ReaderTarget::default(), options).unwrap_err();
    assert!(matches!(err, ReaderError::RecursionDepthExceeded { max: 100 }), "unexpected error: {err:?}");
}

#[rstest]
#[case::array_for_single_value(
    r#"{"@odata.context":"$metadata#Foo/$entity","Id":[1]}"#,
    |e: &ReaderError| matches!(e, ReaderError::UnexpectedCollection(name) if name == "Id")
)]
#[case::single_value_for_collection(
    r#"{"@odata.context":"$metadata#Orders/$entity","Id":1,"Notes":"x"}"#,
    |e: &ReaderError| matches!(e, ReaderError::CollectionExpected(name) if name == "Notes")
)]
#[case::undeclared_property(
    r#"{"@odata.context":"$metadata#Orders/$entity","Id":1,"Bogus":1}"#,
    |e: &ReaderError| matches!(e, ReaderError::UndeclaredProperty { name, type_name } if name == "Bogus" && type_name == "NS.Order")
)]
#[case::null_key(
    r#"{"@odata.context":"$metadata#Foo/$entity","Id":null}"#,
    |e: &ReaderError| matches!(e, ReaderError::NullNotAllowed { name, .. } if name == "Id")
)]
#[case::primitive_for_complex(
    r#"{"@odata.context":"$metadata#Orders/$entity","Id":1,"ShipTo":"x"}"#,
    |e: &ReaderError| matches!(e, ReaderError::TypeMismatch { .. })
)]
#[case::primitive_in_entity_set(
    r#"{"@odata.context":"$metadata#Foo","value":[1]}"#,
    |e: &ReaderError| matches!(e, ReaderError::TypeMismatch { .. })
)]
#[case::set_without_value(
    r#"{"@odata.context":"$metadata#Foo","@odata.count":1}"#,
    |e: &ReaderError| matches!(e, ReaderError::CollectionExpected(name) if name == "value")
)]
#[case::bad_count(
    r#"{"@odata.context":"$metadata#Foo","@odata.count":"many","value":[]}"#,
    |e: &ReaderError| matches!(e, ReaderError::Conversion { .. })
)]
#[case::malformed_json(
    r#"{"@odata.context":"$metadata#Foo","value":[}"#,
    |e: &ReaderError| matches!(e, ReaderError::Syntax { .. } | ReaderError::UnbalancedNesting)
)]
fn invalid_payloads(#[case] json: &str, #[case] check: fn(&ReaderError) -> bool) {
    for options in [ReaderOptions::default(), streaming()] {
        let err = read_all(json, ReaderTarget::default(), options).unwrap_err();
        assert!(check(&err), "unexpected error: {err:?}");
    }
}

#[test]
fn undeclared_properties_can_be_read_as_dynamic() {
    let options = ReaderOptions {
        throw_on_undeclared_property: false,
        ..ReaderOptions::default()
    };
    let json = r#"{"@odata.context":"$metadata#Orders/$entity","Id":1,"Bogus":1}"#;
    let events = read_all(json, ReaderTarget::default(), options).unwrap();
    let Some(ReaderEvent::ResourceEnd(Some(order))) = events.last() else {
        panic!("expected a resource, got {events:?}");
    };
    assert!(order.property("Bogus").is_some());
}
