#![allow(missing_docs, dead_code)]

use core::fmt::Write as _;
use std::{
    io::{self, Read},
    sync::Arc,
};

use jsonlight::{
    EdmModel, NestedResourceInfo, ODataValue, PrimitiveKind, ReaderEvent, Resource, ResourceSet, SharedModel,
    StructuredType, TypeRef,
};

pub fn model() -> SharedModel {
    Arc::new(
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
            .with_binding("Orders", "Customer", "Foo")
            .with_binding("Orders", "Lines", "Lines"),
    )
}

pub const ORDERS: &str = r#"{
    "@odata.context": "http://host/svc/$metadata#Orders",
    "value": [
        {
            "Id": 1,
            "ShipTo": { "City": "Oslo", "Zip": 150 },
            "Customer": { "Id": 9, "Name": "Zoë" },
            "Lines": [ { "No": 1 }, { "No": 2 } ]
        },
        { "Id": 2, "Customer": null }
    ]
}"#;

/// A source handing out `step` bytes per read.
pub struct Chunked {
    data: Vec<u8>,
    pos: usize,
    step: usize,
}

impl Chunked {
    pub fn new(data: &str, step: usize) -> Self {
        Self {
            data: data.as_bytes().to_vec(),
            pos: 0,
            step: step.max(1),
        }
    }

    pub fn next_chunk(&mut self, limit: usize) -> &[u8] {
        let n = self.step.min(limit).min(self.data.len() - self.pos);
        let start = self.pos;
        self.pos += n;
        &self.data[start..start + n]
    }
}

impl Read for Chunked {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let chunk = self.next_chunk(buf.len());
        let n = chunk.len();
        buf[..n].copy_from_slice(chunk);
        Ok(n)
    }
}

/// One line per event, indented by nesting.
pub fn render(events: &[ReaderEvent]) -> String {
    let mut lines = Vec::new();
    let mut depth = 0_usize;
    for event in events {
        let (line, opens, closes) = match event {
            ReaderEvent::ResourceSetStart(s) => (format!("ResourceSetStart {}", set(s)), true, false),
            ReaderEvent::ResourceSetEnd(s) => (format!("ResourceSetEnd {}", set(s)), false, true),
            ReaderEvent::ResourceStart(r) => (format!("ResourceStart {}", resource(r.as_ref())), true, false),
            ReaderEvent::ResourceEnd(r) => (format!("ResourceEnd {}", resource(r.as_ref())), false, true),
            ReaderEvent::NestedResourceInfoStart(n) => (format!("NestedResourceInfoStart {}", nested(n)), true, false),
            ReaderEvent::NestedResourceInfoEnd(n) => (format!("NestedResourceInfoEnd {}", nested(n)), false, true),
            ReaderEvent::Primitive(v) => (format!("Primitive {}", value(v)), false, false),
            ReaderEvent::EntityReferenceLink(l) => (format!("EntityReferenceLink {}", l.url), false, false),
        };
        if closes {
            depth = depth.saturating_sub(1);
        }
        lines.push(format!("{}{line}", "  ".repeat(depth)));
        if opens {
            depth += 1;
        }
    }
    lines.join("\n")
}

fn set(s: &ResourceSet) -> String {
    let mut out = s.type_name.clone().unwrap_or_else(|| "-".to_owned());
    if let Some(count) = s.count {
        write!(out, " count={count}").unwrap();
    }
    if let Some(next) = &s.next_link {
        write!(out, " next={next}").unwrap();
    }
    out
}

fn resource(r: Option<&Resource>) -> String {
    let Some(r) = r else {
        return "null".to_owned();
    };
    let mut out = r.type_name.clone().unwrap_or_else(|| "-".to_owned());
    if let Some(id) = &r.id {
        write!(out, " id={id}").unwrap();
    }
    for p in &r.properties {
        write!(out, " {}={}", p.name, value(&p.value)).unwrap();
    }
    out
}

fn nested(n: &NestedResourceInfo) -> String {
    let mut out = n.name.clone();
    if n.is_collection == Some(true) {
        out.push_str(" collection");
    }
    if n.is_complex {
        out.push_str(" complex");
    }
    if let Some(url) = &n.url {
        write!(out, " url={url}").unwrap();
    }
    out
}

fn value(v: &ODataValue) -> String {
    match v {
        ODataValue::Null => "null".to_owned(),
        ODataValue::Primitive(p) => format!("{p:?}"),
        other => format!("{other:?}"),
    }
}
