#![no_main]
use std::{cell::RefCell, sync::Arc};

use arbitrary::Arbitrary;
use jsonlight::{
    EdmModel, MessageKind, PrimitiveKind, ReaderOptions, ReaderTarget, ResourceReader, SharedModel, StructuredType,
    TypeRef,
};
use libfuzzer_sys::{fuzz_mutator, fuzz_target, fuzzer_mutate};
use rand::{Rng, RngCore, SeedableRng, rngs::SmallRng};
use serde_json::{Map, Value};

const HEADER: usize = 5; // 1 flag + 4-byte seed

thread_local! {
    static RNG: RefCell<SmallRng> = RefCell::new(SmallRng::from_os_rng());
    static MODEL: SharedModel = Arc::new(model());
}

static CONTEXTS: &[&str] = &[
    "$metadata#Foo",
    "$metadata#Foo/$entity",
    "$metadata#Orders",
    "$metadata#Orders/$entity",
    "$metadata#Orders/$delta",
    "$metadata#Me",
    "$metadata#Collection(Edm.String)",
    "$metadata#Edm.Int32",
    "$metadata#Nowhere",
];

static MEMBERS: &[&str] = &[
    "@odata.type",
    "@odata.id",
    "@odata.etag",
    "@odata.count",
    "@odata.nextLink",
    "@odata.deltaLink",
    "@odata.removed",
    "@ns.note",
    "value",
    "Id",
    "Name",
    "ShipTo",
    "Notes",
    "Customer",
    "Customer@odata.navigationLink",
    "Customer@odata.bind",
    "Lines",
    "Lines@odata.nextLink",
    "Lines@odata.bind",
    "Zip",
    "Zip@odata.type",
];

fn model() -> EdmModel {
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

fn with_rng<F, R>(f: F) -> R
where
    F: FnOnce(&mut SmallRng) -> R,
{
    RNG.with(|cell| f(&mut cell.borrow_mut()))
}

fn mutator(data: &mut [u8], size: usize, max_size: usize, seed: u32) -> usize {
    if size < HEADER || seed.is_multiple_of(10) {
        data[0] = with_rng(|rng| rng.next_u32() as u8 & 0x0F);
        data[1..5].copy_from_slice(&with_rng(|rng| rng.next_u32().to_le_bytes()));
        HEADER + append_payload(&mut data[HEADER..], size, max_size - HEADER)
    } else {
        fuzzer_mutate(data, size, max_size)
    }
}

/// Writes an object that looks like a payload: a context URL followed by
/// members whose names the model knows, with arbitrary values.
fn append_payload(data: &mut [u8], size: usize, limit: usize) -> usize {
    let mut object = Map::new();
    if with_rng(|rng| rng.random_bool(0.9)) {
        let context = with_rng(|rng| CONTEXTS[rng.random_range(0..CONTEXTS.len())]);
        object.insert("@odata.context".to_owned(), Value::String(context.to_owned()));
    }
    let members = with_rng(|rng| rng.random_range(0..8));
    for _ in 0..members {
        let name = with_rng(|rng| MEMBERS[rng.random_range(0..MEMBERS.len())]);
        object.insert(name.to_owned(), arbitrary_value(size, limit).0);
    }

    let serialized = serde_json::to_vec(&Value::Object(object)).unwrap_or_default();
    let len = serialized.len().min(limit);
    data[..len].copy_from_slice(&serialized[..len]);
    len
}

fn arbitrary_value(size: usize, limit: usize) -> ArbitraryValue {
    loop {
        let s = with_rng(|rng| rng.random_range(0..=size.max(1)).min(limit));
        let bytes: Vec<u8> = with_rng(|rng| (0..s).map(|_| rng.random::<u8>()).collect());
        if let Ok(value) = ArbitraryValue::arbitrary(&mut arbitrary::Unstructured::new(&bytes)) {
            return value;
        }
    }
}

fuzz_mutator!(|data: &mut [u8], size: usize, max_size: usize, seed: u32| {
    mutator(data, size, max_size, seed)
});

#[derive(Debug)]
struct ArbitraryValue(Value);

impl<'a> Arbitrary<'a> for ArbitraryValue {
    fn arbitrary(u: &mut arbitrary::Unstructured<'_>) -> arbitrary::Result<Self> {
        let value = match u.choose_index(21)? {
            0 => Value::Null,
            1 => Value::Bool(u.arbitrary()?),
            2 => {
                let n: f64 = u.arbitrary()?;
                Value::Number(serde_json::Number::from_f64(n).ok_or(arbitrary::Error::IncorrectFormat)?)
            }
            3 => Value::Number(u.arbitrary::<i32>()?.into()),
            4..=10 => Value::String(u.arbitrary()?),
            11..=15 => {
                let elems: Vec<ArbitraryValue> = u.arbitrary()?;
                Value::Array(elems.into_iter().map(|v| v.0).collect())
            }
            16..=20 => {
                let m: Vec<(String, ArbitraryValue)> = u.arbitrary()?;
                Value::Object(m.into_iter().map(|(k, v)| (k, v.0)).collect())
            }
            _ => Err(arbitrary::Error::IncorrectFormat)?,
        };
        Ok(ArbitraryValue(value))
    }
}

fn reader(data: &[u8]) {
    if data.len() < HEADER {
        return;
    }

    let flags = data[0];
    let split_seed = u32::from_le_bytes([data[1], data[2], data[3], data[4]]) as usize;
    let data = &data[HEADER..];

    let options = ReaderOptions {
        enable_reordering: flags & 1 != 0,
        message_kind: if flags & 2 != 0 {
            MessageKind::Request
        } else {
            MessageKind::Response
        },
        read_untyped_as_string: flags & 4 != 0,
        throw_on_undeclared_property: flags & 8 != 0,
        chunk_size: split_seed % 64 + 1,
        ..ReaderOptions::default()
    };
    let target = match (split_seed >> 8) % 4 {
        0 => ReaderTarget::resource_set("Orders"),
        1 => ReaderTarget::resource("Foo"),
        _ => ReaderTarget::default(),
    };

    let model = MODEL.with(Arc::clone);
    for event in ResourceReader::from_reader(data, model, target, options) {
        if event.is_err() {
            break;
        }
    }
}

fuzz_target!(|data: &[u8]| reader(data));
