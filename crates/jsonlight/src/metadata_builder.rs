//! Conventional identity and links for resources of response payloads.
//!
//! A resource in an entity set `Customers` with key `Id = 1` has the
//! canonical path `Customers(1)`; its id and edit link default to that path
//! under the service root, and its navigation properties link to
//! `Customers(1)/Nav`. Contained and unbound resources derive their path
//! from the parent's.

use crate::{
    item::{ODataValue, Resource},
    primitive::Primitive,
};

#[derive(Debug, Clone, Default)]
pub(crate) struct MetadataBuilder {
    service_root: String,
    /// Path of the set or single-valued navigation the resource lives in.
    container: Option<String>,
    single_valued: bool,
    canonical_path: Option<String>,
    reported: Vec<String>,
}

impl MetadataBuilder {
    pub(crate) fn new(service_root: &str, container: Option<String>, single_valued: bool) -> Self {
        Self {
            service_root: service_root.to_owned(),
            container,
            single_valued,
            canonical_path: None,
            reported: Vec::new(),
        }
    }

    /// Computes the canonical path from the key values read so far and
    /// fills in the id and edit link the payload left out.
    pub(crate) fn complete(&mut self, resource: &mut Resource, key: &[String]) {
        if self.canonical_path.is_none() {
            self.canonical_path = self.compute_path(resource, key);
        }
        let Some(path) = &self.canonical_path else {
            return;
        };
        let url = format!("{}{path}", self.service_root);
        if resource.id.is_none() {
            resource.id = Some(url.clone());
        }
        if resource.edit_link.is_none() && resource.read_link.is_none() {
            resource.edit_link = Some(url);
        }
    }

    fn compute_path(&self, resource: &Resource, key: &[String]) -> Option<String> {
        let container = self.container.as_deref()?;
        if self.single_valued {
            return Some(container.to_owned());
        }
        if key.is_empty() {
            return None;
        }
        let values = key
            .iter()
            .map(|k| resource.property(k).and_then(|p| key_literal(&p.value)))
            .collect::<Option<Vec<_>>>()?;
        let segment = match (key, values.as_slice()) {
            ([_], [value]) => value.clone(),
            _ => key
                .iter()
                .zip(&values)
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(","),
        };
        Some(format!("{container}({segment})"))
    }

    pub(crate) fn canonical_path(&self) -> Option<&str> {
        self.canonical_path.as_deref()
    }

    /// `{base}/{navigation}`, with the edit link, read link or id as base.
    pub(crate) fn navigation_link(resource: &Resource, navigation: &str) -> Option<String> {
        let base = resource
            .edit_link
            .as_deref()
            .or(resource.read_link.as_deref())
            .or(resource.id.as_deref())?;
        Some(format!("{base}/{navigation}"))
    }

    pub(crate) fn association_link(resource: &Resource, navigation: &str) -> Option<String> {
        Self::navigation_link(resource, navigation).map(|link| format!("{link}/$ref"))
    }

    /// Records that `navigation` was reported.
    pub(crate) fn mark_reported(&mut self, navigation: &str) {
        if !self.is_reported(navigation) {
            self.reported.push(navigation.to_owned());
        }
    }

    pub(crate) fn is_reported(&self, navigation: &str) -> bool {
        self.reported.iter().any(|n| n == navigation)
    }
}

/// The URL literal of a key value.
fn key_literal(value: &ODataValue) -> Option<String> {
    Some(match value {
        ODataValue::Primitive(p) | ODataValue::Defined { value: p, .. } => match p {
            Primitive::String(s) => format!("'{}'", s.replace('\'', "''")),
            Primitive::Boolean(b) => b.to_string(),
            Primitive::Byte(n) => n.to_string(),
            Primitive::SByte(n) => n.to_string(),
            Primitive::Int16(n) => n.to_string(),
            Primitive::Int32(n) => n.to_string(),
            Primitive::Int64(n) => n.to_string(),
            Primitive::Decimal(s)
            | Primitive::Guid(s)
            | Primitive::Date(s)
            | Primitive::DateTimeOffset(s)
            | Primitive::TimeOfDay(s) => s.clone(),
            Primitive::Duration(s) => format!("duration'{s}'"),
            Primitive::Binary(s) => format!("binary'{s}'"),
            Primitive::Single(_) | Primitive::Double(_) | Primitive::Stream(_) => return None,
        },
        ODataValue::Enum { type_name, value } => format!("{type_name}'{value}'"),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::MetadataBuilder;
    use crate::{
        item::{ODataValue, Property, Resource},
        primitive::Primitive,
    };

    fn resource(props: &[(&str, Primitive)]) -> Resource {
        Resource {
            properties: props
                .iter()
                .map(|(n, v)| Property {
                    name: (*n).to_owned(),
                    value: ODataValue::Primitive(v.clone()),
                    annotations: Vec::new(),
                })
                .collect(),
            ..Resource::default()
        }
    }

    #[test]
    fn single_and_composite_keys() {
        let mut r = resource(&[("Id", Primitive::Int32(1))]);
        let mut b = MetadataBuilder::new("http://host/svc/", Some("Customers".into()), false);
        b.complete(&mut r, &["Id".to_owned()]);
        assert_eq!(r.id.as_deref(), Some("http://host/svc/Customers(1)"));
        assert_eq!(r.edit_link.as_deref(), Some("http://host/svc/Customers(1)"));
        assert_eq!(
            MetadataBuilder::navigation_link(&r, "Orders").as_deref(),
            Some("http://host/svc/Customers(1)/Orders")
        );

        let mut r = resource(&[("A", Primitive::String("o'k".into())), ("B", Primitive::Int64(2))]);
        let mut b = MetadataBuilder::new("", Some("Pairs".into()), false);
        b.complete(&mut r, &["A".to_owned(), "B".to_owned()]);
        assert_eq!(b.canonical_path(), Some("Pairs(A='o''k',B=2)"));
    }

    #[test]
    fn payload_links_win_and_missing_keys_leave_links_alone() {
        let mut r = resource(&[("Id", Primitive::Int32(1))]);
        r.id = Some("given".into());
        let mut b = MetadataBuilder::new("", Some("Customers".into()), false);
        b.complete(&mut r, &["Id".to_owned()]);
        assert_eq!(r.id.as_deref(), Some("given"));
        assert_eq!(r.edit_link.as_deref(), Some("Customers(1)"));

        let mut r = resource(&[]);
        let mut b = MetadataBuilder::new("", Some("Customers".into()), false);
        b.complete(&mut r, &["Id".to_owned()]);
        assert_eq!(r.id, None);
        b.mark_reported("Orders");
        b.mark_reported("Orders");
        assert!(b.is_reported("Orders"));
        assert_eq!(b.reported, ["Orders"]);
    }
}
