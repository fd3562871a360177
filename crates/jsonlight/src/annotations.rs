//! Annotation names and the per-object property/annotation bookkeeping.

use std::{borrow::Cow, collections::HashMap};

use crate::{
    error::{ReaderError, Result},
    item::ODataValue,
};

pub const ODATA_PREFIX: &str = "odata.";

pub const CONTEXT: &str = "odata.context";
pub const TYPE: &str = "odata.type";
pub const ID: &str = "odata.id";
pub const ETAG: &str = "odata.etag";
pub const REMOVED: &str = "odata.removed";
pub const EDIT_LINK: &str = "odata.editLink";
pub const READ_LINK: &str = "odata.readLink";
pub const COUNT: &str = "odata.count";
pub const NEXT_LINK: &str = "odata.nextLink";
pub const DELTA_LINK: &str = "odata.deltaLink";
pub const NAVIGATION_LINK: &str = "odata.navigationLink";
pub const ASSOCIATION_LINK: &str = "odata.associationLink";
pub const BIND: &str = "odata.bind";
pub const DELTA: &str = "odata.delta";
pub const MEDIA_EDIT_LINK: &str = "odata.mediaEditLink";
pub const MEDIA_READ_LINK: &str = "odata.mediaReadLink";
pub const MEDIA_CONTENT_TYPE: &str = "odata.mediaContentType";
pub const MEDIA_ETAG: &str = "odata.mediaEtag";

const INSTANCE_ANNOTATIONS: &[&str] = &[
    CONTEXT,
    TYPE,
    ID,
    ETAG,
    REMOVED,
    EDIT_LINK,
    READ_LINK,
    COUNT,
    NEXT_LINK,
    DELTA_LINK,
    MEDIA_EDIT_LINK,
    MEDIA_READ_LINK,
    MEDIA_CONTENT_TYPE,
    MEDIA_ETAG,
];

const PROPERTY_ANNOTATIONS: &[&str] = &[
    CONTEXT,
    TYPE,
    COUNT,
    NEXT_LINK,
    DELTA_LINK,
    NAVIGATION_LINK,
    ASSOCIATION_LINK,
    BIND,
    MEDIA_EDIT_LINK,
    MEDIA_READ_LINK,
    MEDIA_CONTENT_TYPE,
    MEDIA_ETAG,
];

/// Expands the prefix-less reserved names of the 4.01 format (`@type`,
/// `Nav@delta`) to their `odata.` form.
#[must_use]
pub fn normalize(annotation: &str) -> Cow<'_, str> {
    if annotation.contains('.') {
        return Cow::Borrowed(annotation);
    }
    let qualified = format!("{ODATA_PREFIX}{annotation}");
    if qualified == DELTA
        || INSTANCE_ANNOTATIONS.contains(&qualified.as_str())
        || PROPERTY_ANNOTATIONS.contains(&qualified.as_str())
    {
        Cow::Owned(qualified)
    } else {
        Cow::Borrowed(annotation)
    }
}

#[must_use]
pub fn is_odata(annotation: &str) -> bool {
    annotation.starts_with(ODATA_PREFIX)
}

#[must_use]
pub fn is_known_instance_annotation(annotation: &str) -> bool {
    INSTANCE_ANNOTATIONS.contains(&annotation)
}

#[must_use]
pub fn is_known_property_annotation(annotation: &str) -> bool {
    PROPERTY_ANNOTATIONS.contains(&annotation)
}

/// A JSON member name taken apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberName {
    /// `Name`
    Data(String),
    /// `Name@ns.term`; `Name` may itself be an instance annotation.
    PropertyAnnotation {
        /// The annotated property or instance annotation.
        property: String,
        /// The term, with `odata.` normalized.
        annotation: String,
    },
    /// `@ns.term`
    InstanceAnnotation(String),
    /// `#NS.Action`
    MetadataReference(String),
}

impl MemberName {
    /// Splits a member name at the first `@` after its first character.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        // an `@` past the first character separates property and annotation
        if let Some((at, _)) = name.char_indices().skip(1).find(|&(_, c)| c == '@') {
            return MemberName::PropertyAnnotation {
                property: name[..at].to_owned(),
                annotation: normalize(&name[at + 1..]).into_owned(),
            };
        }
        if let Some(annotation) = name.strip_prefix('@') {
            return MemberName::InstanceAnnotation(normalize(annotation).into_owned());
        }
        if name.contains('#') {
            return MemberName::MetadataReference(name.to_owned());
        }
        MemberName::Data(name.to_owned())
    }
}

/// The value of a property annotation.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationValue {
    /// `odata.*` annotations with a string value.
    Text(String),
    /// `odata.count`
    Count(i64),
    /// `odata.bind` given as an array.
    Links(Vec<String>),
    /// A custom annotation, materialized.
    Custom(ODataValue),
}

#[derive(Debug, Clone, Default)]
struct Entry {
    annotations: Vec<(String, AnnotationValue)>,
    processed: bool,
}

/// Tracks, for one JSON object, the annotations collected per property and
/// which names have already been consumed.
#[derive(Debug, Clone, Default)]
pub struct PropertyAndAnnotationCollector {
    entries: HashMap<String, Entry>,
    processed_data: bool,
}

impl PropertyAndAnnotationCollector {
    /// An empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry_mut(&mut self, name: &str) -> &mut Entry {
        self.entries.entry(name.to_owned()).or_default()
    }

    fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.get(name)
    }

    /// Registers an annotation of `property`.
    ///
    /// # Errors
    ///
    /// The annotation was already given for `property`, or `property` was
    /// already read.
    pub fn add_annotation(&mut self, property: &str, annotation: &str, value: AnnotationValue) -> Result<()> {
        let entry = self.entry_mut(property);
        if entry.processed {
            return Err(ReaderError::UnexpectedAnnotation(format!("{property}@{annotation}")));
        }
        if entry.annotations.iter().any(|(a, _)| a == annotation) {
            return Err(ReaderError::DuplicateAnnotation {
                name: property.to_owned(),
                annotation: annotation.to_owned(),
            });
        }
        entry.annotations.push((annotation.to_owned(), value));
        Ok(())
    }

    /// Marks `name` as consumed.
    ///
    /// # Errors
    ///
    /// `name` was already consumed in this object.
    pub fn mark_processed(&mut self, name: &str) -> Result<()> {
        let entry = self.entry_mut(name);
        if entry.processed {
            return Err(match name.strip_prefix('@') {
                Some(annotation) => ReaderError::DuplicateAnnotation {
                    name: "the enclosing object".to_owned(),
                    annotation: annotation.to_owned(),
                },
                None => ReaderError::DuplicateProperty(name.to_owned()),
            });
        }
        entry.processed = true;
        if !name.starts_with('@') && !name.contains('#') {
            self.processed_data = true;
        }
        Ok(())
    }

    /// Whether `name` was already consumed.
    #[must_use]
    pub fn is_processed(&self, name: &str) -> bool {
        self.entry(name).is_some_and(|e| e.processed)
    }

    /// Annotations of `property`, in arrival order.
    #[must_use]
    pub fn annotations(&self, property: &str) -> &[(String, AnnotationValue)] {
        self.entry(property).map_or(&[], |e| &e.annotations)
    }

    /// The value of `property@annotation`.
    #[must_use]
    pub fn annotation(&self, property: &str, annotation: &str) -> Option<&AnnotationValue> {
        self.annotations(property)
            .iter()
            .find(|(a, _)| a == annotation)
            .map(|(_, v)| v)
    }

    /// The value of `property@annotation` when it is text.
    #[must_use]
    pub fn text(&self, property: &str, annotation: &str) -> Option<&str> {
        match self.annotation(property, annotation) {
            Some(AnnotationValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// `property@odata.count`
    #[must_use]
    pub fn count(&self, property: &str) -> Option<i64> {
        match self.annotation(property, COUNT) {
            Some(AnnotationValue::Count(c)) => Some(*c),
            _ => None,
        }
    }

    /// Custom annotations of `property`, in arrival order.
    pub fn custom(&self, property: &str) -> impl Iterator<Item = (&str, &ODataValue)> {
        self.annotations(property).iter().filter_map(|(a, v)| match v {
            AnnotationValue::Custom(value) => Some((a.as_str(), value)),
            _ => None,
        })
    }

    /// Any data property consumed so far.
    #[must_use]
    pub fn has_processed_data(&self) -> bool {
        self.processed_data
    }
}
