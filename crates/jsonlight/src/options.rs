#![allow(clippy::struct_excessive_bools)]

use std::{fmt, sync::Arc};

use crate::{edm::TypeRef, token::Scalar};

/// Whether the payload is a request body or a response body.
///
/// Responses require `@odata.context` and get deferred links synthesized for
/// omitted navigation properties. Requests may bind related resources with
/// `@odata.bind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageKind {
    /// A request body.
    Request,
    /// A response body.
    #[default]
    Response,
}

/// Decides whether a custom annotation is materialized or skipped.
pub type AnnotationFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Classifies a primitive value whose type the model does not declare.
///
/// Called with the property name (when there is one) and the scalar.
pub type PrimitiveTypeResolver = Arc<dyn Fn(Option<&str>, &Scalar) -> Option<TypeRef> + Send + Sync>;

/// Configuration options for the resource reader.
///
/// # Examples
///
/// ```rust
/// use jsonlight::{MessageKind, ReaderOptions};
///
/// let options = ReaderOptions {
///     message_kind: MessageKind::Request,
///     enable_reordering: false,
///     ..Default::default()
/// };
/// assert_eq!(options.max_nesting_depth, 100);
/// ```
#[derive(Clone)]
pub struct ReaderOptions {
    /// # Default
    ///
    /// [`MessageKind::Response`]
    pub message_kind: MessageKind,

    /// Maximum nesting of resources, collections and complex values.
    ///
    /// # Default
    ///
    /// `100`
    pub max_nesting_depth: usize,

    /// Buffer each object and move its control annotations in front of the
    /// data they describe. Turning this off corresponds to a producer that
    /// promised `odata.streaming=true` ordering.
    ///
    /// # Default
    ///
    /// `true`
    pub enable_reordering: bool,

    /// Keep `Edm.Untyped` values as raw JSON text instead of reading them
    /// into resources and collections.
    ///
    /// # Default
    ///
    /// `false`
    pub read_untyped_as_string: bool,

    /// `Edm.Int64` and `Edm.Decimal` values are quoted strings, and
    /// fractional numbers of unknown type are read as `Edm.Double`.
    ///
    /// # Default
    ///
    /// `false`
    pub ieee754_compatible: bool,

    /// Name untyped structured values after their `@odata.type`.
    ///
    /// # Default
    ///
    /// `true`
    pub generate_untyped_type_names: bool,

    /// A property not declared on a non-open type is an error. When `false`
    /// it is read as an untyped dynamic property.
    ///
    /// # Default
    ///
    /// `true`
    pub throw_on_undeclared_property: bool,

    /// # Default
    ///
    /// Every custom annotation is materialized.
    pub annotation_filter: AnnotationFilter,

    /// # Default
    ///
    /// `None`
    pub primitive_type_resolver: Option<PrimitiveTypeResolver>,

    /// Bytes requested from the source per refill.
    ///
    /// # Default
    ///
    /// `8192`
    pub chunk_size: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            message_kind: MessageKind::Response,
            max_nesting_depth: 100,
            enable_reordering: true,
            read_untyped_as_string: false,
            ieee754_compatible: false,
            generate_untyped_type_names: true,
            throw_on_undeclared_property: true,
            annotation_filter: Arc::new(|_| true),
            primitive_type_resolver: None,
            chunk_size: 8192,
        }
    }
}

impl ReaderOptions {
    /// Keeps only the custom annotations matching one of `patterns`. A
    /// pattern is a full name, `ns.*` or `*`; a leading `-` excludes.
    ///
    /// ```
    /// use jsonlight::ReaderOptions;
    ///
    /// let options = ReaderOptions::default().with_annotation_patterns(&["Display.*", "-Display.Secret"]);
    /// assert!((options.annotation_filter)("Display.Label"));
    /// assert!(!(options.annotation_filter)("Display.Secret"));
    /// assert!(!(options.annotation_filter)("Core.Description"));
    /// ```
    #[must_use]
    pub fn with_annotation_patterns(mut self, patterns: &[&str]) -> Self {
        let patterns: Vec<String> = patterns.iter().map(|p| (*p).to_owned()).collect();
        self.annotation_filter = Arc::new(move |name| annotation_matches(&patterns, name));
        self
    }

    pub(crate) fn include_annotation(&self, name: &str) -> bool {
        (self.annotation_filter)(name)
    }
}

/// The most specific matching pattern wins; exclusions win ties.
fn annotation_matches(patterns: &[String], name: &str) -> bool {
    let mut best: Option<(usize, bool)> = None;
    for pattern in patterns {
        let (include, body) = match pattern.strip_prefix('-') {
            Some(body) => (false, body),
            None => (true, pattern.as_str()),
        };
        let specificity = if body == "*" {
            0
        } else if let Some(ns) = body.strip_suffix(".*") {
            if !name.starts_with(ns) || name.as_bytes().get(ns.len()) != Some(&b'.') {
                continue;
            }
            1 + ns.len()
        } else if body == name {
            usize::MAX
        } else {
            continue;
        };
        best = match best {
            Some((s, inc)) if s > specificity || (s == specificity && !inc) => Some((s, inc)),
            _ => Some((specificity, include)),
        };
    }
    best.is_some_and(|(_, include)| include)
}

impl fmt::Debug for ReaderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderOptions")
            .field("message_kind", &self.message_kind)
            .field("max_nesting_depth", &self.max_nesting_depth)
            .field("enable_reordering", &self.enable_reordering)
            .field("read_untyped_as_string", &self.read_untyped_as_string)
            .field("ieee754_compatible", &self.ieee754_compatible)
            .field("generate_untyped_type_names", &self.generate_untyped_type_names)
            .field("throw_on_undeclared_property", &self.throw_on_undeclared_property)
            .field("primitive_type_resolver", &self.primitive_type_resolver.is_some())
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}
