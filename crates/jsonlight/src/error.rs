use thiserror::Error;

/// Every way a read can fail.
///
/// All variants except [`ReaderError::Pending`] are fatal: once a reader has
/// returned one of them it stays in the `Exception` state and further reads
/// return [`ReaderError::Poisoned`].
#[derive(Error, Debug)]
pub enum ReaderError {
    // ── structural / grammar ────────────────────────────────────────────
    /// Malformed JSON.
    #[error("syntax error: {message} at {line}:{column}")]
    Syntax {
        /// What the tokenizer found.
        message: String,
        /// 1-based line of the offending character.
        line: usize,
        /// 1-based column of the offending character.
        column: usize,
    },
    /// Well-formed JSON in a place the payload grammar does not allow it.
    #[error("unexpected token: expected {expected}, found {found}")]
    UnexpectedToken {
        /// What the reader was looking for.
        expected: &'static str,
        /// The token it got.
        found: String,
    },
    /// The input ended inside a step after it was marked complete.
    #[error("unexpected end of input")]
    UnexpectedEndOfInput,
    /// A buffered object did not close where it should.
    #[error("unbalanced nesting while buffering an object")]
    UnbalancedNesting,

    // ── context url / schema conflicts ──────────────────────────────────
    /// A response payload without `@odata.context`.
    #[error("the payload has no @odata.context annotation")]
    MissingContextUrl,
    /// A context URL naming nothing in the model.
    #[error("invalid context URL '{0}'")]
    InvalidContextUrl(String),
    /// The context URL disagrees with the caller's target.
    #[error("context URL {found} does not match the expected {expected}")]
    ContextUrlMismatch {
        /// The navigation source or type the caller asked for.
        expected: String,
        /// The context URL of the payload.
        found: String,
    },
    /// A value whose JSON shape or payload type does not fit its position.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// The type or shape required.
        expected: String,
        /// The type or shape found.
        found: String,
    },
    /// A payload type that does not derive from the expected type.
    #[error("type '{found}' is not compatible with the expected type '{expected}'")]
    IncompatibleType {
        /// The declared type.
        expected: String,
        /// The payload type.
        found: String,
    },
    /// A type name the model does not define.
    #[error("type '{0}' is not defined in the model")]
    UnknownType(String),
    /// A single value for a collection-valued property.
    #[error("a collection was expected for '{0}' but a non-collection value was found")]
    CollectionExpected(String),
    /// An array for a single-valued property.
    #[error("a collection value was found for '{0}' which is not a collection")]
    UnexpectedCollection(String),
    /// `null` for a non-nullable property or collection item.
    #[error("null value for '{name}' of non-nullable type '{type_name}'")]
    NullNotAllowed {
        /// The property or item name.
        name: String,
        /// Its declared type.
        type_name: String,
    },
    /// Items of an untyped collection with different kinds.
    #[error("collection items have inconsistent types: '{first}' and '{other}'")]
    InconsistentCollectionItems {
        /// Type of the first item.
        first: String,
        /// Type of the first item that differs.
        other: String,
    },

    // ── duplicates / ordering ───────────────────────────────────────────
    /// A property given twice in one object.
    #[error("duplicate property '{0}'")]
    DuplicateProperty(String),
    /// An annotation given twice for the same target.
    #[error("duplicate annotation '{annotation}' for '{name}'")]
    DuplicateAnnotation {
        /// The annotated property.
        name: String,
        /// The repeated annotation.
        annotation: String,
    },
    /// `@odata.type` after data properties while reordering is off.
    #[error("the @odata.type annotation must precede all properties of the resource")]
    TypeAnnotationNotFirst,
    /// `@a.b@ns.term` without a following `@a.b`.
    #[error("annotation '{annotation}' targets instance annotation '{target}' which has no value")]
    AnnotationWithoutValue {
        /// The dangling annotation.
        annotation: String,
        /// The instance annotation it targets.
        target: String,
    },
    /// `@a.b@odata.type` without a following `@a.b`.
    #[error("odata.type annotation targets instance annotation '{0}' which has no value")]
    TypeAnnotationWithoutValue(String),
    /// A property a closed type does not declare.
    #[error("property '{name}' is not declared on non-open type '{type_name}'")]
    UndeclaredProperty {
        /// The property.
        name: String,
        /// The resource type.
        type_name: String,
    },
    /// Annotations of a property that never shows up, where a value is
    /// required.
    #[error("property '{0}' has annotations but no value")]
    PropertyWithoutValue(String),
    /// A navigation property value of the wrong shape.
    #[error("invalid value for navigation property '{name}': {reason}")]
    InvalidNavigationValue {
        /// The navigation property.
        name: String,
        /// What is wrong with the value.
        reason: &'static str,
    },
    /// A single `odata.bind` together with an inline value.
    #[error("conflicting odata.bind and inline content for '{0}'")]
    BindConflict(String),
    /// A property annotation after its property was read.
    #[error("unexpected annotation '{0}'")]
    UnexpectedAnnotation(String),

    // ── recursion ───────────────────────────────────────────────────────
    /// Nesting deeper than the configured limit.
    #[error("maximum nesting depth of {max} exceeded")]
    RecursionDepthExceeded {
        /// [`ReaderOptions::max_nesting_depth`](crate::ReaderOptions::max_nesting_depth).
        max: usize,
    },

    // ── conversion ──────────────────────────────────────────────────────
    /// A primitive whose text is not a value of its type.
    #[error("cannot convert '{value}' to {type_name}: {reason}")]
    Conversion {
        /// The target type.
        type_name: String,
        /// The payload text.
        value: String,
        /// Why conversion failed.
        reason: &'static str,
    },
    /// Int64 or Decimal given as a number where a string is required, or
    /// the other way round.
    #[error(
        "value '{value}' of type {type_name} must be {}",
        if *.quoted_expected { "a quoted string in IEEE754 compatible mode" } else { "a JSON number unless IEEE754 compatible mode is enabled" }
    )]
    Ieee754Mismatch {
        /// `Edm.Int64` or `Edm.Decimal`.
        type_name: String,
        /// The payload text.
        value: String,
        /// Whether a quoted string was required.
        quoted_expected: bool,
    },
    /// A type definition value outside its underlying type's range.
    #[error("value '{value}' overflows the underlying type of '{type_name}'")]
    Overflow {
        /// The type definition.
        type_name: String,
        /// The payload text.
        value: String,
    },
    /// An enum value naming no member.
    #[error("'{value}' is not a member of enum type '{type_name}'")]
    InvalidEnumValue {
        /// The enum type.
        type_name: String,
        /// The payload text.
        value: String,
    },

    // ── plumbing ────────────────────────────────────────────────────────
    /// Reading the source failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// More input is required to finish the current step.
    ///
    /// Only visible to callers that drive [`ReaderCore`](crate::ReaderCore)
    /// by hand; the readers refill and retry.
    #[error("more input is required")]
    Pending,
    /// A read after an earlier failure.
    #[error("the reader failed earlier and cannot continue")]
    Poisoned,
}

impl ReaderError {
    /// Whether this is [`ReaderError::Pending`].
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub(crate) fn unexpected(expected: &'static str, found: impl core::fmt::Display) -> Self {
        Self::UnexpectedToken {
            expected,
            found: found.to_string(),
        }
    }
}

/// Result of reader operations.
pub type Result<T, E = ReaderError> = core::result::Result<T, E>;
