//! Resolution of `@odata.context` URLs.

use crate::{
    edm::{Model, NavigationSourceKind, PropertyRef, StructuredKind, TypeKind, collection_item, qualify},
    error::{ReaderError, Result},
};

/// What the payload described by a context URL contains.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextUrlKind {
    /// `#Set` or a collection-valued navigation path.
    ResourceSet,
    /// `#Set/$entity`, a singleton or a single-valued navigation path.
    Resource,
    /// `#Set/$delta`
    Delta,
    /// A collection of primitive or complex values.
    Collection,
    /// A single primitive or complex value.
    Value,
}

/// The parts of a context URL the reader uses.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextUrlInfo {
    /// What the payload contains.
    pub kind: ContextUrlKind,
    /// The entity set or singleton, when the URL names one.
    pub navigation_source: Option<String>,
    /// Qualified type of a single item.
    pub type_name: Option<String>,
    /// Navigation segments followed from the navigation source.
    pub path: Vec<String>,
    /// The `(...)` select list, unparsed.
    pub select: Option<String>,
}

/// Resolves a context URL against a model.
pub trait ContextUrlParser {
    /// # Errors
    ///
    /// [`ReaderError::InvalidContextUrl`] when `url` does not resolve against
    /// `model`.
    fn parse(&self, url: &str, model: &dyn Model) -> Result<ContextUrlInfo>;
}

/// Understands the context URL shapes of the JSON format:
/// `$metadata#Set`, `#Set/$entity`, `#Set/NS.Derived`, `#Set(select)`,
/// `#Singleton`, `#Set(1)/Nav`, `#Collection(NS.T)`, `#NS.T` and
/// `#Set/$delta`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultContextUrlParser;

impl ContextUrlParser for DefaultContextUrlParser {
    fn parse(&self, url: &str, model: &dyn Model) -> Result<ContextUrlInfo> {
        let invalid = || ReaderError::InvalidContextUrl(url.to_owned());
        let (_, fragment) = url.split_once('#').ok_or_else(invalid)?;

        let (fragment, suffix_kind) = if let Some(f) = fragment.strip_suffix("/$entity") {
            (f, Some(ContextUrlKind::Resource))
        } else if let Some(f) = fragment.strip_suffix("/$delta") {
            (f, Some(ContextUrlKind::Delta))
        } else {
            (fragment, None)
        };

        if let Some(item) = collection_item(fragment) {
            return Ok(ContextUrlInfo {
                kind: ContextUrlKind::Collection,
                navigation_source: None,
                type_name: Some(qualify(item)),
                path: Vec::new(),
                select: None,
            });
        }

        let mut segments = split_segments(fragment).into_iter();
        let (head, head_parens) = segments.next().map(split_parens).ok_or_else(invalid)?;

        let Some(source) = model.navigation_source(head) else {
            // a bare type: `#NS.Address` or `#Edm.String`
            let ty = model.resolve_type(head).ok_or_else(invalid)?;
            let kind = match ty.kind {
                TypeKind::Entity(_) => ContextUrlKind::Resource,
                TypeKind::Collection(_) => ContextUrlKind::Collection,
                _ => ContextUrlKind::Value,
            };
            return Ok(ContextUrlInfo {
                kind,
                navigation_source: None,
                type_name: ty.name(),
                path: Vec::new(),
                select: head_parens.map(str::to_owned),
            });
        };

        let mut info = ContextUrlInfo {
            kind: match source.kind {
                NavigationSourceKind::EntitySet => ContextUrlKind::ResourceSet,
                NavigationSourceKind::Singleton => ContextUrlKind::Resource,
            },
            navigation_source: Some(source.name.clone()),
            type_name: Some(source.entity_type.clone()),
            path: Vec::new(),
            select: None,
        };
        // `Set(select)` only at the end; `Set(key)/...` addresses an entity
        let mut select = head_parens;
        let mut keyed = false;

        for segment in segments {
            if select.take().is_some() {
                keyed = true;
            }
            let (name, parens) = split_parens(segment);
            let current = info.type_name.clone().ok_or_else(invalid)?;
            if let Some(derived) = model.structured_type(name) {
                if !model.is_assignable(&current, &derived.name) {
                    return Err(invalid());
                }
                info.type_name = Some(derived.name.clone());
            } else if let Some(PropertyRef::Navigation(nav)) = model.find_property(&current, name) {
                info.kind = if nav.is_collection {
                    ContextUrlKind::ResourceSet
                } else {
                    ContextUrlKind::Resource
                };
                info.navigation_source = info
                    .navigation_source
                    .as_deref()
                    .and_then(|s| model.navigation_target(s, name))
                    .map(|s| s.name.clone());
                info.type_name = Some(nav.target_type.clone());
                info.path.push(name.to_owned());
            } else if let Some(PropertyRef::Structural(p)) = model.find_property(&current, name) {
                info.kind = if p.type_ref.is_collection() {
                    ContextUrlKind::Collection
                } else if matches!(&p.type_ref.kind, TypeKind::Entity(_)) {
                    ContextUrlKind::Resource
                } else {
                    ContextUrlKind::Value
                };
                info.type_name = p.type_ref.item_type().unwrap_or(&p.type_ref).name();
                info.path.push(name.to_owned());
            } else {
                return Err(invalid());
            }
            select = parens;
        }
        if keyed && info.kind == ContextUrlKind::ResourceSet && info.path.is_empty() {
            info.kind = ContextUrlKind::Resource;
        }
        info.select = select.map(str::to_owned);

        if let Some(kind) = suffix_kind {
            info.kind = kind;
        }
        if info.kind == ContextUrlKind::Resource
            && info
                .type_name
                .as_deref()
                .and_then(|t| model.structured_type(t))
                .is_some_and(|t| t.kind == StructuredKind::Complex)
        {
            info.kind = ContextUrlKind::Value;
        }
        Ok(info)
    }
}

/// Splits on `/` outside parentheses.
fn split_segments(fragment: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0_usize;
    let mut start = 0;
    for (i, b) in fragment.bytes().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b'/' if depth == 0 => {
                out.push(&fragment[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&fragment[start..]);
    out
}

/// `Name(inner)` → (`Name`, `Some(inner)`).
fn split_parens(segment: &str) -> (&str, Option<&str>) {
    match segment.find('(') {
        Some(open) if segment.ends_with(')') => (&segment[..open], Some(&segment[open + 1..segment.len() - 1])),
        _ => (segment, None),
    }
}
