//! The resource reader state machine.
//!
//! [`ReaderCore`] turns the token stream of one JSON Light payload into a
//! sequence of states, each with the item it describes:
//!
//! ```text
//! Start -> ResourceSetStart -> ResourceStart -> NestedResourceInfoStart
//!       -> ... -> NestedResourceInfoEnd -> ResourceEnd -> ResourceSetEnd
//!       -> Completed
//! ```
//!
//! Every [`ReaderCore::step`] moves to the next state. A step either
//! finishes or leaves the core in an unspecified state with
//! [`ReaderError::Pending`]; the drivers in this module keep a copy from
//! before the step and retry it from there once more input has arrived.

mod driver;
mod properties;
mod scope;

use std::{fmt, sync::Arc};

use log::{debug, trace};

#[cfg(feature = "tokio")]
pub use self::driver::AsyncResourceReader;
pub use self::driver::ResourceReader;
use self::{
    properties::{ContentReader, missing_navigation},
    scope::{Container, NestedContent, ResourceScope, Scope, ScopeKind, SetScope},
};
use crate::{
    annotations::{self, MemberName, PropertyAndAnnotationCollector},
    classifier::{Classified, PropertyKind, classify, read_count},
    context_url::{ContextUrlInfo, ContextUrlKind, ContextUrlParser, DefaultContextUrlParser},
    edm::{Model, NavigationSourceKind, StructuredType, TypeKind, TypeRef},
    error::{ReaderError, Result},
    item::{EntityReferenceLink, Item, ReaderEvent, Resource, ResourceSet},
    json_reader::JsonReader,
    materializer::Materializer,
    metadata_builder::MetadataBuilder,
    options::{MessageKind, ReaderOptions},
    token::{Token, Tokenizer},
};

/// A model shared between readers.
pub type SharedModel = Arc<dyn Model + Send + Sync>;

/// A context URL parser shared between readers.
pub type SharedContextUrlParser = Arc<dyn ContextUrlParser + Send + Sync>;

/// The states a reader moves through.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// Before the first read.
    Start,
    /// A resource set begins.
    ResourceSetStart,
    /// A resource set ends.
    ResourceSetEnd,
    /// A resource begins.
    ResourceStart,
    /// A resource ends.
    ResourceEnd,
    /// A nested resource or set follows.
    NestedResourceInfoStart,
    /// The nested content ended.
    NestedResourceInfoEnd,
    /// A top-level value was read.
    Primitive,
    /// An `odata.bind` URL was read.
    EntityReferenceLink,
    /// The payload was read to its end.
    Completed,
    /// A read failed. Every further read fails too.
    Exception,
}

/// The top-level shape a caller expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// A feed of resources.
    ResourceSet,
    /// A single resource.
    Resource,
}

/// What the caller knows about the payload before reading it. Unset parts
/// are taken from the context URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReaderTarget {
    /// Expected top-level shape.
    pub kind: Option<PayloadKind>,
    /// Entity set or singleton the payload belongs to.
    pub navigation_source: Option<String>,
    /// Expected resource type, or item type of a resource set.
    pub type_name: Option<String>,
}

impl ReaderTarget {
    /// A resource set of `navigation_source`.
    #[must_use]
    pub fn resource_set(navigation_source: &str) -> Self {
        Self {
            kind: Some(PayloadKind::ResourceSet),
            navigation_source: Some(navigation_source.to_owned()),
            type_name: None,
        }
    }

    /// A single resource of `navigation_source`.
    #[must_use]
    pub fn resource(navigation_source: &str) -> Self {
        Self {
            kind: Some(PayloadKind::Resource),
            navigation_source: Some(navigation_source.to_owned()),
            type_name: None,
        }
    }

    /// Sets the expected type.
    #[must_use]
    pub fn of_type(mut self, type_name: &str) -> Self {
        self.type_name = Some(type_name.to_owned());
        self
    }
}

/// How the top-level object is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Payload {
    ResourceSet,
    Resource,
    /// A single primitive, enum or collection value under `value`.
    Value,
}

struct Plan {
    payload: Payload,
    navigation_source: Option<String>,
    expected: Option<TypeRef>,
    path: Vec<String>,
    is_delta: bool,
    container: Container,
}

/// The reader state machine, independent of where input comes from.
///
/// Cloning is cheap enough to snapshot the core before each step.
#[derive(Clone)]
pub struct ReaderCore {
    reader: JsonReader,
    model: SharedModel,
    context_parser: SharedContextUrlParser,
    options: ReaderOptions,
    target: ReaderTarget,
    /// Prefix of the context URL before `$metadata`.
    service_root: String,
    /// Never empty; the bottom scope is the start scope.
    scopes: Vec<Scope>,
}

impl fmt::Debug for ReaderCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderCore")
            .field("state", &self.state())
            .field("depth", &self.scopes.len())
            .field("token", self.reader.token())
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl ReaderCore {
    /// A core reading from `tokenizer`, resolving context URLs with
    /// [`DefaultContextUrlParser`](crate::DefaultContextUrlParser).
    #[must_use]
    pub fn new(tokenizer: Tokenizer, model: SharedModel, target: ReaderTarget, options: ReaderOptions) -> Self {
        Self {
            reader: JsonReader::new(tokenizer, options.enable_reordering, options.max_nesting_depth),
            model,
            context_parser: Arc::new(DefaultContextUrlParser),
            options,
            target,
            service_root: String::new(),
            scopes: vec![Scope::new(ReaderState::Start, Item::None, ScopeKind::Start)],
        }
    }

    /// Replaces the context URL parser.
    #[must_use]
    pub fn with_context_url_parser(mut self, parser: SharedContextUrlParser) -> Self {
        self.context_parser = parser;
        self
    }

    /// Appends input.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.reader.feed(bytes);
    }

    /// Marks the input as complete.
    pub fn finish_input(&mut self) {
        self.reader.finish();
    }

    /// Whether the input was marked complete.
    #[must_use]
    pub fn is_input_complete(&self) -> bool {
        self.reader.is_input_complete()
    }

    /// The options the core was built with.
    #[must_use]
    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> ReaderState {
        self.top().state
    }

    /// The item of the current state.
    #[must_use]
    pub fn item(&self) -> &Item {
        &self.top().item
    }

    /// The current state and item as one value.
    #[must_use]
    pub fn event(&self) -> Option<ReaderEvent> {
        ReaderEvent::new(self.state(), self.item())
    }

    /// Moves to the next state. Returns `false` once the payload is
    /// complete.
    ///
    /// # Errors
    ///
    /// [`ReaderError::Pending`] when more input is needed; the core must
    /// then be discarded in favor of a copy taken before the call. Any other
    /// error moves the core to [`ReaderState::Exception`], after which every
    /// step fails with [`ReaderError::Poisoned`].
    pub fn step(&mut self) -> Result<bool> {
        let before = self.state();
        match before {
            ReaderState::Exception => return Err(ReaderError::Poisoned),
            ReaderState::Completed => return Ok(false),
            _ => {}
        }
        match self.advance() {
            Ok(()) => {
                trace!("{before:?} -> {:?}", self.state());
                Ok(self.state() != ReaderState::Completed)
            }
            Err(e) if e.is_pending() => Err(e),
            Err(e) => {
                debug!("read failed in {before:?} at {}: {e}", self.reader.token());
                self.fail();
                Err(e)
            }
        }
    }

    /// Moves to [`ReaderState::Exception`].
    pub(crate) fn fail(&mut self) {
        self.scopes.clear();
        self.scopes
            .push(Scope::new(ReaderState::Exception, Item::None, ScopeKind::Completed));
    }

    fn top(&self) -> &Scope {
        &self.scopes[self.scopes.len() - 1]
    }

    fn top_mut(&mut self) -> &mut Scope {
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    fn check_depth(&self) -> Result<()> {
        if self.scopes.len() > self.options.max_nesting_depth {
            return Err(ReaderError::RecursionDepthExceeded {
                max: self.options.max_nesting_depth,
            });
        }
        Ok(())
    }

    fn advance(&mut self) -> Result<()> {
        match self.state() {
            ReaderState::Start => self.read_start(),
            ReaderState::ResourceSetStart => self.read_set_item(),
            ReaderState::ResourceStart => self.continue_resource(),
            ReaderState::NestedResourceInfoStart => self.read_nested_content(),
            ReaderState::ResourceSetEnd
            | ReaderState::ResourceEnd
            | ReaderState::NestedResourceInfoEnd
            | ReaderState::Primitive
            | ReaderState::EntityReferenceLink => self.leave_scope(),
            ReaderState::Completed | ReaderState::Exception => Ok(()),
        }
    }

    // ── start ───────────────────────────────────────────────────────────

    fn read_start(&mut self) -> Result<()> {
        self.reader.read()?;
        self.reader.expect(&Token::StartObject, "'{' at the start of the payload")?;

        let mut collector = PropertyAndAnnotationCollector::new();
        let is_context = matches!(
            self.reader.token(),
            Token::Property(name) if MemberName::parse(name) == MemberName::InstanceAnnotation(annotations::CONTEXT.to_owned())
        );
        let context = if is_context {
            collector.mark_processed(&format!("@{}", annotations::CONTEXT))?;
            self.reader.read()?;
            Some(self.reader.read_string()?)
        } else {
            None
        };

        let info = match &context {
            Some(url) => {
                self.service_root = url.split_once("$metadata").map_or("", |(root, _)| root).to_owned();
                Some(self.context_parser.parse(url, self.model.as_ref())?)
            }
            None if self.options.message_kind == MessageKind::Response => {
                return Err(ReaderError::MissingContextUrl);
            }
            None => None,
        };
        let plan = self.plan(context.as_deref(), info.as_ref())?;
        debug!(
            "reading {:?} of {:?} from {:?}",
            plan.payload,
            plan.expected.as_ref().map(TypeRef::display_name),
            plan.navigation_source
        );

        match plan.payload {
            Payload::ResourceSet => self.read_set_preamble(collector, plan),
            Payload::Resource => self.push_resource(
                collector,
                plan.expected,
                plan.navigation_source,
                plan.path,
                plan.container,
                false,
            ),
            Payload::Value => self.read_value_payload(collector, plan.expected.as_ref()),
        }
    }

    /// Reconciles the caller's target with the context URL.
    fn plan(&self, url: Option<&str>, info: Option<&ContextUrlInfo>) -> Result<Plan> {
        let model = self.model.as_ref();
        let target = &self.target;
        let mismatch = |expected: &str| ReaderError::ContextUrlMismatch {
            expected: expected.to_owned(),
            found: url.unwrap_or_default().to_owned(),
        };

        let found_source = info.and_then(|i| i.navigation_source.as_deref());
        if let (Some(expected), Some(found)) = (target.navigation_source.as_deref(), found_source) {
            if expected != found {
                return Err(mismatch(expected));
            }
        }
        let found_type = info.and_then(|i| i.type_name.as_deref());
        let type_name = match (target.type_name.as_deref(), found_type) {
            (Some(expected), Some(found)) if expected == found || model.is_assignable(expected, found) => Some(found),
            (Some(expected), Some(_)) => return Err(mismatch(expected)),
            (expected, found) => expected.or(found),
        };

        let navigation_source = target.navigation_source.as_deref().or(found_source);
        let source = navigation_source.and_then(|s| model.navigation_source(s));
        let expected = match type_name {
            Some(t) => Some(model.resolve_type(t).ok_or_else(|| ReaderError::UnknownType(t.to_owned()))?),
            None => source
                .and_then(|s| model.structured_type(&s.entity_type))
                .map(StructuredType::type_ref),
        };

        let from_context = info.map(|i| match i.kind {
            ContextUrlKind::ResourceSet | ContextUrlKind::Delta | ContextUrlKind::Collection => Payload::ResourceSet,
            ContextUrlKind::Resource => Payload::Resource,
            ContextUrlKind::Value if expected.as_ref().is_some_and(|t| t.is_structured() || t.is_untyped()) => {
                Payload::Resource
            }
            ContextUrlKind::Value => Payload::Value,
        });
        let payload = match (target.kind, from_context) {
            (Some(PayloadKind::ResourceSet), Some(Payload::ResourceSet) | None) => Payload::ResourceSet,
            (Some(PayloadKind::Resource), Some(Payload::Resource) | None) => Payload::Resource,
            (Some(PayloadKind::ResourceSet), Some(_)) => return Err(mismatch("a resource set")),
            (Some(PayloadKind::Resource), Some(_)) => return Err(mismatch("a single resource")),
            (None, Some(payload)) => payload,
            (None, None) => Payload::Resource,
        };

        let container = match source {
            Some(s) => Container {
                path: Some(s.name.clone()),
                single_valued: s.kind == NavigationSourceKind::Singleton,
            },
            None => Container::default(),
        };
        Ok(Plan {
            payload,
            navigation_source: navigation_source.map(str::to_owned),
            expected,
            path: info.map(|i| i.path.clone()).unwrap_or_default(),
            is_delta: info.is_some_and(|i| i.kind == ContextUrlKind::Delta),
            container,
        })
    }

    /// Annotations of the top-level set up to its `value` array.
    fn read_set_preamble(&mut self, mut collector: PropertyAndAnnotationCollector, plan: Plan) -> Result<()> {
        let item_type = plan.expected.as_ref().map(|t| t.item_type().cloned().unwrap_or_else(|| t.clone()));
        let mut set = ResourceSet {
            type_name: item_type.as_ref().and_then(TypeRef::name),
            is_delta: plan.is_delta,
            ..ResourceSet::default()
        };
        let depth = self.scopes.len();
        let m = Materializer::new(self.model.as_ref(), &self.options);
        let mut read_custom = |r: &mut JsonReader, a: &str| m.read_value(r, None, None, a, depth);
        loop {
            let member = classify(&mut self.reader, &mut collector, &self.options, &mut read_custom)?;
            match member.kind {
                PropertyKind::PropertyWithValue if member.name == "value" => break,
                PropertyKind::EndOfObject => return Err(ReaderError::CollectionExpected("value".to_owned())),
                _ => read_set_annotation(&mut self.reader, &m, &mut set, &collector, member, depth)?,
            }
        }
        if *self.reader.token() != Token::StartArray {
            return Err(ReaderError::CollectionExpected("value".to_owned()));
        }
        self.reader.read()?;
        let kind = SetScope {
            top_level: true,
            owner: None,
            container: plan.container,
            collector: Some(collector),
        };
        self.push_set(set, item_type, plan.navigation_source, plan.path, kind)
    }

    /// A top-level `value` that is neither a resource nor a set.
    fn read_value_payload(&mut self, mut collector: PropertyAndAnnotationCollector, expected: Option<&TypeRef>) -> Result<()> {
        let depth = self.scopes.len();
        let m = Materializer::new(self.model.as_ref(), &self.options);
        let mut read_custom = |r: &mut JsonReader, a: &str| m.read_value(r, None, None, a, depth);
        loop {
            let member = classify(&mut self.reader, &mut collector, &self.options, &mut read_custom)?;
            match member.kind {
                PropertyKind::PropertyWithValue if member.name == "value" => break,
                PropertyKind::ODataInstanceAnnotation | PropertyKind::CustomInstanceAnnotation => {
                    debug!("ignoring '@{}' on a value payload", member.name);
                    self.reader.skip_value()?;
                }
                PropertyKind::EndOfObject => {
                    return Err(ReaderError::unexpected("a 'value' property", Token::EndObject));
                }
                _ => return Err(ReaderError::unexpected("a 'value' property", format!("'{}'", member.name))),
            }
        }
        let payload = collector.text("value", annotations::TYPE).map(str::to_owned);
        let value = m.read_value(&mut self.reader, expected, payload.as_deref(), "value", depth)?;
        self.scopes
            .push(Scope::new(ReaderState::Primitive, Item::Primitive(value), ScopeKind::Primitive));
        Ok(())
    }

    // ── resource sets ───────────────────────────────────────────────────

    fn push_set(
        &mut self,
        set: ResourceSet,
        item_type: Option<TypeRef>,
        navigation_source: Option<String>,
        path: Vec<String>,
        kind: SetScope,
    ) -> Result<()> {
        self.check_depth()?;
        let scope = Scope::new(
            ReaderState::ResourceSetStart,
            Item::ResourceSet(set),
            ScopeKind::ResourceSet(Box::new(kind)),
        )
        .with_context(navigation_source, item_type, path);
        self.scopes.push(scope);
        Ok(())
    }

    /// Reads the next item of the set in the top scope, or its end.
    fn read_set_item(&mut self) -> Result<()> {
        let top = self.top();
        let ScopeKind::ResourceSet(set_scope) = &top.kind else {
            return Ok(());
        };
        let item_type = top.expected_type.clone();
        let navigation_source = top.navigation_source.clone();
        let path = top.path.clone();
        let container = set_scope.container.clone();
        let structured = item_type.as_ref().is_some_and(TypeRef::is_structured);
        let untyped = item_type.as_ref().is_none_or(TypeRef::is_untyped);
        let describe = || item_type.as_ref().map_or_else(|| "Edm.Untyped".to_owned(), TypeRef::display_name);

        match self.reader.token().clone() {
            Token::EndArray => self.end_set(),
            Token::StartObject => {
                self.reader.read()?;
                let collector = PropertyAndAnnotationCollector::new();
                self.push_resource(collector, item_type.clone(), navigation_source, path, container, false)
            }
            Token::StartArray if untyped => {
                self.reader.read()?;
                let kind = SetScope {
                    top_level: false,
                    owner: None,
                    container: Container::default(),
                    collector: None,
                };
                self.push_set(ResourceSet::default(), Some(TypeRef::untyped()), None, path, kind)
            }
            Token::StartArray => Err(ReaderError::UnexpectedCollection(describe())),
            Token::Primitive(scalar) if scalar.is_null() && structured => {
                if item_type.as_ref().is_some_and(|t| !t.nullable) {
                    return Err(ReaderError::NullNotAllowed {
                        name: "an item of the resource set".to_owned(),
                        type_name: describe(),
                    });
                }
                self.reader.read()?;
                self.push_null_resource()
            }
            Token::Primitive(_) if structured => Err(ReaderError::TypeMismatch {
                expected: describe(),
                found: "a primitive value".to_owned(),
            }),
            Token::Primitive(_) => {
                let depth = self.scopes.len();
                let m = Materializer::new(self.model.as_ref(), &self.options);
                let value = m.read_value(&mut self.reader, item_type.as_ref(), None, "", depth)?;
                self.scopes
                    .push(Scope::new(ReaderState::Primitive, Item::Primitive(value), ScopeKind::Primitive));
                Ok(())
            }
            other => Err(ReaderError::unexpected("an item of the resource set", other)),
        }
    }

    /// The reader is on the set's `]`.
    fn end_set(&mut self) -> Result<()> {
        self.reader.read()?;
        let depth = self.scopes.len();
        let last = depth - 1;
        let m = Materializer::new(self.model.as_ref(), &self.options);
        let Scope { state, item, kind, .. } = &mut self.scopes[last];
        let (Item::ResourceSet(set), ScopeKind::ResourceSet(set_scope)) = (item, kind) else {
            return Ok(());
        };

        if let Some(collector) = set_scope.collector.as_mut() {
            let mut read_custom = |r: &mut JsonReader, a: &str| m.read_value(r, None, None, a, depth);
            loop {
                let member = classify(&mut self.reader, collector, &self.options, &mut read_custom)?;
                if member.kind == PropertyKind::EndOfObject {
                    break;
                }
                read_set_annotation(&mut self.reader, &m, set, collector, member, depth)?;
            }
        } else if let Some(owner) = set_scope.owner.as_deref() {
            read_trailing_annotations(&mut self.reader, owner, set)?;
        }
        *state = ReaderState::ResourceSetEnd;

        // trailing annotations also describe the link the set belongs to
        let (count, next_link) = (set.count, set.next_link.clone());
        if let Some(Scope {
            kind: ScopeKind::NestedResourceInfo(nested),
            ..
        }) = last.checked_sub(1).and_then(|i| self.scopes.get_mut(i))
        {
            nested.info.count = nested.info.count.or(count);
            nested.info.next_link = nested.info.next_link.take().or(next_link);
        }
        Ok(())
    }

    // ── resources ───────────────────────────────────────────────────────

    /// Pushes a resource whose `{` was consumed and reads its content up to
    /// the first nested info.
    fn push_resource(
        &mut self,
        collector: PropertyAndAnnotationCollector,
        expected: Option<TypeRef>,
        navigation_source: Option<String>,
        path: Vec<String>,
        container: Container,
        type_peeked: bool,
    ) -> Result<()> {
        self.check_depth()?;
        let type_name = expected.as_ref().filter(|t| t.is_structured()).and_then(TypeRef::name);
        let resource = Resource {
            type_name: expected.as_ref().and_then(TypeRef::name),
            ..Resource::default()
        };
        let is_entity = expected.as_ref().is_some_and(|t| matches!(t.kind, TypeKind::Entity(_)));
        let builder = (is_entity && self.options.message_kind == MessageKind::Response)
            .then(|| MetadataBuilder::new(&self.service_root, container.path, container.single_valued));
        let rs = ResourceScope {
            resource,
            type_name,
            type_peeked,
            collector,
            builder,
            pending: None,
            at_end: false,
        };
        let scope = Scope::new(ReaderState::ResourceStart, Item::None, ScopeKind::Resource(Box::new(rs)))
            .with_context(navigation_source, expected, path);
        self.scopes.push(scope);
        self.read_resource_content()?;

        let model = self.model.as_ref();
        let last = self.scopes.len() - 1;
        let top = &mut self.scopes[last];
        if let ScopeKind::Resource(rs) = &mut top.kind {
            rs.complete_metadata(model);
            top.item = Item::Resource(Some(rs.resource.clone()));
        }
        Ok(())
    }

    fn push_null_resource(&mut self) -> Result<()> {
        self.check_depth()?;
        self.scopes.push(Scope::new(
            ReaderState::ResourceStart,
            Item::Resource(None),
            ScopeKind::NullResource,
        ));
        Ok(())
    }

    /// Reads members of the resource in the top scope until one needs to be
    /// reported as a nested info, or the resource ends.
    fn read_resource_content(&mut self) -> Result<()> {
        let depth = self.scopes.len();
        let content = ContentReader {
            m: Materializer::new(self.model.as_ref(), &self.options),
            depth,
        };
        let m = content.m;
        let reader = &mut self.reader;
        let ScopeKind::Resource(rs) = &mut self.scopes[depth - 1].kind else {
            return Ok(());
        };
        if rs.at_end || rs.pending.is_some() {
            return Ok(());
        }
        let mut read_custom = |r: &mut JsonReader, a: &str| m.read_value(r, None, None, a, depth);

        loop {
            let Classified { kind, name } = classify(reader, &mut rs.collector, &self.options, &mut read_custom)?;
            let nested = match kind {
                PropertyKind::EndOfObject => {
                    rs.at_end = true;
                    return Ok(());
                }
                PropertyKind::ODataInstanceAnnotation => {
                    content.annotation(reader, rs, &name)?;
                    None
                }
                PropertyKind::CustomInstanceAnnotation => {
                    let annotation = m.read_instance_annotation(reader, &rs.collector, &name, depth)?;
                    rs.resource.instance_annotations.push(annotation);
                    None
                }
                PropertyKind::MetadataReferenceProperty => {
                    reader.skip_value()?;
                    rs.resource.operations.push(name);
                    None
                }
                PropertyKind::PropertyWithValue => content.with_value(reader, rs, name)?,
                PropertyKind::PropertyWithoutValue => content.without_value(reader, rs, name)?,
                PropertyKind::NestedDeltaResourceSet => Some(content.delta(reader, rs, name)?),
            };
            if nested.is_some() {
                rs.pending = nested;
                return Ok(());
            }
        }
    }

    /// Reports the next nested info of the resource in the top scope, or
    /// its end.
    fn continue_resource(&mut self) -> Result<()> {
        let model = self.model.as_ref();
        let response = self.options.message_kind == MessageKind::Response;
        let last = self.scopes.len() - 1;
        let Scope {
            state,
            item,
            navigation_source,
            path,
            kind,
            ..
        } = &mut self.scopes[last];
        let rs = match kind {
            ScopeKind::Resource(rs) => rs,
            ScopeKind::NullResource => {
                *state = ReaderState::ResourceEnd;
                return Ok(());
            }
            _ => return Ok(()),
        };
        rs.complete_metadata(model);

        let next = match rs.pending.take() {
            Some(nested) => Some(nested),
            None if response => rs.type_name.as_deref().and_then(|type_name| {
                model
                    .navigation_properties(type_name)
                    .into_iter()
                    .find(|nav| {
                        !rs.collector.is_processed(&nav.name) && !rs.builder.as_ref().is_some_and(|b| b.is_reported(&nav.name))
                    })
                    .map(|nav| missing_navigation(nav, &rs.collector))
            }),
            None => None,
        };
        let Some(mut nested) = next else {
            *state = ReaderState::ResourceEnd;
            *item = Item::Resource(Some(rs.resource.clone()));
            return Ok(());
        };

        let name = nested.info.name.clone();
        let mut child_path = path.clone();
        if nested.is_navigation {
            child_path.push(name.clone());
            if let Some(builder) = rs.builder.as_mut() {
                builder.mark_reported(&name);
            }
            if response {
                nested.info.url = nested.info.url.take().or_else(|| MetadataBuilder::navigation_link(&rs.resource, &name));
                nested.info.association_link_url = nested
                    .info
                    .association_link_url
                    .take()
                    .or_else(|| MetadataBuilder::association_link(&rs.resource, &name));
            }
            let bound = navigation_source
                .as_deref()
                .and_then(|s| model.navigation_target(s, &name));
            nested.navigation_source = bound.map(|s| s.name.clone());
            nested.container = match bound {
                Some(s) => Container {
                    path: Some(s.name.clone()),
                    single_valued: s.kind == NavigationSourceKind::Singleton,
                },
                None => Container {
                    path: rs
                        .builder
                        .as_ref()
                        .and_then(MetadataBuilder::canonical_path)
                        .map(|p| format!("{p}/{name}")),
                    single_valued: nested.info.is_collection == Some(false),
                },
            };
        } else if let Some(p) = rs.builder.as_ref().and_then(MetadataBuilder::canonical_path) {
            nested.container = Container {
                path: Some(format!("{p}/{name}")),
                single_valued: nested.info.is_collection == Some(false),
            };
        }

        let source = nested.navigation_source.clone();
        let target = nested.target.clone();
        let child = Scope::new(
            ReaderState::NestedResourceInfoStart,
            Item::NestedResourceInfo(nested.info.clone()),
            ScopeKind::NestedResourceInfo(Box::new(nested)),
        )
        .with_context(source, target, child_path);
        self.scopes.push(child);
        Ok(())
    }

    // ── nested resource infos ───────────────────────────────────────────

    /// Reports the next piece of content of the nested info in the top
    /// scope, or its end.
    fn read_nested_content(&mut self) -> Result<()> {
        let top = self.top_mut();
        let ScopeKind::NestedResourceInfo(nested) = &mut top.kind else {
            return Ok(());
        };
        if let Some(url) = nested.binds.pop_front() {
            self.scopes.push(Scope::new(
                ReaderState::EntityReferenceLink,
                Item::EntityReferenceLink(EntityReferenceLink { url }),
                ScopeKind::EntityReferenceLink,
            ));
            return Ok(());
        }

        let content = std::mem::replace(&mut nested.content, NestedContent::Done);
        if matches!(content, NestedContent::Deferred | NestedContent::Done) {
            top.item = Item::NestedResourceInfo(nested.info.clone());
            top.state = ReaderState::NestedResourceInfoEnd;
            return Ok(());
        }

        let target = nested.target.clone();
        let container = nested.container.clone();
        let type_peeked = nested.type_peeked;
        let set = ResourceSet {
            count: nested.info.count,
            next_link: nested.info.next_link.clone(),
            is_delta: content == NestedContent::Delta,
            ..ResourceSet::default()
        };
        let owner = nested.info.name.clone();
        let navigation_source = top.navigation_source.clone();
        let path = top.path.clone();

        match self.reader.token().clone() {
            Token::StartObject => {
                self.reader.read()?;
                let collector = PropertyAndAnnotationCollector::new();
                self.push_resource(collector, target, navigation_source, path, container, type_peeked)
            }
            Token::Primitive(scalar) if scalar.is_null() => {
                self.reader.read()?;
                self.push_null_resource()
            }
            Token::StartArray => {
                self.reader.read()?;
                let item_type = target.as_ref().and_then(TypeRef::item_type).cloned();
                let set = ResourceSet {
                    type_name: item_type.as_ref().and_then(TypeRef::name),
                    ..set
                };
                let kind = SetScope {
                    top_level: false,
                    owner: Some(owner),
                    container,
                    collector: None,
                };
                self.push_set(set, item_type, navigation_source, path, kind)
            }
            other => Err(ReaderError::unexpected("a resource, a resource set or null", other)),
        }
    }

    // ── leaving scopes ──────────────────────────────────────────────────

    fn leave_scope(&mut self) -> Result<()> {
        let Some(scope) = self.scopes.pop() else {
            return Ok(());
        };
        if let ScopeKind::Resource(_) = scope.kind {
            self.reader.expect(&Token::EndObject, "'}' at the end of a resource")?;
        }
        self.resume_parent()
    }

    /// Continues the scope that was under a finished one.
    fn resume_parent(&mut self) -> Result<()> {
        match &self.top().kind {
            ScopeKind::Start => self.finish_payload(),
            ScopeKind::ResourceSet(_) => self.read_set_item(),
            ScopeKind::NestedResourceInfo(_) => self.read_nested_content(),
            ScopeKind::Resource(_) => {
                self.read_resource_content()?;
                self.continue_resource()
            }
            ScopeKind::NullResource | ScopeKind::Primitive | ScopeKind::EntityReferenceLink | ScopeKind::Completed => {
                Ok(())
            }
        }
    }

    /// Reads the rest of the top-level object after its content.
    fn finish_payload(&mut self) -> Result<()> {
        loop {
            match self.reader.token().clone() {
                Token::Property(name) => match MemberName::parse(&name) {
                    // the content was read with whatever type was known before it
                    MemberName::InstanceAnnotation(a) | MemberName::PropertyAnnotation { annotation: a, .. }
                        if a == annotations::TYPE =>
                    {
                        return Err(ReaderError::TypeAnnotationNotFirst);
                    }
                    MemberName::InstanceAnnotation(_) | MemberName::PropertyAnnotation { .. } => {
                        debug!("ignoring trailing '{name}'");
                        self.reader.read()?;
                        self.reader.skip_value()?;
                    }
                    _ => return Err(ReaderError::unexpected("an annotation or '}'", Token::Property(name))),
                },
                Token::EndObject => {
                    self.reader.read()?;
                }
                Token::EndOfInput => break,
                other => return Err(ReaderError::unexpected("the end of the payload", other)),
            }
        }
        self.scopes
            .push(Scope::new(ReaderState::Completed, Item::None, ScopeKind::Completed));
        Ok(())
    }
}

/// An annotation of a resource set, before or after its `value`.
fn read_set_annotation(
    reader: &mut JsonReader,
    m: &Materializer<'_>,
    set: &mut ResourceSet,
    collector: &PropertyAndAnnotationCollector,
    member: Classified,
    depth: usize,
) -> Result<()> {
    match member.kind {
        PropertyKind::ODataInstanceAnnotation => match member.name.as_str() {
            annotations::COUNT => set.count = Some(read_count(reader)?),
            annotations::NEXT_LINK => set.next_link = Some(reader.read_string()?),
            annotations::DELTA_LINK => set.delta_link = Some(reader.read_string()?),
            other => {
                debug!("ignoring '@{other}' on a resource set");
                reader.skip_value()?;
            }
        },
        PropertyKind::CustomInstanceAnnotation => {
            let annotation = m.read_instance_annotation(reader, collector, &member.name, depth)?;
            set.instance_annotations.push(annotation);
        }
        _ => return Err(ReaderError::unexpected("a resource set annotation", format!("'{}'", member.name))),
    }
    Ok(())
}

/// `Owner@odata.nextLink` and friends following a nested set's `]`.
fn read_trailing_annotations(reader: &mut JsonReader, owner: &str, set: &mut ResourceSet) -> Result<()> {
    loop {
        let annotation = match reader.token() {
            Token::Property(name) => match MemberName::parse(name) {
                MemberName::PropertyAnnotation { property, annotation }
                    if property == owner
                        && matches!(
                            annotation.as_str(),
                            annotations::COUNT | annotations::NEXT_LINK | annotations::DELTA_LINK
                        ) =>
                {
                    annotation
                }
                _ => return Ok(()),
            },
            _ => return Ok(()),
        };
        reader.read()?;
        match annotation.as_str() {
            annotations::COUNT => set.count = Some(read_count(reader)?),
            annotations::NEXT_LINK => set.next_link = Some(reader.read_string()?),
            _ => set.delta_link = Some(reader.read_string()?),
        }
    }
}
