//! The policy layer: per-element and per-attribute filters between the
//! balancer and the renderer.
//!
//! Policies are plain values, not trait objects wired at class-load time:
//! the identity, the absorbing reject-all, a flattened join, or a custom
//! function. A [`PolicyFactory`] bundles them with URL gating, link-rel
//! handling, CSS settings, and the stream pre/postprocessors; factories
//! are immutable once built and safe to share across threads.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::balancer::{Balancer, MAX_NESTING_LIMIT};
use crate::css;
use crate::css::schema::CssSchema;
use crate::elements::{self, TextMode};
use crate::render::Renderer;
use crate::tokenizer::Tokenizer;
use crate::tokens::{Attribute, HtmlEvent, HtmlStreamEventReceiver};
use crate::url::UrlPolicy;

/// A function deciding the fate of an element: `None` drops it (children
/// are kept), `Some(name)` keeps it, possibly renamed, with whatever
/// attribute edits the function made in place.
pub type ElementFn = dyn Fn(&str, &mut Vec<Attribute>) -> Option<String> + Send + Sync;

/// A function deciding the fate of one attribute value: `None` drops the
/// attribute (name and value together), `Some(v)` keeps it with value `v`.
pub type AttributeFn = dyn Fn(&str, &str, &str) -> Option<String> + Send + Sync;

/// An element policy as a tagged value. Joining flattens, so deep builder
/// chains do not produce towers of nested closures.
#[derive(Clone)]
pub enum ElementPolicy {
    Identity,
    RejectAll,
    Joined(Vec<ElementPolicy>),
    Custom(Arc<ElementFn>),
}

impl ElementPolicy {
    /// Ordered join: apply `first`, and if it kept the element, apply
    /// `second` to its output. Identity is the unit, RejectAll absorbs.
    pub fn join(first: ElementPolicy, second: ElementPolicy) -> ElementPolicy {
        use ElementPolicy::*;
        match (first, second) {
            (Identity, other) | (other, Identity) => other,
            (RejectAll, _) | (_, RejectAll) => RejectAll,
            (Joined(mut left), Joined(right)) => {
                left.extend(right);
                Joined(left)
            }
            (Joined(mut left), single) => {
                left.push(single);
                Joined(left)
            }
            (single, Joined(right)) => {
                let mut list = vec![single];
                list.extend(right);
                Joined(list)
            }
            (left, right) => Joined(vec![left, right]),
        }
    }

    pub fn apply(&self, name: &str, attributes: &mut Vec<Attribute>) -> Option<String> {
        match self {
            ElementPolicy::Identity => Some(name.to_string()),
            ElementPolicy::RejectAll => None,
            ElementPolicy::Joined(policies) => {
                let mut name = name.to_string();
                for policy in policies {
                    name = policy.apply(&name, attributes)?;
                }
                Some(name)
            }
            ElementPolicy::Custom(f) => f(name, attributes),
        }
    }
}

/// An attribute policy as a tagged value; same algebra as
/// [`ElementPolicy`].
#[derive(Clone)]
pub enum AttributePolicy {
    Identity,
    RejectAll,
    Joined(Vec<AttributePolicy>),
    Custom(Arc<AttributeFn>),
}

impl AttributePolicy {
    pub fn join(first: AttributePolicy, second: AttributePolicy) -> AttributePolicy {
        use AttributePolicy::*;
        match (first, second) {
            (Identity, other) | (other, Identity) => other,
            (RejectAll, _) | (_, RejectAll) => RejectAll,
            (Joined(mut left), Joined(right)) => {
                left.extend(right);
                Joined(left)
            }
            (Joined(mut left), single) => {
                left.push(single);
                Joined(left)
            }
            (single, Joined(right)) => {
                let mut list = vec![single];
                list.extend(right);
                Joined(list)
            }
            (left, right) => Joined(vec![left, right]),
        }
    }

    pub fn apply(&self, element: &str, attribute: &str, value: &str) -> Option<String> {
        match self {
            AttributePolicy::Identity => Some(value.to_string()),
            AttributePolicy::RejectAll => None,
            AttributePolicy::Joined(policies) => {
                let mut value = value.to_string();
                for policy in policies {
                    value = policy.apply(element, attribute, &value)?;
                }
                Some(value)
            }
            AttributePolicy::Custom(f) => f(element, attribute, value),
        }
    }
}

/// A pure event transform applied before the balancer (preprocessor) or
/// after the policy stage (postprocessor). Returning `None` drops the
/// event.
pub type EventTransform = Arc<dyn Fn(HtmlEvent) -> Option<HtmlEvent> + Send + Sync>;

/// Receives notice of everything the policy stage throws away. The
/// context value is the caller's own; it is threaded through untouched.
pub trait HtmlChangeListener<T>: Send + Sync {
    fn discarded_tag(&self, context: &mut T, element: &str);
    fn discarded_attributes(&self, context: &mut T, element: &str, attributes: &[&str]);
}

/// Attribute names whose values are URLs and pass through protocol
/// gating.
pub fn is_url_attribute(name: &str) -> bool {
    matches!(
        name,
        "href"
            | "src"
            | "srcset"
            | "action"
            | "formaction"
            | "cite"
            | "data"
            | "poster"
            | "background"
            | "longdesc"
            | "usemap"
    )
}

/// Elements dropped (children kept) when every attribute has been
/// filtered away; an `<a>` without its `href` or an `<img>` without its
/// `src` carries no information, only noise.
fn skipped_when_attributeless(name: &str) -> bool {
    matches!(name, "a" | "font" | "img" | "input" | "span")
}

/// An immutable bundle of policies, produced by the builder and reusable
/// for any number of sanitization runs from any number of threads.
#[derive(Clone)]
pub struct PolicyFactory {
    pub(crate) element_policies: FxHashMap<Box<str>, ElementPolicy>,
    /// Per-element attribute policies, keyed element name then attribute
    /// name.
    pub(crate) attribute_policies: FxHashMap<Box<str>, FxHashMap<Box<str>, AttributePolicy>>,
    /// Attribute policies applying on every whitelisted element.
    pub(crate) global_attribute_policies: FxHashMap<Box<str>, AttributePolicy>,
    pub(crate) url_policy: UrlPolicy,
    /// rel tokens appended to links, in insertion order.
    pub(crate) required_rel: Vec<Box<str>>,
    /// rel tokens removed from links. Skip wins over require.
    pub(crate) skipped_rel: FxHashSet<Box<str>>,
    pub(crate) css: Arc<CssSchema>,
    pub(crate) allow_style_urls: bool,
    pub(crate) preprocessors: Vec<EventTransform>,
    pub(crate) postprocessors: Vec<EventTransform>,
    pub(crate) nesting_limit: usize,
}

impl PolicyFactory {
    pub(crate) fn empty() -> Self {
        Self {
            element_policies: FxHashMap::default(),
            attribute_policies: FxHashMap::default(),
            global_attribute_policies: FxHashMap::default(),
            url_policy: UrlPolicy::default(),
            required_rel: Vec::new(),
            skipped_rel: FxHashSet::default(),
            css: CssSchema::default_schema(),
            allow_style_urls: false,
            preprocessors: Vec::new(),
            postprocessors: Vec::new(),
            nesting_limit: MAX_NESTING_LIMIT,
        }
    }

    /// Joins two factories into one that is at least as strict as either:
    /// element whitelists accumulate, shared attribute policies compose,
    /// URL protocol sets intersect, and rel requirements union.
    pub fn and(&self, other: &PolicyFactory) -> PolicyFactory {
        let mut joined = self.clone();

        for (name, policy) in &other.element_policies {
            match joined.element_policies.remove(name) {
                Some(existing) => {
                    joined
                        .element_policies
                        .insert(name.clone(), ElementPolicy::join(existing, policy.clone()));
                }
                None => {
                    joined.element_policies.insert(name.clone(), policy.clone());
                }
            }
        }

        for (element, attrs) in &other.attribute_policies {
            let slot = joined.attribute_policies.entry(element.clone()).or_default();
            for (attr, policy) in attrs {
                match slot.remove(attr) {
                    Some(existing) => {
                        slot.insert(attr.clone(), AttributePolicy::join(existing, policy.clone()));
                    }
                    None => {
                        slot.insert(attr.clone(), policy.clone());
                    }
                }
            }
        }

        for (attr, policy) in &other.global_attribute_policies {
            match joined.global_attribute_policies.remove(attr) {
                Some(existing) => {
                    joined
                        .global_attribute_policies
                        .insert(attr.clone(), AttributePolicy::join(existing, policy.clone()));
                }
                None => {
                    joined
                        .global_attribute_policies
                        .insert(attr.clone(), policy.clone());
                }
            }
        }

        joined.url_policy = if self.url_policy.is_empty() {
            other.url_policy.clone()
        } else if other.url_policy.is_empty() {
            self.url_policy.clone()
        } else {
            self.url_policy.intersect(&other.url_policy)
        };

        for token in &other.required_rel {
            if !joined.required_rel.contains(token) {
                joined.required_rel.push(token.clone());
            }
        }
        joined.skipped_rel.extend(other.skipped_rel.iter().cloned());

        joined.css = Arc::new(self.css.intersect(&other.css));
        joined.allow_style_urls = self.allow_style_urls && other.allow_style_urls;

        joined
            .preprocessors
            .extend(other.preprocessors.iter().cloned());
        joined
            .postprocessors
            .extend(other.postprocessors.iter().cloned());
        joined.nesting_limit = joined.nesting_limit.min(other.nesting_limit);

        joined
    }

    /// Sanitizes `html` into a fresh string, logging drops at debug level.
    pub fn sanitize(&self, html: &str) -> String {
        self.run(html, None)
    }

    /// Sanitizes `html`, reporting each discarded tag and attribute list
    /// to `listener` with the caller's context value.
    pub fn sanitize_with<T>(
        &self,
        html: &str,
        listener: &dyn HtmlChangeListener<T>,
        context: &mut T,
    ) -> String {
        let mut report = |discard: Discard<'_>| match discard {
            Discard::Tag(element) => listener.discarded_tag(context, element),
            Discard::Attributes(element, attributes) => {
                listener.discarded_attributes(context, element, attributes)
            }
        };
        self.run_with_report(html, None, Some(&mut report as &mut dyn FnMut(Discard<'_>)))
    }

    /// Sanitizes `html`, delivering renderer-contract-violation messages
    /// to `error_handler` instead of the log.
    pub fn sanitize_into(&self, html: &str, error_handler: &mut dyn FnMut(&str)) -> String {
        self.run(html, Some(error_handler))
    }

    /// Runs the full pipeline with `receiver` in the renderer's seat and
    /// hands it back. For consumers that want the sanitized event stream
    /// rather than serialized markup.
    pub fn apply<R: HtmlStreamEventReceiver>(&self, html: &str, receiver: R) -> R {
        let post = EventMapStage {
            transforms: &self.postprocessors,
            next: receiver,
        };
        let policy = PolicySanitizer::new(self, post, None);
        let balancer = Balancer::new(self.nesting_limit, policy);
        let mut pre = EventMapStage {
            transforms: &self.preprocessors,
            next: balancer,
        };
        Tokenizer::run(html, &mut pre);
        pre.next.into_inner().into_inner().next
    }

    fn run(&self, html: &str, error_handler: Option<&mut dyn FnMut(&str)>) -> String {
        self.run_with_report(html, error_handler, None)
    }

    fn run_with_report<'a, 'b>(
        &'a self,
        html: &str,
        error_handler: Option<&mut dyn FnMut(&str)>,
        report: Option<&'b mut dyn FnMut(Discard<'_>)>,
    ) -> String
    where
        'a: 'b,
    {
        let mut log_error = |message: &str| log::debug!("dropped while rendering: {message}");
        let handler: &mut dyn FnMut(&str) = match error_handler {
            Some(handler) => handler,
            None => &mut log_error,
        };
        let renderer = Renderer::new(String::new(), handler);

        let post = EventMapStage {
            transforms: &self.postprocessors,
            next: renderer,
        };
        let policy = PolicySanitizer::new(self, post, report);
        let balancer = Balancer::new(self.nesting_limit, policy);
        let mut pre = EventMapStage {
            transforms: &self.preprocessors,
            next: balancer,
        };
        Tokenizer::run(html, &mut pre);

        pre.next
            .into_inner()
            .into_inner()
            .next
            .into_writer()
    }
}

/// What the policy stage reports upward about a drop.
pub(crate) enum Discard<'a> {
    Tag(&'a str),
    Attributes(&'a str, &'a [&'a str]),
}

/// Applies a transform list to each tag and text event. Document
/// bracketing events pass through untouched; a transform cannot unbalance
/// the document frame.
pub(crate) struct EventMapStage<'a, R> {
    pub(crate) transforms: &'a [EventTransform],
    pub(crate) next: R,
}

impl<R: HtmlStreamEventReceiver> EventMapStage<'_, R> {
    fn map(&mut self, event: HtmlEvent) {
        let mut event = event;
        for transform in self.transforms {
            match transform(event) {
                Some(next) => event = next,
                None => return,
            }
        }
        self.next.receive(event);
    }

    pub(crate) fn into_inner(self) -> R {
        self.next
    }
}

impl<R: HtmlStreamEventReceiver> HtmlStreamEventReceiver for EventMapStage<'_, R> {
    fn open_document(&mut self) {
        self.next.open_document();
    }

    fn close_document(&mut self) {
        self.next.close_document();
    }

    fn open_tag(&mut self, name: &str, attributes: Vec<Attribute>) {
        if self.transforms.is_empty() {
            self.next.open_tag(name, attributes);
        } else {
            self.map(HtmlEvent::OpenTag {
                name: name.to_string(),
                attributes,
            });
        }
    }

    fn close_tag(&mut self, name: &str) {
        if self.transforms.is_empty() {
            self.next.close_tag(name);
        } else {
            self.map(HtmlEvent::CloseTag {
                name: name.to_string(),
            });
        }
    }

    fn text(&mut self, text: &str) {
        if self.transforms.is_empty() {
            self.next.text(text);
        } else {
            self.map(HtmlEvent::Text {
                text: text.to_string(),
            });
        }
    }
}

/// The fate assigned to each open element, mirrored on close.
enum Fate {
    /// Emitted downstream, possibly renamed.
    Emitted { name: Box<str> },
    /// Start and end tag dropped; children keep flowing.
    DropKeepChildren,
    /// Dropped along with everything inside (rawtext and RCDATA elements,
    /// whose content is data for a dangerous interpreter, not markup).
    DropWithContent,
}

/// The receiver between balancer and renderer applying the factory's
/// policies. Relies on its input being balanced: fates are a strict
/// stack.
pub(crate) struct PolicySanitizer<'f, R> {
    factory: &'f PolicyFactory,
    next: R,
    fates: Vec<Fate>,
    /// How many `DropWithContent` fates are currently open.
    dropped_content_depth: usize,
    report: Option<&'f mut dyn FnMut(Discard<'_>)>,
}

impl<'f, R: HtmlStreamEventReceiver> PolicySanitizer<'f, R> {
    pub(crate) fn new(
        factory: &'f PolicyFactory,
        next: R,
        report: Option<&'f mut dyn FnMut(Discard<'_>)>,
    ) -> Self {
        Self {
            factory,
            next,
            fates: Vec::new(),
            dropped_content_depth: 0,
            report,
        }
    }

    pub(crate) fn into_inner(self) -> R {
        self.next
    }

    fn report_tag(&mut self, element: &str) {
        log::debug!("dropping element <{element}>");
        if let Some(report) = self.report.as_mut() {
            report(Discard::Tag(element));
        }
    }

    fn report_attributes(&mut self, element: &str, names: &[String]) {
        if names.is_empty() {
            return;
        }
        log::debug!("dropping attributes {names:?} of <{element}>");
        if let Some(report) = self.report.as_mut() {
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            report(Discard::Attributes(element, &names));
        }
    }

    /// The effective policy for one attribute: the global policy joined
    /// with the element-specific one; `None` when neither exists (the
    /// attribute is not whitelisted at all).
    fn attribute_policy(&self, element: &str, attribute: &str) -> Option<AttributePolicy> {
        let global = self.factory.global_attribute_policies.get(attribute);
        let scoped = self
            .factory
            .attribute_policies
            .get(element)
            .and_then(|attrs| attrs.get(attribute));

        match (global, scoped) {
            (Some(g), Some(s)) => Some(AttributePolicy::join(g.clone(), s.clone())),
            (Some(g), None) => Some(g.clone()),
            (None, Some(s)) => Some(s.clone()),
            (None, None) => None,
        }
    }

    /// Runs one attribute through its policy chain, URL gating, and CSS
    /// sanitization. `None` removes name and value together.
    fn filter_attribute(&self, element: &str, attribute: &Attribute) -> Option<Attribute> {
        let policy = self.attribute_policy(element, &attribute.name)?;
        let mut value = policy.apply(element, &attribute.name, &attribute.value)?;

        if is_url_attribute(&attribute.name) {
            if attribute.name == "srcset" {
                value = self.factory.url_policy.sanitize_srcset(&value)?;
            } else {
                value = self.factory.url_policy.apply(&value)?.into_owned();
            }
        }

        if attribute.name == "style" {
            value = css::sanitize_declarations(
                &self.factory.css,
                &self.factory.url_policy,
                self.factory.allow_style_urls,
                &value,
            )?;
        }

        Some(Attribute {
            name: attribute.name.clone(),
            value,
        })
    }

    /// Appends required rel tokens (and removes skipped ones) on a link.
    fn apply_rel_policy(&self, attributes: &mut Vec<Attribute>) {
        let has_href = attributes.iter().any(|a| a.name == "href");
        if !has_href {
            return;
        }

        let wants_opener_guard = attributes
            .iter()
            .any(|a| a.name == "target" && !a.value.eq_ignore_ascii_case("_self"));

        let mut required: Vec<&str> = self
            .factory
            .required_rel
            .iter()
            .map(|t| t.as_ref())
            .collect();
        if wants_opener_guard {
            for token in ["noopener", "noreferrer"] {
                if !required.contains(&token) {
                    required.push(token);
                }
            }
        }
        // Skip wins over require.
        required.retain(|token| !self.factory.skipped_rel.contains(*token));

        let existing_index = attributes.iter().position(|a| a.name == "rel");
        let mut tokens: Vec<String> = Vec::new();
        if let Some(index) = existing_index {
            for token in attributes[index].value.split_ascii_whitespace() {
                let lowered = token.to_ascii_lowercase();
                if self.factory.skipped_rel.contains(lowered.as_str()) {
                    continue;
                }
                if !tokens.contains(&lowered) {
                    tokens.push(lowered);
                }
            }
        }
        for token in required {
            if !tokens.iter().any(|t| t == token) {
                tokens.push(token.to_string());
            }
        }

        match (existing_index, tokens.is_empty()) {
            (Some(index), true) => {
                attributes.remove(index);
            }
            (Some(index), false) => attributes[index].value = tokens.join(" "),
            (None, false) => attributes.push(Attribute::new("rel", tokens.join(" "))),
            (None, true) => {}
        }
    }
}

impl<R: HtmlStreamEventReceiver> HtmlStreamEventReceiver for PolicySanitizer<'_, R> {
    fn open_document(&mut self) {
        self.next.open_document();
    }

    fn close_document(&mut self) {
        self.next.close_document();
    }

    fn open_tag(&mut self, name: &str, attributes: Vec<Attribute>) {
        let descriptor = elements::lookup(name);
        let is_void = descriptor.is_some_and(|d| d.is_void());

        if self.dropped_content_depth > 0 {
            // Nothing escapes a dropped rawtext subtree.
            if !is_void {
                self.fates.push(Fate::DropWithContent);
                self.dropped_content_depth += 1;
            }
            return;
        }

        let content_is_data = descriptor
            .is_some_and(|d| !matches!(d.text_mode, TextMode::Pcdata | TextMode::Void));

        let Some(element_policy) = self.factory.element_policies.get(name) else {
            self.report_tag(name);
            if !is_void {
                if content_is_data {
                    self.fates.push(Fate::DropWithContent);
                    self.dropped_content_depth += 1;
                } else {
                    self.fates.push(Fate::DropKeepChildren);
                }
            }
            return;
        };
        let element_policy = element_policy.clone();

        // Attribute filtering, deduplicating repeats to the first approved
        // value before the element policy sees the list.
        let mut kept: Vec<Attribute> = Vec::with_capacity(attributes.len());
        let mut discarded: Vec<String> = Vec::new();
        for attribute in &attributes {
            if kept.iter().any(|k| k.name == attribute.name) {
                continue;
            }
            match self.filter_attribute(name, attribute) {
                Some(filtered) => kept.push(filtered),
                None => discarded.push(attribute.name.clone()),
            }
        }
        self.report_attributes(name, &discarded);

        let Some(mut final_name) = element_policy.apply(name, &mut kept) else {
            self.report_tag(name);
            if !is_void {
                if content_is_data {
                    self.fates.push(Fate::DropWithContent);
                    self.dropped_content_depth += 1;
                } else {
                    self.fates.push(Fate::DropKeepChildren);
                }
            }
            return;
        };

        /*
         * The obsolete rawtext blocks re-emit as <pre>. Their content was
         * lexed without markup interpretation and will be re-escaped as
         * normal text, which is the only rendition a downstream XHTML-ish
         * parser reads the same way.
         */
        if matches!(final_name.as_str(), "xmp" | "listing" | "plaintext") {
            final_name = "pre".to_string();
        }

        if kept.is_empty() && skipped_when_attributeless(name) {
            self.report_tag(name);
            if !is_void {
                self.fates.push(Fate::DropKeepChildren);
            }
            return;
        }

        if final_name == "a" {
            self.apply_rel_policy(&mut kept);
        }

        if !is_void {
            self.fates.push(Fate::Emitted {
                name: final_name.clone().into_boxed_str(),
            });
        }
        self.next.open_tag(&final_name, kept);
    }

    fn close_tag(&mut self, _name: &str) {
        match self.fates.pop() {
            Some(Fate::Emitted { name }) => self.next.close_tag(&name),
            Some(Fate::DropWithContent) => self.dropped_content_depth -= 1,
            Some(Fate::DropKeepChildren) | None => {}
        }
    }

    fn text(&mut self, text: &str) {
        if self.dropped_content_depth > 0 {
            return;
        }

        // The innermost surviving element decides how text is handled.
        let enclosing = self.fates.iter().rev().find_map(|fate| match fate {
            Fate::Emitted { name } => Some(name.as_ref()),
            _ => None,
        });

        if enclosing == Some("style") {
            let cleaned = css::sanitize_stylesheet(
                &self.factory.css,
                &self.factory.url_policy,
                self.factory.allow_style_urls,
                text,
            );
            if !cleaned.is_empty() {
                self.next.text(&cleaned);
            }
            return;
        }

        self.next.text(text);
    }
}
