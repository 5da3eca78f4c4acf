//! The fluent configuration surface over [`PolicyFactory`].
//!
//! ```
//! use html_sanitizer::HtmlPolicyBuilder;
//!
//! let factory = HtmlPolicyBuilder::new()
//!     .allow_elements(["a", "p"])
//!     .allow_attributes(["href"])
//!     .on_elements(["a"])
//!     .allow_standard_url_protocols()
//!     .require_rel_nofollow_on_links()
//!     .to_factory();
//!
//! assert_eq!(
//!     factory.sanitize("<p onclick=\"x()\">hi</p>"),
//!     "<p>hi</p>"
//! );
//! ```
//!
//! Builder misuse (empty names, whitespace inside a rel token) is a
//! programmer error and panics immediately; malformed *input* never
//! panics anything.

use std::sync::Arc;

use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::balancer::MAX_NESTING_LIMIT;
use crate::css::schema::CssSchema;
use crate::policy::{
    AttributePolicy, ElementPolicy, EventTransform, PolicyFactory,
};
use crate::tokens::HtmlEvent;
use crate::url::UrlPolicy;

#[derive(Default)]
pub struct HtmlPolicyBuilder {
    allowed_elements: FxHashMap<Box<str>, ElementPolicy>,
    rejected_elements: FxHashSet<Box<str>>,
    attribute_policies: FxHashMap<Box<str>, FxHashMap<Box<str>, AttributePolicy>>,
    global_attribute_policies: FxHashMap<Box<str>, AttributePolicy>,
    protocols: Vec<Box<str>>,
    required_rel: Vec<Box<str>>,
    skipped_rel: FxHashSet<Box<str>>,
    styling: Option<Arc<CssSchema>>,
    style_urls: bool,
    preprocessors: Vec<EventTransform>,
    postprocessors: Vec<EventTransform>,
    nesting_limit: Option<usize>,
}

impl HtmlPolicyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whitelists elements, passed through unchanged.
    pub fn allow_elements<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            let name = checked_name(name.as_ref());
            self.allowed_elements
                .entry(name)
                .or_insert(ElementPolicy::Identity);
        }
        self
    }

    /// Rejects elements even if a later (or joined) policy allows them.
    pub fn disallow_elements<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            self.rejected_elements.insert(checked_name(name.as_ref()));
        }
        self
    }

    /// Starts an attribute whitelist entry; finish it with
    /// [`AttributeBuilder::on_elements`] or [`AttributeBuilder::globally`].
    pub fn allow_attributes<I, S>(self, names: I) -> AttributeBuilder
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<Box<str>> = names
            .into_iter()
            .map(|name| checked_name(name.as_ref()))
            .collect();
        assert!(!names.is_empty(), "allow_attributes requires at least one name");
        AttributeBuilder {
            parent: self,
            names,
            policy: AttributePolicy::Identity,
        }
    }

    pub fn allow_url_protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for protocol in protocols {
            let protocol = checked_name(protocol.as_ref());
            if !self.protocols.contains(&protocol) {
                self.protocols.push(protocol);
            }
        }
        self
    }

    /// `http`, `https`, `mailto`, and `tel`.
    pub fn allow_standard_url_protocols(self) -> Self {
        self.allow_url_protocols(["http", "https", "mailto", "tel"])
    }

    pub fn require_rel_nofollow_on_links(self) -> Self {
        self.require_rels_on_links(["nofollow"])
    }

    /// rel tokens appended to every `<a href>` that lacks them.
    pub fn require_rels_on_links<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for token in tokens {
            let token = checked_rel_token(token.as_ref());
            if !self.required_rel.contains(&token) {
                self.required_rel.push(token);
            }
        }
        self
    }

    /// rel tokens removed from every link. Skipping a token beats
    /// requiring it, including requirements added by a joined factory.
    pub fn skip_rels_on_links<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for token in tokens {
            self.skipped_rel.insert(checked_rel_token(token.as_ref()));
        }
        self
    }

    /// Allows the `style` attribute on every whitelisted element,
    /// sanitized against the default property schema.
    pub fn allow_styling(self) -> Self {
        self.allow_styling_with(CssSchema::default_schema())
    }

    /// Allows the `style` attribute, sanitized against a caller-supplied
    /// schema.
    pub fn allow_styling_with(mut self, schema: Arc<CssSchema>) -> Self {
        self.styling = Some(schema);
        self
    }

    /// Permits `url(...)` values inside styles, gated by the same URL
    /// protocol policy as `href` and `src`. Off by default even when
    /// styling is allowed.
    pub fn allow_urls_in_styles(mut self) -> Self {
        self.style_urls = true;
        self
    }

    /// Installs a pure event transform ahead of the balancer.
    pub fn with_preprocessor<F>(mut self, transform: F) -> Self
    where
        F: Fn(HtmlEvent) -> Option<HtmlEvent> + Send + Sync + 'static,
    {
        self.preprocessors.push(Arc::new(transform));
        self
    }

    /// Installs a pure event transform between the policy stage and the
    /// renderer.
    pub fn with_postprocessor<F>(mut self, transform: F) -> Self
    where
        F: Fn(HtmlEvent) -> Option<HtmlEvent> + Send + Sync + 'static,
    {
        self.postprocessors.push(Arc::new(transform));
        self
    }

    /// Caps element nesting depth; opens beyond the limit are suppressed.
    /// Clamped to `1..=256`.
    pub fn nesting_limit(mut self, limit: usize) -> Self {
        self.nesting_limit = Some(limit.clamp(1, MAX_NESTING_LIMIT));
        self
    }

    pub fn to_factory(self) -> PolicyFactory {
        let mut factory = PolicyFactory::empty();

        factory.element_policies = self.allowed_elements;
        for name in self.rejected_elements {
            factory
                .element_policies
                .insert(name, ElementPolicy::RejectAll);
        }

        factory.attribute_policies = self.attribute_policies;
        factory.global_attribute_policies = self.global_attribute_policies;

        if let Some(schema) = self.styling {
            factory.css = schema;
            factory
                .global_attribute_policies
                .entry("style".into())
                .or_insert(AttributePolicy::Identity);
        }
        factory.allow_style_urls = self.style_urls;

        factory.url_policy = UrlPolicy::new(self.protocols.iter().map(|p| p.as_ref()));
        factory.required_rel = self.required_rel;
        factory.skipped_rel = self.skipped_rel;
        factory.preprocessors = self.preprocessors;
        factory.postprocessors = self.postprocessors;
        factory.nesting_limit = self.nesting_limit.unwrap_or(MAX_NESTING_LIMIT);

        factory
    }
}

/// The half-built attribute whitelist entry returned by
/// [`HtmlPolicyBuilder::allow_attributes`].
pub struct AttributeBuilder {
    parent: HtmlPolicyBuilder,
    names: Vec<Box<str>>,
    policy: AttributePolicy,
}

impl AttributeBuilder {
    /// Constrains the values with a custom policy function.
    pub fn matching<F>(mut self, policy: F) -> Self
    where
        F: Fn(&str, &str, &str) -> Option<String> + Send + Sync + 'static,
    {
        self.policy = AttributePolicy::join(self.policy, AttributePolicy::Custom(Arc::new(policy)));
        self
    }

    /// Constrains the values to full matches of `pattern`.
    pub fn matching_regex(self, pattern: Regex) -> Self {
        self.matching(move |_, _, value| {
            pattern
                .find(value)
                .filter(|m| m.start() == 0 && m.end() == value.len())
                .map(|_| value.to_string())
        })
    }

    /// Constrains the values to a literal set, compared ASCII
    /// case-insensitively.
    pub fn matching_values<I, S>(self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let values: FxHashSet<String> = values
            .into_iter()
            .map(|v| v.as_ref().to_ascii_lowercase())
            .collect();
        self.matching(move |_, _, value| {
            values
                .contains(&value.to_ascii_lowercase())
                .then(|| value.to_string())
        })
    }

    /// Finishes the entry, scoped to the given elements.
    pub fn on_elements<I, S>(self, elements: I) -> HtmlPolicyBuilder
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let AttributeBuilder {
            mut parent,
            names,
            policy,
        } = self;

        for element in elements {
            let element = checked_name(element.as_ref());
            let slot = parent.attribute_policies.entry(element).or_default();
            for name in &names {
                match slot.remove(name) {
                    Some(existing) => {
                        slot.insert(name.clone(), AttributePolicy::join(existing, policy.clone()));
                    }
                    None => {
                        slot.insert(name.clone(), policy.clone());
                    }
                }
            }
        }
        parent
    }

    /// Finishes the entry, applying on every whitelisted element.
    pub fn globally(self) -> HtmlPolicyBuilder {
        let AttributeBuilder {
            mut parent,
            names,
            policy,
        } = self;

        for name in names {
            match parent.global_attribute_policies.remove(&name) {
                Some(existing) => {
                    parent
                        .global_attribute_policies
                        .insert(name, AttributePolicy::join(existing, policy.clone()));
                }
                None => {
                    parent.global_attribute_policies.insert(name, policy.clone());
                }
            }
        }
        parent
    }
}

fn checked_name(name: &str) -> Box<str> {
    assert!(!name.is_empty(), "names must not be empty");
    assert!(
        !name.chars().any(|c| c.is_ascii_whitespace()),
        "name {name:?} must not contain whitespace"
    );
    name.to_ascii_lowercase().into_boxed_str()
}

fn checked_rel_token(token: &str) -> Box<str> {
    assert!(!token.is_empty(), "rel tokens must not be empty");
    assert!(
        !token.chars().any(|c| c.is_ascii_whitespace()),
        "rel token {token:?} must be a single link type, not a list"
    );
    token.to_ascii_lowercase().into_boxed_str()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builds_a_working_factory() {
        let factory = HtmlPolicyBuilder::new()
            .allow_elements(["b", "p"])
            .to_factory();
        assert_eq!(factory.sanitize("<b>x</b><i>y</i>"), "<b>x</b>y");
    }

    #[test]
    fn attribute_scoping() {
        let factory = HtmlPolicyBuilder::new()
            .allow_elements(["p", "span"])
            .allow_attributes(["title"])
            .on_elements(["p"])
            .to_factory();
        assert_eq!(
            factory.sanitize("<p title=\"t\">a</p>"),
            "<p title=\"t\">a</p>"
        );
        // A span stripped of its every attribute is dropped as noise.
        assert_eq!(factory.sanitize("<span title=\"t\">a</span>"), "a");
    }

    #[test]
    fn regex_matching_requires_full_match() {
        let factory = HtmlPolicyBuilder::new()
            .allow_elements(["img"])
            .allow_attributes(["width"])
            .matching_regex(Regex::new("[0-9]+").unwrap())
            .on_elements(["img"])
            .to_factory();
        assert_eq!(
            factory.sanitize("<img width=\"10\">"),
            "<img width=\"10\" />"
        );
        assert_eq!(factory.sanitize("<img width=\"10px\">"), "");
    }

    #[test]
    fn value_set_matching_is_case_insensitive() {
        let factory = HtmlPolicyBuilder::new()
            .allow_elements(["p"])
            .allow_attributes(["dir"])
            .matching_values(["ltr", "rtl"])
            .globally()
            .to_factory();
        assert_eq!(factory.sanitize("<p dir=\"RTL\">a</p>"), "<p dir=\"RTL\">a</p>");
        assert_eq!(factory.sanitize("<p dir=\"up\">a</p>"), "<p>a</p>");
    }

    #[test]
    fn disallow_beats_allow_across_joins() {
        let allows = HtmlPolicyBuilder::new().allow_elements(["b", "i"]).to_factory();
        let rejects = HtmlPolicyBuilder::new()
            .allow_elements(["b"])
            .disallow_elements(["i"])
            .to_factory();
        let joined = allows.and(&rejects);
        assert_eq!(joined.sanitize("<b>x</b><i>y</i>"), "<b>x</b>y");
    }

    #[test]
    #[should_panic(expected = "single link type")]
    fn rel_token_with_whitespace_panics() {
        let _ = HtmlPolicyBuilder::new().skip_rels_on_links(["a b"]);
    }

    #[test]
    #[should_panic(expected = "must not be empty")]
    fn empty_element_name_panics() {
        let _ = HtmlPolicyBuilder::new().allow_elements([""]);
    }
}
