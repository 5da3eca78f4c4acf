//! A whitelist-based HTML sanitizer.
//!
//! Untrusted HTML fragments go in; normalized, well-formed, policy-
//! conformant fragments come out, with no script-execution vectors, no
//! cross-origin exfiltration vectors, and no construct a downstream
//! parser could re-interpret into either. Input flows through a fixed
//! pipeline: a resilient tokenizer, a tag balancer enforcing containment,
//! the configured policies, and a strict re-escaping renderer.
//!
//! ```text
//! input → tokenizer → balancer → policy chain → renderer → output
//! ```
//!
//! Consumers describe what they trust with [`HtmlPolicyBuilder`] (or
//! compose the [`presets`]) and get back an immutable, thread-safe
//! [`PolicyFactory`] usable for any number of inputs:
//!
//! ```
//! use html_sanitizer::presets;
//!
//! let factory = presets::formatting().and(&presets::links());
//! assert_eq!(
//!     factory.sanitize("<b onmouseover=\"evil()\">bold</b><script>x</script>"),
//!     "<b>bold</b>"
//! );
//! ```
//!
//! For a one-shot call with a conservative default policy there is
//! [`sanitize`]:
//!
//! ```
//! assert_eq!(html_sanitizer::sanitize("<a href=\"javascript:x\">hi</a>"), "hi");
//! ```

use std::sync::LazyLock;

mod macros;
mod str_fns;

pub mod balancer;
pub mod builder;
pub mod css;
pub mod elements;
pub mod policy;
pub mod presets;
pub mod render;
pub mod tokenizer;
pub mod tokens;
pub mod url;

pub use builder::{AttributeBuilder, HtmlPolicyBuilder};
pub use policy::{
    AttributePolicy, ElementPolicy, EventTransform, HtmlChangeListener, PolicyFactory,
};
pub use render::{RenderError, Renderer};
pub use tokens::{Attribute, HtmlEvent, HtmlStreamEventReceiver};
pub use url::UrlPolicy;

/// The factory behind [`sanitize`]: formatting, blocks, links, images,
/// and styling, with the standard URL protocols.
static DEFAULT_FACTORY: LazyLock<PolicyFactory> = LazyLock::new(|| {
    presets::formatting()
        .and(&presets::blocks())
        .and(&presets::links())
        .and(&presets::images())
        .and(&presets::styles())
});

/// One-shot sanitization with the default factory.
pub fn sanitize(html: &str) -> String {
    DEFAULT_FACTORY.sanitize(html)
}

#[cfg(test)]
mod test {
    #[test]
    fn default_factory_round_trip() {
        assert_eq!(
            super::sanitize("<p><b>safe</b></p><script>alert(1)</script>"),
            "<p><b>safe</b></p>"
        );
    }

    #[test]
    fn factories_are_shareable_across_threads() {
        let factory = std::sync::Arc::new(super::presets::formatting());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let factory = factory.clone();
                std::thread::spawn(move || factory.sanitize("<b>x</b><u>y</u>"))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), "<b>x</b><u>y</u>");
        }
    }
}
