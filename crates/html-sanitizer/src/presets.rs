//! Ready-made policy bundles.
//!
//! Each preset is a small, legible factory; compose them with
//! [`PolicyFactory::and`] to taste. They are deliberately conservative —
//! a consumer who wants more reaches for [`HtmlPolicyBuilder`] directly.

use regex::Regex;

use crate::builder::HtmlPolicyBuilder;
use crate::policy::PolicyFactory;

/// Inline formatting: bold, italics, and the rest of the phrase markup.
pub fn formatting() -> PolicyFactory {
    HtmlPolicyBuilder::new()
        .allow_elements([
            "b", "i", "em", "strong", "u", "s", "strike", "sub", "sup", "small", "big", "tt",
            "code", "kbd", "samp", "var", "cite", "dfn", "abbr", "q", "span", "br",
        ])
        .to_factory()
}

/// Structural block elements.
pub fn blocks() -> PolicyFactory {
    HtmlPolicyBuilder::new()
        .allow_elements([
            "p", "div", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "li", "blockquote",
            "pre", "hr", "dl", "dt", "dd",
        ])
        .to_factory()
}

/// Links with `href`, restricted to the standard URL protocols.
pub fn links() -> PolicyFactory {
    HtmlPolicyBuilder::new()
        .allow_elements(["a"])
        .allow_attributes(["href"])
        .on_elements(["a"])
        .allow_standard_url_protocols()
        .to_factory()
}

/// Images with the usual presentation attributes.
pub fn images() -> PolicyFactory {
    let dimension = Regex::new("[0-9]{1,5}%?").expect("dimension pattern");
    HtmlPolicyBuilder::new()
        .allow_elements(["img"])
        .allow_attributes(["src", "alt", "title"])
        .on_elements(["img"])
        .allow_attributes(["width", "height"])
        .matching_regex(dimension)
        .on_elements(["img"])
        .allow_standard_url_protocols()
        .to_factory()
}

/// Tables, including the sections the balancer manufactures.
pub fn tables() -> PolicyFactory {
    let span = Regex::new("[0-9]{1,4}").expect("span pattern");
    HtmlPolicyBuilder::new()
        .allow_elements([
            "table", "thead", "tbody", "tfoot", "tr", "td", "th", "caption", "colgroup", "col",
        ])
        .allow_attributes(["colspan", "rowspan"])
        .matching_regex(span)
        .on_elements(["td", "th"])
        .to_factory()
}

/// Styling: the `style` attribute everywhere and sanitized `<style>`
/// elements, both filtered through the default property schema. URLs in
/// styles stay off.
pub fn styles() -> PolicyFactory {
    HtmlPolicyBuilder::new()
        .allow_styling()
        .allow_elements(["style"])
        .to_factory()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn presets_compose() {
        let factory = formatting().and(&blocks()).and(&links());
        assert_eq!(
            factory.sanitize("<p><b>hi</b> <a href=\"http://e/\">x</a></p>"),
            "<p><b>hi</b> <a href=\"http://e/\">x</a></p>"
        );
    }

    #[test]
    fn composition_is_commutative_in_effect() {
        let one = formatting().and(&links());
        let other = links().and(&formatting());
        for input in [
            "<a href=\"http://e/\"><b>x</b></a>",
            "<a href=\"javascript:x\">y</a>",
            "<i>z</i>",
        ] {
            assert_eq!(one.sanitize(input), other.sanitize(input));
        }
    }

    #[test]
    fn tables_cooperate_with_the_balancer() {
        let factory = tables();
        assert_eq!(
            factory.sanitize("<table><tr><td colspan=\"2\">a</td></tr></table>"),
            "<table><tbody><tr><td colspan=\"2\">a</td></tr></tbody></table>"
        );
    }
}
