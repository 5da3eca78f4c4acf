//! The output layer: balanced, policy-approved events to serialized
//! markup.
//!
//! Output is XHTML-flavored HTML: lowercase names, always-double-quoted
//! attribute values, void elements self-closed. Every text and attribute
//! context is re-escaped strictly enough that re-parsing the output —
//! by a lenient HTML parser, an XHTML parser, or this crate again —
//! yields the same element tree. The renderer is the last line of
//! defense, so contract violations (an invalid name, rawtext containing
//! its own end tag) drop the offending event and report it rather than
//! trusting upstream.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::elements::{self, TextMode};
use crate::policy::is_url_attribute;
use crate::str_fns::stripos;
use crate::tokens::{Attribute, HtmlStreamEventReceiver};

/// A renderer-contract violation or sink failure. Delivered to the error
/// handler as a human-readable string; processing continues (except that
/// a dead sink stops all further output).
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid element name {name:?}")]
    InvalidElementName { name: String },
    #[error("invalid attribute name {name:?} on <{element}>")]
    InvalidAttributeName { element: String, name: String },
    #[error("rawtext content of <{element}> contains its own end tag")]
    CdataContainsEndTag { element: String },
    #[error("tag event <{name}> inside rawtext element <{element}>")]
    TagInsideCdata { element: String, name: String },
    #[error("output sink failure: {0}")]
    Sink(#[from] fmt::Error),
}

static VALID_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[A-Za-z][A-Za-z0-9_\\-]*$").expect("valid name pattern"));

struct OpenElement {
    name: Box<str>,
    /// Whether the start tag was actually written; an element dropped for
    /// an invalid name still needs its close event consumed.
    emitted: bool,
    text_mode: TextMode,
}

pub struct Renderer<'e, W: fmt::Write> {
    out: W,
    on_error: &'e mut dyn FnMut(&str),
    open: Vec<OpenElement>,
    /// Adjacent text events coalesce here and are encoded in one piece
    /// when the next tag arrives; escaping decisions (the doubled-brace
    /// guard, the end-tag scan) must see the whole run.
    pending_text: String,
    /// True right after a `pre`/`textarea` open tag. Content starting
    /// with a newline gets one extra newline written, since a reparse
    /// will discard the first one as an authoring convenience.
    guard_newline: bool,
    /// Set when the sink failed; everything afterwards is discarded.
    dead: bool,
}

impl<'e, W: fmt::Write> Renderer<'e, W> {
    pub fn new(out: W, on_error: &'e mut dyn FnMut(&str)) -> Self {
        Self {
            out,
            on_error,
            open: Vec::new(),
            pending_text: String::new(),
            guard_newline: false,
            dead: false,
        }
    }

    pub fn into_writer(self) -> W {
        self.out
    }

    fn report(&mut self, error: RenderError) {
        (self.on_error)(&error.to_string());
    }

    fn write(&mut self, piece: &str) {
        if self.dead {
            return;
        }
        if let Err(error) = self.out.write_str(piece) {
            self.dead = true;
            self.report(RenderError::Sink(error));
        }
    }

    /// The escaping context of the insertion point: the nearest enclosing
    /// element that was actually written.
    fn current_text_mode(&self) -> TextMode {
        self.open
            .iter()
            .rev()
            .find(|entry| entry.emitted)
            .map_or(TextMode::Pcdata, |entry| entry.text_mode)
    }

    fn current_emitted_element(&self) -> Option<&str> {
        self.open
            .iter()
            .rev()
            .find(|entry| entry.emitted)
            .map(|entry| entry.name.as_ref())
    }

    fn flush_text(&mut self) {
        if self.pending_text.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.pending_text);

        if std::mem::take(&mut self.guard_newline) && text.starts_with('\n') {
            self.write("\n");
        }

        let mut encoded = String::with_capacity(text.len() + 16);
        match self.current_text_mode() {
            TextMode::Pcdata | TextMode::Void => {
                entities::encode_pcdata_onto(&text, &mut encoded)
            }
            TextMode::Rcdata => entities::encode_rcdata_onto(&text, &mut encoded),
            TextMode::Cdata | TextMode::PlainText => {
                /*
                 * Rawtext passes through unescaped, which is exactly why
                 * it may not contain anything a reparse would read as this
                 * element's end tag.
                 */
                let element = self
                    .current_emitted_element()
                    .unwrap_or_default()
                    .to_string();
                if contains_end_tag(&text, &element) {
                    self.report(RenderError::CdataContainsEndTag { element });
                    return;
                }
                encoded.extend(text.chars().filter(|&c| !entities::is_banned(c)));
            }
        }

        self.write(&encoded);
    }

    fn write_attribute(&mut self, element: &str, attribute: &Attribute) {
        if !VALID_NAME.is_match(&attribute.name) {
            self.report(RenderError::InvalidAttributeName {
                element: element.to_string(),
                name: attribute.name.clone(),
            });
            return;
        }

        let mut encoded = String::with_capacity(attribute.value.len() + 8);
        if is_url_attribute(&attribute.name) {
            let mut ascii_url = String::with_capacity(attribute.value.len());
            entities::encode_url_onto(&attribute.value, &mut ascii_url);
            entities::encode_attribute_onto(&ascii_url, &mut encoded);
        } else {
            entities::encode_attribute_onto(&attribute.value, &mut encoded);
        }

        self.write(" ");
        self.write(&attribute.name.to_ascii_lowercase());
        self.write("=\"");
        self.write(&encoded);
        self.write("\"");
    }
}

impl<W: fmt::Write> HtmlStreamEventReceiver for Renderer<'_, W> {
    fn open_document(&mut self) {}

    fn close_document(&mut self) {
        self.flush_text();
        // A balanced stream leaves nothing open; anything left is an
        // upstream bug, closed here so the output stays well-formed.
        while let Some(entry) = self.open.pop() {
            if entry.emitted && entry.text_mode != TextMode::Void {
                self.write("</");
                self.write(&entry.name);
                self.write(">");
            }
        }
    }

    fn open_tag(&mut self, name: &str, attributes: Vec<Attribute>) {
        self.flush_text();
        self.guard_newline = false;

        let descriptor = elements::lookup(name);
        let is_void = descriptor.is_some_and(|d| d.is_void());
        let text_mode = descriptor.map_or(TextMode::Pcdata, |d| d.text_mode);

        if self.current_text_mode() == TextMode::Cdata {
            let element = self
                .current_emitted_element()
                .unwrap_or_default()
                .to_string();
            self.report(RenderError::TagInsideCdata {
                element,
                name: name.to_string(),
            });
            if !is_void {
                self.open.push(OpenElement {
                    name: name.into(),
                    emitted: false,
                    text_mode: TextMode::Pcdata,
                });
            }
            return;
        }

        if !VALID_NAME.is_match(name) {
            self.report(RenderError::InvalidElementName {
                name: name.to_string(),
            });
            if !is_void {
                self.open.push(OpenElement {
                    name: name.into(),
                    emitted: false,
                    text_mode: TextMode::Pcdata,
                });
            }
            return;
        }

        let name = name.to_ascii_lowercase();
        self.write("<");
        self.write(&name);
        for attribute in &attributes {
            self.write_attribute(&name, attribute);
        }

        if is_void {
            self.write(" />");
            return;
        }

        self.write(">");
        self.guard_newline = matches!(name.as_str(), "pre" | "textarea");
        self.open.push(OpenElement {
            name: name.into(),
            emitted: true,
            text_mode,
        });
    }

    fn close_tag(&mut self, _name: &str) {
        self.flush_text();
        self.guard_newline = false;
        if let Some(entry) = self.open.pop() {
            if entry.emitted {
                self.write("</");
                self.write(&entry.name);
                self.write(">");
            }
        }
    }

    fn text(&mut self, text: &str) {
        self.pending_text.push_str(text);
    }
}

/// Whether `text` contains `</element` followed by a tag-ending delimiter
/// (or the end of the text), case-insensitively.
fn contains_end_tag(text: &str, element: &str) -> bool {
    if element.is_empty() {
        return false;
    }
    let mut pattern = Vec::with_capacity(element.len() + 2);
    pattern.extend_from_slice(b"</");
    pattern.extend_from_slice(element.as_bytes());

    let bytes = text.as_bytes();
    let mut at = 0;
    while let Some(found) = stripos(bytes, &pattern, at) {
        match bytes.get(found + pattern.len()) {
            Some(b' ' | b'\t' | 0x0c | b'\r' | b'\n' | b'/' | b'>') | None => return true,
            _ => at = found + 1,
        }
    }
    false
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tokens::HtmlStreamEventReceiver as _;

    fn render(events: impl FnOnce(&mut Renderer<'_, String>)) -> (String, Vec<String>) {
        let mut errors = Vec::new();
        let mut capture = |message: &str| errors.push(message.to_string());
        let mut renderer = Renderer::new(String::new(), &mut capture);
        renderer.open_document();
        events(&mut renderer);
        renderer.close_document();
        let out = renderer.into_writer();
        (out, errors)
    }

    #[test]
    fn serializes_xhtml_style() {
        let (out, errors) = render(|r| {
            r.open_tag("p", vec![Attribute::new("title", "x")]);
            r.text("a");
            r.open_tag("br", vec![]);
            r.text("b");
            r.close_tag("p");
        });
        assert_eq!(out, "<p title=\"x\">a<br />b</p>");
        assert!(errors.is_empty());
    }

    #[test]
    fn uppercase_names_are_normalized() {
        let (out, _) = render(|r| {
            r.open_tag("DIV", vec![Attribute::new("TITLE", "x")]);
            r.close_tag("DIV");
        });
        assert_eq!(out, "<div title=\"x\"></div>");
    }

    #[test]
    fn empty_attributes_render_with_empty_value() {
        let (out, _) = render(|r| {
            r.open_tag("input", vec![Attribute::new("disabled", "")]);
        });
        assert_eq!(out, "<input disabled=\"\" />");
    }

    #[test]
    fn escapes_pcdata() {
        let (out, _) = render(|r| {
            r.text("a<b>&c=\"d\"");
        });
        assert_eq!(out, "a&lt;b&gt;&amp;c&#61;&#34;d&#34;");
    }

    #[test]
    fn invalid_names_drop_and_report() {
        let (out, errors) = render(|r| {
            r.open_tag("sv:g", vec![]);
            r.text("x");
            r.close_tag("sv:g");
        });
        assert_eq!(out, "x");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("invalid element name"));

        let (out, errors) = render(|r| {
            r.open_tag("p", vec![Attribute::new("on@click", "x")]);
            r.close_tag("p");
        });
        assert_eq!(out, "<p></p>");
        assert!(errors[0].contains("invalid attribute name"));
    }

    #[test]
    fn coalesced_text_is_encoded_once() {
        let (out, _) = render(|r| {
            r.text("{");
            r.text("{x}");
            r.text("}");
        });
        assert_eq!(out, "{<!-- -->{x}<!-- -->}");
    }

    #[test]
    fn rcdata_content() {
        let (out, _) = render(|r| {
            r.open_tag("title", vec![]);
            r.text("a<b> & \"c\"");
            r.close_tag("title");
        });
        assert_eq!(out, "<title>a&lt;b&gt; &amp; &#34;c&#34;</title>");
    }

    #[test]
    fn rawtext_passes_through_but_not_its_own_end_tag() {
        let (out, errors) = render(|r| {
            r.open_tag("style", vec![]);
            r.text("p{color:red}");
            r.close_tag("style");
        });
        assert_eq!(out, "<style>p{color:red}</style>");
        assert!(errors.is_empty());

        let (out, errors) = render(|r| {
            r.open_tag("style", vec![]);
            r.text("x</style><script>y");
            r.close_tag("style");
        });
        assert_eq!(out, "<style></style>");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("its own end tag"));
    }

    #[test]
    fn tags_inside_rawtext_are_dropped() {
        let (out, errors) = render(|r| {
            r.open_tag("style", vec![]);
            r.open_tag("b", vec![]);
            r.text("x");
            r.close_tag("b");
            r.close_tag("style");
        });
        assert_eq!(out, "<style>x</style>");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("inside rawtext"));
    }

    #[test]
    fn url_attributes_are_percent_then_attribute_encoded() {
        let (out, _) = render(|r| {
            r.open_tag(
                "a",
                vec![Attribute::new("href", "http://e.com/a b\"c\u{E9}")],
            );
            r.text("x");
            r.close_tag("a");
        });
        assert_eq!(out, "<a href=\"http://e.com/a%20b%22c%C3%A9\">x</a>");
    }

    #[test]
    fn banned_code_units_never_reach_output() {
        let (out, _) = render(|r| {
            r.text("a\u{0}b\u{85}c\u{FDD0}d");
            r.open_tag("b", vec![Attribute::new("title", "x\u{9F}y")]);
            r.close_tag("b");
        });
        assert_eq!(out, "abcd<b title=\"xy\"></b>");
    }
}
