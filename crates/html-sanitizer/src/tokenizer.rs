//! The HTML lexer: raw input in, token events out.
//!
//! The tokenizer is resilient by construction. It never fails; every byte
//! of even adversarially malformed input has a defined fate (emitted as
//! text, consumed as markup, or replaced). Comments, bogus comments,
//! processing-instruction lookalikes, and DOCTYPE declarations are
//! recognized so that their contents cannot leak into the stream, then
//! discarded — nothing downstream preserves them. The cursor only ever
//! moves forward, and no construct recurses, so deeply nested garbage
//! cannot consume stack.

use std::collections::VecDeque;

use crate::elements::{self, TextMode};
use crate::macros::{strcspn, strspn};
use crate::str_fns::{stripos, strpos};
use crate::tokens::{Attribute, HtmlEvent, HtmlStreamEventReceiver};
use entities::HtmlContext;

pub struct Tokenizer<'a> {
    input: &'a str,
    bytes: &'a [u8],
    /// Cursor: everything before this offset has been consumed.
    at: usize,
    /// Events parsed but not yet handed out. A single source construct can
    /// produce several events (a rawtext element produces open, text, and
    /// close at once).
    pending: VecDeque<HtmlEvent>,
    /// When the cursor sits immediately after a `pre` open tag, the
    /// offset at which an authoring-convenience newline would be skipped.
    skip_newline_at: Option<usize>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            at: 0,
            pending: VecDeque::new(),
            skip_newline_at: None,
        }
    }

    /// Runs a full document through `receiver`, bracketed by the document
    /// events.
    pub fn run(input: &str, receiver: &mut dyn HtmlStreamEventReceiver) {
        receiver.open_document();
        let mut tokenizer = Tokenizer::new(input);
        while let Some(event) = tokenizer.next_event() {
            receiver.receive(event);
        }
        receiver.close_document();
    }

    /// Returns the next event, or `None` at end of input.
    pub fn next_event(&mut self) -> Option<HtmlEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.at >= self.bytes.len() {
                return None;
            }
            self.step();
        }
    }

    /// Consumes one source construct, queueing zero or more events.
    fn step(&mut self) {
        let doc_length = self.bytes.len();
        let was_at = self.at;
        let mut at = was_at;

        while at < doc_length {
            let Some(lt_at) = strpos(self.bytes, b"<", at) else {
                break;
            };
            at = lt_at;

            /*
             * A "<" starts a token only when the next byte can begin one;
             * otherwise it is plaintext and scanning continues. This keeps
             * "<3" a heart instead of a swallowed half-tag.
             *
             * @see https://html.spec.whatwg.org/#tag-open-state
             */
            if at + 1 >= doc_length
                || !matches!(self.bytes[at + 1], b'!' | b'/' | b'?' | b'a'..=b'z' | b'A'..=b'Z')
            {
                at += 1;
                continue;
            }

            if at > was_at {
                // Flush the text run before the token.
                self.queue_text(was_at, at, HtmlContext::Pcdata);
                self.at = at;
                return;
            }

            self.at = at;
            if self.bytes[at + 1] == b'!' || self.bytes[at + 1] == b'?' {
                self.consume_markup_declaration();
                return;
            }

            let is_closer = self.bytes[at + 1] == b'/';
            let name_at = at + if is_closer { 2 } else { 1 };
            let name_prefix_length = strspn!(self.bytes, b'a'..=b'z' | b'A'..=b'Z', name_at);

            if name_prefix_length == 0 {
                /*
                 * "</" followed by a non-letter is a bogus comment spanning
                 * to the nearest ">" ("</>" is simply ignored); "<" before
                 * a letterless opener was already handled above.
                 *
                 * @see https://html.spec.whatwg.org/#parse-error-invalid-first-character-of-tag-name
                 */
                match strpos(self.bytes, b">", at + 2) {
                    Some(closer_at) => self.at = closer_at + 1,
                    None => self.at = doc_length,
                }
                return;
            }

            self.consume_tag(is_closer, name_at, name_prefix_length);
            return;
        }

        // Nothing left but a trailing text node.
        self.queue_text(was_at, doc_length, HtmlContext::Pcdata);
        self.at = doc_length;
    }

    /// Parses a tag whose name starts at `name_at`, queueing its events
    /// and, for content-swallowing elements, the content and close events
    /// too.
    fn consume_tag(&mut self, is_closer: bool, name_at: usize, name_prefix_length: usize) {
        let doc_length = self.bytes.len();

        let name_length = name_prefix_length
            + strcspn!(
                self.bytes,
                b' ' | b'\t' | 0x0c | b'\r' | b'\n' | b'/' | b'>',
                name_at + name_prefix_length
            );
        let name = canonical_name(&self.input[name_at..name_at + name_length]);
        self.at = name_at + name_length;

        let mut attributes = Vec::new();
        while let Some(attribute) = self.parse_next_attribute() {
            if !is_closer {
                attributes.push(attribute);
            }
        }

        // Skip any trailing solidus and whitespace, then the ">".
        self.at += strspn!(
            self.bytes,
            b' ' | b'\t' | 0x0c | b'\r' | b'\n' | b'/',
            self.at
        );
        if self.at >= doc_length {
            // Truncated inside the tag: nothing to emit.
            self.at = doc_length;
            return;
        }
        debug_assert_eq!(self.bytes[self.at], b'>');
        self.at += 1;

        if is_closer {
            self.pending.push_back(HtmlEvent::CloseTag { name });
            return;
        }

        let text_mode = elements::lookup(&name).map(|desc| desc.text_mode);
        match text_mode {
            Some(TextMode::Cdata) => {
                let decode = None;
                self.consume_special_content(name, attributes, decode);
            }
            Some(TextMode::Rcdata) => {
                let decode = Some(HtmlContext::Rcdata);
                self.consume_special_content(name, attributes, decode);
            }
            Some(TextMode::PlainText) => {
                // The rest of the document belongs to this element.
                self.pending.push_back(HtmlEvent::OpenTag { name, attributes });
                self.queue_raw_text(self.at, doc_length);
                self.at = doc_length;
            }
            _ => {
                /*
                 * The first linefeed immediately after the open tag is an
                 * authoring convenience and not content.
                 */
                if name == "pre" {
                    self.skip_newline_at = Some(self.at);
                }
                self.pending.push_back(HtmlEvent::OpenTag { name, attributes });
            }
        }
    }

    /// Parses one attribute at the cursor. Returns `None` at the end of
    /// the attribute list (or of the document).
    fn parse_next_attribute(&mut self) -> Option<Attribute> {
        let doc_length = self.bytes.len();

        // Skip whitespace and stray solidi; SGML short tags are not
        // interpreted, the slash is just noise here.
        self.at += strspn!(
            self.bytes,
            b' ' | b'\t' | 0x0c | b'\r' | b'\n' | b'/',
            self.at
        );
        if self.at >= doc_length {
            return None;
        }

        /*
         * An "=" as the first byte joins the attribute name.
         *
         * @see https://html.spec.whatwg.org/multipage/parsing.html#before-attribute-name-state
         */
        let starts_with_equal = self.bytes[self.at] == b'=';
        let start_shift = usize::from(starts_with_equal);
        let name_length = start_shift
            + strcspn!(
                self.bytes,
                b'=' | b'/' | b'>' | b' ' | b'\t' | 0x0c | b'\r' | b'\n',
                self.at + start_shift
            );

        if name_length == 0 {
            // Just the tag closer.
            return None;
        }

        let name_start = self.at;
        self.at += name_length;
        self.skip_whitespace();
        if self.at >= doc_length {
            return None;
        }

        let name = canonical_name(&self.input[name_start..name_start + name_length]);

        if self.bytes[self.at] != b'=' {
            // Boolean attribute.
            return Some(Attribute::new(name, ""));
        }

        self.at += 1;
        self.skip_whitespace();
        if self.at >= doc_length {
            return None;
        }

        let (value_start, value_end) = match self.bytes[self.at] {
            quote @ (b'\'' | b'"') => {
                let value_start = self.at + 1;
                match strpos(self.bytes, &[quote], value_start) {
                    Some(end_quote_at) => {
                        self.at = end_quote_at + 1;
                        (value_start, end_quote_at)
                    }
                    None => {
                        // Unterminated quote swallows the rest of the
                        // document; the enclosing tag never completes.
                        self.at = doc_length;
                        return None;
                    }
                }
            }
            _ => {
                let value_start = self.at;
                let value_length = strcspn!(
                    self.bytes,
                    b'>' | b' ' | b'\t' | 0x0c | b'\r' | b'\n',
                    value_start
                );
                self.at = value_start + value_length;
                (value_start, value_start + value_length)
            }
        };

        let raw_value = &self.input[value_start..value_end];
        let value = entities::decode(HtmlContext::Attribute, raw_value)
            .replace('\0', "");

        Some(Attribute::new(name, value))
    }

    /// Queues open, content, and close events for an element whose content
    /// is lexed as an undifferentiated run (rawtext or RCDATA).
    fn consume_special_content(
        &mut self,
        name: String,
        attributes: Vec<Attribute>,
        decode: Option<HtmlContext>,
    ) {
        let doc_length = self.bytes.len();
        let content_start = self.at;

        let closer_at = if name == "script" {
            self.find_script_data_end(content_start)
        } else {
            self.find_rawtext_end(content_start, name.as_bytes())
        };

        self.pending.push_back(HtmlEvent::OpenTag {
            name: name.clone(),
            attributes,
        });

        let content_end = closer_at.unwrap_or(doc_length);
        let mut content_start = content_start;
        if name == "textarea" {
            content_start += newline_skip_length(&self.bytes[content_start..content_end]);
        }
        match decode {
            Some(ctx) => self.queue_text(content_start, content_end, ctx),
            None => self.queue_raw_text(content_start, content_end),
        }

        let Some(closer_at) = closer_at else {
            // Truncated special element: content ran to end of document and
            // the balancer will close it.
            self.at = doc_length;
            return;
        };

        // Consume the end tag, attributes and all.
        self.at = closer_at + 2 + name.len();
        while self.parse_next_attribute().is_some() {}
        self.at += strspn!(
            self.bytes,
            b' ' | b'\t' | 0x0c | b'\r' | b'\n' | b'/',
            self.at
        );
        if self.at < doc_length {
            debug_assert_eq!(self.bytes[self.at], b'>');
            self.at += 1;
        }

        self.pending.push_back(HtmlEvent::CloseTag { name });
    }

    /// Finds the `</name` sequence, delimited as a real end tag, which
    /// terminates a rawtext or RCDATA element. Returns the offset of its
    /// `<`.
    fn find_rawtext_end(&self, from: usize, name: &[u8]) -> Option<usize> {
        let mut pattern = Vec::with_capacity(name.len() + 2);
        pattern.extend_from_slice(b"</");
        pattern.extend_from_slice(name);

        let mut at = from;
        while let Some(closer_at) = stripos(self.bytes, &pattern, at) {
            match self.bytes.get(closer_at + pattern.len()) {
                // "</style123" does not end a style region.
                Some(b' ' | b'\t' | 0x0c | b'\r' | b'\n' | b'/' | b'>') | None => {
                    return Some(closer_at)
                }
                _ => at = closer_at + 1,
            }
        }

        None
    }

    /// Finds the end of script data, honoring the escaped and
    /// double-escaped states so that `<!-- <script> --> </script>` keeps
    /// its inner closer.
    ///
    /// @see https://html.spec.whatwg.org/#script-data-escaped-state
    fn find_script_data_end(&self, from: usize) -> Option<usize> {
        #[derive(PartialEq)]
        enum State {
            Unescaped,
            Escaped,
            DoubleEscaped,
        }

        let doc_length = self.bytes.len();
        let mut state = State::Unescaped;
        let mut at = from;

        while at < doc_length {
            at += strcspn!(self.bytes, b'-' | b'<', at);

            // "-->" drops back to unescaped from either escaped state.
            if self.bytes[at..].starts_with(b"-->") {
                at += 3;
                state = State::Unescaped;
                continue;
            }

            if at + 1 >= doc_length {
                return None;
            }

            at += 1;
            if self.bytes[at - 1] != b'<' {
                continue;
            }

            if self.bytes[at..].starts_with(b"!--") {
                at += 3;
                if state == State::Unescaped {
                    state = State::Escaped;
                }
                continue;
            }

            let closer_potentially_starts_at = if self.bytes[at] == b'/' {
                at += 1;
                Some(at - 2)
            } else {
                None
            };

            // Only "<script" and "</script" change state past this point.
            if !(at + 6 <= doc_length && self.bytes[at..at + 6].eq_ignore_ascii_case(b"script")) {
                continue;
            }
            match self.bytes.get(at + 6) {
                Some(b' ' | b'\t' | 0x0c | b'\r' | b'\n' | b'/' | b'>') | None => {}
                _ => continue,
            }
            at += 6;

            match (&state, closer_potentially_starts_at) {
                (State::Escaped, None) => state = State::DoubleEscaped,
                (State::DoubleEscaped, Some(_)) => state = State::Escaped,
                (_, Some(closer_at)) => return Some(closer_at),
                _ => {}
            }
        }

        None
    }

    /// Consumes `<!...>` and `<?...>` forms: comments, DOCTYPE, CDATA
    /// lookalikes, and bogus comments. None of them produce events.
    fn consume_markup_declaration(&mut self) {
        let doc_length = self.bytes.len();
        let at = self.at;

        if self.bytes[at + 1] == b'!' && self.bytes[at + 2..].starts_with(b"--") {
            let mut closer_at = at + 4;

            // Abruptly-closed comments: "<!-->" and "<!--->".
            let span_of_dashes = strspn!(self.bytes, b'-', closer_at.min(doc_length));
            if self.bytes.get(closer_at + span_of_dashes) == Some(&b'>') {
                self.at = closer_at + span_of_dashes + 1;
                return;
            }

            /*
             * A comment ends at the first "-->", or at the invalid "--!>".
             *
             * @see https://html.spec.whatwg.org/#parse-error-incorrectly-closed-comment
             */
            while closer_at < doc_length {
                let Some(dashes_at) = strpos(self.bytes, b"--", closer_at) else {
                    break;
                };
                match self.bytes.get(dashes_at + 2) {
                    Some(b'>') => {
                        self.at = dashes_at + 3;
                        return;
                    }
                    Some(b'!') if self.bytes.get(dashes_at + 3) == Some(&b'>') => {
                        self.at = dashes_at + 4;
                        return;
                    }
                    _ => closer_at = dashes_at + 1,
                }
            }

            // Unclosed comment swallows the rest of the document.
            self.at = doc_length;
            return;
        }

        if self.bytes[at + 1] == b'!' && self.bytes[at + 2..].starts_with(b"[CDATA[") {
            /*
             * HTML has no CDATA sections; in an HTML parser this is a bogus
             * comment which nonetheless spans to "]]>" when present. Either
             * way the content is comment data and is dropped.
             */
            if let Some(closer_at) = strpos(self.bytes, b"]]>", at + 9) {
                self.at = closer_at + 3;
                return;
            }
        }

        /*
         * Everything else — "<!DOCTYPE", "<?...", and any other
         * incorrectly-opened comment — skips to the nearest ">". A DOCTYPE
         * carries no information a fragment sanitizer preserves.
         */
        match strpos(self.bytes, b">", at + 2) {
            Some(closer_at) => self.at = closer_at + 1,
            None => self.at = doc_length,
        }
    }

    /// Queues a text event for `input[start..end]`, entity-decoded for
    /// `ctx`, honoring a pending first-newline skip.
    fn queue_text(&mut self, start: usize, end: usize, ctx: HtmlContext) {
        let mut start = start;
        if self.skip_newline_at.take() == Some(start) {
            start += newline_skip_length(&self.bytes[start..end]);
        }
        if start >= end {
            return;
        }

        let raw = &self.input[start..end];
        let text = entities::decode(ctx, raw).replace('\0', "\u{FFFD}");
        self.pending.push_back(HtmlEvent::Text { text });
    }

    /// Queues a text event with no entity decoding (rawtext content).
    fn queue_raw_text(&mut self, start: usize, end: usize) {
        if start >= end {
            return;
        }
        let text = self.input[start..end].replace('\0', "\u{FFFD}");
        self.pending.push_back(HtmlEvent::Text { text });
    }

    fn skip_whitespace(&mut self) {
        self.at += strspn!(self.bytes, b' ' | b'\t' | 0x0c | b'\r' | b'\n', self.at);
    }
}

/// Lowercases a tag or attribute name and drops any NUL bytes.
fn canonical_name(raw: &str) -> String {
    let mut name = raw.to_ascii_lowercase();
    if name.contains('\0') {
        name.retain(|c| c != '\0');
    }
    name
}

/// Length of the single authoring-convenience newline at the start of
/// `pre`, `listing`, and `textarea` content.
fn newline_skip_length(content: &[u8]) -> usize {
    match content {
        [b'\r', b'\n', ..] => 2,
        [b'\n', ..] | [b'\r', ..] => 1,
        _ => 0,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tokens::EventLog;

    fn events(input: &str) -> Vec<HtmlEvent> {
        let mut log = EventLog::default();
        Tokenizer::run(input, &mut log);
        log.events
    }

    fn open(name: &str, attributes: Vec<Attribute>) -> HtmlEvent {
        HtmlEvent::OpenTag {
            name: name.to_string(),
            attributes,
        }
    }

    fn close(name: &str) -> HtmlEvent {
        HtmlEvent::CloseTag {
            name: name.to_string(),
        }
    }

    fn text(text: &str) -> HtmlEvent {
        HtmlEvent::Text {
            text: text.to_string(),
        }
    }

    #[test]
    fn lexes_simple_markup() {
        assert_eq!(
            events("<p>Hello!</p>"),
            vec![
                HtmlEvent::OpenDocument,
                open("p", vec![]),
                text("Hello!"),
                close("p"),
                HtmlEvent::CloseDocument,
            ]
        );
    }

    #[test]
    fn canonicalizes_names() {
        assert_eq!(
            events("<DIV CLASS=x Id='y'></DiV>"),
            vec![
                HtmlEvent::OpenDocument,
                open(
                    "div",
                    vec![Attribute::new("class", "x"), Attribute::new("id", "y")]
                ),
                close("div"),
                HtmlEvent::CloseDocument,
            ]
        );
    }

    #[test]
    fn decodes_entities_in_text_and_attributes() {
        assert_eq!(
            events("<a title=\"a &amp; b\">&lt;x&gt;</a>"),
            vec![
                HtmlEvent::OpenDocument,
                open("a", vec![Attribute::new("title", "a & b")]),
                text("<x>"),
                close("a"),
                HtmlEvent::CloseDocument,
            ]
        );
    }

    #[test]
    fn less_than_before_non_letter_is_text() {
        assert_eq!(
            events("a <3 b < c"),
            vec![
                HtmlEvent::OpenDocument,
                text("a <3 b < c"),
                HtmlEvent::CloseDocument,
            ]
        );
    }

    #[test]
    fn drops_comments_and_doctypes() {
        assert_eq!(
            events("<!DOCTYPE html>a<!-- b -->c<?php d ?>e<!--->f"),
            vec![
                HtmlEvent::OpenDocument,
                text("a"),
                text("c"),
                text("e"),
                text("f"),
                HtmlEvent::CloseDocument,
            ]
        );
    }

    #[test]
    fn comment_closed_by_bang_variant() {
        assert_eq!(
            events("a<!-- b --!>c"),
            vec![
                HtmlEvent::OpenDocument,
                text("a"),
                text("c"),
                HtmlEvent::CloseDocument,
            ]
        );
    }

    #[test]
    fn funky_comments_are_dropped() {
        assert_eq!(
            events("a</%x>b</>c"),
            vec![
                HtmlEvent::OpenDocument,
                text("a"),
                text("b"),
                text("c"),
                HtmlEvent::CloseDocument,
            ]
        );
    }

    #[test]
    fn script_content_is_an_opaque_run() {
        assert_eq!(
            events("<script>if (a < b) { x(\"</div>\"); }</script>"),
            vec![
                HtmlEvent::OpenDocument,
                open("script", vec![]),
                text("if (a < b) { x(\"</div>\"); }"),
                close("script"),
                HtmlEvent::CloseDocument,
            ]
        );
    }

    #[test]
    fn script_double_escaped_state_hides_closer() {
        // Inside "<!--<script>", the first "</script>" closes only the
        // inner, double-escaped region, not the element.
        assert_eq!(
            events("<script><!--<script>a</script>--></script>x"),
            vec![
                HtmlEvent::OpenDocument,
                open("script", vec![]),
                text("<!--<script>a</script>-->"),
                close("script"),
                text("x"),
                HtmlEvent::CloseDocument,
            ]
        );
    }

    #[test]
    fn script_escaped_closer_still_closes() {
        // Without an inner "<script", the escaped state does not protect
        // the end tag.
        assert_eq!(
            events("<script><!-- a </script>b"),
            vec![
                HtmlEvent::OpenDocument,
                open("script", vec![]),
                text("<!-- a "),
                close("script"),
                text("b"),
                HtmlEvent::CloseDocument,
            ]
        );
    }

    #[test]
    fn rcdata_decodes_but_does_not_parse() {
        assert_eq!(
            events("<title>a &amp; <b></title>"),
            vec![
                HtmlEvent::OpenDocument,
                open("title", vec![]),
                text("a & <b>"),
                close("title"),
                HtmlEvent::CloseDocument,
            ]
        );
    }

    #[test]
    fn rawtext_closer_requires_delimiter() {
        assert_eq!(
            events("<style>a</styleX>b</style>"),
            vec![
                HtmlEvent::OpenDocument,
                open("style", vec![]),
                text("a</styleX>b"),
                close("style"),
                HtmlEvent::CloseDocument,
            ]
        );
    }

    #[test]
    fn unterminated_rawtext_runs_to_end() {
        assert_eq!(
            events("<style>a { b }"),
            vec![
                HtmlEvent::OpenDocument,
                open("style", vec![]),
                text("a { b }"),
                HtmlEvent::CloseDocument,
            ]
        );
    }

    #[test]
    fn plaintext_swallows_the_rest() {
        assert_eq!(
            events("<plaintext><div>not a tag"),
            vec![
                HtmlEvent::OpenDocument,
                open("plaintext", vec![]),
                text("<div>not a tag"),
                HtmlEvent::CloseDocument,
            ]
        );
    }

    #[test]
    fn pre_skips_first_newline() {
        assert_eq!(
            events("<pre>\nkeep\n</pre>"),
            vec![
                HtmlEvent::OpenDocument,
                open("pre", vec![]),
                text("keep\n"),
                close("pre"),
                HtmlEvent::CloseDocument,
            ]
        );
    }

    #[test]
    fn nul_bytes_are_replaced_in_text() {
        assert_eq!(
            events("a\0b"),
            vec![
                HtmlEvent::OpenDocument,
                text("a\u{FFFD}b"),
                HtmlEvent::CloseDocument,
            ]
        );
    }

    #[test]
    fn supplementary_plane_text_round_trips() {
        assert_eq!(
            events("<b>\u{1F600}\u{10FFFD}</b>"),
            vec![
                HtmlEvent::OpenDocument,
                open("b", vec![]),
                text("\u{1F600}\u{10FFFD}"),
                close("b"),
                HtmlEvent::CloseDocument,
            ]
        );
    }

    #[test]
    fn truncated_tag_emits_nothing() {
        assert_eq!(
            events("ok<div class=\"x"),
            vec![
                HtmlEvent::OpenDocument,
                text("ok"),
                HtmlEvent::CloseDocument,
            ]
        );
    }

    #[test]
    fn duplicate_attributes_are_preserved_in_order() {
        // Deduplication is the policy stage's job.
        assert_eq!(
            events("<a href=1 href=2>"),
            vec![
                HtmlEvent::OpenDocument,
                open(
                    "a",
                    vec![Attribute::new("href", "1"), Attribute::new("href", "2")]
                ),
                HtmlEvent::CloseDocument,
            ]
        );
    }

    #[test]
    fn boolean_and_empty_attributes() {
        assert_eq!(
            events("<input disabled value=''>"),
            vec![
                HtmlEvent::OpenDocument,
                open(
                    "input",
                    vec![
                        Attribute::new("disabled", ""),
                        Attribute::new("value", "")
                    ]
                ),
                HtmlEvent::CloseDocument,
            ]
        );
    }
}
