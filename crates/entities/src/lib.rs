//! Character-reference decoding and context-aware output encoding.
//!
//! HTML text reaches the tokenizer with character references still encoded
//! and leaves the renderer re-encoded for a specific output context. Both
//! directions live here so that the escaping rules stay in one place:
//! decoding against the WHATWG named-reference list, and encoding into
//! PCDATA, RCDATA, attribute-value, and URL contexts. The encoders also
//! remove the code units that may never appear in output, whatever the
//! context.

use std::borrow::Cow;
use std::collections::BTreeMap;

use lazy_static::lazy_static;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

/// U+FFFD REPLACEMENT CHARACTER
const REPLACEMENT: char = '\u{FFFD}';

/// The decoding context of a piece of HTML text.
///
/// Character references decode in normal text, in RCDATA elements, and in
/// attribute values; they never decode inside rawtext elements, so there is
/// no variant for those (callers simply do not decode).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HtmlContext {
    Pcdata,
    Rcdata,
    Attribute,
}

lazy_static! {
    /// Named references grouped by their first two bytes, candidate
    /// suffixes sorted longest first so that lookup is maximal-munch.
    ///
    /// The WHATWG list ships in the `html-escape` crate as a sorted
    /// `(name, replacement)` table; regrouping it by prefix keeps the
    /// per-`&` scan short. Names carry no `&` and no `;`.
    static ref NAMED_REFERENCES: BTreeMap<[u8; 2], Vec<(&'static [u8], &'static str)>> = {
        let mut map: BTreeMap<[u8; 2], Vec<(&'static [u8], &'static str)>> = BTreeMap::new();
        for &(name, replacement) in html_escape::NAMED_ENTITIES.iter() {
            if name.len() < 2 {
                continue;
            }
            map.entry([name[0], name[1]])
                .or_default()
                .push((&name[2..], replacement));
        }
        for candidates in map.values_mut() {
            candidates.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()));
        }
        map
    };
}

/// Decodes all character references in `input` for the given context.
///
/// Returns the input unchanged (and unallocated) when it contains no
/// decodable reference.
pub fn decode(ctx: HtmlContext, input: &str) -> Cow<'_, str> {
    let bytes = input.as_bytes();
    let mut decoded: Option<String> = None;
    let mut was_at = 0;
    let mut at = 0;

    while at < bytes.len() {
        let ampersand_at = match memchr::memchr(b'&', &bytes[at..]) {
            Some(pos) => at + pos,
            None => break,
        };

        if let Some((replacement, token_length)) = decode_reference(ctx, bytes, ampersand_at) {
            let out = decoded.get_or_insert_with(|| String::with_capacity(input.len()));
            out.push_str(&input[was_at..ampersand_at]);
            match replacement {
                Replacement::Named(s) => out.push_str(s),
                Replacement::Char(c) => out.push(c),
            }
            at = ampersand_at + token_length;
            was_at = at;
        } else {
            at = ampersand_at + 1;
        }
    }

    match decoded {
        Some(mut out) => {
            out.push_str(&input[was_at..]);
            Cow::Owned(out)
        }
        None => Cow::Borrowed(input),
    }
}

/// The decoded value of a single character reference.
enum Replacement {
    Named(&'static str),
    Char(char),
}

/// Decodes one character reference starting at `offset` (which must point
/// at a `&`). Returns the replacement and the number of input bytes the
/// reference spans, or `None` when no reference starts here.
fn decode_reference(ctx: HtmlContext, input: &[u8], offset: usize) -> Option<(Replacement, usize)> {
    debug_assert_eq!(input.get(offset), Some(&b'&'));

    if input.len() < offset + 3 {
        return None;
    }

    if input[offset + 1] == b'#' {
        return decode_numeric_reference(input, offset).map(|(c, len)| (Replacement::Char(c), len));
    }

    let prefix = [input[offset + 1], input[offset + 2]];
    let candidates = NAMED_REFERENCES.get(&prefix)?;

    for (suffix, replacement) in candidates {
        let suffix_start = offset + 3;
        let suffix_end = suffix_start + suffix.len();
        if suffix_end > input.len() || &input[suffix_start..suffix_end] != *suffix {
            continue;
        }

        let token_length = 1 + 2 + suffix.len();
        if input.get(offset + token_length) == Some(&b';') {
            return Some((Replacement::Named(replacement), token_length + 1));
        }

        /*
         * A reference without its terminating semicolon decodes, except in
         * attribute values where a trailing alphanumeric or "=" makes the
         * ampersand ambiguous and the text is left alone. This mirrors the
         * ambiguous-ampersand handling in the HTML specification.
         */
        if ctx == HtmlContext::Attribute {
            match input.get(offset + token_length) {
                Some(b) if b.is_ascii_alphanumeric() || *b == b'=' => return None,
                _ => {}
            }
        }

        return Some((Replacement::Named(replacement), token_length));
    }

    None
}

/// Decodes a numeric character reference (`&#dd` or `&#xhh`, semicolon
/// optional) starting at `offset`.
fn decode_numeric_reference(input: &[u8], offset: usize) -> Option<(char, usize)> {
    // Skip the "&#".
    let mut at = offset + 2;

    let is_hex = matches!(input.get(at), Some(b'x' | b'X'));
    if is_hex {
        at += 1;
    }

    let digits_start = at;
    let mut code_point: u32 = 0;
    while let Some(&byte) = input.get(at) {
        let digit = match (is_hex, byte) {
            (_, b'0'..=b'9') => (byte - b'0') as u32,
            (true, b'a'..=b'f') => (byte - b'a' + 10) as u32,
            (true, b'A'..=b'F') => (byte - b'A' + 10) as u32,
            _ => break,
        };
        // Saturate instead of overflowing; anything past the last plane is
        // replaced anyway.
        let radix = if is_hex { 16 } else { 10 };
        code_point = code_point
            .saturating_mul(radix)
            .saturating_add(digit)
            .min(0x0011_0000);
        at += 1;
    }

    if at == digits_start {
        return None;
    }

    if input.get(at) == Some(&b';') {
        at += 1;
    }

    let decoded = match code_point {
        0 => REPLACEMENT,
        cp @ 0x80..=0x9F => C1_REPLACEMENTS[(cp - 0x80) as usize]
            .unwrap_or(char::from_u32(cp).unwrap_or(REPLACEMENT)),
        0xD800..=0xDFFF => REPLACEMENT,
        cp => char::from_u32(cp).unwrap_or(REPLACEMENT),
    };

    Some((decoded, at - offset))
}

/// Replacements for numeric references into the ISO-2022 C1 control range
/// (U+0080 through U+009F), based on the Windows-1252 code page.
#[rustfmt::skip]
const C1_REPLACEMENTS: [Option<char>; 32] = [
    Some('\u{20AC}'), None,             Some('\u{201A}'), Some('\u{0192}'),
    Some('\u{201E}'), Some('\u{2026}'), Some('\u{2020}'), Some('\u{2021}'),
    Some('\u{02C6}'), Some('\u{2030}'), Some('\u{0160}'), Some('\u{2039}'),
    Some('\u{0152}'), None,             Some('\u{017D}'), None,
    None,             Some('\u{2018}'), Some('\u{2019}'), Some('\u{201C}'),
    Some('\u{201D}'), Some('\u{2022}'), Some('\u{2013}'), Some('\u{2014}'),
    Some('\u{02DC}'), Some('\u{2122}'), Some('\u{0161}'), Some('\u{203A}'),
    Some('\u{0153}'), None,             Some('\u{017E}'), Some('\u{0178}'),
];

/// Whether a code point may never appear in sanitized output.
///
/// Covers the C0 controls other than tab, linefeed, carriage return, and
/// form feed; DEL and the C1 range; and the Unicode noncharacters
/// (U+FDD0..U+FDEF plus the last two code points of every plane).
pub fn is_banned(c: char) -> bool {
    match c as u32 {
        0x09 | 0x0A | 0x0C | 0x0D => false,
        cp if cp < 0x20 => true,
        0x7F..=0x9F => true,
        0xFDD0..=0xFDEF => true,
        cp => (cp & 0xFFFE) == 0xFFFE,
    }
}

/// Removes banned code units, borrowing when nothing needs to go.
pub fn strip_banned(input: &str) -> Cow<'_, str> {
    if !input.chars().any(is_banned) {
        return Cow::Borrowed(input);
    }
    Cow::Owned(input.chars().filter(|&c| !is_banned(c)).collect())
}

/// Encodes `text` onto `out` for a normal (PCDATA) text position.
///
/// Besides the markup-significant characters, `=` and the backtick are
/// encoded because legacy browsers treat them as attribute delimiters when
/// output lands in an attribute position, and a comment is inserted
/// between doubled braces so that no templating system downstream can see
/// a `{{...}}` interpolation in the sanitized output.
pub fn encode_pcdata_onto(text: &str, out: &mut String) {
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            '=' => out.push_str("&#61;"),
            '`' => out.push_str("&#96;"),
            '{' | '}' => {
                out.push(c);
                if chars.peek() == Some(&c) {
                    out.push_str("<!-- -->");
                }
            }
            c if is_banned(c) => {}
            c => out.push(c),
        }
    }
}

/// Encodes `text` onto `out` for an RCDATA element (`title`, `textarea`).
pub fn encode_rcdata_onto(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            c if is_banned(c) => {}
            c => out.push(c),
        }
    }
}

/// Encodes `text` onto `out` for a double-quoted attribute value.
///
/// The doubled-brace guard applies here as well; template interpolation
/// happily runs inside attribute values.
pub fn encode_attribute_onto(text: &str, out: &mut String) {
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            '=' => out.push_str("&#61;"),
            '`' => out.push_str("&#96;"),
            '{' | '}' => {
                out.push(c);
                if chars.peek() == Some(&c) {
                    // Escaped form of the separator; the value still decodes
                    // to text containing "<!-- -->" between the braces.
                    out.push_str("&lt;!-- --&gt;");
                }
            }
            c if is_banned(c) => {}
            c => out.push(c),
        }
    }
}

/// Characters percent-encoded inside URL attribute values, beyond the
/// non-ASCII range which is always encoded.
const URL_UNSAFE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'\'')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'\\')
    .add(b'^')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Percent-encodes a URL down to printable ASCII onto `out`.
///
/// Structural URL characters (`:/?#&=%` and friends) pass through; the
/// result still needs attribute-value encoding before it is written into
/// a tag.
pub fn encode_url_onto(url: &str, out: &mut String) {
    for piece in utf8_percent_encode(url, URL_UNSAFE) {
        out.push_str(piece);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn pcdata(input: &str) -> String {
        decode(HtmlContext::Pcdata, input).into_owned()
    }

    fn attribute(input: &str) -> String {
        decode(HtmlContext::Attribute, input).into_owned()
    }

    #[test]
    fn decodes_named_references() {
        assert_eq!(pcdata("fish &amp; chips"), "fish & chips");
        assert_eq!(pcdata("&lt;b&gt;"), "<b>");
        assert_eq!(pcdata("&AElig;"), "\u{C6}");
        assert_eq!(pcdata("x &notin; y"), "x \u{2209} y");
    }

    #[test]
    fn decodes_bare_named_references() {
        assert_eq!(pcdata("&amp chips"), "& chips");
        assert_eq!(pcdata("&ampx"), "&x");
    }

    #[test]
    fn leaves_ambiguous_attribute_ampersands() {
        assert_eq!(attribute("a=b&ampx=1"), "a=b&ampx=1");
        assert_eq!(attribute("a=b&amp=1"), "a=b&amp=1");
        assert_eq!(attribute("a=b&amp;x=1"), "a=b&x=1");
    }

    #[test]
    fn decodes_numeric_references() {
        assert_eq!(pcdata("&#65;&#x42;&#x63"), "ABc");
        assert_eq!(pcdata("&#0;"), "\u{FFFD}");
        assert_eq!(pcdata("&#xD83D;"), "\u{FFFD}");
        assert_eq!(pcdata("&#x110000;"), "\u{FFFD}");
        assert_eq!(pcdata("&#99999999999;"), "\u{FFFD}");
        // Windows-1252 remapping of the C1 range.
        assert_eq!(pcdata("&#128;"), "\u{20AC}");
        assert_eq!(pcdata("&#x9f;"), "\u{0178}");
    }

    #[test]
    fn ignores_non_references() {
        assert_eq!(pcdata("AT&T"), "AT&T");
        assert_eq!(pcdata("&#;"), "&#;");
        assert_eq!(pcdata("&nosuchentityname;"), "&nosuchentityname;");
        assert!(matches!(
            decode(HtmlContext::Pcdata, "plain"),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn strips_banned_code_units() {
        assert_eq!(strip_banned("a\u{0}b\u{7F}c\u{85}d"), "abcd");
        assert_eq!(strip_banned("a\tb\nc\rd\u{C}e"), "a\tb\nc\rd\u{C}e");
        assert_eq!(strip_banned("x\u{FDD0}y\u{FFFF}z"), "xyz");
        assert_eq!(strip_banned("\u{10FFFE}"), "");
    }

    #[test]
    fn encodes_pcdata() {
        let mut out = String::new();
        encode_pcdata_onto("a<b>&\"'`=c", &mut out);
        assert_eq!(out, "a&lt;b&gt;&amp;&#34;&#39;&#96;&#61;c");
    }

    #[test]
    fn splits_doubled_braces() {
        let mut out = String::new();
        encode_pcdata_onto("{{x}}", &mut out);
        assert_eq!(out, "{<!-- -->{x}<!-- -->}");

        let mut out = String::new();
        encode_attribute_onto("{{x}}", &mut out);
        assert_eq!(out, "{&lt;!-- --&gt;{x}&lt;!-- --&gt;}");
    }

    #[test]
    fn encodes_urls() {
        let mut out = String::new();
        encode_url_onto("http://e.com/a b\"c\u{E9}", &mut out);
        assert_eq!(out, "http://e.com/a%20b%22c%C3%A9");
    }
}
