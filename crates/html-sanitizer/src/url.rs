//! URL protocol gating and `srcset` handling.
//!
//! Attribute values carrying URLs are the main data-exfiltration and
//! script-execution surface, so the gate errs on the side of rejection:
//! a URL is allowed only when it is relative or when its scheme, compared
//! ASCII case-insensitively, is explicitly trusted. Nothing here tries to
//! parse full URL syntax; only the scheme position matters.

use std::borrow::Cow;

use rustc_hash::FxHashSet;

/// An immutable set of allowed URL schemes.
#[derive(Debug, Clone, Default)]
pub struct UrlPolicy {
    protocols: FxHashSet<Box<str>>,
}

impl UrlPolicy {
    pub fn new<I, S>(protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            protocols: protocols
                .into_iter()
                .map(|p| p.as_ref().to_ascii_lowercase().into_boxed_str())
                .collect(),
        }
    }

    /// The standard conservative set: `http`, `https`, `mailto`, `tel`.
    pub fn standard() -> Self {
        Self::new(["http", "https", "mailto", "tel"])
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }

    pub fn contains(&self, protocol: &str) -> bool {
        self.protocols.contains(protocol)
    }

    /// Set intersection, used when factories are joined: a scheme survives
    /// only when both sides trust it.
    pub fn intersect(&self, other: &UrlPolicy) -> UrlPolicy {
        Self {
            protocols: self
                .protocols
                .intersection(&other.protocols)
                .cloned()
                .collect(),
        }
    }

    /// Gates one URL. Returns the value to emit (leading whitespace and
    /// control characters removed) or `None` when the URL must be dropped.
    pub fn apply<'a>(&self, url: &'a str) -> Option<Cow<'a, str>> {
        let trimmed = url.trim_start_matches(|c: char| c <= ' ');

        /*
         * Find the scheme delimiter. A "/", "?", or "#" before any ":"
         * means the URL is relative (path-, query-, fragment-, or
         * protocol-relative) and carries no scheme to distrust.
         */
        for (index, c) in trimmed.char_indices() {
            match c {
                ':' => {
                    let scheme = &trimmed[..index];
                    return self.scheme_allowed(scheme).then_some(Cow::Borrowed(trimmed));
                }
                '/' | '?' | '#' => break,
                /*
                 * Embedded controls void the whole URL rather than being
                 * stripped: "jav\tascript:" must not sneak past by any
                 * reading.
                 */
                c if c <= ' ' || c == '\u{7F}' => return None,
                _ => {}
            }
        }

        Some(Cow::Borrowed(trimmed))
    }

    /// ASCII-only case-insensitive scheme comparison. No Unicode folding:
    /// a Turkish dotted I must never turn `F\u{130}LE` into `file`.
    fn scheme_allowed(&self, scheme: &str) -> bool {
        if !scheme.is_ascii() {
            return false;
        }
        self.contains(&scheme.to_ascii_lowercase())
    }

    /// Sanitizes a `srcset` value: a comma-separated list of URLs, each
    /// with an optional width (`640w`) or density (`2x`) descriptor. Every
    /// URL is gated individually; candidates that fail are dropped; `None`
    /// means nothing survived and the attribute goes away.
    pub fn sanitize_srcset(&self, value: &str) -> Option<String> {
        let mut out = String::new();

        for candidate in split_srcset(value) {
            let (url, descriptor) = candidate;
            let Some(clean) = self.apply(url) else {
                log::debug!("dropping srcset candidate with disallowed url");
                continue;
            };
            if let Some(descriptor) = descriptor {
                if !is_valid_srcset_descriptor(descriptor) {
                    continue;
                }
            }

            if !out.is_empty() {
                out.push_str(", ");
            }
            // Embedded commas would re-split on reparse.
            if clean.contains(',') {
                out.push_str(&clean.replace(',', "%2C"));
            } else {
                out.push_str(&clean);
            }
            if let Some(descriptor) = descriptor {
                out.push(' ');
                out.push_str(descriptor);
            }
        }

        (!out.is_empty()).then_some(out)
    }
}

/// Splits a `srcset` value into `(url, descriptor)` candidates.
fn split_srcset(value: &str) -> Vec<(&str, Option<&str>)> {
    let mut candidates = Vec::new();
    let mut rest = value;

    loop {
        // Candidates are separated by commas surrounded by whitespace.
        rest = rest.trim_start_matches(|c: char| c.is_ascii_whitespace() || c == ',');
        if rest.is_empty() {
            break;
        }

        let url_end = rest
            .find(|c: char| c.is_ascii_whitespace())
            .unwrap_or(rest.len());
        let mut url = &rest[..url_end];
        rest = &rest[url_end..];

        /*
         * A trailing comma belongs to the separator, not the URL, unless
         * the URL consists only of commas (then it is garbage and the
         * trimming above will consume it next round).
         */
        let trimmed_url = url.trim_end_matches(',');
        let had_trailing_comma = trimmed_url.len() != url.len();
        url = trimmed_url;
        if url.is_empty() {
            continue;
        }
        if had_trailing_comma {
            candidates.push((url, None));
            continue;
        }

        rest = rest.trim_start_matches(|c: char| c.is_ascii_whitespace());
        let descriptor_end = rest.find(',').unwrap_or(rest.len());
        let descriptor = rest[..descriptor_end].trim();
        rest = &rest[descriptor_end..];

        candidates.push((url, (!descriptor.is_empty()).then_some(descriptor)));
    }

    candidates
}

/// Whether `descriptor` is a well-formed width or density descriptor:
/// a non-negative decimal number (exponent permitted) followed by `w`
/// or `x`.
fn is_valid_srcset_descriptor(descriptor: &str) -> bool {
    let Some(number) = descriptor
        .strip_suffix(['w', 'x'])
        .filter(|n| !n.is_empty())
    else {
        return false;
    };

    let mut seen_digit = false;
    let mut seen_dot = false;
    let mut seen_exponent = false;
    let mut previous_was_exponent = false;

    for c in number.chars() {
        match c {
            '0'..='9' => {
                seen_digit = true;
                previous_was_exponent = false;
            }
            '.' if !seen_dot && !seen_exponent => {
                seen_dot = true;
                previous_was_exponent = false;
            }
            'e' | 'E' if seen_digit && !seen_exponent => {
                seen_exponent = true;
                previous_was_exponent = true;
            }
            '+' | '-' if previous_was_exponent => {
                previous_was_exponent = false;
            }
            _ => return false,
        }
    }

    seen_digit && !previous_was_exponent
}
