//! Declaration and stylesheet sanitization over the token stream.
//!
//! A declaration survives only if its property is schema-allowed and every
//! value token fits the property's descriptor. One unknown token poisons
//! the whole declaration — partial retention is how smuggling happens,
//! since an engine may resynchronize the remainder differently than the
//! validator did.

use super::schema::{
    is_color_keyword, CssSchema, PropertyDescriptor, PropertyRule, ValueKinds, ANGLE_UNITS,
    LENGTH_UNITS,
};
use super::tokens::{self, split_dimension, CssToken, CssTokenKind, CssTokens};
use crate::url::UrlPolicy;

/// Sanitizes a `style` attribute value (`p1: v1; p2: v2; ...`). Returns
/// `None` when nothing survives, in which case the attribute is dropped.
pub fn sanitize_declarations(
    schema: &CssSchema,
    url_policy: &UrlPolicy,
    allow_urls: bool,
    input: &str,
) -> Option<String> {
    let lexed = tokens::lex(input);
    let mut out = String::new();
    let mut at = 0;

    while at < lexed.tokens.len() {
        while matches!(
            lexed.tokens.get(at).map(|t| t.kind),
            Some(CssTokenKind::Whitespace | CssTokenKind::Semicolon)
        ) {
            at += 1;
        }
        if at >= lexed.tokens.len() {
            break;
        }

        let declaration_end = end_of_declaration(&lexed, at);

        if let Some(declaration) = sanitize_declaration(
            schema,
            url_policy,
            allow_urls,
            &lexed,
            at,
            declaration_end,
        ) {
            if !out.is_empty() {
                out.push(';');
            }
            out.push_str(&declaration);
        }

        at = declaration_end;
    }

    (!out.is_empty()).then_some(out)
}

/// Index of the token ending the declaration starting at `start`: the next
/// top-level semicolon (bracket groups are skipped whole) or end of input.
fn end_of_declaration(lexed: &CssTokens, start: usize) -> usize {
    let mut at = start;
    while at < lexed.tokens.len() {
        match lexed.tokens[at].kind {
            CssTokenKind::Semicolon => return at,
            _ if lexed.partners[at] > at => at = lexed.partners[at] + 1,
            _ => at += 1,
        }
    }
    at
}

fn sanitize_declaration(
    schema: &CssSchema,
    url_policy: &UrlPolicy,
    allow_urls: bool,
    lexed: &CssTokens,
    start: usize,
    end: usize,
) -> Option<String> {
    let mut at = start;

    let property_token = &lexed.tokens[at];
    if property_token.kind != CssTokenKind::Ident {
        return None;
    }
    let property = property_token.text.trim().to_ascii_lowercase();
    at += 1;

    while at < end && lexed.tokens[at].kind == CssTokenKind::Whitespace {
        at += 1;
    }
    if at >= end || lexed.tokens[at].kind != CssTokenKind::Colon {
        return None;
    }
    at += 1;

    let descriptor = match schema.property(&property) {
        Some(PropertyRule::Allow(descriptor)) => descriptor,
        Some(PropertyRule::Disallowed) | None => {
            log::debug!("dropping disallowed css property {property:?}");
            return None;
        }
    };

    // Trim whitespace and a trailing "!important" off the value.
    let mut value_start = at;
    let mut value_end = end;
    while value_start < value_end
        && lexed.tokens[value_start].kind == CssTokenKind::Whitespace
    {
        value_start += 1;
    }
    while value_end > value_start
        && lexed.tokens[value_end - 1].kind == CssTokenKind::Whitespace
    {
        value_end -= 1;
    }
    if value_end - value_start >= 2 {
        let last = &lexed.tokens[value_end - 1];
        let mut before = value_end - 1;
        while before > value_start && lexed.tokens[before - 1].kind == CssTokenKind::Whitespace {
            before -= 1;
        }
        if last.kind == CssTokenKind::Ident
            && last.text.eq_ignore_ascii_case("important")
            && before > value_start
            && lexed.tokens[before - 1].kind == CssTokenKind::Delim
            && lexed.tokens[before - 1].text == "!"
        {
            value_end = before - 1;
            while value_end > value_start
                && lexed.tokens[value_end - 1].kind == CssTokenKind::Whitespace
            {
                value_end -= 1;
            }
        }
    }

    if value_start >= value_end {
        return None;
    }

    if !value_fits(
        schema,
        descriptor,
        url_policy,
        allow_urls,
        lexed,
        value_start,
        value_end,
    ) {
        log::debug!("dropping css declaration {property:?} with out-of-schema value");
        return None;
    }

    let mut declaration = property;
    declaration.push(':');
    declaration.push_str(&tokens::serialize(&lexed.tokens[value_start..value_end]));
    Some(declaration)
}

/// Validates every token in `[start, end)` against `descriptor`. Function
/// arguments recurse with the function's own parameter schema.
fn value_fits(
    schema: &CssSchema,
    descriptor: &PropertyDescriptor,
    url_policy: &UrlPolicy,
    allow_urls: bool,
    lexed: &CssTokens,
    start: usize,
    end: usize,
) -> bool {
    use CssTokenKind::*;

    let mut at = start;
    while at < end {
        let token = &lexed.tokens[at];
        match token.kind {
            Whitespace | Comma => at += 1,
            Ident => {
                let name = token.text.to_ascii_lowercase();
                let allowed = descriptor.literals.contains(name.as_str())
                    || (descriptor.kinds.contains(ValueKinds::COLOR) && is_color_keyword(&name))
                    || descriptor.kinds.contains(ValueKinds::IDENT);
                if !allowed {
                    return false;
                }
                at += 1;
            }
            Function => {
                let name = token.text.to_ascii_lowercase();
                let Some(key) = descriptor.functions.get(name.as_str()) else {
                    return false;
                };
                let Some(params) = schema.function_params(key) else {
                    return false;
                };
                let close = lexed.partners[at];
                if close <= at || close > end {
                    return false;
                }
                if !value_fits(schema, params, url_policy, allow_urls, lexed, at + 1, close) {
                    return false;
                }
                at = close + 1;
            }
            Url => {
                if !descriptor.kinds.contains(ValueKinds::URL)
                    || !allow_urls
                    || url_policy.apply(&token.text).is_none()
                {
                    return false;
                }
                at += 1;
            }
            String => {
                if !descriptor.kinds.contains(ValueKinds::STRING) {
                    return false;
                }
                at += 1;
            }
            Number => {
                if !number_fits(&token.text, descriptor) {
                    return false;
                }
                at += 1;
            }
            Percentage => {
                if !descriptor.kinds.contains(ValueKinds::PERCENTAGE)
                    || !sign_fits(&token.text, descriptor)
                {
                    return false;
                }
                at += 1;
            }
            Dimension => {
                let (_, unit) = split_dimension(&token.text);
                let unit = unit.to_ascii_lowercase();
                let length = descriptor.kinds.contains(ValueKinds::LENGTH)
                    && LENGTH_UNITS.contains(&unit.as_str());
                let angle = descriptor.kinds.contains(ValueKinds::ANGLE)
                    && ANGLE_UNITS.contains(&unit.as_str());
                if !(length || angle) || !sign_fits(&token.text, descriptor) {
                    return false;
                }
                at += 1;
            }
            HashId | HashUnrestricted => {
                if !descriptor.kinds.contains(ValueKinds::COLOR) || !is_hex_color(&token.text) {
                    return false;
                }
                at += 1;
            }
            _ => return false,
        }
    }

    true
}

fn sign_fits(text: &str, descriptor: &PropertyDescriptor) -> bool {
    !text.starts_with('-') || descriptor.kinds.contains(ValueKinds::NEGATIVE)
}

fn number_fits(text: &str, descriptor: &PropertyDescriptor) -> bool {
    if !sign_fits(text, descriptor) {
        return false;
    }
    if descriptor.kinds.contains(ValueKinds::NUMBER) {
        return true;
    }
    if descriptor.kinds.contains(ValueKinds::INTEGER)
        && !text.contains('.')
        && !text.contains(['e', 'E'])
    {
        return true;
    }
    /*
     * A bare zero is a valid length/percentage even for properties that
     * accept no other raw numbers.
     */
    descriptor
        .kinds
        .intersects(ValueKinds::LENGTH | ValueKinds::PERCENTAGE)
        && text.parse::<f64>() == Ok(0.0)
}

fn is_hex_color(text: &str) -> bool {
    matches!(text.len(), 3 | 4 | 6 | 8) && text.chars().all(|c| c.is_ascii_hexdigit())
}

/// Sanitizes the content of a `<style>` element.
///
/// Only plain rule sets survive: a conservative selector, then a
/// declaration block filtered like a `style` attribute. Every at-rule is
/// dropped whole — `@import` is an exfiltration vector and nothing else
/// (`@media`, `@font-face`, `@keyframes`) is worth the parsing surface.
pub fn sanitize_stylesheet(
    schema: &CssSchema,
    url_policy: &UrlPolicy,
    allow_urls: bool,
    input: &str,
) -> String {
    let lexed = tokens::lex(input);
    let mut out = String::new();
    let mut at = 0;

    while at < lexed.tokens.len() {
        while matches!(
            lexed.tokens.get(at).map(|t| t.kind),
            Some(CssTokenKind::Whitespace | CssTokenKind::Semicolon)
        ) {
            at += 1;
        }
        if at >= lexed.tokens.len() {
            break;
        }

        if lexed.tokens[at].kind == CssTokenKind::At {
            log::debug!("dropping css at-rule @{}", lexed.tokens[at].text);
            at = end_of_at_rule(&lexed, at);
            continue;
        }

        // Qualified rule: prelude up to the block.
        let prelude_start = at;
        let mut block_open = None;
        while at < lexed.tokens.len() {
            match lexed.tokens[at].kind {
                CssTokenKind::LeftCurly => {
                    block_open = Some(at);
                    break;
                }
                _ if lexed.partners[at] > at => at = lexed.partners[at] + 1,
                _ => at += 1,
            }
        }

        let Some(block_open) = block_open else {
            // Garbage tail with no block.
            break;
        };
        let block_close = lexed.partners[block_open];

        if selector_is_safe(&lexed.tokens[prelude_start..block_open]) {
            let body = tokens::serialize(&lexed.tokens[block_open + 1..block_close]);
            if let Some(cleaned) = sanitize_declarations(schema, url_policy, allow_urls, &body) {
                let selector =
                    tokens::serialize(&lexed.tokens[prelude_start..block_open]);
                out.push_str(selector.trim());
                out.push('{');
                out.push_str(&cleaned);
                out.push('}');
            }
        } else {
            log::debug!("dropping css rule with unsupported selector");
        }

        at = block_close + 1;
    }

    out
}

/// Index just past the at-rule starting at `start` (its semicolon or its
/// block).
fn end_of_at_rule(lexed: &CssTokens, start: usize) -> usize {
    let mut at = start + 1;
    while at < lexed.tokens.len() {
        match lexed.tokens[at].kind {
            CssTokenKind::Semicolon => return at + 1,
            CssTokenKind::LeftCurly => return lexed.partners[at] + 1,
            _ if lexed.partners[at] > at => at = lexed.partners[at] + 1,
            _ => at += 1,
        }
    }
    at
}

/// Whether a rule prelude is a selector simple enough to trust: type, id,
/// class, pseudo-class, and the basic combinators. Attribute selectors,
/// functions, strings, and anything exotic reject the rule.
fn selector_is_safe(prelude: &[CssToken]) -> bool {
    use CssTokenKind::*;

    let mut saw_component = false;
    for token in prelude {
        match token.kind {
            Whitespace | Comma | Colon => {}
            Ident | HashId => saw_component = true,
            Delim if matches!(token.text.as_str(), "." | "*" | ">" | "+" | "~") => {
                saw_component = true;
            }
            _ => return false,
        }
    }

    saw_component
}
