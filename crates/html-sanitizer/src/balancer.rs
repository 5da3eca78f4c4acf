//! The tag balancer: arbitrary token soup in, well-nested stream out.
//!
//! Downstream stages rely on one guarantee above all others: every open
//! tag this stage emits is matched by exactly one close tag, in proper
//! nesting order, by the time the document closes (void elements emit no
//! close). To get there the balancer keeps two structures: the stack of
//! open elements, and a queue of formatting elements that were closed
//! implicitly and want to reopen around subsequent content — a simplified
//! form of the adoption-agency recovery browsers perform.
//!
//! @see https://html.spec.whatwg.org/#the-stack-of-open-elements
//! @see https://html.spec.whatwg.org/#list-of-active-formatting-elements

use crate::elements::{self, blocking_scopes, ElementDescriptor, ElementGroups, Scopes, TextMode};
use crate::tokens::{Attribute, HtmlStreamEventReceiver};

/// Upper bound on the open-element stack, and the default limit.
pub const MAX_NESTING_LIMIT: usize = 256;

/// Groups assumed for elements with no descriptor. Unrecognized elements
/// ride along as generic phrasing content.
const UNKNOWN_GROUPS: ElementGroups = ElementGroups::INLINE;

struct StackEntry {
    name: Box<str>,
    desc: Option<&'static ElementDescriptor>,
}

impl StackEntry {
    fn groups(&self) -> ElementGroups {
        self.desc.map_or(UNKNOWN_GROUPS, |desc| desc.groups)
    }

    fn resumable(&self) -> bool {
        self.desc.is_some_and(|desc| desc.resumable)
    }

    /// Whether this entry stops an end-tag search running under the given
    /// scope categories.
    fn bounds(&self, blocking: Scopes) -> bool {
        match self.desc {
            Some(desc) => {
                if desc.scope_boundaries.intersects(blocking) {
                    return true;
                }
                // Select scope is inverted: everything except the option
                // elements is a boundary.
                blocking.contains(Scopes::SELECT)
                    && !desc
                        .groups
                        .intersects(ElementGroups::OPTIONS | ElementGroups::OPTION)
            }
            None => blocking.contains(Scopes::SELECT),
        }
    }
}

pub struct Balancer<R: HtmlStreamEventReceiver> {
    next: R,
    stack: Vec<StackEntry>,
    /// Implicitly-closed resumable elements, innermost first; draining
    /// reopens from the back so that original nesting order is restored.
    resume_queue: Vec<StackEntry>,
    nesting_limit: usize,
    /// Number of suppressed opens the cursor is currently inside. Keeping
    /// a counter instead of stack entries bounds memory on pathological
    /// nesting.
    ignored_depth: usize,
}

impl<R: HtmlStreamEventReceiver> Balancer<R> {
    pub fn new(nesting_limit: usize, next: R) -> Self {
        Self {
            next,
            stack: Vec::new(),
            resume_queue: Vec::new(),
            nesting_limit: nesting_limit.clamp(1, MAX_NESTING_LIMIT),
            ignored_depth: 0,
        }
    }

    pub fn into_inner(self) -> R {
        self.next
    }

    /// Whether the stack, walked from the top with transparency applied,
    /// admits a child in any of `child` groups.
    fn stack_allows(&self, child: ElementGroups) -> bool {
        let mut child = child;
        for entry in self.stack.iter().rev() {
            let Some(desc) = entry.desc else {
                // Opaque unknown element: defer entirely to its ancestors.
                continue;
            };
            if desc.contents.intersects(child) {
                return true;
            }
            let seen_through = desc.transparent & child;
            if seen_through.is_empty() {
                return false;
            }
            child = seen_through;
        }
        // The fragment root admits anything.
        true
    }

    /// Whether opening `name` (and possibly its own implied children)
    /// eventually admits a child in `child` groups.
    fn implied_chain_reaches(name: &str, child: ElementGroups) -> bool {
        let mut name = name;
        for _ in 0..4 {
            let Some(desc) = elements::lookup(name) else {
                return false;
            };
            if desc.contents.intersects(child) {
                return true;
            }
            match desc.implied_child {
                Some(implied) => name = implied,
                None => return false,
            }
        }
        false
    }

    /// Pops and closes the top of the stack, remembering resumable
    /// formatting elements for later reopening.
    fn close_top(&mut self, queue_resumable: bool) {
        let Some(entry) = self.stack.pop() else {
            return;
        };
        self.next.close_tag(&entry.name);
        if queue_resumable && entry.resumable() {
            self.resume_queue.push(entry);
        }
    }

    /// Opens an implied element (`tbody`, `tr`, `li`, ...) with no
    /// attributes. Returns false when the nesting limit forbids it.
    fn open_implied(&mut self, name: &'static str) -> bool {
        if self.stack.len() >= self.nesting_limit {
            return false;
        }
        self.next.open_tag(name, Vec::new());
        self.stack.push(StackEntry {
            name: name.into(),
            desc: elements::lookup(name),
        });
        true
    }

    /// Closes and implicitly opens elements until the current insertion
    /// point admits a child in `child` groups.
    fn prepare_for(&mut self, child: ElementGroups) {
        while !self.stack_allows(child) {
            // stack_allows() returned false, so the stack is non-empty.
            let top = self.stack.last().expect("non-empty stack");

            if let Some(implied) = top.desc.and_then(|desc| desc.implied_child) {
                if Self::implied_chain_reaches(implied, child) && self.open_implied(implied) {
                    continue;
                }
            }

            self.close_top(true);
        }
    }

    /// Reopens queued formatting elements, outermost first, as long as the
    /// stack admits them and they admit the incoming child.
    fn drain_resume_queue(&mut self, child: ElementGroups) {
        while let Some(entry) = self.resume_queue.last() {
            if self.stack.len() >= self.nesting_limit {
                break;
            }
            let Some(desc) = entry.desc else {
                break;
            };
            if !self.stack_allows(desc.groups) || !desc.admits_somewhere(child) {
                break;
            }

            let entry = self.resume_queue.pop().expect("checked entry");
            self.next.open_tag(&entry.name, Vec::new());
            self.stack.push(entry);
        }
    }

    /// Closes every element from the top of the stack down to and
    /// including index `index`. Elements above it may resume; the target
    /// itself was closed deliberately and may not.
    fn close_down_to(&mut self, index: usize) {
        while self.stack.len() > index + 1 {
            self.close_top(true);
        }
        self.close_top(false);
    }

    /// Finds the nearest stack entry for which `matches` holds, stopping
    /// at scope boundaries for `blocking`.
    fn find_in_scope(&self, blocking: Scopes, matches: impl Fn(&StackEntry) -> bool) -> Option<usize> {
        for (index, entry) in self.stack.iter().enumerate().rev() {
            if matches(entry) {
                return Some(index);
            }
            if entry.bounds(blocking) {
                return None;
            }
        }
        None
    }
}

impl<R: HtmlStreamEventReceiver> HtmlStreamEventReceiver for Balancer<R> {
    fn open_document(&mut self) {
        self.next.open_document();
    }

    fn close_document(&mut self) {
        while !self.stack.is_empty() {
            self.close_top(false);
        }
        self.resume_queue.clear();
        self.ignored_depth = 0;
        self.next.close_document();
    }

    fn open_tag(&mut self, name: &str, attributes: Vec<Attribute>) {
        let desc = elements::lookup(name);
        let groups = desc.map_or(UNKNOWN_GROUPS, |d| d.groups);
        let is_void = desc.is_some_and(|d| d.is_void());

        if self.ignored_depth > 0 {
            // Inside a suppressed subtree every further open is suppressed
            // too, tracked only so its close pairs up.
            if !is_void {
                self.ignored_depth += 1;
            }
            return;
        }

        // An <a> inside an <a> closes the outer anchor first.
        if name == "a" {
            if let Some(index) = self.find_in_scope(Scopes::COMMON, |entry| &*entry.name == "a") {
                self.close_down_to(index);
            }
        }

        self.prepare_for(groups);
        self.drain_resume_queue(groups);

        if is_void {
            self.next.open_tag(name, attributes);
            return;
        }

        if self.stack.len() >= self.nesting_limit {
            log::debug!("suppressing <{name}> beyond nesting limit {}", self.nesting_limit);
            self.ignored_depth = 1;
            return;
        }

        self.next.open_tag(name, attributes);
        self.stack.push(StackEntry {
            name: name.into(),
            desc,
        });
    }

    fn close_tag(&mut self, name: &str) {
        if self.ignored_depth > 0 {
            self.ignored_depth -= 1;
            return;
        }

        let desc = elements::lookup(name);
        if desc.is_some_and(|d| d.is_void()) {
            // Void elements never opened anything to close.
            return;
        }

        /*
         * A heading close tag closes the nearest open heading of any
         * level; authors mix </h3> with <h4> freely and browsers cope.
         */
        let is_heading = matches!(name, "h1" | "h2" | "h3" | "h4" | "h5" | "h6");
        let blocking = blocking_scopes(name);
        let found = if is_heading {
            self.find_in_scope(blocking, |entry| {
                matches!(&*entry.name, "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
            })
        } else {
            self.find_in_scope(blocking, |entry| &*entry.name == name)
        };

        match found {
            Some(index) => self.close_down_to(index),
            None => {
                /*
                 * Unmatched close: dropped. If the element sits unresumed
                 * in the resume queue, the author closed it deliberately
                 * and it must not come back.
                 */
                if let Some(queued) = self
                    .resume_queue
                    .iter()
                    .rposition(|entry| &*entry.name == name)
                {
                    self.resume_queue.remove(queued);
                }
                log::debug!("dropping unmatched </{name}>");
            }
        }
    }

    fn text(&mut self, text: &str) {
        let is_whitespace = text
            .chars()
            .all(|c| matches!(c, ' ' | '\t' | '\n' | '\r' | '\u{C}'));

        if is_whitespace {
            /*
             * Inter-element whitespace is kept where the container admits
             * text and silently dropped where it does not (directly inside
             * <table>, <tr>, <select>, ...). It neither reopens formatting
             * elements nor manufactures implied wrappers.
             */
            if self.stack_allows(elements::TEXT_GROUPS) {
                self.next.text(text);
            }
            return;
        }

        self.prepare_for(elements::TEXT_GROUPS);
        self.drain_resume_queue(elements::TEXT_GROUPS);
        self.next.text(text);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tokenizer::Tokenizer;
    use crate::tokens::{EventLog, HtmlEvent};

    /// Tokenizes and balances `input`, then re-serializes the event stream
    /// with minimal markup for comparison.
    fn balanced(input: &str) -> String {
        balanced_with_limit(input, MAX_NESTING_LIMIT)
    }

    fn balanced_with_limit(input: &str, limit: usize) -> String {
        let mut balancer = Balancer::new(limit, EventLog::default());
        Tokenizer::run(input, &mut balancer);
        let log = balancer.into_inner();

        let mut out = String::new();
        for event in &log.events {
            match event {
                HtmlEvent::OpenDocument | HtmlEvent::CloseDocument => {}
                HtmlEvent::OpenTag { name, .. } => {
                    out.push('<');
                    out.push_str(name);
                    out.push('>');
                }
                HtmlEvent::CloseTag { name } => {
                    out.push_str("</");
                    out.push_str(name);
                    out.push('>');
                }
                HtmlEvent::Text { text } => out.push_str(text),
            }
        }
        out
    }

    #[test]
    fn closes_unclosed_elements() {
        assert_eq!(balanced("<b>hi"), "<b>hi</b>");
        assert_eq!(balanced("<div><p>x"), "<div><p>x</p></div>");
    }

    #[test]
    fn drops_unmatched_closers() {
        assert_eq!(balanced("a</b>b"), "ab");
        assert_eq!(balanced("<i>a</b>b</i>"), "<i>ab</i>");
    }

    #[test]
    fn paragraphs_do_not_nest() {
        assert_eq!(balanced("<p>1<p>2"), "<p>1</p><p>2</p>");
    }

    #[test]
    fn resumes_formatting_elements() {
        assert_eq!(balanced("<b>hi<i>world</b>!</i>"), "<b>hi<i>world</i></b><i>!</i>");
    }

    #[test]
    fn deliberately_closed_elements_do_not_resume() {
        assert_eq!(balanced("<b><i>x</b></i>y"), "<b><i>x</i></b>y");
    }

    #[test]
    fn formatting_resumes_inside_new_blocks() {
        assert_eq!(balanced("<b>x<p>y"), "<b>x</b><p><b>y</b></p>");
    }

    #[test]
    fn tables_imply_sections() {
        assert_eq!(
            balanced("<table><tr><td>a</td></tr></table>"),
            "<table><tbody><tr><td>a</td></tr></tbody></table>"
        );
        assert_eq!(
            balanced("<table><td>a</table>"),
            "<table><tbody><tr><td>a</td></tr></tbody></table>"
        );
    }

    #[test]
    fn stray_table_text_gets_a_cell() {
        assert_eq!(
            balanced("<table>x</table>"),
            "<table><tbody><tr><td>x</td></tr></tbody></table>"
        );
    }

    #[test]
    fn whitespace_inside_table_is_dropped() {
        assert_eq!(
            balanced("<table> <tr> <td>a</td> </tr> </table>"),
            "<table><tbody><tr><td>a</td></tr></tbody></table>"
        );
        assert_eq!(balanced("<p>a b</p>"), "<p>a b</p>");
    }

    #[test]
    fn paragraph_close_does_not_cross_table() {
        // The <table> itself closes the paragraph (a p cannot contain it);
        // the </p> inside the cell is blocked at the cell boundary and
        // dropped rather than closing anything outside the table.
        assert_eq!(
            balanced("<p><table><td>a</p></td></table>"),
            "<p></p><table><tbody><tr><td>a</td></tr></tbody></table>"
        );
    }

    #[test]
    fn lists_imply_items() {
        assert_eq!(balanced("<ul>x</ul>"), "<ul><li>x</li></ul>");
        assert_eq!(balanced("<ul><li>a<li>b</ul>"), "<ul><li>a</li><li>b</li></ul>");
        assert_eq!(balanced("<dl>x</dl>"), "<dl><dd>x</dd></dl>");
    }

    #[test]
    fn anchors_close_outer_anchors() {
        assert_eq!(balanced("<a>x<a>y"), "<a>x</a><a>y</a>");
    }

    #[test]
    fn heading_closers_unify() {
        assert_eq!(balanced("<h1>x</h3>y"), "<h1>x</h1>y");
    }

    #[test]
    fn unknown_elements_pass_through() {
        assert_eq!(balanced("<widget>x</widget>"), "<widget>x</widget>");
        assert_eq!(balanced("<p><widget>x</p>"), "<p><widget>x</widget></p>");
    }

    #[test]
    fn nesting_limit_bounds_output() {
        let mut input = String::new();
        for _ in 0..20_000 {
            input.push_str("<div>");
        }
        let out = balanced_with_limit(&input, 10);
        assert_eq!(out, "<div>".repeat(10) + &"</div>".repeat(10));
    }

    #[test]
    fn nesting_limit_pairs_suppressed_closes() {
        let input = format!("{}{}", "<div>".repeat(12), "</div>".repeat(12));
        let out = balanced_with_limit(&input, 10);
        assert_eq!(out, "<div>".repeat(10) + &"</div>".repeat(10));
    }

    #[test]
    fn noscript_bounds_end_tag_searches() {
        assert_eq!(
            balanced("<div><noscript>a</div>b</noscript>c"),
            "<div><noscript>ab</noscript>c</div>"
        );
    }
}
