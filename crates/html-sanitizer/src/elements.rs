//! Static element metadata: which element may contain which.
//!
//! The balancer never consults the HTML specification at runtime; every
//! containment decision reduces to bitset intersections over the groups
//! declared here. The grouping follows the classic HTML4 content-model
//! partition with the HTML5 adjustments the balancer needs (scope
//! boundaries, implied children, resumable formatting elements).

use std::sync::LazyLock;

use bitflags::bitflags;
use rustc_hash::FxHashMap;

bitflags! {
    /// Content-model groups. An element *belongs to* a set of groups and
    /// *admits* a set of groups as direct children.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ElementGroups: u32 {
        const BLOCK          = 1 << 0;
        const INLINE         = 1 << 1;
        /// Inline elements other than `a`, usable inside an `a`.
        const INLINE_MINUS_A = 1 << 2;
        const TABLE_CONTENT  = 1 << 3;
        const HEAD_CONTENT   = 1 << 4;
        const AREA           = 1 << 5;
        const FORM           = 1 << 6;
        const LEGEND         = 1 << 7;
        const LI             = 1 << 8;
        const DL_PART        = 1 << 9;
        const P              = 1 << 10;
        const OPTIONS        = 1 << 11;
        const OPTION         = 1 << 12;
        const PARAM          = 1 << 13;
        const TABLE          = 1 << 14;
        const TR             = 1 << 15;
        const TD             = 1 << 16;
        const COL            = 1 << 17;
        /// Text. Pseudo-group so that "may this element contain text"
        /// is the same question as any other containment question.
        const CHARACTER_DATA = 1 << 18;
    }
}

bitflags! {
    /// The "element in scope" categories. An element whose descriptor
    /// carries a bit acts as a search boundary for end tags closed under
    /// that scope.
    ///
    /// @see https://html.spec.whatwg.org/#has-an-element-in-scope
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Scopes: u8 {
        const COMMON    = 1 << 0;
        const BUTTON    = 1 << 1;
        const LIST_ITEM = 1 << 2;
        const TABLE     = 1 << 3;
        const SELECT    = 1 << 4;
        const ALL       = Self::COMMON.bits()
            | Self::BUTTON.bits()
            | Self::LIST_ITEM.bits()
            | Self::TABLE.bits()
            | Self::SELECT.bits();
    }
}

/// How the content of an element is lexed and re-escaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMode {
    /// Normal text: entities decode, tags parse.
    Pcdata,
    /// `title`, `textarea`: entities decode, tags do not parse.
    Rcdata,
    /// `script`, `style`, `xmp`, `iframe`, `noembed`, `noframes`,
    /// `listing`: raw until the matching end tag.
    Cdata,
    /// `plaintext`: raw until end of document.
    PlainText,
    /// May contain nothing, not even text.
    Void,
}

/// Immutable per-element-name containment facts.
#[derive(Debug, Clone, Copy)]
pub struct ElementDescriptor {
    pub name: &'static str,
    /// Groups this element belongs to.
    pub groups: ElementGroups,
    /// Groups this element admits as direct children.
    pub contents: ElementGroups,
    /// Groups admitted only when an ancestor admits them. Transparent
    /// elements (`a`, `ins`, `del`, `object`, media) defer to the nearest
    /// ancestor with an opinion.
    pub transparent: ElementGroups,
    pub text_mode: TextMode,
    /// Whether an implicit close may be undone by reopening the element
    /// around subsequent content (formatting elements).
    pub resumable: bool,
    /// Element implicitly opened when a child arrives that this element
    /// cannot hold directly but the implied child can (`table` implies
    /// `tbody`, `tbody` implies `tr`, `tr` implies `td`, lists imply
    /// items).
    pub implied_child: Option<&'static str>,
    /// Scope categories this element bounds during end-tag searches.
    pub scope_boundaries: Scopes,
}

impl ElementDescriptor {
    pub fn is_void(&self) -> bool {
        self.text_mode == TextMode::Void
    }

    /// Whether children in `child` are admitted directly, ignoring
    /// transparency.
    pub fn admits(&self, child: ElementGroups) -> bool {
        self.contents.intersects(child)
    }

    /// Whether children in `child` could be admitted here at all, whether
    /// directly or through transparency.
    pub fn admits_somewhere(&self, child: ElementGroups) -> bool {
        (self.contents | self.transparent).intersects(child)
    }
}

pub fn lookup(name: &str) -> Option<&'static ElementDescriptor> {
    ELEMENTS.get(name)
}

/// The set of groups assumed for text content.
pub const TEXT_GROUPS: ElementGroups = ElementGroups::CHARACTER_DATA;

static ELEMENTS: LazyLock<FxHashMap<&'static str, ElementDescriptor>> = LazyLock::new(build_table);

fn build_table() -> FxHashMap<&'static str, ElementDescriptor> {
    use ElementGroups as G;
    use TextMode::*;

    let flow = G::BLOCK | G::INLINE | G::CHARACTER_DATA;
    let inline = G::INLINE | G::CHARACTER_DATA;
    let inline_minus_a = G::INLINE_MINUS_A | G::CHARACTER_DATA;
    let phrasing = G::INLINE | G::INLINE_MINUS_A;
    // Metadata-ish elements that may appear nearly anywhere.
    let anywhere = G::BLOCK
        | G::INLINE
        | G::INLINE_MINUS_A
        | G::HEAD_CONTENT
        | G::TABLE_CONTENT
        | G::TR
        | G::TD
        | G::LI
        | G::DL_PART
        | G::OPTIONS;

    let blank = ElementDescriptor {
        name: "",
        groups: G::empty(),
        contents: G::empty(),
        transparent: G::empty(),
        text_mode: Pcdata,
        resumable: false,
        implied_child: None,
        scope_boundaries: Scopes::empty(),
    };

    let mut map = FxHashMap::default();
    let mut add = |desc: ElementDescriptor| {
        let _previous = map.insert(desc.name, desc);
        debug_assert!(_previous.is_none(), "duplicate element entry");
    };

    // Document skeleton. Fragments rarely see these, but a policy may
    // allow them, and `html` bounds every scope search.
    add(ElementDescriptor {
        name: "html",
        contents: G::HEAD_CONTENT | flow,
        scope_boundaries: Scopes::ALL,
        ..blank
    });
    add(ElementDescriptor {
        name: "head",
        contents: G::HEAD_CONTENT,
        ..blank
    });
    add(ElementDescriptor {
        name: "body",
        contents: flow,
        ..blank
    });
    add(ElementDescriptor {
        name: "title",
        groups: G::HEAD_CONTENT,
        contents: G::CHARACTER_DATA,
        text_mode: Rcdata,
        ..blank
    });
    for name in ["base", "link", "meta"] {
        add(ElementDescriptor {
            name,
            groups: G::HEAD_CONTENT,
            text_mode: Void,
            ..blank
        });
    }
    add(ElementDescriptor {
        name: "style",
        groups: G::HEAD_CONTENT | G::BLOCK | G::INLINE | G::INLINE_MINUS_A,
        contents: G::CHARACTER_DATA,
        text_mode: Cdata,
        ..blank
    });
    add(ElementDescriptor {
        name: "script",
        groups: anywhere,
        contents: G::CHARACTER_DATA,
        text_mode: Cdata,
        ..blank
    });

    // Grouping and sectioning content.
    for name in [
        "div", "section", "article", "aside", "nav", "header", "footer", "main", "figure",
        "address", "blockquote", "center", "details",
    ] {
        add(ElementDescriptor {
            name,
            groups: G::BLOCK,
            contents: flow,
            ..blank
        });
    }
    add(ElementDescriptor {
        name: "figcaption",
        groups: G::BLOCK,
        contents: flow,
        ..blank
    });
    add(ElementDescriptor {
        name: "summary",
        groups: G::BLOCK,
        contents: inline,
        ..blank
    });
    add(ElementDescriptor {
        name: "p",
        groups: G::BLOCK | G::P,
        contents: inline,
        ..blank
    });
    for name in ["h1", "h2", "h3", "h4", "h5", "h6"] {
        add(ElementDescriptor {
            name,
            groups: G::BLOCK,
            contents: inline,
            ..blank
        });
    }
    add(ElementDescriptor {
        name: "pre",
        groups: G::BLOCK,
        contents: inline,
        ..blank
    });
    // Obsolete raw-text blocks; the policy stage downgrades them to `pre`.
    add(ElementDescriptor {
        name: "xmp",
        groups: G::BLOCK,
        contents: G::CHARACTER_DATA,
        text_mode: Cdata,
        ..blank
    });
    add(ElementDescriptor {
        name: "listing",
        groups: G::BLOCK,
        contents: G::CHARACTER_DATA,
        text_mode: Cdata,
        ..blank
    });
    add(ElementDescriptor {
        name: "plaintext",
        groups: G::BLOCK,
        contents: G::CHARACTER_DATA,
        text_mode: PlainText,
        ..blank
    });
    add(ElementDescriptor {
        name: "hr",
        groups: G::BLOCK,
        text_mode: Void,
        ..blank
    });

    // Lists.
    for name in ["ul", "ol", "dir", "menu"] {
        add(ElementDescriptor {
            name,
            groups: G::BLOCK,
            contents: G::LI,
            implied_child: Some("li"),
            scope_boundaries: Scopes::LIST_ITEM,
            ..blank
        });
    }
    add(ElementDescriptor {
        name: "li",
        groups: G::LI,
        contents: flow,
        ..blank
    });
    add(ElementDescriptor {
        name: "dl",
        groups: G::BLOCK,
        contents: G::DL_PART,
        implied_child: Some("dd"),
        ..blank
    });
    add(ElementDescriptor {
        name: "dt",
        groups: G::DL_PART,
        contents: inline,
        ..blank
    });
    add(ElementDescriptor {
        name: "dd",
        groups: G::DL_PART,
        contents: flow,
        ..blank
    });

    // Tables.
    add(ElementDescriptor {
        name: "table",
        groups: G::BLOCK | G::TABLE,
        contents: G::TABLE_CONTENT | G::FORM,
        implied_child: Some("tbody"),
        scope_boundaries: Scopes::COMMON | Scopes::BUTTON | Scopes::LIST_ITEM | Scopes::TABLE,
        ..blank
    });
    add(ElementDescriptor {
        name: "caption",
        groups: G::TABLE_CONTENT,
        contents: flow,
        scope_boundaries: Scopes::COMMON | Scopes::BUTTON,
        ..blank
    });
    add(ElementDescriptor {
        name: "colgroup",
        groups: G::TABLE_CONTENT,
        contents: G::COL,
        ..blank
    });
    add(ElementDescriptor {
        name: "col",
        groups: G::COL,
        text_mode: Void,
        ..blank
    });
    for name in ["thead", "tbody", "tfoot"] {
        add(ElementDescriptor {
            name,
            groups: G::TABLE_CONTENT,
            contents: G::TR,
            implied_child: Some("tr"),
            ..blank
        });
    }
    add(ElementDescriptor {
        name: "tr",
        groups: G::TR,
        contents: G::TD,
        implied_child: Some("td"),
        ..blank
    });
    for name in ["td", "th"] {
        add(ElementDescriptor {
            name,
            groups: G::TD,
            contents: flow,
            scope_boundaries: Scopes::COMMON | Scopes::BUTTON | Scopes::LIST_ITEM,
            ..blank
        });
    }

    // Forms.
    add(ElementDescriptor {
        name: "form",
        groups: G::BLOCK | G::FORM,
        contents: flow,
        ..blank
    });
    add(ElementDescriptor {
        name: "fieldset",
        groups: G::BLOCK,
        contents: flow | G::LEGEND,
        ..blank
    });
    add(ElementDescriptor {
        name: "legend",
        groups: G::LEGEND,
        contents: inline,
        ..blank
    });
    add(ElementDescriptor {
        name: "input",
        groups: phrasing,
        text_mode: Void,
        ..blank
    });
    add(ElementDescriptor {
        name: "button",
        groups: phrasing,
        contents: inline,
        scope_boundaries: Scopes::BUTTON,
        ..blank
    });
    add(ElementDescriptor {
        name: "label",
        groups: phrasing,
        contents: inline,
        ..blank
    });
    add(ElementDescriptor {
        name: "select",
        groups: phrasing,
        contents: G::OPTIONS,
        ..blank
    });
    add(ElementDescriptor {
        name: "optgroup",
        groups: G::OPTIONS,
        contents: G::OPTION,
        ..blank
    });
    add(ElementDescriptor {
        name: "option",
        groups: G::OPTIONS | G::OPTION,
        contents: G::CHARACTER_DATA,
        ..blank
    });
    add(ElementDescriptor {
        name: "textarea",
        groups: phrasing,
        contents: G::CHARACTER_DATA,
        text_mode: Rcdata,
        ..blank
    });
    for name in ["output", "meter", "progress"] {
        add(ElementDescriptor {
            name,
            groups: phrasing,
            contents: inline,
            ..blank
        });
    }

    // The anchor: inline, but admits only non-anchor inline content
    // directly, and whatever block content its ancestors admit.
    add(ElementDescriptor {
        name: "a",
        groups: G::INLINE,
        contents: inline_minus_a,
        transparent: G::BLOCK,
        ..blank
    });

    // Formatting elements: implicit closes are resumed around subsequent
    // content, the simplified adoption-agency strategy.
    for name in [
        "b", "i", "em", "strong", "u", "s", "font", "tt", "q", "sub", "sup", "code", "kbd",
        "samp", "var", "cite", "small", "big", "nobr", "abbr", "acronym", "bdo", "bdi", "dfn",
        "blink", "strike",
    ] {
        add(ElementDescriptor {
            name,
            groups: phrasing,
            contents: inline,
            resumable: true,
            ..blank
        });
    }
    for name in ["ins", "del"] {
        add(ElementDescriptor {
            name,
            groups: G::BLOCK | phrasing,
            contents: G::CHARACTER_DATA,
            transparent: G::BLOCK | G::INLINE,
            resumable: true,
            ..blank
        });
    }
    for name in ["span", "mark", "time", "data", "ruby", "rt", "rp"] {
        add(ElementDescriptor {
            name,
            groups: phrasing,
            contents: inline,
            ..blank
        });
    }
    add(ElementDescriptor {
        name: "wbr",
        groups: phrasing,
        text_mode: Void,
        ..blank
    });

    // Embedded and interactive content.
    for name in ["img", "embed", "basefont"] {
        add(ElementDescriptor {
            name,
            groups: phrasing,
            text_mode: Void,
            ..blank
        });
    }
    add(ElementDescriptor {
        name: "br",
        groups: phrasing,
        text_mode: Void,
        ..blank
    });
    add(ElementDescriptor {
        name: "map",
        groups: phrasing,
        contents: G::AREA | G::BLOCK,
        ..blank
    });
    add(ElementDescriptor {
        name: "area",
        groups: G::AREA,
        text_mode: Void,
        ..blank
    });
    for name in ["object", "applet"] {
        add(ElementDescriptor {
            name,
            groups: G::BLOCK | phrasing,
            contents: G::PARAM | G::CHARACTER_DATA,
            transparent: G::BLOCK | G::INLINE,
            scope_boundaries: Scopes::COMMON | Scopes::BUTTON,
            ..blank
        });
    }
    add(ElementDescriptor {
        name: "param",
        groups: G::PARAM,
        text_mode: Void,
        ..blank
    });
    for name in ["audio", "video"] {
        add(ElementDescriptor {
            name,
            groups: phrasing,
            contents: G::PARAM,
            transparent: G::BLOCK | G::INLINE,
            ..blank
        });
    }
    for name in ["source", "track"] {
        add(ElementDescriptor {
            name,
            groups: G::PARAM,
            text_mode: Void,
            ..blank
        });
    }
    add(ElementDescriptor {
        name: "canvas",
        groups: phrasing,
        transparent: G::BLOCK | G::INLINE | G::CHARACTER_DATA,
        ..blank
    });
    add(ElementDescriptor {
        name: "iframe",
        groups: phrasing,
        contents: G::CHARACTER_DATA,
        text_mode: Cdata,
        ..blank
    });
    add(ElementDescriptor {
        name: "marquee",
        groups: G::BLOCK,
        contents: flow,
        scope_boundaries: Scopes::COMMON | Scopes::BUTTON,
        ..blank
    });

    // Scripting fallbacks. Scripting is off in a sanitizer, so `noscript`
    // content parses normally; it still bounds end-tag searches so that
    // markup inside cannot close elements outside.
    add(ElementDescriptor {
        name: "noscript",
        groups: G::BLOCK,
        contents: flow,
        scope_boundaries: Scopes::COMMON,
        ..blank
    });
    for name in ["noembed", "noframes"] {
        add(ElementDescriptor {
            name,
            groups: G::BLOCK,
            contents: G::CHARACTER_DATA,
            text_mode: Cdata,
            ..blank
        });
    }

    // Second pass: every implied-child reference must resolve, and the
    // implied child must not immediately imply its parent.
    for desc in map.values() {
        if let Some(child) = desc.implied_child {
            let child_desc = map
                .get(child)
                .unwrap_or_else(|| panic!("implied child <{child}> of <{}> missing", desc.name));
            debug_assert!(child_desc.implied_child != Some(desc.name));
        }
    }

    map
}

/// The scope categories that bound the stack search when closing `name`.
///
/// `</p>` searches in button scope, list items in list-item scope, table
/// parts in table scope, option parts in select scope; everything else in
/// the common scope.
pub fn blocking_scopes(name: &str) -> Scopes {
    match name {
        "p" => Scopes::COMMON | Scopes::BUTTON,
        "li" => Scopes::COMMON | Scopes::LIST_ITEM,
        "dd" | "dt" => Scopes::COMMON,
        "table" | "caption" | "colgroup" | "col" | "thead" | "tbody" | "tfoot" | "tr" | "td"
        | "th" => Scopes::TABLE,
        "option" | "optgroup" => Scopes::SELECT,
        _ => Scopes::COMMON,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn table_implies_sections_down_to_cells() {
        let table = lookup("table").unwrap();
        let tbody = lookup("tbody").unwrap();
        let tr = lookup("tr").unwrap();
        let td = lookup("td").unwrap();

        assert!(!table.admits(tr.groups));
        assert_eq!(table.implied_child, Some("tbody"));
        assert!(tbody.admits(tr.groups));
        assert_eq!(tbody.implied_child, Some("tr"));
        assert!(tr.admits(td.groups));
        assert!(td.admits(ElementGroups::CHARACTER_DATA));
        assert!(!table.admits(ElementGroups::CHARACTER_DATA));
    }

    #[test]
    fn anchors_do_not_nest() {
        let a = lookup("a").unwrap();
        assert!(!a.admits_somewhere(a.groups));
        assert!(a.admits(lookup("b").unwrap().groups));
        // Block content is admitted only transparently.
        let p = lookup("p").unwrap();
        assert!(!a.admits(p.groups));
        assert!(a.admits_somewhere(p.groups));
    }

    #[test]
    fn formatting_elements_are_resumable() {
        for name in ["b", "i", "em", "strong", "del", "ins", "nobr"] {
            assert!(lookup(name).unwrap().resumable, "<{name}> should resume");
        }
        for name in ["a", "span", "div", "p"] {
            assert!(!lookup(name).unwrap().resumable);
        }
    }

    #[test]
    fn void_elements_admit_nothing() {
        for name in ["br", "hr", "img", "input", "col", "wbr", "area"] {
            let desc = lookup(name).unwrap();
            assert!(desc.is_void());
            assert!(desc.contents.is_empty());
        }
    }

    #[test]
    fn scope_boundaries_block_paragraph_closes() {
        let table = lookup("table").unwrap();
        assert!(table.scope_boundaries.intersects(blocking_scopes("p")));
        assert!(!lookup("div")
            .unwrap()
            .scope_boundaries
            .intersects(blocking_scopes("p")));
    }

    #[test]
    fn text_modes() {
        use TextMode::*;
        assert_eq!(lookup("script").unwrap().text_mode, Cdata);
        assert_eq!(lookup("style").unwrap().text_mode, Cdata);
        assert_eq!(lookup("xmp").unwrap().text_mode, Cdata);
        assert_eq!(lookup("title").unwrap().text_mode, Rcdata);
        assert_eq!(lookup("textarea").unwrap().text_mode, Rcdata);
        assert_eq!(lookup("plaintext").unwrap().text_mode, PlainText);
        assert_eq!(lookup("div").unwrap().text_mode, Pcdata);
    }
}
