//! The property schema: which CSS properties are styleable at all, and
//! what value shapes each accepts.
//!
//! The default schema is a whitelist of presentation properties. Anything
//! that moves content out of its box, changes hit targets, or reaches
//! outside the styled element (`position`, `display`, `cursor`, legacy
//! binding and behavior properties) is pinned to the explicit
//! [`PropertyRule::Disallowed`] sentinel so the intent is visible, and
//! everything unlisted is rejected the same way.

use std::sync::{Arc, LazyLock};

use bitflags::bitflags;
use rustc_hash::{FxHashMap, FxHashSet};

bitflags! {
    /// Shapes of value tokens a property accepts.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ValueKinds: u16 {
        const NUMBER     = 1 << 0;
        const INTEGER    = 1 << 1;
        const LENGTH     = 1 << 2;
        const PERCENTAGE = 1 << 3;
        const ANGLE      = 1 << 4;
        const COLOR      = 1 << 5;
        const STRING     = 1 << 6;
        const URL        = 1 << 7;
        /// Any identifier (font names). Most properties enumerate their
        /// keywords in `literals` instead.
        const IDENT      = 1 << 8;
        /// Negative quantities permitted.
        const NEGATIVE   = 1 << 9;
    }
}

#[derive(Debug, Clone, Default)]
pub struct PropertyDescriptor {
    pub kinds: ValueKinds,
    pub literals: FxHashSet<&'static str>,
    /// Allowed functions, each mapping to the key of the parameter schema
    /// its arguments are validated against.
    pub functions: FxHashMap<&'static str, &'static str>,
}

impl Default for ValueKinds {
    fn default() -> Self {
        ValueKinds::empty()
    }
}

#[derive(Debug, Clone)]
pub enum PropertyRule {
    /// Explicitly dangerous; never emitted even if a later schema join
    /// would otherwise allow it.
    Disallowed,
    Allow(PropertyDescriptor),
}

#[derive(Debug, Clone, Default)]
pub struct CssSchema {
    properties: FxHashMap<Box<str>, PropertyRule>,
    function_params: FxHashMap<&'static str, PropertyDescriptor>,
}

impl CssSchema {
    /// The stock whitelist.
    pub fn default_schema() -> Arc<CssSchema> {
        DEFAULT.clone()
    }

    pub fn property(&self, name: &str) -> Option<&PropertyRule> {
        self.properties.get(name)
    }

    pub fn function_params(&self, key: &str) -> Option<&PropertyDescriptor> {
        self.function_params.get(key)
    }

    /// Schema join: a property survives only when both sides allow it, and
    /// with the intersection of its allowed shapes. An explicit
    /// [`PropertyRule::Disallowed`] on either side wins.
    pub fn intersect(&self, other: &CssSchema) -> CssSchema {
        let mut properties = FxHashMap::default();
        for (name, rule) in &self.properties {
            let Some(other_rule) = other.properties.get(name) else {
                continue;
            };
            let joined = match (rule, other_rule) {
                (PropertyRule::Allow(a), PropertyRule::Allow(b)) => {
                    PropertyRule::Allow(PropertyDescriptor {
                        kinds: a.kinds & b.kinds,
                        literals: a.literals.intersection(&b.literals).copied().collect(),
                        functions: a
                            .functions
                            .iter()
                            .filter(|(name, key)| b.functions.get(*name) == Some(key))
                            .map(|(name, key)| (*name, *key))
                            .collect(),
                    })
                }
                _ => PropertyRule::Disallowed,
            };
            properties.insert(name.clone(), joined);
        }

        let mut function_params = self.function_params.clone();
        for (key, descriptor) in &other.function_params {
            function_params.entry(key).or_insert_with(|| descriptor.clone());
        }

        CssSchema {
            properties,
            function_params,
        }
    }
}

/// Units acceptable on a `LENGTH` dimension.
pub const LENGTH_UNITS: &[&str] = &[
    "em", "ex", "ch", "rem", "vw", "vh", "vmin", "vmax", "px", "cm", "mm", "q", "in", "pt", "pc",
];

/// Units acceptable on an `ANGLE` dimension.
pub const ANGLE_UNITS: &[&str] = &["deg", "grad", "rad", "turn"];

pub fn is_color_keyword(name: &str) -> bool {
    COLOR_KEYWORDS.contains(name)
}

static COLOR_KEYWORDS: LazyLock<FxHashSet<&'static str>> = LazyLock::new(|| {
    [
        "transparent",
        "currentcolor",
        "aliceblue",
        "aqua",
        "beige",
        "black",
        "blue",
        "brown",
        "chocolate",
        "coral",
        "crimson",
        "cyan",
        "darkblue",
        "darkgray",
        "darkgreen",
        "darkorange",
        "darkred",
        "darkviolet",
        "deeppink",
        "dimgray",
        "fuchsia",
        "gainsboro",
        "gold",
        "gray",
        "green",
        "greenyellow",
        "hotpink",
        "indigo",
        "ivory",
        "khaki",
        "lavender",
        "lightblue",
        "lightgray",
        "lightgreen",
        "lightpink",
        "lightyellow",
        "lime",
        "magenta",
        "maroon",
        "mintcream",
        "navy",
        "olive",
        "olivedrab",
        "orange",
        "orchid",
        "pink",
        "plum",
        "purple",
        "red",
        "salmon",
        "silver",
        "skyblue",
        "slateblue",
        "snow",
        "tan",
        "teal",
        "tomato",
        "turquoise",
        "violet",
        "wheat",
        "white",
        "whitesmoke",
        "yellow",
        "yellowgreen",
    ]
    .into_iter()
    .collect()
});

static DEFAULT: LazyLock<Arc<CssSchema>> = LazyLock::new(|| Arc::new(build_default()));

fn build_default() -> CssSchema {
    use ValueKinds as K;

    let mut schema = CssSchema::default();

    let color_functions: &[(&'static str, &'static str)] = &[
        ("rgb", "rgb"),
        ("rgba", "rgb"),
        ("hsl", "hsl"),
        ("hsla", "hsl"),
    ];
    let gradient_functions: &[(&'static str, &'static str)] = &[
        ("rgb", "rgb"),
        ("rgba", "rgb"),
        ("hsl", "hsl"),
        ("hsla", "hsl"),
        ("linear-gradient", "linear-gradient"),
        ("radial-gradient", "radial-gradient"),
        ("image", "image"),
    ];

    {
        let mut allow = |names: &[&str],
                         kinds: K,
                         literals: &[&'static str],
                         functions: &[(&'static str, &'static str)]| {
            for name in names {
                schema.properties.insert(
                    (*name).into(),
                    PropertyRule::Allow(PropertyDescriptor {
                        kinds,
                        literals: literals.iter().copied().collect(),
                        functions: functions.iter().copied().collect(),
                    }),
                );
            }
        };

        // Colors.
        allow(
            &[
                "color",
                "background-color",
                "border-color",
                "border-top-color",
                "border-right-color",
                "border-bottom-color",
                "border-left-color",
                "outline-color",
                "caret-color",
                "text-decoration-color",
            ],
            K::COLOR,
            &[],
            color_functions,
        );

        // Backgrounds.
        allow(
            &["background-image", "list-style-image"],
            K::URL,
            &["none"],
            &[
                ("linear-gradient", "linear-gradient"),
                ("radial-gradient", "radial-gradient"),
                ("image", "image"),
            ],
        );
        allow(
            &["background"],
            K::COLOR | K::URL | K::LENGTH | K::PERCENTAGE,
            &[
                "none",
                "no-repeat",
                "repeat",
                "repeat-x",
                "repeat-y",
                "space",
                "round",
                "left",
                "right",
                "top",
                "bottom",
                "center",
                "scroll",
                "fixed",
                "local",
            ],
            gradient_functions,
        );
        allow(
            &["background-repeat"],
            K::empty(),
            &["repeat", "repeat-x", "repeat-y", "no-repeat", "space", "round"],
            &[],
        );
        allow(
            &["background-position"],
            K::LENGTH | K::PERCENTAGE | K::NEGATIVE,
            &["left", "right", "top", "bottom", "center"],
            &[],
        );
        allow(
            &["background-size"],
            K::LENGTH | K::PERCENTAGE,
            &["cover", "contain", "auto"],
            &[],
        );
        allow(
            &["background-attachment"],
            K::empty(),
            &["scroll", "fixed", "local"],
            &[],
        );

        // Fonts and text.
        allow(&["font-family"], K::STRING | K::IDENT, &[], &[]);
        allow(
            &["font-size"],
            K::LENGTH | K::PERCENTAGE,
            &[
                "xx-small", "x-small", "small", "medium", "large", "x-large", "xx-large",
                "smaller", "larger",
            ],
            &[],
        );
        allow(
            &["font-style"],
            K::empty(),
            &["normal", "italic", "oblique"],
            &[],
        );
        allow(&["font-variant"], K::empty(), &["normal", "small-caps"], &[]);
        allow(
            &["font-weight"],
            K::INTEGER,
            &["normal", "bold", "bolder", "lighter"],
            &[],
        );
        allow(
            &["line-height"],
            K::NUMBER | K::LENGTH | K::PERCENTAGE,
            &["normal"],
            &[],
        );
        allow(
            &["letter-spacing", "word-spacing"],
            K::LENGTH | K::NEGATIVE,
            &["normal"],
            &[],
        );
        allow(
            &["text-align"],
            K::empty(),
            &["left", "right", "center", "justify"],
            &[],
        );
        allow(
            &["text-decoration", "text-decoration-line"],
            K::COLOR,
            &["none", "underline", "overline", "line-through"],
            color_functions,
        );
        allow(
            &["text-decoration-style"],
            K::empty(),
            &["solid", "double", "dotted", "dashed", "wavy"],
            &[],
        );
        allow(
            &["text-transform"],
            K::empty(),
            &["none", "capitalize", "uppercase", "lowercase"],
            &[],
        );
        allow(
            &["text-indent"],
            K::LENGTH | K::PERCENTAGE | K::NEGATIVE,
            &[],
            &[],
        );
        allow(
            &["vertical-align"],
            K::LENGTH | K::PERCENTAGE | K::NEGATIVE,
            &[
                "baseline",
                "sub",
                "super",
                "top",
                "text-top",
                "middle",
                "bottom",
                "text-bottom",
            ],
            &[],
        );
        allow(
            &["white-space"],
            K::empty(),
            &["normal", "pre", "nowrap", "pre-wrap", "pre-line"],
            &[],
        );
        allow(
            &["overflow-wrap", "word-wrap"],
            K::empty(),
            &["normal", "break-word", "anywhere"],
            &[],
        );
        allow(
            &["word-break"],
            K::empty(),
            &["normal", "break-all", "keep-all"],
            &[],
        );
        allow(&["direction"], K::empty(), &["ltr", "rtl"], &[]);
        allow(&["quotes"], K::STRING, &["none", "auto"], &[]);
        allow(
            &["text-shadow"],
            K::COLOR | K::LENGTH | K::NEGATIVE,
            &["none"],
            color_functions,
        );
        allow(&["opacity"], K::NUMBER | K::PERCENTAGE, &[], &[]);

        // Box model.
        allow(
            &["margin", "margin-top", "margin-right", "margin-bottom", "margin-left"],
            K::LENGTH | K::PERCENTAGE | K::NEGATIVE,
            &["auto"],
            &[],
        );
        allow(
            &[
                "padding",
                "padding-top",
                "padding-right",
                "padding-bottom",
                "padding-left",
            ],
            K::LENGTH | K::PERCENTAGE,
            &[],
            &[],
        );
        allow(
            &[
                "width",
                "height",
                "min-width",
                "min-height",
                "max-width",
                "max-height",
            ],
            K::LENGTH | K::PERCENTAGE,
            &["auto", "none", "min-content", "max-content", "fit-content"],
            &[],
        );

        // Borders and outlines.
        let border_styles: &[&'static str] = &[
            "none", "hidden", "solid", "dashed", "dotted", "double", "groove", "ridge", "inset",
            "outset",
        ];
        allow(
            &[
                "border",
                "border-top",
                "border-right",
                "border-bottom",
                "border-left",
                "outline",
            ],
            K::COLOR | K::LENGTH,
            &[
                "none", "hidden", "solid", "dashed", "dotted", "double", "groove", "ridge",
                "inset", "outset", "thin", "medium", "thick",
            ],
            color_functions,
        );
        allow(
            &[
                "border-width",
                "border-top-width",
                "border-right-width",
                "border-bottom-width",
                "border-left-width",
                "outline-width",
            ],
            K::LENGTH,
            &["thin", "medium", "thick"],
            &[],
        );
        allow(
            &[
                "border-style",
                "border-top-style",
                "border-right-style",
                "border-bottom-style",
                "border-left-style",
                "outline-style",
            ],
            K::empty(),
            border_styles,
            &[],
        );
        allow(
            &[
                "border-radius",
                "border-top-left-radius",
                "border-top-right-radius",
                "border-bottom-left-radius",
                "border-bottom-right-radius",
            ],
            K::LENGTH | K::PERCENTAGE,
            &[],
            &[],
        );
        allow(
            &["box-shadow"],
            K::COLOR | K::LENGTH | K::NEGATIVE,
            &["none", "inset"],
            color_functions,
        );

        // Lists and tables.
        allow(
            &["list-style", "list-style-type"],
            K::empty(),
            &[
                "none",
                "disc",
                "circle",
                "square",
                "decimal",
                "decimal-leading-zero",
                "lower-roman",
                "upper-roman",
                "lower-alpha",
                "upper-alpha",
                "lower-latin",
                "upper-latin",
                "inside",
                "outside",
            ],
            &[],
        );
        allow(
            &["list-style-position"],
            K::empty(),
            &["inside", "outside"],
            &[],
        );
        allow(
            &["border-collapse"],
            K::empty(),
            &["collapse", "separate"],
            &[],
        );
        allow(&["border-spacing"], K::LENGTH, &[], &[]);
        allow(&["caption-side"], K::empty(), &["top", "bottom"], &[]);
        allow(&["empty-cells"], K::empty(), &["show", "hide"], &[]);
        allow(&["table-layout"], K::empty(), &["auto", "fixed"], &[]);
        allow(
            &["overflow", "overflow-x", "overflow-y"],
            K::empty(),
            &["visible", "hidden", "scroll", "auto", "clip"],
            &[],
        );
        allow(&["text-overflow"], K::empty(), &["clip", "ellipsis"], &[]);
    }

    /*
     * The explicit deny list. These reposition content, capture pointer
     * interactions, or (in legacy engines) execute code; they stay denied
     * even when a custom schema is intersected on top.
     */
    for name in [
        "display",
        "position",
        "float",
        "clear",
        "cursor",
        "visibility",
        "top",
        "right",
        "bottom",
        "left",
        "z-index",
        "content",
        "pointer-events",
        "unicode-bidi",
        "transform",
        "transition",
        "animation",
        "animation-name",
        "behavior",
        "filter",
        "zoom",
        "-moz-binding",
        "-ms-behavior",
        "-ms-filter",
    ] {
        schema
            .properties
            .insert(name.into(), PropertyRule::Disallowed);
    }

    // Parameter schemas for the allowed functions.
    schema.function_params.insert(
        "rgb",
        PropertyDescriptor {
            kinds: K::NUMBER | K::PERCENTAGE,
            literals: FxHashSet::default(),
            functions: FxHashMap::default(),
        },
    );
    schema.function_params.insert(
        "hsl",
        PropertyDescriptor {
            kinds: K::NUMBER | K::PERCENTAGE | K::ANGLE,
            literals: FxHashSet::default(),
            functions: FxHashMap::default(),
        },
    );
    schema.function_params.insert(
        "linear-gradient",
        PropertyDescriptor {
            kinds: K::COLOR | K::LENGTH | K::PERCENTAGE | K::ANGLE | K::NEGATIVE,
            literals: ["to", "left", "right", "top", "bottom"].into_iter().collect(),
            functions: [("rgb", "rgb"), ("rgba", "rgb"), ("hsl", "hsl"), ("hsla", "hsl")]
                .into_iter()
                .collect(),
        },
    );
    schema.function_params.insert(
        "radial-gradient",
        PropertyDescriptor {
            kinds: K::COLOR | K::LENGTH | K::PERCENTAGE | K::ANGLE | K::NEGATIVE,
            literals: [
                "at",
                "center",
                "circle",
                "ellipse",
                "closest-side",
                "closest-corner",
                "farthest-side",
                "farthest-corner",
                "left",
                "right",
                "top",
                "bottom",
            ]
            .into_iter()
            .collect(),
            functions: [("rgb", "rgb"), ("rgba", "rgb"), ("hsl", "hsl"), ("hsla", "hsl")]
                .into_iter()
                .collect(),
        },
    );
    schema.function_params.insert(
        "image",
        PropertyDescriptor {
            kinds: K::URL | K::STRING | K::COLOR,
            literals: FxHashSet::default(),
            functions: FxHashMap::default(),
        },
    );

    schema
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dangerous_properties_are_pinned_disallowed() {
        let schema = CssSchema::default_schema();
        for name in ["display", "position", "float", "clear", "cursor", "-moz-binding"] {
            assert!(
                matches!(schema.property(name), Some(PropertyRule::Disallowed)),
                "{name} must be explicitly disallowed"
            );
        }
        assert!(schema.property("no-such-property").is_none());
    }

    #[test]
    fn color_accepts_functions() {
        let schema = CssSchema::default_schema();
        let Some(PropertyRule::Allow(desc)) = schema.property("color") else {
            panic!("color must be allowed");
        };
        assert!(desc.kinds.contains(ValueKinds::COLOR));
        assert_eq!(desc.functions.get("rgb"), Some(&"rgb"));
        assert!(schema.function_params("rgb").is_some());
    }

    #[test]
    fn intersection_is_stricter() {
        let schema = CssSchema::default_schema();
        let joined = schema.intersect(&schema);
        assert!(matches!(joined.property("color"), Some(PropertyRule::Allow(_))));
        assert!(matches!(joined.property("display"), Some(PropertyRule::Disallowed)));

        let empty = CssSchema::default();
        let nothing = schema.intersect(&empty);
        assert!(nothing.property("color").is_none());
    }
}
