//! End-to-end sanitization scenarios with literal input/output pairs.

use html_sanitizer::{presets, HtmlEvent, HtmlPolicyBuilder, PolicyFactory};
use pretty_assertions::assert_eq;

/// The working preset for most scenarios: formatting + blocks + links +
/// images + styling.
fn grid() -> PolicyFactory {
    let _ = env_logger::builder().is_test(true).try_init();
    presets::formatting()
        .and(&presets::blocks())
        .and(&presets::links())
        .and(&presets::images())
        .and(&presets::styles())
}

macro_rules! sanitize_scenarios {
    ($($name:ident: ($factory:expr, $input:expr, $expected:expr),)*) => {
        $(
            #[test]
            fn $name() {
                let factory = $factory;
                assert_eq!(
                    factory.sanitize($input),
                    $expected,
                    "input: {:?}",
                    $input
                );
            }
        )*
    };
}

sanitize_scenarios! {
    script_is_removed_with_content: (
        grid(),
        "<script>alert(1)</script>hi",
        "hi"
    ),
    javascript_url_takes_the_link_with_it: (
        grid(),
        "<a href=\"javascript:alert(1)\">x</a>",
        "x"
    ),
    nofollow_is_injected_when_required: (
        grid().and(&HtmlPolicyBuilder::new().require_rel_nofollow_on_links().to_factory()),
        "<a href=\"http://e.com/\">x</a>",
        "<a href=\"http://e.com/\" rel=\"nofollow\">x</a>"
    ),
    misnested_formatting_resumes: (
        grid(),
        "<b>hi<i>world</b>!</i>",
        "<b>hi<i>world</i></b><i>!</i>"
    ),
    unclosed_paragraphs_close: (
        grid(),
        "<p>1<p>2",
        "<p>1</p><p>2</p>"
    ),
    tables_get_implied_sections: (
        grid().and(&presets::tables()),
        "<table><tr><td>a</td></tr></table>",
        "<table><tbody><tr><td>a</td></tr></tbody></table>"
    ),
    style_elements_survive_but_import_does_not: (
        grid(),
        "<style>@import 'javascript:alert(1)';</style>",
        "<style></style>"
    ),
    uppercase_scheme_matches_case_insensitively: (
        HtmlPolicyBuilder::new()
            .allow_elements(["a"])
            .allow_attributes(["href"])
            .on_elements(["a"])
            .allow_url_protocols(["https"])
            .to_factory(),
        "<a href=\"HTTPS://e\">x</a>",
        "<a href=\"HTTPS://e\">x</a>"
    ),
    turkish_dotted_i_does_not_fold_to_file: (
        HtmlPolicyBuilder::new()
            .allow_elements(["a"])
            .allow_attributes(["href"])
            .on_elements(["a"])
            .allow_url_protocols(["file"])
            .to_factory(),
        "<a href=\"F\u{130}LE:/x\">x</a>",
        "x"
    ),
    onclick_never_survives: (
        grid(),
        "<b onclick=\"evil()\" onMouseOver=\"evil()\">x</b>",
        "<b>x</b>"
    ),
    img_keeps_its_attributes: (
        grid(),
        "<img src=\"http://e/i.png\" alt=\"pic\" width=\"10\">",
        "<img src=\"http://e/i.png\" alt=\"pic\" width=\"10\" />"
    ),
    style_attribute_is_filtered: (
        grid(),
        "<p style=\"color: red; position: fixed\">x</p>",
        "<p style=\"color:red\">x</p>"
    ),
    obsolete_rawtext_blocks_become_pre: (
        grid().and(&HtmlPolicyBuilder::new().allow_elements(["xmp"]).to_factory()),
        "<xmp><b>not bold</b></xmp>",
        "<pre>&lt;b&gt;not bold&lt;/b&gt;</pre>"
    ),
    rel_skip_wins_over_require: (
        grid()
            .and(&HtmlPolicyBuilder::new()
                .require_rels_on_links(["nofollow", "noreferrer"])
                .skip_rels_on_links(["nofollow"])
                .to_factory()),
        "<a href=\"http://e/\" rel=\"nofollow external\">x</a>",
        "<a href=\"http://e/\" rel=\"external noreferrer\">x</a>"
    ),
    target_blank_gets_opener_guards: (
        grid().and(&HtmlPolicyBuilder::new()
            .allow_attributes(["target"])
            .on_elements(["a"])
            .to_factory()),
        "<a href=\"http://e/\" target=\"_blank\">x</a>",
        "<a href=\"http://e/\" target=\"_blank\" rel=\"noopener noreferrer\">x</a>"
    ),
    target_self_gets_no_opener_guards: (
        grid().and(&HtmlPolicyBuilder::new()
            .allow_attributes(["target"])
            .on_elements(["a"])
            .to_factory()),
        "<a href=\"http://e/\" target=\"_self\">x</a>",
        "<a href=\"http://e/\" target=\"_self\">x</a>"
    ),
    duplicate_attributes_keep_the_first_approved: (
        grid().and(&HtmlPolicyBuilder::new().allow_attributes(["title"]).globally().to_factory()),
        "<a href=\"javascript:x\" href=\"http://e/\" title=\"a\" title=\"b\">x</a>",
        "<a href=\"http://e/\" title=\"a\">x</a>"
    ),
    comments_and_doctypes_vanish: (
        grid(),
        "<!DOCTYPE html><!-- hidden --><p>x<!--[if IE]>evil<![endif]--></p>",
        "<p>x</p>"
    ),
    entities_decode_and_reencode: (
        grid(),
        "fish &amp; chips &lt;tag&gt;",
        "fish &amp; chips &lt;tag&gt;"
    ),
    protocol_relative_urls_survive: (
        grid(),
        "<a href=\"//e.com/x\">x</a>",
        "<a href=\"//e.com/x\">x</a>"
    ),
}

#[test]
fn nesting_limit_caps_depth() {
    let factory = grid().and(
        &HtmlPolicyBuilder::new()
            .allow_elements(["div"])
            .nesting_limit(10)
            .to_factory(),
    );
    let input = "<div>".repeat(20_000);
    let expected = format!("{}{}", "<div>".repeat(10), "</div>".repeat(10));
    assert_eq!(factory.sanitize(&input), expected);
}

#[test]
fn doubled_braces_are_split_in_attribute_values() {
    let factory = grid().and(
        &HtmlPolicyBuilder::new()
            .allow_attributes(["title"])
            .globally()
            .to_factory(),
    );
    let out = factory.sanitize("<div title=\"{{x}}\">y</div>");
    assert_eq!(out, "<div title=\"{&lt;!-- --&gt;{x}&lt;!-- --&gt;}\">y</div>");
    // The decoded attribute value carries the comment between the braces,
    // so no downstream templating pass can see "{{x}}".
    assert!(out.contains("&lt;!-- --&gt;"));
}

#[test]
fn doubled_braces_are_split_in_text() {
    assert_eq!(grid().sanitize("{{x}}"), "{<!-- -->{x}<!-- -->}");
}

#[test]
fn url_protocol_sets_intersect_across_and() {
    let wide = HtmlPolicyBuilder::new()
        .allow_elements(["a"])
        .allow_attributes(["href"])
        .on_elements(["a"])
        .allow_url_protocols(["http", "https"])
        .to_factory();
    let narrow = HtmlPolicyBuilder::new()
        .allow_url_protocols(["https"])
        .to_factory();

    let joined = wide.and(&narrow);
    assert_eq!(joined.sanitize("<a href=\"https://e/\">x</a>"), "<a href=\"https://e/\">x</a>");
    // http is allowed by one side only, so the join drops it.
    assert_eq!(joined.sanitize("<a href=\"http://e/\">x</a>"), "x");
    assert_eq!(wide.sanitize("<a href=\"http://e/\">x</a>"), "<a href=\"http://e/\">x</a>");
}

#[test]
fn change_listener_sees_discards() {
    use html_sanitizer::HtmlChangeListener;

    #[derive(Default)]
    struct Tally;

    #[derive(Default)]
    struct Seen {
        tags: Vec<String>,
        attributes: Vec<(String, Vec<String>)>,
    }

    impl HtmlChangeListener<Seen> for Tally {
        fn discarded_tag(&self, seen: &mut Seen, element: &str) {
            seen.tags.push(element.to_string());
        }

        fn discarded_attributes(&self, seen: &mut Seen, element: &str, attributes: &[&str]) {
            seen.attributes.push((
                element.to_string(),
                attributes.iter().map(|a| a.to_string()).collect(),
            ));
        }
    }

    let mut seen = Seen::default();
    let out = grid().sanitize_with(
        "<script>x</script><b onclick=\"y\">keep</b><blink>z</blink>",
        &Tally,
        &mut seen,
    );

    assert_eq!(out, "<b>keep</b>z");
    assert_eq!(seen.tags, vec!["script".to_string(), "blink".to_string()]);
    assert_eq!(
        seen.attributes,
        vec![("b".to_string(), vec!["onclick".to_string()])]
    );
}

#[test]
fn preprocessors_see_raw_events() {
    // Redact text before any balancing or policy work happens.
    let factory = presets::formatting().and(
        &HtmlPolicyBuilder::new()
            .with_preprocessor(|event| match event {
                HtmlEvent::Text { text } if text.contains("secret") => None,
                event => Some(event),
            })
            .to_factory(),
    );
    assert_eq!(
        factory.sanitize("<b>public</b><b>secret stuff</b>"),
        "<b>public</b><b></b>"
    );
}

#[test]
fn postprocessors_see_balanced_policy_output() {
    let factory = presets::formatting().and(
        &HtmlPolicyBuilder::new()
            .with_postprocessor(|event| match event {
                HtmlEvent::Text { text } => Some(HtmlEvent::Text {
                    text: text.to_ascii_uppercase(),
                }),
                event => Some(event),
            })
            .to_factory(),
    );
    assert_eq!(factory.sanitize("<b>quiet</b>"), "<b>QUIET</b>");
}

#[test]
fn renderer_errors_reach_the_handler() {
    // A postprocessor is the only stage that can smuggle a raw end tag
    // into rawtext content; the renderer must catch it and report.
    let factory = presets::styles().and(
        &HtmlPolicyBuilder::new()
            .with_postprocessor(|event| match event {
                HtmlEvent::Text { .. } => Some(HtmlEvent::Text {
                    text: "x</style><script>y".to_string(),
                }),
                event => Some(event),
            })
            .to_factory(),
    );

    let mut messages = Vec::new();
    let mut handler = |message: &str| messages.push(message.to_string());
    let out = factory.sanitize_into("<style>p{color:red}</style>", &mut handler);

    assert_eq!(out, "<style></style>");
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("its own end tag"));
}

#[test]
fn output_is_deterministic() {
    let factory = grid();
    let input = "<p style=\"color:red\"><a href=\"http://e/\">x</a> &amp; <img src=\"http://e/i\" alt=\"i\"></p>";
    let first = factory.sanitize(input);
    for _ in 0..5 {
        assert_eq!(factory.sanitize(input), first);
    }
}

#[test]
fn idempotence_on_adversarial_seeds() {
    let factory = grid().and(&presets::tables());
    for input in [
        "<b>hi<i>world</b>!</i>",
        "<table>x<tr><td>y</td></tr></table>",
        "{{x}} }}y{{",
        "<pre>\n\nkeep</pre>",
        "<a href=\"http://e/?a=1&amp;b=2\">x</a>",
        "<p style=\"margin: -1px; color: rgb(1,2,3)\">x</p>",
        "a <3 b \u{1F600} &notin; &#96; `",
        "<ul>loose<li>item</ul>",
        "<style>p { color: red } @import url(x);</style>",
        "<div title=\"{{x}}\">&amp;amp;</div>",
    ] {
        let once = factory.sanitize(input);
        let twice = factory.sanitize(&once);
        assert_eq!(twice, once, "not a fixed point for {input:?}");
    }
}
