//! HTML to block mapping.
//!
//! The mapper picks a content root (`main`, a content-like `div`, `article`,
//! then `body`) and walks it in document order. Recognized elements become
//! blocks; anything else is descended into without emitting a block.
//!
//! | Element | Block |
//! |---|---|
//! | `h1`-`h6` | heading, level clamped to 3 |
//! | `p` | paragraph, followed by any images it contains |
//! | `pre` | code, language from `language-*`-style classes |
//! | `img` | image, source resolved against the base URL |
//! | `ul` / `ol` | one list item per `li`, one nesting level kept |
//! | `blockquote` | quote |
//! | math `div` | equation |
//!
//! Elements that cannot be mapped (an image without a usable source, say)
//! are skipped and reported as [`MappingIssue`]s; the rest of the page still
//! maps.
//!
//! A last pass fits every block to the remote size limits: long rich text
//! is split over several blocks, equations longer than
//! [`MAX_EXPRESSION_LEN`] become LaTeX code blocks, and images whose URL is
//! longer than [`MAX_URL_LEN`] are skipped.

use crate::blocks::{
    Block, BlockKind, MAX_EXPRESSION_LEN, MAX_URL_LEN, RichText, TextSpan,
};
use crate::document::{Document, collapse_whitespace, selector};
use scraper::{ElementRef, Node};
use serde::Serialize;
use tracing::debug;
use url::Url;

/// Elements whose subtree never contributes content.
const SKIPPED: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "nav", "button", "form", "iframe", "head",
];

/// Class values that name no real language.
const NON_LANGUAGES: &[&str] = &["default", "none", "plain", "plaintext", "text", "nohighlight"];

/// An element that was skipped during mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingIssue {
    /// Tag name of the skipped element.
    pub element: String,
    /// Why it was skipped.
    pub reason: String,
}

/// Result of mapping one document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MappedContent {
    /// Blocks in document order.
    pub blocks: Vec<Block>,
    /// Elements that could not be mapped.
    pub issues: Vec<MappingIssue>,
}

/// Converts parsed documents into block sequences.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockMapper;

impl BlockMapper {
    /// Create a mapper.
    pub const fn new() -> Self {
        Self
    }

    /// Map a document to its ordered block sequence.
    pub fn map(&self, doc: &Document) -> MappedContent {
        let root = content_root(doc);
        let mut walker = Walker {
            base: doc.base_url(),
            out: MappedContent::default(),
        };
        walker.visit_children(root);
        let content = fit_limits(walker.out);

        for issue in &content.issues {
            debug!(url = %doc.url(), element = %issue.element, reason = %issue.reason, "skipped element");
        }
        content
    }
}

fn fit_limits(content: MappedContent) -> MappedContent {
    let MappedContent { blocks, mut issues } = content;
    let mut fitted = Vec::with_capacity(blocks.len());

    for block in blocks {
        match block.kind {
            BlockKind::Image { ref url } if url.chars().count() > MAX_URL_LEN => {
                issues.push(MappingIssue {
                    element: "img".to_string(),
                    reason: format!("image URL longer than {MAX_URL_LEN} characters"),
                });
            },
            BlockKind::Equation { ref expression }
                if expression.chars().count() > MAX_EXPRESSION_LEN =>
            {
                let code = Block::code(expression.clone(), Some("latex".to_string()));
                fitted.extend(code.split_to_fit());
            },
            _ => fitted.extend(block.split_to_fit()),
        }
    }
    MappedContent {
        blocks: fitted,
        issues,
    }
}

fn content_root(doc: &Document) -> ElementRef<'_> {
    let html = doc.html();
    html.select(&selector("main"))
        .next()
        .or_else(|| {
            html.select(&selector("div[class]")).find(|div| {
                div.value().classes().any(|class| {
                    let class = class.to_ascii_lowercase();
                    ["content", "main", "body"].iter().any(|m| class.contains(m))
                })
            })
        })
        .or_else(|| html.select(&selector("article")).next())
        .or_else(|| html.select(&selector("body")).next())
        .unwrap_or_else(|| html.root_element())
}

struct Walker<'a> {
    base: &'a Url,
    out: MappedContent,
}

impl Walker<'_> {
    fn visit_children(&mut self, el: ElementRef<'_>) {
        for child in el.children().filter_map(ElementRef::wrap) {
            self.visit(child);
        }
    }

    fn visit(&mut self, el: ElementRef<'_>) {
        let name = el.value().name();
        if SKIPPED.contains(&name) {
            return;
        }

        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name[1..].parse().unwrap_or(3);
                let text = rich_text(el, self.base, false);
                if !text.is_blank() {
                    self.out.blocks.push(Block::heading(level, text));
                }
            },
            "p" => {
                let text = rich_text(el, self.base, false);
                if !text.is_blank() {
                    self.out.blocks.push(Block::paragraph(text));
                }
                for img in el.select(&selector("img")) {
                    self.image(img);
                }
            },
            "pre" => self.code(el),
            "img" => self.image(el),
            "ul" => self.list(el, false, 0),
            "ol" => self.list(el, true, 0),
            "blockquote" => {
                let text = rich_text(el, self.base, false);
                if !text.is_blank() {
                    self.out.blocks.push(Block::quote(text));
                }
            },
            "div" if has_math_class(el) => match latex_source(el) {
                Some(expr) => self.out.blocks.push(Block::equation(expr)),
                None => self.visit_children(el),
            },
            _ => self.visit_children(el),
        }
    }

    fn code(&mut self, pre: ElementRef<'_>) {
        let code = pre.select(&selector("code")).next();
        let raw: String = code.unwrap_or(pre).text().collect();
        let source = raw.strip_prefix('\n').unwrap_or(&raw).trim_end();
        if source.trim().is_empty() {
            return;
        }
        let language = code.and_then(language_of).or_else(|| {
            std::iter::successors(Some(pre), |el| el.parent().and_then(ElementRef::wrap))
                .take(3)
                .find_map(language_of)
        });
        self.out.blocks.push(Block::code(source, language));
    }

    fn image(&mut self, img: ElementRef<'_>) {
        let src = img
            .value()
            .attr("src")
            .or_else(|| img.value().attr("data-src"))
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let Some(src) = src else {
            self.issue("img", "missing src attribute");
            return;
        };

        match self.base.join(src) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                let caption = img
                    .value()
                    .attr("alt")
                    .map(collapse_whitespace)
                    .filter(|alt| !alt.is_empty());
                self.out.blocks.push(Block::image(url.as_str(), caption));
            },
            Ok(url) => self.issue("img", &format!("unsupported image scheme '{}'", url.scheme())),
            Err(err) => self.issue("img", &format!("unresolvable src '{src}': {err}")),
        }
    }

    fn list(&mut self, list: ElementRef<'_>, ordered: bool, depth: u8) {
        let items = list
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|child| child.value().name() == "li");

        for item in items {
            let text = rich_text(item, self.base, true);
            // An item holding only a nested list leaves its sublist in place
            let sub_depth = if text.is_blank() {
                depth
            } else {
                self.out.blocks.push(Block::list_item(ordered, depth, text));
                depth.saturating_add(1)
            };
            let mut nested = Vec::new();
            collect_lists(item, &mut nested);
            for sub in nested {
                let sub_ordered = sub.value().name() == "ol";
                self.list(sub, sub_ordered, sub_depth);
            }
        }
    }

    fn issue(&mut self, element: &str, reason: &str) {
        self.out.issues.push(MappingIssue {
            element: element.to_string(),
            reason: reason.to_string(),
        });
    }
}

/// Lists nested anywhere inside `el`, without descending into them.
fn collect_lists<'a>(el: ElementRef<'a>, out: &mut Vec<ElementRef<'a>>) {
    for child in el.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "ul" | "ol" => out.push(child),
            _ => collect_lists(child, out),
        }
    }
}

fn language_of(el: ElementRef<'_>) -> Option<String> {
    el.value().classes().find_map(|class| {
        ["language-", "lang-", "highlight-source-", "highlight-"]
            .iter()
            .find_map(|prefix| class.strip_prefix(prefix))
            .map(str::to_ascii_lowercase)
            .filter(|lang| !lang.is_empty() && !NON_LANGUAGES.contains(&lang.as_str()))
    })
}

fn has_math_class(el: ElementRef<'_>) -> bool {
    el.value().classes().any(|class| {
        let class = class.to_ascii_lowercase();
        ["math", "katex", "mathjax"].iter().any(|m| class.contains(m))
    })
}

fn latex_source(el: ElementRef<'_>) -> Option<String> {
    let attr = ["data-latex", "data-formula"]
        .iter()
        .find_map(|name| el.value().attr(name))
        .map(str::to_string);

    let annotation = || {
        el.select(&selector(r#"annotation[encoding="application/x-tex"]"#))
            .next()
            .map(|a| a.text().collect::<String>())
    };
    let script = || {
        el.select(&selector(r#"script[type^="math/tex"]"#))
            .next()
            .map(|s| s.text().collect::<String>())
    };
    let text = || {
        let text = collapse_whitespace(&el.text().collect::<String>());
        (text.contains('\\') || text.contains('$')).then_some(text)
    };

    attr.or_else(annotation)
        .or_else(script)
        .or_else(text)
        .map(|expr| strip_math_delimiters(expr.trim()))
        .filter(|expr| !expr.is_empty())
}

fn strip_math_delimiters(expr: &str) -> String {
    let pairs = [("$$", "$$"), ("\\[", "\\]"), ("\\(", "\\)"), ("$", "$")];
    pairs
        .iter()
        .find_map(|(open, close)| {
            expr.strip_prefix(open)
                .and_then(|rest| rest.strip_suffix(close))
        })
        .unwrap_or(expr)
        .trim()
        .to_string()
}

#[derive(Clone, Default)]
struct Style {
    bold: bool,
    italic: bool,
    code: bool,
    link: Option<String>,
}

/// Extract annotated text from an element.
///
/// With `skip_lists`, nested lists and code blocks are left out; list
/// mapping emits those separately.
fn rich_text(el: ElementRef<'_>, base: &Url, skip_lists: bool) -> RichText {
    let mut builder = RichTextBuilder {
        base,
        skip_lists,
        out: RichText::default(),
        ends_with_space: true,
    };
    builder.collect(el, &Style::default());
    builder.out.trim()
}

struct RichTextBuilder<'a> {
    base: &'a Url,
    skip_lists: bool,
    out: RichText,
    ends_with_space: bool,
}

impl RichTextBuilder<'_> {
    fn collect(&mut self, el: ElementRef<'_>, style: &Style) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => self.push_text(text, style),
                Node::Element(element) => {
                    let Some(child_el) = ElementRef::wrap(child) else {
                        continue;
                    };
                    let name = element.name();
                    match name {
                        "br" => self.push_raw("\n", style),
                        "img" => {},
                        _ if SKIPPED.contains(&name) => {},
                        "ul" | "ol" | "pre" if self.skip_lists => {},
                        "strong" | "b" => self.collect(child_el, &Style { bold: true, ..style.clone() }),
                        "em" | "i" => self.collect(child_el, &Style { italic: true, ..style.clone() }),
                        "code" | "kbd" | "samp" | "tt" => {
                            self.collect(child_el, &Style { code: true, ..style.clone() });
                        },
                        "a" => {
                            let link = element
                                .attr("href")
                                .and_then(|href| resolve_link(self.base, href))
                                .or_else(|| style.link.clone());
                            self.collect(child_el, &Style { link, ..style.clone() });
                        },
                        "p" | "div" | "li" | "blockquote" | "ul" | "ol" | "pre" => {
                            if !self.out.is_blank() && !self.ends_with_space {
                                self.push_raw("\n", style);
                            }
                            self.collect(child_el, style);
                        },
                        _ => self.collect(child_el, style),
                    }
                },
                _ => {},
            }
        }
    }

    fn push_text(&mut self, raw: &str, style: &Style) {
        let mut text = String::with_capacity(raw.len());
        for ch in raw.chars() {
            if ch.is_whitespace() {
                if !self.ends_with_space {
                    text.push(' ');
                    self.ends_with_space = true;
                }
            } else {
                text.push(ch);
                self.ends_with_space = false;
            }
        }
        self.push_span(text, style);
    }

    fn push_raw(&mut self, text: &str, style: &Style) {
        self.ends_with_space = true;
        self.push_span(text.to_string(), style);
    }

    fn push_span(&mut self, text: String, style: &Style) {
        self.out.push(TextSpan {
            text,
            bold: style.bold,
            italic: style.italic,
            code: style.code,
            link: style.link.clone(),
        });
    }
}

fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    let url = base.join(href).ok()?;
    matches!(url.scheme(), "http" | "https" | "mailto").then(|| url.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    const PAGE: &str = "https://octo.github.io/site/guide/intro.html";

    fn map(html: &str) -> MappedContent {
        let url = Url::parse(PAGE).unwrap();
        let doc = Document::parse(&url, html).unwrap();
        BlockMapper::new().map(&doc)
    }

    fn kinds(content: &MappedContent) -> Vec<&'static str> {
        content.blocks.iter().map(|b| b.kind.name()).collect()
    }

    #[test]
    fn test_deep_headings_become_level_three() {
        let content = map("<body><h1>A</h1><h4>B</h4><h5>C</h5><h6>D</h6></body>");
        let levels: Vec<_> = content.blocks.iter().map(Block::nesting_level).collect();
        assert_eq!(levels, vec![Some(1), Some(3), Some(3), Some(3)]);
    }

    #[test]
    fn test_paragraphs_are_trimmed_and_empty_ones_dropped() {
        let content = map("<body><p>   Hello\n   there  </p><p>   </p><p></p></body>");
        assert_eq!(content.blocks.len(), 1);
        assert_eq!(content.blocks[0].text.plain_text(), "Hello there");
    }

    #[test]
    fn test_main_is_preferred_content_root() {
        let content = map(
            "<body><header><p>Site header</p></header><main><p>Body text</p></main><footer><p>foot</p></footer></body>",
        );
        assert_eq!(content.blocks.len(), 1);
        assert_eq!(content.blocks[0].text.plain_text(), "Body text");
    }

    #[test]
    fn test_nav_and_scripts_are_skipped() {
        let content = map(
            "<body><nav><ul><li>Home</li></ul></nav><script>var x = 1;</script><p>Kept</p></body>",
        );
        assert_eq!(kinds(&content), vec!["paragraph"]);
    }

    #[test]
    fn test_code_language_from_class_and_wrapper() {
        let content = map(
            r#"<body>
            <pre><code class="language-rust">fn main() {}
</code></pre>
            <div class="language-python highlighter-rouge"><div class="highlight"><pre class="highlight"><code>print("hi")</code></pre></div></div>
            <pre>plain text</pre>
            </body>"#,
        );
        let langs: Vec<_> = content
            .blocks
            .iter()
            .map(|b| match &b.kind {
                BlockKind::Code { language } => language.clone(),
                other => panic!("expected code, got {other:?}"),
            })
            .collect();
        assert_eq!(
            langs,
            vec![Some("rust".to_string()), Some("python".to_string()), None]
        );
        assert_eq!(content.blocks[0].text.plain_text(), "fn main() {}");
    }

    #[test]
    fn test_images_resolve_against_base() {
        let content = map(
            r#"<body>
            <img src="../img/diagram.png" alt="A diagram">
            <p>See <img src="/site/logo.svg"></p>
            <img src="https://cdn.example.com/x.png">
            </body>"#,
        );
        let urls: Vec<_> = content
            .blocks
            .iter()
            .filter_map(|b| match &b.kind {
                BlockKind::Image { url } => Some(url.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://octo.github.io/site/img/diagram.png",
                "https://octo.github.io/site/logo.svg",
                "https://cdn.example.com/x.png",
            ]
        );
        assert_eq!(content.blocks[0].text.plain_text(), "A diagram");
    }

    #[test]
    fn test_bad_images_are_skipped_with_issues() {
        let content = map(
            r#"<body><p>before</p><img alt="no source"><img src="data:image/png;base64,AAAA"><p>after</p></body>"#,
        );
        assert_eq!(kinds(&content), vec!["paragraph", "paragraph"]);
        assert_eq!(content.issues.len(), 2);
        assert!(content.issues[0].reason.contains("missing src"));
        assert!(content.issues[1].reason.contains("data"));
    }

    #[test]
    fn test_lists_one_block_per_item_with_one_nesting_level() {
        let content = map(
            "<body><ul>
                <li>First</li>
                <li>Second
                    <ol><li>Inner one</li><li>Inner two<ul><li>Deepest</li></ul></li></ol>
                </li>
            </ul></body>",
        );
        let items: Vec<_> = content
            .blocks
            .iter()
            .map(|b| match b.kind {
                BlockKind::ListItem { ordered, depth } => (b.text.plain_text(), ordered, depth),
                _ => panic!("expected list item"),
            })
            .collect();
        assert_eq!(
            items,
            vec![
                ("First".to_string(), false, 0),
                ("Second".to_string(), false, 0),
                ("Inner one".to_string(), true, 1),
                ("Inner two".to_string(), true, 1),
                ("Deepest".to_string(), false, 1),
            ]
        );
    }

    #[test]
    fn test_item_with_only_a_sublist_keeps_its_items_at_top_level() {
        let content = map(
            "<body><ul>
                <li>Before</li>
                <li><ul><li>Lifted one</li><li>Lifted two</li></ul></li>
            </ul></body>",
        );
        let items: Vec<_> = content
            .blocks
            .iter()
            .map(|b| (b.text.plain_text(), b.nesting_level()))
            .collect();
        assert_eq!(
            items,
            vec![
                ("Before".to_string(), Some(0)),
                ("Lifted one".to_string(), Some(0)),
                ("Lifted two".to_string(), Some(0)),
            ]
        );
    }

    #[test]
    fn test_link_heavy_paragraph_is_split_to_fit() {
        let mut html = String::from("<body><p>");
        for i in 0..60 {
            html.push_str(&format!("text <a href=\"x{i}.html\">l{i}</a> "));
        }
        html.push_str("</p></body>");

        let content = map(&html);
        assert_eq!(kinds(&content), vec!["paragraph", "paragraph"]);
        assert!(
            content
                .blocks
                .iter()
                .all(|b| b.text.pieces().len() <= crate::blocks::MAX_TEXT_PIECES)
        );
        assert!(content.issues.is_empty());
    }

    #[test]
    fn test_oversized_equation_and_image_url() {
        let long_expr = format!("x = {}", "a + ".repeat(300));
        let long_src = format!("https://cdn.example.com/{}.png", "p".repeat(MAX_URL_LEN));
        let content = map(&format!(
            r#"<body><div class="math" data-latex="{long_expr}"></div><img src="{long_src}"><p>kept</p></body>"#
        ));

        assert_eq!(kinds(&content), vec!["code", "paragraph"]);
        assert_eq!(
            content.blocks[0].kind,
            BlockKind::Code {
                language: Some("latex".into())
            }
        );
        assert!(content.blocks[0].text.plain_text().starts_with("x = a +"));
        assert_eq!(content.issues.len(), 1);
        assert!(content.issues[0].reason.contains("longer than"));
    }

    #[test]
    fn test_rich_text_annotations() {
        let content = map(
            r##"<body><p>Use <strong>bold</strong>, <em>italic</em>, <code>code</code>
            and <a href="../api.html">a link</a> or <a href="#top">anchor</a>.<br>Next line</p></body>"##,
        );
        let spans = content.blocks[0].text.spans();
        assert!(spans.iter().any(|s| s.bold && s.text == "bold"));
        assert!(spans.iter().any(|s| s.italic && s.text == "italic"));
        assert!(spans.iter().any(|s| s.code && s.text == "code"));
        let link = spans.iter().find(|s| s.text == "a link").unwrap();
        assert_eq!(link.link.as_deref(), Some("https://octo.github.io/site/api.html"));
        let anchor = spans.iter().find(|s| s.text.contains("anchor")).unwrap();
        assert!(anchor.link.is_none());
        assert!(content.blocks[0].text.plain_text().contains(".\nNext line"));
    }

    #[test]
    fn test_math_divs_become_equations() {
        let content = map(
            r#"<body>
            <div class="math" data-latex="E = mc^2"></div>
            <div class="math notranslate nohighlight">\[\int_0^1 x\,dx\]</div>
            <div class="katex-block"><annotation encoding="application/x-tex">a^2+b^2</annotation></div>
            <div class="mathjax-wrapper"><p>No formula here</p></div>
            </body>"#,
        );
        let exprs: Vec<_> = content
            .blocks
            .iter()
            .map(|b| match &b.kind {
                BlockKind::Equation { expression } => expression.clone(),
                _ => format!("<{}>", b.kind.name()),
            })
            .collect();
        assert_eq!(
            exprs,
            vec!["E = mc^2", r"\int_0^1 x\,dx", "a^2+b^2", "<paragraph>"]
        );
    }

    #[test]
    fn test_unrecognized_elements_are_descended() {
        let content = map(
            "<body><section><div><span>loose text</span><p>In section</p></div></section><table><tr><td><p>Cell</p></td></tr></table></body>",
        );
        let texts: Vec<_> = content.blocks.iter().map(|b| b.text.plain_text()).collect();
        assert_eq!(texts, vec!["In section", "Cell"]);
    }

    #[test]
    fn test_mapping_is_deterministic() {
        let html = "<body><h2>T</h2><p>x <b>y</b></p><ul><li>z</li></ul></body>";
        assert_eq!(map(html).blocks, map(html).blocks);
    }
}
