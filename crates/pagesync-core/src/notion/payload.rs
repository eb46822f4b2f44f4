//! JSON payloads for the Notion API.

use crate::blocks::{Block, BlockKind, MAX_TEXT_PIECES, RichText, TextSpan};
use crate::classify::ContentType;
use crate::store::PageProperties;
use serde_json::{Map, Value, json};

/// Property names in the site database.
pub mod property {
    /// Title property.
    pub const NAME: &str = "Name";
    /// Source URL property.
    pub const URL: &str = "URL";
    /// Last-synced date property.
    pub const LAST_UPDATED: &str = "Last Updated";
    /// Content type select property.
    pub const CONTENT_TYPE: &str = "Content Type";
}

/// Languages accepted by Notion code blocks.
const NOTION_LANGUAGES: &[&str] = &[
    "abap", "arduino", "bash", "basic", "c", "clojure", "coffeescript", "c++", "c#", "css",
    "dart", "diff", "docker", "elixir", "elm", "erlang", "flow", "fortran", "f#", "gherkin",
    "glsl", "go", "graphql", "groovy", "haskell", "html", "java", "javascript", "json", "julia",
    "kotlin", "latex", "less", "lisp", "livescript", "lua", "makefile", "markdown", "markup",
    "matlab", "mermaid", "nix", "objective-c", "ocaml", "pascal", "perl", "php", "plain text",
    "powershell", "prolog", "protobuf", "python", "r", "reason", "ruby", "rust", "sass",
    "scala", "scheme", "scss", "shell", "solidity", "sql", "swift", "typescript", "vb.net",
    "verilog", "vhdl", "visual basic", "webassembly", "xml", "yaml",
];

/// Map a detected language tag onto Notion's language list.
pub fn notion_language(language: Option<&str>) -> &'static str {
    let Some(lang) = language.map(str::to_ascii_lowercase) else {
        return "plain text";
    };
    let canonical = match lang.as_str() {
        "py" | "python3" | "ipython" | "ipython3" | "pycon" => "python",
        "js" | "jsx" | "mjs" | "node" => "javascript",
        "ts" | "tsx" => "typescript",
        "sh" | "zsh" | "console" | "shell-session" | "shellsession" => "shell",
        "yml" => "yaml",
        "rs" => "rust",
        "cpp" | "cxx" | "cc" | "hpp" => "c++",
        "cs" | "csharp" => "c#",
        "fs" | "fsharp" => "f#",
        "golang" => "go",
        "md" => "markdown",
        "dockerfile" => "docker",
        "objc" | "objectivec" => "objective-c",
        "jl" => "julia",
        "kt" => "kotlin",
        "rb" => "ruby",
        "ps1" | "pwsh" => "powershell",
        "tex" => "latex",
        "proto" => "protobuf",
        "htm" | "xhtml" => "html",
        "make" => "makefile",
        "toml" | "ini" | "cfg" => "plain text",
        other => other,
    };
    NOTION_LANGUAGES
        .iter()
        .find(|known| **known == canonical)
        .copied()
        .unwrap_or("plain text")
}

fn span_json(span: &TextSpan) -> Value {
    json!({
        "type": "text",
        "text": {
            "content": span.text,
            "link": span.link.as_ref().map(|url| json!({ "url": url })),
        },
        "annotations": {
            "bold": span.bold,
            "italic": span.italic,
            "code": span.code,
            "strikethrough": false,
            "underline": false,
            "color": "default",
        },
    })
}

/// Rich-text array of the text's [`RichText::pieces`].
///
/// Mapped blocks already fit [`MAX_TEXT_PIECES`] (see
/// [`Block::split_to_fit`]); anything past the limit is cut here.
pub fn rich_text(text: &RichText) -> Vec<Value> {
    text.pieces()
        .iter()
        .take(MAX_TEXT_PIECES)
        .map(span_json)
        .collect()
}

fn plain_rich_text(text: &str) -> Vec<Value> {
    rich_text(&RichText::plain(text))
}

fn typed_block(kind: &str, body: Value) -> Value {
    let mut block = Map::new();
    block.insert("object".into(), json!("block"));
    block.insert("type".into(), json!(kind));
    block.insert(kind.to_string(), body);
    Value::Object(block)
}

/// JSON for a single block, without children.
pub fn block(block: &Block) -> Value {
    match &block.kind {
        BlockKind::Heading { level } => typed_block(
            &format!("heading_{level}"),
            json!({ "rich_text": rich_text(&block.text) }),
        ),
        BlockKind::Paragraph => {
            typed_block("paragraph", json!({ "rich_text": rich_text(&block.text) }))
        },
        BlockKind::Code { language } => typed_block(
            "code",
            json!({
                "rich_text": rich_text(&block.text),
                "language": notion_language(language.as_deref()),
            }),
        ),
        BlockKind::Image { url } => typed_block(
            "image",
            json!({
                "type": "external",
                "external": { "url": url },
                "caption": rich_text(&block.text),
            }),
        ),
        BlockKind::ListItem { ordered, .. } => typed_block(
            if *ordered {
                "numbered_list_item"
            } else {
                "bulleted_list_item"
            },
            json!({ "rich_text": rich_text(&block.text) }),
        ),
        BlockKind::Quote => typed_block("quote", json!({ "rich_text": rich_text(&block.text) })),
        BlockKind::Equation { expression } => {
            typed_block("equation", json!({ "expression": expression }))
        },
    }
}

/// JSON `children` array for one append batch.
///
/// Nested list items become `children` of the preceding top-level item in
/// the batch; without one they are sent at top level.
pub fn children(blocks: &[Block]) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(blocks.len());
    let mut owner: Option<usize> = None;

    for item in blocks {
        let value = block(item);
        match (item.is_nested_item(), owner) {
            (true, Some(index)) => {
                let kind = block_type(&out[index]);
                if let Some(Value::Array(nested)) = out[index]
                    .get_mut(&kind)
                    .and_then(Value::as_object_mut)
                    .map(|body| body.entry("children").or_insert_with(|| json!([])))
                {
                    nested.push(value);
                }
            },
            _ => {
                owner = matches!(item.kind, BlockKind::ListItem { depth: 0, .. })
                    .then_some(out.len());
                out.push(value);
            },
        }
    }
    out
}

fn block_type(value: &Value) -> String {
    value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Caption of the bookmark that records a nested page's source URL.
pub const SOURCE_CAPTION: &str = "Synced from";

/// Bookmark block recording the source URL of a nested page.
///
/// Nested pages only carry a title, so this block is what identifies them
/// on later runs. It is written first and survives content clears.
pub fn source_marker(url: &str) -> Value {
    typed_block(
        "bookmark",
        json!({ "url": url, "caption": plain_rich_text(SOURCE_CAPTION) }),
    )
}

/// Source URL held by `block` when it is a [`source_marker`].
pub fn marker_url(block: &Value) -> Option<&str> {
    if block.get("type")?.as_str()? != "bookmark" {
        return None;
    }
    let body = block.get("bookmark")?;
    if plain_text(&body["caption"]) != SOURCE_CAPTION {
        return None;
    }
    body.get("url")?.as_str()
}

/// Database schema with the four synced properties.
pub fn database_properties() -> Value {
    let options: Vec<Value> = ContentType::ALL
        .iter()
        .map(|ct| json!({ "name": ct.as_str(), "color": ct.color() }))
        .collect();
    json!({
        property::NAME: { "title": {} },
        property::URL: { "url": {} },
        property::LAST_UPDATED: { "date": {} },
        property::CONTENT_TYPE: { "select": { "options": options } },
    })
}

/// Properties for a page: all four for database entries, title only for
/// nested pages.
pub fn page_properties(props: &PageProperties, nested: bool) -> Value {
    if nested {
        return json!({ "title": { "title": plain_rich_text(&props.title) } });
    }
    json!({
        property::NAME: { "title": plain_rich_text(&props.title) },
        property::URL: { "url": props.url },
        property::LAST_UPDATED: { "date": { "start": props.last_synced.to_rfc3339() } },
        property::CONTENT_TYPE: { "select": { "name": props.content_type.as_str() } },
    })
}

/// Plain text of a Notion title or rich-text array.
pub fn plain_text(array: &Value) -> String {
    array
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    item.get("plain_text")
                        .or_else(|| item.pointer("/text/content"))
                        .and_then(Value::as_str)
                })
                .collect()
        })
        .unwrap_or_default()
}
