//! Block records: the unit of page content written to the remote store.
//!
//! A page's content is an ordered sequence of [`Block`]s. Order is
//! significant and is preserved through batching: concatenating the batches
//! produced by [`batches`] always yields the original sequence.

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Highest heading level a block can carry.
pub const MAX_HEADING_LEVEL: u8 = 3;

/// Deepest list nesting preserved.
pub const MAX_LIST_DEPTH: u8 = 1;

/// Longest text one rich-text piece may hold.
pub const MAX_TEXT_LEN: usize = 2000;

/// Most rich-text pieces one block may carry.
pub const MAX_TEXT_PIECES: usize = 100;

/// Longest equation expression.
pub const MAX_EXPRESSION_LEN: usize = 1000;

/// Longest image or link URL.
pub const MAX_URL_LEN: usize = 2000;

/// A run of text sharing the same annotations.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TextSpan {
    /// Text content.
    pub text: String,
    /// Bold annotation.
    #[serde(default, skip_serializing_if = "is_false")]
    pub bold: bool,
    /// Italic annotation.
    #[serde(default, skip_serializing_if = "is_false")]
    pub italic: bool,
    /// Inline code annotation.
    #[serde(default, skip_serializing_if = "is_false")]
    pub code: bool,
    /// Absolute link target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(value: &bool) -> bool {
    !*value
}

impl TextSpan {
    /// Plain, unannotated text.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Split into spans of at most `max` characters with the same style.
    pub fn split(&self, max: usize) -> Vec<Self> {
        let chars: Vec<char> = self.text.chars().collect();
        chars
            .chunks(max.max(1))
            .map(|chunk| Self {
                text: chunk.iter().collect(),
                ..self.clone()
            })
            .collect()
    }

    fn same_style(&self, other: &Self) -> bool {
        self.bold == other.bold
            && self.italic == other.italic
            && self.code == other.code
            && self.link == other.link
    }
}

/// Rich text: an ordered list of spans.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RichText(pub Vec<TextSpan>);

impl RichText {
    /// Rich text holding a single plain span.
    pub fn plain(text: impl Into<String>) -> Self {
        Self(vec![TextSpan::plain(text)])
    }

    /// Concatenated text without annotations.
    pub fn plain_text(&self) -> String {
        self.0.iter().map(|s| s.text.as_str()).collect()
    }

    /// Whether the text contains nothing but whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.iter().all(|s| s.text.trim().is_empty())
    }

    /// Spans in order.
    pub fn spans(&self) -> &[TextSpan] {
        &self.0
    }

    /// Spans cut to at most [`MAX_TEXT_LEN`] characters each.
    pub fn pieces(&self) -> Vec<TextSpan> {
        self.0.iter().flat_map(|span| span.split(MAX_TEXT_LEN)).collect()
    }

    /// Append a span, merging it into the previous one when the annotations
    /// match.
    pub fn push(&mut self, span: TextSpan) {
        if span.text.is_empty() {
            return;
        }
        match self.0.last_mut() {
            Some(last) if last.same_style(&span) => last.text.push_str(&span.text),
            _ => self.0.push(span),
        }
    }

    /// Trim leading whitespace of the first span and trailing whitespace of
    /// the last, dropping spans that become empty.
    pub fn trim(mut self) -> Self {
        while let Some(first) = self.0.first_mut() {
            let trimmed = first.text.trim_start().to_string();
            if trimmed.is_empty() {
                self.0.remove(0);
            } else {
                first.text = trimmed;
                break;
            }
        }
        while let Some(last) = self.0.last_mut() {
            let trimmed = last.text.trim_end().to_string();
            if trimmed.is_empty() {
                self.0.pop();
            } else {
                last.text = trimmed;
                break;
            }
        }
        self
    }
}

/// Kind of a block, with kind-specific attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockKind {
    /// Section heading; level is 1..=3.
    Heading {
        /// Heading level after clamping.
        level: u8,
    },
    /// Prose paragraph.
    Paragraph,
    /// Preformatted code.
    Code {
        /// Language tag, when one could be detected.
        language: Option<String>,
    },
    /// Externally hosted image.
    Image {
        /// Absolute image URL.
        url: String,
    },
    /// List item; depth is 0 or 1.
    ListItem {
        /// Numbered rather than bulleted.
        ordered: bool,
        /// Nesting depth.
        depth: u8,
    },
    /// Block quotation.
    Quote,
    /// Display math.
    Equation {
        /// LaTeX expression.
        expression: String,
    },
}

impl BlockKind {
    /// Short name used in logs and previews.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Heading { .. } => "heading",
            Self::Paragraph => "paragraph",
            Self::Code { .. } => "code",
            Self::Image { .. } => "image",
            Self::ListItem { .. } => "list_item",
            Self::Quote => "quote",
            Self::Equation { .. } => "equation",
        }
    }
}

/// One unit of page content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Kind and kind-specific attributes.
    #[serde(flatten)]
    pub kind: BlockKind,
    /// Text payload (caption for images, empty for equations).
    pub text: RichText,
}

impl Block {
    /// Heading block; levels above [`MAX_HEADING_LEVEL`] are clamped.
    pub fn heading(level: u8, text: RichText) -> Self {
        Self {
            kind: BlockKind::Heading {
                level: level.clamp(1, MAX_HEADING_LEVEL),
            },
            text,
        }
    }

    /// Paragraph block.
    pub const fn paragraph(text: RichText) -> Self {
        Self {
            kind: BlockKind::Paragraph,
            text,
        }
    }

    /// Code block with raw text.
    pub fn code(source: impl Into<String>, language: Option<String>) -> Self {
        Self {
            kind: BlockKind::Code { language },
            text: RichText::plain(source),
        }
    }

    /// Image block with an optional caption.
    pub fn image(url: impl Into<String>, caption: Option<String>) -> Self {
        Self {
            kind: BlockKind::Image { url: url.into() },
            text: caption.map(RichText::plain).unwrap_or_default(),
        }
    }

    /// List item; depths beyond [`MAX_LIST_DEPTH`] are flattened.
    pub fn list_item(ordered: bool, depth: u8, text: RichText) -> Self {
        Self {
            kind: BlockKind::ListItem {
                ordered,
                depth: depth.min(MAX_LIST_DEPTH),
            },
            text,
        }
    }

    /// Quote block.
    pub const fn quote(text: RichText) -> Self {
        Self {
            kind: BlockKind::Quote,
            text,
        }
    }

    /// Equation block.
    pub fn equation(expression: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Equation {
                expression: expression.into(),
            },
            text: RichText::default(),
        }
    }

    /// Nesting level: heading level, list depth, or `None`.
    pub const fn nesting_level(&self) -> Option<u8> {
        match self.kind {
            BlockKind::Heading { level } => Some(level),
            BlockKind::ListItem { depth, .. } => Some(depth),
            _ => None,
        }
    }

    /// Whether this is a nested (depth > 0) list item.
    pub const fn is_nested_item(&self) -> bool {
        matches!(self.kind, BlockKind::ListItem { depth, .. } if depth > 0)
    }

    /// Split into consecutive blocks of the same kind whose text fits in
    /// [`MAX_TEXT_PIECES`] pieces.
    ///
    /// Links longer than [`MAX_URL_LEN`] are dropped, keeping their text. An
    /// image keeps only the caption that fits.
    pub fn split_to_fit(self) -> Vec<Self> {
        let mut text = RichText::default();
        for mut span in self.text.0 {
            if span
                .link
                .as_ref()
                .is_some_and(|link| link.chars().count() > MAX_URL_LEN)
            {
                span.link = None;
            }
            text.push(span);
        }

        let pieces = text.pieces();
        if pieces.len() <= MAX_TEXT_PIECES {
            return vec![Self {
                kind: self.kind,
                text,
            }];
        }

        let mut parts: Vec<Self> = pieces
            .chunks(MAX_TEXT_PIECES)
            .map(|group| Self {
                kind: self.kind.clone(),
                text: RichText(group.to_vec()),
            })
            .collect();
        if matches!(self.kind, BlockKind::Image { .. }) {
            parts.truncate(1);
        }
        parts
    }
}

/// Split blocks into ordered batches of at most `size` blocks.
///
/// A nested list item is kept in the same batch as the top-level item it
/// belongs to whenever the cut can move back without emptying the batch.
pub fn batches(blocks: &[Block], size: usize) -> Vec<&[Block]> {
    let size = size.max(1);
    let mut out = Vec::with_capacity(blocks.len().div_ceil(size));
    let mut start = 0;

    while start < blocks.len() {
        let mut end = (start + size).min(blocks.len());
        if end < blocks.len() && blocks[end].is_nested_item() {
            // Walk back to the owning top-level item.
            let mut cut = end;
            while cut > start && blocks[cut].is_nested_item() {
                cut -= 1;
            }
            let owner_is_item = matches!(blocks[cut].kind, BlockKind::ListItem { depth: 0, .. });
            if cut > start && owner_is_item {
                end = cut;
            }
        }
        out.push(&blocks[start..end]);
        start = end;
    }
    out
}

/// SHA-256 of the canonical JSON form of a block sequence, base64-encoded.
pub fn checksum(blocks: &[Block]) -> String {
    let mut hasher = Sha256::new();
    for block in blocks {
        // Serialization of these plain data types cannot fail.
        let json = serde_json::to_vec(block).unwrap_or_default();
        hasher.update(&json);
        hasher.update(b"\n");
    }
    STANDARD.encode(hasher.finalize())
}
