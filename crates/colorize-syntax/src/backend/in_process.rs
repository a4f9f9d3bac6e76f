//! In-process colorizing with arborium's tree-sitter grammars.

use std::sync::Arc;

use arborium::{GrammarStore, Highlighter};
use arborium_theme::highlights::tag_for_capture;
use tracing::debug;

use super::Backend;
use crate::error::ColorizeError;

/// Backend that highlights with statically linked tree-sitter grammars.
///
/// Output uses arborium's short tags as class names, e.g.
/// `<span class="c"># comment</span>`. Languages without a compiled grammar
/// come out as escaped plain text; any other highlighter failure is an error.
pub struct ArboriumBackend {
    highlighter: Highlighter,
}

impl Default for ArboriumBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ArboriumBackend {
    pub fn new() -> Self {
        Self {
            highlighter: Highlighter::new(),
        }
    }

    /// Create a backend sharing compiled grammars with others.
    pub fn with_store(store: Arc<GrammarStore>) -> Self {
        Self {
            highlighter: Highlighter::with_store(store),
        }
    }
}

impl Backend for ArboriumBackend {
    fn supports(&mut self, language: &str) -> bool {
        self.highlighter.store().get(language).is_some()
    }

    fn colorize(&mut self, source: &str, language: &str) -> Result<String, ColorizeError> {
        if !self.supports(language) {
            debug!(language, "no grammar, leaving code unhighlighted");
            return Ok(html_escape::encode_text(source).into_owned());
        }

        let spans = self
            .highlighter
            .highlight_spans(language, source)
            .map_err(|e| ColorizeError::Highlight {
                language: language.to_string(),
                message: e.to_string(),
            })?;

        let tagged = spans
            .into_iter()
            .filter_map(|span| {
                tag_for_capture(&span.capture).map(|tag| TaggedSpan {
                    start: span.start as usize,
                    end: span.end as usize,
                    tag,
                })
            })
            .collect();

        Ok(render(source, tagged))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TaggedSpan {
    start: usize,
    end: usize,
    tag: &'static str,
}

/// Render spans as nested `<span class>` elements.
///
/// Spans that straddle an already open span are dropped, as are spans that
/// would nest inside a span with the same tag. When several spans cover the
/// exact same range, the last one reported wins.
fn render(source: &str, mut spans: Vec<TaggedSpan>) -> String {
    let len = source.len();
    spans.retain(|s| s.start < s.end && s.end <= len);

    // Sort by (start, -end), stable so later duplicates stay after earlier ones.
    spans.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| b.end.cmp(&a.end)));
    let mut deduped: Vec<TaggedSpan> = Vec::with_capacity(spans.len());
    for span in spans {
        match deduped.last_mut() {
            Some(last) if last.start == span.start && last.end == span.end => *last = span,
            _ => deduped.push(span),
        }
    }

    let mut out = String::with_capacity(len + deduped.len() * 24);
    let mut cursor = 0;
    let mut open: Vec<TaggedSpan> = Vec::new();

    for span in deduped {
        while let Some(top) = open.last().copied() {
            if top.end > span.start {
                break;
            }
            push_text(&mut out, source, cursor, top.end);
            out.push_str("</span>");
            cursor = top.end;
            open.pop();
        }

        if span.start < cursor {
            continue;
        }
        if let Some(top) = open.last()
            && (span.end > top.end || span.tag == top.tag)
        {
            continue;
        }

        push_text(&mut out, source, cursor, span.start);
        cursor = span.start;
        out.push_str("<span class=\"");
        out.push_str(span.tag);
        out.push_str("\">");
        open.push(span);
    }

    while let Some(top) = open.pop() {
        push_text(&mut out, source, cursor, top.end);
        out.push_str("</span>");
        cursor = top.end;
    }
    push_text(&mut out, source, cursor, len);

    out
}

fn push_text(out: &mut String, source: &str, start: usize, end: usize) {
    if let Some(text) = source.get(start..end) {
        out.push_str(&html_escape::encode_text(text));
    }
}
