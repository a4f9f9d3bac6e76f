//! Finding code blocks in a document and putting colorized markup back.
//!
//! The document is streamed through `lol_html` twice. The first pass only
//! collects code blocks (class attribute and text). Every block is then
//! resolved and colorized in document order, so any fatal error surfaces
//! before a single byte of output exists. The second pass swaps in the
//! fragments and normalizes void elements for the requested syntax.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use lol_html::html_content::{ContentType, Element};
use lol_html::{RewriteStrSettings, element, rewrite_str, text};
use tracing::debug;

use crate::error::ColorizeError;
use crate::language::{self, ResolvedLanguage};
use crate::options::SyntaxMode;
use crate::registry::Registry;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Outcome of colorizing one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Colorized {
    /// The rewritten document.
    pub html: String,
    /// Blocks whose content was replaced.
    pub blocks_colorized: usize,
    /// Blocks left alone because no language could be determined.
    pub blocks_skipped: usize,
}

/// A code element as found by the first pass.
#[derive(Debug, Default)]
struct Block {
    class: Option<String>,
    /// Source text, entities still encoded.
    raw_text: String,
}

/// How many matched elements are open, shared with their end tag handlers.
///
/// A code element inside another one is part of the outer block, not a block
/// of its own.
#[derive(Debug, Default)]
struct Nesting(Rc<Cell<usize>>);

impl Nesting {
    /// Enter `el`; returns whether it sits inside another matched element.
    fn enter(&self, el: &mut Element<'_, '_>) -> bool {
        let nested = self.0.get() > 0;
        if let Some(handlers) = el.end_tag_handlers() {
            self.0.set(self.0.get() + 1);
            let depth = self.0.clone();
            handlers.push(Box::new(move |_end| {
                depth.set(depth.get().saturating_sub(1));
                Ok(())
            }));
        }
        nested
    }
}

/// What goes back into a colorized block.
#[derive(Debug)]
struct Replacement {
    /// New class attribute, when it differs from the old one.
    class: Option<String>,
    fragment: String,
}

/// Colorize every eligible code block of `input`.
pub fn colorize_document(input: &str, registry: &mut Registry) -> Result<Colorized, ColorizeError> {
    let syntax = registry.options().syntax;
    let selector = if registry.options().outside_pre {
        "code"
    } else {
        "pre code"
    };

    let blocks = collect_blocks(input, selector)?;

    let mut plan = Vec::with_capacity(blocks.len());
    let mut blocks_skipped = 0;
    for (index, block) in blocks.iter().enumerate() {
        let replacement = plan_block(block, registry)?;
        if replacement.is_none() {
            debug!(index, "no language for code block, leaving it as is");
            blocks_skipped += 1;
        }
        plan.push(replacement);
    }
    let blocks_colorized = plan.len() - blocks_skipped;

    let html = apply(input, selector, syntax, plan)?;

    Ok(Colorized {
        html,
        blocks_colorized,
        blocks_skipped,
    })
}

fn collect_blocks(input: &str, selector: &str) -> Result<Vec<Block>, ColorizeError> {
    let blocks = RefCell::new(Vec::<Block>::new());
    let nesting = Nesting::default();

    rewrite_str(
        input,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!(selector, |el| {
                    if nesting.enter(el) {
                        return Ok(());
                    }
                    blocks.borrow_mut().push(Block {
                        class: el.get_attribute("class"),
                        raw_text: String::new(),
                    });
                    Ok(())
                }),
                text!(selector, |chunk| {
                    // Nested elements push no block, so this is the outermost.
                    if let Some(block) = blocks.borrow_mut().last_mut() {
                        block.raw_text.push_str(chunk.as_str());
                    }
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::new()
        },
    )?;

    Ok(blocks.into_inner())
}

fn plan_block(block: &Block, registry: &mut Registry) -> Result<Option<Replacement>, ColorizeError> {
    let text = html_escape::decode_html_entities(&block.raw_text);
    let class = block.class.as_deref();

    let resolved = language::resolve(class, &text, |name| registry.recognizes(name))?;
    let Some(ResolvedLanguage { name, origin }) = resolved else {
        return Ok(None);
    };
    debug!(language = %name, ?origin, "resolved code block language");

    let fragment = registry.colorize(language::source_for(&text, origin), &name)?;

    let new_class = language::ensure_language_class(class, &name);
    let class = (class != Some(new_class.as_str())).then_some(new_class);

    Ok(Some(Replacement { class, fragment }))
}

fn apply(
    input: &str,
    selector: &str,
    syntax: SyntaxMode,
    plan: Vec<Option<Replacement>>,
) -> Result<String, ColorizeError> {
    let mut plan = plan.into_iter();
    let nesting = Nesting::default();

    let html = rewrite_str(
        input,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!(selector, |el| {
                    if nesting.enter(el) {
                        return Ok(());
                    }
                    // Both passes see the same outer elements in the same order.
                    if let Some(Some(replacement)) = plan.next() {
                        if let Some(class) = &replacement.class {
                            el.set_attribute("class", class)?;
                        }
                        el.set_inner_content(&replacement.fragment, ContentType::Html);
                    }
                    Ok(())
                }),
                element!("*", |el| {
                    normalize_void(el, syntax);
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::new()
        },
    )?;

    Ok(html)
}

/// Rewrite a void element's tag the way `syntax` closes it.
///
/// `xml` only touches tags that were written self-closing, since an XML
/// vocabulary may use a name like `link` for an element with content.
fn normalize_void(el: &mut Element<'_, '_>, syntax: SyntaxMode) {
    let name = el.tag_name();
    if !VOID_ELEMENTS.contains(&name.to_ascii_lowercase().as_str()) {
        return;
    }

    let closing = match syntax {
        SyntaxMode::Html if el.is_self_closing() => ">",
        SyntaxMode::Xhtml => " />",
        SyntaxMode::Xml if el.is_self_closing() => "/>",
        _ => return,
    };

    let mut tag = format!("<{name}");
    for attr in el.attributes() {
        tag.push(' ');
        tag.push_str(&attr.name());
        tag.push_str("=\"");
        tag.push_str(&attr.value().replace('"', "&quot;"));
        tag.push('"');
    }
    tag.push_str(closing);

    el.replace(&tag, ContentType::Html);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ColorizeOptions;

    fn run(input: &str, options: ColorizeOptions) -> Colorized {
        let mut registry = Registry::new(options);
        colorize_document(input, &mut registry).unwrap()
    }

    #[test]
    fn test_document_without_code_passes_through() {
        let input = "<p title=\"a &amp; b\">Hello <em>world</em></p>";
        let out = run(input, ColorizeOptions::new());
        assert_eq!(out.html, input);
        assert_eq!(out.blocks_colorized, 0);
        assert_eq!(out.blocks_skipped, 0);
    }

    #[test]
    fn test_block_without_language_is_untouched() {
        let input = "<pre><code>#!/usr/bin/env ruby\nputs 1 &lt; 2</code></pre>";
        let out = run(input, ColorizeOptions::new());
        assert_eq!(out.html, input);
        assert_eq!(out.blocks_skipped, 1);
    }

    #[test]
    fn test_code_outside_pre_is_ignored_by_default() {
        let input = "<p><code class=\"language-klingon\">qapla'</code></p>";
        let out = run(input, ColorizeOptions::new());
        assert_eq!(out.html, input);
        assert_eq!(out.blocks_colorized, 0);
    }

    #[test]
    fn test_outside_pre_colorizes_inline_code() {
        // No grammar for klingon: the text comes back escaped, class kept.
        let input = "<p><code class=\"language-klingon\">a &lt; b</code></p>";
        let out = run(input, ColorizeOptions::new().with_outside_pre(true));
        assert_eq!(out.html, input);
        assert_eq!(out.blocks_colorized, 1);
    }

    #[test]
    fn test_nested_code_belongs_to_outer_block() {
        let input = "<pre><code class=\"language-klingon\">a<code>b</code>c</code></pre>\
                     <pre><code class=\"language-klingon\">d</code></pre>";
        let out = run(input, ColorizeOptions::new());
        assert_eq!(
            out.html,
            "<pre><code class=\"language-klingon\">abc</code></pre>\
             <pre><code class=\"language-klingon\">d</code></pre>"
        );
        assert_eq!(out.blocks_colorized, 2);
        assert_eq!(out.blocks_skipped, 0);
    }

    #[test]
    fn test_void_elements_per_syntax() {
        let input = "<p>a<br/>b<br>c<img src=\"x.png\" alt=\"\"></p>";

        let html = run(input, ColorizeOptions::new()).html;
        assert_eq!(html, "<p>a<br>b<br>c<img src=\"x.png\" alt=\"\"></p>");

        let xhtml = run(input, ColorizeOptions::new().with_syntax(SyntaxMode::Xhtml)).html;
        assert_eq!(xhtml, "<p>a<br />b<br />c<img src=\"x.png\" alt=\"\" /></p>");

        let xml = run(input, ColorizeOptions::new().with_syntax(SyntaxMode::Xml)).html;
        assert_eq!(xml, "<p>a<br/>b<br>c<img src=\"x.png\" alt=\"\"></p>");
    }

    #[test]
    fn test_fatal_error_produces_no_output() {
        let input = "<pre><code class=\"language-ruby\">x</code></pre>";
        let options = ColorizeOptions::new().with_default_colorizer("coderay");
        let mut registry = Registry::new(options);
        assert!(colorize_document(input, &mut registry).is_err());
    }
}
