//! Syntax highlight the code blocks of an HTML, XHTML or XML document.
//!
//! Every `<pre><code>` block whose language can be determined has its
//! content replaced by colorized markup. The language comes from a
//! `language-<name>` class, or from a `#!<name>` first line that is then
//! removed:
//!
//! ```html
//! <pre><code>#!ruby
//! puts "hello"
//! </code></pre>
//! ```
//!
//! Colorizing happens in-process with arborium's tree-sitter grammars, or by
//! piping the code through `pygmentize` or André Simon's `highlight`, chosen
//! per language through [`ColorizeOptions`].
//!
//! # Usage
//!
//! ```no_run
//! use colorize_syntax::{ColorizeOptions, colorize};
//!
//! let html = r#"<pre><code class="language-ruby"># comment</code></pre>"#;
//! let out = colorize(html, &ColorizeOptions::new()).unwrap();
//! assert_eq!(
//!     out,
//!     r#"<pre><code class="language-ruby"><span class="c"># comment</span></code></pre>"#
//! );
//! ```
//!
//! Any failure (unknown colorizer, missing executable, failing highlighter)
//! aborts the whole document; there is no partially colorized output.

mod backend;
mod document;
mod error;
mod language;
mod options;
mod processor;
mod registry;

use std::sync::Arc;

use arborium::GrammarStore;

pub use backend::ExternalTool;
pub use document::Colorized;
pub use error::{ColorizeError, ErrorKind, ToolError};
pub use language::{LanguageOrigin, ResolvedLanguage};
pub use options::{ColorizeOptions, ProcessSettings, SyntaxMode};
pub use processor::{FileFailure, ProcessError, ProcessOptions, Processor, ProcessorStats};
pub use registry::Colorizer;

use crate::registry::Registry;

/// Colorizes documents with one set of options.
///
/// Backends are created on first use and kept, so colorizing many documents
/// with the same instance compiles each grammar once.
pub struct SyntaxColorizer {
    registry: Registry,
}

impl SyntaxColorizer {
    pub fn new(options: ColorizeOptions) -> Self {
        Self {
            registry: Registry::new(options),
        }
    }

    /// Share compiled grammars with other colorizers, e.g. one per thread.
    pub fn with_store(options: ColorizeOptions, store: Arc<GrammarStore>) -> Self {
        Self {
            registry: Registry::with_store(options, store),
        }
    }

    pub fn options(&self) -> &ColorizeOptions {
        self.registry.options()
    }

    /// Colorize one document.
    pub fn run(&mut self, input: &str) -> Result<Colorized, ColorizeError> {
        self.registry.start_run();
        document::colorize_document(input, &mut self.registry)
    }
}

/// Colorize one document with `options`.
pub fn colorize(input: &str, options: &ColorizeOptions) -> Result<String, ColorizeError> {
    SyntaxColorizer::new(options.clone())
        .run(input)
        .map(|colorized| colorized.html)
}
