//! Routing languages to colorizers.

use std::ffi::OsString;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arborium::GrammarStore;
use tracing::debug;

use crate::backend::{ArboriumBackend, Backend, ExternalBackend, ExternalTool};
use crate::error::ColorizeError;
use crate::options::ColorizeOptions;

/// The colorizers a run can route languages to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Colorizer {
    /// In-process tree-sitter highlighting.
    Arborium,
    /// `pygmentize` executable.
    Pygmentize,
    /// `highlight` executable.
    SimonHighlight,
}

impl Colorizer {
    pub const ALL: [Colorizer; 3] = [
        Colorizer::Arborium,
        Colorizer::Pygmentize,
        Colorizer::SimonHighlight,
    ];

    /// Name used in options and configuration files.
    pub fn name(self) -> &'static str {
        match self {
            Colorizer::Arborium => "arborium",
            Colorizer::Pygmentize => "pygmentize",
            Colorizer::SimonHighlight => "simon_highlight",
        }
    }

    /// The external tool behind this colorizer, if it runs out of process.
    pub fn external_tool(self) -> Option<ExternalTool> {
        match self {
            Colorizer::Arborium => None,
            Colorizer::Pygmentize => Some(ExternalTool::Pygmentize),
            Colorizer::SimonHighlight => Some(ExternalTool::SimonHighlight),
        }
    }
}

impl FromStr for Colorizer {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Colorizer::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or(())
    }
}

impl fmt::Display for Colorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where the search path comes from when the options leave it unset.
type AmbientPath = Box<dyn Fn() -> Option<OsString> + Send + Sync>;

/// Backends for one run, created on first use.
pub struct Registry {
    options: ColorizeOptions,
    ambient_path: AmbientPath,
    search_path: Option<OsString>,
    store: Option<Arc<GrammarStore>>,
    arborium: Option<ArboriumBackend>,
    pygmentize: Option<ExternalBackend>,
    simon_highlight: Option<ExternalBackend>,
}

impl Registry {
    /// Build a registry; the search path is fixed until [`Registry::start_run`],
    /// falling back to the ambient `PATH` when the options leave it unset.
    pub fn new(options: ColorizeOptions) -> Self {
        let ambient_path: AmbientPath = Box::new(|| std::env::var_os("PATH"));
        let search_path = current_search_path(&options, &ambient_path);
        Self {
            options,
            ambient_path,
            search_path,
            store: None,
            arborium: None,
            pygmentize: None,
            simon_highlight: None,
        }
    }

    /// Build a registry whose in-process backend shares compiled grammars.
    pub fn with_store(options: ColorizeOptions, store: Arc<GrammarStore>) -> Self {
        let mut registry = Self::new(options);
        registry.store = Some(store);
        registry
    }

    /// Replace the ambient `PATH` lookup.
    #[cfg(test)]
    fn with_ambient_path(
        mut self,
        ambient_path: impl Fn() -> Option<OsString> + Send + Sync + 'static,
    ) -> Self {
        self.ambient_path = Box::new(ambient_path);
        self.search_path = current_search_path(&self.options, &self.ambient_path);
        self
    }

    /// Start a new run: re-read the search path and drop external backends
    /// built with the old one. Compiled grammars are kept.
    pub fn start_run(&mut self) {
        self.search_path = current_search_path(&self.options, &self.ambient_path);
        self.pygmentize = None;
        self.simon_highlight = None;
    }

    pub fn options(&self) -> &ColorizeOptions {
        &self.options
    }

    /// The colorizer configured for `language`.
    pub fn colorizer_for(&self, language: &str) -> Result<Colorizer, ColorizeError> {
        let name = self.options.colorizer_for(language);
        name.parse().map_err(|()| ColorizeError::UnknownColorizer {
            colorizer: name.to_string(),
            language: language.to_string(),
        })
    }

    /// Whether the colorizer for `language` knows it.
    pub fn recognizes(&mut self, language: &str) -> Result<bool, ColorizeError> {
        let colorizer = self.colorizer_for(language)?;
        Ok(self.backend(colorizer).supports(language))
    }

    /// Colorize `source` with whatever `language` is routed to.
    pub fn colorize(&mut self, source: &str, language: &str) -> Result<String, ColorizeError> {
        let colorizer = self.colorizer_for(language)?;
        debug!(language, %colorizer, bytes = source.len(), "colorizing block");
        self.backend(colorizer).colorize(source, language)
    }

    fn backend(&mut self, colorizer: Colorizer) -> &mut dyn Backend {
        let options = &self.options;
        let search_path = &self.search_path;
        match colorizer {
            Colorizer::Arborium => {
                let store = self.store.clone();
                self.arborium.get_or_insert_with(|| match store {
                    Some(store) => ArboriumBackend::with_store(store),
                    None => ArboriumBackend::new(),
                })
            }
            Colorizer::Pygmentize => self.pygmentize.get_or_insert_with(|| {
                external(options, search_path, colorizer, ExternalTool::Pygmentize)
            }),
            Colorizer::SimonHighlight => self.simon_highlight.get_or_insert_with(|| {
                external(options, search_path, colorizer, ExternalTool::SimonHighlight)
            }),
        }
    }
}

fn current_search_path(options: &ColorizeOptions, ambient_path: &AmbientPath) -> Option<OsString> {
    options.process.search_path.clone().or_else(|| ambient_path())
}

fn external(
    options: &ColorizeOptions,
    search_path: &Option<OsString>,
    colorizer: Colorizer,
    tool: ExternalTool,
) -> ExternalBackend {
    ExternalBackend::new(
        tool,
        options.params_for(colorizer).cloned(),
        search_path.clone(),
        options.process.timeout,
    )
}
