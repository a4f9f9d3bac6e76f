//! Run options: output syntax, colorizer routing, external process settings.
//!
//! Options are plain values owned by the caller and handed to each run. They
//! can be built in code or loaded from TOML:
//!
//! ```toml
//! syntax = "xhtml"
//! default_colorizer = "arborium"
//! outside_pre = false
//! timeout_ms = 10000
//!
//! [colorizers]
//! ruby = "pygmentize"
//! haskell = "simon_highlight"
//!
//! [params.pygmentize]
//! style = "friendly"
//! ```

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ColorizeError;
use crate::registry::Colorizer;

/// How the document is serialized back to text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SyntaxMode {
    /// Void elements are written `<br>`.
    #[default]
    Html,
    /// Void elements are written `<br />`.
    Xhtml,
    /// Void elements that were written self-closing come out as `<br/>`.
    ///
    /// A void name written as a plain start tag is left alone, `<br>`
    /// included. Names like `link` mean elements with content in XML
    /// vocabularies such as RSS, so rewriting them would change the
    /// document. A bare `<br>` is therefore not turned into well-formed
    /// XML.
    Xml,
}

impl SyntaxMode {
    pub fn name(self) -> &'static str {
        match self {
            SyntaxMode::Html => "html",
            SyntaxMode::Xhtml => "xhtml",
            SyntaxMode::Xml => "xml",
        }
    }
}

impl FromStr for SyntaxMode {
    type Err = ColorizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "html" => Ok(SyntaxMode::Html),
            "xhtml" => Ok(SyntaxMode::Xhtml),
            "xml" => Ok(SyntaxMode::Xml),
            _ => Err(ColorizeError::UnknownSyntax(s.to_string())),
        }
    }
}

impl fmt::Display for SyntaxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Settings for external highlighter processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessSettings {
    /// Directories searched for executables, in `PATH` format.
    ///
    /// When `None`, the ambient `PATH` is read at the start of each run.
    pub search_path: Option<OsString>,
    /// Kill a highlighter that runs longer than this. `None` waits forever.
    pub timeout: Option<Duration>,
}

/// Options for one colorize run.
#[derive(Debug, Clone)]
pub struct ColorizeOptions {
    /// Output serialization mode.
    pub syntax: SyntaxMode,
    /// Colorizer used for languages without an override.
    pub default_colorizer: String,
    /// Language -> colorizer overrides.
    pub colorizers: BTreeMap<String, String>,
    /// Colorizer -> extra parameters passed to that colorizer.
    pub params: BTreeMap<String, BTreeMap<String, String>>,
    /// Also colorize `code` elements that are not inside a `pre`.
    pub outside_pre: bool,
    pub process: ProcessSettings,
}

impl Default for ColorizeOptions {
    fn default() -> Self {
        Self {
            syntax: SyntaxMode::default(),
            default_colorizer: Colorizer::Arborium.name().to_string(),
            colorizers: BTreeMap::new(),
            params: BTreeMap::new(),
            outside_pre: false,
            process: ProcessSettings::default(),
        }
    }
}

impl ColorizeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_syntax(mut self, syntax: SyntaxMode) -> Self {
        self.syntax = syntax;
        self
    }

    pub fn with_default_colorizer(mut self, colorizer: impl Into<String>) -> Self {
        self.default_colorizer = colorizer.into();
        self
    }

    /// Route one language to a specific colorizer.
    pub fn with_colorizer(
        mut self,
        language: impl Into<String>,
        colorizer: impl Into<String>,
    ) -> Self {
        self.colorizers.insert(language.into(), colorizer.into());
        self
    }

    pub fn with_param(
        mut self,
        colorizer: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.params
            .entry(colorizer.into())
            .or_default()
            .insert(key.into(), value.into());
        self
    }

    pub fn with_outside_pre(mut self, outside_pre: bool) -> Self {
        self.outside_pre = outside_pre;
        self
    }

    pub fn with_search_path(mut self, search_path: impl Into<OsString>) -> Self {
        self.process.search_path = Some(search_path.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.process.timeout = Some(timeout);
        self
    }

    /// Name of the colorizer configured for `language`.
    pub fn colorizer_for(&self, language: &str) -> &str {
        self.colorizers
            .get(language)
            .map(String::as_str)
            .unwrap_or(&self.default_colorizer)
    }

    /// Extra parameters configured for a colorizer.
    pub fn params_for(&self, colorizer: Colorizer) -> Option<&BTreeMap<String, String>> {
        self.params.get(colorizer.name())
    }

    /// Parse options from a TOML document. Missing keys keep their defaults.
    pub fn from_toml(source: &str) -> Result<Self, ColorizeError> {
        let file: ConfigFile = toml::from_str(source)
            .map_err(|e| ColorizeError::InvalidConfig(e.message().to_string()))?;
        file.try_into()
    }
}

/// On-disk shape of the configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    syntax: Option<String>,
    default_colorizer: Option<String>,
    outside_pre: Option<bool>,
    timeout_ms: Option<u64>,
    search_path: Option<String>,
    colorizers: BTreeMap<String, String>,
    params: BTreeMap<String, BTreeMap<String, ParamValue>>,
}

/// A colorizer parameter; scalars of any type are passed on as text.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ParamValue {
    String(String),
    Boolean(bool),
    Integer(i64),
    Float(f64),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::String(s) => f.write_str(s),
            ParamValue::Boolean(b) => write!(f, "{b}"),
            ParamValue::Integer(i) => write!(f, "{i}"),
            ParamValue::Float(x) => write!(f, "{x}"),
        }
    }
}

impl TryFrom<ConfigFile> for ColorizeOptions {
    type Error = ColorizeError;

    fn try_from(file: ConfigFile) -> Result<Self, Self::Error> {
        let mut options = ColorizeOptions::default();

        if let Some(syntax) = file.syntax {
            options.syntax = syntax.parse()?;
        }
        if let Some(colorizer) = file.default_colorizer {
            options.default_colorizer = colorizer;
        }
        if let Some(outside_pre) = file.outside_pre {
            options.outside_pre = outside_pre;
        }
        if let Some(ms) = file.timeout_ms {
            if ms == 0 {
                return Err(ColorizeError::InvalidConfig(
                    "`timeout_ms` must be positive".to_string(),
                ));
            }
            options.process.timeout = Some(Duration::from_millis(ms));
        }
        if let Some(path) = file.search_path {
            options.process.search_path = Some(path.into());
        }

        options.colorizers = file.colorizers;
        options.params = file
            .params
            .into_iter()
            .map(|(colorizer, entries)| {
                let entries = entries
                    .into_iter()
                    .map(|(name, value)| (name, value.to_string()))
                    .collect();
                (colorizer, entries)
            })
            .collect();

        Ok(options)
    }
}
