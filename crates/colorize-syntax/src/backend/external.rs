//! Colorizers that run as external processes.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::time::Duration;

use lol_html::{RewriteStrSettings, element, rewrite_str};

use super::Backend;
use super::process::{self, Invocation};
use crate::error::{ColorizeError, ToolError};

/// External highlighters we know how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternalTool {
    /// Pygments' command-line front end.
    Pygmentize,
    /// André Simon's `highlight`.
    SimonHighlight,
}

impl ExternalTool {
    /// The executable name to search for.
    pub fn executable_name(self) -> &'static str {
        match self {
            ExternalTool::Pygmentize => "pygmentize",
            ExternalTool::SimonHighlight => "highlight",
        }
    }

    /// Command-line arguments for colorizing `language` to an HTML fragment.
    pub fn args(self, language: &str, params: Option<&BTreeMap<String, String>>) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        match self {
            ExternalTool::Pygmentize => {
                args.extend(["-l", language, "-f", "html"].map(OsString::from));
                let options: Vec<String> = params
                    .into_iter()
                    .flatten()
                    .map(|(key, value)| format!("{key}={value}"))
                    .collect();
                if !options.is_empty() {
                    args.push("-O".into());
                    args.push(options.join(",").into());
                }
            }
            ExternalTool::SimonHighlight => {
                args.extend(
                    ["--syntax", language, "--out-format", "html", "--fragment"]
                        .map(OsString::from),
                );
                for (key, value) in params.into_iter().flatten() {
                    if value == "true" {
                        args.push(format!("--{key}").into());
                    } else {
                        args.push(format!("--{key}={value}").into());
                    }
                }
            }
        }
        args
    }

    /// Turn raw tool output into the fragment placed inside `<code>`.
    pub fn postprocess(self, output: &str) -> Result<String, ColorizeError> {
        let fragment = match self {
            ExternalTool::Pygmentize => unwrap_pygments(output)?,
            ExternalTool::SimonHighlight => output.to_string(),
        };
        Ok(fragment.trim_end_matches(['\n', '\r']).to_string())
    }
}

/// Pygments wraps its output in `<div class="highlight"><pre>`; keep the inside.
fn unwrap_pygments(output: &str) -> Result<String, ColorizeError> {
    let unwrapped = rewrite_str(
        output,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("div.highlight", |el| {
                    el.remove_and_keep_content();
                    Ok(())
                }),
                element!("div.highlight > pre", |el| {
                    el.remove_and_keep_content();
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::new()
        },
    )?;

    // Newer Pygments opens every block with an empty span.
    let unwrapped = unwrapped.strip_prefix("<span></span>").unwrap_or(&unwrapped);
    Ok(unwrapped.to_string())
}

/// A backend that pipes code through an [`ExternalTool`].
#[derive(Debug, Clone)]
pub struct ExternalBackend {
    tool: ExternalTool,
    params: Option<BTreeMap<String, String>>,
    search_path: Option<OsString>,
    timeout: Option<Duration>,
}

impl ExternalBackend {
    pub fn new(
        tool: ExternalTool,
        params: Option<BTreeMap<String, String>>,
        search_path: Option<OsString>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            tool,
            params,
            search_path,
            timeout,
        }
    }
}

impl Backend for ExternalBackend {
    /// External tools decide for themselves; any plausible name is passed on.
    fn supports(&mut self, _language: &str) -> bool {
        true
    }

    fn colorize(&mut self, source: &str, language: &str) -> Result<String, ColorizeError> {
        let invocation = Invocation {
            executable: self.tool.executable_name(),
            args: self.tool.args(language, self.params.as_ref()),
            input: source,
            search_path: self.search_path.as_deref(),
            timeout: self.timeout,
        };

        let output = process::invoke(&invocation).map_err(|source| execution(language, source))?;
        self.tool.postprocess(&output)
    }
}

fn execution(language: &str, source: ToolError) -> ColorizeError {
    ColorizeError::Execution {
        language: language.to_string(),
        source,
    }
}
