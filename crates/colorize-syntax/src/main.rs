//! colorize-syntax CLI - Syntax highlight the code blocks of HTML/XML documents.

use anyhow::{Context, Result, bail};
use colorize_syntax::{ColorizeOptions, ProcessOptions, Processor, SyntaxMode, colorize};
use facet::Facet;
use facet_args as args;
use owo_colors::OwoColorize;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Syntax highlight the code blocks of HTML, XHTML and XML documents.
///
/// Reads a document from stdin and writes the result to stdout, or
/// colorizes a file or every document under a directory.
#[derive(Debug, Facet)]
struct Args {
    /// Document or directory to colorize, or '-' for stdin
    #[facet(args::positional, default)]
    input: Option<String>,

    /// Output file or directory (defaults to stdout, or in place for paths)
    #[facet(args::named, args::short = 'o', default)]
    output: Option<PathBuf>,

    /// Configuration file (TOML)
    #[facet(args::named, args::short = 'c', default)]
    config: Option<PathBuf>,

    /// Output syntax: html, xhtml or xml
    #[facet(args::named, args::short = 's', default)]
    syntax: Option<String>,

    /// Colorizer for languages without an override (arborium, pygmentize, simon_highlight)
    #[facet(args::named, default)]
    default_colorizer: Option<String>,

    /// Per-language colorizers, e.g. "ruby=pygmentize,haskell=simon_highlight"
    #[facet(args::named, default)]
    colorizers: Option<String>,

    /// Also colorize <code> elements outside <pre>
    #[facet(args::named, default)]
    outside_pre: bool,

    /// Kill external highlighters running longer than this
    #[facet(args::named, default)]
    timeout_ms: Option<u64>,

    /// Show verbose output
    #[facet(args::named, args::short = 'v', default)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args: Args = facet_args::from_std_args().unwrap_or_else(|e| {
        if let Some(text) = e.help_text() {
            eprintln!("{text}");
        } else {
            eprintln!("{:?}", e);
        }
        std::process::exit(1);
    });

    init_tracing(args.verbose);

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .without_time()
        .init();
}

fn run(args: Args) -> Result<ExitCode> {
    let options = build_options(&args)?;

    match args.input.as_deref() {
        None | Some("-") => run_stdin(&options, args.output.as_deref()),
        Some(input) => run_paths(options, PathBuf::from(input), args.output),
    }
}

/// Options from the config file, overridden by flags.
fn build_options(args: &Args) -> Result<ColorizeOptions> {
    let mut options = match &args.config {
        Some(path) => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            ColorizeOptions::from_toml(&source)
                .with_context(|| format!("failed to load config {}", path.display()))?
        }
        None => ColorizeOptions::new(),
    };

    if let Some(syntax) = &args.syntax {
        options.syntax = syntax.parse::<SyntaxMode>()?;
    }
    if let Some(colorizer) = &args.default_colorizer {
        options.default_colorizer = colorizer.clone();
    }
    if let Some(colorizers) = &args.colorizers {
        for (language, colorizer) in parse_colorizers(colorizers)? {
            options.colorizers.insert(language, colorizer);
        }
    }
    if args.outside_pre {
        options.outside_pre = true;
    }
    if let Some(ms) = args.timeout_ms {
        if ms == 0 {
            bail!("--timeout-ms must be positive");
        }
        options.process.timeout = Some(Duration::from_millis(ms));
    }

    Ok(options)
}

/// Parse `lang=colorizer,lang=colorizer`.
fn parse_colorizers(list: &str) -> Result<Vec<(String, String)>> {
    list.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((language, colorizer)) if !language.trim().is_empty() => {
                Ok((language.trim().to_string(), colorizer.trim().to_string()))
            }
            _ => bail!("expected language=colorizer, got `{pair}`"),
        })
        .collect()
}

fn run_stdin(options: &ColorizeOptions, output: Option<&Path>) -> Result<ExitCode> {
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .context("failed to read stdin")?;

    let html = colorize(&input, options)?;

    match output {
        Some(path) => std::fs::write(path, html)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => io::stdout()
            .write_all(html.as_bytes())
            .context("failed to write stdout")?,
    }
    Ok(ExitCode::SUCCESS)
}

fn run_paths(options: ColorizeOptions, input: PathBuf, output: Option<PathBuf>) -> Result<ExitCode> {
    if !input.exists() {
        bail!("Input does not exist: {}", input.display());
    }
    let is_dir = input.is_dir();

    if is_dir {
        eprintln!(
            "{} Colorizing documents under: {}",
            "colorize-syntax".green().bold(),
            input.display()
        );
        if let Some(out) = &output {
            eprintln!("  Output: {}", out.display());
        } else {
            eprintln!("  {} Modifying in place", "Note:".yellow());
        }
        eprintln!();
    }

    let processor = Processor::new(ProcessOptions {
        input,
        output,
        colorize: options,
        progress: is_dir,
    });

    let start = Instant::now();
    let stats = processor.process()?;
    let elapsed = start.elapsed();

    if is_dir {
        eprintln!("{}", "Results:".bold());
        eprintln!(
            "  {} documents processed ({} changed)",
            stats.files_processed.to_string().cyan(),
            stats.files_changed
        );
        eprintln!(
            "  {} code blocks colorized",
            stats.blocks_colorized.to_string().green()
        );
        eprintln!(
            "  {} code blocks skipped (no language)",
            stats.blocks_skipped.to_string().yellow()
        );
        if !stats.is_success() {
            eprintln!(
                "  {} documents failed",
                stats.failures.len().to_string().red()
            );
        }
        eprintln!(
            "\n  Completed in {:.2}s ({:+.1}% size, {:.1} MB/s)",
            elapsed.as_secs_f64(),
            stats.inflation_percent(),
            stats.throughput_mb_s()
        );
    }

    Ok(if stats.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_colorizers() {
        let pairs = parse_colorizers("ruby=pygmentize, haskell = simon_highlight,").unwrap();
        assert_eq!(
            pairs,
            [
                ("ruby".to_string(), "pygmentize".to_string()),
                ("haskell".to_string(), "simon_highlight".to_string()),
            ]
        );
        assert!(parse_colorizers("ruby").is_err());
        assert!(parse_colorizers("=pygmentize").is_err());
    }
}
