//! Batch processor that colorizes a file or a directory of documents.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use arborium::GrammarStore;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::ColorizeError;
use crate::options::ColorizeOptions;
use crate::{Colorized, SyntaxColorizer};

/// Extensions of the files picked up when walking a directory.
const DOCUMENT_EXTENSIONS: &[&str] = &["html", "htm", "xhtml", "xml"];

/// Options for the processor.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// A document, or a directory searched recursively for documents.
    pub input: PathBuf,
    /// Where to write results (if None, modifies in place).
    ///
    /// For a directory input the whole tree is copied here first.
    pub output: Option<PathBuf>,
    pub colorize: ColorizeOptions,
    /// Show a progress bar while processing.
    pub progress: bool,
}

/// A document that could not be colorized.
#[derive(Debug)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: ProcessError,
}

/// Statistics from processing.
#[derive(Debug, Default)]
pub struct ProcessorStats {
    /// Number of documents colorized successfully.
    pub files_processed: usize,
    /// Number of documents whose content changed.
    pub files_changed: usize,
    /// Number of code blocks colorized.
    pub blocks_colorized: usize,
    /// Number of code blocks left alone.
    pub blocks_skipped: usize,
    /// Documents that failed; they are left as they were.
    pub failures: Vec<FileFailure>,
    /// Total bytes read from input documents.
    pub bytes_input: u64,
    /// Total bytes written to output documents.
    pub bytes_output: u64,
    /// Time spent colorizing (excludes copying the tree).
    pub process_duration: Duration,
}

impl ProcessorStats {
    /// Whether every document was colorized.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Calculate inflation percentage ((output - input) / input * 100).
    pub fn inflation_percent(&self) -> f64 {
        if self.bytes_input == 0 {
            0.0
        } else {
            (self.bytes_output as f64 - self.bytes_input as f64) / self.bytes_input as f64 * 100.0
        }
    }

    /// Calculate processing throughput in MB/s.
    pub fn throughput_mb_s(&self) -> f64 {
        let secs = self.process_duration.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            (self.bytes_input as f64 / (1024.0 * 1024.0)) / secs
        }
    }
}

/// Processor for documents on disk.
pub struct Processor {
    options: ProcessOptions,
}

impl Processor {
    /// Create a new processor with the given options.
    pub fn new(options: ProcessOptions) -> Self {
        Self { options }
    }

    /// Colorize the input, returning what happened to each document.
    ///
    /// Only problems with the input as a whole (missing input, failed copy)
    /// are errors; per-document failures are collected in the stats.
    pub fn process(&self) -> Result<ProcessorStats, ProcessError> {
        let input = &self.options.input;
        if !input.exists() {
            return Err(ProcessError::MissingInput(input.clone()));
        }

        let (root, files) = if input.is_dir() {
            let root = match &self.options.output {
                Some(out) if out != input => {
                    copy_tree(input, out)?;
                    out.clone()
                }
                _ => input.clone(),
            };
            let files = collect_documents(&root);
            (root, files)
        } else {
            let target = match &self.options.output {
                Some(out) if out != input => {
                    copy_file(input, out)?;
                    out.clone()
                }
                _ => input.clone(),
            };
            (target.clone(), vec![target])
        };

        debug!(root = %root.display(), files = files.len(), "colorizing documents");
        Ok(self.process_files(&files))
    }

    fn process_files(&self, files: &[PathBuf]) -> ProcessorStats {
        // Grammars are compiled once and shared by every worker.
        let store = Arc::new(GrammarStore::new());

        let progress = if self.options.progress {
            let bar = ProgressBar::new(files.len() as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("█▉▊▋▌▍▎▏  "),
            );
            bar
        } else {
            ProgressBar::hidden()
        };

        let process_start = Instant::now();

        let files_processed = AtomicUsize::new(0);
        let files_changed = AtomicUsize::new(0);
        let blocks_colorized = AtomicUsize::new(0);
        let blocks_skipped = AtomicUsize::new(0);
        let bytes_input = AtomicUsize::new(0);
        let bytes_output = AtomicUsize::new(0);
        let failures = Mutex::new(Vec::<FileFailure>::new());

        // One colorizer per thread, not per file.
        files.par_iter().for_each_init(
            || SyntaxColorizer::with_store(self.options.colorize.clone(), store.clone()),
            |colorizer, path| {
                match process_file(path, colorizer) {
                    Ok(outcome) => {
                        files_processed.fetch_add(1, Ordering::Relaxed);
                        if outcome.changed {
                            files_changed.fetch_add(1, Ordering::Relaxed);
                        }
                        blocks_colorized
                            .fetch_add(outcome.colorized.blocks_colorized, Ordering::Relaxed);
                        blocks_skipped.fetch_add(outcome.colorized.blocks_skipped, Ordering::Relaxed);
                        bytes_input.fetch_add(outcome.input_size, Ordering::Relaxed);
                        bytes_output.fetch_add(outcome.colorized.html.len(), Ordering::Relaxed);
                    }
                    Err(error) => {
                        warn!(path = %path.display(), %error, "failed to colorize document");
                        if let Ok(mut failures) = failures.lock() {
                            failures.push(FileFailure {
                                path: path.clone(),
                                error,
                            });
                        }
                    }
                }
                progress.inc(1);
            },
        );

        let process_duration = process_start.elapsed();
        progress.finish_and_clear();

        let mut failures = failures.into_inner().unwrap_or_else(|e| e.into_inner());
        failures.sort_by(|a, b| a.path.cmp(&b.path));

        ProcessorStats {
            files_processed: files_processed.load(Ordering::Relaxed),
            files_changed: files_changed.load(Ordering::Relaxed),
            blocks_colorized: blocks_colorized.load(Ordering::Relaxed),
            blocks_skipped: blocks_skipped.load(Ordering::Relaxed),
            failures,
            bytes_input: bytes_input.load(Ordering::Relaxed) as u64,
            bytes_output: bytes_output.load(Ordering::Relaxed) as u64,
            process_duration,
        }
    }
}

struct FileOutcome {
    colorized: Colorized,
    input_size: usize,
    changed: bool,
}

fn process_file(path: &Path, colorizer: &mut SyntaxColorizer) -> Result<FileOutcome, ProcessError> {
    let io_error = |source| ProcessError::Io {
        path: path.to_path_buf(),
        source,
    };

    let input = fs::read_to_string(path).map_err(io_error)?;
    let colorized = colorizer
        .run(&input)
        .map_err(|source| ProcessError::Colorize {
            path: path.to_path_buf(),
            source,
        })?;

    // Only write if we actually changed something
    let changed = colorized.html != input;
    if changed {
        fs::write(path, &colorized.html).map_err(io_error)?;
    }

    Ok(FileOutcome {
        colorized,
        input_size: input.len(),
        changed,
    })
}

fn collect_documents(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_document(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

fn is_document(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| DOCUMENT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Copy every file under `from` to the same place under `to`.
///
/// `to` may live inside `from`; it is skipped during the walk.
fn copy_tree(from: &Path, to: &Path) -> Result<(), ProcessError> {
    let io_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ProcessError::Io { path, source }
    };

    fs::create_dir_all(to).map_err(io_error(to))?;
    let output = fs::canonicalize(to).map_err(io_error(to))?;

    let walker = WalkDir::new(from)
        .into_iter()
        .filter_entry(|e| !is_same_dir(e, &output));

    for entry in walker {
        let entry = entry.map_err(|e| ProcessError::Io {
            path: e.path().unwrap_or(from).to_path_buf(),
            source: e.into(),
        })?;
        let Ok(relative) = entry.path().strip_prefix(from) else {
            continue;
        };
        let target = to.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(io_error(&target))?;
        } else if entry.file_type().is_file() {
            copy_file(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn is_same_dir(entry: &walkdir::DirEntry, dir: &Path) -> bool {
    entry.file_type().is_dir() && fs::canonicalize(entry.path()).is_ok_and(|path| path == dir)
}

fn copy_file(from: &Path, to: &Path) -> Result<(), ProcessError> {
    let io_error = |source| ProcessError::Io {
        path: to.to_path_buf(),
        source,
    };
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    fs::copy(from, to).map_err(io_error)?;
    Ok(())
}

/// Errors that can occur during processing.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The input path does not exist.
    #[error("input does not exist: {}", .0.display())]
    MissingInput(PathBuf),

    /// Reading, writing or copying a file failed.
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A document could not be colorized.
    #[error("{}: {source}", .path.display())]
    Colorize {
        path: PathBuf,
        #[source]
        source: ColorizeError,
    },
}
