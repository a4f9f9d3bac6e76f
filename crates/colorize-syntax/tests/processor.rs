#![cfg(unix)]

use std::fs;

use colorize_syntax::{ColorizeOptions, ProcessError, ProcessOptions, Processor};
use tempfile::TempDir;

mod common;

fn options(tools: &TempDir) -> ColorizeOptions {
    ColorizeOptions::new()
        .with_default_colorizer("simon_highlight")
        .with_search_path(tools.path())
}

#[test]
fn test_directory_into_output() {
    let tools = common::fake_tools();
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    let out_dir = output.path().join("site");

    let page = r#"<pre><code class="language-ruby">puts 1</code></pre>"#;
    fs::create_dir_all(input.path().join("posts")).unwrap();
    fs::write(input.path().join("index.html"), page).unwrap();
    fs::write(input.path().join("posts/feed.xml"), "<feed><title>t</title></feed>").unwrap();
    fs::write(input.path().join("style.css"), "pre { color: red }").unwrap();

    let processor = Processor::new(ProcessOptions {
        input: input.path().to_path_buf(),
        output: Some(out_dir.clone()),
        colorize: options(&tools),
        progress: false,
    });
    let stats = processor.process().unwrap();

    assert!(stats.is_success());
    assert_eq!(stats.files_processed, 2);
    assert_eq!(stats.files_changed, 1);
    assert_eq!(stats.blocks_colorized, 1);

    assert_eq!(
        fs::read_to_string(out_dir.join("index.html")).unwrap(),
        r#"<pre><code class="language-ruby"><span class="hl slc">puts 1</span></code></pre>"#
    );
    assert_eq!(
        fs::read_to_string(out_dir.join("style.css")).unwrap(),
        "pre { color: red }"
    );
    assert!(out_dir.join("posts/feed.xml").exists());

    // The input tree is left alone.
    assert_eq!(fs::read_to_string(input.path().join("index.html")).unwrap(), page);
}

#[test]
fn test_output_inside_input() {
    let tools = common::fake_tools();
    let input = TempDir::new().unwrap();
    let out_dir = input.path().join("public");

    let page = r#"<pre><code class="language-ruby">puts 1</code></pre>"#;
    fs::write(input.path().join("index.html"), page).unwrap();

    let processor = Processor::new(ProcessOptions {
        input: input.path().to_path_buf(),
        output: Some(out_dir.clone()),
        colorize: options(&tools),
        progress: false,
    });
    let stats = processor.process().unwrap();

    assert!(stats.is_success());
    assert_eq!(stats.files_processed, 1);
    assert!(!out_dir.join("public").exists());
    assert_eq!(
        fs::read_to_string(out_dir.join("index.html")).unwrap(),
        r#"<pre><code class="language-ruby"><span class="hl slc">puts 1</span></code></pre>"#
    );
    assert_eq!(fs::read_to_string(input.path().join("index.html")).unwrap(), page);

    // A second run over the same tree must not copy the output into itself.
    let stats = processor.process().unwrap();
    assert!(stats.is_success());
    assert_eq!(stats.files_processed, 1);
    assert!(!out_dir.join("public").exists());
}

#[test]
fn test_failures_are_collected() {
    let tools = common::fake_tools();
    let input = TempDir::new().unwrap();

    let good = r#"<pre><code class="language-ruby">puts 1</code></pre>"#;
    let bad = r#"<pre><code class="language-cobol">DISPLAY 'HI'.</code></pre>"#;
    fs::write(input.path().join("good.html"), good).unwrap();
    fs::write(input.path().join("bad.html"), bad).unwrap();

    let processor = Processor::new(ProcessOptions {
        input: input.path().to_path_buf(),
        output: None,
        colorize: options(&tools).with_colorizer("cobol", "coderay"),
        progress: false,
    });
    let stats = processor.process().unwrap();

    assert!(!stats.is_success());
    assert_eq!(stats.files_processed, 1);
    assert_eq!(stats.failures.len(), 1);
    assert!(stats.failures[0].path.ends_with("bad.html"));
    assert!(matches!(stats.failures[0].error, ProcessError::Colorize { .. }));

    // Failed documents are not touched; good ones are colorized in place.
    assert_eq!(fs::read_to_string(input.path().join("bad.html")).unwrap(), bad);
    assert_ne!(fs::read_to_string(input.path().join("good.html")).unwrap(), good);
}

#[test]
fn test_single_file() {
    let tools = common::fake_tools();
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("page.html");
    let target = dir.path().join("out/page.html");
    fs::write(&source, "<pre><code>#!ruby\nputs 1</code></pre>").unwrap();

    let processor = Processor::new(ProcessOptions {
        input: source.clone(),
        output: Some(target.clone()),
        colorize: options(&tools),
        progress: false,
    });
    let stats = processor.process().unwrap();

    assert_eq!(stats.files_processed, 1);
    assert_eq!(
        fs::read_to_string(&target).unwrap(),
        r#"<pre><code class="language-ruby"><span class="hl slc">puts 1</span></code></pre>"#
    );
}
