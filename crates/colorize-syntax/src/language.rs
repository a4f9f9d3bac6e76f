//! Figuring out which language a code block is written in.
//!
//! Two sources are consulted, in order:
//!
//! 1. A `language-<name>` token in the block's `class` attribute.
//! 2. A marker line `#!<name>` at the top of the block's text. Unlike the
//!    class, a marker is only trusted when the colorizer that would handle
//!    `<name>` actually knows it, so `#!/usr/bin/env ruby` and friends stay
//!    ordinary code.
//!
//! A marker that was used to pick the language is removed from the text
//! before colorizing; one that was not stays where it is.

const CLASS_PREFIX: &str = "language-";
const MARKER_PREFIX: &str = "#!";

/// Where a block's language came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageOrigin {
    /// A `language-*` class token.
    Class,
    /// A `#!name` first line, which must be stripped.
    Marker,
}

/// A language resolved for one code block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLanguage {
    pub name: String,
    pub origin: LanguageOrigin,
}

/// Language named by the first `language-*` token of a class attribute.
pub fn language_from_class(class: &str) -> Option<&str> {
    class
        .split_ascii_whitespace()
        .filter_map(|token| token.strip_prefix(CLASS_PREFIX))
        .find(|name| !name.is_empty())
}

/// Candidate language named by a `#!name` marker on the first non-blank line.
///
/// Interpreter paths (`#!/bin/sh`, `#!/usr/bin/env ruby`) and anything that is
/// not a plain identifier never qualify.
pub fn marker_candidate(text: &str) -> Option<&str> {
    let first = trim_blank_lines(text).lines().next()?;
    let name = first.strip_prefix(MARKER_PREFIX)?.trim_end();

    if name.starts_with('/') || !is_language_name(name) {
        return None;
    }
    Some(name)
}

/// Resolve a block's language.
///
/// `recognizes` is asked about marker candidates only; class tokens are
/// trusted as written. Errors from `recognizes` (a misconfigured colorizer)
/// propagate.
pub fn resolve<E>(
    class: Option<&str>,
    text: &str,
    mut recognizes: impl FnMut(&str) -> Result<bool, E>,
) -> Result<Option<ResolvedLanguage>, E> {
    if let Some(name) = class.and_then(language_from_class) {
        return Ok(Some(ResolvedLanguage {
            name: name.to_string(),
            origin: LanguageOrigin::Class,
        }));
    }

    match marker_candidate(text) {
        Some(name) if recognizes(name)? => Ok(Some(ResolvedLanguage {
            name: name.to_string(),
            origin: LanguageOrigin::Marker,
        })),
        _ => Ok(None),
    }
}

/// Text handed to the colorizer for a resolved block.
pub fn source_for(text: &str, origin: LanguageOrigin) -> &str {
    let text = trim_blank_lines(text);
    match origin {
        LanguageOrigin::Class => text,
        LanguageOrigin::Marker => strip_first_line(text),
    }
}

/// Remove exactly the first line, including its terminator.
pub fn strip_first_line(text: &str) -> &str {
    match text.find('\n') {
        Some(newline) => &text[newline + 1..],
        None => "",
    }
}

/// Drop leading blank lines and trailing whitespace.
pub fn trim_blank_lines(text: &str) -> &str {
    let mut start = 0;
    for line in text.split_inclusive('\n') {
        if !line.trim().is_empty() {
            break;
        }
        start += line.len();
    }
    text[start..].trim_end()
}

/// Class attribute value with `language-<name>` present.
///
/// Existing tokens and their order are kept; the token is appended when
/// missing.
pub fn ensure_language_class(class: Option<&str>, language: &str) -> String {
    let token = format!("{CLASS_PREFIX}{language}");
    match class.map(str::trim) {
        None | Some("") => token,
        Some(class) if class.split_ascii_whitespace().any(|t| t == token) => class.to_string(),
        Some(class) => format!("{class} {token}"),
    }
}

fn is_language_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '#' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn always(_: &str) -> Result<bool, Infallible> {
        Ok(true)
    }

    fn only_ruby(name: &str) -> Result<bool, Infallible> {
        Ok(name == "ruby")
    }

    #[test]
    fn test_language_from_class() {
        assert_eq!(language_from_class("language-ruby"), Some("ruby"));
        assert_eq!(language_from_class("abc language-ruby xyz"), Some("ruby"));
        assert_eq!(language_from_class("language- language-c"), Some("c"));
        assert_eq!(language_from_class("highlight"), None);
        assert_eq!(language_from_class("my-language-ruby"), None);
    }

    #[test]
    fn test_marker_candidate() {
        assert_eq!(marker_candidate("#!ruby\nputs 1"), Some("ruby"));
        assert_eq!(marker_candidate("\n\n#!c++\nint x;"), Some("c++"));
        assert_eq!(marker_candidate("#!/usr/bin/env ruby\nputs 1"), None);
        assert_eq!(marker_candidate("#! /bin/sh"), None);
        assert_eq!(marker_candidate("# comment"), None);
        assert_eq!(marker_candidate("puts 1\n#!ruby"), None);
        assert_eq!(marker_candidate(""), None);
    }

    #[test]
    fn test_class_wins_over_marker() {
        let resolved = resolve(Some("language-python"), "#!ruby\nx", always)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.name, "python");
        assert_eq!(resolved.origin, LanguageOrigin::Class);
        assert_eq!(source_for("#!ruby\nx", resolved.origin), "#!ruby\nx");
    }

    #[test]
    fn test_marker_requires_recognition() {
        let resolved = resolve(None, "#!ruby\n# comment", only_ruby).unwrap().unwrap();
        assert_eq!(resolved.origin, LanguageOrigin::Marker);
        assert_eq!(source_for("#!ruby\n# comment", resolved.origin), "# comment");

        assert_eq!(resolve(None, "#!klingon\nqapla'", only_ruby).unwrap(), None);
        assert_eq!(resolve(None, "#!/usr/bin/env ruby\nputs", always).unwrap(), None);
        assert_eq!(resolve(Some("wide"), "no marker", always).unwrap(), None);
    }

    #[test]
    fn test_recognizer_errors_propagate() {
        let result = resolve(None, "#!ruby\nputs", |_| Err::<bool, _>("boom"));
        assert_eq!(result, Err("boom"));
    }

    #[test]
    fn test_strip_first_line() {
        assert_eq!(strip_first_line("#!ruby\n#!/usr/bin/env ruby\nputs"), "#!/usr/bin/env ruby\nputs");
        assert_eq!(strip_first_line("#!ruby"), "");
        assert_eq!(strip_first_line("#!ruby\r\nputs"), "puts");
    }

    #[test]
    fn test_trim_blank_lines() {
        assert_eq!(trim_blank_lines("\n# comment\n"), "# comment");
        assert_eq!(trim_blank_lines("  \n\n  indented\n\n"), "  indented");
        assert_eq!(trim_blank_lines("\n \n"), "");
    }

    #[test]
    fn test_ensure_language_class() {
        assert_eq!(ensure_language_class(None, "ruby"), "language-ruby");
        assert_eq!(ensure_language_class(Some(""), "ruby"), "language-ruby");
        assert_eq!(
            ensure_language_class(Some("abc language-ruby xyz"), "ruby"),
            "abc language-ruby xyz"
        );
        assert_eq!(ensure_language_class(Some("wide"), "ruby"), "wide language-ruby");
    }
}
