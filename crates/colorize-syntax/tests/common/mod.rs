//! Fake highlighters for tests.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tempfile::TempDir;

/// Stands in for `pygmentize`, wrapping stdin the way Pygments does.
pub const FAKE_PYGMENTIZE: &str = r#"printf '<div class="highlight"><pre><span></span><span class="c1">'
cat
printf '</span>\n</pre></div>\n'"#;

/// Stands in for `highlight --fragment`.
pub const FAKE_HIGHLIGHT: &str = r#"printf '<span class="hl slc">'
cat
printf '</span>\n'"#;

/// Prints its arguments instead of highlighting.
pub const ECHO_ARGS: &str = r#"cat > /dev/null
printf '%s ' "$@""#;

/// Install a `/bin/sh` script called `name` into `dir`.
pub fn install(dir: &Path, name: &str, script: &str) {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
}

/// A directory holding fake `pygmentize` and `highlight` executables.
pub fn fake_tools() -> TempDir {
    let dir = TempDir::new().unwrap();
    install(dir.path(), "pygmentize", FAKE_PYGMENTIZE);
    install(dir.path(), "highlight", FAKE_HIGHLIGHT);
    dir
}
