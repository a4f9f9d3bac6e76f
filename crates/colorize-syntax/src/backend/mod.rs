//! Colorization engines.
//!
//! A [`Backend`] turns a piece of source code into an HTML fragment of
//! `<span class="...">` tokens. Class names are backend-specific: arborium
//! uses its short tags (`c`, `k`, `s`, ...), pygments its own (`c1`, `nb`,
//! `s2`, ...), highlight prefixes everything with `hl`.

mod in_process;
mod external;
pub mod process;

pub use self::in_process::ArboriumBackend;
pub use self::external::{ExternalBackend, ExternalTool};

use crate::error::ColorizeError;

/// What every colorization engine can do.
pub trait Backend {
    /// Whether this backend knows `language` well enough to trust a `#!`
    /// marker naming it.
    fn supports(&mut self, language: &str) -> bool;

    /// Colorize `source` as `language`, returning an HTML fragment.
    fn colorize(&mut self, source: &str, language: &str) -> Result<String, ColorizeError>;
}
