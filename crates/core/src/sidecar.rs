//! Comments log written next to the output file.
//!
//! Records the options a run was made with. Newer blocks go first; whatever
//! the log already held is kept below them.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Width of the `#` banner heading each block.
const BANNER_WIDTH: usize = 80;

/// A recorded option value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Text(String),
    Number(i64),
}

/// Render one comments block.
///
/// ```
/// use nvptools_core::sidecar::{render_comments, OptionValue};
///
/// let block = render_comments(
///     "out.nvp",
///     "denormalise-nvp",
///     &[("port".to_string(), OptionValue::Number(1433))],
/// );
/// assert!(block.ends_with("#     --port=1433\n"));
/// ```
pub fn render_comments(output: &str, program: &str, options: &[(String, OptionValue)]) -> String {
    let mut block = banner(&format!(" {output} "));
    block.push('\n');
    block.push_str(&format!("# {program}\n"));
    for (name, value) in options {
        match value {
            OptionValue::Text(text) => block.push_str(&format!("#     --{name}=\"{text}\"\n")),
            OptionValue::Number(n) => block.push_str(&format!("#     --{name}={n}\n")),
        }
    }
    block
}

/// Write `block` at the top of `log_path`, keeping any earlier content.
pub fn prepend_comments(log_path: &Path, block: &str) -> std::io::Result<()> {
    let existing = match fs::read_to_string(log_path) {
        Ok(existing) => existing,
        Err(err) if err.kind() == ErrorKind::NotFound => String::new(),
        Err(err) => return Err(err),
    };
    fs::write(log_path, format!("{block}{existing}"))
}

fn banner(title: &str) -> String {
    let len = title.chars().count();
    if len >= BANNER_WIDTH {
        return title.to_string();
    }
    let padding = BANNER_WIDTH - len;
    let left = padding / 2;
    format!("{}{title}{}", "#".repeat(left), "#".repeat(padding - left))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
