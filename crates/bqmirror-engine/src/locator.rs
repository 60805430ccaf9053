//! Extracting error locations from warehouse messages
//!
//! BigQuery embeds the failing position as `[row:col]` (1-based), e.g.
//! `Syntax error: Unexpected ";" at [1:10]`.

use regex::Regex;
use std::sync::LazyLock;

/// Strategy for pulling a 1-based `(row, col)` out of an error message
pub trait ErrorLocator: Send + Sync {
    /// Location named by `message`, or `None` if it carries none
    fn locate(&self, message: &str) -> Option<(u32, u32)>;
}

/// Locates the first `[row:col]` marker in a message
#[derive(Debug, Clone, Copy, Default)]
pub struct BracketLocator;

static BRACKET_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[(\d+):(\d+)\]").unwrap());

impl ErrorLocator for BracketLocator {
    fn locate(&self, message: &str) -> Option<(u32, u32)> {
        let captures = BRACKET_PATTERN.captures(message)?;
        let row = captures.get(1)?.as_str().parse::<u32>().ok()?;
        let col = captures.get(2)?.as_str().parse::<u32>().ok()?;

        // Positions are 1-based
        if row == 0 || col == 0 {
            return None;
        }
        Some((row, col))
    }
}
