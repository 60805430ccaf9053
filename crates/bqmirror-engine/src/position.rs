//! Mapping 1-based `[row:col]` error locations onto token ranges
//!
//! Offsets are counted in characters over the whole document, with each line
//! break contributing one character. The token chosen for a location is the
//! last token that starts at or before it.

use bqmirror_core::{Position, Range, Token};

/// Character offset of a 1-based `(row, col)` location in `text`
///
/// The sum of the lengths of all preceding lines (each plus one for its line
/// break), plus `col - 1`.
pub fn error_offset(text: &str, row: u32, col: u32) -> usize {
    let preceding: usize = text
        .split('\n')
        .take(row.saturating_sub(1) as usize)
        .map(|line| line.chars().count() + 1)
        .sum();
    preceding + col.saturating_sub(1) as usize
}

/// Character offset at which each line starts
fn line_starts(text: &str) -> Vec<usize> {
    let mut starts = vec![0];
    let mut offset = 0;
    for line in text.split('\n') {
        offset += line.chars().count() + 1;
        starts.push(offset);
    }
    starts
}

fn token_offset(starts: &[usize], token: &Token) -> Option<usize> {
    if token.line == 0 || token.column == 0 {
        return None;
    }
    let line_start = starts.get(token.line as usize - 1)?;
    Some(line_start + token.column as usize - 1)
}

/// Range of the token a warehouse error points at
///
/// Returns `None` when no token starts at or before the location, in which
/// case callers fall back to the whole document.
pub fn map_error_location(text: &str, tokens: &[Token], row: u32, col: u32) -> Option<Range> {
    let target = error_offset(text, row, col);
    let starts = line_starts(text);

    let token = tokens
        .iter()
        .filter(|token| token_offset(&starts, token).is_some_and(|offset| offset <= target))
        .last()?;

    Some(token_range(token))
}

/// 0-based range spanned by a token's literal
pub fn token_range(token: &Token) -> Range {
    let start = Position::new(token.line.saturating_sub(1), token.column.saturating_sub(1));

    let newlines = token.literal.matches('\n').count() as u32;
    let end = if newlines == 0 {
        Position::new(
            start.line,
            start.character + token.literal.chars().count() as u32,
        )
    } else {
        let last_fragment = token.literal.rsplit('\n').next().unwrap_or("");
        Position::new(start.line + newlines, last_fragment.chars().count() as u32)
    };

    Range::new(start, end)
}
