//! Positioned tokens using datafusion-sqlparser-rs
//!
//! Whitespace and comments are dropped; every remaining token carries its
//! 1-based line/column and the exact source text it was lexed from.

use bqmirror_core::Token;
use sqlparser::dialect::{BigQueryDialect, Dialect, GenericDialect};
use sqlparser::tokenizer::{Location, Token as SqlToken, Tokenizer as Lexer};

/// Turns document text into an ordered, positioned token stream
pub trait Tokenizer: Send + Sync {
    /// Tokenize `text`, ordered by position
    fn tokenize(&self, text: &str) -> Result<Vec<Token>, TokenizeError>;
}

/// Tokenizing failure (unterminated literal, stray character, ...)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenizeError {
    #[error("Lexing failed: {0}")]
    Lex(String),
}

/// Tokenizer over a sqlparser dialect
pub struct SqlTokenizer {
    dialect: Box<dyn Dialect + Send + Sync>,
}

impl SqlTokenizer {
    /// Create a tokenizer for BigQuery Standard SQL
    pub fn bigquery() -> Self {
        Self {
            dialect: Box::new(BigQueryDialect {}),
        }
    }

    /// Create a tokenizer with the generic dialect
    pub fn generic() -> Self {
        Self {
            dialect: Box::new(GenericDialect {}),
        }
    }
}

impl Default for SqlTokenizer {
    fn default() -> Self {
        Self::bigquery()
    }
}

impl Tokenizer for SqlTokenizer {
    fn tokenize(&self, text: &str) -> Result<Vec<Token>, TokenizeError> {
        let lexed = Lexer::new(&*self.dialect, text)
            .tokenize_with_location()
            .map_err(|e| TokenizeError::Lex(e.to_string()))?;

        let source = SourceIndex::new(text);
        let mut tokens = Vec::with_capacity(lexed.len());

        for item in lexed {
            if matches!(item.token, SqlToken::Whitespace(_) | SqlToken::EOF) {
                continue;
            }

            let start = item.span.start;
            let literal = source
                .slice(start, item.span.end)
                .unwrap_or_else(|| item.token.to_string());

            tokens.push(Token::new(start.line as u32, start.column as u32, literal));
        }

        Ok(tokens)
    }
}

/// Char offsets of line starts, for slicing by 1-based line/column
struct SourceIndex {
    chars: Vec<char>,
    line_starts: Vec<usize>,
}

impl SourceIndex {
    fn new(text: &str) -> Self {
        let chars: Vec<char> = text.chars().collect();
        let mut line_starts = vec![0];
        for (i, c) in chars.iter().enumerate() {
            if *c == '\n' {
                line_starts.push(i + 1);
            }
        }
        Self { chars, line_starts }
    }

    fn offset(&self, location: Location) -> Option<usize> {
        if location.line == 0 || location.column == 0 {
            return None;
        }
        let line_start = *self.line_starts.get(location.line as usize - 1)?;
        let offset = line_start + location.column as usize - 1;
        (offset <= self.chars.len()).then_some(offset)
    }

    fn slice(&self, start: Location, end: Location) -> Option<String> {
        let from = self.offset(start)?;
        let to = self.offset(end)?;
        (from < to).then(|| self.chars[from..to].iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn literals(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|t| t.literal.as_str()).collect()
    }

    #[test]
    fn tokenizes_simple_select() {
        let tokens = SqlTokenizer::bigquery().tokenize("SELECT 1;;").unwrap();

        assert_eq!(literals(&tokens), vec!["SELECT", "1", ";", ";"]);
        assert_eq!(tokens[0], Token::new(1, 1, "SELECT"));
        assert_eq!(tokens[1], Token::new(1, 8, "1"));
        assert_eq!(tokens[2], Token::new(1, 9, ";"));
        assert_eq!(tokens[3], Token::new(1, 10, ";"));
    }

    #[test]
    fn positions_span_lines() {
        let sql = "SELECT id\nFROM `proj.ds.users`\nWHERE id = 1";
        let tokens = SqlTokenizer::bigquery().tokenize(sql).unwrap();

        let from = tokens.iter().find(|t| t.literal == "FROM").unwrap();
        assert_eq!((from.line, from.column), (2, 1));

        let table = tokens.iter().find(|t| t.literal.contains("proj")).unwrap();
        assert_eq!(table.literal, "`proj.ds.users`");
        assert_eq!((table.line, table.column), (2, 6));

        let where_kw = tokens.iter().find(|t| t.literal == "WHERE").unwrap();
        assert_eq!((where_kw.line, where_kw.column), (3, 1));
    }

    #[test]
    fn drops_comments_and_whitespace() {
        let sql = "-- leading comment\nSELECT  /* inline */ x";
        let tokens = SqlTokenizer::bigquery().tokenize(sql).unwrap();
        assert_eq!(literals(&tokens), vec!["SELECT", "x"]);
    }

    #[test]
    fn keeps_multiline_literal_text() {
        let sql = "SELECT '''a\nbc''' AS s";
        let tokens = SqlTokenizer::bigquery().tokenize(sql).unwrap();
        assert_eq!(tokens[1].literal, "'''a\nbc'''");
        assert_eq!((tokens[1].line, tokens[1].column), (1, 8));
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let result = SqlTokenizer::generic().tokenize("SELECT 'abc");
        assert!(matches!(result, Err(TokenizeError::Lex(_))));
    }
}
