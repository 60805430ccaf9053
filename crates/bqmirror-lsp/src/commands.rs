//! `workspace/executeCommand` commands

use serde_json::Value;

pub const CLEAR_CACHE: &str = "bqmirror.clearCache";
pub const UPDATE_CACHE: &str = "bqmirror.updateCache";
pub const DRY_RUN: &str = "bqmirror.dryRun";

/// Every command the server advertises
pub const ALL: [&str; 3] = [CLEAR_CACHE, UPDATE_CACHE, DRY_RUN];

/// A parsed command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Empty the local mirror
    ClearCache,

    /// Run a refresh cycle; `None` means "use the open documents"
    UpdateCache { texts: Option<Vec<String>> },

    /// Dry-run a document, given by URI of an open document or by its text
    DryRun { target: String },
}

impl Command {
    /// Parse a command name and its JSON arguments
    pub fn parse(name: &str, arguments: &[Value]) -> Result<Self, String> {
        match name {
            CLEAR_CACHE => Ok(Self::ClearCache),
            UPDATE_CACHE => {
                if arguments.is_empty() {
                    return Ok(Self::UpdateCache { texts: None });
                }
                let texts = arguments
                    .iter()
                    .flat_map(|arg| match arg {
                        Value::Array(items) => items.clone(),
                        other => vec![other.clone()],
                    })
                    .map(|item| match item {
                        Value::String(text) => Ok(text),
                        other => Err(format!("{} expects strings, got {}", UPDATE_CACHE, other)),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::UpdateCache { texts: Some(texts) })
            }
            DRY_RUN => match arguments.first() {
                Some(Value::String(target)) => Ok(Self::DryRun {
                    target: target.clone(),
                }),
                Some(other) => Err(format!("{} expects a string, got {}", DRY_RUN, other)),
                None => Err(format!("{} expects a document", DRY_RUN)),
            },
            other => Err(format!("Unknown command: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parses_clear_cache() {
        assert_eq!(Command::parse(CLEAR_CACHE, &[]), Ok(Command::ClearCache));
    }

    #[test]
    fn update_cache_defaults_to_open_documents() {
        assert_eq!(
            Command::parse(UPDATE_CACHE, &[]),
            Ok(Command::UpdateCache { texts: None })
        );
    }

    #[test]
    fn update_cache_accepts_list_or_varargs() {
        let expected = Ok(Command::UpdateCache {
            texts: Some(vec!["a".to_string(), "b".to_string()]),
        });
        assert_eq!(Command::parse(UPDATE_CACHE, &[json!(["a", "b"])]), expected);
        assert_eq!(Command::parse(UPDATE_CACHE, &[json!("a"), json!("b")]), expected);
        assert!(Command::parse(UPDATE_CACHE, &[json!(1)]).is_err());
    }

    #[test]
    fn dry_run_needs_a_target() {
        assert_eq!(
            Command::parse(DRY_RUN, &[json!("SELECT 1")]),
            Ok(Command::DryRun {
                target: "SELECT 1".to_string()
            })
        );
        assert!(Command::parse(DRY_RUN, &[]).is_err());
        assert!(Command::parse(DRY_RUN, &[json!({"uri": 1})]).is_err());
    }

    #[test]
    fn rejects_unknown_commands() {
        assert!(Command::parse("bqmirror.nope", &[]).is_err());
    }
}
