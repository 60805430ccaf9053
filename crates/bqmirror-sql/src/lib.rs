//! SQL tokenizing
//!
//! The diagnostic engine only needs a positioned token stream. This crate
//! defines the [`Tokenizer`] seam and provides an implementation backed by
//! datafusion-sqlparser-rs.

pub mod tokenizer;

pub use tokenizer::{SqlTokenizer, TokenizeError, Tokenizer};
