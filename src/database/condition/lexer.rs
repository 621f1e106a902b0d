//! SQL token streams for the condition language and raw statements
//!
//! Both are read with the `sqlparser` tokenizer, so comments, quoted text and
//! `::` casts are recognized exactly as the engines see them. Quoted literals
//! keep their raw escaping so a token stream can be written back out.

use crate::database::codec::SqlDialect;
use crate::database::error::{DatabaseError, DatabaseResult};
use sqlparser::dialect::{Dialect, GenericDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::tokenizer::{Token, Tokenizer};

fn tokenize_with(dialect: &dyn Dialect, text: &str) -> DatabaseResult<Vec<Token>> {
	Tokenizer::new(dialect, text)
		.with_unescape(false)
		.tokenize()
		.map_err(|e| DatabaseError::UnsupportedQuery(format!("cannot tokenize '{text}': {e}")))
}

/// Tokenize a statement as `dialect` reads it, whitespace and comments included
pub fn tokenize_sql(dialect: SqlDialect, sql: &str) -> DatabaseResult<Vec<Token>> {
	match dialect {
		SqlDialect::Sqlite => tokenize_with(&SQLiteDialect {}, sql),
		SqlDialect::Postgres => tokenize_with(&PostgreSqlDialect {}, sql),
	}
}

pub fn tokenize_condition(text: &str) -> DatabaseResult<Vec<Token>> {
	tokenize_with(&GenericDialect {}, text)
}

/// The `:name` parameter starting at `tokens[i]` and the number of tokens it
/// spans. The tokenizer reports it either as one placeholder or as a colon
/// directly followed by an unquoted word.
pub fn named_placeholder(tokens: &[Token], i: usize) -> Option<(String, usize)> {
	match tokens.get(i)? {
		Token::Placeholder(text) => text
			.strip_prefix(':')
			.filter(|name| !name.is_empty())
			.map(|name| (name.to_string(), 1)),
		Token::Colon => match tokens.get(i + 1)? {
			Token::Word(word) if word.quote_style.is_none() => Some((word.value.clone(), 2)),
			_ => None,
		},
		_ => None,
	}
}

/// Index of the first token at or after `i` that is not whitespace or a comment
pub fn skip_whitespace(tokens: &[Token], mut i: usize) -> usize {
	while matches!(tokens.get(i), Some(Token::Whitespace(_))) {
		i += 1;
	}
	i
}
