//! Parser for the textual condition language
//!
//! ```text
//! expr  := and ("OR" and)*
//! and   := term ("AND" term)*
//! term  := "(" expr ")"
//!        | ident op :param
//!        | ident "IN" "(" :param ("," :param)* ")"
//!        | ident "IN" :param
//!        | "begins_with" "(" ident "," :param ")"
//! op    := = | <> | != | < | <= | > | >=
//! ```
//!
//! Values are never written inline; every comparison names a parameter.
//! Field names may be double-quoted, and SQL comments are ignored.

use super::{lexer, ConditionBuilder, ConditionNode, Operator};
use crate::database::error::{DatabaseError, DatabaseResult};
use crate::database::value::Value;
use sqlparser::tokenizer::Token as SqlToken;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
enum Token {
	Ident(String),
	Param(String),
	Op(Operator),
	LParen,
	RParen,
	Comma,
	And,
	Or,
	In,
}

fn syntax_error(text: &str, detail: impl std::fmt::Display) -> DatabaseError {
	DatabaseError::UnsupportedQuery(format!("cannot parse condition '{text}': {detail}"))
}

/// Read the condition into parser tokens, dropping whitespace and comments
fn tokenize(text: &str) -> DatabaseResult<Vec<Token>> {
	let raw = lexer::tokenize_condition(text)?;
	let mut tokens = Vec::new();
	let mut i = 0;
	while i < raw.len() {
		if let Some((name, width)) = lexer::named_placeholder(&raw, i) {
			tokens.push(Token::Param(name));
			i += width;
			continue;
		}
		let token = match &raw[i] {
			SqlToken::Whitespace(_) => None,
			SqlToken::Word(word) if word.quote_style.is_some() => Some(Token::Ident(word.value.clone())),
			SqlToken::Word(word) => Some(match word.value.to_ascii_uppercase().as_str() {
				"AND" => Token::And,
				"OR" => Token::Or,
				"IN" => Token::In,
				_ => Token::Ident(word.value.clone()),
			}),
			SqlToken::Eq => Some(Token::Op(Operator::Eq)),
			SqlToken::Neq => Some(Token::Op(Operator::Ne)),
			SqlToken::Lt => Some(Token::Op(Operator::Lt)),
			SqlToken::LtEq => Some(Token::Op(Operator::Le)),
			SqlToken::Gt => Some(Token::Op(Operator::Gt)),
			SqlToken::GtEq => Some(Token::Op(Operator::Ge)),
			SqlToken::LParen => Some(Token::LParen),
			SqlToken::RParen => Some(Token::RParen),
			SqlToken::Comma => Some(Token::Comma),
			other => return Err(syntax_error(text, format!("unexpected '{other}'"))),
		};
		tokens.extend(token);
		i += 1;
	}
	Ok(tokens)
}

struct Parser<'a> {
	text: &'a str,
	tokens: Vec<Token>,
	position: usize,
	params: &'a BTreeMap<String, Value>,
}

impl<'a> Parser<'a> {
	fn peek(&self) -> Option<&Token> {
		self.tokens.get(self.position)
	}

	fn next(&mut self) -> Option<Token> {
		let token = self.tokens.get(self.position).cloned();
		self.position += 1;
		token
	}

	fn expect(&mut self, expected: Token) -> DatabaseResult<()> {
		match self.next() {
			Some(token) if token == expected => Ok(()),
			Some(token) => Err(syntax_error(self.text, format!("expected {expected:?}, found {token:?}"))),
			None => Err(syntax_error(self.text, format!("expected {expected:?} at end of input"))),
		}
	}

	fn ident(&mut self) -> DatabaseResult<String> {
		match self.next() {
			Some(Token::Ident(name)) => Ok(name),
			other => Err(syntax_error(self.text, format!("expected field name, found {other:?}"))),
		}
	}

	fn param(&mut self) -> DatabaseResult<Value> {
		match self.next() {
			Some(Token::Param(name)) => self.params.get(&name).cloned().ok_or_else(|| {
				DatabaseError::UnsupportedQuery(format!("no value bound for parameter :{name}"))
			}),
			other => Err(syntax_error(self.text, format!("expected :parameter, found {other:?}"))),
		}
	}

	fn expr(&mut self) -> DatabaseResult<ConditionNode> {
		let mut builder = ConditionBuilder::or().node(self.conjunction()?);
		while self.peek() == Some(&Token::Or) {
			self.position += 1;
			builder = builder.node(self.conjunction()?);
		}
		builder.build()
	}

	fn conjunction(&mut self) -> DatabaseResult<ConditionNode> {
		let mut builder = ConditionBuilder::and().node(self.term()?);
		while self.peek() == Some(&Token::And) {
			self.position += 1;
			builder = builder.node(self.term()?);
		}
		builder.build()
	}

	fn term(&mut self) -> DatabaseResult<ConditionNode> {
		match self.next() {
			Some(Token::LParen) => {
				let node = self.expr()?;
				self.expect(Token::RParen)?;
				Ok(node)
			}
			Some(Token::Ident(name)) if name.eq_ignore_ascii_case("begins_with") && self.peek() == Some(&Token::LParen) => {
				self.expect(Token::LParen)?;
				let field = self.ident()?;
				self.expect(Token::Comma)?;
				let prefix = self.param()?;
				self.expect(Token::RParen)?;
				ConditionBuilder::and()
					.condition(&field, Operator::BeginsWith, prefix)
					.build()
			}
			Some(Token::Ident(field)) => match self.next() {
				Some(Token::Op(operator)) => {
					let value = self.param()?;
					ConditionBuilder::and().condition(&field, operator, value).build()
				}
				Some(Token::In) => {
					let values = if self.peek() == Some(&Token::LParen) {
						self.position += 1;
						let mut values = vec![self.param()?];
						while self.peek() == Some(&Token::Comma) {
							self.position += 1;
							values.push(self.param()?);
						}
						self.expect(Token::RParen)?;
						Value::List(values)
					} else {
						self.param()?
					};
					ConditionBuilder::and().is_in(&field, values).build()
				}
				other => Err(syntax_error(
					self.text,
					format!("expected operator after '{field}', found {other:?}"),
				)),
			},
			other => Err(syntax_error(self.text, format!("expected condition, found {other:?}"))),
		}
	}
}

/// Parse `text` into a condition tree, taking comparison values from `params`
pub fn parse_condition(text: &str, params: &BTreeMap<String, Value>) -> DatabaseResult<ConditionNode> {
	let tokens = tokenize(text)?;
	if tokens.is_empty() {
		return Err(syntax_error(text, "empty condition"));
	}
	let mut parser = Parser {
		text,
		tokens,
		position: 0,
		params,
	};
	let node = parser.expr()?;
	if let Some(extra) = parser.peek() {
		return Err(syntax_error(text, format!("unexpected trailing {extra:?}")));
	}
	Ok(node)
}
