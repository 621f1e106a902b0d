//! Relational cell codec shared by SQLite and Postgres
//!
//! Both engines read and write [`SqlValue`] cells; the [`SqlDialect`] decides
//! which cell kind and column type each semantic type maps to. SQLite keeps
//! booleans as integers and aggregates as JSON text, Postgres uses native
//! `BOOLEAN`, `BYTEA` and `JSONB` columns.

use super::json;
use super::{as_float, check_enum, format_datetime, mismatch, parse_datetime, TypeCodec};
use crate::database::error::{DatabaseError, DatabaseResult};
use crate::database::types::{Backend, SemanticType};
use crate::database::value::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlDialect {
	Sqlite,
	Postgres,
}

/// Storage class of a relational cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
	Text,
	Integer,
	Real,
	Bool,
	Blob,
	Json,
}

impl SqlDialect {
	pub fn backend(&self) -> Backend {
		match self {
			SqlDialect::Sqlite => Backend::Sqlite,
			SqlDialect::Postgres => Backend::Postgres,
		}
	}

	/// Bound parameter marker for the 1-based `index`
	pub fn placeholder(&self, index: usize) -> String {
		match self {
			SqlDialect::Sqlite => format!("?{index}"),
			SqlDialect::Postgres => format!("${index}"),
		}
	}

	pub fn quote_identifier(&self, ident: &str) -> String {
		format!("\"{}\"", ident.replace('"', "\"\""))
	}

	/// The cell kind a semantic type is stored as
	pub fn storage_type(&self, semantic_type: &SemanticType) -> SqlType {
		match semantic_type {
			SemanticType::Optional(inner) => self.storage_type(inner),
			SemanticType::String | SemanticType::DateTime => SqlType::Text,
			SemanticType::Int => SqlType::Integer,
			SemanticType::Float => SqlType::Real,
			SemanticType::Bool => match self {
				SqlDialect::Sqlite => SqlType::Integer,
				SqlDialect::Postgres => SqlType::Bool,
			},
			SemanticType::Bytes => SqlType::Blob,
			enumeration @ SemanticType::Enum(_) => {
				if enumeration.is_int_enum() {
					SqlType::Integer
				} else {
					SqlType::Text
				}
			}
			SemanticType::List(_) | SemanticType::Set(_) | SemanticType::Map(_) | SemanticType::Any => {
				match self {
					SqlDialect::Sqlite => SqlType::Text,
					SqlDialect::Postgres => SqlType::Json,
				}
			}
		}
	}

	/// Column type used in DDL
	pub fn column_type(&self, semantic_type: &SemanticType) -> DatabaseResult<&'static str> {
		semantic_type.ensure_supported(self.backend())?;
		Ok(match (self, self.storage_type(semantic_type)) {
			(_, SqlType::Text) => "TEXT",
			(SqlDialect::Sqlite, SqlType::Integer) => "INTEGER",
			(SqlDialect::Postgres, SqlType::Integer) => "BIGINT",
			(SqlDialect::Sqlite, SqlType::Real) => "REAL",
			(SqlDialect::Postgres, SqlType::Real) => "DOUBLE PRECISION",
			(_, SqlType::Bool) => "BOOLEAN",
			(SqlDialect::Sqlite, SqlType::Blob) => "BLOB",
			(SqlDialect::Postgres, SqlType::Blob) => "BYTEA",
			(_, SqlType::Json) => "JSONB",
		})
	}
}

impl fmt::Display for SqlDialect {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.backend())
	}
}

/// A relational cell as read from or bound to a statement
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
	Null,
	Integer(i64),
	Real(f64),
	Text(String),
	Bool(bool),
	Blob(Vec<u8>),
	Json(serde_json::Value),
}

impl SqlValue {
	/// Encode a value with no declared type, as used for hand-written SQL parameters
	pub fn from_untyped(value: &Value, dialect: SqlDialect) -> Self {
		match value {
			Value::Null => SqlValue::Null,
			Value::String(s) => SqlValue::Text(s.clone()),
			Value::Int(i) => SqlValue::Integer(*i),
			Value::Float(f) => SqlValue::Real(*f),
			Value::Bool(b) => match dialect {
				SqlDialect::Sqlite => SqlValue::Integer(i64::from(*b)),
				SqlDialect::Postgres => SqlValue::Bool(*b),
			},
			Value::Bytes(b) => SqlValue::Blob(b.clone()),
			Value::DateTime(dt) => SqlValue::Text(format_datetime(dt)),
			other => match dialect {
				SqlDialect::Sqlite => SqlValue::Text(other.to_json().to_string()),
				SqlDialect::Postgres => SqlValue::Json(other.to_json()),
			},
		}
	}

	/// Decode a cell with no declared type, as used for joined or ad hoc columns
	pub fn into_untyped(self) -> Value {
		match self {
			SqlValue::Null => Value::Null,
			SqlValue::Integer(i) => Value::Int(i),
			SqlValue::Real(f) => Value::Float(f),
			SqlValue::Text(s) => Value::String(s),
			SqlValue::Bool(b) => Value::Bool(b),
			SqlValue::Blob(b) => Value::Bytes(b),
			SqlValue::Json(json) => Value::Json(json),
		}
	}

	fn kind(&self) -> &'static str {
		match self {
			SqlValue::Null => "NULL",
			SqlValue::Integer(_) => "INTEGER",
			SqlValue::Real(_) => "REAL",
			SqlValue::Text(_) => "TEXT",
			SqlValue::Bool(_) => "BOOLEAN",
			SqlValue::Blob(_) => "BLOB",
			SqlValue::Json(_) => "JSON",
		}
	}
}

/// A statement parameter with the column type it binds against, when known.
/// Postgres needs the type to bind a typed NULL.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlParam {
	pub value: SqlValue,
	pub sql_type: Option<SqlType>,
}

impl SqlParam {
	pub fn typed(value: SqlValue, sql_type: SqlType) -> Self {
		Self {
			value,
			sql_type: Some(sql_type),
		}
	}

	pub fn untyped(value: SqlValue) -> Self {
		Self { value, sql_type: None }
	}
}

#[derive(Debug, Clone, Copy)]
pub struct RelationalCodec {
	dialect: SqlDialect,
}

impl RelationalCodec {
	pub fn new(dialect: SqlDialect) -> Self {
		Self { dialect }
	}

	pub fn dialect(&self) -> SqlDialect {
		self.dialect
	}

	/// Encode into a parameter carrying the column type
	pub fn encode_param(&self, value: &Value, semantic_type: &SemanticType) -> DatabaseResult<SqlParam> {
		Ok(SqlParam::typed(
			self.encode(value, semantic_type)?,
			self.dialect.storage_type(semantic_type),
		))
	}
}

impl TypeCodec for RelationalCodec {
	type Native = SqlValue;

	fn encode(&self, value: &Value, semantic_type: &SemanticType) -> DatabaseResult<SqlValue> {
		semantic_type.ensure_supported(self.dialect.backend())?;
		if value.is_null() {
			return Ok(SqlValue::Null);
		}
		let declared = semantic_type.unwrap_optional();
		Ok(match (declared, value) {
			(SemanticType::String, Value::String(s)) => SqlValue::Text(s.clone()),
			(SemanticType::Int, Value::Int(i)) => SqlValue::Integer(*i),
			(SemanticType::Float, value) => SqlValue::Real(as_float(value).ok_or_else(|| mismatch(declared, value))?),
			(SemanticType::Bool, Value::Bool(b)) => match self.dialect {
				SqlDialect::Sqlite => SqlValue::Integer(i64::from(*b)),
				SqlDialect::Postgres => SqlValue::Bool(*b),
			},
			(SemanticType::Bytes, Value::Bytes(b)) => SqlValue::Blob(b.clone()),
			(SemanticType::DateTime, Value::DateTime(dt)) => SqlValue::Text(format_datetime(dt)),
			(SemanticType::Enum(variants), value) => {
				check_enum(value, variants)?;
				match value {
					Value::Int(i) => SqlValue::Integer(*i),
					Value::String(s) => SqlValue::Text(s.clone()),
					other => return Err(mismatch(declared, other)),
				}
			}
			(SemanticType::List(_) | SemanticType::Set(_) | SemanticType::Map(_) | SemanticType::Any, value) => {
				match self.dialect {
					SqlDialect::Sqlite => SqlValue::Text(json::to_json_text(value, declared)?),
					SqlDialect::Postgres => SqlValue::Json(json::to_json(value, declared)?),
				}
			}
			(declared, value) => return Err(mismatch(declared, value)),
		})
	}

	fn decode(&self, native: &SqlValue, semantic_type: &SemanticType) -> DatabaseResult<Value> {
		let declared = semantic_type.unwrap_optional();
		let unexpected = || DatabaseError::invalid_value(declared, native.kind());
		match (declared, native) {
			(_, SqlValue::Null) => Ok(Value::Null),
			(SemanticType::String, SqlValue::Text(s)) => Ok(Value::String(s.clone())),
			(SemanticType::Int, SqlValue::Integer(i)) => Ok(Value::Int(*i)),
			(SemanticType::Float, SqlValue::Real(f)) => Ok(Value::Float(*f)),
			(SemanticType::Float, SqlValue::Integer(i)) => Ok(Value::Float(*i as f64)),
			(SemanticType::Bool, SqlValue::Bool(b)) => Ok(Value::Bool(*b)),
			(SemanticType::Bool, SqlValue::Integer(i)) => Ok(Value::Bool(*i != 0)),
			(SemanticType::Bytes, SqlValue::Blob(b)) => Ok(Value::Bytes(b.clone())),
			(SemanticType::DateTime, SqlValue::Text(s)) => parse_datetime(s).map(Value::DateTime),
			(SemanticType::Enum(variants), SqlValue::Text(_) | SqlValue::Integer(_)) => {
				let value = match native {
					SqlValue::Integer(i) => Value::Int(*i),
					SqlValue::Text(s) => Value::String(s.clone()),
					_ => return Err(unexpected()),
				};
				check_enum(&value, variants)?;
				Ok(value)
			}
			(SemanticType::List(_) | SemanticType::Set(_) | SemanticType::Map(_) | SemanticType::Any, SqlValue::Text(text)) => {
				json::from_json_text(text, declared)
			}
			(SemanticType::List(_) | SemanticType::Set(_) | SemanticType::Map(_) | SemanticType::Any, SqlValue::Json(doc)) => {
				json::from_json(doc, declared)
			}
			_ => Err(unexpected()),
		}
	}
}
