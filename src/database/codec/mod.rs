//! Bidirectional conversion between semantic values and backend cells
//!
//! Each backend has one codec implementing [`TypeCodec`]. Conversion is
//! driven by the declared [`SemanticType`] descriptor tree, recursing into
//! element and value types for aggregates, so no nesting depth is special.

pub mod json;
pub mod key_value;
pub mod relational;

pub use key_value::KeyValueCodec;
pub use relational::{RelationalCodec, SqlDialect, SqlParam, SqlType, SqlValue};

use crate::database::error::{DatabaseError, DatabaseResult};
use crate::database::types::{EnumVariant, SemanticType};
use crate::database::value::Value;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Format accepted on decode for rows written before ISO-8601 storage
pub const LEGACY_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Conversion between semantic values and one backend's native cells
pub trait TypeCodec {
	type Native;

	/// Encode a value declared with `semantic_type`
	fn encode(&self, value: &Value, semantic_type: &SemanticType) -> DatabaseResult<Self::Native>;

	/// Decode a native cell produced for `semantic_type`
	fn decode(&self, native: &Self::Native, semantic_type: &SemanticType) -> DatabaseResult<Value>;
}

/// ISO-8601 with fixed nanosecond precision, so stored text sorts in time order
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
	dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn parse_datetime(text: &str) -> DatabaseResult<DateTime<Utc>> {
	if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
		return Ok(dt.with_timezone(&Utc));
	}
	NaiveDateTime::parse_from_str(text, LEGACY_DATETIME_FORMAT)
		.map(|naive| naive.and_utc())
		.map_err(|_| DatabaseError::invalid_value("ISO-8601 datetime", text))
}

/// Fail with `InvalidEnumValue` unless `value` is one of `variants`
pub fn check_enum(value: &Value, variants: &[EnumVariant]) -> DatabaseResult<()> {
	if variants.iter().any(|v| v.matches(value)) {
		return Ok(());
	}
	let names: Vec<String> = variants.iter().map(ToString::to_string).collect();
	Err(DatabaseError::InvalidEnumValue {
		value: value.to_string(),
		variants: names.join(", "),
	})
}

pub(crate) fn mismatch(semantic_type: &SemanticType, value: &Value) -> DatabaseError {
	DatabaseError::invalid_value(semantic_type, value.type_name())
}

/// Float fields accept integral values so hand-written input need not spell `.0`
pub(crate) fn as_float(value: &Value) -> Option<f64> {
	match value {
		Value::Float(f) => Some(*f),
		Value::Int(i) => Some(*i as f64),
		_ => None,
	}
}

/// Elements of a set-typed value. Lists are accepted and deduplicated.
pub(crate) fn set_items(value: &Value) -> Option<Vec<&Value>> {
	match value {
		Value::Set(items) => Some(items.iter().collect()),
		Value::List(items) => {
			let unique: std::collections::BTreeSet<&Value> = items.iter().collect();
			Some(unique.into_iter().collect())
		}
		_ => None,
	}
}
