//! Type-directed JSON form of semantic values
//!
//! Aggregates that a backend cannot store natively are written as JSON. The
//! declared type drives both directions, so bytes, datetimes and sets come
//! back as the variants they went in as.

use super::{as_float, check_enum, format_datetime, mismatch, parse_datetime, set_items};
use crate::database::error::{DatabaseError, DatabaseResult};
use crate::database::types::{SemanticType, TableSchema};
use crate::database::value::{Record, Value};
use base64::Engine;
use serde_json::Value as Json;

pub fn to_json(value: &Value, semantic_type: &SemanticType) -> DatabaseResult<Json> {
	match (semantic_type, value) {
		(SemanticType::Optional(_), Value::Null) | (SemanticType::Any, Value::Null) => Ok(Json::Null),
		(SemanticType::Optional(inner), value) => to_json(value, inner),
		(SemanticType::String, Value::String(s)) => Ok(Json::String(s.clone())),
		(SemanticType::Int, Value::Int(i)) => Ok(Json::from(*i)),
		(SemanticType::Float, value) => {
			let f = as_float(value).ok_or_else(|| mismatch(semantic_type, value))?;
			serde_json::Number::from_f64(f)
				.map(Json::Number)
				.ok_or_else(|| DatabaseError::invalid_value("finite float", f.to_string()))
		}
		(SemanticType::Bool, Value::Bool(b)) => Ok(Json::Bool(*b)),
		(SemanticType::Bytes, Value::Bytes(b)) => Ok(Json::String(
			base64::engine::general_purpose::STANDARD.encode(b),
		)),
		(SemanticType::DateTime, Value::DateTime(dt)) => Ok(Json::String(format_datetime(dt))),
		(SemanticType::Enum(variants), value) => {
			check_enum(value, variants)?;
			Ok(value.to_json())
		}
		(SemanticType::List(element), Value::List(items)) => items
			.iter()
			.map(|item| to_json(item, element))
			.collect::<DatabaseResult<Vec<_>>>()
			.map(Json::Array),
		(SemanticType::Set(element), value) => {
			let items = set_items(value).ok_or_else(|| mismatch(semantic_type, value))?;
			items
				.into_iter()
				.map(|item| to_json(item, element))
				.collect::<DatabaseResult<Vec<_>>>()
				.map(Json::Array)
		}
		(SemanticType::Map(inner), Value::Map(entries)) => {
			let mut object = serde_json::Map::new();
			for (key, item) in entries {
				object.insert(key.clone(), to_json(item, inner)?);
			}
			Ok(Json::Object(object))
		}
		(SemanticType::Any, value) => Ok(value.to_json()),
		(semantic_type, value) => Err(mismatch(semantic_type, value)),
	}
}

pub fn from_json(json: &Json, semantic_type: &SemanticType) -> DatabaseResult<Value> {
	let unexpected = || DatabaseError::invalid_value(semantic_type, json_kind(json));
	match (semantic_type, json) {
		(SemanticType::Optional(_), Json::Null) => Ok(Value::Null),
		(SemanticType::Optional(inner), json) => from_json(json, inner),
		(SemanticType::Any, json) => Ok(Value::Json(json.clone())),
		(SemanticType::String, Json::String(s)) => Ok(Value::String(s.clone())),
		(SemanticType::Int, Json::Number(n)) => n.as_i64().map(Value::Int).ok_or_else(unexpected),
		(SemanticType::Float, Json::Number(n)) => n.as_f64().map(Value::Float).ok_or_else(unexpected),
		(SemanticType::Bool, Json::Bool(b)) => Ok(Value::Bool(*b)),
		(SemanticType::Bytes, Json::String(s)) => base64::engine::general_purpose::STANDARD
			.decode(s)
			.map(Value::Bytes)
			.map_err(|_| DatabaseError::invalid_value("base64 bytes", s.clone())),
		(SemanticType::DateTime, Json::String(s)) => parse_datetime(s).map(Value::DateTime),
		(SemanticType::Enum(variants), json) => {
			let value = match json {
				Json::String(s) => Value::String(s.clone()),
				Json::Number(n) => n.as_i64().map(Value::Int).ok_or_else(unexpected)?,
				_ => return Err(unexpected()),
			};
			check_enum(&value, variants)?;
			Ok(value)
		}
		(SemanticType::List(element), Json::Array(items)) => items
			.iter()
			.map(|item| from_json(item, element))
			.collect::<DatabaseResult<Vec<_>>>()
			.map(Value::List),
		(SemanticType::Set(element), Json::Array(items)) => items
			.iter()
			.map(|item| from_json(item, element))
			.collect::<DatabaseResult<_>>()
			.map(Value::Set),
		(SemanticType::Map(inner), Json::Object(entries)) => entries
			.iter()
			.map(|(key, item)| Ok((key.clone(), from_json(item, inner)?)))
			.collect::<DatabaseResult<_>>()
			.map(Value::Map),
		_ => Err(unexpected()),
	}
}

/// Encode to JSON text
pub fn to_json_text(value: &Value, semantic_type: &SemanticType) -> DatabaseResult<String> {
	Ok(serde_json::to_string(&to_json(value, semantic_type)?)?)
}

/// Decode from JSON text
pub fn from_json_text(text: &str, semantic_type: &SemanticType) -> DatabaseResult<Value> {
	let json: Json = serde_json::from_str(text)?;
	from_json(&json, semantic_type)
}

/// Typed record from a JSON object, each member decoded as its declared field
pub fn record_from_json(schema: &TableSchema, json: &Json) -> DatabaseResult<Record> {
	let Json::Object(members) = json else {
		return Err(DatabaseError::InvalidRecord(format!("expected a JSON object, got {}", json_kind(json))));
	};
	let mut record = Record::new();
	for (name, member) in members {
		let field = schema.field(name).ok_or_else(|| {
			DatabaseError::InvalidRecord(format!("field '{name}' is not declared on table '{}'", schema.table_name))
		})?;
		record.insert(name.clone(), from_json(member, &field.semantic_type)?);
	}
	Ok(record)
}

fn json_kind(json: &Json) -> &'static str {
	match json {
		Json::Null => "null",
		Json::Bool(_) => "bool",
		Json::Number(_) => "number",
		Json::String(_) => "string",
		Json::Array(_) => "array",
		Json::Object(_) => "object",
	}
}
