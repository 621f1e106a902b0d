//! Semantic values and records
//!
//! A [`Value`] is the backend-neutral form of a field's contents. Values are
//! totally ordered (floats compare with `total_cmp`) so they can live in sets
//! and so every listing built from them is deterministic.

use base64::Engine;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A field value in its semantic (backend-independent) form
#[derive(Debug, Clone)]
pub enum Value {
	Null,
	String(String),
	Int(i64),
	Float(f64),
	Bool(bool),
	Bytes(Vec<u8>),
	DateTime(DateTime<Utc>),
	List(Vec<Value>),
	Set(BTreeSet<Value>),
	Map(BTreeMap<String, Value>),
	/// Free-form document, the canonical form of `Any` fields
	Json(serde_json::Value),
}

impl Value {
	/// Build a set value from any collection of values
	pub fn set<I, V>(items: I) -> Self
	where
		I: IntoIterator<Item = V>,
		V: Into<Value>,
	{
		Value::Set(items.into_iter().map(Into::into).collect())
	}

	/// Build a list value from any collection of values
	pub fn list<I, V>(items: I) -> Self
	where
		I: IntoIterator<Item = V>,
		V: Into<Value>,
	{
		Value::List(items.into_iter().map(Into::into).collect())
	}

	/// Build a map value from string keys
	pub fn map<I, K, V>(entries: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<Value>,
	{
		Value::Map(
			entries
				.into_iter()
				.map(|(k, v)| (k.into(), v.into()))
				.collect(),
		)
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Value::Null)
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::String(s) => Some(s),
			_ => None,
		}
	}

	/// Short name of the variant, used in error messages
	pub fn type_name(&self) -> &'static str {
		match self {
			Value::Null => "null",
			Value::String(_) => "string",
			Value::Int(_) => "int",
			Value::Float(_) => "float",
			Value::Bool(_) => "bool",
			Value::Bytes(_) => "bytes",
			Value::DateTime(_) => "datetime",
			Value::List(_) => "list",
			Value::Set(_) => "set",
			Value::Map(_) => "map",
			Value::Json(_) => "json",
		}
	}

	fn rank(&self) -> u8 {
		match self {
			Value::Null => 0,
			Value::Bool(_) => 1,
			Value::Int(_) => 2,
			Value::Float(_) => 3,
			Value::String(_) => 4,
			Value::Bytes(_) => 5,
			Value::DateTime(_) => 6,
			Value::List(_) => 7,
			Value::Set(_) => 8,
			Value::Map(_) => 9,
			Value::Json(_) => 10,
		}
	}

	/// Untyped JSON rendering. Bytes become base64 and datetimes ISO-8601,
	/// so the output is suitable for display and for `Any` documents.
	pub fn to_json(&self) -> serde_json::Value {
		use serde_json::Value as Json;
		match self {
			Value::Null => Json::Null,
			Value::String(s) => Json::String(s.clone()),
			Value::Int(i) => Json::from(*i),
			Value::Float(f) => serde_json::Number::from_f64(*f)
				.map(Json::Number)
				.unwrap_or(Json::Null),
			Value::Bool(b) => Json::Bool(*b),
			Value::Bytes(b) => Json::String(base64::engine::general_purpose::STANDARD.encode(b)),
			Value::DateTime(dt) => Json::String(crate::database::codec::format_datetime(dt)),
			Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
			Value::Set(items) => Json::Array(items.iter().map(Value::to_json).collect()),
			Value::Map(entries) => Json::Object(
				entries
					.iter()
					.map(|(k, v)| (k.clone(), v.to_json()))
					.collect(),
			),
			Value::Json(json) => json.clone(),
		}
	}

	/// Untyped conversion from JSON: numbers become `Int` when integral,
	/// arrays become lists and objects become maps.
	pub fn from_json(json: &serde_json::Value) -> Self {
		use serde_json::Value as Json;
		match json {
			Json::Null => Value::Null,
			Json::Bool(b) => Value::Bool(*b),
			Json::Number(n) => match n.as_i64() {
				Some(i) => Value::Int(i),
				None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
			},
			Json::String(s) => Value::String(s.clone()),
			Json::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
			Json::Object(entries) => Value::Map(
				entries
					.iter()
					.map(|(k, v)| (k.clone(), Value::from_json(v)))
					.collect(),
			),
		}
	}
}

impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		self.cmp(other) == Ordering::Equal
	}
}

impl Eq for Value {}

impl PartialOrd for Value {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Value {
	fn cmp(&self, other: &Self) -> Ordering {
		match (self, other) {
			(Value::Null, Value::Null) => Ordering::Equal,
			(Value::String(a), Value::String(b)) => a.cmp(b),
			(Value::Int(a), Value::Int(b)) => a.cmp(b),
			(Value::Float(a), Value::Float(b)) => a.total_cmp(b),
			(Value::Bool(a), Value::Bool(b)) => a.cmp(b),
			(Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
			(Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
			(Value::List(a), Value::List(b)) => a.cmp(b),
			(Value::Set(a), Value::Set(b)) => a.cmp(b),
			(Value::Map(a), Value::Map(b)) => a.cmp(b),
			// serde_json keeps object keys sorted, so the text form is canonical
			(Value::Json(a), Value::Json(b)) => a.to_string().cmp(&b.to_string()),
			(a, b) => a.rank().cmp(&b.rank()),
		}
	}
}

impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Value::String(s) => write!(f, "{s}"),
			other => write!(f, "{}", other.to_json()),
		}
	}
}

impl From<&str> for Value {
	fn from(s: &str) -> Self {
		Value::String(s.to_string())
	}
}

impl From<String> for Value {
	fn from(s: String) -> Self {
		Value::String(s)
	}
}

impl From<i64> for Value {
	fn from(i: i64) -> Self {
		Value::Int(i)
	}
}

impl From<i32> for Value {
	fn from(i: i32) -> Self {
		Value::Int(i64::from(i))
	}
}

impl From<f64> for Value {
	fn from(f: f64) -> Self {
		Value::Float(f)
	}
}

impl From<bool> for Value {
	fn from(b: bool) -> Self {
		Value::Bool(b)
	}
}

impl From<Vec<u8>> for Value {
	fn from(b: Vec<u8>) -> Self {
		Value::Bytes(b)
	}
}

impl From<DateTime<Utc>> for Value {
	fn from(dt: DateTime<Utc>) -> Self {
		Value::DateTime(dt)
	}
}

impl From<serde_json::Value> for Value {
	fn from(json: serde_json::Value) -> Self {
		Value::Json(json)
	}
}

impl<T: Into<Value>> From<Option<T>> for Value {
	fn from(v: Option<T>) -> Self {
		v.map(Into::into).unwrap_or(Value::Null)
	}
}

/// A stored entity: field name to semantic value.
///
/// Null is the same as absence: inserting `Value::Null` removes the field, so
/// a record never holds an explicit null.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
	values: BTreeMap<String, Value>,
}

impl Record {
	pub fn new() -> Self {
		Self::default()
	}

	/// Builder-style insert
	pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
		self.insert(field, value);
		self
	}

	/// Set a field, returning the previous value. Null removes the field.
	pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
		let field = field.into();
		match value.into() {
			Value::Null => self.values.remove(&field),
			value => self.values.insert(field, value),
		}
	}

	pub fn get(&self, field: &str) -> Option<&Value> {
		self.values.get(field)
	}

	/// The field's value, or `Value::Null` when absent
	pub fn value_or_null(&self, field: &str) -> &Value {
		self.values.get(field).unwrap_or(&Value::Null)
	}

	pub fn remove(&mut self, field: &str) -> Option<Value> {
		self.values.remove(field)
	}

	pub fn contains(&self, field: &str) -> bool {
		self.values.contains_key(field)
	}

	pub fn len(&self) -> usize {
		self.values.len()
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}

	pub fn fields(&self) -> impl Iterator<Item = &str> {
		self.values.keys().map(String::as_str)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
		self.values.iter().map(|(k, v)| (k.as_str(), v))
	}

	pub fn into_inner(self) -> BTreeMap<String, Value> {
		self.values
	}

	/// Untyped JSON object, for display
	pub fn to_json(&self) -> serde_json::Value {
		serde_json::Value::Object(
			self.values
				.iter()
				.map(|(k, v)| (k.clone(), v.to_json()))
				.collect(),
		)
	}
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		let mut record = Record::new();
		for (k, v) in iter {
			record.insert(k, v);
		}
		record
	}
}

/// One page of query results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageResult {
	pub records: Vec<Record>,
	/// Resume token for the next page; empty when this page is the last
	pub next_cursor: String,
}

impl PageResult {
	pub fn is_last_page(&self) -> bool {
		self.next_cursor.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_null_insert_removes_field() {
		let mut record = Record::new().with("id", "u1").with("age", 30);
		assert_eq!(record.len(), 2);

		let previous = record.insert("age", Value::Null);
		assert_eq!(previous, Some(Value::Int(30)));
		assert!(!record.contains("age"));
		assert_eq!(record.value_or_null("age"), &Value::Null);
	}

	#[test]
	fn test_float_ordering_is_total() {
		let set = Value::set([Value::Float(2.5), Value::Float(f64::NAN), Value::Float(-1.0)]);
		match set {
			Value::Set(items) => {
				let items: Vec<_> = items.into_iter().collect();
				assert_eq!(items[0], Value::Float(-1.0));
				assert_eq!(items[1], Value::Float(2.5));
				assert_eq!(items.len(), 3);
			}
			other => panic!("expected set, got {other:?}"),
		}
	}

	#[test]
	fn test_cross_variant_ordering_is_stable() {
		assert!(Value::Null < Value::Bool(false));
		assert!(Value::Int(100) < Value::String("a".into()));
		assert_ne!(Value::Int(1), Value::Float(1.0));
	}

	#[test]
	fn test_untyped_json_conversion() {
		let value = Value::map([
			("n", Value::Int(3)),
			("tags", Value::list(["a", "b"])),
			("ok", Value::Bool(true)),
		]);
		let json = value.to_json();
		assert_eq!(json["n"], 3);
		assert_eq!(json["tags"][1], "b");
		assert_eq!(Value::from_json(&json), value);
	}

	#[test]
	fn test_record_to_json() {
		let record = Record::new()
			.with("id", "u1")
			.with("blob", vec![1u8, 2, 3]);
		let json = record.to_json();
		assert_eq!(json["id"], "u1");
		assert_eq!(json["blob"], "AQID");
	}
}
