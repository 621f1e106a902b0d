//! DynamoDB attribute codec
//!
//! Scalars map to `S`/`N`/`B`/`BOOL`. Aggregates use the native typed
//! collections (`L`, `M`, `SS`, `NS`, `BS`) when the element types allow it,
//! and fall back to a JSON document in an `S` attribute otherwise. An absent
//! attribute is represented as `None`.

use super::json;
use super::{as_float, check_enum, format_datetime, mismatch, parse_datetime, set_items, TypeCodec};
use crate::database::error::{DatabaseError, DatabaseResult};
use crate::database::types::{Backend, FieldSpec, ScalarAttributeType, SemanticType};
use crate::database::value::Value;
use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A stored item: attribute name to attribute value
pub type Item = HashMap<String, AttributeValue>;

#[derive(Debug, Clone, Copy, Default)]
pub struct KeyValueCodec;

impl KeyValueCodec {
	pub fn new() -> Self {
		Self
	}

	/// Encode a field, honouring its nested-map override
	pub fn encode_field(&self, field: &FieldSpec, value: &Value) -> DatabaseResult<Option<AttributeValue>> {
		match value {
			Value::Map(entries) if field.use_nested_map_encoding => {
				let mut attributes = HashMap::with_capacity(entries.len());
				for (key, item) in entries {
					attributes.insert(key.clone(), encode_dynamic(item)?);
				}
				Ok(Some(AttributeValue::M(attributes)))
			}
			value => self.encode(value, &field.semantic_type),
		}
	}

	/// Decode a field, honouring its nested-map override
	pub fn decode_field(&self, field: &FieldSpec, native: Option<&AttributeValue>) -> DatabaseResult<Value> {
		match native {
			Some(AttributeValue::M(attributes)) if field.use_nested_map_encoding => {
				let mut entries = BTreeMap::new();
				for (key, item) in attributes {
					entries.insert(key.clone(), decode_dynamic(item)?);
				}
				Ok(conform(Value::Map(entries), &field.semantic_type))
			}
			native => self.decode_attribute(native, &field.semantic_type),
		}
	}

	/// Encode a key component; key attributes must be `S`, `N` or `B`
	pub fn encode_key(&self, value: &Value, semantic_type: &SemanticType) -> DatabaseResult<AttributeValue> {
		match self.encode(value, semantic_type)? {
			Some(attr @ (AttributeValue::S(_) | AttributeValue::N(_) | AttributeValue::B(_))) => Ok(attr),
			Some(_) | None => Err(DatabaseError::UnsupportedType {
				backend: Backend::KeyValue.to_string(),
				semantic_type: format!("{semantic_type} as key attribute"),
			}),
		}
	}

	/// Decode from a possibly absent attribute
	pub fn decode_attribute(&self, native: Option<&AttributeValue>, semantic_type: &SemanticType) -> DatabaseResult<Value> {
		match native {
			None | Some(AttributeValue::Null(_)) => Ok(absent_value(semantic_type)),
			Some(attr) => decode_present(attr, semantic_type),
		}
	}

	fn encode_element(&self, value: &Value, element: &SemanticType) -> DatabaseResult<AttributeValue> {
		Ok(self
			.encode(value, element)?
			.unwrap_or(AttributeValue::Null(true)))
	}
}

impl TypeCodec for KeyValueCodec {
	type Native = Option<AttributeValue>;

	fn encode(&self, value: &Value, semantic_type: &SemanticType) -> DatabaseResult<Option<AttributeValue>> {
		semantic_type.ensure_supported(Backend::KeyValue)?;
		if value.is_null() {
			return Ok(None);
		}
		let declared = semantic_type.unwrap_optional();
		let attr = match (declared, value) {
			(SemanticType::String, Value::String(s)) => AttributeValue::S(s.clone()),
			(SemanticType::Int, Value::Int(i)) => AttributeValue::N(i.to_string()),
			(SemanticType::Float, value) => {
				let f = as_float(value).ok_or_else(|| mismatch(declared, value))?;
				AttributeValue::N(format_number(f)?)
			}
			(SemanticType::Bool, Value::Bool(b)) => AttributeValue::Bool(*b),
			(SemanticType::Bytes, Value::Bytes(b)) => AttributeValue::B(Blob::new(b.clone())),
			(SemanticType::DateTime, Value::DateTime(dt)) => AttributeValue::S(format_datetime(dt)),
			(SemanticType::Enum(variants), value) => {
				check_enum(value, variants)?;
				match value {
					Value::Int(i) => AttributeValue::N(i.to_string()),
					Value::String(s) => AttributeValue::S(s.clone()),
					other => return Err(mismatch(declared, other)),
				}
			}
			(SemanticType::Set(element), value) => {
				let items = set_items(value).ok_or_else(|| mismatch(declared, value))?;
				if items.is_empty() {
					// Native sets cannot be empty: a plain set is stored as an
					// absent attribute, an optional one as a JSON document so
					// that it stays distinguishable from None.
					return if semantic_type.is_optional() {
						Ok(Some(AttributeValue::S("[]".to_string())))
					} else {
						Ok(None)
					};
				}
				match native_set_kind(element) {
					Some(kind) => self.encode_native_set(&items, element, kind)?,
					None => AttributeValue::S(json::to_json_text(value, declared)?),
				}
			}
			(SemanticType::List(element), Value::List(items)) => {
				if element.contains_set() {
					AttributeValue::S(json::to_json_text(value, declared)?)
				} else {
					AttributeValue::L(
						items
							.iter()
							.map(|item| self.encode_element(item, element))
							.collect::<DatabaseResult<_>>()?,
					)
				}
			}
			(SemanticType::Map(inner), Value::Map(entries)) => {
				if inner.contains_set() {
					AttributeValue::S(json::to_json_text(value, declared)?)
				} else {
					let mut attributes = HashMap::with_capacity(entries.len());
					for (key, item) in entries {
						attributes.insert(key.clone(), self.encode_element(item, inner)?);
					}
					AttributeValue::M(attributes)
				}
			}
			(SemanticType::Any, value) => AttributeValue::S(serde_json::to_string(&value.to_json())?),
			(declared, value) => return Err(mismatch(declared, value)),
		};
		Ok(Some(attr))
	}

	fn decode(&self, native: &Option<AttributeValue>, semantic_type: &SemanticType) -> DatabaseResult<Value> {
		self.decode_attribute(native.as_ref(), semantic_type)
	}
}

impl KeyValueCodec {
	fn encode_native_set(
		&self, items: &[&Value], element: &SemanticType, kind: ScalarAttributeType,
	) -> DatabaseResult<AttributeValue> {
		let mut strings = Vec::with_capacity(items.len());
		let mut blobs = Vec::new();
		for item in items {
			match (kind, self.encode(item, element)?) {
				(ScalarAttributeType::S, Some(AttributeValue::S(s)))
				| (ScalarAttributeType::N, Some(AttributeValue::N(s))) => strings.push(s),
				(ScalarAttributeType::B, Some(AttributeValue::B(b))) => blobs.push(b),
				_ => return Err(mismatch(element, item)),
			}
		}
		Ok(match kind {
			ScalarAttributeType::S => AttributeValue::Ss(strings),
			ScalarAttributeType::N => AttributeValue::Ns(strings),
			ScalarAttributeType::B => AttributeValue::Bs(blobs),
		})
	}
}

/// Which native set type holds elements of this type, if any
fn native_set_kind(element: &SemanticType) -> Option<ScalarAttributeType> {
	match element {
		SemanticType::String | SemanticType::DateTime => Some(ScalarAttributeType::S),
		SemanticType::Int | SemanticType::Float => Some(ScalarAttributeType::N),
		SemanticType::Bytes => Some(ScalarAttributeType::B),
		SemanticType::Enum(_) if element.is_int_enum() => Some(ScalarAttributeType::N),
		SemanticType::Enum(_) => Some(ScalarAttributeType::S),
		_ => None,
	}
}

/// The key attribute type a scalar field is stored as
pub fn key_attribute_type(semantic_type: &SemanticType) -> DatabaseResult<ScalarAttributeType> {
	match semantic_type {
		SemanticType::Bool => Err(DatabaseError::UnsupportedType {
			backend: Backend::KeyValue.to_string(),
			semantic_type: format!("{semantic_type} as key attribute"),
		}),
		scalar => native_set_kind(scalar).ok_or_else(|| DatabaseError::UnsupportedType {
			backend: Backend::KeyValue.to_string(),
			semantic_type: format!("{semantic_type} as key attribute"),
		}),
	}
}

/// What an absent attribute means for the declared type
fn absent_value(semantic_type: &SemanticType) -> Value {
	match semantic_type {
		SemanticType::Set(_) => Value::Set(BTreeSet::new()),
		_ => Value::Null,
	}
}

fn decode_present(attr: &AttributeValue, semantic_type: &SemanticType) -> DatabaseResult<Value> {
	let declared = semantic_type.unwrap_optional();
	let unexpected = || DatabaseError::invalid_value(declared, attribute_kind(attr));
	match (declared, attr) {
		(SemanticType::String, AttributeValue::S(s)) => Ok(Value::String(s.clone())),
		(SemanticType::Int, AttributeValue::N(n)) => n.parse().map(Value::Int).map_err(|_| unexpected()),
		(SemanticType::Float, AttributeValue::N(n)) => n.parse().map(Value::Float).map_err(|_| unexpected()),
		(SemanticType::Bool, AttributeValue::Bool(b)) => Ok(Value::Bool(*b)),
		(SemanticType::Bytes, AttributeValue::B(b)) => Ok(Value::Bytes(b.as_ref().to_vec())),
		(SemanticType::DateTime, AttributeValue::S(s)) => parse_datetime(s).map(Value::DateTime),
		(SemanticType::Enum(variants), AttributeValue::S(_) | AttributeValue::N(_)) => {
			let value = match attr {
				AttributeValue::N(n) => n.parse().map(Value::Int).map_err(|_| unexpected())?,
				AttributeValue::S(s) => Value::String(s.clone()),
				_ => return Err(unexpected()),
			};
			check_enum(&value, variants)?;
			Ok(value)
		}
		(SemanticType::Set(element), AttributeValue::Ss(items) | AttributeValue::Ns(items)) => {
			let wrap: fn(String) -> AttributeValue = if matches!(attr, AttributeValue::Ss(_)) {
				AttributeValue::S
			} else {
				AttributeValue::N
			};
			items
				.iter()
				.map(|item| decode_present(&wrap(item.clone()), element))
				.collect::<DatabaseResult<_>>()
				.map(Value::Set)
		}
		(SemanticType::Set(element), AttributeValue::Bs(items)) => items
			.iter()
			.map(|item| decode_present(&AttributeValue::B(item.clone()), element))
			.collect::<DatabaseResult<_>>()
			.map(Value::Set),
		(SemanticType::List(element), AttributeValue::L(items)) => items
			.iter()
			.map(|item| match item {
				AttributeValue::Null(_) => Ok(Value::Null),
				item => decode_present(item, element),
			})
			.collect::<DatabaseResult<_>>()
			.map(Value::List),
		(SemanticType::Map(inner), AttributeValue::M(attributes)) => attributes
			.iter()
			.map(|(key, item)| {
				let value = match item {
					AttributeValue::Null(_) => Value::Null,
					item => decode_present(item, inner)?,
				};
				Ok((key.clone(), value))
			})
			.collect::<DatabaseResult<_>>()
			.map(Value::Map),
		(SemanticType::List(_) | SemanticType::Set(_) | SemanticType::Map(_), AttributeValue::S(text)) => {
			json::from_json_text(text, declared)
		}
		(SemanticType::Any, AttributeValue::S(text)) => Ok(Value::Json(serde_json::from_str(text)?)),
		_ => Err(unexpected()),
	}
}

/// DynamoDB numbers carry at most 38 significant digits; the shortest
/// round-trip representation of an `f64` always fits.
fn format_number(f: f64) -> DatabaseResult<String> {
	if !f.is_finite() {
		return Err(DatabaseError::invalid_value("finite float", f.to_string()));
	}
	let plain = f.to_string();
	if plain.len() <= 38 {
		Ok(plain)
	} else {
		Ok(format!("{f:e}"))
	}
}

/// Number text for a runtime float; whole values keep a fractional part so
/// they decode as floats again
fn dynamic_float(f: f64) -> DatabaseResult<String> {
	let text = format_number(f)?;
	if text.contains(['.', 'e', 'E']) {
		Ok(text)
	} else {
		Ok(format!("{text}.0"))
	}
}

/// Widen dynamically decoded numbers to a declared float type. The service
/// trims `2.0` to `2`, so a whole float can come back looking like an integer.
fn conform(value: Value, declared: &SemanticType) -> Value {
	match (declared.unwrap_optional(), value) {
		(SemanticType::Float, Value::Int(i)) => Value::Float(i as f64),
		(SemanticType::List(element), Value::List(items)) => {
			Value::List(items.into_iter().map(|item| conform(item, element)).collect())
		}
		(SemanticType::Set(element), Value::Set(items)) => {
			Value::Set(items.into_iter().map(|item| conform(item, element)).collect())
		}
		(SemanticType::Map(element), Value::Map(entries)) => Value::Map(
			entries
				.into_iter()
				.map(|(key, item)| (key, conform(item, element)))
				.collect(),
		),
		(_, value) => value,
	}
}

/// Encode by runtime value, ignoring any declared type
pub fn encode_dynamic(value: &Value) -> DatabaseResult<AttributeValue> {
	Ok(match value {
		Value::Null => AttributeValue::Null(true),
		Value::String(s) => AttributeValue::S(s.clone()),
		Value::Int(i) => AttributeValue::N(i.to_string()),
		Value::Float(f) => AttributeValue::N(dynamic_float(*f)?),
		Value::Bool(b) => AttributeValue::Bool(*b),
		Value::Bytes(b) => AttributeValue::B(Blob::new(b.clone())),
		Value::DateTime(dt) => AttributeValue::S(format_datetime(dt)),
		Value::List(items) => AttributeValue::L(items.iter().map(encode_dynamic).collect::<DatabaseResult<_>>()?),
		Value::Set(items) => encode_dynamic_set(items)?,
		Value::Map(entries) => {
			let mut attributes = HashMap::with_capacity(entries.len());
			for (key, item) in entries {
				attributes.insert(key.clone(), encode_dynamic(item)?);
			}
			AttributeValue::M(attributes)
		}
		Value::Json(json) => encode_dynamic(&Value::from_json(json))?,
	})
}

fn encode_dynamic_set(items: &BTreeSet<Value>) -> DatabaseResult<AttributeValue> {
	if !items.is_empty() && items.iter().all(|v| matches!(v, Value::String(_))) {
		return Ok(AttributeValue::Ss(items.iter().map(ToString::to_string).collect()));
	}
	if !items.is_empty() && items.iter().all(|v| matches!(v, Value::Int(_))) {
		return Ok(AttributeValue::Ns(items.iter().map(ToString::to_string).collect()));
	}
	Ok(AttributeValue::L(items.iter().map(encode_dynamic).collect::<DatabaseResult<_>>()?))
}

/// Decode by attribute kind, ignoring any declared type
pub fn decode_dynamic(attr: &AttributeValue) -> DatabaseResult<Value> {
	Ok(match attr {
		AttributeValue::S(s) => Value::String(s.clone()),
		AttributeValue::N(n) => match n.parse::<i64>() {
			Ok(i) if !n.contains(['.', 'e', 'E']) => Value::Int(i),
			_ => Value::Float(
				n.parse()
					.map_err(|_| DatabaseError::invalid_value("number", n.clone()))?,
			),
		},
		AttributeValue::Bool(b) => Value::Bool(*b),
		AttributeValue::B(b) => Value::Bytes(b.as_ref().to_vec()),
		AttributeValue::Null(_) => Value::Null,
		AttributeValue::L(items) => Value::List(items.iter().map(decode_dynamic).collect::<DatabaseResult<_>>()?),
		AttributeValue::M(attributes) => Value::Map(
			attributes
				.iter()
				.map(|(k, v)| Ok((k.clone(), decode_dynamic(v)?)))
				.collect::<DatabaseResult<_>>()?,
		),
		AttributeValue::Ss(items) => Value::set(items.iter().cloned()),
		AttributeValue::Ns(items) => Value::Set(
			items
				.iter()
				.map(|n| decode_dynamic(&AttributeValue::N(n.clone())))
				.collect::<DatabaseResult<_>>()?,
		),
		AttributeValue::Bs(items) => Value::set(items.iter().map(|b| b.as_ref().to_vec())),
		other => return Err(DatabaseError::invalid_value("known attribute kind", attribute_kind(other))),
	})
}

pub fn attribute_kind(attr: &AttributeValue) -> &'static str {
	match attr {
		AttributeValue::S(_) => "S",
		AttributeValue::N(_) => "N",
		AttributeValue::B(_) => "B",
		AttributeValue::Bool(_) => "BOOL",
		AttributeValue::Null(_) => "NULL",
		AttributeValue::L(_) => "L",
		AttributeValue::M(_) => "M",
		AttributeValue::Ss(_) => "SS",
		AttributeValue::Ns(_) => "NS",
		AttributeValue::Bs(_) => "BS",
		_ => "unknown",
	}
}

/// Serialize a key (`S`/`N`/`B` attributes only) as a DynamoDB-JSON cursor
pub fn key_to_cursor(key: &Item) -> DatabaseResult<String> {
	let mut object = BTreeMap::new();
	for (name, attr) in key {
		let typed = match attr {
			AttributeValue::S(s) => serde_json::json!({ "S": s }),
			AttributeValue::N(n) => serde_json::json!({ "N": n }),
			AttributeValue::B(b) => {
				use base64::Engine;
				serde_json::json!({ "B": base64::engine::general_purpose::STANDARD.encode(b.as_ref()) })
			}
			other => {
				return Err(DatabaseError::invalid_value("key attribute", attribute_kind(other)));
			}
		};
		object.insert(name.clone(), typed);
	}
	Ok(serde_json::to_string(&object)?)
}

/// Parse a cursor produced by [`key_to_cursor`]
pub fn cursor_to_key(cursor: &str) -> DatabaseResult<Item> {
	let invalid = || DatabaseError::InvalidCursor(cursor.to_string());
	let object: BTreeMap<String, BTreeMap<String, String>> =
		serde_json::from_str(cursor).map_err(|_| invalid())?;
	let mut key = Item::with_capacity(object.len());
	for (name, typed) in object {
		let (kind, payload) = typed.into_iter().next().ok_or_else(invalid)?;
		let attr = match kind.as_str() {
			"S" => AttributeValue::S(payload),
			"N" => AttributeValue::N(payload),
			"B" => {
				use base64::Engine;
				let bytes = base64::engine::general_purpose::STANDARD
					.decode(payload)
					.map_err(|_| invalid())?;
				AttributeValue::B(Blob::new(bytes))
			}
			_ => return Err(invalid()),
		};
		key.insert(name, attr);
	}
	Ok(key)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn round_trip(value: Value, ty: SemanticType) {
		let codec = KeyValueCodec::new();
		let native = codec.encode(&value, &ty).expect("encode");
		let decoded = codec.decode(&native, &ty).expect("decode");
		assert_eq!(decoded, value, "round trip of {ty}");
	}

	#[test]
	fn test_scalar_attributes() {
		let codec = KeyValueCodec::new();
		assert_eq!(
			codec.encode(&Value::Int(-7), &SemanticType::Int).unwrap(),
			Some(AttributeValue::N("-7".into()))
		);
		assert_eq!(
			codec.encode(&Value::Bool(true), &SemanticType::Bool).unwrap(),
			Some(AttributeValue::Bool(true))
		);
		assert_eq!(
			codec.encode(&Value::Null, &SemanticType::optional(SemanticType::Int)).unwrap(),
			None
		);
		round_trip(Value::Float(0.1), SemanticType::Float);
		round_trip(Value::Bytes(vec![9, 8, 7]), SemanticType::Bytes);
		round_trip(Value::Null, SemanticType::optional(SemanticType::String));
	}

	#[test]
	fn test_native_sets() {
		let codec = KeyValueCodec::new();
		let tags = Value::set(["y", "x"]);
		let ty = SemanticType::set(SemanticType::String);
		assert_eq!(
			codec.encode(&tags, &ty).unwrap(),
			Some(AttributeValue::Ss(vec!["x".into(), "y".into()]))
		);
		round_trip(tags, ty);
		round_trip(Value::set([3, 1]), SemanticType::set(SemanticType::Int));
		round_trip(Value::set([vec![1u8], vec![2u8]]), SemanticType::set(SemanticType::Bytes));
	}

	#[test]
	fn test_empty_set_is_absent() {
		let codec = KeyValueCodec::new();
		let ty = SemanticType::set(SemanticType::String);
		let empty = Value::set(Vec::<String>::new());
		assert_eq!(codec.encode(&empty, &ty).unwrap(), None);
		assert_eq!(codec.decode(&None, &ty).unwrap(), empty);
	}

	#[test]
	fn test_empty_optional_set_stays_distinct_from_none() {
		let ty = SemanticType::optional(SemanticType::set(SemanticType::Int));
		round_trip(Value::set(Vec::<i64>::new()), ty.clone());
		round_trip(Value::Null, ty);
	}

	#[test]
	fn test_aggregates_use_native_collections() {
		let codec = KeyValueCodec::new();
		let ty = SemanticType::map(SemanticType::list(SemanticType::Int));
		let value = Value::map([("a", Value::list([1, 2]))]);
		match codec.encode(&value, &ty).unwrap() {
			Some(AttributeValue::M(m)) => assert!(matches!(m.get("a"), Some(AttributeValue::L(_)))),
			other => panic!("expected native map, got {other:?}"),
		}
		round_trip(value, ty);
	}

	#[test]
	fn test_aggregates_containing_sets_fall_back_to_json() {
		let codec = KeyValueCodec::new();
		let ty = SemanticType::list(SemanticType::set(SemanticType::String));
		let value = Value::list([Value::set(["a"]), Value::set(Vec::<String>::new())]);
		match codec.encode(&value, &ty).unwrap() {
			Some(AttributeValue::S(text)) => assert_eq!(text, r#"[["a"],[]]"#),
			other => panic!("expected JSON string, got {other:?}"),
		}
		round_trip(value, ty);
	}

	#[test]
	fn test_enum_validation() {
		let codec = KeyValueCodec::new();
		let ty = SemanticType::enumeration(["on", "off"]);
		round_trip(Value::from("on"), ty.clone());
		let err = codec
			.decode(&Some(AttributeValue::S("maybe".into())), &ty)
			.unwrap_err();
		assert!(matches!(err, DatabaseError::InvalidEnumValue { .. }));
	}

	#[test]
	fn test_nested_map_override_uses_runtime_types() {
		let codec = KeyValueCodec::new();
		let field = FieldSpec::new("attrs", SemanticType::map(SemanticType::Any)).with_nested_map_encoding();
		let value = Value::map([
			("n", Value::Int(2)),
			("s", Value::from("x")),
			("inner", Value::map([("f", Value::Float(1.5))])),
		]);
		let encoded = codec.encode_field(&field, &value).unwrap().unwrap();
		match &encoded {
			AttributeValue::M(m) => {
				assert_eq!(m.get("n"), Some(&AttributeValue::N("2".into())));
				assert!(matches!(m.get("inner"), Some(AttributeValue::M(_))));
			}
			other => panic!("expected map, got {other:?}"),
		}
		assert_eq!(codec.decode_field(&field, Some(&encoded)).unwrap(), value);
	}

	#[test]
	fn test_nested_map_keeps_whole_floats() {
		let codec = KeyValueCodec::new();
		let field = FieldSpec::new("attrs", SemanticType::map(SemanticType::Any)).with_nested_map_encoding();
		let value = Value::map([("f", Value::Float(2.0)), ("i", Value::Int(2)), ("l", Value::list([-3.0]))]);
		let encoded = codec.encode_field(&field, &value).unwrap().unwrap();
		match &encoded {
			AttributeValue::M(m) => assert_eq!(m.get("f"), Some(&AttributeValue::N("2.0".into()))),
			other => panic!("expected map, got {other:?}"),
		}
		assert_eq!(codec.decode_field(&field, Some(&encoded)).unwrap(), value);

		// Trimmed by the service, recovered from the declared type
		let typed = FieldSpec::new("scores", SemanticType::map(SemanticType::list(SemanticType::Float)))
			.with_nested_map_encoding();
		let trimmed = AttributeValue::M(HashMap::from([(
			"a".to_string(),
			AttributeValue::L(vec![AttributeValue::N("2".into()), AttributeValue::N("0.5".into())]),
		)]));
		assert_eq!(
			codec.decode_field(&typed, Some(&trimmed)).unwrap(),
			Value::map([("a", Value::list([2.0, 0.5]))])
		);
	}

	#[test]
	fn test_cursor_round_trip() {
		let mut key = Item::new();
		key.insert("id".into(), AttributeValue::S("u1".into()));
		key.insert("age".into(), AttributeValue::N("30".into()));
		let cursor = key_to_cursor(&key).unwrap();
		assert_eq!(cursor, r#"{"age":{"N":"30"},"id":{"S":"u1"}}"#);
		assert_eq!(cursor_to_key(&cursor).unwrap(), key);
		assert!(matches!(
			cursor_to_key("not json"),
			Err(DatabaseError::InvalidCursor(_))
		));
	}

	#[test]
	fn test_key_attribute_types() {
		assert_eq!(key_attribute_type(&SemanticType::String).unwrap(), ScalarAttributeType::S);
		assert_eq!(key_attribute_type(&SemanticType::DateTime).unwrap(), ScalarAttributeType::S);
		assert_eq!(key_attribute_type(&SemanticType::Int).unwrap(), ScalarAttributeType::N);
		assert!(key_attribute_type(&SemanticType::Bool).is_err());
		assert!(key_attribute_type(&SemanticType::list(SemanticType::Int)).is_err());
	}
}
