//! Type definitions for table schemas
//!
//! Schemas are plain data: they can be assembled with the builder methods
//! below or deserialized from a JSON document, and are validated once when an
//! adapter is constructed.

use crate::database::error::{DatabaseError, DatabaseResult};
use crate::database::value::{Record, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// The storage engines an adapter can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
	KeyValue,
	Postgres,
	Sqlite,
}

impl Backend {
	pub fn is_relational(&self) -> bool {
		!matches!(self, Backend::KeyValue)
	}
}

impl fmt::Display for Backend {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Backend::KeyValue => write!(f, "key-value"),
			Backend::Postgres => write!(f, "postgres"),
			Backend::Sqlite => write!(f, "sqlite"),
		}
	}
}

/// One allowed scalar of an enum type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnumVariant {
	Int(i64),
	Str(String),
}

impl EnumVariant {
	pub fn to_value(&self) -> Value {
		match self {
			EnumVariant::Int(i) => Value::Int(*i),
			EnumVariant::Str(s) => Value::String(s.clone()),
		}
	}

	pub fn matches(&self, value: &Value) -> bool {
		match (self, value) {
			(EnumVariant::Int(a), Value::Int(b)) => a == b,
			(EnumVariant::Str(a), Value::String(b)) => a == b,
			_ => false,
		}
	}
}

impl From<&str> for EnumVariant {
	fn from(s: &str) -> Self {
		EnumVariant::Str(s.to_string())
	}
}

impl From<i64> for EnumVariant {
	fn from(i: i64) -> Self {
		EnumVariant::Int(i)
	}
}

impl fmt::Display for EnumVariant {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			EnumVariant::Int(i) => write!(f, "{i}"),
			EnumVariant::Str(s) => write!(f, "{s}"),
		}
	}
}

/// Backend-independent type of a field, as a descriptor tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "of", rename_all = "snake_case")]
pub enum SemanticType {
	String,
	Int,
	Float,
	Bool,
	Bytes,
	DateTime,
	Enum(Vec<EnumVariant>),
	List(Box<SemanticType>),
	Set(Box<SemanticType>),
	Map(Box<SemanticType>),
	Any,
	Optional(Box<SemanticType>),
}

impl SemanticType {
	pub fn list(element: SemanticType) -> Self {
		SemanticType::List(Box::new(element))
	}

	pub fn set(element: SemanticType) -> Self {
		SemanticType::Set(Box::new(element))
	}

	pub fn map(value: SemanticType) -> Self {
		SemanticType::Map(Box::new(value))
	}

	pub fn optional(inner: SemanticType) -> Self {
		SemanticType::Optional(Box::new(inner))
	}

	pub fn enumeration<I, V>(variants: I) -> Self
	where
		I: IntoIterator<Item = V>,
		V: Into<EnumVariant>,
	{
		SemanticType::Enum(variants.into_iter().map(Into::into).collect())
	}

	pub fn is_optional(&self) -> bool {
		matches!(self, SemanticType::Optional(_))
	}

	/// `value` in the form it reads back as. `Any` slots hold JSON documents,
	/// so anything else stored under them comes back as [`Value::Json`].
	pub fn canonical(&self, value: &Value) -> Value {
		match (self, value) {
			(SemanticType::Optional(_), Value::Null) => Value::Null,
			(SemanticType::Optional(inner), value) => inner.canonical(value),
			(SemanticType::Any, Value::Json(_)) => value.clone(),
			(SemanticType::Any, other) => Value::Json(other.to_json()),
			(SemanticType::List(element), Value::List(items)) => {
				Value::List(items.iter().map(|item| element.canonical(item)).collect())
			}
			(SemanticType::Set(element), Value::Set(items)) => {
				Value::Set(items.iter().map(|item| element.canonical(item)).collect())
			}
			(SemanticType::Map(element), Value::Map(entries)) => Value::Map(
				entries
					.iter()
					.map(|(key, item)| (key.clone(), element.canonical(item)))
					.collect(),
			),
			_ => value.clone(),
		}
	}

	/// The type with every `Optional` layer removed
	pub fn unwrap_optional(&self) -> &SemanticType {
		match self {
			SemanticType::Optional(inner) => inner.unwrap_optional(),
			other => other,
		}
	}

	pub fn is_aggregate(&self) -> bool {
		matches!(
			self.unwrap_optional(),
			SemanticType::List(_) | SemanticType::Set(_) | SemanticType::Map(_)
		)
	}

	/// Whether a `Set` appears anywhere in the descriptor tree
	pub fn contains_set(&self) -> bool {
		match self {
			SemanticType::Set(_) => true,
			SemanticType::List(inner) | SemanticType::Map(inner) | SemanticType::Optional(inner) => {
				inner.contains_set()
			}
			_ => false,
		}
	}

	/// Whether values of this type are integer enum scalars
	pub fn is_int_enum(&self) -> bool {
		match self.unwrap_optional() {
			SemanticType::Enum(variants) => variants.first().is_some_and(|v| matches!(v, EnumVariant::Int(_))),
			_ => false,
		}
	}

	/// Types usable as a primary key: non-optional, totally ordered scalars
	pub fn is_orderable_scalar(&self) -> bool {
		matches!(
			self,
			SemanticType::String
				| SemanticType::Int
				| SemanticType::Float
				| SemanticType::DateTime
				| SemanticType::Enum(_)
		)
	}

	/// Types whose values compare as text, the only ones prefix matching applies to
	pub fn is_textual(&self) -> bool {
		match self.unwrap_optional() {
			SemanticType::String | SemanticType::DateTime => true,
			SemanticType::Enum(_) => !self.is_int_enum(),
			_ => false,
		}
	}

	/// Reject descriptor trees no backend can represent: sets may only hold
	/// plain scalars, and enums need variants of one scalar kind.
	pub fn ensure_supported(&self, backend: Backend) -> DatabaseResult<()> {
		let unsupported = || DatabaseError::UnsupportedType {
			backend: backend.to_string(),
			semantic_type: self.to_string(),
		};
		match self {
			SemanticType::Set(element) => match element.as_ref() {
				SemanticType::String
				| SemanticType::Int
				| SemanticType::Float
				| SemanticType::Bool
				| SemanticType::Bytes
				| SemanticType::DateTime => Ok(()),
				SemanticType::Enum(_) => element.ensure_supported(backend),
				_ => Err(unsupported()),
			},
			SemanticType::Enum(variants) => {
				let ints = variants.iter().filter(|v| matches!(v, EnumVariant::Int(_))).count();
				if variants.is_empty() || (ints != 0 && ints != variants.len()) {
					Err(unsupported())
				} else {
					Ok(())
				}
			}
			SemanticType::List(inner) | SemanticType::Map(inner) | SemanticType::Optional(inner) => {
				inner.ensure_supported(backend)
			}
			_ => Ok(()),
		}
	}
}

impl fmt::Display for SemanticType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SemanticType::String => write!(f, "String"),
			SemanticType::Int => write!(f, "Int"),
			SemanticType::Float => write!(f, "Float"),
			SemanticType::Bool => write!(f, "Bool"),
			SemanticType::Bytes => write!(f, "Bytes"),
			SemanticType::DateTime => write!(f, "DateTime"),
			SemanticType::Enum(variants) => {
				let names: Vec<String> = variants.iter().map(ToString::to_string).collect();
				write!(f, "Enum({})", names.join("|"))
			}
			SemanticType::List(inner) => write!(f, "List<{inner}>"),
			SemanticType::Set(inner) => write!(f, "Set<{inner}>"),
			SemanticType::Map(inner) => write!(f, "Map<String,{inner}>"),
			SemanticType::Any => write!(f, "Any"),
			SemanticType::Optional(inner) => write!(f, "Optional<{inner}>"),
		}
	}
}

/// Declaration of one entity field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
	pub name: String,

	#[serde(rename = "type")]
	pub semantic_type: SemanticType,

	#[serde(default)]
	pub is_primary_key: bool,

	/// Key-value backend only: encode map entries by their runtime value
	/// instead of the declared value type
	#[serde(default)]
	pub use_nested_map_encoding: bool,
}

impl FieldSpec {
	pub fn new(name: impl Into<String>, semantic_type: SemanticType) -> Self {
		Self {
			name: name.into(),
			semantic_type,
			is_primary_key: false,
			use_nested_map_encoding: false,
		}
	}

	pub fn primary(name: impl Into<String>, semantic_type: SemanticType) -> Self {
		Self {
			is_primary_key: true,
			..Self::new(name, semantic_type)
		}
	}

	pub fn with_nested_map_encoding(mut self) -> Self {
		self.use_nested_map_encoding = true;
		self
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum KeyType {
	Hash,
	Range,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySchemaElement {
	pub attribute_name: String,
	pub key_type: KeyType,
}

impl KeySchemaElement {
	pub fn hash(attribute_name: impl Into<String>) -> Self {
		Self {
			attribute_name: attribute_name.into(),
			key_type: KeyType::Hash,
		}
	}

	pub fn range(attribute_name: impl Into<String>) -> Self {
		Self {
			attribute_name: attribute_name.into(),
			key_type: KeyType::Range,
		}
	}
}

/// Scalar attribute types allowed in key-value key schemas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarAttributeType {
	S,
	N,
	B,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDefinition {
	pub attribute_name: String,
	pub attribute_type: ScalarAttributeType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryIndex {
	pub index_name: String,
	pub key_schema: Vec<KeySchemaElement>,
	#[serde(default)]
	pub read_capacity: Option<i64>,
	#[serde(default)]
	pub write_capacity: Option<i64>,
}

impl SecondaryIndex {
	pub fn new(index_name: impl Into<String>, hash_key: impl Into<String>) -> Self {
		Self {
			index_name: index_name.into(),
			key_schema: vec![KeySchemaElement::hash(hash_key)],
			read_capacity: None,
			write_capacity: None,
		}
	}

	pub fn with_range_key(mut self, range_key: impl Into<String>) -> Self {
		self.key_schema.push(KeySchemaElement::range(range_key));
		self
	}

	pub fn hash_key(&self) -> Option<&str> {
		key_attribute(&self.key_schema, KeyType::Hash)
	}

	pub fn range_key(&self) -> Option<&str> {
		key_attribute(&self.key_schema, KeyType::Range)
	}
}

fn key_attribute(key_schema: &[KeySchemaElement], key_type: KeyType) -> Option<&str> {
	key_schema
		.iter()
		.find(|k| k.key_type == key_type)
		.map(|k| k.attribute_name.as_str())
}

/// Key-value table settings; relational backends ignore these
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValueExtras {
	/// Table key schema; defaults to the primary key field as the hash key
	#[serde(default)]
	pub key_schema: Vec<KeySchemaElement>,

	/// Explicit key attribute types; derived from field types when omitted
	#[serde(default)]
	pub attribute_definitions: Vec<AttributeDefinition>,

	#[serde(default)]
	pub global_secondary_indexes: Vec<SecondaryIndex>,

	/// Provisioned capacity; on-demand billing when unset
	#[serde(default)]
	pub read_capacity: Option<i64>,

	#[serde(default)]
	pub write_capacity: Option<i64>,
}

/// Static description of one entity kind and its physical table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
	pub table_name: String,
	pub fields: Vec<FieldSpec>,
	#[serde(default)]
	pub backend_extras: KeyValueExtras,
}

impl TableSchema {
	pub fn new(table_name: impl Into<String>) -> Self {
		Self {
			table_name: table_name.into(),
			fields: Vec::new(),
			backend_extras: KeyValueExtras::default(),
		}
	}

	pub fn with_field(mut self, field: FieldSpec) -> Self {
		self.fields.push(field);
		self
	}

	pub fn with_secondary_index(mut self, index: SecondaryIndex) -> Self {
		self.backend_extras.global_secondary_indexes.push(index);
		self
	}

	pub fn with_capacity(mut self, read: i64, write: i64) -> Self {
		self.backend_extras.read_capacity = Some(read);
		self.backend_extras.write_capacity = Some(write);
		self
	}

	/// Load a schema from a JSON document
	pub fn from_json_str(text: &str) -> DatabaseResult<Self> {
		let schema: TableSchema = serde_json::from_str(text)?;
		schema.validate()?;
		Ok(schema)
	}

	/// Load a schema from a JSON file
	pub fn from_path(path: &Path) -> DatabaseResult<Self> {
		let text = std::fs::read_to_string(path).map_err(|e| {
			DatabaseError::InvalidConfiguration(format!("cannot read schema {}: {e}", path.display()))
		})?;
		Self::from_json_str(&text)
	}

	pub fn field(&self, name: &str) -> Option<&FieldSpec> {
		self.fields.iter().find(|f| f.name == name)
	}

	pub fn primary_key(&self) -> Option<&FieldSpec> {
		self.fields.iter().find(|f| f.is_primary_key)
	}

	pub fn field_names(&self) -> impl Iterator<Item = &str> {
		self.fields.iter().map(|f| f.name.as_str())
	}

	/// Validate the structural rules every backend relies on
	pub fn validate(&self) -> DatabaseResult<()> {
		let table = self.table_name.as_str();
		if table.is_empty() {
			return Err(DatabaseError::schema(table, "table name must not be empty"));
		}

		let mut seen = HashSet::new();
		for field in &self.fields {
			if field.name.is_empty() {
				return Err(DatabaseError::schema(table, "field names must not be empty"));
			}
			if !seen.insert(field.name.as_str()) {
				return Err(DatabaseError::schema(
					table,
					format!("field '{}' is declared twice", field.name),
				));
			}
			if field.use_nested_map_encoding
				&& !matches!(field.semantic_type.unwrap_optional(), SemanticType::Map(_))
			{
				return Err(DatabaseError::schema(
					table,
					format!("nested map encoding on non-map field '{}'", field.name),
				));
			}
		}

		let primary_keys: Vec<&FieldSpec> = self.fields.iter().filter(|f| f.is_primary_key).collect();
		match primary_keys.as_slice() {
			[pk] if pk.semantic_type.is_orderable_scalar() => Ok(()),
			[pk] => Err(DatabaseError::schema(
				table,
				format!(
					"primary key '{}' must be a non-optional orderable scalar, not {}",
					pk.name, pk.semantic_type
				),
			)),
			[] => Err(DatabaseError::schema(table, "no primary key field declared")),
			_ => Err(DatabaseError::schema(table, "more than one primary key field declared")),
		}
	}

	/// Check a record against the declared fields and return its key
	pub fn check_record<'r>(&self, record: &'r Record) -> DatabaseResult<&'r Value> {
		if let Some(unknown) = record.fields().find(|name| self.field(name).is_none()) {
			return Err(DatabaseError::InvalidRecord(format!(
				"field '{unknown}' is not declared on table '{}'",
				self.table_name
			)));
		}
		let pk = self
			.primary_key()
			.ok_or_else(|| DatabaseError::schema(&self.table_name, "no primary key field declared"))?;
		record.get(&pk.name).ok_or_else(|| {
			DatabaseError::InvalidRecord(format!("primary key '{}' is missing", pk.name))
		})
	}

	/// The record as a read returns it once saved. Fields using nested map
	/// encoding keep their runtime types on the key-value backend and are
	/// left as they are here.
	pub fn canonical_record(&self, record: &Record) -> Record {
		let mut canonical = Record::new();
		for (name, value) in record.iter() {
			let value = match self.field(name) {
				Some(field) if !field.use_nested_map_encoding => field.semantic_type.canonical(value),
				_ => value.clone(),
			};
			canonical.insert(name, value);
		}
		canonical
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn users() -> TableSchema {
		TableSchema::new("users")
			.with_field(FieldSpec::primary("id", SemanticType::String))
			.with_field(FieldSpec::new("name", SemanticType::String))
			.with_field(FieldSpec::new("age", SemanticType::Int))
			.with_field(FieldSpec::new("tags", SemanticType::set(SemanticType::String)))
	}

	#[test]
	fn test_validate_accepts_well_formed_schema() {
		assert!(users().validate().is_ok());
	}

	#[test]
	fn test_validate_rejects_bad_primary_keys() {
		let none = TableSchema::new("t").with_field(FieldSpec::new("a", SemanticType::Int));
		assert!(none.validate().is_err());

		let two = TableSchema::new("t")
			.with_field(FieldSpec::primary("a", SemanticType::Int))
			.with_field(FieldSpec::primary("b", SemanticType::Int));
		assert!(two.validate().is_err());

		let aggregate = TableSchema::new("t")
			.with_field(FieldSpec::primary("a", SemanticType::list(SemanticType::Int)));
		assert!(aggregate.validate().is_err());

		let optional = TableSchema::new("t")
			.with_field(FieldSpec::primary("a", SemanticType::optional(SemanticType::Int)));
		assert!(optional.validate().is_err());
	}

	#[test]
	fn test_validate_rejects_duplicates_and_misplaced_overrides() {
		let dup = users().with_field(FieldSpec::new("age", SemanticType::Float));
		assert!(dup.validate().is_err());

		let bad_override = users()
			.with_field(FieldSpec::new("flags", SemanticType::Int).with_nested_map_encoding());
		assert!(bad_override.validate().is_err());
	}

	#[test]
	fn test_check_record() {
		let schema = users();
		let record = Record::new().with("id", "u1").with("age", 3);
		assert_eq!(schema.check_record(&record).unwrap(), &Value::from("u1"));

		let unknown = Record::new().with("id", "u1").with("email", "x");
		assert!(matches!(
			schema.check_record(&unknown),
			Err(DatabaseError::InvalidRecord(_))
		));

		let keyless = Record::new().with("name", "Ann");
		assert!(schema.check_record(&keyless).is_err());
	}

	#[test]
	fn test_schema_from_json() {
		let json = r#"{
			"table_name": "users",
			"fields": [
				{"name": "id", "type": {"type": "string"}, "is_primary_key": true},
				{"name": "status", "type": {"type": "enum", "of": ["active", "banned"]}},
				{"name": "scores", "type": {"type": "list", "of": {"type": "int"}}},
				{"name": "nick", "type": {"type": "optional", "of": {"type": "string"}}}
			],
			"backend_extras": {
				"global_secondary_indexes": [
					{"index_name": "by_status", "key_schema": [{"attribute_name": "status", "key_type": "HASH"}]}
				]
			}
		}"#;
		let schema = TableSchema::from_json_str(json).expect("schema parses");
		assert_eq!(schema.fields.len(), 4);
		assert_eq!(
			schema.field("status").unwrap().semantic_type,
			SemanticType::enumeration(["active", "banned"])
		);
		assert_eq!(
			schema.field("nick").unwrap().semantic_type,
			SemanticType::optional(SemanticType::String)
		);
		assert_eq!(
			schema.backend_extras.global_secondary_indexes[0].hash_key(),
			Some("status")
		);
	}

	#[test]
	fn test_ensure_supported() {
		assert!(SemanticType::set(SemanticType::String)
			.ensure_supported(Backend::Sqlite)
			.is_ok());
		let nested_set = SemanticType::set(SemanticType::list(SemanticType::Int));
		assert!(matches!(
			nested_set.ensure_supported(Backend::KeyValue),
			Err(DatabaseError::UnsupportedType { .. })
		));
		let mixed_enum = SemanticType::Enum(vec![EnumVariant::Int(1), EnumVariant::from("a")]);
		assert!(mixed_enum.ensure_supported(Backend::Postgres).is_err());
	}

	#[test]
	fn test_type_display() {
		let ty = SemanticType::optional(SemanticType::map(SemanticType::list(SemanticType::Int)));
		assert_eq!(ty.to_string(), "Optional<Map<String,List<Int>>>");
	}
}
