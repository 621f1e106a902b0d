//! Backend access beneath the adapters
//!
//! Adapters talk to their backend through one of two traits:
//! - [`SqlStorage`]: a single relational connection executing parameterized
//!   statements (SQLite and Postgres, both through sqlx)
//! - [`KeyValueClient`]: DynamoDB-shaped item operations, implemented by the
//!   real service client and by an in-process table store

pub mod dynamodb;
pub mod memory;
pub mod postgres;
pub mod sqlite;

pub use dynamodb::DynamoDbClient;
pub use memory::MemoryKeyValueClient;
pub use postgres::PostgresStorage;
pub use sqlite::SqliteStorage;

use crate::database::codec::key_value::{key_attribute_type, Item};
use crate::database::codec::{SqlDialect, SqlParam, SqlValue};
use crate::database::condition::KeyCondition;
use crate::database::error::{DatabaseError, DatabaseResult};
use crate::database::types::{AttributeDefinition, KeySchemaElement, KeyType, SecondaryIndex, TableSchema};

/// One result row: column label and cell, in select order
pub type SqlRow = Vec<(String, SqlValue)>;

/// A single relational connection
#[async_trait::async_trait]
pub trait SqlStorage: Send {
	fn dialect(&self) -> SqlDialect;

	/// Run a statement, returning the number of affected rows
	async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> DatabaseResult<u64>;

	/// Run a query and collect every row
	async fn fetch_all(&mut self, sql: &str, params: &[SqlParam]) -> DatabaseResult<Vec<SqlRow>>;

	/// Run parameterless statements in one transaction; nothing is applied
	/// unless all succeed
	async fn execute_batch(&mut self, statements: &[String]) -> DatabaseResult<()>;
}

/// Physical layout of a key-value table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValueTableDefinition {
	pub table_name: String,
	pub key_schema: Vec<KeySchemaElement>,
	pub attribute_definitions: Vec<AttributeDefinition>,
	pub global_secondary_indexes: Vec<SecondaryIndex>,
	pub read_capacity: Option<i64>,
	pub write_capacity: Option<i64>,
}

impl KeyValueTableDefinition {
	/// Derive the table layout from a schema. The table's hash key is the
	/// primary key field; attribute types come from the declared field
	/// types unless given explicitly.
	pub fn from_schema(schema: &TableSchema) -> DatabaseResult<Self> {
		let table = schema.table_name.as_str();
		let extras = &schema.backend_extras;
		let pk = schema
			.primary_key()
			.ok_or_else(|| DatabaseError::schema(table, "no primary key field declared"))?;

		let key_schema = if extras.key_schema.is_empty() {
			vec![KeySchemaElement::hash(&pk.name)]
		} else {
			extras.key_schema.clone()
		};
		// Point lookups take the primary key alone, so it must be the whole table key
		match key_schema.as_slice() {
			[hash] if hash.key_type == KeyType::Hash && hash.attribute_name == pk.name => {}
			[hash] if hash.key_type == KeyType::Hash => {
				return Err(DatabaseError::schema(
					table,
					format!(
						"table hash key '{}' must be the primary key field '{}'",
						hash.attribute_name, pk.name
					),
				));
			}
			_ => return Err(DatabaseError::schema(table, "table key schema must be a single HASH key")),
		}

		let mut key_attributes: Vec<&str> = key_schema.iter().map(|k| k.attribute_name.as_str()).collect();
		for index in &extras.global_secondary_indexes {
			if index.hash_key().is_none() {
				return Err(DatabaseError::schema(
					table,
					format!("index '{}' has no HASH key", index.index_name),
				));
			}
			key_attributes.extend(index.key_schema.iter().map(|k| k.attribute_name.as_str()));
		}
		key_attributes.sort_unstable();
		key_attributes.dedup();

		let mut attribute_definitions = Vec::with_capacity(key_attributes.len());
		for name in key_attributes {
			if let Some(explicit) = extras.attribute_definitions.iter().find(|d| d.attribute_name == name) {
				attribute_definitions.push(explicit.clone());
				continue;
			}
			let field = schema.field(name).ok_or_else(|| {
				DatabaseError::schema(table, format!("key attribute '{name}' is not a declared field"))
			})?;
			attribute_definitions.push(AttributeDefinition {
				attribute_name: name.to_string(),
				attribute_type: key_attribute_type(field.semantic_type.unwrap_optional())?,
			});
		}

		Ok(Self {
			table_name: schema.table_name.clone(),
			key_schema,
			attribute_definitions,
			global_secondary_indexes: extras.global_secondary_indexes.clone(),
			read_capacity: extras.read_capacity,
			write_capacity: extras.write_capacity,
		})
	}

	/// Names of the table's own key attributes
	pub fn key_attributes(&self) -> impl Iterator<Item = &str> {
		self.key_schema.iter().map(|k| k.attribute_name.as_str())
	}
}

/// A key-condition query against a table or one of its indexes
#[derive(Debug, Clone)]
pub struct KeyQuery {
	pub table_name: String,
	pub condition: KeyCondition,
	pub limit: Option<i32>,
	pub scan_forward: bool,
	pub exclusive_start_key: Option<Item>,
}

#[derive(Debug, Clone, Default)]
pub struct KeyQueryOutput {
	pub items: Vec<Item>,
	pub last_evaluated_key: Option<Item>,
}

/// DynamoDB-shaped item operations. Implementations hold no per-call state
/// and may be shared between adapters.
#[async_trait::async_trait]
pub trait KeyValueClient: Send + Sync {
	async fn table_exists(&self, table_name: &str) -> DatabaseResult<bool>;

	/// Create the table and return once it accepts reads and writes
	async fn create_table(&self, definition: &KeyValueTableDefinition) -> DatabaseResult<()>;

	/// Delete the table; a missing table is not an error
	async fn delete_table(&self, table_name: &str) -> DatabaseResult<()>;

	/// Store an item, replacing any item with the same key
	async fn put_item(&self, table_name: &str, item: Item) -> DatabaseResult<()>;

	async fn get_item(&self, table_name: &str, key: Item) -> DatabaseResult<Option<Item>>;

	/// Delete an item; a missing item is not an error
	async fn delete_item(&self, table_name: &str, key: Item) -> DatabaseResult<()>;

	async fn query(&self, query: KeyQuery) -> DatabaseResult<KeyQueryOutput>;
}
