//! Key-value (DynamoDB) adapter
//!
//! Records are stored as items with one attribute per present field. Point
//! operations go through the primary key, which is the table's hash key.
//! Queries compile to a key condition on the table or one of its global
//! secondary indexes; anything needing a scan is refused.

use super::{Adapter, QueryRequest};
use crate::database::codec::key_value::{cursor_to_key, key_to_cursor, Item};
use crate::database::codec::KeyValueCodec;
use crate::database::condition::{IndexLayout, KeyCondition, KeyConditionCompiler};
use crate::database::error::{DatabaseError, DatabaseResult};
use crate::database::storage::{KeyQuery, KeyValueClient, KeyValueTableDefinition};
use crate::database::types::{Backend, FieldSpec, TableSchema};
use crate::database::value::{PageResult, Record, Value};
use tracing::debug;

pub struct KeyValueAdapter<C: KeyValueClient> {
	client: C,
	schema: TableSchema,
	definition: KeyValueTableDefinition,
	codec: KeyValueCodec,
}

impl<C: KeyValueClient> KeyValueAdapter<C> {
	/// Wrap a client and create the table if it does not exist yet.
	/// Existing tables are used as they are; their key layout is never changed.
	pub async fn new(client: C, schema: TableSchema) -> DatabaseResult<Self> {
		let table = schema.table_name.clone();
		let definition = Self::definition_for(&schema).map_err(|e| e.in_operation(&table, "open"))?;
		let mut adapter = Self {
			client,
			schema,
			definition,
			codec: KeyValueCodec::new(),
		};
		adapter.create_table().await?;
		Ok(adapter)
	}

	fn definition_for(schema: &TableSchema) -> DatabaseResult<KeyValueTableDefinition> {
		schema.validate()?;
		for field in &schema.fields {
			field.semantic_type.ensure_supported(Backend::KeyValue)?;
		}
		KeyValueTableDefinition::from_schema(schema)
	}

	pub fn client(&self) -> &C {
		&self.client
	}

	pub fn definition(&self) -> &KeyValueTableDefinition {
		&self.definition
	}

	fn tagged<T>(&self, result: DatabaseResult<T>, operation: &'static str) -> DatabaseResult<T> {
		result.map_err(|e| e.in_operation(&self.schema.table_name, operation))
	}

	fn primary_key(&self) -> DatabaseResult<&FieldSpec> {
		self.schema
			.primary_key()
			.ok_or_else(|| DatabaseError::schema(&self.schema.table_name, "no primary key field declared"))
	}

	fn key_item(&self, key: &Value) -> DatabaseResult<Item> {
		let pk = self.primary_key()?;
		let attr = self.codec.encode_key(key, &pk.semantic_type)?;
		Ok(Item::from([(pk.name.clone(), attr)]))
	}

	/// Encode a record; absent fields and empty sets are left out of the item
	pub fn encode_record(&self, record: &Record) -> DatabaseResult<Item> {
		let key = self.schema.check_record(record)?;
		let mut item = self.key_item(key)?;
		for field in self.schema.fields.iter().filter(|f| !f.is_primary_key) {
			let Some(value) = record.get(&field.name) else {
				continue;
			};
			if let Some(attr) = self.codec.encode_field(field, value)? {
				item.insert(field.name.clone(), attr);
			}
		}
		Ok(item)
	}

	/// Decode an item; attributes that are not declared fields are ignored
	pub fn decode_item(&self, item: &Item) -> DatabaseResult<Record> {
		let mut record = Record::new();
		for field in &self.schema.fields {
			let value = self.codec.decode_field(field, item.get(&field.name))?;
			record.insert(field.name.clone(), value);
		}
		Ok(record)
	}

	/// Key of an item as the service reports it for a query on `condition`'s
	/// index: the table key plus the index key attributes
	fn last_evaluated_key(&self, item: &Item, index: &IndexLayout) -> Item {
		let mut names: Vec<&str> = self.definition.key_attributes().collect();
		if index.index_name.is_some() {
			names.extend(index.key_attributes());
		}
		names
			.into_iter()
			.filter_map(|name| item.get(name).map(|attr| (name.to_string(), attr.clone())))
			.collect()
	}

	fn compile(&self, request: &QueryRequest) -> DatabaseResult<KeyCondition> {
		request.validate()?;
		if !request.joins.is_empty() {
			return Err(DatabaseError::UnsupportedQuery(
				"joins are only available on relational backends".to_string(),
			));
		}
		let condition = request.condition.as_ref().ok_or_else(|| {
			DatabaseError::UnsupportedQuery("a key condition is required; table scans are not supported".to_string())
		})?;
		KeyConditionCompiler::new(&self.schema).compile(condition, request.index_name.as_deref())
	}

	async fn query_page(&self, request: &QueryRequest) -> DatabaseResult<PageResult> {
		let condition = self.compile(request)?;
		debug!(
			table = self.schema.table_name.as_str(),
			index = condition.index_name(),
			expression = condition.expression().as_str(),
			"key-value query"
		);
		let mut start = request.cursor().map(cursor_to_key).transpose()?;
		let mut items = Vec::new();
		// The service may stop short of the limit, so keep reading until the
		// page is full or the index is exhausted
		loop {
			let remaining = request.limit - items.len();
			let output = self
				.client
				.query(KeyQuery {
					table_name: self.schema.table_name.clone(),
					condition: condition.clone(),
					limit: Some(i32::try_from(remaining).unwrap_or(i32::MAX)),
					scan_forward: !request.reverse,
					exclusive_start_key: start.take(),
				})
				.await?;
			items.extend(output.items);
			match output.last_evaluated_key {
				Some(key) if items.len() < request.limit => start = Some(key),
				_ => break,
			}
		}
		items.truncate(request.limit);

		let next_cursor = match items.last() {
			Some(last) if items.len() == request.limit => {
				key_to_cursor(&self.last_evaluated_key(last, &condition.index))?
			}
			_ => String::new(),
		};
		let records = items
			.iter()
			.map(|item| self.decode_item(item))
			.collect::<DatabaseResult<Vec<_>>>()?;
		Ok(PageResult { records, next_cursor })
	}
}

#[async_trait::async_trait]
impl<C: KeyValueClient> Adapter for KeyValueAdapter<C> {
	fn backend(&self) -> Backend {
		Backend::KeyValue
	}

	fn schema(&self) -> &TableSchema {
		&self.schema
	}

	async fn create_table(&mut self) -> DatabaseResult<()> {
		let result = async {
			if !self.client.table_exists(&self.definition.table_name).await? {
				self.client.create_table(&self.definition).await?;
			}
			Ok::<_, DatabaseError>(())
		}
		.await;
		self.tagged(result, "create_table")
	}

	async fn drop_table(&mut self) -> DatabaseResult<()> {
		let result = self.client.delete_table(&self.schema.table_name).await;
		self.tagged(result, "drop_table")
	}

	async fn save(&mut self, record: &Record) -> DatabaseResult<()> {
		let result = async {
			let item = self.encode_record(record)?;
			self.client.put_item(&self.schema.table_name, item).await
		}
		.await;
		self.tagged(result, "save")
	}

	async fn get(&mut self, key: &Value) -> DatabaseResult<Option<Record>> {
		let result = async {
			let key = self.key_item(key)?;
			match self.client.get_item(&self.schema.table_name, key).await? {
				Some(item) => self.decode_item(&item).map(Some),
				None => Ok(None),
			}
		}
		.await;
		self.tagged(result, "get")
	}

	async fn delete(&mut self, key: &Value) -> DatabaseResult<()> {
		let result = async {
			let key = self.key_item(key)?;
			self.client.delete_item(&self.schema.table_name, key).await
		}
		.await;
		self.tagged(result, "delete")
	}

	async fn query(&mut self, request: &QueryRequest) -> DatabaseResult<PageResult> {
		let result = self.query_page(request).await;
		self.tagged(result, "query")
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::database::condition::ConditionBuilder;
	use crate::database::storage::MemoryKeyValueClient;
	use crate::database::types::{SecondaryIndex, SemanticType};
	use aws_sdk_dynamodb::types::AttributeValue;

	fn users() -> TableSchema {
		TableSchema::new("users")
			.with_field(FieldSpec::primary("id", SemanticType::String))
			.with_field(FieldSpec::new("team", SemanticType::String))
			.with_field(FieldSpec::new("age", SemanticType::Int))
			.with_field(FieldSpec::new("tags", SemanticType::set(SemanticType::String)))
			.with_secondary_index(SecondaryIndex::new("by_team", "team").with_range_key("age"))
	}

	#[tokio::test]
	async fn test_empty_set_is_stored_absent() {
		let client = MemoryKeyValueClient::new();
		let mut adapter = KeyValueAdapter::new(client.clone(), users()).await.unwrap();
		adapter
			.save(&Record::new().with("id", "u2").with("tags", Value::set(Vec::<String>::new())))
			.await
			.unwrap();

		let key = Item::from([("id".to_string(), AttributeValue::S("u2".into()))]);
		let raw = client.raw_item("users", &key).await.unwrap().unwrap();
		assert!(!raw.contains_key("tags"));

		let record = adapter.get(&Value::from("u2")).await.unwrap().unwrap();
		assert_eq!(record.get("tags"), Some(&Value::set(Vec::<String>::new())));
	}

	#[tokio::test]
	async fn test_query_needs_key_condition() {
		let mut adapter = KeyValueAdapter::new(MemoryKeyValueClient::new(), users()).await.unwrap();
		let err = adapter.query(&QueryRequest::new()).await.unwrap_err();
		assert_eq!(err.kind(), crate::database::error::ErrorKind::UnsupportedQuery);

		let by_age = ConditionBuilder::and().ge("age", 18).build().unwrap();
		let err = adapter.query(&QueryRequest::new().with_condition(by_age)).await.unwrap_err();
		assert_eq!(err.kind(), crate::database::error::ErrorKind::UnsupportedQuery);
	}

	#[tokio::test]
	async fn test_index_cursor_carries_index_keys() {
		let mut adapter = KeyValueAdapter::new(MemoryKeyValueClient::new(), users()).await.unwrap();
		for (id, age) in [("a", 40), ("b", 20), ("c", 30)] {
			adapter
				.save(&Record::new().with("id", id).with("team", "red").with("age", age))
				.await
				.unwrap();
		}
		let condition = ConditionBuilder::and().eq("team", "red").build().unwrap();
		let page = adapter
			.query(&QueryRequest::new().with_condition(condition.clone()).with_limit(2))
			.await
			.unwrap();
		let ids: Vec<&Value> = page.records.iter().filter_map(|r| r.get("id")).collect();
		assert_eq!(ids, vec![&Value::from("b"), &Value::from("c")]);
		let key = cursor_to_key(&page.next_cursor).unwrap();
		assert_eq!(key.len(), 3);

		let rest = adapter
			.query(&QueryRequest::new().with_condition(condition).with_limit(2).starting_after(page.next_cursor))
			.await
			.unwrap();
		assert_eq!(rest.records.len(), 1);
		assert!(rest.is_last_page());
	}
}
