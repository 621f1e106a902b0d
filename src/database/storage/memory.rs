//! In-process key-value client
//!
//! Keeps tables in memory and follows the service's rules closely enough
//! for tests and local runs: key attributes must be present and typed as
//! declared, empty sets are rejected, queries honour `Limit`,
//! `ScanIndexForward` and `ExclusiveStartKey`, and items missing an index's
//! key attributes are not visible through that index.

use super::{KeyQuery, KeyQueryOutput, KeyValueClient, KeyValueTableDefinition};
use crate::database::codec::key_value::{attribute_kind, key_to_cursor, Item};
use crate::database::condition::key_value::compare_attributes;
use crate::database::error::{DatabaseError, DatabaseResult};
use crate::database::types::ScalarAttributeType;
use aws_sdk_dynamodb::types::AttributeValue;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

struct MemoryTable {
	definition: KeyValueTableDefinition,
	/// Items by the cursor form of their table key
	items: BTreeMap<String, Item>,
}

impl MemoryTable {
	fn key_of(&self, item: &Item) -> DatabaseResult<Item> {
		let mut key = Item::new();
		for name in self.definition.key_attributes() {
			let attr = item.get(name).ok_or_else(|| {
				DatabaseError::Query(format!("ValidationException: missing key attribute '{name}'"))
			})?;
			self.check_key_type(name, attr)?;
			key.insert(name.to_string(), attr.clone());
		}
		Ok(key)
	}

	fn check_key_type(&self, name: &str, attr: &AttributeValue) -> DatabaseResult<()> {
		let declared = self
			.definition
			.attribute_definitions
			.iter()
			.find(|d| d.attribute_name == name)
			.map(|d| d.attribute_type);
		let matches = matches!(
			(declared, attr),
			(Some(ScalarAttributeType::S), AttributeValue::S(_))
				| (Some(ScalarAttributeType::N), AttributeValue::N(_))
				| (Some(ScalarAttributeType::B), AttributeValue::B(_))
				| (None, _)
		);
		if matches {
			Ok(())
		} else {
			Err(DatabaseError::Query(format!(
				"ValidationException: key attribute '{name}' has type {}",
				attribute_kind(attr)
			)))
		}
	}

	/// Sort position of an item within a query: index range key, then the
	/// table key attributes
	fn position(&self, item: &Item, range_key: Option<&str>) -> Vec<Option<AttributeValue>> {
		let mut position = vec![range_key.and_then(|name| item.get(name).cloned())];
		position.extend(self.definition.key_attributes().map(|name| item.get(name).cloned()));
		position
	}
}

fn compare_positions(a: &[Option<AttributeValue>], b: &[Option<AttributeValue>]) -> Ordering {
	for (x, y) in a.iter().zip(b) {
		let ordering = match (x, y) {
			(Some(x), Some(y)) => compare_attributes(x, y).unwrap_or(Ordering::Equal),
			(None, Some(_)) => Ordering::Less,
			(Some(_), None) => Ordering::Greater,
			(None, None) => Ordering::Equal,
		};
		if ordering != Ordering::Equal {
			return ordering;
		}
	}
	Ordering::Equal
}

fn has_empty_set(attr: &AttributeValue) -> bool {
	match attr {
		AttributeValue::Ss(items) | AttributeValue::Ns(items) => items.is_empty(),
		AttributeValue::Bs(items) => items.is_empty(),
		AttributeValue::L(items) => items.iter().any(has_empty_set),
		AttributeValue::M(entries) => entries.values().any(has_empty_set),
		_ => false,
	}
}

fn not_found(table_name: &str) -> DatabaseError {
	DatabaseError::Query(format!("ResourceNotFoundException: table '{table_name}' does not exist"))
}

/// Shareable in-memory tables; clones see the same data
#[derive(Clone, Default)]
pub struct MemoryKeyValueClient {
	tables: Arc<RwLock<HashMap<String, MemoryTable>>>,
}

impl MemoryKeyValueClient {
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of items stored in a table
	pub async fn item_count(&self, table_name: &str) -> DatabaseResult<usize> {
		let tables = self.tables.read().await;
		let table = tables.get(table_name).ok_or_else(|| not_found(table_name))?;
		Ok(table.items.len())
	}

	/// Raw stored item, for inspecting the attribute encoding
	pub async fn raw_item(&self, table_name: &str, key: &Item) -> DatabaseResult<Option<Item>> {
		let tables = self.tables.read().await;
		let table = tables.get(table_name).ok_or_else(|| not_found(table_name))?;
		Ok(table.items.get(&key_to_cursor(key)?).cloned())
	}
}

#[async_trait::async_trait]
impl KeyValueClient for MemoryKeyValueClient {
	async fn table_exists(&self, table_name: &str) -> DatabaseResult<bool> {
		Ok(self.tables.read().await.contains_key(table_name))
	}

	async fn create_table(&self, definition: &KeyValueTableDefinition) -> DatabaseResult<()> {
		let mut tables = self.tables.write().await;
		if tables.contains_key(&definition.table_name) {
			return Err(DatabaseError::Query(format!(
				"ResourceInUseException: table '{}' already exists",
				definition.table_name
			)));
		}
		debug!(table = definition.table_name.as_str(), "creating in-memory table");
		tables.insert(
			definition.table_name.clone(),
			MemoryTable {
				definition: definition.clone(),
				items: BTreeMap::new(),
			},
		);
		Ok(())
	}

	async fn delete_table(&self, table_name: &str) -> DatabaseResult<()> {
		self.tables.write().await.remove(table_name);
		Ok(())
	}

	async fn put_item(&self, table_name: &str, item: Item) -> DatabaseResult<()> {
		if let Some((name, _)) = item.iter().find(|(_, attr)| has_empty_set(attr)) {
			return Err(DatabaseError::Query(format!(
				"ValidationException: attribute '{name}' contains an empty set"
			)));
		}
		let mut tables = self.tables.write().await;
		let table = tables.get_mut(table_name).ok_or_else(|| not_found(table_name))?;
		for index in &table.definition.global_secondary_indexes {
			for key in &index.key_schema {
				if let Some(attr) = item.get(&key.attribute_name) {
					table.check_key_type(&key.attribute_name, attr)?;
				}
			}
		}
		let key = key_to_cursor(&table.key_of(&item)?)?;
		table.items.insert(key, item);
		Ok(())
	}

	async fn get_item(&self, table_name: &str, key: Item) -> DatabaseResult<Option<Item>> {
		let tables = self.tables.read().await;
		let table = tables.get(table_name).ok_or_else(|| not_found(table_name))?;
		let key = key_to_cursor(&table.key_of(&key)?)?;
		Ok(table.items.get(&key).cloned())
	}

	async fn delete_item(&self, table_name: &str, key: Item) -> DatabaseResult<()> {
		let mut tables = self.tables.write().await;
		let table = tables.get_mut(table_name).ok_or_else(|| not_found(table_name))?;
		let key = key_to_cursor(&table.key_of(&key)?)?;
		table.items.remove(&key);
		Ok(())
	}

	async fn query(&self, query: KeyQuery) -> DatabaseResult<KeyQueryOutput> {
		let tables = self.tables.read().await;
		let table = tables.get(&query.table_name).ok_or_else(|| not_found(&query.table_name))?;
		let layout = &query.condition.index;
		if let Some(name) = layout.index_name.as_deref() {
			if !table.definition.global_secondary_indexes.iter().any(|i| i.index_name == name) {
				return Err(DatabaseError::Query(format!(
					"ValidationException: table '{}' has no index '{name}'",
					query.table_name
				)));
			}
		}
		let range_key = layout.range_key.as_deref();

		let mut matching: Vec<(Vec<Option<AttributeValue>>, &Item)> = table
			.items
			.values()
			.filter(|item| layout.key_attributes().iter().all(|name| item.contains_key(*name)))
			.filter(|item| query.condition.matches(item))
			.map(|item| (table.position(item, range_key), item))
			.collect();
		matching.sort_by(|(a, _), (b, _)| compare_positions(a, b));
		if !query.scan_forward {
			matching.reverse();
		}

		if let Some(start) = &query.exclusive_start_key {
			let start = table.position(start, range_key);
			matching.retain(|(position, _)| {
				let ordering = compare_positions(position, &start);
				if query.scan_forward {
					ordering == Ordering::Greater
				} else {
					ordering == Ordering::Less
				}
			});
		}

		let limit = query.limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
		let items: Vec<Item> = matching.into_iter().take(limit).map(|(_, item)| item.clone()).collect();

		let last_evaluated_key = match items.last() {
			Some(last) if items.len() == limit => {
				let mut key = Item::new();
				let names = table.definition.key_attributes().chain(layout.key_attributes());
				for name in names {
					if let Some(attr) = last.get(name) {
						key.insert(name.to_string(), attr.clone());
					}
				}
				Some(key)
			}
			_ => None,
		};
		Ok(KeyQueryOutput {
			items,
			last_evaluated_key,
		})
	}
}
