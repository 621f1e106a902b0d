//! Common test utilities for the multistore library

#![allow(unused_imports, dead_code)]

use multistore::database::{
	Adapter, FieldSpec, MemoryKeyValueClient, PageResult, QueryRequest, Record, SecondaryIndex, SemanticType,
	SqliteAdapter, TableSchema, Value,
};
use once_cell::sync::Lazy;
use tempfile::TempDir;

/// Postgres server for the ignored integration tests
pub static POSTGRES_URL: Lazy<Option<String>> =
	Lazy::new(|| std::env::var("MULTISTORE_TEST_POSTGRES_URL").ok().filter(|url| !url.is_empty()));

/// Create a temporary directory for testing
pub fn setup_temp_dir() -> TempDir {
	TempDir::new().expect("Failed to create temp directory")
}

/// Table name unique to one test run, for shared servers
pub fn unique_table(prefix: &str) -> String {
	format!("{prefix}_{}", uuid::Uuid::new_v4().simple())
}

/// `{id: String (primary), name: String, age: Int, tags: Set<String>}`
pub fn users_schema(table: &str) -> TableSchema {
	TableSchema::new(table)
		.with_field(FieldSpec::primary("id", SemanticType::String))
		.with_field(FieldSpec::new("name", SemanticType::String))
		.with_field(FieldSpec::new("age", SemanticType::Int))
		.with_field(FieldSpec::new("tags", SemanticType::set(SemanticType::String)))
}

/// Users schema with a `team`/`age` secondary index for key-value queries
pub fn team_schema(table: &str) -> TableSchema {
	users_schema(table)
		.with_field(FieldSpec::new("team", SemanticType::String))
		.with_secondary_index(SecondaryIndex::new("by_team", "team").with_range_key("age"))
}

pub fn user(id: &str, name: &str, age: i64) -> Record {
	Record::new().with("id", id).with("name", name).with("age", age)
}

/// Ten users `u00`..`u09` with ages 20..29
pub fn sample_users() -> Vec<Record> {
	(0..10).map(|i| user(&format!("u{i:02}"), &format!("user {i}"), 20 + i)).collect()
}

pub async fn sqlite_adapter(schema: TableSchema) -> SqliteAdapter {
	SqliteAdapter::in_memory(schema)
		.await
		.expect("Failed to open in-memory SQLite adapter")
}

pub async fn save_all<A: Adapter + ?Sized>(adapter: &mut A, records: &[Record]) {
	for record in records {
		adapter.save(record).await.expect("Failed to save record");
	}
}

/// Follow cursors from an empty start until the last page, checking that
/// only the final page is short
pub async fn collect_pages<A: Adapter + ?Sized>(adapter: &mut A, request: QueryRequest) -> Vec<Record> {
	let mut records = Vec::new();
	let mut request = request.starting_after("");
	for _ in 0..1000 {
		let page: PageResult = adapter.query(&request).await.expect("Failed to query page");
		assert!(page.records.len() <= request.limit);
		let last = page.is_last_page();
		if last {
			assert!(page.records.len() < request.limit, "full page reported as last");
		} else {
			assert_eq!(page.records.len(), request.limit, "short page carried a cursor");
		}
		records.extend(page.records);
		if last {
			return records;
		}
		request = request.starting_after(page.next_cursor);
	}
	panic!("pagination did not terminate");
}

pub fn ids(records: &[Record]) -> Vec<String> {
	records
		.iter()
		.filter_map(|r| r.get("id").and_then(Value::as_str).map(str::to_string))
		.collect()
}

pub fn memory_client() -> MemoryKeyValueClient {
	MemoryKeyValueClient::new()
}
