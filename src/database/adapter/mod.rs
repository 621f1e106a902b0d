//! The adapter contract shared by every backend
//!
//! An adapter serves one [`TableSchema`] over one connection or client. It
//! reconciles the physical table when constructed, then routes every value
//! through its backend's codec and every predicate through its backend's
//! condition compiler.

pub mod key_value;
pub mod relational;

pub use key_value::KeyValueAdapter;
pub use relational::{PostgresAdapter, RelationalAdapter, SqliteAdapter};

use crate::database::condition::ConditionNode;
use crate::database::config::{BackendConfig, DatabaseConfig};
use crate::database::error::{DatabaseError, DatabaseResult};
use crate::database::storage::{DynamoDbClient, MemoryKeyValueClient, PostgresStorage, SqliteStorage};
use crate::database::types::{Backend, TableSchema};
use crate::database::value::{PageResult, Record, Value};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
	Inner,
	Left,
}

impl JoinType {
	pub fn keyword(&self) -> &'static str {
		match self {
			JoinType::Inner => "INNER JOIN",
			JoinType::Left => "LEFT JOIN",
		}
	}
}

impl fmt::Display for JoinType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.keyword())
	}
}

/// A related table whose columns are projected next to the queried entity.
/// Joined columns appear in result records as `"<table>.<column>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSpec {
	pub table: String,
	pub join_type: JoinType,
	/// SQL join predicate, written against quoted table names
	pub on_clause: String,
	pub extra_columns: Vec<String>,
}

impl JoinSpec {
	pub fn new(table: impl Into<String>, join_type: JoinType, on_clause: impl Into<String>) -> Self {
		Self {
			table: table.into(),
			join_type,
			on_clause: on_clause.into(),
			extra_columns: Vec::new(),
		}
	}

	pub fn inner(table: impl Into<String>, on_clause: impl Into<String>) -> Self {
		Self::new(table, JoinType::Inner, on_clause)
	}

	pub fn left(table: impl Into<String>, on_clause: impl Into<String>) -> Self {
		Self::new(table, JoinType::Left, on_clause)
	}

	pub fn with_columns<I, S>(mut self, columns: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.extra_columns.extend(columns.into_iter().map(Into::into));
		self
	}
}

/// Parameters of one page request
#[derive(Debug, Clone)]
pub struct QueryRequest {
	pub condition: Option<ConditionNode>,
	/// Records per page. With joins it counts primary entities, and each
	/// entity comes with all of its joined rows.
	pub limit: usize,
	pub reverse: bool,
	/// Cursor returned by the previous page
	pub start_key: Option<String>,
	pub joins: Vec<JoinSpec>,
	/// Key-value backend: query through this secondary index
	pub index_name: Option<String>,
}

impl QueryRequest {
	pub const DEFAULT_LIMIT: usize = 100;

	pub fn new() -> Self {
		Self {
			condition: None,
			limit: Self::DEFAULT_LIMIT,
			reverse: false,
			start_key: None,
			joins: Vec::new(),
			index_name: None,
		}
	}

	pub fn with_condition(mut self, condition: ConditionNode) -> Self {
		self.condition = Some(condition);
		self
	}

	pub fn with_limit(mut self, limit: usize) -> Self {
		self.limit = limit;
		self
	}

	pub fn reversed(mut self, reverse: bool) -> Self {
		self.reverse = reverse;
		self
	}

	/// Resume after a previous page; an empty cursor means the first page
	pub fn starting_after(mut self, cursor: impl Into<String>) -> Self {
		let cursor = cursor.into();
		self.start_key = if cursor.is_empty() { None } else { Some(cursor) };
		self
	}

	pub fn with_join(mut self, join: JoinSpec) -> Self {
		self.joins.push(join);
		self
	}

	pub fn using_index(mut self, index_name: impl Into<String>) -> Self {
		self.index_name = Some(index_name.into());
		self
	}

	pub fn validate(&self) -> DatabaseResult<()> {
		if self.limit == 0 {
			return Err(DatabaseError::invalid_value("limit greater than 0", "0"));
		}
		Ok(())
	}

	/// The start cursor, treating an empty string as none
	pub fn cursor(&self) -> Option<&str> {
		self.start_key.as_deref().filter(|c| !c.is_empty())
	}
}

impl Default for QueryRequest {
	fn default() -> Self {
		Self::new()
	}
}

/// CRUD and query access to one table.
///
/// Relational adapters own a single connection and are not meant to be
/// shared between concurrent callers; every operation takes `&mut self`.
/// Failures are tagged with the table and operation.
#[async_trait::async_trait]
pub trait Adapter: Send {
	fn backend(&self) -> Backend;

	fn schema(&self) -> &TableSchema;

	/// Create the table if it does not exist
	async fn create_table(&mut self) -> DatabaseResult<()>;

	/// Drop the table and everything in it
	async fn drop_table(&mut self) -> DatabaseResult<()>;

	/// Insert or fully replace the record with the same primary key
	async fn save(&mut self, record: &Record) -> DatabaseResult<()>;

	async fn get(&mut self, key: &Value) -> DatabaseResult<Option<Record>>;

	/// Delete by primary key; deleting a missing key succeeds
	async fn delete(&mut self, key: &Value) -> DatabaseResult<()>;

	/// One page of matching records in primary key order
	async fn query(&mut self, request: &QueryRequest) -> DatabaseResult<PageResult>;

	/// Run hand-written SQL with `:name` placeholders
	async fn execute_sql(&mut self, sql: &str, params: &BTreeMap<String, Value>) -> DatabaseResult<Vec<Record>> {
		let _ = (sql, params);
		Err(DatabaseError::UnsupportedQuery(format!(
			"raw SQL is not available on the {} backend",
			self.backend()
		))
		.in_operation(&self.schema().table_name, "execute_sql"))
	}
}

/// Connect to the configured backend and return an adapter whose table is
/// already created or migrated
pub async fn open_adapter(config: &DatabaseConfig, schema: TableSchema) -> DatabaseResult<Box<dyn Adapter>> {
	config.validate()?;
	let adapter: Box<dyn Adapter> = match &config.backend {
		BackendConfig::Sqlite { path, create_if_missing } => {
			let storage = SqliteStorage::open(path, *create_if_missing).await?;
			Box::new(SqliteAdapter::new(storage, schema).await?)
		}
		BackendConfig::SqliteMemory => Box::new(SqliteAdapter::new(SqliteStorage::in_memory().await?, schema).await?),
		BackendConfig::Postgres { url } => {
			let storage = PostgresStorage::connect(url).await?;
			Box::new(PostgresAdapter::new(storage, schema).await?)
		}
		BackendConfig::DynamoDb { region, endpoint_url } => {
			let client = DynamoDbClient::from_env(region.clone(), endpoint_url.clone())
				.await
				.with_create_timeout(config.create_timeout);
			Box::new(KeyValueAdapter::new(client, schema).await?)
		}
		BackendConfig::MemoryKeyValue => Box::new(KeyValueAdapter::new(MemoryKeyValueClient::new(), schema).await?),
	};
	Ok(adapter)
}
