//! SQLite and Postgres adapter
//!
//! Both engines share one implementation over [`SqlStorage`]; only the
//! dialect (placeholders, column types, boolean and aggregate storage)
//! differs. Pages are keyed on the primary key: the cursor is the last
//! row's key as text and the next page starts strictly after it. Joined
//! queries page over the primary keys first so no entity is split across
//! pages.

use super::{Adapter, JoinSpec, QueryRequest};
use crate::database::codec::{
	format_datetime, parse_datetime, RelationalCodec, SqlDialect, SqlParam, SqlType, SqlValue, TypeCodec,
};
use crate::database::condition::lexer;
use crate::database::condition::relational::{prefix_match, prefix_param};
use crate::database::condition::SqlConditionCompiler;
use crate::database::error::{DatabaseError, DatabaseResult};
use crate::database::schema::{SchemaChange, SchemaManager};
use crate::database::storage::{PostgresStorage, SqlRow, SqlStorage, SqliteStorage};
use crate::database::types::{Backend, FieldSpec, SemanticType, TableSchema};
use crate::database::value::{PageResult, Record, Value};
use sqlparser::tokenizer::Token;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

pub type SqliteAdapter = RelationalAdapter<SqliteStorage>;
pub type PostgresAdapter = RelationalAdapter<PostgresStorage>;

pub struct RelationalAdapter<S: SqlStorage> {
	storage: S,
	schema: TableSchema,
	codec: RelationalCodec,
	schema_change: SchemaChange,
}

impl<S: SqlStorage> RelationalAdapter<S> {
	/// Wrap a connection, creating or migrating the table to match `schema`
	pub async fn new(storage: S, schema: TableSchema) -> DatabaseResult<Self> {
		let table = schema.table_name.clone();
		let dialect = storage.dialect();
		schema.validate().map_err(|e| e.in_operation(&table, "open"))?;
		for field in &schema.fields {
			field
				.semantic_type
				.ensure_supported(dialect.backend())
				.map_err(|e| e.in_operation(&table, "open"))?;
		}

		let mut adapter = Self {
			storage,
			schema,
			codec: RelationalCodec::new(dialect),
			schema_change: SchemaChange::Unchanged,
		};
		adapter.schema_change = adapter.ensure_schema().await?;
		Ok(adapter)
	}

	/// Reconcile the live table with the declared fields
	pub async fn ensure_schema(&mut self) -> DatabaseResult<SchemaChange> {
		let manager = SchemaManager::new(self.dialect(), &self.schema);
		let result = manager.reconcile(&mut self.storage).await;
		self.tagged(result, "migrate")
	}

	/// What construction did to the live table
	pub fn schema_change(&self) -> &SchemaChange {
		&self.schema_change
	}

	pub fn dialect(&self) -> SqlDialect {
		self.codec.dialect()
	}

	pub fn storage_mut(&mut self) -> &mut S {
		&mut self.storage
	}

	pub fn into_storage(self) -> S {
		self.storage
	}

	fn tagged<T>(&self, result: DatabaseResult<T>, operation: &'static str) -> DatabaseResult<T> {
		result.map_err(|e| e.in_operation(&self.schema.table_name, operation))
	}

	fn quote(&self, ident: &str) -> String {
		self.dialect().quote_identifier(ident)
	}

	fn primary_key(&self) -> DatabaseResult<&FieldSpec> {
		self.schema
			.primary_key()
			.ok_or_else(|| DatabaseError::schema(&self.schema.table_name, "no primary key field declared"))
	}

	fn column_list(&self) -> String {
		self.schema.fields.iter().map(|f| self.quote(&f.name)).collect::<Vec<_>>().join(", ")
	}

	fn key_param(&self, key: &Value) -> DatabaseResult<SqlParam> {
		let pk = self.primary_key()?;
		if key.is_null() {
			return Err(DatabaseError::invalid_value(&pk.semantic_type, "null key"));
		}
		self.codec.encode_param(key, &pk.semantic_type)
	}

	/// Declared fields decode through the codec, anything else (joined or
	/// computed columns) by its cell kind
	fn decode_row(&self, row: SqlRow) -> DatabaseResult<Record> {
		let mut record = Record::new();
		for (label, cell) in row {
			let value = match self.schema.field(&label) {
				Some(field) => self.codec.decode(&cell, &field.semantic_type)?,
				None => cell.into_untyped(),
			};
			record.insert(label, value);
		}
		Ok(record)
	}

	fn upsert_sql(&self) -> DatabaseResult<String> {
		let pk = self.primary_key()?;
		let dialect = self.dialect();
		let placeholders: Vec<String> = (1..=self.schema.fields.len()).map(|i| dialect.placeholder(i)).collect();
		let updates: Vec<String> = self
			.schema
			.fields
			.iter()
			.filter(|f| !f.is_primary_key)
			.map(|f| {
				let column = self.quote(&f.name);
				format!("{column} = excluded.{column}")
			})
			.collect();
		let on_conflict = if updates.is_empty() {
			"DO NOTHING".to_string()
		} else {
			format!("DO UPDATE SET {}", updates.join(", "))
		};
		Ok(format!(
			"INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {on_conflict}",
			self.quote(&self.schema.table_name),
			self.column_list(),
			placeholders.join(", "),
			self.quote(&pk.name)
		))
	}

	async fn save_record(&mut self, record: &Record) -> DatabaseResult<()> {
		self.schema.check_record(record)?;
		// Every column is written so a save replaces the whole row
		let params = self
			.schema
			.fields
			.iter()
			.map(|f| self.codec.encode_param(record.value_or_null(&f.name), &f.semantic_type))
			.collect::<DatabaseResult<Vec<_>>>()?;
		let sql = self.upsert_sql()?;
		self.storage.execute(&sql, &params).await?;
		Ok(())
	}

	async fn get_record(&mut self, key: &Value) -> DatabaseResult<Option<Record>> {
		let param = self.key_param(key)?;
		let sql = format!(
			"SELECT {} FROM {} WHERE {} = {}",
			self.column_list(),
			self.quote(&self.schema.table_name),
			self.quote(&self.primary_key()?.name),
			self.dialect().placeholder(1)
		);
		let mut rows = self.storage.fetch_all(&sql, &[param]).await?;
		match rows.pop() {
			Some(row) => self.decode_row(row).map(Some),
			None => Ok(None),
		}
	}

	async fn delete_record(&mut self, key: &Value) -> DatabaseResult<()> {
		let param = self.key_param(key)?;
		let sql = format!(
			"DELETE FROM {} WHERE {} = {}",
			self.quote(&self.schema.table_name),
			self.quote(&self.primary_key()?.name),
			self.dialect().placeholder(1)
		);
		let deleted = self.storage.execute(&sql, &[param]).await?;
		if deleted == 0 {
			debug!("No row with key {key} in {}", self.schema.table_name);
		}
		Ok(())
	}

	fn select_list(&self, joins: &[JoinSpec]) -> String {
		if joins.is_empty() {
			return self.column_list();
		}
		let table = self.quote(&self.schema.table_name);
		let mut columns: Vec<String> = self
			.schema
			.fields
			.iter()
			.map(|f| {
				let column = self.quote(&f.name);
				format!("{table}.{column} AS {column}")
			})
			.collect();
		for join in joins {
			let joined = self.quote(&join.table);
			for column in &join.extra_columns {
				columns.push(format!(
					"{joined}.{} AS {}",
					self.quote(column),
					self.quote(&format!("{}.{column}", join.table))
				));
			}
		}
		columns.join(", ")
	}

	/// Build the page statement and its parameters
	pub fn query_statement(&self, request: &QueryRequest) -> DatabaseResult<(String, Vec<SqlParam>)> {
		request.validate()?;
		if request.index_name.is_some() {
			return Err(DatabaseError::UnsupportedQuery(
				"secondary index selection applies to the key-value backend only".to_string(),
			));
		}
		let dialect = self.dialect();
		let pk = self.primary_key()?;
		let table = self.quote(&self.schema.table_name);
		let pk_column = if request.joins.is_empty() {
			self.quote(&pk.name)
		} else {
			format!("{table}.{}", self.quote(&pk.name))
		};

		let joins: String = request
			.joins
			.iter()
			.map(|join| format!(" {} {} ON {}", join.join_type.keyword(), self.quote(&join.table), join.on_clause))
			.collect();

		let mut clauses = Vec::new();
		let mut params = Vec::new();
		if let Some(condition) = &request.condition {
			let mut compiler = SqlConditionCompiler::new(dialect, &self.schema);
			if !request.joins.is_empty() {
				compiler = compiler.qualified();
			}
			let fragment = compiler.compile(condition, 1)?;
			clauses.push(fragment.sql);
			params.extend(fragment.params);
		}
		if let Some(cursor) = request.cursor() {
			let start = parse_cursor(cursor, &pk.semantic_type)?;
			params.push(self.codec.encode_param(&start, &pk.semantic_type)?);
			let bound = if request.reverse { "<" } else { ">" };
			clauses.push(format!("{pk_column} {bound} {}", dialect.placeholder(params.len())));
		}
		let filter = if clauses.is_empty() {
			String::new()
		} else {
			format!(" WHERE {}", clauses.join(" AND "))
		};

		let limit = i64::try_from(request.limit)
			.map_err(|_| DatabaseError::invalid_value("limit within i64", request.limit.to_string()))?;
		params.push(SqlParam::typed(SqlValue::Integer(limit), SqlType::Integer));
		let limit = dialect.placeholder(params.len());
		let direction = if request.reverse { "DESC" } else { "ASC" };

		let sql = if request.joins.is_empty() {
			format!(
				"SELECT {} FROM {table}{filter} ORDER BY {pk_column} {direction} LIMIT {limit}",
				self.column_list()
			)
		} else {
			// A joined entity can span several rows, so the limit picks the
			// page's keys and every row of those keys is returned
			format!(
				"SELECT {} FROM {table}{joins} WHERE {pk_column} IN (SELECT {pk_column} FROM {table}{joins}{filter} GROUP BY {pk_column} ORDER BY {pk_column} {direction} LIMIT {limit}) ORDER BY {pk_column} {direction}",
				self.select_list(&request.joins)
			)
		};
		Ok((sql, params))
	}

	async fn query_page(&mut self, request: &QueryRequest) -> DatabaseResult<PageResult> {
		let (sql, params) = self.query_statement(request)?;
		let rows = self.storage.fetch_all(&sql, &params).await?;
		let records = rows
			.into_iter()
			.map(|row| self.decode_row(row))
			.collect::<DatabaseResult<Vec<_>>>()?;

		// Joined rows of one entity are adjacent, so count key changes
		let pk = self.primary_key()?;
		let keys: Vec<&Value> = records.iter().filter_map(|record| record.get(&pk.name)).collect();
		let entities = keys.windows(2).filter(|pair| pair[0] != pair[1]).count() + usize::from(!keys.is_empty());
		let next_cursor = match keys.last() {
			Some(last) if entities >= request.limit => cursor_for(last),
			_ => String::new(),
		};
		Ok(PageResult { records, next_cursor })
	}

	async fn run_sql(&mut self, sql: &str, params: &BTreeMap<String, Value>) -> DatabaseResult<Vec<Record>> {
		let (translated, bound) = translate_named_params(self.dialect(), sql, params)?;
		let rows = self.storage.fetch_all(&translated, &bound).await?;
		rows.into_iter().map(|row| self.decode_row(row)).collect()
	}
}

impl RelationalAdapter<SqliteStorage> {
	/// Open (or create) a database file and reconcile `schema` in it
	pub async fn open(path: &Path, schema: TableSchema) -> DatabaseResult<Self> {
		Self::new(SqliteStorage::open(path, true).await?, schema).await
	}

	pub async fn in_memory(schema: TableSchema) -> DatabaseResult<Self> {
		Self::new(SqliteStorage::in_memory().await?, schema).await
	}
}

impl RelationalAdapter<PostgresStorage> {
	pub async fn connect(url: &str, schema: TableSchema) -> DatabaseResult<Self> {
		Self::new(PostgresStorage::connect(url).await?, schema).await
	}
}

#[async_trait::async_trait]
impl<S: SqlStorage> Adapter for RelationalAdapter<S> {
	fn backend(&self) -> Backend {
		self.dialect().backend()
	}

	fn schema(&self) -> &TableSchema {
		&self.schema
	}

	async fn create_table(&mut self) -> DatabaseResult<()> {
		let result = match SchemaManager::new(self.dialect(), &self.schema).create_table_sql() {
			Ok(sql) => self.storage.execute(&sql, &[]).await.map(|_| ()),
			Err(e) => Err(e),
		};
		self.tagged(result.map_err(|e| e.into_schema_error(&self.schema.table_name)), "create_table")
	}

	async fn drop_table(&mut self) -> DatabaseResult<()> {
		let sql = SchemaManager::new(self.dialect(), &self.schema).drop_table_sql();
		let result = self.storage.execute(&sql, &[]).await.map(|_| ());
		self.tagged(result.map_err(|e| e.into_schema_error(&self.schema.table_name)), "drop_table")
	}

	async fn save(&mut self, record: &Record) -> DatabaseResult<()> {
		let result = self.save_record(record).await;
		self.tagged(result, "save")
	}

	async fn get(&mut self, key: &Value) -> DatabaseResult<Option<Record>> {
		let result = self.get_record(key).await;
		self.tagged(result, "get")
	}

	async fn delete(&mut self, key: &Value) -> DatabaseResult<()> {
		let result = self.delete_record(key).await;
		self.tagged(result, "delete")
	}

	async fn query(&mut self, request: &QueryRequest) -> DatabaseResult<PageResult> {
		let result = self.query_page(request).await;
		self.tagged(result, "query")
	}

	async fn execute_sql(&mut self, sql: &str, params: &BTreeMap<String, Value>) -> DatabaseResult<Vec<Record>> {
		let result = self.run_sql(sql, params).await;
		self.tagged(result, "execute_sql")
	}
}

/// Text form of a primary key value as handed out in cursors
pub fn cursor_for(key: &Value) -> String {
	match key {
		Value::String(s) => s.clone(),
		Value::DateTime(dt) => format_datetime(dt),
		other => other.to_string(),
	}
}

/// Read a cursor back as a value of the primary key's type
pub fn parse_cursor(cursor: &str, semantic_type: &SemanticType) -> DatabaseResult<Value> {
	let invalid = || DatabaseError::InvalidCursor(cursor.to_string());
	match semantic_type.unwrap_optional() {
		SemanticType::Int => cursor.parse::<i64>().map(Value::Int).map_err(|_| invalid()),
		SemanticType::Float => cursor.parse::<f64>().map(Value::Float).map_err(|_| invalid()),
		SemanticType::DateTime => parse_datetime(cursor).map(Value::DateTime).map_err(|_| invalid()),
		enumeration @ SemanticType::Enum(_) if enumeration.is_int_enum() => {
			cursor.parse::<i64>().map(Value::Int).map_err(|_| invalid())
		}
		SemanticType::String | SemanticType::Enum(_) => Ok(Value::String(cursor.to_string())),
		other => Err(DatabaseError::InvalidCursor(format!("{cursor} (primary key type {other} is not orderable)"))),
	}
}

/// Placeholder slots already handed out, so a repeated name binds once
struct NamedParams<'a> {
	dialect: SqlDialect,
	values: &'a BTreeMap<String, Value>,
	slots: Vec<(String, bool)>,
	bound: Vec<SqlParam>,
}

impl<'a> NamedParams<'a> {
	fn placeholder(&mut self, name: &str, like_prefix: bool) -> DatabaseResult<String> {
		if let Some(i) = self.slots.iter().position(|(n, p)| n == name && *p == like_prefix) {
			return Ok(self.dialect.placeholder(i + 1));
		}
		let value = self
			.values
			.get(name)
			.ok_or_else(|| DatabaseError::UnsupportedQuery(format!("no value for placeholder :{name}")))?;
		let param = if like_prefix {
			let prefix = value.as_str().ok_or_else(|| {
				DatabaseError::UnsupportedQuery(format!("begins_with prefix :{name} must be a string"))
			})?;
			prefix_param(self.dialect, prefix)
		} else {
			SqlParam::untyped(SqlValue::from_untyped(value, self.dialect))
		};
		self.slots.push((name.to_string(), like_prefix));
		self.bound.push(param);
		Ok(self.dialect.placeholder(self.slots.len()))
	}
}

/// Parse `(column, :name)` after `begins_with`; returns the column text, the
/// parameter name and the index after the closing parenthesis
fn begins_with_args(tokens: &[Token], open: usize) -> DatabaseResult<(String, String, usize)> {
	let malformed = || DatabaseError::UnsupportedQuery("begins_with expects (column, :param)".to_string());
	let mut i = open + 1;
	let mut column = String::new();
	while let Some(token) = tokens.get(i) {
		match token {
			Token::Comma => break,
			Token::LParen | Token::RParen => return Err(malformed()),
			token => column.push_str(&token.to_string()),
		}
		i += 1;
	}
	let column = column.trim().to_string();
	if tokens.get(i) != Some(&Token::Comma) || column.is_empty() {
		return Err(malformed());
	}
	i = lexer::skip_whitespace(tokens, i + 1);
	let (name, width) = lexer::named_placeholder(tokens, i).ok_or_else(malformed)?;
	i = lexer::skip_whitespace(tokens, i + width);
	if tokens.get(i) != Some(&Token::RParen) {
		return Err(malformed());
	}
	Ok((column, name, i + 1))
}

/// Rewrite `:name` placeholders into the dialect's positional markers and
/// `begins_with(col, :name)` into a case-sensitive prefix test. Comments, quoted text
/// and `::` casts pass through untouched.
pub fn translate_named_params(
	dialect: SqlDialect, sql: &str, values: &BTreeMap<String, Value>,
) -> DatabaseResult<(String, Vec<SqlParam>)> {
	let tokens = lexer::tokenize_sql(dialect, sql)?;
	let mut named = NamedParams {
		dialect,
		values,
		slots: Vec::new(),
		bound: Vec::new(),
	};
	let mut out = String::with_capacity(sql.len());
	let mut i = 0;
	while i < tokens.len() {
		if let Some((name, width)) = lexer::named_placeholder(&tokens, i) {
			out.push_str(&named.placeholder(&name, false)?);
			i += width;
			continue;
		}
		if let Token::Word(word) = &tokens[i] {
			let open = lexer::skip_whitespace(&tokens, i + 1);
			if word.quote_style.is_none()
				&& word.value.eq_ignore_ascii_case("begins_with")
				&& tokens.get(open) == Some(&Token::LParen)
			{
				let (column, name, after) = begins_with_args(&tokens, open)?;
				let placeholder = named.placeholder(&name, true)?;
				out.push_str(&format!("({})", prefix_match(dialect, &column, &placeholder)));
				i = after;
				continue;
			}
		}
		out.push_str(&tokens[i].to_string());
		i += 1;
	}
	Ok((out, named.bound))
}
