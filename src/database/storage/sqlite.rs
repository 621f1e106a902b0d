//! SQLite storage over a single sqlx connection

use super::{SqlRow, SqlStorage};
use crate::database::codec::{SqlDialect, SqlParam, SqlValue};
use crate::database::error::{DatabaseError, DatabaseResult};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column, Connection, Row, TypeInfo, ValueRef};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

pub struct SqliteStorage {
	connection: SqliteConnection,
}

impl SqliteStorage {
	/// Open a database file
	pub async fn open(path: &Path, create_if_missing: bool) -> DatabaseResult<Self> {
		let options = SqliteConnectOptions::new()
			.filename(path)
			.create_if_missing(create_if_missing);
		let connection = SqliteConnection::connect_with(&options)
			.await
			.map_err(|e| DatabaseError::Connection(format!("cannot open {}: {e}", path.display())))?;
		debug!("Opened SQLite database at {}", path.display());
		Ok(Self { connection })
	}

	/// Open a private in-memory database, gone when the storage is dropped
	pub async fn in_memory() -> DatabaseResult<Self> {
		let options = SqliteConnectOptions::from_str("sqlite::memory:")
			.map_err(|e| DatabaseError::InvalidConfiguration(e.to_string()))?;
		let connection = SqliteConnection::connect_with(&options)
			.await
			.map_err(|e| DatabaseError::Connection(e.to_string()))?;
		Ok(Self { connection })
	}

	/// Wrap an already open connection
	pub fn from_connection(connection: SqliteConnection) -> Self {
		Self { connection }
	}

	pub fn connection_mut(&mut self) -> &mut SqliteConnection {
		&mut self.connection
	}

	pub fn into_connection(self) -> SqliteConnection {
		self.connection
	}
}

fn bind_params<'q>(
	mut query: Query<'q, Sqlite, SqliteArguments<'q>>, params: &'q [SqlParam],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
	for param in params {
		query = match &param.value {
			SqlValue::Null => query.bind(None::<String>),
			SqlValue::Integer(i) => query.bind(*i),
			SqlValue::Real(f) => query.bind(*f),
			SqlValue::Text(s) => query.bind(s.as_str()),
			SqlValue::Bool(b) => query.bind(i64::from(*b)),
			SqlValue::Blob(b) => query.bind(b.as_slice()),
			SqlValue::Json(doc) => query.bind(doc.to_string()),
		};
	}
	query
}

/// Read cells by their runtime storage class
fn decode_row(row: &SqliteRow) -> DatabaseResult<SqlRow> {
	let mut cells = Vec::with_capacity(row.len());
	for (i, column) in row.columns().iter().enumerate() {
		let raw = row.try_get_raw(i)?;
		let cell = if raw.is_null() {
			SqlValue::Null
		} else {
			let storage_class = raw.type_info().name().to_string();
			match storage_class.as_str() {
				"INTEGER" | "BOOLEAN" => SqlValue::Integer(row.try_get_unchecked::<i64, _>(i)?),
				"REAL" => SqlValue::Real(row.try_get_unchecked::<f64, _>(i)?),
				"BLOB" => SqlValue::Blob(row.try_get_unchecked::<Vec<u8>, _>(i)?),
				_ => SqlValue::Text(row.try_get_unchecked::<String, _>(i)?),
			}
		};
		cells.push((column.name().to_string(), cell));
	}
	Ok(cells)
}

#[async_trait::async_trait]
impl SqlStorage for SqliteStorage {
	fn dialect(&self) -> SqlDialect {
		SqlDialect::Sqlite
	}

	async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> DatabaseResult<u64> {
		debug!(sql, params = params.len(), "sqlite execute");
		let result = bind_params(sqlx::query(sql), params)
			.execute(&mut self.connection)
			.await?;
		Ok(result.rows_affected())
	}

	async fn fetch_all(&mut self, sql: &str, params: &[SqlParam]) -> DatabaseResult<Vec<SqlRow>> {
		debug!(sql, params = params.len(), "sqlite query");
		let rows = bind_params(sqlx::query(sql), params)
			.fetch_all(&mut self.connection)
			.await?;
		rows.iter().map(decode_row).collect()
	}

	async fn execute_batch(&mut self, statements: &[String]) -> DatabaseResult<()> {
		let mut transaction = self.connection.begin().await?;
		for statement in statements {
			debug!(sql = statement.as_str(), "sqlite batch statement");
			sqlx::query(statement).execute(&mut *transaction).await?;
		}
		transaction.commit().await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::database::codec::SqlType;

	#[tokio::test]
	async fn test_round_trip_cells() {
		let mut storage = SqliteStorage::in_memory().await.unwrap();
		storage
			.execute("CREATE TABLE t (a INTEGER, b REAL, c TEXT, d BLOB, e INTEGER)", &[])
			.await
			.unwrap();
		let params = vec![
			SqlParam::typed(SqlValue::Integer(7), SqlType::Integer),
			SqlParam::typed(SqlValue::Real(1.5), SqlType::Real),
			SqlParam::typed(SqlValue::Text("x".into()), SqlType::Text),
			SqlParam::typed(SqlValue::Blob(vec![1, 2]), SqlType::Blob),
			SqlParam::typed(SqlValue::Null, SqlType::Integer),
		];
		let inserted = storage
			.execute("INSERT INTO t VALUES (?1, ?2, ?3, ?4, ?5)", &params)
			.await
			.unwrap();
		assert_eq!(inserted, 1);

		let rows = storage.fetch_all("SELECT a, b, c, d, e FROM t", &[]).await.unwrap();
		let cells: Vec<SqlValue> = rows[0].iter().map(|(_, v)| v.clone()).collect();
		assert_eq!(
			cells,
			vec![
				SqlValue::Integer(7),
				SqlValue::Real(1.5),
				SqlValue::Text("x".into()),
				SqlValue::Blob(vec![1, 2]),
				SqlValue::Null,
			]
		);
		assert_eq!(rows[0][0].0, "a");
	}

	#[tokio::test]
	async fn test_batch_is_atomic() {
		let mut storage = SqliteStorage::in_memory().await.unwrap();
		let statements = vec![
			"CREATE TABLE kept (a INTEGER)".to_string(),
			"THIS IS NOT SQL".to_string(),
		];
		assert!(storage.execute_batch(&statements).await.is_err());
		let rows = storage
			.fetch_all("SELECT name FROM sqlite_master WHERE name = 'kept'", &[])
			.await
			.unwrap();
		assert!(rows.is_empty());
	}
}
