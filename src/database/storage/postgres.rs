//! Postgres storage over a single sqlx connection

use super::{SqlRow, SqlStorage};
use crate::database::codec::{SqlDialect, SqlParam, SqlType, SqlValue};
use crate::database::error::{DatabaseError, DatabaseResult};
use sqlx::postgres::{PgArguments, PgConnection, PgRow, Postgres};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{Column, Connection, Row, TypeInfo, ValueRef};
use tracing::debug;

pub struct PostgresStorage {
	connection: PgConnection,
}

impl PostgresStorage {
	/// Connect with a `postgres://` URL
	pub async fn connect(url: &str) -> DatabaseResult<Self> {
		let connection = PgConnection::connect(url)
			.await
			.map_err(|e| DatabaseError::Connection(e.to_string()))?;
		debug!("Connected to Postgres");
		Ok(Self { connection })
	}

	/// Wrap an already open connection
	pub fn from_connection(connection: PgConnection) -> Self {
		Self { connection }
	}

	pub fn connection_mut(&mut self) -> &mut PgConnection {
		&mut self.connection
	}

	pub fn into_connection(self) -> PgConnection {
		self.connection
	}
}

fn bind_params<'q>(
	mut query: Query<'q, Postgres, PgArguments>, params: &'q [SqlParam],
) -> Query<'q, Postgres, PgArguments> {
	for param in params {
		query = match &param.value {
			// NULL still needs the column's type to bind against
			SqlValue::Null => match param.sql_type {
				Some(SqlType::Integer) => query.bind(None::<i64>),
				Some(SqlType::Real) => query.bind(None::<f64>),
				Some(SqlType::Bool) => query.bind(None::<bool>),
				Some(SqlType::Blob) => query.bind(None::<Vec<u8>>),
				Some(SqlType::Json) => query.bind(None::<Json<serde_json::Value>>),
				Some(SqlType::Text) | None => query.bind(None::<String>),
			},
			SqlValue::Integer(i) => query.bind(*i),
			SqlValue::Real(f) => query.bind(*f),
			SqlValue::Text(s) => query.bind(s.as_str()),
			SqlValue::Bool(b) => query.bind(*b),
			SqlValue::Blob(b) => query.bind(b.as_slice()),
			SqlValue::Json(doc) => query.bind(Json(doc.clone())),
		};
	}
	query
}

fn decode_row(row: &PgRow) -> DatabaseResult<SqlRow> {
	let mut cells = Vec::with_capacity(row.len());
	for (i, column) in row.columns().iter().enumerate() {
		let raw = row.try_get_raw(i)?;
		let cell = if raw.is_null() {
			SqlValue::Null
		} else {
			let type_name = raw.type_info().name().to_string();
			match type_name.as_str() {
				"INT8" => SqlValue::Integer(row.try_get::<i64, _>(i)?),
				"INT4" => SqlValue::Integer(i64::from(row.try_get::<i32, _>(i)?)),
				"INT2" => SqlValue::Integer(i64::from(row.try_get::<i16, _>(i)?)),
				"FLOAT8" => SqlValue::Real(row.try_get::<f64, _>(i)?),
				"FLOAT4" => SqlValue::Real(f64::from(row.try_get::<f32, _>(i)?)),
				"BOOL" => SqlValue::Bool(row.try_get::<bool, _>(i)?),
				"BYTEA" => SqlValue::Blob(row.try_get::<Vec<u8>, _>(i)?),
				"JSON" | "JSONB" => SqlValue::Json(row.try_get::<Json<serde_json::Value>, _>(i)?.0),
				"TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => SqlValue::Text(row.try_get::<String, _>(i)?),
				other => {
					return Err(DatabaseError::Query(format!(
						"column '{}' has unsupported type {other}",
						column.name()
					)));
				}
			}
		};
		cells.push((column.name().to_string(), cell));
	}
	Ok(cells)
}

#[async_trait::async_trait]
impl SqlStorage for PostgresStorage {
	fn dialect(&self) -> SqlDialect {
		SqlDialect::Postgres
	}

	async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> DatabaseResult<u64> {
		debug!(sql, params = params.len(), "postgres execute");
		let result = bind_params(sqlx::query(sql), params)
			.execute(&mut self.connection)
			.await?;
		Ok(result.rows_affected())
	}

	async fn fetch_all(&mut self, sql: &str, params: &[SqlParam]) -> DatabaseResult<Vec<SqlRow>> {
		debug!(sql, params = params.len(), "postgres query");
		let rows = bind_params(sqlx::query(sql), params)
			.fetch_all(&mut self.connection)
			.await?;
		rows.iter().map(decode_row).collect()
	}

	async fn execute_batch(&mut self, statements: &[String]) -> DatabaseResult<()> {
		let mut transaction = self.connection.begin().await?;
		for statement in statements {
			debug!(sql = statement.as_str(), "postgres batch statement");
			sqlx::query(statement).execute(&mut *transaction).await?;
		}
		transaction.commit().await?;
		Ok(())
	}
}
