//! Error types for adapter operations

use thiserror::Error;

/// Coarse error classes callers use to decide between retrying and fixing
/// their schema or query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	UnsupportedType,
	InvalidEnumValue,
	UnsupportedQuery,
	Schema,
	Connection,
	Query,
	InvalidInput,
}

#[derive(Error, Debug)]
pub enum DatabaseError {
	#[error("Unsupported type: {semantic_type} has no encoding on the {backend} backend")]
	UnsupportedType {
		backend: String,
		semantic_type: String,
	},

	#[error("Invalid enum value: {value} is not one of [{variants}]")]
	InvalidEnumValue { value: String, variants: String },

	#[error("Unsupported query: {0}")]
	UnsupportedQuery(String),

	#[error("Schema error on table '{table}': {reason}")]
	Schema { table: String, reason: String },

	#[error("Connection failed: {0}")]
	Connection(String),

	#[error("Query failed: {0}")]
	Query(String),

	#[error("Invalid record: {0}")]
	InvalidRecord(String),

	#[error("Invalid value: expected {expected}, found {found}")]
	InvalidValue { expected: String, found: String },

	#[error("Invalid cursor: {0}")]
	InvalidCursor(String),

	#[error("Invalid configuration: {0}")]
	InvalidConfiguration(String),

	#[error("JSON serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("{operation} on table '{table}' failed: {source}")]
	Operation {
		table: String,
		operation: &'static str,
		#[source]
		source: Box<DatabaseError>,
	},
}

impl DatabaseError {
	pub fn schema(table: &str, reason: impl Into<String>) -> Self {
		DatabaseError::Schema {
			table: table.to_string(),
			reason: reason.into(),
		}
	}

	pub fn invalid_value(expected: impl ToString, found: impl Into<String>) -> Self {
		DatabaseError::InvalidValue {
			expected: expected.to_string(),
			found: found.into(),
		}
	}

	/// Tag the error with the table and operation it came from.
	/// Already-tagged errors are returned unchanged.
	pub fn in_operation(self, table: &str, operation: &'static str) -> Self {
		match self {
			tagged @ DatabaseError::Operation { .. } => tagged,
			other => DatabaseError::Operation {
				table: table.to_string(),
				operation,
				source: Box::new(other),
			},
		}
	}

	/// The classification of the underlying error, looking through operation tags
	pub fn kind(&self) -> ErrorKind {
		match self {
			DatabaseError::UnsupportedType { .. } => ErrorKind::UnsupportedType,
			DatabaseError::InvalidEnumValue { .. } => ErrorKind::InvalidEnumValue,
			DatabaseError::UnsupportedQuery(_) => ErrorKind::UnsupportedQuery,
			DatabaseError::Schema { .. } => ErrorKind::Schema,
			DatabaseError::Connection(_) => ErrorKind::Connection,
			DatabaseError::Query(_) => ErrorKind::Query,
			DatabaseError::InvalidRecord(_)
			| DatabaseError::InvalidValue { .. }
			| DatabaseError::InvalidCursor(_)
			| DatabaseError::InvalidConfiguration(_)
			| DatabaseError::Serialization(_) => ErrorKind::InvalidInput,
			DatabaseError::Operation { source, .. } => source.kind(),
		}
	}

	/// Check if this error indicates that the operation may succeed when retried
	pub fn is_retryable(&self) -> bool {
		matches!(self.kind(), ErrorKind::Connection | ErrorKind::Query)
	}

	/// Check if this error is a programmer or configuration mistake
	pub fn is_configuration(&self) -> bool {
		matches!(
			self.kind(),
			ErrorKind::UnsupportedType
				| ErrorKind::InvalidEnumValue
				| ErrorKind::UnsupportedQuery
				| ErrorKind::Schema
		) || matches!(self.root(), DatabaseError::InvalidConfiguration(_))
	}

	/// The innermost error, without operation tags
	pub fn root(&self) -> &DatabaseError {
		match self {
			DatabaseError::Operation { source, .. } => source.root(),
			other => other,
		}
	}

	/// Reclassify a driver failure that happened while running DDL.
	/// Connection failures keep their class so callers can still retry them.
	pub(crate) fn into_schema_error(self, table: &str) -> Self {
		match self {
			DatabaseError::Query(reason) => DatabaseError::schema(table, reason),
			other => other,
		}
	}
}

impl From<sqlx::Error> for DatabaseError {
	fn from(e: sqlx::Error) -> Self {
		match e {
			sqlx::Error::Io(_)
			| sqlx::Error::Tls(_)
			| sqlx::Error::PoolTimedOut
			| sqlx::Error::PoolClosed
			| sqlx::Error::WorkerCrashed
			| sqlx::Error::Configuration(_) => DatabaseError::Connection(e.to_string()),
			other => DatabaseError::Query(other.to_string()),
		}
	}
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;
