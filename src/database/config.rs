//! Connection configuration for the supported backends

use crate::database::error::{DatabaseError, DatabaseResult};
use crate::database::types::Backend;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_BACKEND: &str = "MULTISTORE_BACKEND";
pub const ENV_SQLITE_PATH: &str = "MULTISTORE_SQLITE_PATH";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_AWS_REGION: &str = "AWS_REGION";
pub const ENV_DYNAMODB_ENDPOINT: &str = "MULTISTORE_DYNAMODB_ENDPOINT";
pub const ENV_PAGE_SIZE: &str = "MULTISTORE_PAGE_SIZE";

/// Where the adapter connects to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
	/// SQLite database file
	Sqlite { path: PathBuf, create_if_missing: bool },

	/// Private in-memory SQLite database
	SqliteMemory,

	/// Postgres server, as a `postgres://` URL
	Postgres { url: String },

	/// DynamoDB, from the ambient AWS configuration. `endpoint_url` points
	/// at DynamoDB Local or another compatible service.
	DynamoDb {
		region: Option<String>,
		endpoint_url: Option<String>,
	},

	/// In-process key-value tables, for tests and local runs
	MemoryKeyValue,
}

impl BackendConfig {
	pub fn backend(&self) -> Backend {
		match self {
			BackendConfig::Sqlite { .. } | BackendConfig::SqliteMemory => Backend::Sqlite,
			BackendConfig::Postgres { .. } => Backend::Postgres,
			BackendConfig::DynamoDb { .. } | BackendConfig::MemoryKeyValue => Backend::KeyValue,
		}
	}
}

/// Configuration for opening an adapter
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
	pub backend: BackendConfig,

	/// Records per page when a caller does not choose
	pub default_page_size: usize,

	/// How long key-value table creation may take to become active
	pub create_timeout: Duration,
}

impl DatabaseConfig {
	pub const DEFAULT_PAGE_SIZE: usize = 100;
	pub const DEFAULT_CREATE_TIMEOUT: Duration = Duration::from_secs(60);

	fn with_backend(backend: BackendConfig) -> Self {
		Self {
			backend,
			default_page_size: Self::DEFAULT_PAGE_SIZE,
			create_timeout: Self::DEFAULT_CREATE_TIMEOUT,
		}
	}

	/// SQLite file, created on first use
	pub fn for_sqlite(path: impl Into<PathBuf>) -> Self {
		Self::with_backend(BackendConfig::Sqlite {
			path: path.into(),
			create_if_missing: true,
		})
	}

	/// In-memory SQLite, gone when the adapter is dropped
	pub fn in_memory() -> Self {
		Self::with_backend(BackendConfig::SqliteMemory)
	}

	pub fn for_postgres(url: impl Into<String>) -> Self {
		Self::with_backend(BackendConfig::Postgres { url: url.into() })
	}

	pub fn for_dynamodb(region: Option<String>, endpoint_url: Option<String>) -> Self {
		Self::with_backend(BackendConfig::DynamoDb { region, endpoint_url })
	}

	pub fn for_memory_key_value() -> Self {
		Self::with_backend(BackendConfig::MemoryKeyValue)
	}

	/// Read the configuration from the process environment
	pub fn from_env() -> DatabaseResult<Self> {
		Self::from_lookup(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
	}

	/// Build the configuration from a variable lookup.
	///
	/// `MULTISTORE_BACKEND` picks the backend (`sqlite`, `sqlite-memory`,
	/// `postgres`, `dynamodb`, `memory`); without it, `DATABASE_URL` selects
	/// Postgres, `MULTISTORE_SQLITE_PATH` selects SQLite, and otherwise an
	/// in-memory SQLite database is used.
	pub fn from_lookup<F>(lookup: F) -> DatabaseResult<Self>
	where
		F: Fn(&str) -> Option<String>,
	{
		let backend = match lookup(ENV_BACKEND).map(|b| b.to_ascii_lowercase()) {
			Some(name) => match name.as_str() {
				"sqlite" => {
					let path = lookup(ENV_SQLITE_PATH).ok_or_else(|| {
						DatabaseError::InvalidConfiguration(format!("{ENV_SQLITE_PATH} is required for sqlite"))
					})?;
					BackendConfig::Sqlite {
						path: PathBuf::from(path),
						create_if_missing: true,
					}
				}
				"sqlite-memory" | "memory-sqlite" => BackendConfig::SqliteMemory,
				"postgres" | "postgresql" => BackendConfig::Postgres {
					url: lookup(ENV_DATABASE_URL).ok_or_else(|| {
						DatabaseError::InvalidConfiguration(format!("{ENV_DATABASE_URL} is required for postgres"))
					})?,
				},
				"dynamodb" | "key-value" => BackendConfig::DynamoDb {
					region: lookup(ENV_AWS_REGION),
					endpoint_url: lookup(ENV_DYNAMODB_ENDPOINT),
				},
				"memory" => BackendConfig::MemoryKeyValue,
				other => {
					return Err(DatabaseError::InvalidConfiguration(format!("unknown backend '{other}'")));
				}
			},
			None => match (lookup(ENV_DATABASE_URL), lookup(ENV_SQLITE_PATH)) {
				(Some(url), _) => BackendConfig::Postgres { url },
				(None, Some(path)) => BackendConfig::Sqlite {
					path: PathBuf::from(path),
					create_if_missing: true,
				},
				(None, None) => BackendConfig::SqliteMemory,
			},
		};

		let mut config = Self::with_backend(backend);
		if let Some(size) = lookup(ENV_PAGE_SIZE) {
			config.default_page_size = size.parse().map_err(|_| {
				DatabaseError::InvalidConfiguration(format!("{ENV_PAGE_SIZE} must be a positive integer, got '{size}'"))
			})?;
		}
		config.validate()?;
		Ok(config)
	}

	/// Validate configuration parameters
	pub fn validate(&self) -> DatabaseResult<()> {
		if self.default_page_size == 0 {
			return Err(DatabaseError::InvalidConfiguration(
				"Default page size must be greater than 0".to_string(),
			));
		}

		if self.create_timeout.is_zero() {
			return Err(DatabaseError::InvalidConfiguration(
				"Create timeout must be greater than 0".to_string(),
			));
		}

		match &self.backend {
			BackendConfig::Sqlite { path, .. } if path.as_os_str().is_empty() => Err(
				DatabaseError::InvalidConfiguration("SQLite path must not be empty".to_string()),
			),
			BackendConfig::Postgres { url }
				if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) =>
			{
				Err(DatabaseError::InvalidConfiguration(format!(
					"Postgres URL must start with postgres:// or postgresql://, got '{url}'"
				)))
			}
			_ => Ok(()),
		}
	}
}

impl Default for DatabaseConfig {
	fn default() -> Self {
		Self::in_memory()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
		move |name| vars.get(name).cloned()
	}

	#[test]
	fn test_presets_are_valid() {
		assert!(DatabaseConfig::for_sqlite("/tmp/multistore.db").validate().is_ok());
		assert!(DatabaseConfig::in_memory().validate().is_ok());
		assert!(DatabaseConfig::for_postgres("postgres://localhost/db").validate().is_ok());
		assert!(DatabaseConfig::for_dynamodb(Some("eu-west-1".into()), None).validate().is_ok());
		assert_eq!(DatabaseConfig::default().backend, BackendConfig::SqliteMemory);
	}

	#[test]
	fn test_config_validation() {
		let mut config = DatabaseConfig::default();
		config.default_page_size = 0;
		assert!(config.validate().is_err());

		assert!(DatabaseConfig::for_postgres("mysql://nope").validate().is_err());
		assert!(DatabaseConfig::for_sqlite("").validate().is_err());
	}

	#[test]
	fn test_backend_selection_from_lookup() {
		let config = DatabaseConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://h/db")])).unwrap();
		assert_eq!(config.backend.backend(), Backend::Postgres);

		let config = DatabaseConfig::from_lookup(lookup(&[
			("MULTISTORE_BACKEND", "DynamoDB"),
			("AWS_REGION", "us-east-1"),
			("MULTISTORE_DYNAMODB_ENDPOINT", "http://localhost:8000"),
			("MULTISTORE_PAGE_SIZE", "25"),
		]))
		.unwrap();
		assert_eq!(
			config.backend,
			BackendConfig::DynamoDb {
				region: Some("us-east-1".into()),
				endpoint_url: Some("http://localhost:8000".into()),
			}
		);
		assert_eq!(config.default_page_size, 25);

		assert_eq!(
			DatabaseConfig::from_lookup(lookup(&[])).unwrap().backend,
			BackendConfig::SqliteMemory
		);
	}

	#[test]
	fn test_lookup_errors() {
		assert!(DatabaseConfig::from_lookup(lookup(&[("MULTISTORE_BACKEND", "sqlite")])).is_err());
		assert!(DatabaseConfig::from_lookup(lookup(&[("MULTISTORE_BACKEND", "oracle")])).is_err());
		assert!(DatabaseConfig::from_lookup(lookup(&[("MULTISTORE_PAGE_SIZE", "lots")])).is_err());
		assert!(DatabaseConfig::from_lookup(lookup(&[("MULTISTORE_PAGE_SIZE", "0")])).is_err());
	}
}
