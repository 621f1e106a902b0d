//! Environment-driven configuration tests
//!
//! These mutate process environment variables, so they run serially.

use multistore::database::config::{
	ENV_AWS_REGION, ENV_BACKEND, ENV_DATABASE_URL, ENV_DYNAMODB_ENDPOINT, ENV_PAGE_SIZE, ENV_SQLITE_PATH,
};
use multistore::database::{open_adapter, Backend, BackendConfig, DatabaseConfig, ErrorKind, Value};
use serial_test::serial;
use std::path::PathBuf;

mod common;
use common::*;

const ALL_VARS: [&str; 6] = [
	ENV_BACKEND,
	ENV_SQLITE_PATH,
	ENV_DATABASE_URL,
	ENV_AWS_REGION,
	ENV_DYNAMODB_ENDPOINT,
	ENV_PAGE_SIZE,
];

/// Run `f` with exactly the given variables set, restoring the previous
/// environment afterwards
fn with_env<T>(vars: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
	let saved: Vec<(&str, Option<String>)> = ALL_VARS.iter().map(|name| (*name, std::env::var(name).ok())).collect();
	for name in ALL_VARS {
		std::env::remove_var(name);
	}
	for (name, value) in vars {
		std::env::set_var(name, value);
	}
	let result = f();
	for (name, value) in saved {
		match value {
			Some(value) => std::env::set_var(name, value),
			None => std::env::remove_var(name),
		}
	}
	result
}

#[test]
#[serial]
fn test_empty_environment_uses_in_memory_sqlite() {
	let config = with_env(&[], DatabaseConfig::from_env).unwrap();
	assert_eq!(config.backend, BackendConfig::SqliteMemory);
	assert_eq!(config.default_page_size, DatabaseConfig::default().default_page_size);
}

#[test]
#[serial]
fn test_database_url_selects_postgres() {
	let config = with_env(&[(ENV_DATABASE_URL, "postgres://app@db/app")], DatabaseConfig::from_env).unwrap();
	assert_eq!(config.backend.backend(), Backend::Postgres);
}

#[test]
#[serial]
fn test_explicit_backend_wins() {
	let config = with_env(
		&[
			(ENV_BACKEND, "DynamoDB"),
			(ENV_DATABASE_URL, "postgres://ignored"),
			(ENV_AWS_REGION, "eu-west-1"),
			(ENV_DYNAMODB_ENDPOINT, "http://localhost:8000"),
			(ENV_PAGE_SIZE, "25"),
		],
		DatabaseConfig::from_env,
	)
	.unwrap();
	assert_eq!(
		config.backend,
		BackendConfig::DynamoDb {
			region: Some("eu-west-1".to_string()),
			endpoint_url: Some("http://localhost:8000".to_string()),
		}
	);
	assert_eq!(config.default_page_size, 25);
}

#[test]
#[serial]
fn test_bad_environment_is_a_configuration_error() {
	for vars in [
		vec![(ENV_BACKEND, "cassandra")],
		vec![(ENV_BACKEND, "sqlite")],
		vec![(ENV_PAGE_SIZE, "0")],
		vec![(ENV_PAGE_SIZE, "lots")],
		vec![(ENV_DATABASE_URL, "mysql://nope")],
	] {
		let err = with_env(&vars, DatabaseConfig::from_env).unwrap_err();
		assert!(err.is_configuration(), "{vars:?}: {err}");
		assert_eq!(err.kind(), ErrorKind::InvalidInput);
	}
}

#[tokio::test]
#[serial]
async fn test_sqlite_path_from_environment_opens_adapter() {
	let dir = setup_temp_dir();
	let path = dir.path().join("env.db");
	let path_text = path.to_string_lossy().into_owned();
	let config = with_env(&[(ENV_SQLITE_PATH, path_text.as_str())], DatabaseConfig::from_env).unwrap();
	assert_eq!(
		config.backend,
		BackendConfig::Sqlite {
			path: PathBuf::from(&path_text),
			create_if_missing: true,
		}
	);

	let mut adapter = open_adapter(&config, users_schema("users")).await.unwrap();
	assert_eq!(adapter.backend(), Backend::Sqlite);
	adapter.save(&user("u1", "Ann", 30)).await.unwrap();
	assert!(path.exists());
	assert!(adapter.get(&Value::from("u1")).await.unwrap().is_some());
}
