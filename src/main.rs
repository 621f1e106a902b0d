use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use multistore::database::adapter::relational::parse_cursor;
use multistore::database::codec::json::record_from_json;
use multistore::database::storage::{PostgresStorage, SqliteStorage};
use multistore::database::{
	open_adapter, parse_condition, BackendConfig, DatabaseConfig, PostgresAdapter, QueryRequest, SchemaChange,
	SqliteAdapter, TableSchema, Value,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, Level};

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
	Sqlite,
	SqliteMemory,
	Postgres,
	Dynamodb,
	Memory,
}

#[derive(Parser)]
#[command(name = "multistore")]
#[command(about = "Read, write and migrate records on SQLite, Postgres or DynamoDB through one schema")]
struct Cli {
	/// Storage backend; taken from the environment when omitted
	#[arg(long, value_enum)]
	backend: Option<BackendArg>,

	/// SQLite database file
	#[arg(long, env = "MULTISTORE_SQLITE_PATH")]
	sqlite_path: Option<PathBuf>,

	/// Postgres connection URL
	#[arg(long, env = "DATABASE_URL")]
	database_url: Option<String>,

	/// AWS region for DynamoDB
	#[arg(long, env = "AWS_REGION")]
	region: Option<String>,

	/// DynamoDB endpoint, e.g. DynamoDB Local
	#[arg(long, env = "MULTISTORE_DYNAMODB_ENDPOINT")]
	endpoint_url: Option<String>,

	/// Table schema as a JSON file
	#[arg(short, long)]
	schema: PathBuf,

	/// Enable verbose logging
	#[arg(short, long)]
	verbose: bool,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Create the table or migrate it to the schema
	Migrate,

	/// Print the record with the given primary key
	Get { key: String },

	/// Delete the record with the given primary key
	Delete { key: String },

	/// Insert or replace a record given as a JSON object
	Put { record: String },

	/// Print one page of matching records
	Query {
		/// Condition, e.g. "age >= :min AND begins_with(name, :p)"
		#[arg(long = "where")]
		condition: Option<String>,

		/// Placeholder value as name=value; JSON values are parsed, anything else is a string
		#[arg(long = "param")]
		params: Vec<String>,

		#[arg(short, long)]
		limit: Option<usize>,

		#[arg(short, long)]
		reverse: bool,

		/// Cursor from the previous page
		#[arg(long)]
		cursor: Option<String>,

		/// Secondary index to query (key-value backend)
		#[arg(long)]
		index: Option<String>,
	},

	/// Drop the table
	Drop,
}

fn database_config(cli: &Cli) -> anyhow::Result<DatabaseConfig> {
	let Some(backend) = cli.backend else {
		return Ok(DatabaseConfig::from_env()?);
	};
	let config = match backend {
		BackendArg::Sqlite => {
			let path = cli.sqlite_path.clone().context("--sqlite-path is required for the sqlite backend")?;
			DatabaseConfig::for_sqlite(path)
		}
		BackendArg::SqliteMemory => DatabaseConfig::in_memory(),
		BackendArg::Postgres => {
			let url = cli.database_url.clone().context("--database-url is required for the postgres backend")?;
			DatabaseConfig::for_postgres(url)
		}
		BackendArg::Dynamodb => DatabaseConfig::for_dynamodb(cli.region.clone(), cli.endpoint_url.clone()),
		BackendArg::Memory => DatabaseConfig::for_memory_key_value(),
	};
	config.validate()?;
	Ok(config)
}

fn parse_params(pairs: &[String]) -> anyhow::Result<BTreeMap<String, Value>> {
	let mut params = BTreeMap::new();
	for pair in pairs {
		let (name, raw) = pair
			.split_once('=')
			.with_context(|| format!("parameter '{pair}' is not name=value"))?;
		let value = match serde_json::from_str::<serde_json::Value>(raw) {
			Ok(json) => Value::from_json(&json),
			Err(_) => Value::from(raw),
		};
		params.insert(name.trim_start_matches(':').to_string(), value);
	}
	Ok(params)
}

fn key_value(schema: &TableSchema, text: &str) -> anyhow::Result<Value> {
	let pk = schema.primary_key().context("schema has no primary key field")?;
	parse_cursor(text, &pk.semantic_type).with_context(|| format!("'{text}' is not a valid {} key", pk.semantic_type))
}

fn change_report(change: &SchemaChange) -> serde_json::Value {
	match change {
		SchemaChange::Created => json!({ "change": "created" }),
		SchemaChange::Unchanged => json!({ "change": "unchanged" }),
		SchemaChange::Migrated(plan) => json!({
			"change": "migrated",
			"added": plan.added,
			"removed": plan.removed,
		}),
	}
}

async fn migrate(config: &DatabaseConfig, schema: TableSchema) -> anyhow::Result<serde_json::Value> {
	let table = schema.table_name.clone();
	let report = match &config.backend {
		BackendConfig::Sqlite { path, create_if_missing } => {
			let storage = SqliteStorage::open(path, *create_if_missing).await?;
			change_report(SqliteAdapter::new(storage, schema).await?.schema_change())
		}
		BackendConfig::SqliteMemory => change_report(SqliteAdapter::in_memory(schema).await?.schema_change()),
		BackendConfig::Postgres { url } => {
			let storage = PostgresStorage::connect(url).await?;
			change_report(PostgresAdapter::new(storage, schema).await?.schema_change())
		}
		BackendConfig::DynamoDb { .. } | BackendConfig::MemoryKeyValue => {
			open_adapter(config, schema).await?;
			json!({ "change": "ready" })
		}
	};
	info!("Table {table} is in line with its schema");
	Ok(json!({ "table": table, "result": report }))
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();

	// Initialize tracing
	let level = if cli.verbose {
		Level::DEBUG
	} else {
		Level::INFO
	};
	tracing_subscriber::fmt()
		.with_max_level(level)
		.with_writer(std::io::stderr)
		.init();

	let schema = TableSchema::from_path(&cli.schema)
		.with_context(|| format!("loading schema from {}", cli.schema.display()))?;
	let config = database_config(&cli)?;
	info!("Using {} backend for table {}", config.backend.backend(), schema.table_name);

	if let Command::Migrate = cli.command {
		return print_json(&migrate(&config, schema).await?);
	}

	let mut adapter = open_adapter(&config, schema).await?;
	match cli.command {
		Command::Migrate => {}
		Command::Get { key } => {
			let key = key_value(adapter.schema(), &key)?;
			let record = adapter.get(&key).await?;
			print_json(&record.map(|r| r.to_json()).unwrap_or(serde_json::Value::Null))?;
		}
		Command::Delete { key } => {
			let key = key_value(adapter.schema(), &key)?;
			adapter.delete(&key).await?;
			print_json(&json!({ "deleted": key.to_json() }))?;
		}
		Command::Put { record } => {
			let json: serde_json::Value = serde_json::from_str(&record).context("record is not valid JSON")?;
			let record = record_from_json(adapter.schema(), &json)?;
			adapter.save(&record).await?;
			print_json(&record.to_json())?;
		}
		Command::Query {
			condition,
			params,
			limit,
			reverse,
			cursor,
			index,
		} => {
			let params = parse_params(&params)?;
			let mut request = QueryRequest::new()
				.with_limit(limit.unwrap_or(config.default_page_size))
				.reversed(reverse)
				.starting_after(cursor.unwrap_or_default());
			if let Some(text) = condition {
				request = request.with_condition(parse_condition(&text, &params)?);
			}
			if let Some(index) = index {
				request = request.using_index(index);
			}
			let page = adapter.query(&request).await?;
			let records: Vec<serde_json::Value> = page.records.iter().map(|r| r.to_json()).collect();
			print_json(&json!({ "records": records, "next_cursor": page.next_cursor }))?;
		}
		Command::Drop => {
			adapter.drop_table().await?;
			print_json(&json!({ "dropped": adapter.schema().table_name }))?;
		}
	}

	Ok(())
}
