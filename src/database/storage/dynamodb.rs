//! DynamoDB client on the AWS SDK

use super::{KeyQuery, KeyQueryOutput, KeyValueClient, KeyValueTableDefinition};
use crate::database::codec::key_value::Item;
use crate::database::error::{DatabaseError, DatabaseResult};
use crate::database::types::{KeyType, ScalarAttributeType};
use aws_config::{BehaviorVersion, Region};
use aws_sdk_dynamodb::error::{BuildError, DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::types::{
	AttributeDefinition, BillingMode, GlobalSecondaryIndex, KeySchemaElement, Projection, ProjectionType,
	ProvisionedThroughput, TableStatus,
};
use aws_sdk_dynamodb::Client;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const TABLE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Auth and transport failures are connection errors; everything the
/// service rejects after accepting the request is a query error
fn sdk_error<E, R>(operation: &str, err: SdkError<E, R>) -> DatabaseError
where
	E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
	R: std::fmt::Debug + Send + Sync + 'static,
{
	match &err {
		SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
			DatabaseError::Connection(format!("{operation}: {}", DisplayErrorContext(&err)))
		}
		SdkError::ServiceError(service) => {
			let code = service.err().code().unwrap_or("Unknown");
			let message = service.err().message().unwrap_or_default();
			match code {
				"UnrecognizedClientException"
				| "InvalidSignatureException"
				| "MissingAuthenticationTokenException"
				| "ExpiredTokenException"
				| "AccessDeniedException" => DatabaseError::Connection(format!("{operation}: {code}: {message}")),
				_ => DatabaseError::Query(format!("{operation}: {code}: {message}")),
			}
		}
		_ => DatabaseError::Query(format!("{operation}: {}", DisplayErrorContext(&err))),
	}
}

fn build_error(e: BuildError) -> DatabaseError {
	DatabaseError::InvalidConfiguration(e.to_string())
}

fn key_schema_element(element: &crate::database::types::KeySchemaElement) -> DatabaseResult<KeySchemaElement> {
	let key_type = match element.key_type {
		KeyType::Hash => aws_sdk_dynamodb::types::KeyType::Hash,
		KeyType::Range => aws_sdk_dynamodb::types::KeyType::Range,
	};
	KeySchemaElement::builder()
		.attribute_name(&element.attribute_name)
		.key_type(key_type)
		.build()
		.map_err(build_error)
}

fn throughput(read: Option<i64>, write: Option<i64>) -> DatabaseResult<Option<ProvisionedThroughput>> {
	match (read, write) {
		(Some(read), Some(write)) => ProvisionedThroughput::builder()
			.read_capacity_units(read)
			.write_capacity_units(write)
			.build()
			.map(Some)
			.map_err(build_error),
		_ => Ok(None),
	}
}

#[derive(Clone)]
pub struct DynamoDbClient {
	client: Client,
	create_timeout: Duration,
}

impl DynamoDbClient {
	/// Build a client from the ambient AWS configuration, optionally
	/// overriding the region and endpoint (for DynamoDB Local)
	pub async fn from_env(region: Option<String>, endpoint_url: Option<String>) -> Self {
		let mut loader = aws_config::defaults(BehaviorVersion::latest());
		if let Some(region) = region {
			loader = loader.region(Region::new(region));
		}
		let shared_config = loader.load().await;
		let mut builder = aws_sdk_dynamodb::config::Builder::from(&shared_config);
		if let Some(endpoint_url) = endpoint_url {
			builder = builder.endpoint_url(endpoint_url);
		}
		Self::from_client(Client::from_conf(builder.build()))
	}

	pub fn from_client(client: Client) -> Self {
		Self {
			client,
			create_timeout: Duration::from_secs(60),
		}
	}

	/// How long `create_table` waits for the table to become active
	pub fn with_create_timeout(mut self, create_timeout: Duration) -> Self {
		self.create_timeout = create_timeout;
		self
	}

	async fn table_status(&self, table_name: &str) -> DatabaseResult<Option<TableStatus>> {
		match self.client.describe_table().table_name(table_name).send().await {
			Ok(output) => Ok(output.table().and_then(|t| t.table_status()).cloned()),
			Err(err)
				if err
					.as_service_error()
					.is_some_and(|e| e.is_resource_not_found_exception()) =>
			{
				Ok(None)
			}
			Err(err) => Err(sdk_error("DescribeTable", err)),
		}
	}

	async fn wait_until_active(&self, table_name: &str) -> DatabaseResult<()> {
		let started = Instant::now();
		loop {
			if self.table_status(table_name).await? == Some(TableStatus::Active) {
				return Ok(());
			}
			if started.elapsed() >= self.create_timeout {
				return Err(DatabaseError::schema(
					table_name,
					format!("table not active after {:?}", self.create_timeout),
				));
			}
			tokio::time::sleep(TABLE_POLL_INTERVAL).await;
		}
	}
}

#[async_trait::async_trait]
impl KeyValueClient for DynamoDbClient {
	async fn table_exists(&self, table_name: &str) -> DatabaseResult<bool> {
		Ok(self.table_status(table_name).await?.is_some())
	}

	async fn create_table(&self, definition: &KeyValueTableDefinition) -> DatabaseResult<()> {
		let key_schema = definition
			.key_schema
			.iter()
			.map(key_schema_element)
			.collect::<DatabaseResult<Vec<_>>>()?;
		let attribute_definitions = definition
			.attribute_definitions
			.iter()
			.map(|d| {
				let attribute_type = match d.attribute_type {
					ScalarAttributeType::S => aws_sdk_dynamodb::types::ScalarAttributeType::S,
					ScalarAttributeType::N => aws_sdk_dynamodb::types::ScalarAttributeType::N,
					ScalarAttributeType::B => aws_sdk_dynamodb::types::ScalarAttributeType::B,
				};
				AttributeDefinition::builder()
					.attribute_name(&d.attribute_name)
					.attribute_type(attribute_type)
					.build()
					.map_err(build_error)
			})
			.collect::<DatabaseResult<Vec<_>>>()?;

		let table_throughput = throughput(definition.read_capacity, definition.write_capacity)?;
		let mut indexes = Vec::with_capacity(definition.global_secondary_indexes.len());
		for index in &definition.global_secondary_indexes {
			let index_throughput = match throughput(index.read_capacity, index.write_capacity)? {
				Some(explicit) => Some(explicit),
				None => table_throughput.clone(),
			};
			indexes.push(
				GlobalSecondaryIndex::builder()
					.index_name(&index.index_name)
					.set_key_schema(Some(
						index.key_schema.iter().map(key_schema_element).collect::<DatabaseResult<Vec<_>>>()?,
					))
					.projection(Projection::builder().projection_type(ProjectionType::All).build())
					.set_provisioned_throughput(index_throughput)
					.build()
					.map_err(build_error)?,
			);
		}

		let mut request = self
			.client
			.create_table()
			.table_name(&definition.table_name)
			.set_key_schema(Some(key_schema))
			.set_attribute_definitions(Some(attribute_definitions));
		if !indexes.is_empty() {
			request = request.set_global_secondary_indexes(Some(indexes));
		}
		request = match table_throughput {
			Some(provisioned) => request
				.billing_mode(BillingMode::Provisioned)
				.provisioned_throughput(provisioned),
			None => request.billing_mode(BillingMode::PayPerRequest),
		};

		request
			.send()
			.await
			.map_err(|e| sdk_error("CreateTable", e).into_schema_error(&definition.table_name))?;
		info!("Created DynamoDB table {}", definition.table_name);
		self.wait_until_active(&definition.table_name).await
	}

	async fn delete_table(&self, table_name: &str) -> DatabaseResult<()> {
		match self.client.delete_table().table_name(table_name).send().await {
			Ok(_) => {
				info!("Deleted DynamoDB table {table_name}");
				Ok(())
			}
			Err(err)
				if err
					.as_service_error()
					.is_some_and(|e| e.is_resource_not_found_exception()) =>
			{
				Ok(())
			}
			Err(err) => Err(sdk_error("DeleteTable", err).into_schema_error(table_name)),
		}
	}

	async fn put_item(&self, table_name: &str, item: Item) -> DatabaseResult<()> {
		self.client
			.put_item()
			.table_name(table_name)
			.set_item(Some(item))
			.send()
			.await
			.map_err(|e| sdk_error("PutItem", e))?;
		Ok(())
	}

	async fn get_item(&self, table_name: &str, key: Item) -> DatabaseResult<Option<Item>> {
		let output = self
			.client
			.get_item()
			.table_name(table_name)
			.set_key(Some(key))
			.consistent_read(true)
			.send()
			.await
			.map_err(|e| sdk_error("GetItem", e))?;
		Ok(output.item().cloned())
	}

	async fn delete_item(&self, table_name: &str, key: Item) -> DatabaseResult<()> {
		self.client
			.delete_item()
			.table_name(table_name)
			.set_key(Some(key))
			.send()
			.await
			.map_err(|e| sdk_error("DeleteItem", e))?;
		Ok(())
	}

	async fn query(&self, query: KeyQuery) -> DatabaseResult<KeyQueryOutput> {
		let expression = query.condition.expression();
		debug!(
			table = query.table_name.as_str(),
			index = query.condition.index_name(),
			expression = expression.as_str(),
			"DynamoDB query"
		);
		let output = self
			.client
			.query()
			.table_name(&query.table_name)
			.set_index_name(query.condition.index_name().map(str::to_string))
			.key_condition_expression(expression)
			.set_expression_attribute_names(Some(query.condition.attribute_names().into_iter().collect()))
			.set_expression_attribute_values(Some(query.condition.attribute_values().into_iter().collect()))
			.set_limit(query.limit)
			.scan_index_forward(query.scan_forward)
			.set_exclusive_start_key(query.exclusive_start_key)
			.send()
			.await
			.map_err(|e| sdk_error("Query", e))?;
		Ok(KeyQueryOutput {
			items: output.items().to_vec(),
			last_evaluated_key: output.last_evaluated_key().cloned(),
		})
	}
}
