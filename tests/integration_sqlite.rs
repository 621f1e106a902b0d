//! Integration tests for the SQLite adapter
//!
//! These run against in-memory and temporary-file databases and cover the
//! full adapter contract: point operations, paging, joins and raw SQL.

use multistore::database::{
	Adapter, ConditionBuilder, DatabaseError, ErrorKind, FieldSpec, JoinSpec, QueryRequest, Record, SemanticType,
	SqliteAdapter, TableSchema, Value,
};
use std::collections::BTreeMap;
use tokio::test;

mod common;
use common::*;

/// Save, read back and find a user by age
#[test]
async fn test_scenario_round_trip_and_query() {
	let mut adapter = sqlite_adapter(users_schema("users")).await;
	let ann = user("u1", "Ann", 30).with("tags", Value::set(["x", "y"]));
	adapter.save(&ann).await.unwrap();

	assert_eq!(adapter.get(&Value::from("u1")).await.unwrap(), Some(ann));

	let adults = ConditionBuilder::and().ge("age", 18).build().unwrap();
	let page = adapter
		.query(&QueryRequest::new().with_condition(adults).with_limit(10))
		.await
		.unwrap();
	assert_eq!(ids(&page.records), vec!["u1"]);
	assert_eq!(page.next_cursor, "");
}

#[test]
async fn test_save_replaces_instead_of_merging() {
	let mut adapter = sqlite_adapter(users_schema("users")).await;
	adapter.save(&user("k", "first", 1)).await.unwrap();
	adapter.save(&Record::new().with("id", "k").with("age", 2)).await.unwrap();

	let stored = adapter.get(&Value::from("k")).await.unwrap().unwrap();
	assert_eq!(stored, Record::new().with("id", "k").with("age", 2));
	assert!(!stored.contains("name"));
}

#[test]
async fn test_get_missing_and_delete_twice() {
	let mut adapter = sqlite_adapter(users_schema("users")).await;
	assert_eq!(adapter.get(&Value::from("ghost")).await.unwrap(), None);

	adapter.save(&user("u1", "Ann", 30)).await.unwrap();
	tokio_test::assert_ok!(adapter.delete(&Value::from("u1")).await);
	tokio_test::assert_ok!(adapter.delete(&Value::from("u1")).await);
	assert_eq!(adapter.get(&Value::from("u1")).await.unwrap(), None);
}

/// Paging with every interesting page size returns each record exactly once
#[test]
async fn test_pagination_is_complete() {
	let mut adapter = sqlite_adapter(users_schema("users")).await;
	let users = sample_users();
	save_all(&mut adapter, &users).await;
	let expected = ids(&users);

	for limit in [1, 2, users.len(), users.len() + 10] {
		let records = collect_pages(&mut adapter, QueryRequest::new().with_limit(limit)).await;
		assert_eq!(ids(&records), expected, "limit {limit}");
	}

	let mut reversed = expected.clone();
	reversed.reverse();
	for limit in [1, 3] {
		let records = collect_pages(&mut adapter, QueryRequest::new().with_limit(limit).reversed(true)).await;
		assert_eq!(ids(&records), reversed, "reverse limit {limit}");
	}
}

#[test]
async fn test_pagination_with_condition() {
	let mut adapter = sqlite_adapter(users_schema("users")).await;
	save_all(&mut adapter, &sample_users()).await;

	let condition = ConditionBuilder::or()
		.lt("age", 22)
		.group(ConditionBuilder::and().ge("age", 27).ne("id", "u09"))
		.build()
		.unwrap();
	let records = collect_pages(&mut adapter, QueryRequest::new().with_condition(condition).with_limit(2)).await;
	assert_eq!(ids(&records), vec!["u00", "u01", "u07", "u08"]);
}

#[test]
async fn test_integer_primary_key_cursor() {
	let schema = TableSchema::new("counters")
		.with_field(FieldSpec::primary("n", SemanticType::Int))
		.with_field(FieldSpec::new("label", SemanticType::optional(SemanticType::String)));
	let mut adapter = sqlite_adapter(schema).await;
	// Numeric order differs from text order here
	for n in [2, 10, 1, 33] {
		adapter.save(&Record::new().with("n", n)).await.unwrap();
	}
	let records = collect_pages(&mut adapter, QueryRequest::new().with_limit(1)).await;
	let keys: Vec<&Value> = records.iter().filter_map(|r| r.get("n")).collect();
	assert_eq!(keys, vec![&Value::Int(1), &Value::Int(2), &Value::Int(10), &Value::Int(33)]);

	let err = adapter
		.query(&QueryRequest::new().starting_after("not-a-number"))
		.await
		.unwrap_err();
	assert!(matches!(err.root(), DatabaseError::InvalidCursor(_)));
}

#[test]
async fn test_begins_with_treats_wildcards_literally() {
	let mut adapter = sqlite_adapter(users_schema("users")).await;
	save_all(
		&mut adapter,
		&[user("a_1", "x", 1), user("ab1", "y", 2), user("a%2", "z", 3)],
	)
	.await;
	let condition = ConditionBuilder::and().begins_with("id", "a_").build().unwrap();
	let page = adapter.query(&QueryRequest::new().with_condition(condition)).await.unwrap();
	assert_eq!(ids(&page.records), vec!["a_1"]);
}

/// Prefix matching is case-sensitive, as on the other backends
#[test]
async fn test_begins_with_is_case_sensitive() {
	let mut adapter = sqlite_adapter(users_schema("users")).await;
	save_all(&mut adapter, &[user("u1", "ann", 1), user("U2", "Ann", 2)]).await;

	let condition = ConditionBuilder::and().begins_with("id", "U").build().unwrap();
	let page = adapter.query(&QueryRequest::new().with_condition(condition)).await.unwrap();
	assert_eq!(ids(&page.records), vec!["U2"]);

	let params = BTreeMap::from([("p".to_string(), Value::from("an"))]);
	let rows = adapter
		.execute_sql("SELECT id FROM users WHERE begins_with(name, :p)", &params)
		.await
		.unwrap();
	assert_eq!(ids(&rows), vec!["u1"]);
}

#[test]
async fn test_joined_columns_are_projected() {
	let mut users = sqlite_adapter(users_schema("users")).await;
	save_all(&mut users, &[user("u1", "Ann", 30), user("u2", "Bob", 40)]).await;
	let mut params = BTreeMap::new();
	users
		.execute_sql("CREATE TABLE orders (user_id TEXT, total INTEGER)", &params)
		.await
		.unwrap();
	params.insert("u".to_string(), Value::from("u1"));
	params.insert("t".to_string(), Value::Int(99));
	users
		.execute_sql("INSERT INTO orders (user_id, total) VALUES (:u, :t)", &params)
		.await
		.unwrap();

	let join = JoinSpec::left("orders", r#""orders"."user_id" = "users"."id""#).with_columns(["total"]);
	let page = users.query(&QueryRequest::new().with_join(join)).await.unwrap();
	assert_eq!(page.records.len(), 2);
	assert_eq!(page.records[0].get("orders.total"), Some(&Value::Int(99)));
	assert_eq!(page.records[0].get("name"), Some(&Value::from("Ann")));
	// Left join with no match leaves the column out
	assert!(!page.records[1].contains("orders.total"));

	let inner = JoinSpec::inner("orders", r#""orders"."user_id" = "users"."id""#).with_columns(["total"]);
	let condition = ConditionBuilder::and().ge("age", 18).build().unwrap();
	let page = users
		.query(&QueryRequest::new().with_join(inner).with_condition(condition))
		.await
		.unwrap();
	assert_eq!(ids(&page.records), vec!["u1"]);
}

/// An entity with several joined rows is never split across pages
#[test]
async fn test_one_to_many_join_pages_by_entity() {
	let mut users = sqlite_adapter(users_schema("users")).await;
	save_all(&mut users, &[user("u1", "Ann", 30), user("u2", "Bob", 40), user("u3", "Cy", 50)]).await;
	users
		.execute_sql("CREATE TABLE orders (user_id TEXT, total INTEGER)", &BTreeMap::new())
		.await
		.unwrap();
	for (owner, total) in [("u1", 1), ("u1", 2), ("u1", 3), ("u2", 4)] {
		let params = BTreeMap::from([("u".to_string(), Value::from(owner)), ("t".to_string(), Value::Int(total))]);
		users
			.execute_sql("INSERT INTO orders (user_id, total) VALUES (:u, :t)", &params)
			.await
			.unwrap();
	}

	let inner = JoinSpec::inner("orders", r#""orders"."user_id" = "users"."id""#).with_columns(["total"]);
	let mut request = QueryRequest::new().with_join(inner).with_limit(2);
	let mut rows = Vec::new();
	let mut pages = 0;
	loop {
		let page = users.query(&request).await.unwrap();
		pages += 1;
		for record in &page.records {
			let id = record.get("id").and_then(Value::as_str).unwrap().to_string();
			rows.push((id, record.get("orders.total").cloned()));
		}
		if page.is_last_page() {
			break;
		}
		request = request.starting_after(page.next_cursor);
	}
	let expected: Vec<(String, Option<Value>)> = [("u1", 1), ("u1", 2), ("u1", 3), ("u2", 4)]
		.into_iter()
		.map(|(id, total)| (id.to_string(), Some(Value::Int(total))))
		.collect();
	let mut sorted = rows.clone();
	sorted.sort();
	assert_eq!(sorted, expected);
	assert_eq!(pages, 2);

	let left = JoinSpec::left("orders", r#""orders"."user_id" = "users"."id""#);
	let first = users
		.query(&QueryRequest::new().with_join(left).with_limit(1))
		.await
		.unwrap();
	assert_eq!(ids(&first.records), vec!["u1", "u1", "u1"]);
	assert_eq!(first.next_cursor, "u1");
}

#[test]
async fn test_execute_sql_decodes_declared_fields() {
	let mut adapter = sqlite_adapter(users_schema("users")).await;
	adapter
		.save(&user("u1", "Ann", 30).with("tags", Value::set(["b", "a"])))
		.await
		.unwrap();
	adapter.save(&user("u2", "Andy", 12)).await.unwrap();
	adapter.save(&user("u3", "Bea", 50)).await.unwrap();

	let params = BTreeMap::from([
		("min".to_string(), Value::Int(18)),
		("prefix".to_string(), Value::from("An")),
	]);
	let rows = adapter
		.execute_sql(
			"SELECT id, tags, age * 2 AS doubled FROM users WHERE age >= :min AND begins_with(name, :prefix) ORDER BY id",
			&params,
		)
		.await
		.unwrap();
	assert_eq!(rows.len(), 1);
	assert_eq!(rows[0].get("tags"), Some(&Value::set(["a", "b"])));
	assert_eq!(rows[0].get("doubled"), Some(&Value::Int(60)));

	let err = adapter.execute_sql("SELECT * FROM users WHERE id = :nope", &BTreeMap::new()).await.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::UnsupportedQuery);
}

#[test]
async fn test_rich_types_survive_storage() {
	let schema = TableSchema::new("things")
		.with_field(FieldSpec::primary("id", SemanticType::String))
		.with_field(FieldSpec::new("flag", SemanticType::Bool))
		.with_field(FieldSpec::new("ratio", SemanticType::Float))
		.with_field(FieldSpec::new("blob", SemanticType::Bytes))
		.with_field(FieldSpec::new("at", SemanticType::DateTime))
		.with_field(FieldSpec::new("color", SemanticType::enumeration(["red", "blue"])))
		.with_field(FieldSpec::new(
			"nested",
			SemanticType::map(SemanticType::list(SemanticType::set(SemanticType::Int))),
		))
		.with_field(FieldSpec::new("doc", SemanticType::Any));
	let mut adapter = sqlite_adapter(schema).await;
	let at = chrono::DateTime::parse_from_rfc3339("2024-02-29T12:00:00.123456789Z")
		.unwrap()
		.with_timezone(&chrono::Utc);
	let record = Record::new()
		.with("id", "t1")
		.with("flag", true)
		.with("ratio", 0.25)
		.with("blob", vec![0u8, 1, 254])
		.with("at", at)
		.with("color", "blue")
		.with("nested", Value::map([("k", Value::list([Value::set([3, 1])]))]))
		.with("doc", serde_json::json!({"a": [1, null]}));
	adapter.save(&record).await.unwrap();
	assert_eq!(adapter.get(&Value::from("t1")).await.unwrap(), Some(record));

	let bad = Record::new().with("id", "t2").with("color", "green");
	let err = adapter.save(&bad).await.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::InvalidEnumValue);
}

#[test]
async fn test_any_field_reads_back_canonical_record() {
	let schema = TableSchema::new("docs")
		.with_field(FieldSpec::primary("id", SemanticType::String))
		.with_field(FieldSpec::new("doc", SemanticType::Any));
	let mut adapter = sqlite_adapter(schema.clone()).await;
	let record = Record::new().with("id", "d1").with("doc", 3);
	adapter.save(&record).await.unwrap();

	let stored = adapter.get(&Value::from("d1")).await.unwrap().unwrap();
	assert_eq!(stored.get("doc"), Some(&Value::Json(serde_json::json!(3))));
	assert_eq!(stored, schema.canonical_record(&record));
}

#[test]
async fn test_undeclared_fields_are_rejected() {
	let mut adapter = sqlite_adapter(users_schema("users")).await;
	let err = adapter.save(&user("u1", "Ann", 30).with("email", "a@b")).await.unwrap_err();
	assert!(matches!(err.root(), DatabaseError::InvalidRecord(_)));
}

#[test]
async fn test_file_database_persists_between_adapters() {
	let dir = setup_temp_dir();
	let path = dir.path().join("users.db");
	{
		let mut adapter = SqliteAdapter::open(&path, users_schema("users")).await.unwrap();
		adapter.save(&user("u1", "Ann", 30)).await.unwrap();
	}
	let mut adapter = SqliteAdapter::open(&path, users_schema("users")).await.unwrap();
	assert_eq!(adapter.get(&Value::from("u1")).await.unwrap(), Some(user("u1", "Ann", 30)));

	adapter.drop_table().await.unwrap();
	adapter.create_table().await.unwrap();
	assert_eq!(adapter.get(&Value::from("u1")).await.unwrap(), None);
}

#[test]
async fn test_key_value_options_are_refused() {
	let mut adapter = sqlite_adapter(users_schema("users")).await;
	let err = adapter.query(&QueryRequest::new().using_index("by_team")).await.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::UnsupportedQuery);
	let err = adapter.query(&QueryRequest::new().with_limit(0)).await.unwrap_err();
	assert!(matches!(err.root(), DatabaseError::InvalidValue { .. }));
}
