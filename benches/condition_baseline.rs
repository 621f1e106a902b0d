//! Condition building, parsing and compilation benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use multistore::database::condition::{KeyConditionCompiler, SqlConditionCompiler};
use multistore::database::{
	parse_condition, ConditionBuilder, FieldSpec, SecondaryIndex, SemanticType, SqlDialect, TableSchema, Value,
};
use std::collections::BTreeMap;

fn schema() -> TableSchema {
	TableSchema::new("orders")
		.with_field(FieldSpec::primary("id", SemanticType::String))
		.with_field(FieldSpec::new("customer", SemanticType::String))
		.with_field(FieldSpec::new("total", SemanticType::Float))
		.with_field(FieldSpec::new("status", SemanticType::enumeration(["open", "paid", "void"])))
		.with_secondary_index(SecondaryIndex::new("by_customer", "customer").with_range_key("total"))
}

const TEXT: &str = "customer = :c AND (total >= :min OR status IN :statuses) AND begins_with(id, :prefix)";

fn params() -> BTreeMap<String, Value> {
	BTreeMap::from([
		("c".to_string(), Value::from("c42")),
		("min".to_string(), Value::Float(10.0)),
		("statuses".to_string(), Value::list(["open", "paid"])),
		("prefix".to_string(), Value::from("2024-")),
	])
}

fn bench_build_and_parse(c: &mut Criterion) {
	let params = params();
	c.bench_function("condition_build", |b| {
		b.iter(|| {
			ConditionBuilder::and()
				.eq("customer", black_box("c42"))
				.group(ConditionBuilder::or().ge("total", 10.0).is_in("status", Value::list(["open", "paid"])))
				.begins_with("id", "2024-")
				.build()
				.unwrap()
		})
	});
	c.bench_function("condition_parse", |b| {
		b.iter(|| parse_condition(black_box(TEXT), &params).unwrap())
	});
}

fn bench_compile(c: &mut Criterion) {
	let schema = schema();
	let node = parse_condition(TEXT, &params()).unwrap();
	let key_node = ConditionBuilder::and().eq("customer", "c42").ge("total", 10.0).build().unwrap();

	let mut group = c.benchmark_group("condition_compile");
	for dialect in [SqlDialect::Sqlite, SqlDialect::Postgres] {
		let compiler = SqlConditionCompiler::new(dialect, &schema);
		group.bench_function(dialect.to_string(), |b| b.iter(|| compiler.compile(black_box(&node), 1).unwrap()));
	}
	let compiler = KeyConditionCompiler::new(&schema);
	group.bench_function("key_value", |b| b.iter(|| compiler.compile(black_box(&key_node), None).unwrap()));
	group.finish();
}

criterion_group!(benches, bench_build_and_parse, bench_compile);
criterion_main!(benches);
