//! Compilation of condition trees into DynamoDB key conditions
//!
//! The key-value backend can only query by key: an equality on the hash key
//! of the table or of a global secondary index, optionally narrowed by one
//! comparison on that index's range key. Anything else is rejected with
//! `UnsupportedQuery` rather than silently turned into a scan.

use super::{Condition, ConditionNode, Operator};
use crate::database::codec::key_value::Item;
use crate::database::codec::KeyValueCodec;
use crate::database::error::{DatabaseError, DatabaseResult};
use crate::database::types::{FieldSpec, KeyType, TableSchema};
use aws_sdk_dynamodb::types::AttributeValue;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Key attributes of the table itself or of one secondary index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLayout {
	/// `None` for the table's own key
	pub index_name: Option<String>,
	pub hash_key: String,
	pub range_key: Option<String>,
}

impl IndexLayout {
	/// The table key first, then each secondary index in declaration order
	pub fn for_schema(schema: &TableSchema) -> DatabaseResult<Vec<IndexLayout>> {
		let extras = &schema.backend_extras;
		let table = if extras.key_schema.is_empty() {
			let pk = schema
				.primary_key()
				.ok_or_else(|| DatabaseError::schema(&schema.table_name, "no primary key field declared"))?;
			IndexLayout {
				index_name: None,
				hash_key: pk.name.clone(),
				range_key: None,
			}
		} else {
			let hash_key = extras
				.key_schema
				.iter()
				.find(|k| k.key_type == KeyType::Hash)
				.map(|k| k.attribute_name.clone())
				.ok_or_else(|| DatabaseError::schema(&schema.table_name, "key schema has no HASH key"))?;
			let range_key = extras
				.key_schema
				.iter()
				.find(|k| k.key_type == KeyType::Range)
				.map(|k| k.attribute_name.clone());
			IndexLayout {
				index_name: None,
				hash_key,
				range_key,
			}
		};

		let mut layouts = vec![table];
		for index in &extras.global_secondary_indexes {
			let hash_key = index.hash_key().ok_or_else(|| {
				DatabaseError::schema(
					&schema.table_name,
					format!("index '{}' has no HASH key", index.index_name),
				)
			})?;
			layouts.push(IndexLayout {
				index_name: Some(index.index_name.clone()),
				hash_key: hash_key.to_string(),
				range_key: index.range_key().map(str::to_string),
			});
		}
		Ok(layouts)
	}

	/// Attributes that identify an item's position in this index
	pub fn key_attributes(&self) -> Vec<&str> {
		let mut names = vec![self.hash_key.as_str()];
		names.extend(self.range_key.as_deref());
		names
	}
}

/// One encoded comparison on a key attribute
#[derive(Debug, Clone, PartialEq)]
pub struct KeyPredicate {
	pub attribute: String,
	pub operator: Operator,
	pub value: AttributeValue,
}

impl KeyPredicate {
	fn matches(&self, item: &Item) -> bool {
		let Some(actual) = item.get(&self.attribute) else {
			return false;
		};
		if self.operator == Operator::BeginsWith {
			return match (actual, &self.value) {
				(AttributeValue::S(s), AttributeValue::S(prefix)) => s.starts_with(prefix.as_str()),
				(AttributeValue::B(b), AttributeValue::B(prefix)) => b.as_ref().starts_with(prefix.as_ref()),
				_ => false,
			};
		}
		let Some(ordering) = compare_attributes(actual, &self.value) else {
			return false;
		};
		match self.operator {
			Operator::Eq => ordering == Ordering::Equal,
			Operator::Lt => ordering == Ordering::Less,
			Operator::Le => ordering != Ordering::Greater,
			Operator::Gt => ordering == Ordering::Greater,
			Operator::Ge => ordering != Ordering::Less,
			Operator::Ne | Operator::In | Operator::BeginsWith => false,
		}
	}
}

/// A compiled key condition against the table or one secondary index
#[derive(Debug, Clone, PartialEq)]
pub struct KeyCondition {
	pub index: IndexLayout,
	pub hash: KeyPredicate,
	pub range: Option<KeyPredicate>,
}

impl KeyCondition {
	pub fn index_name(&self) -> Option<&str> {
		self.index.index_name.as_deref()
	}

	fn predicates(&self) -> impl Iterator<Item = &KeyPredicate> {
		std::iter::once(&self.hash).chain(self.range.as_ref())
	}

	/// `KeyConditionExpression` text using `#kN` / `:vN` placeholders
	pub fn expression(&self) -> String {
		self.predicates()
			.enumerate()
			.map(|(i, predicate)| match predicate.operator {
				Operator::BeginsWith => format!("begins_with(#k{i}, :v{i})"),
				operator => format!("#k{i} {} :v{i}", operator.symbol().unwrap_or("=")),
			})
			.collect::<Vec<_>>()
			.join(" AND ")
	}

	pub fn attribute_names(&self) -> BTreeMap<String, String> {
		self.predicates()
			.enumerate()
			.map(|(i, predicate)| (format!("#k{i}"), predicate.attribute.clone()))
			.collect()
	}

	pub fn attribute_values(&self) -> BTreeMap<String, AttributeValue> {
		self.predicates()
			.enumerate()
			.map(|(i, predicate)| (format!(":v{i}"), predicate.value.clone()))
			.collect()
	}

	/// Evaluate against a stored item, as the service would
	pub fn matches(&self, item: &Item) -> bool {
		self.predicates().all(|predicate| predicate.matches(item))
	}
}

/// Order two key attributes of the same kind; numbers compare numerically
pub fn compare_attributes(a: &AttributeValue, b: &AttributeValue) -> Option<Ordering> {
	match (a, b) {
		(AttributeValue::S(a), AttributeValue::S(b)) => Some(a.cmp(b)),
		(AttributeValue::N(a), AttributeValue::N(b)) => {
			if let (Ok(a), Ok(b)) = (a.parse::<i64>(), b.parse::<i64>()) {
				return Some(a.cmp(&b));
			}
			let (a, b) = (a.parse::<f64>().ok()?, b.parse::<f64>().ok()?);
			Some(a.total_cmp(&b))
		}
		(AttributeValue::B(a), AttributeValue::B(b)) => Some(a.as_ref().cmp(b.as_ref())),
		_ => None,
	}
}

pub struct KeyConditionCompiler<'a> {
	schema: &'a TableSchema,
	codec: KeyValueCodec,
}

impl<'a> KeyConditionCompiler<'a> {
	pub fn new(schema: &'a TableSchema) -> Self {
		Self {
			schema,
			codec: KeyValueCodec::new(),
		}
	}

	/// Compile `node` against the named index, or against the first layout
	/// (table key, then indexes) whose keys the conditions fit
	pub fn compile(&self, node: &ConditionNode, index_name: Option<&str>) -> DatabaseResult<KeyCondition> {
		let conditions = node.conjuncts().ok_or_else(|| {
			DatabaseError::UnsupportedQuery("OR groups cannot be expressed as a key condition".to_string())
		})?;
		for condition in &conditions {
			if matches!(condition.operator(), Operator::Ne | Operator::In) {
				return Err(DatabaseError::UnsupportedQuery(format!(
					"operator {} on '{}' cannot be expressed as a key condition",
					condition.operator(),
					condition.field()
				)));
			}
		}

		let layouts = IndexLayout::for_schema(self.schema)?;
		let candidates: Vec<&IndexLayout> = match index_name {
			Some(name) => {
				let layout = layouts
					.iter()
					.find(|l| l.index_name.as_deref() == Some(name))
					.ok_or_else(|| {
						DatabaseError::UnsupportedQuery(format!(
							"table '{}' has no index named '{name}'",
							self.schema.table_name
						))
					})?;
				vec![layout]
			}
			None => layouts.iter().collect(),
		};

		for layout in candidates {
			if let Some((hash, range)) = fit(layout, &conditions) {
				return Ok(KeyCondition {
					index: layout.clone(),
					hash: self.predicate(hash)?,
					range: range.map(|c| self.predicate(c)).transpose()?,
				});
			}
		}

		let fields: Vec<&str> = conditions.iter().map(|c| c.field()).collect();
		Err(DatabaseError::UnsupportedQuery(format!(
			"conditions on [{}] do not match the key of table '{}' or any of its indexes",
			fields.join(", "),
			self.schema.table_name
		)))
	}

	fn predicate(&self, condition: &Condition) -> DatabaseResult<KeyPredicate> {
		let field = self.field(condition.field())?;
		if condition.operator() == Operator::BeginsWith && !field.semantic_type.is_textual() {
			return Err(DatabaseError::UnsupportedQuery(format!(
				"begins_with needs a string key, '{}' is {}",
				field.name, field.semantic_type
			)));
		}
		let value = match condition.operator() {
			// The prefix is matched against the stored form as is
			Operator::BeginsWith => AttributeValue::S(condition.value().to_string()),
			_ => self.codec.encode_key(condition.value(), &field.semantic_type)?,
		};
		Ok(KeyPredicate {
			attribute: field.name.clone(),
			operator: condition.operator(),
			value,
		})
	}

	fn field(&self, name: &str) -> DatabaseResult<&'a FieldSpec> {
		self.schema.field(name).ok_or_else(|| {
			DatabaseError::UnsupportedQuery(format!(
				"'{name}' is not a field of table '{}'",
				self.schema.table_name
			))
		})
	}
}

/// Split conditions into the hash equality and optional range condition
/// of `layout`, or `None` when they do not fit it exactly
fn fit<'c>(layout: &IndexLayout, conditions: &[&'c Condition]) -> Option<(&'c Condition, Option<&'c Condition>)> {
	let hash_position = conditions
		.iter()
		.position(|c| c.field() == layout.hash_key && c.operator() == Operator::Eq)?;
	let rest: Vec<&Condition> = conditions
		.iter()
		.enumerate()
		.filter(|(i, _)| *i != hash_position)
		.map(|(_, c)| *c)
		.collect();
	match rest.as_slice() {
		[] => Some((conditions[hash_position], None)),
		[range]
			if Some(range.field()) == layout.range_key.as_deref() && range.operator().is_range() =>
		{
			Some((conditions[hash_position], Some(*range)))
		}
		_ => None,
	}
}
