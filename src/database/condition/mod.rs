//! Backend-neutral query predicates
//!
//! Predicates are built with [`ConditionBuilder`] (or parsed from the small
//! text language in [`parse`]) into an immutable, normalized
//! [`ConditionNode`] tree, then compiled per backend:
//! - [`relational`]: full tree into a parameterized `WHERE` clause
//! - [`key_value`]: key equality and range conditions into a DynamoDB key
//!   condition expression

pub mod key_value;
pub(crate) mod lexer;
pub mod parse;
pub mod relational;

pub use key_value::{IndexLayout, KeyCondition, KeyConditionCompiler, KeyPredicate};
pub use parse::parse_condition;
pub use relational::{SqlConditionCompiler, SqlFragment};

use crate::database::error::{DatabaseError, DatabaseResult};
use crate::database::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
	Eq,
	Ne,
	Lt,
	Le,
	Gt,
	Ge,
	In,
	BeginsWith,
}

impl Operator {
	/// Comparison symbol for the binary operators
	pub fn symbol(&self) -> Option<&'static str> {
		match self {
			Operator::Eq => Some("="),
			Operator::Ne => Some("<>"),
			Operator::Lt => Some("<"),
			Operator::Le => Some("<="),
			Operator::Gt => Some(">"),
			Operator::Ge => Some(">="),
			Operator::In | Operator::BeginsWith => None,
		}
	}

	/// Operators a sort key condition may use
	pub fn is_range(&self) -> bool {
		matches!(
			self,
			Operator::Eq | Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge | Operator::BeginsWith
		)
	}
}

impl fmt::Display for Operator {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.symbol() {
			Some(symbol) => write!(f, "{symbol}"),
			None if *self == Operator::In => write!(f, "IN"),
			None => write!(f, "begins_with"),
		}
	}
}

/// A single field comparison
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
	field: String,
	operator: Operator,
	value: Value,
}

impl Condition {
	/// `In` takes a list or set value; `BeginsWith` a string prefix; null is
	/// only comparable with `Eq`/`Ne`.
	pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> DatabaseResult<Self> {
		let field = field.into();
		let value = value.into();
		match (operator, &value) {
			(Operator::In, Value::List(_) | Value::Set(_)) => {}
			(Operator::In, other) => {
				return Err(DatabaseError::UnsupportedQuery(format!(
					"IN on '{field}' expects a list value, got {}",
					other.type_name()
				)));
			}
			(Operator::BeginsWith, Value::String(_)) => {}
			(Operator::BeginsWith, other) => {
				return Err(DatabaseError::UnsupportedQuery(format!(
					"begins_with on '{field}' expects a string prefix, got {}",
					other.type_name()
				)));
			}
			(Operator::Eq | Operator::Ne, Value::Null) => {}
			(op, Value::Null) => {
				return Err(DatabaseError::UnsupportedQuery(format!(
					"'{field}' {op} null is never true"
				)));
			}
			_ => {}
		}
		if field.is_empty() {
			return Err(DatabaseError::UnsupportedQuery("condition field is empty".to_string()));
		}
		Ok(Self { field, operator, value })
	}

	pub fn field(&self) -> &str {
		&self.field
	}

	pub fn operator(&self) -> Operator {
		self.operator
	}

	pub fn value(&self) -> &Value {
		&self.value
	}

	/// Values an `In` condition lists, or the single comparison value
	pub fn values(&self) -> Vec<&Value> {
		match (&self.operator, &self.value) {
			(Operator::In, Value::List(items)) => items.iter().collect(),
			(Operator::In, Value::Set(items)) => items.iter().collect(),
			(_, value) => vec![value],
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOperator {
	And,
	Or,
}

impl LogicalOperator {
	pub fn keyword(&self) -> &'static str {
		match self {
			LogicalOperator::And => "AND",
			LogicalOperator::Or => "OR",
		}
	}
}

/// A node of a normalized predicate tree
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionNode {
	Condition(Condition),
	Group(ConditionGroup),
}

/// Two or more children joined by one logical operator
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionGroup {
	operator: LogicalOperator,
	children: Vec<ConditionNode>,
}

impl ConditionGroup {
	pub fn operator(&self) -> LogicalOperator {
		self.operator
	}

	pub fn children(&self) -> &[ConditionNode] {
		&self.children
	}
}

impl ConditionNode {
	/// Normalize a group: nested groups with the same operator are flattened
	/// and a single child stands in for its group.
	fn group(operator: LogicalOperator, children: Vec<ConditionNode>) -> DatabaseResult<Self> {
		let mut flat = Vec::with_capacity(children.len());
		for child in children {
			match child {
				ConditionNode::Group(group) if group.operator == operator => flat.extend(group.children),
				other => flat.push(other),
			}
		}
		match flat.len() {
			0 => Err(DatabaseError::UnsupportedQuery(format!(
				"empty {} group",
				operator.keyword()
			))),
			1 => Ok(flat.remove(0)),
			_ => Ok(ConditionNode::Group(ConditionGroup {
				operator,
				children: flat,
			})),
		}
	}

	/// The conditions of a pure conjunction, or `None` when an `Or` is involved
	pub fn conjuncts(&self) -> Option<Vec<&Condition>> {
		match self {
			ConditionNode::Condition(condition) => Some(vec![condition]),
			ConditionNode::Group(group) if group.operator == LogicalOperator::And => {
				let mut conditions = Vec::with_capacity(group.children.len());
				for child in &group.children {
					conditions.extend(child.conjuncts()?);
				}
				Some(conditions)
			}
			ConditionNode::Group(_) => None,
		}
	}

	/// Every condition in the tree, depth first
	pub fn conditions(&self) -> Vec<&Condition> {
		match self {
			ConditionNode::Condition(condition) => vec![condition],
			ConditionNode::Group(group) => group.children.iter().flat_map(ConditionNode::conditions).collect(),
		}
	}
}

impl From<Condition> for ConditionNode {
	fn from(condition: Condition) -> Self {
		ConditionNode::Condition(condition)
	}
}

/// Fluent construction of predicate trees. Invalid conditions are reported
/// by [`ConditionBuilder::build`].
#[derive(Debug)]
pub struct ConditionBuilder {
	operator: LogicalOperator,
	children: Vec<ConditionNode>,
	error: Option<DatabaseError>,
}

impl ConditionBuilder {
	pub fn new(operator: LogicalOperator) -> Self {
		Self {
			operator,
			children: Vec::new(),
			error: None,
		}
	}

	pub fn and() -> Self {
		Self::new(LogicalOperator::And)
	}

	pub fn or() -> Self {
		Self::new(LogicalOperator::Or)
	}

	pub fn condition(mut self, field: &str, operator: Operator, value: impl Into<Value>) -> Self {
		match Condition::new(field, operator, value) {
			Ok(condition) => self.children.push(condition.into()),
			Err(e) => {
				self.error.get_or_insert(e);
			}
		}
		self
	}

	pub fn eq(self, field: &str, value: impl Into<Value>) -> Self {
		self.condition(field, Operator::Eq, value)
	}

	pub fn ne(self, field: &str, value: impl Into<Value>) -> Self {
		self.condition(field, Operator::Ne, value)
	}

	pub fn lt(self, field: &str, value: impl Into<Value>) -> Self {
		self.condition(field, Operator::Lt, value)
	}

	pub fn le(self, field: &str, value: impl Into<Value>) -> Self {
		self.condition(field, Operator::Le, value)
	}

	pub fn gt(self, field: &str, value: impl Into<Value>) -> Self {
		self.condition(field, Operator::Gt, value)
	}

	pub fn ge(self, field: &str, value: impl Into<Value>) -> Self {
		self.condition(field, Operator::Ge, value)
	}

	pub fn is_in(self, field: &str, values: impl Into<Value>) -> Self {
		self.condition(field, Operator::In, values)
	}

	pub fn begins_with(self, field: &str, prefix: &str) -> Self {
		self.condition(field, Operator::BeginsWith, prefix)
	}

	/// Nest another group
	pub fn group(mut self, builder: ConditionBuilder) -> Self {
		match builder.build() {
			Ok(node) => self.children.push(node),
			Err(e) => {
				self.error.get_or_insert(e);
			}
		}
		self
	}

	/// Add an already-built node
	pub fn node(mut self, node: ConditionNode) -> Self {
		self.children.push(node);
		self
	}

	pub fn build(self) -> DatabaseResult<ConditionNode> {
		if let Some(e) = self.error {
			return Err(e);
		}
		ConditionNode::group(self.operator, self.children)
	}
}
