//! Compilation of condition trees into parameterized `WHERE` clauses

use super::{Condition, ConditionNode, Operator};
use crate::database::codec::{RelationalCodec, SqlDialect, SqlParam, SqlType, SqlValue};
use crate::database::error::{DatabaseError, DatabaseResult};
use crate::database::types::{FieldSpec, TableSchema};
use crate::database::value::Value;

/// SQL text plus the parameters its placeholders bind, in order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SqlFragment {
	pub sql: String,
	pub params: Vec<SqlParam>,
}

impl SqlFragment {
	pub fn is_empty(&self) -> bool {
		self.sql.is_empty()
	}
}

/// Escape `LIKE` wildcards so a prefix matches literally under `ESCAPE '\'`
pub fn escape_like_wildcards(prefix: &str) -> String {
	let mut escaped = String::with_capacity(prefix.len());
	for c in prefix.chars() {
		if matches!(c, '\\' | '%' | '_') {
			escaped.push('\\');
		}
		escaped.push(c);
	}
	escaped
}

/// Bound text for a `begins_with` prefix, in the form [`prefix_match`] expects
pub fn prefix_param(dialect: SqlDialect, prefix: &str) -> SqlParam {
	let text = match dialect {
		SqlDialect::Sqlite => prefix.to_string(),
		SqlDialect::Postgres => escape_like_wildcards(prefix),
	};
	SqlParam::typed(SqlValue::Text(text), SqlType::Text)
}

/// Case-sensitive test that `column` starts with the bound prefix. SQLite's
/// `LIKE` ignores ASCII case, so it compares the leading substring instead.
pub fn prefix_match(dialect: SqlDialect, column: &str, placeholder: &str) -> String {
	match dialect {
		SqlDialect::Sqlite => format!("substr({column}, 1, length({placeholder})) = {placeholder}"),
		SqlDialect::Postgres => format!("{column} LIKE {placeholder} || '%' ESCAPE '\\'"),
	}
}

/// Compiles conditions over one table's declared fields
pub struct SqlConditionCompiler<'a> {
	dialect: SqlDialect,
	schema: &'a TableSchema,
	qualifier: Option<String>,
}

impl<'a> SqlConditionCompiler<'a> {
	pub fn new(dialect: SqlDialect, schema: &'a TableSchema) -> Self {
		Self {
			dialect,
			schema,
			qualifier: None,
		}
	}

	/// Prefix every column with the quoted table name, needed once joins
	/// bring other tables' columns into scope
	pub fn qualified(mut self) -> Self {
		self.qualifier = Some(self.dialect.quote_identifier(&self.schema.table_name));
		self
	}

	/// Compile `node`; placeholders are numbered from `first_param`
	pub fn compile(&self, node: &ConditionNode, first_param: usize) -> DatabaseResult<SqlFragment> {
		let mut fragment = SqlFragment::default();
		self.compile_node(node, first_param, &mut fragment)?;
		Ok(fragment)
	}

	fn compile_node(&self, node: &ConditionNode, first_param: usize, out: &mut SqlFragment) -> DatabaseResult<()> {
		match node {
			ConditionNode::Condition(condition) => self.compile_condition(condition, first_param, out),
			ConditionNode::Group(group) => {
				out.sql.push('(');
				for (i, child) in group.children().iter().enumerate() {
					if i > 0 {
						out.sql.push(' ');
						out.sql.push_str(group.operator().keyword());
						out.sql.push(' ');
					}
					self.compile_node(child, first_param, out)?;
				}
				out.sql.push(')');
				Ok(())
			}
		}
	}

	fn compile_condition(&self, condition: &Condition, first_param: usize, out: &mut SqlFragment) -> DatabaseResult<()> {
		let field = self.field(condition.field())?;
		let column = self.column(&field.name);
		let codec = RelationalCodec::new(self.dialect);

		match (condition.operator(), condition.value()) {
			(Operator::Eq, Value::Null) => {
				out.sql.push_str(&format!("{column} IS NULL"));
			}
			(Operator::Ne, Value::Null) => {
				out.sql.push_str(&format!("{column} IS NOT NULL"));
			}
			(Operator::In, _) => {
				let values = condition.values();
				if values.is_empty() {
					out.sql.push_str("1 = 0");
					return Ok(());
				}
				let mut placeholders = Vec::with_capacity(values.len());
				for value in values {
					placeholders.push(self.bind(out, first_param, codec.encode_param(value, &field.semantic_type)?));
				}
				out.sql.push_str(&format!("{column} IN ({})", placeholders.join(", ")));
			}
			(Operator::BeginsWith, Value::String(prefix)) => {
				if !field.semantic_type.is_textual() {
					return Err(DatabaseError::UnsupportedQuery(format!(
						"begins_with needs a text field, '{}' is {}",
						field.name, field.semantic_type
					)));
				}
				let placeholder = self.bind(out, first_param, prefix_param(self.dialect, prefix));
				out.sql.push_str(&prefix_match(self.dialect, &column, &placeholder));
			}
			(operator, value) => {
				let symbol = operator.symbol().ok_or_else(|| {
					DatabaseError::UnsupportedQuery(format!("operator {operator} on '{}'", field.name))
				})?;
				if operator != Operator::Eq && operator != Operator::Ne && field.semantic_type.is_aggregate() {
					return Err(DatabaseError::UnsupportedQuery(format!(
						"ordering comparison on aggregate field '{}'",
						field.name
					)));
				}
				let placeholder = self.bind(out, first_param, codec.encode_param(value, &field.semantic_type)?);
				out.sql.push_str(&format!("{column} {symbol} {placeholder}"));
			}
		}
		Ok(())
	}

	fn field(&self, name: &str) -> DatabaseResult<&'a FieldSpec> {
		self.schema.field(name).ok_or_else(|| {
			DatabaseError::UnsupportedQuery(format!(
				"'{name}' is not a field of table '{}'",
				self.schema.table_name
			))
		})
	}

	fn column(&self, name: &str) -> String {
		let quoted = self.dialect.quote_identifier(name);
		match &self.qualifier {
			Some(table) => format!("{table}.{quoted}"),
			None => quoted,
		}
	}

	fn bind(&self, out: &mut SqlFragment, first_param: usize, param: SqlParam) -> String {
		out.params.push(param);
		self.dialect.placeholder(first_param + out.params.len() - 1)
	}
}
