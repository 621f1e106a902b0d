//! Relational table creation and migration
//!
//! The live column set is compared with the declared fields by name.
//! Missing columns are added (nullable) before anything is removed. Postgres
//! drops removed columns in place; SQLite rebuilds the table through a shadow
//! copy whose final rename replaces the original. All statements of one
//! migration run in a single transaction.

use crate::database::codec::{SqlDialect, SqlParam, SqlType, SqlValue};
use crate::database::error::{DatabaseError, DatabaseResult};
use crate::database::storage::SqlStorage;
use crate::database::types::{FieldSpec, TableSchema};
use tracing::{info, warn};

const SHADOW_SUFFIX: &str = "__migration_shadow";

/// A live column as reported by the database catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
	pub name: String,
	pub is_primary_key: bool,
}

/// Steps that bring a live table in line with its declared fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPlan {
	pub table: String,
	pub added: Vec<String>,
	pub removed: Vec<String>,
	pub statements: Vec<String>,
}

impl MigrationPlan {
	pub fn is_empty(&self) -> bool {
		self.statements.is_empty()
	}

	pub fn is_destructive(&self) -> bool {
		!self.removed.is_empty()
	}
}

/// What reconciling a table did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaChange {
	Created,
	Migrated(MigrationPlan),
	Unchanged,
}

pub struct SchemaManager<'a> {
	dialect: SqlDialect,
	schema: &'a TableSchema,
}

impl<'a> SchemaManager<'a> {
	pub fn new(dialect: SqlDialect, schema: &'a TableSchema) -> Self {
		Self { dialect, schema }
	}

	fn quote(&self, ident: &str) -> String {
		self.dialect.quote_identifier(ident)
	}

	fn table(&self) -> &str {
		&self.schema.table_name
	}

	fn primary_key(&self) -> DatabaseResult<&'a FieldSpec> {
		self.schema
			.primary_key()
			.ok_or_else(|| DatabaseError::schema(&self.schema.table_name, "no primary key field declared"))
	}

	/// Name of the temporary table an SQLite rebuild copies into
	pub fn shadow_table_name(&self) -> String {
		format!("{}{SHADOW_SUFFIX}", self.table())
	}

	fn column_definition(&self, field: &FieldSpec) -> DatabaseResult<String> {
		let column_type = self.dialect.column_type(&field.semantic_type)?;
		let mut definition = format!("{} {column_type}", self.quote(&field.name));
		if field.is_primary_key {
			definition.push_str(" NOT NULL PRIMARY KEY");
		}
		Ok(definition)
	}

	fn create_table_named(&self, name: &str) -> DatabaseResult<String> {
		let columns = self
			.schema
			.fields
			.iter()
			.map(|field| self.column_definition(field))
			.collect::<DatabaseResult<Vec<_>>>()?;
		Ok(format!(
			"CREATE TABLE IF NOT EXISTS {} ({})",
			self.quote(name),
			columns.join(", ")
		))
	}

	/// `CREATE TABLE IF NOT EXISTS` with one column per declared field
	pub fn create_table_sql(&self) -> DatabaseResult<String> {
		self.primary_key()?;
		self.create_table_named(self.table())
	}

	pub fn drop_table_sql(&self) -> String {
		format!("DROP TABLE IF EXISTS {}", self.quote(self.table()))
	}

	/// Catalog query listing `(name, is primary key)` for the table, in
	/// column order, with the table name as its only parameter
	pub fn columns_sql(&self) -> &'static str {
		match self.dialect {
			SqlDialect::Sqlite => "SELECT name, pk FROM pragma_table_info(?1) ORDER BY cid",
			SqlDialect::Postgres => {
				"SELECT c.column_name::text AS name, \
				 EXISTS (SELECT 1 FROM information_schema.table_constraints tc \
				 JOIN information_schema.key_column_usage k \
				 ON tc.constraint_name = k.constraint_name AND tc.table_schema = k.table_schema \
				 WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema = c.table_schema \
				 AND tc.table_name = c.table_name AND k.column_name = c.column_name) AS pk \
				 FROM information_schema.columns c \
				 WHERE c.table_schema = current_schema() AND c.table_name = $1 \
				 ORDER BY c.ordinal_position"
			}
		}
	}

	/// Read the live columns; empty when the table does not exist
	pub async fn live_columns<S: SqlStorage + ?Sized>(&self, storage: &mut S) -> DatabaseResult<Vec<ColumnInfo>> {
		let param = SqlParam::typed(SqlValue::Text(self.table().to_string()), SqlType::Text);
		let rows = storage.fetch_all(self.columns_sql(), &[param]).await?;
		rows.into_iter()
			.map(|row| {
				let mut cells = row.into_iter().map(|(_, cell)| cell);
				let name = match cells.next() {
					Some(SqlValue::Text(name)) => name,
					other => {
						return Err(DatabaseError::schema(
							self.table(),
							format!("unexpected catalog column name {other:?}"),
						));
					}
				};
				let is_primary_key = match cells.next() {
					Some(SqlValue::Integer(pk)) => pk > 0,
					Some(SqlValue::Bool(pk)) => pk,
					_ => false,
				};
				Ok(ColumnInfo { name, is_primary_key })
			})
			.collect()
	}

	/// Plan the statements that turn `current` into the declared columns.
	/// The primary key column is never added, removed or changed.
	pub fn plan(&self, current: &[ColumnInfo]) -> DatabaseResult<MigrationPlan> {
		let table = self.table();
		let pk = self.primary_key()?;

		if let Some(live_pk) = current.iter().find(|c| c.is_primary_key && c.name != pk.name) {
			return Err(DatabaseError::schema(
				table,
				format!(
					"live primary key '{}' differs from declared primary key '{}'",
					live_pk.name, pk.name
				),
			));
		}
		if !current.iter().any(|c| c.name == pk.name) {
			return Err(DatabaseError::schema(
				table,
				format!("primary key column '{}' is missing from the live table", pk.name),
			));
		}

		let added: Vec<&FieldSpec> = self
			.schema
			.fields
			.iter()
			.filter(|f| !current.iter().any(|c| c.name == f.name))
			.collect();
		let removed: Vec<&ColumnInfo> = current
			.iter()
			.filter(|c| self.schema.field(&c.name).is_none())
			.collect();

		let mut statements = Vec::new();
		for field in &added {
			statements.push(format!(
				"ALTER TABLE {} ADD COLUMN {}",
				self.quote(table),
				self.column_definition(field)?
			));
		}

		if !removed.is_empty() {
			match self.dialect {
				SqlDialect::Postgres => {
					for column in &removed {
						statements.push(format!(
							"ALTER TABLE {} DROP COLUMN {}",
							self.quote(table),
							self.quote(&column.name)
						));
					}
				}
				SqlDialect::Sqlite => statements.extend(self.rebuild_statements(current)?),
			}
		}

		Ok(MigrationPlan {
			table: table.to_string(),
			added: added.iter().map(|f| f.name.clone()).collect(),
			removed: removed.iter().map(|c| c.name.clone()).collect(),
			statements,
		})
	}

	/// SQLite has no usable column drop: copy the surviving columns into a
	/// fresh table and swap it in with a final rename
	fn rebuild_statements(&self, current: &[ColumnInfo]) -> DatabaseResult<Vec<String>> {
		let shadow = self.shadow_table_name();
		let kept: Vec<String> = self
			.schema
			.fields
			.iter()
			.filter(|f| current.iter().any(|c| c.name == f.name))
			.map(|f| self.quote(&f.name))
			.collect();
		let kept = kept.join(", ");
		Ok(vec![
			format!("DROP TABLE IF EXISTS {}", self.quote(&shadow)),
			self.create_table_named(&shadow)?,
			format!(
				"INSERT INTO {} ({kept}) SELECT {kept} FROM {}",
				self.quote(&shadow),
				self.quote(self.table())
			),
			format!("DROP TABLE {}", self.quote(self.table())),
			format!(
				"ALTER TABLE {} RENAME TO {}",
				self.quote(&shadow),
				self.quote(self.table())
			),
		])
	}

	/// Create the table when absent, otherwise migrate it to the declared
	/// fields. Failures leave the live table as it was.
	pub async fn reconcile<S: SqlStorage + ?Sized>(&self, storage: &mut S) -> DatabaseResult<SchemaChange> {
		let table = self.table();
		let current = self.live_columns(storage).await?;
		if current.is_empty() {
			let create = self.create_table_sql()?;
			storage
				.execute(&create, &[])
				.await
				.map_err(|e| e.into_schema_error(table))?;
			info!("Created {} table {table}", self.dialect);
			return Ok(SchemaChange::Created);
		}

		let plan = self.plan(&current)?;
		if plan.is_empty() {
			return Ok(SchemaChange::Unchanged);
		}
		for column in &plan.added {
			info!("Adding column {column} to {table}");
		}
		for column in &plan.removed {
			warn!("Removing column {column} from {table}");
		}
		storage
			.execute_batch(&plan.statements)
			.await
			.map_err(|e| e.into_schema_error(table))?;
		info!(
			"Migrated {table}: {} added, {} removed",
			plan.added.len(),
			plan.removed.len()
		);
		Ok(SchemaChange::Migrated(plan))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::database::types::SemanticType;

	fn users() -> TableSchema {
		TableSchema::new("users")
			.with_field(FieldSpec::primary("id", SemanticType::String))
			.with_field(FieldSpec::new("name", SemanticType::String))
			.with_field(FieldSpec::new("age", SemanticType::Int))
	}

	fn columns(names: &[&str]) -> Vec<ColumnInfo> {
		names
			.iter()
			.map(|name| ColumnInfo {
				name: name.to_string(),
				is_primary_key: *name == "id",
			})
			.collect()
	}

	#[test]
	fn test_create_table_sql() {
		let schema = users().with_field(FieldSpec::new("tags", SemanticType::set(SemanticType::String)));
		assert_eq!(
			SchemaManager::new(SqlDialect::Sqlite, &schema).create_table_sql().unwrap(),
			r#"CREATE TABLE IF NOT EXISTS "users" ("id" TEXT NOT NULL PRIMARY KEY, "name" TEXT, "age" INTEGER, "tags" TEXT)"#
		);
		assert_eq!(
			SchemaManager::new(SqlDialect::Postgres, &schema).create_table_sql().unwrap(),
			r#"CREATE TABLE IF NOT EXISTS "users" ("id" TEXT NOT NULL PRIMARY KEY, "name" TEXT, "age" BIGINT, "tags" JSONB)"#
		);
	}

	#[test]
	fn test_unchanged_table_needs_nothing() {
		let schema = users();
		let plan = SchemaManager::new(SqlDialect::Sqlite, &schema)
			.plan(&columns(&["id", "name", "age"]))
			.unwrap();
		assert!(plan.is_empty());
	}

	#[test]
	fn test_additive_plan() {
		let schema = users();
		let plan = SchemaManager::new(SqlDialect::Postgres, &schema)
			.plan(&columns(&["id", "name"]))
			.unwrap();
		assert_eq!(plan.added, vec!["age"]);
		assert!(!plan.is_destructive());
		assert_eq!(plan.statements, vec![r#"ALTER TABLE "users" ADD COLUMN "age" BIGINT"#]);
	}

	#[test]
	fn test_postgres_drops_columns_after_adding() {
		let schema = users();
		let plan = SchemaManager::new(SqlDialect::Postgres, &schema)
			.plan(&columns(&["id", "legacy", "name"]))
			.unwrap();
		assert_eq!(
			plan.statements,
			vec![
				r#"ALTER TABLE "users" ADD COLUMN "age" BIGINT"#,
				r#"ALTER TABLE "users" DROP COLUMN "legacy""#,
			]
		);
	}

	#[test]
	fn test_sqlite_rebuild_ends_with_rename() {
		let schema = users();
		let plan = SchemaManager::new(SqlDialect::Sqlite, &schema)
			.plan(&columns(&["id", "name", "legacy"]))
			.unwrap();
		assert_eq!(plan.removed, vec!["legacy"]);
		assert_eq!(
			plan.statements,
			vec![
				r#"ALTER TABLE "users" ADD COLUMN "age" INTEGER"#.to_string(),
				r#"DROP TABLE IF EXISTS "users__migration_shadow""#.to_string(),
				r#"CREATE TABLE IF NOT EXISTS "users__migration_shadow" ("id" TEXT NOT NULL PRIMARY KEY, "name" TEXT, "age" INTEGER)"#.to_string(),
				r#"INSERT INTO "users__migration_shadow" ("id", "name") SELECT "id", "name" FROM "users""#.to_string(),
				r#"DROP TABLE "users""#.to_string(),
				r#"ALTER TABLE "users__migration_shadow" RENAME TO "users""#.to_string(),
			]
		);
	}

	#[test]
	fn test_primary_key_is_never_changed() {
		let schema = users();
		let manager = SchemaManager::new(SqlDialect::Sqlite, &schema);
		let other_pk = vec![
			ColumnInfo {
				name: "email".into(),
				is_primary_key: true,
			},
			ColumnInfo {
				name: "id".into(),
				is_primary_key: false,
			},
		];
		assert!(matches!(manager.plan(&other_pk), Err(DatabaseError::Schema { .. })));
		assert!(matches!(manager.plan(&columns(&["name"])), Err(DatabaseError::Schema { .. })));
	}
}
