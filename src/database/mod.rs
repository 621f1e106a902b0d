//! Database adapters for key-value and relational backends
//!
//! One [`Adapter`] contract covers DynamoDB, Postgres and SQLite. Records are
//! described by a [`TableSchema`] of semantically typed fields; each backend
//! has a codec that maps those types onto its native cells, a compiler that
//! turns [`ConditionNode`] trees into native predicates, and (for the
//! relational engines) a [`SchemaManager`] that keeps the live table in line
//! with the declared fields.

pub mod adapter;
pub mod codec;
pub mod condition;
pub mod config;
pub mod error;
pub mod schema;
pub mod storage;
pub mod types;
pub mod value;

pub use adapter::{
	open_adapter, Adapter, JoinSpec, JoinType, KeyValueAdapter, PostgresAdapter, QueryRequest, RelationalAdapter,
	SqliteAdapter,
};
pub use codec::{KeyValueCodec, RelationalCodec, SqlDialect, TypeCodec};
pub use condition::{
	parse_condition, Condition, ConditionBuilder, ConditionGroup, ConditionNode, LogicalOperator, Operator,
};
pub use config::{BackendConfig, DatabaseConfig};
pub use error::{DatabaseError, DatabaseResult, ErrorKind};
pub use schema::{MigrationPlan, SchemaChange, SchemaManager};
pub use storage::{DynamoDbClient, KeyValueClient, MemoryKeyValueClient, PostgresStorage, SqlStorage, SqliteStorage};
pub use types::{Backend, EnumVariant, FieldSpec, SecondaryIndex, SemanticType, TableSchema};
pub use value::{PageResult, Record, Value};
