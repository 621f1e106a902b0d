//! Uniform record storage over DynamoDB, Postgres and SQLite

pub mod database;

pub use database::{
	open_adapter, Adapter, Backend, BackendConfig, Condition, ConditionBuilder, ConditionNode, DatabaseConfig,
	DatabaseError, DatabaseResult, ErrorKind, FieldSpec, JoinSpec, JoinType, Operator, PageResult, QueryRequest, Record,
	SemanticType, TableSchema, Value,
};
