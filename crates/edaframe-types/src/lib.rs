//! Shared value types for edaframe: cells, native and array dtypes,
//! semantic column types and the error type.

pub mod array_dtype;
pub mod error;
pub mod flex_type;
pub mod semantic;
