//! edaframe: a caching, dtype-aware frame over a lazy partitioned table.
//!
//! [`EdaFrame`] keeps a [`LazyTable`], its dense [`LazyArray`] view and a
//! boolean nullity view in positional lock-step, and caches per-column
//! semantic types, missing counts and string coercions.

pub mod dtype_resolver;
pub mod eda_frame;
pub mod input;
pub mod lazy_array;
pub mod lazy_column;
pub mod lazy_table;
pub mod naming;

pub use dtype_resolver::{DtypeClassifier, HeuristicClassifier};
pub use eda_frame::{ColumnSelector, ComputeMode, EdaFrame, FrameOptions};
pub use input::{DataFrame, FrameInput, Series};
pub use lazy_array::{Chunks, LazyArray};
pub use lazy_column::LazyColumn;
pub use lazy_table::LazyTable;

pub use edaframe_types::array_dtype::ArrayDType;
pub use edaframe_types::error::{EdaError, Result};
pub use edaframe_types::flex_type::{FlexType, FlexTypeEnum};
pub use edaframe_types::semantic::{DTypeHint, SemanticType};
