//! Logical query planner.
//!
//! DAG of PlannerNodes representing table operations. Nodes are Arc-shared
//! so the same subexpression can back several tables, columns and arrays.
//! Every operator keeps partition boundaries: one output batch per input
//! partition.

use std::sync::Arc;

use edaframe_types::flex_type::{FlexType, FlexTypeEnum};

use crate::batch::Partition;

pub type CellFn = Arc<dyn Fn(&FlexType) -> FlexType + Send + Sync>;
pub type CellPredicate = Arc<dyn Fn(&FlexType) -> bool + Send + Sync>;

/// A node in the logical query plan DAG.
pub struct PlannerNode {
    pub op: LogicalOp,
    pub inputs: Vec<Arc<PlannerNode>>,
}

/// Logical operations in the query plan.
pub enum LogicalOp {
    /// In-memory partitions, emitted one batch per partition.
    PartitionedSource {
        partitions: Arc<Vec<Partition>>,
    },

    /// Select specific columns by index.
    Project {
        column_indices: Vec<usize>,
    },

    /// Filter rows using a predicate on a specific column. Partitions that
    /// end up empty are still emitted.
    Filter {
        column: usize,
        predicate: CellPredicate,
    },

    /// Apply a function to one column, replacing it in place.
    Replace {
        column: usize,
        func: CellFn,
        output_type: FlexTypeEnum,
    },

    /// Element-wise missing indicator (0/1 integers) of every column.
    IsNull,

    /// Convert the row index to its string form.
    IndexToString,
}

impl PlannerNode {
    /// Create a source node from in-memory partitions.
    pub fn partitioned(partitions: Vec<Partition>) -> Arc<Self> {
        Arc::new(PlannerNode {
            op: LogicalOp::PartitionedSource {
                partitions: Arc::new(partitions),
            },
            inputs: vec![],
        })
    }

    /// Project specific columns from the input.
    pub fn project(input: Arc<PlannerNode>, column_indices: Vec<usize>) -> Arc<Self> {
        Arc::new(PlannerNode {
            op: LogicalOp::Project { column_indices },
            inputs: vec![input],
        })
    }

    /// Filter rows from the input.
    pub fn filter(input: Arc<PlannerNode>, column: usize, predicate: CellPredicate) -> Arc<Self> {
        Arc::new(PlannerNode {
            op: LogicalOp::Filter { column, predicate },
            inputs: vec![input],
        })
    }

    /// Rewrite a column in place.
    pub fn replace(
        input: Arc<PlannerNode>,
        column: usize,
        func: CellFn,
        output_type: FlexTypeEnum,
    ) -> Arc<Self> {
        Arc::new(PlannerNode {
            op: LogicalOp::Replace {
                column,
                func,
                output_type,
            },
            inputs: vec![input],
        })
    }

    /// Missing-value indicator of every column.
    pub fn is_null(input: Arc<PlannerNode>) -> Arc<Self> {
        Arc::new(PlannerNode {
            op: LogicalOp::IsNull,
            inputs: vec![input],
        })
    }

    /// Stringify the row index.
    pub fn index_to_string(input: Arc<PlannerNode>) -> Arc<Self> {
        Arc::new(PlannerNode {
            op: LogicalOp::IndexToString,
            inputs: vec![input],
        })
    }

    /// Whether this operator maps each input row to exactly one output row.
    pub fn preserves_rows(&self) -> bool {
        !matches!(
            self.op,
            LogicalOp::Filter { .. } | LogicalOp::PartitionedSource { .. }
        )
    }

    /// Number of partitions the plan produces.
    pub fn num_partitions(&self) -> usize {
        match &self.op {
            LogicalOp::PartitionedSource { partitions } => partitions.len(),
            _ => self.inputs.first().map_or(0, |i| i.num_partitions()),
        }
    }

    /// Number of output columns.
    pub fn num_columns(&self) -> Option<usize> {
        match &self.op {
            LogicalOp::PartitionedSource { partitions } => partitions.first().map(Partition::num_columns),
            LogicalOp::Project { column_indices } => Some(column_indices.len()),
            LogicalOp::Filter { .. }
            | LogicalOp::Replace { .. }
            | LogicalOp::IsNull
            | LogicalOp::IndexToString => self.inputs.first().and_then(|i| i.num_columns()),
        }
    }
}
