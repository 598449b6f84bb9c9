//! LazyColumn: one column of a lazy partitioned table.
//!
//! A LazyColumn is a view onto one output column of a planner node. It
//! shares the node with the table it came from, so taking a column is free
//! and nothing runs until the values are read.

use std::sync::Arc;

use edaframe_query::batch::{ColumnData, Partition};
use edaframe_query::execute::{
    compile, materialize_head_sync, materialize_partitions_sync, materialize_sync,
    partition_lengths_sync,
};
use edaframe_query::planner::{CellFn, PlannerNode};
use edaframe_types::error::{EdaError, Result};
use edaframe_types::flex_type::{FlexType, FlexTypeEnum};

/// A lazy single column. Operations build a plan DAG; execution happens on
/// `to_vec()`, `head()`, `len()` (when lengths are unknown) or `persist()`.
#[derive(Clone)]
pub struct LazyColumn {
    /// The planner node producing this column (possibly among others).
    plan: Arc<PlannerNode>,
    /// Column index in the plan's output.
    column_index: usize,
    name: String,
    dtype: FlexTypeEnum,
    /// Rows per partition, `None` where unknown.
    partition_lengths: Vec<Option<usize>>,
}

impl LazyColumn {
    pub(crate) fn from_plan(
        plan: Arc<PlannerNode>,
        column_index: usize,
        name: String,
        dtype: FlexTypeEnum,
        partition_lengths: Vec<Option<usize>>,
    ) -> Self {
        LazyColumn {
            plan,
            column_index,
            name,
            dtype,
            partition_lengths,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The native type of this column.
    pub fn dtype(&self) -> FlexTypeEnum {
        self.dtype
    }

    /// Rows per partition as currently known.
    pub fn partition_lengths(&self) -> &[Option<usize>] {
        &self.partition_lengths
    }

    /// Number of rows. Resolves partition lengths when any is unknown.
    pub fn len(&self) -> Result<usize> {
        if let Some(n) = known_total(&self.partition_lengths) {
            return Ok(n);
        }
        Ok(partition_lengths_sync(&self.plan)?.iter().sum())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Whether both columns read the same output of the same plan node.
    pub fn same_as(&self, other: &LazyColumn) -> bool {
        Arc::ptr_eq(&self.plan, &other.plan) && self.column_index == other.column_index
    }

    /// Materialize and return all values.
    pub fn to_vec(&self) -> Result<Vec<FlexType>> {
        let data = self.materialize_column()?;
        Ok((0..data.len()).map(|i| data.get(i)).collect())
    }

    /// Return the first n values.
    ///
    /// Only pulls enough partitions from the stream to fill n rows.
    pub fn head(&self, n: usize) -> Result<Vec<FlexType>> {
        if n == 0 {
            return Ok(vec![]);
        }
        let stream = compile(&self.plan)?;
        let batch = materialize_head_sync(stream, n)?;
        if batch.num_rows() == 0 {
            return Ok(vec![]);
        }
        let col = self.pick(&batch)?;
        Ok((0..col.len()).map(|i| col.get(i)).collect())
    }

    /// Number of missing values. Container cells count as present.
    pub fn missing_count(&self) -> Result<usize> {
        Ok(self.materialize_column()?.missing_count())
    }

    /// Apply a unary function to every value, producing a new lazy column.
    pub fn apply(&self, func: CellFn, output_type: FlexTypeEnum) -> LazyColumn {
        let narrowed = PlannerNode::project(self.plan.clone(), vec![self.column_index]);
        LazyColumn {
            plan: PlannerNode::replace(narrowed, 0, func, output_type),
            column_index: 0,
            name: self.name.clone(),
            dtype: output_type,
            partition_lengths: self.partition_lengths.clone(),
        }
    }

    /// Evaluate the column now and keep the result in memory, one partition
    /// per source partition. Length metadata is carried over unchanged.
    pub fn persist(&self) -> Result<LazyColumn> {
        let narrowed = PlannerNode::project(self.plan.clone(), vec![self.column_index]);
        let partitions = materialize_partitions_sync(compile(&narrowed)?)?;
        Ok(LazyColumn {
            plan: PlannerNode::partitioned(partitions),
            column_index: 0,
            name: self.name.clone(),
            dtype: self.dtype,
            partition_lengths: self.partition_lengths.clone(),
        })
    }

    /// Access the underlying plan node.
    pub fn plan(&self) -> &Arc<PlannerNode> {
        &self.plan
    }

    /// Column index in the plan output.
    pub fn column_index(&self) -> usize {
        self.column_index
    }

    fn materialize_column(&self) -> Result<ColumnData> {
        let narrowed = PlannerNode::project(self.plan.clone(), vec![self.column_index]);
        let batch = materialize_sync(compile(&narrowed)?)?;
        if batch.num_columns() == 0 {
            return Ok(ColumnData::empty(self.dtype));
        }
        Ok(batch.column(0).clone())
    }

    fn pick<'a>(&self, batch: &'a Partition) -> Result<&'a ColumnData> {
        if self.column_index >= batch.num_columns() {
            return Err(EdaError::Format(format!(
                "Column index {} out of range ({})",
                self.column_index,
                batch.num_columns()
            )));
        }
        Ok(batch.column(self.column_index))
    }
}

impl std::fmt::Debug for LazyColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyColumn")
            .field("name", &self.name)
            .field("dtype", &self.dtype)
            .field("partition_lengths", &self.partition_lengths)
            .finish()
    }
}

/// Sum of the lengths when every one of them is known.
pub(crate) fn known_total(lengths: &[Option<usize>]) -> Option<usize> {
    lengths.iter().copied().sum()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn int_column(values: Vec<Option<i64>>) -> LazyColumn {
        let len = values.len();
        let plan = PlannerNode::partitioned(vec![Partition::new(vec![ColumnData::Integer(values)]).unwrap()]);
        LazyColumn::from_plan(plan, 0, "x".to_string(), FlexTypeEnum::Integer, vec![Some(len)])
    }

    #[test]
    fn test_read_values() {
        let col = int_column(vec![Some(1), None, Some(3)]);
        assert_eq!(col.len().unwrap(), 3);
        assert_eq!(col.head(2).unwrap(), vec![FlexType::Integer(1), FlexType::Undefined]);
        assert_eq!(col.missing_count().unwrap(), 1);
    }

    #[test]
    fn test_apply_is_lazy_until_persist() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let col = int_column(vec![Some(1), Some(2)]);

        let strings = col.apply(
            Arc::new(move |v| {
                counter.fetch_add(1, Ordering::SeqCst);
                v.to_flex_string()
            }),
            FlexTypeEnum::String,
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let persisted = strings.persist().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(persisted.to_vec().unwrap(), vec![FlexType::from("1"), FlexType::from("2")]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(persisted.dtype(), FlexTypeEnum::String);
    }

    #[test]
    fn test_same_as() {
        let col = int_column(vec![Some(1)]);
        let copy = col.clone();
        assert!(col.same_as(&copy));
        assert!(!col.same_as(&col.persist().unwrap()));
    }

    #[test]
    fn test_known_total() {
        assert_eq!(known_total(&[Some(2), Some(3)]), Some(5));
        assert_eq!(known_total(&[Some(2), None]), None);
        assert_eq!(known_total(&[]), Some(0));
    }
}
