//! LazyTable: column-labeled partitioned table with lazy evaluation.
//!
//! Operations build PlannerNode DAGs. Materialization happens on
//! `persist()`, `head()`, `materialize()` or when partition
//! lengths are resolved.

use std::collections::HashSet;
use std::sync::Arc;

use edaframe_query::batch::Partition;
use edaframe_query::execute::{
    compile, materialize_head_sync, materialize_partitions_sync, materialize_sync,
    partition_lengths_sync,
};
use edaframe_query::planner::{CellFn, CellPredicate, PlannerNode};
use edaframe_types::array_dtype::ArrayDType;
use edaframe_types::error::{EdaError, Result};
use edaframe_types::flex_type::FlexTypeEnum;

use crate::lazy_array::{Chunks, LazyArray};
use crate::lazy_column::{known_total, LazyColumn};

/// A partitioned table whose transformations run on demand.
#[derive(Clone)]
pub struct LazyTable {
    plan: Arc<PlannerNode>,
    column_names: Vec<String>,
    column_types: Vec<FlexTypeEnum>,
    /// Rows per partition, `None` where unknown. Its length is the partition
    /// count, which is always known.
    partition_lengths: Vec<Option<usize>>,
    /// Native type of the row index, if the partitions carry one.
    index_type: Option<FlexTypeEnum>,
}

impl LazyTable {
    /// Build a table over in-memory partitions.
    ///
    /// Every partition must have one column per name, and every partition
    /// must agree with the first on column types and index type. Column
    /// types are `Float` when there is no partition.
    pub fn from_partitions(column_names: Vec<String>, partitions: Vec<Partition>) -> Result<Self> {
        let column_types = match partitions.first() {
            Some(first) => first.dtypes(),
            None => vec![FlexTypeEnum::Float; column_names.len()],
        };
        let index_type = partitions.first().and_then(|p| p.index().map(|ix| ix.dtype()));
        for (i, part) in partitions.iter().enumerate() {
            if part.num_columns() != column_names.len() {
                return Err(EdaError::Format(format!(
                    "Partition {} has {} columns, expected {}",
                    i,
                    part.num_columns(),
                    column_names.len()
                )));
            }
            let dtypes = part.dtypes();
            if let Some(col) = (0..dtypes.len()).find(|&c| dtypes[c] != column_types[c]) {
                return Err(EdaError::Format(format!(
                    "Partition {} column '{}' is {}, expected {}",
                    i, column_names[col], dtypes[col], column_types[col]
                )));
            }
            let part_index = part.index().map(|ix| ix.dtype());
            if part_index != index_type {
                return Err(EdaError::Format(format!(
                    "Partition {} index is {:?}, expected {:?}",
                    i, part_index, index_type
                )));
            }
        }
        let partition_lengths = partitions.iter().map(|p| Some(p.num_rows())).collect();
        Ok(LazyTable {
            plan: PlannerNode::partitioned(partitions),
            column_names,
            column_types,
            partition_lengths,
            index_type,
        })
    }

    /// Column names.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Column types.
    pub fn column_types(&self) -> &[FlexTypeEnum] {
        &self.column_types
    }

    /// Schema as (name, type) pairs.
    pub fn schema(&self) -> Vec<(String, FlexTypeEnum)> {
        self.column_names
            .iter()
            .cloned()
            .zip(self.column_types.iter().copied())
            .collect()
    }

    pub fn num_columns(&self) -> usize {
        self.column_names.len()
    }

    pub fn num_partitions(&self) -> usize {
        self.partition_lengths.len()
    }

    /// Rows per partition as currently known.
    pub fn partition_lengths(&self) -> &[Option<usize>] {
        &self.partition_lengths
    }

    /// Total rows, if every partition length is known.
    pub fn known_num_rows(&self) -> Option<usize> {
        known_total(&self.partition_lengths)
    }

    /// Number of rows, resolving partition lengths if needed.
    pub fn num_rows(&self) -> Result<usize> {
        match self.known_num_rows() {
            Some(n) => Ok(n),
            None => Ok(partition_lengths_sync(&self.plan)?.iter().sum()),
        }
    }

    pub fn index_type(&self) -> Option<FlexTypeEnum> {
        self.index_type
    }

    pub fn plan(&self) -> &Arc<PlannerNode> {
        &self.plan
    }

    /// Access a column by name.
    pub fn column(&self, name: &str) -> Result<LazyColumn> {
        let idx = self.column_index(name)?;
        Ok(self.column_at(idx))
    }

    /// Access a column by position.
    pub fn column_at(&self, index: usize) -> LazyColumn {
        LazyColumn::from_plan(
            self.plan.clone(),
            index,
            self.column_names[index].clone(),
            self.column_types[index],
            self.partition_lengths.clone(),
        )
    }

    /// Select columns by name, in the given order. Unknown or repeated
    /// names are rejected.
    pub fn select(&self, names: &[&str]) -> Result<LazyTable> {
        let mut seen = HashSet::with_capacity(names.len());
        let mut indices = Vec::with_capacity(names.len());
        for &name in names {
            if !seen.insert(name) {
                return Err(EdaError::Format(format!("Column '{}' selected more than once", name)));
            }
            indices.push(self.column_index(name)?);
        }
        Ok(self.select_indices(&indices))
    }

    /// Select columns by position. Indices must be in range.
    pub(crate) fn select_indices(&self, indices: &[usize]) -> LazyTable {
        LazyTable {
            plan: PlannerNode::project(self.plan.clone(), indices.to_vec()),
            column_names: indices.iter().map(|&i| self.column_names[i].clone()).collect(),
            column_types: indices.iter().map(|&i| self.column_types[i]).collect(),
            partition_lengths: self.partition_lengths.clone(),
            index_type: self.index_type,
        }
    }

    /// Filter rows by a predicate on a named column. Partition lengths
    /// become unknown.
    pub fn filter(&self, column_name: &str, pred: CellPredicate) -> Result<LazyTable> {
        let idx = self.column_index(column_name)?;
        Ok(LazyTable {
            plan: PlannerNode::filter(self.plan.clone(), idx, pred),
            column_names: self.column_names.clone(),
            column_types: self.column_types.clone(),
            partition_lengths: vec![None; self.partition_lengths.len()],
            index_type: self.index_type,
        })
    }

    /// Same table under new column names.
    pub fn rename_columns(&self, names: Vec<String>) -> Result<LazyTable> {
        if names.len() != self.column_names.len() {
            return Err(EdaError::Format(format!(
                "Got {} names for {} columns",
                names.len(),
                self.column_names.len()
            )));
        }
        Ok(LazyTable {
            column_names: names,
            ..self.clone()
        })
    }

    /// Rewrite one column in place.
    pub fn map_column(&self, index: usize, func: CellFn, output_type: FlexTypeEnum) -> LazyTable {
        let mut column_types = self.column_types.clone();
        column_types[index] = output_type;
        LazyTable {
            plan: PlannerNode::replace(self.plan.clone(), index, func, output_type),
            column_types,
            ..self.clone()
        }
    }

    /// Replace the row index with its string form.
    pub fn index_to_string(&self) -> LazyTable {
        LazyTable {
            plan: PlannerNode::index_to_string(self.plan.clone()),
            index_type: self.index_type.map(|_| FlexTypeEnum::String),
            ..self.clone()
        }
    }

    /// Evaluate the plan now and keep the partitions in memory.
    ///
    /// Length metadata is carried over as it was: unknown lengths stay
    /// unknown even though the data is now at hand.
    pub fn persist(&self) -> Result<LazyTable> {
        let partitions = materialize_partitions_sync(compile(&self.plan)?)?;
        Ok(LazyTable {
            plan: PlannerNode::partitioned(partitions),
            ..self.clone()
        })
    }

    /// Same table with every partition length resolved.
    pub fn with_resolved_lengths(&self) -> Result<LazyTable> {
        if known_total(&self.partition_lengths).is_some() {
            return Ok(self.clone());
        }
        let lengths = partition_lengths_sync(&self.plan)?;
        Ok(LazyTable {
            partition_lengths: lengths.into_iter().map(Some).collect(),
            ..self.clone()
        })
    }

    /// The first n rows, materialized as a single-partition table.
    ///
    /// Only pulls enough partitions from the stream to fill n rows.
    pub fn head(&self, n: usize) -> Result<LazyTable> {
        let batch = materialize_head_sync(compile(&self.plan)?, n)?;
        let batch = if batch.num_columns() == self.num_columns() {
            batch
        } else {
            Partition::empty(&self.column_types)
        };
        let rows = batch.num_rows();
        Ok(LazyTable {
            plan: PlannerNode::partitioned(vec![batch]),
            column_names: self.column_names.clone(),
            column_types: self.column_types.clone(),
            partition_lengths: vec![Some(rows)],
            index_type: self.index_type,
        })
    }

    /// Materialize the whole table into one partition.
    pub fn materialize(&self) -> Result<Partition> {
        let batch = materialize_sync(compile(&self.plan)?)?;
        if batch.num_columns() != self.num_columns() {
            return Ok(Partition::empty(&self.column_types));
        }
        Ok(batch)
    }

    /// Dense array view of the table.
    ///
    /// The element dtype is the common promoted dtype of the columns. With
    /// `resolve_lengths` every chunk length is resolved; otherwise all chunk
    /// lengths are left unknown.
    pub fn to_array(&self, resolve_lengths: bool) -> Result<LazyArray> {
        let dtype = ArrayDType::common(self.column_types.iter().copied()).unwrap_or_default();
        let rows = if resolve_lengths {
            self.with_resolved_lengths()?.partition_lengths
        } else {
            vec![None; self.num_partitions()]
        };
        Ok(LazyArray::new(
            self.plan.clone(),
            Chunks::new(rows, self.num_columns()),
            dtype,
        ))
    }

    /// Boolean array marking missing cells. Chunk lengths are left unknown.
    pub fn to_nullity_array(&self) -> LazyArray {
        LazyArray::new(
            PlannerNode::is_null(self.plan.clone()),
            Chunks::new(vec![None; self.num_partitions()], self.num_columns()),
            ArrayDType::Bool,
        )
    }

    fn column_index(&self, name: &str) -> Result<usize> {
        self.column_names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| EdaError::Format(format!("Column '{}' not found", name)))
    }
}

impl std::fmt::Debug for LazyTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyTable")
            .field("schema", &self.schema())
            .field("partition_lengths", &self.partition_lengths)
            .field("index_type", &self.index_type)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use edaframe_types::flex_type::FlexType;

    use super::*;

    fn sample_table() -> LazyTable {
        let dtypes = [FlexTypeEnum::Integer, FlexTypeEnum::String];
        let rows = |range: std::ops::Range<i64>| -> Vec<Vec<FlexType>> {
            range
                .map(|i| vec![FlexType::Integer(i), FlexType::from(format!("s{}", i))])
                .collect()
        };
        LazyTable::from_partitions(
            vec!["id".to_string(), "name".to_string()],
            vec![
                Partition::from_rows(&rows(0..3), &dtypes).unwrap(),
                Partition::from_rows(&rows(3..5), &dtypes).unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_schema_and_lengths() {
        let t = sample_table();
        assert_eq!(t.column_types(), &[FlexTypeEnum::Integer, FlexTypeEnum::String]);
        assert_eq!(t.partition_lengths(), &[Some(3), Some(2)]);
        assert_eq!(t.num_rows().unwrap(), 5);
        assert_eq!(t.index_type(), None);
    }

    #[test]
    fn test_partitions_must_agree_on_types() {
        let ints = Partition::from_rows(&[vec![FlexType::Integer(1)]], &[FlexTypeEnum::Integer]).unwrap();
        let floats = Partition::from_rows(&[vec![FlexType::Float(2.5)]], &[FlexTypeEnum::Float]).unwrap();
        match LazyTable::from_partitions(vec!["x".to_string()], vec![ints.clone(), floats]) {
            Err(EdaError::Format(msg)) => {
                assert!(msg.contains("Partition 1"));
                assert!(msg.contains("'x'"));
            }
            other => panic!("expected a format error, got {:?}", other),
        }

        let indexed = ints
            .clone()
            .with_index(edaframe_query::batch::ColumnData::Integer(vec![Some(0)]))
            .unwrap();
        assert!(matches!(
            LazyTable::from_partitions(vec!["x".to_string()], vec![indexed, ints]),
            Err(EdaError::Format(_))
        ));
    }

    #[test]
    fn test_select_rejects_unknown_and_duplicate() {
        let t = sample_table();
        let narrowed = t.select(&["name"]).unwrap();
        assert_eq!(narrowed.column_names(), &["name".to_string()]);
        assert_eq!(narrowed.materialize().unwrap().row(4), vec![FlexType::from("s4")]);

        assert!(matches!(t.select(&["missing"]), Err(EdaError::Format(_))));
        assert!(matches!(t.select(&["id", "id"]), Err(EdaError::Format(_))));
    }

    #[test]
    fn test_filter_makes_lengths_unknown() {
        let t = sample_table()
            .filter("id", Arc::new(|v| matches!(v, FlexType::Integer(i) if *i >= 2)))
            .unwrap();
        assert_eq!(t.partition_lengths(), &[None, None]);
        assert_eq!(t.known_num_rows(), None);

        let persisted = t.persist().unwrap();
        assert_eq!(persisted.partition_lengths(), &[None, None]);

        let resolved = persisted.with_resolved_lengths().unwrap();
        assert_eq!(resolved.partition_lengths(), &[Some(1), Some(2)]);
    }

    #[test]
    fn test_map_column_updates_type() {
        let t = sample_table().map_column(0, Arc::new(|v| v.to_flex_string()), FlexTypeEnum::String);
        assert_eq!(t.column_types()[0], FlexTypeEnum::String);
        assert_eq!(t.column_at(0).head(1).unwrap(), vec![FlexType::from("0")]);
    }

    #[test]
    fn test_head_spans_partitions() {
        let head = sample_table().head(4).unwrap();
        assert_eq!(head.num_partitions(), 1);
        assert_eq!(head.partition_lengths(), &[Some(4)]);
        assert_eq!(head.materialize().unwrap().row(3)[0], FlexType::Integer(3));
    }

    #[test]
    fn test_to_array_chunks() {
        let t = sample_table();
        let lazy = t.to_array(false).unwrap();
        assert_eq!(lazy.shape(), (None, 2));
        assert_eq!(lazy.dtype(), ArrayDType::Object);

        let eager = t.select(&["id"]).unwrap().to_array(true).unwrap();
        assert_eq!(eager.chunks().rows(), &[Some(3), Some(2)]);
        assert_eq!(eager.dtype(), ArrayDType::Int64);
    }
}
