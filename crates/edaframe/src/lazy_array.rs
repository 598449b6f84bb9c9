//! LazyArray: dense 2-D array view over a lazy partitioned plan.
//!
//! Each partition of the plan is one row-chunk of the array; all columns
//! live in a single column-chunk. Chunk row counts may be unknown until
//! resolved. Materialization produces an `ndarray::Array2`.

use std::sync::Arc;

use ndarray::Array2;
use tracing::debug;

use edaframe_query::batch::Partition;
use edaframe_query::execute::{compile, materialize_partitions_sync, partition_lengths_sync};
use edaframe_query::planner::PlannerNode;
use edaframe_types::array_dtype::ArrayDType;
use edaframe_types::error::{EdaError, Result};
use edaframe_types::flex_type::FlexType;

use crate::lazy_column::known_total;

/// Chunk layout of a lazy array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunks {
    rows: Vec<Option<usize>>,
    cols: usize,
}

impl Chunks {
    pub fn new(rows: Vec<Option<usize>>, cols: usize) -> Self {
        Chunks { rows, cols }
    }

    /// Row count of every row-chunk, `None` where unknown.
    pub fn rows(&self) -> &[Option<usize>] {
        &self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn num_row_chunks(&self) -> usize {
        self.rows.len()
    }

    /// Total rows, if every chunk length is known.
    pub fn num_rows(&self) -> Option<usize> {
        known_total(&self.rows)
    }

    /// True when no chunk length is unknown.
    pub fn is_resolved(&self) -> bool {
        self.rows.iter().all(Option::is_some)
    }
}

/// A lazily evaluated dense array.
#[derive(Clone)]
pub struct LazyArray {
    plan: Arc<PlannerNode>,
    chunks: Chunks,
    dtype: ArrayDType,
}

impl LazyArray {
    pub(crate) fn new(plan: Arc<PlannerNode>, chunks: Chunks, dtype: ArrayDType) -> Self {
        LazyArray { plan, chunks, dtype }
    }

    /// `(rows, cols)`; rows is `None` while any chunk length is unknown.
    pub fn shape(&self) -> (Option<usize>, usize) {
        (self.chunks.num_rows(), self.chunks.cols)
    }

    pub fn chunks(&self) -> &Chunks {
        &self.chunks
    }

    pub fn dtype(&self) -> ArrayDType {
        self.dtype
    }

    pub fn plan(&self) -> &Arc<PlannerNode> {
        &self.plan
    }

    /// Keep the given columns, in the given order. Chunk rows are unchanged.
    pub fn select_columns(&self, indices: &[usize]) -> Result<LazyArray> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.chunks.cols) {
            return Err(EdaError::Format(format!(
                "Column index {} out of range ({})",
                bad, self.chunks.cols
            )));
        }
        Ok(LazyArray {
            plan: PlannerNode::project(self.plan.clone(), indices.to_vec()),
            chunks: Chunks::new(self.chunks.rows.clone(), indices.len()),
            dtype: self.dtype,
        })
    }

    /// Same data with a different element dtype. The cast is applied when
    /// the array is materialized.
    pub fn astype(&self, dtype: ArrayDType) -> LazyArray {
        LazyArray {
            plan: self.plan.clone(),
            chunks: self.chunks.clone(),
            dtype,
        }
    }

    /// Adopt the chunk layout of `reference`. Both arrays must describe the
    /// same rows partitioned the same way; nothing is evaluated.
    pub fn align_chunking(&mut self, reference: &LazyArray) -> Result<()> {
        if reference.chunks.num_row_chunks() != self.chunks.num_row_chunks()
            || reference.chunks.cols != self.chunks.cols
        {
            return Err(EdaError::Format(format!(
                "Cannot align {} x {} chunks to {} x {} chunks",
                self.chunks.num_row_chunks(),
                self.chunks.cols,
                reference.chunks.num_row_chunks(),
                reference.chunks.cols
            )));
        }
        self.chunks = reference.chunks.clone();
        Ok(())
    }

    /// Resolve every chunk length. Row-preserving work above the source is
    /// skipped, so element values are not computed.
    pub fn with_resolved_lengths(&self) -> Result<LazyArray> {
        if self.chunks.is_resolved() {
            return Ok(self.clone());
        }
        let lengths = partition_lengths_sync(&self.plan)?;
        debug!(chunks = lengths.len(), "resolved array chunk lengths");
        Ok(LazyArray {
            plan: self.plan.clone(),
            chunks: Chunks::new(lengths.into_iter().map(Some).collect(), self.chunks.cols),
            dtype: self.dtype,
        })
    }

    /// Evaluate the array now and keep it in memory. Chunk lengths are read
    /// off the materialized partitions.
    pub fn persist(&self) -> Result<LazyArray> {
        let partitions = materialize_partitions_sync(compile(&self.plan)?)?;
        let rows = partitions.iter().map(|p| Some(p.num_rows())).collect();
        Ok(LazyArray {
            plan: PlannerNode::partitioned(partitions),
            chunks: Chunks::new(rows, self.chunks.cols),
            dtype: self.dtype,
        })
    }

    /// Materialize into a dense array, casting every cell to the element
    /// dtype. Missing cells stay `Undefined`.
    pub fn to_ndarray(&self) -> Result<Array2<FlexType>> {
        let dtype = self.dtype;
        self.collect_cells(|cell| cast_cell(cell, dtype))
    }

    /// Materialize as booleans: non-zero numbers and present non-numeric
    /// cells are true, missing cells false.
    pub fn to_bool_ndarray(&self) -> Result<Array2<bool>> {
        self.collect_cells(|cell| match cell {
            FlexType::Integer(i) => i != 0,
            FlexType::Float(f) => !f.is_nan() && f != 0.0,
            FlexType::Undefined => false,
            _ => true,
        })
    }

    fn collect_cells<T, F>(&self, convert: F) -> Result<Array2<T>>
    where
        F: Fn(FlexType) -> T,
    {
        let partitions = materialize_partitions_sync(compile(&self.plan)?)?;
        let cols = self.chunks.cols;
        let rows: usize = partitions.iter().map(Partition::num_rows).sum();

        let mut cells = Vec::with_capacity(rows * cols);
        for part in &partitions {
            if part.num_columns() != cols {
                return Err(EdaError::Format(format!(
                    "Partition has {} columns, expected {}",
                    part.num_columns(),
                    cols
                )));
            }
            for row in 0..part.num_rows() {
                for col in part.columns() {
                    cells.push(convert(col.get(row)));
                }
            }
        }

        Array2::from_shape_vec((rows, cols), cells)
            .map_err(|e| EdaError::Format(format!("Cannot shape array: {}", e)))
    }
}

impl std::fmt::Debug for LazyArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyArray")
            .field("chunks", &self.chunks)
            .field("dtype", &self.dtype)
            .finish()
    }
}

fn cast_cell(cell: FlexType, dtype: ArrayDType) -> FlexType {
    match (dtype, cell) {
        (ArrayDType::Bool, FlexType::Integer(i)) => FlexType::Integer((i != 0) as i64),
        (ArrayDType::Bool, FlexType::Float(f)) if !f.is_nan() => FlexType::Integer((f != 0.0) as i64),
        (ArrayDType::Int64, FlexType::Float(f)) if f.is_nan() => FlexType::Undefined,
        (ArrayDType::Int64, FlexType::Float(f)) => FlexType::Integer(f as i64),
        (ArrayDType::Float64, FlexType::Integer(i)) => FlexType::Float(i as f64),
        (_, other) => other,
    }
}

#[cfg(test)]
mod tests {
    use edaframe_types::flex_type::FlexTypeEnum;
    use ndarray::array;

    use super::*;

    fn int_float_plan() -> Arc<PlannerNode> {
        let dtypes = [FlexTypeEnum::Integer, FlexTypeEnum::Float];
        let first = vec![
            vec![FlexType::Integer(1), FlexType::Float(0.5)],
            vec![FlexType::Integer(2), FlexType::Undefined],
        ];
        let second = vec![vec![FlexType::Integer(3), FlexType::Float(2.5)]];
        PlannerNode::partitioned(vec![
            Partition::from_rows(&first, &dtypes).unwrap(),
            Partition::from_rows(&second, &dtypes).unwrap(),
        ])
    }

    fn unresolved() -> LazyArray {
        LazyArray::new(int_float_plan(), Chunks::new(vec![None, None], 2), ArrayDType::Float64)
    }

    #[test]
    fn test_shape_unknown_until_resolved() {
        let arr = unresolved();
        assert_eq!(arr.shape(), (None, 2));
        let resolved = arr.with_resolved_lengths().unwrap();
        assert_eq!(resolved.chunks().rows(), &[Some(2), Some(1)]);
        assert_eq!(resolved.shape(), (Some(3), 2));
    }

    #[test]
    fn test_to_ndarray_casts_to_float() {
        let values = unresolved().to_ndarray().unwrap();
        assert_eq!(
            values,
            array![
                [FlexType::Float(1.0), FlexType::Float(0.5)],
                [FlexType::Float(2.0), FlexType::Undefined],
                [FlexType::Float(3.0), FlexType::Float(2.5)],
            ]
        );
    }

    #[test]
    fn test_select_and_astype() {
        let ints = unresolved().select_columns(&[0]).unwrap().astype(ArrayDType::Int64);
        assert_eq!(ints.shape(), (None, 1));
        assert_eq!(
            ints.to_ndarray().unwrap(),
            array![[FlexType::Integer(1)], [FlexType::Integer(2)], [FlexType::Integer(3)]]
        );
        assert!(unresolved().select_columns(&[2]).is_err());
    }

    #[test]
    fn test_align_chunking() {
        let mut arr = unresolved();
        let reference = arr.with_resolved_lengths().unwrap();
        arr.align_chunking(&reference).unwrap();
        assert_eq!(arr.chunks(), reference.chunks());

        let narrow = reference.select_columns(&[0]).unwrap();
        assert!(arr.align_chunking(&narrow).is_err());
    }

    #[test]
    fn test_persist_reads_chunk_lengths() {
        let persisted = unresolved().persist().unwrap();
        assert_eq!(persisted.chunks(), &Chunks::new(vec![Some(2), Some(1)], 2));
        assert_eq!(persisted.to_ndarray().unwrap(), unresolved().to_ndarray().unwrap());
    }

    #[test]
    fn test_bool_view() {
        let nulls = LazyArray::new(
            PlannerNode::is_null(int_float_plan()),
            Chunks::new(vec![None, None], 2),
            ArrayDType::Bool,
        );
        assert_eq!(
            nulls.to_bool_ndarray().unwrap(),
            array![[false, false], [false, true], [false, false]]
        );
    }
}
