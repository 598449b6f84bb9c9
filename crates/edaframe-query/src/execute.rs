//! Physical execution engine.
//!
//! Compiles a logical plan DAG into async streams of `Partition` batches.
//! Each operator wraps its input stream and produces exactly one output
//! batch per input batch, so partition boundaries survive every plan.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::stream::{self, Stream, StreamExt};
use tracing::{debug, trace};

use edaframe_types::error::{EdaError, Result};
use edaframe_types::flex_type::{FlexType, FlexTypeEnum};

use crate::batch::Partition;
use crate::optimizer;
use crate::planner::{LogicalOp, PlannerNode};

/// A stream of partitions.
pub type BatchStream = Pin<Box<dyn Stream<Item = Result<Partition>> + Send>>;

/// Compile a logical plan node into a BatchStream.
///
/// Applies optimizer passes before compilation for better execution.
pub fn compile(node: &Arc<PlannerNode>) -> Result<BatchStream> {
    let node = optimizer::optimize(node);
    compile_node(&node)
}

/// Internal compilation without optimization (used recursively).
fn compile_node(node: &Arc<PlannerNode>) -> Result<BatchStream> {
    match &node.op {
        LogicalOp::PartitionedSource { partitions } => {
            let partitions = partitions.clone();
            let count = partitions.len();
            Ok(Box::pin(stream::iter(0..count).map(move |i| Ok(partitions[i].clone()))))
        }

        LogicalOp::Project { column_indices } => {
            let input = compile_input(node)?;
            let indices = column_indices.clone();
            Ok(Box::pin(input.map(move |batch_result| {
                batch_result.and_then(|batch| batch.select_columns(&indices))
            })))
        }

        LogicalOp::Filter { column, predicate } => {
            let input = compile_input(node)?;
            let col = *column;
            let pred = predicate.clone();
            Ok(Box::pin(input.map(move |batch_result| {
                batch_result.and_then(|batch| batch.filter_by_column(col, &*pred))
            })))
        }

        LogicalOp::Replace {
            column,
            func,
            output_type,
        } => {
            let input = compile_input(node)?;
            let col = *column;
            let f = func.clone();
            let out_type = *output_type;
            Ok(Box::pin(input.map(move |batch_result| {
                batch_result.and_then(|batch| apply_replace(&batch, col, &*f, out_type))
            })))
        }

        LogicalOp::IsNull => {
            let input = compile_input(node)?;
            Ok(Box::pin(input.map(|batch_result| batch_result.map(|batch| batch.is_null()))))
        }

        LogicalOp::IndexToString => {
            let input = compile_input(node)?;
            Ok(Box::pin(input.map(|batch_result| {
                batch_result.and_then(|batch| batch.index_to_string())
            })))
        }
    }
}

fn compile_input(node: &PlannerNode) -> Result<BatchStream> {
    let input = node
        .inputs
        .first()
        .ok_or_else(|| EdaError::Engine("operator has no input".to_string()))?;
    compile_node(input)
}

/// Rewrite one column of the batch in place.
fn apply_replace(
    batch: &Partition,
    column: usize,
    func: &dyn Fn(&FlexType) -> FlexType,
    output_type: FlexTypeEnum,
) -> Result<Partition> {
    let new_col = source_column(batch, column)?.map(func, output_type)?;
    batch.replace_column(column, new_col)
}

fn source_column(batch: &Partition, column: usize) -> Result<&crate::batch::ColumnData> {
    if column >= batch.num_columns() {
        return Err(EdaError::Format(format!(
            "Column index {} out of range ({})",
            column,
            batch.num_columns()
        )));
    }
    Ok(batch.column(column))
}

/// Collect every partition of a stream, boundaries preserved.
pub async fn materialize_partitions(mut stream: BatchStream) -> Result<Vec<Partition>> {
    let mut partitions = Vec::new();
    while let Some(batch_result) = stream.next().await {
        let batch = batch_result?;
        trace!(partition = partitions.len(), rows = batch.num_rows(), "materialized partition");
        partitions.push(batch);
    }
    Ok(partitions)
}

/// Helper: materialize a stream into a single Partition.
pub async fn materialize(stream: BatchStream) -> Result<Partition> {
    let mut stream = stream;
    let mut result: Option<Partition> = None;

    while let Some(batch_result) = stream.next().await {
        let batch = batch_result?;
        match &mut result {
            None => result = Some(batch),
            Some(existing) => existing.append(&batch)?,
        }
    }

    Ok(result.unwrap_or_else(|| Partition::empty(&[])))
}

/// Materialize at most `limit` rows from a stream, then stop pulling.
///
/// This enables efficient `head(n)` operations: only enough partitions are
/// consumed to fill the requested row count. Remaining partitions are never
/// evaluated.
pub async fn materialize_head(mut stream: BatchStream, limit: usize) -> Result<Partition> {
    let mut result: Option<Partition> = None;
    let mut remaining = limit;

    while remaining > 0 {
        match stream.next().await {
            None => break,
            Some(Err(e)) => return Err(e),
            Some(Ok(batch)) => {
                let batch = if batch.num_rows() > remaining {
                    batch.slice_rows(0, remaining)
                } else {
                    batch
                };
                remaining -= batch.num_rows();
                match &mut result {
                    None => result = Some(batch),
                    Some(existing) => existing.append(&batch)?,
                }
            }
        }
    }

    Ok(result.unwrap_or_else(|| Partition::empty(&[])))
}

/// Row count of every partition the plan produces.
///
/// Row-preserving operators above the first filter are skipped, and a bare
/// in-memory source answers from its metadata without being streamed.
pub async fn partition_lengths(plan: &Arc<PlannerNode>) -> Result<Vec<usize>> {
    let pruned = optimizer::row_count_plan(plan);
    if let LogicalOp::PartitionedSource { partitions } = &pruned.op {
        return Ok(partitions.iter().map(Partition::num_rows).collect());
    }
    let mut stream = compile(&pruned)?;
    let mut lengths = Vec::with_capacity(pruned.num_partitions());
    while let Some(batch_result) = stream.next().await {
        lengths.push(batch_result?.num_rows());
    }
    Ok(lengths)
}

/// Run a future to completion on a fresh current-thread runtime.
pub fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .map_err(|e| EdaError::Engine(format!("Failed to create tokio runtime: {}", e)))?;
    Ok(rt.block_on(future))
}

/// Synchronous version of [`materialize_partitions`].
pub fn materialize_partitions_sync(stream: BatchStream) -> Result<Vec<Partition>> {
    let partitions = block_on(materialize_partitions(stream))??;
    debug!(partitions = partitions.len(), "materialized plan");
    Ok(partitions)
}

/// Synchronous version of [`materialize`].
pub fn materialize_sync(stream: BatchStream) -> Result<Partition> {
    block_on(materialize(stream))?
}

/// Synchronous version of [`materialize_head`].
pub fn materialize_head_sync(stream: BatchStream, limit: usize) -> Result<Partition> {
    block_on(materialize_head(stream, limit))?
}

/// Synchronous version of [`partition_lengths`].
pub fn partition_lengths_sync(plan: &Arc<PlannerNode>) -> Result<Vec<usize>> {
    let lengths = block_on(partition_lengths(plan))??;
    debug!(partitions = lengths.len(), rows = lengths.iter().sum::<usize>(), "resolved partition lengths");
    Ok(lengths)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn int_partition(values: &[i64]) -> Partition {
        let rows: Vec<Vec<FlexType>> = values.iter().map(|&v| vec![FlexType::Integer(v)]).collect();
        Partition::from_rows(&rows, &[FlexTypeEnum::Integer]).unwrap()
    }

    fn three_partitions() -> Arc<PlannerNode> {
        PlannerNode::partitioned(vec![
            int_partition(&[0, 1, 2, 3]),
            int_partition(&[4, 5, 6]),
            int_partition(&[7, 8, 9]),
        ])
    }

    #[tokio::test]
    async fn test_source_keeps_partitions() {
        let stream = compile(&three_partitions()).unwrap();
        let parts = materialize_partitions(stream).await.unwrap();
        let lengths: Vec<usize> = parts.iter().map(Partition::num_rows).collect();
        assert_eq!(lengths, vec![4, 3, 3]);
    }

    #[tokio::test]
    async fn test_project() {
        let rows = vec![
            vec![FlexType::Integer(1), FlexType::Float(1.5), FlexType::from("a")],
            vec![FlexType::Integer(2), FlexType::Float(2.5), FlexType::from("b")],
        ];
        let dtypes = [FlexTypeEnum::Integer, FlexTypeEnum::Float, FlexTypeEnum::String];
        let source = PlannerNode::partitioned(vec![Partition::from_rows(&rows, &dtypes).unwrap()]);
        let projected = PlannerNode::project(source, vec![0, 2]);

        let result = materialize(compile(&projected).unwrap()).await.unwrap();
        assert_eq!(result.num_columns(), 2);
        assert_eq!(result.row(0), vec![FlexType::Integer(1), FlexType::from("a")]);
    }

    #[tokio::test]
    async fn test_filter_keeps_empty_partitions() {
        let filtered = PlannerNode::filter(
            three_partitions(),
            0,
            Arc::new(|v| matches!(v, FlexType::Integer(i) if *i < 2 || *i > 8)),
        );
        let parts = materialize_partitions(compile(&filtered).unwrap()).await.unwrap();
        let lengths: Vec<usize> = parts.iter().map(Partition::num_rows).collect();
        assert_eq!(lengths, vec![2, 0, 1]);
    }

    #[tokio::test]
    async fn test_replace() {
        let stringified = PlannerNode::replace(
            three_partitions(),
            0,
            Arc::new(|v| v.to_flex_string()),
            FlexTypeEnum::String,
        );
        let result = materialize(compile(&stringified).unwrap()).await.unwrap();
        assert_eq!(result.num_columns(), 1);
        assert_eq!(result.row(3), vec![FlexType::from("3")]);
    }

    #[tokio::test]
    async fn test_is_null() {
        let rows = vec![vec![FlexType::Undefined], vec![FlexType::Float(f64::NAN)], vec![FlexType::Float(1.0)]];
        let source = PlannerNode::partitioned(vec![Partition::from_rows(&rows, &[FlexTypeEnum::Float]).unwrap()]);
        let result = materialize(compile(&PlannerNode::is_null(source)).unwrap()).await.unwrap();
        assert_eq!(
            result.to_column_vecs(),
            vec![vec![FlexType::Integer(1), FlexType::Integer(1), FlexType::Integer(0)]]
        );
    }

    #[tokio::test]
    async fn test_materialize_head_partial() {
        let stream = compile(&three_partitions()).unwrap();
        let result = materialize_head(stream, 6).await.unwrap();

        assert_eq!(result.num_rows(), 6);
        assert_eq!(result.row(5), vec![FlexType::Integer(5)]);
    }

    #[tokio::test]
    async fn test_materialize_head_exceeds_total() {
        let stream = compile(&three_partitions()).unwrap();
        let result = materialize_head(stream, 100).await.unwrap();
        assert_eq!(result.num_rows(), 10);
    }

    #[tokio::test]
    async fn test_materialize_head_zero() {
        let stream = compile(&three_partitions()).unwrap();
        let result = materialize_head(stream, 0).await.unwrap();
        assert_eq!(result.num_rows(), 0);
    }

    #[test]
    fn test_partition_lengths_skip_row_preserving_ops() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let plan = PlannerNode::replace(
            three_partitions(),
            0,
            Arc::new(move |v| {
                counter.fetch_add(1, Ordering::SeqCst);
                v.clone()
            }),
            FlexTypeEnum::Integer,
        );

        let lengths = partition_lengths_sync(&plan).unwrap();
        assert_eq!(lengths, vec![4, 3, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_partition_lengths_through_filter() {
        let plan = PlannerNode::is_null(PlannerNode::filter(
            three_partitions(),
            0,
            Arc::new(|v| matches!(v, FlexType::Integer(i) if i % 2 == 0)),
        ));
        assert_eq!(partition_lengths_sync(&plan).unwrap(), vec![2, 1, 2]);
    }

    #[test]
    fn test_errors_surface() {
        let plan = PlannerNode::project(three_partitions(), vec![3]);
        let err = materialize_sync(compile(&plan).unwrap()).unwrap_err();
        assert!(matches!(err, EdaError::Format(_)));
    }
}
