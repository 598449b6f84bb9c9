//! Plan rewrites applied before execution.
//!
//! Available optimization passes:
//! - **Project fusion**: Merge adjacent Project nodes
//! - **Identity elimination**: Remove no-op Project nodes
//! - **Row-count pruning**: Drop row-preserving operators when only
//!   partition lengths are wanted

use std::sync::Arc;

use crate::planner::{LogicalOp, PlannerNode};

/// Apply all optimization passes to a plan.
pub fn optimize(plan: &Arc<PlannerNode>) -> Arc<PlannerNode> {
    let plan = fuse_projects(plan);
    eliminate_identity_projects(&plan)
}

/// Fuse adjacent Project nodes: `Project(b) → Project(a) → input`
/// becomes `Project(a[b[i]]) → input`.
pub fn fuse_projects(plan: &Arc<PlannerNode>) -> Arc<PlannerNode> {
    let new_inputs: Vec<Arc<PlannerNode>> = plan.inputs.iter().map(fuse_projects).collect();
    let plan = rebuild_with_inputs(plan, new_inputs);

    if let LogicalOp::Project { column_indices: outer_indices } = &plan.op {
        if let [input] = plan.inputs.as_slice() {
            if let LogicalOp::Project { column_indices: inner_indices } = &input.op {
                // Out-of-range outer indices are left for the executor to report.
                if outer_indices.iter().all(|&i| i < inner_indices.len()) {
                    let composed: Vec<usize> = outer_indices.iter().map(|&i| inner_indices[i]).collect();
                    return Arc::new(PlannerNode {
                        op: LogicalOp::Project { column_indices: composed },
                        inputs: input.inputs.clone(),
                    });
                }
            }
        }
    }

    plan
}

/// Eliminate identity Project nodes (those that select all columns in order).
pub fn eliminate_identity_projects(plan: &Arc<PlannerNode>) -> Arc<PlannerNode> {
    let new_inputs: Vec<Arc<PlannerNode>> = plan.inputs.iter().map(eliminate_identity_projects).collect();
    let plan = rebuild_with_inputs(plan, new_inputs);

    if let LogicalOp::Project { column_indices } = &plan.op {
        if let [input] = plan.inputs.as_slice() {
            let is_identity = column_indices.iter().enumerate().all(|(i, &c)| c == i);
            if is_identity && input.num_columns() == Some(column_indices.len()) {
                return input.clone();
            }
        }
    }

    plan
}

/// Plan producing the same partition lengths as `plan` with as little work
/// as possible: the chain of row-preserving operators above the first
/// filter or source is dropped. Operators below a filter are kept since the
/// filter's column index refers to their output.
pub fn row_count_plan(plan: &Arc<PlannerNode>) -> Arc<PlannerNode> {
    let mut node = plan;
    while node.preserves_rows() {
        match node.inputs.first() {
            Some(input) => node = input,
            None => break,
        }
    }
    node.clone()
}

/// Rebuild a PlannerNode with new inputs (preserving the same operation).
fn rebuild_with_inputs(plan: &Arc<PlannerNode>, new_inputs: Vec<Arc<PlannerNode>>) -> Arc<PlannerNode> {
    // If inputs haven't changed (same Arc pointers), reuse the plan
    if plan.inputs.len() == new_inputs.len()
        && plan.inputs.iter().zip(new_inputs.iter()).all(|(a, b)| Arc::ptr_eq(a, b))
    {
        return plan.clone();
    }

    Arc::new(PlannerNode {
        op: clone_op(&plan.op),
        inputs: new_inputs,
    })
}

/// Clone a LogicalOp (needed because it contains Arc closures, not plain Clone).
fn clone_op(op: &LogicalOp) -> LogicalOp {
    match op {
        LogicalOp::PartitionedSource { partitions } => LogicalOp::PartitionedSource { partitions: partitions.clone() },
        LogicalOp::Project { column_indices } => LogicalOp::Project { column_indices: column_indices.clone() },
        LogicalOp::Filter { column, predicate } => LogicalOp::Filter { column: *column, predicate: predicate.clone() },
        LogicalOp::Replace { column, func, output_type } => {
            LogicalOp::Replace { column: *column, func: func.clone(), output_type: *output_type }
        }
        LogicalOp::IsNull => LogicalOp::IsNull,
        LogicalOp::IndexToString => LogicalOp::IndexToString,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Partition;
    use edaframe_types::flex_type::{FlexType, FlexTypeEnum};

    fn source() -> Arc<PlannerNode> {
        let rows = vec![vec![FlexType::Integer(1), FlexType::Float(1.0), FlexType::from("a")]];
        let dtypes = [FlexTypeEnum::Integer, FlexTypeEnum::Float, FlexTypeEnum::String];
        PlannerNode::partitioned(vec![Partition::from_rows(&rows, &dtypes).unwrap()])
    }

    #[test]
    fn test_fuse_adjacent_projects() {
        // Source(3 cols) → Project([0,2]) → Project([1])
        // Should fuse to: Source(3 cols) → Project([2])
        let proj1 = PlannerNode::project(source(), vec![0, 2]);
        let proj2 = PlannerNode::project(proj1, vec![1]);

        let optimized = optimize(&proj2);

        if let LogicalOp::Project { column_indices } = &optimized.op {
            assert_eq!(column_indices, &[2]);
        } else {
            panic!("Expected Project at the root");
        }
        assert!(matches!(optimized.inputs[0].op, LogicalOp::PartitionedSource { .. }));
    }

    #[test]
    fn test_eliminate_identity_project() {
        let src = source();
        let proj = PlannerNode::project(src.clone(), vec![0, 1, 2]);

        let optimized = optimize(&proj);
        assert!(Arc::ptr_eq(&optimized, &src));
    }

    #[test]
    fn test_non_identity_project_kept() {
        let proj = PlannerNode::project(source(), vec![0, 2]);
        let optimized = optimize(&proj);
        assert!(matches!(optimized.op, LogicalOp::Project { .. }));
    }

    #[test]
    fn test_no_change_for_simple_source() {
        let src = source();
        let optimized = optimize(&src);
        assert!(Arc::ptr_eq(&src, &optimized));
    }

    #[test]
    fn test_row_count_plan_stops_at_filter() {
        let filtered = PlannerNode::filter(
            PlannerNode::project(source(), vec![1]),
            0,
            Arc::new(|_| true),
        );
        let plan = PlannerNode::is_null(PlannerNode::project(filtered.clone(), vec![0]));

        let pruned = row_count_plan(&plan);
        assert!(Arc::ptr_eq(&pruned, &filtered));
    }

    #[test]
    fn test_row_count_plan_reaches_source() {
        let src = source();
        let plan = PlannerNode::index_to_string(PlannerNode::is_null(src.clone()));
        assert!(Arc::ptr_eq(&row_count_plan(&plan), &src));
    }
}
