//! Lazy partitioned query engine: partition batches, a logical plan DAG,
//! plan rewrites and an async executor with synchronous entry points.

pub mod batch;
pub mod execute;
pub mod optimizer;
pub mod planner;
