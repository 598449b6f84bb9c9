//! Inputs an EdaFrame can be built from.

use std::any::{type_name, Any};

use edaframe_query::batch::{ColumnData, Partition};
use edaframe_types::error::{EdaError, Result};
use edaframe_types::flex_type::FlexType;

use crate::eda_frame::EdaFrame;
use crate::lazy_table::LazyTable;

/// A fully in-memory table: labeled columns plus an optional row index.
///
/// Labels are arbitrary cells and may repeat; they are normalized when a
/// frame is built.
#[derive(Debug, Clone)]
pub struct DataFrame {
    labels: Vec<FlexType>,
    columns: Vec<ColumnData>,
    index: Option<ColumnData>,
    num_rows: usize,
}

impl DataFrame {
    /// Build from labels and typed columns of equal length.
    pub fn new(labels: Vec<FlexType>, columns: Vec<ColumnData>) -> Result<Self> {
        if labels.len() != columns.len() {
            return Err(EdaError::Format(format!(
                "Got {} labels for {} columns",
                labels.len(),
                columns.len()
            )));
        }
        let num_rows = columns.first().map_or(0, ColumnData::len);
        if let Some((i, col)) = columns.iter().enumerate().find(|(_, c)| c.len() != num_rows) {
            return Err(EdaError::Format(format!(
                "Column {} has {} rows, expected {}",
                i,
                col.len(),
                num_rows
            )));
        }
        Ok(DataFrame {
            labels,
            columns,
            index: None,
            num_rows,
        })
    }

    /// Build from `(label, values)` pairs, inferring each column's type.
    pub fn from_columns<L: Into<FlexType>>(columns: Vec<(L, Vec<FlexType>)>) -> Result<Self> {
        let mut labels = Vec::with_capacity(columns.len());
        let mut data = Vec::with_capacity(columns.len());
        for (label, values) in columns {
            labels.push(label.into());
            data.push(ColumnData::from_values(&values)?);
        }
        DataFrame::new(labels, data)
    }

    /// Attach a row index with one value per row.
    pub fn with_index(mut self, index: Vec<FlexType>) -> Result<Self> {
        if index.len() != self.num_rows {
            return Err(EdaError::Format(format!(
                "Index has {} rows, expected {}",
                index.len(),
                self.num_rows
            )));
        }
        self.index = Some(ColumnData::from_values(&index)?);
        Ok(self)
    }

    pub fn labels(&self) -> &[FlexType] {
        &self.labels
    }

    pub fn columns(&self) -> &[ColumnData] {
        &self.columns
    }

    pub fn index(&self) -> Option<&ColumnData> {
        self.index.as_ref()
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Deep memory estimate of the data and index.
    pub fn estimated_bytes(&self) -> usize {
        self.columns.iter().map(ColumnData::estimated_bytes).sum::<usize>()
            + self.index.as_ref().map_or(0, ColumnData::estimated_bytes)
    }

    /// Split the rows into `n` contiguous partitions of near-equal size;
    /// leading partitions take the remainder rows. `n` is clamped to
    /// `1..=num_rows` (at least 1).
    pub fn into_partitions(self, n: usize) -> Result<Vec<Partition>> {
        let n = n.clamp(1, self.num_rows.max(1));
        let base = self.num_rows / n;
        let extra = self.num_rows % n;

        let mut partitions = Vec::with_capacity(n);
        let mut start = 0;
        for i in 0..n {
            let end = start + base + usize::from(i < extra);
            let columns = self.columns.iter().map(|c| c.slice(start, end)).collect();
            let mut part = Partition::with_num_rows(columns, end - start)?;
            if let Some(ix) = &self.index {
                part = part.with_index(ix.slice(start, end))?;
            }
            partitions.push(part);
            start = end;
        }
        Ok(partitions)
    }
}

/// A single labeled column.
#[derive(Debug, Clone)]
pub struct Series {
    name: FlexType,
    values: ColumnData,
    index: Option<ColumnData>,
}

impl Series {
    pub fn new<L: Into<FlexType>>(name: L, values: Vec<FlexType>) -> Result<Self> {
        Ok(Series {
            name: name.into(),
            values: ColumnData::from_values(&values)?,
            index: None,
        })
    }

    /// Attach a row index with one value per row.
    pub fn with_index(mut self, index: Vec<FlexType>) -> Result<Self> {
        if index.len() != self.values.len() {
            return Err(EdaError::Format(format!(
                "Index has {} rows, expected {}",
                index.len(),
                self.values.len()
            )));
        }
        self.index = Some(ColumnData::from_values(&index)?);
        Ok(self)
    }

    pub fn name(&self) -> &FlexType {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// One-column table holding this series.
    pub fn to_frame(self) -> DataFrame {
        let num_rows = self.values.len();
        DataFrame {
            labels: vec![self.name],
            columns: vec![self.values],
            index: self.index,
            num_rows,
        }
    }
}

/// Everything an [`EdaFrame`] can be constructed from.
pub enum FrameInput {
    /// An already partitioned lazy table, used as-is.
    Lazy(LazyTable),
    /// An in-memory table, partitioned on construction.
    InMemory(DataFrame),
    /// A single column, promoted to a one-column table.
    Column(Series),
    /// Another frame; its state is taken over unchanged.
    Frame(EdaFrame),
}

impl FrameInput {
    /// Accept any value, failing with `UnsupportedInputType` unless it is
    /// one of the supported containers.
    pub fn from_any<T: Any>(value: T) -> Result<Self> {
        let boxed: Box<dyn Any> = Box::new(value);
        let boxed = match boxed.downcast::<FrameInput>() {
            Ok(input) => return Ok(*input),
            Err(other) => other,
        };
        let boxed = match boxed.downcast::<LazyTable>() {
            Ok(table) => return Ok(FrameInput::Lazy(*table)),
            Err(other) => other,
        };
        let boxed = match boxed.downcast::<DataFrame>() {
            Ok(df) => return Ok(FrameInput::InMemory(*df)),
            Err(other) => other,
        };
        let boxed = match boxed.downcast::<Series>() {
            Ok(series) => return Ok(FrameInput::Column(*series)),
            Err(other) => other,
        };
        match boxed.downcast::<EdaFrame>() {
            Ok(frame) => Ok(FrameInput::Frame(*frame)),
            Err(_) => Err(EdaError::UnsupportedInputType(type_name::<T>().to_string())),
        }
    }

    /// Short name of the input kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            FrameInput::Lazy(_) => "lazy",
            FrameInput::InMemory(_) => "in_memory",
            FrameInput::Column(_) => "column",
            FrameInput::Frame(_) => "frame",
        }
    }
}

impl From<LazyTable> for FrameInput {
    fn from(value: LazyTable) -> Self {
        FrameInput::Lazy(value)
    }
}

impl From<DataFrame> for FrameInput {
    fn from(value: DataFrame) -> Self {
        FrameInput::InMemory(value)
    }
}

impl From<Series> for FrameInput {
    fn from(value: Series) -> Self {
        FrameInput::Column(value)
    }
}

impl From<EdaFrame> for FrameInput {
    fn from(value: EdaFrame) -> Self {
        FrameInput::Frame(value)
    }
}
