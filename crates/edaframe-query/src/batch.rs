//! Partition representation for the query engine.
//!
//! A `Partition` is one chunk of a partitioned table: typed column vectors
//! plus an optional row index that travels with the rows.

use std::mem::size_of;
use std::sync::Arc;

use edaframe_types::error::{EdaError, Result};
use edaframe_types::flex_type::{FlexDateTime, FlexType, FlexTypeEnum};

/// A chunk of rows stored in columnar format with typed vectors.
#[derive(Debug, Clone)]
pub struct Partition {
    columns: Vec<ColumnData>,
    index: Option<ColumnData>,
    num_rows: usize,
}

/// Typed column vector. `None` represents UNDEFINED/NULL.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Integer(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    String(Vec<Option<Arc<str>>>),
    Vector(Vec<Option<Arc<[f64]>>>),
    List(Vec<Option<Arc<[FlexType]>>>),
    Dict(Vec<Option<Arc<[(FlexType, FlexType)]>>>),
    DateTime(Vec<Option<FlexDateTime>>),
}

impl ColumnData {
    /// Create an empty column of the given type. Undefined columns are
    /// stored as all-null floats.
    pub fn empty(dtype: FlexTypeEnum) -> Self {
        match dtype {
            FlexTypeEnum::Integer => ColumnData::Integer(Vec::new()),
            FlexTypeEnum::Float => ColumnData::Float(Vec::new()),
            FlexTypeEnum::String => ColumnData::String(Vec::new()),
            FlexTypeEnum::Vector => ColumnData::Vector(Vec::new()),
            FlexTypeEnum::List => ColumnData::List(Vec::new()),
            FlexTypeEnum::Dict => ColumnData::Dict(Vec::new()),
            FlexTypeEnum::DateTime => ColumnData::DateTime(Vec::new()),
            FlexTypeEnum::Undefined => ColumnData::Float(Vec::new()),
        }
    }

    /// Build a column from values, inferring the type from the non-missing
    /// values. Integers mixed with floats give a float column; an
    /// all-missing column becomes a float column. Any other mix gives a
    /// string column holding the string form of each present value, with
    /// missing values (NaN included) kept missing.
    pub fn from_values(values: &[FlexType]) -> Result<Self> {
        let mut dtype = FlexTypeEnum::Undefined;
        for v in values.iter().filter(|v| !matches!(v, FlexType::Undefined)) {
            dtype = match (dtype, v.type_enum()) {
                (FlexTypeEnum::Undefined, t) => t,
                (current, t) if current == t => current,
                (FlexTypeEnum::Integer, FlexTypeEnum::Float)
                | (FlexTypeEnum::Float, FlexTypeEnum::Integer) => FlexTypeEnum::Float,
                _ => return ColumnData::from_mixed(values),
            };
        }
        let mut col = ColumnData::empty(dtype);
        for v in values {
            col.push(v)?;
        }
        Ok(col)
    }

    fn from_mixed(values: &[FlexType]) -> Result<Self> {
        let mut col = ColumnData::String(Vec::with_capacity(values.len()));
        for v in values {
            col.push(&v.to_string_unless_missing())?;
        }
        Ok(col)
    }

    /// Number of elements in this column.
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Integer(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::String(v) => v.len(),
            ColumnData::Vector(v) => v.len(),
            ColumnData::List(v) => v.len(),
            ColumnData::Dict(v) => v.len(),
            ColumnData::DateTime(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The type of this column.
    pub fn dtype(&self) -> FlexTypeEnum {
        match self {
            ColumnData::Integer(_) => FlexTypeEnum::Integer,
            ColumnData::Float(_) => FlexTypeEnum::Float,
            ColumnData::String(_) => FlexTypeEnum::String,
            ColumnData::Vector(_) => FlexTypeEnum::Vector,
            ColumnData::List(_) => FlexTypeEnum::List,
            ColumnData::Dict(_) => FlexTypeEnum::Dict,
            ColumnData::DateTime(_) => FlexTypeEnum::DateTime,
        }
    }

    /// Push a FlexType value into this column.
    ///
    /// Integers are accepted by float columns; a NaN float is stored as
    /// a present NaN, not as null.
    pub fn push(&mut self, value: &FlexType) -> Result<()> {
        match (self, value) {
            (ColumnData::Integer(v), FlexType::Integer(i)) => v.push(Some(*i)),
            (ColumnData::Integer(v), FlexType::Undefined) => v.push(None),
            (ColumnData::Float(v), FlexType::Float(f)) => v.push(Some(*f)),
            (ColumnData::Float(v), FlexType::Integer(i)) => v.push(Some(*i as f64)),
            (ColumnData::Float(v), FlexType::Undefined) => v.push(None),
            (ColumnData::String(v), FlexType::String(s)) => v.push(Some(s.clone())),
            (ColumnData::String(v), FlexType::Undefined) => v.push(None),
            (ColumnData::Vector(v), FlexType::Vector(vec)) => v.push(Some(vec.clone())),
            (ColumnData::Vector(v), FlexType::Undefined) => v.push(None),
            (ColumnData::List(v), FlexType::List(l)) => v.push(Some(l.clone())),
            (ColumnData::List(v), FlexType::Undefined) => v.push(None),
            (ColumnData::Dict(v), FlexType::Dict(d)) => v.push(Some(d.clone())),
            (ColumnData::Dict(v), FlexType::Undefined) => v.push(None),
            (ColumnData::DateTime(v), FlexType::DateTime(dt)) => v.push(Some(dt.clone())),
            (ColumnData::DateTime(v), FlexType::Undefined) => v.push(None),
            (col, val) => {
                return Err(EdaError::Type(format!(
                    "Cannot push {} into {} column",
                    val.type_enum(),
                    col.dtype()
                )));
            }
        }
        Ok(())
    }

    /// Get a value at the given index as a FlexType.
    pub fn get(&self, index: usize) -> FlexType {
        match self {
            ColumnData::Integer(v) => v[index].map_or(FlexType::Undefined, FlexType::Integer),
            ColumnData::Float(v) => v[index].map_or(FlexType::Undefined, FlexType::Float),
            ColumnData::String(v) => match &v[index] {
                Some(s) => FlexType::String(s.clone()),
                None => FlexType::Undefined,
            },
            ColumnData::Vector(v) => match &v[index] {
                Some(vec) => FlexType::Vector(vec.clone()),
                None => FlexType::Undefined,
            },
            ColumnData::List(v) => match &v[index] {
                Some(l) => FlexType::List(l.clone()),
                None => FlexType::Undefined,
            },
            ColumnData::Dict(v) => match &v[index] {
                Some(d) => FlexType::Dict(d.clone()),
                None => FlexType::Undefined,
            },
            ColumnData::DateTime(v) => match &v[index] {
                Some(dt) => FlexType::DateTime(dt.clone()),
                None => FlexType::Undefined,
            },
        }
    }

    /// Whether the value at `index` is missing. Container cells are never
    /// missing, whatever they hold.
    pub fn is_missing(&self, index: usize) -> bool {
        match self {
            ColumnData::Integer(v) => v[index].is_none(),
            ColumnData::Float(v) => v[index].map_or(true, f64::is_nan),
            ColumnData::String(v) => v[index].is_none(),
            ColumnData::Vector(v) => v[index].is_none(),
            ColumnData::List(v) => v[index].is_none(),
            ColumnData::Dict(v) => v[index].is_none(),
            ColumnData::DateTime(v) => v[index].is_none(),
        }
    }

    /// Number of missing values.
    pub fn missing_count(&self) -> usize {
        (0..self.len()).filter(|&i| self.is_missing(i)).count()
    }

    /// Apply `func` to every value, collecting into a column of `output_type`.
    pub fn map(
        &self,
        func: &dyn Fn(&FlexType) -> FlexType,
        output_type: FlexTypeEnum,
    ) -> Result<ColumnData> {
        let mut out = ColumnData::empty(output_type);
        for i in 0..self.len() {
            out.push(&func(&self.get(i)))?;
        }
        Ok(out)
    }

    /// Gather values at the given positions.
    pub fn take(&self, indices: &[usize]) -> Result<ColumnData> {
        let mut out = ColumnData::empty(self.dtype());
        for &idx in indices {
            if idx >= self.len() {
                return Err(EdaError::Format(format!(
                    "Row index {} out of range ({})",
                    idx,
                    self.len()
                )));
            }
            out.push(&self.get(idx))?;
        }
        Ok(out)
    }

    /// Extend this column with values from another column of the same type.
    pub fn extend(&mut self, other: &ColumnData) -> Result<()> {
        match (self, other) {
            (ColumnData::Integer(a), ColumnData::Integer(b)) => a.extend_from_slice(b),
            (ColumnData::Float(a), ColumnData::Float(b)) => a.extend_from_slice(b),
            (ColumnData::String(a), ColumnData::String(b)) => a.extend_from_slice(b),
            (ColumnData::Vector(a), ColumnData::Vector(b)) => a.extend_from_slice(b),
            (ColumnData::List(a), ColumnData::List(b)) => a.extend_from_slice(b),
            (ColumnData::Dict(a), ColumnData::Dict(b)) => a.extend_from_slice(b),
            (ColumnData::DateTime(a), ColumnData::DateTime(b)) => a.extend_from_slice(b),
            (a, b) => {
                return Err(EdaError::Type(format!(
                    "Cannot extend {} column with {} column",
                    a.dtype(),
                    b.dtype()
                )));
            }
        }
        Ok(())
    }

    /// Slice of rows `[start, end)`.
    pub fn slice(&self, start: usize, end: usize) -> ColumnData {
        match self {
            ColumnData::Integer(v) => ColumnData::Integer(v[start..end].to_vec()),
            ColumnData::Float(v) => ColumnData::Float(v[start..end].to_vec()),
            ColumnData::String(v) => ColumnData::String(v[start..end].to_vec()),
            ColumnData::Vector(v) => ColumnData::Vector(v[start..end].to_vec()),
            ColumnData::List(v) => ColumnData::List(v[start..end].to_vec()),
            ColumnData::Dict(v) => ColumnData::Dict(v[start..end].to_vec()),
            ColumnData::DateTime(v) => ColumnData::DateTime(v[start..end].to_vec()),
        }
    }

    /// Deep memory estimate: fixed slot width plus heap payloads.
    pub fn estimated_bytes(&self) -> usize {
        match self {
            ColumnData::Integer(v) => v.len() * size_of::<Option<i64>>(),
            ColumnData::Float(v) => v.len() * size_of::<Option<f64>>(),
            ColumnData::String(v) => {
                v.len() * size_of::<Option<Arc<str>>>()
                    + v.iter().flatten().map(|s| s.len()).sum::<usize>()
            }
            ColumnData::Vector(v) => {
                v.len() * size_of::<Option<Arc<[f64]>>>()
                    + v.iter().flatten().map(|x| x.len() * size_of::<f64>()).sum::<usize>()
            }
            ColumnData::List(v) => {
                v.len() * size_of::<Option<Arc<[FlexType]>>>()
                    + v.iter().flatten().map(|l| l.iter().map(cell_bytes).sum::<usize>()).sum::<usize>()
            }
            ColumnData::Dict(v) => {
                v.len() * size_of::<Option<Arc<[(FlexType, FlexType)]>>>()
                    + v
                        .iter()
                        .flatten()
                        .map(|d| d.iter().map(|(k, x)| cell_bytes(k) + cell_bytes(x)).sum::<usize>())
                        .sum::<usize>()
            }
            ColumnData::DateTime(v) => v.len() * size_of::<Option<FlexDateTime>>(),
        }
    }
}

fn cell_bytes(value: &FlexType) -> usize {
    size_of::<FlexType>()
        + match value {
            FlexType::String(s) => s.len(),
            FlexType::Vector(v) => v.len() * size_of::<f64>(),
            FlexType::List(l) => l.iter().map(cell_bytes).sum(),
            FlexType::Dict(d) => d.iter().map(|(k, v)| cell_bytes(k) + cell_bytes(v)).sum(),
            _ => 0,
        }
}

impl Partition {
    /// Create a new partition from typed columns. All columns must have the same length.
    pub fn new(columns: Vec<ColumnData>) -> Result<Self> {
        let num_rows = columns.first().map_or(0, ColumnData::len);
        check_lengths(&columns, num_rows)?;
        Ok(Partition {
            columns,
            index: None,
            num_rows,
        })
    }

    /// Create a partition with a fixed row count. Needed for zero-column
    /// partitions, whose row count cannot be read off a column.
    pub fn with_num_rows(columns: Vec<ColumnData>, num_rows: usize) -> Result<Self> {
        check_lengths(&columns, num_rows)?;
        Ok(Partition {
            columns,
            index: None,
            num_rows,
        })
    }

    /// Attach a row index. It must have one entry per row.
    pub fn with_index(mut self, index: ColumnData) -> Result<Self> {
        if index.len() != self.num_rows {
            return Err(EdaError::Format(format!(
                "Index has {} rows, expected {}",
                index.len(),
                self.num_rows
            )));
        }
        self.index = Some(index);
        Ok(self)
    }

    /// Create an empty partition with the given schema.
    pub fn empty(dtypes: &[FlexTypeEnum]) -> Self {
        let columns = dtypes.iter().map(|&dt| ColumnData::empty(dt)).collect();
        Partition {
            columns,
            index: None,
            num_rows: 0,
        }
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Number of columns.
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Column types.
    pub fn dtypes(&self) -> Vec<FlexTypeEnum> {
        self.columns.iter().map(|c| c.dtype()).collect()
    }

    /// Access a column by index.
    pub fn column(&self, index: usize) -> &ColumnData {
        &self.columns[index]
    }

    /// Access all columns.
    pub fn columns(&self) -> &[ColumnData] {
        &self.columns
    }

    /// The row index, if one is attached.
    pub fn index(&self) -> Option<&ColumnData> {
        self.index.as_ref()
    }

    /// Get a single row as a Vec<FlexType>.
    pub fn row(&self, index: usize) -> Vec<FlexType> {
        self.columns.iter().map(|col| col.get(index)).collect()
    }

    /// Convert from a Vec of FlexType rows (row-major) to columnar format.
    pub fn from_rows(rows: &[Vec<FlexType>], dtypes: &[FlexTypeEnum]) -> Result<Self> {
        let num_columns = dtypes.len();
        let mut columns: Vec<ColumnData> = dtypes.iter().map(|&dt| ColumnData::empty(dt)).collect();

        for (row_idx, row) in rows.iter().enumerate() {
            if row.len() != num_columns {
                return Err(EdaError::Format(format!(
                    "Row {} has {} values, expected {}",
                    row_idx,
                    row.len(),
                    num_columns
                )));
            }
            for (col_idx, val) in row.iter().enumerate() {
                columns[col_idx].push(val)?;
            }
        }

        Partition::with_num_rows(columns, rows.len())
    }

    /// Convert to row-major Vec<FlexType> format.
    pub fn to_rows(&self) -> Vec<Vec<FlexType>> {
        (0..self.num_rows).map(|i| self.row(i)).collect()
    }

    /// Convert to column-major Vec<FlexType> format.
    pub fn to_column_vecs(&self) -> Vec<Vec<FlexType>> {
        self.columns
            .iter()
            .map(|col| (0..self.num_rows).map(|i| col.get(i)).collect())
            .collect()
    }

    /// Select specific columns by index. The row index is kept.
    pub fn select_columns(&self, indices: &[usize]) -> Result<Self> {
        let mut columns = Vec::with_capacity(indices.len());
        for &idx in indices {
            if idx >= self.columns.len() {
                return Err(EdaError::Format(format!(
                    "Column index {} out of range ({})",
                    idx,
                    self.columns.len()
                )));
            }
            columns.push(self.columns[idx].clone());
        }
        Ok(Partition {
            columns,
            index: self.index.clone(),
            num_rows: self.num_rows,
        })
    }

    /// Filter rows by a predicate on a specific column.
    pub fn filter_by_column(
        &self,
        column: usize,
        pred: &dyn Fn(&FlexType) -> bool,
    ) -> Result<Self> {
        if column >= self.columns.len() {
            return Err(EdaError::Format(format!(
                "Column index {} out of range ({})",
                column,
                self.columns.len()
            )));
        }

        let keep_indices: Vec<usize> = (0..self.num_rows)
            .filter(|&i| pred(&self.columns[column].get(i)))
            .collect();

        self.take(&keep_indices)
    }

    /// Select rows by indices (gather operation).
    pub fn take(&self, indices: &[usize]) -> Result<Self> {
        let columns = self
            .columns
            .iter()
            .map(|col| col.take(indices))
            .collect::<Result<Vec<_>>>()?;
        let index = self.index.as_ref().map(|ix| ix.take(indices)).transpose()?;
        Ok(Partition {
            columns,
            index,
            num_rows: indices.len(),
        })
    }

    /// Rows `[start, end)` as a new partition.
    pub fn slice_rows(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.num_rows);
        let start = start.min(end);
        Partition {
            columns: self.columns.iter().map(|c| c.slice(start, end)).collect(),
            index: self.index.as_ref().map(|ix| ix.slice(start, end)),
            num_rows: end - start,
        }
    }

    /// Append another partition (vertically). Columns must have matching types.
    /// The index survives only when both sides carry one.
    pub fn append(&mut self, other: &Partition) -> Result<()> {
        if self.columns.len() != other.columns.len() {
            return Err(EdaError::Format(format!(
                "Column count mismatch: {} vs {}",
                self.columns.len(),
                other.columns.len()
            )));
        }
        for (i, (a, b)) in self.columns.iter_mut().zip(other.columns.iter()).enumerate() {
            if a.dtype() != b.dtype() {
                return Err(EdaError::Type(format!(
                    "Column {} type mismatch: {} vs {}",
                    i,
                    a.dtype(),
                    b.dtype()
                )));
            }
            a.extend(b)?;
        }
        self.index = match (self.index.take(), &other.index) {
            (Some(mut a), Some(b)) => {
                a.extend(b)?;
                Some(a)
            }
            _ => None,
        };
        self.num_rows += other.num_rows;
        Ok(())
    }

    /// Replace one column with a new column of the same length.
    pub fn replace_column(&self, column: usize, data: ColumnData) -> Result<Self> {
        if column >= self.columns.len() {
            return Err(EdaError::Format(format!(
                "Column index {} out of range ({})",
                column,
                self.columns.len()
            )));
        }
        if data.len() != self.num_rows {
            return Err(EdaError::Format(format!(
                "Replacement column has {} rows, expected {}",
                data.len(),
                self.num_rows
            )));
        }
        let mut columns = self.columns.clone();
        columns[column] = data;
        Ok(Partition {
            columns,
            index: self.index.clone(),
            num_rows: self.num_rows,
        })
    }

    /// Element-wise missing indicator: an integer 0/1 column per input column.
    pub fn is_null(&self) -> Partition {
        let columns = self
            .columns
            .iter()
            .map(|col| {
                ColumnData::Integer((0..col.len()).map(|i| Some(col.is_missing(i) as i64)).collect())
            })
            .collect();
        Partition {
            columns,
            index: self.index.clone(),
            num_rows: self.num_rows,
        }
    }

    /// Replace the row index with its string form.
    pub fn index_to_string(&self) -> Result<Partition> {
        let index = match &self.index {
            Some(ix) => Some(ix.map(&|v| v.to_flex_string(), FlexTypeEnum::String)?),
            None => None,
        };
        Ok(Partition {
            columns: self.columns.clone(),
            index,
            num_rows: self.num_rows,
        })
    }

    /// Deep memory estimate of the data and index.
    pub fn estimated_bytes(&self) -> usize {
        self.columns.iter().map(ColumnData::estimated_bytes).sum::<usize>()
            + self.index.as_ref().map_or(0, ColumnData::estimated_bytes)
    }
}

fn check_lengths(columns: &[ColumnData], num_rows: usize) -> Result<()> {
    for (i, col) in columns.iter().enumerate() {
        if col.len() != num_rows {
            return Err(EdaError::Format(format!(
                "Column {} has {} rows, expected {}",
                i,
                col.len(),
                num_rows
            )));
        }
    }
    Ok(())
}
