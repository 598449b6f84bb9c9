//! EdaFrame: a caching, dtype-aware wrapper over a lazy partitioned table.
//!
//! Construction normalizes the input into a persisted [`LazyTable`],
//! resolves a semantic type per column, derives the dense array view and
//! the boolean nullity view, and counts missing cells once. Everything
//! derived afterwards (string coercions, head sample, shape) is cached on
//! first use and never recomputed. Projection slices every cache instead
//! of recomputing it.

use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use ndarray::Axis;
use tracing::{debug, info, instrument};

use edaframe_config::{get_head_rows, get_partition_bytes, get_sample_rows};
use edaframe_query::execute::partition_lengths_sync;
use edaframe_types::array_dtype::ArrayDType;
use edaframe_types::error::{EdaError, Result};
use edaframe_types::flex_type::{FlexType, FlexTypeEnum};
use edaframe_types::semantic::{DTypeHint, SemanticType};

use crate::dtype_resolver::{resolve_semantic_types, DtypeClassifier, HeuristicClassifier};
use crate::input::{DataFrame, FrameInput, Series};
use crate::lazy_array::LazyArray;
use crate::lazy_column::LazyColumn;
use crate::lazy_table::LazyTable;
use crate::naming::{disambiguate, normalize_column_names};

/// Construction options.
#[derive(Debug, Clone)]
pub struct FrameOptions {
    /// Resolve chunk lengths while deriving the array view, even for
    /// partitioned input.
    pub force_length_resolution: bool,
    /// Split in-memory input into partitions of about `partition_bytes`.
    pub repartition: bool,
    pub dtype_hints: Option<DTypeHint>,
    /// Target partition size; falls back to the process-wide setting.
    pub partition_bytes: Option<usize>,
}

impl Default for FrameOptions {
    fn default() -> Self {
        FrameOptions {
            force_length_resolution: false,
            repartition: true,
            dtype_hints: None,
            partition_bytes: None,
        }
    }
}

/// What [`EdaFrame::compute`] forces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeMode {
    /// Resolve row counts per chunk.
    Lengths,
    /// Materialize the nullity view and take its chunking as the truth.
    Nulls,
}

impl FromStr for ComputeMode {
    type Err = EdaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "lengths" => Ok(ComputeMode::Lengths),
            "nulls" => Ok(ComputeMode::Nulls),
            other => Err(EdaError::UnsupportedComputeMode(other.to_string())),
        }
    }
}

impl std::fmt::Display for ComputeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComputeMode::Lengths => write!(f, "lengths"),
            ComputeMode::Nulls => write!(f, "nulls"),
        }
    }
}

/// One or more column labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSelector(Vec<String>);

impl ColumnSelector {
    pub fn names(&self) -> &[String] {
        &self.0
    }
}

impl From<&str> for ColumnSelector {
    fn from(value: &str) -> Self {
        ColumnSelector(vec![value.to_string()])
    }
}

impl From<String> for ColumnSelector {
    fn from(value: String) -> Self {
        ColumnSelector(vec![value])
    }
}

impl From<&[&str]> for ColumnSelector {
    fn from(value: &[&str]) -> Self {
        ColumnSelector(value.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for ColumnSelector {
    fn from(value: [&str; N]) -> Self {
        ColumnSelector(value.iter().map(|s| s.to_string()).collect())
    }
}

impl From<Vec<&str>> for ColumnSelector {
    fn from(value: Vec<&str>) -> Self {
        ColumnSelector(value.into_iter().map(String::from).collect())
    }
}

impl From<&[String]> for ColumnSelector {
    fn from(value: &[String]) -> Self {
        ColumnSelector(value.to_vec())
    }
}

impl From<Vec<String>> for ColumnSelector {
    fn from(value: Vec<String>) -> Self {
        ColumnSelector(value)
    }
}

/// Caching, dtype-aware frame.
///
/// Column order is shared by the table, the array view, the nullity view
/// and every per-column cache. Per-column caches are positional.
#[derive(Clone)]
pub struct EdaFrame {
    table: LazyTable,
    values: LazyArray,
    nulls: LazyArray,
    semantic_types: Vec<SemanticType>,
    missing_counts: Vec<usize>,
    str_cache: RefCell<HashMap<(String, bool), LazyColumn>>,
    head: OnceCell<LazyTable>,
    shape: OnceCell<(usize, usize)>,
}

impl EdaFrame {
    /// Build a frame with the default classifier.
    pub fn new(input: impl Into<FrameInput>, options: FrameOptions) -> Result<Self> {
        EdaFrame::with_classifier(input.into(), options, &HeuristicClassifier::default())
    }

    pub fn from_lazy(table: LazyTable) -> Result<Self> {
        EdaFrame::new(table, FrameOptions::default())
    }

    pub fn from_dataframe(df: DataFrame) -> Result<Self> {
        EdaFrame::new(df, FrameOptions::default())
    }

    pub fn from_series(series: Series) -> Result<Self> {
        EdaFrame::new(series, FrameOptions::default())
    }

    /// Build a frame, classifying columns with `classifier`.
    ///
    /// A frame given as input is taken over as it is.
    #[instrument(skip_all, fields(input = input.kind()))]
    pub fn with_classifier(
        input: FrameInput,
        options: FrameOptions,
        classifier: &dyn DtypeClassifier,
    ) -> Result<Self> {
        let (table, in_memory) = match input {
            FrameInput::Frame(frame) => return Ok(frame),
            FrameInput::Lazy(table) => (adapt_lazy(table)?, false),
            FrameInput::InMemory(df) => (adapt_in_memory(df, &options)?, true),
            FrameInput::Column(series) => (adapt_in_memory(series.to_frame(), &options)?, true),
        };

        let table = table.persist()?;
        let semantic_types = resolve_semantic_types(
            &table,
            options.dtype_hints.as_ref(),
            classifier,
            get_sample_rows(),
        )?;
        let table = stringify_nominal_columns(table, &semantic_types)?;

        let values = table.to_array(options.force_length_resolution || in_memory)?;
        let mut nulls = table.to_nullity_array();
        nulls.align_chunking(&values)?;
        let missing_counts = count_missing(&nulls)?;

        info!(
            columns = table.num_columns(),
            partitions = table.num_partitions(),
            rows = ?values.shape().0,
            "built frame"
        );

        Ok(EdaFrame {
            table,
            values,
            nulls,
            semantic_types,
            missing_counts,
            str_cache: RefCell::new(HashMap::new()),
            head: OnceCell::new(),
            shape: OnceCell::new(),
        })
    }

    /// Column labels, in order.
    pub fn columns(&self) -> &[String] {
        self.table.column_names()
    }

    /// Native type of every column, in column order.
    pub fn native_dtypes(&self) -> &[FlexTypeEnum] {
        self.table.column_types()
    }

    /// Boolean view, true where a cell is missing.
    pub fn nulls(&self) -> &LazyArray {
        &self.nulls
    }

    /// Dense array view of the whole table.
    pub fn values(&self) -> &LazyArray {
        &self.values
    }

    /// The underlying table.
    pub fn frame(&self) -> &LazyTable {
        &self.table
    }

    /// `(rows, columns)`. The row count is resolved on first call if the
    /// array view does not know it yet, without evaluating the nullity view.
    pub fn shape(&self) -> Result<(usize, usize)> {
        if let Some(&shape) = self.shape.get() {
            return Ok(shape);
        }
        let rows = match self.values.shape().0 {
            Some(rows) => rows,
            None => partition_lengths_sync(self.values.plan())?.iter().sum(),
        };
        let shape = (rows, self.table.num_columns());
        let _ = self.shape.set(shape);
        Ok(shape)
    }

    /// The first rows of the table. The first call fixes the sample; later
    /// calls return it whatever `n` they pass. `None` uses the configured
    /// default size.
    pub fn head(&self, n: Option<usize>) -> Result<LazyTable> {
        if let Some(head) = self.head.get() {
            return Ok(head.clone());
        }
        let head = self.table.head(n.unwrap_or_else(get_head_rows))?;
        let _ = self.head.set(head.clone());
        Ok(head)
    }

    /// Number of missing cells in `column`.
    pub fn get_missing_count(&self, column: &str) -> Result<usize> {
        Ok(self.missing_counts[self.position(column)?])
    }

    /// Semantic type of `column`.
    pub fn get_semantic_dtype(&self, column: &str) -> Result<SemanticType> {
        Ok(self.semantic_types[self.position(column)?])
    }

    /// Semantic type of every column.
    pub fn semantic_dtypes(&self) -> HashMap<String, SemanticType> {
        self.columns().iter().cloned().zip(self.semantic_types.iter().copied()).collect()
    }

    /// Missing-cell count of every column.
    pub fn missing_counts(&self) -> HashMap<String, usize> {
        self.columns().iter().cloned().zip(self.missing_counts.iter().copied()).collect()
    }

    /// `column` with its values in string form.
    ///
    /// With `coerce_missing` every cell is stringified, missing ones as
    /// `"None"`/`"NaN"`; otherwise missing cells stay missing. Columns of
    /// the nominal family already hold strings and come back untouched
    /// unless missing cells need coercing. Computed columns are persisted
    /// and cached per `(column, coerce_missing)`.
    #[instrument(skip(self))]
    pub fn get_column_as_string(&self, column: &str, coerce_missing: bool) -> Result<LazyColumn> {
        let idx = self.position(column)?;
        let key = (column.to_string(), coerce_missing);
        if let Some(cached) = self.str_cache.borrow().get(&key) {
            return Ok(cached.clone());
        }

        if self.semantic_types[idx].is_nominal() && (!coerce_missing || self.missing_counts[idx] == 0) {
            return Ok(self.table.column_at(idx));
        }

        let func: Arc<dyn Fn(&FlexType) -> FlexType + Send + Sync> = if coerce_missing {
            Arc::new(|v: &FlexType| v.to_flex_string())
        } else {
            Arc::new(|v: &FlexType| v.to_string_unless_missing())
        };
        let coerced = self
            .table
            .column_at(idx)
            .apply(func, FlexTypeEnum::String)
            .persist()?;
        debug!(column, coerce_missing, "cached string column");
        self.str_cache.borrow_mut().insert(key, coerced.clone());
        Ok(coerced)
    }

    /// Force part of the lazy state.
    ///
    /// `Lengths` resolves the array view's chunk lengths if unknown and
    /// realigns the nullity view. `Nulls` materializes the nullity view and
    /// aligns the array view to its now concrete chunks.
    #[instrument(skip(self))]
    pub fn compute(&mut self, mode: ComputeMode) -> Result<()> {
        match mode {
            ComputeMode::Lengths => {
                if self.values.shape().0.is_none() {
                    let values = self.values.with_resolved_lengths()?;
                    let mut nulls = self.nulls.clone();
                    nulls.align_chunking(&values)?;
                    self.values = values;
                    self.nulls = nulls;
                }
            }
            ComputeMode::Nulls => {
                let nulls = self.nulls.persist()?;
                let mut values = self.values.clone();
                values.align_chunking(&nulls)?;
                self.values = values;
                self.nulls = nulls;
            }
        }
        Ok(())
    }

    /// [`compute`](Self::compute) with the mode given by name.
    pub fn compute_str(&mut self, mode: &str) -> Result<()> {
        self.compute(mode.parse()?)
    }

    /// Frame restricted to columns whose native type is in `include`.
    pub fn select_by_dtype(&self, include: &[FlexTypeEnum]) -> Result<EdaFrame> {
        let names: Vec<String> = self
            .columns()
            .iter()
            .zip(self.native_dtypes())
            .filter(|(_, dtype)| include.contains(*dtype))
            .map(|(name, _)| name.clone())
            .collect();
        self.project(names)
    }

    /// Frame restricted to integer and float columns.
    pub fn select_numeric_columns(&self) -> Result<EdaFrame> {
        self.select_by_dtype(&[FlexTypeEnum::Integer, FlexTypeEnum::Float])
    }

    /// Same as [`project`](Self::project).
    pub fn get(&self, selector: impl Into<ColumnSelector>) -> Result<EdaFrame> {
        self.project(selector)
    }

    /// Frame restricted to the selected columns, in the selected order.
    ///
    /// Views and caches are sliced out of this frame; nothing is
    /// recomputed. Unknown or repeated labels fail on the table selection.
    #[instrument(skip_all)]
    pub fn project(&self, selector: impl Into<ColumnSelector>) -> Result<EdaFrame> {
        let selector = selector.into();
        let names = selector.names();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let table = self.table.select(&refs)?;
        let indices: Vec<usize> = names.iter().map(|n| self.position(n)).collect::<Result<_>>()?;

        let mut values = self.values.select_columns(&indices)?;
        let nulls = self.nulls.select_columns(&indices)?;
        let dtype = if indices.is_empty() {
            ArrayDType::default()
        } else {
            ArrayDType::common(table.column_types().iter().copied()).unwrap_or_default()
        };
        if dtype != values.dtype() {
            values = values.astype(dtype);
        }

        let source_cache = self.str_cache.borrow();
        let mut str_cache = HashMap::new();
        for name in names {
            for flag in [false, true] {
                let key = (name.clone(), flag);
                if let Some(col) = source_cache.get(&key) {
                    str_cache.insert(key, col.clone());
                }
            }
        }

        let head = OnceCell::new();
        if let Some(source_head) = self.head.get() {
            let _ = head.set(source_head.select(&refs)?);
        }
        let shape = OnceCell::new();
        if let Some(&(rows, _)) = self.shape.get() {
            let _ = shape.set((rows, names.len()));
        }

        debug!(columns = ?names, dtype = %values.dtype(), "projected frame");
        Ok(EdaFrame {
            table,
            values,
            nulls,
            semantic_types: indices.iter().map(|&i| self.semantic_types[i]).collect(),
            missing_counts: indices.iter().map(|&i| self.missing_counts[i]).collect(),
            str_cache: RefCell::new(str_cache),
            head,
            shape,
        })
    }

    fn position(&self, column: &str) -> Result<usize> {
        self.columns()
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| EdaError::ColumnNotFound(column.to_string()))
    }
}

impl std::fmt::Display for EdaFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rows = self
            .shape
            .get()
            .map(|&(r, _)| r)
            .or(self.values.shape().0)
            .map_or_else(|| "?".to_string(), |r| r.to_string());

        let headers = ["column", "dtype", "semantic", "missing"];
        let lines: Vec<[String; 4]> = self
            .columns()
            .iter()
            .enumerate()
            .map(|(i, name)| {
                [
                    name.clone(),
                    self.native_dtypes()[i].to_string(),
                    self.semantic_types[i].to_string(),
                    self.missing_counts[i].to_string(),
                ]
            })
            .collect();

        let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
        for line in &lines {
            for (w, cell) in widths.iter_mut().zip(line.iter()) {
                *w = (*w).max(cell.len());
            }
        }

        let sep: String = widths
            .iter()
            .map(|w| format!("+{}", "-".repeat(w + 2)))
            .collect::<Vec<_>>()
            .join("")
            + "+";
        let render = |cells: &[&str]| -> String {
            cells
                .iter()
                .zip(widths.iter())
                .map(|(s, &w)| format!("| {:width$} ", s, width = w))
                .collect::<Vec<_>>()
                .join("")
                + "|"
        };

        writeln!(f, "{}", sep)?;
        writeln!(f, "{}", render(&headers))?;
        writeln!(f, "{}", sep)?;
        for line in &lines {
            let cells: Vec<&str> = line.iter().map(String::as_str).collect();
            writeln!(f, "{}", render(&cells))?;
        }
        writeln!(f, "{}", sep)?;
        write!(
            f,
            "[{} rows x {} columns, {} partitions, {}]",
            rows,
            self.table.num_columns(),
            self.table.num_partitions(),
            self.values.dtype()
        )
    }
}

impl std::fmt::Debug for EdaFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdaFrame")
            .field("table", &self.table)
            .field("values", &self.values)
            .field("semantic_types", &self.semantic_types)
            .field("missing_counts", &self.missing_counts)
            .finish()
    }
}

fn adapt_lazy(table: LazyTable) -> Result<LazyTable> {
    let names = disambiguate(table.column_names());
    let table = table.rename_columns(names)?;
    Ok(stringify_index(table))
}

fn adapt_in_memory(df: DataFrame, options: &FrameOptions) -> Result<LazyTable> {
    let names = normalize_column_names(df.labels());
    let num_partitions = if options.repartition {
        let target = options.partition_bytes.unwrap_or_else(get_partition_bytes).max(1);
        df.estimated_bytes().div_ceil(target).max(1)
    } else {
        1
    };
    debug!(
        rows = df.num_rows(),
        bytes = df.estimated_bytes(),
        partitions = num_partitions,
        "partitioning in-memory table"
    );
    let table = LazyTable::from_partitions(names, df.into_partitions(num_partitions)?)?;
    Ok(stringify_index(table))
}

/// Row indices whose values have no total order are turned into strings.
fn stringify_index(table: LazyTable) -> LazyTable {
    match table.index_type() {
        Some(dtype) if !dtype.is_comparable() => {
            debug!(index_type = %dtype, "stringifying row index");
            table.index_to_string()
        }
        _ => table,
    }
}

/// Rewrite present values of nominal-family columns as strings, then
/// persist. Missing cells stay missing.
fn stringify_nominal_columns(table: LazyTable, semantic_types: &[SemanticType]) -> Result<LazyTable> {
    let mut table = table;
    let mut rewritten = false;
    for (idx, semantic) in semantic_types.iter().enumerate() {
        if semantic.is_nominal() {
            table = table.map_column(
                idx,
                Arc::new(|v: &FlexType| v.to_string_unless_missing()),
                FlexTypeEnum::String,
            );
            rewritten = true;
        }
    }
    if rewritten {
        table = table.persist()?;
    }
    Ok(table)
}

/// Per-column sum of the nullity mask.
fn count_missing(nulls: &LazyArray) -> Result<Vec<usize>> {
    let mask = nulls.to_bool_ndarray()?;
    Ok(mask
        .axis_iter(Axis(1))
        .map(|col| col.iter().filter(|&&m| m).count())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> EdaFrame {
        let df = DataFrame::from_columns(vec![
            ("a", vec![FlexType::Integer(1), FlexType::Undefined, FlexType::Integer(3)]),
            ("b", vec![FlexType::Float(0.5), FlexType::Float(1.5), FlexType::Float(f64::NAN)]),
            ("c", vec![FlexType::from("x"), FlexType::from("y"), FlexType::Undefined]),
        ])
        .unwrap();
        EdaFrame::from_dataframe(df).unwrap()
    }

    #[test]
    fn test_compute_mode_parse() {
        assert_eq!("lengths".parse::<ComputeMode>().unwrap(), ComputeMode::Lengths);
        assert_eq!("nulls".parse::<ComputeMode>().unwrap(), ComputeMode::Nulls);
        match "values".parse::<ComputeMode>() {
            Err(EdaError::UnsupportedComputeMode(mode)) => assert_eq!(mode, "values"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_selector_conversions() {
        assert_eq!(ColumnSelector::from("a").names(), &["a".to_string()]);
        assert_eq!(ColumnSelector::from(["a", "b"]).names().len(), 2);
        assert_eq!(ColumnSelector::from(vec!["b".to_string()]).names(), &["b".to_string()]);
    }

    #[test]
    fn test_unknown_column() {
        let f = frame();
        assert!(matches!(f.get_missing_count("zz"), Err(EdaError::ColumnNotFound(_))));
        assert!(matches!(f.get_semantic_dtype("zz"), Err(EdaError::ColumnNotFound(_))));
        assert!(matches!(f.get_column_as_string("zz", true), Err(EdaError::ColumnNotFound(_))));
    }

    #[test]
    fn test_nominal_columns_hold_strings() {
        let f = frame();
        assert_eq!(f.get_semantic_dtype("c").unwrap(), SemanticType::Nominal);
        assert_eq!(f.native_dtypes()[2], FlexTypeEnum::String);
        assert_eq!(f.get_missing_count("c").unwrap(), 1);
    }

    #[test]
    fn test_string_cache_paths() {
        let f = frame();
        // Nominal without coercion: the table's own column, not cached.
        let c = f.get_column_as_string("c", false).unwrap();
        assert!(c.same_as(&f.frame().column_at(2)));
        assert!(f.str_cache.borrow().is_empty());

        // Nominal with missing cells and coercion: computed and cached.
        let coerced = f.get_column_as_string("c", true).unwrap();
        assert_eq!(
            coerced.to_vec().unwrap(),
            vec![FlexType::from("x"), FlexType::from("y"), FlexType::from("None")]
        );
        assert!(f.str_cache.borrow().contains_key(&("c".to_string(), true)));

        let b = f.get_column_as_string("b", false).unwrap();
        assert_eq!(
            b.to_vec().unwrap(),
            vec![FlexType::from("0.5"), FlexType::from("1.5"), FlexType::Undefined]
        );
    }

    #[test]
    fn test_head_is_fixed_by_first_call() {
        let f = frame();
        let first = f.head(Some(2)).unwrap();
        assert_eq!(first.known_num_rows(), Some(2));
        let second = f.head(Some(3)).unwrap();
        assert_eq!(second.known_num_rows(), Some(2));
    }

    #[test]
    fn test_project_slices_head_and_dtype() {
        let f = frame();
        f.head(None).unwrap();
        let a = f.project("a").unwrap();
        assert_eq!(a.values().dtype(), ArrayDType::Int64);
        assert_eq!(a.head.get().map(|h| h.column_names().to_vec()), Some(vec!["a".to_string()]));

        let none = f.project(Vec::<String>::new()).unwrap();
        assert_eq!(none.values().dtype(), ArrayDType::Float64);
        assert_eq!(none.values().shape().1, 0);
    }

    #[test]
    fn test_display() {
        let text = format!("{}", frame());
        assert!(text.contains("semantic"));
        assert!(text.contains("continuous"));
        assert!(text.ends_with("[3 rows x 3 columns, 1 partitions, object]"));
    }
}
