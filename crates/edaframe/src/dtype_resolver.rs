//! Semantic type detection for the columns of a table.

use tracing::{debug, instrument};

use edaframe_types::error::Result;
use edaframe_types::flex_type::{FlexType, FlexTypeEnum};
use edaframe_types::semantic::{DTypeHint, SemanticType};

use crate::lazy_column::LazyColumn;
use crate::lazy_table::LazyTable;

/// Decides the semantic type of one column.
///
/// Implementations must be deterministic: the same column, sample and hint
/// always give the same answer.
pub trait DtypeClassifier: Send + Sync {
    fn classify(
        &self,
        column: &LazyColumn,
        sample: &[FlexType],
        hint: Option<SemanticType>,
    ) -> Result<SemanticType>;
}

/// Classifier driven by the native type and the sampled values.
///
/// A hint always wins. Numbers are continuous, date-times are date-times,
/// containers are nominal. Strings are text when their mean word count in
/// the sample exceeds `text_word_threshold`, nominal otherwise.
#[derive(Debug, Clone)]
pub struct HeuristicClassifier {
    pub text_word_threshold: f64,
}

impl Default for HeuristicClassifier {
    fn default() -> Self {
        HeuristicClassifier {
            text_word_threshold: 3.0,
        }
    }
}

impl DtypeClassifier for HeuristicClassifier {
    fn classify(
        &self,
        column: &LazyColumn,
        sample: &[FlexType],
        hint: Option<SemanticType>,
    ) -> Result<SemanticType> {
        if let Some(hint) = hint {
            return Ok(hint);
        }
        let semantic = match column.dtype() {
            FlexTypeEnum::Integer | FlexTypeEnum::Float => SemanticType::Continuous,
            FlexTypeEnum::DateTime => SemanticType::DateTime,
            FlexTypeEnum::String => {
                if mean_word_count(sample).is_some_and(|m| m > self.text_word_threshold) {
                    SemanticType::Text
                } else {
                    SemanticType::Nominal
                }
            }
            FlexTypeEnum::Vector
            | FlexTypeEnum::List
            | FlexTypeEnum::Dict
            | FlexTypeEnum::Undefined => SemanticType::Nominal,
        };
        Ok(semantic)
    }
}

fn mean_word_count(sample: &[FlexType]) -> Option<f64> {
    let counts: Vec<usize> = sample
        .iter()
        .filter_map(|v| match v {
            FlexType::String(s) => Some(s.split_whitespace().count()),
            _ => None,
        })
        .collect();
    if counts.is_empty() {
        return None;
    }
    Some(counts.iter().sum::<usize>() as f64 / counts.len() as f64)
}

/// Semantic type of every column, in column order.
///
/// The first `sample_rows` rows are materialized once and shared by every
/// column. A hint for a column takes precedence over inference.
#[instrument(skip_all, fields(columns = table.num_columns(), sample_rows = sample_rows))]
pub fn resolve_semantic_types(
    table: &LazyTable,
    hints: Option<&DTypeHint>,
    classifier: &dyn DtypeClassifier,
    sample_rows: usize,
) -> Result<Vec<SemanticType>> {
    let sample = table.head(sample_rows)?.materialize()?.to_column_vecs();

    let mut types = Vec::with_capacity(table.num_columns());
    for (idx, name) in table.column_names().iter().enumerate() {
        let hint = hints.and_then(|h| h.hint_for(name));
        let values = sample.get(idx).map_or(&[][..], Vec::as_slice);
        let semantic = classifier.classify(&table.column_at(idx), values, hint)?;
        debug!(column = %name, semantic = %semantic, hinted = hint.is_some(), "resolved semantic type");
        types.push(semantic);
    }
    Ok(types)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use edaframe_query::batch::{ColumnData, Partition};

    use super::*;

    fn table() -> LazyTable {
        let columns = vec![
            ColumnData::Integer(vec![Some(1), Some(2)]),
            ColumnData::String(vec![Some("red".into()), Some("blue".into())]),
            ColumnData::String(vec![
                Some("the quick brown fox jumps".into()),
                Some("over the lazy sleeping dog".into()),
            ]),
            ColumnData::List(vec![Some(Arc::from(vec![FlexType::Integer(1)])), None]),
        ];
        LazyTable::from_partitions(
            vec!["n".into(), "color".into(), "note".into(), "tags".into()],
            vec![Partition::new(columns).unwrap()],
        )
        .unwrap()
    }

    #[test]
    fn test_heuristics() {
        let types = resolve_semantic_types(&table(), None, &HeuristicClassifier::default(), 100).unwrap();
        assert_eq!(
            types,
            vec![
                SemanticType::Continuous,
                SemanticType::Nominal,
                SemanticType::Text,
                SemanticType::Nominal
            ]
        );
    }

    #[test]
    fn test_hints_take_precedence() {
        let hints = DTypeHint::per_column([("n", SemanticType::Nominal)]);
        let types = resolve_semantic_types(&table(), Some(&hints), &HeuristicClassifier::default(), 100).unwrap();
        assert_eq!(types[0], SemanticType::Nominal);
        assert_eq!(types[2], SemanticType::Text);

        let global = DTypeHint::All(SemanticType::Ordinal);
        let types = resolve_semantic_types(&table(), Some(&global), &HeuristicClassifier::default(), 1).unwrap();
        assert!(types.iter().all(|&t| t == SemanticType::Ordinal));
    }

    #[test]
    fn test_deterministic() {
        let classifier = HeuristicClassifier::default();
        let a = resolve_semantic_types(&table(), None, &classifier, 100).unwrap();
        let b = resolve_semantic_types(&table(), None, &classifier, 100).unwrap();
        assert_eq!(a, b);
    }
}
