//! Column label normalization.

use std::collections::HashMap;

use edaframe_types::flex_type::FlexType;

/// Stringify labels and disambiguate repeats.
///
/// The first occurrence of a label keeps its name; later occurrences get
/// `_1`, `_2`, ... in the order they are seen. A suffixed name that
/// happens to equal another input label is not renamed again.
pub fn normalize_column_names(labels: &[FlexType]) -> Vec<String> {
    let names: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
    disambiguate(&names)
}

/// Disambiguate repeated names, see [`normalize_column_names`].
pub fn disambiguate(names: &[String]) -> Vec<String> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut result = Vec::with_capacity(names.len());

    for name in names {
        let count = seen.entry(name.as_str()).or_insert(0);
        if *count == 0 {
            result.push(name.clone());
        } else {
            result.push(format!("{}_{}", name, count));
        }
        *count += 1;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<FlexType> {
        names.iter().map(|&n| FlexType::from(n)).collect()
    }

    #[test]
    fn test_unique_labels_untouched() {
        assert_eq!(normalize_column_names(&labels(&["x", "y", "z"])), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_repeats_get_suffixes() {
        assert_eq!(normalize_column_names(&labels(&["a", "a", "b"])), vec!["a", "a_1", "b"]);
        assert_eq!(
            normalize_column_names(&labels(&["a", "b", "a", "a"])),
            vec!["a", "b", "a_1", "a_2"]
        );
    }

    #[test]
    fn test_non_string_labels() {
        let input = vec![FlexType::Integer(0), FlexType::Integer(1), FlexType::Float(2.5)];
        assert_eq!(normalize_column_names(&input), vec!["0", "1", "2.5"]);
    }

    #[test]
    fn test_second_order_collision_left_alone() {
        assert_eq!(
            normalize_column_names(&labels(&["a", "a", "a_1"])),
            vec!["a", "a_1", "a_1"]
        );
    }
}
