//! Semantic column types and caller-supplied type hints.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EdaError;

/// Statistical nature of a column, independent of its storage type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    Continuous,
    Discrete,
    Nominal,
    Ordinal,
    DateTime,
    Text,
    GeoGraphy,
    GeoPoint,
    LatLong,
}

impl SemanticType {
    /// Nominal, ordinal and geography columns are categorical: their
    /// non-missing values are kept in string form.
    pub fn is_nominal(&self) -> bool {
        matches!(self, Self::Nominal | Self::Ordinal | Self::GeoGraphy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continuous => "continuous",
            Self::Discrete => "discrete",
            Self::Nominal => "nominal",
            Self::Ordinal => "ordinal",
            Self::DateTime => "datetime",
            Self::Text => "text",
            Self::GeoGraphy => "geography",
            Self::GeoPoint => "geopoint",
            Self::LatLong => "latlong",
        }
    }
}

impl FromStr for SemanticType {
    type Err = EdaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "continuous" => Ok(Self::Continuous),
            "discrete" => Ok(Self::Discrete),
            "nominal" => Ok(Self::Nominal),
            "ordinal" => Ok(Self::Ordinal),
            "datetime" => Ok(Self::DateTime),
            "text" => Ok(Self::Text),
            "geography" => Ok(Self::GeoGraphy),
            "geopoint" => Ok(Self::GeoPoint),
            "latlong" => Ok(Self::LatLong),
            other => Err(EdaError::Type(format!("Unknown semantic type: {}", other))),
        }
    }
}

impl std::fmt::Display for SemanticType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied override of the inferred semantic type.
///
/// Deserializes from a bare string (applies to every column) or from a
/// map of column name to type:
///
/// ```
/// # use edaframe_types::semantic::{DTypeHint, SemanticType};
/// let all: DTypeHint = serde_json::from_str(r#""nominal""#).unwrap();
/// assert_eq!(all.hint_for("x"), Some(SemanticType::Nominal));
///
/// let some: DTypeHint = serde_json::from_str(r#"{"a": "continuous"}"#).unwrap();
/// assert_eq!(some.hint_for("a"), Some(SemanticType::Continuous));
/// assert_eq!(some.hint_for("b"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DTypeHint {
    All(SemanticType),
    PerColumn(HashMap<String, SemanticType>),
}

impl DTypeHint {
    /// Hint that applies to `column`, if any.
    pub fn hint_for(&self, column: &str) -> Option<SemanticType> {
        match self {
            DTypeHint::All(dtype) => Some(*dtype),
            DTypeHint::PerColumn(map) => map.get(column).copied(),
        }
    }

    /// Build a per-column hint from `(column, type)` pairs.
    pub fn per_column<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, SemanticType)>,
        S: Into<String>,
    {
        DTypeHint::PerColumn(pairs.into_iter().map(|(c, t)| (c.into(), t)).collect())
    }
}

impl From<SemanticType> for DTypeHint {
    fn from(value: SemanticType) -> Self {
        DTypeHint::All(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_case_insensitive() {
        assert_eq!("Continuous".parse::<SemanticType>().unwrap(), SemanticType::Continuous);
        assert_eq!(" NOMINAL ".parse::<SemanticType>().unwrap(), SemanticType::Nominal);
        assert!("bogus".parse::<SemanticType>().is_err());
    }

    #[test]
    fn test_nominal_family() {
        assert!(SemanticType::Nominal.is_nominal());
        assert!(SemanticType::Ordinal.is_nominal());
        assert!(SemanticType::GeoGraphy.is_nominal());
        assert!(!SemanticType::Continuous.is_nominal());
        assert!(!SemanticType::Text.is_nominal());
    }

    #[test]
    fn test_hint_lookup() {
        let hint = DTypeHint::per_column([("a", SemanticType::Ordinal)]);
        assert_eq!(hint.hint_for("a"), Some(SemanticType::Ordinal));
        assert_eq!(hint.hint_for("b"), None);

        let all = DTypeHint::from(SemanticType::Text);
        assert_eq!(all.hint_for("anything"), Some(SemanticType::Text));
    }

    #[test]
    fn test_hint_json_round_trip() {
        let hint: DTypeHint = serde_json::from_str(r#"{"a": "ordinal", "b": "text"}"#).unwrap();
        assert_eq!(hint.hint_for("a"), Some(SemanticType::Ordinal));
        assert_eq!(hint.hint_for("b"), Some(SemanticType::Text));

        let json = serde_json::to_string(&DTypeHint::All(SemanticType::DateTime)).unwrap();
        assert_eq!(json, r#""datetime""#);
    }
}
