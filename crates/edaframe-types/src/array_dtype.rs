//! Element type of the dense array view of a table.

use crate::flex_type::FlexTypeEnum;

/// Element dtype of a dense array. Variants are ordered so that promoting
/// two dtypes is taking the larger one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ArrayDType {
    Bool,
    Int64,
    #[default]
    Float64,
    Object,
}

impl ArrayDType {
    /// Array dtype a single column of the given native type maps to.
    pub fn from_native(native: FlexTypeEnum) -> Self {
        match native {
            FlexTypeEnum::Integer => ArrayDType::Int64,
            FlexTypeEnum::Float => ArrayDType::Float64,
            _ => ArrayDType::Object,
        }
    }

    /// Smallest dtype that can represent values of both.
    pub fn promote(self, other: ArrayDType) -> ArrayDType {
        self.max(other)
    }

    /// Common dtype of a set of native column types, or `None` for an empty set.
    pub fn common<I>(natives: I) -> Option<ArrayDType>
    where
        I: IntoIterator<Item = FlexTypeEnum>,
    {
        natives
            .into_iter()
            .map(ArrayDType::from_native)
            .reduce(ArrayDType::promote)
    }
}

impl std::fmt::Display for ArrayDType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::Int64 => write!(f, "int64"),
            Self::Float64 => write!(f, "float64"),
            Self::Object => write!(f, "object"),
        }
    }
}
