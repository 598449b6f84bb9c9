use std::sync::Arc;

/// Native storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlexTypeEnum {
    Integer,
    Float,
    String,
    Vector,
    List,
    Dict,
    DateTime,
    Undefined,
}

impl FlexTypeEnum {
    /// Integer and float columns are numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }

    /// Whether values of this type have a total order usable for sorting
    /// and range-partitioning a row index.
    pub fn is_comparable(&self) -> bool {
        matches!(
            self,
            Self::Integer | Self::Float | Self::String | Self::DateTime
        )
    }
}

impl std::fmt::Display for FlexTypeEnum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer => write!(f, "integer"),
            Self::Float => write!(f, "float"),
            Self::String => write!(f, "string"),
            Self::Vector => write!(f, "vector"),
            Self::List => write!(f, "list"),
            Self::Dict => write!(f, "dict"),
            Self::DateTime => write!(f, "datetime"),
            Self::Undefined => write!(f, "undefined"),
        }
    }
}

/// Date/time with timezone and microsecond precision.
#[derive(Debug, Clone, PartialEq)]
pub struct FlexDateTime {
    pub posix_timestamp: i64,
    pub tz_offset_quarter_hours: i8,
    pub microsecond: u32,
}

/// A single cell value. Heap payloads are `Arc`-shared so cloning a cell
/// out of a column is cheap.
#[derive(Debug, Clone, PartialEq)]
pub enum FlexType {
    Integer(i64),
    Float(f64),
    String(Arc<str>),
    Vector(Arc<[f64]>),
    List(Arc<[FlexType]>),
    Dict(Arc<[(FlexType, FlexType)]>),
    DateTime(FlexDateTime),
    Undefined,
}

impl FlexType {
    /// Returns the type tag for this value.
    pub fn type_enum(&self) -> FlexTypeEnum {
        match self {
            FlexType::Integer(_) => FlexTypeEnum::Integer,
            FlexType::Float(_) => FlexTypeEnum::Float,
            FlexType::String(_) => FlexTypeEnum::String,
            FlexType::Vector(_) => FlexTypeEnum::Vector,
            FlexType::List(_) => FlexTypeEnum::List,
            FlexType::Dict(_) => FlexTypeEnum::Dict,
            FlexType::DateTime(_) => FlexTypeEnum::DateTime,
            FlexType::Undefined => FlexTypeEnum::Undefined,
        }
    }

    /// True for `Undefined` and for a NaN float.
    ///
    /// Containers are one scalar here: a list holding undefined values is
    /// itself present, and the check never looks inside it.
    pub fn is_missing(&self) -> bool {
        match self {
            FlexType::Undefined => true,
            FlexType::Float(v) => v.is_nan(),
            _ => false,
        }
    }

    /// String form of the value. Missing values (NaN included) come back
    /// as `Undefined` so the result always fits a string column.
    pub fn to_string_unless_missing(&self) -> FlexType {
        if self.is_missing() {
            FlexType::Undefined
        } else {
            self.to_flex_string()
        }
    }

    /// String form of the value, missing values included.
    pub fn to_flex_string(&self) -> FlexType {
        match self {
            FlexType::String(_) => self.clone(),
            other => FlexType::String(Arc::from(other.to_string())),
        }
    }
}

impl From<i64> for FlexType {
    fn from(value: i64) -> Self {
        FlexType::Integer(value)
    }
}

impl From<f64> for FlexType {
    fn from(value: f64) -> Self {
        FlexType::Float(value)
    }
}

impl From<&str> for FlexType {
    fn from(value: &str) -> Self {
        FlexType::String(Arc::from(value))
    }
}

impl From<String> for FlexType {
    fn from(value: String) -> Self {
        FlexType::String(Arc::from(value))
    }
}

impl<T: Into<FlexType>> From<Option<T>> for FlexType {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FlexType::Undefined)
    }
}

impl std::fmt::Display for FlexType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlexType::Integer(v) => write!(f, "{}", v),
            // Debug keeps the trailing ".0" on whole floats.
            FlexType::Float(v) => write!(f, "{:?}", v),
            FlexType::String(v) => write!(f, "{}", v),
            FlexType::Vector(v) => {
                write!(f, "[")?;
                for (i, x) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}", x)?;
                }
                write!(f, "]")
            }
            FlexType::List(v) => {
                write!(f, "[")?;
                for (i, x) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", x)?;
                }
                write!(f, "]")
            }
            FlexType::Dict(v) => {
                write!(f, "{{")?;
                for (i, (k, val)) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, val)?;
                }
                write!(f, "}}")
            }
            FlexType::DateTime(dt) => {
                write!(f, "DateTime({})", dt.posix_timestamp)
            }
            FlexType::Undefined => write!(f, "None"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flex_type_type_tag() {
        assert_eq!(FlexType::Integer(42).type_enum(), FlexTypeEnum::Integer);
        assert_eq!(FlexType::Float(3.14).type_enum(), FlexTypeEnum::Float);
        assert_eq!(FlexType::from("hello").type_enum(), FlexTypeEnum::String);
        assert_eq!(FlexType::Undefined.type_enum(), FlexTypeEnum::Undefined);
    }

    #[test]
    fn test_flex_type_display() {
        assert_eq!(format!("{}", FlexType::Integer(42)), "42");
        assert_eq!(format!("{}", FlexType::Float(3.14)), "3.14");
        assert_eq!(format!("{}", FlexType::Float(3.0)), "3.0");
        assert_eq!(format!("{}", FlexType::from("hello")), "hello");
        assert_eq!(format!("{}", FlexType::Undefined), "None");
    }

    #[test]
    fn test_missing_detection() {
        assert!(FlexType::Undefined.is_missing());
        assert!(FlexType::Float(f64::NAN).is_missing());
        assert!(!FlexType::Float(0.0).is_missing());
        assert!(!FlexType::Integer(0).is_missing());
        assert!(!FlexType::from("").is_missing());
    }

    #[test]
    fn test_container_is_single_scalar() {
        let all_missing = FlexType::List(Arc::from(vec![FlexType::Undefined, FlexType::Undefined]));
        assert!(!all_missing.is_missing());
        let empty = FlexType::List(Arc::from(Vec::<FlexType>::new()));
        assert!(!empty.is_missing());
        let nan_vec = FlexType::Vector(Arc::from(vec![f64::NAN]));
        assert!(!nan_vec.is_missing());
    }

    #[test]
    fn test_to_string_unless_missing() {
        assert_eq!(FlexType::Integer(7).to_string_unless_missing(), FlexType::from("7"));
        assert_eq!(FlexType::Undefined.to_string_unless_missing(), FlexType::Undefined);
        assert_eq!(FlexType::Float(f64::NAN).to_string_unless_missing(), FlexType::Undefined);
        assert_eq!(FlexType::Float(f64::NAN).to_flex_string(), FlexType::from("NaN"));
        let list = FlexType::List(Arc::from(vec![FlexType::Integer(1), FlexType::Undefined]));
        assert_eq!(list.to_string_unless_missing(), FlexType::from("[1, None]"));
        assert_eq!(FlexType::Undefined.to_flex_string(), FlexType::from("None"));
    }

    #[test]
    fn test_numeric_and_comparable() {
        assert!(FlexTypeEnum::Integer.is_numeric());
        assert!(FlexTypeEnum::Float.is_numeric());
        assert!(!FlexTypeEnum::String.is_numeric());
        assert!(FlexTypeEnum::String.is_comparable());
        assert!(!FlexTypeEnum::List.is_comparable());
        assert!(!FlexTypeEnum::Undefined.is_comparable());
    }
}
