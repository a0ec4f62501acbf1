//! Data types of fields and expressions

use std::fmt;

/// Type of a field, tag or expression result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum DataType {
    #[default]
    Unknown = 0,
    Float = 1,
    Integer = 2,
    String = 3,
    Boolean = 4,
    Time = 5,
    Duration = 6,
    Tag = 7,
    /// Any field type, used to exclude tags from a lookup
    AnyField = 8,
    Unsigned = 9,
}

impl DataType {
    /// Whether `other` should replace `self` when merging the types a name
    /// has across several sources.
    ///
    /// Lower codes win, so float beats integer and integer beats string.
    /// Unsigned sits between integer and string.
    pub fn less_than(self, other: DataType) -> bool {
        if self == Self::Unknown {
            true
        } else if self == Self::Unsigned {
            other != Self::Unknown && other <= Self::Integer
        } else if other == Self::Unsigned {
            self >= Self::String
        } else {
            other != Self::Unknown && other < self
        }
    }

    /// Parse the lower-case name produced by `Display`
    pub fn from_name(s: &str) -> Self {
        match s {
            "float" => Self::Float,
            "integer" => Self::Integer,
            "unsigned" => Self::Unsigned,
            "string" => Self::String,
            "boolean" => Self::Boolean,
            "time" => Self::Time,
            "duration" => Self::Duration,
            "tag" => Self::Tag,
            "field" => Self::AnyField,
            _ => Self::Unknown,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Float | Self::Integer | Self::Unsigned)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Float => "float",
            Self::Integer => "integer",
            Self::Unsigned => "unsigned",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Time => "time",
            Self::Duration => "duration",
            Self::Tag => "tag",
            Self::AnyField => "field",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_less_than_widens_numeric() {
        assert!(DataType::Integer.less_than(DataType::Float));
        assert!(!DataType::Float.less_than(DataType::Integer));
        assert!(DataType::Unknown.less_than(DataType::String));
        assert!(!DataType::Integer.less_than(DataType::Unknown));
    }

    #[test]
    fn test_less_than_unsigned() {
        assert!(DataType::Unsigned.less_than(DataType::Float));
        assert!(DataType::Unsigned.less_than(DataType::Integer));
        assert!(!DataType::Unsigned.less_than(DataType::String));
        assert!(DataType::String.less_than(DataType::Unsigned));
        assert!(!DataType::Integer.less_than(DataType::Unsigned));
    }

    #[test]
    fn test_name_round_trip() {
        for dt in [
            DataType::Float,
            DataType::Integer,
            DataType::Unsigned,
            DataType::String,
            DataType::Boolean,
            DataType::Time,
            DataType::Duration,
            DataType::Tag,
            DataType::AnyField,
            DataType::Unknown,
        ] {
            assert_eq!(DataType::from_name(&dt.to_string()), dt);
        }
    }
}
