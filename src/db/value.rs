//! Conversion of runtime values into SQL literal text.
//!
//! Formatting follows a fixed priority: a converter registered for the value's type
//! wins, then `null`, then the quoted kinds (text, characters, enum members, timestamps,
//! uuids), then the value's plain textual form.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use super::TranslationError;

/// Layout used for timestamp literals, e.g. `'2024-03-01 12:30:00.000 +00:00'`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f %:z";

/// A runtime value that can appear in a predicate or a row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Char(char),
    /// A member of a fieldless enum, kept with both its name and its ordinal so
    /// converters can pick either representation.
    Enum {
        type_name: &'static str,
        name: &'static str,
        ordinal: i64,
    },
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
}

impl SqlValue {
    /// The key converters are registered under.
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::Int(_) => "int",
            SqlValue::Float(_) => "float",
            SqlValue::Text(_) => "text",
            SqlValue::Char(_) => "char",
            SqlValue::Enum { type_name, .. } => *type_name,
            SqlValue::Timestamp(_) => "timestamp",
            SqlValue::Uuid(_) => "uuid",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "null"),
            SqlValue::Bool(v) => write!(f, "{}", v),
            SqlValue::Int(v) => write!(f, "{}", v),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Text(v) => write!(f, "{}", v),
            SqlValue::Char(v) => write!(f, "{}", v),
            SqlValue::Enum { name, .. } => write!(f, "{}", name),
            SqlValue::Timestamp(v) => write!(f, "{}", v.format(TIMESTAMP_FORMAT)),
            SqlValue::Uuid(v) => write!(f, "{}", v),
        }
    }
}

macro_rules! sql_value_from {
    ($($ty:ty => $variant:ident $(as $cast:ty)?),* $(,)?) => {
        $(
            impl From<$ty> for SqlValue {
                fn from(value: $ty) -> Self {
                    SqlValue::$variant(value $(as $cast)?)
                }
            }
        )*
    };
}

sql_value_from! {
    bool => Bool,
    i16 => Int as i64,
    i32 => Int as i64,
    i64 => Int,
    u8 => Int as i64,
    u16 => Int as i64,
    u32 => Int as i64,
    f32 => Float as f64,
    f64 => Float,
    String => Text,
    char => Char,
    DateTime<Utc> => Timestamp,
    Uuid => Uuid,
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

/// A custom rendering for every value of one type.
pub trait ValueConverter: Send + Sync {
    fn can_convert(&self, value: &SqlValue) -> bool;
    fn convert(&self, value: &SqlValue) -> String;
}

/// Renders enum members as their quoted variant name.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringEnumConverter;

impl ValueConverter for StringEnumConverter {
    fn can_convert(&self, value: &SqlValue) -> bool {
        matches!(value, SqlValue::Enum { .. })
    }

    fn convert(&self, value: &SqlValue) -> String {
        quote(&value.to_string())
    }
}

/// Renders enum members as their bare ordinal, for integer-backed enum columns.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrdinalEnumConverter;

impl ValueConverter for OrdinalEnumConverter {
    fn can_convert(&self, value: &SqlValue) -> bool {
        matches!(value, SqlValue::Enum { .. })
    }

    fn convert(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Enum { ordinal, .. } => ordinal.to_string(),
            other => other.to_string(),
        }
    }
}

/// The value formatting policy: a registry of per-type converters plus the
/// built-in literal rules.
#[derive(Clone, Default)]
pub struct ValueFormatter {
    converters: HashMap<&'static str, Arc<dyn ValueConverter>>,
}

impl ValueFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `converter` for every value whose `type_name` is `type_name`.
    pub fn with_converter(
        mut self,
        type_name: &'static str,
        converter: impl ValueConverter + 'static,
    ) -> Self {
        self.converters.insert(type_name, Arc::new(converter));
        self
    }

    /// Whether `value` is rendered by a registered converter rather than the built-in rules.
    pub fn has_converter(&self, value: &SqlValue) -> bool {
        !value.is_null() && self.converters.contains_key(value.type_name())
    }

    pub fn format(&self, value: &SqlValue) -> Result<String, TranslationError> {
        if !value.is_null() {
            if let Some(converter) = self.converters.get(value.type_name()) {
                if !converter.can_convert(value) {
                    return Err(TranslationError::Converter {
                        type_name: value.type_name(),
                        value: value.to_string(),
                    });
                }
                return Ok(converter.convert(value));
            }
        }

        Ok(match value {
            SqlValue::Null => "null".to_string(),
            SqlValue::Text(_)
            | SqlValue::Char(_)
            | SqlValue::Enum { .. }
            | SqlValue::Timestamp(_)
            | SqlValue::Uuid(_) => quote(&value.to_string()),
            SqlValue::Float(v) if v.is_nan() => quote("NaN"),
            SqlValue::Float(v) if v.is_infinite() => {
                quote(if *v > 0.0 { "Infinity" } else { "-Infinity" })
            }
            other => other.to_string(),
        })
    }
}

impl fmt::Debug for ValueFormatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueFormatter")
            .field("converters", &self.converters.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn level(name: &'static str, ordinal: i64) -> SqlValue {
        SqlValue::Enum {
            type_name: "Level",
            name,
            ordinal,
        }
    }

    #[test]
    fn test_builtin_literal_rules() {
        let formatter = ValueFormatter::new();

        assert_eq!(formatter.format(&SqlValue::Null).unwrap(), "null");
        assert_eq!(formatter.format(&"text".into()).unwrap(), "'text'");
        assert_eq!(formatter.format(&'x'.into()).unwrap(), "'x'");
        assert_eq!(formatter.format(&level("High", 2)).unwrap(), "'High'");
        assert_eq!(formatter.format(&69.into()).unwrap(), "69");
        assert_eq!(formatter.format(&2.5.into()).unwrap(), "2.5");
        assert_eq!(formatter.format(&true.into()).unwrap(), "true");
    }

    #[test]
    fn test_timestamp_and_uuid_are_quoted() {
        let formatter = ValueFormatter::new();
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(
            formatter.format(&at.into()).unwrap(),
            "'2024-03-01 12:30:00.000 +00:00'"
        );

        let id = Uuid::nil();
        assert_eq!(
            formatter.format(&id.into()).unwrap(),
            "'00000000-0000-0000-0000-000000000000'"
        );
    }

    #[test]
    fn test_non_finite_floats_are_quoted() {
        let formatter = ValueFormatter::new();
        assert_eq!(formatter.format(&f64::NAN.into()).unwrap(), "'NaN'");
        assert_eq!(formatter.format(&f64::INFINITY.into()).unwrap(), "'Infinity'");
        assert_eq!(
            formatter.format(&f64::NEG_INFINITY.into()).unwrap(),
            "'-Infinity'"
        );
    }

    #[test]
    fn test_embedded_quotes_are_doubled() {
        let formatter = ValueFormatter::new();
        assert_eq!(formatter.format(&"it's".into()).unwrap(), "'it''s'");
    }

    #[test]
    fn test_converter_takes_priority() {
        let formatter = ValueFormatter::new().with_converter("Level", OrdinalEnumConverter);
        assert!(formatter.has_converter(&level("Low", 0)));
        assert_eq!(formatter.format(&level("Low", 0)).unwrap(), "0");

        // Other types keep the default rules.
        assert_eq!(formatter.format(&"Low".into()).unwrap(), "'Low'");
    }

    #[test]
    fn test_converter_that_cannot_convert_fails() {
        let formatter = ValueFormatter::new().with_converter("int", StringEnumConverter);
        match formatter.format(&5.into()) {
            Err(TranslationError::Converter { type_name, .. }) => assert_eq!(type_name, "int"),
            other => panic!("Expected converter error, got {:?}", other),
        }
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(SqlValue::from(None::<i32>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some("a")), SqlValue::Text("a".into()));
    }
}
