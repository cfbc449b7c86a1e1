//! Per-type field metadata, the table the translator and the stores consult
//! instead of runtime reflection.

use std::fmt;
use std::marker::PhantomData;

use super::SqlValue;

/// How one member of a record maps to storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMeta {
    /// Member identifier, as referenced by `Field` handles.
    pub name: &'static str,
    /// Explicit column name; overrides the naming policy.
    pub column: Option<&'static str>,
    /// Not stored at all. Predicates referencing it fail to translate.
    pub ignored: bool,
    /// Assigned by the database (serial ids, `DEFAULT now()`); left out of inserts and updates.
    pub default_generated: bool,
}

impl FieldMeta {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            column: None,
            ignored: false,
            default_generated: false,
        }
    }

    pub const fn column(mut self, column: &'static str) -> Self {
        self.column = Some(column);
        self
    }

    pub const fn ignored(mut self) -> Self {
        self.ignored = true;
        self
    }

    pub const fn default_generated(mut self) -> Self {
        self.default_generated = true;
        self
    }
}

/// A persisted type: its table, its field metadata, and read access to its values.
pub trait Record {
    const TABLE: &'static str;
    const FIELDS: &'static [FieldMeta];

    /// Current value of the member called `field`, or `None` when there is no such member.
    fn value_of(&self, field: &str) -> Option<SqlValue>;

    fn field_meta(name: &str) -> Option<&'static FieldMeta> {
        Self::FIELDS.iter().find(|meta| meta.name == name)
    }
}

/// Typed handle to one member of `T`.
pub struct Field<T> {
    name: &'static str,
    _record: PhantomData<fn() -> T>,
}

impl<T> Field<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _record: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Field<T> {}

impl<T> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Field").field(&self.name).finish()
    }
}

/// Implements [`Record`] for a struct and declares a typed [`Field`] constant per member.
///
/// ```ignore
/// record! {
///     TodoTask in "tasks" {
///         ID: id [default_generated],
///         TITLE: title,
///         NOTES: notes as "note_text",
///         CACHE: cache [ignored],
///     }
/// }
/// ```
#[macro_export]
macro_rules! record {
    (
        $ty:ident in $table:literal {
            $(
                $konst:ident : $field:ident
                $([ $($flag:ident),* ])?
                $(as $column:literal)?
            ),* $(,)?
        }
    ) => {
        impl $ty {
            $(
                pub const $konst: $crate::db::Field<$ty> =
                    $crate::db::Field::new(stringify!($field));
            )*
        }

        impl $crate::db::Record for $ty {
            const TABLE: &'static str = $table;
            const FIELDS: &'static [$crate::db::FieldMeta] = &[
                $(
                    $crate::db::FieldMeta::new(stringify!($field))
                        $($(.$flag())*)?
                        $(.column($column))?
                ),*
            ];

            fn value_of(&self, field: &str) -> Option<$crate::db::SqlValue> {
                match field {
                    $(stringify!($field) => Some($crate::db::SqlValue::from(self.$field.clone())),)*
                    _ => None,
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Note {
        id: i64,
        body: String,
        draft: bool,
    }

    record! {
        Note in "notes" {
            ID: id [default_generated],
            BODY: body as "note_body",
            DRAFT: draft [ignored],
        }
    }

    #[test]
    fn test_record_macro_builds_metadata() {
        assert_eq!(Note::TABLE, "notes");
        assert_eq!(Note::FIELDS.len(), 3);

        let id = Note::field_meta("id").unwrap();
        assert!(id.default_generated);
        assert!(!id.ignored);

        let body = Note::field_meta("body").unwrap();
        assert_eq!(body.column, Some("note_body"));

        assert!(Note::field_meta("draft").unwrap().ignored);
        assert!(Note::field_meta("missing").is_none());
        assert_eq!(Note::BODY.name(), "body");
    }

    #[test]
    fn test_record_macro_reads_values() {
        let note = Note {
            id: 7,
            body: "hello".into(),
            draft: true,
        };
        assert_eq!(note.value_of("id"), Some(SqlValue::Int(7)));
        assert_eq!(note.value_of("body"), Some(SqlValue::Text("hello".into())));
        assert_eq!(note.value_of("draft"), Some(SqlValue::Bool(true)));
        assert_eq!(note.value_of("nope"), None);
    }
}
