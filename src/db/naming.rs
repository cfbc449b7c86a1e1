//! Field-name resolution: which column a record member maps to.

use convert_case::{Case, Casing};
use std::fmt;
use std::sync::Arc;

use super::{FieldMeta, Record};

/// Converts a member identifier into a column name.
pub trait NamingPolicy: Send + Sync {
    fn convert(&self, name: &str) -> String;
}

/// `UserId` -> `user_id`. Already snake-cased names pass through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct SnakeCase;

impl NamingPolicy for SnakeCase {
    fn convert(&self, name: &str) -> String {
        name.to_case(Case::Snake)
    }
}

/// Uses member names as written.
#[derive(Debug, Default, Clone, Copy)]
pub struct Verbatim;

impl NamingPolicy for Verbatim {
    fn convert(&self, name: &str) -> String {
        name.to_string()
    }
}

/// Outcome of resolving one member in a given context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Column(String),
    Ignored,
    DefaultGenerated,
}

/// Applies field metadata and a naming policy to produce column names.
#[derive(Clone)]
pub struct ColumnResolver {
    policy: Arc<dyn NamingPolicy>,
}

impl ColumnResolver {
    pub fn new(policy: impl NamingPolicy + 'static) -> Self {
        Self {
            policy: Arc::new(policy),
        }
    }

    /// Resolves `meta`. With `skip_defaults` set (insert and update contexts),
    /// server-assigned members resolve to `DefaultGenerated` instead of a column.
    pub fn resolve(&self, meta: &FieldMeta, skip_defaults: bool) -> Resolution {
        if meta.ignored {
            return Resolution::Ignored;
        }
        if skip_defaults && meta.default_generated {
            return Resolution::DefaultGenerated;
        }
        Resolution::Column(self.column_name(meta))
    }

    /// Column name for a member that is known not to be ignored.
    pub fn column_name(&self, meta: &FieldMeta) -> String {
        match meta.column {
            Some(column) => column.to_string(),
            None => self.policy.convert(meta.name),
        }
    }

    /// Every stored member of `T` with its column, in declaration order.
    pub fn columns<T: Record>(&self, skip_defaults: bool) -> Vec<(&'static FieldMeta, String)> {
        T::FIELDS
            .iter()
            .filter_map(|meta| match self.resolve(meta, skip_defaults) {
                Resolution::Column(column) => Some((meta, column)),
                Resolution::Ignored | Resolution::DefaultGenerated => None,
            })
            .collect()
    }
}

impl Default for ColumnResolver {
    fn default() -> Self {
        Self::new(SnakeCase)
    }
}

impl fmt::Debug for ColumnResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnResolver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqlValue;

    struct Account;

    impl Record for Account {
        const TABLE: &'static str = "accounts";
        const FIELDS: &'static [FieldMeta] = &[
            FieldMeta::new("Id").default_generated(),
            FieldMeta::new("DisplayName"),
            FieldMeta::new("Secret").ignored(),
            FieldMeta::new("Email").column("mail"),
        ];

        fn value_of(&self, _field: &str) -> Option<SqlValue> {
            None
        }
    }

    #[test]
    fn test_snake_case_policy() {
        assert_eq!(SnakeCase.convert("UserId"), "user_id");
        assert_eq!(SnakeCase.convert("Number"), "number");
        assert_eq!(SnakeCase.convert("CreatedAt"), "created_at");
        assert_eq!(SnakeCase.convert("user_id"), "user_id");
    }

    #[test]
    fn test_resolution_respects_metadata() {
        let resolver = ColumnResolver::default();
        let fields = Account::FIELDS;

        assert_eq!(resolver.resolve(&fields[0], false), Resolution::Column("id".into()));
        assert_eq!(resolver.resolve(&fields[0], true), Resolution::DefaultGenerated);
        assert_eq!(resolver.resolve(&fields[2], false), Resolution::Ignored);
        assert_eq!(resolver.resolve(&fields[3], false), Resolution::Column("mail".into()));
    }

    #[test]
    fn test_columns_for_insert_and_select() {
        let resolver = ColumnResolver::new(Verbatim);

        let select: Vec<String> = resolver
            .columns::<Account>(false)
            .into_iter()
            .map(|(_, column)| column)
            .collect();
        assert_eq!(select, vec!["Id", "DisplayName", "mail"]);

        let insert: Vec<String> = resolver
            .columns::<Account>(true)
            .into_iter()
            .map(|(_, column)| column)
            .collect();
        assert_eq!(insert, vec!["DisplayName", "mail"]);
    }
}
