//! Translation of typed predicates into SQL `WHERE` clause text.
//!
//! The output is the left-to-right concatenation of the tree's tokens separated by
//! single spaces. No parentheses are emitted: grouping is whatever the tree's nesting
//! already encodes.

use std::fmt;
use std::marker::PhantomData;
use thiserror::Error;

use super::naming::ColumnResolver;
use super::predicate::{BinaryOp, Expr, Predicate, UnaryOp};
use super::value::ValueFormatter;
use super::{Record, SqlValue};

/// Why a predicate could not be turned into SQL.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TranslationError {
    #[error("predicate root must be a binary expression, found a {found}")]
    NotBinary { found: &'static str },

    #[error("operator {0:?} has no SQL form")]
    UnsupportedOperator(BinaryOp),

    #[error("field `{field}` of {record} is ignored by storage")]
    IgnoredField {
        record: &'static str,
        field: &'static str,
    },

    #[error("{record} has no field named `{field}`")]
    UnknownField {
        record: &'static str,
        field: &'static str,
    },

    #[error("unsupported expression: {0}")]
    UnsupportedShape(String),

    #[error("could not evaluate `{name}`: {reason}")]
    Evaluation { name: String, reason: String },

    #[error("converter registered for {type_name} cannot convert `{value}`")]
    Converter {
        type_name: &'static str,
        value: String,
    },
}

/// The naming and value formatting policies a translation runs under.
#[derive(Debug, Clone, Default)]
pub struct DbService {
    resolver: ColumnResolver,
    formatter: ValueFormatter,
}

impl DbService {
    pub fn new(resolver: ColumnResolver, formatter: ValueFormatter) -> Self {
        Self {
            resolver,
            formatter,
        }
    }

    pub fn resolver(&self) -> &ColumnResolver {
        &self.resolver
    }

    pub fn formatter(&self) -> &ValueFormatter {
        &self.formatter
    }
}

/// A translated predicate.
///
/// Built inline with [`Constraint::new`], every literal is embedded in the text. Built
/// with [`Constraint::bound`], literals become `$n` placeholders and their values are
/// kept in [`Constraint::params`] in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    sql: String,
    params: Vec<SqlValue>,
}

impl Constraint {
    pub fn new<T: Record>(
        predicate: &Predicate<T>,
        service: &DbService,
    ) -> Result<Self, TranslationError> {
        Translator::<T>::run(predicate, service, None)
    }

    /// Parameterized translation with placeholders starting at `$1`.
    pub fn bound<T: Record>(
        predicate: &Predicate<T>,
        service: &DbService,
    ) -> Result<Self, TranslationError> {
        Self::bound_from(predicate, service, 1)
    }

    /// Parameterized translation with placeholders starting at `$first`, for clauses
    /// appended after other bound values.
    pub fn bound_from<T: Record>(
        predicate: &Predicate<T>,
        service: &DbService,
        first: usize,
    ) -> Result<Self, TranslationError> {
        Translator::<T>::run(predicate, service, Some(first))
    }

    pub fn to_sql_string(&self) -> String {
        self.sql.clone()
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    pub fn into_parts(self) -> (String, Vec<SqlValue>) {
        (self.sql, self.params)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

struct Translator<'a, T> {
    service: &'a DbService,
    sql: String,
    params: Vec<SqlValue>,
    next_placeholder: Option<usize>,
    _record: PhantomData<fn() -> T>,
}

impl<'a, T: Record> Translator<'a, T> {
    fn run(
        predicate: &Predicate<T>,
        service: &'a DbService,
        first_placeholder: Option<usize>,
    ) -> Result<Constraint, TranslationError> {
        let expr = predicate.expr();
        if !matches!(expr, Expr::Binary { .. }) {
            return Err(TranslationError::NotBinary { found: expr.kind() });
        }

        let resolved = expr.clone().resolve()?;
        let mut translator = Translator::<T> {
            service,
            sql: String::new(),
            params: Vec::new(),
            next_placeholder: first_placeholder,
            _record: PhantomData,
        };
        translator.operand(&resolved)?;

        Ok(Constraint {
            sql: translator.sql,
            params: translator.params,
        })
    }

    fn binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<(), TranslationError> {
        let token = op.token().ok_or(TranslationError::UnsupportedOperator(op))?;
        self.operand(left)?;
        self.sql.push(' ');
        self.sql.push_str(token);
        self.sql.push(' ');
        self.operand(right)
    }

    fn operand(&mut self, expr: &Expr) -> Result<(), TranslationError> {
        match expr {
            Expr::Binary { op, left, right } => self.binary(*op, left, right),
            Expr::Unary {
                op: UnaryOp::Convert,
                operand,
            } => self.operand(operand),
            Expr::Unary { op, .. } => Err(TranslationError::UnsupportedShape(format!(
                "unary {:?}",
                op
            ))),
            Expr::Field(name) => self.field(name),
            Expr::Constant(value) => self.literal(value),
            Expr::Captured { .. } | Expr::Call { .. } => Err(TranslationError::UnsupportedShape(
                format!("unresolved {}", expr.kind()),
            )),
        }
    }

    fn field(&mut self, name: &'static str) -> Result<(), TranslationError> {
        let record = std::any::type_name::<T>();
        let meta = T::field_meta(name).ok_or(TranslationError::UnknownField {
            record,
            field: name,
        })?;

        if meta.ignored {
            return Err(TranslationError::IgnoredField {
                record,
                field: name,
            });
        }
        self.sql.push_str(&self.service.resolver().column_name(meta));
        Ok(())
    }

    fn literal(&mut self, value: &SqlValue) -> Result<(), TranslationError> {
        if value.is_null() {
            self.rewrite_null_comparison();
            self.sql.push_str("null");
            return Ok(());
        }

        let formatter = self.service.formatter();
        match self.next_placeholder.as_mut() {
            Some(next) if !formatter.has_converter(value) => {
                self.sql.push('$');
                self.sql.push_str(&next.to_string());
                *next += 1;
                self.params.push(value.clone());
            }
            _ => {
                let text = formatter.format(value)?;
                self.sql.push_str(&text);
            }
        }
        Ok(())
    }

    /// `x = null` becomes `x is null` and `x != null` becomes `x is not null`.
    fn rewrite_null_comparison(&mut self) {
        if self.sql.ends_with(" = ") {
            self.sql.truncate(self.sql.len() - " = ".len());
            self.sql.push_str(" is ");
        } else if self.sql.ends_with(" != ") {
            self.sql.truncate(self.sql.len() - " != ".len());
            self.sql.push_str(" is not ");
        }
    }
}
