use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use tasklist::db::predicate::functions;
use tasklist::db::value::StringEnumConverter;
use tasklist::db::{
    BinaryOp, ColumnResolver, Constraint, DbService, Expr, Predicate, SqlValue, TranslationError,
    ValueFormatter, Verbatim,
};
use tasklist::models::{Priority, TodoTask, User};

#[derive(Debug, Clone)]
struct Entry {
    number: Option<i32>,
    text: String,
}

tasklist::record! {
    Entry in "entries" {
        NUMBER: number,
        TEXT: text,
    }
}

fn sql<T: tasklist::db::Record>(predicate: Predicate<T>) -> String {
    Constraint::new(&predicate, &DbService::default())
        .unwrap()
        .to_sql_string()
}

#[test]
fn test_mixed_and_or_chain() {
    let predicate = Entry::NUMBER
        .eq(69)
        .and(Entry::TEXT.ne("text"))
        .or(Entry::TEXT.eq("Just bee yourself!").and(Entry::NUMBER.ge(85)));

    assert_eq!(
        sql(predicate),
        "number = 69 AND text != 'text' OR text = 'Just bee yourself!' AND number >= 85"
    );
}

#[test]
fn test_nullable_field_against_null() {
    assert_eq!(sql(Entry::NUMBER.eq(None::<i32>)), "number is null");
    assert_eq!(sql(Entry::TEXT.ne(None::<String>)), "text is not null");
}

#[test]
fn test_captured_task_members() {
    let title = "AAAAAAAAAAAAAAAA!!!!!!!!";
    let mut existing = TodoTask::new("Tit", None, None);
    existing.id = 5;
    existing.user_id = 1;

    let predicate = TodoTask::ID
        .eq(Expr::member(&existing, TodoTask::ID))
        .and(TodoTask::USER_ID.eq(Expr::member(&existing, TodoTask::USER_ID)))
        .or(TodoTask::TITLE.eq(title));

    assert_eq!(
        sql(predicate),
        format!("id = 5 AND user_id = 1 OR title = '{}'", title)
    );
}

#[test]
fn test_captured_value_seen_at_translation_time() {
    let limit = std::sync::Arc::new(std::sync::atomic::AtomicI64::new(1));
    let reader = limit.clone();
    let predicate = TodoTask::ID.gt(Expr::captured("limit", move || {
        reader.load(std::sync::atomic::Ordering::SeqCst).into()
    }));

    limit.store(10, std::sync::atomic::Ordering::SeqCst);
    assert_eq!(sql(predicate), "id > 10");
}

#[test]
fn test_enum_timestamp_and_call_literals() {
    let at = Utc.with_ymd_and_hms(2023, 12, 24, 18, 0, 0).unwrap();
    let predicate = TodoTask::PRIORITY
        .eq(Priority::A)
        .and(TodoTask::CREATED_AT.lt(at))
        .and(TodoTask::USER_ID.le(Expr::call(
            "min",
            functions::min,
            vec![Expr::constant(4), Expr::constant(9)],
        )));

    assert_eq!(
        sql(predicate),
        "priority = 'A' AND created_at < '2023-12-24 18:00:00.000 +00:00' AND user_id <= 4"
    );
}

#[test]
fn test_non_finite_float_literals() {
    assert_eq!(sql(TodoTask::ID.gt(f64::NAN)), "id > 'NaN'");
    assert_eq!(
        sql(TodoTask::ID.lt(f64::NEG_INFINITY)),
        "id < '-Infinity'"
    );
}

#[test]
fn test_custom_policies() {
    let service = DbService::new(
        ColumnResolver::new(Verbatim),
        ValueFormatter::new().with_converter("Priority", StringEnumConverter),
    );
    let predicate = TodoTask::COMPLETED_AT
        .ne(None::<chrono::DateTime<Utc>>)
        .and(TodoTask::PRIORITY.eq(Priority::C));

    let constraint = Constraint::bound(&predicate, &service).unwrap();
    assert_eq!(
        constraint.to_sql_string(),
        "completed_at is not null AND priority = 'C'"
    );
    assert!(constraint.params().is_empty());
}

#[test]
fn test_ignored_field_reports_structural_error() {
    let predicate = User::USERNAME.eq("alice").or(User::TOKEN.eq("abc"));
    match Constraint::new(&predicate, &DbService::default()) {
        Err(TranslationError::IgnoredField { field, .. }) => assert_eq!(field, "token"),
        other => panic!("Expected ignored field error, got {:?}", other),
    }
}

#[test]
fn test_arithmetic_root_is_unsupported() {
    let predicate =
        Predicate::<TodoTask>::from_expr(Expr::binary(BinaryOp::Modulo, TodoTask::ID, 2));
    assert_eq!(
        Constraint::new(&predicate, &DbService::default()),
        Err(TranslationError::UnsupportedOperator(BinaryOp::Modulo))
    );
}

#[test]
fn test_bound_parameters_follow_placeholder_order() {
    let predicate = User::NORMALIZED_USERNAME
        .eq(User::normalize("alice"))
        .and(User::ID.ne(7));
    let (sql, params) = Constraint::bound(&predicate, &DbService::default())
        .unwrap()
        .into_parts();

    assert_eq!(sql, "normalized_username = $1 AND id != $2");
    assert_eq!(params, vec![SqlValue::Text("ALICE".into()), SqlValue::Int(7)]);
}
