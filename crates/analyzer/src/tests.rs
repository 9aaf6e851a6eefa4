use super::*;
use catalog::{Catalog, Column, IndexKind};
use parser::parse_sql;
use pretty_assertions::assert_eq;
use types::SqlType;

fn sample_catalog() -> Catalog {
    let mut catalog = Catalog::new();
    catalog
        .create_table(
            "users",
            vec![
                Column::new("id", SqlType::Int),
                Column::new("name", SqlType::Text),
                Column::new("age", SqlType::Int),
            ],
        )
        .unwrap();
    catalog
        .create_table(
            "orders",
            vec![
                Column::new("id", SqlType::Int),
                Column::new("user_id", SqlType::Int),
                Column::new("total", SqlType::Int),
            ],
        )
        .unwrap();
    catalog
}

fn select(catalog: &Catalog, sql: &str) -> DbResult<()> {
    let stmt = parse_sql(sql).unwrap().remove(0);
    analyze(&stmt, catalog)
}

#[test]
fn plain_select_passes() {
    let catalog = sample_catalog();
    assert!(select(&catalog, "SELECT id, name FROM users").is_ok());
}

#[test]
fn non_select_statements_pass_through_untouched() {
    let catalog = sample_catalog();
    let stmt = parse_sql("INSERT INTO users VALUES (1, 'Alice', 30)")
        .unwrap()
        .remove(0);
    assert!(analyze(&stmt, &catalog).is_ok());
}

#[test]
fn unknown_table_is_rejected() {
    let catalog = sample_catalog();
    let err = select(&catalog, "SELECT * FROM nonexistent").unwrap_err();
    assert!(err.to_string().contains("unknown table"));
}

#[test]
fn qualified_column_on_unknown_alias_is_rejected() {
    let catalog = sample_catalog();
    let err = select(&catalog, "SELECT * FROM users WHERE ghost.id = 1").unwrap_err();
    assert!(matches!(err, DbError::TableNotFound(_)));
}

#[test]
fn unqualified_column_ambiguous_across_join_is_rejected() {
    let catalog = sample_catalog();
    let err = select(
        &catalog,
        "SELECT * FROM users u JOIN orders o ON u.id = o.user_id WHERE id = 1",
    )
    .unwrap_err();
    assert!(matches!(err, DbError::AmbiguousColumn(ref c) if c == "id"));
}

#[test]
fn qualified_column_in_join_condition_resolves() {
    let catalog = sample_catalog();
    assert!(select(
        &catalog,
        "SELECT u.id, o.total FROM users u JOIN orders o ON u.id = o.user_id",
    )
    .is_ok());
}

#[test]
fn having_without_group_by_or_aggregate_is_rejected() {
    let catalog = sample_catalog();
    let err = select(&catalog, "SELECT id FROM users HAVING age > 10").unwrap_err();
    assert!(matches!(err, DbError::InvalidAggregate(_)));
}

#[test]
fn having_with_group_by_is_accepted() {
    let catalog = sample_catalog();
    assert!(select(
        &catalog,
        "SELECT age, COUNT(*) FROM users GROUP BY age HAVING COUNT(*) > 1",
    )
    .is_ok());
}

#[test]
fn having_with_bare_aggregate_and_no_group_by_is_accepted() {
    let catalog = sample_catalog();
    assert!(select(&catalog, "SELECT COUNT(*) FROM users HAVING COUNT(*) > 1").is_ok());
}

#[test]
fn limit_without_order_by_is_rejected() {
    let catalog = sample_catalog();
    let err = select(&catalog, "SELECT * FROM users LIMIT 10").unwrap_err();
    assert!(err.to_string().contains("LIMIT requires an ORDER BY"));
}

#[test]
fn limit_with_order_by_is_accepted() {
    let catalog = sample_catalog();
    assert!(select(&catalog, "SELECT * FROM users ORDER BY id LIMIT 10").is_ok());
}

#[test]
fn non_grouped_column_outside_aggregate_is_rejected() {
    let catalog = sample_catalog();
    let err = select(&catalog, "SELECT name, COUNT(*) FROM users GROUP BY age").unwrap_err();
    assert!(matches!(err, DbError::InvalidAggregate(ref m) if m.contains("name")));
}

#[test]
fn coerce_numeric_promotes_int_to_float() {
    assert_eq!(
        coerce_numeric(&Value::Int(3), &SqlType::Float).unwrap(),
        Value::Float(3.0)
    );
}

#[test]
fn coerce_numeric_truncates_float_to_int() {
    assert_eq!(
        coerce_numeric(&Value::Float(3.7), &SqlType::Int).unwrap(),
        Value::Int(3)
    );
}

#[test]
fn coerce_numeric_passes_null_through() {
    assert_eq!(
        coerce_numeric(&Value::Null, &SqlType::Int).unwrap(),
        Value::Null
    );
}

#[test]
fn coerce_numeric_rejects_incompatible_type() {
    let err = coerce_numeric(&Value::Bool(true), &SqlType::Int).unwrap_err();
    assert!(matches!(err, DbError::IncompatibleType(_)));
}

#[test]
fn coerce_numeric_validates_and_tags_datetime_text() {
    let value = coerce_numeric(
        &Value::Text("2024-01-15 10:30:00".into()),
        &SqlType::Datetime,
    )
    .unwrap();
    assert_eq!(value, Value::Datetime("2024-01-15 10:30:00".into()));
}

#[test]
fn coerce_numeric_rejects_malformed_datetime_text() {
    let err = coerce_numeric(&Value::Text("not-a-date".into()), &SqlType::Datetime).unwrap_err();
    assert!(matches!(err, DbError::InvalidDatetimeFormat(_)));
}

#[test]
fn validate_datetime_format_accepts_well_formed_timestamp() {
    assert!(validate_datetime_format("2024-01-15 10:30:00").is_ok());
}

#[test]
fn validate_datetime_format_rejects_wrong_length() {
    assert!(validate_datetime_format("2024-01-15").is_err());
}

#[test]
fn validate_datetime_format_rejects_non_digit_fields() {
    assert!(validate_datetime_format("20ab-01-15 10:30:00").is_err());
}
