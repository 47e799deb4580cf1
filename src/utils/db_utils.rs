use crate::error::ApiError;
use sqlx::PgPool;
use uuid::Uuid;

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug)]
pub enum SqlValue {
    String(String),
    I64(i64),
    F64(f64),
    Bool(bool),
    Null,
}

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// ===============================
/// Build dynamic UPDATE SQL
/// ===============================
///
/// `fields` comes from a typed patch struct: callers enumerate only the
/// columns whose `Option` was `Some`, never raw client JSON.
pub fn build_update_sql(
    table: &str,
    fields: Vec<(&'static str, SqlValue)>,
    id_column: &str,
) -> Result<SqlUpdate, ApiError> {
    if fields.is_empty() {
        return Err(ApiError::Validation(
            "No fields provided for update".to_string(),
        ));
    }

    let set_clause = fields
        .iter()
        .enumerate()
        .map(|(i, (column, _))| format!("{} = ${}", column, i + 1))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ${}",
        table,
        set_clause,
        id_column,
        fields.len() + 1
    );

    let values = fields.into_iter().map(|(_, value)| value).collect();

    Ok(SqlUpdate { sql, values })
}

/// ===============================
/// Execute the update
/// ===============================
pub async fn execute_update(
    pool: &PgPool,
    update: SqlUpdate,
    id: Uuid,
) -> Result<u64, sqlx::Error> {
    let mut query = sqlx::query(&update.sql);

    for value in update.values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::F64(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }
    query = query.bind(id);

    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_numbered_placeholders() {
        let update = build_update_sql(
            "users",
            vec![
                ("name", SqlValue::String("Alice".to_string())),
                ("active", SqlValue::Bool(false)),
            ],
            "id",
        )
        .unwrap();

        assert_eq!(update.sql, "UPDATE users SET name = $1, active = $2 WHERE id = $3");
        assert_eq!(update.values.len(), 2);
    }

    #[test]
    fn empty_patch_is_a_validation_error() {
        let err = build_update_sql("users", Vec::new(), "id").unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }
}
