use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use crate::errors::AppError;
use crate::models::assessment::{AssessmentHistory, Score, ScoreField};

#[derive(Debug, Clone, PartialEq)]
pub struct NewHistoryEntry {
    pub assessment_id: i64,
    pub field: ScoreField,
    pub old_value: Option<Score>,
    pub new_value: Option<Score>,
    pub changed_by: i64,
}

/// A history row joined with the names a reader needs.
#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct HistoryView {
    pub id: i64,
    pub assessment_id: i64,
    pub skill_id: i64,
    pub skill_name: String,
    #[sqlx(try_from = "String")]
    pub field_changed: ScoreField,
    pub old_value: Option<Score>,
    pub new_value: Option<Score>,
    pub changed_by: Option<i64>,
    pub changed_by_name: Option<String>,
    pub changed_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Appends one audit row. Runs on the caller's connection so it joins the
/// caller's transaction.
pub async fn record(
    conn: &mut PgConnection,
    entry: &NewHistoryEntry,
) -> Result<AssessmentHistory, sqlx::Error> {
    sqlx::query_as::<_, AssessmentHistory>(
        r#"
        INSERT INTO assessment_history
            (assessment_id, field_changed, old_value, new_value, changed_by, changed_at, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, assessment_id, field_changed, old_value, new_value, changed_by, changed_at, notes
        "#,
    )
    .bind(entry.assessment_id)
    .bind(entry.field.column())
    .bind(entry.old_value)
    .bind(entry.new_value)
    .bind(entry.changed_by)
    .bind(Utc::now())
    .bind(entry.field.change_note())
    .fetch_one(conn)
    .await
}

pub async fn list_for_user(
    pool: &PgPool,
    user_id: i64,
    skill_id: Option<i64>,
) -> Result<Vec<HistoryView>, AppError> {
    let rows = sqlx::query_as::<_, HistoryView>(
        r#"
        SELECT
            h.id,
            h.assessment_id,
            a.skill_id,
            s.name AS skill_name,
            h.field_changed,
            h.old_value,
            h.new_value,
            h.changed_by,
            u.full_name AS changed_by_name,
            h.changed_at,
            h.notes
        FROM assessment_history h
        JOIN skill_assessments a ON a.id = h.assessment_id
        JOIN skills s ON s.id = a.skill_id
        LEFT JOIN users u ON u.id = h.changed_by
        WHERE a.user_id = $1
          AND ($2::BIGINT IS NULL OR a.skill_id = $2)
        ORDER BY h.changed_at DESC, h.id DESC
        "#,
    )
    .bind(user_id)
    .bind(skill_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
