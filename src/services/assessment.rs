//! The score write path. A score change and its audit row are written in
//! one transaction; the audit insert sits in a savepoint so that a failed
//! history write is logged and dropped without undoing the score.

use chrono::Utc;
use serde::Serialize;
use sqlx::{Acquire, PgPool, Postgres, Transaction};
use crate::errors::AppError;
use crate::models::assessment::{Score, ScoreField, SkillAssessment};
use crate::services::history::{self, NewHistoryEntry};

const ASSESSMENT_COLUMNS: &str =
    "id, user_id, skill_id, self_score, manager_score, assessed_at, updated_at";

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreChange {
    pub field: ScoreField,
    pub old_value: Option<Score>,
    pub new_value: Option<Score>,
}

#[derive(Serialize, Debug, Clone)]
pub struct UpsertOutcome {
    /// `None` only when a score was cleared on a pair never assessed.
    pub assessment: Option<SkillAssessment>,
    pub final_score: Option<Score>,
    pub change: Option<ScoreChange>,
    pub history_recorded: bool,
}

pub fn parse_score(value: Option<i32>) -> Result<Option<Score>, AppError> {
    value.map(Score::try_from).transpose().map_err(AppError::Validation)
}

/// Returns the change that writing `value` into `field` would make, or
/// `None` when the field already holds that value.
pub fn plan_change(
    current: &SkillAssessment,
    field: ScoreField,
    value: Option<Score>,
) -> Option<ScoreChange> {
    let old_value = current.score(field);
    if old_value == value {
        return None;
    }
    Some(ScoreChange { field, old_value, new_value: value })
}

async fn ensure_exists(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
    id: i64,
    message: &str,
) -> Result<(), AppError> {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1)", table);
    let exists: bool = sqlx::query_scalar(&sql)
        .bind(id)
        .fetch_one(&mut **tx)
        .await?;
    if exists {
        Ok(())
    } else {
        Err(AppError::NotFound(message.to_string()))
    }
}

/// Locks the acting user's row for the rest of the transaction so the
/// author of the history entry cannot disappear before it is written.
async fn lock_actor(tx: &mut Transaction<'_, Postgres>, changed_by: i64) -> Result<(), AppError> {
    let actor: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1 FOR KEY SHARE")
        .bind(changed_by)
        .fetch_optional(&mut **tx)
        .await?;
    actor
        .map(|_| ())
        .ok_or_else(|| AppError::Unauthorized("User no longer exists".to_string()))
}

async fn record_fail_open(
    tx: &mut Transaction<'_, Postgres>,
    entry: &NewHistoryEntry,
) -> Result<bool, sqlx::Error> {
    let mut savepoint = Acquire::begin(&mut *tx).await?;
    match history::record(&mut savepoint, entry).await {
        Ok(_) => {
            savepoint.commit().await?;
            Ok(true)
        }
        Err(err) => {
            log::warn!(
                "History write failed for assessment {} ({}): {:?}",
                entry.assessment_id, entry.field, err
            );
            savepoint.rollback().await?;
            Ok(false)
        }
    }
}

/// Sets `field` of the (user, skill) assessment to `value`, creating the row
/// on first assessment. `changed_by` is the acting user recorded in history.
pub async fn upsert(
    pool: &PgPool,
    changed_by: i64,
    user_id: i64,
    skill_id: i64,
    field: ScoreField,
    value: Option<i32>,
) -> Result<UpsertOutcome, AppError> {
    let value = parse_score(value)?;

    let mut tx = pool.begin().await?;
    lock_actor(&mut tx, changed_by).await?;
    ensure_exists(&mut tx, "users", user_id, "User not found").await?;
    ensure_exists(&mut tx, "skills", skill_id, "Skill not found").await?;

    let now = Utc::now();
    if value.is_some() {
        sqlx::query(
            "INSERT INTO skill_assessments (user_id, skill_id, assessed_at, updated_at) \
             VALUES ($1, $2, $3, $3) ON CONFLICT (user_id, skill_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(skill_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    let select = format!(
        "SELECT {} FROM skill_assessments WHERE user_id = $1 AND skill_id = $2 FOR UPDATE",
        ASSESSMENT_COLUMNS
    );
    let current = sqlx::query_as::<_, SkillAssessment>(&select)
        .bind(user_id)
        .bind(skill_id)
        .fetch_optional(&mut *tx)
        .await?;

    // Clearing a score that was never set
    let Some(mut assessment) = current else {
        tx.commit().await?;
        return Ok(UpsertOutcome {
            assessment: None,
            final_score: None,
            change: None,
            history_recorded: false,
        });
    };

    let change = plan_change(&assessment, field, value);
    let mut history_recorded = false;

    if let Some(change) = change {
        let update = format!(
            "UPDATE skill_assessments SET {} = $1, updated_at = $2 WHERE id = $3 RETURNING {}",
            field.column(),
            ASSESSMENT_COLUMNS
        );
        assessment = sqlx::query_as::<_, SkillAssessment>(&update)
            .bind(change.new_value)
            .bind(now)
            .bind(assessment.id)
            .fetch_one(&mut *tx)
            .await?;

        let entry = NewHistoryEntry {
            assessment_id: assessment.id,
            field,
            old_value: change.old_value,
            new_value: change.new_value,
            changed_by,
        };
        history_recorded = record_fail_open(&mut tx, &entry).await?;
    }

    tx.commit().await?;

    if let Some(change) = &change {
        log::info!(
            "User {} set {} of user {} skill {} from {:?} to {:?}",
            changed_by, field, user_id, skill_id,
            change.old_value.map(Score::value), change.new_value.map(Score::value)
        );
    }

    Ok(UpsertOutcome {
        final_score: assessment.final_score(),
        assessment: Some(assessment),
        change,
        history_recorded,
    })
}

pub async fn find(
    pool: &PgPool,
    user_id: i64,
    skill_id: i64,
) -> Result<Option<SkillAssessment>, AppError> {
    let select = format!(
        "SELECT {} FROM skill_assessments WHERE user_id = $1 AND skill_id = $2",
        ASSESSMENT_COLUMNS
    );
    let assessment = sqlx::query_as::<_, SkillAssessment>(&select)
        .bind(user_id)
        .bind(skill_id)
        .fetch_optional(pool)
        .await?;
    Ok(assessment)
}
