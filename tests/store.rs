//! Database-backed checks of the score write path. They need a Postgres
//! server: run with `DATABASE_URL=... cargo test -- --ignored`.

use skillmatrix_backend::errors::AppError;
use skillmatrix_backend::models::assessment::ScoreField;
use skillmatrix_backend::services::{analytics, assessment, history};
use sqlx::PgPool;

async fn insert_department(pool: &PgPool, name: &str) -> i64 {
    sqlx::query_scalar("INSERT INTO departments (name) VALUES ($1) RETURNING id")
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn insert_user(pool: &PgPool, login: &str, role: &str, department_id: Option<i64>) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO users (login, password_hash, role, full_name, department_id) \
         VALUES ($1, 'x', $2, $1, $3) RETURNING id",
    )
    .bind(login)
    .bind(role)
    .bind(department_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn insert_skill(pool: &PgPool, name: &str) -> i64 {
    sqlx::query_scalar("INSERT INTO skills (name, category) VALUES ($1, 'Programming Languages') RETURNING id")
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn score_of(pool: &PgPool, user_id: i64, skill_id: i64, field: ScoreField) -> Option<i32> {
    assessment::find(pool, user_id, skill_id)
        .await
        .unwrap()
        .and_then(|row| row.score(field))
        .map(|s| s.value())
}

/// Installs `trigger` on top of a function that rejects every write it sees.
async fn reject_writes(pool: &PgPool, trigger: &str) {
    sqlx::query(
        "CREATE FUNCTION reject_write() RETURNS trigger LANGUAGE plpgsql AS \
         $$ BEGIN RAISE EXCEPTION 'write rejected'; END $$",
    )
    .execute(pool)
    .await
    .unwrap();
    sqlx::query(trigger).execute(pool).await.unwrap();
}

async fn history_rows(pool: &PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM assessment_history")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn self_then_manager_assessment_scenario(pool: PgPool) {
    let department = insert_department(&pool, "Test Department").await;
    let employee = insert_user(&pool, "employee1", "employee", Some(department)).await;
    let manager = insert_user(&pool, "manager1", "manager", Some(department)).await;
    let python = insert_skill(&pool, "Python").await;

    let first = assessment::upsert(&pool, employee, employee, python, ScoreField::SelfScore, Some(4))
        .await
        .unwrap();
    let first_row = first.assessment.unwrap();
    assert_eq!(first_row.self_score.map(|s| s.value()), Some(4));
    assert_eq!(first_row.manager_score, None);
    assert_eq!(first.final_score.map(|s| s.value()), Some(4));

    let second = assessment::upsert(&pool, manager, employee, python, ScoreField::ManagerScore, Some(5))
        .await
        .unwrap();
    let second_row = second.assessment.unwrap();
    assert_eq!(second_row.id, first_row.id);
    assert_eq!(second_row.self_score.map(|s| s.value()), Some(4));
    assert_eq!(second.final_score.map(|s| s.value()), Some(5));

    let entries = history::list_for_user(&pool, employee, Some(python)).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].field_changed, ScoreField::ManagerScore);
    assert_eq!(entries[0].changed_by, Some(manager));
    assert_eq!(entries[1].field_changed, ScoreField::SelfScore);
    assert_eq!(entries[1].old_value, None);
    assert_eq!(entries[1].changed_by, Some(employee));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn invalid_score_leaves_stored_value(pool: PgPool) {
    let employee = insert_user(&pool, "employee1", "employee", None).await;
    let sql = insert_skill(&pool, "SQL").await;

    assessment::upsert(&pool, employee, employee, sql, ScoreField::SelfScore, Some(3)).await.unwrap();
    let err = assessment::upsert(&pool, employee, employee, sql, ScoreField::SelfScore, Some(6))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let stored = assessment::find(&pool, employee, sql).await.unwrap().unwrap();
    assert_eq!(stored.self_score.map(|s| s.value()), Some(3));
    assert_eq!(history_rows(&pool).await, 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn each_transition_adds_one_history_row(pool: PgPool) {
    let employee = insert_user(&pool, "employee1", "employee", None).await;
    let go = insert_skill(&pool, "Go").await;

    assessment::upsert(&pool, employee, employee, go, ScoreField::SelfScore, Some(2)).await.unwrap();
    assessment::upsert(&pool, employee, employee, go, ScoreField::SelfScore, Some(3)).await.unwrap();
    assert_eq!(history_rows(&pool).await, 2);

    let entries = history::list_for_user(&pool, employee, None).await.unwrap();
    assert_eq!(entries[0].old_value.map(|s| s.value()), Some(2));
    assert_eq!(entries[0].new_value.map(|s| s.value()), Some(3));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn unknown_skill_is_not_found(pool: PgPool) {
    let employee = insert_user(&pool, "employee1", "employee", None).await;
    let err = assessment::upsert(&pool, employee, employee, 999, ScoreField::SelfScore, Some(3))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn department_without_assessments_averages_zero(pool: PgPool) {
    let department = insert_department(&pool, "Support").await;
    insert_user(&pool, "a", "employee", Some(department)).await;
    insert_user(&pool, "b", "employee", Some(department)).await;

    let summary = analytics::load_department_summary(&pool).await.unwrap();
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].count, 2);
    assert_eq!(summary[0].avg_score, 0.0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn deleting_a_skill_cascades_to_assessments_and_history(pool: PgPool) {
    let employee = insert_user(&pool, "employee1", "employee", None).await;
    let rust = insert_skill(&pool, "Rust").await;
    assessment::upsert(&pool, employee, employee, rust, ScoreField::SelfScore, Some(5)).await.unwrap();

    sqlx::query("DELETE FROM skills WHERE id = $1").bind(rust).execute(&pool).await.unwrap();

    assert!(assessment::find(&pool, employee, rust).await.unwrap().is_none());
    assert_eq!(history_rows(&pool).await, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn deleted_actor_cannot_write(pool: PgPool) {
    let department = insert_department(&pool, "Sales").await;
    let employee = insert_user(&pool, "employee1", "employee", Some(department)).await;
    let manager = insert_user(&pool, "manager1", "manager", Some(department)).await;
    let skill = insert_skill(&pool, "Negotiation").await;

    sqlx::query("DELETE FROM users WHERE id = $1").bind(manager).execute(&pool).await.unwrap();

    let err = assessment::upsert(&pool, manager, employee, skill, ScoreField::ManagerScore, Some(5))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));
    assert!(assessment::find(&pool, employee, skill).await.unwrap().is_none());
    assert_eq!(history_rows(&pool).await, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn clearing_an_unassessed_pair_creates_nothing(pool: PgPool) {
    let employee = insert_user(&pool, "employee1", "employee", None).await;
    let skill = insert_skill(&pool, "Docker").await;

    let outcome = assessment::upsert(&pool, employee, employee, skill, ScoreField::SelfScore, None)
        .await
        .unwrap();
    assert!(outcome.assessment.is_none());
    assert_eq!(outcome.final_score, None);
    assert!(outcome.change.is_none());
    assert!(assessment::find(&pool, employee, skill).await.unwrap().is_none());
    assert_eq!(history_rows(&pool).await, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn failed_history_write_keeps_score_change(pool: PgPool) {
    let employee = insert_user(&pool, "employee1", "employee", None).await;
    let skill = insert_skill(&pool, "Kotlin").await;
    reject_writes(
        &pool,
        "CREATE TRIGGER reject_history BEFORE INSERT ON assessment_history \
         FOR EACH ROW EXECUTE FUNCTION reject_write()",
    )
    .await;

    let outcome = assessment::upsert(&pool, employee, employee, skill, ScoreField::SelfScore, Some(3))
        .await
        .unwrap();
    assert!(!outcome.history_recorded);
    assert!(outcome.change.is_some());
    assert_eq!(outcome.final_score.map(|s| s.value()), Some(3));
    assert_eq!(score_of(&pool, employee, skill, ScoreField::SelfScore).await, Some(3));
    assert_eq!(history_rows(&pool).await, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn failed_score_write_discards_pending_history(pool: PgPool) {
    let employee = insert_user(&pool, "employee1", "employee", None).await;
    let skill = insert_skill(&pool, "Scala").await;
    assessment::upsert(&pool, employee, employee, skill, ScoreField::SelfScore, Some(2)).await.unwrap();

    // Fails at commit, after the history row has been written.
    reject_writes(
        &pool,
        "CREATE CONSTRAINT TRIGGER reject_score_update AFTER UPDATE ON skill_assessments \
         DEFERRABLE INITIALLY DEFERRED FOR EACH ROW EXECUTE FUNCTION reject_write()",
    )
    .await;

    let err = assessment::upsert(&pool, employee, employee, skill, ScoreField::SelfScore, Some(4))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Persistence(_)));
    assert_eq!(score_of(&pool, employee, skill, ScoreField::SelfScore).await, Some(2));
    assert_eq!(history_rows(&pool).await, 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn unique_violation_maps_to_conflict(pool: PgPool) {
    insert_user(&pool, "jdoe", "employee", None).await;

    let err = sqlx::query(
        "INSERT INTO users (login, password_hash, role, full_name) VALUES ('JDoe', 'x', 'employee', 'Other')",
    )
    .execute(&pool)
    .await
    .unwrap_err();
    assert!(matches!(AppError::from(err), AppError::Conflict(_)));
}
