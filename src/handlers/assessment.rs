use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use validator::Validate;
use crate::errors::AppError;
use crate::models::assessment::ScoreField;
use crate::models::principal::Principal;
use crate::models::user::UserScope;
use crate::services::{access, assessment, history};
use crate::services::assessment::UpsertOutcome;
use crate::utils::validation::validate_payload;

#[derive(Deserialize, Validate)]
pub struct SelfAssessmentRequest {
    skill_id: i64,
    #[validate(range(min = 1, max = 5, message = "Score must be between 1 and 5"))]
    score: i32,
}

#[derive(Deserialize, Validate)]
pub struct ManagerAssessmentRequest {
    employee_id: i64,
    skill_id: i64,
    #[validate(range(min = 1, max = 5, message = "Score must be between 1 and 5"))]
    manager_score: i32,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    skill_id: Option<i64>,
}

fn saved(outcome: UpsertOutcome) -> HttpResponse {
    let message = if outcome.change.is_some() {
        "Assessment saved"
    } else {
        "Assessment unchanged"
    };
    HttpResponse::Ok().json(json!({
        "success": true,
        "message": message,
        "assessment": outcome.assessment,
        "final_score": outcome.final_score,
        "history_recorded": outcome.history_recorded,
    }))
}

pub async fn self_assess(
    principal: Principal,
    pool: web::Data<PgPool>,
    req: web::Json<SelfAssessmentRequest>,
) -> Result<HttpResponse, AppError> {
    validate_payload(&req.0)?;

    let me = UserScope {
        id: principal.user_id,
        role: principal.role,
        department_id: principal.department_id,
    };
    access::can_write_score(&principal, &me, ScoreField::SelfScore)?;

    let outcome = assessment::upsert(
        &pool,
        principal.user_id,
        principal.user_id,
        req.skill_id,
        ScoreField::SelfScore,
        Some(req.score),
    )
    .await?;

    Ok(saved(outcome))
}

pub async fn manager_assess(
    principal: Principal,
    pool: web::Data<PgPool>,
    req: web::Json<ManagerAssessmentRequest>,
) -> Result<HttpResponse, AppError> {
    validate_payload(&req.0)?;
    access::can_write_field(&principal, ScoreField::ManagerScore)?;

    let target = access::load_target(&pool, req.employee_id).await?;
    access::can_write_score(&principal, &target, ScoreField::ManagerScore)?;

    let outcome = assessment::upsert(
        &pool,
        principal.user_id,
        target.id,
        req.skill_id,
        ScoreField::ManagerScore,
        Some(req.manager_score),
    )
    .await?;

    Ok(saved(outcome))
}

pub async fn get_history(
    principal: Principal,
    pool: web::Data<PgPool>,
    user_id: web::Path<i64>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, AppError> {
    let target = access::load_target(&pool, user_id.into_inner()).await?;
    access::can_view(&principal, &target)?;

    let entries = history::list_for_user(&pool, target.id, query.skill_id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "total": entries.len(),
        "history": entries,
    })))
}
