use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use validator::Validate;
use crate::errors::AppError;
use crate::models::assessment::Score;
use crate::models::principal::Principal;
use crate::models::user::Role;
use crate::services::{access, analytics};
use crate::utils::validation::{validate_not_blank, validate_payload};

#[derive(Deserialize, Validate)]
pub struct SkillSearchQuery {
    #[validate(length(min = 1, max = 100), custom = "validate_not_blank")]
    skill: String,
    #[validate(range(min = 1, max = 5, message = "min_score must be between 1 and 5"))]
    min_score: Option<i32>,
}

#[derive(Deserialize)]
pub struct CompareQuery {
    user1: i64,
    user2: i64,
}

pub async fn dashboard(
    principal: Principal,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let data = analytics::dashboard(&pool, &principal).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "role": principal.role,
        "data": data,
    })))
}

pub async fn hr_report(
    principal: Principal,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    access::require_hr(&principal)?;

    let report = analytics::load_hr_report(&pool).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "stats": report.stats,
        "roles": report.roles,
        "departments": report.departments,
    })))
}

pub async fn search_by_skill(
    principal: Principal,
    pool: web::Data<PgPool>,
    query: web::Query<SkillSearchQuery>,
) -> Result<HttpResponse, AppError> {
    access::require_role(&principal, &[Role::Hr, Role::Admin, Role::Manager])?;
    validate_payload(&query.0)?;

    let min_score = Score::try_from(query.min_score.unwrap_or(1)).map_err(AppError::Validation)?;
    let result = analytics::search_by_skill(&pool, &principal, &query.skill, min_score).await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "skill": result.skill,
        "min_score": result.min_score,
        "users": result.users,
        "total_found": result.total_found,
    })))
}

pub async fn compare_users(
    principal: Principal,
    pool: web::Data<PgPool>,
    query: web::Query<CompareQuery>,
) -> Result<HttpResponse, AppError> {
    let first = access::load_target(&pool, query.user1).await?;
    let second = access::load_target(&pool, query.user2).await?;
    access::can_view(&principal, &first)?;
    access::can_view(&principal, &second)?;

    let comparison = analytics::compare_users(&pool, first.id, second.id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "user1": first,
        "user2": second,
        "comparison": comparison,
    })))
}

pub async fn team(
    principal: Principal,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    access::require_role(&principal, &[Role::Manager])?;

    let overview = analytics::load_team_overview(&pool, &principal).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "team": overview,
    })))
}

pub async fn user_skills(
    principal: Principal,
    pool: web::Data<PgPool>,
    user_id: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let target = access::load_target(&pool, user_id.into_inner()).await?;
    access::can_view(&principal, &target)?;

    let skills = analytics::user_skill_profile(&pool, target.id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "user_id": target.id,
        "skills": skills,
    })))
}

pub async fn user_summary(
    principal: Principal,
    pool: web::Data<PgPool>,
    user_id: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let target = access::load_target(&pool, user_id.into_inner()).await?;
    access::can_view(&principal, &target)?;

    let summary = analytics::load_user_summary(&pool, target.id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "summary": summary,
    })))
}
