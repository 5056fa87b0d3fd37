use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use validator::Validate;
use crate::errors::AppError;
use crate::models::principal::Principal;
use crate::models::skill::{Skill, SkillWithUsage};
use crate::services::access;
use crate::utils::validation::{validate_not_blank, validate_payload};

const SKILL_COLUMNS: &str = "id, name, category, description, created_at, updated_at";

#[derive(Deserialize, Validate)]
pub struct NewSkill {
    #[validate(length(min = 1, max = 100), custom = "validate_not_blank")]
    name: String,
    #[validate(length(min = 1, max = 100), custom = "validate_not_blank")]
    category: String,
    #[validate(length(max = 2000))]
    description: Option<String>,
}

#[derive(Deserialize, Validate)]
pub struct SkillUpdate {
    #[validate(length(min = 1, max = 100), custom = "validate_not_blank")]
    name: Option<String>,
    #[validate(length(min = 1, max = 100), custom = "validate_not_blank")]
    category: Option<String>,
    #[validate(length(max = 2000))]
    description: Option<String>,
}

async fn find_skill(pool: &PgPool, skill_id: i64) -> Result<Skill, AppError> {
    let sql = format!("SELECT {} FROM skills WHERE id = $1", SKILL_COLUMNS);
    sqlx::query_as::<_, Skill>(&sql)
        .bind(skill_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Skill not found".to_string()))
}

async fn ensure_unique(
    pool: &PgPool,
    name: &str,
    category: &str,
    except_id: Option<i64>,
) -> Result<(), AppError> {
    let exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM skills
            WHERE LOWER(name) = LOWER($1) AND LOWER(category) = LOWER($2)
              AND ($3::BIGINT IS NULL OR id <> $3)
        )
        "#,
    )
    .bind(name)
    .bind(category)
    .bind(except_id)
    .fetch_one(pool)
    .await?;

    if exists {
        return Err(AppError::Conflict("Skill already exists in this category".to_string()));
    }
    Ok(())
}

pub async fn get_skills(
    _principal: Principal,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let skills = sqlx::query_as::<_, SkillWithUsage>(
        r#"
        SELECT
            s.id,
            s.name,
            s.category,
            s.description,
            COUNT(a.id) AS assessments_count
        FROM skills s
        LEFT JOIN skill_assessments a ON a.skill_id = s.id
        GROUP BY s.id
        ORDER BY s.category, s.name
        "#,
    )
    .fetch_all(&**pool)
    .await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "total": skills.len(),
        "skills": skills,
    })))
}

pub async fn create_skill(
    principal: Principal,
    pool: web::Data<PgPool>,
    new_skill: web::Json<NewSkill>,
) -> Result<HttpResponse, AppError> {
    access::require_hr(&principal)?;
    validate_payload(&new_skill.0)?;

    let name = new_skill.name.trim();
    let category = new_skill.category.trim();
    ensure_unique(&pool, name, category, None).await?;

    let now = Utc::now();
    let sql = format!(
        "INSERT INTO skills (name, category, description, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $4) RETURNING {}",
        SKILL_COLUMNS
    );
    let skill = sqlx::query_as::<_, Skill>(&sql)
        .bind(name)
        .bind(category)
        .bind(new_skill.description.as_deref().map(str::trim))
        .bind(now)
        .fetch_one(&**pool)
        .await
        .map_err(AppError::or_conflict("Skill already exists in this category"))?;

    log::info!("User {} created skill {} ({})", principal.user_id, skill.id, skill.name);

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": "Skill created",
        "skill": skill,
    })))
}

pub async fn update_skill(
    principal: Principal,
    pool: web::Data<PgPool>,
    skill_id: web::Path<i64>,
    updates: web::Json<SkillUpdate>,
) -> Result<HttpResponse, AppError> {
    access::require_hr(&principal)?;
    validate_payload(&updates.0)?;

    let current = find_skill(&pool, skill_id.into_inner()).await?;
    let name = updates.name.as_deref().map(str::trim).unwrap_or(&current.name);
    let category = updates.category.as_deref().map(str::trim).unwrap_or(&current.category);
    ensure_unique(&pool, name, category, Some(current.id)).await?;

    let description = match &updates.description {
        Some(description) => Some(description.trim()),
        None => current.description.as_deref(),
    };

    let sql = format!(
        "UPDATE skills SET name = $1, category = $2, description = $3, updated_at = $4 \
         WHERE id = $5 RETURNING {}",
        SKILL_COLUMNS
    );
    let skill = sqlx::query_as::<_, Skill>(&sql)
        .bind(name)
        .bind(category)
        .bind(description)
        .bind(Utc::now())
        .bind(current.id)
        .fetch_one(&**pool)
        .await
        .map_err(AppError::or_conflict("Skill already exists in this category"))?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Skill updated",
        "skill": skill,
    })))
}

/// Removing a skill also removes its assessments and their history.
pub async fn delete_skill(
    principal: Principal,
    pool: web::Data<PgPool>,
    skill_id: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    access::require_hr(&principal)?;

    let skill = find_skill(&pool, skill_id.into_inner()).await?;

    let result = sqlx::query("DELETE FROM skills WHERE id = $1")
        .bind(skill.id)
        .execute(&**pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Skill not found".to_string()));
    }

    log::info!("User {} deleted skill {} ({})", principal.user_id, skill.id, skill.name);

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Skill deleted",
    })))
}
