use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use validator::Validate;
use crate::errors::AppError;
use crate::handlers::nullable;
use crate::models::department::Department;
use crate::models::principal::Principal;
use crate::services::access;
use crate::utils::validation::{validate_not_blank, validate_payload};

const DEPARTMENT_COLUMNS: &str = "id, name, manager_id, created_at, updated_at";

#[derive(Deserialize, Validate)]
pub struct NewDepartment {
    #[validate(length(min = 2, max = 100), custom = "validate_not_blank")]
    name: String,
    manager_id: Option<i64>,
}

#[derive(Deserialize, Validate)]
pub struct DepartmentUpdate {
    #[validate(length(min = 2, max = 100), custom = "validate_not_blank")]
    name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    manager_id: Option<Option<i64>>,
}

#[derive(Serialize, sqlx::FromRow)]
struct DepartmentListing {
    id: i64,
    name: String,
    manager_id: Option<i64>,
    manager_name: Option<String>,
    user_count: i64,
}

async fn ensure_name_free(pool: &PgPool, name: &str, except_id: Option<i64>) -> Result<(), AppError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM departments WHERE LOWER(name) = LOWER($1) AND ($2::BIGINT IS NULL OR id <> $2))",
    )
    .bind(name)
    .bind(except_id)
    .fetch_one(pool)
    .await?;

    if exists {
        return Err(AppError::Conflict("Department name already exists".to_string()));
    }
    Ok(())
}

async fn ensure_user_exists(pool: &PgPool, user_id: i64) -> Result<(), AppError> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    if !exists {
        return Err(AppError::NotFound("Manager not found".to_string()));
    }
    Ok(())
}

pub async fn get_departments(
    _principal: Principal,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let departments = sqlx::query_as::<_, DepartmentListing>(
        r#"
        SELECT
            d.id,
            d.name,
            d.manager_id,
            m.full_name AS manager_name,
            (SELECT COUNT(*) FROM users u WHERE u.department_id = d.id) AS user_count
        FROM departments d
        LEFT JOIN users m ON m.id = d.manager_id
        ORDER BY d.name
        "#,
    )
    .fetch_all(&**pool)
    .await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "departments": departments,
    })))
}

pub async fn create_department(
    principal: Principal,
    pool: web::Data<PgPool>,
    new_department: web::Json<NewDepartment>,
) -> Result<HttpResponse, AppError> {
    access::require_hr(&principal)?;
    validate_payload(&new_department.0)?;

    let name = new_department.name.trim();
    ensure_name_free(&pool, name, None).await?;
    if let Some(manager_id) = new_department.manager_id {
        ensure_user_exists(&pool, manager_id).await?;
    }

    let now = Utc::now();
    let sql = format!(
        "INSERT INTO departments (name, manager_id, created_at, updated_at) VALUES ($1, $2, $3, $3) RETURNING {}",
        DEPARTMENT_COLUMNS
    );
    let department = sqlx::query_as::<_, Department>(&sql)
        .bind(name)
        .bind(new_department.manager_id)
        .bind(now)
        .fetch_one(&**pool)
        .await
        .map_err(AppError::or_conflict("Department name already exists"))?;

    log::info!("User {} created department {} ({})", principal.user_id, department.id, department.name);

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": "Department created",
        "department": department,
    })))
}

pub async fn update_department(
    principal: Principal,
    pool: web::Data<PgPool>,
    department_id: web::Path<i64>,
    updates: web::Json<DepartmentUpdate>,
) -> Result<HttpResponse, AppError> {
    access::require_hr(&principal)?;
    validate_payload(&updates.0)?;

    let department_id = department_id.into_inner();
    let sql = format!("SELECT {} FROM departments WHERE id = $1", DEPARTMENT_COLUMNS);
    let current = sqlx::query_as::<_, Department>(&sql)
        .bind(department_id)
        .fetch_optional(&**pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Department not found".to_string()))?;

    let name = match &updates.name {
        Some(name) => {
            let name = name.trim();
            ensure_name_free(&pool, name, Some(current.id)).await?;
            name.to_string()
        }
        None => current.name.clone(),
    };
    let manager_id = match updates.manager_id {
        Some(Some(manager_id)) => {
            ensure_user_exists(&pool, manager_id).await?;
            Some(manager_id)
        }
        Some(None) => None,
        None => current.manager_id,
    };

    let sql = format!(
        "UPDATE departments SET name = $1, manager_id = $2, updated_at = $3 WHERE id = $4 RETURNING {}",
        DEPARTMENT_COLUMNS
    );
    let department = sqlx::query_as::<_, Department>(&sql)
        .bind(&name)
        .bind(manager_id)
        .bind(Utc::now())
        .bind(current.id)
        .fetch_one(&**pool)
        .await
        .map_err(AppError::or_conflict("Department name already exists"))?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Department updated",
        "department": department,
    })))
}
