use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;
use crate::errors::AppError;
use crate::handlers::nullable;
use crate::models::principal::Principal;
use crate::models::user::{Role, User, UserScope};
use crate::services::{access, analytics};
use crate::utils;
use crate::utils::validation::{validate_not_blank, validate_payload, validate_search_term};

const USER_COLUMNS: &str =
    "id, login, password_hash, role, full_name, position, department_id, created_at, updated_at";

const USER_SEARCH_LIMIT: i64 = 10;

#[derive(Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct NewUser {
    #[validate(length(min = 3, max = 50), custom = "validate_not_blank")]
    login: String,
    #[validate(length(min = 6, max = 128))]
    password: String,
    #[validate(length(min = 2, max = 150), custom = "validate_not_blank")]
    full_name: String,
    role: Role,
    #[validate(length(max = 100))]
    position: Option<String>,
    department_id: Option<i64>,
}

#[derive(Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct UserUpdate {
    #[validate(length(min = 3, max = 50), custom = "validate_not_blank")]
    login: Option<String>,
    #[validate(length(min = 6, max = 128))]
    password: Option<String>,
    #[validate(length(min = 2, max = 150), custom = "validate_not_blank")]
    full_name: Option<String>,
    role: Option<Role>,
    #[serde(default, deserialize_with = "nullable")]
    #[validate(length(max = 100))]
    position: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    department_id: Option<Option<i64>>,
}

#[derive(Deserialize, Validate)]
pub struct UserSearchQuery {
    #[validate(length(max = 100), custom = "validate_search_term")]
    q: String,
}

#[derive(Serialize, sqlx::FromRow)]
struct UserListing {
    id: i64,
    login: String,
    full_name: String,
    #[sqlx(try_from = "String")]
    role: Role,
    position: Option<String>,
    department_id: Option<i64>,
    department: Option<String>,
}

async fn find_user(pool: &PgPool, user_id: i64) -> Result<User, AppError> {
    let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
    sqlx::query_as::<_, User>(&sql)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

async fn ensure_login_free(pool: &PgPool, login: &str, except_id: Option<i64>) -> Result<(), AppError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(login) = LOWER($1) AND ($2::BIGINT IS NULL OR id <> $2))",
    )
    .bind(login)
    .bind(except_id)
    .fetch_one(pool)
    .await?;

    if exists {
        return Err(AppError::Conflict("A user with this login already exists".to_string()));
    }
    Ok(())
}

async fn ensure_department_exists(pool: &PgPool, department_id: i64) -> Result<(), AppError> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM departments WHERE id = $1)")
        .bind(department_id)
        .fetch_one(pool)
        .await?;
    if !exists {
        return Err(AppError::NotFound("Department not found".to_string()));
    }
    Ok(())
}

pub async fn create_user(
    principal: Principal,
    pool: web::Data<PgPool>,
    new_user: web::Json<NewUser>,
) -> Result<HttpResponse, AppError> {
    validate_payload(&new_user.0)?;
    access::can_register(&principal, new_user.department_id, new_user.role)?;

    let login = new_user.login.trim();
    ensure_login_free(&pool, login, None).await?;
    if let Some(department_id) = new_user.department_id {
        ensure_department_exists(&pool, department_id).await?;
    }

    let password_hash = utils::password::hash_password(&new_user.password)?;
    let now = Utc::now();
    let sql = format!(
        "INSERT INTO users (login, password_hash, role, full_name, position, department_id, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $7) RETURNING {}",
        USER_COLUMNS
    );
    let user = sqlx::query_as::<_, User>(&sql)
        .bind(login)
        .bind(&password_hash)
        .bind(new_user.role.as_str())
        .bind(new_user.full_name.trim())
        .bind(new_user.position.as_deref().map(str::trim))
        .bind(new_user.department_id)
        .bind(now)
        .fetch_one(&**pool)
        .await
        .map_err(AppError::or_conflict("A user with this login already exists"))?;

    log::info!("User {} created user {} ({}, {})", principal.user_id, user.id, user.login, user.role);

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": "User created",
        "user": user,
    })))
}

/// Case-insensitive search over full name and login for HR and admins.
pub async fn search_users(
    principal: Principal,
    pool: web::Data<PgPool>,
    query: web::Query<UserSearchQuery>,
) -> Result<HttpResponse, AppError> {
    access::require_hr(&principal)?;
    validate_payload(&query.0)?;

    let users = sqlx::query_as::<_, UserListing>(
        r#"
        SELECT
            u.id,
            u.login,
            u.full_name,
            u.role,
            u.position,
            u.department_id,
            d.name AS department
        FROM users u
        LEFT JOIN departments d ON d.id = u.department_id
        WHERE u.full_name ILIKE $1 OR u.login ILIKE $1
        ORDER BY u.full_name, u.id
        LIMIT $2
        "#,
    )
    .bind(analytics::like_pattern(query.q.trim()))
    .bind(USER_SEARCH_LIMIT)
    .fetch_all(&**pool)
    .await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "total": users.len(),
        "users": users,
    })))
}

pub async fn get_user(
    principal: Principal,
    pool: web::Data<PgPool>,
    user_id: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let user = find_user(&pool, user_id.into_inner()).await?;
    access::can_view(&principal, &UserScope::from(&user))?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "user": user,
    })))
}

pub async fn update_user(
    principal: Principal,
    pool: web::Data<PgPool>,
    user_id: web::Path<i64>,
    updates: web::Json<UserUpdate>,
) -> Result<HttpResponse, AppError> {
    access::require_hr(&principal)?;
    validate_payload(&updates.0)?;

    let user = find_user(&pool, user_id.into_inner()).await?;

    if let Some(login) = &updates.login {
        ensure_login_free(&pool, login.trim(), Some(user.id)).await?;
    }
    if let Some(Some(department_id)) = updates.department_id {
        ensure_department_exists(&pool, department_id).await?;
    }
    let password_hash = match &updates.password {
        Some(password) => Some(utils::password::hash_password(password)?),
        None => None,
    };

    let mut query: QueryBuilder<'_, Postgres> = QueryBuilder::new("UPDATE users SET ");
    let mut separated = query.separated(", ");

    if let Some(login) = &updates.login {
        separated.push("login = ").push_bind_unseparated(login.trim());
    }
    if let Some(password_hash) = &password_hash {
        separated.push("password_hash = ").push_bind_unseparated(password_hash);
    }
    if let Some(full_name) = &updates.full_name {
        separated.push("full_name = ").push_bind_unseparated(full_name.trim());
    }
    if let Some(role) = updates.role {
        separated.push("role = ").push_bind_unseparated(role.as_str());
    }
    if let Some(position) = &updates.position {
        separated.push("position = ").push_bind_unseparated(position.as_deref().map(str::trim));
    }
    if let Some(department_id) = updates.department_id {
        separated.push("department_id = ").push_bind_unseparated(department_id);
    }
    separated.push("updated_at = ").push_bind_unseparated(Utc::now());

    query.push(" WHERE id = ");
    query.push_bind(user.id);
    query.push(" RETURNING ");
    query.push(USER_COLUMNS);

    let updated = query
        .build_query_as::<User>()
        .fetch_one(&**pool)
        .await
        .map_err(AppError::or_conflict("A user with this login already exists"))?;

    log::info!("User {} updated user {}", principal.user_id, updated.id);

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "User updated",
        "user": updated,
    })))
}

/// Deleting a user removes their assessments and the history of those
/// assessments. History rows they authored elsewhere keep a NULL author.
pub async fn delete_user(
    principal: Principal,
    pool: web::Data<PgPool>,
    user_id: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    access::require_hr(&principal)?;

    let user = find_user(&pool, user_id.into_inner()).await?;
    if user.id == principal.user_id {
        return Err(AppError::Validation("You cannot delete your own account".to_string()));
    }

    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user.id)
        .execute(&**pool)
        .await?;

    log::info!("User {} deleted user {} ({})", principal.user_id, user.id, user.login);

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "User deleted",
    })))
}
