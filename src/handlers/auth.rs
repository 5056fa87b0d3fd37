use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use validator::Validate;
use crate::config::Config;
use crate::errors::AppError;
use crate::models::user::{Role, User};
use crate::utils;

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 50))]
    login: String,
    #[validate(length(min = 1, max = 128))]
    password: String,
}

#[derive(Serialize)]
struct LoginUser {
    id: i64,
    full_name: String,
    role: Role,
    department_id: Option<i64>,
}

#[derive(Serialize)]
struct LoginResponse {
    success: bool,
    token: String,
    user: LoginUser,
}

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("Invalid login or password".to_string())
}

pub async fn login(
    pool: web::Data<PgPool>,
    config: web::Data<Config>,
    req: web::Json<LoginRequest>,
) -> Result<HttpResponse, AppError> {
    utils::validation::validate_payload(&req.0)?;

    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, login, password_hash, role, full_name, position, department_id, created_at, updated_at
        FROM users
        WHERE LOWER(login) = LOWER($1)
        "#,
    )
    .bind(req.login.trim())
    .fetch_optional(&**pool)
    .await?
    .ok_or_else(invalid_credentials)?;

    if !utils::password::verify_password(&req.password, &user.password_hash)? {
        log::info!("Rejected login for '{}'", user.login);
        return Err(invalid_credentials());
    }

    let token = utils::jwt::generate_token(user.id, &config.jwt_secret, config.jwt_ttl_hours)
        .map_err(|_| AppError::Internal("Token generation error".to_string()))?;

    Ok(HttpResponse::Ok().json(LoginResponse {
        success: true,
        token,
        user: LoginUser {
            id: user.id,
            full_name: user.full_name,
            role: user.role,
            department_id: user.department_id,
        },
    }))
}
