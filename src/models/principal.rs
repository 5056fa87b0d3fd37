use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use futures_util::future::LocalBoxFuture;
use serde::Serialize;
use sqlx::PgPool;
use crate::config::Config;
use crate::errors::AppError;
use crate::models::user::{Role, UserScope};
use crate::utils;

/// The authenticated actor of a request. The token only names the user;
/// role and department are read from the database on every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub user_id: i64,
    pub role: Role,
    pub department_id: Option<i64>,
}

impl From<UserScope> for Principal {
    fn from(scope: UserScope) -> Self {
        Principal {
            user_id: scope.id,
            role: scope.role,
            department_id: scope.department_id,
        }
    }
}

impl Principal {
    fn token_subject(req: &HttpRequest) -> Result<i64, AppError> {
        let config = req.app_data::<web::Data<Config>>()
            .ok_or_else(|| AppError::Internal("Auth configuration missing".to_string()))?;

        let token = req.headers().get("Authorization")
            .and_then(|auth| auth.to_str().ok())
            .and_then(|auth| auth.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Missing token".to_string()))?;

        let claims = utils::jwt::validate_token(token, &config.jwt_secret)
            .map_err(|_| AppError::Unauthorized("Invalid token".to_string()))?;

        claims.sub.parse::<i64>()
            .map_err(|_| AppError::Unauthorized("Invalid user ID in token".to_string()))
    }

    pub async fn load(pool: &PgPool, user_id: i64) -> Result<Self, AppError> {
        sqlx::query_as::<_, UserScope>("SELECT id, role, department_id FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?
            .map(Principal::from)
            .ok_or_else(|| AppError::Unauthorized("User no longer exists".to_string()))
    }
}

impl FromRequest for Principal {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let subject = Principal::token_subject(req);
        let pool = req.app_data::<web::Data<PgPool>>().cloned();

        Box::pin(async move {
            let user_id = subject?;
            let pool = pool.ok_or_else(|| AppError::Internal("Database pool missing".to_string()))?;
            Principal::load(&pool, user_id).await
        })
    }
}
