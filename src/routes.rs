use actix_web::{error, web, HttpRequest, HttpResponse};
use crate::errors::AppError;
use crate::handlers;

fn json_error(err: error::JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    AppError::Validation(format!("Invalid request body: {}", err)).into()
}

fn query_error(err: error::QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    AppError::Validation(format!("Invalid query parameters: {}", err)).into()
}

fn path_error(err: error::PathError, _req: &HttpRequest) -> actix_web::Error {
    AppError::Validation(format!("Invalid path parameter: {}", err)).into()
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "success": true, "status": "ok" }))
}

/// Registers every endpoint together with the extractor configuration that
/// turns malformed input into validation errors.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .app_data(web::QueryConfig::default().error_handler(query_error))
        .app_data(web::PathConfig::default().error_handler(path_error))
        .route("/health", web::get().to(health))
        .service(
            web::scope("/v1")
                .route("/auth/login", web::post().to(handlers::auth::login))
                .route("/dashboard", web::get().to(handlers::analytics::dashboard))
                .route("/team", web::get().to(handlers::analytics::team))
                .route("/assessments/self", web::post().to(handlers::assessment::self_assess))
                .route("/assessments/manager", web::post().to(handlers::assessment::manager_assess))
                .route("/analytics", web::get().to(handlers::analytics::hr_report))
                .route("/analytics/search", web::get().to(handlers::analytics::search_by_skill))
                .route("/analytics/compare", web::get().to(handlers::analytics::compare_users))
                .service(
                    web::resource("/skills")
                        .route(web::get().to(handlers::skill::get_skills))
                        .route(web::post().to(handlers::skill::create_skill)),
                )
                .service(
                    web::resource("/skills/{skill_id}")
                        .route(web::patch().to(handlers::skill::update_skill))
                        .route(web::delete().to(handlers::skill::delete_skill)),
                )
                .service(
                    web::resource("/departments")
                        .route(web::get().to(handlers::department::get_departments))
                        .route(web::post().to(handlers::department::create_department)),
                )
                .service(
                    web::resource("/departments/{department_id}")
                        .route(web::patch().to(handlers::department::update_department)),
                )
                .service(
                    web::resource("/users")
                        .route(web::get().to(handlers::user::search_users))
                        .route(web::post().to(handlers::user::create_user)),
                )
                .service(
                    web::resource("/users/{user_id}")
                        .route(web::get().to(handlers::user::get_user))
                        .route(web::patch().to(handlers::user::update_user))
                        .route(web::delete().to(handlers::user::delete_user)),
                )
                .route("/users/{user_id}/skills", web::get().to(handlers::analytics::user_skills))
                .route("/users/{user_id}/summary", web::get().to(handlers::analytics::user_summary))
                .route("/users/{user_id}/history", web::get().to(handlers::assessment::get_history)),
        );
}
