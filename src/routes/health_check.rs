use actix_web::HttpResponse;

/// Liveness check; never touches storage
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().finish()
}

pub async fn welcome() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "message": "Welcome to the authentication API"
    }))
}
