use actix_cors::Cors;
use actix_web::dev::Server;
use actix_web::http::header;
use actix_web::{guard, web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::accounts::AccountDirectory;
use crate::auth::{CredentialVerifier, LineageStore, TokenAuthority};
use crate::configuration::Settings;
use crate::cookies::CookiePolicy;
use crate::email_client::EmailSender;
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{
    confirm_email, get_current_user, get_profile, health_check, list_token_lineage, list_users,
    login, logout, register, resend_confirmation, rotate_token, update_profile, validate_token,
    welcome,
};

/// Storage and outbound backends the server runs against
pub struct Backends {
    pub directory: Arc<dyn AccountDirectory>,
    pub lineage: Arc<dyn LineageStore>,
    pub email_sender: Arc<dyn EmailSender>,
}

fn cors(allowed_origins: &[String]) -> Cors {
    allowed_origins
        .iter()
        .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
        .allowed_methods(vec!["GET", "POST", "DELETE"])
        .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT, header::CONTENT_TYPE])
        .supports_credentials()
        .max_age(3600)
}

pub fn run(
    listener: TcpListener,
    settings: Settings,
    backends: Backends,
) -> Result<Server, std::io::Error> {
    let verifier = CredentialVerifier::new(settings.auth.password_hash_cost)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;

    let mut authority = TokenAuthority::new(&settings.auth);
    if settings.auth.track_lineage {
        authority = authority.with_lineage(backends.lineage);
    }
    tracing::info!(
        track_lineage = authority.tracks_lineage(),
        password_hash_cost = verifier.cost(),
        session_only = settings.auth.session_only,
        max_refresh_token_uses = settings.auth.max_refresh_token_uses,
        "Token authority ready"
    );

    let directory: web::Data<dyn AccountDirectory> = web::Data::from(backends.directory);
    let email_sender: web::Data<dyn EmailSender> = web::Data::from(backends.email_sender);
    let verifier = web::Data::new(verifier);
    let authority_data = web::Data::new(authority.clone());
    let cookie_policy = web::Data::new(CookiePolicy::new(&settings.auth, settings.environment));
    let app_settings = web::Data::new(settings.application.clone());
    let allowed_origins = settings.application.allowed_origins;

    let server = HttpServer::new(move || {
        App::new()
            .wrap(LoggerMiddleware)
            .wrap(cors(&allowed_origins))
            .app_data(directory.clone())
            .app_data(email_sender.clone())
            .app_data(verifier.clone())
            .app_data(authority_data.clone())
            .app_data(cookie_policy.clone())
            .app_data(app_settings.clone())
            // Public routes
            .route("/", web::get().to(welcome))
            .route("/health_check", web::get().to(health_check))
            .route("/register", web::post().to(register))
            .route("/login", web::post().to(login))
            .service(
                web::resource("/token")
                    .route(web::get().to(validate_token))
                    .route(web::post().to(rotate_token)),
            )
            .route("/logout", web::delete().to(logout))
            .route("/confirm", web::get().to(confirm_email))
            .route("/confirm/resend", web::post().to(resend_confirmation))
            .service(
                web::resource("/users/{username}")
                    .guard(guard::Get())
                    .route(web::get().to(get_profile)),
            )
            // Routes requiring a valid access token
            .service(
                web::resource("/me")
                    .wrap(JwtMiddleware::new(authority.clone()))
                    .route(web::get().to(get_current_user)),
            )
            .service(
                web::resource("/me/tokens")
                    .wrap(JwtMiddleware::new(authority.clone()))
                    .route(web::get().to(list_token_lineage)),
            )
            .service(
                web::resource("/users")
                    .wrap(JwtMiddleware::new(authority.clone()))
                    .route(web::get().to(list_users)),
            )
            .service(
                web::resource("/users/{username}")
                    .guard(guard::Post())
                    .wrap(JwtMiddleware::new(authority.clone()))
                    .route(web::post().to(update_profile)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
